use core::{i32, ops, cmp, fmt};
use byteorder::{ByteOrder, NetworkEndian};

use super::{Error, Ipv4Address, Result};
use super::ip::{checksum, Protocol};

/// A TCP sequence number.
///
/// A sequence number is a monotonically advancing integer modulo 2<sup>32</sup>.
/// Sequence numbers do not have a discontiguity when compared pairwise across a signed overflow.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Hash)]
pub struct SeqNumber(pub i32);

impl fmt::Display for SeqNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0 as u32)
    }
}

impl ops::Add<usize> for SeqNumber {
    type Output = SeqNumber;

    fn add(self, rhs: usize) -> SeqNumber {
        if rhs > i32::MAX as usize {
            panic!("attempt to add to sequence number with unsigned overflow")
        }
        SeqNumber(self.0.wrapping_add(rhs as i32))
    }
}

impl ops::Sub<usize> for SeqNumber {
    type Output = SeqNumber;

    fn sub(self, rhs: usize) -> SeqNumber {
        if rhs > i32::MAX as usize {
            panic!("attempt to subtract to sequence number with unsigned overflow")
        }
        SeqNumber(self.0.wrapping_sub(rhs as i32))
    }
}

impl ops::AddAssign<usize> for SeqNumber {
    fn add_assign(&mut self, rhs: usize) {
        *self = *self + rhs;
    }
}

impl ops::Sub for SeqNumber {
    type Output = usize;

    fn sub(self, rhs: SeqNumber) -> usize {
        let result = self.0.wrapping_sub(rhs.0);
        if result < 0 {
            panic!("attempt to subtract sequence numbers with underflow")
        }
        result as usize
    }
}

impl cmp::PartialOrd for SeqNumber {
    fn partial_cmp(&self, other: &SeqNumber) -> Option<cmp::Ordering> {
        self.0.wrapping_sub(other.0).partial_cmp(&0)
    }
}

/// A set of tcp flags.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Hash)]
pub struct Flags(pub u16);

/// Length of a TCP header without options.
pub const HEADER_LEN: usize = field::URGENT.end;

/// A read/write wrapper around a Transmission Control Protocol packet buffer.
#[derive(Debug, PartialEq, Clone)]
pub struct Packet<T: AsRef<[u8]>> {
    buffer: T,
}

mod field {
    #![allow(non_snake_case)]

    use crate::wire::field::Field;

    pub(crate) const SRC_PORT: Field = 0..2;
    pub(crate) const DST_PORT: Field = 2..4;
    pub(crate) const SEQ_NUM:  Field = 4..8;
    pub(crate) const ACK_NUM:  Field = 8..12;
    pub(crate) const FLAGS:    Field = 12..14;
    pub(crate) const WIN_SIZE: Field = 14..16;
    pub(crate) const CHECKSUM: Field = 16..18;
    pub(crate) const URGENT:   Field = 18..20;

    pub(crate) fn OPTIONS(length: u8) -> Field {
        URGENT.end..(length as usize)
    }

    pub(crate) const FLG_FIN: u16 = 0x001;
    pub(crate) const FLG_SYN: u16 = 0x002;
    pub(crate) const FLG_RST: u16 = 0x004;
    pub(crate) const FLG_PSH: u16 = 0x008;
    pub(crate) const FLG_ACK: u16 = 0x010;
    pub(crate) const FLG_URG: u16 = 0x020;

    pub(crate) const OPT_END: u8 = 0x00;
    pub(crate) const OPT_NOP: u8 = 0x01;
    pub(crate) const OPT_MSS: u8 = 0x02;
    pub(crate) const OPT_WS:  u8 = 0x03;
    pub(crate) const OPT_SACKPERM: u8 = 0x04;
    pub(crate) const OPT_SACKRNG:  u8 = 0x05;
    pub(crate) const OPT_TSTAMP:   u8 = 0x08;
}

impl<T: AsRef<[u8]>> Packet<T> {
    /// Imbue a raw octet buffer with TCP packet structure.
    pub fn new_unchecked(buffer: T) -> Packet<T> {
        Packet { buffer }
    }

    /// Shorthand for a combination of [new_unchecked] and [check_len].
    ///
    /// [new_unchecked]: #method.new_unchecked
    /// [check_len]: #method.check_len
    pub fn new_checked(buffer: T) -> Result<Packet<T>> {
        let packet = Self::new_unchecked(buffer);
        packet.check_len()?;
        Ok(packet)
    }

    /// Ensure that no header accessor method will panic if called.
    /// Returns `Err(Error::Truncated)` if the buffer is too short.
    /// Returns `Err(Error::Malformed)` if the header length field has a value smaller
    /// than the minimal header length.
    ///
    /// The result of this check is invalidated by calling [set_header_len].
    ///
    /// [set_header_len]: #method.set_header_len
    pub fn check_len(&self) -> Result<()> {
        let len = self.buffer.as_ref().len();
        if len < field::URGENT.end {
            Err(Error::Truncated)
        } else {
            let header_len = self.header_len() as usize;
            if len < header_len {
                Err(Error::Truncated)
            } else if header_len < field::URGENT.end {
                Err(Error::Malformed)
            } else {
                Ok(())
            }
        }
    }

    /// Consume the packet, returning the underlying buffer.
    pub fn into_inner(self) -> T {
        self.buffer
    }

    /// Return the source port field.
    #[inline]
    pub fn src_port(&self) -> u16 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[field::SRC_PORT])
    }

    /// Return the destination port field.
    #[inline]
    pub fn dst_port(&self) -> u16 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[field::DST_PORT])
    }

    /// Return the sequence number field.
    #[inline]
    pub fn seq_number(&self) -> SeqNumber {
        let data = self.buffer.as_ref();
        SeqNumber(NetworkEndian::read_i32(&data[field::SEQ_NUM]))
    }

    /// Return the acknowledgement number field.
    #[inline]
    pub fn ack_number(&self) -> SeqNumber {
        let data = self.buffer.as_ref();
        SeqNumber(NetworkEndian::read_i32(&data[field::ACK_NUM]))
    }

    /// Read all flags at once.
    pub fn flags(&self) -> Flags {
        let data = self.buffer.as_ref();
        Flags(NetworkEndian::read_u16(&data[field::FLAGS]) & 0x1ff)
    }

    /// Return the header length, in octets.
    #[inline]
    pub fn header_len(&self) -> u8 {
        let data = self.buffer.as_ref();
        let raw = NetworkEndian::read_u16(&data[field::FLAGS]);
        ((raw >> 12) * 4) as u8
    }

    /// Return the window size field.
    #[inline]
    pub fn window_len(&self) -> u16 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[field::WIN_SIZE])
    }

    /// Return the checksum field.
    #[inline]
    pub fn checksum(&self) -> u16 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[field::CHECKSUM])
    }

    /// Return the urgent pointer field.
    #[inline]
    pub fn urgent_at(&self) -> u16 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[field::URGENT])
    }

    /// Return a pointer to the options.
    #[inline]
    pub fn options(&self) -> &[u8] {
        let header_len = self.header_len();
        let data = self.buffer.as_ref();
        &data[field::OPTIONS(header_len)]
    }

    /// Return a pointer to the payload.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        let header_len = self.header_len() as usize;
        let data = self.buffer.as_ref();
        &data[header_len..]
    }

    /// Return the length of the segment, in terms of sequence space.
    pub fn sequence_len(&self) -> usize {
        self.payload().len() + self.flags().sequence_len()
    }

    /// Validate the packet checksum against the IPv4 pseudo header.
    pub fn verify_checksum(&self, src_addr: Ipv4Address, dst_addr: Ipv4Address) -> bool {
        let data = self.buffer.as_ref();
        checksum::combine(&[
            checksum::pseudo_header(&src_addr, &dst_addr, Protocol::Tcp,
                                    data.len() as u32),
            checksum::data(data)
        ]) == !0
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    /// Set the source port field.
    #[inline]
    pub fn set_src_port(&mut self, value: u16) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u16(&mut data[field::SRC_PORT], value)
    }

    /// Set the destination port field.
    #[inline]
    pub fn set_dst_port(&mut self, value: u16) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u16(&mut data[field::DST_PORT], value)
    }

    /// Set the sequence number field.
    #[inline]
    pub fn set_seq_number(&mut self, value: SeqNumber) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_i32(&mut data[field::SEQ_NUM], value.0)
    }

    /// Set the acknowledgement number field.
    #[inline]
    pub fn set_ack_number(&mut self, value: SeqNumber) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_i32(&mut data[field::ACK_NUM], value.0)
    }

    /// Set a combination of flags.
    #[inline]
    pub fn set_flags(&mut self, Flags(flags): Flags) {
        let data = self.buffer.as_mut();
        let field = NetworkEndian::read_u16(&data[field::FLAGS]) & !0xfff;
        NetworkEndian::write_u16(&mut data[field::FLAGS], field | (flags & 0x1ff))
    }

    /// Set the header length, in octets.
    #[inline]
    pub fn set_header_len(&mut self, value: u8) {
        let data = self.buffer.as_mut();
        let raw = NetworkEndian::read_u16(&data[field::FLAGS]);
        let raw = (raw & !0xf000) | ((value as u16) / 4) << 12;
        NetworkEndian::write_u16(&mut data[field::FLAGS], raw)
    }

    /// Set the window size field.
    #[inline]
    pub fn set_window_len(&mut self, value: u16) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u16(&mut data[field::WIN_SIZE], value)
    }

    /// Set the checksum field.
    #[inline]
    pub fn set_checksum(&mut self, value: u16) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u16(&mut data[field::CHECKSUM], value)
    }

    /// Set the urgent pointer field.
    #[inline]
    pub fn set_urgent_at(&mut self, value: u16) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u16(&mut data[field::URGENT], value)
    }

    /// Compute and fill in the header checksum.
    pub fn fill_checksum(&mut self, src_addr: Ipv4Address, dst_addr: Ipv4Address) {
        self.set_checksum(0);
        let checksum = {
            let data = self.buffer.as_ref();
            !checksum::combine(&[
                checksum::pseudo_header(&src_addr, &dst_addr, Protocol::Tcp,
                                        data.len() as u32),
                checksum::data(data)
            ])
        };
        self.set_checksum(checksum)
    }

    /// Return a mutable pointer to the options.
    #[inline]
    pub fn options_mut(&mut self) -> &mut [u8] {
        let header_len = self.header_len();
        let data = self.buffer.as_mut();
        &mut data[field::OPTIONS(header_len)]
    }

    /// Return a mutable pointer to the payload data.
    #[inline]
    pub fn payload_mut(&mut self) -> &mut [u8] {
        let header_len = self.header_len() as usize;
        let data = self.buffer.as_mut();
        &mut data[header_len..]
    }
}

impl Flags {
    /// The FIN flag alone.
    pub const FIN: Flags = Flags(field::FLG_FIN);
    /// The SYN flag alone.
    pub const SYN: Flags = Flags(field::FLG_SYN);
    /// The RST flag alone.
    pub const RST: Flags = Flags(field::FLG_RST);
    /// The PSH flag alone.
    pub const PSH: Flags = Flags(field::FLG_PSH);
    /// The ACK flag alone.
    pub const ACK: Flags = Flags(field::FLG_ACK);
    /// The URG flag alone.
    pub const URG: Flags = Flags(field::FLG_URG);

    /// Return the FIN flag.
    #[inline]
    pub fn fin(&self) -> bool {
        self.0 & field::FLG_FIN != 0
    }

    /// Return the SYN flag.
    #[inline]
    pub fn syn(&self) -> bool {
        self.0 & field::FLG_SYN != 0
    }

    /// Return the RST flag.
    #[inline]
    pub fn rst(&self) -> bool {
        self.0 & field::FLG_RST != 0
    }

    /// Return the PSH flag.
    #[inline]
    pub fn psh(&self) -> bool {
        self.0 & field::FLG_PSH != 0
    }

    /// Return the ACK flag.
    #[inline]
    pub fn ack(&self) -> bool {
        self.0 & field::FLG_ACK != 0
    }

    /// Return the URG flag.
    #[inline]
    pub fn urg(&self) -> bool {
        self.0 & field::FLG_URG != 0
    }

    /// Set the ACK flag.
    #[inline]
    pub fn set_ack(&mut self, value: bool) {
        let flag = if value { field::FLG_ACK } else { 0 };
        let without = self.0 & !field::FLG_ACK;
        self.0 = without | flag;
    }

    /// Return the length of a control flag, in terms of sequence space.
    pub fn sequence_len(self) -> usize {
        (if self.syn() { 1 } else { 0 })
        + (if self.fin() { 1 }  else { 0 })
    }
}

impl ops::BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let names = [
            (field::FLG_SYN, "syn"),
            (field::FLG_FIN, "fin"),
            (field::FLG_RST, "rst"),
            (field::FLG_PSH, "psh"),
            (field::FLG_ACK, "ack"),
            (field::FLG_URG, "urg"),
        ];
        let mut first = true;
        for &(bit, name) in names.iter() {
            if self.0 & bit != 0 {
                if !first { write!(f, "|")? }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        if first { write!(f, "-")? }
        Ok(())
    }
}

/// A representation of a single TCP option.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TcpOption<'a> {
    /// Marks the end of the option list, the rest is padding.
    EndOfList,
    /// Single octet of padding between options.
    NoOperation,
    /// The largest segment the sender is willing to receive.
    MaxSegmentSize(u16),
    /// Shift count applied to the advertised window.
    WindowScale(u8),
    /// The sender understands selective acknowledgements.
    SackPermitted,
    /// Up to three selectively acknowledged ranges.
    SackRange([Option<(u32, u32)>; 3]),
    /// RFC 7323 timestamp value and echo reply.
    Timestamp {
        /// The sender's clock.
        tsval: u32,
        /// The most recent value received from the other side.
        tsecr: u32,
    },
    /// An option we do not interpret.
    Unknown {
        /// The option kind octet.
        kind: u8,
        /// Data following the length octet.
        data: &'a [u8],
    }
}

impl<'a> TcpOption<'a> {
    /// Parse the first option in the buffer, returning the remainder.
    pub fn parse(buffer: &'a [u8]) -> Result<(&'a [u8], TcpOption<'a>)> {
        let (length, option);
        match *buffer.get(0).ok_or(Error::Truncated)? {
            field::OPT_END => {
                length = 1;
                option = TcpOption::EndOfList;
            }
            field::OPT_NOP => {
                length = 1;
                option = TcpOption::NoOperation;
            }
            kind => {
                length = *buffer.get(1).ok_or(Error::Truncated)? as usize;
                if length < 2 {
                    return Err(Error::Malformed)
                }
                let data = buffer.get(2..length).ok_or(Error::Truncated)?;
                match (kind, length) {
                    (field::OPT_MSS, 4) =>
                        option = TcpOption::MaxSegmentSize(NetworkEndian::read_u16(data)),
                    (field::OPT_MSS, _) =>
                        return Err(Error::Malformed),
                    (field::OPT_WS, 3) =>
                        option = TcpOption::WindowScale(data[0]),
                    (field::OPT_WS, _) =>
                        return Err(Error::Malformed),
                    (field::OPT_SACKPERM, 2) =>
                        option = TcpOption::SackPermitted,
                    (field::OPT_SACKPERM, _) =>
                        return Err(Error::Malformed),
                    (field::OPT_TSTAMP, 10) =>
                        option = TcpOption::Timestamp {
                            tsval: NetworkEndian::read_u32(&data[0..4]),
                            tsecr: NetworkEndian::read_u32(&data[4..8]),
                        },
                    (field::OPT_TSTAMP, _) =>
                        return Err(Error::Malformed),
                    (field::OPT_SACKRNG, n) => {
                        if n < 10 || (n-2) % 8 != 0 {
                            return Err(Error::Malformed)
                        }
                        if n > 26 {
                            // RFC 2018: with the timestamp option present at most 3 blocks fit.
                            net_debug!("sACK with >3 blocks, truncating to 3");
                        }
                        let mut sack_ranges: [Option<(u32, u32)>; 3] = [None; 3];

                        // RFC 2018: Each contiguous block of data queued at the data receiver is
                        // defined in the SACK option by two 32-bit unsigned integers in network
                        // byte order[...]
                        sack_ranges.iter_mut().enumerate().for_each(|(i, nmut)| {
                            let left = i * 8;
                            *nmut = if left < data.len() {
                                let mid = left + 4;
                                let right = mid + 4;
                                let range_left = NetworkEndian::read_u32(
                                    &data[left..mid]);
                                let range_right = NetworkEndian::read_u32(
                                    &data[mid..right]);
                                Some((range_left, range_right))
                            } else {
                                None
                            };
                        });
                        option = TcpOption::SackRange(sack_ranges);
                    },
                    (_, _) =>
                        option = TcpOption::Unknown { kind, data }
                }
            }
        }
        Ok((&buffer[length..], option))
    }

    /// The number of octets this option occupies.
    pub fn buffer_len(&self) -> usize {
        match self {
            TcpOption::EndOfList => 1,
            TcpOption::NoOperation => 1,
            TcpOption::MaxSegmentSize(_) => 4,
            TcpOption::WindowScale(_) => 3,
            TcpOption::SackPermitted => 2,
            TcpOption::SackRange(s) => s.iter().filter(|s| s.is_some()).count() * 8 + 2,
            TcpOption::Timestamp { .. } => 10,
            TcpOption::Unknown { data, .. } => 2 + data.len()
        }
    }

    /// Write the option to the start of the buffer, returning the remainder.
    pub fn emit<'b>(&self, buffer: &'b mut [u8]) -> &'b mut [u8] {
        let length = self.buffer_len();
        match *self {
            TcpOption::EndOfList => {
                // There may be padding space which also should be initialized.
                for p in buffer.iter_mut() {
                    *p = field::OPT_END;
                }
            }
            TcpOption::NoOperation => {
                buffer[0] = field::OPT_NOP;
            }
            TcpOption::MaxSegmentSize(value) => {
                buffer[0] = field::OPT_MSS;
                buffer[1] = length as u8;
                NetworkEndian::write_u16(&mut buffer[2..], value)
            }
            TcpOption::WindowScale(value) => {
                buffer[0] = field::OPT_WS;
                buffer[1] = length as u8;
                buffer[2] = value;
            }
            TcpOption::SackPermitted => {
                buffer[0] = field::OPT_SACKPERM;
                buffer[1] = length as u8;
            }
            TcpOption::SackRange(slice) => {
                buffer[0] = field::OPT_SACKRNG;
                buffer[1] = length as u8;
                slice.iter().flatten().enumerate().for_each(|(i, &(first, second))| {
                    let pos = i * 8 + 2;
                    NetworkEndian::write_u32(&mut buffer[pos..], first);
                    NetworkEndian::write_u32(&mut buffer[pos+4..], second);
                });
            }
            TcpOption::Timestamp { tsval, tsecr } => {
                buffer[0] = field::OPT_TSTAMP;
                buffer[1] = length as u8;
                NetworkEndian::write_u32(&mut buffer[2..6], tsval);
                NetworkEndian::write_u32(&mut buffer[6..10], tsecr);
            }
            TcpOption::Unknown { kind, data: provided } => {
                buffer[0] = kind;
                buffer[1] = length as u8;
                buffer[2..length].copy_from_slice(provided)
            }
        }
        if let TcpOption::EndOfList = self {
            let len = buffer.len();
            &mut buffer[len..]
        } else {
            &mut buffer[length..]
        }
    }
}

/// A high-level representation of a Transmission Control Protocol packet.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Repr {
    /// The source port.
    pub src_port:     u16,
    /// The destination port.
    pub dst_port:     u16,
    /// All flags, the ACK flag is derived from `ack_number` when emitting.
    pub flags:        Flags,
    /// The sequence number.
    pub seq_number:   SeqNumber,
    /// The acknowledgement number if the ACK flag is set.
    pub ack_number:   Option<SeqNumber>,
    /// The advertised window.
    pub window_len:   u16,
    /// Window scale option.
    pub window_scale: Option<u8>,
    /// Maximum segment size option.
    pub max_seg_size: Option<u16>,
    /// Selective acknowledgement permitted option.
    pub sack_permitted: bool,
    /// Selective acknowledgement ranges.
    pub sack_ranges:  [Option<(u32, u32)>; 3],
    /// Timestamp option as `(tsval, tsecr)`.
    pub timestamp:    Option<(u32, u32)>,
    /// Length of the payload following the header.
    pub payload_len:  u16,
}

/// Abstraction for checksum behaviour.
///
/// The checksum requires calculating a pseudo header for the upper layer protocol consisting of
/// src and dst address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checksum {
    /// Always fill the checksum and check if it exists.
    Manual {
        /// Source address of the surrounding datagram.
        src_addr: Ipv4Address,
        /// Destination address of the surrounding datagram.
        dst_addr: Ipv4Address,
    },

    /// Never inspect the checksum.
    ///
    /// This assumes that some layer below has already performed the necessary checks.
    Ignored,
}

impl Repr {
    /// A bare representation without flags, options or payload.
    pub fn new(src_port: u16, dst_port: u16, seq_number: SeqNumber) -> Repr {
        Repr {
            src_port,
            dst_port,
            flags: Flags(0),
            seq_number,
            ack_number: None,
            window_len: 0,
            window_scale: None,
            max_seg_size: None,
            sack_permitted: false,
            sack_ranges: [None; 3],
            timestamp: None,
            payload_len: 0,
        }
    }

    /// Parse a Transmission Control Protocol packet and return a high-level representation.
    pub fn parse<T: AsRef<[u8]>>(packet: &Packet<T>, checksum: Checksum) -> Result<Repr> {
        packet.check_len()?;
        // Source and destination ports must be present.
        if packet.src_port() == 0 { return Err(Error::Malformed) }
        if packet.dst_port() == 0 { return Err(Error::Malformed) }

        // Valid checksum may be expected.
        if let Checksum::Manual { src_addr, dst_addr } = checksum {
            if !packet.verify_checksum(src_addr, dst_addr) {
                return Err(Error::WrongChecksum)
            }
        }

        let flags = packet.flags();
        let ack_number = if flags.ack() {
            Some(packet.ack_number())
        } else {
            None
        };
        // The URG flag and the urgent field is ignored.

        let mut repr = Repr::new(packet.src_port(), packet.dst_port(), packet.seq_number());
        repr.flags = flags;
        repr.ack_number = ack_number;
        repr.window_len = packet.window_len();
        repr.payload_len = packet.payload().len() as u16;

        let mut options = packet.options();
        while !options.is_empty() {
            let (next_options, option) = TcpOption::parse(options)?;
            match option {
                TcpOption::EndOfList => break,
                TcpOption::NoOperation => (),
                TcpOption::MaxSegmentSize(value) =>
                    repr.max_seg_size = Some(value),
                TcpOption::WindowScale(value) => {
                    // RFC 1323: Thus, the shift count must be limited to 14 (which allows windows
                    // of 2**30 = 1 Gbyte). If a Window Scale option is received with a shift.cnt
                    // value exceeding 14, the TCP should log the error but use 14 instead of the
                    // specified value.
                    repr.window_scale = if value > 14 {
                        net_debug!("parsed window scaling factor {} >14, setting to 14", value);
                        Some(14)
                    } else {
                        Some(value)
                    };
                },
                TcpOption::SackPermitted =>
                    repr.sack_permitted = true,
                TcpOption::SackRange(slice) =>
                    repr.sack_ranges = slice,
                TcpOption::Timestamp { tsval, tsecr } =>
                    repr.timestamp = Some((tsval, tsecr)),
                TcpOption::Unknown { .. } => (),
            }
            options = next_options;
        }

        Ok(repr)
    }

    fn has_sack_ranges(&self) -> bool {
        !self.sack_permitted
            && self.ack_number.is_some()
            && self.sack_ranges.iter().any(|s| s.is_some())
    }

    /// Return the length of a header that will be emitted from this high-level representation.
    ///
    /// This should be used for buffer space calculations.
    /// The TCP header length is a multiple of 4.
    pub fn header_len(&self) -> usize {
        let mut length = field::URGENT.end;
        if self.max_seg_size.is_some() {
            length += 4
        }
        if self.sack_permitted {
            length += 2;
        }
        if self.timestamp.is_some() {
            length += 10;
        }
        if self.window_scale.is_some() {
            // Preceded by a no-op to keep the layout of common stacks.
            length += 1 + 3;
        }
        if self.has_sack_ranges() {
            let ranges = self.sack_ranges.iter().filter(|s| s.is_some()).count();
            length += 2 + 8 * ranges;
        }
        if length % 4 != 0 {
            length += 4 - length % 4;
        }
        length
    }

    /// Return the length of a packet that will be emitted from this high-level representation.
    pub fn buffer_len(&self) -> usize {
        self.header_len() + usize::from(self.payload_len)
    }

    /// Emit a high-level representation into a Transmission Control Protocol packet.
    ///
    /// Does not touch the payload nor compute the checksum.
    pub fn emit<T>(&self, packet: &mut Packet<T>)
        where T: AsRef<[u8]> + AsMut<[u8]>
    {
        packet.set_src_port(self.src_port);
        packet.set_dst_port(self.dst_port);
        packet.set_seq_number(self.seq_number);
        packet.set_ack_number(self.ack_number.unwrap_or(SeqNumber(0)));
        packet.set_window_len(self.window_len);
        packet.set_header_len(self.header_len() as u8);
        let mut flags = self.flags;
        flags.set_ack(self.ack_number.is_some());
        packet.set_flags(flags);
        {
            let mut options = packet.options_mut();
            if let Some(value) = self.max_seg_size {
                let tmp = options; options = TcpOption::MaxSegmentSize(value).emit(tmp);
            }
            if self.sack_permitted {
                let tmp = options; options = TcpOption::SackPermitted.emit(tmp);
            }
            if let Some((tsval, tsecr)) = self.timestamp {
                let tmp = options; options = TcpOption::Timestamp { tsval, tsecr }.emit(tmp);
            }
            if let Some(value) = self.window_scale {
                let tmp = options; options = TcpOption::NoOperation.emit(tmp);
                let tmp = options; options = TcpOption::WindowScale(value).emit(tmp);
            }
            if self.has_sack_ranges() {
                let tmp = options; options = TcpOption::SackRange(self.sack_ranges).emit(tmp);
            }

            if !options.is_empty() {
                TcpOption::EndOfList.emit(options);
            }
        }
        packet.set_urgent_at(0);
    }

    /// Return the length of the segment, in terms of sequence space.
    pub fn sequence_len(&self) -> usize {
        usize::from(self.payload_len) + self.flags.sequence_len()
    }
}

impl fmt::Display for Repr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut flags = self.flags;
        flags.set_ack(self.ack_number.is_some());
        write!(f, "TCP src={} dst={} [{}]",
               self.src_port, self.dst_port, flags)?;
        write!(f, " seq={}", self.seq_number)?;
        if let Some(ack_number) = self.ack_number {
            write!(f, " ack={}", ack_number)?;
        }
        write!(f, " win={}", self.window_len)?;
        write!(f, " len={}", self.payload_len)?;
        if let Some(max_seg_size) = self.max_seg_size {
            write!(f, " mss={}", max_seg_size)?;
        }
        if let Some(window_scale) = self.window_scale {
            write!(f, " ws={}", window_scale)?;
        }
        if self.sack_permitted {
            write!(f, " sACK")?;
        }
        if let Some((tsval, tsecr)) = self.timestamp {
            write!(f, " ts={}/{}", tsval, tsecr)?;
        }
        Ok(())
    }
}

/// An owned TCP segment, the header representation together with its payload.
///
/// This is the unit queued between the dispatch hub, the handshakes, connections and the
/// retransmission buffer. Emitting it needs the addresses of the surrounding IPv4 datagram for
/// the checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// The header, `repr.payload_len` always matches `payload`.
    pub repr: Repr,
    /// The data carried by the segment.
    pub payload: Vec<u8>,
}

impl Segment {
    /// Pair a header with its payload, fixing up the payload length.
    ///
    /// # Panics
    /// This function panics if the payload is longer than what fits a single segment.
    pub fn new(mut repr: Repr, payload: Vec<u8>) -> Segment {
        assert!(payload.len() <= usize::from(u16::max_value()), "payload exceeds a segment");
        repr.payload_len = payload.len() as u16;
        Segment { repr, payload }
    }

    /// Parse a segment from the payload of an IPv4 datagram.
    pub fn parse(bytes: &[u8], checksum: Checksum) -> Result<Segment> {
        let packet = Packet::new_checked(bytes)?;
        let repr = Repr::parse(&packet, checksum)?;
        Ok(Segment {
            repr,
            payload: packet.payload().to_vec(),
        })
    }

    /// Return the length of the segment, in terms of sequence space.
    pub fn sequence_len(&self) -> usize {
        self.repr.sequence_len()
    }

    /// The number of octets needed to emit the segment.
    pub fn buffer_len(&self) -> usize {
        self.repr.buffer_len()
    }

    /// Write the segment with a valid checksum into a buffer of exactly `buffer_len` octets.
    pub fn emit(&self, buffer: &mut [u8], src_addr: Ipv4Address, dst_addr: Ipv4Address) {
        let mut packet = Packet::new_unchecked(buffer);
        self.repr.emit(&mut packet);
        packet.payload_mut().copy_from_slice(&self.payload);
        packet.fill_checksum(src_addr, dst_addr);
    }

    /// Serialize the segment with a valid checksum.
    pub fn to_bytes(&self, src_addr: Ipv4Address, dst_addr: Ipv4Address) -> Vec<u8> {
        let mut bytes = vec![0; self.buffer_len()];
        self.emit(&mut bytes, src_addr, dst_addr);
        bytes
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.repr)
    }
}
