use core::fmt;

enum_with_unknown! {
    /// IP datagram encapsulated protocol.
    pub enum Protocol(u8) {
        /// Internet control message protocol.
        Icmp = 0x01,
        /// Transmission control protocol.
        Tcp = 0x06,
        /// User datagram protocol.
        Udp = 0x11,
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Protocol::Icmp => write!(f, "ICMP"),
            Protocol::Tcp => write!(f, "TCP"),
            Protocol::Udp => write!(f, "UDP"),
            Protocol::Unknown(id) => write!(f, "0x{:02x}", id),
        }
    }
}

pub(crate) mod checksum {
    use byteorder::{ByteOrder, NetworkEndian};

    use super::Protocol;
    use crate::wire::Ipv4Address;

    fn propagate_carries(word: u32) -> u16 {
        let sum = (word >> 16) + (word & 0xffff);
        ((sum >> 16) as u16) + (sum as u16)
    }

    /// Compute an RFC 1071 compliant checksum (without the final complement).
    pub(crate) fn data(mut data: &[u8]) -> u16 {
        let mut accum = 0;

        // For each 32-byte chunk...
        const CHUNK_SIZE: usize = 32;
        while data.len() >= CHUNK_SIZE {
            let mut d = &data[..CHUNK_SIZE];
            // ... take by 2 bytes and sum them.
            while d.len() >= 2 {
                accum += NetworkEndian::read_u16(d) as u32;
                d = &d[2..];
            }

            data = &data[CHUNK_SIZE..];
        }

        // Sum the rest that does not fit the last 32-byte chunk,
        // taking by 2 bytes.
        while data.len() >= 2 {
            accum += NetworkEndian::read_u16(data) as u32;
            data = &data[2..];
        }

        // Add the last remaining odd byte, if any.
        if let Some(&value) = data.first() {
            accum += (value as u32) << 8;
        }

        propagate_carries(accum)
    }

    /// Combine several RFC 1071 compliant checksums.
    pub(crate) fn combine(checksums: &[u16]) -> u16 {
        let mut accum: u32 = 0;
        for &word in checksums {
            accum += word as u32;
        }
        propagate_carries(accum)
    }

    /// Compute the IPv4 pseudo header checksum.
    ///
    /// The pseudo header is the source address, destination address, a zero octet, the protocol
    /// number and the length of the upper layer packet.
    pub(crate) fn pseudo_header(
        src_addr: &Ipv4Address,
        dst_addr: &Ipv4Address,
        protocol: Protocol,
        length: u32,
    ) -> u16 {
        let mut proto_len = [0u8; 4];
        proto_len[1] = protocol.into();
        NetworkEndian::write_u16(&mut proto_len[2..4], length as u16);

        combine(&[
            data(src_addr.as_bytes()),
            data(dst_addr.as_bytes()),
            data(&proto_len[..])
        ])
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn odd_length_pads_with_zero() {
            assert_eq!(data(&[0x12, 0x34, 0x56]), data(&[0x12, 0x34, 0x56, 0x00]));
        }

        #[test]
        fn carries_wrap_around() {
            // 0xffff + 0x0001 folds back into 0x0001.
            assert_eq!(data(&[0xff, 0xff, 0x00, 0x01]), 0x0001);
            assert_eq!(combine(&[0xffff, 0x0002]), 0x0002);
        }

        #[test]
        fn verify_sums_to_all_ones() {
            let mut bytes = [0x45, 0x00, 0x00, 0x1c, 0xde, 0xad, 0x00, 0x00, 0x40, 0x06];
            let sum = !data(&bytes);
            bytes[6..8].copy_from_slice(&sum.to_be_bytes());
            assert_eq!(data(&bytes), !0);
        }
    }
}
