use core::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::wire::{Ipv4Address, TcpFlags, TcpRepr, TcpSegment, TcpSeqNumber};
use super::{Config, Error, Peer, Reject, Result};

/// State enum of the statemachine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum State {
    /// No connection, the initial and the final state.
    Closed,

    /// A listening connection.
    ///
    /// Akin to an open server socket. Turned into SynReceived when a SYN arrives.
    Listen,

    /// An open connection request.
    SynSent,

    /// Connection request we intend to answer, waiting on ack.
    SynReceived,

    /// An open connection.
    Established,

    /// Closed our side of the connection.
    FinWait1,

    /// Closing connection nicely, initiated by us and acknowledged.
    FinWait2,

    /// Closed both sides but we don't know the other knows.
    Closing,

    /// Both sides recognized connection as closed.
    TimeWait,

    /// Other side closed its connection.
    CloseWait,

    /// Connection closed after other side closed its already.
    LastAck,
}

/// The send sequence variables.
///
/// In RFC793 these are referred to as `SND`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SendSequence {
    /// The oldest not yet acknowledged sequence number, `SND.UNA`.
    pub una: TcpSeqNumber,

    /// The next sequence number to use for transmission, `SND.NXT`.
    pub nxt: TcpSeqNumber,

    /// The send window indicated by the receiver, already scaled, `SND.WND`.
    pub wnd: u32,

    /// The urgent pointer, `SND.UP`. Never moved.
    pub up: TcpSeqNumber,

    /// Sequence number of the segment used for the last window update, `SND.WL1`.
    pub wl1: TcpSeqNumber,

    /// Acknowledgment number of the segment used for the last window update, `SND.WL2`.
    pub wl2: TcpSeqNumber,

    /// The initial send sequence number, `ISS`.
    pub iss: TcpSeqNumber,
}

/// The receive sequence variables.
///
/// In RFC793 these are referred to as `RCV`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RecvSequence {
    /// The next expected sequence number, `RCV.NXT`.
    pub nxt: TcpSeqNumber,

    /// The receive window, the free space of the receive buffer, `RCV.WND`.
    pub wnd: u16,

    /// The urgent pointer, `RCV.UP`. Never moved.
    pub up: TcpSeqNumber,

    /// The initial receive sequence number, `IRS`.
    pub irs: TcpSeqNumber,
}

/// A segment together with the address of the remote.
///
/// For outbound segments the address is the destination, for inbound ones the source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Addressed {
    pub(crate) addr: Ipv4Address,
    pub(crate) segment: TcpSegment,
}

/// The outcome of a segment arriving at a control block.
#[derive(Debug, Default)]
pub(crate) struct Signals {
    /// Segments to send in order.
    pub(crate) answers: Vec<Addressed>,
    /// One of the answers consumes sequence space and must be retransmitted until acknowledged.
    pub(crate) track: Option<Addressed>,
    /// The payload of the segment was accepted and must be delivered to the receive buffer.
    pub(crate) deliver: bool,
    /// `SND.UNA` advanced to this value.
    pub(crate) acked: Option<TcpSeqNumber>,
    /// The segment was not accepted.
    pub(crate) reject: Option<Reject>,
    /// The connection reached CLOSED and its port can be released.
    pub(crate) closed: bool,
}

/// The transmission control block of one connection.
///
/// All state transitions of RFC 793 happen in here. The control block never sends anything by
/// itself, every method returns the segments that need to go out.
#[derive(Clone, Debug)]
pub(crate) struct ControlBlock {
    state: State,
    peer: Peer,
    snd: SendSequence,
    rcv: RecvSequence,
    fin_sent: bool,

    /// The shift counts `(send, receive)` if window scaling was negotiated.
    scaling: Option<(u8, u8)>,
    /// The last timestamp value of the remote, to be echoed.
    ts_recent: Option<u32>,
    sack_permitted: bool,

    history: Vec<State>,

    syn_mss: u16,
    syn_window: u16,
    window_scale: u8,
}

impl State {
    /// If the state has seen a SYN from both sides.
    pub fn is_synchronized(self) -> bool {
        match self {
            State::Closed | State::Listen | State::SynSent => false,
            _ => true,
        }
    }

    /// If arriving data is delivered to the receive buffer.
    pub fn can_receive(self) -> bool {
        match self {
            State::Established | State::FinWait1 | State::FinWait2 => true,
            _ => false,
        }
    }

    /// If we may still send data.
    pub fn can_send(self) -> bool {
        match self {
            State::Established | State::CloseWait => true,
            _ => false,
        }
    }
}

impl Default for State {
    fn default() -> Self {
        State::Closed
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            State::Closed => "CLOSED",
            State::Listen => "LISTEN",
            State::SynSent => "SYN-SENT",
            State::SynReceived => "SYN-RECEIVED",
            State::Established => "ESTABLISHED",
            State::FinWait1 => "FIN-WAIT-1",
            State::FinWait2 => "FIN-WAIT-2",
            State::Closing => "CLOSING",
            State::TimeWait => "TIME-WAIT",
            State::CloseWait => "CLOSE-WAIT",
            State::LastAck => "LAST-ACK",
        };
        f.write_str(name)
    }
}

impl Addressed {
    pub(crate) fn repr(&self) -> &TcpRepr {
        &self.segment.repr
    }

    /// The reset answering a segment that has no connection to arrive at.
    ///
    /// Follows the rules for the CLOSED state: if the segment carried an ACK the reset takes its
    /// sequence number from it, otherwise the reset acknowledges the segment. Resets are never
    /// answered, then this returns `None`.
    pub(crate) fn reset_reply(&self) -> Option<Addressed> {
        let segment = self.repr();
        if segment.flags.rst() {
            return None;
        }

        let mut repr = TcpRepr::new(segment.dst_port, segment.src_port, TcpSeqNumber(0));
        repr.flags = TcpFlags::RST;
        match segment.ack_number {
            Some(ack_number) => repr.seq_number = ack_number,
            None => repr.ack_number = Some(segment.seq_number + segment.sequence_len()),
        }

        Some(Addressed {
            addr: self.addr,
            segment: TcpSegment::new(repr, Vec::new()),
        })
    }
}

impl Signals {
    fn reject(reject: Reject) -> Self {
        Signals {
            reject: Some(reject),
            .. Signals::default()
        }
    }

    fn answer(mut self, answer: Option<Addressed>) -> Self {
        self.answers.extend(answer);
        self
    }
}

impl ControlBlock {
    /// A closed control block for the peer.
    pub(crate) fn new(peer: Peer, config: &Config) -> Self {
        ControlBlock {
            state: State::Closed,
            peer,
            snd: SendSequence::default(),
            rcv: RecvSequence {
                wnd: config.recv_buffer,
                .. RecvSequence::default()
            },
            fin_sent: false,
            scaling: None,
            ts_recent: None,
            sack_permitted: false,
            history: vec![State::Closed],
            syn_mss: config.syn_mss,
            syn_window: config.syn_window,
            window_scale: config.window_scale,
        }
    }

    pub(crate) fn state(&self) -> State {
        self.state
    }

    pub(crate) fn peer(&self) -> Peer {
        self.peer
    }

    pub(crate) fn send_sequence(&self) -> SendSequence {
        self.snd
    }

    pub(crate) fn recv_sequence(&self) -> RecvSequence {
        self.rcv
    }

    pub(crate) fn history(&self) -> &[State] {
        &self.history
    }

    pub(crate) fn set_window(&mut self, wnd: u16) {
        self.rcv.wnd = wnd;
    }

    pub(crate) fn set_state(&mut self, next: State) {
        if self.state == next {
            return;
        }
        net_debug!("tcp {}: {} -> {}", self.peer.local_port, self.state, next);
        self.state = next;
        self.history.push(next);
    }

    /// Open the connection to the remote of the peer, returning the SYN to send.
    pub(crate) fn active_open(&mut self, iss: TcpSeqNumber) -> Result<Addressed> {
        if self.state != State::Closed {
            return Err(Error::InvalidState(self.state));
        }
        if self.peer.remote_addr.is_none() {
            return Err(Error::InvalidAddress);
        }

        self.snd = SendSequence {
            una: iss,
            nxt: iss + 1,
            up: iss,
            iss,
            .. SendSequence::default()
        };

        let mut repr = TcpRepr::new(self.peer.local_port, self.peer.remote_port, iss);
        repr.flags = TcpFlags::SYN;
        repr.window_len = self.syn_window;
        repr.max_seg_size = Some(self.syn_mss);
        repr.window_scale = Some(self.window_scale);
        repr.sack_permitted = true;
        repr.timestamp = Some((clock(), 0));

        self.set_state(State::SynSent);
        Ok(self.addressed(repr, Vec::new()))
    }

    /// Start waiting for a SYN.
    pub(crate) fn passive_open(&mut self) -> Result<()> {
        if self.state != State::Closed {
            return Err(Error::InvalidState(self.state));
        }
        self.set_state(State::Listen);
        Ok(())
    }

    /// A pure acknowledgment of everything received so far.
    pub(crate) fn ack(&self) -> Addressed {
        let repr = self.header(TcpFlags::default(), self.snd.nxt);
        self.addressed(repr, Vec::new())
    }

    /// A reset the remote will accept, to abort the connection.
    fn reset(&self) -> Addressed {
        let mut repr = TcpRepr::new(self.peer.local_port, self.peer.remote_port, self.snd.nxt);
        repr.flags = TcpFlags::RST;
        self.addressed(repr, Vec::new())
    }

    /// Put the next chunk of data into a segment.
    pub(crate) fn send_data(&mut self, payload: Vec<u8>, push: bool) -> Addressed {
        let flags = if push { TcpFlags::PSH } else { TcpFlags::default() };
        let repr = self.header(flags, self.snd.nxt);
        self.snd.nxt += payload.len();
        self.addressed(repr, payload)
    }

    /// Close our side of the stream.
    pub(crate) fn send_fin(&mut self) -> Addressed {
        let repr = self.header(TcpFlags::FIN, self.snd.nxt);
        self.snd.nxt += 1;
        self.fin_sent = true;
        self.addressed(repr, Vec::new())
    }

    /// Process one segment arriving from the network.
    ///
    /// The `isn` callback is invoked with the adopted peer when a listening control block needs
    /// an initial sequence number.
    pub(crate) fn arrives<F>(&mut self, incoming: &Addressed, isn: F) -> Signals
        where F: FnOnce(&Peer) -> TcpSeqNumber
    {
        let signals = match self.state {
            State::Closed => Signals::reject(Reject::DiscardSegment)
                .answer(incoming.reset_reply()),
            State::Listen => self.arrives_listen(incoming, isn),
            State::SynSent => self.arrives_syn_sent(incoming),
            _ => self.arrives_synchronized(incoming),
        };

        if let Some(reject) = signals.reject {
            net_debug!("tcp {}: {} ({}) {}",
                self.peer.local_port, reject, self.state, incoming.segment);
        }

        signals
    }

    fn arrives_listen<F>(&mut self, incoming: &Addressed, isn: F) -> Signals
        where F: FnOnce(&Peer) -> TcpSeqNumber
    {
        let segment = incoming.repr();
        if segment.flags.rst() {
            return Signals::reject(Reject::DiscardSegment);
        }

        if segment.ack_number.is_some() { // What are you acking? A previous connection.
            return Signals::reject(Reject::DiscardSegment)
                .answer(incoming.reset_reply());
        }

        if !segment.flags.syn() {
            return Signals::reject(Reject::DiscardSegment);
        }

        self.peer.remote_addr = Some(incoming.addr);
        self.peer.remote_port = segment.src_port;
        self.adopt_syn(segment);

        let iss = isn(&self.peer);
        self.snd = SendSequence {
            una: iss,
            nxt: iss + 1,
            up: iss,
            iss,
            wnd: u32::from(segment.window_len),
            wl1: segment.seq_number,
            wl2: iss,
        };

        self.set_state(State::SynReceived);
        Signals {
            answers: vec![self.syn_ack()],
            .. Signals::default()
        }
    }

    fn arrives_syn_sent(&mut self, incoming: &Addressed) -> Signals {
        let segment = incoming.repr();
        if !self.is_peer(incoming) {
            return Signals::reject(Reject::DiscardSegment);
        }

        if let Some(ack) = segment.ack_number {
            if ack <= self.snd.iss || ack > self.snd.nxt {
                return Signals::reject(Reject::HandshakeFailed)
                    .answer(incoming.reset_reply());
            }
        }

        if segment.flags.rst() {
            if segment.ack_number.is_none() {
                return Signals::reject(Reject::DiscardSegment);
            }
            self.set_state(State::Closed);
            return Signals {
                closed: true,
                .. Signals::reject(Reject::ConnectionReset)
            };
        }

        if !segment.flags.syn() {
            if segment.ack_number.is_some() {
                return Signals::reject(Reject::HandshakeFailed)
                    .answer(incoming.reset_reply());
            }
            return Signals::reject(Reject::DiscardSegment);
        }

        self.adopt_syn(segment);
        self.snd.wnd = u32::from(segment.window_len);
        self.snd.wl1 = segment.seq_number;

        match segment.ack_number {
            Some(ack) => {
                self.snd.una = ack;
                self.snd.wl2 = ack;
                self.set_state(State::Established);
                Signals {
                    answers: vec![self.ack()],
                    acked: Some(ack),
                    .. Signals::default()
                }
            },
            None => {
                // Simultaneous open, both SYNs crossed.
                self.snd.wl2 = self.snd.iss;
                self.set_state(State::SynReceived);
                Signals {
                    answers: vec![self.syn_ack()],
                    .. Signals::default()
                }
            },
        }
    }

    fn arrives_synchronized(&mut self, incoming: &Addressed) -> Signals {
        let segment = incoming.repr();
        if !self.is_peer(incoming) {
            return Signals::reject(Reject::DiscardSegment);
        }

        if self.state == State::SynReceived
            && segment.flags.syn()
            && segment.seq_number == self.rcv.irs
        {
            return self.arrives_repeated_syn(incoming);
        }

        // Only the very next segment is acceptable, there is no reassembly.
        let has_text = segment.payload_len > 0;
        if segment.seq_number != self.rcv.nxt || (has_text && self.rcv.wnd == 0) {
            let mut signals = Signals::reject(Reject::SequenceMismatch);
            if segment.sequence_len() > 0 && !segment.flags.rst() {
                signals.answers.push(self.ack());
            }
            return signals;
        }

        if segment.flags.rst() {
            self.set_state(State::Closed);
            return Signals {
                closed: true,
                .. Signals::reject(Reject::ConnectionReset)
            };
        }

        // Security and precedence are not implemented.

        if segment.flags.syn() {
            let reset = self.reset();
            self.set_state(State::Closed);
            return Signals {
                answers: vec![reset],
                closed: true,
                .. Signals::reject(Reject::ConnectionReset)
            };
        }

        let ack = match segment.ack_number {
            Some(ack) => ack,
            None => return Signals::reject(Reject::AckNotSet),
        };

        let mut signals = Signals::default();
        if self.state == State::SynReceived {
            if self.snd.una <= ack && ack <= self.snd.nxt {
                self.set_state(State::Established);
            } else {
                return Signals::reject(Reject::HandshakeFailed)
                    .answer(incoming.reset_reply());
            }
        }

        if self.snd.una < ack && ack <= self.snd.nxt {
            self.snd.una = ack;
            signals.acked = Some(ack);
        } else if ack > self.snd.nxt {
            signals.answers.push(self.ack());
            signals.reject = Some(Reject::DiscardSegment);
            return signals;
        }

        if self.snd.una <= ack
            && (self.snd.wl1 < segment.seq_number
                || (self.snd.wl1 == segment.seq_number && self.snd.wl2 <= ack))
        {
            let shift = self.scaling.map_or(0, |(send, _)| send);
            self.snd.wnd = u32::from(segment.window_len) << shift;
            self.snd.wl1 = segment.seq_number;
            self.snd.wl2 = ack;
        }

        let fin_acked = self.fin_sent && ack == self.snd.nxt;
        match self.state {
            State::FinWait1 if fin_acked => self.set_state(State::FinWait2),
            State::Closing if fin_acked => self.set_state(State::TimeWait),
            State::LastAck if fin_acked => {
                self.set_state(State::Closed);
                signals.closed = true;
                return signals;
            },
            _ => (),
        }

        // The urgent pointer is ignored.

        let mut ack_needed = false;
        if has_text && self.state.can_receive() {
            self.rcv.nxt += usize::from(segment.payload_len);
            self.rcv.wnd = self.rcv.wnd.saturating_sub(segment.payload_len);
            signals.deliver = true;
            ack_needed = true;
        }

        if segment.flags.fin() {
            self.rcv.nxt += 1;
            ack_needed = true;
            match self.state {
                State::SynReceived | State::Established => {
                    self.set_state(State::CloseWait);
                    signals.answers.push(self.ack());
                    ack_needed = false;

                    let fin = self.send_fin();
                    self.set_state(State::LastAck);
                    signals.track = Some(fin.clone());
                    signals.answers.push(fin);
                },
                State::FinWait1 => self.set_state(State::Closing),
                State::FinWait2 => self.set_state(State::TimeWait),
                _ => (),
            }
        }

        if ack_needed {
            signals.answers.push(self.ack());
        }

        signals
    }

    /// The SYN of the remote arrived again while we wait for the ACK of ours.
    ///
    /// Either the remote retransmitted its SYN or, in a simultaneous open, this is its SYN|ACK.
    fn arrives_repeated_syn(&mut self, incoming: &Addressed) -> Signals {
        let segment = incoming.repr();
        match segment.ack_number {
            None => Signals {
                answers: vec![self.syn_ack()],
                .. Signals::reject(Reject::DiscardSegment)
            },
            Some(ack) if self.snd.una <= ack && ack <= self.snd.nxt => {
                self.snd.una = ack;
                self.snd.wl2 = ack;
                self.set_state(State::Established);
                Signals {
                    acked: Some(ack),
                    .. Signals::default()
                }
            },
            Some(_) => Signals::reject(Reject::HandshakeFailed)
                .answer(incoming.reset_reply()),
        }
    }

    fn is_peer(&self, incoming: &Addressed) -> bool {
        self.peer.remote_addr == Some(incoming.addr)
            && self.peer.remote_port == incoming.repr().src_port
    }

    fn adopt_syn(&mut self, segment: &TcpRepr) {
        self.rcv.irs = segment.seq_number;
        self.rcv.nxt = segment.seq_number + 1;
        self.rcv.up = segment.seq_number;
        self.scaling = segment.window_scale.map(|send| (send, self.window_scale));
        self.ts_recent = segment.timestamp.map(|(tsval, _)| tsval);
        self.sack_permitted = segment.sack_permitted;
    }

    fn syn_ack(&self) -> Addressed {
        let mut repr = self.header(TcpFlags::SYN, self.snd.iss);
        repr.window_len = self.syn_window;
        repr.max_seg_size = Some(self.syn_mss);
        repr.window_scale = self.scaling.map(|(_, recv)| recv);
        repr.sack_permitted = self.sack_permitted;
        repr.timestamp = self.ts_recent.map(|tsecr| (clock(), tsecr));
        self.addressed(repr, Vec::new())
    }

    /// The header of a synchronized segment, acknowledging `RCV.NXT`.
    fn header(&self, flags: TcpFlags, seq_number: TcpSeqNumber) -> TcpRepr {
        let mut repr = TcpRepr::new(self.peer.local_port, self.peer.remote_port, seq_number);
        repr.flags = flags;
        repr.ack_number = Some(self.rcv.nxt);
        let shift = self.scaling.map_or(0, |(_, recv)| recv);
        repr.window_len = self.rcv.wnd >> shift;
        repr
    }

    fn addressed(&self, repr: TcpRepr, payload: Vec<u8>) -> Addressed {
        Addressed {
            addr: self.peer.remote_addr.unwrap_or(Ipv4Address::UNSPECIFIED),
            segment: TcpSegment::new(repr, payload),
        }
    }
}

/// The value of our timestamp clock, in milliseconds.
fn clock() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|since| since.as_millis() as u32)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLIENT: Ipv4Address = Ipv4Address([10, 0, 0, 1]);
    const SERVER: Ipv4Address = Ipv4Address([10, 0, 0, 2]);
    const CLIENT_ISS: TcpSeqNumber = TcpSeqNumber(1000);
    const SERVER_ISS: TcpSeqNumber = TcpSeqNumber(-5);

    fn pair() -> (ControlBlock, ControlBlock) {
        let config = Config::default();
        let client = ControlBlock::new(Peer {
            local_port: 40000,
            remote_addr: Some(SERVER),
            remote_port: 8080,
        }, &config);
        let server = ControlBlock::new(Peer {
            local_port: 8080,
            remote_addr: None,
            remote_port: 0,
        }, &config);
        (client, server)
    }

    /// The segment as it arrives on the other side.
    fn from(addr: Ipv4Address, segment: &Addressed) -> Addressed {
        Addressed { addr, segment: segment.segment.clone() }
    }

    fn no_isn(_: &Peer) -> TcpSeqNumber {
        panic!("no initial sequence number expected")
    }

    fn establish() -> (ControlBlock, ControlBlock) {
        let (mut client, mut server) = pair();
        server.passive_open().unwrap();

        let syn = client.active_open(CLIENT_ISS).unwrap();
        let signals = server.arrives(&from(CLIENT, &syn), |_| SERVER_ISS);
        assert_eq!(signals.answers.len(), 1);

        let signals = client.arrives(&from(SERVER, &signals.answers[0]), no_isn);
        assert_eq!(signals.answers.len(), 1);

        let signals = server.arrives(&from(CLIENT, &signals.answers[0]), no_isn);
        assert!(signals.reject.is_none());
        assert!(signals.answers.is_empty());

        (client, server)
    }

    #[test]
    fn open_twice() {
        let (mut client, mut server) = pair();
        assert!(client.active_open(CLIENT_ISS).is_ok());
        assert_eq!(client.active_open(CLIENT_ISS), Err(Error::InvalidState(State::SynSent)));
        assert_eq!(client.active_open(CLIENT_ISS), Err(Error::InvalidState(State::SynSent)));

        assert!(server.passive_open().is_ok());
        assert_eq!(server.passive_open(), Err(Error::InvalidState(State::Listen)));
        assert_eq!(server.active_open(SERVER_ISS), Err(Error::InvalidState(State::Listen)));
    }

    #[test]
    fn syn_options() {
        let (mut client, _) = pair();
        let syn = client.active_open(CLIENT_ISS).unwrap();
        let repr = syn.repr();
        assert_eq!(syn.addr, SERVER);
        assert!(repr.flags.syn());
        assert_eq!(repr.ack_number, None);
        assert_eq!(repr.seq_number, CLIENT_ISS);
        assert_eq!(repr.max_seg_size, Some(1460));
        assert_eq!(repr.window_scale, Some(7));
        assert_eq!(repr.window_len, 29200);
        assert!(repr.sack_permitted);
        assert!(repr.timestamp.is_some());
    }

    #[test]
    fn three_way_handshake() {
        let (client, server) = establish();
        assert_eq!(client.state(), State::Established);
        assert_eq!(server.state(), State::Established);
        assert_eq!(server.history(),
            &[State::Closed, State::Listen, State::SynReceived, State::Established]);

        let snd = client.send_sequence();
        assert_eq!(snd.iss, CLIENT_ISS);
        assert_eq!(snd.iss + 1, snd.nxt);
        assert_eq!(snd.una, snd.nxt);

        let rcv = server.recv_sequence();
        assert_eq!(rcv.irs, CLIENT_ISS);
        assert_eq!(rcv.nxt, CLIENT_ISS + 1);
        assert_eq!(server.peer().remote_addr, Some(CLIENT));
        assert_eq!(server.peer().remote_port, 40000);
        assert_eq!(client.recv_sequence().nxt, SERVER_ISS + 1);
    }

    #[test]
    fn syn_ack_echoes_timestamp() {
        let (mut client, mut server) = pair();
        server.passive_open().unwrap();
        let syn = client.active_open(CLIENT_ISS).unwrap();
        let (tsval, _) = syn.repr().timestamp.unwrap();

        let signals = server.arrives(&from(CLIENT, &syn), |_| SERVER_ISS);
        let syn_ack = signals.answers[0].repr();
        assert!(syn_ack.flags.syn());
        assert_eq!(syn_ack.ack_number, Some(CLIENT_ISS + 1));
        assert_eq!(syn_ack.timestamp.map(|(_, tsecr)| tsecr), Some(tsval));
        assert!(syn_ack.sack_permitted);
        assert_eq!(syn_ack.window_scale, Some(7));
    }

    #[test]
    fn data_is_acknowledged() {
        let (mut client, mut server) = establish();
        let data = client.send_data(vec![0xab; 100], true);
        assert!(data.repr().flags.psh());
        assert_eq!(client.send_sequence().nxt, CLIENT_ISS + 101);

        let signals = server.arrives(&from(CLIENT, &data), no_isn);
        assert!(signals.deliver);
        assert_eq!(server.recv_sequence().nxt, CLIENT_ISS + 101);
        assert_eq!(server.recv_sequence().wnd, 2900);
        let ack = &signals.answers[0];
        assert_eq!(ack.repr().ack_number, Some(CLIENT_ISS + 101));
        // 2900 in units of 128 octets.
        assert_eq!(ack.repr().window_len, 22);

        let signals = client.arrives(&from(SERVER, ack), no_isn);
        assert_eq!(signals.acked, Some(CLIENT_ISS + 101));
        assert_eq!(client.send_sequence().una, CLIENT_ISS + 101);
        assert_eq!(client.send_sequence().wnd, 22 << 7);
    }

    #[test]
    fn out_of_order_is_rejected() {
        let (mut client, mut server) = establish();
        let _lost = client.send_data(vec![1; 10], false);
        let later = client.send_data(vec![2; 10], true);

        let signals = server.arrives(&from(CLIENT, &later), no_isn);
        assert_eq!(signals.reject, Some(Reject::SequenceMismatch));
        assert!(!signals.deliver);
        assert_eq!(server.recv_sequence().nxt, CLIENT_ISS + 1);
        // A duplicate ack for the missing segment.
        assert_eq!(signals.answers.len(), 1);
        assert_eq!(signals.answers[0].repr().ack_number, Some(CLIENT_ISS + 1));
    }

    #[test]
    fn zero_window_rejects_data() {
        let (mut client, mut server) = establish();
        server.set_window(0);
        let data = client.send_data(vec![1; 10], true);
        let signals = server.arrives(&from(CLIENT, &data), no_isn);
        assert_eq!(signals.reject, Some(Reject::SequenceMismatch));
        assert_eq!(server.recv_sequence().nxt, CLIENT_ISS + 1);
    }

    #[test]
    fn missing_ack() {
        let (mut client, mut server) = establish();
        let mut data = client.send_data(vec![1; 10], true);
        data.segment.repr.ack_number = None;
        let signals = server.arrives(&from(CLIENT, &data), no_isn);
        assert_eq!(signals.reject, Some(Reject::AckNotSet));
    }

    #[test]
    fn window_update_ordering() {
        let (client, mut server) = establish();
        let mut update = client.ack();
        update.segment.repr.window_len = 100;
        server.arrives(&from(CLIENT, &update), no_isn);
        assert_eq!(server.send_sequence().wnd, 100 << 7);
        assert_eq!(server.send_sequence().wl1, CLIENT_ISS + 1);

        // Same WL1 but an older acknowledgment does not update the window.
        let mut stale = update.clone();
        stale.segment.repr.window_len = 1;
        stale.segment.repr.ack_number = Some(SERVER_ISS);
        server.arrives(&from(CLIENT, &stale), no_isn);
        assert_eq!(server.send_sequence().wnd, 100 << 7);
    }

    #[test]
    fn active_close() {
        let (mut client, mut server) = establish();
        let fin = client.send_fin();
        client.set_state(State::FinWait1);

        let signals = server.arrives(&from(CLIENT, &fin), no_isn);
        assert_eq!(server.state(), State::LastAck);
        assert_eq!(signals.answers.len(), 2);
        let (ack, server_fin) = (&signals.answers[0], &signals.answers[1]);
        assert!(!ack.repr().flags.fin());
        assert!(server_fin.repr().flags.fin());
        assert_eq!(signals.track.as_ref(), Some(server_fin));

        client.arrives(&from(SERVER, ack), no_isn);
        assert_eq!(client.state(), State::FinWait2);
        let signals = client.arrives(&from(SERVER, server_fin), no_isn);
        assert_eq!(client.state(), State::TimeWait);
        assert_eq!(signals.answers.len(), 1);

        let signals = server.arrives(&from(CLIENT, &signals.answers[0]), no_isn);
        assert!(signals.closed);
        assert_eq!(server.history(), &[
            State::Closed, State::Listen, State::SynReceived, State::Established,
            State::CloseWait, State::LastAck, State::Closed,
        ]);
        assert_eq!(client.history()[3..],
            [State::FinWait1, State::FinWait2, State::TimeWait]);
    }

    #[test]
    fn simultaneous_close() {
        let (mut client, mut server) = establish();
        let client_fin = client.send_fin();
        client.set_state(State::FinWait1);
        let server_fin = server.send_fin();
        server.set_state(State::FinWait1);

        let to_server = client.arrives(&from(SERVER, &server_fin), no_isn);
        let to_client = server.arrives(&from(CLIENT, &client_fin), no_isn);
        assert_eq!(client.state(), State::Closing);
        assert_eq!(server.state(), State::Closing);

        client.arrives(&from(SERVER, &to_client.answers[0]), no_isn);
        server.arrives(&from(CLIENT, &to_server.answers[0]), no_isn);
        assert_eq!(client.state(), State::TimeWait);
        assert_eq!(server.state(), State::TimeWait);
    }

    #[test]
    fn retransmitted_fin_is_acknowledged_again() {
        let (mut client, mut server) = establish();
        let fin = client.send_fin();
        client.set_state(State::FinWait1);
        server.arrives(&from(CLIENT, &fin), no_isn);

        let signals = server.arrives(&from(CLIENT, &fin), no_isn);
        assert_eq!(signals.reject, Some(Reject::SequenceMismatch));
        assert_eq!(signals.answers[0].repr().ack_number, Some(CLIENT_ISS + 2));
    }

    #[test]
    fn reset_aborts() {
        let (client, mut server) = establish();
        let mut rst = client.ack();
        rst.segment.repr.flags = TcpFlags::RST;
        let signals = server.arrives(&from(CLIENT, &rst), no_isn);
        assert_eq!(signals.reject, Some(Reject::ConnectionReset));
        assert!(signals.closed);
        assert!(signals.answers.is_empty());
        assert_eq!(server.state(), State::Closed);
    }

    #[test]
    fn syn_in_window_aborts() {
        let (mut client, mut server) = pair();
        server.passive_open().unwrap();
        let syn = client.active_open(CLIENT_ISS).unwrap();
        server.arrives(&from(CLIENT, &syn), |_| SERVER_ISS);

        let mut again = syn.clone();
        again.segment.repr.seq_number = CLIENT_ISS + 1;
        let signals = server.arrives(&from(CLIENT, &again), no_isn);
        assert_eq!(signals.reject, Some(Reject::ConnectionReset));
        let rst = signals.answers[0].repr();
        assert!(rst.flags.rst());
        assert_eq!(rst.seq_number, SERVER_ISS + 1);
        assert_eq!(server.state(), State::Closed);
    }

    #[test]
    fn listen_resets_acks() {
        let (client, _) = establish();
        let (_, mut fresh) = pair();
        fresh.passive_open().unwrap();

        let stray = from(CLIENT, &client.ack());
        let signals = fresh.arrives(&stray, no_isn);
        assert_eq!(signals.reject, Some(Reject::DiscardSegment));
        let rst = signals.answers[0].repr();
        assert!(rst.flags.rst());
        assert_eq!(rst.ack_number, None);
        assert_eq!(rst.seq_number, stray.repr().ack_number.unwrap());
        assert_eq!(fresh.state(), State::Listen);
    }

    #[test]
    fn closed_resets() {
        let (mut client, mut server) = pair();
        let syn = client.active_open(CLIENT_ISS).unwrap();
        let signals = server.arrives(&from(CLIENT, &syn), no_isn);
        let rst = &signals.answers[0];
        assert_eq!(rst.addr, CLIENT);
        assert_eq!(rst.repr().flags, TcpFlags::RST);
        assert_eq!(rst.repr().seq_number, TcpSeqNumber(0));
        assert_eq!(rst.repr().ack_number, Some(CLIENT_ISS + 1));
        assert_eq!(rst.repr().dst_port, 40000);

        // Resets are never answered.
        let signals = client.arrives(&from(SERVER, rst), no_isn);
        assert_eq!(signals.reject, Some(Reject::ConnectionReset));
        assert!(signals.answers.is_empty());
        assert_eq!(client.state(), State::Closed);
    }

    #[test]
    fn syn_sent_rejects_bad_ack() {
        let (mut client, _) = pair();
        client.active_open(CLIENT_ISS).unwrap();
        let mut bogus = TcpRepr::new(8080, 40000, SERVER_ISS);
        bogus.flags = TcpFlags::SYN;
        bogus.ack_number = Some(CLIENT_ISS + 7);
        let bogus = Addressed { addr: SERVER, segment: TcpSegment::new(bogus, Vec::new()) };

        let signals = client.arrives(&bogus, no_isn);
        assert_eq!(signals.reject, Some(Reject::HandshakeFailed));
        let rst = signals.answers[0].repr();
        assert!(rst.flags.rst());
        assert_eq!(rst.seq_number, CLIENT_ISS + 7);
        assert_eq!(client.state(), State::SynSent);
    }

    #[test]
    fn simultaneous_open() {
        let (mut client, _) = pair();
        let mut other = ControlBlock::new(Peer {
            local_port: 8080,
            remote_addr: Some(CLIENT),
            remote_port: 40000,
        }, &Config::default());

        let syn = client.active_open(CLIENT_ISS).unwrap();
        let other_syn = other.active_open(SERVER_ISS).unwrap();

        let to_other = client.arrives(&from(SERVER, &other_syn), no_isn);
        let to_client = other.arrives(&from(CLIENT, &syn), no_isn);
        assert_eq!(client.state(), State::SynReceived);
        assert_eq!(other.state(), State::SynReceived);

        client.arrives(&from(SERVER, &to_client.answers[0]), no_isn);
        other.arrives(&from(CLIENT, &to_other.answers[0]), no_isn);
        assert_eq!(client.state(), State::Established);
        assert_eq!(other.state(), State::Established);
    }
}
