//! The TCP layer.
//!
//! Offers blocking, socket-like connections on top of an ip layer [`Network`]. The engine is split
//! the same way RFC 793 splits the protocol: a control block per connection holds the state and
//! the sequence variables, everything around it only moves segments and wakes up threads.
//!
//! [`Network`]: ../ip/trait.Network.html
//!
//! ## Structure
//!
//! The [`Endpoint`] is the dispatch hub. It owns the [`PortTable`] and one map from local port to
//! the owner of that port, which is either a listener or a dialer in the middle of a handshake or
//! an established connection. Every inbound segment is routed by its destination port alone, the
//! remote address is not inspected. A segment for a port without owner is dropped silently, no
//! reset is sent by the hub itself.
//!
//! All outbound segments go through a single queue which a sender thread of the endpoint drains,
//! computing the checksum for the pseudo header and handing the bytes to the network. Hence the
//! order in which segments are put on the wire is the order in which they were queued, but
//! writes, closes and retransmissions of one connection are not ordered with respect to each
//! other.
//!
//! [`Endpoint`]: struct.Endpoint.html
//! [`PortTable`]: struct.PortTable.html
//!
//! ## Creating a connection
//!
//! [`Endpoint::dial`] allocates an ephemeral port, sends the SYN and blocks until the handshake
//! completes. On the passive side, [`Endpoint::listen`] reserves a port and
//! [`Listener::accept`] waits for a SYN, answers it and waits for the final ACK. A listener
//! accepts a single connection: its port is handed over to the connection.
//!
//! [`Endpoint::dial`]: struct.Endpoint.html#method.dial
//! [`Endpoint::listen`]: struct.Endpoint.html#method.listen
//! [`Listener::accept`]: struct.Listener.html#method.accept
//!
//! ## Deviations
//!
//! Many simplifications compared to a real stack, in no particular order.
//!
//! Only segments arriving exactly at `RCV.NXT` are accepted. There is no reassembly of out of
//! order segments, those are answered with a duplicate ACK and dropped.
//!
//! There is no congestion control and the send window of the remote is tracked but not respected.
//! Unacknowledged data and FINs are resent after a fixed timeout, without backoff.
//!
//! The receive buffer of a connection has a fixed capacity which is advertised as the window.
//! The segment that fills it is still accepted whole. A remote ignoring the window and overrunning
//! twice the capacity loses the bytes the reader did not take yet.
//!
//! A connection whose handles are all dropped is abandoned. Its port is freed without sending
//! anything to the remote, whose later segments are dropped as if nobody listened.
//!
//! SACK is advertised as permitted in the SYN but SACK blocks of the remote are ignored.
use std::fmt;
use std::io;

use crate::wire;

mod buffer;
mod config;
mod connection;
mod control;
mod endpoint;
mod handshake;
mod port;
mod retransmit;

mod siphash;

pub use config::Config;

pub use connection::Connection;

pub use control::{
    RecvSequence,
    SendSequence,
    State};

pub use endpoint::Endpoint;

pub use handshake::Listener;

pub use port::{
    Peer,
    PortTable};

// publically exposed for initialization.
pub use siphash::{FourTuple, IsnGenerator};

/// Errors of the socket operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// The operation is not permitted in the current state of the connection.
    InvalidState(State),

    /// The remote answered the handshake with something unexpected.
    HandshakeFailed,

    /// The remote reset the connection.
    ConnectionReset,

    /// There is no free port in the ephemeral range.
    PortExhausted,

    /// The port is already bound by another socket.
    PortInUse(u16),

    /// The address was not parseable or is not one of ours.
    InvalidAddress,

    /// The remote did not answer in time.
    Timeout,

    /// The socket was already used up or its endpoint shut down.
    Closed,

    /// An inbound segment could not be parsed or had a wrong checksum.
    Malformed(wire::Error),
}

/// The result type of the TCP layer.
pub type Result<T> = core::result::Result<T, Error>;

/// Why an inbound segment was not accepted.
///
/// These never reach the user directly. A rejected segment is dropped, possibly after queueing an
/// answer, and only the handshakes turn some of them into an `Error`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Reject {
    /// The segment was not useful in the current state.
    DiscardSegment,
    /// The segment reset the connection.
    ConnectionReset,
    /// The segment was not the next one in sequence.
    SequenceMismatch,
    /// A synchronized connection received a segment without ACK.
    AckNotSet,
    /// The segment did not fit into an ongoing handshake.
    HandshakeFailed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::InvalidState(state) => write!(f, "operation invalid in state {}", state),
            Error::HandshakeFailed => write!(f, "handshake failed"),
            Error::ConnectionReset => write!(f, "connection reset by peer"),
            Error::PortExhausted => write!(f, "no free ephemeral port"),
            Error::PortInUse(port) => write!(f, "port {} already in use", port),
            Error::InvalidAddress => write!(f, "invalid address"),
            Error::Timeout => write!(f, "timed out"),
            Error::Closed => write!(f, "socket closed"),
            Error::Malformed(err) => write!(f, "malformed segment: {}", err),
        }
    }
}

impl std::error::Error for Error { }

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        let kind = match err {
            Error::InvalidState(_) => io::ErrorKind::NotConnected,
            Error::HandshakeFailed => io::ErrorKind::ConnectionRefused,
            Error::ConnectionReset => io::ErrorKind::ConnectionReset,
            Error::PortExhausted => io::ErrorKind::AddrNotAvailable,
            Error::PortInUse(_) => io::ErrorKind::AddrInUse,
            Error::InvalidAddress => io::ErrorKind::InvalidInput,
            Error::Timeout => io::ErrorKind::TimedOut,
            Error::Closed => io::ErrorKind::NotConnected,
            Error::Malformed(_) => io::ErrorKind::InvalidData,
        };
        io::Error::new(kind, err)
    }
}

impl fmt::Display for Reject {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let text = match self {
            Reject::DiscardSegment => "discarded",
            Reject::ConnectionReset => "reset",
            Reject::SequenceMismatch => "out of sequence",
            Reject::AckNotSet => "ack not set",
            Reject::HandshakeFailed => "not part of handshake",
        };
        f.write_str(text)
    }
}
