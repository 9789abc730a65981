use core::fmt;

/// The error type for parsing of the network stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// An incoming packet could not be parsed because it was shorter than assumed.
    ///
    /// The packet may be shorter than the minimum length specified, a size longer than the actual
    /// payload. For variable length packets, this may be because some of its fields were out of
    /// bounds of the received data.
    Truncated,

    /// An incoming packet had an incorrect checksum and was dropped.
    ///
    /// Checksum checks have a switch to disable them, see `tcp::Config::verify_checksum`.
    WrongChecksum,

    /// An incoming packet could not be recognized and was dropped.
    ///
    /// E.g. an IP packet with a version other than 4, or an address in text form that does not
    /// parse.
    Unrecognized,

    /// An incoming packet was recognized but was self-contradictory.
    ///
    /// Examples: a TCP packet with a header length below 20 octets; a TCP option claiming a length
    /// that does not fit its kind.
    Malformed,

    /// Parsing depends on information derived from a non-implemented feature.
    ///
    /// The prominent example is a fragmented IP datagram, there is no reassembly.
    Unsupported,
}

/// The result type for the networking stack.
pub type Result<T> = core::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Truncated     => write!(f, "truncated packet"),
            Error::WrongChecksum => write!(f, "checksum error"),
            Error::Unrecognized  => write!(f, "unrecognized packet"),
            Error::Unsupported   => write!(f, "unsupported option"),
            Error::Malformed     => write!(f, "malformed packet"),
        }
    }
}

impl std::error::Error for Error {}
