//! Encapsulates a network interface card.
//!
//! The stack only needs three things from a device: hand it one IP datagram, receive one IP
//! datagram, and know which address it owns. Both operations take `&self` so that the sender
//! thread of the TCP engine and the receive loop can share one device without a lock.
use std::io;

use crate::wire::Ipv4Address;

pub mod loopback;

#[cfg(feature = "sys")]
#[path="sys/mod.rs"]
mod sys_internal;

pub use self::loopback::Loopback;

#[cfg(feature = "sys")]
pub use self::sys_internal::exports as sys;
#[cfg(all(feature = "sys", target_os = "linux"))]
pub use self::sys_internal::exports::TunInterface;

/// A device moving raw IPv4 datagrams.
pub trait Device: Send + Sync + 'static {
    /// Transmit a single datagram, returning the number of octets written.
    fn send(&self, datagram: &[u8]) -> io::Result<usize>;

    /// Block until a datagram is available and copy it into the buffer.
    ///
    /// Returns an error once the device has been closed, which ends any receive loop.
    fn recv(&self, buffer: &mut [u8]) -> io::Result<usize>;

    /// The address of this interface.
    fn local_addr(&self) -> Ipv4Address;

    /// Stop the device, waking up a blocked `recv`.
    fn close(&self);
}
