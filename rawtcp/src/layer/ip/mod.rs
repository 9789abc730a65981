//! The IP layer.
//!
//! Only IPv4 without options or fragments is supported and there is no routing: every datagram is
//! handed to the single device of the endpoint, which is expected to be an IP-level device such
//! as a tun interface.
//!
//! ## Receiving packets
//!
//! Destination addresses are checked against the address of the device. Datagrams for TCP are
//! forwarded to the TCP endpoint, ICMP and all other protocols are dropped.
//!
//! ## Transmitting packets
//!
//! The upper layer calls [`Network::send`] with a destination and protocol. The source address is
//! always the address of the device.
//!
//! [`Network::send`]: trait.Network.html#tymethod.send
use std::io;

use crate::wire::{IpProtocol, Ipv4Address};

mod endpoint;

pub use endpoint::Endpoint;

/// The network layer as seen from a transport protocol.
pub trait Network: Send + Sync + 'static {
    /// The address used as source of all transmitted datagrams.
    fn local_addr(&self) -> Ipv4Address;

    /// Transmit one payload to the destination, returning the number of payload octets sent.
    fn send(&self, dst_addr: Ipv4Address, protocol: IpProtocol, payload: &[u8])
        -> io::Result<usize>;
}
