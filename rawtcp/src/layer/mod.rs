//! The process logic of protocol layers.
//!
//! ## Layering
//!
//! Each protocol layer is split into two parts; the packet logic contained in `wire` and the
//! processing part in this module. An endpoint represents the local state of a protocol. This
//! state is used to process packets of that layer.
//!
//! ## Receiving
//!
//! The IP endpoint reads datagrams from a device, checks them and routes the payload to the layer
//! conceptually above it by the protocol number. Only TCP has such an upper layer, everything else
//! is logged and dropped.
//!
//! ## Sending
//!
//! The TCP endpoint does not know about devices. It transmits through the [`ip::Network`] trait,
//! which the IP endpoint implements by prepending a header and writing the datagram to its
//! device. Tests substitute their own implementation to observe or delay traffic.
//!
//! [`ip::Network`]: ip/trait.Network.html
pub mod ip;
pub mod tcp;
