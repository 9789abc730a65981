//! A user-space TCP engine for raw IPv4 devices.
//!
//! ## Table of contents
//!
//! 1. [Design](#design)
//! 2. [The wire module](wire/index.html)
//! 3. [The layers](layer/index.html)
//!    1. [Ip V4](layer/ip/index.html)
//!    1. [Tcp](layer/tcp/index.html)
//! 4. [Network interfaces](nic/index.html)
//!
//! ## Design
//!
//! The stack owns the packets of a device below the host network stack and reimplements IPv4 and
//! TCP on top of it. The interesting part is the TCP engine: the per-connection state machine
//! after RFC 793, both handshakes, segmentation of outgoing data, a fixed-timeout retransmission
//! scheme and the dispatch hub routing each inbound segment to the right connection, listener or
//! dialer by its local port.
//!
//! Unlike an event-loop stack every blocking socket operation runs on the caller's thread. The
//! engine itself runs one sender thread draining the outbound queue and one retransmission thread
//! per established connection. Inbound traffic is pushed into the engine by whoever reads the
//! device, usually the [`ip::Endpoint::receive_loop`].
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//! use std::thread;
//! use rawtcp::layer::{ip, tcp};
//! use rawtcp::nic::TunInterface;
//!
//! let device = TunInterface::new("tun0", "10.0.0.2".parse()?)?;
//! let ip = Arc::new(ip::Endpoint::new(device));
//! let tcp = tcp::Endpoint::new(ip.clone(), tcp::Config::default());
//!
//! let inbound = tcp.clone();
//! thread::spawn(move || ip.receive_loop(&inbound));
//!
//! let mut listener = tcp.listen("0.0.0.0", 8080)?;
//! let connection = listener.accept()?;
//! let mut buffer = [0; 1024];
//! let len = connection.read(&mut buffer)?;
//! connection.write(&buffer[..len])?;
//! connection.close()?;
//! # Ok(()) }
//! ```
//!
//! [`ip::Endpoint::receive_loop`]: layer/ip/struct.Endpoint.html#method.receive_loop
#![warn(missing_docs)]
#![warn(unreachable_pub)]

#[macro_use] mod macros;
pub mod layer;
pub mod nic;
pub mod wire;
