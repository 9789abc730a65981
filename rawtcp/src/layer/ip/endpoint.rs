use std::io;
use std::sync::atomic::{AtomicU16, Ordering};

use crate::layer::tcp;
use crate::nic::Device;
use crate::wire::{IpProtocol, Ipv4Address, Ipv4Packet, Ipv4Repr, IPV4_HEADER_LEN};
use super::Network;

/// Default time to live of emitted datagrams.
const HOP_LIMIT: u8 = 64;

/// An IPv4 endpoint on top of a single device.
pub struct Endpoint<D: Device> {
    device: D,
    ident: AtomicU16,
    hop_limit: u8,
}

impl<D: Device> Endpoint<D> {
    /// Wrap a device.
    pub fn new(device: D) -> Self {
        Endpoint {
            device,
            ident: AtomicU16::new(0),
            hop_limit: HOP_LIMIT,
        }
    }

    /// Get a reference to the underlying device.
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Read datagrams from the device and dispatch them until the device is closed.
    ///
    /// Returns `Ok` when the device was closed and the error of the device otherwise.
    pub fn receive_loop(&self, tcp: &tcp::Endpoint) -> io::Result<()> {
        let mut buffer = vec![0; 1 << 16];
        loop {
            let len = match self.device.recv(&mut buffer) {
                Ok(len) => len,
                Err(ref err) if err.kind() == io::ErrorKind::BrokenPipe => return Ok(()),
                Err(err) => return Err(err),
            };
            self.receive(tcp, &buffer[..len]);
        }
    }

    /// Process a single received datagram.
    pub fn receive(&self, tcp: &tcp::Endpoint, datagram: &[u8]) {
        let packet = match Ipv4Packet::new_checked(datagram) {
            Ok(packet) => packet,
            Err(err) => {
                net_debug!("ip: dropping datagram: {}", err);
                return;
            },
        };
        let repr = match Ipv4Repr::parse(&packet, true) {
            Ok(repr) => repr,
            Err(err) => {
                net_debug!("ip: dropping datagram: {}", err);
                return;
            },
        };

        let local = self.device.local_addr();
        if repr.dst_addr != local && repr.dst_addr != Ipv4Address::BROADCAST {
            net_trace!("ip: not for us: {}", repr);
            return;
        }

        match repr.protocol {
            IpProtocol::Tcp => {
                if let Err(err) = tcp.handle_inbound(repr.src_addr, packet.payload()) {
                    net_debug!("ip: dropping segment from {}: {}", repr.src_addr, err);
                }
            },
            IpProtocol::Icmp => net_debug!("ip: ignoring icmp from {}", repr.src_addr),
            other => net_trace!("ip: unhandled protocol {} from {}", other, repr.src_addr),
        }
    }
}

impl<D: Device> Network for Endpoint<D> {
    fn local_addr(&self) -> Ipv4Address {
        self.device.local_addr()
    }

    fn send(&self, dst_addr: Ipv4Address, protocol: IpProtocol, payload: &[u8])
        -> io::Result<usize>
    {
        if payload.len() > usize::from(u16::max_value()) - IPV4_HEADER_LEN {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "payload exceeds a datagram"));
        }

        let repr = Ipv4Repr {
            src_addr: self.device.local_addr(),
            dst_addr,
            protocol,
            payload_len: payload.len(),
            hop_limit: self.hop_limit,
        };
        let mut datagram = vec![0; repr.buffer_len() + payload.len()];
        let mut packet = Ipv4Packet::new_unchecked(&mut datagram[..]);
        repr.emit(&mut packet, self.ident.fetch_add(1, Ordering::Relaxed));
        packet.payload_mut().copy_from_slice(payload);

        let sent = self.device.send(&datagram)?;
        Ok(sent.saturating_sub(IPV4_HEADER_LEN))
    }
}
