use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Instant;

use crate::layer::ip::Network;
use crate::wire::{IpProtocol, Ipv4Address, TcpChecksum, TcpSegment, TcpSeqNumber};

use super::connection::{Connection, Inner};
use super::control::Addressed;
use super::handshake::{self, Listener};
use super::siphash::{FourTuple, IsnGenerator};
use super::{Config, Error, Peer, PortTable, Result};

/// The TCP endpoint, routing segments between the network and all sockets.
///
/// Cloning the endpoint is cheap, all clones refer to the same ports and sockets.
#[derive(Clone)]
pub struct Endpoint {
    shared: Arc<Shared>,
}

/// The user of a local port.
pub(crate) enum Owner {
    /// A listener, possibly in the middle of a handshake.
    Listener(Sender<Addressed>),
    /// A dialer waiting for the SYN|ACK.
    Dialer(Sender<Addressed>),
    /// An established connection, owned by its handles.
    Connection(Weak<Inner>),
}

/// State shared by the endpoint and all of its sockets.
///
/// Lock order: `owners` before the control block of any connection.
pub(crate) struct Shared {
    pub(crate) config: Config,
    pub(crate) ports: PortTable,
    local: Ipv4Address,
    owners: Mutex<HashMap<u16, Owner>>,
    outbound: Mutex<Sender<Addressed>>,
    isn: IsnGenerator,
    epoch: Instant,
}

impl Endpoint {
    /// Create an endpoint transmitting over the network.
    ///
    /// Spawns the thread which sends all outbound segments. Initial sequence numbers are derived
    /// from a random key.
    pub fn new<N: Network>(network: Arc<N>, config: Config) -> Self {
        Self::with_isn(network, config, IsnGenerator::from_std_hash())
    }

    /// Create an endpoint with a chosen initial sequence number generator.
    pub fn with_isn<N: Network>(network: Arc<N>, config: Config, isn: IsnGenerator) -> Self {
        let local = network.local_addr();
        let (outbound, queue) = mpsc::channel();
        thread::spawn(move || send_loop(network, local, queue));

        Endpoint {
            shared: Arc::new(Shared {
                ports: PortTable::new(config.ephemeral_ports.clone()),
                config,
                local,
                owners: Mutex::new(HashMap::new()),
                outbound: Mutex::new(outbound),
                isn,
                epoch: Instant::now(),
            }),
        }
    }

    /// Dispatch the payload of an inbound IPv4 datagram with protocol TCP.
    ///
    /// Segments for ports without a socket are logged and dropped. A segment that does not parse
    /// or fails the checksum is dropped with an `Error::Malformed`.
    pub fn handle_inbound(&self, src_addr: Ipv4Address, bytes: &[u8]) -> Result<()> {
        let checksum = if self.shared.config.verify_checksum {
            TcpChecksum::Manual { src_addr, dst_addr: self.shared.local }
        } else {
            TcpChecksum::Ignored
        };

        let segment = TcpSegment::parse(bytes, checksum).map_err(Error::Malformed)?;

        net_trace!("tcp: received {} from {}", segment, src_addr);
        let port = segment.repr.dst_port;
        let incoming = Addressed { addr: src_addr, segment };

        let connection = {
            let owners = self.shared.owners();
            match owners.get(&port) {
                Some(Owner::Connection(inner)) => inner.upgrade(),
                Some(Owner::Dialer(queue)) | Some(Owner::Listener(queue)) => {
                    // Only fails if the socket is just being dropped.
                    let _ = queue.send(incoming);
                    return Ok(());
                },
                None => None,
            }
        };

        match connection {
            Some(connection) => connection.handle(incoming),
            None => net_info!("tcp: no socket on port {}, dropping {}", port, incoming.segment),
        }
        Ok(())
    }

    /// Open a connection to a remote, blocking until the handshake completed.
    ///
    /// The address must be an IPv4 address in dotted decimal notation.
    pub fn dial(&self, addr: &str, port: u16) -> Result<Connection> {
        handshake::dial(&self.shared, addr, port)
    }

    /// Reserve a port to accept a connection on.
    ///
    /// The bind address must either be unspecified (`0.0.0.0`) or our own address.
    pub fn listen(&self, addr: &str, port: u16) -> Result<Listener> {
        handshake::listen(&self.shared, addr, port)
    }

    /// The table of all ports in use.
    pub fn ports(&self) -> &PortTable {
        &self.shared.ports
    }

    /// The address of the network below.
    pub fn local_addr(&self) -> Ipv4Address {
        self.shared.local
    }

    /// The configuration of all sockets.
    pub fn config(&self) -> &Config {
        &self.shared.config
    }
}

impl Shared {
    pub(crate) fn local_addr(&self) -> Ipv4Address {
        self.local
    }

    pub(crate) fn owners(&self) -> MutexGuard<HashMap<u16, Owner>> {
        self.owners.lock().unwrap_or_else(|err| err.into_inner())
    }

    /// Queue a segment for transmission.
    pub(crate) fn send(&self, segment: Addressed) {
        let outbound = self.outbound.lock().unwrap_or_else(|err| err.into_inner());
        // The sender thread only stops once all queues are dropped.
        let _ = outbound.send(segment);
    }

    /// Another handle to the outbound queue.
    pub(crate) fn outbound(&self) -> Sender<Addressed> {
        self.outbound.lock().unwrap_or_else(|err| err.into_inner()).clone()
    }

    /// The initial sequence number for a connection with the peer.
    pub(crate) fn isn(&self, peer: &Peer) -> TcpSeqNumber {
        let tuple = FourTuple {
            local: self.local,
            remote: peer.remote_addr.unwrap_or(Ipv4Address::UNSPECIFIED),
            local_port: peer.local_port,
            remote_port: peer.remote_port,
        };
        self.isn.get_isn(tuple, self.epoch.elapsed())
    }

    /// Give up a local port, removing its owner.
    pub(crate) fn release(&self, port: u16) {
        let owner = self.owners().remove(&port);
        let bound = self.ports.delete(port);
        if owner.is_some() || bound {
            net_debug!("tcp {}: released", port);
        }
    }
}

fn send_loop<N: Network>(network: Arc<N>, local: Ipv4Address, queue: Receiver<Addressed>) {
    for Addressed { addr, segment } in queue {
        net_trace!("tcp: sending {} to {}", segment, addr);
        let bytes = segment.to_bytes(local, addr);
        if let Err(err) = network.send(addr, IpProtocol::Tcp, &bytes) {
            net_warn!("tcp: dropping segment to {}: {}", addr, err);
        }
    }
}
