//! The three-way handshakes of active and passive opens.
//!
//! Both sides of a handshake are driven by the thread calling `dial` or `accept`. The endpoint
//! forwards segments for the port into a private queue, the control block consumes them until it
//! is synchronized and the queue is handed over to the new connection.
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Instant;

use crate::wire::Ipv4Address;
use super::connection::Connection;
use super::control::{Addressed, ControlBlock, State};
use super::endpoint::{Owner, Shared};
use super::{Error, Peer, Reject, Result};

/// A reserved port waiting for a connection request.
///
/// A listener accepts a single connection. Its port is then owned by the connection and any
/// further `accept` fails. Dropping a listener before it accepted frees the port.
pub struct Listener {
    shared: Arc<Shared>,
    peer: Peer,
    inbound: Receiver<Addressed>,
    spent: bool,
}

pub(crate) fn dial(shared: &Arc<Shared>, addr: &str, port: u16) -> Result<Connection> {
    let remote: Ipv4Address = addr.parse().map_err(|_| Error::InvalidAddress)?;
    if remote.is_unspecified() || port == 0 {
        return Err(Error::InvalidAddress);
    }

    let peer = shared.ports.add(Some(remote), port)?;
    let (queue, inbound) = mpsc::channel();
    shared.owners().insert(peer.local_port, Owner::Dialer(queue));

    match active_open(shared, peer, &inbound) {
        Ok(tcb) => Ok(Connection::establish(shared, tcb, &inbound)),
        Err(err) => {
            net_debug!("tcp {}: dial {}:{} failed: {}", peer.local_port, remote, port, err);
            shared.release(peer.local_port);
            Err(err)
        },
    }
}

fn active_open(shared: &Shared, peer: Peer, inbound: &Receiver<Addressed>)
    -> Result<ControlBlock>
{
    let mut tcb = ControlBlock::new(peer, &shared.config);
    let syn = tcb.active_open(shared.isn(&peer))?;
    shared.send(syn);
    drive(shared, &mut tcb, inbound)?;
    Ok(tcb)
}

pub(crate) fn listen(shared: &Arc<Shared>, addr: &str, port: u16) -> Result<Listener> {
    let bind: Ipv4Address = addr.parse().map_err(|_| Error::InvalidAddress)?;
    if !(bind.is_unspecified() || bind == shared.local_addr()) || port == 0 {
        return Err(Error::InvalidAddress);
    }

    let peer = shared.ports.bind(port)?;
    let (queue, inbound) = mpsc::channel();
    shared.owners().insert(port, Owner::Listener(queue));
    net_debug!("tcp {}: listening", port);

    Ok(Listener {
        shared: shared.clone(),
        peer,
        inbound,
        spent: false,
    })
}

impl Listener {
    /// Wait for a connection request and complete its handshake.
    ///
    /// Blocks until a SYN arrives, the handshake timeout only starts afterwards. When the
    /// handshake fails the listener is still usable and `accept` can be retried.
    pub fn accept(&mut self) -> Result<Connection> {
        if self.spent {
            return Err(Error::Closed);
        }

        let mut tcb = ControlBlock::new(self.peer, &self.shared.config);
        tcb.passive_open()?;

        match drive(&self.shared, &mut tcb, &self.inbound) {
            Ok(()) => {
                self.shared.ports.update(tcb.peer());
                self.spent = true;
                Ok(Connection::establish(&self.shared, tcb, &self.inbound))
            },
            Err(err) => {
                net_debug!("tcp {}: accept failed: {}", self.peer.local_port, err);
                Err(err)
            },
        }
    }

    /// The port the listener is bound to.
    pub fn local_port(&self) -> u16 {
        self.peer.local_port
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if !self.spent {
            self.shared.release(self.peer.local_port);
        }
    }
}

/// Feed segments from the queue to the control block until it is established.
fn drive(shared: &Shared, tcb: &mut ControlBlock, inbound: &Receiver<Addressed>) -> Result<()> {
    let mut deadline = None;
    while tcb.state() != State::Established {
        if deadline.is_none() && tcb.state() != State::Listen {
            deadline = shared.config.handshake_timeout.map(|timeout| Instant::now() + timeout);
        }

        let incoming = match deadline {
            Some(deadline) => {
                let left = deadline.saturating_duration_since(Instant::now());
                inbound.recv_timeout(left).map_err(|err| match err {
                    RecvTimeoutError::Timeout => Error::Timeout,
                    RecvTimeoutError::Disconnected => Error::Closed,
                })?
            },
            None => inbound.recv().map_err(|_| Error::Closed)?,
        };

        if incoming.repr().dst_port != tcb.peer().local_port {
            if let Some(reset) = incoming.reset_reply() {
                shared.send(reset);
            }
            return Err(Error::HandshakeFailed);
        }

        let signals = tcb.arrives(&incoming, |peer| shared.isn(peer));
        for answer in signals.answers {
            shared.send(answer);
        }

        match signals.reject {
            Some(Reject::HandshakeFailed) => return Err(Error::HandshakeFailed),
            Some(Reject::ConnectionReset) => return Err(Error::ConnectionReset),
            _ => (),
        }
    }

    net_debug!("tcp {}: handshake with {:?} complete",
        tcb.peer().local_port, tcb.peer().remote_addr);
    Ok(())
}
