use std::ops::RangeInclusive;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::wire::Ipv4Address;
use super::{Error, Result};

/// The addressing of one connection, without the local address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Peer {
    /// The local port, unique within one port table.
    pub local_port: u16,
    /// The address of the other side, unknown for a listener before its first SYN.
    pub remote_addr: Option<Ipv4Address>,
    /// The port of the other side, zero while unknown.
    pub remote_port: u16,
}

/// Registry of all local ports in use.
///
/// Entries are kept ordered by local port and there is at most one entry per local port.
/// Ephemeral ports are allocated by a linear scan for the first unused port of the range.
#[derive(Debug)]
pub struct PortTable {
    range: RangeInclusive<u16>,
    entries: RwLock<Vec<Peer>>,
}

impl PortTable {
    /// Create an empty table allocating ephemeral ports from `range`.
    pub fn new(range: RangeInclusive<u16>) -> Self {
        PortTable {
            range,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Allocate an ephemeral port for a connection to the remote.
    pub fn add(&self, remote_addr: Option<Ipv4Address>, remote_port: u16) -> Result<Peer> {
        let mut entries = self.write();
        let local_port = self.range.clone()
            .find(|port| entries.binary_search_by_key(port, |peer| peer.local_port).is_err())
            .ok_or(Error::PortExhausted)?;
        let peer = Peer { local_port, remote_addr, remote_port };
        Self::insert(&mut entries, peer);
        Ok(peer)
    }

    /// Reserve a specific local port, for listening.
    pub fn bind(&self, local_port: u16) -> Result<Peer> {
        let mut entries = self.write();
        let peer = Peer { local_port, remote_addr: None, remote_port: 0 };
        if !Self::insert(&mut entries, peer) {
            return Err(Error::PortInUse(local_port));
        }
        Ok(peer)
    }

    /// Replace the remote of an existing entry.
    ///
    /// Returns `false` if the local port has no entry.
    pub fn update(&self, peer: Peer) -> bool {
        let mut entries = self.write();
        match entries.binary_search_by_key(&peer.local_port, |peer| peer.local_port) {
            Ok(idx) => {
                entries[idx] = peer;
                true
            },
            Err(_) => false,
        }
    }

    /// Free a local port, returning whether it was in use.
    pub fn delete(&self, local_port: u16) -> bool {
        let mut entries = self.write();
        match entries.binary_search_by_key(&local_port, |peer| peer.local_port) {
            Ok(idx) => {
                entries.remove(idx);
                true
            },
            Err(_) => false,
        }
    }

    /// Look up the entry of a local port.
    pub fn get(&self, local_port: u16) -> Option<Peer> {
        let entries = self.read();
        entries.binary_search_by_key(&local_port, |peer| peer.local_port)
            .ok()
            .map(|idx| entries[idx])
    }

    /// The number of ports in use.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Check if no port is in use.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn insert(entries: &mut Vec<Peer>, peer: Peer) -> bool {
        match entries.binary_search_by_key(&peer.local_port, |peer| peer.local_port) {
            Ok(_) => false,
            Err(idx) => {
                entries.insert(idx, peer);
                true
            },
        }
    }

    // A panic while holding the lock can not leave a half-updated vector behind.
    fn read(&self) -> RwLockReadGuard<Vec<Peer>> {
        self.entries.read().unwrap_or_else(|err| err.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<Vec<Peer>> {
        self.entries.write().unwrap_or_else(|err| err.into_inner())
    }
}
