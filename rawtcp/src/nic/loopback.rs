//! Implementation of a software loop-back device.
use std::io;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use crate::wire::Ipv4Address;
use super::Device;

/// One end of an in-memory link.
///
/// Whatever is sent into one end of a [`pair`] is received on the other end, in order and without
/// loss. The address of each end is fixed at construction.
///
/// [`pair`]: #method.pair
pub struct Loopback {
    address: Ipv4Address,
    tx: Mutex<Sender<Vec<u8>>>,
    rx: Mutex<Receiver<Vec<u8>>>,
    closed: AtomicBool,
}

/// How often a blocked receiver looks for a close.
const POLL: Duration = Duration::from_millis(50);

impl Loopback {
    /// Create two connected devices.
    pub fn pair(a: Ipv4Address, b: Ipv4Address) -> (Loopback, Loopback) {
        let (a_tx, b_rx) = mpsc::channel();
        let (b_tx, a_rx) = mpsc::channel();
        let end = |address, tx, rx| Loopback {
            address,
            tx: Mutex::new(tx),
            rx: Mutex::new(rx),
            closed: AtomicBool::new(false),
        };
        (end(a, a_tx, a_rx), end(b, b_tx, b_rx))
    }

    fn closed_err() -> io::Error {
        io::Error::new(io::ErrorKind::BrokenPipe, "loopback closed")
    }
}

impl Device for Loopback {
    fn send(&self, datagram: &[u8]) -> io::Result<usize> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Self::closed_err());
        }
        let tx = self.tx.lock().unwrap_or_else(|err| err.into_inner());
        tx.send(datagram.to_vec()).map_err(|_| Self::closed_err())?;
        Ok(datagram.len())
    }

    fn recv(&self, buffer: &mut [u8]) -> io::Result<usize> {
        let rx = self.rx.lock().unwrap_or_else(|err| err.into_inner());
        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(Self::closed_err());
            }
            match rx.recv_timeout(POLL) {
                Ok(datagram) => {
                    let len = datagram.len().min(buffer.len());
                    buffer[..len].copy_from_slice(&datagram[..len]);
                    return Ok(len);
                },
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Err(Self::closed_err()),
            }
        }
    }

    fn local_addr(&self) -> Ipv4Address {
        self.address
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
