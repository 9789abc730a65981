// Copyright (C) 2016 whitequark@whitequark.org
// Copyright (C) 2019 Andreas Molzer <andreas.molzer@tum.de>
//
// in large parts from `smoltcp` originally distributed under 0-clause BSD
use std::io;
use std::os::unix::io::{RawFd, AsRawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::{wait, Errno, FdResult, IoLenResult, LibcResult, ifreq};

use crate::nic::Device;
use crate::wire::Ipv4Address;

mod tun_traits {
    #[cfg(target_os = "linux")]
    pub(crate) use super::super::linux::TunSetIf;
    #[cfg(target_os = "linux")]
    pub(crate) use super::super::linux::NetdeviceMtu;

    // for other OS's, other traits might be used instead.
}

use tun_traits::{NetdeviceMtu, TunSetIf};

/// A static descriptor for interacting with a tun interface.
///
/// Contains the file descriptor and a pre-filled `ifreq` structure with the interface name that is
/// required for `ioctl` calls. This offers the raw methods for reading and writing but does not
/// encapsulate an actual `nic::Device`. Wrap it in a [`TunInterface`] with an address for this.
///
/// [`TunInterface`]: struct.TunInterface.html
#[derive(Debug)]
pub struct TunInterfaceDesc {
    lower: libc::c_int,
    ifreq: ifreq
}

/// A tun interface carrying IPv4 datagrams without any link layer, usable as a network device.
///
/// The interface itself must be brought up and routed by the host, e.g. with `ip link set tun0
/// up` and `ip route add 10.0.0.0/24 dev tun0`. The address given here is the one this stack
/// answers to, it must not be the address the host assigned to its side of the interface.
#[derive(Debug)]
pub struct TunInterface {
    inner: TunInterfaceDesc,
    address: Ipv4Address,
    closed: AtomicBool,
}

/// How often a blocked receiver looks for a close.
const POLL: Duration = Duration::from_millis(100);

impl AsRawFd for TunInterfaceDesc {
    fn as_raw_fd(&self) -> RawFd {
        self.lower
    }
}

impl AsRawFd for TunInterface {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }
}

static TUN_PATH: &[u8] = b"/dev/net/tun\0";

impl TunInterfaceDesc {
    /// Try to open a socket for the named interface.
    ///
    /// Note that this does *not* yet set the interface for the file descriptor, it only creates
    /// the necessary structures involved in doing so. Call [`attach_interface`] afterwards.
    ///
    /// [`attach_interface`]: #method.attach_interface
    pub fn new(name: &str) -> Result<TunInterfaceDesc, Errno> {
        let lower = unsafe {
            libc::open(
                TUN_PATH.as_ptr() as *const libc::c_char,
                libc::O_RDWR | libc::O_NONBLOCK)
        };

        FdResult(lower).errno()?;

        Ok(TunInterfaceDesc {
            lower,
            ifreq: ifreq::new(name),
        })
    }

    /// Update the file descriptor to the named interface.
    ///
    /// See `ioctl` with `TUNSETIFF` for details on errors.
    pub fn attach_interface(&mut self) -> Result<(), Errno> {
        self.ifreq.tun_set_tun(self.lower)
    }

    /// Try to find the mtu of the tun.
    ///
    /// Works by opening an `AF_INET/PROTO_IP` socket and querying the mtu of the interface name.
    pub fn interface_mtu(&mut self) -> Result<usize, Errno> {
        let lower = unsafe {
            libc::socket(libc::AF_INET, libc::SOCK_DGRAM, libc::IPPROTO_IP)
        };

        FdResult(lower).errno()?;

        let mtu = self.ifreq.get_mtu(lower)
            .map(|mtu| mtu as usize);

        unsafe { libc::close(lower); }

        mtu
    }

    /// Receive a single datagram on the tun into the buffer.
    pub fn recv(&self, buffer: &mut [u8]) -> Result<usize, Errno> {
        let len = unsafe {
            libc::read(
                self.lower,
                buffer.as_mut_ptr() as *mut libc::c_void,
                buffer.len())
        };
        IoLenResult(len).errno()?;
        Ok(len as usize)
    }

    /// Send a single datagram onto the tun from the buffer.
    pub fn send(&self, buffer: &[u8]) -> Result<usize, Errno> {
        let len = unsafe {
            libc::write(
                self.lower,
                buffer.as_ptr() as *const libc::c_void,
                buffer.len())
        };
        IoLenResult(len).errno()?;
        Ok(len as usize)
    }
}

impl Drop for TunInterfaceDesc {
    fn drop(&mut self) {
        unsafe { libc::close(self.lower); }
    }
}

impl TunInterface {
    /// Open a tun interface by name, answering to the given address.
    pub fn new(name: &str, address: Ipv4Address) -> Result<Self, Errno> {
        let inner = TunInterfaceDesc::new(name)?;
        Self::with_descriptor(inner, address)
    }

    /// Wrap an existing descriptor into a device.
    pub fn with_descriptor(
        mut inner: TunInterfaceDesc,
        address: Ipv4Address,
    ) -> Result<Self, Errno> {
        inner.attach_interface()?;
        Ok(TunInterface {
            inner,
            address,
            closed: AtomicBool::new(false),
        })
    }

    /// The mtu configured for the interface.
    pub fn mtu(&mut self) -> Result<usize, Errno> {
        self.inner.interface_mtu()
    }

    fn closed_err() -> io::Error {
        io::Error::new(io::ErrorKind::BrokenPipe, "tun interface closed")
    }
}

impl Device for TunInterface {
    fn send(&self, datagram: &[u8]) -> io::Result<usize> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Self::closed_err());
        }
        Ok(self.inner.send(datagram)?)
    }

    fn recv(&self, buffer: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(Self::closed_err());
            }
            if !wait(self.as_raw_fd(), Some(POLL))? {
                continue;
            }
            match self.inner.recv(buffer) {
                Ok(len) => return Ok(len),
                Err(ref err) if err.0 == libc::EWOULDBLOCK || err.0 == libc::EINTR => continue,
                Err(err) => return Err(err.into()),
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
