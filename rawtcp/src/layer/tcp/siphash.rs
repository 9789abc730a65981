//! Initial sequence number generation, as recommended by rfc6528.
//!
//! Uses a keyed cryptographic hash function (SipHash-2-4) instead of appending the secret key to
//! the four tuple for hashing. Hash function SipHash-2-4 from:
//!
//! > SipHash: a fast short-input PRF, Jean-Philippe Aumasson and Daniel J. Bernstein
use std::convert::TryInto;
use std::time::Duration;

use crate::wire::{Ipv4Address, TcpSeqNumber};

/// The addresses and ports identifying one connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FourTuple {
    /// Our address.
    pub local: Ipv4Address,
    /// The address of the other side.
    pub remote: Ipv4Address,
    /// Our port.
    pub local_port: u16,
    /// The port of the other side.
    pub remote_port: u16,
}

/// An initial sequence number generator based on SipHash-2-4.
///
/// Implements most of RFC6528 but with a particular choice of keyed hash function (instead of
/// MD5). Also, instead of hashing the secret as the last parameter the hash function already
/// provides a setup for keyed use that can be precomputed.
///
/// > ISN = M + SipHash-2-4(secretkey, localip, localport, remoteip, remoteport)
///
/// where `M` is a timer ticking every 4 microseconds.
pub struct IsnGenerator {
    keys: (u64, u64),
}

// Yes, that's the initial values, as ASCII text.
const IV: [&[u8; 8]; 4] = [
    b"somepseu",
    b"dorandom",
    b"lygenera",
    b"tedbytes"];

struct State {
    v0: u64,
    v1: u64,
    v2: u64,
    v3: u64,
}

impl IsnGenerator {
    /// Create a generator by deriving a key from the standard `RandomState`.
    ///
    /// This is done by individually hashing the numbers `0u64` and `1u64` each with the same
    /// hasher created from a new instance of `RandomState`. The two output tags are then used as
    /// the internal key state.
    pub fn from_std_hash() -> Self {
        use std::hash::{Hasher, BuildHasher};
        use std::collections::hash_map::RandomState;

        let hash = RandomState::new().build_hasher();
        let x0 = {
            let mut hash = hash.clone();
            hash.write_u64(0);
            hash.finish()
        };
        let x1 = {
            let mut hash = hash.clone();
            hash.write_u64(1);
            hash.finish()
        };

        IsnGenerator {
            keys: (x0, x1),
        }
    }

    /// Create a generator with some pre-defined secret key.
    ///
    /// Really, create the key with some cryptographic random means or derive them from some other
    /// key with a key derivation function.
    pub fn from_secret_key_bytes(bytes: [u8; 16]) -> Self {
        let (a, b) = bytes.split_at(8);
        let a = u64::from_le_bytes(a.try_into().unwrap_or_default());
        let b = u64::from_le_bytes(b.try_into().unwrap_or_default());
        IsnGenerator { keys: (a, b), }
    }

    /// Get the initial sequence number for a connection.
    ///
    /// `elapsed` is the time since some fixed point, usually the creation of the engine. The
    /// value varies every 4µs or when the underlying secret key is updated.
    pub fn get_isn(&self, connection: FourTuple, elapsed: Duration) -> TcpSeqNumber {
        let mut state = State::init(self.keys.0, self.keys.1);

        let m = u64::from(connection.local.to_network_integer())
            | u64::from(connection.remote.to_network_integer()) << 32;
        let p = u64::from(connection.local_port)
            | u64::from(connection.remote_port) << 16
            // Message length = 12
            | 12_u64 << 56;
        state.absorb(m);
        state.absorb(p);
        let hash = state.finalize();

        let ticks = (elapsed.as_micros() / 4) as u32;
        TcpSeqNumber((hash as u32).wrapping_add(ticks) as i32)
    }
}

impl State {
    const SIP_C: usize = 2;
    const SIP_D: usize = 4;

    fn init(k0: u64, k1: u64) -> Self {
        State {
            v0: u64::from_be_bytes(*IV[0]) ^ k0,
            v1: u64::from_be_bytes(*IV[1]) ^ k1,
            v2: u64::from_be_bytes(*IV[2]) ^ k0,
            v3: u64::from_be_bytes(*IV[3]) ^ k1,
        }
    }

    fn round(&mut self) {
        self.v0 = self.v0.wrapping_add(self.v1);
        self.v1 = self.v1.rotate_left(13);
        self.v1 ^= self.v0;
        self.v0 = self.v0.rotate_left(32);
        self.v2 = self.v2.wrapping_add(self.v3);
        self.v3 = self.v3.rotate_left(16);
        self.v3 ^= self.v2;
        self.v0 = self.v0.wrapping_add(self.v3);
        self.v3 = self.v3.rotate_left(21);
        self.v3 ^= self.v0;
        self.v2 = self.v2.wrapping_add(self.v1);
        self.v1 = self.v1.rotate_left(17);
        self.v1 ^= self.v2;
        self.v2 = self.v2.rotate_left(32);
    }

    /// Process a single portion of the message.
    ///
    /// Note that all users need to manually add absorbing the length in the last block.
    fn absorb(&mut self, m: u64) {
        self.v3 ^= m;
        (0..Self::SIP_C).for_each(|_| self.round());
        self.v0 ^= m;
    }

    /// Do the finalization rounds.
    fn finalize(mut self) -> u64 {
        self.v2 ^= 0xff;
        (0..Self::SIP_D).for_each(|_| self.round());
        self.v0 ^ self.v1 ^ self.v2 ^ self.v3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuple(remote_port: u16) -> FourTuple {
        FourTuple {
            local: Ipv4Address::new(10, 0, 0, 1),
            remote: Ipv4Address::new(10, 0, 0, 2),
            local_port: 40000,
            remote_port,
        }
    }

    /// See the paper, Appendix A.
    #[test]
    fn manual_test_vectors() {
        let k0 = u64::from_le_bytes(0x0001020304050607_u64.to_be_bytes());
        let k1 = u64::from_le_bytes(0x08090a0b0c0d0e0f_u64.to_be_bytes());

        let mut state = State::init(k0, k1);
        let m0 = u64::from_le_bytes(0x0001020304050607_u64.to_be_bytes());
        state.absorb(m0);
        let m1 = u64::from_le_bytes(0x08090a0b0c0d0e0f_u64.to_be_bytes());
        state.absorb(m1);

        assert_eq!(state.finalize(), 0xa129ca6149be45e5);
    }

    #[test]
    fn isn_depends_on_tuple_and_time() {
        let isn = IsnGenerator::from_secret_key_bytes([7; 16]);
        let start = isn.get_isn(tuple(80), Duration::from_secs(0));
        assert_eq!(start, isn.get_isn(tuple(80), Duration::from_secs(0)));
        assert_ne!(start, isn.get_isn(tuple(81), Duration::from_secs(0)));
        assert_eq!(isn.get_isn(tuple(80), Duration::from_micros(400)), start + 100);
    }
}
