/*! Low-level packet access and construction.

# An overview over packet representations

The `wire` module deals with the packet *representation*. It provides two levels of
functionality.

 * First, it provides functions to extract fields from sequences of octets, and to insert fields
   into sequences of octets. This happens in the `Packet` structures, e.g. [`Ipv4Packet`] or
   [`TcpPacket`], which wrap any buffer implementing `AsRef<[u8]>`.
 * Second, it provides a compact, high-level representation of header data that can be created from
   parsing and emitted into a sequence of octets. This happens through the `Repr` family of
   structs, e.g. [`Ipv4Repr`] or [`TcpRepr`].

[`Ipv4Packet`]: struct.Ipv4Packet.html
[`TcpPacket`]: struct.TcpPacket.html
[`Ipv4Repr`]: struct.Ipv4Repr.html
[`TcpRepr`]: struct.TcpRepr.html

The TCP engine does not keep borrowed packets around. Segments cross thread boundaries through
queues and the retransmission buffer, so it works on the owning [`TcpSegment`] which pairs a
representation with its payload bytes.

[`TcpSegment`]: struct.TcpSegment.html

The `Packet` family of data structures guarantees that, if the `Packet::check_len()` method
returned `Ok(())`, then no field accessor or setter method will panic. The `Packet::new_checked`
method is a shorthand for a combination of `Packet::new_unchecked` and `Packet::check_len`. When
parsing untrusted input, it is *necessary* to use the checked method. When emitting output, it is
*incorrect* to use `Packet::new_checked()`; the length check is likely to succeed on a zeroed
buffer, but fail on a buffer filled with data from a previous packet.

In the `Repr` family of data structures, the `Repr::parse()` method never panics and the
`Repr::emit()` method never panics as long as the underlying buffer is at least
`Repr::buffer_len()` octets long.

# Examples

To emit a TCP segment into an octet buffer, and then parse it back:

```rust
use rawtcp::wire::*;

let src_addr = Ipv4Address::new(10, 0, 0, 1);
let dst_addr = Ipv4Address::new(10, 0, 0, 2);

let mut repr = TcpRepr::new(40000, 8080, TcpSeqNumber(1000));
repr.flags = TcpFlags::SYN;
repr.max_seg_size = Some(1460);
let segment = TcpSegment::new(repr, Vec::new());

let bytes = segment.to_bytes(src_addr, dst_addr);
let parsed = TcpSegment::parse(&bytes, TcpChecksum::Manual { src_addr, dst_addr }).unwrap();
assert_eq!(parsed, segment);
```
*/

mod field {
    pub(crate) type Field = ::core::ops::Range<usize>;
}

mod error;
pub(crate) mod ip;
mod ipv4;
mod tcp;

pub use self::error::{Error, Result};

pub use self::ip::Protocol as IpProtocol;

pub use self::ipv4::{
    Address as Ipv4Address,
    Packet as Ipv4Packet,
    Repr as Ipv4Repr,
    HEADER_LEN as IPV4_HEADER_LEN};

pub use self::tcp::{
    Checksum as TcpChecksum,
    Flags as TcpFlags,
    Packet as TcpPacket,
    Repr as TcpRepr,
    Segment as TcpSegment,
    SeqNumber as TcpSeqNumber,
    TcpOption,
    HEADER_LEN as TCP_HEADER_LEN};
