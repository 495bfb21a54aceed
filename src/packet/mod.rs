//! Packet codec.
//!
//! # Frame format
//!
//! Every frame, on the air and on the serial link, starts with the same
//! 10-byte header followed by a variable payload:
//!
//! ```notrust
//! MSB                                                                  LSB
//! +-----+-----+-----+----------+----------+----------+-----+-------------+
//! | net | len | typ | src      | dst      | nxh      | ttl |   payload   |
//! | (1) | (1) | (1) | (2, BE)  | (2, BE)  | (2, BE)  | (1) | (len - 10)  |
//! +-----+-----+-----+----------+----------+----------+-----+-------------+
//! ```
//!
//! `len` counts the whole frame including the header. The in-memory
//! [`Packet`] keeps the frame verbatim in a fixed buffer, so serialization
//! is just a slice of the first `len` bytes, and attaches the receive
//! metadata (`rssi` and link-layer sender) that never travels on the wire.
//!
//! [`Packet`]: struct.Packet.html

pub mod pool;

use crate::link::{NodeAddress, ADDRESS_LENGTH};
use crate::Error;
use byteorder::{BigEndian, ByteOrder};
use core::fmt;

/// Maximum total frame size, header included.
pub const MAX_PACKET_LENGTH: usize = 116;

/// Byte offset of the `net` header field.
pub const NET_INDEX: usize = 0;
/// Byte offset of the `len` header field. The serial framer keys off this.
pub const LEN_INDEX: usize = 1;
/// Byte offset of the `typ` header field.
pub const TYP_INDEX: usize = 2;
/// Byte offset of the source address.
pub const SRC_INDEX: usize = 3;
/// Byte offset of the destination address.
pub const DST_INDEX: usize = 5;
/// Byte offset of the next-hop address.
pub const NXH_INDEX: usize = 7;
/// Byte offset of the `ttl` header field.
pub const TTL_INDEX: usize = 9;

/// Size of the header; equally the byte offset where the payload starts.
pub const PLD_INDEX: usize = 10;

/// Maximum payload size.
pub const MAX_PAYLOAD_LENGTH: usize = MAX_PACKET_LENGTH - PLD_INDEX;

/// Beacon payload: index of the hop count of the advertising node.
pub const BEACON_HOPS_INDEX: usize = 0;
/// Beacon payload: index of the battery sample.
pub const BEACON_BATT_INDEX: usize = 1;
/// Beacon payload: index of the advertised tree version.
pub const BEACON_TREE_VERSION_INDEX: usize = 2;
/// Beacon payload: index of the advertised depth (hops from the sink).
pub const BEACON_DEPTH_INDEX: usize = 3;
/// Beacon payload: index of the beacon variant selector.
pub const BEACON_TYPE_INDEX: usize = 4;

/// Beacon variant carrying tree-maintenance state. Other values are
/// reserved for future beacon variants.
pub const BEACON_T_TREE: u8 = 1;

/// Report payload: index where the neighbor block starts, after the five
/// sensor samples.
pub const REPORT_INIT_INDEX: usize = 5;

/// Open-path payload: index of the window count.
pub const OPEN_PATH_WINDOWS_INDEX: usize = 0;

wire_enum! {
    /// Packet kinds understood by the dispatcher.
    ///
    /// Unknown values are preserved and handled like `Report` (forwarded
    /// toward the sink) so that new controller-side packet kinds traverse
    /// old nodes.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub enum PacketType(u8) {
        Data = 0,
        Beacon = 1,
        Report = 2,
        Request = 3,
        Response = 4,
        OpenPath = 5,
        Config = 6,
        RegProxy = 7,
        WebReq = 8,
    }
}

/// Receive metadata attached to a packet in memory; never serialized.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct PacketInfo {
    /// Received signal strength, larger is better.
    pub rssi: u8,
    /// Link-layer source of the frame (the neighbor it arrived from).
    pub sender: NodeAddress,
}

/// An owned frame plus its receive metadata.
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    buf: [u8; MAX_PACKET_LENGTH],
    /// Out-of-band receive info.
    pub info: PacketInfo,
}

impl Packet {
    /// Creates a zeroed packet with an empty payload (`len == PLD_INDEX`).
    pub fn empty() -> Self {
        let mut p = Packet {
            buf: [0; MAX_PACKET_LENGTH],
            info: PacketInfo::default(),
        };
        p.buf[LEN_INDEX] = PLD_INDEX as u8;
        p
    }

    /// Parses a received frame.
    ///
    /// The frame is copied verbatim. Fails when the embedded `len` is
    /// shorter than the header, exceeds the buffer, or disagrees with the
    /// number of bytes actually received.
    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < PLD_INDEX || bytes.len() > MAX_PACKET_LENGTH {
            return Err(Error::InvalidLength);
        }
        let len = usize::from(bytes[LEN_INDEX]);
        if len < PLD_INDEX || len > bytes.len() {
            return Err(Error::InvalidLength);
        }

        let mut p = Packet::empty();
        p.buf[..len].copy_from_slice(&bytes[..len]);
        Ok(p)
    }

    /// Returns the serialized frame: the first `len` bytes of the buffer.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len()]
    }

    /// Total frame length in bytes, header included.
    pub fn len(&self) -> usize {
        usize::from(self.buf[LEN_INDEX])
    }

    /// Number of payload bytes.
    pub fn payload_len(&self) -> usize {
        self.len() - PLD_INDEX
    }

    pub fn net(&self) -> u8 {
        self.buf[NET_INDEX]
    }

    pub fn set_net(&mut self, net: u8) {
        self.buf[NET_INDEX] = net;
    }

    pub fn typ(&self) -> PacketType {
        PacketType::from(self.buf[TYP_INDEX])
    }

    pub fn set_typ(&mut self, typ: PacketType) {
        self.buf[TYP_INDEX] = typ.into();
    }

    pub fn src(&self) -> NodeAddress {
        NodeAddress::new([self.buf[SRC_INDEX], self.buf[SRC_INDEX + 1]])
    }

    pub fn set_src(&mut self, src: NodeAddress) {
        self.buf[SRC_INDEX..SRC_INDEX + ADDRESS_LENGTH].copy_from_slice(src.raw());
    }

    pub fn dst(&self) -> NodeAddress {
        NodeAddress::new([self.buf[DST_INDEX], self.buf[DST_INDEX + 1]])
    }

    pub fn set_dst(&mut self, dst: NodeAddress) {
        self.buf[DST_INDEX..DST_INDEX + ADDRESS_LENGTH].copy_from_slice(dst.raw());
    }

    pub fn nxh(&self) -> NodeAddress {
        NodeAddress::new([self.buf[NXH_INDEX], self.buf[NXH_INDEX + 1]])
    }

    pub fn set_nxh(&mut self, nxh: NodeAddress) {
        self.buf[NXH_INDEX..NXH_INDEX + ADDRESS_LENGTH].copy_from_slice(nxh.raw());
    }

    pub fn ttl(&self) -> u8 {
        self.buf[TTL_INDEX]
    }

    pub fn set_ttl(&mut self, ttl: u8) {
        self.buf[TTL_INDEX] = ttl;
    }

    /// Decrements the TTL, stopping at zero.
    pub fn decrement_ttl(&mut self) {
        self.buf[TTL_INDEX] = self.buf[TTL_INDEX].saturating_sub(1);
    }

    /// Exchanges the source and destination addresses in place.
    pub fn swap_src_dst(&mut self) {
        let src = self.src();
        self.set_src(self.dst());
        self.set_dst(src);
    }

    /// Reads a payload byte. Indices are relative to the end of the header.
    ///
    /// Returns `None` past the current payload end.
    pub fn payload_at(&self, index: usize) -> Option<u8> {
        if index < self.payload_len() {
            Some(self.buf[PLD_INDEX + index])
        } else {
            None
        }
    }

    /// Writes a payload byte, growing `len` when writing past the current
    /// payload end.
    ///
    /// Fails when the byte would not fit the buffer.
    pub fn set_payload_at(&mut self, index: usize, value: u8) -> Result<(), Error> {
        if index >= MAX_PAYLOAD_LENGTH {
            return Err(Error::Eof);
        }
        self.buf[PLD_INDEX + index] = value;
        if index >= self.payload_len() {
            self.buf[LEN_INDEX] = (PLD_INDEX + index + 1) as u8;
        }
        Ok(())
    }

    /// Returns the payload as a slice.
    pub fn payload(&self) -> &[u8] {
        &self.buf[PLD_INDEX..self.len()]
    }

    /// Extends the frame by `extra` payload bytes (used when a handler has
    /// filled a region through `payload_region_mut`).
    pub fn extend_len(&mut self, extra: usize) -> Result<(), Error> {
        let new_len = self.len() + extra;
        if new_len > MAX_PACKET_LENGTH {
            return Err(Error::Eof);
        }
        self.buf[LEN_INDEX] = new_len as u8;
        Ok(())
    }

    /// Grants mutable access to the payload bytes starting at `index`, up to
    /// the buffer capacity. The frame length is unchanged; callers extend it
    /// afterwards with [`Packet::extend_len`].
    pub fn payload_region_mut(&mut self, index: usize) -> &mut [u8] {
        &mut self.buf[PLD_INDEX + index..]
    }

    /// Reads the byte at an *absolute* frame index (header bytes included),
    /// as used by flow-table windows and `MODIFY` actions.
    pub fn byte_at(&self, index: usize) -> Option<u8> {
        if index < self.len() {
            Some(self.buf[index])
        } else {
            None
        }
    }

    /// Writes the byte at an absolute frame index within the current length.
    pub fn set_byte_at(&mut self, index: usize, value: u8) -> Result<(), Error> {
        if index < self.len() {
            self.buf[index] = value;
            Ok(())
        } else {
            Err(Error::Eof)
        }
    }

    /// Reads a big-endian `u16` at an absolute frame index.
    pub fn u16_at(&self, index: usize) -> Option<u16> {
        if index + 1 < self.len() {
            Some(BigEndian::read_u16(&self.buf[index..index + 2]))
        } else {
            None
        }
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("net", &self.net())
            .field("typ", &self.typ())
            .field("src", &self.src())
            .field("dst", &self.dst())
            .field("nxh", &self.nxh())
            .field("ttl", &self.ttl())
            .field("payload", &crate::utils::HexSlice(self.payload()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> Vec<u8> {
        // net=1, len=13, typ=DATA, src=0.2, dst=0.4, nxh=0.3, ttl=100, payload=[0,7,9]
        vec![1, 13, 0, 0, 2, 0, 4, 0, 3, 100, 0, 7, 9]
    }

    #[test]
    fn parse_serialize_roundtrip() {
        let bytes = frame();
        let p = Packet::parse(&bytes).unwrap();
        assert_eq!(p.as_bytes(), &bytes[..]);
        assert_eq!(p.net(), 1);
        assert_eq!(p.typ(), PacketType::Data);
        assert_eq!(p.src(), NodeAddress::from_u16(2));
        assert_eq!(p.dst(), NodeAddress::from_u16(4));
        assert_eq!(p.nxh(), NodeAddress::from_u16(3));
        assert_eq!(p.ttl(), 100);
        assert_eq!(p.payload(), &[0, 7, 9]);
    }

    #[test]
    fn parse_rejects_bad_lengths() {
        // Truncated header.
        assert_eq!(Packet::parse(&[1, 2, 3]), Err(Error::InvalidLength));

        // `len` smaller than the header.
        let mut bytes = frame();
        bytes[LEN_INDEX] = 9;
        assert_eq!(Packet::parse(&bytes), Err(Error::InvalidLength));

        // `len` claims more bytes than received.
        let mut bytes = frame();
        bytes[LEN_INDEX] = 40;
        assert_eq!(Packet::parse(&bytes), Err(Error::InvalidLength));
    }

    #[test]
    fn parse_ignores_trailing_garbage() {
        let mut bytes = frame();
        bytes.push(0xaa);
        let p = Packet::parse(&bytes).unwrap();
        assert_eq!(p.len(), 13);
        assert_eq!(p.as_bytes(), &bytes[..13]);
    }

    #[test]
    fn payload_write_grows_length() {
        let mut p = Packet::empty();
        assert_eq!(p.payload_len(), 0);
        assert_eq!(p.payload_at(0), None);

        p.set_payload_at(4, 0xee).unwrap();
        assert_eq!(p.payload_len(), 5);
        assert_eq!(p.payload(), &[0, 0, 0, 0, 0xee]);

        // Writing inside the existing payload must not shrink it.
        p.set_payload_at(0, 1).unwrap();
        assert_eq!(p.payload_len(), 5);
    }

    #[test]
    fn payload_write_rejects_overflow() {
        let mut p = Packet::empty();
        assert_eq!(p.set_payload_at(MAX_PAYLOAD_LENGTH, 0), Err(Error::Eof));
    }

    #[test]
    fn absolute_accessors() {
        let p = Packet::parse(&frame()).unwrap();
        assert_eq!(p.byte_at(TTL_INDEX), Some(100));
        assert_eq!(p.u16_at(DST_INDEX), Some(0x0004));
        assert_eq!(p.byte_at(13), None);
        assert_eq!(p.u16_at(12), None);
    }

    #[test]
    fn swap_src_dst() {
        let mut p = Packet::parse(&frame()).unwrap();
        p.swap_src_dst();
        assert_eq!(p.src(), NodeAddress::from_u16(4));
        assert_eq!(p.dst(), NodeAddress::from_u16(2));
    }

    #[test]
    fn unknown_type_roundtrips() {
        let t = PacketType::from(42);
        assert_eq!(t, PacketType::Unknown(42));
        assert_eq!(u8::from(t), 42);
    }
}
