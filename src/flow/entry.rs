//! Flow-table entry structures and their wire format.

use crate::bytes::{ByteReader, ByteWriter, FromBytes, ToBytes};
use crate::link::NodeAddress;
use crate::packet::{Packet, DST_INDEX};
use crate::Error;
use byteorder::{BigEndian, ByteOrder};
use core::fmt;
use heapless::Vec;

/// Serialized size of a window: packed op byte plus two 16-bit operands.
pub const WINDOW_SIZE: usize = 5;

/// Maximum number of windows a single entry can hold.
pub const MAX_WINDOWS_PER_ENTRY: usize = 5;

/// Maximum number of actions a single entry can hold.
pub const MAX_ACTIONS_PER_ENTRY: usize = 4;

/// Comparison applied between the two window operands.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Operation {
    Equal = 0,
    NotEqual = 1,
    Greater = 2,
    Less = 3,
    GreaterOrEqual = 4,
    LessOrEqual = 5,
}

impl Operation {
    fn from_bits(bits: u8) -> Result<Self, Error> {
        Ok(match bits {
            0 => Operation::Equal,
            1 => Operation::NotEqual,
            2 => Operation::Greater,
            3 => Operation::Less,
            4 => Operation::GreaterOrEqual,
            5 => Operation::LessOrEqual,
            _ => return Err(Error::InvalidValue),
        })
    }

    fn compare(self, lhs: u16, rhs: u16) -> bool {
        match self {
            Operation::Equal => lhs == rhs,
            Operation::NotEqual => lhs != rhs,
            Operation::Greater => lhs > rhs,
            Operation::Less => lhs < rhs,
            Operation::GreaterOrEqual => lhs >= rhs,
            Operation::LessOrEqual => lhs <= rhs,
        }
    }
}

/// Width of a window operand fetch.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OperandSize {
    /// A single byte.
    Size1 = 0,
    /// Two bytes, merged big-endian.
    Size2 = 1,
}

/// Where a window operand is fetched from.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Location {
    /// No source; resolves to the constant 0.
    Null = 0,
    /// The operand field itself is the value.
    Const = 1,
    /// The operand field is an absolute byte index into the packet.
    Packet = 2,
    /// The operand field is a byte index into the node status registers.
    Status = 3,
}

impl Location {
    fn from_bits(bits: u8) -> Self {
        match bits {
            0 => Location::Null,
            1 => Location::Const,
            2 => Location::Packet,
            _ => Location::Status,
        }
    }
}

/// A single match predicate over a packet and the node status registers.
///
/// On the wire a window occupies [`WINDOW_SIZE`] bytes: a packed op byte
/// (bit 7 operand size, bits 4-6 operation, bits 2-3 lhs location, bits 0-1
/// rhs location) followed by `lhs` and `rhs` as big-endian `u16`.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Window {
    pub operation: Operation,
    pub size: OperandSize,
    pub lhs: u16,
    pub lhs_location: Location,
    pub rhs: u16,
    pub rhs_location: Location,
}

impl Window {
    /// The window installed by open-path learning: destination address
    /// equals `addr`.
    pub fn equals_dst(addr: NodeAddress) -> Self {
        Window {
            operation: Operation::Equal,
            size: OperandSize::Size2,
            lhs: DST_INDEX as u16,
            lhs_location: Location::Packet,
            rhs: addr.as_u16(),
            rhs_location: Location::Const,
        }
    }

    /// A window that is satisfied by every packet (`0 == 0`).
    pub fn always() -> Self {
        Window {
            operation: Operation::Equal,
            size: OperandSize::Size1,
            lhs: 0,
            lhs_location: Location::Null,
            rhs: 0,
            rhs_location: Location::Null,
        }
    }

    fn resolve(&self, field: u16, location: Location, packet: &Packet, status: &[u8]) -> Option<u16> {
        let index = usize::from(field);
        match location {
            Location::Null => Some(0),
            Location::Const => Some(field),
            Location::Packet => match self.size {
                OperandSize::Size1 => packet.byte_at(index).map(u16::from),
                OperandSize::Size2 => packet.u16_at(index),
            },
            Location::Status => match self.size {
                OperandSize::Size1 => status.get(index).copied().map(u16::from),
                OperandSize::Size2 => {
                    if index + 1 < status.len() {
                        Some(BigEndian::read_u16(&status[index..index + 2]))
                    } else {
                        None
                    }
                }
            },
        }
    }

    /// Evaluates the predicate. An operand that cannot be fetched (index out
    /// of bounds) fails the window.
    pub fn evaluate(&self, packet: &Packet, status: &[u8]) -> bool {
        let lhs = self.resolve(self.lhs, self.lhs_location, packet, status);
        let rhs = self.resolve(self.rhs, self.rhs_location, packet, status);
        match (lhs, rhs) {
            (Some(lhs), Some(rhs)) => self.operation.compare(lhs, rhs),
            _ => false,
        }
    }

    fn op_byte(&self) -> u8 {
        ((self.size as u8) << 7)
            | ((self.operation as u8) << 4)
            | ((self.lhs_location as u8) << 2)
            | self.rhs_location as u8
    }
}

impl fmt::Debug for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}@{:?} {:?} {:?}@{:?} ({:?})",
            self.lhs, self.lhs_location, self.operation, self.rhs, self.rhs_location, self.size
        )
    }
}

impl<'a> FromBytes<'a> for Window {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        let op = bytes.read_u8()?;
        let size = if op & 0x80 != 0 {
            OperandSize::Size2
        } else {
            OperandSize::Size1
        };
        let operation = Operation::from_bits((op >> 4) & 0b111)?;
        let lhs_location = Location::from_bits((op >> 2) & 0b11);
        let rhs_location = Location::from_bits(op & 0b11);
        Ok(Window {
            operation,
            size,
            lhs: bytes.read_u16_be()?,
            lhs_location,
            rhs: bytes.read_u16_be()?,
            rhs_location,
        })
    }
}

impl ToBytes for Window {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u8(self.op_byte())?;
        writer.write_u16_be(self.lhs)?;
        writer.write_u16_be(self.rhs)
    }
}

/// One step of an entry's action list.
///
/// On the wire an action is `type(1) | value_len(1) | value…`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Action {
    /// Set the packet's next hop and submit it for unicast transmission.
    ForwardUnicast(NodeAddress),
    /// Submit the packet for broadcast transmission.
    ForwardBroadcast,
    /// Discard the packet.
    Drop,
    /// Overwrite `width` (1 or 2) bytes at the absolute packet index
    /// `offset`, then continue with the next action.
    Modify { offset: u8, width: u8, value: u16 },
    /// Hand the packet to the controller via a `REQUEST` upcall.
    Ask,
    /// Re-enter the matching loop with the (possibly modified) packet.
    Match,
}

const ACTION_FORWARD_U: u8 = 0;
const ACTION_FORWARD_B: u8 = 1;
const ACTION_DROP: u8 = 2;
const ACTION_MODIFY: u8 = 3;
const ACTION_ASK: u8 = 4;
const ACTION_MATCH: u8 = 5;

impl<'a> FromBytes<'a> for Action {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        let typ = bytes.read_u8()?;
        let value_len = usize::from(bytes.read_u8()?);
        let mut value = ByteReader::new(bytes.read_slice(value_len)?);
        Ok(match typ {
            ACTION_FORWARD_U => Action::ForwardUnicast(NodeAddress::from_bytes(&mut value)?),
            ACTION_FORWARD_B => Action::ForwardBroadcast,
            ACTION_DROP => Action::Drop,
            ACTION_MODIFY => Action::Modify {
                offset: value.read_u8()?,
                width: value.read_u8()?,
                value: value.read_u16_be()?,
            },
            ACTION_ASK => Action::Ask,
            ACTION_MATCH => Action::Match,
            _ => return Err(Error::InvalidValue),
        })
    }
}

impl ToBytes for Action {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        match self {
            Action::ForwardUnicast(addr) => {
                writer.write_u8(ACTION_FORWARD_U)?;
                writer.write_u8(2)?;
                addr.to_bytes(writer)
            }
            Action::ForwardBroadcast => {
                writer.write_u8(ACTION_FORWARD_B)?;
                writer.write_u8(0)
            }
            Action::Drop => {
                writer.write_u8(ACTION_DROP)?;
                writer.write_u8(0)
            }
            Action::Modify {
                offset,
                width,
                value,
            } => {
                writer.write_u8(ACTION_MODIFY)?;
                writer.write_u8(4)?;
                writer.write_u8(*offset)?;
                writer.write_u8(*width)?;
                writer.write_u16_be(*value)
            }
            Action::Ask => {
                writer.write_u8(ACTION_ASK)?;
                writer.write_u8(0)
            }
            Action::Match => {
                writer.write_u8(ACTION_MATCH)?;
                writer.write_u8(0)
            }
        }
    }
}

/// Bookkeeping attached to an entry.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct EntryStats {
    /// Remaining lifetime in seconds; the aging pass removes the entry when
    /// it reaches zero.
    pub ttl: u16,
    /// Number of packets this entry has matched.
    pub count: u16,
    /// Boot defaults are permanent: the aging pass skips them.
    pub permanent: bool,
}

/// A flow-table entry: predicates, actions, bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowEntry {
    pub windows: Vec<Window, MAX_WINDOWS_PER_ENTRY>,
    pub actions: Vec<Action, MAX_ACTIONS_PER_ENTRY>,
    pub stats: EntryStats,
}

impl FlowEntry {
    /// Creates an entry with a single window and a single action.
    pub fn with(window: Window, action: Action, ttl: u16) -> Self {
        let mut windows = Vec::new();
        let _ = windows.push(window);
        let mut actions = Vec::new();
        let _ = actions.push(action);
        FlowEntry {
            windows,
            actions,
            stats: EntryStats {
                ttl,
                count: 0,
                permanent: false,
            },
        }
    }

    /// Returns whether every window accepts `packet`.
    pub fn matches(&self, packet: &Packet, status: &[u8]) -> bool {
        self.windows.iter().all(|w| w.evaluate(packet, status))
    }
}

/// Entries travel in `RESPONSE` payloads and `GET_RULE` config reads as
/// `n_windows(1) | windows… | n_actions(1) | actions… | ttl(2 BE)`.
impl<'a> FromBytes<'a> for FlowEntry {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        let n_windows = usize::from(bytes.read_u8()?);
        if n_windows == 0 || n_windows > MAX_WINDOWS_PER_ENTRY {
            return Err(Error::InvalidValue);
        }
        let mut windows = Vec::new();
        for _ in 0..n_windows {
            let _ = windows.push(Window::from_bytes(bytes)?);
        }

        let n_actions = usize::from(bytes.read_u8()?);
        if n_actions == 0 || n_actions > MAX_ACTIONS_PER_ENTRY {
            return Err(Error::InvalidValue);
        }
        let mut actions = Vec::new();
        for _ in 0..n_actions {
            let _ = actions.push(Action::from_bytes(bytes)?);
        }

        let ttl = bytes.read_u16_be()?;
        Ok(FlowEntry {
            windows,
            actions,
            stats: EntryStats {
                ttl,
                count: 0,
                permanent: false,
            },
        })
    }
}

impl ToBytes for FlowEntry {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u8(self.windows.len() as u8)?;
        for w in &self.windows {
            w.to_bytes(writer)?;
        }
        writer.write_u8(self.actions.len() as u8)?;
        for a in &self.actions {
            a.to_bytes(writer)?;
        }
        writer.write_u16_be(self.stats.ttl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketType;

    fn data_packet(dst: NodeAddress) -> Packet {
        let mut p = Packet::empty();
        p.set_typ(PacketType::Data);
        p.set_dst(dst);
        p.set_payload_at(0, 0).unwrap();
        p.set_payload_at(1, 7).unwrap();
        p
    }

    #[test]
    fn window_codec_roundtrip() {
        let w = Window::equals_dst(NodeAddress::from_u16(0x0104));
        let mut buf = [0; WINDOW_SIZE];
        w.to_bytes(&mut ByteWriter::new(&mut buf)).unwrap();
        assert_eq!(buf, [0x80 | 0x08 | 0x01, 0x00, 0x05, 0x01, 0x04]);

        let back = Window::from_bytes(&mut ByteReader::new(&buf)).unwrap();
        assert_eq!(back, w);
    }

    #[test]
    fn window_rejects_bad_operation() {
        // Operation bits set to 7.
        let buf = [0x70, 0, 0, 0, 0];
        assert_eq!(
            Window::from_bytes(&mut ByteReader::new(&buf)),
            Err(Error::InvalidValue)
        );
    }

    #[test]
    fn window_matches_destination() {
        let dst = NodeAddress::from_u16(0x0004);
        let w = Window::equals_dst(dst);
        assert!(w.evaluate(&data_packet(dst), &[]));
        assert!(!w.evaluate(&data_packet(NodeAddress::from_u16(0x0005)), &[]));
    }

    #[test]
    fn window_out_of_bounds_operand_fails() {
        let w = Window {
            operation: Operation::Equal,
            size: OperandSize::Size1,
            lhs: 200, // past any packet
            lhs_location: Location::Packet,
            rhs: 0,
            rhs_location: Location::Const,
        };
        assert!(!w.evaluate(&data_packet(NodeAddress::BROADCAST), &[]));
    }

    #[test]
    fn window_reads_status_registers() {
        let w = Window {
            operation: Operation::GreaterOrEqual,
            size: OperandSize::Size1,
            lhs: 2,
            lhs_location: Location::Status,
            rhs: 10,
            rhs_location: Location::Const,
        };
        let status = [0, 0, 11, 0, 0, 0, 0, 0];
        assert!(w.evaluate(&data_packet(NodeAddress::BROADCAST), &status));
        assert!(!w.evaluate(&data_packet(NodeAddress::BROADCAST), &[0; 8]));
    }

    #[test]
    fn always_window_matches_anything() {
        assert!(Window::always().evaluate(&Packet::empty(), &[]));
    }

    #[test]
    fn entry_codec_roundtrip() {
        let mut entry = FlowEntry::with(
            Window::equals_dst(NodeAddress::from_u16(9)),
            Action::Modify {
                offset: 9,
                width: 1,
                value: 50,
            },
            240,
        );
        let _ = entry.actions.push(Action::ForwardUnicast(NodeAddress::from_u16(3)));

        let mut buf = [0; 64];
        let mut writer = ByteWriter::new(&mut buf);
        entry.to_bytes(&mut writer).unwrap();
        let used = 64 - writer.space_left();

        let back = FlowEntry::from_bytes(&mut ByteReader::new(&buf[..used])).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn entry_decode_rejects_empty_windows() {
        // n_windows == 0 violates the table invariant.
        let buf = [0, 1, 2, 0, 0, 60];
        assert_eq!(
            FlowEntry::from_bytes(&mut ByteReader::new(&buf)),
            Err(Error::InvalidValue)
        );
    }
}
