use crate::bytes::{ByteReader, ByteWriter, FromBytes, ToBytes};
use crate::Error;
use core::fmt;

/// Number of bytes in a mesh address.
pub const ADDRESS_LENGTH: usize = 2;

/// A mesh node address.
///
/// Addresses are 2 bytes wide and interpreted big-endian on the wire; the
/// all-ones value is reserved for broadcast. Equality and ordering are
/// byte-wise.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct NodeAddress([u8; ADDRESS_LENGTH]);

impl NodeAddress {
    /// The reserved broadcast address.
    pub const BROADCAST: Self = NodeAddress([0xff, 0xff]);

    /// Create an address from 2 raw bytes, as they are sent over the air (MSB first).
    pub fn new(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        NodeAddress(bytes)
    }

    /// Creates an address from its integer value.
    pub fn from_u16(value: u16) -> Self {
        NodeAddress(value.to_be_bytes())
    }

    /// Returns the integer value of the address (big-endian merge of its bytes).
    pub fn as_u16(&self) -> u16 {
        u16::from_be_bytes(self.0)
    }

    /// Returns the raw bytes making up this address (MSB first).
    pub fn raw(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    /// Returns whether this is the reserved broadcast address.
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl fmt::Debug for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.0[0], self.0[1])
    }
}

impl<'a> FromBytes<'a> for NodeAddress {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        Ok(NodeAddress(bytes.read_array()?))
    }
}

impl ToBytes for NodeAddress {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_slice(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_conversion_is_big_endian() {
        let addr = NodeAddress::new([0x01, 0x02]);
        assert_eq!(addr.as_u16(), 0x0102);
        assert_eq!(NodeAddress::from_u16(0x0102), addr);
    }

    #[test]
    fn broadcast() {
        assert!(NodeAddress::new([0xff, 0xff]).is_broadcast());
        assert!(!NodeAddress::from_u16(0x00ff).is_broadcast());
    }

    #[test]
    fn ordering_is_byte_wise() {
        assert!(NodeAddress::new([0x01, 0xff]) < NodeAddress::new([0x02, 0x00]));
    }

    #[test]
    fn debug_representation() {
        assert_eq!(format!("{:?}", NodeAddress::from_u16(0x0104)), "1.4");
    }
}
