//! Radio-facing layer.
//!
//! The node does not drive a radio itself; whatever the platform uses
//! (802.15.4 hardware, a sub-GHz transceiver, a simulator) is hidden behind
//! the [`Transmitter`] trait. The layer's only real job besides that seam is
//! address plumbing: mesh addresses travel big-endian on the air, while the
//! link-layer identifier of common radio stacks is little-endian, so the
//! send path byte-swaps the next hop when handing frames down.
//!
//! [`Transmitter`]: trait.Transmitter.html

mod address;

pub use self::address::{NodeAddress, ADDRESS_LENGTH};

/// A link-layer destination identifier, in the byte order of the host radio
/// stack (LSB first).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LinkAddress(pub [u8; ADDRESS_LENGTH]);

impl From<NodeAddress> for LinkAddress {
    /// Converts a mesh address to the radio's identifier by reversing the
    /// byte order.
    fn from(addr: NodeAddress) -> Self {
        let raw = addr.raw();
        LinkAddress([raw[1], raw[0]])
    }
}

/// Trait for raw frame transmission.
///
/// The specifics of sending a frame depend on the underlying hardware. The
/// implementor transmits the given bytes verbatim; the node has already
/// serialized the full header and payload.
pub trait Transmitter {
    /// Transmits `frame` to the single neighbor identified by `dest`.
    fn transmit_unicast(&mut self, frame: &[u8], dest: LinkAddress);

    /// Transmits `frame` to every neighbor in radio range.
    fn transmit_broadcast(&mut self, frame: &[u8]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_address_swaps_endianness() {
        let mesh = NodeAddress::from_u16(0x0102);
        assert_eq!(LinkAddress::from(mesh), LinkAddress([0x02, 0x01]));

        // A symmetric address must survive the swap unchanged.
        let sym = NodeAddress::from_u16(0x0707);
        assert_eq!(LinkAddress::from(sym), LinkAddress([0x07, 0x07]));
    }
}
