//! Serial bridge between the sink node and the external controller.
//!
//! Frames travel over the serial link in exactly the on-air format; there is
//! no extra length prefix, the framer keys off the header's own `len` byte.

use crate::packet::{LEN_INDEX, MAX_PACKET_LENGTH, PLD_INDEX};

/// Trait for the serial uplink toward the controller.
///
/// Only the sink ever emits frames; everything it receives comes in through
/// the byte-wise framer instead.
pub trait ControllerLink {
    /// Writes one complete frame to the controller.
    fn emit_frame(&mut self, frame: &[u8]);
}

/// A `ControllerLink` for nodes without a serial uplink.
///
/// Non-sink nodes never bridge packets, but the type still has to exist to
/// satisfy the platform configuration.
pub struct NoController;

impl ControllerLink for NoController {
    fn emit_frame(&mut self, _frame: &[u8]) {}
}

/// Byte-wise receive framer for the serial link.
///
/// Bytes are accumulated until the count announced in the frame's own
/// `len` header byte has arrived, at which point the complete frame is
/// returned and the framer resets.
pub struct Framer {
    buf: [u8; MAX_PACKET_LENGTH],
    index: usize,
    expected: usize,
}

impl Framer {
    pub fn new() -> Self {
        Framer {
            buf: [0; MAX_PACKET_LENGTH],
            index: 0,
            expected: 0,
        }
    }

    /// Feeds one received byte. Returns the completed frame once the final
    /// byte of a frame arrives.
    ///
    /// A `len` byte describing an impossible frame (shorter than the header)
    /// resynchronizes the framer instead of wedging it.
    pub fn push_byte(&mut self, byte: u8) -> Option<&[u8]> {
        self.buf[self.index] = byte;
        if self.index == LEN_INDEX {
            let expected = usize::from(byte);
            if expected < PLD_INDEX || expected > MAX_PACKET_LENGTH {
                debug!("serial framer: impossible frame length {}, resetting", byte);
                self.index = 0;
                self.expected = 0;
                return None;
            }
            self.expected = expected;
        }
        self.index += 1;
        if self.index > LEN_INDEX && self.index == self.expected {
            let len = self.index;
            self.index = 0;
            self.expected = 0;
            Some(&self.buf[..len])
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> Vec<u8> {
        vec![1, 12, 6, 0, 1, 0, 2, 0, 2, 100, 0x85, 15]
    }

    #[test]
    fn reassembles_frame_from_bytes() {
        let mut framer = Framer::new();
        let bytes = frame();
        for &b in &bytes[..bytes.len() - 1] {
            assert!(framer.push_byte(b).is_none());
        }
        let complete = framer.push_byte(*bytes.last().unwrap()).unwrap();
        assert_eq!(complete, &bytes[..]);
    }

    #[test]
    fn back_to_back_frames() {
        let mut framer = Framer::new();
        let bytes = frame();
        for _ in 0..2 {
            let mut out = None;
            for &b in &bytes {
                out = framer.push_byte(b).map(|f| f.to_vec());
            }
            assert_eq!(out.unwrap(), bytes);
        }
    }

    #[test]
    fn resynchronizes_after_bad_length() {
        let mut framer = Framer::new();
        // `len` of 3 cannot hold a header; the framer must reset and then
        // accept a well-formed frame.
        assert!(framer.push_byte(1).is_none());
        assert!(framer.push_byte(3).is_none());

        let bytes = frame();
        let mut out = None;
        for &b in &bytes {
            out = framer.push_byte(b).map(|f| f.to_vec());
        }
        assert_eq!(out.unwrap(), bytes);
    }
}
