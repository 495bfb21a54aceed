//! Fixed-capacity packet pool.
//!
//! Packets live in a small arena of slots. Handing a packet to another task
//! means handing over its [`PacketHandle`]; the handle embeds the slot's
//! generation counter, so a stale handle (double free, use after free) is
//! detected instead of silently corrupting a reused slot.
//!
//! [`PacketHandle`]: struct.PacketHandle.html

use crate::packet::Packet;
use crate::Error;
use heapless::Vec;

/// Number of packet slots. Bounds the number of frames in flight at once,
/// receive and transmit combined.
pub const POOL_SIZE: usize = 8;

/// Owning reference to a pool slot.
///
/// The handle is `Copy` for plumbing convenience, but logically it is
/// affine: whoever holds it must either enqueue it or free it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PacketHandle {
    index: u8,
    generation: u16,
}

struct Slot {
    generation: u16,
    live: bool,
    packet: Packet,
}

/// The packet arena.
pub struct PacketPool {
    slots: Vec<Slot, POOL_SIZE>,
    free: Vec<u8, POOL_SIZE>,
}

impl PacketPool {
    /// Creates a pool with all slots free.
    pub fn new() -> Self {
        let mut pool = PacketPool {
            slots: Vec::new(),
            free: Vec::new(),
        };
        for i in 0..POOL_SIZE {
            let _ = pool.slots.push(Slot {
                generation: 0,
                live: false,
                packet: Packet::empty(),
            });
            let _ = pool.free.push(i as u8);
        }
        pool
    }

    /// Allocates a slot holding a zeroed, empty packet.
    pub fn allocate(&mut self) -> Result<PacketHandle, Error> {
        self.adopt(Packet::empty())
    }

    /// Moves `packet` into a free slot.
    pub fn adopt(&mut self, packet: Packet) -> Result<PacketHandle, Error> {
        let index = match self.free.pop() {
            Some(i) => i,
            None => {
                debug!("packet pool exhausted, dropping");
                return Err(Error::PoolExhausted);
            }
        };
        let slot = &mut self.slots[usize::from(index)];
        slot.live = true;
        slot.packet = packet;
        Ok(PacketHandle {
            index,
            generation: slot.generation,
        })
    }

    /// Returns the packet behind `handle`, or `None` for a stale handle.
    pub fn get(&self, handle: PacketHandle) -> Option<&Packet> {
        let slot = &self.slots[usize::from(handle.index)];
        if slot.live && slot.generation == handle.generation {
            Some(&slot.packet)
        } else {
            None
        }
    }

    /// Mutable variant of [`PacketPool::get`].
    pub fn get_mut(&mut self, handle: PacketHandle) -> Option<&mut Packet> {
        let slot = &mut self.slots[usize::from(handle.index)];
        if slot.live && slot.generation == handle.generation {
            Some(&mut slot.packet)
        } else {
            None
        }
    }

    /// Releases the slot behind `handle`.
    ///
    /// Freeing a stale handle is a bug in the caller; it is logged and
    /// otherwise ignored so a refcounting mistake cannot take the node down.
    pub fn free(&mut self, handle: PacketHandle) {
        let slot = &mut self.slots[usize::from(handle.index)];
        if !slot.live || slot.generation != handle.generation {
            error!("double free of packet slot {}", handle.index);
            return;
        }
        slot.live = false;
        slot.generation = slot.generation.wrapping_add(1);
        let _ = self.free.push(handle.index);
    }

    /// Number of live (allocated) slots.
    pub fn live_count(&self) -> usize {
        POOL_SIZE - self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_and_free() {
        let mut pool = PacketPool::new();
        let h = pool.allocate().unwrap();
        assert_eq!(pool.live_count(), 1);
        assert_eq!(pool.get(h).unwrap().payload_len(), 0);

        pool.get_mut(h).unwrap().set_payload_at(0, 7).unwrap();
        assert_eq!(pool.get(h).unwrap().payload(), &[7]);

        pool.free(h);
        assert_eq!(pool.live_count(), 0);
        assert!(pool.get(h).is_none());
    }

    #[test]
    fn exhaustion() {
        let mut pool = PacketPool::new();
        let mut handles = Vec::<_, POOL_SIZE>::new();
        for _ in 0..POOL_SIZE {
            handles.push(pool.allocate().unwrap()).unwrap();
        }
        assert_eq!(pool.allocate(), Err(Error::PoolExhausted));

        pool.free(handles[0]);
        assert!(pool.allocate().is_ok());
    }

    #[test]
    fn double_free_is_detected() {
        let mut pool = PacketPool::new();
        let h = pool.allocate().unwrap();
        pool.free(h);
        // Second free must be a no-op.
        pool.free(h);
        assert_eq!(pool.live_count(), 0);

        // The slot is reusable and the old handle stays dead.
        let h2 = pool.allocate().unwrap();
        assert_eq!(pool.live_count(), 1);
        assert!(pool.get(h).is_none());
        assert!(pool.get(h2).is_some());
    }

    #[test]
    fn stale_handle_does_not_alias_reused_slot() {
        let mut pool = PacketPool::new();
        let h1 = pool.allocate().unwrap();
        pool.free(h1);
        let h2 = pool.allocate().unwrap();
        pool.get_mut(h2).unwrap().set_payload_at(0, 1).unwrap();
        assert!(pool.get_mut(h1).is_none());
        pool.free(h1);
        assert_eq!(pool.live_count(), 1);
    }
}
