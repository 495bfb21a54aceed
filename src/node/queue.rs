//! Bounded packet mailboxes.
//!
//! Tasks hand packets to each other by enqueueing the pool handle; the
//! handle's ownership moves with it. Everything runs on one thread, so a
//! plain ring buffer is all the synchronization needed.

use crate::packet::pool::PacketHandle;
use crate::Error;
use heapless::Deque;

/// FIFO mailbox of packet handles.
pub struct Mailbox<const N: usize> {
    queue: Deque<PacketHandle, N>,
}

impl<const N: usize> Mailbox<N> {
    pub fn new() -> Self {
        Mailbox {
            queue: Deque::new(),
        }
    }

    /// Enqueues a handle, transferring its ownership to the consumer.
    ///
    /// The caller keeps ownership on `Error::QueueFull` and must deallocate.
    pub fn push(&mut self, handle: PacketHandle) -> Result<(), Error> {
        self.queue.push_back(handle).map_err(|_| Error::QueueFull)
    }

    /// Dequeues the oldest handle.
    pub fn pop(&mut self) -> Option<PacketHandle> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::pool::PacketPool;

    #[test]
    fn fifo_order_and_capacity() {
        let mut pool = PacketPool::new();
        let a = pool.allocate().unwrap();
        let b = pool.allocate().unwrap();

        let mut mailbox: Mailbox<2> = Mailbox::new();
        mailbox.push(a).unwrap();
        mailbox.push(b).unwrap();
        assert_eq!(mailbox.push(a), Err(Error::QueueFull));

        assert_eq!(mailbox.pop(), Some(a));
        assert_eq!(mailbox.pop(), Some(b));
        assert_eq!(mailbox.pop(), None);
    }
}
