//! Neighbor table.
//!
//! One slot per distinct neighbor address, in insertion order. The table is
//! sized so that a full table always fits in a single report payload.

use crate::link::{NodeAddress, ADDRESS_LENGTH};
use crate::packet::{Packet, MAX_PAYLOAD_LENGTH, PLD_INDEX, REPORT_INIT_INDEX};
use crate::time::{Duration, Instant};
use crate::Error;
use heapless::Vec;

/// Wire size of one neighbor record in a report: address, rssi, rx, tx.
pub const NEIGHBOR_LENGTH: usize = ADDRESS_LENGTH + 3;

/// Table capacity, derived so the whole table fits a report payload.
pub const MAX_NEIGHBORS: usize = (MAX_PAYLOAD_LENGTH - PLD_INDEX) / NEIGHBOR_LENGTH;

/// One observed neighbor.
#[derive(Debug, Copy, Clone)]
pub struct Neighbor {
    pub address: NodeAddress,
    /// Strength of the last observed beacon.
    pub rssi: u8,
    /// Frames received from this neighbor since the last report.
    pub rx_count: u8,
    /// Frames sent to this neighbor since the last report.
    pub tx_count: u8,
    /// When the last beacon from this neighbor was observed.
    pub last_seen: Instant,
}

/// Insertion-ordered neighbor list.
pub struct NeighborTable {
    neighbors: Vec<Neighbor, MAX_NEIGHBORS>,
}

impl NeighborTable {
    pub fn new() -> Self {
        NeighborTable {
            neighbors: Vec::new(),
        }
    }

    /// Records a beacon observation.
    ///
    /// A known address gets its rssi and `last_seen` refreshed; a new one
    /// claims a slot, silently dropped when the table is full.
    pub fn add(&mut self, address: NodeAddress, rssi: u8, now: Instant) {
        if let Some(n) = self.neighbors.iter_mut().find(|n| n.address == address) {
            n.rssi = rssi;
            n.last_seen = now;
            return;
        }
        if self
            .neighbors
            .push(Neighbor {
                address,
                rssi,
                rx_count: 0,
                tx_count: 0,
                last_seen: now,
            })
            .is_err()
        {
            debug!("neighbor table full, not recording {:?}", address);
        }
    }

    /// Returns whether `address` has an entry.
    pub fn contains(&self, address: NodeAddress) -> bool {
        self.neighbors.iter().any(|n| n.address == address)
    }

    /// Counts a received frame for `address`, if known.
    pub fn rx_inc(&mut self, address: NodeAddress) {
        if let Some(n) = self.neighbors.iter_mut().find(|n| n.address == address) {
            n.rx_count = n.rx_count.wrapping_add(1);
        }
    }

    /// Counts a transmitted frame to `address`, if known.
    pub fn tx_inc(&mut self, address: NodeAddress) {
        if let Some(n) = self.neighbors.iter_mut().find(|n| n.address == address) {
            n.tx_count = n.tx_count.wrapping_add(1);
        }
    }

    /// Zeroes every per-report counter.
    pub fn reset_counts(&mut self) {
        for n in self.neighbors.iter_mut() {
            n.rx_count = 0;
            n.tx_count = 0;
        }
    }

    /// Evicts neighbors that have been silent longer than `max_silence`.
    pub fn purge(&mut self, now: Instant, max_silence: Duration) {
        let mut index = 0;
        while index < self.neighbors.len() {
            if now.duration_since(self.neighbors[index].last_seen) > max_silence {
                trace!("evicting silent neighbor {:?}", self.neighbors[index].address);
                let last = self.neighbors.len() - 1;
                for i in index..last {
                    self.neighbors.swap(i, i + 1);
                }
                self.neighbors.truncate(last);
            } else {
                index += 1;
            }
        }
    }

    /// Writes the neighbor block into a report payload: one count byte at
    /// [`REPORT_INIT_INDEX`], then `addr(2) rssi rx tx` per neighbor, in
    /// insertion order. Empties the table afterwards.
    pub fn fill_report(&mut self, packet: &mut Packet) -> Result<(), Error> {
        let mut index = REPORT_INIT_INDEX;
        packet.set_payload_at(index, self.neighbors.len() as u8)?;
        index += 1;
        for n in &self.neighbors {
            let raw = n.address.raw();
            packet.set_payload_at(index, raw[0])?;
            packet.set_payload_at(index + 1, raw[1])?;
            packet.set_payload_at(index + 2, n.rssi)?;
            packet.set_payload_at(index + 3, n.rx_count)?;
            packet.set_payload_at(index + 4, n.tx_count)?;
            index += NEIGHBOR_LENGTH;
        }
        self.neighbors.clear();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    /// Iterates the table in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Neighbor> {
        self.neighbors.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: u16) -> Instant {
        Instant::from_raw_millis(u32::from(secs) * 1_000)
    }

    #[test]
    fn add_deduplicates_by_address() {
        let mut t = NeighborTable::new();
        t.add(NodeAddress::from_u16(1), 100, at(0));
        t.add(NodeAddress::from_u16(2), 200, at(0));
        t.add(NodeAddress::from_u16(1), 50, at(1));
        assert_eq!(t.len(), 2);

        let first = t.iter().next().unwrap();
        assert_eq!(first.address, NodeAddress::from_u16(1));
        assert_eq!(first.rssi, 50);
        assert!(t.contains(NodeAddress::from_u16(2)));
        assert!(!t.contains(NodeAddress::from_u16(3)));
    }

    #[test]
    fn counters() {
        let mut t = NeighborTable::new();
        t.add(NodeAddress::from_u16(1), 100, at(0));
        t.rx_inc(NodeAddress::from_u16(1));
        t.rx_inc(NodeAddress::from_u16(1));
        t.tx_inc(NodeAddress::from_u16(1));
        // Unknown addresses are ignored.
        t.rx_inc(NodeAddress::from_u16(9));

        let n = t.iter().next().unwrap();
        assert_eq!((n.rx_count, n.tx_count), (2, 1));

        t.reset_counts();
        let n = t.iter().next().unwrap();
        assert_eq!((n.rx_count, n.tx_count), (0, 0));
    }

    #[test]
    fn fill_report_writes_block_and_empties_table() {
        let mut t = NeighborTable::new();
        t.add(NodeAddress::from_u16(0x0102), 90, at(0));
        t.add(NodeAddress::from_u16(0x0203), 80, at(0));
        t.rx_inc(NodeAddress::from_u16(0x0102));

        let mut p = Packet::empty();
        t.fill_report(&mut p).unwrap();

        assert_eq!(p.payload_at(REPORT_INIT_INDEX), Some(2));
        let base = REPORT_INIT_INDEX + 1;
        assert_eq!(p.payload_at(base), Some(1));
        assert_eq!(p.payload_at(base + 1), Some(2));
        assert_eq!(p.payload_at(base + 2), Some(90));
        assert_eq!(p.payload_at(base + 3), Some(1));
        assert_eq!(p.payload_at(base + 4), Some(0));
        assert_eq!(p.payload_at(base + NEIGHBOR_LENGTH), Some(2));

        assert!(t.is_empty());
    }

    #[test]
    fn full_table_holds_exactly_one_report_worth() {
        let mut t = NeighborTable::new();
        for i in 0..(MAX_NEIGHBORS as u16 + 4) {
            t.add(NodeAddress::from_u16(i + 1), 10, at(0));
        }
        assert_eq!(t.len(), MAX_NEIGHBORS);

        let mut p = Packet::empty();
        t.fill_report(&mut p).unwrap();
        assert_eq!(
            p.payload_len(),
            REPORT_INIT_INDEX + 1 + MAX_NEIGHBORS * NEIGHBOR_LENGTH
        );
    }

    #[test]
    fn purge_evicts_only_silent_neighbors() {
        let mut t = NeighborTable::new();
        t.add(NodeAddress::from_u16(1), 10, at(0));
        t.add(NodeAddress::from_u16(2), 10, at(12));
        t.purge(at(15), Duration::from_secs(15));
        assert_eq!(t.len(), 2);

        t.purge(at(16), Duration::from_secs(15));
        assert!(!t.contains(NodeAddress::from_u16(1)));
        assert!(t.contains(NodeAddress::from_u16(2)));
    }
}
