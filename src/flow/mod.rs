//! Flow table and matching engine.
//!
//! The table is an ordered list of entries. Matching walks the list and
//! executes the action list of the *first* entry whose windows all accept
//! the packet; everything after the terminal action decides the packet's
//! fate. The engine itself is pure: it mutates the packet (`MODIFY`) and the
//! entry statistics, and reports the terminal outcome as a [`Verdict`] for
//! the dispatcher to act on. This keeps queueing, upcall construction and
//! deallocation in one place (the node) and makes match behavior
//! deterministic and directly testable.
//!
//! Two permanent entries are installed at boot: "packets addressed to me are
//! consumed locally", and a final catch-all that forwards everything else
//! toward the sink. Learned and controller-installed entries always land in
//! front of the catch-all.
//!
//! [`Verdict`]: enum.Verdict.html

mod entry;

pub use self::entry::{
    Action, EntryStats, FlowEntry, Location, OperandSize, Operation, Window,
    MAX_ACTIONS_PER_ENTRY, MAX_WINDOWS_PER_ENTRY, WINDOW_SIZE,
};

use crate::link::NodeAddress;
use crate::packet::Packet;
use heapless::Vec;

/// Maximum number of entries, boot defaults included.
pub const MAX_FLOW_TABLE_SIZE: usize = 16;

/// Terminal outcome of a match pass.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Enqueue for unicast transmission to the given next hop (already
    /// written into the packet header).
    ForwardUnicast(NodeAddress),
    /// Enqueue for broadcast transmission.
    ForwardBroadcast,
    /// Discard the packet.
    Drop,
    /// No entry matched, or an `ASK` action fired: request a rule from the
    /// controller and discard the packet.
    Upcall,
}

/// The ordered rule list.
pub struct FlowTable {
    entries: Vec<FlowEntry, MAX_FLOW_TABLE_SIZE>,
}

impl FlowTable {
    /// Creates an empty table. [`FlowTable::install_defaults`] must run
    /// before the node goes on air.
    pub fn new() -> Self {
        FlowTable {
            entries: Vec::new(),
        }
    }

    /// Installs the two boot entries: local consumption for `my_address`,
    /// and the final toward-sink catch-all (initially pointing at
    /// `my_address` too, until a tree parent is adopted).
    pub fn install_defaults(&mut self, my_address: NodeAddress) {
        let mut consume = FlowEntry::with(
            Window::equals_dst(my_address),
            Action::ForwardUnicast(my_address),
            0,
        );
        consume.stats.permanent = true;

        let mut catch_all =
            FlowEntry::with(Window::always(), Action::ForwardUnicast(my_address), 0);
        catch_all.stats.permanent = true;

        self.entries.clear();
        let _ = self.entries.push(consume);
        let _ = self.entries.push(catch_all);
    }

    /// Rewrites the catch-all's next hop after a tree parent change.
    pub fn set_sink_next_hop(&mut self, next_hop: NodeAddress) {
        if let Some(last) = self.entries.last_mut() {
            if last.stats.permanent {
                last.actions.clear();
                let _ = last.actions.push(Action::ForwardUnicast(next_hop));
            }
        }
    }

    /// Inserts `entry` in front of the final catch-all.
    ///
    /// A full table evicts its oldest non-permanent entry to make room; the
    /// controller's newest decision wins over stale state.
    pub fn insert(&mut self, entry: FlowEntry) {
        if self.entries.is_full() {
            match self.entries.iter().position(|e| !e.stats.permanent) {
                Some(oldest) => {
                    debug!("flow table full, evicting entry {}", oldest);
                    self.remove(oldest);
                }
                None => return,
            }
        }

        // Keep the catch-all last.
        let at = if self
            .entries
            .last()
            .map(|e| e.stats.permanent)
            .unwrap_or(false)
        {
            self.entries.len() - 1
        } else {
            self.entries.len()
        };
        self.insert_at(at, entry);
    }

    fn insert_at(&mut self, at: usize, entry: FlowEntry) {
        let _ = self.entries.push(entry);
        let last = self.entries.len() - 1;
        for i in (at..last).rev() {
            self.entries.swap(i, i + 1);
        }
    }

    /// Removes the entry at `index`. Permanent entries stay.
    pub fn remove(&mut self, index: usize) {
        if index >= self.entries.len() || self.entries[index].stats.permanent {
            return;
        }
        let last = self.entries.len() - 1;
        for i in index..last {
            self.entries.swap(i, i + 1);
        }
        self.entries.truncate(last);
    }

    /// Returns the entry at `index`.
    pub fn get(&self, index: usize) -> Option<&FlowEntry> {
        self.entries.get(index)
    }

    /// Number of entries, boot defaults included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One second of rule aging: decrements every non-permanent entry's TTL
    /// and drops the expired ones.
    pub fn age(&mut self) {
        let mut index = 0;
        while index < self.entries.len() {
            let stats = &mut self.entries[index].stats;
            if stats.permanent {
                index += 1;
                continue;
            }
            stats.ttl = stats.ttl.saturating_sub(1);
            if stats.ttl == 0 {
                trace!("flow entry {} expired", index);
                self.remove(index);
            } else {
                index += 1;
            }
        }
    }

    /// Matches `packet` against the table and executes the winning entry's
    /// actions.
    ///
    /// `MODIFY` actions are applied to the packet in place. A `MATCH` action
    /// re-enters the loop; the number of re-entries is bounded by the entry
    /// count, after which the packet is dropped. No matching entry yields
    /// [`Verdict::Upcall`].
    pub fn match_packet(&mut self, packet: &mut Packet, status: &[u8]) -> Verdict {
        let mut budget = self.entries.len() + 1;
        'matching: loop {
            budget -= 1;
            if budget == 0 {
                debug!("match loop budget exhausted, dropping");
                return Verdict::Drop;
            }

            let winner = match self
                .entries
                .iter()
                .position(|e| e.matches(packet, status))
            {
                Some(i) => i,
                None => return Verdict::Upcall,
            };

            let entry = &mut self.entries[winner];
            entry.stats.count = entry.stats.count.wrapping_add(1);
            let actions = entry.actions.clone();

            for &action in actions.iter() {
                match action {
                    Action::Modify {
                        offset,
                        width,
                        value,
                    } => {
                        let offset = usize::from(offset);
                        let result = match width {
                            1 => packet.set_byte_at(offset, value as u8),
                            2 => packet.set_byte_at(offset, (value >> 8) as u8).and_then(
                                |()| packet.set_byte_at(offset + 1, value as u8),
                            ),
                            _ => Err(crate::Error::InvalidValue),
                        };
                        if result.is_err() {
                            debug!("modify action out of bounds, dropping");
                            return Verdict::Drop;
                        }
                    }
                    Action::ForwardUnicast(next_hop) => {
                        packet.set_nxh(next_hop);
                        return Verdict::ForwardUnicast(next_hop);
                    }
                    Action::ForwardBroadcast => return Verdict::ForwardBroadcast,
                    Action::Drop => return Verdict::Drop,
                    Action::Ask => return Verdict::Upcall,
                    Action::Match => continue 'matching,
                }
            }

            // Action list ran out without a terminal decision.
            return Verdict::Drop;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketType;

    fn me() -> NodeAddress {
        NodeAddress::from_u16(2)
    }

    fn table() -> FlowTable {
        let mut t = FlowTable::new();
        t.install_defaults(me());
        t
    }

    fn data_to(dst: u16) -> Packet {
        let mut p = Packet::empty();
        p.set_typ(PacketType::Data);
        p.set_dst(NodeAddress::from_u16(dst));
        p.set_payload_at(0, 0).unwrap();
        p.set_payload_at(1, 7).unwrap();
        p
    }

    #[test]
    fn defaults_consume_and_catch_all() {
        let mut t = table();
        assert_eq!(t.len(), 2);

        // Addressed to me: local consumption.
        let mut p = data_to(2);
        assert_eq!(t.match_packet(&mut p, &[]), Verdict::ForwardUnicast(me()));

        // Anything else: catch-all toward the sink next hop.
        t.set_sink_next_hop(NodeAddress::from_u16(1));
        let mut p = data_to(0x99);
        assert_eq!(
            t.match_packet(&mut p, &[]),
            Verdict::ForwardUnicast(NodeAddress::from_u16(1))
        );
        assert_eq!(p.nxh(), NodeAddress::from_u16(1));
    }

    #[test]
    fn first_match_wins_in_list_order() {
        let mut t = FlowTable::new();
        t.insert(FlowEntry::with(
            Window::equals_dst(NodeAddress::from_u16(4)),
            Action::ForwardUnicast(NodeAddress::from_u16(3)),
            60,
        ));
        t.insert(FlowEntry::with(
            Window::equals_dst(NodeAddress::from_u16(4)),
            Action::Drop,
            60,
        ));

        let mut p = data_to(4);
        assert_eq!(
            t.match_packet(&mut p, &[]),
            Verdict::ForwardUnicast(NodeAddress::from_u16(3))
        );
        assert_eq!(t.get(0).unwrap().stats.count, 1);
        assert_eq!(t.get(1).unwrap().stats.count, 0);
    }

    #[test]
    fn no_match_is_an_upcall() {
        let mut t = FlowTable::new();
        t.insert(FlowEntry::with(
            Window::equals_dst(NodeAddress::from_u16(4)),
            Action::Drop,
            60,
        ));
        let mut p = data_to(0x99);
        assert_eq!(t.match_packet(&mut p, &[]), Verdict::Upcall);
    }

    #[test]
    fn inserts_stay_in_front_of_catch_all() {
        let mut t = table();
        t.insert(FlowEntry::with(
            Window::equals_dst(NodeAddress::from_u16(4)),
            Action::ForwardUnicast(NodeAddress::from_u16(3)),
            60,
        ));
        assert_eq!(t.len(), 3);

        // The learned entry must win over the catch-all.
        let mut p = data_to(4);
        assert_eq!(
            t.match_packet(&mut p, &[]),
            Verdict::ForwardUnicast(NodeAddress::from_u16(3))
        );
    }

    #[test]
    fn modify_then_forward() {
        let mut t = FlowTable::new();
        let mut e = FlowEntry::with(
            Window::equals_dst(NodeAddress::from_u16(4)),
            Action::Modify {
                offset: crate::packet::TTL_INDEX as u8,
                width: 1,
                value: 42,
            },
            60,
        );
        let _ = e
            .actions
            .push(Action::ForwardUnicast(NodeAddress::from_u16(3)));
        t.insert(e);

        let mut p = data_to(4);
        assert_eq!(
            t.match_packet(&mut p, &[]),
            Verdict::ForwardUnicast(NodeAddress::from_u16(3))
        );
        assert_eq!(p.ttl(), 42);
    }

    #[test]
    fn match_action_re_enters_bounded() {
        // A single self-referential MATCH entry must not loop forever.
        let mut t = FlowTable::new();
        t.insert(FlowEntry::with(Window::always(), Action::Match, 60));
        let mut p = data_to(4);
        assert_eq!(t.match_packet(&mut p, &[]), Verdict::Drop);
    }

    #[test]
    fn match_action_rematches_after_modify() {
        let mut t = FlowTable::new();
        // First entry: rewrite dst 0.4 -> 0.9, then rematch.
        let mut e = FlowEntry::with(
            Window::equals_dst(NodeAddress::from_u16(4)),
            Action::Modify {
                offset: crate::packet::DST_INDEX as u8,
                width: 2,
                value: 9,
            },
            60,
        );
        let _ = e.actions.push(Action::Match);
        t.insert(e);
        t.insert(FlowEntry::with(
            Window::equals_dst(NodeAddress::from_u16(9)),
            Action::ForwardUnicast(NodeAddress::from_u16(7)),
            60,
        ));

        let mut p = data_to(4);
        assert_eq!(
            t.match_packet(&mut p, &[]),
            Verdict::ForwardUnicast(NodeAddress::from_u16(7))
        );
        assert_eq!(p.dst(), NodeAddress::from_u16(9));
    }

    #[test]
    fn aging_removes_expired_entries_only() {
        let mut t = table();
        t.insert(FlowEntry::with(
            Window::equals_dst(NodeAddress::from_u16(4)),
            Action::Drop,
            2,
        ));
        t.insert(FlowEntry::with(
            Window::equals_dst(NodeAddress::from_u16(5)),
            Action::Drop,
            10,
        ));
        assert_eq!(t.len(), 4);

        t.age();
        t.age();
        assert_eq!(t.len(), 3); // ttl=2 entry gone, defaults untouched

        for _ in 0..20 {
            t.age();
        }
        assert_eq!(t.len(), 2); // only the permanent defaults remain
    }

    #[test]
    fn remove_skips_permanent_entries() {
        let mut t = table();
        t.remove(0);
        t.remove(1);
        assert_eq!(t.len(), 2);

        t.insert(FlowEntry::with(
            Window::equals_dst(NodeAddress::from_u16(4)),
            Action::Drop,
            60,
        ));
        t.remove(1);
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn full_table_evicts_oldest_installed_entry() {
        let mut t = table();
        for i in 0..(MAX_FLOW_TABLE_SIZE as u16) {
            t.insert(FlowEntry::with(
                Window::equals_dst(NodeAddress::from_u16(100 + i)),
                Action::Drop,
                60,
            ));
        }
        assert_eq!(t.len(), MAX_FLOW_TABLE_SIZE);

        // The first installed entry (dst 0.100) was evicted; the newest one
        // survives, and the catch-all is still last.
        let mut p = data_to(100);
        t.set_sink_next_hop(NodeAddress::from_u16(1));
        assert_eq!(
            t.match_packet(&mut p, &[]),
            Verdict::ForwardUnicast(NodeAddress::from_u16(1))
        );
        let mut p = data_to(100 + MAX_FLOW_TABLE_SIZE as u16 - 1);
        assert_eq!(t.match_packet(&mut p, &[]), Verdict::Drop);
    }
}
