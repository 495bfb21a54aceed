//! Traffic counters.

/// Node-wide packet counters, reported periodically through the log stream.
#[derive(Debug, Clone, Default)]
pub struct Statistics {
    pub packets_uc_received_total: u16,
    pub packets_uc_received_as_dst: u16,
    pub packets_bc_received: u16,
    pub packets_uc_sent_total: u16,
    pub packets_uc_sent_as_src: u16,
    pub packets_bc_sent: u16,
    /// Sum of the hop counts of every unicast consumed as destination.
    pub hop_sum: u16,
}

impl Statistics {
    pub fn new() -> Self {
        Statistics::default()
    }

    /// Average hop count of consumed unicasts; 0 before the first one, so a
    /// fresh node can print statistics without dividing by zero.
    pub fn avg_hop_count(&self) -> u16 {
        if self.packets_uc_received_as_dst == 0 {
            0
        } else {
            self.hop_sum / self.packets_uc_received_as_dst
        }
    }

    /// Emits the counter summary line.
    pub fn log_summary(&self) {
        info!(
            "STAT: [avg hops: {}, tx uc total: {}, tx uc src: {}, tx bc: {}, rx uc total: {}, rx uc dst: {}, rx bc: {}]",
            self.avg_hop_count(),
            self.packets_uc_sent_total,
            self.packets_uc_sent_as_src,
            self.packets_bc_sent,
            self.packets_uc_received_total,
            self.packets_uc_received_as_dst,
            self.packets_bc_received,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_is_guarded_against_zero_receives() {
        let mut stats = Statistics::new();
        assert_eq!(stats.avg_hop_count(), 0);

        stats.packets_uc_received_as_dst = 2;
        stats.hop_sum = 7;
        assert_eq!(stats.avg_hop_count(), 3);
    }
}
