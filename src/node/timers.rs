//! Rearming one-shot timers driving the periodic tasks.

use crate::node::conf::{NodeConf, NodeOptions};
use crate::time::{Duration, Instant};

/// The sink beacons at a multiple of the configured period; its children
/// rebroadcast fast enough that a slow root keeps the mesh calm.
const SINK_BEACON_STRETCH: u16 = 3;

/// Period of the housekeeping tick doing rule aging and neighbor purging.
const HOUSEKEEPING_PERIOD: Duration = Duration::from_millis(1_000);

/// Next-fire instants of every periodic task.
///
/// Each timer is one-shot and rearmed right when it fires. On a non-sink
/// node the beacon/report/statistics timers stay dormant until activation
/// (first broadcast reception); [`Timers::activate`] arms them.
pub struct Timers {
    pub beacon: Instant,
    pub report: Instant,
    pub message: Instant,
    pub statistics: Instant,
    pub housekeeping: Instant,
}

impl Timers {
    pub fn new(now: Instant, options: &NodeOptions, conf: &NodeConf) -> Self {
        Timers {
            beacon: now + beacon_period(options, conf),
            report: now + Duration::from_secs(u16::from(conf.report_period)),
            message: now + Duration::from_secs(options.initial_message_delay),
            statistics: now + Duration::from_secs(options.statistics_interval),
            housekeeping: now + HOUSEKEEPING_PERIOD,
        }
    }

    /// Arms the activation-gated timers relative to `now`.
    pub fn activate(&mut self, now: Instant, options: &NodeOptions, conf: &NodeConf) {
        self.beacon = now + beacon_period(options, conf);
        self.report = now + Duration::from_secs(u16::from(conf.report_period));
        self.statistics = now + Duration::from_secs(options.statistics_interval);
    }

    /// Earliest pending deadline, given which timers are live.
    pub fn next_wakeup(&self, gated_timers_live: bool, message_timer_live: bool) -> Instant {
        let mut next = self.housekeeping;
        if gated_timers_live {
            next = earlier(next, self.beacon);
            next = earlier(next, self.report);
            next = earlier(next, self.statistics);
        }
        if message_timer_live {
            next = earlier(next, self.message);
        }
        next
    }

    pub fn rearm_housekeeping(&mut self, now: Instant) {
        self.housekeeping = now + HOUSEKEEPING_PERIOD;
    }
}

/// Effective beacon period for this node's role.
pub fn beacon_period(options: &NodeOptions, conf: &NodeConf) -> Duration {
    let secs = u16::from(conf.beacon_period);
    if options.sink {
        Duration::from_secs(secs * SINK_BEACON_STRETCH)
    } else {
        Duration::from_secs(secs)
    }
}

fn earlier(a: Instant, b: Instant) -> Instant {
    if a.is_after(b) {
        b
    } else {
        a
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::NodeAddress;

    fn at(secs: u16) -> Instant {
        Instant::from_raw_millis(u32::from(secs) * 1_000)
    }

    #[test]
    fn sink_beacons_slower() {
        let options = NodeOptions {
            sink: true,
            ..NodeOptions::default()
        };
        let conf = NodeConf::new(NodeAddress::from_u16(1), true);
        assert_eq!(beacon_period(&options, &conf), Duration::from_secs(15));

        let options = NodeOptions::default();
        let conf = NodeConf::new(NodeAddress::from_u16(2), false);
        assert_eq!(beacon_period(&options, &conf), Duration::from_secs(5));
    }

    #[test]
    fn next_wakeup_respects_gating() {
        let options = NodeOptions::default();
        let conf = NodeConf::new(NodeAddress::from_u16(2), false);
        let timers = Timers::new(at(0), &options, &conf);

        // Dormant node: only housekeeping counts.
        assert_eq!(timers.next_wakeup(false, false), at(1));
        // Active traffic source: the beacon timer (5 s) is next after
        // housekeeping; the message timer is far out.
        assert_eq!(timers.next_wakeup(true, true), at(1));

        let mut timers = Timers::new(at(0), &options, &conf);
        timers.housekeeping = at(30);
        assert_eq!(timers.next_wakeup(true, true), at(5));
        assert_eq!(timers.next_wakeup(false, true), at(20));
    }
}
