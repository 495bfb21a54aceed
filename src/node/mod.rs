//! The node data plane: dispatcher, tree maintenance, task orchestration.
//!
//! A [`Node`] owns every table, the packet pool and all mailboxes, so the
//! whole data plane is a single state machine behind `&mut self`; no handler
//! can be preempted and nothing needs locking. The platform drives it with
//! three calls:
//!
//! * [`Node::radio_receive`] for every frame the radio hands up,
//! * [`Node::uart_receive_byte`] for every serial byte (sink only),
//! * [`Node::poll`] whenever the wake-up instant returned by the previous
//!   `poll` has passed, or right after feeding input.
//!
//! `poll` services the node round-robin: received packets first, then due
//! timers, then the two send mailboxes. Ownership of a pooled packet moves
//! with its handle; a handler that neither enqueues nor stores a handle
//! frees it before returning.
//!
//! [`Node`]: struct.Node.html

pub mod conf;
pub mod neighbors;
pub mod stats;

mod queue;
mod timers;


use self::conf::{ConfigParam, NodeConf, NodeOptions};
use self::neighbors::NeighborTable;
use self::queue::Mailbox;
use self::stats::Statistics;
use self::timers::{beacon_period, Timers};
use crate::bytes::{ByteReader, ByteWriter, FromBytes, ToBytes};
use crate::config::{Config, Sensors};
use crate::flow::{FlowEntry, FlowTable, Verdict, Window, MAX_WINDOWS_PER_ENTRY, WINDOW_SIZE};
use crate::link::{NodeAddress, Transmitter, ADDRESS_LENGTH};
use crate::packet::pool::{PacketHandle, PacketPool, POOL_SIZE};
use crate::packet::{
    Packet, PacketInfo, PacketType, BEACON_BATT_INDEX, BEACON_DEPTH_INDEX, BEACON_HOPS_INDEX,
    BEACON_TREE_VERSION_INDEX, BEACON_TYPE_INDEX, BEACON_T_TREE, OPEN_PATH_WINDOWS_INDEX,
    PLD_INDEX,
};
use crate::time::{Duration, Instant, Timer};
use crate::uart::{ControllerLink, Framer};
use heapless::Vec;

/// Capacity of the receive mailbox.
const RX_QUEUE_SIZE: usize = POOL_SIZE;
/// Capacity of each send mailbox.
const TX_QUEUE_SIZE: usize = POOL_SIZE;

/// The per-node data plane.
pub struct Node<C: Config> {
    options: NodeOptions,
    conf: NodeConf,
    stats: Statistics,
    flow: FlowTable,
    neighbors: NeighborTable,
    pool: PacketPool,
    rx_queue: Mailbox<RX_QUEUE_SIZE>,
    uc_queue: Mailbox<TX_QUEUE_SIZE>,
    bc_queue: Mailbox<TX_QUEUE_SIZE>,
    timers: Timers,
    framer: Framer,
    timer: C::Timer,
    sensors: C::Sensors,
    message_seq: u8,
    reg_proxy_sent: bool,
    reboot_requested: bool,
}

impl<C: Config> Node<C> {
    /// Creates a node data plane.
    ///
    /// # Parameters
    ///
    /// * **`options`**: The build-time role and traffic profile.
    /// * **`my_address`**: This node's mesh address.
    /// * **`timer`**: A [`Timer`] implementation.
    /// * **`sensors`**: The report sample source.
    pub fn new(
        options: NodeOptions,
        my_address: NodeAddress,
        timer: C::Timer,
        sensors: C::Sensors,
    ) -> Self {
        trace!("new node, addr={:?} sink={}", my_address, options.sink);
        let conf = NodeConf::new(my_address, options.sink);
        let mut flow = FlowTable::new();
        flow.install_defaults(my_address);
        let timers = Timers::new(timer.now(), &options, &conf);
        Node {
            options,
            conf,
            stats: Statistics::new(),
            flow,
            neighbors: NeighborTable::new(),
            pool: PacketPool::new(),
            rx_queue: Mailbox::new(),
            uc_queue: Mailbox::new(),
            bc_queue: Mailbox::new(),
            timers,
            framer: Framer::new(),
            timer,
            sensors,
            message_seq: 0,
            reg_proxy_sent: false,
            reboot_requested: false,
        }
    }

    /// Returns a reference to the timer instance used by the node.
    pub fn timer(&mut self) -> &mut C::Timer {
        &mut self.timer
    }

    /// Read access to the runtime configuration and tree state.
    pub fn conf(&self) -> &NodeConf {
        &self.conf
    }

    /// Mutable access to the runtime configuration, for platform setup
    /// (network id, RSSI floor) before the node goes on air.
    pub fn conf_mut(&mut self) -> &mut NodeConf {
        &mut self.conf
    }

    pub fn flow_table(&self) -> &FlowTable {
        &self.flow
    }

    pub fn neighbor_table(&self) -> &NeighborTable {
        &self.neighbors
    }

    pub fn statistics(&self) -> &Statistics {
        &self.stats
    }

    /// Number of pool slots currently allocated.
    pub fn packets_in_flight(&self) -> usize {
        self.pool.live_count()
    }

    /// Number of packets sitting in the send mailboxes.
    pub fn pending_tx(&self) -> usize {
        self.uc_queue.len() + self.bc_queue.len()
    }

    /// Whether a `CONFIG RESET` asked for a reboot. The platform observes
    /// this after `poll` and triggers its watchdog; the flag clears on read.
    pub fn take_reboot_request(&mut self) -> bool {
        core::mem::replace(&mut self.reboot_requested, false)
    }

    /// Hands a received radio frame to the node.
    ///
    /// # Parameters
    ///
    /// * **`frame`**: The raw frame bytes, header first.
    /// * **`rssi`**: Received signal strength, larger is better.
    /// * **`sender`**: Link-layer source address, already in mesh byte order.
    /// * **`was_broadcast`**: Whether the frame arrived on the broadcast
    ///   connection.
    pub fn radio_receive(
        &mut self,
        frame: &[u8],
        rssi: u8,
        sender: NodeAddress,
        was_broadcast: bool,
    ) {
        if was_broadcast {
            self.stats.packets_bc_received = self.stats.packets_bc_received.wrapping_add(1);
        }

        let mut packet = match Packet::parse(frame) {
            Ok(p) => p,
            // Truncated or length-inconsistent frame: not even worth a log
            // line at this layer.
            Err(_) => return,
        };
        packet.info = PacketInfo { rssi, sender };
        self.enqueue_rx(packet);

        if was_broadcast && !self.conf.is_active {
            self.conf.is_active = true;
            let now = self.timer.now();
            self.timers.activate(now, &self.options, &self.conf);
            debug!("node activated by first broadcast");
        }
    }

    /// Feeds one byte received on the serial link (sink only).
    pub fn uart_receive_byte(&mut self, byte: u8) {
        let packet = match self.framer.push_byte(byte) {
            Some(frame) => Packet::parse(frame),
            None => return,
        };
        let mut packet = match packet {
            Ok(p) => p,
            Err(_) => return,
        };
        // Frames from the controller must never fall to the RSSI floor.
        packet.info = PacketInfo {
            rssi: u8::max_value(),
            sender: self.conf.my_address,
        };
        self.enqueue_rx(packet);
    }

    fn enqueue_rx(&mut self, packet: Packet) {
        let handle = match self.pool.adopt(packet) {
            Ok(h) => h,
            Err(_) => {
                debug!("rx packet dropped, pool exhausted");
                return;
            }
        };
        if self.rx_queue.push(handle).is_err() {
            debug!("rx packet dropped, mailbox full");
            self.pool.free(handle);
        }
    }

    /// Runs the node: dispatches received packets, fires due timers, drains
    /// the send mailboxes. Returns the instant by which the platform must
    /// call `poll` again.
    pub fn poll(&mut self, tx: &mut C::Transmitter, uplink: &mut C::ControllerLink) -> Instant {
        if self.options.sink && !self.reg_proxy_sent {
            self.reg_proxy_sent = true;
            self.emit_reg_proxy(uplink);
        }

        while let Some(handle) = self.rx_queue.pop() {
            self.handle_packet(handle, uplink);
        }

        self.fire_timers();
        self.drain_unicast(tx, uplink);
        self.drain_broadcast(tx);

        let gated_live = self.conf.is_active;
        let message_live = !self.options.sink;
        self.timers.next_wakeup(gated_live, message_live)
    }


    /// Entry point of the packet dispatcher.
    fn handle_packet(&mut self, handle: PacketHandle, uplink: &mut C::ControllerLink) {
        let (rssi, net, typ, nxh, sender) = match self.pool.get(handle) {
            Some(p) => (p.info.rssi, p.net(), p.typ(), p.nxh(), p.info.sender),
            None => return,
        };

        if rssi < self.conf.rssi_min || net != self.conf.my_net {
            self.pool.free(handle);
            return;
        }

        if typ == PacketType::Beacon {
            self.handle_beacon(handle);
            return;
        }

        if nxh != self.conf.my_address {
            // Overheard but not addressed to us at the link layer.
            debug!("dropped frame for {:?}", nxh);
            self.pool.free(handle);
            return;
        }

        self.neighbors.rx_inc(sender);

        match typ {
            PacketType::Data => self.handle_data(handle),
            PacketType::Response => self.handle_response(handle),
            PacketType::OpenPath => self.handle_open_path(handle),
            PacketType::Config => self.handle_config(handle, uplink),
            PacketType::WebReq => self.handle_web_req(handle),
            // REPORT, REQUEST and anything newer flow toward the sink.
            _ => self.handle_report(handle, uplink),
        }
    }

    fn handle_beacon(&mut self, handle: PacketHandle) {
        let (src, rssi, variant, tv, hops, sink_addr) = match self.pool.get(handle) {
            Some(p) => (
                p.src(),
                p.info.rssi,
                p.payload_at(BEACON_TYPE_INDEX),
                p.payload_at(BEACON_TREE_VERSION_INDEX).unwrap_or(0),
                p.payload_at(BEACON_DEPTH_INDEX).unwrap_or(u8::max_value()),
                p.nxh(),
            ),
            None => return,
        };

        let now = self.timer.now();
        self.neighbors.add(src, rssi, now);

        if variant != Some(BEACON_T_TREE) {
            self.pool.free(handle);
            return;
        }

        if !self.options.sink {
            // Version comparison is 8-bit signed so a controller-initiated
            // rollback (or plain counter wrap) converges instead of wedging
            // the node on a stale high version.
            let diff = tv.wrapping_sub(self.conf.tree_version) as i8;
            if diff < -2 {
                self.conf.tree_version = tv;
            } else if diff > 0 {
                self.adopt_parent(tv, hops, src, rssi, sink_addr);
            } else if diff == 0
                && u16::from(hops) + 1 < u16::from(self.conf.hops_from_sink)
            {
                self.adopt_parent(tv, hops, src, rssi, sink_addr);
            }
        }

        self.pool.free(handle);
    }

    /// Takes `parent` as the next hop toward the sink and tells the mesh by
    /// rebroadcasting the updated tree state.
    fn adopt_parent(
        &mut self,
        tree_version: u8,
        parent_hops: u8,
        parent: NodeAddress,
        rssi: u8,
        sink_address: NodeAddress,
    ) {
        self.conf.tree_version = tree_version;
        self.conf.hops_from_sink = parent_hops.saturating_add(1);
        self.conf.nxh_vs_sink = parent;
        self.conf.distance_from_sink = rssi;
        self.conf.sink_address = sink_address;
        self.flow.set_sink_next_hop(parent);
        info!(
            "TREE: [version: {}, depth: {}, next hop: {:?}]",
            self.conf.tree_version, self.conf.hops_from_sink, self.conf.nxh_vs_sink
        );
        self.send_beacon(0);
    }

    fn handle_data(&mut self, handle: PacketHandle) {
        let (src, dst, hops, message_id) = match self.pool.get(handle) {
            Some(p) => (
                p.src(),
                p.dst(),
                p.payload_at(0).unwrap_or(0),
                p.payload_at(1).unwrap_or(0),
            ),
            None => return,
        };

        self.stats.packets_uc_received_total = self.stats.packets_uc_received_total.wrapping_add(1);

        if dst == self.conf.my_address {
            info!(
                "RXU: [src: {:?}, dst: {:?}, id: {}, hops: {}]",
                src, dst, message_id, hops
            );
            self.stats.packets_uc_received_as_dst =
                self.stats.packets_uc_received_as_dst.wrapping_add(1);
            self.stats.hop_sum = self.stats.hop_sum.wrapping_add(u16::from(hops));
            self.pool.free(handle);
        } else {
            self.stats.packets_uc_sent_total = self.stats.packets_uc_sent_total.wrapping_add(1);
            self.run_match(handle);
        }
    }

    fn handle_report(&mut self, handle: PacketHandle, uplink: &mut C::ControllerLink) {
        if self.options.sink {
            if let Some(p) = self.pool.get(handle) {
                uplink.emit_frame(p.as_bytes());
            }
            self.pool.free(handle);
        } else {
            let next_hop = self.conf.nxh_vs_sink;
            if let Some(p) = self.pool.get_mut(handle) {
                p.set_nxh(next_hop);
            }
            self.enqueue_unicast(handle);
        }
    }

    fn handle_response(&mut self, handle: PacketHandle) {
        let dst = match self.pool.get(handle) {
            Some(p) => p.dst(),
            None => return,
        };
        if dst != self.conf.my_address {
            self.run_match(handle);
            return;
        }

        let entry = match self.pool.get(handle) {
            Some(p) => FlowEntry::from_bytes(&mut ByteReader::new(p.payload())),
            None => return,
        };
        match entry {
            Ok(entry) => {
                debug!("installing controller rule: {:?}", entry);
                self.flow.insert(entry);
            }
            Err(_) => debug!("malformed rule in response, ignoring"),
        }
        self.pool.free(handle);
    }

    fn handle_open_path(&mut self, handle: PacketHandle) {
        let learned = match self.pool.get(handle) {
            Some(p) => parse_open_path(p, self.conf.my_address),
            None => return,
        };

        let path = match learned {
            Some(path) => path,
            None => {
                // Our address is not on the path (or the packet is not well
                // formed enough to learn from): nothing to install here.
                debug!("open-path: nothing to learn, matching");
                self.run_match(handle);
                return;
            }
        };

        if let Some(prev_hop) = path.prev_hop {
            // Reverse path: traffic for the path's first node goes back the
            // way the open-path came.
            self.install_path_rule(path.first, prev_hop, &path.windows);
        }

        match path.next_hop {
            Some(next_hop) => {
                self.install_path_rule(path.last, next_hop, &path.windows);

                // Pass the open-path on to the next node on the path.
                if let Some(p) = self.pool.get_mut(handle) {
                    p.set_dst(next_hop);
                    p.set_nxh(next_hop);
                }
                self.enqueue_unicast(handle);
            }
            None => {
                // Terminal node: the reverse rule is all there is to learn.
                self.pool.free(handle);
            }
        }
    }

    fn install_path_rule(
        &mut self,
        endpoint: NodeAddress,
        next_hop: NodeAddress,
        windows: &[Window],
    ) {
        let mut entry = FlowEntry::with(
            Window::equals_dst(endpoint),
            crate::flow::Action::ForwardUnicast(next_hop),
            u16::from(self.conf.rule_ttl),
        );
        for w in windows {
            let _ = entry.windows.push(*w);
        }
        debug!("open-path rule: {:?} -> {:?}", endpoint, next_hop);
        self.flow.insert(entry);
    }

    fn handle_config(&mut self, handle: PacketHandle, uplink: &mut C::ControllerLink) {
        let (src, dst) = match self.pool.get(handle) {
            Some(p) => (p.src(), p.dst()),
            None => return,
        };

        if dst != self.conf.my_address {
            self.run_match(handle);
            return;
        }

        // On the sink, config traffic coming back from the mesh belongs to
        // the controller; only frames the controller itself injected (src is
        // the sink) are processed locally.
        if self.options.sink && src != self.conf.my_address {
            if let Some(p) = self.pool.get(handle) {
                uplink.emit_frame(p.as_bytes());
            }
            self.pool.free(handle);
            return;
        }

        let op = match self.pool.get(handle).and_then(|p| p.payload_at(0)) {
            Some(op) => op,
            None => {
                self.pool.free(handle);
                return;
            }
        };
        let write = op & 0x80 != 0;
        let param = ConfigParam::from_id(op & 0x7f);

        if write {
            self.apply_config_write(handle, param);
            self.pool.free(handle);
        } else {
            self.apply_config_read(handle, param);
            if let Some(p) = self.pool.get_mut(handle) {
                p.swap_src_dst();
            }
            if self.options.sink {
                if let Some(p) = self.pool.get(handle) {
                    uplink.emit_frame(p.as_bytes());
                }
                self.pool.free(handle);
            } else {
                self.run_match(handle);
            }
        }
    }

    fn apply_config_write(&mut self, handle: PacketHandle, param: Option<ConfigParam>) {
        let param = match param {
            Some(p) => p,
            // Unknown id: ignored, per the error policy.
            None => return,
        };
        match param {
            ConfigParam::Reset => {
                warn!("controller requested reboot");
                self.reboot_requested = true;
            }
            ConfigParam::AddRule => {
                let entry = match self.pool.get(handle) {
                    Some(p) => {
                        let payload = p.payload();
                        if payload.len() < 2 {
                            return;
                        }
                        FlowEntry::from_bytes(&mut ByteReader::new(&payload[1..]))
                    }
                    None => return,
                };
                if let Ok(entry) = entry {
                    self.flow.insert(entry);
                }
            }
            ConfigParam::RemRule => {
                if let Some(index) = self.pool.get(handle).and_then(|p| p.payload_at(1)) {
                    self.flow.remove(usize::from(index));
                }
            }
            _ => {
                let width = match param.width() {
                    Some(w) => w,
                    // Alias and function management is reserved.
                    None => return,
                };
                let value = match self.pool.get(handle) {
                    Some(p) => match width {
                        1 => p.payload_at(1).map(u16::from),
                        _ => match (p.payload_at(1), p.payload_at(2)) {
                            (Some(hi), Some(lo)) => {
                                Some((u16::from(hi) << 8) | u16::from(lo))
                            }
                            _ => None,
                        },
                    },
                    None => return,
                };
                if let Some(value) = value {
                    param.write(&mut self.conf, value);
                }
            }
        }
    }

    fn apply_config_read(&mut self, handle: PacketHandle, param: Option<ConfigParam>) {
        let param = match param {
            Some(p) => p,
            // Unknown id: the reply carries the request payload unchanged.
            None => return,
        };
        if param == ConfigParam::GetRule {
            let index = match self.pool.get(handle).and_then(|p| p.payload_at(1)) {
                Some(i) => usize::from(i),
                None => return,
            };
            let entry = match self.flow.get(index) {
                Some(e) => e,
                None => return,
            };
            if let Some(p) = self.pool.get_mut(handle) {
                let mut written = 0;
                {
                    let region = p.payload_region_mut(2);
                    let mut writer = ByteWriter::new(region);
                    let before = writer.space_left();
                    if entry.to_bytes(&mut writer).is_ok() {
                        written = before - writer.space_left();
                    }
                }
                let target = PLD_INDEX + 2 + written;
                if written > 0 && target > p.len() {
                    let _ = p.extend_len(target - p.len());
                }
            }
            return;
        }

        if let (Some(width), Some(value)) = (param.width(), param.read(&self.conf)) {
            if let Some(p) = self.pool.get_mut(handle) {
                if width == 1 {
                    let _ = p.set_payload_at(1, value as u8);
                } else {
                    let _ = p.set_payload_at(1, (value >> 8) as u8);
                    let _ = p.set_payload_at(2, value as u8);
                }
            }
        }
    }

    fn handle_web_req(&mut self, handle: PacketHandle) {
        let (src, dst, message_id) = match self.pool.get(handle) {
            Some(p) => (p.src(), p.dst(), p.payload_at(0).unwrap_or(0)),
            None => return,
        };
        debug!("WEB: [src: {:?}, dst: {:?}, id: {}]", src, dst, message_id);

        if dst == self.conf.my_address {
            let me = self.conf.my_address;
            let next_hop = self.conf.nxh_vs_sink;
            if let Some(p) = self.pool.get_mut(handle) {
                p.set_dst(src);
                p.set_src(me);
                p.set_nxh(next_hop);
                // Canned response sentinel.
                let _ = p.set_payload_at(1, 5);
                let _ = p.set_payload_at(2, 5);
            }
        }
        self.run_match(handle);
    }


    /// Runs the packet through the flow table and acts on the verdict.
    fn run_match(&mut self, handle: PacketHandle) {
        let status = self.conf.status_block();
        let verdict = {
            let flow = &mut self.flow;
            let pool = &mut self.pool;
            match pool.get_mut(handle) {
                Some(packet) => flow.match_packet(packet, &status),
                None => return,
            }
        };

        match verdict {
            Verdict::ForwardUnicast(_) => self.enqueue_unicast(handle),
            Verdict::ForwardBroadcast => self.enqueue_broadcast(handle),
            Verdict::Drop => self.pool.free(handle),
            Verdict::Upcall => self.send_rule_request(handle),
        }
    }

    /// Asks the controller for a rule: broadcasts a `REQUEST` carrying the
    /// original header and the first two payload bytes, then drops the
    /// original packet.
    fn send_rule_request(&mut self, handle: PacketHandle) {
        let mut excerpt = [0u8; PLD_INDEX + 2];
        match self.pool.get(handle) {
            Some(p) => {
                let frame = p.as_bytes();
                excerpt[..PLD_INDEX].copy_from_slice(&frame[..PLD_INDEX]);
                excerpt[PLD_INDEX] = p.payload_at(0).unwrap_or(0);
                excerpt[PLD_INDEX + 1] = p.payload_at(1).unwrap_or(0);
            }
            None => return,
        }
        self.pool.free(handle);

        let mut packet = Packet::empty();
        packet.set_net(self.conf.my_net);
        packet.set_typ(PacketType::Request);
        packet.set_src(self.conf.my_address);
        packet.set_dst(NodeAddress::BROADCAST);
        // The parent picks the request up and relays it toward the sink;
        // everyone else overhears and drops it.
        packet.set_nxh(self.conf.nxh_vs_sink);
        packet.set_ttl(self.conf.packet_ttl);
        for (i, byte) in excerpt.iter().enumerate() {
            let _ = packet.set_payload_at(i, *byte);
        }

        info!("no rule matched, asking controller");
        match self.pool.adopt(packet) {
            Ok(h) => self.enqueue_broadcast(h),
            Err(_) => debug!("rule request dropped, pool exhausted"),
        }
    }


    fn fire_timers(&mut self) {
        let now = self.timer.now();

        if now.is_after(self.timers.housekeeping) {
            self.flow.age();
            let max_silence = Duration::from_secs(
                u16::from(self.conf.beacon_period).saturating_mul(self.options.neighbor_max_silence),
            );
            self.neighbors.purge(now, max_silence);
            self.timers.rearm_housekeeping(now);
        }

        if self.conf.is_active {
            if now.is_after(self.timers.beacon) {
                if self.options.sink {
                    // Each sink beacon round advertises a fresh tree version,
                    // so the mesh periodically re-converges.
                    self.conf.tree_version = self.conf.tree_version.wrapping_add(1);
                }
                let battery = self.sensors.sample().battery;
                self.send_beacon(battery);
                self.timers.beacon = now + beacon_period(&self.options, &self.conf);
            }

            if now.is_after(self.timers.report) {
                self.send_report();
                if !self.options.sink {
                    if self.conf.reset_period == 0 {
                        self.conf.distance_from_sink = u8::max_value();
                        self.conf.reset_period = conf::DEFAULT_RESET_PERIOD;
                    } else {
                        self.conf.reset_period -= 1;
                    }
                }
                self.timers.report =
                    now + Duration::from_secs(u16::from(self.conf.report_period));
            }

            if now.is_after(self.timers.statistics) {
                if !self.options.sink {
                    self.stats.log_summary();
                }
                self.timers.statistics =
                    now + Duration::from_secs(self.options.statistics_interval);
            }
        }

        if !self.options.sink && now.is_after(self.timers.message) {
            if self.is_traffic_source() {
                self.send_generated_message();
            }
            self.timers.message = now + Duration::from_secs(self.options.message_interval);
        }
    }

    fn is_traffic_source(&self) -> bool {
        self.options.multi || self.conf.my_address.as_u16() == self.options.src
    }

    /// Destination of generated traffic. Under `multi`, nodes pair up by
    /// mirroring their address in the deployment range, so every node talks
    /// to a distinct far-away peer.
    fn message_destination(&self) -> NodeAddress {
        if !self.options.multi {
            return NodeAddress::from_u16(self.options.dst);
        }
        let n = self.options.network_size.max(1);
        let me = self.conf.my_address.as_u16();
        let index = (me.wrapping_sub(1) % n) + 1;
        let mut dest = n + 1 - index;
        if dest == index {
            dest = index % n + 1;
        }
        NodeAddress::from_u16(dest)
    }

    /// Builds and enqueues a tree beacon reflecting the current state.
    fn send_beacon(&mut self, battery: u8) {
        let mut packet = Packet::empty();
        packet.set_net(self.conf.my_net);
        packet.set_typ(PacketType::Beacon);
        packet.set_src(self.conf.my_address);
        packet.set_dst(NodeAddress::BROADCAST);
        packet.set_nxh(self.conf.sink_address);
        packet.set_ttl(self.conf.packet_ttl);
        let _ = packet.set_payload_at(BEACON_HOPS_INDEX, self.conf.hops_from_sink);
        let _ = packet.set_payload_at(BEACON_BATT_INDEX, battery);
        let _ = packet.set_payload_at(BEACON_TREE_VERSION_INDEX, self.conf.tree_version);
        let _ = packet.set_payload_at(BEACON_DEPTH_INDEX, self.conf.hops_from_sink);
        let _ = packet.set_payload_at(BEACON_TYPE_INDEX, BEACON_T_TREE);

        match self.pool.adopt(packet) {
            Ok(h) => self.enqueue_broadcast(h),
            Err(_) => debug!("beacon dropped, pool exhausted"),
        }
    }

    /// Builds and enqueues the periodic report: sensor samples, then the
    /// neighbor block. Sending empties the neighbor table.
    fn send_report(&mut self) {
        let sample = self.sensors.sample();
        let mut packet = Packet::empty();
        packet.set_net(self.conf.my_net);
        packet.set_typ(PacketType::Report);
        packet.set_src(self.conf.my_address);
        packet.set_dst(self.conf.sink_address);
        packet.set_nxh(self.conf.nxh_vs_sink);
        packet.set_ttl(self.conf.packet_ttl);
        let _ = packet.set_payload_at(0, sample.battery);
        let _ = packet.set_payload_at(1, sample.temperature);
        let _ = packet.set_payload_at(2, sample.humidity);
        let _ = packet.set_payload_at(3, sample.light1);
        let _ = packet.set_payload_at(4, sample.light2);
        if self.neighbors.fill_report(&mut packet).is_err() {
            debug!("report truncated, neighbor block did not fit");
        }

        match self.pool.adopt(packet) {
            Ok(h) => self.enqueue_unicast(h),
            Err(_) => debug!("report dropped, pool exhausted"),
        }
    }

    /// Generates one application message toward the configured destination.
    fn send_generated_message(&mut self) {
        let dst = self.message_destination();
        let mut packet = Packet::empty();
        packet.set_net(self.conf.my_net);
        packet.set_typ(PacketType::Data);
        packet.set_src(self.conf.my_address);
        packet.set_dst(dst);
        packet.set_nxh(self.conf.nxh_vs_sink);
        packet.set_ttl(self.conf.packet_ttl);
        let _ = packet.set_payload_at(0, 0);
        let _ = packet.set_payload_at(1, self.message_seq);

        info!(
            "TXU: [dst: {:?}, id: {}, ttl: {}]",
            dst, self.message_seq, self.conf.packet_ttl
        );
        self.message_seq = self.message_seq.wrapping_add(1);
        self.stats.packets_uc_sent_as_src = self.stats.packets_uc_sent_as_src.wrapping_add(1);
        self.stats.packets_uc_sent_total = self.stats.packets_uc_sent_total.wrapping_add(1);

        match self.pool.adopt(packet) {
            Ok(h) => self.run_match(h),
            Err(_) => debug!("generated message dropped, pool exhausted"),
        }
    }

    /// Announces the sink to the controller right after boot.
    fn emit_reg_proxy(&mut self, uplink: &mut C::ControllerLink) {
        let mut packet = Packet::empty();
        packet.set_net(self.conf.my_net);
        packet.set_typ(PacketType::RegProxy);
        packet.set_src(self.conf.my_address);
        packet.set_dst(self.conf.my_address);
        packet.set_nxh(self.conf.my_address);
        packet.set_ttl(self.conf.packet_ttl);
        uplink.emit_frame(packet.as_bytes());
    }


    fn enqueue_unicast(&mut self, handle: PacketHandle) {
        if self.uc_queue.push(handle).is_err() {
            debug!("unicast queue full, dropping");
            self.pool.free(handle);
        }
    }

    fn enqueue_broadcast(&mut self, handle: PacketHandle) {
        if self.bc_queue.push(handle).is_err() {
            debug!("broadcast queue full, dropping");
            self.pool.free(handle);
        }
    }

    fn drain_unicast(&mut self, tx: &mut C::Transmitter, uplink: &mut C::ControllerLink) {
        while let Some(handle) = self.uc_queue.pop() {
            let (dst, nxh) = match self.pool.get_mut(handle) {
                Some(p) => {
                    p.decrement_ttl();
                    (p.dst(), p.nxh())
                }
                None => continue,
            };

            if dst != self.conf.my_address {
                if let Some(p) = self.pool.get(handle) {
                    trace!("TXU {:?}", p);
                    tx.transmit_unicast(p.as_bytes(), nxh.into());
                }
            } else if self.options.sink {
                // Unicast to self on the sink is the mesh-to-controller
                // bridge.
                if let Some(p) = self.pool.get(handle) {
                    uplink.emit_frame(p.as_bytes());
                }
            }

            self.neighbors.tx_inc(nxh);
            self.pool.free(handle);
        }
    }

    fn drain_broadcast(&mut self, tx: &mut C::Transmitter) {
        while let Some(handle) = self.bc_queue.pop() {
            if let Some(p) = self.pool.get_mut(handle) {
                p.decrement_ttl();
            }
            if let Some(p) = self.pool.get(handle) {
                trace!("TXB {:?}", p);
                self.stats.packets_bc_sent = self.stats.packets_bc_sent.wrapping_add(1);
                tx.transmit_broadcast(p.as_bytes());
            }
            self.pool.free(handle);
        }
    }
}

/// What an intermediate node learns from an open-path packet.
struct LearnedPath {
    /// The path's first address (reverse-path endpoint).
    first: NodeAddress,
    /// The path's last address (forward-path endpoint).
    last: NodeAddress,
    /// Predecessor on the path, when this node isn't the first.
    prev_hop: Option<NodeAddress>,
    /// Successor on the path, when this node isn't the last.
    next_hop: Option<NodeAddress>,
    /// The controller-supplied windows, attached to both installed rules.
    windows: Vec<Window, MAX_WINDOWS_PER_ENTRY>,
}

/// Decodes an open-path payload relative to `me`: `N(1) | windows[N*5] |
/// addresses[2 each]`. Returns `None` when there is nothing to learn (we are
/// not on the path, or the payload doesn't parse).
fn parse_open_path(packet: &Packet, me: NodeAddress) -> Option<LearnedPath> {
    let payload = packet.payload();
    let n_windows = usize::from(*payload.get(OPEN_PATH_WINDOWS_INDEX)?);
    let path_start = 1 + n_windows * WINDOW_SIZE;
    if payload.len() < path_start + ADDRESS_LENGTH {
        return None;
    }

    // One slot of each installed rule is taken by the endpoint window.
    if n_windows + 1 > MAX_WINDOWS_PER_ENTRY {
        debug!("open-path with {} windows exceeds rule capacity", n_windows);
        return None;
    }

    let mut windows = Vec::new();
    let mut reader = ByteReader::new(&payload[1..path_start]);
    for _ in 0..n_windows {
        let _ = windows.push(Window::from_bytes(&mut reader).ok()?);
    }

    let path = &payload[path_start..];
    let path_len = path.len() / ADDRESS_LENGTH;
    let address_at = |i: usize| {
        NodeAddress::new([path[i * ADDRESS_LENGTH], path[i * ADDRESS_LENGTH + 1]])
    };

    let my_position = (0..path_len).find(|&i| address_at(i) == me)?;

    Some(LearnedPath {
        first: address_at(0),
        last: address_at(path_len - 1),
        prev_hop: if my_position > 0 {
            Some(address_at(my_position - 1))
        } else {
            None
        },
        next_hop: if my_position < path_len - 1 {
            Some(address_at(my_position + 1))
        } else {
            None
        },
        windows,
    })
}
