//! Node configuration: build-time options and controller-mutable parameters.

use crate::link::NodeAddress;

/// Number of bytes in the status register block exposed to `STATUS`
/// flow-table windows.
pub const STATUS_LENGTH: usize = 8;

/// Build-time node options.
///
/// These correspond to the firmware image configuration: they select the
/// node's role and traffic profile and never change at runtime. Everything
/// the controller can change lives in [`NodeConf`] instead.
#[derive(Debug, Copy, Clone)]
pub struct NodeOptions {
    /// Whether this node bridges the mesh to the controller.
    pub sink: bool,
    /// When set, every non-sink node generates test traffic to a per-node
    /// destination instead of only `src` talking to `dst`.
    pub multi: bool,
    /// Address of the single traffic source (ignored under `multi`).
    pub src: u16,
    /// Destination of generated traffic (ignored under `multi`).
    pub dst: u16,
    /// Number of nodes in the deployment; bounds the per-node destination
    /// derivation under `multi`.
    pub network_size: u16,
    /// Seconds between generated messages.
    pub message_interval: u16,
    /// Seconds before the first generated message.
    pub initial_message_delay: u16,
    /// Seconds between statistics log lines.
    pub statistics_interval: u16,
    /// Seconds a neighbor may stay silent, in beacon periods, before the
    /// aging sweep evicts it.
    pub neighbor_max_silence: u16,
}

impl Default for NodeOptions {
    fn default() -> Self {
        NodeOptions {
            sink: false,
            multi: false,
            src: 3,
            dst: 4,
            network_size: 40,
            message_interval: 10,
            initial_message_delay: 20,
            statistics_interval: 10,
            neighbor_max_silence: 3,
        }
    }
}

/// Default time-to-live for generated packets, in hops.
pub const DEFAULT_PACKET_TTL: u8 = 100;
/// Default beacon period in seconds (the sink stretches this by 3).
pub const DEFAULT_BEACON_PERIOD: u8 = 5;
/// Default report period in seconds.
pub const DEFAULT_REPORT_PERIOD: u8 = 10;
/// Default reset period: number of reports after which a node forgets its
/// distance to the sink.
pub const DEFAULT_RESET_PERIOD: u16 = 900;
/// Default lifetime of an installed flow rule, in seconds.
pub const DEFAULT_RULE_TTL: u8 = 100;

/// Controller-mutable node parameters plus the node's tree state.
///
/// A single `NodeConf` exists for the lifetime of the node, owned by the
/// dispatcher; handlers mutate it in place.
#[derive(Debug, Clone)]
pub struct NodeConf {
    pub my_net: u8,
    pub my_address: NodeAddress,
    pub packet_ttl: u8,
    pub rssi_min: u8,
    pub beacon_period: u8,
    pub report_period: u8,
    pub reset_period: u16,
    pub rule_ttl: u8,

    // Spanning-tree state.
    pub tree_version: u8,
    pub hops_from_sink: u8,
    pub nxh_vs_sink: NodeAddress,
    pub distance_from_sink: u8,
    pub sink_address: NodeAddress,

    /// Set by the first broadcast reception; gates the periodic timers so a
    /// freshly powered mesh doesn't storm beacons before the tree is seeded.
    pub is_active: bool,
}

impl NodeConf {
    pub fn new(my_address: NodeAddress, sink: bool) -> Self {
        NodeConf {
            my_net: 1,
            my_address,
            packet_ttl: DEFAULT_PACKET_TTL,
            rssi_min: 0,
            beacon_period: DEFAULT_BEACON_PERIOD,
            report_period: DEFAULT_REPORT_PERIOD,
            reset_period: DEFAULT_RESET_PERIOD,
            rule_ttl: DEFAULT_RULE_TTL,
            tree_version: 0,
            hops_from_sink: if sink { 0 } else { u8::max_value() },
            nxh_vs_sink: my_address,
            distance_from_sink: if sink { 0 } else { u8::max_value() },
            sink_address: my_address,
            is_active: sink,
        }
    }

    /// Assembles the status register block that `STATUS` windows read.
    pub fn status_block(&self) -> [u8; STATUS_LENGTH] {
        let addr = self.my_address.raw();
        [
            self.my_net,
            addr[0],
            addr[1],
            self.packet_ttl,
            self.rssi_min,
            self.tree_version,
            self.hops_from_sink,
            self.distance_from_sink,
        ]
    }
}

/// Parameters addressable by `CONFIG` packets.
///
/// The id space mirrors the controller protocol; the enum replaces the
/// id-indexed pointer tables of classic firmwares with per-id read/write
/// methods, so an out-of-range id can never touch memory it shouldn't.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConfigParam {
    Reset,
    MyNet,
    MyAddress,
    PacketTtl,
    RssiMin,
    BeaconPeriod,
    ReportPeriod,
    ResetPeriod,
    RuleTtl,
    AddAlias,
    RemAlias,
    GetAlias,
    AddRule,
    RemRule,
    GetRule,
    AddFunction,
    RemFunction,
    GetFunction,
}

impl ConfigParam {
    /// Decodes the low 7 bits of a `CONFIG` op byte.
    pub fn from_id(id: u8) -> Option<Self> {
        Some(match id {
            0 => ConfigParam::Reset,
            1 => ConfigParam::MyNet,
            2 => ConfigParam::MyAddress,
            3 => ConfigParam::PacketTtl,
            4 => ConfigParam::RssiMin,
            5 => ConfigParam::BeaconPeriod,
            6 => ConfigParam::ReportPeriod,
            7 => ConfigParam::ResetPeriod,
            8 => ConfigParam::RuleTtl,
            9 => ConfigParam::AddAlias,
            10 => ConfigParam::RemAlias,
            11 => ConfigParam::GetAlias,
            12 => ConfigParam::AddRule,
            13 => ConfigParam::RemRule,
            14 => ConfigParam::GetRule,
            15 => ConfigParam::AddFunction,
            16 => ConfigParam::RemFunction,
            17 => ConfigParam::GetFunction,
            _ => return None,
        })
    }

    /// Wire width of the parameter value for the scalar parameters, `None`
    /// for everything else.
    pub fn width(self) -> Option<usize> {
        Some(match self {
            ConfigParam::MyNet
            | ConfigParam::PacketTtl
            | ConfigParam::RssiMin
            | ConfigParam::BeaconPeriod
            | ConfigParam::ReportPeriod
            | ConfigParam::RuleTtl => 1,
            ConfigParam::MyAddress | ConfigParam::ResetPeriod => 2,
            _ => return None,
        })
    }

    /// Reads the current value of a scalar parameter.
    pub fn read(self, conf: &NodeConf) -> Option<u16> {
        Some(match self {
            ConfigParam::MyNet => u16::from(conf.my_net),
            ConfigParam::MyAddress => conf.my_address.as_u16(),
            ConfigParam::PacketTtl => u16::from(conf.packet_ttl),
            ConfigParam::RssiMin => u16::from(conf.rssi_min),
            ConfigParam::BeaconPeriod => u16::from(conf.beacon_period),
            ConfigParam::ReportPeriod => u16::from(conf.report_period),
            ConfigParam::ResetPeriod => conf.reset_period,
            ConfigParam::RuleTtl => u16::from(conf.rule_ttl),
            _ => return None,
        })
    }

    /// Writes a scalar parameter. Returns `false` for non-scalar ids.
    pub fn write(self, conf: &mut NodeConf, value: u16) -> bool {
        match self {
            ConfigParam::MyNet => conf.my_net = value as u8,
            ConfigParam::MyAddress => conf.my_address = NodeAddress::from_u16(value),
            ConfigParam::PacketTtl => conf.packet_ttl = value as u8,
            ConfigParam::RssiMin => conf.rssi_min = value as u8,
            ConfigParam::BeaconPeriod => conf.beacon_period = value as u8,
            ConfigParam::ReportPeriod => conf.report_period = value as u8,
            ConfigParam::ResetPeriod => conf.reset_period = value,
            ConfigParam::RuleTtl => conf.rule_ttl = value as u8,
            _ => return false,
        }
        true
    }
}
