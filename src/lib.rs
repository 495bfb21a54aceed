//! An SDN-style data plane for wireless sensor nodes.
//!
//! Every node in the mesh runs the same data plane: it classifies received
//! frames by type, matches them against a flow table whose rules are
//! installed by an external controller, discovers its neighbors from
//! periodic beacons, and maintains a spanning tree toward the *sink* (the
//! one node bridging the mesh to the controller over a serial link).
//!
//! # Using the stack
//!
//! Meshflow is runtime and hardware-agnostic: it does not need an RTOS and
//! accesses the platform only through a handful of traits that need to be
//! implemented once per supported MCU family. The central type is
//! [`node::Node`]. You have to provide it with a few hardware-specific
//! services, bundled in a [`Config`] implementation:
//!
//! * A millisecond-precision [`Timer`].
//! * A [`Transmitter`] that can send unicast and broadcast frames.
//! * A [`ControllerLink`] for the serial uplink (sink nodes only; others
//!   use [`uart::NoController`]).
//! * A [`Sensors`] source for the report samples.
//!
//! Received radio frames are handed to [`node::Node::radio_receive`], serial
//! bytes to [`node::Node::uart_receive_byte`], and the platform calls
//! [`node::Node::poll`] whenever the instant returned by the previous call
//! has passed (or new input arrived).
//!
//! [`Config`]: config/trait.Config.html
//! [`Timer`]: time/trait.Timer.html
//! [`Transmitter`]: link/trait.Transmitter.html
//! [`ControllerLink`]: uart/trait.ControllerLink.html
//! [`Sensors`]: config/trait.Sensors.html

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod log;
#[macro_use]
mod utils;
pub mod bytes;
pub mod config;
mod error;
pub mod flow;
pub mod link;
pub mod node;
pub mod packet;
pub mod time;
pub mod uart;

pub use self::error::Error;
