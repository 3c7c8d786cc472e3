//! Prelude module for common re-exports.
//!
//! `use keybus_common::prelude::*;` brings in the types every task of the
//! transceiver touches.

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, KeybusConfig, LogLevel, SharedConfig};

// ─── Hardware Contract ──────────────────────────────────────────────
pub use crate::hal::driver::{BusClock, HalError, PinIo};
pub use crate::hal::types::{Deadline, Direction, Level, Pin};

// ─── Codec ──────────────────────────────────────────────────────────
pub use crate::codec::{BusWord, Decoded, Key, PanelMessage, ZoneGroup, ZoneReport, decode, encode};

// ─── Link Queues ────────────────────────────────────────────────────
pub use crate::link::{FrameConsumer, FrameProducer, OverflowPolicy, Pushed, QueueError, channel};

// ─── Status ─────────────────────────────────────────────────────────
pub use crate::status::{
    StatusLine, StatusReader, StatusSnapshot, StatusText, StatusWriter, status_store,
};
pub use crate::zones::{ZoneRecord, ZoneTracker};
