//! Keybus Common Library
//!
//! Pure data and logic shared by the keybus transceiver and its tests:
//! bus constants, configuration, the pin/clock hardware contract, the
//! frame codec, the link queues between the sampler and its consumers,
//! zone tracking and the shared status store. Nothing here needs
//! real-time privileges or hardware access.
//!
//! # Module Structure
//!
//! - [`consts`] - Bus geometry and timing constants
//! - [`config`] - Configuration loading traits and `KeybusConfig`
//! - [`hal`] - `PinIo` / `BusClock` contracts and `Deadline` arithmetic
//! - [`codec`] - `BusWord`, `decode`, `encode`
//! - [`link`] - Lock-free SPSC frame queues
//! - [`zones`] - Per-zone activation tracking
//! - [`status`] - Shared status store
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use keybus_common::prelude::*;
//!
//! let word = encode(Key::Four);
//! assert_eq!(decode(&word).message.to_string(), "From Keypad button 4 pressed");
//! ```

pub mod codec;
pub mod config;
pub mod consts;
pub mod hal;
pub mod link;
pub mod prelude;
pub mod status;
pub mod zones;
