//! Keybus frame codec.
//!
//! - `word`: `BusWord`, the 64-symbol frame container and field extraction.
//! - `keys`: keypad symbols and their literal outgoing bit patterns (`encode`).
//! - `message`: typed decoded messages and their status-line rendering.
//! - `decode`: code-dispatched payload decoding (`decode`).
//!
//! The wire layout is a fixed lookup table per command code. Nothing here
//! validates integrity: the protocol carries no checksum this codec can
//! verify, so a corrupted frame decodes to whatever its bits say or
//! degrades to an "unknown" message.

pub mod decode;
pub mod keys;
pub mod message;
pub mod word;

pub use decode::{Decoded, decode};
pub use keys::{Key, encode};
pub use message::{KeypadEvent, LedFlags, PanelDateTime, PanelMessage, ZoneGroup, ZoneReport};
pub use word::BusWord;
