//! Hardware Register Interface contract.
//!
//! The bus core depends only on the narrow traits defined here:
//! - `driver`: `PinIo` (level/direction access to the bus pins),
//!   `BusClock` (monotonic absolute-deadline sleeping) and `HalError`.
//! - `types`: `Pin`, `Level`, `Direction` and the normalized `Deadline`.
//!
//! Concrete register mappings and clocks live in the transceiver crate.

pub mod driver;
pub mod types;
