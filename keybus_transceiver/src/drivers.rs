//! Bus driver implementations.
//!
//! - [`gpio`] - BCM2835-family GPIO register block mapped from `/dev/mem`
//! - [`clock`] - `CLOCK_MONOTONIC` absolute-deadline sleeps
//! - [`simulation`] - virtual panel for development and testing
//!
//! Every driver implements `PinIo` or `BusClock` from
//! `keybus_common::hal::driver`; the sampler is generic over both.

pub mod clock;
pub mod gpio;
pub mod simulation;

pub use clock::MonotonicClock;
pub use gpio::GpioPins;
pub use simulation::{PanelScript, SimClock, SimPins, simulated_bus};
