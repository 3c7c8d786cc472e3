//! # Keybus Transceiver Library
//!
//! Keypad emulator for a two-wire alarm-panel keybus. A hard real-time
//! sampler bit-bangs the bus, a decoder turns captured frames into panel
//! status, a predictor hands zone history to an external model and a TCP
//! responder injects keypad commands.
//!
//! ## Data Flow
//!
//! ```text
//!  GPIO ──> BusSampler ──(bus→app ring)──> Decoder ──> StatusStore ──> Responder / Predictor
//!   ^           ^                                                          │
//!   └───────────┴─────────────────(app→bus ring)───────────────────────────┘
//! ```
//!
//! ## Threads
//!
//! 1. **sampler** - dedicated CPU, highest `SCHED_FIFO` priority, 10 µs slices
//! 2. **decoder** - worker CPUs, 5 ms period
//! 3. **predictor** - worker CPUs, 1 s period, optional
//! 4. **main** - command responder
//!
//! The real-time path is allocation-free after startup. Without the `rt`
//! feature every privileged setup call is a no-op, so the whole pipeline
//! runs unprivileged against the simulated panel.

pub mod decoder;
pub mod drivers;
pub mod predictor;
pub mod responder;
pub mod rt;
pub mod runtime;
pub mod sampler;
