//! System-wide constants for the keybus workspace.
//!
//! Single source of truth for bus geometry and timing. Every timing value
//! is in nanoseconds on `CLOCK_MONOTONIC`. Imported by all crates, no
//! duplication permitted.

// ─── Bus Geometry ───────────────────────────────────────────────────

/// Symbols in one bus word (frame width).
pub const WORD_BITS: usize = 64;

/// Frames with fewer captured bits than this are discarded as noise.
pub const MIN_VALID_BITS: usize = 20;

/// Number of zones reported by the panel.
pub const ZONE_COUNT: usize = 32;

/// Zones carried by one zone-group frame.
pub const ZONES_PER_GROUP: usize = 8;

// ─── Sampler Timing ─────────────────────────────────────────────────

/// Nanoseconds per second.
pub const NSEC_PER_SEC: i64 = 1_000_000_000;

/// Sampler polling slice (10 µs).
pub const POLL_SLICE_NS: i64 = 10_000;

/// Panel-read sample offset after the clock falling edge (0.12 ms).
pub const PANEL_SAMPLE_OFFSET_NS: i64 = 120_000;

/// Keypad read-back sample offset after the clock rising edge (0.30 ms).
pub const KEYPAD_SAMPLE_OFFSET_NS: i64 = 300_000;

/// Data hold time after the keypad sample before releasing the line (0.22 ms).
pub const DATA_HOLD_NS: i64 = 220_000;

/// A rising edge later than this after the previous one starts a new word (2.5 ms).
pub const FRAME_VALIDITY_NS: i64 = 2_500_000;

// ─── Periodic Tasks ─────────────────────────────────────────────────

/// Decoder wake period (5 ms).
pub const DECODER_PERIOD_NS: i64 = 5_000_000;

/// Predictor wake period (1 s).
pub const PREDICTOR_PERIOD_NS: i64 = NSEC_PER_SEC;

// ─── Queues & Text ──────────────────────────────────────────────────

/// Default depth of each link queue, in words (~1 minute of bus traffic).
pub const DEFAULT_QUEUE_WORDS: usize = 1024;

/// Maximum length of a decoded status line in bytes.
pub const STATUS_TEXT_CAP: usize = 64;

/// Maximum digits accepted in one numeric network request.
pub const MAX_REQUEST_DIGITS: usize = 4;

// ─── Real-Time Defaults ─────────────────────────────────────────────

/// Sampler SCHED_FIFO priority; must be the highest of all core threads.
pub const SAMPLER_PRIORITY: i32 = 90;

/// Decoder and responder SCHED_FIFO priority.
pub const DECODER_PRIORITY: i32 = 70;

/// Predictor SCHED_FIFO priority.
pub const PREDICTOR_PRIORITY: i32 = 50;

/// Heap region pre-faulted at startup (32 MiB).
pub const PREFAULT_HEAP_BYTES: usize = 32 * 1024 * 1024;

/// Extra stack reserved for each RT thread (100 KiB).
pub const RT_STACK_BYTES: usize = 100 * 1024;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/keybus/keybus.toml";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_fits_in_u64() {
        assert_eq!(WORD_BITS, u64::BITS as usize);
        assert!(MIN_VALID_BITS < WORD_BITS);
    }

    #[test]
    fn zone_groups_cover_all_zones() {
        assert_eq!(ZONE_COUNT % ZONES_PER_GROUP, 0);
        assert_eq!(ZONE_COUNT / ZONES_PER_GROUP, 4);
    }

    #[test]
    fn keypad_phase_fits_in_half_clock() {
        // Keypad phase plus panel sample must land inside one 1 ms clock period.
        assert!(KEYPAD_SAMPLE_OFFSET_NS + DATA_HOLD_NS + PANEL_SAMPLE_OFFSET_NS < 1_000_000);
        assert!(FRAME_VALIDITY_NS > 1_000_000);
    }

    #[test]
    fn priorities_are_ordered() {
        assert!(SAMPLER_PRIORITY > DECODER_PRIORITY);
        assert!(DECODER_PRIORITY > PREDICTOR_PRIORITY);
    }
}
