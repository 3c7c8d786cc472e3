//! Shared panel status.
//!
//! `status_store()` returns the single `StatusWriter` (owned by the
//! decoder) and a cloneable `StatusReader` for the responder and the
//! predictor. Every field is updated independently and no lock wraps a
//! whole update: a reader may observe a snapshot mixing old and new fields.
//! Individual fields are never torn. Numbers are plain atomics and each
//! status line sits in its own odd/even sequence cell, so a reader always
//! sees one complete line.
//!
//! Status lines are `StatusText`, a bounded 64-byte string. Rendering a
//! message that does not fit is an error rather than a silent truncation.

use crate::codec::message::{PanelMessage, ZoneGroup};
use crate::consts::{STATUS_TEXT_CAP, ZONE_COUNT};
use crate::zones::{ZoneRecord, ZoneTracker};
use core::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering, fence};

/// Bounded status line.
pub type StatusText = heapless::String<STATUS_TEXT_CAP>;

/// Render `message` as a status line.
///
/// # Errors
/// `core::fmt::Error` if the rendered text exceeds `STATUS_TEXT_CAP` bytes.
pub fn render(message: &PanelMessage) -> Result<StatusText, core::fmt::Error> {
    let mut text = StatusText::new();
    write!(text, "{message}")?;
    Ok(text)
}

/// Which status line a decoded frame updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusLine {
    /// Keypad LED line.
    Led,
    /// One zone-group line.
    Zones(ZoneGroup),
}

impl StatusLine {
    /// All lines in response order.
    pub const ALL: [StatusLine; 5] = [
        Self::Led,
        Self::Zones(ZoneGroup::First),
        Self::Zones(ZoneGroup::Second),
        Self::Zones(ZoneGroup::Third),
        Self::Zones(ZoneGroup::Fourth),
    ];

    /// Line updated by `message`, if any.
    pub const fn for_message(message: &PanelMessage) -> Option<Self> {
        match message {
            PanelMessage::LedStatus(_) => Some(Self::Led),
            PanelMessage::Zones(report) => Some(Self::Zones(report.group)),
            _ => None,
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::Led => 0,
            Self::Zones(group) => 1 + group as usize,
        }
    }
}

// ─── Text Cell ──────────────────────────────────────────────────────

const TEXT_WORDS: usize = STATUS_TEXT_CAP / 8;

/// One status line guarded by an odd/even sequence counter.
#[derive(Debug, Default)]
struct TextCell {
    seq: AtomicU64,
    len: AtomicU64,
    bytes: [AtomicU64; TEXT_WORDS],
}

impl TextCell {
    fn store(&self, text: &str) {
        let mut buf = [0u8; STATUS_TEXT_CAP];
        buf[..text.len()].copy_from_slice(text.as_bytes());

        let seq = self.seq.load(Ordering::Relaxed);
        self.seq.store(seq.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);
        for (cell, chunk) in self.bytes.iter().zip(buf.chunks_exact(8)) {
            let mut word = [0u8; 8];
            word.copy_from_slice(chunk);
            cell.store(u64::from_le_bytes(word), Ordering::Relaxed);
        }
        self.len.store(text.len() as u64, Ordering::Relaxed);
        self.seq.store(seq.wrapping_add(2), Ordering::Release);
    }

    fn load(&self) -> StatusText {
        let mut buf = [0u8; STATUS_TEXT_CAP];
        loop {
            let before = self.seq.load(Ordering::Acquire);
            if before & 1 == 1 {
                std::hint::spin_loop();
                continue;
            }
            for (cell, chunk) in self.bytes.iter().zip(buf.chunks_exact_mut(8)) {
                chunk.copy_from_slice(&cell.load(Ordering::Relaxed).to_le_bytes());
            }
            let len = self.len.load(Ordering::Relaxed) as usize;
            fence(Ordering::Acquire);
            if self.seq.load(Ordering::Relaxed) != before {
                continue;
            }

            let mut text = StatusText::new();
            if let Ok(s) = core::str::from_utf8(&buf[..len.min(STATUS_TEXT_CAP)]) {
                let _ = text.push_str(s);
            }
            return text;
        }
    }
}

// ─── Store ──────────────────────────────────────────────────────────

#[derive(Debug)]
struct Store {
    obs_time: AtomicU64,
    activated: [AtomicU64; ZONE_COUNT],
    deactivated: [AtomicU64; ZONE_COUNT],
    lines: [TextCell; 5],
}

/// Build an empty store and return its writer and a reader.
pub fn status_store() -> (StatusWriter, StatusReader) {
    let store = Arc::new(Store {
        obs_time: AtomicU64::new(0),
        activated: std::array::from_fn(|_| AtomicU64::new(0)),
        deactivated: std::array::from_fn(|_| AtomicU64::new(0)),
        lines: Default::default(),
    });
    (
        StatusWriter {
            store: Arc::clone(&store),
        },
        StatusReader { store },
    )
}

/// Exclusive writing handle.
#[derive(Debug)]
pub struct StatusWriter {
    store: Arc<Store>,
}

impl StatusWriter {
    /// Observation time of the latest decoded frame.
    #[inline]
    pub fn set_obs_time(&mut self, secs: u64) {
        self.store.obs_time.store(secs, Ordering::Release);
    }

    /// Replace one status line.
    pub fn set_line(&mut self, line: StatusLine, text: &StatusText) {
        self.store.lines[line.index()].store(text);
    }

    /// Copy every zone record from `tracker`.
    pub fn set_zones(&mut self, tracker: &ZoneTracker) {
        for (i, record) in tracker.records().iter().enumerate() {
            self.store.activated[i].store(record.activated, Ordering::Release);
            self.store.deactivated[i].store(record.deactivated, Ordering::Release);
        }
    }

    /// A reader sharing this store.
    pub fn reader(&self) -> StatusReader {
        StatusReader {
            store: Arc::clone(&self.store),
        }
    }
}

/// Shared reading handle. Never blocks the writer.
#[derive(Debug, Clone)]
pub struct StatusReader {
    store: Arc<Store>,
}

impl StatusReader {
    /// Observation time of the latest decoded frame.
    #[inline]
    pub fn obs_time(&self) -> u64 {
        self.store.obs_time.load(Ordering::Acquire)
    }

    /// Current text of one status line.
    pub fn line(&self, line: StatusLine) -> StatusText {
        self.store.lines[line.index()].load()
    }

    /// Record of zone `id` (1..=32).
    pub fn zone(&self, id: usize) -> Option<ZoneRecord> {
        let i = id.checked_sub(1).filter(|&i| i < ZONE_COUNT)?;
        Some(ZoneRecord {
            activated: self.store.activated[i].load(Ordering::Acquire),
            deactivated: self.store.deactivated[i].load(Ordering::Acquire),
        })
    }

    /// Field-by-field copy of the whole store.
    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            obs_time: self.obs_time(),
            lines: StatusLine::ALL.map(|line| self.line(line)),
            activated: std::array::from_fn(|i| self.store.activated[i].load(Ordering::Acquire)),
            deactivated: std::array::from_fn(|i| {
                self.store.deactivated[i].load(Ordering::Acquire)
            }),
        }
    }
}

/// Plain copy of the store; may mix fields from different updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    /// Observation time (monotonic seconds).
    pub obs_time: u64,
    /// LED line then zone-group lines 1..=4.
    pub lines: [StatusText; 5],
    /// Activation timestamps, zone 1 first.
    pub activated: [u64; ZONE_COUNT],
    /// Deactivation timestamps, zone 1 first.
    pub deactivated: [u64; ZONE_COUNT],
}

impl StatusSnapshot {
    /// The 64-value timestamp vector: activations then deactivations.
    pub fn zone_vector(&self) -> [u64; 2 * ZONE_COUNT] {
        let mut out = [0u64; 2 * ZONE_COUNT];
        out[..ZONE_COUNT].copy_from_slice(&self.activated);
        out[ZONE_COUNT..].copy_from_slice(&self.deactivated);
        out
    }

    /// `"<led>, <z1>, <z2>, <z3>, <z4>,"`
    pub fn status_line(&self) -> String {
        let mut out = String::with_capacity(5 * (STATUS_TEXT_CAP + 2));
        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            out.push_str(line);
            out.push(',');
        }
        out
    }
}
