//! Simulated panel.
//!
//! `PanelScript` describes the clock/data waveform a panel would put on
//! the bus: each scripted frame is `bits` clock periods of 1 ms (high for
//! the first half, low for the second) followed by a 5 ms idle gap with
//! the clock low. During the low half the data line carries the frame's
//! bit; during the high half it echoes whatever the keypad side drives.
//!
//! `SimPins` samples that waveform at the current time, taken either from
//! a shared virtual clock (`simulated_bus`, used by tests: sleeping just
//! advances time) or from `CLOCK_MONOTONIC` (`SimPins::realtime`, used by
//! `keybusd --simulate`).
//!
//! A non-repeating script ends with a one-bit trailer frame: the sampler
//! only hands a frame over when the next frame starts, so the trailer
//! flushes the last scripted frame.

use crate::drivers::clock::MonotonicClock;
use keybus_common::codec::BusWord;
use keybus_common::codec::keys::{Key, encode};
use keybus_common::consts::{NSEC_PER_SEC, WORD_BITS};
use keybus_common::hal::driver::{BusClock, HalError, PinIo};
use keybus_common::hal::types::{Deadline, Direction, Level, Pin};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Clock period of one bus bit.
pub const BIT_PERIOD_NS: i64 = 1_000_000;

/// Idle gap between frames.
pub const FRAME_GAP_NS: i64 = 5_000_000;

/// Time of the first scripted rising edge after the script origin.
pub const DEFAULT_ORIGIN_NS: i64 = 1_000_000;

/// One scripted frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptFrame {
    /// Panel bits, sent MSB (symbol 0) first.
    pub word: BusWord,
    /// Clock periods actually sent; fewer than 64 gives a truncated frame.
    pub bits: usize,
}

impl ScriptFrame {
    /// A full-width frame.
    pub const fn full(word: BusWord) -> Self {
        Self {
            word,
            bits: WORD_BITS,
        }
    }
}

const TRAILER: ScriptFrame = ScriptFrame {
    word: BusWord::EMPTY,
    bits: 1,
};

/// What the bus carries at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    ClockHigh,
    ClockLow(bool),
}

/// Waveform of a simulated panel.
#[derive(Debug, Clone)]
pub struct PanelScript {
    frames: Vec<ScriptFrame>,
    origin_ns: i64,
    repeat: bool,
}

impl PanelScript {
    /// Full-width frames, played once.
    pub fn new(words: impl IntoIterator<Item = BusWord>) -> Self {
        Self::with_frames(words.into_iter().map(ScriptFrame::full).collect())
    }

    /// Explicit frames, played once.
    pub fn with_frames(frames: Vec<ScriptFrame>) -> Self {
        Self {
            frames,
            origin_ns: DEFAULT_ORIGIN_NS,
            repeat: false,
        }
    }

    /// Loop the script forever.
    pub fn repeating(mut self) -> Self {
        self.repeat = true;
        self
    }

    /// Move the first rising edge to `origin_ns`.
    pub fn starting_at(mut self, origin_ns: i64) -> Self {
        self.origin_ns = origin_ns;
        self
    }

    /// A panel cycling through LED, clock, zone and keypad-poll traffic,
    /// with zones 1 and 3 going active and clearing again.
    pub fn demo() -> Self {
        let mut led = code_word(0x05);
        led.set_bit(16, true);

        let mut date = code_word(0xa5);
        for (offset, len, value) in [(9, 4, 1), (13, 4, 6), (19, 4, 5), (23, 5, 22), (28, 5, 12), (33, 6, 15)] {
            put_field(&mut date, offset, len, value);
        }

        let mut zones_active = code_word(0x27);
        put_field(&mut zones_active, 41, 8, 0x05);

        Self::new([
            led,
            date,
            zones_active,
            code_word(0x2d),
            code_word(0x34),
            code_word(0x3e),
            code_word(0x11),
            encode(Key::Idle),
            code_word(0x27),
        ])
        .repeating()
    }

    #[inline]
    fn frame_len(frame: &ScriptFrame) -> i64 {
        frame.bits as i64 * BIT_PERIOD_NS + FRAME_GAP_NS
    }

    fn timeline(&self) -> impl Iterator<Item = &ScriptFrame> + '_ {
        let trailer = (!self.repeat).then_some(&TRAILER);
        self.frames.iter().chain(trailer)
    }

    /// Virtual time by which every scripted frame has been handed over.
    pub fn duration_ns(&self) -> i64 {
        let frames: i64 = self.frames.iter().map(Self::frame_len).sum();
        self.origin_ns + frames + BIT_PERIOD_NS
    }

    fn phase(&self, t_ns: i64) -> Phase {
        let mut rel = t_ns - self.origin_ns;
        if rel < 0 || self.frames.is_empty() {
            return Phase::Idle;
        }
        if self.repeat {
            let cycle: i64 = self.frames.iter().map(Self::frame_len).sum();
            rel %= cycle;
        }
        for frame in self.timeline() {
            let len = Self::frame_len(frame);
            if rel >= len {
                rel -= len;
                continue;
            }
            let bit = (rel / BIT_PERIOD_NS) as usize;
            if bit >= frame.bits {
                return Phase::Idle;
            }
            return if rel % BIT_PERIOD_NS < BIT_PERIOD_NS / 2 {
                Phase::ClockHigh
            } else {
                Phase::ClockLow(frame.word.bit(bit))
            };
        }
        Phase::Idle
    }
}

/// Word carrying `code` and an all-zero payload.
fn code_word(code: u8) -> BusWord {
    BusWord::from_bits(u64::from(code) << 56)
}

/// Write `value` into symbols `offset..offset + len`, MSB first.
fn put_field(word: &mut BusWord, offset: usize, len: usize, value: u32) {
    for i in 0..len {
        word.set_bit(offset + i, (value >> (len - 1 - i)) & 1 == 1);
    }
}

// ─── Time Sources ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum TimeSource {
    Virtual(Arc<AtomicI64>),
    Monotonic { clock: MonotonicClock, epoch: Deadline },
}

impl TimeSource {
    fn now_ns(&self) -> i64 {
        match self {
            Self::Virtual(now) => now.load(Ordering::Acquire),
            Self::Monotonic { clock, epoch } => clock
                .now()
                .map(|now| now.diff_ns(epoch))
                .unwrap_or_default(),
        }
    }
}

/// Virtual clock: sleeping jumps straight to the deadline.
#[derive(Debug, Clone)]
pub struct SimClock {
    now: Arc<AtomicI64>,
}

impl SimClock {
    /// Current virtual time in nanoseconds.
    pub fn now_ns(&self) -> i64 {
        self.now.load(Ordering::Acquire)
    }
}

impl BusClock for SimClock {
    fn now(&self) -> Result<Deadline, HalError> {
        Ok(Deadline::from_nanos(self.now_ns()))
    }

    fn sleep_until(&mut self, deadline: Deadline) {
        self.now.fetch_max(deadline.as_nanos(), Ordering::AcqRel);
    }
}

/// Pins of a simulated panel.
#[derive(Debug, Clone)]
pub struct SimPins {
    script: Arc<PanelScript>,
    time: TimeSource,
    driven: Level,
    output_enabled: bool,
}

impl SimPins {
    /// Pins following `script` in real time, with `epoch` as script time zero.
    pub fn realtime(script: PanelScript, epoch: Deadline) -> Self {
        Self {
            script: Arc::new(script),
            time: TimeSource::Monotonic {
                clock: MonotonicClock::new(),
                epoch,
            },
            driven: Level::Low,
            output_enabled: false,
        }
    }

    /// Level the keypad side currently drives.
    pub fn driven(&self) -> Level {
        self.driven
    }
}

/// Pins and a virtual clock sharing one timeline starting at zero.
pub fn simulated_bus(script: PanelScript) -> (SimPins, SimClock) {
    let now = Arc::new(AtomicI64::new(0));
    let pins = SimPins {
        script: Arc::new(script),
        time: TimeSource::Virtual(Arc::clone(&now)),
        driven: Level::Low,
        output_enabled: false,
    };
    (pins, SimClock { now })
}

impl PinIo for SimPins {
    fn name(&self) -> &'static str {
        "simulation"
    }

    fn configure(&mut self, pin: Pin, direction: Direction) -> Result<(), HalError> {
        match (pin, direction) {
            (Pin::DataOut, dir) => {
                self.output_enabled = dir == Direction::Output;
                Ok(())
            }
            (_, Direction::Input) => Ok(()),
            (pin, Direction::Output) => Err(HalError::InitFailed(format!(
                "{pin:?} is input-only on the simulated panel"
            ))),
        }
    }

    fn read(&self, pin: Pin) -> Level {
        let phase = self.script.phase(self.time.now_ns());
        match (pin, phase) {
            (Pin::ClockIn, Phase::ClockHigh) => Level::High,
            (Pin::ClockIn, _) => Level::Low,
            (Pin::DataIn, Phase::ClockHigh) if self.output_enabled => self.driven,
            (Pin::DataIn, Phase::ClockLow(bit)) => Level::from_bit(bit),
            (Pin::DataIn, _) => Level::High,
            (Pin::DataOut, _) => self.driven,
        }
    }

    fn write(&mut self, pin: Pin, level: Level) {
        if pin == Pin::DataOut {
            self.driven = level;
        }
    }
}

/// Virtual time in whole seconds.
pub fn virtual_secs(clock: &SimClock) -> u64 {
    (clock.now_ns() / NSEC_PER_SEC) as u64
}
