//! Bit-level bus sampler.
//!
//! Polls the clock line every `poll_slice_ns` on absolute deadlines and
//! acts on its edges.
//!
//! ## Rising Edge (keypad phase)
//! 1. If the previous rising edge is older than `frame_validity_ns` the
//!    last word is complete: words with at least `min_valid_bits` bits are
//!    handed over (panel word, then keypad echo) and the next command is
//!    taken from the command queue; shorter words are dropped and the
//!    current command is kept for retransmission.
//! 2. Drive the current command's bit onto the data line.
//! 3. After `keypad_sample_offset_ns`, read the line back (keypad echo).
//! 4. After `data_hold_ns`, release the line.
//!
//! ## Falling Edge (panel phase)
//! After `panel_sample_offset_ns`, read the panel's bit and store it
//! together with the keypad echo at the current bit position.
//!
//! All waits advance one running deadline, so time spent in a phase is
//! never lost to drift. The hot path does not allocate, lock or log
//! except on frame boundaries.

use keybus_common::codec::keys::{Key, encode};
use keybus_common::codec::word::BusWord;
use keybus_common::config::BusConfig;
use keybus_common::consts::WORD_BITS;
use keybus_common::hal::driver::{BusClock, HalError, PinIo};
use keybus_common::hal::types::{Deadline, Direction, Level, Pin};
use keybus_common::link::{FrameConsumer, FrameProducer, Pushed};
use tracing::{debug, info, warn};

/// Command transmitted while the command queue is empty.
pub const IDLE_COMMAND: BusWord = encode(Key::Idle);

/// Frames between two statistics log lines.
const STATS_LOG_INTERVAL: u64 = 1000;

/// Sampler timing, copied out of `[bus]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerTiming {
    /// Clock polling slice.
    pub poll_slice_ns: i64,
    /// Panel sample offset after a falling edge.
    pub panel_sample_offset_ns: i64,
    /// Keypad read-back offset after a rising edge.
    pub keypad_sample_offset_ns: i64,
    /// Line hold after the keypad read-back.
    pub data_hold_ns: i64,
    /// Rising-edge gap that closes a word.
    pub frame_validity_ns: i64,
    /// Shortest word handed over.
    pub min_valid_bits: usize,
}

impl From<&BusConfig> for SamplerTiming {
    fn from(bus: &BusConfig) -> Self {
        Self {
            poll_slice_ns: bus.poll_slice_ns,
            panel_sample_offset_ns: bus.panel_sample_offset_ns,
            keypad_sample_offset_ns: bus.keypad_sample_offset_ns,
            data_hold_ns: bus.data_hold_ns,
            frame_validity_ns: bus.frame_validity_ns,
            min_valid_bits: bus.min_valid_bits,
        }
    }
}

impl Default for SamplerTiming {
    fn default() -> Self {
        Self::from(&BusConfig::default())
    }
}

/// Sampler counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplerStats {
    /// Complete words handed over.
    pub frames: u64,
    /// Words dropped for having too few bits.
    pub short_frames: u64,
    /// Pushes that overwrote an unread word.
    pub overflows: u64,
    /// Commands taken from the command queue.
    pub commands_sent: u64,
}

/// The bus sampler. Owns the pins, the clock and both queue ends it uses.
pub struct BusSampler<P: PinIo, C: BusClock> {
    pins: P,
    clock: C,
    timing: SamplerTiming,
    frames_out: FrameProducer,
    commands_in: FrameConsumer,

    deadline: Deadline,
    last_rise: Deadline,
    clock_high: bool,
    bit_index: usize,
    panel_word: BusWord,
    keypad_word: BusWord,
    command: BusWord,
    stats: SamplerStats,
}

impl<P: PinIo, C: BusClock> std::fmt::Debug for BusSampler<P, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusSampler")
            .field("pins", &self.pins.name())
            .field("deadline", &self.deadline)
            .field("bit_index", &self.bit_index)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl<P: PinIo, C: BusClock> BusSampler<P, C> {
    /// Configure the pins, release the data line and start timing at `now`.
    ///
    /// # Errors
    /// Pin configuration or clock failures.
    pub fn new(
        mut pins: P,
        clock: C,
        timing: SamplerTiming,
        frames_out: FrameProducer,
        commands_in: FrameConsumer,
    ) -> Result<Self, HalError> {
        pins.configure(Pin::ClockIn, Direction::Input)?;
        pins.configure(Pin::DataIn, Direction::Input)?;
        pins.configure(Pin::DataOut, Direction::Output)?;
        pins.write(Pin::DataOut, Level::Low);

        let now = clock.now()?;
        info!(
            driver = pins.name(),
            slice_ns = timing.poll_slice_ns,
            "bus sampler ready"
        );
        Ok(Self {
            pins,
            clock,
            timing,
            frames_out,
            commands_in,
            deadline: now,
            last_rise: now,
            clock_high: false,
            bit_index: 0,
            panel_word: BusWord::EMPTY,
            keypad_word: BusWord::EMPTY,
            command: IDLE_COMMAND,
            stats: SamplerStats::default(),
        })
    }

    /// Counters so far.
    pub fn stats(&self) -> SamplerStats {
        self.stats
    }

    /// Command currently being transmitted.
    pub fn command(&self) -> BusWord {
        self.command
    }

    /// Pin driver.
    pub fn pins(&self) -> &P {
        &self.pins
    }

    #[inline]
    fn wait(&mut self, ns: i64) {
        self.deadline = self.deadline.add_ns(ns);
        self.clock.sleep_until(self.deadline);
    }

    /// One polling slice: wait, sample the clock, handle an edge if any.
    #[inline]
    pub fn poll(&mut self) {
        self.wait(self.timing.poll_slice_ns);
        match self.pins.read(Pin::ClockIn) {
            Level::High if !self.clock_high => self.on_rising_edge(),
            Level::Low if self.clock_high => self.on_falling_edge(),
            _ => {}
        }
    }

    /// Poll until the running deadline reaches `end`.
    pub fn run_until(&mut self, end: Deadline) {
        while self.deadline < end {
            self.poll();
        }
    }

    /// Poll forever.
    pub fn run(&mut self) -> ! {
        loop {
            self.poll();
        }
    }

    fn on_rising_edge(&mut self) {
        if self.deadline.diff_ns(&self.last_rise) > self.timing.frame_validity_ns {
            self.close_word();
        }
        self.last_rise = self.deadline;
        self.clock_high = true;

        let bit = self.command.bit(self.bit_index);
        self.pins.write(Pin::DataOut, Level::from_bit(bit));
        self.wait(self.timing.keypad_sample_offset_ns);
        let echo = self.pins.read(Pin::DataIn).to_bit();
        self.keypad_word.set_bit(self.bit_index, echo);
        self.wait(self.timing.data_hold_ns);
        self.pins.write(Pin::DataOut, Level::Low);
    }

    fn on_falling_edge(&mut self) {
        self.clock_high = false;
        self.wait(self.timing.panel_sample_offset_ns);
        let bit = self.pins.read(Pin::DataIn).to_bit();
        self.panel_word.set_bit(self.bit_index, bit);
        self.bit_index = (self.bit_index + 1).min(WORD_BITS - 1);
    }

    fn close_word(&mut self) {
        let bits = self.bit_index;
        if bits < self.timing.min_valid_bits {
            self.stats.short_frames += 1;
            warn!(bits, "short frame dropped; retransmitting command");
        } else {
            self.hand_over(self.panel_word);
            self.hand_over(self.keypad_word);
            self.stats.frames += 1;

            self.command = match self.commands_in.pop() {
                Some(word) => {
                    self.stats.commands_sent += 1;
                    word
                }
                None => IDLE_COMMAND,
            };

            if self.stats.frames % STATS_LOG_INTERVAL == 0 {
                debug!(
                    frames = self.stats.frames,
                    short = self.stats.short_frames,
                    overflows = self.stats.overflows,
                    commands = self.stats.commands_sent,
                    "sampler stats"
                );
            }
        }
        self.bit_index = 0;
        self.panel_word = BusWord::EMPTY;
        self.keypad_word = BusWord::EMPTY;
    }

    fn hand_over(&mut self, word: BusWord) {
        match self.frames_out.push(word) {
            Ok(Pushed::Stored) => {}
            Ok(Pushed::Overwrote) => {
                self.stats.overflows += 1;
                warn!("bus queue full; oldest frame overwritten");
            }
            Err(e) => {
                self.stats.overflows += 1;
                warn!("bus queue rejected frame: {e}");
            }
        }
    }
}
