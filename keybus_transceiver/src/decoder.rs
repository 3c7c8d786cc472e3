//! Decoder task.
//!
//! Wakes every `DECODER_PERIOD_NS` on an absolute deadline and drains the
//! bus → app queue. For each word it:
//! 1. decodes it,
//! 2. applies zone-group frames to the `ZoneTracker` and republishes the
//!    zone records,
//! 3. stamps the observation time,
//! 4. replaces the LED or zone-group status line the frame belongs to,
//! 5. emits one line on the `keybus::trace` target.
//!
//! The observation time is the wake deadline in whole monotonic seconds.

use keybus_common::codec::word::BusWord;
use keybus_common::codec::{Decoded, decode};
use keybus_common::hal::driver::{BusClock, HalError};
use keybus_common::hal::types::Deadline;
use keybus_common::link::FrameConsumer;
use keybus_common::status::{self, StatusLine, StatusWriter};
use keybus_common::zones::ZoneTracker;
use std::convert::Infallible;
use std::fmt;
use tracing::{debug, info, warn};

/// Eight payload bytes rendered as `0x%02x ` each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HexBytes(pub [u8; 8]);

impl fmt::Display for HexBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "0x{byte:02x} ")?;
        }
        Ok(())
    }
}

/// Consumer side of the bus link.
#[derive(Debug)]
pub struct Decoder {
    frames_in: FrameConsumer,
    status: StatusWriter,
    zones: ZoneTracker,
    index: u64,
    lost_reported: u64,
}

impl Decoder {
    /// Own the bus → app consumer and the status writer.
    pub fn new(frames_in: FrameConsumer, status: StatusWriter) -> Self {
        Self {
            frames_in,
            status,
            zones: ZoneTracker::new(),
            index: 0,
            lost_reported: 0,
        }
    }

    /// Words decoded so far.
    pub fn decoded(&self) -> u64 {
        self.index
    }

    /// Zone history built so far.
    pub fn zones(&self) -> &ZoneTracker {
        &self.zones
    }

    /// Decode one word observed at `obs_time` and publish the result.
    pub fn process(&mut self, word: BusWord, obs_time: u64) -> Decoded {
        let decoded = decode(&word);

        if let Some(report) = decoded.zones() {
            if self.zones.apply(&report, obs_time) > 0 {
                self.status.set_zones(&self.zones);
            }
        }
        self.status.set_obs_time(obs_time);

        if let Some(line) = StatusLine::for_message(&decoded.message) {
            match status::render(&decoded.message) {
                Ok(text) => self.status.set_line(line, &text),
                Err(_) => warn!(code = decoded.code, "status line too long; kept previous text"),
            }
        }

        info!(
            target: "keybus::trace",
            index = self.index,
            message = %decoded.message,
            data = %HexBytes(word.to_bytes())
        );
        self.index += 1;
        decoded
    }

    /// Decode every queued word. Returns how many were processed.
    pub fn drain(&mut self, now: Deadline) -> usize {
        let obs_time = now.secs().max(0) as u64;
        let mut count = 0;
        while let Some(word) = self.frames_in.pop() {
            self.process(word, obs_time);
            count += 1;
        }

        let lost = self.frames_in.lost();
        if lost > self.lost_reported {
            warn!(
                lost = lost - self.lost_reported,
                "bus frames overwritten before decoding"
            );
            self.lost_reported = lost;
        }
        count
    }

    /// Drain every `period_ns` forever.
    ///
    /// # Errors
    /// Returns only if the clock cannot be read.
    pub fn run<C: BusClock>(&mut self, mut clock: C, period_ns: i64) -> Result<Infallible, HalError> {
        let mut deadline = clock.now()?;
        debug!(period_ns, "decoder started");
        loop {
            deadline = deadline.add_ns(period_ns);
            clock.sleep_until(deadline);
            self.drain(deadline);
        }
    }
}
