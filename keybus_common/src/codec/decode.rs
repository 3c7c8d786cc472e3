//! Frame decoding.
//!
//! `decode` dispatches on the code byte and reads each payload from fixed
//! offsets. It is total: any 64-bit input yields a `Decoded`, with
//! unmatched codes or payloads degrading to an "unknown" message while
//! the raw code is still returned for status routing.

use crate::codec::keys::{KEYPAD_CODE, Key};
use crate::codec::message::{
    KeypadEvent, LedFlags, PanelDateTime, PanelMessage, ZoneGroup, ZoneReport,
};
use crate::codec::word::BusWord;

// ─── Command Codes ──────────────────────────────────────────────────

/// Keypad LED status.
pub const CODE_LED_STATUS: u8 = 0x05;
/// Panel date/time broadcast.
pub const CODE_DATE_TIME: u8 = 0xa5;
/// Zones 1..=8.
pub const CODE_ZONES_1: u8 = 0x27;
/// Zones 9..=16.
pub const CODE_ZONES_2: u8 = 0x2d;
/// Zones 17..=24.
pub const CODE_ZONES_3: u8 = 0x34;
/// Zones 25..=32.
pub const CODE_ZONES_4: u8 = 0x3e;
/// Installer programming mode.
pub const CODE_PROGRAM_MODE: u8 = 0x0a;
/// Keypad poll.
pub const CODE_KEYPAD_QUERY: u8 = 0x11;
/// Codes seen on the bus with no known payload.
pub const CODES_UNDEFINED: [u8; 6] = [0x63, 0x64, 0x69, 0x5d, 0x39, 0xb1];

// ─── Payload Layout ─────────────────────────────────────────────────

const LED_READY: usize = 16;
const LED_ERROR: usize = 12;
const LED_BYPASS: usize = 13;
const LED_MEMORY: usize = 14;
const LED_ARMED: usize = 15;
const LED_PROGRAM: usize = 17;

const DATE_YEAR_TENS: (usize, usize) = (9, 4);
const DATE_YEAR_UNITS: (usize, usize) = (13, 4);
const DATE_MONTH: (usize, usize) = (19, 4);
const DATE_DAY: (usize, usize) = (23, 5);
const DATE_HOUR: (usize, usize) = (28, 5);
const DATE_MINUTE: (usize, usize) = (33, 6);

const ZONE_BITMAP: (usize, usize) = (41, 8);

const KEYPAD_IDLE: (usize, usize) = (8, 32);
const KEYPAD_BUTTON: (usize, usize) = (8, 20);

/// Result of decoding one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Decoded {
    /// Raw code byte.
    pub code: u8,
    /// Interpreted payload.
    pub message: PanelMessage,
}

impl Decoded {
    /// Zone report carried by this frame, if it was a zone-group frame.
    #[inline]
    pub const fn zones(&self) -> Option<ZoneReport> {
        match self.message {
            PanelMessage::Zones(report) => Some(report),
            _ => None,
        }
    }
}

/// Zone group addressed by `code`, if any.
#[inline]
pub const fn zone_group(code: u8) -> Option<ZoneGroup> {
    match code {
        CODE_ZONES_1 => Some(ZoneGroup::First),
        CODE_ZONES_2 => Some(ZoneGroup::Second),
        CODE_ZONES_3 => Some(ZoneGroup::Third),
        CODE_ZONES_4 => Some(ZoneGroup::Fourth),
        _ => None,
    }
}

/// Decode one frame. Pure and total.
pub fn decode(word: &BusWord) -> Decoded {
    let code = word.code();
    let message = match code {
        CODE_LED_STATUS => PanelMessage::LedStatus(decode_leds(word)),
        CODE_DATE_TIME => PanelMessage::DateTime(decode_date(word)),
        CODE_PROGRAM_MODE => PanelMessage::ProgramMode,
        CODE_KEYPAD_QUERY => PanelMessage::KeypadQuery,
        KEYPAD_CODE => PanelMessage::Keypad(decode_keypad(word)),
        c if CODES_UNDEFINED.contains(&c) => PanelMessage::Undefined,
        c => match zone_group(c) {
            Some(group) => PanelMessage::Zones(ZoneReport {
                group,
                bitmap: word.field(ZONE_BITMAP.0, ZONE_BITMAP.1) as u8,
            }),
            None => PanelMessage::Unknown,
        },
    };
    Decoded { code, message }
}

fn decode_leds(word: &BusWord) -> LedFlags {
    let mut leds = LedFlags::empty();
    for (bit, flag) in [
        (LED_READY, LedFlags::READY),
        (LED_ERROR, LedFlags::ERROR),
        (LED_BYPASS, LedFlags::BYPASS),
        (LED_MEMORY, LedFlags::MEMORY),
        (LED_ARMED, LedFlags::ARMED),
        (LED_PROGRAM, LedFlags::PROGRAM),
    ] {
        leds.set(flag, word.bit(bit));
    }
    leds
}

fn decode_date(word: &BusWord) -> PanelDateTime {
    let field = |(offset, len): (usize, usize)| word.field(offset, len) as u8;
    PanelDateTime {
        year_tens: field(DATE_YEAR_TENS),
        year_units: field(DATE_YEAR_UNITS),
        month: field(DATE_MONTH),
        day: field(DATE_DAY),
        hour: field(DATE_HOUR),
        minute: field(DATE_MINUTE),
    }
}

fn decode_keypad(word: &BusWord) -> KeypadEvent {
    if word.field(KEYPAD_IDLE.0, KEYPAD_IDLE.1) == u32::MAX {
        return KeypadEvent::Idle;
    }
    match Key::from_button_code(word.field(KEYPAD_BUTTON.0, KEYPAD_BUTTON.1)) {
        Some(key) => KeypadEvent::Pressed(key),
        None => KeypadEvent::Unrecognized,
    }
}
