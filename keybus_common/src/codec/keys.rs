//! Keypad symbols and their outgoing command words.
//!
//! Each symbol maps to one literal 64-symbol pattern. The patterns are
//! captured from real keypad traffic and must be transmitted exactly as
//! listed; they are not derived from any formula.
//!
//! Bytes 3..8 are always idle (`0xff`). Bits 11..14 carry the key data
//! and bits 15..16 look like a check field whose meaning is unconfirmed,
//! so nothing here computes or verifies it.

use crate::codec::word::BusWord;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Code byte of every keypad-to-panel frame.
pub const KEYPAD_CODE: u8 = 0xff;

/// A keypad symbol that can be injected onto the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Key {
    /// Digit 0.
    Zero = 0,
    /// Digit 1.
    One = 1,
    /// Digit 2.
    Two = 2,
    /// Digit 3.
    Three = 3,
    /// Digit 4.
    Four = 4,
    /// Digit 5.
    Five = 5,
    /// Digit 6.
    Six = 6,
    /// Digit 7.
    Seven = 7,
    /// Digit 8.
    Eight = 8,
    /// Digit 9.
    Nine = 9,
    /// `*` button.
    Star = 10,
    /// `#` button.
    Pound = 11,
    /// Arm-stay button.
    Stay = 12,
    /// Arm-away button.
    Away = 13,
    /// No button pressed.
    Idle = 14,
}

impl Key {
    /// Every symbol, in discriminant order.
    pub const ALL: [Key; 15] = [
        Key::Zero,
        Key::One,
        Key::Two,
        Key::Three,
        Key::Four,
        Key::Five,
        Key::Six,
        Key::Seven,
        Key::Eight,
        Key::Nine,
        Key::Star,
        Key::Pound,
        Key::Stay,
        Key::Away,
        Key::Idle,
    ];

    /// Digit key for `0..=9`.
    #[inline]
    pub const fn digit(d: u8) -> Option<Self> {
        match d {
            0 => Some(Self::Zero),
            1 => Some(Self::One),
            2 => Some(Self::Two),
            3 => Some(Self::Three),
            4 => Some(Self::Four),
            5 => Some(Self::Five),
            6 => Some(Self::Six),
            7 => Some(Self::Seven),
            8 => Some(Self::Eight),
            9 => Some(Self::Nine),
            _ => None,
        }
    }

    /// Outgoing command word for this symbol.
    pub const fn command_word(self) -> BusWord {
        BusWord::from_bits(match self {
            Self::Zero => 0xFF80_7FFF_FFFF_FFFF,
            Self::One => 0xFF82_FFFF_FFFF_FFFF,
            Self::Two => 0xFF85_7FFF_FFFF_FFFF,
            Self::Three => 0xFF87_7FFF_FFFF_FFFF,
            Self::Four => 0xFF88_FFFF_FFFF_FFFF,
            Self::Five => 0xFF8B_8FFF_FFFF_FFFF,
            Self::Six => 0xFF8D_FFFF_FFFF_FFFF,
            Self::Seven => 0xFF8E_FFFF_FFFF_FFFF,
            Self::Eight => 0xFF91_7FFF_FFFF_FFFF,
            Self::Nine => 0xFF93_FFFF_FFFF_FFFF,
            Self::Star => 0xFF94_7FFF_FFFF_FFFF,
            Self::Pound => 0xFF96_FFFF_FFFF_FFFF,
            Self::Stay => 0xFFD7_FFFF_FFFF_FFFF,
            Self::Away => 0xFFD8_FFFF_FFFF_FFFF,
            Self::Idle => 0xFFFF_FFFF_FFFF_FFFF,
        })
    }

    /// Match the 20-bit button field of a keypad frame.
    ///
    /// Digits 3, 5 and 7 are seen on the bus in two forms: the one a
    /// physical keypad sends and the one this transceiver transmits. Both
    /// are accepted.
    pub const fn from_button_code(code: u32) -> Option<Self> {
        match code {
            0x807ff => Some(Self::Zero),
            0x82fff => Some(Self::One),
            0x857ff => Some(Self::Two),
            0x87fff | 0x877ff => Some(Self::Three),
            0x88fff => Some(Self::Four),
            0x8b7ff | 0x8b8ff => Some(Self::Five),
            0x8dfff => Some(Self::Six),
            0x8e7ff | 0x8efff => Some(Self::Seven),
            0x917ff => Some(Self::Eight),
            0x93fff => Some(Self::Nine),
            0x947ff => Some(Self::Star),
            0x96fff => Some(Self::Pound),
            0xd7fff => Some(Self::Stay),
            0xd8fff => Some(Self::Away),
            _ => None,
        }
    }

    /// Short label (`"4"`, `"*"`, `"stay"`, ...).
    pub const fn label(self) -> &'static str {
        match self {
            Self::Zero => "0",
            Self::One => "1",
            Self::Two => "2",
            Self::Three => "3",
            Self::Four => "4",
            Self::Five => "5",
            Self::Six => "6",
            Self::Seven => "7",
            Self::Eight => "8",
            Self::Nine => "9",
            Self::Star => "*",
            Self::Pound => "#",
            Self::Stay => "stay",
            Self::Away => "away",
            Self::Idle => "idle",
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Command word for `key`.
#[inline]
pub const fn encode(key: Key) -> BusWord {
    key.command_word()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_patterns_match_symbol_strings() {
        let star = "1111111110010100011111111111111111111111111111111111111111111111";
        let five = "1111111110001011100011111111111111111111111111111111111111111111";
        let idle = "1".repeat(64);
        assert_eq!(encode(Key::Star), BusWord::from_symbols(star).unwrap());
        assert_eq!(encode(Key::Five), BusWord::from_symbols(five).unwrap());
        assert_eq!(encode(Key::Idle), BusWord::from_symbols(&idle).unwrap());
    }

    #[test]
    fn every_command_word_is_a_keypad_frame() {
        for key in Key::ALL {
            let word = encode(key);
            assert_eq!(word.code(), KEYPAD_CODE, "{key:?}");
            // Everything after the button field is idle.
            assert_eq!(word.field(32, 32), u32::MAX, "{key:?}");
        }
    }

    #[test]
    fn command_words_are_distinct() {
        for (i, a) in Key::ALL.iter().enumerate() {
            for b in &Key::ALL[i + 1..] {
                assert_ne!(encode(*a), encode(*b), "{a:?} vs {b:?}");
            }
        }
    }

    #[test]
    fn digit_lookup() {
        for d in 0..=9u8 {
            assert_eq!(Key::digit(d).map(|k| k as u8), Some(d));
        }
        assert_eq!(Key::digit(10), None);
    }

    #[test]
    fn button_codes_cover_every_non_idle_key() {
        for key in Key::ALL.into_iter().filter(|k| *k != Key::Idle) {
            let code = encode(key).field(8, 20);
            assert_eq!(Key::from_button_code(code), Some(key));
        }
        assert_eq!(Key::from_button_code(0xfffff), None);
        assert_eq!(Key::from_button_code(0), None);
    }
}
