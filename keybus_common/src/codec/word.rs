//! `BusWord`: one frame of 64 bus symbols.
//!
//! ## Layout
//!
//! Symbol `i` (in sampling order) is stored at bit `63 - i` of the inner
//! `u64`, so byte `k` of `to_be_bytes()` holds symbols `8k..8k+8` and a
//! field `(offset, len)` reads as a big-endian integer, matching how the
//! panel lays out its payloads.

use crate::consts::WORD_BITS;
use std::fmt;

/// One sampled or outgoing bus frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct BusWord(u64);

impl BusWord {
    /// All-zero word; the state of a freshly reset capture buffer.
    pub const EMPTY: Self = Self(0);

    /// Wrap raw packed bits.
    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Raw packed bits.
    #[inline]
    pub const fn bits(&self) -> u64 {
        self.0
    }

    /// Symbol at `index` (0 = first sampled).
    #[inline]
    pub const fn bit(&self, index: usize) -> bool {
        debug_assert!(index < WORD_BITS);
        (self.0 >> (WORD_BITS - 1 - index)) & 1 == 1
    }

    /// Overwrite the symbol at `index`.
    #[inline]
    pub fn set_bit(&mut self, index: usize, bit: bool) {
        debug_assert!(index < WORD_BITS);
        let mask = 1u64 << (WORD_BITS - 1 - index);
        if bit {
            self.0 |= mask;
        } else {
            self.0 &= !mask;
        }
    }

    /// Read `len` symbols starting at `offset` as a big-endian integer.
    ///
    /// `len` is at most 32. Symbols past the end of the word read as zero.
    #[inline]
    pub const fn field(&self, offset: usize, len: usize) -> u32 {
        debug_assert!(len <= 32);
        if len == 0 || offset >= WORD_BITS {
            return 0;
        }
        let shifted = self.0 << offset;
        (shifted >> (WORD_BITS - len)) as u32
    }

    /// The eight payload bytes in transmission order.
    #[inline]
    pub const fn to_bytes(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// The command code (symbols 0..8).
    #[inline]
    pub const fn code(&self) -> u8 {
        self.field(0, 8) as u8
    }

    /// Parse a string of exactly 64 `'0'`/`'1'` characters.
    pub fn from_symbols(symbols: &str) -> Option<Self> {
        if symbols.len() != WORD_BITS {
            return None;
        }
        let mut word = Self::EMPTY;
        for (i, c) in symbols.bytes().enumerate() {
            match c {
                b'0' => {}
                b'1' => word.set_bit(i, true),
                _ => return None,
            }
        }
        Some(word)
    }
}

impl fmt::Display for BusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in 0..WORD_BITS {
            f.write_str(if self.bit(i) { "1" } else { "0" })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_order_is_msb_first() {
        let mut w = BusWord::EMPTY;
        w.set_bit(0, true);
        assert_eq!(w.bits(), 1 << 63);
        assert_eq!(w.to_bytes()[0], 0x80);
        w.set_bit(63, true);
        assert_eq!(w.bits() & 1, 1);
        w.set_bit(0, false);
        assert!(!w.bit(0));
        assert!(w.bit(63));
    }

    #[test]
    fn field_reads_big_endian() {
        let w = BusWord::from_bits(0xFF94_7FFF_FFFF_FFFF);
        assert_eq!(w.code(), 0xff);
        assert_eq!(w.field(8, 8), 0x94);
        assert_eq!(w.field(8, 20), 0x947ff);
        assert_eq!(w.field(8, 32), 0x947f_ffff);
        assert_eq!(w.field(16, 1), 0);
        assert_eq!(w.field(17, 1), 1);
    }

    #[test]
    fn field_past_end_reads_zero() {
        let w = BusWord::from_bits(u64::MAX);
        assert_eq!(w.field(64, 8), 0);
        assert_eq!(w.field(10, 0), 0);
        assert_eq!(w.field(56, 8), 0xff);
    }

    #[test]
    fn symbols_parse_and_display() {
        let text = "1111111110010100011111111111111111111111111111111111111111111111";
        let w = BusWord::from_symbols(text).unwrap();
        assert_eq!(w.bits(), 0xFF94_7FFF_FFFF_FFFF);
        assert_eq!(w.to_string(), text);

        assert!(BusWord::from_symbols("0101").is_none());
        assert!(BusWord::from_symbols(&"2".repeat(64)).is_none());
    }
}
