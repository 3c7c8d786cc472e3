//! BCM2835-family GPIO driver.
//!
//! Maps one page of the GPIO register block from `/dev/mem` and drives the
//! three bus pins with volatile register accesses. Only bank 0 (GPIO 0..=31)
//! is supported: the level, set and clear registers used are bank 0's.
//!
//! ## Register Map (32-bit words from the block base)
//!
//! | Word | Register | Use |
//! |------|----------|-----|
//! | 0..=5 | GPFSEL0..5 | 3-bit function per pin (000 input, 001 output) |
//! | 7 | GPSET0 | write 1 to drive high |
//! | 10 | GPCLR0 | write 1 to drive low |
//! | 13 | GPLEV0 | current levels |

use keybus_common::config::BusConfig;
use keybus_common::hal::driver::{HalError, PinIo};
use keybus_common::hal::types::{Direction, Level, Pin};
use memmap2::{MmapMut, MmapOptions};
use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use tracing::info;

const BLOCK_SIZE: usize = 4 * 1024;
const GPSET0: usize = 7;
const GPCLR0: usize = 10;
const GPLEV0: usize = 13;

/// Word index and bit shift of `gpio`'s function-select field.
#[inline]
const fn fsel_slot(gpio: u8) -> (usize, u32) {
    ((gpio / 10) as usize, (gpio % 10) as u32 * 3)
}

/// Memory-mapped GPIO pins.
pub struct GpioPins {
    map: MmapMut,
    clock: u8,
    data_in: u8,
    data_out: u8,
}

impl std::fmt::Debug for GpioPins {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpioPins")
            .field("clock", &self.clock)
            .field("data_in", &self.data_in)
            .field("data_out", &self.data_out)
            .finish_non_exhaustive()
    }
}

impl GpioPins {
    /// Map the register block described by `config`.
    ///
    /// # Errors
    /// `HalError::InvalidPin` for pins outside bank 0,
    /// `HalError::RegisterMap` if the device cannot be opened or mapped.
    pub fn open(config: &BusConfig) -> Result<Self, HalError> {
        for pin in [config.clock_pin, config.data_in_pin, config.data_out_pin] {
            if pin > 31 {
                return Err(HalError::InvalidPin {
                    pin,
                    reason: "only bank 0 (GPIO 0..=31) is supported".to_string(),
                });
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(&config.mem_device)
            .map_err(|e| {
                HalError::RegisterMap(format!("{}: {e}", config.mem_device.display()))
            })?;

        // SAFETY: the mapping covers device registers, not a file other
        // processes truncate; it lives as long as `GpioPins`.
        let map = unsafe {
            MmapOptions::new()
                .offset(config.gpio_base)
                .len(BLOCK_SIZE)
                .map_mut(&file)
        }
        .map_err(|e| HalError::RegisterMap(format!("mmap {:#x}: {e}", config.gpio_base)))?;

        info!(
            "GPIO block {:#x} mapped (clock={}, data_in={}, data_out={})",
            config.gpio_base, config.clock_pin, config.data_in_pin, config.data_out_pin
        );

        Ok(Self {
            map,
            clock: config.clock_pin,
            data_in: config.data_in_pin,
            data_out: config.data_out_pin,
        })
    }

    #[inline]
    const fn gpio(&self, pin: Pin) -> u8 {
        match pin {
            Pin::ClockIn => self.clock,
            Pin::DataIn => self.data_in,
            Pin::DataOut => self.data_out,
        }
    }

    #[inline]
    fn reg_read(&self, word: usize) -> u32 {
        debug_assert!(word * 4 < BLOCK_SIZE);
        // SAFETY: word is inside the mapped block and 4-byte aligned.
        unsafe { core::ptr::read_volatile((self.map.as_ptr() as *const u32).add(word)) }
    }

    #[inline]
    fn reg_write(&mut self, word: usize, value: u32) {
        debug_assert!(word * 4 < BLOCK_SIZE);
        // SAFETY: word is inside the mapped block and 4-byte aligned.
        unsafe { core::ptr::write_volatile((self.map.as_mut_ptr() as *mut u32).add(word), value) }
    }
}

impl PinIo for GpioPins {
    fn name(&self) -> &'static str {
        "gpio"
    }

    fn configure(&mut self, pin: Pin, direction: Direction) -> Result<(), HalError> {
        let (word, shift) = fsel_slot(self.gpio(pin));
        // Always pass through input before selecting output.
        let mut fsel = self.reg_read(word) & !(0b111 << shift);
        self.reg_write(word, fsel);
        if direction == Direction::Output {
            fsel |= 0b001 << shift;
            self.reg_write(word, fsel);
        }
        Ok(())
    }

    #[inline]
    fn read(&self, pin: Pin) -> Level {
        if self.reg_read(GPLEV0) & (1 << self.gpio(pin)) != 0 {
            Level::High
        } else {
            Level::Low
        }
    }

    #[inline]
    fn write(&mut self, pin: Pin, level: Level) {
        let mask = 1 << self.gpio(pin);
        match level {
            Level::High => self.reg_write(GPSET0, mask),
            Level::Low => self.reg_write(GPCLR0, mask),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn fsel_slots() {
        assert_eq!(fsel_slot(5), (0, 15));
        assert_eq!(fsel_slot(13), (1, 9));
        assert_eq!(fsel_slot(16), (1, 18));
        assert_eq!(fsel_slot(29), (2, 27));
    }

    #[test]
    fn rejects_bank_one_pins() {
        let config = BusConfig {
            data_out_pin: 40,
            ..BusConfig::default()
        };
        let err = GpioPins::open(&config).unwrap_err();
        assert!(matches!(err, HalError::InvalidPin { pin: 40, .. }));
    }

    #[test]
    fn missing_device_is_a_mapping_error() {
        let config = BusConfig {
            mem_device: PathBuf::from("/nonexistent/mem"),
            ..BusConfig::default()
        };
        let err = GpioPins::open(&config).unwrap_err();
        assert!(matches!(err, HalError::RegisterMap(_)));
    }

    #[test]
    fn drives_a_regular_file_as_register_block() {
        let file = tempfile::NamedTempFile::new().unwrap();
        file.as_file().set_len(BLOCK_SIZE as u64).unwrap();
        let config = BusConfig {
            mem_device: file.path().to_path_buf(),
            gpio_base: 0,
            ..BusConfig::default()
        };
        let mut pins = GpioPins::open(&config).unwrap();

        pins.configure(Pin::DataOut, Direction::Output).unwrap();
        let (word, shift) = fsel_slot(config.data_out_pin);
        assert_eq!((pins.reg_read(word) >> shift) & 0b111, 0b001);

        pins.write(Pin::DataOut, Level::High);
        assert_eq!(pins.reg_read(GPSET0), 1 << config.data_out_pin);
        pins.write(Pin::DataOut, Level::Low);
        assert_eq!(pins.reg_read(GPCLR0), 1 << config.data_out_pin);

        // A plain file has no level register semantics: reads see zero.
        assert_eq!(pins.read(Pin::ClockIn), Level::Low);
    }
}
