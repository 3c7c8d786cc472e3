//! Typed decoded messages.
//!
//! Each variant's `Display` produces the human-readable status line the
//! panel status store and the trace channel carry.

use crate::codec::keys::Key;
use crate::consts::ZONES_PER_GROUP;
use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Keypad LED indicators carried by the LED-status frame.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LedFlags: u8 {
        /// System ready to arm.
        const READY   = 0x01;
        /// Trouble / error light.
        const ERROR   = 0x02;
        /// One or more zones bypassed.
        const BYPASS  = 0x04;
        /// Alarm memory.
        const MEMORY  = 0x08;
        /// System armed.
        const ARMED   = 0x10;
        /// Programming mode.
        const PROGRAM = 0x20;
    }
}

/// Panel date and time as broadcast on the bus.
///
/// The year arrives as two separate decimal digits of the 21st century.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PanelDateTime {
    /// Tens digit of the year.
    pub year_tens: u8,
    /// Units digit of the year.
    pub year_units: u8,
    /// Month (1..=12 on a sane panel).
    pub month: u8,
    /// Day of month.
    pub day: u8,
    /// Hour (24h).
    pub hour: u8,
    /// Minute.
    pub minute: u8,
}

impl PanelDateTime {
    /// Four-digit year.
    pub fn year(&self) -> u16 {
        2000 + u16::from(self.year_tens) * 10 + u16::from(self.year_units)
    }
}

/// One of the four zone-group frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ZoneGroup {
    /// Zones 1..=8.
    First = 0,
    /// Zones 9..=16.
    Second = 1,
    /// Zones 17..=24.
    Third = 2,
    /// Zones 25..=32.
    Fourth = 3,
}

impl ZoneGroup {
    /// All groups in zone order.
    pub const ALL: [ZoneGroup; 4] = [Self::First, Self::Second, Self::Third, Self::Fourth];

    /// 1-based group number.
    #[inline]
    pub const fn number(self) -> usize {
        self as usize + 1
    }

    /// Zero-based index of the group's first zone.
    #[inline]
    pub const fn base(self) -> usize {
        self as usize * ZONES_PER_GROUP
    }
}

/// Zone activity of one group: bitmap bit `i` set means zone `base + i + 1`
/// is currently reported active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ZoneReport {
    /// Which group the bitmap covers.
    pub group: ZoneGroup,
    /// Activity bitmap, LSB = lowest zone.
    pub bitmap: u8,
}

impl ZoneReport {
    /// `(zone id 1..=32, active)` for every zone of the group.
    pub fn zones(&self) -> impl Iterator<Item = (usize, bool)> + '_ {
        (0..ZONES_PER_GROUP).map(move |i| (self.group.base() + i + 1, self.bitmap & (1 << i) != 0))
    }

    /// Whether no zone in the group is active.
    #[inline]
    pub const fn is_ready(&self) -> bool {
        self.bitmap == 0
    }
}

/// What the keypad sent to the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeypadEvent {
    /// All-ones payload.
    Idle,
    /// A recognized button.
    Pressed(Key),
    /// Payload matched no known button.
    Unrecognized,
}

/// A decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PanelMessage {
    /// Keypad LED state.
    LedStatus(LedFlags),
    /// Panel clock broadcast.
    DateTime(PanelDateTime),
    /// Zone-group activity.
    Zones(ZoneReport),
    /// Panel is in installer programming mode.
    ProgramMode,
    /// Known code without a documented payload.
    Undefined,
    /// Panel polling for keypads.
    KeypadQuery,
    /// Keypad-to-panel traffic.
    Keypad(KeypadEvent),
    /// Code not in the table.
    Unknown,
}

impl fmt::Display for PanelMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LedStatus(leds) => {
                f.write_str("LED Status ")?;
                if leds.contains(LedFlags::READY) {
                    f.write_str("Ready, ")?;
                } else {
                    f.write_str("Not Ready, ")?;
                }
                for (flag, text) in [
                    (LedFlags::ERROR, "Error, "),
                    (LedFlags::BYPASS, "Bypass, "),
                    (LedFlags::MEMORY, "Memory, "),
                    (LedFlags::ARMED, "Armed, "),
                    (LedFlags::PROGRAM, "Program, "),
                ] {
                    if leds.contains(flag) {
                        f.write_str(text)?;
                    }
                }
                Ok(())
            }
            Self::DateTime(dt) => write!(
                f,
                "Date: 20{}{}-{}-{} {}:{}",
                dt.year_tens, dt.year_units, dt.month, dt.day, dt.hour, dt.minute
            ),
            Self::Zones(report) => {
                write!(f, "Zone{} ", report.group.number())?;
                for i in 0..ZONES_PER_GROUP {
                    if report.bitmap & (1 << i) != 0 {
                        write!(f, "{}, ", i + 1)?;
                    }
                }
                if report.is_ready() {
                    f.write_str("Ready ")?;
                }
                Ok(())
            }
            Self::ProgramMode => f.write_str("Panel Program Mode"),
            Self::Undefined => f.write_str("Undefined command from panel"),
            Self::KeypadQuery => f.write_str("Keypad query"),
            Self::Keypad(KeypadEvent::Idle) => f.write_str("From Keypad idle"),
            Self::Keypad(KeypadEvent::Pressed(key)) => match key {
                Key::Stay | Key::Away => write!(f, "From Keypad {key} button pressed"),
                _ => write!(f, "From Keypad button {key} pressed"),
            },
            Self::Keypad(KeypadEvent::Unrecognized) => f.write_str("From Keypad unknown keypad msg"),
            Self::Unknown => f.write_str("Unknown command from panel"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn led_text_lists_set_flags_in_order() {
        let msg = PanelMessage::LedStatus(LedFlags::READY | LedFlags::ARMED | LedFlags::ERROR);
        assert_eq!(msg.to_string(), "LED Status Ready, Error, Armed, ");

        let msg = PanelMessage::LedStatus(LedFlags::empty());
        assert_eq!(msg.to_string(), "LED Status Not Ready, ");
    }

    #[test]
    fn zone_text_uses_group_local_numbers() {
        let report = ZoneReport {
            group: ZoneGroup::Second,
            bitmap: 0x05,
        };
        assert_eq!(PanelMessage::Zones(report).to_string(), "Zone2 1, 3, ");
        let active: Vec<usize> = report.zones().filter(|(_, on)| *on).map(|(z, _)| z).collect();
        assert_eq!(active, vec![9, 11]);
    }

    #[test]
    fn ready_zone_group() {
        let report = ZoneReport {
            group: ZoneGroup::Fourth,
            bitmap: 0,
        };
        assert!(report.is_ready());
        assert_eq!(PanelMessage::Zones(report).to_string(), "Zone4 Ready ");
        assert_eq!(report.zones().map(|(z, _)| z).collect::<Vec<_>>(), (25..=32).collect::<Vec<_>>());
    }

    #[test]
    fn date_text() {
        let dt = PanelDateTime {
            year_tens: 1,
            year_units: 6,
            month: 5,
            day: 22,
            hour: 12,
            minute: 15,
        };
        assert_eq!(dt.year(), 2016);
        assert_eq!(PanelMessage::DateTime(dt).to_string(), "Date: 2016-5-22 12:15");
    }

    #[test]
    fn keypad_text() {
        let four = PanelMessage::Keypad(KeypadEvent::Pressed(Key::Four));
        assert_eq!(four.to_string(), "From Keypad button 4 pressed");
        let star = PanelMessage::Keypad(KeypadEvent::Pressed(Key::Star));
        assert_eq!(star.to_string(), "From Keypad button * pressed");
        let stay = PanelMessage::Keypad(KeypadEvent::Pressed(Key::Stay));
        assert_eq!(stay.to_string(), "From Keypad stay button pressed");
        assert_eq!(PanelMessage::Keypad(KeypadEvent::Idle).to_string(), "From Keypad idle");
    }
}
