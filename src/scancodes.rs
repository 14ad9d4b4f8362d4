//! Keyboard scancode tables used to store static passwords.
//!
//! A static password slot replays HID keyboard usage codes, so every character
//! has to be translated for the layout the host is configured with. Bit 7 of a
//! scancode requests the shift modifier.

use std::fmt;

use crate::error::OtpError;
use crate::Result;

mod bepo;
mod us;

/// Modifier bit added to a usage code to press shift.
pub const SHIFT: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KeyboardLayout {
    #[default]
    Us,
    Bepo,
}

impl KeyboardLayout {
    fn table(self) -> &'static [(char, u8)] {
        match self {
            KeyboardLayout::Us => us::SCANCODES,
            KeyboardLayout::Bepo => bepo::SCANCODES,
        }
    }

    /// Looks up the scancode for a single character.
    pub fn lookup(self, c: char) -> Result<u8> {
        self.table()
            .iter()
            .find(|(ch, _)| *ch == c)
            .map(|(_, code)| *code)
            .ok_or(OtpError::UnsupportedCharacter(c, self))
    }

    /// Translates a whole string, one scancode per character.
    pub fn encode(self, s: &str) -> Result<Vec<u8>> {
        s.chars().map(|c| self.lookup(c)).collect()
    }
}

impl fmt::Display for KeyboardLayout {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            KeyboardLayout::Us => write!(f, "US"),
            KeyboardLayout::Bepo => write!(f, "BÉPO"),
        }
    }
}
