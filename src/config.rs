use crate::error::OtpError;
use crate::Result;

/// One of the two programmable configuration slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Slot {
    Slot1,
    Slot2,
}

impl Slot {
    /// Maps a 1-based slot number.
    pub fn from_number(n: u8) -> Result<Self> {
        match n {
            1 => Ok(Slot::Slot1),
            2 => Ok(Slot::Slot2),
            _ => Err(OtpError::invalid(format!("slot must be 1 or 2, got {}", n))),
        }
    }

    /// Command that programs (or, with an empty payload, erases) this slot.
    pub fn command(self) -> Command {
        match self {
            Slot::Slot1 => Command::Configuration1,
            Slot::Slot2 => Command::Configuration2,
        }
    }

    pub(crate) fn challenge_hmac(self) -> Command {
        match self {
            Slot::Slot1 => Command::ChallengeHmac1,
            Slot::Slot2 => Command::ChallengeHmac2,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    Configuration1 = 0x01,
    Configuration2 = 0x03,
    Swap = 0x06,
    DeviceSerial = 0x10,
    DeviceConfig = 0x11,
    YK4Capabilities = 0x13,
    ChallengeHmac1 = 0x30,
    ChallengeHmac2 = 0x38,
}

impl Command {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Settings for an HMAC challenge sent to a programmed slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub slot: Slot,
    /// The slot was programmed for variable-length challenges (`HMAC_LT64`).
    pub variable: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            slot: Slot::Slot1,
            variable: true,
        }
    }
}

impl Config {
    pub fn set_slot(mut self, slot: Slot) -> Self {
        self.slot = slot;
        self
    }

    pub fn set_variable_size(mut self, variable: bool) -> Self {
        self.variable = variable;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_commands() {
        assert_eq!(Slot::Slot1.command().code(), 0x01);
        assert_eq!(Slot::Slot2.command().code(), 0x03);
        assert_eq!(Command::Swap.code(), 0x06);
        assert_ne!(Command::Swap, Slot::Slot1.command());
        assert_ne!(Command::Swap, Slot::Slot2.command());
    }

    #[test]
    fn test_slot_from_number() {
        assert_eq!(Slot::from_number(1).unwrap(), Slot::Slot1);
        assert_eq!(Slot::from_number(2).unwrap(), Slot::Slot2);
        assert!(matches!(Slot::from_number(3), Err(OtpError::InvalidArgument(_))));
        assert!(matches!(Slot::from_number(0), Err(OtpError::InvalidArgument(_))));
    }

    #[test]
    fn test_config_builder() {
        let config = Config::default().set_slot(Slot::Slot2).set_variable_size(false);
        assert_eq!(config.slot, Slot::Slot2);
        assert!(!config.variable);
    }
}
