//! Firmware version, status block and USB transport mode of a device.

use std::fmt;

use tracing::warn;

use crate::config::Slot;
use crate::error::OtpError;
use crate::Result;

/// Bit in the touch-level word set when slot 1 holds a configuration.
pub const CONFIG1_VALID: u16 = 0x01;
/// Bit in the touch-level word set when slot 2 holds a configuration.
pub const CONFIG2_VALID: u16 = 0x02;

/// Firmware version triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub build: u8,
}

impl Version {
    pub const fn new(major: u8, minor: u8, build: u8) -> Self {
        Version { major, minor, build }
    }

    /// Fails with `UnsupportedByDevice` when `self` is below `required`.
    pub(crate) fn require(self, required: Version, feature: &'static str) -> Result<()> {
        if self < required {
            return Err(OtpError::UnsupportedByDevice {
                feature,
                required,
                actual: self,
            });
        }
        Ok(())
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.build)
    }
}

/// Snapshot of the device status block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceStatus {
    pub version: Version,
    pub pgm_seq: u8,
    pub touch_level: u16,
}

impl DeviceStatus {
    /// Parses the six status bytes that follow the report ID in a feature report.
    pub(crate) fn from_report(report: &[u8]) -> Result<Self> {
        if report.len() < 7 {
            return Err(OtpError::CanNotReadFromDevice);
        }
        let (major, minor, build, pgm_seq, touch_level) = structure!("<BBBBH").unpack(&report[1..7])?;
        Ok(DeviceStatus {
            version: Version::new(major, minor, build),
            pgm_seq,
            touch_level,
        })
    }

    pub fn slot1_valid(&self) -> bool {
        self.touch_level & CONFIG1_VALID != 0
    }

    pub fn slot2_valid(&self) -> bool {
        self.touch_level & CONFIG2_VALID != 0
    }

    pub fn is_configured(&self, slot: Slot) -> bool {
        match slot {
            Slot::Slot1 => self.slot1_valid(),
            Slot::Slot2 => self.slot2_valid(),
        }
    }

    /// True when at least one slot holds a configuration.
    pub fn any_configured(&self) -> bool {
        self.touch_level & (CONFIG1_VALID | CONFIG2_VALID) != 0
    }
}

bitflags! {
    /// USB interfaces a device exposes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Transports: u8 {
        const OTP = 0x01;
        const FIDO = 0x02;
        const CCID = 0x04;
    }
}

/// Legacy mode codes, indexed by code.
const MODES: [Transports; 7] = [
    Transports::OTP,
    Transports::CCID,
    Transports::OTP.union(Transports::CCID),
    Transports::FIDO,
    Transports::OTP.union(Transports::FIDO),
    Transports::FIDO.union(Transports::CCID),
    Transports::OTP.union(Transports::FIDO).union(Transports::CCID),
];

/// The USB mode of a device, as a set of enabled transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mode {
    transports: Transports,
}

impl Mode {
    pub const fn new(transports: Transports) -> Self {
        Mode { transports }
    }

    /// Converts a legacy mode code (0 to 6). The eject flag in bit 7 is ignored.
    pub fn from_code(code: u8) -> Result<Self> {
        match MODES.get((code & 0x7f) as usize) {
            Some(transports) => Ok(Mode::new(*transports)),
            None => Err(OtpError::invalid(format!("invalid mode code {}", code))),
        }
    }

    pub fn transports(&self) -> Transports {
        self.transports
    }

    /// The legacy mode code for this transport set, if there is one.
    pub fn code(&self) -> Option<u8> {
        MODES
            .iter()
            .position(|t| *t == self.transports)
            .map(|p| p as u8)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let names: Vec<&str> = self.transports.iter_names().map(|(name, _)| name).collect();
        write!(f, "{}", names.join("+"))
    }
}

/// Derives the current USB mode from the firmware version and product ID.
pub fn read_mode(version: Version, product_id: u16) -> Mode {
    if version < Version::new(3, 0, 0) {
        return Mode::new(Transports::OTP);
    }

    let mode = (product_id & 0x07) as u8;
    if version < Version::new(4, 0, 0) {
        // NEO product IDs: mode 1 has PID 0x0112 and mode 2 has PID 0x0111.
        let code = match mode {
            1 => 2,
            2 => 1,
            m => m,
        };
        return match Mode::from_code(code) {
            Ok(mode) => mode,
            Err(e) => {
                warn!(product_id, %version, error = %e, "Unknown NEO mode, assuming OTP only");
                Mode::new(Transports::OTP)
            }
        };
    }
    Mode::new(Transports::from_bits_truncate(mode))
}
