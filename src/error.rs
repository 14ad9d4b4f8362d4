#[cfg(any(feature = "rusb", target_os = "windows"))]
use rusb::Error as usbError;
use std::io::Error as ioError;
use thiserror::Error;

use crate::scancodes::KeyboardLayout;
use crate::status::Version;

#[derive(Debug, Error)]
pub enum OtpError {
    #[error("IO error: {0}")]
    IOError(#[from] ioError),
    #[cfg(any(feature = "rusb", target_os = "windows"))]
    #[error("USB error: {0}")]
    UsbError(#[from] usbError),
    #[error("Command Not Supported")]
    CommandNotSupported,
    #[error("Device not found")]
    DeviceNotFound,
    #[error("Can not open device")]
    OpenDeviceError,
    #[error("Can not write to Device")]
    CanNotWriteToDevice,
    #[error("Can not read from Device")]
    CanNotReadFromDevice,
    #[error("Wrong CRC")]
    WrongCRC,
    #[error("Configuration has failed (programming sequence {before} -> {after})")]
    ConfigNotWritten { before: u8, after: u8 },
    #[error("Could not list available devices")]
    ListDevicesError,
    #[error("Timed out waiting for the device")]
    Timeout,
    #[error("Device is busy (status flags {0:#04x})")]
    DeviceBusy(u8),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{feature} requires firmware {required} or later, device has {actual}")]
    UnsupportedByDevice {
        feature: &'static str,
        required: Version,
        actual: Version,
    },
    #[error("Character {0:?} is not available in the {1} keyboard layout")]
    UnsupportedCharacter(char, KeyboardLayout),
}

/// Coarse classification of an [`OtpError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A caller-supplied value violates a documented constraint.
    InvalidArgument,
    /// The firmware is older than the feature's minimum version.
    UnsupportedByDevice,
    /// Talking to the device failed.
    DeviceCommunication,
    /// The device is in the middle of another operation.
    DeviceBusy,
    /// The keyboard layout has no scancode for a character.
    UnsupportedCharacter,
}

impl OtpError {
    pub fn kind(&self) -> ErrorKind {
        match *self {
            OtpError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            OtpError::UnsupportedByDevice { .. } | OtpError::CommandNotSupported => ErrorKind::UnsupportedByDevice,
            OtpError::DeviceBusy(_) => ErrorKind::DeviceBusy,
            OtpError::UnsupportedCharacter(..) => ErrorKind::UnsupportedCharacter,
            _ => ErrorKind::DeviceCommunication,
        }
    }

    pub(crate) fn invalid<S: Into<String>>(message: S) -> Self {
        OtpError::InvalidArgument(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(OtpError::invalid("x").kind(), ErrorKind::InvalidArgument);
        assert_eq!(OtpError::DeviceBusy(0x80).kind(), ErrorKind::DeviceBusy);
        assert_eq!(OtpError::WrongCRC.kind(), ErrorKind::DeviceCommunication);
        assert_eq!(
            OtpError::ConfigNotWritten { before: 1, after: 1 }.kind(),
            ErrorKind::DeviceCommunication
        );
        assert_eq!(
            OtpError::UnsupportedCharacter('\u{2603}', KeyboardLayout::Us).kind(),
            ErrorKind::UnsupportedCharacter
        );
    }

    #[test]
    fn test_unsupported_message_names_version() {
        let err = OtpError::UnsupportedByDevice {
            feature: "Swapping slots",
            required: Version::new(2, 3, 0),
            actual: Version::new(2, 2, 9),
        };
        assert_eq!(
            err.to_string(),
            "Swapping slots requires firmware 2.3.0 or later, device has 2.2.9"
        );
    }
}
