#![doc = include_str!("../README.md")]

#[cfg(not(any(feature = "rusb", feature = "nusb")))]
compile_error!("Either the rusb or nusb feature must be enabled for this crate");

#[macro_use]
extern crate structure;
#[macro_use]
extern crate bitflags;

pub mod config;
pub mod configure;
pub mod error;
pub mod hmacmode;
pub mod otpmode;
pub mod scancodes;
mod sec;
pub mod session;
pub mod status;
pub mod usb;

use std::sync::{Mutex, PoisonError};

use tracing::debug;

use config::Slot;
use error::OtpError;
use usb::{Backend, BackendType, HandleType};

pub use session::OtpSession;
pub use usb::Device;

/// The `Result` type used in this crate.
pub type Result<T> = ::std::result::Result<T, OtpError>;

static INITIALIZED: Mutex<bool> = Mutex::new(false);

/// Prepares the USB backend. Safe to call any number of times, from any thread.
pub fn initialize() -> Result<()> {
    let mut initialized = INITIALIZED.lock().unwrap_or_else(PoisonError::into_inner);
    if *initialized {
        return Ok(());
    }
    usb::init_backend()?;
    *initialized = true;
    debug!("USB backend initialized");
    Ok(())
}

pub fn is_initialized() -> bool {
    *INITIALIZED.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct OtpSlots {
    backend: BackendType,
}

impl OtpSlots {
    /// Creates a new OtpSlots instance, initializing the USB backend if needed.
    pub fn new() -> Result<Self> {
        initialize()?;
        let backend = BackendType::new()?;
        Ok(OtpSlots { backend })
    }

    pub fn find_device(&mut self) -> Result<Device> {
        self.backend.find_device()
    }

    pub fn find_device_from_serial(&mut self, serial: u32) -> Result<Device> {
        self.backend.find_device_from_serial(serial)
    }

    pub fn find_all_devices(&mut self) -> Result<Vec<Device>> {
        self.backend.find_all_devices()
    }

    /// Opens `device` and reads its serial number and status.
    pub fn open(&mut self, device: &Device) -> Result<OtpSession<HandleType>> {
        let handle = self.backend.open_device(device)?;
        OtpSession::open(handle)
    }

    pub fn read_serial_number(&mut self, device: &Device) -> Result<u32> {
        self.backend.read_serial_from_device(device)
    }

    pub fn is_configured(&mut self, device: &Device, slot: Slot) -> Result<bool> {
        let session = self.open(device)?;
        let configured = session.is_configured(slot);
        session.close()?;
        Ok(configured)
    }
}
