//! An open connection to the OTP applet of one device.
//!
//! [`OtpSession`] reads the serial number and status block once when it is
//! opened, then exposes the slot programming operations. Every `program_*`
//! call builds and validates its [`SlotConfig`] before any report is sent, so
//! invalid arguments or an unsupported firmware never reach the device.

use tracing::{debug, warn};
use zeroize::Zeroize;

use crate::config::{Config, Slot};
use crate::configure::{DeviceConfig, SlotConfig};
use crate::error::OtpError;
use crate::hmacmode::{Hmac, HmacKey};
use crate::otpmode::{Aes128Key, PrivateId};
use crate::scancodes::KeyboardLayout;
use crate::status::{read_mode, DeviceStatus, Mode, Version};
use crate::usb::{self, Transport, WaitPolicy, PAYLOAD_SIZE};
use crate::Result;

const V2_0: Version = Version::new(2, 0, 0);
const V2_1: Version = Version::new(2, 1, 0);
const V2_2: Version = Version::new(2, 2, 0);

pub struct OtpSession<T: Transport> {
    transport: T,
    policy: WaitPolicy,
    serial: Option<u32>,
    status: DeviceStatus,
    mode: Mode,
    closed: bool,
}

impl<T: Transport> OtpSession<T> {
    /// Takes ownership of `transport` and reads the serial number and status.
    pub fn open(transport: T) -> Result<Self> {
        OtpSession::open_with_policy(transport, WaitPolicy::default())
    }

    pub(crate) fn open_with_policy(mut transport: T, policy: WaitPolicy) -> Result<Self> {
        let serial = match usb::read_serial(&mut transport, &policy) {
            Ok(serial) => Some(serial),
            Err(e) => {
                debug!(error = %e, "Device did not report a serial number");
                None
            }
        };
        let status = match usb::read_status(&mut transport) {
            Ok(status) => status,
            Err(e) => {
                if let Err(close_error) = transport.close() {
                    warn!(error = %close_error, "Failed to close device");
                }
                return Err(e);
            }
        };
        let mode = read_mode(status.version, transport.product_id());
        debug!(?serial, version = %status.version, %mode, "Opened OTP session");

        Ok(OtpSession {
            transport,
            policy,
            serial,
            status,
            mode,
            closed: false,
        })
    }

    pub fn serial(&self) -> Option<u32> {
        self.serial
    }

    pub fn version(&self) -> Version {
        self.status.version
    }

    /// Status block as read when the session was opened.
    pub fn status(&self) -> DeviceStatus {
        self.status
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Whether slot 1 and slot 2 held a configuration when the session was opened.
    ///
    /// Writes made through this session are not reflected.
    pub fn slot_status(&self) -> (bool, bool) {
        (self.status.slot1_valid(), self.status.slot2_valid())
    }

    pub fn is_configured(&self, slot: Slot) -> bool {
        self.status.is_configured(slot)
    }

    /// Programs a Yubico OTP credential.
    ///
    /// `key` must be 16 bytes, `uid` 6 bytes and `fixed` at most 16 bytes.
    pub fn program_otp(&mut self, slot: Slot, key: &[u8], fixed: &[u8], uid: &[u8], append_cr: bool) -> Result<()> {
        let key = Aes128Key::from_slice(key)?;
        let uid = PrivateId::from_slice(uid)?;
        let record = SlotConfig::otp(self.version(), slot, &key, fixed, &uid, append_cr)?;
        self.write_config(&record)
    }

    pub fn program_static(
        &mut self,
        slot: Slot,
        password: &str,
        layout: KeyboardLayout,
        append_cr: bool,
    ) -> Result<()> {
        let record = SlotConfig::static_password(self.version(), slot, password, layout, append_cr)?;
        self.write_config(&record)
    }

    /// Programs an HMAC-SHA1 challenge-response credential with a key of at most 20 bytes.
    pub fn program_chalresp(&mut self, slot: Slot, key: &[u8], touch: bool) -> Result<()> {
        self.version().require(V2_2, "Challenge-response")?;
        let key = HmacKey::from_slice(key)?;
        let record = SlotConfig::challenge_response(self.version(), slot, &key, touch)?;
        self.write_config(&record)
    }

    pub fn program_hotp(
        &mut self,
        slot: Slot,
        key: &[u8],
        imf: u32,
        hotp8: bool,
        append_cr: bool,
    ) -> Result<()> {
        self.version().require(V2_1, "OATH-HOTP")?;
        let key = HmacKey::from_oath_secret(key)?;
        let record = SlotConfig::hotp(self.version(), slot, &key, imf, hotp8, append_cr)?;
        self.write_config(&record)
    }

    /// Erases the configuration stored in `slot`.
    pub fn zap_slot(&mut self, slot: Slot) -> Result<()> {
        if slot == Slot::Slot2 {
            self.version().require(V2_0, "Slot 2")?;
        }
        debug!(?slot, "Erasing slot");
        usb::write_command(&mut self.transport, &self.policy, None, slot.command())
    }

    /// Exchanges the configurations of slot 1 and slot 2.
    pub fn swap_slots(&mut self) -> Result<()> {
        let record = SlotConfig::swap(self.version())?;
        self.write_config(&record)
    }

    /// Raw capability blob, length byte included.
    pub fn read_capabilities(&mut self) -> Result<Vec<u8>> {
        usb::read_capabilities(&mut self.transport, &self.policy)
    }

    /// Sets the USB interfaces the device exposes after its next re-plug.
    pub fn set_mode(&mut self, mode_code: u8, cr_timeout: u8, autoeject_time: u16) -> Result<()> {
        self.version().require(DeviceConfig::min_version(), "Setting the device mode")?;
        let config = DeviceConfig::new(mode_code, cr_timeout, autoeject_time)?;
        usb::write_device_config(&mut self.transport, &self.policy, &config.to_bytes()?)
    }

    /// Sends an HMAC-SHA1 challenge to a slot programmed for challenge-response.
    pub fn challenge_response_hmac(&mut self, chall: &[u8], conf: Config) -> Result<Hmac> {
        self.version().require(V2_2, "Challenge-response")?;
        if chall.len() > PAYLOAD_SIZE {
            return Err(OtpError::invalid(format!(
                "challenge must be <= {} bytes",
                PAYLOAD_SIZE
            )));
        }

        let mut challenge = [0; PAYLOAD_SIZE];
        // Variable-length challenges are padded with a byte that differs from their last one.
        if conf.variable && chall.last() == Some(&0) {
            challenge = [0xff; PAYLOAD_SIZE];
        }
        challenge[..chall.len()].copy_from_slice(chall);

        debug!(slot = ?conf.slot, "Sending HMAC challenge");
        let result = usb::challenge_hmac(&mut self.transport, &self.policy, challenge, conf.slot.challenge_hmac());
        challenge.zeroize();
        Ok(Hmac(result?))
    }

    /// Releases the device.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        debug!("Closing OTP session");
        self.transport.close()
    }

    fn write_config(&mut self, record: &SlotConfig) -> Result<()> {
        let mut payload = record.to_bytes();
        let result = usb::write_command(&mut self.transport, &self.policy, Some(&payload), record.command());
        payload.zeroize();
        result
    }
}

impl<T: Transport> Drop for OtpSession<T> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.transport.close() {
            warn!(error = %e, "Failed to close device");
        }
    }
}
