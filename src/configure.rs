//! Slot configuration records and the device-mode record.
//!
//! A [`SlotConfig`] is the 52-byte structure the OTP applet stores per slot.
//! It can only be obtained through one of the mode-specific constructors, each
//! of which validates its arguments and the firmware version before anything
//! is sent to the device.

use tracing::debug;
use zeroize::Zeroize;

use crate::config::{Command, Slot};
use crate::error::OtpError;
use crate::hmacmode::HmacKey;
use crate::otpmode::{Aes128Key, PrivateId};
use crate::scancodes::KeyboardLayout;
use crate::sec::crc16;
use crate::status::{Mode, Version};
use crate::Result;

pub const FIXED_SIZE: usize = 16;
pub const UID_SIZE: usize = 6;
pub const KEY_SIZE: usize = 16;
pub const ACC_CODE_SIZE: usize = 6;
/// Size of a serialized slot configuration, CRC included.
pub const CONFIG_SIZE: usize = 52;

/// Longest static password: fixed, private ID and key fields together.
pub const MAX_STATIC_PASSWORD: usize = FIXED_SIZE + UID_SIZE + KEY_SIZE;
/// Longest static password before firmware 2.2.0.
pub const LEGACY_STATIC_PASSWORD: usize = FIXED_SIZE;
/// Largest initial moving factor the private ID field can hold.
pub const MAX_IMF: u32 = 0xffff * 16;

const V1_0: Version = Version::new(1, 0, 0);
const V2_0: Version = Version::new(2, 0, 0);
const V2_1: Version = Version::new(2, 1, 0);
const V2_2: Version = Version::new(2, 2, 0);
const V2_3: Version = Version::new(2, 3, 0);
const V3_0: Version = Version::new(3, 0, 0);

#[cfg(test)]
thread_local! {
    static LIVE_RECORDS: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
}

/// Number of slot records alive on the current thread.
#[cfg(test)]
pub(crate) fn live_records() -> usize {
    LIVE_RECORDS.with(|c| c.get())
}

/// Which kind of output a slot produces. Exactly one per record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketMode {
    Otp,
    StaticPassword,
    ChallengeResponse,
    Hotp,
    /// Marker record that exchanges the two slots.
    Swap,
}

/// Ticket flags: what the slot emits and how it ends the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketFlag {
    AppendCr,
    OathHotp,
    ChalResp,
}

impl TicketFlag {
    pub const fn bits(self) -> u8 {
        match self {
            TicketFlag::AppendCr => 0x20,
            TicketFlag::OathHotp | TicketFlag::ChalResp => 0x40,
        }
    }

    pub const fn min_version(self) -> Version {
        match self {
            TicketFlag::AppendCr => V1_0,
            TicketFlag::OathHotp => V2_1,
            TicketFlag::ChalResp => V2_2,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            TicketFlag::AppendCr => "APPEND_CR",
            TicketFlag::OathHotp => "OATH_HOTP",
            TicketFlag::ChalResp => "CHAL_RESP",
        }
    }
}

/// Config flags. Several bits are reused with a different meaning per ticket mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFlag {
    ShortTicket,
    OathHotp8,
    ChalHmac,
    HmacLt64,
    ChalBtnTrig,
}

impl ConfigFlag {
    pub const fn bits(self) -> u8 {
        match self {
            ConfigFlag::ShortTicket | ConfigFlag::OathHotp8 => 0x02,
            ConfigFlag::HmacLt64 => 0x04,
            ConfigFlag::ChalBtnTrig => 0x08,
            ConfigFlag::ChalHmac => 0x22,
        }
    }

    pub const fn min_version(self) -> Version {
        match self {
            ConfigFlag::ShortTicket => V2_0,
            ConfigFlag::OathHotp8 => V2_1,
            ConfigFlag::ChalHmac | ConfigFlag::HmacLt64 | ConfigFlag::ChalBtnTrig => V2_2,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            ConfigFlag::ShortTicket => "SHORT_TICKET",
            ConfigFlag::OathHotp8 => "OATH_HOTP8",
            ConfigFlag::ChalHmac => "CHAL_HMAC",
            ConfigFlag::HmacLt64 => "HMAC_LT64",
            ConfigFlag::ChalBtnTrig => "CHAL_BTN_TRIG",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtendedFlag {
    SerialApiVisible,
    AllowUpdate,
}

impl ExtendedFlag {
    pub const fn bits(self) -> u8 {
        match self {
            ExtendedFlag::SerialApiVisible => 0x04,
            ExtendedFlag::AllowUpdate => 0x20,
        }
    }

    pub const fn min_version(self) -> Version {
        match self {
            ExtendedFlag::SerialApiVisible => V2_2,
            ExtendedFlag::AllowUpdate => V2_3,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            ExtendedFlag::SerialApiVisible => "SERIAL_API_VISIBLE",
            ExtendedFlag::AllowUpdate => "ALLOW_UPDATE",
        }
    }
}

/// Extended flags set on every record the device is able to accept them on.
const DEFAULT_EXTENDED_FLAGS: [ExtendedFlag; 2] = [ExtendedFlag::SerialApiVisible, ExtendedFlag::AllowUpdate];

/// Configuration record for one slot.
///
/// Secret fields are wiped when the record is dropped.
#[derive(Debug)]
pub struct SlotConfig {
    version: Version,
    command: Command,
    mode: TicketMode,
    fixed: [u8; FIXED_SIZE],
    fixed_size: u8,
    uid: [u8; UID_SIZE],
    key: [u8; KEY_SIZE],
    acc_code: [u8; ACC_CODE_SIZE],
    ext_flags: u8,
    tkt_flags: u8,
    cfg_flags: u8,
}

impl Drop for SlotConfig {
    fn drop(&mut self) {
        self.fixed.zeroize();
        self.uid.zeroize();
        self.key.zeroize();
        self.acc_code.zeroize();
        #[cfg(test)]
        LIVE_RECORDS.with(|c| c.set(c.get() - 1));
    }
}

impl SlotConfig {
    fn new(version: Version, command: Command, mode: TicketMode) -> Result<Self> {
        if command == Command::Configuration2 {
            version.require(V2_0, "Slot 2")?;
        }

        let mut record = SlotConfig {
            version,
            command,
            mode,
            fixed: [0; FIXED_SIZE],
            fixed_size: 0,
            uid: [0; UID_SIZE],
            key: [0; KEY_SIZE],
            acc_code: [0; ACC_CODE_SIZE],
            ext_flags: 0,
            tkt_flags: 0,
            cfg_flags: 0,
        };
        #[cfg(test)]
        LIVE_RECORDS.with(|c| c.set(c.get() + 1));

        for flag in DEFAULT_EXTENDED_FLAGS {
            if version >= flag.min_version() {
                record.set_extended_flag(flag)?;
            }
        }
        Ok(record)
    }

    /// Yubico OTP: AES key, private ID and public fixed ID.
    pub fn otp(
        version: Version,
        slot: Slot,
        key: &Aes128Key,
        fixed: &[u8],
        uid: &PrivateId,
        append_cr: bool,
    ) -> Result<Self> {
        if fixed.len() > FIXED_SIZE {
            return Err(OtpError::invalid(format!("public ID must be <= {} bytes", FIXED_SIZE)));
        }

        let mut record = SlotConfig::new(version, slot.command(), TicketMode::Otp)?;
        record.set_fixed(fixed)?;
        record.set_uid(&uid.0)?;
        record.key.copy_from_slice(&key.0);
        if append_cr {
            record.set_ticket_flag(TicketFlag::AppendCr)?;
        }
        Ok(record)
    }

    /// Static password typed with the given keyboard layout.
    ///
    /// The fixed ID, private ID and key fields are used as one contiguous
    /// buffer: up to 16 scancodes go in the fixed ID, the next 6 push the tail
    /// into the private ID, and the last 16 of a longer password fill the key.
    pub fn static_password(
        version: Version,
        slot: Slot,
        password: &str,
        layout: KeyboardLayout,
        append_cr: bool,
    ) -> Result<Self> {
        version.require(V2_0, "Static password")?;
        let pw_len = password.chars().count();
        if pw_len > LEGACY_STATIC_PASSWORD {
            version.require(V2_2, "Static password longer than 16 characters")?;
        }
        if pw_len > MAX_STATIC_PASSWORD {
            return Err(OtpError::invalid(format!(
                "password too long, this device supports a maximum of {} characters",
                MAX_STATIC_PASSWORD
            )));
        }

        let mut codes = layout.encode(password)?;
        let record = SlotConfig::new(version, slot.command(), TicketMode::StaticPassword)
            .and_then(|mut record| {
                record.set_config_flag(ConfigFlag::ShortTicket)?;
                if append_cr {
                    record.set_ticket_flag(TicketFlag::AppendCr)?;
                }
                record.pack_password(&codes)?;
                Ok(record)
            });
        codes.zeroize();
        record
    }

    fn pack_password(&mut self, codes: &[u8]) -> Result<()> {
        let len = codes.len();
        if len <= FIXED_SIZE {
            self.set_fixed(codes)?;
        } else if len <= FIXED_SIZE + UID_SIZE {
            self.set_fixed(&codes[..len - UID_SIZE])?;
            self.set_uid(&codes[len - UID_SIZE..])?;
        } else {
            let tail = UID_SIZE + KEY_SIZE;
            self.set_fixed(&codes[..len - tail])?;
            self.set_uid(&codes[len - tail..len - KEY_SIZE])?;
            self.key.copy_from_slice(&codes[len - KEY_SIZE..]);
        }
        Ok(())
    }

    /// HMAC-SHA1 challenge-response, optionally requiring a touch.
    pub fn challenge_response(version: Version, slot: Slot, key: &HmacKey, touch: bool) -> Result<Self> {
        version.require(V2_2, "Challenge-response")?;

        let mut record = SlotConfig::new(version, slot.command(), TicketMode::ChallengeResponse)?;
        record.set_ticket_flag(TicketFlag::ChalResp)?;
        record.set_config_flag(ConfigFlag::ChalHmac)?;
        record.set_config_flag(ConfigFlag::HmacLt64)?;
        if touch {
            record.set_config_flag(ConfigFlag::ChalBtnTrig)?;
        }
        record.set_hmac_key(key);
        Ok(record)
    }

    /// OATH-HOTP starting at the initial moving factor `imf`.
    pub fn hotp(
        version: Version,
        slot: Slot,
        key: &HmacKey,
        imf: u32,
        hotp8: bool,
        append_cr: bool,
    ) -> Result<Self> {
        version.require(V2_1, "HOTP")?;
        if imf % 16 != 0 {
            return Err(OtpError::invalid("imf must be a multiple of 16"));
        }
        if imf > MAX_IMF {
            return Err(OtpError::invalid(format!("imf must be <= {}", MAX_IMF)));
        }

        let mut record = SlotConfig::new(version, slot.command(), TicketMode::Hotp)?;
        record.set_ticket_flag(TicketFlag::OathHotp)?;
        record.set_hmac_key(key);
        record.set_oath_imf(imf);
        if hotp8 {
            record.set_config_flag(ConfigFlag::OathHotp8)?;
        }
        if append_cr {
            record.set_ticket_flag(TicketFlag::AppendCr)?;
        }
        Ok(record)
    }

    /// Record that exchanges the configurations of the two slots.
    pub fn swap(version: Version) -> Result<Self> {
        version.require(V2_3, "Swapping slots")?;
        SlotConfig::new(version, Command::Swap, TicketMode::Swap)
    }

    fn set_fixed(&mut self, fixed: &[u8]) -> Result<()> {
        if fixed.len() > FIXED_SIZE {
            return Err(OtpError::invalid(format!("fixed ID must be <= {} bytes", FIXED_SIZE)));
        }
        self.fixed = [0; FIXED_SIZE];
        self.fixed[..fixed.len()].copy_from_slice(fixed);
        self.fixed_size = fixed.len() as u8;
        Ok(())
    }

    fn set_uid(&mut self, uid: &[u8]) -> Result<()> {
        if uid.len() != UID_SIZE {
            return Err(OtpError::invalid(format!("private ID must be {} bytes", UID_SIZE)));
        }
        self.uid.copy_from_slice(uid);
        Ok(())
    }

    /// The 20-byte HMAC key spans the key field and the first four private ID bytes.
    fn set_hmac_key(&mut self, key: &HmacKey) {
        self.key.copy_from_slice(&key.0[..KEY_SIZE]);
        self.uid[..4].copy_from_slice(&key.0[KEY_SIZE..]);
    }

    /// Stored as `imf / 16`, big-endian, in the last two private ID bytes.
    fn set_oath_imf(&mut self, imf: u32) {
        let imf = (imf / 16) as u16;
        self.uid[4..].copy_from_slice(&imf.to_be_bytes());
    }

    fn set_ticket_flag(&mut self, flag: TicketFlag) -> Result<()> {
        self.version.require(flag.min_version(), flag.name())?;
        self.tkt_flags |= flag.bits();
        Ok(())
    }

    fn set_config_flag(&mut self, flag: ConfigFlag) -> Result<()> {
        self.version.require(flag.min_version(), flag.name())?;
        self.cfg_flags |= flag.bits();
        Ok(())
    }

    fn set_extended_flag(&mut self, flag: ExtendedFlag) -> Result<()> {
        self.version.require(flag.min_version(), flag.name())?;
        self.ext_flags |= flag.bits();
        Ok(())
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn mode(&self) -> TicketMode {
        self.mode
    }

    pub fn fixed(&self) -> &[u8] {
        &self.fixed[..self.fixed_size as usize]
    }

    pub fn uid(&self) -> &[u8; UID_SIZE] {
        &self.uid
    }

    pub fn key(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }

    /// Full 20-byte HMAC key of a challenge-response or HOTP record.
    pub fn hmac_key(&self) -> [u8; 20] {
        let mut key = [0; 20];
        key[..KEY_SIZE].copy_from_slice(&self.key);
        key[KEY_SIZE..].copy_from_slice(&self.uid[..4]);
        key
    }

    /// Initial moving factor of a HOTP record.
    pub fn imf(&self) -> u32 {
        u16::from_be_bytes([self.uid[4], self.uid[5]]) as u32 * 16
    }

    pub fn ticket_flags(&self) -> u8 {
        self.tkt_flags
    }

    pub fn config_flags(&self) -> u8 {
        self.cfg_flags
    }

    pub fn extended_flags(&self) -> u8 {
        self.ext_flags
    }

    pub fn has_ticket_flag(&self, flag: TicketFlag) -> bool {
        self.tkt_flags & flag.bits() == flag.bits()
    }

    pub fn has_config_flag(&self, flag: ConfigFlag) -> bool {
        self.cfg_flags & flag.bits() == flag.bits()
    }

    pub fn has_extended_flag(&self, flag: ExtendedFlag) -> bool {
        self.ext_flags & flag.bits() == flag.bits()
    }

    /// Serializes the record and appends its CRC (one's complement, little-endian).
    pub fn to_bytes(&self) -> [u8; CONFIG_SIZE] {
        let mut buf = [0; CONFIG_SIZE];
        buf[..16].copy_from_slice(&self.fixed);
        buf[16..22].copy_from_slice(&self.uid);
        buf[22..38].copy_from_slice(&self.key);
        buf[38..44].copy_from_slice(&self.acc_code);
        buf[44] = self.fixed_size;
        buf[45] = self.ext_flags;
        buf[46] = self.tkt_flags;
        buf[47] = self.cfg_flags;
        let crc = !crc16(&buf[..CONFIG_SIZE - 2]);
        buf[CONFIG_SIZE - 2..].copy_from_slice(&crc.to_le_bytes());
        debug!(
            command = ?self.command,
            mode = ?self.mode,
            ext_flags = self.ext_flags,
            tkt_flags = self.tkt_flags,
            cfg_flags = self.cfg_flags,
            "Serialized slot configuration"
        );
        buf
    }
}

/// Device-wide settings: USB mode, challenge-response touch timeout and
/// auto-eject time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfig {
    pub mode: u8,
    pub cr_timeout: u8,
    pub autoeject_time: u16,
}

impl DeviceConfig {
    /// Ejects the CCID smart card on touch (mode byte bit 7).
    pub const MODE_FLAG_EJECT: u8 = 0x80;

    pub fn new(mode: u8, cr_timeout: u8, autoeject_time: u16) -> Result<Self> {
        Mode::from_code(mode)?;
        Ok(DeviceConfig {
            mode,
            cr_timeout,
            autoeject_time,
        })
    }

    /// Minimum firmware accepting a device configuration.
    pub const fn min_version() -> Version {
        V3_0
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(structure!("<BBH").pack(self.mode, self.cr_timeout, self.autoeject_time)?)
    }
}
