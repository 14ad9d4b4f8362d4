//! HID feature-report transport and the command protocol spoken over it.
//!
//! Every exchange with the OTP applet goes through 8-byte feature reports.
//! Commands are sent as a 70-byte [`Frame`] split into 7-byte chunks, each
//! tagged with `SLOT_WRITE_FLAG` and its sequence number. Responses come
//! back the same way, tagged with `RESP_PENDING_FLAG`.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace};
use zeroize::Zeroize;

use crate::config::Command;
use crate::error::OtpError;
use crate::sec::{crc16, CRC_RESIDUAL_OK};
use crate::status::DeviceStatus;
use crate::Result;

#[cfg(test)]
pub(crate) mod mock;
#[cfg(all(feature = "nusb", not(feature = "rusb"), not(target_os = "windows")))]
mod nusb;
#[cfg(any(feature = "rusb", target_os = "windows"))]
mod rusb;

#[cfg(all(feature = "nusb", not(feature = "rusb"), not(target_os = "windows")))]
pub use self::nusb::{NUSBBackend as BackendType, NUSBHandle as HandleType};
#[cfg(any(feature = "rusb", target_os = "windows"))]
pub use self::rusb::{RUSBBackend as BackendType, RUSBHandle as HandleType};

#[cfg(all(feature = "nusb", not(feature = "rusb"), not(target_os = "windows")))]
pub(crate) use self::nusb::init_backend;
#[cfg(any(feature = "rusb", target_os = "windows"))]
pub(crate) use self::rusb::init_backend;

/// Yubico's USB vendor ID.
pub const VENDOR_ID: [u16; 1] = [0x1050];
/// Product IDs of devices exposing the OTP applet over HID.
pub const PRODUCT_ID: [u16; 10] = [
    0x0010, // YubiKey 1 and 2
    0x0110, // NEO OTP
    0x0111, // NEO OTP+CCID
    0x0114, // NEO OTP+FIDO
    0x0116, // NEO OTP+FIDO+CCID
    0x0401, // YubiKey 4/5 OTP
    0x0403, // YubiKey 4/5 OTP+FIDO
    0x0405, // YubiKey 4/5 OTP+CCID
    0x0407, // YubiKey 4/5 OTP+FIDO+CCID
    0x0410, // YubiKey Plus
];

/// The size of the payload when writing a request to the usb interface.
pub(crate) const PAYLOAD_SIZE: usize = 64;
/// Payload, command byte, CRC and filler.
pub(crate) const FRAME_SIZE: usize = 70;
/// Size of every feature report.
pub(crate) const REPORT_SIZE: usize = 8;
/// Useful bytes in a report; the last one carries flags.
pub(crate) const REPORT_DATA_SIZE: usize = 7;
/// Upper bound on a multi-report response.
pub(crate) const RESPONSE_LIMIT: usize = 1024;

pub(crate) const HID_GET_REPORT: u8 = 0x01;
pub(crate) const HID_SET_REPORT: u8 = 0x09;
pub(crate) const REPORT_TYPE_FEATURE: u16 = 0x03;

pub(crate) const WRITE_RESET_PAYLOAD: [u8; 8] = [0, 0, 0, 0, 0, 0, 0, 0x8f];
pub(crate) const SEQUENCE_MASK: u8 = 0x1f;

const SERIAL_SIZE: usize = 4;
const HMAC_RESPONSE_SIZE: usize = 20;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Flags: u8 {
        const SLOT_WRITE_FLAG = 0x80;
        const RESP_PENDING_FLAG = 0x40;
        /// The device is waiting for the user to touch it.
        const RESP_TIMEOUT_WAIT_FLAG = 0x20;
    }
}

/// A security key found on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub name: Option<String>,
    pub serial: Option<u32>,
    pub product_id: u16,
    pub vendor_id: u16,
    pub bus_id: u8,
    pub address_id: u8,
}

/// An open connection to one device.
///
/// Implementations own the underlying handle exclusively and must not be
/// `Clone`: one logical writer per physical device.
pub trait Transport {
    /// Reads one feature report into `buf` (8 bytes).
    fn read_report(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Writes one 8-byte feature report.
    fn write_report(&mut self, packet: &[u8]) -> Result<()>;

    /// USB product ID of the device behind this handle.
    fn product_id(&self) -> u16;

    /// Releases the handle. Calling it again is a no-op.
    fn close(&mut self) -> Result<()>;
}

/// Enumerates devices and opens them.
pub trait Backend: Sized {
    type Handle: Transport;

    fn new() -> Result<Self>;

    fn open_device(&mut self, device: &Device) -> Result<Self::Handle>;

    /// Lists the supported devices. Fails with [`OtpError::DeviceNotFound`] when there are none.
    fn find_all_devices(&mut self) -> Result<Vec<Device>>;

    fn find_device(&mut self) -> Result<Device> {
        self.find_all_devices()?
            .into_iter()
            .next()
            .ok_or(OtpError::DeviceNotFound)
    }

    fn find_device_from_serial(&mut self, serial: u32) -> Result<Device> {
        self.find_all_devices()?
            .into_iter()
            .find(|d| d.serial == Some(serial))
            .ok_or(OtpError::DeviceNotFound)
    }

    fn read_serial_from_device(&mut self, device: &Device) -> Result<u32> {
        let mut handle = self.open_device(device)?;
        let serial = read_serial(&mut handle, &WaitPolicy::default());
        handle.close()?;
        serial
    }
}

/// Result of a device enumeration, shared by the backends.
pub(crate) fn found_devices(devices: Vec<Device>) -> Result<Vec<Device>> {
    if devices.is_empty() {
        return Err(OtpError::DeviceNotFound);
    }
    Ok(devices)
}

/// How long the host keeps polling the device.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WaitPolicy {
    /// Limit for a plain command to be processed.
    pub timeout: Duration,
    /// Limit once the device reports it is waiting for a touch.
    pub touch_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        WaitPolicy {
            timeout: Duration::from_millis(1150),
            touch_timeout: Duration::from_secs(256),
            poll_interval: Duration::from_millis(1),
        }
    }
}

#[cfg(test)]
impl WaitPolicy {
    pub(crate) fn fast() -> Self {
        WaitPolicy {
            timeout: Duration::from_millis(50),
            touch_timeout: Duration::from_millis(50),
            poll_interval: Duration::from_millis(1),
        }
    }
}

pub struct Frame {
    pub payload: [u8; PAYLOAD_SIZE],
    command: Command,
    crc: u16,
}

impl Frame {
    pub fn new(payload: [u8; PAYLOAD_SIZE], command: Command) -> Self {
        let crc = crc16(&payload);
        Frame { payload, command, crc }
    }

    /// Builds a frame from a payload shorter than `PAYLOAD_SIZE`, zero padded.
    pub fn from_data(data: &[u8], command: Command) -> Result<Self> {
        if data.len() > PAYLOAD_SIZE {
            return Err(OtpError::invalid(format!(
                "payload must be <= {} bytes",
                PAYLOAD_SIZE
            )));
        }
        let mut payload = [0; PAYLOAD_SIZE];
        payload[..data.len()].copy_from_slice(data);
        let frame = Frame::new(payload, command);
        payload.zeroize();
        Ok(frame)
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn to_bytes(&self) -> [u8; FRAME_SIZE] {
        let mut data = [0; FRAME_SIZE];
        data[..PAYLOAD_SIZE].copy_from_slice(&self.payload);
        data[PAYLOAD_SIZE] = self.command.code();
        data[PAYLOAD_SIZE + 1..PAYLOAD_SIZE + 3].copy_from_slice(&self.crc.to_le_bytes());
        data
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        self.payload.zeroize();
    }
}

fn read<T: Transport + ?Sized>(handle: &mut T, buf: &mut [u8]) -> Result<usize> {
    let n = handle.read_report(buf)?;
    trace!(report = %hex::encode(&buf[..n]), "Read feature report");
    Ok(n)
}

fn raw_write<T: Transport + ?Sized>(handle: &mut T, packet: &[u8]) -> Result<()> {
    trace!(report = %hex::encode(packet), "Write feature report");
    handle.write_report(packet)
}

/// Reads the status block. Does not wait for pending operations.
pub(crate) fn read_status<T: Transport + ?Sized>(handle: &mut T) -> Result<DeviceStatus> {
    let mut buf = [0; REPORT_SIZE];
    if read(handle, &mut buf)? < REPORT_SIZE {
        return Err(OtpError::CanNotReadFromDevice);
    }
    let status = DeviceStatus::from_report(&buf)?;
    debug!(
        version = %status.version,
        pgm_seq = status.pgm_seq,
        touch_level = status.touch_level,
        "Read device status"
    );
    Ok(status)
}

/// Polls the device until `f` accepts its flags.
///
/// Fails with `DeviceBusy` if the device is still writing when the deadline
/// passes, or if it stops waiting for a touch without answering.
pub(crate) fn wait<T: Transport + ?Sized, F: Fn(Flags) -> bool>(
    handle: &mut T,
    policy: &WaitPolicy,
    f: F,
    buf: &mut [u8],
) -> Result<Flags> {
    let start = Instant::now();
    let mut deadline = policy.timeout;
    let mut touch_flags: Option<Flags> = None;
    loop {
        read(handle, buf)?;
        let flags = Flags::from_bits_truncate(buf[REPORT_SIZE - 1]);
        if f(flags) {
            return Ok(flags);
        }

        if flags.contains(Flags::RESP_TIMEOUT_WAIT_FLAG) {
            if touch_flags.is_none() {
                debug!("Device is waiting for touch");
                deadline = policy.touch_timeout;
            }
            touch_flags = Some(flags);
        } else if let Some(last) = touch_flags {
            debug!("Device gave up waiting for touch");
            return Err(OtpError::DeviceBusy(last.bits()));
        }

        if start.elapsed() >= deadline {
            if let Some(last) = touch_flags {
                return Err(OtpError::DeviceBusy(last.bits()));
            }
            if flags.contains(Flags::SLOT_WRITE_FLAG) {
                return Err(OtpError::DeviceBusy(flags.bits()));
            }
            return Err(OtpError::Timeout);
        }
        thread::sleep(policy.poll_interval);
    }
}

pub(crate) fn write_frame<T: Transport + ?Sized>(handle: &mut T, policy: &WaitPolicy, frame: &Frame) -> Result<()> {
    let mut bytes = frame.to_bytes();
    let result = write_chunks(handle, policy, &bytes);
    bytes.zeroize();
    result
}

fn write_chunks<T: Transport + ?Sized>(handle: &mut T, policy: &WaitPolicy, mut data: &[u8]) -> Result<()> {
    let mut seq = 0;
    let mut buf = [0; REPORT_SIZE];
    while !data.is_empty() {
        let (a, b) = data.split_at(REPORT_DATA_SIZE);

        if seq == 0 || b.is_empty() || a.iter().any(|&x| x != 0) {
            let mut packet = [0; REPORT_SIZE];
            packet[..REPORT_DATA_SIZE].copy_from_slice(a);

            packet[REPORT_SIZE - 1] = Flags::SLOT_WRITE_FLAG.bits() + seq;
            wait(handle, policy, |x| !x.contains(Flags::SLOT_WRITE_FLAG), &mut buf)?;
            let written = raw_write(handle, &packet);
            packet.zeroize();
            written?;
        }
        data = b;
        seq += 1
    }
    Ok(())
}

/// Reset the write state after a read.
pub(crate) fn write_reset<T: Transport + ?Sized>(handle: &mut T, policy: &WaitPolicy) -> Result<()> {
    raw_write(handle, &WRITE_RESET_PAYLOAD)?;
    let mut buf = [0; REPORT_SIZE];
    wait(handle, policy, |x| !x.contains(Flags::SLOT_WRITE_FLAG), &mut buf)?;
    Ok(())
}

pub(crate) fn read_response<T: Transport + ?Sized>(handle: &mut T, policy: &WaitPolicy) -> Result<Vec<u8>> {
    let mut response = Vec::new();
    let mut packet = [0; REPORT_SIZE];
    wait(handle, policy, |f| f.contains(Flags::RESP_PENDING_FLAG), &mut packet)?;
    response.extend_from_slice(&packet[..REPORT_DATA_SIZE]);
    loop {
        if read(handle, &mut packet)? < REPORT_SIZE {
            break;
        }
        let flags = Flags::from_bits_truncate(packet[REPORT_SIZE - 1]);
        if !flags.contains(Flags::RESP_PENDING_FLAG) {
            break;
        }
        // The sequence wraps back to 0 once every report has been read.
        if packet[REPORT_SIZE - 1] & SEQUENCE_MASK == 0 || response.len() >= RESPONSE_LIMIT {
            break;
        }
        response.extend_from_slice(&packet[..REPORT_DATA_SIZE]);
    }
    write_reset(handle, policy)?;
    Ok(response)
}

/// Checks the CRC that follows `len` bytes of response data.
fn check_crc(response: &[u8], len: usize) -> Result<()> {
    if response.len() < len + 2 {
        return Err(OtpError::CanNotReadFromDevice);
    }
    if crc16(&response[..len + 2]) != CRC_RESIDUAL_OK {
        return Err(OtpError::WrongCRC);
    }
    Ok(())
}

/// Writes a configuration command and verifies the device accepted it.
///
/// With no payload the frame is all zeroes, which erases the targeted slot.
/// The device increments its programming sequence on every accepted write and
/// resets it to 0 once no slot is configured, so a write leaving the device
/// blank with a zero sequence is accepted even when the sequence did not move.
pub(crate) fn write_command<T: Transport + ?Sized>(
    handle: &mut T,
    policy: &WaitPolicy,
    payload: Option<&[u8]>,
    command: Command,
) -> Result<()> {
    let before = read_status(handle)?;
    let frame = Frame::from_data(payload.unwrap_or(&[]), command)?;

    debug!(?command, erase = payload.is_none(), "Writing command");
    write_frame(handle, policy, &frame)?;
    let mut buf = [0; REPORT_SIZE];
    wait(handle, policy, |f| !f.contains(Flags::SLOT_WRITE_FLAG), &mut buf)?;

    let after = read_status(handle)?;
    let accepted = if !after.any_configured() && after.pgm_seq == 0 {
        true
    } else {
        after.pgm_seq != before.pgm_seq
    };
    if !accepted {
        return Err(OtpError::ConfigNotWritten {
            before: before.pgm_seq,
            after: after.pgm_seq,
        });
    }
    Ok(())
}

/// Writes the device-mode record. The device reboots into the new mode on
/// re-plug, so there is no sequence to verify.
pub(crate) fn write_device_config<T: Transport + ?Sized>(
    handle: &mut T,
    policy: &WaitPolicy,
    config: &[u8],
) -> Result<()> {
    let frame = Frame::from_data(config, Command::DeviceConfig)?;
    debug!("Writing device configuration");
    write_frame(handle, policy, &frame)?;
    let mut buf = [0; REPORT_SIZE];
    wait(handle, policy, |f| !f.contains(Flags::SLOT_WRITE_FLAG), &mut buf)?;
    Ok(())
}

pub(crate) fn read_serial<T: Transport + ?Sized>(handle: &mut T, policy: &WaitPolicy) -> Result<u32> {
    let frame = Frame::new([0; PAYLOAD_SIZE], Command::DeviceSerial);
    write_frame(handle, policy, &frame)?;
    let response = read_response(handle, policy)?;
    check_crc(&response, SERIAL_SIZE)?;
    let (serial,) = structure!(">I").unpack(&response[..SERIAL_SIZE])?;
    Ok(serial)
}

/// Reads the raw capability blob: a length byte followed by that many bytes.
pub(crate) fn read_capabilities<T: Transport + ?Sized>(handle: &mut T, policy: &WaitPolicy) -> Result<Vec<u8>> {
    let frame = Frame::new([0; PAYLOAD_SIZE], Command::YK4Capabilities);
    write_frame(handle, policy, &frame)?;
    let response = read_response(handle, policy)?;
    let len = match response.first() {
        Some(len) => *len as usize + 1,
        None => return Err(OtpError::CanNotReadFromDevice),
    };
    check_crc(&response, len)?;
    Ok(response[..len].to_vec())
}

pub(crate) fn challenge_hmac<T: Transport + ?Sized>(
    handle: &mut T,
    policy: &WaitPolicy,
    challenge: [u8; PAYLOAD_SIZE],
    command: Command,
) -> Result<[u8; HMAC_RESPONSE_SIZE]> {
    let frame = Frame::new(challenge, command);
    write_frame(handle, policy, &frame)?;
    let mut response = read_response(handle, policy)?;
    let result = check_crc(&response, HMAC_RESPONSE_SIZE).map(|_| {
        let mut hmac = [0; HMAC_RESPONSE_SIZE];
        hmac.copy_from_slice(&response[..HMAC_RESPONSE_SIZE]);
        hmac
    });
    response.zeroize();
    result
}

#[cfg(test)]
mod tests {
    use super::mock::MockDevice;
    use super::*;
    use crate::status::Version;

    #[test]
    fn test_found_devices() {
        assert!(matches!(found_devices(Vec::new()), Err(OtpError::DeviceNotFound)));

        let device = Device {
            name: Some("YubiKey OTP+FIDO+CCID".to_string()),
            serial: Some(4242),
            product_id: 0x0407,
            vendor_id: 0x1050,
            bus_id: 1,
            address_id: 4,
        };
        let devices = found_devices(vec![device]).unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].serial, Some(4242));
    }

    #[test]
    fn test_frame_layout() {
        let mut payload = [0; PAYLOAD_SIZE];
        payload[0] = 0xaa;
        let frame = Frame::new(payload, Command::Configuration2);
        let bytes = frame.to_bytes();
        assert_eq!(bytes[0], 0xaa);
        assert_eq!(bytes[64], 0x03);
        assert_eq!(u16::from_le_bytes([bytes[65], bytes[66]]), crc16(&payload));
        assert_eq!(&bytes[67..], &[0, 0, 0]);
    }

    #[test]
    fn test_frame_from_data_too_long() {
        assert!(Frame::from_data(&[1; 65], Command::Swap).is_err());
        let frame = Frame::from_data(&[1; 3], Command::Swap).unwrap();
        assert_eq!(&frame.payload[..4], &[1, 1, 1, 0]);
    }

    #[test]
    fn test_write_frame_skips_empty_chunks() {
        let (mut device, state) = MockDevice::new(Version::new(4, 3, 7));
        let mut payload = [0; PAYLOAD_SIZE];
        payload[20] = 0x01;
        let frame = Frame::new(payload, Command::DeviceConfig);
        write_frame(&mut device, &WaitPolicy::fast(), &frame).unwrap();

        // Chunk 0, the chunk holding byte 20, and the chunk holding command + CRC.
        let sequences: Vec<u8> = state.borrow().written.iter().map(|p| p[7]).collect();
        assert_eq!(sequences, vec![0x80, 0x82, 0x89]);
        assert_eq!(state.borrow().commands, vec![Command::DeviceConfig.code()]);
    }

    #[test]
    fn test_wait_busy() {
        let (mut device, state) = MockDevice::new(Version::new(4, 3, 7));
        state.borrow_mut().busy = true;
        let mut buf = [0; REPORT_SIZE];
        let err = wait(
            &mut device,
            &WaitPolicy::fast(),
            |f| !f.contains(Flags::SLOT_WRITE_FLAG),
            &mut buf,
        )
        .unwrap_err();
        assert!(matches!(err, OtpError::DeviceBusy(0x80)));
    }

    #[test]
    fn test_wait_timeout_when_idle() {
        let (mut device, _state) = MockDevice::new(Version::new(4, 3, 7));
        let mut buf = [0; REPORT_SIZE];
        let err = wait(
            &mut device,
            &WaitPolicy::fast(),
            |f| f.contains(Flags::RESP_PENDING_FLAG),
            &mut buf,
        )
        .unwrap_err();
        assert!(matches!(err, OtpError::Timeout));
    }

    #[test]
    fn test_read_serial() {
        let (mut device, state) = MockDevice::new(Version::new(4, 3, 7));
        state.borrow_mut().serial = Some(0x00bc614e);
        assert_eq!(read_serial(&mut device, &WaitPolicy::fast()).unwrap(), 12345678);
        assert!(state.borrow().response.is_empty());
    }

    #[test]
    fn test_read_serial_bad_crc() {
        let (mut device, state) = MockDevice::new(Version::new(4, 3, 7));
        {
            let mut state = state.borrow_mut();
            state.serial = Some(42);
            state.corrupt_responses = true;
        }
        let err = read_serial(&mut device, &WaitPolicy::fast()).unwrap_err();
        assert!(matches!(err, OtpError::WrongCRC));
    }

    #[test]
    fn test_read_capabilities() {
        let (mut device, state) = MockDevice::new(Version::new(4, 3, 7));
        let blob: Vec<u8> = vec![0x0b, 0x01, 0x02, 0x02, 0x3f, 0x02, 0x04, 0x00, 0x7a, 0x3a, 0x03, 0x01];
        state.borrow_mut().capabilities = blob.clone();
        let caps = read_capabilities(&mut device, &WaitPolicy::fast()).unwrap();
        assert_eq!(caps, blob);
    }

    #[test]
    fn test_write_command_rejected() {
        let (mut device, state) = MockDevice::new(Version::new(4, 3, 7));
        {
            let mut state = state.borrow_mut();
            state.slots[0] = Some([1; 52]);
            state.pgm_seq = 3;
            state.ignore_writes = true;
        }
        let err = write_command(&mut device, &WaitPolicy::fast(), Some(&[1; 52]), Command::Configuration1).unwrap_err();
        assert!(matches!(err, OtpError::ConfigNotWritten { before: 3, after: 3 }));
    }

    #[test]
    fn test_write_command_blank_device_stays_at_zero() {
        let (mut device, state) = MockDevice::new(Version::new(2, 3, 0));
        write_command(&mut device, &WaitPolicy::fast(), None, Command::Swap).unwrap();
        let state = state.borrow();
        assert_eq!(state.pgm_seq, 0);
        assert_eq!(state.commands.last(), Some(&Command::Swap.code()));
    }
}
