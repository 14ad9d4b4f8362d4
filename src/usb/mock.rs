//! Simulated OTP applet speaking the feature-report protocol.

use std::cell::RefCell;
use std::rc::Rc;

use crate::config::Command;
use crate::configure::CONFIG_SIZE;
use crate::error::OtpError;
use crate::sec::{crc16, hmac_sha1, CRC_RESIDUAL_OK};
use crate::status::Version;
use crate::usb::{Flags, Transport, FRAME_SIZE, PAYLOAD_SIZE, REPORT_DATA_SIZE, REPORT_SIZE, WRITE_RESET_PAYLOAD};

const CFG_CHAL_HMAC: u8 = 0x22;
const CFG_HMAC_LT64: u8 = 0x04;
const CFG_CHAL_BTN_TRIG: u8 = 0x08;

#[derive(Debug)]
pub(crate) struct MockState {
    pub version: Version,
    pub product_id: u16,
    pub pgm_seq: u8,
    pub serial: Option<u32>,
    pub capabilities: Vec<u8>,
    pub slots: [Option<[u8; CONFIG_SIZE]>; 2],
    pub device_config: Option<Vec<u8>>,
    /// Keep `SLOT_WRITE_FLAG` raised forever.
    pub busy: bool,
    /// Accept frames without applying them.
    pub ignore_writes: bool,
    /// Touch-triggered challenges wait for a touch that never comes.
    pub never_touched: bool,
    pub corrupt_responses: bool,
    pub disconnected: bool,
    /// Every report written, in order.
    pub written: Vec<[u8; REPORT_SIZE]>,
    /// Command byte of every complete frame received.
    pub commands: Vec<u8>,
    pub close_count: usize,
    pub response: Vec<u8>,
    response_index: usize,
    awaiting_touch: bool,
    frame: [u8; FRAME_SIZE],
}

impl MockState {
    pub(crate) fn touch_level(&self) -> u16 {
        let mut level = 0;
        if self.slots[0].is_some() {
            level |= 0x01;
        }
        if self.slots[1].is_some() {
            level |= 0x02;
        }
        level
    }

    fn status_report(&self, buf: &mut [u8]) {
        let touch_level = self.touch_level().to_le_bytes();
        buf[1] = self.version.major;
        buf[2] = self.version.minor;
        buf[3] = self.version.build;
        buf[4] = self.pgm_seq;
        buf[5] = touch_level[0];
        buf[6] = touch_level[1];
        buf[7] = if self.busy { Flags::SLOT_WRITE_FLAG.bits() } else { 0 };
    }

    fn respond(&mut self, data: &[u8]) {
        let mut response = data.to_vec();
        let mut crc = !crc16(data);
        if self.corrupt_responses {
            crc ^= 0x0101;
        }
        response.extend_from_slice(&crc.to_le_bytes());
        self.response = response;
        self.response_index = 0;
    }

    fn programmed(&mut self) {
        if self.touch_level() == 0 {
            self.pgm_seq = 0;
        } else {
            self.pgm_seq = self.pgm_seq.wrapping_add(1).max(1);
        }
    }

    fn process_frame(&mut self) {
        let payload = &self.frame[..PAYLOAD_SIZE];
        let command = self.frame[PAYLOAD_SIZE];
        let crc = u16::from_le_bytes([self.frame[PAYLOAD_SIZE + 1], self.frame[PAYLOAD_SIZE + 2]]);
        if crc16(payload) != crc {
            return;
        }
        self.commands.push(command);
        if self.ignore_writes {
            return;
        }

        let payload: [u8; PAYLOAD_SIZE] = match payload.try_into() {
            Ok(p) => p,
            Err(_) => return,
        };
        match command {
            c if c == Command::Configuration1.code() || c == Command::Configuration2.code() => {
                let index = if c == Command::Configuration1.code() { 0 } else { 1 };
                let record = &payload[..CONFIG_SIZE];
                if record.iter().all(|&b| b == 0) {
                    self.slots[index] = None;
                } else if crc16(record) == CRC_RESIDUAL_OK {
                    let mut stored = [0; CONFIG_SIZE];
                    stored.copy_from_slice(record);
                    self.slots[index] = Some(stored);
                } else {
                    return;
                }
                self.programmed();
            }
            c if c == Command::Swap.code() => {
                self.slots.swap(0, 1);
                self.programmed();
            }
            c if c == Command::DeviceSerial.code() => {
                if let Some(serial) = self.serial {
                    self.respond(&serial.to_be_bytes());
                }
            }
            c if c == Command::DeviceConfig.code() => {
                self.device_config = Some(payload[..4].to_vec());
            }
            c if c == Command::YK4Capabilities.code() => {
                let capabilities = self.capabilities.clone();
                self.respond(&capabilities);
            }
            c if c == Command::ChallengeHmac1.code() || c == Command::ChallengeHmac2.code() => {
                let index = if c == Command::ChallengeHmac1.code() { 0 } else { 1 };
                let record = match self.slots[index] {
                    Some(record) => record,
                    None => return,
                };
                let cfg_flags = record[47];
                if cfg_flags & CFG_CHAL_HMAC != CFG_CHAL_HMAC {
                    return;
                }
                if cfg_flags & CFG_CHAL_BTN_TRIG != 0 && self.never_touched {
                    self.awaiting_touch = true;
                    return;
                }
                let mut challenge = payload.to_vec();
                if cfg_flags & CFG_HMAC_LT64 != 0 {
                    let pad = payload[PAYLOAD_SIZE - 1];
                    while challenge.last() == Some(&pad) {
                        challenge.pop();
                    }
                }
                let mut key = [0; 20];
                key[..16].copy_from_slice(&record[22..38]);
                key[16..].copy_from_slice(&record[16..20]);
                if let Ok(response) = hmac_sha1(&key, &challenge) {
                    self.respond(&response);
                }
            }
            _ => {}
        }
    }
}

/// Transport backed by a [`MockState`] the test keeps a handle to.
pub(crate) struct MockDevice {
    state: Rc<RefCell<MockState>>,
}

impl MockDevice {
    pub(crate) fn new(version: Version) -> (Self, Rc<RefCell<MockState>>) {
        let state = Rc::new(RefCell::new(MockState {
            version,
            product_id: 0x0407,
            pgm_seq: 0,
            serial: None,
            capabilities: Vec::new(),
            slots: [None, None],
            device_config: None,
            busy: false,
            ignore_writes: false,
            never_touched: false,
            corrupt_responses: false,
            disconnected: false,
            written: Vec::new(),
            commands: Vec::new(),
            close_count: 0,
            response: Vec::new(),
            response_index: 0,
            awaiting_touch: false,
            frame: [0; FRAME_SIZE],
        }));
        (MockDevice { state: state.clone() }, state)
    }
}

impl Transport for MockDevice {
    fn read_report(&mut self, buf: &mut [u8]) -> Result<usize, OtpError> {
        let mut state = self.state.borrow_mut();
        if state.disconnected {
            return Err(OtpError::CanNotReadFromDevice);
        }
        buf.iter_mut().for_each(|b| *b = 0);

        if state.awaiting_touch {
            buf[7] = Flags::RESP_TIMEOUT_WAIT_FLAG.bits() | 0x0f;
        } else if !state.response.is_empty() {
            let chunks = state.response.len().div_ceil(REPORT_DATA_SIZE);
            let index = state.response_index % chunks;
            let start = index * REPORT_DATA_SIZE;
            let end = (start + REPORT_DATA_SIZE).min(state.response.len());
            buf[..end - start].copy_from_slice(&state.response[start..end]);
            buf[7] = Flags::RESP_PENDING_FLAG.bits() | index as u8;
            state.response_index += 1;
        } else {
            state.status_report(buf);
        }
        Ok(REPORT_SIZE)
    }

    fn write_report(&mut self, packet: &[u8]) -> Result<(), OtpError> {
        let mut state = self.state.borrow_mut();
        if state.disconnected {
            return Err(OtpError::CanNotWriteToDevice);
        }
        let mut report = [0; REPORT_SIZE];
        report.copy_from_slice(packet);
        state.written.push(report);

        if report == WRITE_RESET_PAYLOAD {
            state.response.clear();
            state.response_index = 0;
            return Ok(());
        }

        let flags = report[7];
        if flags & Flags::SLOT_WRITE_FLAG.bits() != 0 {
            let seq = (flags & 0x1f) as usize;
            if seq == 0 {
                state.frame = [0; FRAME_SIZE];
            }
            let start = seq * REPORT_DATA_SIZE;
            if start + REPORT_DATA_SIZE <= FRAME_SIZE {
                state.frame[start..start + REPORT_DATA_SIZE].copy_from_slice(&report[..REPORT_DATA_SIZE]);
            }
            if start + REPORT_DATA_SIZE == FRAME_SIZE {
                state.process_frame();
            }
        }
        Ok(())
    }

    fn product_id(&self) -> u16 {
        self.state.borrow().product_id
    }

    fn close(&mut self) -> Result<(), OtpError> {
        self.state.borrow_mut().close_count += 1;
        Ok(())
    }
}
