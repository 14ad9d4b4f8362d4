use hmac::{Hmac, Mac};
use sha1::{Digest, Sha1};

use crate::error::OtpError;
use crate::Result;

/// Residual left by `crc16` over a buffer followed by its own complemented CRC.
pub const CRC_RESIDUAL_OK: u16 = 0xf0b8;

type HmacSha1 = Hmac<Sha1>;

/// CRC-16 as computed by the device firmware (ISO 13239, reflected 0x8408).
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xffff;
    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            let n = crc & 1;
            crc >>= 1;
            if n != 0 {
                crc ^= 0x8408;
            }
        }
    }
    crc
}

pub fn hmac_sha1(key: &[u8], data: &[u8]) -> Result<[u8; 20]> {
    let mut mac = HmacSha1::new_from_slice(key).map_err(|e| OtpError::invalid(format!("HMAC key: {}", e)))?;
    mac.update(data);
    let mut out = [0; 20];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

pub fn sha1(data: &[u8]) -> [u8; 20] {
    let mut out = [0; 20];
    out.copy_from_slice(&Sha1::digest(data));
    out
}
