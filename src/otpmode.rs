use rand::RngExt;
use zeroize::Zeroize;

use crate::error::OtpError;
use crate::Result;

/// Size of the AES-128 key used for Yubico OTP.
pub const AES128_KEY_SIZE: usize = 16;

/// Size of the private identity mixed into every OTP.
pub const PRIVATE_ID_SIZE: usize = 6;

/// AES-128 key for a Yubico OTP slot.
#[derive(Debug, Clone)]
pub struct Aes128Key(pub [u8; AES128_KEY_SIZE]);

impl Drop for Aes128Key {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl Aes128Key {
    pub fn from_slice(s: &[u8]) -> Result<Self> {
        if s.len() != AES128_KEY_SIZE {
            return Err(OtpError::invalid(format!("key must be {} bytes", AES128_KEY_SIZE)));
        }
        let mut key = Aes128Key([0; AES128_KEY_SIZE]);
        key.0.copy_from_slice(s);
        Ok(key)
    }

    pub fn generate<R: RngExt>(rng: &mut R) -> Self {
        let mut key = Aes128Key([0; AES128_KEY_SIZE]);
        for i in key.0.iter_mut() {
            *i = rng.random();
        }
        key
    }
}

/// Private identity of a Yubico OTP slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrivateId(pub [u8; PRIVATE_ID_SIZE]);

impl PrivateId {
    pub fn from_slice(s: &[u8]) -> Result<Self> {
        if s.len() != PRIVATE_ID_SIZE {
            return Err(OtpError::invalid(format!(
                "private ID must be {} bytes",
                PRIVATE_ID_SIZE
            )));
        }
        let mut uid = [0; PRIVATE_ID_SIZE];
        uid.copy_from_slice(s);
        Ok(PrivateId(uid))
    }

    pub fn generate<R: RngExt>(rng: &mut R) -> Self {
        let mut uid = [0; PRIVATE_ID_SIZE];
        for i in uid.iter_mut() {
            *i = rng.random();
        }
        PrivateId(uid)
    }
}
