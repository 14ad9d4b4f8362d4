use rand::RngExt;
use zeroize::Zeroize;

use crate::error::OtpError;
use crate::sec::{hmac_sha1, sha1};
use crate::Result;

/// Size of the secret used by the HMAC algorithm
pub const HMAC_SECRET_SIZE: usize = 20;

/// Keys longer than this are hashed before they are stored (RFC 2104).
pub const HMAC_BLOCK_SIZE: usize = 64;

/// Secret used to seed the HMAC algorithm
pub type HmacSecret = [u8; HMAC_SECRET_SIZE];

/// Response to an HMAC-SHA1 challenge.
#[derive(Debug)]
pub struct Hmac(pub HmacSecret);

impl Drop for Hmac {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl std::ops::Deref for Hmac {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Hmac {
    pub fn check(&self, key: &HmacKey, challenge: &[u8]) -> bool {
        matches!(hmac_sha1(&key.0, challenge), Ok(expected) if self.0[..] == expected)
    }
}

/// A secret key for HMAC, zero padded to `HMAC_SECRET_SIZE`.
#[derive(Debug, Clone)]
pub struct HmacKey(pub HmacSecret);

impl Drop for HmacKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl HmacKey {
    /// Loads a raw key of at most 20 bytes.
    pub fn from_slice(s: &[u8]) -> Result<Self> {
        if s.len() > HMAC_SECRET_SIZE {
            return Err(OtpError::invalid(format!(
                "key lengths >{} bytes not supported",
                HMAC_SECRET_SIZE
            )));
        }
        let mut key = HmacKey([0; HMAC_SECRET_SIZE]);
        key.0[..s.len()].copy_from_slice(s);
        Ok(key)
    }

    /// Loads an OATH key. Keys longer than the HMAC block size are replaced
    /// by their SHA-1 digest first.
    pub fn from_oath_secret(s: &[u8]) -> Result<Self> {
        if s.len() > HMAC_BLOCK_SIZE {
            let mut digest = sha1(s);
            let key = HmacKey::from_slice(&digest);
            digest.zeroize();
            return key;
        }
        HmacKey::from_slice(s)
    }

    pub fn generate<R: RngExt>(rng: &mut R) -> Self {
        let mut key = HmacKey([0; HMAC_SECRET_SIZE]);
        for i in key.0.iter_mut() {
            *i = rng.random();
        }
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_slice_pads() {
        let key = HmacKey::from_slice(b"short").unwrap();
        assert_eq!(&key.0[..5], b"short");
        assert!(key.0[5..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_from_slice_too_long() {
        let err = HmacKey::from_slice(&[0x11; 21]).unwrap_err();
        assert!(matches!(err, OtpError::InvalidArgument(_)));
    }

    #[test]
    fn test_oath_secret_hashed_when_long() {
        let secret = [0x42; 70];
        let key = HmacKey::from_oath_secret(&secret).unwrap();
        assert_eq!(key.0, sha1(&secret));

        // 64 bytes is still within the block size and too long to store.
        assert!(HmacKey::from_oath_secret(&[0x42; 64]).is_err());
    }

    #[test]
    fn test_check() {
        let key = HmacKey::from_slice(b"Jefe").unwrap();
        let response = Hmac(hmac_sha1(&key.0, b"what do ya want for nothing?").unwrap());
        assert!(response.check(&key, b"what do ya want for nothing?"));
        assert!(!response.check(&key, b"something else"));
    }

    #[test]
    fn test_generate() {
        let mut rng = rand::rng();
        let a = HmacKey::generate(&mut rng);
        let b = HmacKey::generate(&mut rng);
        assert_ne!(a.0, b.0);
    }
}
