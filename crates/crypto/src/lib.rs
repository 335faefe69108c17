//! Symmetric payload encryption, used opaquely by the codec (§4.1.2).
//!
//! The key is supplied through configuration; there is no derivation from
//! timestamps or other runtime-observable values (§9's open question on the
//! source's "questionable key derivation").

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, Nonce};
use thiserror::Error;

const NONCE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("sealed payload is shorter than the minimum nonce+tag length")]
    Truncated,
    #[error("AEAD seal failed")]
    SealFailed,
    #[error("AEAD open failed (wrong key, or payload tampered with)")]
    OpenFailed,
}

/// Opaque symmetric cipher used by the codec when payload encryption is
/// configured. `seal` prepends a fresh random nonce to the ciphertext;
/// `open` expects that same layout.
pub trait PayloadCipher: Send + Sync {
    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>;
    fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

/// AES-256-GCM implementation, the AEAD preferred by §4.1.2.
pub struct AesGcmCipher {
    cipher: Aes256Gcm,
}

impl AesGcmCipher {
    /// `key` must be exactly 32 bytes, supplied verbatim from configuration.
    pub fn new(key: &[u8; 32]) -> Self {
        let key = Key::<Aes256Gcm>::from_slice(key);
        Self { cipher: Aes256Gcm::new(key) }
    }
}

impl PayloadCipher for AesGcmCipher {
    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| CryptoError::SealFailed)?;
        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if sealed.len() < NONCE_LEN {
            return Err(CryptoError::Truncated);
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CryptoError::OpenFailed)
    }
}
