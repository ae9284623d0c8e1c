use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};

use crate::error::JobError;

const NONCE_LEN: usize = 12;

/// Opaque encrypt/decrypt capability protecting persisted job records.
///
/// The store never generates or holds key material; whatever implements this
/// trait does. Implementations must be safe to call from multiple tasks.
pub trait EncryptionCapability: Send + Sync {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, JobError>;

    /// Fails with [`JobError::DecryptionFailed`] on tampered or truncated input.
    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, JobError>;
}

/// AES-256-GCM encryption with a random per-record nonce.
///
/// Output layout: `nonce (12 bytes) || ciphertext`.
pub struct AesGcmEncryption {
    cipher: Aes256Gcm,
}

impl AesGcmEncryption {
    pub fn new(key: &[u8; 32]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
        }
    }
}

impl EncryptionCapability for AesGcmEncryption {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, JobError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| JobError::Internal(format!("encryption failed: {}", e)))?;

        let mut output = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        output.extend_from_slice(&nonce_bytes);
        output.extend_from_slice(&ciphertext);
        Ok(output)
    }

    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, JobError> {
        if data.len() < NONCE_LEN {
            return Err(JobError::DecryptionFailed);
        }

        let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| JobError::DecryptionFailed)
    }
}
