use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use std::fmt;

const NONCE_LENGTH: usize = 12;
pub const KEY_LENGTH: usize = 32;

/// AES-256-GCM sealing for cached snapshots.
///
/// Sealed form is `base64(nonce || ciphertext)` with the standard alphabet.
#[derive(Clone)]
pub struct CacheCipher {
    cipher: Aes256Gcm,
}

impl fmt::Debug for CacheCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CacheCipher(..)")
    }
}

impl CacheCipher {
    pub fn new(key: &[u8]) -> Result<Self> {
        if key.len() != KEY_LENGTH {
            return Err(anyhow!("Invalid encryption key length"));
        }
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| anyhow!("Invalid encryption key"))?;
        Ok(Self { cipher })
    }

    pub fn seal(&self, plaintext: &[u8]) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|_| anyhow!("Encryption failed"))?;

        let mut sealed = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(sealed))
    }

    pub fn open(&self, stored: &str) -> Result<Vec<u8>> {
        let sealed = STANDARD
            .decode(stored)
            .map_err(|_| anyhow!("Invalid ciphertext encoding"))?;
        if sealed.len() < NONCE_LENGTH {
            return Err(anyhow!("Ciphertext too short"));
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LENGTH);
        self.cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| anyhow!("Decryption failed"))
    }
}
