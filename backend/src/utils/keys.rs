//! RSA signing keypair loaded once at boot.

use jsonwebtoken::{crypto, Algorithm, DecodingKey, EncodingKey};
use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

pub const SIGNING_ALGORITHM: Algorithm = Algorithm::PS512;

const KEYPAIR_CHECK_MESSAGE: &[u8] = b"identity-backend keypair check";

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("failed to read {role} key file {path}")]
    Read {
        role: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{role} key is not a valid RSA PEM key")]
    Parse { role: &'static str },
    #[error("public key does not verify signatures made by the private key")]
    Mismatch,
}

/// Immutable signing material shared by every issuer/verifier call.
pub struct KeyMaterial {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("algorithm", &SIGNING_ALGORITHM)
            .finish_non_exhaustive()
    }
}

impl KeyMaterial {
    pub fn load(private_key_path: &Path, public_key_path: &Path) -> Result<Self, KeyError> {
        let private_pem = read_key("private", private_key_path)?;
        let public_pem = read_key("public", public_key_path)?;
        Self::from_pem(&private_pem, &public_pem)
    }

    pub fn from_pem(private_pem: &[u8], public_pem: &[u8]) -> Result<Self, KeyError> {
        let encoding = EncodingKey::from_rsa_pem(private_pem)
            .map_err(|_| KeyError::Parse { role: "private" })?;
        let decoding = DecodingKey::from_rsa_pem(public_pem)
            .map_err(|_| KeyError::Parse { role: "public" })?;
        let keys = Self { encoding, decoding };
        keys.ensure_pair_matches()?;
        Ok(keys)
    }

    pub(crate) fn encoding_key(&self) -> &EncodingKey {
        &self.encoding
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }

    fn ensure_pair_matches(&self) -> Result<(), KeyError> {
        let signature = crypto::sign(KEYPAIR_CHECK_MESSAGE, &self.encoding, SIGNING_ALGORITHM)
            .map_err(|_| KeyError::Mismatch)?;
        let verified = crypto::verify(&signature, KEYPAIR_CHECK_MESSAGE, &self.decoding, SIGNING_ALGORITHM)
            .map_err(|_| KeyError::Mismatch)?;
        if verified {
            Ok(())
        } else {
            Err(KeyError::Mismatch)
        }
    }
}

fn read_key(role: &'static str, path: &Path) -> Result<Vec<u8>, KeyError> {
    fs::read(path).map_err(|source| KeyError::Read {
        role,
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
pub(crate) mod test_keys {
    pub const PRIVATE_PEM: &str = include_str!("../../tests/fixtures/keys/private.pem");
    pub const PUBLIC_PEM: &str = include_str!("../../tests/fixtures/keys/public.pem");
    pub const OTHER_PUBLIC_PEM: &str = include_str!("../../tests/fixtures/keys/other_public.pem");
}
