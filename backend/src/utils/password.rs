use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand::Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;

    Ok(password_hash.to_string())
}

pub fn verify_password(password: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|e| anyhow::anyhow!("Invalid password hash: {}", e))?;

    let argon2 = Argon2::default();
    match argon2.verify_password(password.as_bytes(), &parsed_hash) {
        Ok(_) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(anyhow::anyhow!("Password verification error: {}", e)),
    }
}

/// Six-digit one-time code for password reset and email verification.
pub fn generate_one_time_code() -> String {
    let code: u32 = rand::rngs::OsRng.gen_range(0..1_000_000);
    format!("{:06}", code)
}

/// One-time codes are only stored hashed.
pub fn hash_one_time_code(code: &str) -> String {
    hex::encode(Sha256::digest(code.trim().as_bytes()))
}

/// Compares a submitted code against a stored hash without short-circuiting
/// on the first differing byte.
pub fn one_time_code_matches(stored_hash: &str, candidate: &str) -> bool {
    let candidate_hash = hash_one_time_code(candidate);
    stored_hash
        .as_bytes()
        .ct_eq(candidate_hash.as_bytes())
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let pw = "S3cr3t!pass";
        let hash = hash_password(pw).expect("hash should succeed");
        assert!(verify_password(pw, &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
    }

    #[test]
    fn corrupt_hash_is_an_error() {
        assert!(verify_password("pw", "not-a-phc-string").is_err());
    }

    #[test]
    fn one_time_codes_are_six_digits() {
        for _ in 0..50 {
            let code = generate_one_time_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn code_hash_ignores_surrounding_whitespace() {
        assert_eq!(hash_one_time_code(" 012345 "), hash_one_time_code("012345"));
        assert_ne!(hash_one_time_code("012345"), hash_one_time_code("012346"));
    }

    #[test]
    fn code_match_requires_the_exact_code() {
        let stored = hash_one_time_code("482913");
        assert!(one_time_code_matches(&stored, "482913"));
        assert!(one_time_code_matches(&stored, " 482913\n"));
        assert!(!one_time_code_matches(&stored, "482914"));
        assert!(!one_time_code_matches(&stored, ""));
        assert!(!one_time_code_matches("", "482913"));
    }
}
