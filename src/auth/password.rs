/// Password Hashing and Verification
///
/// Stored credentials have the form `salt.hash`, both parts standard base64.
/// The digest is derived with Argon2id over the password and a 16-byte salt
/// drawn from the OS random source, so the stored string carries everything
/// needed to verify it.

use argon2::Argon2;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use lazy_static::lazy_static;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::CryptoError;

const SALT_LENGTH: usize = 16;
const DIGEST_LENGTH: usize = 32;
// Not part of the standard base64 alphabet
const SEPARATOR: char = '.';

lazy_static! {
    /// Well-formed credential that no real password derives to. Verified
    /// against when a lookup misses, so that path pays the full KDF cost.
    pub(crate) static ref DUMMY_CREDENTIAL: String = format!(
        "{}{}{}",
        STANDARD.encode([0u8; SALT_LENGTH]),
        SEPARATOR,
        STANDARD.encode([0u8; DIGEST_LENGTH])
    );
}

/// One-way credential derivation
pub trait Cryptography: Send + Sync {
    /// Hash a plaintext password into a storable credential string
    fn hash_password(&self, password: &str) -> Result<String, CryptoError>;

    /// Check a plaintext password against a stored credential string
    ///
    /// # Errors
    /// `MalformedCredential` if `stored` is not a credential this type produced
    fn verify_password(&self, password: &str, stored: &str) -> Result<bool, CryptoError>;
}

/// Argon2id-backed [`Cryptography`]
#[derive(Debug, Clone, Copy, Default)]
pub struct PasswordCryptography;

impl PasswordCryptography {
    pub fn new() -> Self {
        Self
    }
}

impl Cryptography for PasswordCryptography {
    fn hash_password(&self, password: &str) -> Result<String, CryptoError> {
        let mut salt = [0u8; SALT_LENGTH];
        OsRng.try_fill_bytes(&mut salt).map_err(|e| {
            tracing::error!(error = %e, "Failed to generate salt");
            CryptoError::SaltGenerationFailed
        })?;

        let digest = derive_digest(password, &salt)?;

        Ok(format!(
            "{}{}{}",
            STANDARD.encode(salt),
            SEPARATOR,
            STANDARD.encode(digest)
        ))
    }

    fn verify_password(&self, password: &str, stored: &str) -> Result<bool, CryptoError> {
        let (salt, digest) = stored
            .split_once(SEPARATOR)
            .ok_or(CryptoError::MalformedCredential)?;

        let salt = STANDARD
            .decode(salt)
            .map_err(|_| CryptoError::MalformedCredential)?;
        let expected = STANDARD
            .decode(digest)
            .map_err(|_| CryptoError::MalformedCredential)?;

        if salt.len() != SALT_LENGTH || expected.len() != DIGEST_LENGTH {
            return Err(CryptoError::MalformedCredential);
        }

        let computed = derive_digest(password, &salt)?;
        Ok(constant_time_eq(&computed, &expected))
    }
}

fn derive_digest(password: &str, salt: &[u8]) -> Result<[u8; DIGEST_LENGTH], CryptoError> {
    let mut digest = [0u8; DIGEST_LENGTH];
    Argon2::default()
        .hash_password_into(password.as_bytes(), salt, &mut digest)
        .map_err(|e| {
            tracing::error!(error = %e, "Argon2 derivation failed");
            CryptoError::HashingFailed(e.to_string())
        })?;
    Ok(digest)
}

/// Constant-time comparison to prevent timing attacks
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> PasswordCryptography {
        PasswordCryptography::new()
    }

    #[test]
    fn test_dummy_credential_is_well_formed() {
        assert_eq!(hasher().verify_password("SecurePass123", &DUMMY_CREDENTIAL), Ok(false));
        assert_eq!(hasher().verify_password("", &DUMMY_CREDENTIAL), Ok(false));
    }

    #[test]
    fn test_hash_then_verify() {
        let stored = hasher().hash_password("ValidPassword123").expect("Failed to hash password");

        assert!(hasher().verify_password("ValidPassword123", &stored).unwrap());
    }

    #[test]
    fn test_verify_wrong_password() {
        let stored = hasher().hash_password("ValidPassword123").expect("Failed to hash password");

        assert!(!hasher().verify_password("ValidPassword124", &stored).unwrap());
        assert!(!hasher().verify_password("", &stored).unwrap());
    }

    #[test]
    fn test_stored_format() {
        let stored = hasher().hash_password("ValidPassword123").unwrap();

        assert_ne!(stored, "ValidPassword123");
        assert_eq!(stored.matches(SEPARATOR).count(), 1);

        let (salt, digest) = stored.split_once(SEPARATOR).unwrap();
        assert_eq!(STANDARD.decode(salt).unwrap().len(), SALT_LENGTH);
        assert_eq!(STANDARD.decode(digest).unwrap().len(), DIGEST_LENGTH);
    }

    #[test]
    fn test_salts_differ_per_hash() {
        let first = hasher().hash_password("same password").unwrap();
        let second = hasher().hash_password("same password").unwrap();

        assert_ne!(first, second);
        assert!(hasher().verify_password("same password", &first).unwrap());
        assert!(hasher().verify_password("same password", &second).unwrap());
    }

    #[test]
    fn test_unicode_password() {
        let stored = hasher().hash_password("pässwörd-日本語").unwrap();

        assert!(hasher().verify_password("pässwörd-日本語", &stored).unwrap());
        assert!(!hasher().verify_password("passwort-日本語", &stored).unwrap());
    }

    #[test]
    fn test_malformed_credentials() {
        let stored = hasher().hash_password("ValidPassword123").unwrap();
        let (salt, digest) = stored.split_once(SEPARATOR).unwrap();

        let malformed = [
            String::new(),
            "no-separator-here".to_string(),
            format!("{}{}", salt, digest),
            format!("!!!.{}", digest),
            format!("{}.not base64", salt),
            format!("{}.{}.extra", salt, digest),
            format!("{}.{}", STANDARD.encode([0u8; 4]), digest),
            format!("{}.{}", salt, STANDARD.encode([0u8; 8])),
        ];

        for candidate in malformed {
            assert_eq!(
                hasher().verify_password("ValidPassword123", &candidate),
                Err(CryptoError::MalformedCredential),
                "expected malformed: {:?}",
                candidate
            );
        }
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(constant_time_eq(b"", b""));
    }
}
