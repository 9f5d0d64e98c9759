use std::sync::OnceLock;

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand::rngs::OsRng;
use regex::Regex;
use tracing::instrument;

pub const MIN_PASSWORD_LENGTH: usize = 8;

pub struct PasswordService;

impl PasswordService {
    #[instrument(skip(password))]
    pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
        Ok(password_hash.to_string())
    }

    /// `Ok(false)` for a wrong password; `Err` only when the stored hash is unreadable.
    #[instrument(skip(password, hash))]
    pub fn verify_password(password: &str, hash: &str) -> Result<bool, argon2::password_hash::Error> {
        let parsed_hash = PasswordHash::new(hash)?;

        match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(password))]
    pub fn validate_password_strength(password: &str) -> Result<(), String> {
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(format!("Password must be at least {} characters long", MIN_PASSWORD_LENGTH));
        }
        if !password.chars().any(|c| c.is_alphabetic()) {
            return Err("Password must contain at least one letter".to_string());
        }
        if !password.chars().any(|c| c.is_ascii_digit()) {
            return Err("Password must contain at least one digit".to_string());
        }
        Ok(())
    }

    /// Lower-cases and trims, then checks the basic `local@domain.tld` shape.
    pub fn normalize_email(email: &str) -> Result<String, String> {
        static EMAIL_RE: OnceLock<Option<Regex>> = OnceLock::new();
        let re = EMAIL_RE.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok());

        let email = email.trim().to_lowercase();
        if re.as_ref().is_some_and(|re| re.is_match(&email)) {
            Ok(email)
        } else {
            Err("Invalid email address".to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hash = PasswordService::hash_password("s3cretpass").unwrap();
        assert!(PasswordService::verify_password("s3cretpass", &hash).unwrap());
        assert!(!PasswordService::verify_password("wrongpass1", &hash).unwrap());
    }

    #[test]
    fn garbage_hash_is_an_error() {
        assert!(PasswordService::verify_password("s3cretpass", "not-a-phc-string").is_err());
    }

    #[test]
    fn strength_rules() {
        assert!(PasswordService::validate_password_strength("short1").is_err());
        assert!(PasswordService::validate_password_strength("onlyletters").is_err());
        assert!(PasswordService::validate_password_strength("12345678").is_err());
        assert!(PasswordService::validate_password_strength("letters123").is_ok());
    }

    #[test]
    fn email_normalization() {
        assert_eq!(PasswordService::normalize_email("  Jane@Example.COM ").unwrap(), "jane@example.com");
        assert!(PasswordService::normalize_email("no-at-sign").is_err());
        assert!(PasswordService::normalize_email("a@b").is_err());
    }
}
