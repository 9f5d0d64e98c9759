use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const ISSUER: &str = "Clinic Scheduler";
pub const DIGITS: u32 = 6;
pub const PERIOD_SECONDS: i64 = 30;
/// Accepted clock drift, in periods, on either side of the current one.
const DRIFT_STEPS: i64 = 1;
const SECRET_BYTES: usize = 20;
const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Unpadded RFC 4648 base32.
pub fn base32_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity((bytes.len() * 8).div_ceil(5));
    let mut buffer: u32 = 0;
    let mut bits = 0;

    for &byte in bytes {
        buffer = (buffer << 8) | u32::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(BASE32_ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(BASE32_ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }
    out
}

/// Case-insensitive; padding and whitespace are ignored.
pub fn base32_decode(input: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits = 0;

    for c in input.chars().filter(|c| *c != '=' && !c.is_whitespace()) {
        let upper = c.to_ascii_uppercase() as u32;
        let value = BASE32_ALPHABET.iter().position(|&a| u32::from(a) == upper)? as u32;
        buffer = (buffer << 5) | value;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push((buffer >> bits) as u8);
        }
    }
    Some(out)
}

/// Fresh base32 secret for an authenticator app.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng.fill_bytes(&mut bytes);
    base32_encode(&bytes)
}

pub fn provisioning_uri(secret: &str, account: &str) -> String {
    let issuer = urlencoding::encode(ISSUER);
    format!(
        "otpauth://totp/{}:{}?secret={}&issuer={}&algorithm=SHA256&digits={}&period={}",
        issuer,
        urlencoding::encode(account),
        secret,
        issuer,
        DIGITS,
        PERIOD_SECONDS
    )
}

fn hotp(key: &[u8], counter: u64, digits: u32) -> Result<String, String> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| "Failed to create HMAC".to_string())?;
    mac.update(&counter.to_be_bytes());
    let hash = mac.finalize().into_bytes();

    let offset = usize::from(hash[hash.len() - 1] & 0x0f);
    let binary = u32::from_be_bytes([
        hash[offset] & 0x7f,
        hash[offset + 1],
        hash[offset + 2],
        hash[offset + 3],
    ]);
    let code = binary % 10u32.pow(digits);
    Ok(format!("{:0width$}", code, width = digits as usize))
}

fn counter_at(at: DateTime<Utc>) -> i64 {
    at.timestamp().max(0) / PERIOD_SECONDS
}

/// Code an authenticator shows for `secret` at `at`.
pub fn code_at(secret: &str, at: DateTime<Utc>) -> Result<String, String> {
    let key = base32_decode(secret).ok_or_else(|| "Secret is not valid base32".to_string())?;
    hotp(&key, counter_at(at) as u64, DIGITS)
}

/// Accepts codes from the current period and its immediate neighbours.
pub fn verify_code(secret: &str, code: &str, at: DateTime<Utc>) -> bool {
    let code = code.trim();
    if code.len() != DIGITS as usize || !code.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let Some(key) = base32_decode(secret).filter(|key| !key.is_empty()) else {
        return false;
    };

    let counter = counter_at(at);
    (counter - DRIFT_STEPS..=counter + DRIFT_STEPS)
        .filter(|step| *step >= 0)
        .any(|step| hotp(&key, step as u64, DIGITS).is_ok_and(|expected| expected == code))
}
