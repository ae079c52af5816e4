use chrono::{DateTime, Duration, Utc};
use rand::{Rng, distributions::Alphanumeric};

use crate::models::ConfirmationCode;

pub const CODE_LEN: usize = 12;

/// Generates a fresh alphanumeric confirmation code.
pub fn generate_code() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(CODE_LEN)
        .map(char::from)
        .collect()
}

/// matches
///
/// True when `submitted` equals the stored code and the code has not outlived `ttl_secs`.
/// Constant-time over equal-length inputs.
pub fn matches(stored: &ConfirmationCode, submitted: &str, now: DateTime<Utc>, ttl_secs: i64) -> bool {
    if now - stored.created_at > Duration::seconds(ttl_secs) {
        return false;
    }
    let (a, b) = (stored.code.as_bytes(), submitted.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
