//! Time-step one-time passwords (RFC 6238 over RFC 4226 HOTP, HMAC-SHA1).

use crate::{CoreError, CoreResult};
use data_encoding::BASE32_NOPAD;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds per time step.
pub const TIME_STEP_SECS: u64 = 30;

/// Digits in a generated code.
pub const CODE_DIGITS: u32 = 6;

/// Generator with the authenticator-app defaults (30 s step, 6 digits).
#[derive(Debug, Clone, Copy, Default)]
pub struct Rfc6238Generator;

impl Rfc6238Generator {
    /// Code for `secret` at the given wall-clock time.
    pub fn generate_at(&self, secret: &str, at: SystemTime) -> CoreResult<String> {
        let unix_secs = at
            .duration_since(UNIX_EPOCH)
            .map_err(|e| CoreError::OneTimeCode(format!("clock before epoch: {e}")))?
            .as_secs();
        generate_totp(secret, unix_secs)
    }
}

/// Code for a base32 `secret` at `unix_secs`.
///
/// Secrets are accepted the way authenticator apps display them: any case,
/// grouped with spaces, with or without `=` padding.
pub fn generate_totp(secret: &str, unix_secs: u64) -> CoreResult<String> {
    let key = decode_secret(secret)?;
    let counter = unix_secs / TIME_STEP_SECS;
    let code = hotp(&key, counter)?;
    let modulo = 10_u32.pow(CODE_DIGITS);
    Ok(format!(
        "{:0width$}",
        code % modulo,
        width = CODE_DIGITS as usize
    ))
}

fn decode_secret(secret: &str) -> CoreResult<Vec<u8>> {
    let normalized: String = secret
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '=' && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if normalized.is_empty() {
        return Err(CoreError::OneTimeCode("empty secret".to_string()));
    }
    BASE32_NOPAD
        .decode(normalized.as_bytes())
        .map_err(|e| CoreError::OneTimeCode(format!("secret is not base32: {e}")))
}

fn hotp(key: &[u8], counter: u64) -> CoreResult<u32> {
    let mut mac = Hmac::<Sha1>::new_from_slice(key)
        .map_err(|e| CoreError::OneTimeCode(e.to_string()))?;
    mac.update(&counter.to_be_bytes());
    let hash = mac.finalize().into_bytes();

    // Dynamic truncation as per RFC 4226
    let offset = (hash[hash.len() - 1] & 0x0f) as usize;
    let bin_code = ((hash[offset] as u32 & 0x7f) << 24)
        | ((hash[offset + 1] as u32) << 16)
        | ((hash[offset + 2] as u32) << 8)
        | (hash[offset + 3] as u32);

    Ok(bin_code)
}
