//! `x-cursor-checksum` derivation.
//!
//! The checksum is `<mixed timestamp hex><sha1(payload)>/<sha1(credential)>`,
//! where the timestamp comes from the `time` claim of the credential's JWT
//! payload. A configured override replaces the derivation entirely, which is
//! what opaque (non-JWT) session tokens need.

use crate::error::{CursorError, CursorResult};
use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use serde_json::Value;
use sha1::{Digest, Sha1};

const MIX_SEED: u8 = 165;
const TIMESTAMP_LEN: usize = 6;
const TIMESTAMP_LIMIT: u64 = 1 << (TIMESTAMP_LEN * 8);

/// Produces checksum tokens for session credentials.
#[derive(Debug, Clone, Default)]
pub struct ChecksumGenerator {
    override_value: Option<String>,
}

impl ChecksumGenerator {
    /// An empty override is treated as absent.
    pub fn new(override_value: Option<String>) -> Self {
        Self {
            override_value: override_value.filter(|v| !v.is_empty()),
        }
    }

    pub fn has_override(&self) -> bool {
        self.override_value.is_some()
    }

    pub fn compute(&self, credential: &str) -> CursorResult<String> {
        match &self.override_value {
            Some(value) => Ok(value.clone()),
            None => derive(credential),
        }
    }
}

fn derive(credential: &str) -> CursorResult<String> {
    let payload = credential.split('.').nth(1).ok_or_else(|| {
        CursorError::MalformedCredential("expected a '.'-separated token".to_string())
    })?;

    let seconds = issued_at_millis(payload)? / 1000;
    if seconds >= TIMESTAMP_LIMIT {
        return Err(CursorError::MalformedCredential(format!(
            "`time` claim out of range: {}",
            seconds
        )));
    }

    let mut timestamp = [0u8; TIMESTAMP_LEN];
    timestamp.copy_from_slice(&seconds.to_be_bytes()[8 - TIMESTAMP_LEN..]);
    mix_timestamp(&mut timestamp);

    // SHA-1 over bytes cannot fail, so there is no degraded hash value here.
    Ok(format!(
        "{}{}/{}",
        hex::encode(timestamp),
        sha1_hex(payload),
        sha1_hex(credential)
    ))
}

/// Chain each byte through the previous output byte, left to right.
pub fn mix_timestamp(bytes: &mut [u8; TIMESTAMP_LEN]) {
    let mut t = MIX_SEED;
    for (i, b) in bytes.iter_mut().enumerate() {
        *b = (*b ^ t).wrapping_add(i as u8);
        t = *b;
    }
}

fn sha1_hex(input: &str) -> String {
    hex::encode(Sha1::digest(input.as_bytes()))
}

fn issued_at_millis(payload: &str) -> CursorResult<u64> {
    let trimmed = payload.trim_end_matches('=');
    let raw = URL_SAFE_NO_PAD
        .decode(trimmed)
        .or_else(|_| STANDARD_NO_PAD.decode(trimmed))
        .map_err(|e| CursorError::MalformedCredential(format!("payload is not base64: {}", e)))?;

    let claims: Value = serde_json::from_slice(&raw)
        .map_err(|e| CursorError::MalformedCredential(format!("payload is not JSON: {}", e)))?;

    let millis = match claims.get("time") {
        Some(Value::String(s)) => parse_leading_integer(s),
        Some(Value::Number(n)) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0)
                .map(|f| f as u64)
        }),
        _ => None,
    };

    millis.ok_or_else(|| {
        CursorError::MalformedCredential("missing or non-numeric `time` claim".to_string())
    })
}

/// Leading decimal digits of `s`, ignoring leading whitespace and a `+`.
fn parse_leading_integer(s: &str) -> Option<u64> {
    let s = s.trim_start();
    let s = s.strip_prefix('+').unwrap_or(s);
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    s[..end].parse().ok()
}
