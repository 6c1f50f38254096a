//! Kong webhook signatures
//!
//! Header format: `Kong-Signature: t=<unix seconds>,v1=<hex>` where the hex
//! is HMAC-SHA256 over `"{t}.{raw body}"` keyed with the shared secret.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Accepted clock skew either side of now
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("signature header is malformed")]
    Malformed,

    #[error("signature timestamp {timestamp} outside tolerance (now {now})")]
    Expired { timestamp: i64, now: i64 },

    #[error("signature does not match")]
    Mismatch,
}

fn mac_for(secret: &str, timestamp: i64, body: &[u8]) -> Result<HmacSha256, SignatureError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Mismatch)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(mac)
}

/// Hex signature for `body` at `timestamp`
#[cfg(test)]
pub fn sign(secret: &str, timestamp: i64, body: &[u8]) -> String {
    match mac_for(secret, timestamp, body) {
        Ok(mac) => hex::encode(mac.finalize().into_bytes()),
        Err(_) => String::new(),
    }
}

/// Full header value, as Kong would send it
#[cfg(test)]
pub fn signature_header(secret: &str, timestamp: i64, body: &[u8]) -> String {
    format!("t={},v1={}", timestamp, sign(secret, timestamp, body))
}

pub fn verify_signature(header: &str, body: &[u8], secret: &str, now: i64) -> Result<(), SignatureError> {
    let mut timestamp = None;
    let mut candidates = Vec::new();

    for element in header.split(',').map(str::trim) {
        if let Some(t) = element.strip_prefix("t=") {
            timestamp = Some(t.parse::<i64>().map_err(|_| SignatureError::Malformed)?);
        } else if let Some(v) = element.strip_prefix("v1=") {
            candidates.push(v);
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    if candidates.is_empty() {
        return Err(SignatureError::Malformed);
    }
    if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(SignatureError::Expired { timestamp, now });
    }

    for candidate in candidates {
        let Ok(received) = hex::decode(candidate) else {
            continue;
        };
        // verify_slice compares in constant time
        if mac_for(secret, timestamp, body)?.verify_slice(&received).is_ok() {
            return Ok(());
        }
    }

    Err(SignatureError::Mismatch)
}
