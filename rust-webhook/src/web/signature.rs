//! Inbound email webhook signature verification.
//!
//! The email provider signs every delivery with HMAC-SHA256 over
//! `timestamp + token` using the shared webhook signing key, and sends the
//! hex digest in the `signature` field.

use std::time::{SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Why a delivery failed verification.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SignatureError {
    /// Digest mismatch, missing fields, missing key or unparsable timestamp.
    #[error("invalid signature")]
    InvalidSignature,
    /// Timestamp outside the tolerance window.
    #[error("stale timestamp")]
    StaleTimestamp,
}

/// Current wall-clock time in unix seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Verify a webhook signature against the current wall clock.
///
/// # Arguments
///
/// * `signing_key` - The webhook signing key shared with the provider
/// * `timestamp` - The 'timestamp' field from the webhook payload
/// * `token` - The 'token' field from the webhook payload
/// * `signature` - The 'signature' field from the webhook payload
/// * `tolerance_seconds` - Maximum distance between the timestamp and now
pub fn verify_signature(
    signing_key: &str,
    timestamp: &str,
    token: &str,
    signature: &str,
    tolerance_seconds: u64,
) -> Result<(), SignatureError> {
    verify_signature_at(
        signing_key,
        timestamp,
        token,
        signature,
        tolerance_seconds,
        unix_now(),
    )
}

/// Verify a webhook signature against an explicit clock reading.
pub fn verify_signature_at(
    signing_key: &str,
    timestamp: &str,
    token: &str,
    signature: &str,
    tolerance_seconds: u64,
    now: u64,
) -> Result<(), SignatureError> {
    if signing_key.is_empty() || timestamp.is_empty() || token.is_empty() || signature.is_empty() {
        warn!(
            has_signing_key = !signing_key.is_empty(),
            has_timestamp = !timestamp.is_empty(),
            has_token = !token.is_empty(),
            has_signature = !signature.is_empty(),
            "webhook_signature_missing_fields"
        );
        return Err(SignatureError::InvalidSignature);
    }

    let webhook_time: u64 = match timestamp.trim().parse() {
        Ok(t) => t,
        Err(_) => {
            warn!(timestamp = %timestamp, "webhook_signature_invalid_timestamp");
            return Err(SignatureError::InvalidSignature);
        }
    };

    let age = now.abs_diff(webhook_time);
    if age > tolerance_seconds {
        warn!(
            webhook_time = webhook_time,
            current_time = now,
            age_seconds = age,
            tolerance_seconds = tolerance_seconds,
            "webhook_signature_stale"
        );
        return Err(SignatureError::StaleTimestamp);
    }

    let provided = match hex::decode(signature.trim()) {
        Ok(bytes) => bytes,
        Err(_) => {
            warn!(signature_length = signature.len(), "webhook_signature_not_hex");
            return Err(SignatureError::InvalidSignature);
        }
    };

    let mut mac = keyed_mac(signing_key).ok_or(SignatureError::InvalidSignature)?;
    mac.update(timestamp.as_bytes());
    mac.update(token.as_bytes());

    // verify_slice compares in constant time
    mac.verify_slice(&provided).map_err(|_| {
        warn!(actual_length = provided.len(), "webhook_signature_mismatch");
        SignatureError::InvalidSignature
    })
}

fn keyed_mac(signing_key: &str) -> Option<HmacSha256> {
    match HmacSha256::new_from_slice(signing_key.as_bytes()) {
        Ok(mac) => Some(mac),
        Err(_) => {
            warn!(key_length = signing_key.len(), "webhook_signature_invalid_key");
            None
        }
    }
}

/// Compute the hex signature the provider would send for `timestamp + token`.
///
/// Returns `None` when the key cannot seed the MAC.
pub fn sign(signing_key: &str, timestamp: &str, token: &str) -> Option<String> {
    let mut mac = keyed_mac(signing_key)?;
    mac.update(timestamp.as_bytes());
    mac.update(token.as_bytes());
    Some(hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "test-signing-key";
    const NOW: u64 = 1_760_000_000;

    #[test]
    fn test_verify_signature_missing_fields() {
        let err = Err(SignatureError::InvalidSignature);
        assert_eq!(verify_signature_at("", "123", "token", "sig", 300, NOW), err);
        assert_eq!(verify_signature_at("key", "", "token", "sig", 300, NOW), err);
        assert_eq!(verify_signature_at("key", "123", "", "sig", 300, NOW), err);
        assert_eq!(verify_signature_at("key", "123", "token", "", 300, NOW), err);
    }

    #[test]
    fn test_verify_signature_invalid_timestamp() {
        assert_eq!(
            verify_signature_at(KEY, "not-a-number", "token", "abcd", 300, NOW),
            Err(SignatureError::InvalidSignature)
        );
        assert_eq!(
            verify_signature_at(KEY, "-5", "token", "abcd", 300, NOW),
            Err(SignatureError::InvalidSignature)
        );
    }

    #[test]
    fn test_verify_signature_valid() {
        let timestamp = NOW.to_string();
        let signature = sign(KEY, &timestamp, "random-token").unwrap();

        assert_eq!(
            verify_signature_at(KEY, &timestamp, "random-token", &signature, 300, NOW),
            Ok(())
        );
    }

    #[test]
    fn test_verify_signature_uses_wall_clock() {
        let timestamp = unix_now().to_string();
        let signature = sign(KEY, &timestamp, "random-token").unwrap();

        assert!(verify_signature(KEY, &timestamp, "random-token", &signature, 300).is_ok());
    }

    #[test]
    fn test_verify_signature_accepts_uppercase_hex() {
        let timestamp = NOW.to_string();
        let signature = sign(KEY, &timestamp, "tok").unwrap().to_uppercase();

        assert!(verify_signature_at(KEY, &timestamp, "tok", &signature, 300, NOW).is_ok());
    }

    #[test]
    fn test_verify_signature_every_bit_flip_rejected() {
        let timestamp = NOW.to_string();
        let signature = sign(KEY, &timestamp, "tok").unwrap();
        let bytes = hex::decode(&signature).unwrap();

        for index in 0..bytes.len() {
            for bit in 0..8 {
                let mut tampered = bytes.clone();
                tampered[index] ^= 1 << bit;
                assert_eq!(
                    verify_signature_at(KEY, &timestamp, "tok", &hex::encode(&tampered), 300, NOW),
                    Err(SignatureError::InvalidSignature),
                    "flip of byte {index} bit {bit} was accepted"
                );
            }
        }
    }

    #[test]
    fn test_verify_signature_wrong_key_or_token() {
        let timestamp = NOW.to_string();
        let signature = sign(KEY, &timestamp, "tok").unwrap();

        assert!(verify_signature_at("other-key", &timestamp, "tok", &signature, 300, NOW).is_err());
        assert!(verify_signature_at(KEY, &timestamp, "tok2", &signature, 300, NOW).is_err());
        assert!(verify_signature_at(KEY, &timestamp, "tok", "zz-not-hex", 300, NOW).is_err());
    }

    #[test]
    fn test_verify_signature_stale_even_when_signed() {
        for skew in [301i64, -301, 86_400, -86_400] {
            let timestamp = (NOW as i64 + skew).to_string();
            let signature = sign(KEY, &timestamp, "tok").unwrap();

            assert_eq!(
                verify_signature_at(KEY, &timestamp, "tok", &signature, 300, NOW),
                Err(SignatureError::StaleTimestamp)
            );
        }
    }

    #[test]
    fn test_verify_signature_tolerance_boundary() {
        let timestamp = (NOW - 300).to_string();
        let signature = sign(KEY, &timestamp, "tok").unwrap();

        assert!(verify_signature_at(KEY, &timestamp, "tok", &signature, 300, NOW).is_ok());
    }

    #[test]
    fn test_sign_matches_direct_hmac() {
        let mut mac = HmacSha256::new_from_slice(KEY.as_bytes()).unwrap();
        mac.update(b"1700000000abc");
        let expected = hex::encode(mac.finalize().into_bytes());

        assert_eq!(sign(KEY, "1700000000", "abc").unwrap(), expected);
        assert_eq!(expected.len(), 64);
    }

    #[test]
    fn test_sign_accepts_any_key_length() {
        let long_key = "k".repeat(512);

        assert_eq!(sign("", "1700000000", "abc").map(|s| s.len()), Some(64));
        assert!(sign(&long_key, "1700000000", "abc").is_some());
        assert_ne!(sign(&long_key, "1700000000", "abc"), sign(KEY, "1700000000", "abc"));
    }
}
