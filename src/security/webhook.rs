//! Webhook HMAC-SHA256 signature verification.
//!
//! Header format: `t=<unix-seconds>,v1=<hex-hmac>[,v1=...][,v0=...]`.
//! Signed content: `"{t}.{payload}"`, or the bare payload when no timestamp
//! is sent. Every failure is a [`SignatureError`] value; nothing on this
//! path panics on caller input.

use constant_time_eq::constant_time_eq;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Maximum allowed clock skew for the signed timestamp (5 minutes).
pub const DEFAULT_TOLERANCE_MS: u64 = 5 * 60 * 1000;

/// Reason a signature was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("payload is empty")]
    EmptyPayload,
    #[error("signature header is empty")]
    EmptyHeader,
    #[error("webhook secret is not configured")]
    MissingSecret,
    #[error("signature header has no v1 entry")]
    MissingSignature,
    #[error("timestamp is not a unix time in seconds")]
    MalformedTimestamp,
    #[error("timestamp outside tolerance window")]
    TimestampOutOfTolerance,
    #[error("signature mismatch")]
    Mismatch,
}

impl SignatureError {
    /// Short label for metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureError::EmptyPayload => "empty_payload",
            SignatureError::EmptyHeader => "empty_header",
            SignatureError::MissingSecret => "missing_secret",
            SignatureError::MissingSignature => "missing_v1",
            SignatureError::MalformedTimestamp => "bad_timestamp",
            SignatureError::TimestampOutOfTolerance => "stale",
            SignatureError::Mismatch => "mismatch",
        }
    }
}

/// Parsed `key=value` pairs of a signature header.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SignatureHeader<'a> {
    pub timestamp: Option<&'a str>,
    pub signatures: Vec<&'a str>,
}

impl<'a> SignatureHeader<'a> {
    /// Parse a header. Pairs without `=` and unknown keys are ignored.
    pub fn parse(header: &'a str) -> Self {
        let mut parsed = SignatureHeader::default();
        for pair in header.split(',') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            match key.trim() {
                "t" => parsed.timestamp = Some(value.trim()),
                "v1" => parsed.signatures.push(value.trim()),
                _ => {}
            }
        }
        parsed
    }
}

/// Verifies signed callback payloads against one or more shared secrets.
#[derive(Clone)]
pub struct WebhookSignatureVerifier {
    tolerance_ms: u64,
}

impl Default for WebhookSignatureVerifier {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE_MS)
    }
}

impl WebhookSignatureVerifier {
    pub fn new(tolerance_ms: u64) -> Self {
        Self { tolerance_ms }
    }

    /// True when `signature_header` is a valid signature of `payload` under `secret`.
    pub fn verify(&self, payload: &[u8], signature_header: &str, secret: &str, now: u64) -> bool {
        self.check(payload, signature_header, &[secret], now).is_ok()
    }

    /// Verify against any of `secrets` (current first, then rotation leftovers).
    pub fn check(
        &self,
        payload: &[u8],
        signature_header: &str,
        secrets: &[&str],
        now: u64,
    ) -> Result<(), SignatureError> {
        if payload.is_empty() {
            return Err(SignatureError::EmptyPayload);
        }
        if signature_header.trim().is_empty() {
            return Err(SignatureError::EmptyHeader);
        }
        let secrets: Vec<&str> = secrets.iter().copied().filter(|s| !s.is_empty()).collect();
        if secrets.is_empty() {
            return Err(SignatureError::MissingSecret);
        }

        let header = SignatureHeader::parse(signature_header);
        if header.signatures.is_empty() {
            return Err(SignatureError::MissingSignature);
        }

        if let Some(t) = header.timestamp {
            let seconds: u64 = t.parse().map_err(|_| SignatureError::MalformedTimestamp)?;
            let signed_at = seconds
                .checked_mul(1000)
                .ok_or(SignatureError::MalformedTimestamp)?;
            if now.abs_diff(signed_at) > self.tolerance_ms {
                return Err(SignatureError::TimestampOutOfTolerance);
            }
        }

        for secret in secrets {
            let Some(expected) = compute_signature(secret, header.timestamp, payload).map(hex::encode) else {
                continue;
            };
            let matched = header.signatures.iter().any(|sig| {
                sig.len() == expected.len() && constant_time_eq(sig.as_bytes(), expected.as_bytes())
            });
            if matched {
                return Ok(());
            }
        }

        Err(SignatureError::Mismatch)
    }
}

fn compute_signature(secret: &str, timestamp: Option<&str>, payload: &[u8]) -> Option<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    if let Some(t) = timestamp {
        mac.update(t.as_bytes());
        mac.update(b".");
    }
    mac.update(payload);
    Some(mac.finalize().into_bytes().to_vec())
}

/// Produce a `t=...,v1=...` header for `payload`; used by senders and tests.
pub fn sign_payload(payload: &[u8], secret: &str, timestamp_secs: u64) -> String {
    let t = timestamp_secs.to_string();
    let signature = compute_signature(secret, Some(&t), payload)
        .map(hex::encode)
        .unwrap_or_default();
    format!("t={},v1={}", t, signature)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const PAYLOAD: &[u8] = br#"{"id":1}"#;
    const T: u64 = 1_700_000_000;

    fn expected_hex() -> String {
        let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(b"1700000000.{\"id\":1}");
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_accepts_valid_signature_within_window() {
        let verifier = WebhookSignatureVerifier::default();
        let header = format!("t={},v1={}", T, expected_hex());
        assert_eq!(header, sign_payload(PAYLOAD, SECRET, T));

        assert!(verifier.verify(PAYLOAD, &header, SECRET, T * 1000));
        assert!(verifier.verify(PAYLOAD, &header, SECRET, T * 1000 + DEFAULT_TOLERANCE_MS));
        assert!(verifier.verify(PAYLOAD, &header, SECRET, T * 1000 - DEFAULT_TOLERANCE_MS));
    }

    #[test]
    fn test_rejects_outside_replay_window() {
        let verifier = WebhookSignatureVerifier::default();
        let header = sign_payload(PAYLOAD, SECRET, T);

        assert_eq!(
            verifier.check(PAYLOAD, &header, &[SECRET], T * 1000 + DEFAULT_TOLERANCE_MS + 1),
            Err(SignatureError::TimestampOutOfTolerance)
        );
        assert!(!verifier.verify(PAYLOAD, &header, SECRET, T * 1000 - DEFAULT_TOLERANCE_MS - 1));
    }

    #[test]
    fn test_rejects_any_single_character_change() {
        let verifier = WebhookSignatureVerifier::default();
        let now = T * 1000;
        let header = sign_payload(PAYLOAD, SECRET, T);

        let tampered_payload = br#"{"id":2}"#;
        assert_eq!(
            verifier.check(tampered_payload, &header, &[SECRET], now),
            Err(SignatureError::Mismatch)
        );

        let sig = expected_hex();
        let flipped_last = if sig.ends_with('0') { '1' } else { '0' };
        let tampered_sig = format!("t={},v1={}{}", T, &sig[..sig.len() - 1], flipped_last);
        assert!(!verifier.verify(PAYLOAD, &tampered_sig, SECRET, now));

        assert!(!verifier.verify(PAYLOAD, &header, "whsec_tesT", now));
    }

    #[test]
    fn test_malformed_input_never_panics() {
        let verifier = WebhookSignatureVerifier::default();
        let now = T * 1000;
        let cases: [(&[u8], &str, &str, SignatureError); 8] = [
            (PAYLOAD, "", SECRET, SignatureError::EmptyHeader),
            (b"", "t=1,v1=ab", SECRET, SignatureError::EmptyPayload),
            (PAYLOAD, "t=1700000000", SECRET, SignatureError::MissingSignature),
            (PAYLOAD, "garbage", SECRET, SignatureError::MissingSignature),
            (PAYLOAD, "t=1700000000,v1=zz-not-hex", SECRET, SignatureError::Mismatch),
            (PAYLOAD, "t=soon,v1=abcd", SECRET, SignatureError::MalformedTimestamp),
            (PAYLOAD, "t=99999999999999999999,v1=abcd", SECRET, SignatureError::MalformedTimestamp),
            (PAYLOAD, "t=1700000000,v1=abcd", "", SignatureError::MissingSecret),
        ];

        for (payload, header, secret, expected) in cases {
            assert_eq!(verifier.check(payload, header, &[secret], now), Err(expected.clone()));
            assert!(!verifier.verify(payload, header, secret, now));
        }
    }

    #[test]
    fn test_signature_compared_as_lowercase_hex() {
        let verifier = WebhookSignatureVerifier::default();
        let header = format!("t={},v1={}", T, expected_hex().to_uppercase());
        assert_eq!(
            verifier.check(PAYLOAD, &header, &[SECRET], T * 1000),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_length_mismatch_is_failure() {
        let verifier = WebhookSignatureVerifier::default();
        let short = format!("t={},v1={}", T, &expected_hex()[..32]);
        assert_eq!(
            verifier.check(PAYLOAD, &short, &[SECRET], T * 1000),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_without_timestamp_signs_bare_payload() {
        let verifier = WebhookSignatureVerifier::default();
        let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(PAYLOAD);
        let header = format!("v1={}", hex::encode(mac.finalize().into_bytes()));

        // no timestamp, so no replay window applies
        assert!(verifier.verify(PAYLOAD, &header, SECRET, 0));
    }

    #[test]
    fn test_extra_entries_and_rotation() {
        let verifier = WebhookSignatureVerifier::default();
        let now = T * 1000;
        let signed = sign_payload(PAYLOAD, "whsec_old", T);
        let v1 = signed.split_once(",v1=").unwrap().1;
        let header = format!("t={}, v1=deadbeef, v1={}, v0=legacy", T, v1);

        assert_eq!(
            verifier.check(PAYLOAD, &header, &[SECRET], now),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(verifier.check(PAYLOAD, &header, &[SECRET, "whsec_old"], now), Ok(()));
    }

    #[test]
    fn test_parse_header() {
        let parsed = SignatureHeader::parse("t=12,v1=aa,v0=bb,v1=cc,novalue");
        assert_eq!(parsed.timestamp, Some("12"));
        assert_eq!(parsed.signatures, vec!["aa", "cc"]);
    }
}
