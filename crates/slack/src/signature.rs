//! Slack request signing.
//!
//! Slack signs every webhook with `v0=hex(HMAC-SHA256(secret, "v0:{ts}:{body}"))`
//! and sends the timestamp alongside. Requests older (or newer) than the
//! tolerance window are rejected to limit replay.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";
pub const SIGNATURE_HEADER: &str = "x-slack-signature";
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

const VERSION: &str = "v0";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing {0} header")]
    MissingHeader(&'static str),
    #[error("timestamp `{0}` is not a unix time")]
    MalformedTimestamp(String),
    #[error("request timestamp is {age_secs}s away from now")]
    Stale { age_secs: i64 },
    #[error("signature mismatch")]
    Mismatch,
    #[error("signing secret rejected by hmac")]
    InvalidKey,
}

#[derive(Clone, Debug)]
pub struct SignatureVerifier {
    secret: SecretString,
    tolerance_secs: i64,
}

impl SignatureVerifier {
    pub fn new(secret: SecretString) -> Self {
        Self { secret, tolerance_secs: DEFAULT_TOLERANCE_SECS }
    }

    pub fn with_tolerance_secs(mut self, tolerance_secs: i64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }

    /// Checks the headers of one request against its raw body at `now`
    /// (unix seconds).
    pub fn verify(
        &self,
        timestamp: Option<&str>,
        signature: Option<&str>,
        body: &[u8],
        now: i64,
    ) -> Result<(), SignatureError> {
        let timestamp = timestamp.ok_or(SignatureError::MissingHeader(TIMESTAMP_HEADER))?.trim();
        let signature = signature.ok_or(SignatureError::MissingHeader(SIGNATURE_HEADER))?.trim();

        let sent_at: i64 = timestamp
            .parse()
            .map_err(|_| SignatureError::MalformedTimestamp(timestamp.to_string()))?;
        let age_secs = now.saturating_sub(sent_at);
        if age_secs.saturating_abs() > self.tolerance_secs {
            return Err(SignatureError::Stale { age_secs });
        }

        let expected = self.sign(timestamp, body)?;
        if expected.as_bytes().ct_eq(signature.as_bytes()).into() {
            Ok(())
        } else {
            Err(SignatureError::Mismatch)
        }
    }

    /// Computes the `v0=<hex>` header value for a body.
    pub fn sign(&self, timestamp: &str, body: &[u8]) -> Result<String, SignatureError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|_| SignatureError::InvalidKey)?;
        mac.update(VERSION.as_bytes());
        mac.update(b":");
        mac.update(timestamp.as_bytes());
        mac.update(b":");
        mac.update(body);
        Ok(format!("{VERSION}={}", hex::encode(mac.finalize().into_bytes())))
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::{SignatureError, SignatureVerifier};

    const NOW: i64 = 1_714_557_600;
    const BODY: &[u8] = br#"{"type":"event_callback"}"#;

    fn verifier() -> SignatureVerifier {
        SignatureVerifier::new(SecretString::from("8f742231b10e8888abcd99yyyzzz85a5".to_string()))
    }

    fn signed(timestamp: &str) -> String {
        verifier().sign(timestamp, BODY).unwrap_or_default()
    }

    #[test]
    fn accepts_fresh_correctly_signed_requests() {
        let ts = NOW.to_string();
        assert_eq!(verifier().verify(Some(&ts), Some(&signed(&ts)), BODY, NOW + 10), Ok(()));
    }

    #[test]
    fn known_vector_matches_slack_documentation_shape() {
        let signature = signed("1531420618");
        assert!(signature.starts_with("v0="));
        assert_eq!(signature.len(), 3 + 64);
    }

    #[test]
    fn rejects_requests_outside_the_window_in_either_direction() {
        let ts = NOW.to_string();
        let signature = signed(&ts);

        assert_eq!(
            verifier().verify(Some(&ts), Some(&signature), BODY, NOW + 301),
            Err(SignatureError::Stale { age_secs: 301 })
        );
        assert_eq!(
            verifier().verify(Some(&ts), Some(&signature), BODY, NOW - 301),
            Err(SignatureError::Stale { age_secs: -301 })
        );
        assert_eq!(verifier().verify(Some(&ts), Some(&signature), BODY, NOW + 300), Ok(()));
    }

    #[test]
    fn rejects_tampered_bodies_and_foreign_secrets() {
        let ts = NOW.to_string();
        let signature = signed(&ts);

        assert_eq!(
            verifier().verify(Some(&ts), Some(&signature), b"{}", NOW),
            Err(SignatureError::Mismatch)
        );

        let other = SignatureVerifier::new(SecretString::from("another-secret".to_string()));
        assert_eq!(other.verify(Some(&ts), Some(&signature), BODY, NOW), Err(SignatureError::Mismatch));
    }

    #[test]
    fn missing_or_malformed_headers_are_rejected() {
        let ts = NOW.to_string();
        assert!(matches!(
            verifier().verify(None, Some("v0=00"), BODY, NOW),
            Err(SignatureError::MissingHeader(_))
        ));
        assert!(matches!(
            verifier().verify(Some(&ts), None, BODY, NOW),
            Err(SignatureError::MissingHeader(_))
        ));
        assert_eq!(
            verifier().verify(Some("yesterday"), Some("v0=00"), BODY, NOW),
            Err(SignatureError::MalformedTimestamp("yesterday".to_string()))
        );
    }
}
