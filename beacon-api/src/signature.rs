//! Webhook payload signature verification.
//!
//! GitHub signs each delivery with HMAC-SHA256 over the raw request body
//! and sends the result as `X-Hub-Signature-256: sha256=<hex>`. The
//! verifier recomputes the MAC and compares in constant time.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Expected prefix on the signature header value.
const SIGNATURE_PREFIX: &str = "sha256=";

/// Signature verification errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    /// Header is absent although a secret is configured.
    #[error("Missing signature header")]
    MissingSignature,

    /// Header value is not `sha256=<hex>`.
    #[error("Malformed signature header")]
    MalformedSignature,

    /// The MAC did not match the payload.
    #[error("Signature mismatch")]
    Mismatch,
}

/// Verifies webhook deliveries against a shared secret.
///
/// When constructed without a secret, verification is a no-op; the server
/// logs that insecure mode loudly at startup.
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    secret: Option<String>,
}

impl SignatureVerifier {
    /// Creates a verifier. An empty secret is treated as absent.
    #[must_use]
    pub fn new(secret: Option<String>) -> Self {
        let secret = secret.filter(|s| !s.is_empty());
        Self { secret }
    }

    /// Returns true when deliveries are actually checked.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }

    /// Verifies a delivery body against its signature header.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError`] when a secret is configured and the
    /// header is missing, malformed, or does not match the body.
    pub fn verify(&self, body: &[u8], header: Option<&str>) -> Result<(), SignatureError> {
        let Some(secret) = self.secret.as_deref() else {
            return Ok(());
        };

        let header = header.ok_or(SignatureError::MissingSignature)?;
        let hex_digest = header
            .strip_prefix(SIGNATURE_PREFIX)
            .ok_or(SignatureError::MalformedSignature)?;
        let expected =
            hex::decode(hex_digest).map_err(|_| SignatureError::MalformedSignature)?;

        // HMAC accepts keys of any length, so this cannot fail for SHA-256.
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| SignatureError::Mismatch)?;
        mac.update(body);
        mac.verify_slice(&expected)
            .map_err(|_| SignatureError::Mismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn test_verify_valid_signature() {
        let verifier = SignatureVerifier::new(Some("hook-secret".to_string()));
        let body = br#"{"action":"completed"}"#;
        let header = sign("hook-secret", body);

        assert!(verifier.verify(body, Some(&header)).is_ok());
    }

    #[test]
    fn test_verify_wrong_secret() {
        let verifier = SignatureVerifier::new(Some("hook-secret".to_string()));
        let body = br#"{"action":"completed"}"#;
        let header = sign("other-secret", body);

        assert_eq!(
            verifier.verify(body, Some(&header)),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_verify_tampered_body() {
        let verifier = SignatureVerifier::new(Some("hook-secret".to_string()));
        let header = sign("hook-secret", b"original");

        assert_eq!(
            verifier.verify(b"tampered", Some(&header)),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_verify_missing_header() {
        let verifier = SignatureVerifier::new(Some("hook-secret".to_string()));

        assert_eq!(
            verifier.verify(b"body", None),
            Err(SignatureError::MissingSignature)
        );
    }

    #[test]
    fn test_verify_malformed_header() {
        let verifier = SignatureVerifier::new(Some("hook-secret".to_string()));

        assert_eq!(
            verifier.verify(b"body", Some("sha1=abcdef")),
            Err(SignatureError::MalformedSignature)
        );
        assert_eq!(
            verifier.verify(b"body", Some("sha256=not-hex")),
            Err(SignatureError::MalformedSignature)
        );
    }

    #[test]
    fn test_no_secret_skips_verification() {
        let verifier = SignatureVerifier::new(None);
        assert!(!verifier.is_enabled());
        assert!(verifier.verify(b"anything", None).is_ok());

        let empty = SignatureVerifier::new(Some(String::new()));
        assert!(!empty.is_enabled());
    }
}
