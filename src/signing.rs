//! HMAC-SHA-256 signing for outgoing client webhooks.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Signs `"{timestamp_ms}.{canonical_json_payload}"` with the institution's
/// webhook secret and returns the lowercase-hex digest sent as
/// `X-Webhook-Signature`.
pub fn sign_payload(secret: &str, timestamp_ms: i64, canonical_json_payload: &str) -> String {
    let message = format!("{timestamp_ms}.{canonical_json_payload}");
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts a key of any length");
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a signature against the same construction. Exposed for tests
/// and for institutions building their own webhook receivers.
pub fn verify_signature(secret: &str, timestamp_ms: i64, canonical_json_payload: &str, signature: &str) -> bool {
    let expected = sign_payload(secret, timestamp_ms, canonical_json_payload);
    // constant-time compare to avoid leaking signature bytes via timing
    expected.len() == signature.len()
        && expected
            .bytes()
            .zip(signature.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_deterministic() {
        let a = sign_payload("secret", 1_700_000_000_000, r#"{"a":1}"#);
        let b = sign_payload("secret", 1_700_000_000_000, r#"{"a":1}"#);
        assert_eq!(a, b);
    }

    #[test]
    fn signature_changes_with_payload() {
        let a = sign_payload("secret", 1_700_000_000_000, r#"{"a":1}"#);
        let b = sign_payload("secret", 1_700_000_000_000, r#"{"a":2}"#);
        assert_ne!(a, b);
    }

    #[test]
    fn verify_accepts_matching_signature() {
        let sig = sign_payload("secret", 42, "payload");
        assert!(verify_signature("secret", 42, "payload", &sig));
    }

    #[test]
    fn verify_rejects_tampered_signature() {
        let sig = sign_payload("secret", 42, "payload");
        assert!(!verify_signature("secret", 42, "other-payload", &sig));
        assert!(!verify_signature("other-secret", 42, "payload", &sig));
    }
}
