//! Payload signing

use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Compute the hex HMAC-SHA256 of a payload.
///
/// Deterministic in `(payload, secret)`; receivers verify with the shared
/// secret from their subscription.
pub fn compute_signature(secret: &[u8], payload: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret)
        .unwrap_or_else(|_| Hmac::<Sha256>::new_from_slice(b"default").expect("hmac"));
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Format the signature header value
pub fn signature_header(secret: &[u8], payload: &[u8]) -> String {
    format!("sha256={}", compute_signature(secret, payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_is_deterministic() {
        let a = compute_signature(b"secret", b"{\"x\":1}");
        let b = compute_signature(b"secret", b"{\"x\":1}");
        assert_eq!(a, b);
    }

    #[test]
    fn test_signature_varies_with_secret_and_payload() {
        let base = compute_signature(b"secret", b"payload");
        assert_ne!(base, compute_signature(b"other", b"payload"));
        assert_ne!(base, compute_signature(b"secret", b"different"));
    }

    #[test]
    fn test_header_prefix() {
        let header = signature_header(b"secret", b"payload");
        assert!(header.starts_with("sha256="));
        assert_eq!(header.len(), "sha256=".len() + 64);
    }
}
