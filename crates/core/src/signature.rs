//! HMAC-SHA256 webhook signatures.
//!
//! Code hosts sign each delivery with a shared secret and send the result
//! as `sha256=<hex digest>` in a provider-specific header.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Prefix carried by every signature header value.
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Compute the signature header value for `payload` under `secret`.
pub fn sign(secret: &str, payload: &[u8]) -> String {
    let mut mac = keyed(secret);
    mac.update(payload);
    format!("{SIGNATURE_PREFIX}{}", hex::encode(mac.finalize().into_bytes()))
}

/// Check a signature header value against `payload` under `secret`.
///
/// The comparison is constant-time. A missing prefix or malformed hex is a
/// mismatch, never an error.
pub fn verify(secret: &str, payload: &[u8], header_value: &str) -> bool {
    let Some(digest_hex) = header_value.trim().strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let Ok(expected) = hex::decode(digest_hex) else {
        return false;
    };
    let mut mac = keyed(secret);
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

/// Find the first secret among `secrets` that validates the signature.
pub fn find_matching_secret<'a>(
    secrets: impl IntoIterator<Item = &'a str>,
    payload: &[u8],
    header_value: &str,
) -> Option<&'a str> {
    secrets
        .into_iter()
        .find(|secret| verify(secret, payload, header_value))
}

fn keyed(secret: &str) -> HmacSha256 {
    HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length")
}
