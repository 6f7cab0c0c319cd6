//! Webhook payload signatures
//!
//! Facebook signs every delivery with the app secret and sends the result in
//! the `X-Hub-Signature-256` header as `sha256=<hex>`.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the payload signature
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Compute the header value Facebook would send for `body`
#[cfg(test)]
pub(crate) fn sign(app_secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(app_secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Verify a `sha256=<hex>` signature header against `body`
pub fn verify_signature(app_secret: &str, body: &[u8], signature_header: &str) -> bool {
    let Some(signature) = signature_header.strip_prefix("sha256=") else {
        warn!("Invalid signature header format (missing sha256= prefix)");
        return false;
    };

    let Ok(expected) = hex::decode(signature) else {
        warn!("Invalid signature header format (not hex)");
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(app_secret.as_bytes()) else {
        return false;
    };
    mac.update(body);

    // verify_slice compares in constant time
    mac.verify_slice(&expected).is_ok()
}
