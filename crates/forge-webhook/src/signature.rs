//! HMAC-SHA256 webhook signing.

use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Header carrying the Unix-seconds timestamp the signature covers.
pub const TIMESTAMP_HEADER: &str = "X-Forge-Timestamp";

/// Header carrying the body signature.
pub const SIGNATURE_HEADER: &str = "X-Forge-Signature";

/// Sign a webhook body.
///
/// The signed message is `"{timestamp}.{body}"`; the result is
/// `"sha256=" + hex(HMAC-SHA256(secret, message))`, matching what
/// consumers are documented to verify.
#[must_use]
pub fn sign(secret: &str, timestamp: i64, body: &str) -> Option<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body.as_bytes());
    Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}
