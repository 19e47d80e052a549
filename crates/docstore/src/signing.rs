//! Authorization header construction
//!
//! Key-authenticated requests carry an HMAC-SHA256 signature over the verb,
//! resource type, resource link and `x-ms-date`; token-authenticated
//! requests carry the bearer token itself. Both forms are URL-encoded.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{Error, Result};

const AUTH_VERSION: &str = "1.0";

/// Current time in the RFC 1123 form `x-ms-date` expects.
pub fn rfc1123_now() -> String {
    chrono::Utc::now()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

/// Raw base64 signature for a key-authenticated request.
///
/// Verb, resource type and date are lowercased; the resource link is signed
/// exactly as given.
pub fn master_key_signature(
    key: &str,
    verb: &str,
    resource_type: &str,
    resource_link: &str,
    date: &str,
) -> Result<String> {
    let key_bytes = STANDARD
        .decode(key.trim())
        .map_err(|e| Error::Config(format!("account key is not valid base64: {e}")))?;
    let payload = format!(
        "{}\n{}\n{}\n{}\n\n",
        verb.to_lowercase(),
        resource_type.to_lowercase(),
        resource_link,
        date.to_lowercase()
    );
    let mut mac = Hmac::<Sha256>::new_from_slice(&key_bytes)
        .map_err(|e| Error::Config(format!("invalid account key: {e}")))?;
    mac.update(payload.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// `authorization` header value for a key-authenticated request.
pub fn master_key_authorization(
    key: &str,
    verb: &str,
    resource_type: &str,
    resource_link: &str,
    date: &str,
) -> Result<String> {
    let signature = master_key_signature(key, verb, resource_type, resource_link, date)?;
    Ok(encode_authorization("master", &signature))
}

/// `authorization` header value for a token-authenticated request.
pub fn token_authorization(token: &str) -> String {
    encode_authorization("aad", token)
}

fn encode_authorization(kind: &str, signature: &str) -> String {
    urlencoding::encode(&format!("type={kind}&ver={AUTH_VERSION}&sig={signature}")).into_owned()
}
