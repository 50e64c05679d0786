//! Signed requests posted by the platform to app callbacks.
//!
//! Format: `base64url(signature) "." base64url(payload)` where the signature
//! is `HMAC-SHA256(app secret, <payload as sent>)`.

use {
    base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD},
    hmac::{Hmac, Mac},
    serde::{Deserialize, de::DeserializeOwned},
    sha2::Sha256,
};

use crate::webhook::SignatureError;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "HMAC-SHA256";

/// Sent when a user removes the app, or an app is unlinked from a page.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeauthorizeRequest {
    /// Page the notice is about. Empty means every page the user granted.
    #[serde(default)]
    pub profile_id: String,
    /// Empty when the notice was triggered by this app unlinking itself.
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub algorithm: String,
    #[serde(default)]
    pub issued_at: i64,
}

impl DeauthorizeRequest {
    /// Notices without a user are echoes of our own unsubscribe calls.
    #[must_use]
    pub fn is_self_triggered(&self) -> bool {
        self.user_id.is_empty()
    }
}

#[derive(Deserialize)]
struct AlgorithmOnly {
    #[serde(default)]
    algorithm: String,
}

/// Verify and decode a signed request.
pub fn parse_signed_request<T: DeserializeOwned>(
    signed: &str,
    app_secret: &[u8],
) -> Result<T, SignatureError> {
    let (signature, payload) = signed
        .trim()
        .split_once('.')
        .filter(|(s, p)| !s.is_empty() && !p.is_empty())
        .ok_or_else(|| SignatureError::Malformed("expected <signature>.<payload>".into()))?;

    let signature = decode(signature)?;
    let mut mac = HmacSha256::new_from_slice(app_secret)
        .map_err(|e| SignatureError::Malformed(e.to_string()))?;
    mac.update(payload.as_bytes());
    mac.verify_slice(&signature)
        .map_err(|_| SignatureError::Mismatch)?;

    let payload = decode(payload)?;
    let claimed: AlgorithmOnly = serde_json::from_slice(&payload)
        .map_err(|e| SignatureError::Malformed(e.to_string()))?;
    if !claimed.algorithm.eq_ignore_ascii_case(ALGORITHM) {
        return Err(SignatureError::UnsupportedAlgorithm(claimed.algorithm));
    }
    serde_json::from_slice(&payload).map_err(|e| SignatureError::Malformed(e.to_string()))
}

fn decode(part: &str) -> Result<Vec<u8>, SignatureError> {
    URL_SAFE_NO_PAD
        .decode(part.trim_end_matches('='))
        .map_err(|e| SignatureError::Malformed(e.to_string()))
}
