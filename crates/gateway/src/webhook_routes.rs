//! Inbound webhook endpoint: subscription handshake and signed deliveries.

use std::sync::Arc;

use {
    axum::{
        extract::{Query, State},
        http::{HeaderMap, StatusCode},
        response::{IntoResponse, Response},
    },
    bytes::Bytes,
    serde::Deserialize,
    switchboard_graph::{
        SignatureError, VerifiedReader,
        event::Event,
        webhook::{HandshakeError, verify_subscription},
    },
    tracing::{debug, warn},
};

use crate::{error::Error, state::GatewayState};

#[derive(Debug, Default, Deserialize)]
pub struct HandshakeParams {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

/// `GET /webhook`: echo the challenge once the verify token matches.
pub async fn handshake_handler(
    State(state): State<Arc<GatewayState>>,
    Query(params): Query<HandshakeParams>,
) -> Response {
    match verify_subscription(
        params.mode.as_deref(),
        params.verify_token.as_deref(),
        params.challenge.as_deref(),
        state.verify_token(),
    ) {
        Ok(challenge) => {
            debug!("webhook subscription verified");
            (StatusCode::OK, challenge).into_response()
        },
        Err(e @ HandshakeError::TokenMismatch) => {
            warn!(error = %e, "webhook handshake refused");
            (StatusCode::FORBIDDEN, e.to_string()).into_response()
        },
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

/// `POST /webhook`: verify the signature over the raw body, then hand the
/// envelope to the platform owning its `object`.
pub async fn event_handler(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(state.signature_header.as_str())
        .and_then(|v| v.to_str().ok());

    let event = match decode_verified(state.app_secret(), signature, &body) {
        Ok(event) => event,
        Err(rejection) => return rejection,
    };

    let Some(plugin) = state.platforms.for_object(&event.object) else {
        debug!(object = %event.object, "webhook for unhandled object ignored");
        return StatusCode::OK.into_response();
    };

    let platform = plugin.platform();
    match plugin.handle_event(&event).await {
        Ok(delivered) => debug!(%platform, delivered, "webhook dispatched"),
        Err(e) => warn!(%platform, error = %e, "webhook dispatch failed"),
    }
    StatusCode::OK.into_response()
}

/// Decode the envelope while the MAC accumulates, then verify. A body is
/// only looked at once its signature checked out.
fn decode_verified(
    secret: &[u8],
    signature: Option<&str>,
    body: &[u8],
) -> Result<Event, Response> {
    let mut reader = VerifiedReader::new(secret, signature, body).map_err(reject)?;
    let decoded = serde_json::from_reader::<_, Event>(&mut reader);
    reader.verify_all().map_err(reject)?;

    decoded.map_err(|e| {
        warn!(error = %e, "verified webhook body is not a valid envelope");
        (StatusCode::BAD_REQUEST, "invalid webhook body").into_response()
    })
}

fn reject(error: SignatureError) -> Response {
    warn!(error = %error, "webhook delivery rejected");
    let error = Error::from(error);
    (error.status(), error.to_string()).into_response()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        hmac::{Hmac, Mac},
        sha2::Sha256,
    };

    fn sign(body: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(b"app-secret").unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn verified_body_decodes() {
        let body = br#"{"object":"page","entry":[{"id":"1","time":1}]}"#;
        let event = decode_verified(b"app-secret", Some(&sign(body)), body).unwrap();
        assert_eq!(event.object, "page");
        assert_eq!(event.entry.len(), 1);
    }

    #[test]
    fn tampered_body_is_forbidden() {
        let body = br#"{"object":"page","entry":[]}"#;
        let signature = sign(body);
        let tampered = br#"{"object":"page","entry":[{}]}"#;
        let resp = decode_verified(b"app-secret", Some(&signature), tampered).unwrap_err();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn signed_garbage_is_a_bad_request() {
        let body = b"not json";
        let resp = decode_verified(b"app-secret", Some(&sign(body)), body).unwrap_err();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn header_problems() {
        let body = b"{}";
        let missing = decode_verified(b"app-secret", None, body).unwrap_err();
        assert_eq!(missing.status(), StatusCode::FORBIDDEN);

        let legacy = decode_verified(b"app-secret", Some("sha1=abc"), body).unwrap_err();
        assert_eq!(legacy.status(), StatusCode::FORBIDDEN);

        let short = decode_verified(b"app-secret", Some("sha256=abc"), body).unwrap_err();
        assert_eq!(short.status(), StatusCode::BAD_REQUEST);
    }
}
