//! Authorization dialog URLs and callback handling.

use std::time::{Duration, Instant};

use {
    base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD},
    dashmap::DashMap,
    rand::RngCore,
    serde::Deserialize,
    switchboard_common::Platform,
    tracing::debug,
    url::Url,
};

use crate::error::{AuthorizationReason, Error, Result};

/// How long an issued `state` stays redeemable.
const STATE_TTL: Duration = Duration::from_secs(600);

/// Result of starting the authorization flow.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
}

#[derive(Debug, Clone)]
struct PendingAuthorization {
    platform: Platform,
    redirect_uri: String,
    issued_at: Instant,
}

/// Builds authorization dialog URLs and tracks outstanding `state` values.
pub struct AuthorizationFlow {
    dialog_url: String,
    version: String,
    app_id: String,
    pending: DashMap<String, PendingAuthorization>,
}

impl AuthorizationFlow {
    pub fn new(
        dialog_url: impl Into<String>,
        version: impl Into<String>,
        app_id: impl Into<String>,
    ) -> Self {
        Self {
            dialog_url: dialog_url.into().trim_end_matches('/').to_string(),
            version: version.into(),
            app_id: app_id.into(),
            pending: DashMap::new(),
        }
    }

    /// Build the dialog URL for `platform` and remember its `state`.
    pub fn start(
        &self,
        platform: Platform,
        scopes: &[String],
        redirect_uri: &str,
    ) -> Result<AuthorizationRequest> {
        self.evict_expired();
        let state = generate_state();

        let mut url = Url::parse(&format!("{}/{}/dialog/oauth", self.dialog_url, self.version))
            .map_err(|e| Error::message(format!("invalid dialog_url: {e}")))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.app_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("state", &state)
            .append_pair("response_type", "code");
        if !scopes.is_empty() {
            url.query_pairs_mut().append_pair("scope", &scopes.join(","));
        }

        self.pending.insert(state.clone(), PendingAuthorization {
            platform,
            redirect_uri: redirect_uri.to_string(),
            issued_at: Instant::now(),
        });
        debug!(%platform, "authorization flow started");

        Ok(AuthorizationRequest {
            url: url.to_string(),
            state,
        })
    }

    /// Consume `state`, returning the platform and redirect URI it was
    /// issued for. Each state is redeemable once.
    pub fn redeem(&self, state: &str, platform: Platform) -> Result<String> {
        let (_, pending) = self.pending.remove(state).ok_or(Error::InvalidState)?;
        if pending.issued_at.elapsed() > STATE_TTL || pending.platform != platform {
            return Err(Error::InvalidState);
        }
        Ok(pending.redirect_uri)
    }

    /// Number of outstanding states.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn evict_expired(&self) {
        self.pending
            .retain(|_, pending| pending.issued_at.elapsed() <= STATE_TTL);
    }
}

/// Query parameters of the OAuth redirect back to us.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_reason: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// The authorization code, or the classified reason the user did not
    /// grant one.
    pub fn code(&self) -> Result<&str> {
        if let Some(error) = self.error.as_deref().filter(|e| !e.is_empty()) {
            let reason = match self.error_reason.as_deref() {
                Some(r) if AuthorizationReason::from_callback(r) != AuthorizationReason::Other => {
                    AuthorizationReason::from_callback(r)
                },
                _ => AuthorizationReason::from_callback(error),
            };
            let detail = self
                .error_description
                .clone()
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| error.to_string());
            return Err(Error::authorization(reason, detail));
        }
        self.code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                Error::authorization(AuthorizationReason::Other, "missing authorization code")
            })
    }
}

/// Random, URL-safe `state` value.
fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
