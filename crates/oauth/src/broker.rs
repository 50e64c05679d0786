//! Token exchange and introspection.

use std::sync::Arc;

use {
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
    switchboard_graph::{Deadline, GraphClient},
    tracing::{debug, info, warn},
};

use crate::{
    error::{AuthorizationReason, Context, Error, Result},
    proof::SigningProofCache,
    types::{Credential, GrantedScope, TokenInspection},
};

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Deserialize)]
struct DebugTokenResponse {
    data: DebugTokenData,
}

#[derive(Deserialize)]
struct DebugTokenData {
    #[serde(default)]
    app_id: String,
    #[serde(default)]
    is_valid: bool,
    /// 0 for tokens that never expire.
    #[serde(default)]
    expires_at: i64,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    scopes: Vec<String>,
    #[serde(default)]
    granular_scopes: Vec<GrantedScope>,
    #[serde(default)]
    error: Option<DebugTokenError>,
}

#[derive(Deserialize)]
struct DebugTokenError {
    #[serde(default)]
    message: String,
}

/// Exchanges and introspects tokens for one registered app.
///
/// The broker performs no retries; retry policy belongs to the caller.
pub struct TokenBroker {
    graph: GraphClient,
    app_id: String,
    app_secret: Secret<String>,
    proofs: Arc<SigningProofCache>,
}

impl TokenBroker {
    pub fn new(
        graph: GraphClient,
        app_id: impl Into<String>,
        app_secret: Secret<String>,
        proofs: Arc<SigningProofCache>,
    ) -> Self {
        Self {
            graph,
            app_id: app_id.into(),
            app_secret,
            proofs,
        }
    }

    #[must_use]
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    #[must_use]
    pub fn graph(&self) -> &GraphClient {
        &self.graph
    }

    /// Signing proof for `access_token`, cached per token.
    #[must_use]
    pub fn signing_proof(&self, access_token: &str) -> String {
        self.proofs.proof(access_token)
    }

    /// App access token, `<app id>|<app secret>`.
    fn app_token(&self) -> Secret<String> {
        Secret::new(format!(
            "{}|{}",
            self.app_id,
            self.app_secret.expose_secret()
        ))
    }

    /// Exchange an authorization code for a user credential carrying every
    /// permission in `required`.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        required: &[String],
        deadline: Deadline,
    ) -> Result<Credential> {
        let resp: TokenResponse = self
            .graph
            .get(
                "oauth/access_token",
                &[
                    ("client_id", self.app_id.as_str()),
                    ("client_secret", self.app_secret.expose_secret().as_str()),
                    ("redirect_uri", redirect_uri),
                    ("code", code),
                ],
                None,
                deadline,
            )
            .await
            .map_err(Error::from_rejection)?;

        let access_token = resp
            .access_token
            .filter(|t| !t.is_empty())
            .context("token response without access_token")?;
        info!("authorization code exchanged");

        let mut credential = self
            .authorize_token(Secret::new(access_token), required, deadline)
            .await?;
        if let Some(expires_in) = resp.expires_in.filter(|s| *s > 0) {
            credential.expires_at = Some(switchboard_common::unix_now() + expires_in);
        }
        Ok(credential)
    }

    /// Introspect a token: validity, expiry and granted scopes with targets.
    pub async fn inspect_token(
        &self,
        token: &Secret<String>,
        deadline: Deadline,
    ) -> Result<TokenInspection> {
        let app_token = self.app_token();
        let resp: DebugTokenResponse = self
            .graph
            .get(
                "debug_token",
                &[("input_token", token.expose_secret().as_str())],
                Some(&app_token),
                deadline,
            )
            .await
            .map_err(Error::from_rejection)?;
        let data = resp.data;

        if !data.is_valid {
            let detail = data
                .error
                .map(|e| e.message)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "token is not valid".into());
            return Err(Error::authorization(
                AuthorizationReason::LoginRequired,
                detail,
            ));
        }
        if !data.app_id.is_empty() && data.app_id != self.app_id {
            warn!(app_id = %data.app_id, "token issued for another app");
            return Err(Error::authorization(
                AuthorizationReason::AccessDenied,
                "token was issued for another application",
            ));
        }

        let mut scopes = data.granular_scopes;
        for scope in data.scopes {
            if !scopes.iter().any(|s| s.scope == scope) {
                scopes.push(GrantedScope {
                    scope,
                    target_ids: Vec::new(),
                });
            }
        }
        debug!(scopes = scopes.len(), "token inspected");

        Ok(TokenInspection {
            app_id: data.app_id,
            user_id: data.user_id.filter(|u| !u.is_empty()),
            is_valid: data.is_valid,
            expires_at: (data.expires_at > 0).then_some(data.expires_at),
            scopes,
        })
    }

    /// Fail with `access_denied` unless every permission in `required` was granted.
    pub fn verify_scopes(inspection: &TokenInspection, required: &[String]) -> Result<()> {
        let missing = inspection.missing_scopes(required);
        if missing.is_empty() {
            return Ok(());
        }
        Err(Error::authorization(
            AuthorizationReason::AccessDenied,
            format!("missing permissions: {}", missing.join(", ")),
        ))
    }

    /// Validate a token (obtained by code exchange or supplied manually) and
    /// turn it into a credential carrying its granted scopes.
    pub async fn authorize_token(
        &self,
        token: Secret<String>,
        required: &[String],
        deadline: Deadline,
    ) -> Result<Credential> {
        let inspection = self.inspect_token(&token, deadline).await?;
        Self::verify_scopes(&inspection, required)?;
        Ok(Credential {
            access_token: token,
            expires_at: inspection.expires_at,
            scopes: inspection.scopes,
        })
    }

    /// User id the token was issued to.
    pub async fn token_user(&self, token: &Secret<String>, deadline: Deadline) -> Result<String> {
        self.inspect_token(token, deadline)
            .await?
            .user_id
            .context("token is not bound to a user")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        mockito::Matcher,
        switchboard_graph::{GraphEndpoint, RequestSigner},
    };

    fn broker(server: &mockito::Server) -> TokenBroker {
        let proofs = Arc::new(SigningProofCache::new(Secret::new("app-secret".into())));
        let signer: Arc<dyn RequestSigner> = Arc::clone(&proofs) as Arc<dyn RequestSigner>;
        let graph = GraphClient::new(GraphEndpoint::new(server.url(), "v12.0"), signer);
        TokenBroker::new(graph, "42", Secret::new("app-secret".into()), proofs)
    }

    fn required() -> Vec<String> {
        vec![
            "whatsapp_business_management".into(),
            "whatsapp_business_messaging".into(),
        ]
    }

    fn debug_token_body(app_id: &str, valid: bool) -> String {
        serde_json::json!({
            "data": {
                "app_id": app_id,
                "type": "USER",
                "is_valid": valid,
                "expires_at": 0,
                "user_id": "777",
                "scopes": ["whatsapp_business_management", "whatsapp_business_messaging", "public_profile"],
                "granular_scopes": [
                    {"scope": "whatsapp_business_management", "target_ids": ["1001"]},
                    {"scope": "whatsapp_business_messaging", "target_ids": ["1001", "1002"]}
                ]
            }
        })
        .to_string()
    }

    #[tokio::test]
    async fn exchange_code_then_inspect() {
        let mut server = mockito::Server::new_async().await;
        let exchange = server
            .mock("GET", "/v12.0/oauth/access_token")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("client_id".into(), "42".into()),
                Matcher::UrlEncoded("code".into(), "the-code".into()),
                Matcher::UrlEncoded(
                    "redirect_uri".into(),
                    "https://bridge.example.com/oauth/whatsapp/callback".into(),
                ),
            ]))
            .with_body(r#"{"access_token":"EAAuser","token_type":"bearer","expires_in":5183944}"#)
            .create_async()
            .await;
        let inspect = server
            .mock("GET", "/v12.0/debug_token")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("input_token".into(), "EAAuser".into()),
                Matcher::UrlEncoded("access_token".into(), "42|app-secret".into()),
            ]))
            .with_body(debug_token_body("42", true))
            .create_async()
            .await;

        let cred = broker(&server)
            .exchange_code(
                "the-code",
                "https://bridge.example.com/oauth/whatsapp/callback",
                &required(),
                None,
            )
            .await
            .unwrap();

        exchange.assert_async().await;
        inspect.assert_async().await;
        assert_eq!(cred.access_token.expose_secret(), "EAAuser");
        assert!(cred.expires_at.is_some());
        assert_eq!(
            cred.shared_targets(&["whatsapp_business_messaging"]),
            vec!["1001", "1002"]
        );
        assert!(cred.has_scope("public_profile"));
    }

    #[tokio::test]
    async fn exchange_rejection_is_classified() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/v12.0/oauth/access_token")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(
                r#"{"error":{"message":"This authorization code has expired.","type":"OAuthException","code":100,"error_subcode":36007}}"#,
            )
            .create_async()
            .await;

        let err = broker(&server)
            .exchange_code("old", "https://x/cb", &required(), None)
            .await
            .unwrap_err();
        assert_eq!(err.reason(), Some(AuthorizationReason::Other));
        assert!(err.to_string().contains("authorization code has expired"));
    }

    #[tokio::test]
    async fn invalid_token_is_login_required() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/v12.0/debug_token")
            .match_query(Matcher::Any)
            .with_body(
                r#"{"data":{"app_id":"42","is_valid":false,"error":{"code":190,"message":"Session has expired"}}}"#,
            )
            .create_async()
            .await;

        let err = broker(&server)
            .inspect_token(&Secret::new("stale".into()), None)
            .await
            .unwrap_err();
        assert_eq!(err.reason(), Some(AuthorizationReason::LoginRequired));
        assert!(err.to_string().contains("Session has expired"));
    }

    #[tokio::test]
    async fn token_of_another_app_is_denied() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/v12.0/debug_token")
            .match_query(Matcher::Any)
            .with_body(debug_token_body("99", true))
            .create_async()
            .await;

        let err = broker(&server)
            .authorize_token(Secret::new("foreign".into()), &required(), None)
            .await
            .unwrap_err();
        assert_eq!(err.reason(), Some(AuthorizationReason::AccessDenied));
    }

    #[tokio::test]
    async fn manual_token_missing_permission_is_denied() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/v12.0/debug_token")
            .match_query(Matcher::Any)
            .with_body(
                r#"{"data":{"app_id":"42","is_valid":true,"expires_at":0,"scopes":["whatsapp_business_management"]}}"#,
            )
            .create_async()
            .await;

        let err = broker(&server)
            .authorize_token(Secret::new("partial".into()), &required(), None)
            .await
            .unwrap_err();
        assert_eq!(err.reason(), Some(AuthorizationReason::AccessDenied));
        assert!(err.to_string().contains("whatsapp_business_messaging"));
    }

    #[test]
    fn signing_proof_goes_through_cache() {
        let server_url = "http://127.0.0.1:9";
        let proofs = Arc::new(SigningProofCache::new(Secret::new("app-secret".into())));
        let graph = GraphClient::new(
            GraphEndpoint::new(server_url, "v12.0"),
            Arc::clone(&proofs) as Arc<dyn RequestSigner>,
        );
        let broker = TokenBroker::new(graph, "42", Secret::new("app-secret".into()), proofs);
        assert_eq!(
            broker.signing_proof("EAAtoken"),
            "9f9f0867bc3df2d00cecd6aa6fb78e65b64c050401bd6ec5b84d98503d443d34"
        );
        assert_eq!(broker.proofs.len(), 1);
    }
}
