use std::{sync::Arc, time::Duration};

use {
    secrecy::{ExposeSecret, Secret},
    switchboard_channels::{ConversationEngine, MetadataStore, PlatformPlugin, PlatformSet},
    switchboard_common::Platform,
    switchboard_config::SwitchboardConfig,
    switchboard_graph::{Deadline, GraphClient, GraphEndpoint, RequestSigner},
    switchboard_messenger::MessengerPlugin,
    switchboard_oauth::{AuthorizationFlow, SigningProofCache, TokenBroker},
    switchboard_whatsapp::WhatsAppPlugin,
    tokio::time::Instant,
};

use crate::error::{Error, Result};

/// Everything request handlers share.
pub struct GatewayState {
    pub version: String,
    pub platforms: PlatformSet,
    pub broker: TokenBroker,
    pub flow: AuthorizationFlow,
    pub store: Arc<dyn MetadataStore>,
    app_secret: Secret<String>,
    verify_token: Secret<String>,
    /// Header carrying the webhook signature.
    pub signature_header: String,
    /// Externally reachable base URL, without a trailing slash.
    pub base_url: String,
    pub request_timeout: Duration,
}

impl GatewayState {
    /// Wire the broker, authorization flow and enabled platform plugins
    /// from configuration.
    pub fn from_config(
        config: &SwitchboardConfig,
        http: reqwest::Client,
        store: Arc<dyn MetadataStore>,
        engine: Arc<dyn ConversationEngine>,
    ) -> Arc<Self> {
        let meta = &config.meta;
        let proofs = Arc::new(SigningProofCache::new(meta.app_secret.clone()));
        let signer: Arc<dyn RequestSigner> = Arc::clone(&proofs) as Arc<dyn RequestSigner>;
        let graph = GraphClient::with_http(
            http,
            GraphEndpoint::new(&meta.graph_url, &meta.graph_version),
            signer,
        );

        let mut platforms = PlatformSet::new();
        if config.messenger.enabled {
            platforms.register(Arc::new(MessengerPlugin::new(
                graph.clone(),
                &meta.app_id,
                config.messenger.clone(),
                Arc::clone(&engine),
            )));
        }
        if config.whatsapp.enabled {
            platforms.register(Arc::new(WhatsAppPlugin::new(
                graph.clone(),
                &meta.app_id,
                config.whatsapp.clone(),
                Arc::clone(&engine),
            )));
        }

        Arc::new(Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            platforms,
            broker: TokenBroker::new(graph, &meta.app_id, meta.app_secret.clone(), proofs),
            flow: AuthorizationFlow::new(&meta.dialog_url, &meta.graph_version, &meta.app_id),
            store,
            app_secret: meta.app_secret.clone(),
            verify_token: meta.verify_token.clone(),
            signature_header: meta.signature_header.clone(),
            base_url: config.server.base_url(),
            request_timeout: config.server.request_timeout(),
        })
    }

    /// Deadline for outbound calls made on behalf of the current request.
    #[must_use]
    pub fn deadline(&self) -> Deadline {
        Some(Instant::now() + self.request_timeout)
    }

    pub fn plugin(&self, platform: Platform) -> Result<&Arc<dyn PlatformPlugin>> {
        self.platforms
            .get(platform)
            .ok_or(Error::PlatformDisabled(platform))
    }

    /// Where the authorization dialog sends the user back to.
    #[must_use]
    pub fn redirect_uri(&self, platform: Platform) -> String {
        format!("{}/oauth/{platform}/callback", self.base_url)
    }

    pub(crate) fn app_secret(&self) -> &[u8] {
        self.app_secret.expose_secret().as_bytes()
    }

    pub(crate) fn verify_token(&self) -> &str {
        self.verify_token.expose_secret()
    }
}

impl std::fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayState")
            .field("version", &self.version)
            .field("platforms", &self.platforms)
            .field("app_secret", &"[REDACTED]")
            .field("verify_token", &"[REDACTED]")
            .field("signature_header", &self.signature_header)
            .field("base_url", &self.base_url)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}
