//! Configuration schema for the switchboard gateway.

use std::{path::PathBuf, time::Duration};

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchboardConfig {
    pub server: ServerConfig,
    pub meta: MetaAppConfig,
    pub messenger: MessengerConfig,
    pub whatsapp: WhatsAppConfig,
    pub engine: EngineConfig,
    pub storage: StorageConfig,
}

/// Gateway server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to. Defaults to "127.0.0.1".
    pub bind: String,
    pub port: u16,
    /// Externally reachable base URL, used to build OAuth redirect URIs.
    pub public_url: Option<String>,
    /// Deadline applied to every outbound call made on behalf of a request.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8484,
            public_url: None,
            request_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Base URL for redirect URIs, falling back to the bind address.
    #[must_use]
    pub fn base_url(&self) -> String {
        match &self.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}:{}", self.bind, self.port),
        }
    }
}

/// The registered application on the Meta developer platform.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetaAppConfig {
    pub app_id: String,

    #[serde(serialize_with = "serialize_secret")]
    pub app_secret: Secret<String>,

    /// Shared token echoed by the platform during the webhook handshake.
    #[serde(serialize_with = "serialize_secret")]
    pub verify_token: Secret<String>,

    pub graph_url: String,
    pub graph_version: String,
    pub dialog_url: String,

    /// Header carrying the webhook signature.
    pub signature_header: String,
}

impl Default for MetaAppConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            app_secret: Secret::new(String::new()),
            verify_token: Secret::new(String::new()),
            graph_url: "https://graph.facebook.com".into(),
            graph_version: "v12.0".into(),
            dialog_url: "https://www.facebook.com".into(),
            signature_header: "X-Hub-Signature-256".into(),
        }
    }
}

impl std::fmt::Debug for MetaAppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetaAppConfig")
            .field("app_id", &self.app_id)
            .field("app_secret", &"[REDACTED]")
            .field("verify_token", &"[REDACTED]")
            .field("graph_url", &self.graph_url)
            .field("graph_version", &self.graph_version)
            .field("dialog_url", &self.dialog_url)
            .field("signature_header", &self.signature_header)
            .finish()
    }
}

/// Page-based messenger integration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessengerConfig {
    pub enabled: bool,
    /// Webhook fields each page is subscribed to.
    pub subscribed_fields: Vec<String>,
    /// Permissions requested in the authorization dialog.
    pub scopes: Vec<String>,
    /// Long-lived token used to refetch restored pages after a restart.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_option_secret"
    )]
    pub system_token: Option<Secret<String>>,
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            subscribed_fields: vec!["messages".into(), "messaging_postbacks".into()],
            scopes: vec![
                "pages_show_list".into(),
                "pages_messaging".into(),
                "pages_manage_metadata".into(),
            ],
            system_token: None,
        }
    }
}

impl std::fmt::Debug for MessengerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessengerConfig")
            .field("enabled", &self.enabled)
            .field("subscribed_fields", &self.subscribed_fields)
            .field("scopes", &self.scopes)
            .field(
                "system_token",
                &self.system_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Business-phone messaging integration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WhatsAppConfig {
    pub enabled: bool,
    pub subscribed_fields: Vec<String>,
    pub scopes: Vec<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_option_secret"
    )]
    pub system_token: Option<Secret<String>>,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            subscribed_fields: vec!["messages".into()],
            scopes: vec![
                "whatsapp_business_management".into(),
                "whatsapp_business_messaging".into(),
            ],
            system_token: None,
        }
    }
}

impl std::fmt::Debug for WhatsAppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhatsAppConfig")
            .field("enabled", &self.enabled)
            .field("subscribed_fields", &self.subscribed_fields)
            .field("scopes", &self.scopes)
            .field(
                "system_token",
                &self.system_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Where normalized inbound messages are handed off.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Messages are POSTed here as JSON. When unset they are only logged.
    pub forward_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database holding the metadata store. Defaults to the data dir.
    pub database: Option<PathBuf>,
}

// ── Serde helpers for Secret<String> ────────────────────────────────────────

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}
