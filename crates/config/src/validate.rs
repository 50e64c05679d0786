//! Configuration validation.
//!
//! Checks a loaded [`SwitchboardConfig`] for values the gateway cannot run
//! without and for settings that are syntactically valid but unusable.

use secrecy::ExposeSecret;

use crate::schema::SwitchboardConfig;

/// Header names the webhook authenticator understands.
const SIGNATURE_HEADERS: &[&str] = &["X-Hub-Signature-256"];

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Dotted path, e.g. "meta.app_id"
    pub path: String,
    pub message: String,
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    fn push(&mut self, severity: Severity, path: &str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity,
            path: path.to_string(),
            message: message.into(),
        });
    }
}

/// Validate a loaded configuration.
#[must_use]
pub fn validate(config: &SwitchboardConfig) -> ValidationResult {
    let mut result = ValidationResult::default();
    let meta = &config.meta;

    if meta.app_id.trim().is_empty() {
        result.push(Severity::Error, "meta.app_id", "application id is required");
    }
    if meta.app_secret.expose_secret().is_empty() {
        result.push(
            Severity::Error,
            "meta.app_secret",
            "application secret is required to verify webhooks",
        );
    }
    if meta.verify_token.expose_secret().is_empty() {
        result.push(
            Severity::Error,
            "meta.verify_token",
            "verify token is required for the webhook handshake",
        );
    }
    if !SIGNATURE_HEADERS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(&meta.signature_header))
    {
        result.push(
            Severity::Error,
            "meta.signature_header",
            format!("unsupported signature header {:?}", meta.signature_header),
        );
    }
    if !is_graph_version(&meta.graph_version) {
        result.push(
            Severity::Error,
            "meta.graph_version",
            format!(
                "expected a version like \"v12.0\", got {:?}",
                meta.graph_version
            ),
        );
    }
    if !config.messenger.enabled && !config.whatsapp.enabled {
        result.push(
            Severity::Warning,
            "messenger.enabled",
            "no platform is enabled, the gateway will only answer health checks",
        );
    }
    if config.whatsapp.enabled && config.whatsapp.subscribed_fields.is_empty() {
        result.push(
            Severity::Warning,
            "whatsapp.subscribed_fields",
            "empty field set, subscribed accounts will receive no events",
        );
    }
    if config.messenger.enabled && config.messenger.subscribed_fields.is_empty() {
        result.push(
            Severity::Warning,
            "messenger.subscribed_fields",
            "empty field set, subscribed pages will receive no events",
        );
    }
    if config.server.public_url.is_none() {
        result.push(
            Severity::Warning,
            "server.public_url",
            "not set, OAuth redirect URIs will use the bind address",
        );
    }

    result
}

fn is_graph_version(version: &str) -> bool {
    let Some(rest) = version.strip_prefix('v') else {
        return false;
    };
    let mut parts = rest.split('.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(major), Some(minor), None) => {
            !major.is_empty()
                && !minor.is_empty()
                && major.bytes().all(|b| b.is_ascii_digit())
                && minor.bytes().all(|b| b.is_ascii_digit())
        },
        _ => false,
    }
}
