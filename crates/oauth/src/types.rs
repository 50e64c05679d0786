use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Permission granted to a token, optionally restricted to specific targets.
///
/// `target_ids` lists resources shared with the integration that do not
/// necessarily show up in the primary "list my resources" call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantedScope {
    pub scope: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_ids: Vec<String>,
}

/// Access credential of an account or user.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credential {
    #[serde(serialize_with = "serialize_secret")]
    pub access_token: Secret<String>,
    /// Unix timestamp when the token expires. `None` means it does not expire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub scopes: Vec<GrantedScope>,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .finish()
    }
}

impl Credential {
    #[must_use]
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: Secret::new(access_token.into()),
            expires_at: None,
            scopes: Vec::new(),
        }
    }

    #[must_use]
    pub fn token(&self) -> &Secret<String> {
        &self.access_token
    }

    #[must_use]
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s.scope == scope)
    }

    /// Target ids of every granted scope named in `scopes`, deduplicated.
    #[must_use]
    pub fn shared_targets(&self, scopes: &[&str]) -> Vec<String> {
        shared_targets(&self.scopes, scopes)
    }
}

/// Outcome of introspecting a token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TokenInspection {
    pub app_id: String,
    pub user_id: Option<String>,
    pub is_valid: bool,
    /// Unix timestamp; `None` for tokens that never expire.
    pub expires_at: Option<i64>,
    pub scopes: Vec<GrantedScope>,
}

impl TokenInspection {
    /// Required permissions missing from the granted set.
    #[must_use]
    pub fn missing_scopes<'a>(&self, required: &'a [String]) -> Vec<&'a str> {
        required
            .iter()
            .filter(|r| !self.scopes.iter().any(|s| &s.scope == *r))
            .map(String::as_str)
            .collect()
    }
}

pub(crate) fn shared_targets(granted: &[GrantedScope], scopes: &[&str]) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for scope in granted.iter().filter(|g| scopes.contains(&g.scope.as_str())) {
        for id in &scope.target_ids {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
    }
    ids
}

// ── Serde helpers for Secret<String> ────────────────────────────────────────

/// Serialize a `Secret<String>` by exposing its inner value.
pub fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}
