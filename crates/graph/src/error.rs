use std::fmt;

use serde::{Deserialize, Serialize};

/// Crate-wide result type for Graph API calls.
pub type Result<T> = std::result::Result<T, Error>;

/// Error envelope returned by the Graph API.
///
/// `{"error": {"message": "...", "type": "OAuthException", "code": 190, ...}}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphError {
    #[serde(default)]
    pub message: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub code: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_subcode: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_user_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_user_msg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fbtrace_id: Option<String>,
}

/// Invalid parameter.
const CODE_INVALID_PARAMETER: i64 = 100;
/// Access token expired or was invalidated.
const CODE_INVALID_TOKEN: i64 = 190;
const CODE_PERMISSION_DENIED: i64 = 200;
const CODE_PERMISSION_MISSING: i64 = 10;

impl GraphError {
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            ..Self::default()
        }
    }

    /// The resource is not linked to this app, so unlinking it again is a no-op.
    ///
    /// Reported as `(#100) App is not installed: <app-id>`.
    #[must_use]
    pub fn is_not_linked(&self) -> bool {
        self.code == CODE_INVALID_PARAMETER && self.message.contains("App is not installed")
    }

    #[must_use]
    pub fn is_invalid_token(&self) -> bool {
        self.code == CODE_INVALID_TOKEN
    }

    #[must_use]
    pub fn is_permission_error(&self) -> bool {
        self.code == CODE_PERMISSION_DENIED
            || self.code == CODE_PERMISSION_MISSING
            || (200..300).contains(&self.code)
    }

    /// Human readable detail, preferring the text meant for end users.
    #[must_use]
    pub fn detail(&self) -> &str {
        self.error_user_msg
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.message)
    }
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.starts_with("(#") {
            f.write_str(&self.message)
        } else {
            write!(f, "(#{}) {}", self.code, self.message)
        }
    }
}

impl std::error::Error for GraphError {}

/// Typed Graph API client errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The remote side reported an error.
    #[error("graph api error: {0}")]
    Remote(GraphError),

    /// The response did not have the expected shape.
    #[error("unexpected {context} response: {detail}")]
    RemoteProtocol { context: String, detail: String },

    /// The caller-supplied deadline passed before the call completed.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Invalid call arguments.
    #[error("invalid graph request: {message}")]
    InvalidInput { message: String },

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl Error {
    #[must_use]
    pub fn protocol(context: impl Into<String>, detail: impl fmt::Display) -> Self {
        Self::RemoteProtocol {
            context: context.into(),
            detail: detail.to_string(),
        }
    }

    #[must_use]
    pub fn invalid_input(message: impl fmt::Display) -> Self {
        Self::InvalidInput {
            message: message.to_string(),
        }
    }

    /// The remote error, when the failure was reported by the remote side.
    #[must_use]
    pub fn remote(&self) -> Option<&GraphError> {
        match self {
            Self::Remote(e) => Some(e),
            _ => None,
        }
    }
}

impl From<GraphError> for Error {
    fn from(e: GraphError) -> Self {
        Self::Remote(e)
    }
}
