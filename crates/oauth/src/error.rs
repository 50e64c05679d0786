use std::fmt;

use switchboard_graph::GraphError;

/// Crate-wide result type for token broker operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classified reason of an authorization failure, so callers can render a
/// targeted retry prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationReason {
    ConsentRequired,
    LoginRequired,
    AccessDenied,
    Other,
}

impl AuthorizationReason {
    /// Classify an OAuth callback `error` / `error_reason` value.
    #[must_use]
    pub fn from_callback(error: &str) -> Self {
        match error {
            "consent_required" | "interaction_required" => Self::ConsentRequired,
            "login_required" => Self::LoginRequired,
            "access_denied" | "user_denied" => Self::AccessDenied,
            _ => Self::Other,
        }
    }

    /// Classify a remote error returned by the token endpoints.
    #[must_use]
    pub fn from_remote(error: &GraphError) -> Self {
        if error.is_invalid_token() {
            Self::LoginRequired
        } else if error.is_permission_error() {
            Self::AccessDenied
        } else {
            Self::Other
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConsentRequired => "consent_required",
            Self::LoginRequired => "login_required",
            Self::AccessDenied => "access_denied",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for AuthorizationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The user, token or remote side refused the authorization.
    #[error("authorization failed ({reason}): {detail}")]
    Authorization {
        reason: AuthorizationReason,
        detail: String,
    },

    /// Unknown, reused or expired `state` on an OAuth callback.
    #[error("invalid or expired authorization state")]
    InvalidState,

    #[error(transparent)]
    Graph(#[from] switchboard_graph::Error),

    #[error("{0}")]
    Message(String),
}

impl Error {
    #[must_use]
    pub fn authorization(reason: AuthorizationReason, detail: impl Into<String>) -> Self {
        Self::Authorization {
            reason,
            detail: detail.into(),
        }
    }

    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    /// Turn a remote rejection into a classified authorization error,
    /// keeping transport and protocol failures as they are.
    #[must_use]
    pub fn from_rejection(error: switchboard_graph::Error) -> Self {
        match error {
            switchboard_graph::Error::Remote(remote) => Self::Authorization {
                reason: AuthorizationReason::from_remote(&remote),
                detail: remote.detail().to_string(),
            },
            other => Self::Graph(other),
        }
    }

    #[must_use]
    pub fn reason(&self) -> Option<AuthorizationReason> {
        match self {
            Self::Authorization { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

impl switchboard_common::FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message(message)
    }
}

switchboard_common::impl_context!();

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn classifies_callback_errors() {
        assert_eq!(
            AuthorizationReason::from_callback("consent_required"),
            AuthorizationReason::ConsentRequired
        );
        assert_eq!(
            AuthorizationReason::from_callback("login_required"),
            AuthorizationReason::LoginRequired
        );
        assert_eq!(
            AuthorizationReason::from_callback("access_denied"),
            AuthorizationReason::AccessDenied
        );
        assert_eq!(
            AuthorizationReason::from_callback("server_error"),
            AuthorizationReason::Other
        );
    }

    #[test]
    fn rejection_keeps_remote_detail() {
        let mut remote = GraphError::new(190, "Error validating access token");
        remote.error_user_msg = Some("Please log in again".into());
        let err = Error::from_rejection(switchboard_graph::Error::Remote(remote));
        assert_eq!(err.reason(), Some(AuthorizationReason::LoginRequired));
        assert!(err.to_string().contains("Please log in again"));

        let err = Error::from_rejection(switchboard_graph::Error::DeadlineExceeded);
        assert!(err.reason().is_none());
    }
}
