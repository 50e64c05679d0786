use {
    axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    switchboard_common::Platform,
    switchboard_graph::SignatureError,
    switchboard_oauth::AuthorizationReason,
};

/// Result type of gateway handlers.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by gateway handlers, each mapped to an HTTP status.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("platform {0} is not enabled")]
    PlatformDisabled(Platform),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Channel(#[from] switchboard_channels::Error),

    #[error(transparent)]
    Authorization(#[from] switchboard_oauth::Error),

    #[error(transparent)]
    Signature(#[from] SignatureError),
}

impl Error {
    #[must_use]
    pub fn bad_request(message: impl std::fmt::Display) -> Self {
        Self::BadRequest(message.to_string())
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::PlatformDisabled(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Channel(e) => channel_status(e),
            Self::Authorization(e) => oauth_status(e),
            Self::Signature(SignatureError::Malformed(_) | SignatureError::Io(_)) => {
                StatusCode::BAD_REQUEST
            },
            Self::Signature(_) => StatusCode::FORBIDDEN,
        }
    }

    /// Classified reason when the failure was an authorization refusal.
    #[must_use]
    pub fn authorization_reason(&self) -> Option<AuthorizationReason> {
        match self {
            Self::Authorization(e) | Self::Channel(switchboard_channels::Error::Authorization(e)) => {
                e.reason()
            },
            _ => None,
        }
    }
}

fn channel_status(error: &switchboard_channels::Error) -> StatusCode {
    use switchboard_channels::Error as E;
    match error {
        E::InvalidInput { .. } | E::NotFound { .. } => StatusCode::BAD_REQUEST,
        E::PartialBatchFailure { .. } => StatusCode::OK,
        E::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        E::Authorization(e) => oauth_status(e),
        E::Graph(e) => graph_status(e),
        E::External { .. } => StatusCode::BAD_GATEWAY,
        E::StateCorruption { .. } | E::SerdeJson(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn oauth_status(error: &switchboard_oauth::Error) -> StatusCode {
    use switchboard_oauth::Error as E;
    match error {
        E::Authorization { .. } => StatusCode::UNAUTHORIZED,
        E::InvalidState => StatusCode::BAD_REQUEST,
        E::Graph(e) => graph_status(e),
        E::Message(_) => StatusCode::BAD_GATEWAY,
    }
}

fn graph_status(error: &switchboard_graph::Error) -> StatusCode {
    use switchboard_graph::Error as E;
    match error {
        E::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        E::InvalidInput { .. } => StatusCode::BAD_REQUEST,
        E::Remote(_) | E::RemoteProtocol { .. } | E::Http(_) => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = serde_json::json!({ "error": self.to_string() });
        match &self {
            Self::Channel(switchboard_channels::Error::NotFound { ids }) => {
                body["missing"] = serde_json::json!(ids);
            },
            _ => {
                if let Some(reason) = self.authorization_reason() {
                    body["reason"] = serde_json::json!(reason);
                }
            },
        }
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn statuses() {
        let not_found: Error = switchboard_channels::Error::not_found(["a"]).into();
        assert_eq!(not_found.status(), StatusCode::BAD_REQUEST);

        let denied: Error = switchboard_oauth::Error::authorization(
            AuthorizationReason::AccessDenied,
            "missing permissions",
        )
        .into();
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            denied.authorization_reason(),
            Some(AuthorizationReason::AccessDenied)
        );

        let late: Error =
            switchboard_channels::Error::Graph(switchboard_graph::Error::DeadlineExceeded).into();
        assert_eq!(late.status(), StatusCode::GATEWAY_TIMEOUT);

        assert_eq!(
            Error::from(SignatureError::Mismatch).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            Error::from(SignatureError::Malformed("x".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::PlatformDisabled(Platform::WhatsApp).status(),
            StatusCode::NOT_FOUND
        );
    }
}
