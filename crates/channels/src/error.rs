use std::error::Error as StdError;

use serde::Serialize;

/// Crate-wide result type for channel operations.
pub type Result<T> = std::result::Result<T, Error>;

/// An account a batch operation failed for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedAccount {
    pub id: String,
    pub error: String,
}

/// Typed channel errors shared across platform plugins.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input payload or parameter is invalid.
    #[error("invalid channel input: {message}")]
    InvalidInput { message: String },

    /// Requested account or sub-resource ids are not registered.
    #[error("unknown account ids: {}", ids.join(", "))]
    NotFound { ids: Vec<String> },

    /// Some accounts of a batch failed while the others succeeded.
    #[error("{} account(s) failed", failed.len())]
    PartialBatchFailure { failed: Vec<FailedAccount> },

    /// A backup blob could not be decoded.
    #[error("corrupt registry state: {reason}")]
    StateCorruption { reason: String },

    /// Operation is currently unavailable (not configured/ready).
    #[error("channel operation unavailable: {message}")]
    Unavailable { message: String },

    #[error(transparent)]
    Authorization(#[from] switchboard_oauth::Error),

    #[error(transparent)]
    Graph(#[from] switchboard_graph::Error),

    /// Wrapped source error from an external dependency.
    #[error("channel operation failed: {context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// JSON (de)serialization failed.
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

impl Error {
    #[must_use]
    pub fn invalid_input(message: impl std::fmt::Display) -> Self {
        Self::InvalidInput {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn unavailable(message: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn not_found(ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::NotFound {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn corruption(reason: impl std::fmt::Display) -> Self {
        Self::StateCorruption {
            reason: reason.to_string(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn not_found_lists_ids() {
        let err = Error::not_found(["1", "2"]);
        assert_eq!(err.to_string(), "unknown account ids: 1, 2");
    }

    #[test]
    fn partial_failure_counts() {
        let err = Error::PartialBatchFailure {
            failed: vec![FailedAccount {
                id: "1".into(),
                error: "expired".into(),
            }],
        };
        assert_eq!(err.to_string(), "1 account(s) failed");
    }
}
