#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown platform: {0}")]
    UnknownPlatform(String),
}

pub type Result<T> = std::result::Result<T, Error>;

// ── Missing-value context ───────────────────────────────────────────────────

/// Error types that can be built from a plain message.
pub trait FromMessage: Sized {
    fn from_message(message: String) -> Self;
}

/// Generate a crate-local `Context` trait turning a missing `Option` value
/// into the crate's `Error`.
///
/// Invoke inside a module defining `Error: FromMessage` and a `Result<T>`
/// alias:
///
/// ```ignore
/// switchboard_common::impl_context!();
/// ```
#[macro_export]
macro_rules! impl_context {
    () => {
        pub trait Context<T> {
            fn context(self, message: impl Into<String>) -> Result<T>;
        }

        impl<T> Context<T> for Option<T> {
            fn context(self, message: impl Into<String>) -> Result<T> {
                self.ok_or_else(|| <Error as $crate::FromMessage>::from_message(message.into()))
            }
        }
    };
}
