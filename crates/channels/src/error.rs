use std::error::Error as StdError;

/// Crate-wide result type for destination operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed destination errors shared by every platform implementation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input payload or parameter is invalid.
    #[error("invalid channel input: {message}")]
    InvalidInput { message: String },

    /// A channel with this name already exists.
    #[error("channel name already taken: {name}")]
    NameTaken { name: String },

    /// The referenced channel does not exist or is not visible.
    #[error("channel not found: {channel}")]
    NotFound { channel: String },

    /// The platform asked us to slow down.
    #[error("rate limited calling {method}")]
    RateLimited { method: String },

    /// The platform rejected the call.
    #[error("{method} failed: {error}")]
    Api { method: String, error: String },

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
    pub fn name_taken(name: impl std::fmt::Display) -> Self {
        Self::NameTaken {
            name: name.to_string(),
        }
    }

    #[must_use]
    pub fn not_found(channel: impl std::fmt::Display) -> Self {
        Self::NotFound {
            channel: channel.to_string(),
        }
    }

    #[must_use]
    pub fn api(method: impl Into<String>, error: impl Into<String>) -> Self {
        Self::Api {
            method: method.into(),
            error: error.into(),
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

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}
