use std::error::Error as StdError;

/// Crate-wide result type for credential operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No token has been loaded or exchanged yet.
    #[error("no credentials available, interactive authorization required")]
    Unauthenticated,

    /// The token expired and could not be renewed. Terminal until the next
    /// successful authorization-code exchange.
    #[error("token refresh failed: {reason}")]
    RefreshFailed { reason: String },

    /// The token endpoint answered with something other than 200.
    #[error("token endpoint returned {status}")]
    TokenEndpoint { status: reqwest::StatusCode },

    /// Nobody completed the browser consent in time.
    #[error("timed out after {seconds}s waiting for the authorization redirect")]
    HandshakeTimeout { seconds: u64 },

    /// The redirect arrived but did not carry a usable code.
    #[error("authorization redirect rejected: {message}")]
    Redirect { message: String },

    /// Reading or writing the credential file failed.
    #[error("credential store {context}: {source}")]
    Persist {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error("{message}")]
    Message { message: String },

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn external(context: impl Into<String>, source: impl StdError + Send + Sync + 'static) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }

    #[must_use]
    pub fn persist(context: impl Into<String>, source: impl StdError + Send + Sync + 'static) -> Self {
        Self::Persist {
            context: context.into(),
            source: Box::new(source),
        }
    }

    #[must_use]
    pub fn redirect(message: impl Into<String>) -> Self {
        Self::Redirect {
            message: message.into(),
        }
    }

    /// True when only a fresh interactive handshake can recover.
    pub fn needs_reauthorization(&self) -> bool {
        matches!(self, Self::Unauthenticated | Self::RefreshFailed { .. })
    }
}
