use std::error::Error as StdError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Auth(#[from] feedbridge_oauth::Error),

    /// HTTP 429. Retry on the next cycle.
    #[error("rate limited on {endpoint}")]
    RateLimited { endpoint: String },

    /// HTTP 401: the access token was revoked or is otherwise invalid.
    #[error("{endpoint} rejected the access token")]
    Rejected { endpoint: String },

    #[error("{endpoint} returned {status}")]
    Status {
        endpoint: String,
        status: reqwest::StatusCode,
    },

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("{message}")]
    Message { message: String },

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

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Credentials are gone for good; only a new handshake helps.
    pub fn needs_reauthorization(&self) -> bool {
        match self {
            Self::Auth(e) => e.needs_reauthorization(),
            Self::Rejected { .. } => true,
            _ => false,
        }
    }
}
