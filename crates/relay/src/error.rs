use std::error::Error as StdError;

use crate::shorten::ShortenError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The thread feed carried no originating message.
    #[error("parent message not found for thread {thread_id}")]
    ParentNotFound { thread_id: i64 },

    /// The network is absent even after refreshing the network list.
    #[error("unknown network {network_id}")]
    UnknownNetwork { network_id: i64 },

    #[error(transparent)]
    Source(#[from] feedbridge_yammer::Error),

    #[error(transparent)]
    Destination(#[from] feedbridge_channels::Error),

    #[error("failed to persist {context}: {source}")]
    Persist {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error(transparent)]
    Config(#[from] ShortenError),

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn persist(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Persist {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Errors after which the relay must stop rather than retry next cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Persist { .. } | Self::Config(_))
    }

    /// Credentials are gone or were rejected; only a new handshake helps.
    pub fn needs_reauth(&self) -> bool {
        match self {
            Self::Source(e) => e.needs_reauthorization(),
            _ => false,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::Source(e) => e.is_rate_limited(),
            Self::Destination(e) => e.is_rate_limited(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
