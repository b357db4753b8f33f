//! Source platform client: feed, thread and network reads over the OAuth
//! bearer-token transport.

pub mod client;
pub mod error;
pub mod schema;

pub use {
    client::{DEFAULT_API_BASE, FeedSource, MessageTarget, YammerClient},
    schema::{Body, FeedCategory, Message, MessageFeed, Network, Reference, find_reference},
};

pub use error::{Error, Result};
