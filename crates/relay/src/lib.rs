//! Thread resolution and the feed relay loop.

pub mod cache;
pub mod error;
pub mod persist;
pub mod relay;
pub mod resolver;
pub mod shorten;
pub mod watermark;

pub use {
    cache::{Thread, ThreadCache},
    error::{Error, Result},
    relay::{BatchReport, RelayConfig, RelayLoop},
    resolver::{DIRECT_MESSAGE_GROUP, ThreadChannelResolver},
    shorten::{NameShortener, ShortenError, shorten, strip_forbidden},
    watermark::Watermarks,
};
