//! Slack Web API implementation of [`feedbridge_channels::DestinationChannels`].

pub mod client;

pub use client::{DEFAULT_API_BASE, SlackClient};
