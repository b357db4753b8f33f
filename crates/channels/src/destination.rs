use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
};

use crate::Result;

/// Destination-side channel as last observed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub is_archived: bool,
    pub is_member: bool,
    /// Empty when no purpose has been set.
    pub purpose: String,
}

/// A message to post into a channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingPost {
    pub text: String,
    /// Display name to post under.
    pub username: Option<String>,
    pub icon_url: Option<String>,
    /// Ordering token of the thread's opening post; groups replies under it.
    pub thread_ts: Option<String>,
}

impl OutgoingPost {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

/// Channel and message operations on the destination platform.
///
/// The lifecycle of channels belongs to the platform; callers only observe
/// them and nudge them toward a usable state.
#[async_trait]
pub trait DestinationChannels: Send + Sync {
    /// Fails with [`crate::Error::NameTaken`] when the name is in use.
    async fn create_channel(&self, name: &str) -> Result<Channel>;
    async fn channel_info(&self, channel_id: &str) -> Result<Channel>;
    async fn join_channel(&self, channel_id: &str) -> Result<Channel>;
    async fn unarchive_channel(&self, channel_id: &str) -> Result<()>;
    /// Returns the purpose as stored by the platform.
    async fn set_purpose(&self, channel_id: &str, purpose: &str) -> Result<String>;
    /// Returns the platform-assigned ordering token (`ts`) of the new post.
    async fn post_message(&self, channel_id: &str, post: &OutgoingPost) -> Result<String>;
    async fn list_channels(&self) -> Result<Vec<Channel>>;
}
