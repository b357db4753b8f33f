//! In-process [`DestinationChannels`] that records every call.

use std::{sync::Mutex, time::Duration};

use async_trait::async_trait;

use crate::{
    Error, Result,
    destination::{Channel, DestinationChannels, OutgoingPost},
};

#[derive(Debug, Default)]
struct State {
    channels: Vec<Channel>,
    posts: Vec<(String, OutgoingPost)>,
    create_calls: usize,
    join_calls: usize,
    unarchive_calls: usize,
    purpose_calls: usize,
    list_calls: usize,
    next_id: usize,
    fail_posts: bool,
}

#[derive(Debug, Default)]
pub struct MemoryChannels {
    state: Mutex<State>,
    create_delay: Option<Duration>,
}

impl MemoryChannels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep inside `create_channel`, widening race windows in tests.
    #[must_use]
    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = Some(delay);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seed a channel that exists before the relay starts.
    pub fn insert_channel(&self, channel: Channel) {
        self.lock().channels.push(channel);
    }

    /// Delete a channel behind the relay's back.
    pub fn remove_channel(&self, channel_id: &str) {
        self.lock().channels.retain(|c| c.id != channel_id);
    }

    pub fn set_fail_posts(&self, fail: bool) {
        self.lock().fail_posts = fail;
    }

    pub fn channel_named(&self, name: &str) -> Option<Channel> {
        self.lock().channels.iter().find(|c| c.name == name).cloned()
    }

    pub fn posts(&self) -> Vec<(String, OutgoingPost)> {
        self.lock().posts.clone()
    }

    pub fn create_calls(&self) -> usize {
        self.lock().create_calls
    }

    pub fn join_calls(&self) -> usize {
        self.lock().join_calls
    }

    pub fn unarchive_calls(&self) -> usize {
        self.lock().unarchive_calls
    }

    pub fn purpose_calls(&self) -> usize {
        self.lock().purpose_calls
    }

    pub fn list_calls(&self) -> usize {
        self.lock().list_calls
    }

    fn update<T>(&self, channel_id: &str, f: impl FnOnce(&mut Channel) -> T) -> Result<T> {
        let mut state = self.lock();
        let channel = state
            .channels
            .iter_mut()
            .find(|c| c.id == channel_id)
            .ok_or_else(|| Error::not_found(channel_id))?;
        Ok(f(channel))
    }
}

#[async_trait]
impl DestinationChannels for MemoryChannels {
    async fn create_channel(&self, name: &str) -> Result<Channel> {
        self.lock().create_calls += 1;
        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.lock();
        if state.channels.iter().any(|c| c.name == name) {
            return Err(Error::name_taken(name));
        }
        state.next_id += 1;
        let channel = Channel {
            id: format!("C{:04}", state.next_id),
            name: name.to_string(),
            is_archived: false,
            is_member: true,
            purpose: String::new(),
        };
        state.channels.push(channel.clone());
        Ok(channel)
    }

    async fn channel_info(&self, channel_id: &str) -> Result<Channel> {
        self.update(channel_id, |c| c.clone())
    }

    async fn join_channel(&self, channel_id: &str) -> Result<Channel> {
        self.lock().join_calls += 1;
        self.update(channel_id, |c| {
            c.is_member = true;
            c.clone()
        })
    }

    async fn unarchive_channel(&self, channel_id: &str) -> Result<()> {
        self.lock().unarchive_calls += 1;
        self.update(channel_id, |c| c.is_archived = false)
    }

    async fn set_purpose(&self, channel_id: &str, purpose: &str) -> Result<String> {
        self.lock().purpose_calls += 1;
        self.update(channel_id, |c| {
            c.purpose = purpose.to_string();
            c.purpose.clone()
        })
    }

    async fn post_message(&self, channel_id: &str, post: &OutgoingPost) -> Result<String> {
        let mut state = self.lock();
        if state.fail_posts {
            return Err(Error::api("chat.postMessage", "channel_is_archived"));
        }
        if !state.channels.iter().any(|c| c.id == channel_id) {
            return Err(Error::not_found(channel_id));
        }
        state.posts.push((channel_id.to_string(), post.clone()));
        let n = state.posts.len();
        Ok(format!("{}.{n:06}", 1_700_000_000 + n))
    }

    async fn list_channels(&self) -> Result<Vec<Channel>> {
        let mut state = self.lock();
        state.list_calls += 1;
        Ok(state.channels.clone())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_rejects_duplicate_names() {
        let channels = MemoryChannels::new();
        let first = channels.create_channel("contoso-dm").await.unwrap();
        assert_eq!(first.name, "contoso-dm");
        let err = channels.create_channel("contoso-dm").await.unwrap_err();
        assert!(matches!(err, Error::NameTaken { .. }));
        assert_eq!(channels.create_calls(), 2);
    }

    #[tokio::test]
    async fn posts_get_increasing_timestamps() {
        let channels = MemoryChannels::new();
        let ch = channels.create_channel("a").await.unwrap();
        let ts1 = channels.post_message(&ch.id, &OutgoingPost::new("1")).await.unwrap();
        let ts2 = channels.post_message(&ch.id, &OutgoingPost::new("2")).await.unwrap();
        assert!(ts2 > ts1);
        assert_eq!(channels.posts().len(), 2);
    }

    #[tokio::test]
    async fn unknown_channel_is_not_found() {
        let channels = MemoryChannels::new();
        let err = channels.channel_info("C404").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }
}
