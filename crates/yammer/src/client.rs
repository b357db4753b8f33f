use std::sync::Arc;

use {
    async_trait::async_trait,
    feedbridge_oauth::TokenTransport,
    reqwest::{Method, StatusCode},
    serde::de::DeserializeOwned,
    tracing::{debug, warn},
};

use crate::{
    Error, Result,
    schema::{FeedCategory, MessageFeed, Network},
};

pub const DEFAULT_API_BASE: &str = "https://www.yammer.com/api/v1";

/// Read side of the source platform consumed by the relay.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Messages in `category` newer than `newer_than`, newest first.
    async fn feed(
        &self,
        category: FeedCategory,
        newer_than: Option<i64>,
        limit: Option<u32>,
    ) -> Result<MessageFeed>;

    /// All messages of one thread plus their references.
    async fn thread_feed(&self, thread_id: i64) -> Result<MessageFeed>;

    /// Networks visible to the authenticated user.
    async fn networks(&self) -> Result<Vec<Network>>;
}

/// Where a posted message goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageTarget {
    RepliedTo(i64),
    Group(i64),
    DirectTo(i64),
}

impl MessageTarget {
    fn form_pair(self) -> (&'static str, String) {
        match self {
            Self::RepliedTo(id) => ("replied_to_id", id.to_string()),
            Self::Group(id) => ("group_id", id.to_string()),
            Self::DirectTo(id) => ("direct_to_id", id.to_string()),
        }
    }
}

/// REST client authenticated through [`TokenTransport`].
#[derive(Clone)]
pub struct YammerClient {
    transport: Arc<TokenTransport>,
    base_url: String,
}

impl YammerClient {
    pub fn new(transport: Arc<TokenTransport>) -> Self {
        Self::with_base_url(transport, DEFAULT_API_BASE)
    }

    pub fn with_base_url(transport: Arc<TokenTransport>, base_url: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn transport(&self) -> &Arc<TokenTransport> {
        &self.transport
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    async fn send(
        &self,
        endpoint: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response> {
        let response = self.transport.execute(request).await?;
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!(endpoint, "rate limited");
            return Err(Error::RateLimited {
                endpoint: endpoint.to_string(),
            });
        }
        if status == StatusCode::UNAUTHORIZED {
            self.transport.reject().await;
            return Err(Error::Rejected {
                endpoint: endpoint.to_string(),
            });
        }
        if !status.is_success() {
            warn!(endpoint, %status, "request failed");
            return Err(Error::Status {
                endpoint: endpoint.to_string(),
                status,
            });
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        debug!(path, ?query, "GET");
        let request = self
            .transport
            .http()
            .request(Method::GET, self.url(path))
            .query(query);
        let response = self.send(path, request).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Post `body` to a thread, group, or user.
    pub async fn send_message(&self, target: MessageTarget, body: &str) -> Result<MessageFeed> {
        let path = "messages.json";
        let (key, value) = target.form_pair();
        let request = self
            .transport
            .http()
            .post(self.url(path))
            .form(&[(key, value), ("body", body.to_string())]);
        let response = self.send(path, request).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Stop following a thread so it no longer shows up in the inbox.
    pub async fn unfollow_thread(&self, thread_id: i64) -> Result<()> {
        let path = format!("threads/{thread_id}/follow.json");
        let request = self.transport.http().delete(self.url(&path));
        self.send(&path, request).await?;
        Ok(())
    }
}

#[async_trait]
impl FeedSource for YammerClient {
    async fn feed(
        &self,
        category: FeedCategory,
        newer_than: Option<i64>,
        limit: Option<u32>,
    ) -> Result<MessageFeed> {
        let mut query = Vec::new();
        if let Some(id) = newer_than.filter(|id| *id != 0) {
            query.push(("newer_than", id.to_string()));
        }
        if let Some(limit) = limit.filter(|l| *l != 0) {
            query.push(("limit", limit.to_string()));
        }
        self.get_json(category.path(), &query).await
    }

    async fn thread_feed(&self, thread_id: i64) -> Result<MessageFeed> {
        self.get_json(&format!("messages/in_thread/{thread_id}.json"), &[])
            .await
    }

    async fn networks(&self) -> Result<Vec<Network>> {
        self.get_json("networks/current.json", &[]).await
    }
}
