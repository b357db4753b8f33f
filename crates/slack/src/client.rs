use {
    async_trait::async_trait,
    feedbridge_channels::{Channel, DestinationChannels, Error, OutgoingPost, Result},
    reqwest::StatusCode,
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, de::DeserializeOwned},
    tracing::{debug, warn},
};

pub const DEFAULT_API_BASE: &str = "https://slack.com/api";

const LIST_PAGE_SIZE: &str = "200";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Purpose {
    value: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ApiChannel {
    id: String,
    name: String,
    is_archived: bool,
    is_member: bool,
    purpose: Purpose,
}

impl From<ApiChannel> for Channel {
    fn from(c: ApiChannel) -> Self {
        Self {
            id: c.id,
            name: c.name,
            is_archived: c.is_archived,
            is_member: c.is_member,
            purpose: c.purpose.value,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChannelResponse {
    channel: ApiChannel,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PurposeResponse {
    purpose: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PostResponse {
    ts: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ResponseMetadata {
    next_cursor: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ListResponse {
    channels: Vec<ApiChannel>,
    response_metadata: ResponseMetadata,
}

/// Bot-token client for the `conversations.*` and `chat.*` methods.
#[derive(Clone)]
pub struct SlackClient {
    http: reqwest::Client,
    token: Secret<String>,
    base_url: String,
}

impl std::fmt::Debug for SlackClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackClient")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl SlackClient {
    pub fn new(token: Secret<String>) -> Self {
        Self::with_base_url(token, DEFAULT_API_BASE)
    }

    pub fn with_base_url(token: Secret<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            token,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Call a Web API method and decode the `ok` envelope.
    async fn call<T: DeserializeOwned>(&self, method: &str, form: &[(&str, &str)]) -> Result<T> {
        debug!(method, "slack api call");
        let response = self
            .http
            .post(format!("{}/{method}", self.base_url))
            .bearer_auth(self.token.expose_secret())
            .form(form)
            .send()
            .await
            .map_err(|e| Error::external(format!("{method} request"), e))?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            warn!(method, "rate limited");
            return Err(Error::RateLimited {
                method: method.to_string(),
            });
        }
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::external(format!("{method} response"), e))?;

        if body.get("ok").and_then(serde_json::Value::as_bool) != Some(true) {
            let code = body
                .get("error")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("unknown_error")
                .to_string();
            return Err(classify(method, form, code));
        }
        Ok(serde_json::from_value(body)?)
    }
}

fn classify(method: &str, form: &[(&str, &str)], code: String) -> Error {
    let param = |key: &str| {
        form.iter()
            .find(|(k, _)| *k == key)
            .map_or("", |(_, v)| *v)
            .to_string()
    };
    match code.as_str() {
        "name_taken" => Error::name_taken(param("name")),
        "channel_not_found" => Error::not_found(param("channel")),
        "ratelimited" => Error::RateLimited {
            method: method.to_string(),
        },
        _ => {
            warn!(method, error = %code, "slack api error");
            Error::api(method, code)
        },
    }
}

#[async_trait]
impl DestinationChannels for SlackClient {
    async fn create_channel(&self, name: &str) -> Result<Channel> {
        if name.is_empty() {
            return Err(Error::invalid_input("channel name is empty"));
        }
        let resp: ChannelResponse = self.call("conversations.create", &[("name", name)]).await?;
        Ok(resp.channel.into())
    }

    async fn channel_info(&self, channel_id: &str) -> Result<Channel> {
        let resp: ChannelResponse = self
            .call("conversations.info", &[("channel", channel_id)])
            .await?;
        Ok(resp.channel.into())
    }

    async fn join_channel(&self, channel_id: &str) -> Result<Channel> {
        let resp: ChannelResponse = self
            .call("conversations.join", &[("channel", channel_id)])
            .await?;
        Ok(resp.channel.into())
    }

    async fn unarchive_channel(&self, channel_id: &str) -> Result<()> {
        match self
            .call::<serde_json::Value>("conversations.unarchive", &[("channel", channel_id)])
            .await
        {
            Ok(_) => Ok(()),
            Err(Error::Api { error, .. }) if error == "not_archived" => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn set_purpose(&self, channel_id: &str, purpose: &str) -> Result<String> {
        let resp: PurposeResponse = self
            .call("conversations.setPurpose", &[
                ("channel", channel_id),
                ("purpose", purpose),
            ])
            .await?;
        Ok(resp.purpose.unwrap_or_else(|| purpose.to_string()))
    }

    async fn post_message(&self, channel_id: &str, post: &OutgoingPost) -> Result<String> {
        let mut form = vec![("channel", channel_id), ("text", post.text.as_str())];
        if let Some(username) = post.username.as_deref() {
            form.push(("username", username));
        }
        if let Some(icon) = post.icon_url.as_deref() {
            form.push(("icon_url", icon));
        }
        if let Some(ts) = post.thread_ts.as_deref() {
            form.push(("thread_ts", ts));
        }
        let resp: PostResponse = self.call("chat.postMessage", &form).await?;
        Ok(resp.ts)
    }

    async fn list_channels(&self) -> Result<Vec<Channel>> {
        let mut channels = Vec::new();
        let mut cursor = String::new();
        loop {
            let mut form = vec![
                ("exclude_archived", "false"),
                ("limit", LIST_PAGE_SIZE),
            ];
            if !cursor.is_empty() {
                form.push(("cursor", cursor.as_str()));
            }
            let page: ListResponse = self.call("conversations.list", &form).await?;
            channels.extend(page.channels.into_iter().map(Channel::from));
            if page.response_metadata.next_cursor.is_empty() {
                break;
            }
            cursor = page.response_metadata.next_cursor;
        }
        debug!(count = channels.len(), "listed channels");
        Ok(channels)
    }
}
