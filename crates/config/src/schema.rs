//! Config schema: source platform (OAuth + API), destination platform, relay.

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

pub const DEFAULT_AUTH_URL: &str = "https://www.yammer.com/dialog/oauth";
pub const DEFAULT_TOKEN_URL: &str = "https://www.yammer.com/oauth2/access_token.json";
pub const DEFAULT_SOURCE_API: &str = "https://www.yammer.com/api/v1";
pub const DEFAULT_DESTINATION_API: &str = "https://slack.com/api";

/// Root config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbridgeConfig {
    pub source: SourceConfig,
    pub destination: DestinationConfig,
    pub relay: RelaySettings,
}

/// OAuth application registered with the source platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub client_id: String,
    #[serde(
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub client_secret: Option<Secret<String>>,
    pub auth_url: String,
    pub token_url: String,
    /// Defaults to `http://localhost:{port}` for the callback port in use.
    pub redirect_url: Option<String>,
    pub scope: String,
    pub access_type: String,
    pub approval_prompt: String,
    pub api_base: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: None,
            auth_url: DEFAULT_AUTH_URL.into(),
            token_url: DEFAULT_TOKEN_URL.into(),
            redirect_url: None,
            scope: String::new(),
            access_type: String::new(),
            approval_prompt: String::new(),
            api_base: DEFAULT_SOURCE_API.into(),
        }
    }
}

impl SourceConfig {
    pub fn redirect_url_for(&self, port: u16) -> String {
        self.redirect_url
            .clone()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| format!("http://localhost:{port}"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DestinationConfig {
    /// Bot token.
    #[serde(
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub token: Option<Secret<String>>,
    pub api_base: String,
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_base: DEFAULT_DESTINATION_API.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    /// Feed categories to poll: inbox, following, received, private.
    pub categories: Vec<String>,
    /// Messages per feed request. Unset leaves it to the server.
    pub limit: Option<u32>,
    pub poll_interval_secs: u64,
    /// Feed batches buffered between the poller and the poster.
    pub queue_capacity: usize,
    /// Regex whose matches are removed from network names before they
    /// become part of a channel name.
    pub network_name_filter: Option<String>,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            categories: vec!["received".into(), "private".into()],
            limit: None,
            poll_interval_secs: 60,
            queue_capacity: 4,
            network_name_filter: None,
        }
    }
}

fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}
