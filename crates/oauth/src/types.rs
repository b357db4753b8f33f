use std::collections::BTreeMap;

use {
    chrono::{DateTime, Utc},
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Deserializer, Serialize},
    url::Url,
};

use crate::{Error, Result};

/// OAuth 2.0 client configuration for the source platform.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub client_id: String,
    #[serde(serialize_with = "serialize_secret")]
    pub client_secret: Secret<String>,
    pub auth_url: String,
    pub token_url: String,
    pub redirect_url: String,
    #[serde(default)]
    pub scope: String,
    /// `online` or `offline`; providers only issue refresh tokens for `offline`.
    #[serde(default)]
    pub access_type: String,
    /// `auto` or `force`.
    #[serde(default)]
    pub approval_prompt: String,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .field("redirect_url", &self.redirect_url)
            .finish_non_exhaustive()
    }
}

impl AuthConfig {
    /// URL the user visits to grant access. Existing query parameters on
    /// `auth_url` are preserved; empty optional values are left out.
    pub fn auth_code_url(&self, state: &str) -> Result<String> {
        let mut url = Url::parse(&self.auth_url)
            .map_err(|source| Error::external("invalid auth_url", source))?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.client_id)
                .append_pair("redirect_uri", &self.redirect_url);
            for (key, value) in [
                ("scope", self.scope.as_str()),
                ("state", state),
                ("access_type", self.access_type.as_str()),
                ("approval_prompt", self.approval_prompt.as_str()),
            ] {
                if !value.is_empty() {
                    query.append_pair(key, value);
                }
            }
        }
        Ok(url.to_string())
    }
}

/// An end-user token as persisted in the credential file.
///
/// Field names and the zero-time expiry encoding match the credential files
/// written by earlier releases, so existing installs keep their login.
#[derive(Clone, Serialize, Deserialize)]
pub struct Token {
    #[serde(rename = "AccessToken", serialize_with = "serialize_secret")]
    pub access_token: Secret<String>,
    #[serde(
        rename = "RefreshToken",
        default,
        serialize_with = "serialize_refresh",
        deserialize_with = "deserialize_refresh"
    )]
    pub refresh_token: Option<Secret<String>>,
    /// `None` means the token never expires.
    #[serde(rename = "Expiry", default, with = "zero_time")]
    pub expiry: Option<DateTime<Utc>>,
    #[serde(rename = "Extra", default, deserialize_with = "deserialize_extra")]
    pub extra: BTreeMap<String, String>,
}

impl Token {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: Secret::new(access_token.into()),
            refresh_token: None,
            expiry: None,
            extra: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(Secret::new(refresh_token.into()));
        self
    }

    #[must_use]
    pub fn with_expiry(mut self, expiry: DateTime<Utc>) -> Self {
        self.expiry = Some(expiry);
        self
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry.is_some_and(|expiry| expiry <= now)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token
            .as_ref()
            .is_some_and(|t| !t.expose_secret().is_empty())
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expiry", &self.expiry)
            .field("extra", &self.extra.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Observable credential lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    Unauthenticated,
    Authenticated,
    Expired,
    RefreshFailed,
}

// ── Serde helpers ───────────────────────────────────────────────────────────

/// Serialize a `Secret<String>` by exposing its inner value.
/// Use only for fields that must round-trip through storage.
pub fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

fn serialize_refresh<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.as_ref().map_or("", |s| s.expose_secret().as_str()))
}

fn deserialize_refresh<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<Secret<String>>, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.is_empty()).map(Secret::new))
}

fn deserialize_extra<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<BTreeMap<String, String>, D::Error> {
    Ok(Option::<BTreeMap<String, String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// `Option<DateTime<Utc>>` encoded as RFC 3339, with `None` written as the
/// zero instant `0001-01-01T00:00:00Z`.
mod zero_time {
    use {
        chrono::{DateTime, Datelike, SecondsFormat, Utc},
        serde::{Deserialize, Deserializer, Serializer, de::Error as _},
    };

    const ZERO: &str = "0001-01-01T00:00:00Z";

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(t) => serializer.serialize_str(&t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            None => serializer.serialize_str(ZERO),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        let Some(raw) = raw.filter(|s| !s.is_empty()) else {
            return Ok(None);
        };
        let parsed = DateTime::parse_from_rfc3339(&raw)
            .map_err(D::Error::custom)?
            .with_timezone(&Utc);
        if parsed.year() <= 1 {
            return Ok(None);
        }
        Ok(Some(parsed))
    }
}
