use {
    chrono::{Duration, Utc},
    reqwest::StatusCode,
    secrecy::{ExposeSecret, Secret},
    tracing::{debug, warn},
};

use crate::{
    Error, Result,
    types::{AuthConfig, Token},
};

/// Talks to the provider's authorization and token endpoints.
pub struct OAuthFlow {
    config: AuthConfig,
    client: reqwest::Client,
}

/// Result of starting the authorization-code flow.
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
}

impl OAuthFlow {
    pub fn new(config: AuthConfig) -> Self {
        Self::with_client(config, reqwest::Client::new())
    }

    pub fn with_client(config: AuthConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Build the authorization URL with a fresh anti-forgery state.
    pub fn start(&self) -> Result<AuthorizationRequest> {
        let state = generate_state();
        let url = self.config.auth_code_url(&state)?;
        Ok(AuthorizationRequest { url, state })
    }

    /// Exchange an authorization code for a token. `previous` supplies the
    /// refresh token to keep when the provider does not issue a new one.
    pub async fn exchange(&self, code: &str, previous: Option<&Token>) -> Result<Token> {
        let form = vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", code.to_string()),
            ("redirect_uri", self.config.redirect_url.clone()),
            ("scope", self.config.scope.clone()),
        ];
        let resp = self.post_token_form(form).await?;
        parse_token_response(&resp, previous)
    }

    /// Renew `token` using its refresh token.
    pub async fn refresh(&self, token: &Token) -> Result<Token> {
        let refresh_token = token
            .refresh_token
            .as_ref()
            .filter(|t| !t.expose_secret().is_empty())
            .ok_or_else(|| Error::RefreshFailed {
                reason: "token expired and no refresh token is stored".into(),
            })?;
        let form = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.expose_secret().clone()),
        ];
        let resp = self.post_token_form(form).await?;
        parse_token_response(&resp, Some(token))
    }

    async fn post_token_form(
        &self,
        mut form: Vec<(&'static str, String)>,
    ) -> Result<serde_json::Value> {
        form.push(("client_id", self.config.client_id.clone()));
        form.push((
            "client_secret",
            self.config.client_secret.expose_secret().clone(),
        ));

        let grant = form.first().map(|(_, v)| v.clone()).unwrap_or_default();
        debug!(token_url = %self.config.token_url, grant = %grant, "token request");

        let response = self
            .client
            .post(&self.config.token_url)
            .basic_auth(
                &self.config.client_id,
                Some(self.config.client_secret.expose_secret()),
            )
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            warn!(token_url = %self.config.token_url, grant = %grant, %status, "token endpoint rejected request");
            return Err(Error::TokenEndpoint { status });
        }
        Ok(response.json::<serde_json::Value>().await?)
    }
}

/// Parse a token endpoint response.
///
/// `access_token` is accepted either as a plain string or as an object with a
/// `token` field (Yammer nests it that way). Missing `refresh_token` keeps the
/// one from `previous`; missing or zero `expires_in` means no expiry.
pub fn parse_token_response(resp: &serde_json::Value, previous: Option<&Token>) -> Result<Token> {
    let access = &resp["access_token"];
    let access_token = access
        .as_str()
        .or_else(|| access["token"].as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::message("missing access_token in response"))?
        .to_string();

    let refresh_token = resp["refresh_token"]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(|s| Secret::new(s.to_string()))
        .or_else(|| previous.and_then(|p| p.refresh_token.clone()));

    let expires_in = resp["expires_in"]
        .as_i64()
        .or_else(|| resp["expires_in"].as_str().and_then(|s| s.parse().ok()))
        .filter(|secs| *secs > 0);
    let expiry = expires_in.map(|secs| Utc::now() + Duration::seconds(secs));

    let mut extra = previous.map(|p| p.extra.clone()).unwrap_or_default();
    if let Some(id_token) = resp["id_token"].as_str().filter(|s| !s.is_empty()) {
        extra.insert("id_token".to_string(), id_token.to_string());
    }

    Ok(Token {
        access_token: Secret::new(access_token),
        refresh_token,
        expiry,
        extra,
    })
}

fn generate_state() -> String {
    let bytes: [u8; 16] = rand::random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
