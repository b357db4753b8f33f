//! Bearer-token transport with lazy expiry detection and serialized refresh.

use std::sync::Arc;

use {
    secrecy::{ExposeSecret, Secret},
    tokio::sync::Mutex,
    tracing::{info, warn},
};

use crate::{
    Error, Result,
    flow::OAuthFlow,
    storage::CredentialStore,
    types::{AuthConfig, AuthState, Token},
};

struct Slot {
    token: Option<Token>,
    refresh_failed: bool,
}

/// Authenticates outbound calls to the source platform.
///
/// The token slot is guarded by an async mutex that stays held across a
/// refresh, so callers that notice expiry at the same time wait for the one
/// in-flight refresh instead of issuing their own.
pub struct TokenTransport {
    flow: OAuthFlow,
    store: Arc<dyn CredentialStore>,
    client: reqwest::Client,
    slot: Mutex<Slot>,
}

impl TokenTransport {
    pub fn new(config: AuthConfig, store: Arc<dyn CredentialStore>) -> Self {
        Self::with_client(config, store, reqwest::Client::new())
    }

    pub fn with_client(
        config: AuthConfig,
        store: Arc<dyn CredentialStore>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            flow: OAuthFlow::with_client(config, client.clone()),
            store,
            client,
            slot: Mutex::new(Slot {
                token: None,
                refresh_failed: false,
            }),
        }
    }

    pub fn config(&self) -> &AuthConfig {
        self.flow.config()
    }

    pub fn flow(&self) -> &OAuthFlow {
        &self.flow
    }

    /// HTTP client for building requests passed to [`Self::execute`].
    pub fn http(&self) -> &reqwest::Client {
        &self.client
    }

    pub async fn state(&self) -> AuthState {
        let slot = self.slot.lock().await;
        match (&slot.token, slot.refresh_failed) {
            (_, true) => AuthState::RefreshFailed,
            (None, false) => AuthState::Unauthenticated,
            (Some(token), false) if token.is_expired() => AuthState::Expired,
            (Some(_), false) => AuthState::Authenticated,
        }
    }

    /// Load the stored token, if any. Returns whether one was found.
    pub async fn load_stored(&self) -> Result<bool> {
        let Some(token) = self.store.load()? else {
            return Ok(false);
        };
        info!(expiry = ?token.expiry, "loaded stored credentials");
        let mut slot = self.slot.lock().await;
        slot.token = Some(token);
        slot.refresh_failed = false;
        Ok(true)
    }

    /// Complete the authorization-code grant and persist the result.
    pub async fn exchange_code(&self, code: &str) -> Result<()> {
        let mut slot = self.slot.lock().await;
        let previous = match slot.token.clone() {
            Some(token) => Some(token),
            None => match self.store.load() {
                Ok(stored) => stored,
                Err(e) => {
                    warn!(error = %e, "stored credentials unreadable, replacing them");
                    None
                },
            },
        };
        let token = self.flow.exchange(code, previous.as_ref()).await?;
        info!(expiry = ?token.expiry, "authorization code exchanged");
        slot.token = Some(token.clone());
        slot.refresh_failed = false;
        self.store.save(&token)
    }

    /// Current access token, refreshed first when it has expired.
    pub async fn access_token(&self) -> Result<Secret<String>> {
        let mut slot = self.slot.lock().await;
        if slot.refresh_failed {
            return Err(Error::RefreshFailed {
                reason: "credentials were rejected, authorize again".into(),
            });
        }
        let Some(token) = slot.token.clone() else {
            return Err(Error::Unauthenticated);
        };
        if !token.is_expired() {
            return Ok(token.access_token);
        }

        if !token.has_refresh_token() {
            warn!("token expired and no refresh token is stored");
            slot.refresh_failed = true;
            return Err(Error::RefreshFailed {
                reason: "token expired and no refresh token is stored".into(),
            });
        }

        match self.flow.refresh(&token).await {
            Ok(fresh) => {
                info!(expiry = ?fresh.expiry, "access token refreshed");
                let access = fresh.access_token.clone();
                slot.token = Some(fresh.clone());
                self.store.save(&fresh)?;
                Ok(access)
            },
            Err(Error::TokenEndpoint { status }) => {
                warn!(%status, "refresh rejected by token endpoint");
                slot.refresh_failed = true;
                Err(Error::RefreshFailed {
                    reason: format!("token endpoint returned {status}"),
                })
            },
            // Transport-level failure: stay in Expired and let the next call retry.
            Err(e) => Err(e),
        }
    }

    /// The API refused the current token. Calls fail with
    /// [`Error::RefreshFailed`] until the next [`Self::exchange_code`].
    pub async fn reject(&self) {
        let mut slot = self.slot.lock().await;
        if !slot.refresh_failed {
            warn!("access token rejected by the API");
        }
        slot.refresh_failed = true;
    }

    /// Send `request` with the bearer token attached. Never sends with a
    /// stale token: if the refresh fails the request is not attempted.
    pub async fn execute(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let token = self.access_token().await?;
        Ok(request.bearer_auth(token.expose_secret()).send().await?)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::storage::MemoryCredentialStore,
        chrono::{Duration, Utc},
        serde_json::json,
    };

    fn config(base: &str) -> AuthConfig {
        AuthConfig {
            client_id: "cid".into(),
            client_secret: Secret::new("csecret".into()),
            auth_url: format!("{base}/dialog/oauth"),
            token_url: format!("{base}/oauth2/access_token.json"),
            redirect_url: "http://localhost:8910".into(),
            scope: String::new(),
            access_type: "offline".into(),
            approval_prompt: String::new(),
        }
    }

    fn expired(refresh: Option<&str>) -> Token {
        let token = Token::new("stale").with_expiry(Utc::now() - Duration::minutes(5));
        match refresh {
            Some(r) => token.with_refresh_token(r),
            None => token,
        }
    }

    #[tokio::test]
    async fn starts_unauthenticated_without_stored_token() {
        let transport = TokenTransport::new(
            config("http://127.0.0.1:9"),
            Arc::new(MemoryCredentialStore::new()),
        );
        assert!(!transport.load_stored().await.unwrap());
        assert_eq!(transport.state().await, AuthState::Unauthenticated);
        assert!(matches!(
            transport.access_token().await.unwrap_err(),
            Error::Unauthenticated
        ));
    }

    #[tokio::test]
    async fn stored_valid_token_is_used_as_is() {
        let store = Arc::new(MemoryCredentialStore::with_token(Token::new("fresh")));
        let transport = TokenTransport::new(config("http://127.0.0.1:9"), store.clone());
        assert!(transport.load_stored().await.unwrap());
        assert_eq!(transport.state().await, AuthState::Authenticated);
        assert_eq!(transport.access_token().await.unwrap().expose_secret(), "fresh");
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn expired_token_refreshes_once_and_persists() {
        let mut server = mockito::Server::new_async().await;
        let refresh = server
            .mock("POST", "/oauth2/access_token.json")
            .match_body(mockito::Matcher::UrlEncoded(
                "grant_type".into(),
                "refresh_token".into(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"access_token": "renewed", "expires_in": 3600}).to_string())
            .expect(1)
            .create_async()
            .await;
        let protected = server
            .mock("GET", "/api/v1/networks/current.json")
            .match_header("authorization", "Bearer renewed")
            .with_status(200)
            .with_body("[]")
            .expect(1)
            .create_async()
            .await;

        let store = Arc::new(MemoryCredentialStore::with_token(expired(Some("r1"))));
        let transport = TokenTransport::new(config(&server.url()), store.clone());
        transport.load_stored().await.unwrap();
        assert_eq!(transport.state().await, AuthState::Expired);

        let request = transport
            .http()
            .get(format!("{}/api/v1/networks/current.json", server.url()));
        let response = transport.execute(request).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);

        assert_eq!(transport.state().await, AuthState::Authenticated);
        assert_eq!(store.save_count(), 1);
        let saved = store.load().unwrap().unwrap();
        assert_eq!(saved.access_token.expose_secret(), "renewed");
        assert_eq!(
            saved.refresh_token.as_ref().map(|s| s.expose_secret().as_str()),
            Some("r1")
        );
        refresh.assert_async().await;
        protected.assert_async().await;
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let mut server = mockito::Server::new_async().await;
        let refresh = server
            .mock("POST", "/oauth2/access_token.json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"access_token": "renewed", "expires_in": 3600}).to_string())
            .expect(1)
            .create_async()
            .await;

        let store = Arc::new(MemoryCredentialStore::with_token(expired(Some("r1"))));
        let transport = Arc::new(TokenTransport::new(config(&server.url()), store));
        transport.load_stored().await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let transport = Arc::clone(&transport);
            handles.push(tokio::spawn(async move { transport.access_token().await }));
        }
        for handle in handles {
            let token = handle.await.unwrap().unwrap();
            assert_eq!(token.expose_secret(), "renewed");
        }
        refresh.assert_async().await;
    }

    #[tokio::test]
    async fn expired_without_refresh_token_fails_without_network() {
        let mut server = mockito::Server::new_async().await;
        let protected = server
            .mock("GET", mockito::Matcher::Any)
            .expect(0)
            .create_async()
            .await;
        let token_endpoint = server
            .mock("POST", mockito::Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let store = Arc::new(MemoryCredentialStore::with_token(expired(None)));
        let transport = TokenTransport::new(config(&server.url()), store);
        transport.load_stored().await.unwrap();

        let request = transport.http().get(format!("{}/api/v1/x.json", server.url()));
        let err = transport.execute(request).await.unwrap_err();
        assert!(err.needs_reauthorization());
        assert_eq!(transport.state().await, AuthState::RefreshFailed);
        protected.assert_async().await;
        token_endpoint.assert_async().await;
    }

    #[tokio::test]
    async fn unreadable_store_does_not_block_exchange() {
        let mut server = mockito::Server::new_async().await;
        let exchange = server
            .mock("POST", "/oauth2/access_token.json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"access_token": "fresh", "refresh_token": "r2"}).to_string())
            .expect(1)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = Arc::new(crate::storage::FileCredentialStore::new(&path));
        let transport = TokenTransport::new(config(&server.url()), store.clone());
        assert!(transport.load_stored().await.is_err());

        transport.exchange_code("code").await.unwrap();
        assert_eq!(transport.state().await, AuthState::Authenticated);
        let saved = store.load().unwrap().unwrap();
        assert_eq!(saved.access_token.expose_secret(), "fresh");
        exchange.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_token_blocks_further_calls() {
        let store = Arc::new(MemoryCredentialStore::with_token(Token::new("revoked")));
        let transport = TokenTransport::new(config("http://127.0.0.1:9"), store);
        transport.load_stored().await.unwrap();

        transport.reject().await;
        assert_eq!(transport.state().await, AuthState::RefreshFailed);
        assert!(transport.access_token().await.unwrap_err().needs_reauthorization());
    }

    #[tokio::test]
    async fn rejected_refresh_is_terminal_until_exchange() {
        let mut server = mockito::Server::new_async().await;
        let rejected = server
            .mock("POST", "/oauth2/access_token.json")
            .match_body(mockito::Matcher::UrlEncoded(
                "grant_type".into(),
                "refresh_token".into(),
            ))
            .with_status(400)
            .expect(1)
            .create_async()
            .await;
        let exchange = server
            .mock("POST", "/oauth2/access_token.json")
            .match_body(mockito::Matcher::UrlEncoded(
                "grant_type".into(),
                "authorization_code".into(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"access_token": {"token": "new-login"}}).to_string())
            .create_async()
            .await;

        let store = Arc::new(MemoryCredentialStore::with_token(expired(Some("revoked"))));
        let transport = TokenTransport::new(config(&server.url()), store.clone());
        transport.load_stored().await.unwrap();

        assert!(transport.access_token().await.unwrap_err().needs_reauthorization());
        // No second refresh attempt while in RefreshFailed.
        assert!(transport.access_token().await.unwrap_err().needs_reauthorization());
        rejected.assert_async().await;

        transport.exchange_code("code-2").await.unwrap();
        assert_eq!(transport.state().await, AuthState::Authenticated);
        assert_eq!(transport.access_token().await.unwrap().expose_secret(), "new-login");
        // The old refresh token survives an exchange that did not issue one.
        let saved = store.load().unwrap().unwrap();
        assert_eq!(
            saved.refresh_token.as_ref().map(|s| s.expose_secret().as_str()),
            Some("revoked")
        );
        exchange.assert_async().await;
    }
}
