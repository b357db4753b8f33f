#![allow(clippy::unwrap_used, clippy::expect_used)]
//! End-to-end credential lifecycle: browser handshake, code exchange,
//! persistence, and refresh after a restart.

use std::{sync::Arc, time::Duration};

use {
    feedbridge_oauth::{
        AuthConfig, AuthState, BrowserOpener, CredentialStore, Error, FileCredentialStore,
        TokenTransport, obtain_authorization_code,
    },
    secrecy::{ExposeSecret, Secret},
    serde_json::json,
};

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn config(server: &mockito::Server, port: u16) -> AuthConfig {
    AuthConfig {
        client_id: "cid".into(),
        client_secret: Secret::new("csecret".into()),
        auth_url: format!("{}/dialog/oauth", server.url()),
        token_url: format!("{}/oauth2/access_token.json", server.url()),
        redirect_url: format!("http://127.0.0.1:{port}"),
        scope: String::new(),
        access_type: "offline".into(),
        approval_prompt: String::new(),
    }
}

/// Plays the provider: approves and redirects back with the given code.
struct ApprovingBrowser;

impl BrowserOpener for ApprovingBrowser {
    fn open(&self, url: &str) -> std::io::Result<()> {
        let parsed = url::Url::parse(url).unwrap();
        let param = |key: &str| {
            parsed
                .query_pairs()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.into_owned())
                .unwrap()
        };
        let target = format!("{}?code=granted&state={}", param("redirect_uri"), param("state"));
        tokio::spawn(async move {
            let _ = reqwest::get(target).await;
        });
        Ok(())
    }
}

/// Redirects back with a state that was never issued.
struct ForgingBrowser;

impl BrowserOpener for ForgingBrowser {
    fn open(&self, url: &str) -> std::io::Result<()> {
        let parsed = url::Url::parse(url).unwrap();
        let redirect = parsed
            .query_pairs()
            .find(|(k, _)| k == "redirect_uri")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        tokio::spawn(async move {
            let _ = reqwest::get(format!("{redirect}?code=stolen&state=forged")).await;
        });
        Ok(())
    }
}

#[tokio::test]
async fn first_run_handshake_persists_and_restart_refreshes() {
    let mut server = mockito::Server::new_async().await;
    let exchange = server
        .mock("POST", "/oauth2/access_token.json")
        .match_body(mockito::Matcher::AllOf(vec![
            mockito::Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
            mockito::Matcher::UrlEncoded("code".into(), "granted".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({"access_token": {"token": "first"}, "refresh_token": "r1", "expires_in": 3600})
                .to_string(),
        )
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/oauth2/access_token.json")
        .match_body(mockito::Matcher::UrlEncoded(
            "refresh_token".into(),
            "r1".into(),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"access_token": "second", "expires_in": 3600}).to_string())
        .expect(1)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("credentials.json");
    let port = free_port();

    // First run: nothing stored, so authorize through the browser.
    let transport = TokenTransport::new(
        config(&server, port),
        Arc::new(FileCredentialStore::new(&path)),
    );
    assert!(!transport.load_stored().await.unwrap());
    let code = obtain_authorization_code(
        transport.flow(),
        port,
        Duration::from_secs(10),
        &ApprovingBrowser,
    )
    .await
    .unwrap();
    transport.exchange_code(&code).await.unwrap();
    exchange.assert_async().await;

    let on_disk: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(on_disk["AccessToken"], "first");
    assert_eq!(on_disk["RefreshToken"], "r1");

    // Simulate the token aging out while the process was down.
    let store = FileCredentialStore::new(&path);
    let stale = store
        .load()
        .unwrap()
        .unwrap()
        .with_expiry(chrono::Utc::now() - chrono::Duration::minutes(5));
    store.save(&stale).unwrap();

    // Restart: the stored token has expired and gets refreshed once.
    let restarted = TokenTransport::new(
        config(&server, port),
        Arc::new(FileCredentialStore::new(&path)),
    );
    assert!(restarted.load_stored().await.unwrap());
    assert_eq!(restarted.state().await, AuthState::Expired);
    assert_eq!(restarted.access_token().await.unwrap().expose_secret(), "second");
    assert_eq!(restarted.state().await, AuthState::Authenticated);
    refresh.assert_async().await;

    let saved = FileCredentialStore::new(&path).load().unwrap().unwrap();
    assert_eq!(saved.access_token.expose_secret(), "second");
    assert!(saved.has_refresh_token());
}

#[tokio::test]
async fn forged_state_is_rejected_without_exchange() {
    let mut server = mockito::Server::new_async().await;
    let exchange = server
        .mock("POST", mockito::Matcher::Any)
        .expect(0)
        .create_async()
        .await;
    let port = free_port();
    let transport = TokenTransport::new(
        config(&server, port),
        Arc::new(feedbridge_oauth::MemoryCredentialStore::new()),
    );

    let err = obtain_authorization_code(
        transport.flow(),
        port,
        Duration::from_secs(10),
        &ForgingBrowser,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::Redirect { .. }));
    assert_eq!(transport.state().await, AuthState::Unauthenticated);
    exchange.assert_async().await;
}
