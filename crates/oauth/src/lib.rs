//! OAuth 2.0 credential lifecycle for the source platform: token exchange and
//! refresh, durable credential storage, the bearer-token transport, and the
//! interactive browser handshake.

pub mod browser;
pub mod callback_server;
pub mod error;
pub mod flow;
pub mod storage;
pub mod transport;
pub mod types;

pub use {
    browser::{BrowserOpener, ManualBrowser, SystemBrowser},
    callback_server::{CallbackServer, obtain_authorization_code},
    flow::{AuthorizationRequest, OAuthFlow, parse_token_response},
    storage::{CredentialStore, FileCredentialStore, MemoryCredentialStore},
    transport::TokenTransport,
    types::{AuthConfig, AuthState, Token, serialize_secret},
};

pub use error::{Error, Result};
