use std::time::Duration;

use {
    anyhow::Context,
    feedbridge_config::SourceConfig,
    feedbridge_oauth::{
        AuthConfig, AuthState, BrowserOpener, ManualBrowser, SystemBrowser, TokenTransport,
        obtain_authorization_code,
    },
    tracing::info,
};

pub struct HandshakeOptions {
    pub port: u16,
    pub timeout: Duration,
    pub no_browser: bool,
}

pub fn auth_config(source: &SourceConfig, port: u16) -> anyhow::Result<AuthConfig> {
    Ok(AuthConfig {
        client_id: source.client_id.clone(),
        client_secret: source
            .client_secret
            .clone()
            .context("source.client_secret is required")?,
        auth_url: source.auth_url.clone(),
        token_url: source.token_url.clone(),
        redirect_url: source.redirect_url_for(port),
        scope: source.scope.clone(),
        access_type: source.access_type.clone(),
        approval_prompt: source.approval_prompt.clone(),
    })
}

/// Run the browser handshake and exchange the code.
pub async fn authorize(transport: &TokenTransport, opts: &HandshakeOptions) -> anyhow::Result<()> {
    let opener: &dyn BrowserOpener = if opts.no_browser {
        &ManualBrowser
    } else {
        &SystemBrowser
    };
    let code = obtain_authorization_code(transport.flow(), opts.port, opts.timeout, opener)
        .await
        .context("authorization handshake failed")?;
    transport
        .exchange_code(&code)
        .await
        .context("exchanging authorization code")?;
    info!("authorized");
    Ok(())
}

/// Use stored credentials when they can still be used or refreshed;
/// otherwise authorize interactively.
pub async fn ensure_credentials(
    transport: &TokenTransport,
    opts: &HandshakeOptions,
) -> anyhow::Result<()> {
    if transport
        .load_stored()
        .await
        .context("loading stored credentials")?
    {
        match transport.state().await {
            AuthState::Authenticated | AuthState::Expired => return Ok(()),
            state => info!(?state, "stored credentials unusable"),
        }
    } else {
        info!("no stored credentials");
    }
    authorize(transport, opts).await
}
