use std::{collections::HashMap, sync::Arc, time::Duration};

use {
    axum::{Router, extract::Query, http::StatusCode, response::Html},
    tokio::{net::TcpListener, sync::oneshot},
    tracing::{info, warn},
};

use crate::{Error, Result, browser::BrowserOpener, flow::OAuthFlow};

const CLOSE_PAGE: &str = "<!doctype html><html><head><meta charset=\"utf-8\"></head>\
<body onload=\"window.open('about:blank','_self').close();\">\
<h1>Authentication successful!</h1><p>You can close this window.</p></body></html>";

/// One-shot local HTTP listener that receives the OAuth redirect.
pub struct CallbackServer {
    listener: TcpListener,
}

impl CallbackServer {
    /// Bind `127.0.0.1:{port}`. Binding happens before the browser is opened
    /// so a fast redirect cannot arrive at a closed port.
    pub async fn bind(port: u16) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        info!(port, "listening for authorization redirect");
        Ok(Self { listener })
    }

    /// Wait for a redirect carrying `code` and a `state` equal to
    /// `expected_state`. Exactly one result is consumed; the listener is
    /// dropped when this returns, whether by result or by timeout.
    pub async fn wait_for_code(self, expected_state: String, timeout: Duration) -> Result<String> {
        let (tx, rx) = oneshot::channel::<Result<String>>();
        let tx = Arc::new(std::sync::Mutex::new(Some(tx)));

        let app = Router::new().fallback(move |Query(params): Query<HashMap<String, String>>| {
            let expected_state = expected_state.clone();
            let tx = Arc::clone(&tx);
            async move {
                // Unrelated requests (favicon etc.) must not consume the result.
                if !params.contains_key("code") && !params.contains_key("error") {
                    return (StatusCode::NOT_FOUND, Html("not found".to_string()));
                }
                let result = check_redirect(&params, &expected_state);
                let page = match &result {
                    Ok(_) => Html(CLOSE_PAGE.to_string()),
                    Err(e) => Html(format!("<h1>Authentication failed</h1><p>{e}</p>")),
                };
                if let Some(tx) = tx.lock().unwrap_or_else(|e| e.into_inner()).take() {
                    let _ = tx.send(result);
                }
                (StatusCode::OK, page)
            }
        });

        let server = axum::serve(self.listener, app);

        tokio::select! {
            result = rx => {
                result.map_err(|e| Error::external("callback channel closed", e))?
            }
            result = server.into_future() => {
                result?;
                Err(Error::message("callback server exited unexpectedly"))
            }
            _ = tokio::time::sleep(timeout) => {
                Err(Error::HandshakeTimeout { seconds: timeout.as_secs() })
            }
        }
    }
}

fn check_redirect(
    params: &HashMap<String, String>,
    expected_state: &str,
) -> std::result::Result<String, Error> {
    if let Some(error) = params.get("error") {
        let description = params.get("error_description").map_or("", String::as_str);
        return Err(Error::redirect(format!("{error} {description}").trim().to_string()));
    }
    let state = params.get("state").map_or("", String::as_str);
    if state != expected_state {
        return Err(Error::redirect("state mismatch"));
    }
    match params.get("code") {
        Some(code) if !code.is_empty() => Ok(code.clone()),
        _ => Err(Error::redirect("missing code")),
    }
}

/// Run the interactive handshake: listen, send the operator to the consent
/// page, and wait up to `timeout` for the redirect.
pub async fn obtain_authorization_code(
    flow: &OAuthFlow,
    port: u16,
    timeout: Duration,
    opener: &dyn BrowserOpener,
) -> Result<String> {
    let server = CallbackServer::bind(port).await?;
    let request = flow.start()?;

    if let Err(e) = opener.open(&request.url) {
        warn!(error = %e, "could not open browser");
        println!("Could not open browser. Please visit:\n{}", request.url);
    }

    info!(timeout_secs = timeout.as_secs(), "waiting for authorization redirect");
    let code = server.wait_for_code(request.state, timeout).await?;
    info!("authorization code received");
    Ok(code)
}
