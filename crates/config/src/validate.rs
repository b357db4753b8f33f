//! Startup checks over a loaded config.

use secrecy::ExposeSecret;

use crate::schema::FeedbridgeConfig;

/// Feed categories the source API can poll.
pub const KNOWN_CATEGORIES: &[&str] = &["inbox", "following", "received", "private"];

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Dotted path, e.g. "source.client_id"
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: {}", self.severity, self.path, self.message)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    fn push(&mut self, severity: Severity, path: &str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity,
            path: path.to_string(),
            message: message.into(),
        });
    }
}

fn is_unresolved(value: &str) -> bool {
    value.contains("${")
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("https://") || value.starts_with("http://")
}

fn is_loopback(url: &str) -> bool {
    ["http://localhost", "http://127.0.0.1", "http://[::1]"]
        .iter()
        .any(|p| url.starts_with(p))
}

pub fn validate(config: &FeedbridgeConfig) -> ValidationResult {
    let mut result = ValidationResult::default();
    let source = &config.source;

    if source.client_id.trim().is_empty() {
        result.push(Severity::Error, "source.client_id", "is required");
    }
    check_secret(&mut result, "source.client_secret", source.client_secret.as_ref());
    check_secret(&mut result, "destination.token", config.destination.token.as_ref());

    for (path, url) in [
        ("source.auth_url", &source.auth_url),
        ("source.token_url", &source.token_url),
        ("source.api_base", &source.api_base),
        ("destination.api_base", &config.destination.api_base),
    ] {
        if !is_http_url(url) {
            result.push(Severity::Error, path, format!("not an http(s) URL: {url:?}"));
        } else if url.starts_with("http://") && !is_loopback(url) {
            result.push(Severity::Warning, path, "credentials would travel over plain http");
        }
    }

    let relay = &config.relay;
    if relay.categories.is_empty() {
        result.push(Severity::Error, "relay.categories", "at least one feed category is required");
    }
    for category in &relay.categories {
        if !KNOWN_CATEGORIES.iter().any(|k| k.eq_ignore_ascii_case(category)) {
            result.push(
                Severity::Error,
                "relay.categories",
                format!("unknown category {category:?}, expected one of {KNOWN_CATEGORIES:?}"),
            );
        }
    }
    if relay.queue_capacity == 0 {
        result.push(Severity::Error, "relay.queue_capacity", "must be at least 1");
    }
    if relay.poll_interval_secs == 0 {
        result.push(
            Severity::Warning,
            "relay.poll_interval_secs",
            "0 polls without pause and will hit rate limits",
        );
    }
    if relay.limit == Some(0) {
        result.push(Severity::Warning, "relay.limit", "0 is ignored, the server default applies");
    }

    result
}

fn check_secret(
    result: &mut ValidationResult,
    path: &str,
    secret: Option<&secrecy::Secret<String>>,
) {
    match secret.map(|s| s.expose_secret().trim()) {
        None | Some("") => result.push(Severity::Error, path, "is required"),
        Some(value) if is_unresolved(value) => result.push(
            Severity::Error,
            path,
            "contains an unresolved ${...} placeholder",
        ),
        Some(_) => {},
    }
}
