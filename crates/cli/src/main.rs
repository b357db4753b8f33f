use std::{path::PathBuf, time::Duration};

use {
    anyhow::Context,
    clap::Parser,
    feedbridge_config::{FeedbridgeConfig, Severity},
    tracing::{error, info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

mod app;
mod auth;

#[derive(Parser)]
#[command(name = "feedbridge", version, about = "feedbridge: relay Yammer threads into Slack channels")]
struct Cli {
    /// Shortcut for `--log-level debug`.
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, default_value_t = false)]
    json_logs: bool,

    /// Local port receiving the OAuth redirect.
    #[arg(long, env = "FEEDBRIDGE_PORT", default_value_t = 8910)]
    port: u16,

    /// Seconds to wait for browser authorization.
    #[arg(long, default_value_t = 180)]
    timeout: u64,

    /// Poll cycles to run; 0 runs until interrupted.
    #[arg(long, default_value_t = 0)]
    loop_count: u64,

    /// Seconds between poll cycles (overrides relay.poll_interval_secs, 60 by default).
    #[arg(long)]
    sleep: Option<u64>,

    /// Config file (default: discovered feedbridge.{toml,yaml,yml,json}).
    #[arg(long, env = "FEEDBRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Directory for credentials, thread cache and watermarks.
    #[arg(long, env = "FEEDBRIDGE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Print the authorization URL instead of opening a browser.
    #[arg(long, default_value_t = false)]
    no_browser: bool,
}

impl Cli {
    fn handshake(&self) -> auth::HandshakeOptions {
        auth::HandshakeOptions {
            port: self.port,
            timeout: Duration::from_secs(self.timeout),
            no_browser: self.no_browser,
        }
    }
}

fn init_telemetry(cli: &Cli) {
    let level: &str = if cli.debug {
        "debug"
    } else {
        &cli.log_level
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<FeedbridgeConfig> {
    let config = match &cli.config {
        Some(path) => feedbridge_config::load_config(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => feedbridge_config::discover_and_load(),
    };

    let result = feedbridge_config::validate(&config);
    for d in &result.diagnostics {
        match d.severity {
            Severity::Error => error!(path = %d.path, "{}", d.message),
            Severity::Warning => warn!(path = %d.path, "{}", d.message),
        }
    }
    if result.has_errors() {
        anyhow::bail!(
            "invalid configuration: {} error(s)",
            result.count(Severity::Error)
        );
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "feedbridge starting");

    let config = load_config(&cli)?;
    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(feedbridge_config::data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating {}", data_dir.display()))?;
    info!(data_dir = %data_dir.display(), "using data directory");

    app::run(&cli, &config, &data_dir).await
}
