use std::{path::Path, sync::Arc, time::Duration};

use {
    anyhow::Context,
    feedbridge_channels::DestinationChannels,
    feedbridge_config::FeedbridgeConfig,
    feedbridge_oauth::{FileCredentialStore, TokenTransport},
    feedbridge_relay::{RelayConfig, RelayLoop, ThreadCache, ThreadChannelResolver, Watermarks},
    feedbridge_slack::SlackClient,
    feedbridge_yammer::{FeedCategory, FeedSource, YammerClient},
    regex::Regex,
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
};

use crate::{
    Cli,
    auth::{auth_config, authorize, ensure_credentials},
};

const CREDENTIALS_FILE: &str = "credentials.json";
const CACHE_FILE: &str = "cache.json";
const WATERMARKS_FILE: &str = "watermarks.json";

fn relay_config(cli: &Cli, config: &FeedbridgeConfig) -> anyhow::Result<RelayConfig> {
    let categories = config
        .relay
        .categories
        .iter()
        .map(|c| c.parse::<FeedCategory>().map_err(anyhow::Error::msg))
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(RelayConfig {
        categories,
        limit: config.relay.limit.filter(|l| *l != 0),
        poll_interval: Duration::from_secs(cli.sleep.unwrap_or(config.relay.poll_interval_secs)),
        loop_count: cli.loop_count,
        queue_capacity: config.relay.queue_capacity,
    })
}

pub async fn run(cli: &Cli, config: &FeedbridgeConfig, data_dir: &Path) -> anyhow::Result<()> {
    let handshake = cli.handshake();
    let store = Arc::new(FileCredentialStore::new(data_dir.join(CREDENTIALS_FILE)));
    let transport = Arc::new(TokenTransport::new(
        auth_config(&config.source, cli.port)?,
        store,
    ));
    ensure_credentials(&transport, &handshake).await?;

    let source: Arc<dyn FeedSource> = Arc::new(YammerClient::with_base_url(
        Arc::clone(&transport),
        config.source.api_base.clone(),
    ));
    let token = config
        .destination
        .token
        .clone()
        .context("destination.token is required")?;
    let destination: Arc<dyn DestinationChannels> = Arc::new(SlackClient::with_base_url(
        token,
        config.destination.api_base.clone(),
    ));

    let cache_path = data_dir.join(CACHE_FILE);
    let cache = ThreadCache::load(&cache_path).await?;
    info!(
        threads = cache.thread_map.len(),
        networks = cache.networks.len(),
        "thread cache loaded"
    );
    let mut resolver = ThreadChannelResolver::new(Arc::clone(&source), Arc::clone(&destination), cache)?
        .with_cache_path(cache_path);
    if let Some(pattern) = config.relay.network_name_filter.as_deref() {
        let filter = Regex::new(pattern).context("relay.network_name_filter")?;
        resolver = resolver.with_network_filter(filter);
    }

    let watermark_path = data_dir.join(WATERMARKS_FILE);
    let watermarks = Watermarks::load(&watermark_path).await?;
    let relay_config = relay_config(cli, config)?;
    info!(
        categories = ?relay_config.categories,
        interval_secs = relay_config.poll_interval.as_secs(),
        loop_count = relay_config.loop_count,
        "relay starting"
    );
    let relay = Arc::new(
        RelayLoop::new(
            source,
            destination,
            Arc::new(resolver),
            relay_config,
            watermarks,
        )
        .with_watermark_path(watermark_path),
    );

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, stopping after the current batch");
                cancel.cancel();
            }
        });
    }

    loop {
        match Arc::clone(&relay).run(cancel.clone()).await {
            Ok(()) => {
                info!("relay stopped");
                return Ok(());
            },
            Err(e) if e.needs_reauth() => {
                warn!(error = %e, "credentials rejected, authorizing again");
                authorize(&transport, &handshake).await?;
            },
            Err(e) => return Err(e).context("relay failed"),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, clap::Parser};

    #[test]
    fn relay_config_merges_flags_and_file() {
        let cli = Cli::parse_from(["feedbridge", "--sleep", "5", "--loop-count", "3"]);
        let mut config = FeedbridgeConfig::default();
        config.relay.limit = Some(0);
        let relay = relay_config(&cli, &config).unwrap();
        assert_eq!(relay.categories, [FeedCategory::Received, FeedCategory::Private]);
        assert_eq!(relay.poll_interval, Duration::from_secs(5));
        assert_eq!(relay.loop_count, 3);
        assert_eq!(relay.limit, None);
    }

    #[test]
    fn unknown_category_is_rejected() {
        let cli = Cli::parse_from(["feedbridge"]);
        let mut config = FeedbridgeConfig::default();
        config.relay.categories = vec!["public".into()];
        assert!(relay_config(&cli, &config).is_err());
    }

    #[test]
    fn default_flags() {
        let cli = Cli::parse_from(["feedbridge"]);
        assert_eq!(cli.port, 8910);
        assert_eq!(cli.timeout, 180);
        assert_eq!(cli.loop_count, 0);
        assert!(cli.sleep.is_none());
        assert!(!cli.no_browser);
    }
}
