//! Feed polling and message relay.
//!
//! The producer polls each configured category from its watermark and hands
//! the batch to a consumer task over a bounded queue, then waits for the
//! batch to finish before moving on. The consumer posts messages oldest
//! first and reports the id of the last message of the leading run that went
//! through, which becomes the category's new watermark.

use std::{path::PathBuf, sync::Arc, time::Duration};

use {
    feedbridge_channels::{DestinationChannels, OutgoingPost},
    feedbridge_yammer::{FeedCategory, FeedSource, Message, MessageFeed, Reference, find_reference},
    tokio::sync::{Mutex, mpsc, oneshot},
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use crate::{
    Error, Result, resolver::ThreadChannelResolver, shorten::strip_forbidden,
    watermark::Watermarks,
};

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub categories: Vec<FeedCategory>,
    /// Page size per feed request; `None` leaves it to the server.
    pub limit: Option<u32>,
    pub poll_interval: Duration,
    /// Number of cycles to run; 0 runs until cancelled.
    pub loop_count: u64,
    pub queue_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            categories: vec![FeedCategory::Received, FeedCategory::Private],
            limit: None,
            poll_interval: Duration::from_secs(60),
            loop_count: 0,
            queue_capacity: 4,
        }
    }
}

/// What happened to one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub posted: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Id of the last message of the leading successful run.
    pub watermark: Option<i64>,
}

struct FeedBatch {
    category: FeedCategory,
    feed: MessageFeed,
    done: oneshot::Sender<Result<BatchReport>>,
}

enum Outcome {
    Posted,
    Skipped,
}

pub struct RelayLoop {
    source: Arc<dyn FeedSource>,
    destination: Arc<dyn DestinationChannels>,
    resolver: Arc<ThreadChannelResolver>,
    config: RelayConfig,
    watermarks: Mutex<Watermarks>,
    watermark_path: Option<PathBuf>,
}

impl RelayLoop {
    pub fn new(
        source: Arc<dyn FeedSource>,
        destination: Arc<dyn DestinationChannels>,
        resolver: Arc<ThreadChannelResolver>,
        config: RelayConfig,
        watermarks: Watermarks,
    ) -> Self {
        Self {
            source,
            destination,
            resolver,
            config,
            watermarks: Mutex::new(watermarks),
            watermark_path: None,
        }
    }

    /// Persist watermarks to `path` after every batch.
    #[must_use]
    pub fn with_watermark_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.watermark_path = Some(path.into());
        self
    }

    pub async fn watermarks(&self) -> Watermarks {
        self.watermarks.lock().await.clone()
    }

    /// Run cycles until the loop count is reached, `cancel` fires, or a
    /// fatal error occurs. Fatal and re-authorization errors are returned.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> Result<()> {
        let (tx, mut rx) = mpsc::channel::<FeedBatch>(self.config.queue_capacity.max(1));

        let consumer = {
            let this = Arc::clone(&self);
            tokio::spawn(async move {
                while let Some(batch) = rx.recv().await {
                    let report = this.process_batch(batch.category, batch.feed).await;
                    let _ = batch.done.send(report);
                }
            })
        };

        let result = self.produce(&tx, &cancel).await;
        drop(tx);
        if let Err(e) = consumer.await {
            error!(error = %e, "relay consumer task failed");
        }
        result
    }

    async fn produce(&self, tx: &mpsc::Sender<FeedBatch>, cancel: &CancellationToken) -> Result<()> {
        let mut cycle: u64 = 0;
        loop {
            if cancel.is_cancelled() {
                info!(cycle, "relay cancelled");
                return Ok(());
            }
            cycle += 1;
            debug!(cycle, "relay cycle starting");

            for &category in &self.config.categories {
                let Some(feed) = self.fetch(category).await? else {
                    continue;
                };
                if feed.messages.is_empty() {
                    continue;
                }
                let (done, wait) = oneshot::channel();
                tx.send(FeedBatch {
                    category,
                    feed,
                    done,
                })
                .await
                .map_err(|_| Error::message("relay consumer stopped"))?;
                let report = wait
                    .await
                    .map_err(|_| Error::message("relay consumer dropped a batch"))??;
                info!(
                    %category,
                    posted = report.posted,
                    skipped = report.skipped,
                    failed = report.failed,
                    watermark = ?report.watermark,
                    "batch relayed"
                );
            }

            if self.config.loop_count != 0 && cycle >= self.config.loop_count {
                info!(cycle, "loop count reached");
                return Ok(());
            }
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(cycle, "relay cancelled");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    /// `None` when the fetch failed in a way the next cycle may fix.
    async fn fetch(&self, category: FeedCategory) -> Result<Option<MessageFeed>> {
        let newer_than = self.watermarks.lock().await.get(category);
        match self.source.feed(category, newer_than, self.config.limit).await {
            Ok(feed) => {
                debug!(%category, ?newer_than, count = feed.messages.len(), "feed fetched");
                Ok(Some(feed))
            },
            Err(e) if e.needs_reauthorization() => Err(e.into()),
            Err(e) if e.is_rate_limited() => {
                warn!(%category, ?newer_than, "rate limited, retrying next cycle");
                Ok(None)
            },
            Err(e) => {
                warn!(%category, error = %e, "feed fetch failed");
                Ok(None)
            },
        }
    }

    /// Relay one batch and persist the advanced watermark.
    pub async fn process_batch(
        &self,
        category: FeedCategory,
        feed: MessageFeed,
    ) -> Result<BatchReport> {
        let MessageFeed {
            mut messages,
            references,
        } = feed;
        messages.sort_by_key(|m| m.id);

        let mut report = BatchReport::default();
        let mut leading_run = true;
        let mut aborted = None;
        for message in &messages {
            match self.relay_message(message, &references).await {
                Ok(Outcome::Posted) => report.posted += 1,
                Ok(Outcome::Skipped) => report.skipped += 1,
                Err(e) if e.is_fatal() || e.needs_reauth() => {
                    aborted = Some(e);
                    break;
                },
                Err(e) => {
                    warn!(
                        message_id = message.id,
                        thread_id = message.thread_id,
                        error = %e,
                        "message not relayed"
                    );
                    report.failed += 1;
                    leading_run = false;
                    continue;
                },
            }
            if leading_run {
                report.watermark = Some(message.id);
            }
        }

        // Messages posted before an abort must not be fetched again.
        let saved = self.save_watermark(category, report.watermark).await;
        match aborted {
            Some(e) => {
                if let Err(save_err) = saved {
                    error!(%category, error = %save_err, "watermark not saved after abort");
                }
                Err(e)
            },
            None => saved.map(|()| report),
        }
    }

    async fn save_watermark(&self, category: FeedCategory, id: Option<i64>) -> Result<()> {
        let Some(id) = id else {
            return Ok(());
        };
        let mut watermarks = self.watermarks.lock().await;
        if watermarks.advance(category, id)
            && let Some(path) = &self.watermark_path
        {
            watermarks.save(path).await?;
        }
        Ok(())
    }

    async fn relay_message(&self, message: &Message, references: &[Reference]) -> Result<Outcome> {
        if message.body.plain.is_empty() {
            return Ok(Outcome::Skipped);
        }
        let thread = self.resolver.resolve(message, references).await?;
        if message.id == message.thread_id {
            // The parent went out as the thread opener.
            return Ok(Outcome::Skipped);
        }

        let mut post = OutgoingPost::new(message.body.plain.clone());
        if let Some(sender) = find_reference(references, message.sender_id) {
            post.username = Some(strip_forbidden(sender.display_name()).trim().to_string())
                .filter(|n| !n.is_empty());
            post.icon_url = sender.mugshot_url.clone();
        }
        post.thread_ts = Some(thread.ts.clone()).filter(|ts| !ts.is_empty());
        self.destination.post_message(&thread.channel_id, &post).await?;
        debug!(message_id = message.id, channel = %thread.channel_name, "message posted");
        Ok(Outcome::Posted)
    }
}
