//! Maps source threads to destination channels.
//!
//! A miss creates (or adopts) a channel, posts the thread's opening message
//! and persists the mapping before returning. Resolution of one thread id is
//! serialized by a keyed lock so a burst of replies to a brand-new thread
//! creates at most one channel; distinct threads resolve in parallel.

use std::{
    collections::{BTreeMap, HashMap},
    path::PathBuf,
    sync::Arc,
};

use {
    dashmap::DashMap,
    feedbridge_channels::{Channel, DestinationChannels, Error as ChannelError, OutgoingPost},
    feedbridge_yammer::{FeedSource, Message, Network, Reference, find_reference},
    regex::Regex,
    tokio::sync::{Mutex, RwLock},
    tracing::{debug, info, warn},
};

use crate::{
    Error, Result,
    cache::{Thread, ThreadCache},
    shorten::{NameShortener, strip_forbidden},
};

/// Group name used for direct-message threads.
pub const DIRECT_MESSAGE_GROUP: &str = "dm";

pub const CHANNEL_PART_LEN: usize = 10;
pub const CHANNEL_HASH_LEN: usize = 3;

/// Name → channel index of the destination, filled lazily from
/// `list_channels`.
#[derive(Default)]
struct ChannelDirectory {
    by_name: Mutex<Option<HashMap<String, Channel>>>,
}

impl ChannelDirectory {
    async fn find(&self, name: &str, destination: &dyn DestinationChannels) -> Result<Option<Channel>> {
        let mut by_name = self.by_name.lock().await;
        if by_name.is_none() {
            *by_name = Some(list(destination).await?);
        }
        Ok(by_name.as_ref().and_then(|m| m.get(name).cloned()))
    }

    async fn refresh(&self, name: &str, destination: &dyn DestinationChannels) -> Result<Option<Channel>> {
        let fresh = list(destination).await?;
        let found = fresh.get(name).cloned();
        *self.by_name.lock().await = Some(fresh);
        Ok(found)
    }

    async fn forget(&self, name: &str) {
        if let Some(map) = self.by_name.lock().await.as_mut() {
            map.remove(name);
        }
    }

    async fn insert(&self, channel: Channel) {
        if let Some(map) = self.by_name.lock().await.as_mut() {
            map.insert(channel.name.clone(), channel);
        }
    }
}

async fn list(destination: &dyn DestinationChannels) -> Result<HashMap<String, Channel>> {
    let channels = destination.list_channels().await?;
    debug!(count = channels.len(), "channel directory loaded");
    Ok(channels.into_iter().map(|c| (c.name.clone(), c)).collect())
}

pub struct ThreadChannelResolver {
    source: Arc<dyn FeedSource>,
    destination: Arc<dyn DestinationChannels>,
    shortener: NameShortener,
    network_filter: Option<Regex>,
    cache_path: Option<PathBuf>,
    threads: Mutex<BTreeMap<i64, Thread>>,
    networks: RwLock<Vec<Network>>,
    directory: ChannelDirectory,
    thread_locks: DashMap<i64, Arc<Mutex<()>>>,
    /// Held from snapshot to rename so cache writes land in order.
    persist_lock: Mutex<()>,
}

impl ThreadChannelResolver {
    pub fn new(
        source: Arc<dyn FeedSource>,
        destination: Arc<dyn DestinationChannels>,
        cache: ThreadCache,
    ) -> Result<Self> {
        Ok(Self {
            source,
            destination,
            shortener: NameShortener::new(CHANNEL_PART_LEN, CHANNEL_HASH_LEN)?,
            network_filter: None,
            cache_path: None,
            threads: Mutex::new(cache.thread_map),
            networks: RwLock::new(cache.networks),
            directory: ChannelDirectory::default(),
            thread_locks: DashMap::new(),
            persist_lock: Mutex::new(()),
        })
    }

    /// Persist the cache to `path` after every new mapping.
    #[must_use]
    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    /// Matches are removed from network names before shortening.
    #[must_use]
    pub fn with_network_filter(mut self, filter: Regex) -> Self {
        self.network_filter = Some(filter);
        self
    }

    pub async fn cached(&self, thread_id: i64) -> Option<Thread> {
        self.threads.lock().await.get(&thread_id).cloned()
    }

    pub async fn snapshot(&self) -> ThreadCache {
        ThreadCache {
            networks: self.networks.read().await.clone(),
            thread_map: self.threads.lock().await.clone(),
        }
    }

    /// Destination channel name for a network/group pair.
    pub fn channel_name(&self, network_name: &str, group_name: &str) -> String {
        let network = match &self.network_filter {
            Some(re) => re.replace_all(network_name, "").trim().to_string(),
            None => network_name.trim().to_string(),
        };
        format!(
            "{}-{}",
            self.shortener.shorten(&network),
            self.shortener.shorten(group_name)
        )
        .to_lowercase()
    }

    pub async fn resolve(&self, message: &Message, references: &[Reference]) -> Result<Thread> {
        let thread_id = message.thread_id;
        let lock = Arc::clone(&self.thread_locks.entry(thread_id).or_default());
        let result = {
            let _guard = lock.lock().await;
            self.resolve_locked(message, references).await
        };
        // Drop the entry once no other task holds or waits on it.
        self.thread_locks
            .remove_if(&thread_id, |_, l| Arc::strong_count(l) <= 2);
        result
    }

    async fn resolve_locked(&self, message: &Message, references: &[Reference]) -> Result<Thread> {
        let thread_id = message.thread_id;
        if let Some(thread) = self.cached(thread_id).await {
            debug!(thread_id, channel = %thread.channel_name, "thread cache hit");
            self.ensure_ready(&thread.channel_id, thread_id, None).await?;
            return Ok(thread);
        }
        self.open_thread(message, references).await
    }

    async fn open_thread(&self, message: &Message, references: &[Reference]) -> Result<Thread> {
        let thread_id = message.thread_id;
        let thread_feed = self.source.thread_feed(thread_id).await?;
        let parent = thread_feed
            .thread_starter()
            .ok_or(Error::ParentNotFound { thread_id })?;

        let network_id = parent.network_id.unwrap_or(message.network_id);
        let network = self.network(network_id).await?;

        let lookup = |id: i64| {
            find_reference(references, id).or_else(|| find_reference(&thread_feed.references, id))
        };
        let group_name = match message.group_id {
            Some(group_id) if !message.direct_message => lookup(group_id)
                .map(|g| g.display_name().to_string())
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| group_id.to_string()),
            _ => DIRECT_MESSAGE_GROUP.to_string(),
        };
        let name = self.channel_name(&network.name, &group_name);
        info!(thread_id, network = %network.name, group = %group_name, channel = %name, "opening thread");

        let parent_url = parent.web_url.clone().unwrap_or_default();
        let mut channel = self.find_or_create(&name).await?;
        let ready = self.ensure_ready(&channel.id, thread_id, Some(&parent_url)).await;
        match ready {
            Err(Error::Destination(ChannelError::NotFound { .. })) => {
                warn!(channel = %name, id = %channel.id, "listed channel is gone, creating it again");
                self.directory.forget(&name).await;
                channel = self.find_or_create(&name).await?;
                self.ensure_ready(&channel.id, thread_id, Some(&parent_url)).await?;
            },
            other => other?,
        }

        let body = parent.body.as_ref().map_or("", |b| b.plain.as_str());
        let mut opener = OutgoingPost::new(format!("{body}\nsee: {parent_url}"));
        if let Some(sender) = parent.sender_id.and_then(lookup) {
            opener.username = Some(strip_forbidden(sender.display_name()).trim().to_string())
                .filter(|n| !n.is_empty());
            opener.icon_url = sender.mugshot_url.clone();
        }
        let ts = self.destination.post_message(&channel.id, &opener).await?;

        let thread = Thread {
            channel_id: channel.id,
            channel_name: channel.name,
            ts,
        };
        self.threads.lock().await.insert(thread_id, thread.clone());
        if let Err(e) = self.persist().await {
            self.threads.lock().await.remove(&thread_id);
            return Err(e);
        }
        info!(thread_id, channel = %thread.channel_name, ts = %thread.ts, "thread opened");
        Ok(thread)
    }

    async fn persist(&self) -> Result<()> {
        let Some(path) = &self.cache_path else {
            return Ok(());
        };
        let _writing = self.persist_lock.lock().await;
        self.snapshot().await.save(path).await
    }

    /// Look up a network, refreshing the whole list once on a miss.
    async fn network(&self, id: i64) -> Result<Network> {
        if let Some(found) = self.networks.read().await.iter().find(|n| n.id == id) {
            return Ok(found.clone());
        }
        let mut networks = self.networks.write().await;
        if let Some(found) = networks.iter().find(|n| n.id == id) {
            return Ok(found.clone());
        }
        info!(network_id = id, "network not cached, refreshing");
        *networks = self.source.networks().await?;
        networks
            .iter()
            .find(|n| n.id == id)
            .cloned()
            .ok_or(Error::UnknownNetwork { network_id: id })
    }

    async fn find_or_create(&self, name: &str) -> Result<Channel> {
        if let Some(existing) = self.directory.find(name, &*self.destination).await? {
            debug!(channel = %name, id = %existing.id, "reusing existing channel");
            return Ok(existing);
        }
        match self.destination.create_channel(name).await {
            Ok(channel) => {
                info!(channel = %channel.name, id = %channel.id, "channel created");
                self.directory.insert(channel.clone()).await;
                Ok(channel)
            },
            Err(ChannelError::NameTaken { .. }) => {
                warn!(channel = %name, "channel already exists, adopting it");
                self.directory
                    .refresh(name, &*self.destination)
                    .await?
                    .ok_or_else(|| ChannelError::not_found(name).into())
            },
            Err(e) => Err(e.into()),
        }
    }

    /// Unarchive, join and set the purpose as needed. The purpose is the
    /// parent's URL; on a cache hit it is only looked up when missing.
    async fn ensure_ready(
        &self,
        channel_id: &str,
        thread_id: i64,
        parent_url: Option<&str>,
    ) -> Result<()> {
        let mut channel = self.destination.channel_info(channel_id).await?;
        if channel.is_archived {
            info!(channel = %channel.name, "unarchiving channel");
            self.destination.unarchive_channel(channel_id).await?;
        }
        if !channel.is_member {
            info!(channel = %channel.name, "joining channel");
            channel = self.destination.join_channel(channel_id).await?;
        }
        if !channel.purpose.is_empty() {
            return Ok(());
        }
        let url = match parent_url {
            Some(url) => url.to_string(),
            None => self.parent_url(thread_id).await,
        };
        if !url.is_empty() {
            self.destination.set_purpose(channel_id, &url).await?;
        }
        Ok(())
    }

    /// Parent URL of a thread, or empty when it cannot be fetched. A missing
    /// purpose is cosmetic and must not hold up relaying.
    async fn parent_url(&self, thread_id: i64) -> String {
        match self.source.thread_feed(thread_id).await {
            Ok(feed) => feed
                .thread_starter()
                .and_then(|parent| parent.web_url)
                .unwrap_or_default(),
            Err(e) => {
                warn!(thread_id, error = %e, "could not fetch thread parent for channel purpose");
                String::new()
            },
        }
    }
}
