//! Thread-to-channel mapping persisted across restarts.

use std::{collections::BTreeMap, path::Path};

use {
    feedbridge_yammer::Network,
    serde::{Deserialize, Serialize},
};

use crate::{
    Result,
    persist::{read_json_or_default, write_json_atomic},
};

/// Destination-side identity of one source thread.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    #[serde(rename = "ChannelID")]
    pub channel_id: String,
    #[serde(rename = "ChannelName")]
    pub channel_name: String,
    /// Ordering token of the opening post; replies thread under it.
    #[serde(rename = "TS")]
    pub ts: String,
}

/// On-disk cache. Entries are never removed automatically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadCache {
    #[serde(rename = "Networks", default)]
    pub networks: Vec<Network>,
    #[serde(rename = "ThreadMap", default)]
    pub thread_map: BTreeMap<i64, Thread>,
}

impl ThreadCache {
    /// Empty cache when the file is missing.
    pub async fn load(path: &Path) -> Result<Self> {
        read_json_or_default(path).await
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self).await
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let mut cache = ThreadCache::default();
        cache.networks.push(Network {
            id: 1,
            name: "Contoso".into(),
        });
        cache.thread_map.insert(10, Thread {
            channel_id: "C0001".into(),
            channel_name: "contoso-engineebwl".into(),
            ts: "1700000001.000001".into(),
        });
        cache.save(&path).await.unwrap();

        assert_eq!(ThreadCache::load(&path).await.unwrap(), cache);
        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["ThreadMap"]["10"]["ChannelID"], "C0001");
        assert_eq!(raw["Networks"][0]["Name"], "Contoso");
    }

    #[tokio::test]
    async fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ThreadCache::load(&dir.path().join("absent.json")).await.unwrap();
        assert!(cache.thread_map.is_empty());
        assert!(cache.networks.is_empty());
    }

    #[tokio::test]
    async fn malformed_file_is_a_persist_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = ThreadCache::load(&path).await.unwrap_err();
        assert!(err.is_fatal());
    }
}
