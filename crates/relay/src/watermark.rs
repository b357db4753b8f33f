//! Per-category "newest processed message id" cursors.

use std::{collections::BTreeMap, path::Path};

use {
    feedbridge_yammer::FeedCategory,
    serde::{Deserialize, Serialize},
};

use crate::{
    Result,
    persist::{read_json_or_default, write_json_atomic},
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Watermarks(BTreeMap<FeedCategory, i64>);

impl Watermarks {
    pub fn get(&self, category: FeedCategory) -> Option<i64> {
        self.0.get(&category).copied()
    }

    /// Move the cursor forward. Older ids are ignored.
    pub fn advance(&mut self, category: FeedCategory, id: i64) -> bool {
        match self.0.get(&category) {
            Some(current) if *current >= id => false,
            _ => {
                self.0.insert(category, id);
                true
            },
        }
    }

    pub async fn load(path: &Path) -> Result<Self> {
        read_json_or_default(path).await
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self).await
    }
}
