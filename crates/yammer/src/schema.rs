//! Wire types for the REST API. Unknown fields are ignored; everything the
//! API may send as `null` is optional.

use serde::{Deserialize, Serialize};

/// A tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    #[serde(rename = "ID", alias = "id")]
    pub id: i64,
    #[serde(rename = "Name", alias = "name", default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Body {
    pub plain: String,
    pub parsed: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Message {
    pub id: i64,
    pub thread_id: i64,
    pub sender_id: i64,
    pub replied_to_id: Option<i64>,
    pub group_id: Option<i64>,
    pub network_id: i64,
    pub body: Body,
    pub web_url: String,
    pub direct_message: bool,
}

impl Message {
    /// The message in reference form, for when a thread starter shows up in
    /// `messages` rather than `references`.
    pub fn to_reference(&self) -> Reference {
        Reference {
            kind: "message".into(),
            id: self.id,
            network_id: Some(self.network_id),
            replied_to_id: self.replied_to_id,
            sender_id: Some(self.sender_id),
            web_url: Some(self.web_url.clone()),
            body: Some(self.body.clone()),
            ..Reference::default()
        }
    }
}

/// Side-loaded object referenced from messages (user, group, message, thread).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Reference {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: i64,
    pub full_name: Option<String>,
    pub name: Option<String>,
    pub web_url: Option<String>,
    pub mugshot_url: Option<String>,
    pub network_id: Option<i64>,
    pub replied_to_id: Option<i64>,
    pub sender_id: Option<i64>,
    pub body: Option<Body>,
}

impl Reference {
    /// Human-readable name: `full_name`, falling back to `name`.
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.name.as_deref())
            .unwrap_or("")
    }

    pub fn is_thread_starter(&self) -> bool {
        self.kind == "message" && self.replied_to_id.unwrap_or(0) == 0
    }
}

/// Find a reference by id.
pub fn find_reference(references: &[Reference], id: i64) -> Option<&Reference> {
    references.iter().find(|r| r.id == id)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageFeed {
    pub messages: Vec<Message>,
    pub references: Vec<Reference>,
}

impl MessageFeed {
    /// The thread's originating message.
    pub fn thread_starter(&self) -> Option<Reference> {
        self.references
            .iter()
            .find(|r| r.is_thread_starter())
            .cloned()
            .or_else(|| {
                self.messages
                    .iter()
                    .find(|m| m.replied_to_id.unwrap_or(0) == 0)
                    .map(Message::to_reference)
            })
    }
}

/// Feed endpoints that can be polled with a `newer_than` cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FeedCategory {
    Inbox,
    Following,
    Received,
    Private,
}

impl FeedCategory {
    pub const ALL: [FeedCategory; 4] = [
        FeedCategory::Inbox,
        FeedCategory::Following,
        FeedCategory::Received,
        FeedCategory::Private,
    ];

    pub fn path(self) -> &'static str {
        match self {
            Self::Inbox => "messages/inbox.json",
            Self::Following => "messages/following.json",
            Self::Received => "messages/received.json",
            Self::Private => "messages/private.json",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inbox => "inbox",
            Self::Following => "following",
            Self::Received => "received",
            Self::Private => "private",
        }
    }
}

impl std::fmt::Display for FeedCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FeedCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown feed category: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THREAD_FEED: &str = r#"{
        "messages": [
            {"id": 11, "thread_id": 10, "sender_id": 2, "replied_to_id": 10, "group_id": 7,
             "network_id": 1, "body": {"plain": "reply", "parsed": "reply"},
             "web_url": "https://www.yammer.com/contoso/messages/11", "direct_message": false}
        ],
        "references": [
            {"type": "user", "id": 2, "full_name": "Ann Lee", "mugshot_url": "https://mug/2", "network_id": 1},
            {"type": "group", "id": 7, "full_name": "Engineering Team", "name": "engineering"},
            {"type": "message", "id": 10, "sender_id": 2, "network_id": 1, "replied_to_id": null,
             "web_url": "https://www.yammer.com/contoso/messages/10", "body": {"plain": "hello"}},
            {"type": "thread", "id": 10, "web_url": "https://www.yammer.com/contoso/threads/10"}
        ],
        "meta": {"older_available": false}
    }"#;

    #[test]
    fn parses_feed_and_finds_starter() {
        let feed: MessageFeed = serde_json::from_str(THREAD_FEED).unwrap();
        assert_eq!(feed.messages.len(), 1);
        let starter = feed.thread_starter().unwrap();
        assert_eq!(starter.id, 10);
        assert_eq!(starter.body.unwrap().plain, "hello");
        assert_eq!(starter.network_id, Some(1));
    }

    #[test]
    fn starter_falls_back_to_messages() {
        let feed = MessageFeed {
            messages: vec![Message {
                id: 5,
                thread_id: 5,
                network_id: 3,
                ..Message::default()
            }],
            references: Vec::new(),
        };
        let starter = feed.thread_starter().unwrap();
        assert_eq!(starter.id, 5);
        assert_eq!(starter.network_id, Some(3));
    }

    #[test]
    fn reply_references_are_not_starters() {
        let feed: MessageFeed = serde_json::from_str(
            r#"{"references": [{"type": "message", "id": 3, "replied_to_id": 1}]}"#,
        )
        .unwrap();
        assert!(feed.thread_starter().is_none());
    }

    #[test]
    fn display_name_prefers_full_name() {
        let feed: MessageFeed = serde_json::from_str(THREAD_FEED).unwrap();
        assert_eq!(find_reference(&feed.references, 7).unwrap().display_name(), "Engineering Team");
        assert_eq!(find_reference(&feed.references, 2).unwrap().display_name(), "Ann Lee");
        assert!(find_reference(&feed.references, 99).is_none());
    }

    #[test]
    fn network_reads_api_and_cache_spellings() {
        let api: Network = serde_json::from_str(r#"{"id": 1, "name": "Contoso", "permalink": "contoso"}"#).unwrap();
        let cached: Network = serde_json::from_str(r#"{"ID": 1, "Name": "Contoso"}"#).unwrap();
        assert_eq!(api, cached);
        assert_eq!(serde_json::to_value(&api).unwrap()["ID"], 1);
    }

    #[test]
    fn feed_category_parses_case_insensitively() {
        assert_eq!("Private".parse::<FeedCategory>().unwrap(), FeedCategory::Private);
        assert!("public".parse::<FeedCategory>().is_err());
    }
}
