// # Feed Source Trait
//
// Defines the interface for fetching a page of recent items from a remote feed.
//
// ## Implementations
//
// - Twitter favorites list: `favwatch-source-twitter` crate
//
// ## Usage
//
// ```rust,ignore
// use favwatch_core::traits::{FeedSource, FetchRequest, TweetMode};
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let source = /* FeedSource implementation */;
//
//     let items = source
//         .fetch(&FetchRequest::new("tectonic", 10, TweetMode::Extended))
//         .await?;
//     for item in &items {
//         println!("{} created at {}", item.id, item.created_at);
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::seen::ItemId;

/// One item returned by a feed
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteItem {
    /// Stable identifier, the sole dedup key
    pub id: ItemId,
    /// When the item was published
    pub created_at: DateTime<Utc>,
    /// Raw structured data
    pub payload: serde_json::Value,
}

impl RemoteItem {
    /// Create a new remote item
    pub fn new(id: impl Into<ItemId>, created_at: DateTime<Utc>, payload: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            created_at,
            payload,
        }
    }
}

/// How much text the remote API should return per tweet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TweetMode {
    /// Legacy 140-character `text` with truncation
    Compat,
    /// Untruncated `full_text`
    Extended,
}

impl TweetMode {
    /// Query-string value
    pub fn as_str(&self) -> &'static str {
        match self {
            TweetMode::Compat => "compat",
            TweetMode::Extended => "extended",
        }
    }
}

/// Parameters of a single fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Account whose feed is read
    pub username: String,
    /// Maximum number of items to return
    pub count: usize,
    /// Text mode
    pub mode: TweetMode,
}

impl FetchRequest {
    /// Create a new fetch request
    pub fn new(username: impl Into<String>, count: usize, mode: TweetMode) -> Self {
        Self {
            username: username.into(),
            count,
            mode,
        }
    }
}

/// Trait for feed source implementations
///
/// # Trust Level: Untrusted
///
/// Feed sources talk to remote APIs and must stay single-shot:
///
/// ## Allowed Capabilities
/// - ✅ Perform HTTP/HTTPS calls to their own endpoint
/// - ✅ Decode remote responses into [`RemoteItem`]s
/// - ✅ Normalize an item's payload for display ([`FeedSource::format`])
///
/// ## Forbidden Capabilities
/// - ❌ Retry or back off (owned by the caller's schedule)
/// - ❌ Filter out already-seen items (owned by `PollEngine`)
/// - ❌ Reorder items (the engine processes them in returned order)
/// - ❌ Touch the seen store
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch one page of items, in the API's native order
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<RemoteItem>)`: At most `request.count` items
    /// - `Err(Error)`: Network, authentication, rate-limit or decoding failure
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<RemoteItem>, crate::Error>;

    /// Build the event payload for a qualifying item
    ///
    /// The default passes the raw payload through unchanged.
    fn format(&self, item: &RemoteItem) -> serde_json::Value {
        item.payload.clone()
    }

    /// Get the source name (for logging/debugging)
    fn source_name(&self) -> &'static str;
}

/// Helper trait for constructing feed sources from configuration
pub trait FeedSourceFactory: Send + Sync {
    /// Create a FeedSource instance from configuration
    fn create(
        &self,
        config: &crate::config::FeedSourceConfig,
    ) -> Result<Box<dyn FeedSource>, crate::Error>;
}
