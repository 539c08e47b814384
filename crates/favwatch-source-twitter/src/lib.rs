// # Twitter Favorites Feed Source
//
// This crate provides a FeedSource over the Twitter API v1.1
// `favorites/list` endpoint.
//
// ## Behavior
//
// - ✅ One HTTP request per fetch
// - ✅ HTTP status codes mapped to typed errors (401/403, 404, 429, 5xx)
// - ✅ Items returned in API order (newest first)
// - ✅ Display normalization of tweets (`full_text`, expanded links)
// - ❌ NO retry or backoff (owned by the daemon's schedule)
// - ❌ NO dedup or cutoff filtering (owned by PollEngine)
//
// ## Security Requirements
//
// - The bearer token NEVER appears in logs or Debug output
//
// ## API Reference
//
// - GET `/1.1/favorites/list.json?screen_name=..&count=..&tweet_mode=extended`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use favwatch_core::config::FeedSourceConfig;
use favwatch_core::registry::SourceRegistry;
use favwatch_core::traits::{FeedSource, FeedSourceFactory, FetchRequest, RemoteItem};
use favwatch_core::{Error, ItemId, Result};
use serde_json::{Map, Value};
use std::time::Duration;

/// Twitter API base URL
const TWITTER_API_BASE: &str = "https://api.twitter.com/1.1";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// `created_at` format used by the v1.1 API
const TWITTER_TIME_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// Feed source for a user's favorites (liked tweets)
pub struct TwitterFavoritesSource {
    /// ⚠️ NEVER log this value
    bearer_token: String,

    /// API base URL, without trailing slash
    api_base: String,

    /// HTTP client for API requests
    client: reqwest::Client,
}

// Custom Debug implementation that hides the bearer token
impl std::fmt::Debug for TwitterFavoritesSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwitterFavoritesSource")
            .field("bearer_token", &"<REDACTED>")
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl TwitterFavoritesSource {
    /// Create a source against the public API
    pub fn new(bearer_token: impl Into<String>) -> Result<Self> {
        Self::with_api_base(bearer_token, TWITTER_API_BASE)
    }

    /// Create a source against a custom API base (proxy or test server)
    pub fn with_api_base(bearer_token: impl Into<String>, api_base: impl Into<String>) -> Result<Self> {
        let bearer_token = bearer_token.into();
        if bearer_token.is_empty() {
            return Err(Error::config("Twitter bearer token cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            bearer_token,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn favorites_url(&self) -> String {
        format!("{}/favorites/list.json", self.api_base)
    }
}

#[async_trait]
impl FeedSource for TwitterFavoritesSource {
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<RemoteItem>> {
        tracing::debug!(
            "Fetching up to {} favorites of {}",
            request.count,
            request.username
        );

        let count = request.count.to_string();
        let response = self
            .client
            .get(self.favorites_url())
            .bearer_auth(&self.bearer_token)
            .query(&[
                ("screen_name", request.username.as_str()),
                ("count", count.as_str()),
                ("tweet_mode", request.mode.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::feed("twitter", format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(status_error(status.as_u16(), &request.username, &error_text));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::feed("twitter", format!("Failed to read response: {}", e)))?;

        let items = parse_favorites(&body)?;
        tracing::debug!("Received {} favorite(s) for {}", items.len(), request.username);
        Ok(items)
    }

    fn format(&self, item: &RemoteItem) -> Value {
        format_tweet(&item.payload)
    }

    fn source_name(&self) -> &'static str {
        "twitter"
    }
}

/// Map a non-success HTTP status to an error
fn status_error(status: u16, username: &str, body: &str) -> Error {
    match status {
        401 | 403 => Error::auth(format!(
            "Invalid or expired bearer token, or account is protected. Status: {}",
            status
        )),
        404 => Error::not_found(format!("User not found: {}", username)),
        429 => Error::rate_limited(format!("Rate limit exceeded. Status: {}", status)),
        500..=599 => Error::http(format!("Twitter server error (transient): {} - {}", status, body)),
        _ => Error::http(format!("Favorites request failed: {} - {}", status, body)),
    }
}

/// Decode a `favorites/list` response body
///
/// Order is preserved. Any tweet without a usable id or `created_at` fails
/// the whole page; the caller's seen buffer is then left as it was.
pub fn parse_favorites(body: &str) -> Result<Vec<RemoteItem>> {
    let json: Value = serde_json::from_str(body)
        .map_err(|e| Error::feed("twitter", format!("Failed to parse response: {}", e)))?;

    let tweets = json
        .as_array()
        .ok_or_else(|| Error::feed("twitter", "Invalid response format: expected an array of tweets"))?;

    tweets
        .iter()
        .enumerate()
        .map(|(index, tweet)| parse_tweet(index, tweet))
        .collect()
}

fn parse_tweet(index: usize, tweet: &Value) -> Result<RemoteItem> {
    let id = match (tweet.get("id_str").and_then(Value::as_str), tweet.get("id").and_then(Value::as_u64)) {
        (Some(id_str), _) if !id_str.is_empty() => ItemId::from(id_str),
        (_, Some(id)) => ItemId::from(id),
        _ => {
            return Err(Error::malformed_item(format!("Tweet at position {} has no id", index)));
        }
    };

    let raw_created_at = tweet
        .get("created_at")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::malformed_item(format!("Tweet {} has no created_at", id)))?;

    let created_at = parse_twitter_time(raw_created_at).ok_or_else(|| {
        Error::malformed_item(format!(
            "Tweet {} has unparseable created_at: {}",
            id, raw_created_at
        ))
    })?;

    Ok(RemoteItem {
        id,
        created_at,
        payload: tweet.clone(),
    })
}

/// Parse a v1.1 `created_at` value (`Mon Jun 02 00:38:12 +0000 2014`)
pub fn parse_twitter_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw, TWITTER_TIME_FORMAT)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Normalize a tweet for display
///
/// - `text` becomes the untruncated `full_text` (which is removed)
/// - `expanded_text` is `text` with t.co links replaced by their targets and
///   HTML entities decoded
/// - nested `retweeted_status` / `quoted_status` get the same treatment
pub fn format_tweet(tweet: &Value) -> Value {
    let Some(object) = tweet.as_object() else {
        return tweet.clone();
    };
    let mut object: Map<String, Value> = object.clone();

    if let Some(full_text) = object.remove("full_text") {
        object.insert("text".to_string(), full_text);
    }

    if let Some(text) = object.get("text").and_then(Value::as_str) {
        let expanded = expand_text(text, object.get("entities"));
        object.insert("expanded_text".to_string(), Value::String(expanded));
    }

    for nested in ["retweeted_status", "quoted_status"] {
        if let Some(inner) = object.get(nested).filter(|v| v.is_object()) {
            let formatted = format_tweet(inner);
            object.insert(nested.to_string(), formatted);
        }
    }

    Value::Object(object)
}

fn expand_text(text: &str, entities: Option<&Value>) -> String {
    let mut expanded = text.to_string();

    let urls = entities
        .and_then(|e| e.get("urls"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten();
    let media = entities
        .and_then(|e| e.get("media"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten();

    for entity in urls.chain(media) {
        let short = entity.get("url").and_then(Value::as_str);
        let long = entity.get("expanded_url").and_then(Value::as_str);
        if let (Some(short), Some(long)) = (short, long)
            && !short.is_empty()
        {
            expanded = expanded.replace(short, long);
        }
    }

    html_escape::decode_html_entities(&expanded).into_owned()
}

/// Factory for creating Twitter feed sources
pub struct TwitterFactory;

impl FeedSourceFactory for TwitterFactory {
    fn create(&self, config: &FeedSourceConfig) -> Result<Box<dyn FeedSource>> {
        match config {
            FeedSourceConfig::Twitter { bearer_token, api_base } => {
                let source = match api_base {
                    Some(base) => TwitterFavoritesSource::with_api_base(bearer_token.as_str(), base.as_str())?,
                    None => TwitterFavoritesSource::new(bearer_token.as_str())?,
                };
                Ok(Box::new(source))
            }
            _ => Err(Error::config("Invalid config for Twitter feed source")),
        }
    }
}

/// Register the Twitter feed source with a registry
pub fn register(registry: &SourceRegistry) {
    registry.register_feed_source("twitter", Box::new(TwitterFactory));
}
