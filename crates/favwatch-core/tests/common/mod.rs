//! Test doubles and common utilities for engine contract tests

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use favwatch_core::error::{Error, Result};
use favwatch_core::traits::{EventSink, FeedSource, FetchRequest, OutputEvent, RemoteItem};
use favwatch_core::{AgentConfig, MemorySeenStore, PollEngine};
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

/// Seconds since the epoch as a UTC timestamp
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

/// A tweet-like item with id `id` created at `secs`
pub fn tweet(id: u64, secs: i64) -> RemoteItem {
    RemoteItem::new(
        id,
        at(secs),
        serde_json::json!({ "id": id, "id_str": id.to_string(), "text": format!("tweet {}", id) }),
    )
}

/// One scripted response
enum Response {
    Items(Vec<RemoteItem>),
    Fail(fn() -> Error),
}

/// A FeedSource that replays scripted pages
///
/// Once the script is exhausted the last page keeps being returned, which is
/// what an idle favorites list looks like.
#[derive(Clone)]
pub struct ScriptedFeedSource {
    script: Arc<Mutex<VecDeque<Response>>>,
    last_page: Arc<Mutex<Vec<RemoteItem>>>,
    requests: Arc<Mutex<Vec<FetchRequest>>>,
    fetch_count: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl ScriptedFeedSource {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            last_page: Arc::new(Mutex::new(Vec::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            fetch_count: Arc::new(AtomicUsize::new(0)),
            delay: None,
        }
    }

    /// A source that always returns `items`
    pub fn returning(items: Vec<RemoteItem>) -> Self {
        let source = Self::new();
        source.push_page(items);
        source
    }

    /// Sleep this long inside every fetch (to widen race windows)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a page for the next fetch
    pub fn push_page(&self, items: Vec<RemoteItem>) {
        self.script.lock().unwrap().push_back(Response::Items(items));
    }

    /// Queue a failure for the next fetch
    pub fn push_failure(&self, make: fn() -> Error) {
        self.script.lock().unwrap().push_back(Response::Fail(make));
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl FeedSource for ScriptedFeedSource {
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<RemoteItem>> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Response::Items(items)) => {
                *self.last_page.lock().unwrap() = items.clone();
                Ok(items)
            }
            Some(Response::Fail(make)) => Err(make()),
            None => Ok(self.last_page.lock().unwrap().clone()),
        }
    }

    fn format(&self, item: &RemoteItem) -> serde_json::Value {
        let mut payload = item.payload.clone();
        payload["formatted"] = serde_json::Value::Bool(true);
        payload
    }

    fn source_name(&self) -> &'static str {
        "scripted"
    }
}

/// An EventSink that records everything it receives
#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<OutputEvent>>>,
    fail_after: Option<usize>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that accepts `n` events and then fails
    pub fn failing_after(n: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            fail_after: Some(n),
        }
    }

    pub fn events(&self) -> Vec<OutputEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Emitted ids, in order
    pub fn ids(&self) -> Vec<String> {
        self.events().iter().map(|e| e.id.to_string()).collect()
    }
}

#[async_trait::async_trait]
impl EventSink for RecordingSink {
    async fn emit(&self, event: OutputEvent) -> Result<()> {
        let mut events = self.events.lock().unwrap();
        if let Some(limit) = self.fail_after
            && events.len() >= limit
        {
            return Err(Error::sink("downstream unavailable"));
        }
        events.push(event);
        Ok(())
    }
}

/// An async writer whose reader went away
pub struct BrokenPipe;

impl tokio::io::AsyncWrite for BrokenPipe {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Poll::Ready(Err(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "reader closed",
        )))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Build an engine over shared test doubles
pub fn engine(
    config: AgentConfig,
    source: &ScriptedFeedSource,
    store: &MemorySeenStore,
    sink: &RecordingSink,
) -> PollEngine {
    let (engine, _events) = PollEngine::new(
        "test-agent",
        config,
        Box::new(source.clone()),
        Box::new(store.clone()),
        Box::new(sink.clone()),
        100,
    )
    .expect("engine construction succeeds");
    engine
}

/// Stored seen ids for the test agent, oldest first
pub async fn stored_ids(store: &MemorySeenStore) -> Vec<String> {
    use favwatch_core::traits::SeenStore;

    store
        .load("test-agent")
        .await
        .unwrap()
        .map(|record| record.last_seen.iter().map(ToString::to_string).collect())
        .unwrap_or_default()
}
