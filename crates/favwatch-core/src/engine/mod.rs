//! Poll-and-dedup engine
//!
//! The engine is responsible for:
//! - Fetching one page of recent items from a FeedSource
//! - Dropping items already in the seen buffer or older than the cutoff
//! - Emitting one OutputEvent per new item, in fetch order
//! - Persisting the updated seen buffer after every event was delivered
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐
//! │ FeedSource  │─── Vec<RemoteItem> ───┐
//! └─────────────┘                       │
//!                                       ▼
//!                              ┌──────────────┐
//!                              │  PollEngine  │
//!                              └──────────────┘
//!                                       │
//!         ┌─────────────────────────────┼─────────────────────────────┐
//!         │                             │                             │
//!         ▼                             ▼                             ▼
//! ┌─────────────┐             ┌──────────────┐             ┌─────────────┐
//! │ SeenStore   │             │  EventSink   │             │ EngineEvent │
//! │ (load/save) │             │  (emit)      │             │  (monitor)  │
//! └─────────────┘             └──────────────┘             └─────────────┘
//! ```
//!
//! ## Check Flow
//!
//! 1. Load the seen buffer and the persisted agent creation time
//! 2. Resolve the cutoff (starting_at → created_at → now); on the very first
//!    check "now" becomes the creation time and is saved with the buffer
//! 3. Fetch once; a failure ends the check with nothing emitted or saved
//! 4. Filter and record new ids ([`process_items`])
//! 5. Emit every new event to the EventSink
//! 6. Save and flush the buffer
//!
//! A crash between 5 and 6 re-emits on the next run: delivery is
//! at-least-once, never at-most-once.
//!
//! The feed may return fewer than `page_size` items either because the
//! account has few favorites or because the page was already exhausted by
//! older ones; the two cases cannot be told apart and neither is an error.

use crate::config::AgentConfig;
use crate::error::{Error, Result};
use crate::seen::{ItemId, SeenBuffer};
use crate::traits::{
    EventSink, FeedSource, FetchRequest, OutputEvent, RemoteItem, SeenRecord, SeenStore, TweetMode,
};
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};

/// Why an item produced no event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Id already in the seen buffer
    AlreadySeen,
    /// Created strictly before the cutoff
    BeforeCutoff,
}

/// An item that was fetched but not emitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedItem {
    pub id: ItemId,
    pub reason: SkipReason,
}

/// Result of one pass over a fetched page
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    /// Buffer after recording every new id
    pub seen: SeenBuffer,
    /// Events to emit, in processing order
    pub events: Vec<OutputEvent>,
    /// Items that produced no event, in processing order
    pub skipped: Vec<SkippedItem>,
}

impl RunOutcome {
    /// Count skipped items with the given reason
    pub fn skipped_count(&self, reason: SkipReason) -> usize {
        self.skipped.iter().filter(|s| s.reason == reason).count()
    }
}

/// Filter a fetched page against the seen buffer and the cutoff
///
/// Items are visited in the order given. An item is skipped if its id is
/// already in `seen` or it was created before `cutoff`; otherwise its id is
/// pushed (evicting the oldest id past capacity) and `format` builds its
/// event payload. Skipped items never mutate the buffer.
pub fn process_items<F>(
    cutoff: DateTime<Utc>,
    mut seen: SeenBuffer,
    items: Vec<RemoteItem>,
    mut format: F,
) -> RunOutcome
where
    F: FnMut(&RemoteItem) -> serde_json::Value,
{
    let mut events = Vec::new();
    let mut skipped = Vec::new();

    for item in items {
        if seen.contains(&item.id) {
            debug!("Item {} already seen, skipping", item.id);
            skipped.push(SkippedItem {
                id: item.id,
                reason: SkipReason::AlreadySeen,
            });
            continue;
        }

        if item.created_at < cutoff {
            debug!("Item {} created at {} is before cutoff {}, skipping",
                   item.id, item.created_at, cutoff);
            skipped.push(SkippedItem {
                id: item.id,
                reason: SkipReason::BeforeCutoff,
            });
            continue;
        }

        if let Some(evicted) = seen.push(item.id.clone()) {
            debug!("Seen buffer full, evicted {}", evicted);
        }

        events.push(OutputEvent {
            payload: format(&item),
            id: item.id,
            created_at: item.created_at,
        });
    }

    RunOutcome {
        seen,
        events,
        skipped,
    }
}

/// Run one poll: fetch a page and dedup it against `seen`
///
/// `seen` is not modified; the updated buffer is returned in the outcome.
/// A fetch error is returned as-is and nothing else happens.
///
/// # Parameters
///
/// - `config`: Validated agent configuration
/// - `seen`: Buffer persisted by the previous run (empty on the first run)
/// - `source`: Where to fetch from
/// - `now`: Last link of the cutoff fallback chain
pub async fn run(
    config: &AgentConfig,
    seen: &SeenBuffer,
    source: &dyn FeedSource,
    now: DateTime<Utc>,
) -> Result<RunOutcome> {
    let cutoff = config.cutoff(now);
    let request = FetchRequest::new(config.username.as_str(), config.page_size, TweetMode::Extended);

    let items = source.fetch(&request).await?;
    debug!("Fetched {} item(s) from {} for {}", items.len(), source.source_name(), config.username);

    let seen = if seen.capacity() == config.history_size {
        seen.clone()
    } else {
        SeenBuffer::from_ids(seen.iter().cloned(), config.history_size)
    };

    Ok(process_items(cutoff, seen, items, |item| source.format(item)))
}

/// Events emitted by the PollEngine for monitoring
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A check began
    CheckStarted {
        agent_id: String,
    },

    /// An output event was delivered to the sink
    ItemEmitted {
        agent_id: String,
        item_id: ItemId,
    },

    /// A fetched item produced no event
    ItemSkipped {
        agent_id: String,
        item_id: ItemId,
        reason: SkipReason,
    },

    /// A check completed and its buffer was saved
    CheckSucceeded {
        agent_id: String,
        emitted: usize,
        seen_len: usize,
    },

    /// A check failed; nothing was saved
    CheckFailed {
        agent_id: String,
        error: String,
    },
}

/// Summary of one successful check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckReport {
    /// Events delivered to the sink
    pub emitted: usize,
    /// Items skipped because their id was already seen
    pub skipped_seen: usize,
    /// Items skipped because they predate the cutoff
    pub skipped_old: usize,
    /// Buffer length after the check
    pub seen_len: usize,
}

/// What the seen store held at the start of a check
struct StoredState {
    seen: SeenBuffer,
    created_at: Option<DateTime<Utc>>,
}

/// Poll-and-dedup engine for one agent
///
/// ## Lifecycle
///
/// 1. Create with [`PollEngine::new()`]
/// 2. Call [`PollEngine::check()`] from whatever schedule the caller owns
/// 3. Drop to cleanup
///
/// ## Threading
///
/// Checks on the same engine are serialized by an internal lock: two
/// overlapping checks would each see the same buffer and both emit the same
/// item. Different agents use different engines and never share a buffer.
pub struct PollEngine {
    /// Key into the seen store
    agent_id: String,

    /// Validated configuration
    config: AgentConfig,

    /// Feed to poll
    source: Box<dyn FeedSource>,

    /// Seen buffer persistence
    store: Box<dyn SeenStore>,

    /// Downstream event delivery
    sink: Box<dyn EventSink>,

    /// Serializes checks
    run_lock: Mutex<()>,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl PollEngine {
    /// Create a new engine
    ///
    /// # Parameters
    ///
    /// - `agent_id`: Key under which the seen buffer is stored
    /// - `config`: Validated agent configuration
    /// - `source`: Feed source implementation
    /// - `store`: Seen store implementation
    /// - `sink`: Event sink implementation
    /// - `monitor_capacity`: Capacity of the monitoring channel
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        agent_id: impl Into<String>,
        config: AgentConfig,
        source: Box<dyn FeedSource>,
        store: Box<dyn SeenStore>,
        sink: Box<dyn EventSink>,
        monitor_capacity: usize,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        let agent_id = agent_id.into();
        if agent_id.trim().is_empty() {
            return Err(Error::config("Agent id cannot be empty"));
        }
        if config.username.is_empty() {
            return Err(Error::config("Username cannot be empty"));
        }
        if config.page_size == 0 || config.history_size == 0 {
            return Err(Error::config("Page size and history size must be greater than 0"));
        }
        if config.history_size < config.page_size {
            warn!("History size {} is smaller than page size {}; items may be emitted twice",
                  config.history_size, config.page_size);
        }

        let (tx, rx) = mpsc::channel(monitor_capacity.max(1));

        let engine = Self {
            agent_id,
            config,
            source,
            store,
            sink,
            run_lock: Mutex::new(()),
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Agent id this engine polls for
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Configuration this engine polls with
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Run one check using the current time as the last cutoff fallback
    pub async fn check(&self) -> Result<CheckReport> {
        self.check_at(Utc::now()).await
    }

    /// Run one check with an explicit "now"
    ///
    /// # Returns
    ///
    /// - `Ok(CheckReport)`: Every new event was delivered and the buffer saved
    /// - `Err(Error)`: Load, fetch, emit or save failed; the stored buffer is
    ///   unchanged
    pub async fn check_at(&self, now: DateTime<Utc>) -> Result<CheckReport> {
        let _guard = self.run_lock.lock().await;

        self.emit_event(EngineEvent::CheckStarted {
            agent_id: self.agent_id.clone(),
        });

        let result = self.check_locked(now).await;
        match &result {
            Ok(report) => {
                info!("Check for {} emitted {} event(s) (skipped: {} seen, {} old)",
                      self.agent_id, report.emitted, report.skipped_seen, report.skipped_old);
                self.emit_event(EngineEvent::CheckSucceeded {
                    agent_id: self.agent_id.clone(),
                    emitted: report.emitted,
                    seen_len: report.seen_len,
                });
            }
            Err(e) => {
                error!("Check for {} failed: {}", self.agent_id, e);
                self.emit_event(EngineEvent::CheckFailed {
                    agent_id: self.agent_id.clone(),
                    error: e.to_string(),
                });
            }
        }
        result
    }

    async fn check_locked(&self, now: DateTime<Utc>) -> Result<CheckReport> {
        let stored = self.load_seen().await?;
        let seen = stored.seen;
        let created_at = self.creation_time(stored.created_at, now);
        let config = self.config.clone().with_created_at(created_at);
        let outcome = run(&config, &seen, self.source.as_ref(), now).await?;

        let report = CheckReport {
            emitted: outcome.events.len(),
            skipped_seen: outcome.skipped_count(SkipReason::AlreadySeen),
            skipped_old: outcome.skipped_count(SkipReason::BeforeCutoff),
            seen_len: outcome.seen.len(),
        };

        for skipped in &outcome.skipped {
            self.emit_event(EngineEvent::ItemSkipped {
                agent_id: self.agent_id.clone(),
                item_id: skipped.id.clone(),
                reason: skipped.reason,
            });
        }

        for event in outcome.events {
            let item_id = event.id.clone();
            self.sink.emit(event).await?;
            debug!("Emitted event for item {}", item_id);
            self.emit_event(EngineEvent::ItemEmitted {
                agent_id: self.agent_id.clone(),
                item_id,
            });
        }

        if outcome.seen != seen || stored.created_at != Some(created_at) {
            let record = SeenRecord::new(outcome.seen.to_vec()).with_created_at(created_at);
            self.store.save(&self.agent_id, &record).await?;
            self.store.flush().await?;
        }

        Ok(report)
    }

    /// Preview the events a check would emit, without emitting or saving
    pub async fn dry_run(&self) -> Result<Vec<OutputEvent>> {
        self.dry_run_at(Utc::now()).await
    }

    /// Preview with an explicit "now"
    pub async fn dry_run_at(&self, now: DateTime<Utc>) -> Result<Vec<OutputEvent>> {
        let _guard = self.run_lock.lock().await;

        let stored = self.load_seen().await?;
        let created_at = self.creation_time(stored.created_at, now);
        let config = self.config.clone().with_created_at(created_at);
        let outcome = run(&config, &stored.seen, self.source.as_ref(), now).await?;
        info!("Dry run for {} would emit {} event(s)", self.agent_id, outcome.events.len());
        Ok(outcome.events)
    }

    /// Load the stored buffer, sized to the configured history
    async fn load_seen(&self) -> Result<StoredState> {
        match self.store.load(&self.agent_id).await? {
            Some(record) => Ok(StoredState {
                seen: SeenBuffer::from_ids(record.last_seen, self.config.history_size),
                created_at: record.created_at,
            }),
            None => {
                debug!("No seen buffer for {}, starting empty", self.agent_id);
                Ok(StoredState {
                    seen: SeenBuffer::new(self.config.history_size),
                    created_at: None,
                })
            }
        }
    }

    /// Agent creation time: configured, else persisted, else this check
    ///
    /// The first check's time is saved with the buffer so the cutoff stays
    /// put across restarts.
    fn creation_time(&self, stored: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
        self.config.created_at.or(stored).unwrap_or(now)
    }

    /// Emit a monitoring event
    fn emit_event(&self, event: EngineEvent) {
        if let Err(mpsc::error::TrySendError::Full(_)) = self.event_tx.try_send(event) {
            // Dropping is preferable to blocking a check on a slow monitor
            warn!("Event channel full, dropping event. Consider draining engine events faster.");
        }
    }
}
