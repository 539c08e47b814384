// # Event Sink Trait
//
// Defines where output events go once the engine has decided an item is new.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::seen::ItemId;

/// One event per genuinely new item
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputEvent {
    /// Id of the item that produced this event
    pub id: ItemId,
    /// Item creation time
    pub created_at: DateTime<Utc>,
    /// Display-normalized payload
    pub payload: serde_json::Value,
}

/// Trait for event sink implementations
///
/// `emit` is called once per new item, in processing order. An error aborts
/// the check before the seen buffer is saved, so the item will be emitted
/// again on the next run (at-least-once delivery).
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver one event
    async fn emit(&self, event: OutputEvent) -> Result<(), crate::Error>;
}
