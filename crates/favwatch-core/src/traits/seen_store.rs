// # Seen Store Trait
//
// Defines the interface for persisting each agent's seen buffer.
//
// ## Purpose
//
// The seen buffer is the engine's only memory between runs. Persisting it
// durably after every successful check is what keeps a restart from
// re-emitting items the source is still returning.
//
// ## Implementations
//
// - In-memory: `MemorySeenStore` (tests, ephemeral deployments)
// - File-based: `FileSeenStore` (JSON with atomic writes and backup)

use async_trait::async_trait;

use crate::seen::ItemId;

/// Persisted seen state for one agent
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SeenRecord {
    /// Seen ids, oldest first
    pub last_seen: Vec<ItemId>,
    /// When the record was last written
    pub updated_at: chrono::DateTime<chrono::Utc>,
    /// Agent creation time, fixed by the first save
    ///
    /// Absent in files written before it was tracked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl SeenRecord {
    /// Create a record stamped with the current time
    pub fn new(last_seen: Vec<ItemId>) -> Self {
        Self {
            last_seen,
            updated_at: chrono::Utc::now(),
            created_at: None,
        }
    }

    /// Attach the agent creation time
    pub fn with_created_at(mut self, created_at: chrono::DateTime<chrono::Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }
}

/// Trait for seen store implementations
///
/// Keyed by agent id; one agent never reads another agent's record.
///
/// # Trust Level: Trusted (Core Component)
///
/// ## Implementation Guidelines
///
/// - **Durable saves**: when `save` returns `Ok`, the record must survive a restart
///   (or the implementation must document that it does not persist at all)
/// - **Async I/O only**: never block the runtime
/// - **No business logic**: stores never trim, dedup or reorder ids
#[async_trait]
pub trait SeenStore: Send + Sync {
    /// Load the record for an agent
    ///
    /// # Returns
    ///
    /// - `Ok(Some(SeenRecord))`: The stored record
    /// - `Ok(None)`: First run for this agent
    /// - `Err(Error)`: Storage error
    async fn load(&self, agent_id: &str) -> Result<Option<SeenRecord>, crate::Error>;

    /// Replace the record for an agent
    async fn save(&self, agent_id: &str, record: &SeenRecord) -> Result<(), crate::Error>;

    /// Delete the record for an agent (no error if absent)
    async fn delete(&self, agent_id: &str) -> Result<(), crate::Error>;

    /// List all agent ids with a stored record
    async fn list_agents(&self) -> Result<Vec<String>, crate::Error>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), crate::Error>;
}

/// Helper trait for constructing seen stores from configuration
#[async_trait]
pub trait SeenStoreFactory: Send + Sync {
    /// Create a SeenStore instance from configuration
    async fn create(
        &self,
        config: &crate::config::SeenStoreConfig,
    ) -> Result<Box<dyn SeenStore>, crate::Error>;
}
