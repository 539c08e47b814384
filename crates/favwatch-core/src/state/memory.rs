// # Memory Seen Store
//
// In-memory implementation of SeenStore.
//
// ## Crash Behavior
//
// - All seen buffers are lost on restart
// - The first check after a restart treats every item at or after the
//   cutoff as new and emits it again
//
// ## When to Use
//
// - Tests
// - Dry runs
// - Deployments where a replay after restart is harmless

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::config::SeenStoreConfig;
use crate::traits::seen_store::{SeenRecord, SeenStore, SeenStoreFactory};

/// In-memory seen store implementation
///
/// Cloning shares the underlying map, which lets a test keep a handle on
/// the state an engine writes.
///
/// # Example
///
/// ```rust,no_run
/// use favwatch_core::state::MemorySeenStore;
/// use favwatch_core::traits::{SeenRecord, SeenStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemorySeenStore::new();
///
///     store.save("agent-1", &SeenRecord::new(vec!["42".into()])).await?;
///
///     let record = store.load("agent-1").await?;
///     assert_eq!(record.map(|r| r.last_seen.len()), Some(1));
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemorySeenStore {
    inner: Arc<RwLock<HashMap<String, SeenRecord>>>,
}

impl MemorySeenStore {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of agents in the store
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl SeenStore for MemorySeenStore {
    async fn load(&self, agent_id: &str) -> Result<Option<SeenRecord>, Error> {
        Ok(self.inner.read().await.get(agent_id).cloned())
    }

    async fn save(&self, agent_id: &str, record: &SeenRecord) -> Result<(), Error> {
        self.inner
            .write()
            .await
            .insert(agent_id.to_string(), record.clone());
        Ok(())
    }

    async fn delete(&self, agent_id: &str) -> Result<(), Error> {
        self.inner.write().await.remove(agent_id);
        Ok(())
    }

    async fn list_agents(&self) -> Result<Vec<String>, Error> {
        Ok(self.inner.read().await.keys().cloned().collect())
    }

    async fn flush(&self) -> Result<(), Error> {
        Ok(())
    }
}

/// Factory for in-memory seen stores
pub struct MemorySeenStoreFactory;

#[async_trait]
impl SeenStoreFactory for MemorySeenStoreFactory {
    async fn create(&self, config: &SeenStoreConfig) -> Result<Box<dyn SeenStore>, Error> {
        match config {
            SeenStoreConfig::Memory => Ok(Box::new(MemorySeenStore::new())),
            _ => Err(Error::config("Invalid config for memory seen store")),
        }
    }
}
