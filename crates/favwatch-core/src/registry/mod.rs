//! Plugin-based source registry
//!
//! The registry lets feed sources and seen stores be registered by name at
//! runtime, so the daemon builds them from configuration without a
//! hardcoded if-else chain.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use favwatch_core::registry::SourceRegistry;
//! use favwatch_core::config::{FeedSourceConfig, SeenStoreConfig};
//!
//! let registry = SourceRegistry::with_builtin_stores();
//! favwatch_source_twitter::register(&registry);
//!
//! let source = registry.create_feed_source(&FeedSourceConfig::Twitter { .. })?;
//! let store = registry.create_seen_store(&SeenStoreConfig::Memory).await?;
//! ```

use crate::config::{FeedSourceConfig, SeenStoreConfig};
use crate::error::{Error, Result};
use crate::state::{FileSeenStoreFactory, MemorySeenStoreFactory};
use crate::traits::{FeedSource, FeedSourceFactory, SeenStore, SeenStoreFactory};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Registry of feed source and seen store factories
///
/// ## Thread Safety
///
/// Interior mutability with `RwLock` allows concurrent lookups and
/// exclusive registration.
#[derive(Default)]
pub struct SourceRegistry {
    /// Registered feed source factories
    feed_sources: RwLock<HashMap<String, Box<dyn FeedSourceFactory>>>,

    /// Registered seen store factories
    seen_stores: RwLock<HashMap<String, Arc<dyn SeenStoreFactory>>>,
}

impl SourceRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the `memory` and `file` seen stores registered
    pub fn with_builtin_stores() -> Self {
        let registry = Self::new();
        registry.register_seen_store("memory", Box::new(MemorySeenStoreFactory));
        registry.register_seen_store("file", Box::new(FileSeenStoreFactory));
        registry
    }

    /// Register a feed source factory
    ///
    /// # Parameters
    ///
    /// - `name`: Feed source type name (e.g., "twitter")
    /// - `factory`: Factory object for creating feed source instances
    pub fn register_feed_source(&self, name: impl Into<String>, factory: Box<dyn FeedSourceFactory>) {
        let mut sources = self
            .feed_sources
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        sources.insert(name.into(), factory);
    }

    /// Register a seen store factory
    ///
    /// # Parameters
    ///
    /// - `name`: Store type name (e.g., "file", "memory")
    /// - `factory`: Factory object for creating store instances
    pub fn register_seen_store(&self, name: impl Into<String>, factory: Box<dyn SeenStoreFactory>) {
        let mut stores = self
            .seen_stores
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        stores.insert(name.into(), Arc::from(factory));
    }

    /// Create a feed source from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn FeedSource>)`: Created feed source
    /// - `Err(Error)`: Unknown type, invalid configuration, or creation failure
    pub fn create_feed_source(&self, config: &FeedSourceConfig) -> Result<Box<dyn FeedSource>> {
        config.validate()?;

        let source_type = config.type_name();
        let sources = self
            .feed_sources
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let factory = sources
            .get(source_type)
            .ok_or_else(|| Error::config(format!("Unknown feed source type: {}", source_type)))?;

        factory.create(config)
    }

    /// Create a seen store from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn SeenStore>)`: Created store
    /// - `Err(Error)`: Unknown type or creation failure
    pub async fn create_seen_store(&self, config: &SeenStoreConfig) -> Result<Box<dyn SeenStore>> {
        let store_type = config.type_name();

        let factory = {
            let stores = self
                .seen_stores
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            stores
                .get(store_type)
                .cloned()
                .ok_or_else(|| Error::config(format!("Unknown seen store type: {}", store_type)))?
        };

        // Lock released before the async create
        factory.create(config).await
    }

    /// List all registered feed source types
    pub fn list_feed_sources(&self) -> Vec<String> {
        let sources = self
            .feed_sources
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        sources.keys().cloned().collect()
    }

    /// List all registered seen store types
    pub fn list_seen_stores(&self) -> Vec<String> {
        let stores = self
            .seen_stores
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        stores.keys().cloned().collect()
    }

    /// Check if a feed source type is registered
    pub fn has_feed_source(&self, name: &str) -> bool {
        let sources = self
            .feed_sources
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        sources.contains_key(name)
    }

    /// Check if a seen store type is registered
    pub fn has_seen_store(&self, name: &str) -> bool {
        let stores = self
            .seen_stores
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        stores.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockFeedFactory;

    impl FeedSourceFactory for MockFeedFactory {
        fn create(&self, _config: &FeedSourceConfig) -> Result<Box<dyn FeedSource>> {
            Err(Error::not_found("Mock feed source not implemented"))
        }
    }

    #[test]
    fn test_registry_registration() {
        let registry = SourceRegistry::new();
        assert!(!registry.has_feed_source("mock"));

        registry.register_feed_source("mock", Box::new(MockFeedFactory));

        assert!(registry.has_feed_source("mock"));
        assert!(registry.list_feed_sources().contains(&"mock".to_string()));
    }

    #[test]
    fn test_unknown_feed_source_type() {
        let registry = SourceRegistry::new();
        let config = FeedSourceConfig::Twitter {
            bearer_token: "token".to_string(),
            api_base: None,
        };

        let err = registry.create_feed_source(&config).err().unwrap();
        assert!(err.to_string().contains("Unknown feed source type: twitter"));
    }

    #[tokio::test]
    async fn test_builtin_stores() {
        let registry = SourceRegistry::with_builtin_stores();
        assert!(registry.has_seen_store("memory"));
        assert!(registry.has_seen_store("file"));

        let store = registry.create_seen_store(&SeenStoreConfig::Memory).await.unwrap();
        assert!(store.list_agents().await.unwrap().is_empty());

        let custom = SeenStoreConfig::Custom {
            factory: "redis".to_string(),
            config: serde_json::json!({}),
        };
        assert!(registry.create_seen_store(&custom).await.is_err());
    }
}
