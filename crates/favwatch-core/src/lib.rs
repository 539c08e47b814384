// # favwatch-core
//
// Core library for the favorites-list watcher.
//
// ## Architecture Overview
//
// This library provides the incremental fetch-and-dedup machinery:
// - **FeedSource**: Trait for fetching one page of remote items (tweets)
// - **SeenStore**: Trait for persisting each agent's seen buffer
// - **EventSink**: Trait for delivering one event per new item
// - **PollEngine**: Orchestrates fetch → dedup → emit → persist for one agent
// - **SourceRegistry**: Plugin-based registry for feed sources and stores
//
// ## Design Principles
//
// 1. **Explicit state**: The seen buffer is passed in and handed back, never global
// 2. **Validate once**: Raw options are parsed into a typed config before any run
// 3. **No hidden retries**: Fetch failures propagate; scheduling owns retry
// 4. **At-least-once**: State is saved only after every event was delivered
// 5. **Library-First**: The daemon is a thin layer over this crate

pub mod traits;
pub mod engine;
pub mod registry;
pub mod config;
pub mod error;
pub mod seen;
pub mod sink;
pub mod state;

// Re-export core types for convenience
pub use traits::{FeedSource, SeenStore, EventSink};
pub use engine::{PollEngine, CheckReport, EngineEvent, RunOutcome};
pub use registry::SourceRegistry;
pub use config::{AgentConfig, AgentOptions, FeedSourceConfig, SeenStoreConfig, ValidationErrors};
pub use error::{Error, Result};
pub use seen::{ItemId, SeenBuffer};
pub use sink::{ChannelSink, JsonLinesSink};
pub use state::{MemorySeenStore, FileSeenStore};
