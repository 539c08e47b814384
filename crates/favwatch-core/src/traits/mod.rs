//! Core traits for favwatch
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`FeedSource`]: Fetch one page of remote items
//! - [`SeenStore`]: Persist seen buffers between runs
//! - [`EventSink`]: Deliver output events downstream

pub mod feed_source;
pub mod seen_store;
pub mod event_sink;

pub use feed_source::{FeedSource, FeedSourceFactory, FetchRequest, RemoteItem, TweetMode};
pub use seen_store::{SeenStore, SeenRecord, SeenStoreFactory};
pub use event_sink::{EventSink, OutputEvent};
