//! Seen-item bookkeeping
//!
//! [`SeenBuffer`] is the bounded, duplicate-free, FIFO-evicting list of item
//! ids that have already produced an event.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{HashSet, VecDeque};
use std::fmt;

/// Opaque identifier of a remote item, stable across polls
///
/// Stored as a string. Numeric JSON ids (as older state files recorded them)
/// are accepted on load.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(String);

impl ItemId {
    /// Create an id from anything string-like
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ItemId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for ItemId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl Serialize for ItemId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ItemId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Number(u64),
            Text(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Number(n) => ItemId::from(n),
            RawId::Text(s) => ItemId(s),
        })
    }
}

/// Bounded FIFO buffer of seen item ids
///
/// Invariants:
/// - `len() <= capacity()` after every operation
/// - no id appears twice
/// - the oldest inserted id is evicted first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenBuffer {
    order: VecDeque<ItemId>,
    index: HashSet<ItemId>,
    capacity: usize,
}

impl SeenBuffer {
    /// Create an empty buffer holding at most `capacity` ids
    pub fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity.min(1024)),
            index: HashSet::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Rebuild a buffer from persisted ids, oldest first
    ///
    /// Duplicates keep their first position. If the ids exceed `capacity`
    /// (the history size shrank since they were saved), only the newest
    /// `capacity` ids are kept.
    pub fn from_ids<I>(ids: I, capacity: usize) -> Self
    where
        I: IntoIterator<Item = ItemId>,
    {
        let mut buffer = Self::new(capacity);
        for id in ids {
            buffer.push(id);
        }
        buffer
    }

    /// Whether `id` is currently remembered
    pub fn contains(&self, id: &ItemId) -> bool {
        self.index.contains(id)
    }

    /// Append `id`, evicting the oldest entry if capacity is exceeded
    ///
    /// Returns the evicted id, if any. Pushing an id that is already present
    /// is a no-op.
    pub fn push(&mut self, id: ItemId) -> Option<ItemId> {
        if !self.index.insert(id.clone()) {
            return None;
        }
        self.order.push_back(id);

        if self.order.len() > self.capacity {
            let evicted = self.order.pop_front()?;
            self.index.remove(&evicted);
            return Some(evicted);
        }
        None
    }

    /// Number of remembered ids
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether no id is remembered
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Maximum number of remembered ids
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterate ids from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &ItemId> {
        self.order.iter()
    }

    /// Copy the ids out, oldest first
    pub fn to_vec(&self) -> Vec<ItemId> {
        self.order.iter().cloned().collect()
    }
}
