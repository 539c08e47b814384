// # Seen Store Implementations
//
// This module provides implementations of the SeenStore trait for
// different persistence strategies.

pub mod file;
pub mod memory;

pub use file::{FileSeenStore, FileSeenStoreFactory};
pub use memory::{MemorySeenStore, MemorySeenStoreFactory};
