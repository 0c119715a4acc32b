//! IO modules - storage, notification delivery, fixture input
//!
//! This module contains the engine's external boundaries:
//! - `cache` - Keyed cache contract plus the in-process `MemoryStore` backend
//! - `notify` - Observer registry for `error` and `liveupdate` notifications
//! - `fixture` - Destination producer backed by a JSON document

pub mod cache;
pub mod fixture;
pub mod notify;

// Re-export commonly used types
pub use cache::{Cache, CacheTransaction, MemoryStore, ScopedCache};
pub use fixture::FixtureDestination;
pub use notify::{ErrorKind, ListenerId, Notification, Notifier};
