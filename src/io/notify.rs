//! Per-destination notification registry
//!
//! Listeners are invoked synchronously, in registration order, on the task
//! that emits. Slow consumers should use `forward_to_channel`, which hands
//! notifications to a bounded mpsc channel and drops them when it is full.

use crate::error::SyncError;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// Error conditions reported through `Notification::Error`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    #[serde(rename = "UNKNOWN_ENTITY_LIVEDATA")]
    UnknownEntityLiveData,
    #[serde(rename = "INVALID_LIVEDATA")]
    InvalidLiveData,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnknownEntityLiveData => "UNKNOWN_ENTITY_LIVEDATA",
            ErrorKind::InvalidLiveData => "INVALID_LIVEDATA",
        }
    }
}

/// Events emitted by the synchronizer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum Notification {
    /// A live data record could not be applied
    Error { entity_id: String, kind: ErrorKind, detail: Value },
    /// An entity's stored live data changed
    LiveUpdate { entity_id: String, data: Value },
}

impl Notification {
    /// Event name as seen by listeners (`error` or `liveupdate`)
    pub fn name(&self) -> &'static str {
        match self {
            Notification::Error { .. } => "error",
            Notification::LiveUpdate { .. } => "liveupdate",
        }
    }

    pub fn entity_id(&self) -> &str {
        match self {
            Notification::Error { entity_id, .. } | Notification::LiveUpdate { entity_id, .. } => entity_id,
        }
    }
}

pub type Listener = Arc<dyn Fn(&Notification) + Send + Sync>;

type Registry = RwLock<Vec<(ListenerId, Listener)>>;

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Observer registry owned by one destination
#[derive(Default)]
pub struct Notifier {
    listeners: Arc<Registry>,
    next_id: AtomicU64,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        let id = self.next_listener_id();
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    fn next_listener_id(&self) -> ListenerId {
        ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns false if the listener was not registered
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        remove_listener(&self.listeners, id)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Deliver to every listener registered at the time of the call
    pub fn emit(&self, notification: &Notification) {
        // Snapshot so listeners may (un)subscribe without deadlocking
        let listeners: Vec<Listener> = self.listeners.read().iter().map(|(_, l)| l.clone()).collect();
        for listener in listeners {
            listener(notification);
        }
    }

    /// Forward notifications into a bounded channel.
    ///
    /// Non-blocking - if the channel is full, notifications are dropped.
    /// Once the receiver is dropped the forwarder unsubscribes itself.
    pub fn forward_to_channel(
        &self,
        buffer_size: usize,
    ) -> Result<(ListenerId, mpsc::Receiver<Notification>), SyncError> {
        if buffer_size == 0 {
            return Err(SyncError::Config("notification buffer size must be at least 1".to_string()));
        }

        let (tx, rx) = mpsc::channel(buffer_size);
        let id = self.next_listener_id();
        let registry = Arc::downgrade(&self.listeners);

        let forwarder: Listener = Arc::new(move |notification: &Notification| {
            match tx.try_send(notification.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => warn!(
                    event = %notification.name(),
                    entity_id = %notification.entity_id(),
                    "notification_dropped"
                ),
                Err(TrySendError::Closed(_)) => {
                    if let Some(listeners) = registry.upgrade() {
                        remove_listener(&listeners, id);
                    }
                    debug!(listener_id = %id.0, "notification_forwarder_closed");
                }
            }
        });
        self.listeners.write().push((id, forwarder));
        Ok((id, rx))
    }
}

fn remove_listener(listeners: &Registry, id: ListenerId) -> bool {
    let mut listeners = listeners.write();
    let before = listeners.len();
    listeners.retain(|(existing, _)| *existing != id);
    listeners.len() != before
}
