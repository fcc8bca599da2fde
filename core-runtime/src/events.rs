//! # Event Bus System
//!
//! Event-driven notification for the Review Platform Core using
//! `tokio::sync::broadcast`. Replaces the ambient global emitter the
//! original application used for `playlist-updated` / `sync-progress`
//! style notifications with explicit subscription: every consumer holds
//! its own receiver, lifecycle and ordering are visible at the call site.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{EventBus, CoreEvent, SyncEvent};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut subscriber = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Sync(SyncEvent::Completed {
//!         playlist_id: "pl-1".to_string(),
//!         external_id: "ext-1".to_string(),
//!         versions_uploaded: 12,
//!     }))
//!     .ok();
//!
//! let received = subscriber.recv().await.unwrap();
//! assert!(matches!(received, CoreEvent::Sync(_)));
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events. Non-fatal;
//!   the subscriber keeps receiving new events.
//! - **`RecvError::Closed`**: all senders dropped, treat as shutdown.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Sync-upload related events
    Sync(SyncEvent),
    /// Playlist cache related events
    Playlist(PlaylistEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Playlist(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Sync(SyncEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Sync(SyncEvent::NameConflictDetected { .. }) => EventSeverity::Warning,
            CoreEvent::Sync(SyncEvent::Cancelled { .. }) => EventSeverity::Warning,
            CoreEvent::Sync(SyncEvent::Completed { .. }) => EventSeverity::Info,
            CoreEvent::Playlist(PlaylistEvent::Removed { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Sync Events
// ============================================================================

/// Events emitted by the sync uploader while pushing a local playlist to
/// the remote tracking service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// Upload step progress.
    Progress {
        /// The local playlist being uploaded.
        playlist_id: String,
        /// Current step (e.g., "creating playlist", "uploading versions").
        phase: String,
    },
    /// Upload finished; the playlist now has a remote counterpart.
    Completed {
        playlist_id: String,
        /// The external id assigned by the remote service.
        external_id: String,
        /// Number of versions pushed.
        versions_uploaded: u64,
    },
    /// Upload failed for a reason other than a name conflict.
    Failed {
        playlist_id: String,
        message: String,
        /// Whether retrying the upload may succeed.
        recoverable: bool,
    },
    /// The remote already has a playlist with this name. Resolution
    /// requires an explicit rename-and-retry or cancel decision.
    NameConflictDetected {
        playlist_id: String,
        playlist_name: String,
        project_id: String,
        message: String,
    },
    /// A name conflict was resolved by renaming and the retry succeeded.
    ConflictResolved {
        playlist_id: String,
        new_name: String,
    },
    /// Upload was cancelled.
    ///
    /// `warning` is set when a create call may already have reached the
    /// remote service; the partially created remote playlist cannot be
    /// rolled back from here and needs manual verification.
    Cancelled {
        playlist_id: String,
        warning: Option<String>,
    },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::Progress { .. } => "Sync upload in progress",
            SyncEvent::Completed { .. } => "Sync upload completed",
            SyncEvent::Failed { .. } => "Sync upload failed",
            SyncEvent::NameConflictDetected { .. } => "Playlist name conflict detected",
            SyncEvent::ConflictResolved { .. } => "Playlist name conflict resolved",
            SyncEvent::Cancelled { .. } => "Sync upload cancelled",
        }
    }
}

// ============================================================================
// Playlist Events
// ============================================================================

/// Events describing changes to the local playlist cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum PlaylistEvent {
    /// A playlist row was created or its fields changed during a refresh.
    Updated {
        playlist_id: String,
        /// What changed (e.g., "materialized", "renamed", "versions_merged").
        change_type: String,
    },
    /// A playlist was flagged as deleted on the remote side.
    Removed {
        playlist_id: String,
        name: String,
    },
    /// The drift poller found remote changes that have not been applied.
    PendingChangesDetected {
        playlist_id: String,
        added: u64,
        removed: u64,
    },
}

impl PlaylistEvent {
    fn description(&self) -> &str {
        match self {
            PlaylistEvent::Updated { .. } => "Playlist updated",
            PlaylistEvent::Removed { .. } => "Playlist removed remotely",
            PlaylistEvent::PendingChangesDetected { .. } => "Pending remote changes detected",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Uses `tokio::sync::broadcast` internally: multiple producers (clone the
/// `EventBus`), multiple consumers (each `subscribe()` creates a new
/// receiver), non-blocking sends, lagging detection for slow subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber to receive events.
    ///
    /// Each call creates an independent receiver that will receive all
    /// future events. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    /// Creates a new event stream from a receiver.
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Adds a filter function; only matching events are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter (if any).
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n`
    /// events, `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;

            let Some(filter) = &self.filter else {
                return Ok(event);
            };

            if filter(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    let Some(filter) = &self.filter else {
                        return Some(Ok(event));
                    };

                    if filter(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_bus_subscription() {
        let bus = EventBus::new(10);
        let _sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        let event = CoreEvent::Playlist(PlaylistEvent::Updated {
            playlist_id: "pl-1".to_string(),
            change_type: "renamed".to_string(),
        });

        assert!(bus.emit(event).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = CoreEvent::Sync(SyncEvent::Progress {
            playlist_id: "pl-1".to_string(),
            phase: "creating playlist".to_string(),
        });

        bus.emit(event.clone()).ok();

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream =
            EventStream::new(bus.subscribe()).filter(|event| matches!(event, CoreEvent::Sync(_)));

        bus.emit(CoreEvent::Playlist(PlaylistEvent::Updated {
            playlist_id: "pl-1".to_string(),
            change_type: "materialized".to_string(),
        }))
        .ok();

        let sync_event = CoreEvent::Sync(SyncEvent::Completed {
            playlist_id: "pl-1".to_string(),
            external_id: "ext-1".to_string(),
            versions_uploaded: 3,
        });
        bus.emit(sync_event.clone()).ok();

        assert_eq!(stream.recv().await.unwrap(), sync_event);
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit(CoreEvent::Sync(SyncEvent::Progress {
                playlist_id: format!("pl-{}", i),
                phase: "uploading versions".to_string(),
            }))
            .ok();
        }

        let result = sub.recv().await;
        assert!(matches!(result, Err(RecvError::Lagged(_))));
    }

    #[tokio::test]
    async fn test_event_severity() {
        let error_event = CoreEvent::Sync(SyncEvent::Failed {
            playlist_id: "pl-1".to_string(),
            message: "remote unavailable".to_string(),
            recoverable: true,
        });
        assert_eq!(error_event.severity(), EventSeverity::Error);

        let warning_event = CoreEvent::Sync(SyncEvent::NameConflictDetected {
            playlist_id: "pl-1".to_string(),
            playlist_name: "Dailies".to_string(),
            project_id: "proj-1".to_string(),
            message: "name taken".to_string(),
        });
        assert_eq!(warning_event.severity(), EventSeverity::Warning);
    }

    #[tokio::test]
    async fn test_event_serialization() {
        let event = CoreEvent::Playlist(PlaylistEvent::PendingChangesDetected {
            playlist_id: "pl-1".to_string(),
            added: 2,
            removed: 1,
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("pl-1"));

        let deserialized: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, event);
    }

    #[tokio::test]
    async fn test_try_recv_empty() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe());
        assert!(stream.try_recv().is_none());
    }
}
