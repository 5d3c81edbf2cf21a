//! # Event Bus System
//!
//! Broadcasts export lifecycle events to any number of in-process
//! subscribers using `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! The worker publishes an [`ExportEvent`] each time a job changes phase or
//! persists progress. Nothing in the export pipeline depends on a subscriber
//! being present; emission with zero subscribers is not an error for callers
//! that use [`EventBus::publish`].
//!
//! ```text
//! ┌──────────────┐     emit      ┌───────────┐    subscribe    ┌────────────┐
//! │ Export Worker├──────────────>│ EventBus  ├────────────────>│ Subscriber │
//! └──────────────┘               │ (broadcast│                 └────────────┘
//! ┌──────────────┐     emit      │  channel) │    subscribe    ┌────────────┐
//! │ Worker Loop  ├──────────────>│           ├────────────────>│ Subscriber │
//! └──────────────┘               └───────────┘                 └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, ExportEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut subscriber = event_bus.subscribe();
//!
//! event_bus.publish(CoreEvent::Export(ExportEvent::Cancelled {
//!     job_id: "job-1".to_string(),
//! }));
//!
//! let event = subscriber.recv().await.unwrap();
//! assert!(matches!(event, CoreEvent::Export(ExportEvent::Cancelled { .. })));
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events and can keep
//!   receiving.
//! - **`RecvError::Closed`**: every sender was dropped. Treat it as shutdown.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Per-job export lifecycle
    Export(ExportEvent),
    /// Worker loop lifecycle
    Worker(WorkerEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Export(e) => e.description(),
            CoreEvent::Worker(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Export(ExportEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Export(ExportEvent::RateLimited { .. }) => EventSeverity::Warning,
            CoreEvent::Export(ExportEvent::Completed { .. }) => EventSeverity::Info,
            CoreEvent::Worker(_) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }

    /// Job the event belongs to, if any.
    pub fn job_id(&self) -> Option<&str> {
        match self {
            CoreEvent::Export(e) => Some(e.job_id()),
            CoreEvent::Worker(_) => None,
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
// Export Events
// ============================================================================

/// Events emitted while a single export job runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ExportEvent {
    /// A worker claimed the job.
    Started {
        job_id: String,
        /// Platform identifier, e.g. `spotify`
        platform: String,
        /// Number of tracks loaded from the source.
        total_tracks: u32,
    },
    /// Progress was persisted.
    Progress {
        job_id: String,
        /// 0-100
        progress: u8,
        step: String,
    },
    /// A platform call hit a rate limit and will be retried.
    RateLimited {
        job_id: String,
        retry_count: u32,
        retry_in_ms: u64,
    },
    /// The destination playlist now exists on the platform.
    PlaylistCreated {
        job_id: String,
        playlist_id: String,
        playlist_url: String,
    },
    /// The job reached `completed`.
    Completed {
        job_id: String,
        exported_tracks: u32,
        failed_tracks: u32,
        playlist_url: Option<String>,
    },
    /// The job reached `failed`.
    Failed { job_id: String, message: String },
    /// The worker observed the job as cancelled and stopped.
    Cancelled { job_id: String },
}

impl ExportEvent {
    fn description(&self) -> &str {
        match self {
            ExportEvent::Started { .. } => "Export started",
            ExportEvent::Progress { .. } => "Export progress",
            ExportEvent::RateLimited { .. } => "Export rate limited",
            ExportEvent::PlaylistCreated { .. } => "Destination playlist created",
            ExportEvent::Completed { .. } => "Export completed",
            ExportEvent::Failed { .. } => "Export failed",
            ExportEvent::Cancelled { .. } => "Export cancelled",
        }
    }

    pub fn job_id(&self) -> &str {
        match self {
            ExportEvent::Started { job_id, .. }
            | ExportEvent::Progress { job_id, .. }
            | ExportEvent::RateLimited { job_id, .. }
            | ExportEvent::PlaylistCreated { job_id, .. }
            | ExportEvent::Completed { job_id, .. }
            | ExportEvent::Failed { job_id, .. }
            | ExportEvent::Cancelled { job_id } => job_id,
        }
    }
}

// ============================================================================
// Worker Events
// ============================================================================

/// Events emitted by the polling worker loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum WorkerEvent {
    Started { max_concurrent_jobs: usize },
    Stopped { jobs_started: u64 },
}

impl WorkerEvent {
    fn description(&self) -> &str {
        match self {
            WorkerEvent::Started { .. } => "Export worker started",
            WorkerEvent::Stopped { .. } => "Export worker stopped",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel for [`CoreEvent`]s.
///
/// Cloning is cheap; every clone publishes to the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// Subscribers that fall behind by more than `capacity` events receive
    /// `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Publishes an event, ignoring the absence of subscribers.
    pub fn publish(&self, event: CoreEvent) {
        let _ = self.sender.send(event);
    }

    /// Creates a new subscriber. Past events are not replayed.
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

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional filter.
///
/// ```rust
/// use core_runtime::events::{EventBus, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let job_events = EventStream::new(event_bus.subscribe()).for_job("job-1");
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only yield events matching `predicate`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Only yield events for one export job.
    pub fn for_job(self, job_id: impl Into<String>) -> Self {
        let job_id = job_id.into();
        self.filter(move |event| event.job_id() == Some(job_id.as_str()))
    }

    fn matches(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n`
    /// events, or `RecvError::Closed` once all senders are dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive a matching event without blocking.
    ///
    /// Returns `None` if no events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.matches(&event) {
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
