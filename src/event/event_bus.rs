//! # Event Bus Implementation
//!
//! The EventBus is the side channel the kernel uses to tell the outside world
//! about things that are not part of a request/response exchange: model
//! download progress, model switches, default-model changes coming from the
//! settings source, and kernel shutdowns.
//!
//! ## Design Decisions
//!
//! The implementation uses Tokio's broadcast channel so that:
//!
//! 1. Any number of listeners (progress bars, loggers, tests) can observe the same event
//! 2. Publishing never blocks the request path
//! 3. Publishing succeeds whether or not anybody is listening
//!
//! The bus keeps an internal receiver alive for each channel, so a publish
//! with zero external subscribers is still `Ok`. Slow subscribers lag and
//! lose the oldest events instead of slowing the publisher down.

use futures::Stream;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_stream::{
    wrappers::{errors::BroadcastStreamRecvError, BroadcastStream},
    StreamExt,
};
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// Name under which progress notifications are broadcast.
pub const PROGRESS_EVENT: &str = "llmkernel:progress";

/// Model download / session setup progress.
///
/// `progress` is always within `[0.0, 1.0]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub progress: f32,
    pub text: String,
}

impl ProgressEvent {
    pub fn new(progress: f32, text: impl Into<String>) -> Self {
        let progress = if progress.is_nan() {
            0.0
        } else {
            progress.clamp(0.0, 1.0)
        };
        Self {
            progress,
            text: text.into(),
        }
    }
}

/// # Event
///
/// A discrete notification published on the [`EventBus`].
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Engine progress republished while a model is created or downloaded
    Progress(ProgressEvent),
    /// A kernel session finished initializing a model
    ModelLoaded { session_id: Uuid, model: String },
    /// The settings source changed the default model (last write wins)
    DefaultModelChanged { model: Option<String> },
    /// A kernel session received a shutdown request
    KernelShutdown { session_id: Uuid },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::Progress(_) => PROGRESS_EVENT,
            Event::ModelLoaded { .. } => "llmkernel:model-loaded",
            Event::DefaultModelChanged { .. } => "llmkernel:default-model-changed",
            Event::KernelShutdown { .. } => "llmkernel:kernel-shutdown",
        }
    }

    pub fn progress(progress: f32, text: impl Into<String>) -> Self {
        Event::Progress(ProgressEvent::new(progress, text))
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ErrorEvent {
    pub error_type: String,
    pub message: String,
    pub severity: ErrorSeverity,
    pub session_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum ErrorSeverity {
    #[default]
    Warning,
    Error,
    Critical,
}

/// # EventBus
///
/// Broadcast hub with two channels:
/// 1. A regular event channel for [`Event`]s
/// 2. An error event channel for failures that were already handled
///    (for example an execute request that ended in an error reply)
pub struct EventBus {
    event_sender: broadcast::Sender<Event>,
    error_sender: broadcast::Sender<ErrorEvent>,
    _internal_receiver: broadcast::Receiver<Event>,
    _internal_error_receiver: broadcast::Receiver<ErrorEvent>,
}

impl EventBus {
    /// Creates a new EventBus with the given buffer capacity.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use llmkernel::event::event_bus::EventBus;
    /// let event_bus = EventBus::new(100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (event_sender, event_receiver) = broadcast::channel(capacity);
        let (error_sender, error_receiver) = broadcast::channel(capacity);
        Self {
            event_sender,
            error_sender,
            _internal_receiver: event_receiver,
            _internal_error_receiver: error_receiver,
        }
    }

    /// Subscribes to both regular and error events.
    pub fn subscribe(&self) -> (EventReceiver, ErrorReceiver) {
        let event_rx = self.event_sender.subscribe();
        let error_rx = self.error_sender.subscribe();
        (EventReceiver::new(event_rx), ErrorReceiver::new(error_rx))
    }

    pub async fn publish(&self, event: Event) -> EventResult<()> {
        self.sync_publish(event)
    }

    /// Publishes an event without awaiting.
    ///
    /// Used from synchronous callbacks such as engine progress hooks.
    pub fn sync_publish(&self, event: Event) -> EventResult<()> {
        debug_event("Publishing", &event);
        self.event_sender
            .send(event)
            .map_err(|e| EventError::SendFailed {
                message: e.to_string(),
            })?;
        Ok(())
    }

    pub async fn publish_error(&self, error: ErrorEvent) -> EventResult<()> {
        self.sync_publish_error(error)
    }

    pub fn sync_publish_error(&self, error: ErrorEvent) -> EventResult<()> {
        debug!("Publishing error event: {:?}", error);
        self.error_sender
            .send(error)
            .map_err(|e| EventError::SendFailed {
                message: e.to_string(),
            })?;
        Ok(())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

fn debug_event(prefix: &str, event: &Event) {
    match event {
        // progress can fire hundreds of times per download
        Event::Progress(_) => trace!("{} Event: {:?}", prefix, event),
        _ => debug!("{} Event: {:?}", prefix, event),
    }
}

pub struct EventReceiver {
    pub receiver: broadcast::Receiver<Event>,
}

impl EventReceiver {
    pub fn new(receiver: broadcast::Receiver<Event>) -> Self {
        Self { receiver }
    }

    /// Receives the next event. On lag the receiver is resubscribed and
    /// `Lagged` is returned; callers may simply call `recv` again.
    pub async fn recv(&mut self) -> EventResult<Event> {
        match self.receiver.recv().await {
            Ok(event) => Ok(event),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                self.receiver = self.receiver.resubscribe();
                Err(EventError::Lagged { count: n })
            }
            Err(e) => Err(EventError::ReceiveFailed {
                message: e.to_string(),
            }),
        }
    }

    /// Turns the receiver into a stream of events. Lagged stretches are
    /// skipped with a warning; the stream ends when the bus is dropped.
    pub fn into_stream(self) -> impl Stream<Item = Event> + Send + Unpin {
        BroadcastStream::new(self.receiver).filter_map(|item| match item {
            Ok(event) => Some(event),
            Err(BroadcastStreamRecvError::Lagged(n)) => {
                warn!("event stream lagged, {} events skipped", n);
                None
            }
        })
    }

    /// Returns the next already queued event, if any.
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}

pub struct ErrorReceiver {
    pub receiver: broadcast::Receiver<ErrorEvent>,
}

impl ErrorReceiver {
    fn new(receiver: broadcast::Receiver<ErrorEvent>) -> Self {
        Self { receiver }
    }

    /// Same lag handling as [`EventReceiver::recv`].
    pub async fn recv(&mut self) -> EventResult<ErrorEvent> {
        match self.receiver.recv().await {
            Ok(error) => Ok(error),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                self.receiver = self.receiver.resubscribe();
                Err(EventError::Lagged { count: n })
            }
            Err(e) => Err(EventError::ReceiveFailed {
                message: e.to_string(),
            }),
        }
    }
}

#[derive(Error, Debug)]
pub enum EventError {
    #[error("Event Send failed: {message}")]
    SendFailed { message: String },

    #[error("Event Receive failed: {message}")]
    ReceiveFailed { message: String },

    #[error("Event lagged: {count}")]
    Lagged { count: u64 },
}

pub type EventResult<T> = Result<T, EventError>;
