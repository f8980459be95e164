//! Analytics events and sinks.
//!
//! The engine records events (guard firings, fallback substitutions) on the
//! lesson context. Callers hand them to an [`AnalyticsSink`] once the build
//! has succeeded. [`ChannelSink`] forwards over a bounded channel and never
//! blocks the caller; events that do not fit are counted and dropped.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::card::Props;
use crate::error::SinkError;

/// Event name recorded when a guard fires.
pub const GUARD_FIRED: &str = "guard_fired";
/// Event name recorded when a card is replaced by a fallback.
pub const CARD_FALLBACK: &str = "card_fallback";

/// One telemetry entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    /// Unique event id.
    pub id: Uuid,
    /// Event name, e.g. `guard_fired`.
    pub name: String,
    /// Module the session belongs to.
    pub module_code: String,
    /// When the event was recorded.
    pub at: DateTime<Utc>,
    /// Event-specific properties.
    #[serde(default)]
    pub properties: Props,
}

impl AnalyticsEvent {
    /// Creates an event stamped with the current time.
    pub fn new(name: impl Into<String>, module_code: impl Into<String>, properties: Props) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            module_code: module_code.into(),
            at: Utc::now(),
            properties,
        }
    }
}

/// Destination for analytics events.
pub trait AnalyticsSink: Send + Sync {
    /// Publishes one event.
    ///
    /// # Errors
    ///
    /// Returns a `SinkError` if the event could not be accepted.
    fn publish(&self, event: &AnalyticsEvent) -> Result<(), SinkError>;
}

/// Sink backed by a bounded crossbeam channel.
#[derive(Debug)]
pub struct ChannelSink {
    tx: Sender<AnalyticsEvent>,
    dropped: AtomicU64,
}

impl ChannelSink {
    /// Creates a sink and the receiving end of its channel.
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, Receiver<AnalyticsEvent>) {
        let (tx, rx) = bounded(capacity.max(1));
        (
            Self {
                tx,
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    /// Number of events rejected because the channel was full or closed.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl AnalyticsSink for ChannelSink {
    fn publish(&self, event: &AnalyticsEvent) -> Result<(), SinkError> {
        match self.tx.try_send(event.clone()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Err(SinkError::Full)
            }
            Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Err(SinkError::Disconnected)
            }
        }
    }
}
