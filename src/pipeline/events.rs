// src/pipeline/events.rs

//! Lifecycle events and the bus that delivers them.
//!
//! Events are discrete messages pushed onto one unbounded channel per
//! listener, so a slow consumer never blocks reconciliation. Delivery is
//! at-least-once to each listener alive at publish time, in publish order.

use std::fmt;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::models::{CapAlert, Incident, TrackedEntity};

use super::aggregate::duration_minutes;

/// Kind of event carried on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    IncidentCreated,
    IncidentUpdated,
    IncidentRemoved,
    CapAlertCreated,
    CapAlertUpdated,
    CapAlertRemoved,
    AggregateUpdated,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::IncidentCreated => "incident_created",
            EventType::IncidentUpdated => "incident_updated",
            EventType::IncidentRemoved => "incident_removed",
            EventType::CapAlertCreated => "cap_alert_created",
            EventType::CapAlertUpdated => "cap_alert_updated",
            EventType::CapAlertRemoved => "cap_alert_removed",
            EventType::AggregateUpdated => "aggregate_updated",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An entity stream with its own created/updated/removed event types.
pub trait LifecycleStream: TrackedEntity + Serialize {
    const CREATED: EventType;
    const UPDATED: EventType;
    const REMOVED: EventType;
}

impl LifecycleStream for Incident {
    const CREATED: EventType = EventType::IncidentCreated;
    const UPDATED: EventType = EventType::IncidentUpdated;
    const REMOVED: EventType = EventType::IncidentRemoved;
}

impl LifecycleStream for CapAlert {
    const CREATED: EventType = EventType::CapAlertCreated;
    const UPDATED: EventType = EventType::CapAlertUpdated;
    const REMOVED: EventType = EventType::CapAlertRemoved;
}

/// One published event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_type: EventType,
    pub emitted_at: DateTime<Utc>,
    /// Flattened entity fields plus `duration_minutes`, or the aggregate
    /// summary for `aggregate_updated`
    pub payload: serde_json::Value,
}

impl Event {
    /// Lifecycle event for `entity`, stamped at `now`.
    pub fn lifecycle<T: LifecycleStream>(
        event_type: EventType,
        entity: &T,
        now: DateTime<Utc>,
    ) -> serde_json::Result<Self> {
        let mut payload = serde_json::to_value(entity)?;
        if let Some(fields) = payload.as_object_mut() {
            fields.insert(
                "duration_minutes".to_string(),
                duration_minutes(entity.lifecycle().first_seen, now).into(),
            );
        }
        Ok(Self {
            event_type,
            emitted_at: now,
            payload,
        })
    }

    /// `aggregate_updated` event carrying any serializable summary.
    pub fn aggregate<S: Serialize>(summary: &S, now: DateTime<Utc>) -> serde_json::Result<Self> {
        Ok(Self {
            event_type: EventType::AggregateUpdated,
            emitted_at: now,
            payload: serde_json::to_value(summary)?,
        })
    }

    /// `source/source_id` of a lifecycle payload.
    pub fn entity_key(&self) -> Option<String> {
        let source = self.payload.get("source")?.as_str()?;
        let id = self.payload.get("source_id")?.as_str()?;
        Some(format!("{}/{}", source, id))
    }
}

/// Destination for published events.
pub trait EventBus: Send + Sync {
    fn publish(&self, event: Event);
}

/// Fan-out bus backed by one unbounded channel per listener.
#[derive(Debug, Default)]
pub struct ChannelBus {
    listeners: RwLock<Vec<mpsc::UnboundedSender<Event>>>,
}

impl ChannelBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener; it receives every event published from now on.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Event> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(tx);
        rx
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

impl EventBus for ChannelBus {
    fn publish(&self, event: Event) {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        log::debug!("Publishing {} to {} listener(s)", event.event_type, listeners.len());
        // Listeners that hung up are dropped.
        listeners.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
