// src/pipeline/coordinator.rs

//! Owned per-source state and the poll pipeline.
//!
//! Each registered source gets its own slot: adapter, reconciliation engine,
//! backoff and status. A poll is `fetch → normalize → merge → publish`;
//! the fetch runs without holding the slot lock, and everything after it
//! runs under the lock so two polls of the same source never interleave.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use crate::error::Result;
use crate::models::{
    CapAlert, Config, FeedConfig, Incident, RemovalPolicy, SourceKind, ZoneSet,
};
use crate::services::{SourceAdapter, build_adapter};
use crate::utils::http::create_async_client;

use super::aggregate::AggregateView;
use super::backoff::{Backoff, BackoffPolicy};
use super::events::{Event, EventBus, LifecycleStream};
use super::normalize::{NormalizedSnapshot, normalize_snapshot};
use super::reconcile::{MergeOutcome, ReconciliationEngine};

/// Observable health of one source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceStatus {
    pub name: String,
    pub kind: SourceKind,
    pub region: String,
    pub url: String,
    pub base_interval_secs: u64,
    pub next_delay_secs: u64,
    pub consecutive_failures: u32,
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Live entities held for this source
    pub entity_count: usize,
    /// Records dropped by the normalizer on the last successful poll
    pub dropped_records: usize,
}

/// Reconciliation state for the entity stream a source produces.
#[derive(Debug)]
enum SourceEngine {
    Incidents(ReconciliationEngine<Incident>),
    Alerts(ReconciliationEngine<CapAlert>),
}

impl SourceEngine {
    fn new(feed: &FeedConfig, policy: RemovalPolicy) -> Self {
        match feed.kind {
            SourceKind::Cap => Self::Alerts(ReconciliationEngine::new(&feed.name, policy)),
            SourceKind::Criimson | SourceKind::Bushfire => {
                Self::Incidents(ReconciliationEngine::new(&feed.name, policy))
            }
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Incidents(engine) => engine.len(),
            Self::Alerts(engine) => engine.len(),
        }
    }

    /// Tag zones, merge and turn the outcome into ordered events.
    fn reconcile(
        &mut self,
        snapshot: NormalizedSnapshot,
        zones: &ZoneSet,
        now: DateTime<Utc>,
    ) -> Vec<Event> {
        match self {
            Self::Incidents(engine) => {
                let mut incidents = snapshot.incidents;
                for incident in &mut incidents {
                    incident.in_zone = zones.zones_containing(incident.coordinates());
                }
                lifecycle_events(engine.merge(incidents, now), now)
            }
            Self::Alerts(engine) => {
                let mut alerts = snapshot.alerts;
                for alert in &mut alerts {
                    alert.in_zone = zones.zones_for_areas(&alert.areas, alert.coordinates());
                }
                lifecycle_events(engine.merge(alerts, now), now)
            }
        }
    }
}

/// Created, then updated, then removed.
fn lifecycle_events<T: LifecycleStream>(outcome: MergeOutcome<T>, now: DateTime<Utc>) -> Vec<Event> {
    let created = outcome.created.iter().map(|e| (T::CREATED, e));
    let updated = outcome.updated.iter().map(|e| (T::UPDATED, e));
    let removed = outcome.removed.iter().map(|e| (T::REMOVED, e));

    created
        .chain(updated)
        .chain(removed)
        .filter_map(|(event_type, entity)| {
            Event::lifecycle(event_type, entity, now)
                .map_err(|e| log::error!("Cannot encode {} event: {}", event_type, e))
                .ok()
        })
        .collect()
}

#[derive(Debug)]
struct SourceState {
    engine: SourceEngine,
    backoff: Backoff,
    last_attempt: Option<DateTime<Utc>>,
    last_success: Option<DateTime<Utc>>,
    last_error: Option<String>,
    dropped_records: usize,
}

/// One registered source.
pub struct SourceSlot {
    feed: FeedConfig,
    adapter: Arc<dyn SourceAdapter>,
    state: Mutex<SourceState>,
}

impl SourceSlot {
    pub fn name(&self) -> &str {
        &self.feed.name
    }

    pub fn feed(&self) -> &FeedConfig {
        &self.feed
    }

    pub async fn status(&self) -> SourceStatus {
        let state = self.state.lock().await;
        SourceStatus {
            name: self.feed.name.clone(),
            kind: self.feed.kind,
            region: self.feed.region.clone(),
            url: self.feed.url.clone(),
            base_interval_secs: state.backoff.base_interval().as_secs(),
            next_delay_secs: state.backoff.next_delay().as_secs(),
            consecutive_failures: state.backoff.consecutive_failures(),
            last_attempt: state.last_attempt,
            last_success: state.last_success,
            last_error: state.last_error.clone(),
            entity_count: state.engine.len(),
            dropped_records: state.dropped_records,
        }
    }
}

/// Owner of every source's state, the zone set and the latest aggregate.
pub struct Coordinator {
    sources: RwLock<Vec<Arc<SourceSlot>>>,
    policy: RemovalPolicy,
    backoff: BackoffPolicy,
    zones: ZoneSet,
    bus: Arc<dyn EventBus>,
    latest: RwLock<Arc<AggregateView>>,
    /// Held from snapshot collection until the view is published.
    recompute: Mutex<()>,
}

impl Coordinator {
    pub fn new(
        policy: RemovalPolicy,
        backoff: BackoffPolicy,
        zones: ZoneSet,
        bus: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            sources: RwLock::new(Vec::new()),
            policy,
            backoff,
            zones,
            bus,
            latest: RwLock::new(Arc::new(AggregateView::default())),
            recompute: Mutex::new(()),
        }
    }

    /// Coordinator with no sources, configured from `config`.
    pub fn from_config(config: &Config, bus: Arc<dyn EventBus>) -> Self {
        Self::new(
            config.removal_policy(),
            BackoffPolicy::from(&config.retry),
            config.zone_set(),
            bus,
        )
    }

    /// HTTP adapters for every active feed in `config`, with intervals.
    pub fn adapters_from_config(
        config: &Config,
    ) -> Result<Vec<(FeedConfig, Arc<dyn SourceAdapter>, Duration)>> {
        let client = create_async_client(&config.http)?;
        Ok(config
            .active_feeds()
            .map(|feed| {
                let adapter = build_adapter(feed, client.clone(), config.http.timeout_secs);
                (feed.clone(), adapter, config.interval_for(feed))
            })
            .collect())
    }

    /// Add a source polled every `base_interval` while healthy.
    pub async fn register(
        &self,
        feed: FeedConfig,
        adapter: Arc<dyn SourceAdapter>,
        base_interval: Duration,
    ) -> Arc<SourceSlot> {
        let state = SourceState {
            engine: SourceEngine::new(&feed, self.policy),
            backoff: Backoff::new(self.backoff, base_interval),
            last_attempt: None,
            last_success: None,
            last_error: None,
            dropped_records: 0,
        };
        let slot = Arc::new(SourceSlot {
            feed,
            adapter,
            state: Mutex::new(state),
        });
        log::info!(
            "Registered source {} ({}, every {}s)",
            slot.name(),
            slot.feed.kind,
            base_interval.as_secs()
        );
        self.sources.write().await.push(slot.clone());
        slot
    }

    pub async fn sources(&self) -> Vec<Arc<SourceSlot>> {
        self.sources.read().await.clone()
    }

    pub fn zones(&self) -> &ZoneSet {
        &self.zones
    }

    /// Poll one source once; returns the delay before its next natural poll.
    ///
    /// Fetch failures never touch reconciliation state; they only advance
    /// the source's backoff.
    pub async fn poll(&self, slot: &SourceSlot) -> Duration {
        let started = Utc::now();
        let fetched = slot.adapter.fetch().await;

        let mut state = slot.state.lock().await;
        state.last_attempt = Some(started);

        let (delay, reconciled) = match fetched {
            Ok(records) => {
                let now = Utc::now().max(started);
                let total = records.len();
                let snapshot = normalize_snapshot(&slot.feed, records, now);
                state.dropped_records = snapshot.dropped.len();

                let events = state.engine.reconcile(snapshot, &self.zones, now);
                for event in events {
                    self.bus.publish(event);
                }

                state.last_success = Some(now);
                state.last_error = None;
                log::debug!(
                    "[{}] fetched {} record(s), {} dropped",
                    slot.name(),
                    total,
                    state.dropped_records
                );
                (state.backoff.record_success(), true)
            }
            Err(e) => {
                let delay = state.backoff.record_failure();
                log::warn!(
                    "[{}] fetch failed ({} in a row), retrying in {}s: {}",
                    slot.name(),
                    state.backoff.consecutive_failures(),
                    delay.as_secs(),
                    e
                );
                state.last_error = Some(e.to_string());
                (delay, false)
            }
        };
        drop(state);

        if reconciled {
            self.recompute_aggregate().await;
        }
        delay
    }

    /// Poll every source once, concurrently.
    pub async fn poll_all(&self) {
        let sources = self.sources().await;
        join_all(sources.iter().map(|slot| self.poll(slot))).await;
    }

    /// Rebuild the aggregate from every source and publish it.
    ///
    /// Recomputes are serialized, so a view built from older source state
    /// can never replace or follow one built from newer state.
    pub async fn recompute_aggregate(&self) -> Arc<AggregateView> {
        let _guard = self.recompute.lock().await;
        let mut incidents = Vec::new();
        let mut alerts = Vec::new();
        for slot in self.sources().await {
            let state = slot.state.lock().await;
            match &state.engine {
                SourceEngine::Incidents(engine) => incidents.extend(engine.entities().cloned()),
                SourceEngine::Alerts(engine) => alerts.extend(engine.entities().cloned()),
            }
        }

        let now = Utc::now();
        let view = Arc::new(AggregateView::compute(incidents, alerts, &self.zones, now));
        *self.latest.write().await = view.clone();

        match Event::aggregate(&view.summary(), now) {
            Ok(event) => self.bus.publish(event),
            Err(e) => log::error!("Cannot encode aggregate event: {}", e),
        }
        view
    }

    /// Aggregate as of the last reconciliation pass.
    pub async fn aggregate(&self) -> Arc<AggregateView> {
        self.latest.read().await.clone()
    }

    pub async fn statuses(&self) -> Vec<SourceStatus> {
        let mut statuses = Vec::new();
        for slot in self.sources().await {
            statuses.push(slot.status().await);
        }
        statuses
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted adapters shared by pipeline tests.

    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::error::FetchError;
    use crate::models::{CriimsonRecord, RawRecord};

    pub fn feed(name: &str) -> FeedConfig {
        FeedConfig {
            name: name.to_string(),
            kind: SourceKind::Criimson,
            region: "SA".to_string(),
            url: format!("https://example.com/{}.json", name),
            enabled: true,
            interval_secs: None,
            utc_offset_minutes: 570,
        }
    }

    pub fn record(id: &str, level: &str) -> RawRecord {
        RawRecord::Criimson(CriimsonRecord {
            incident_no: Some(id.to_string()),
            location_name: Some("Mount Barker".to_string()),
            location: Some("-35.07,138.86".to_string()),
            incident_type: Some("Grass Fire".to_string()),
            level: Some(level.to_string()),
            ..CriimsonRecord::default()
        })
    }

    /// Plays back a fixed sequence of fetch results, then keeps failing.
    pub struct ScriptedAdapter {
        name: String,
        script: std::sync::Mutex<VecDeque<std::result::Result<Vec<RawRecord>, FetchError>>>,
        pub calls: AtomicUsize,
    }

    impl ScriptedAdapter {
        pub fn new(
            name: &str,
            script: Vec<std::result::Result<Vec<RawRecord>, FetchError>>,
        ) -> Self {
            Self {
                name: name.to_string(),
                script: std::sync::Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn failing(name: &str) -> Self {
            Self::new(name, Vec::new())
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SourceAdapter for ScriptedAdapter {
        fn name(&self) -> &str {
            &self.name
        }

        fn kind(&self) -> SourceKind {
            SourceKind::Criimson
        }

        async fn fetch(&self) -> std::result::Result<Vec<RawRecord>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(FetchError::Status(503)))
        }
    }

    /// Scripted adapter whose first fetch holds until `release` is called.
    pub struct GatedAdapter {
        inner: ScriptedAdapter,
        gate: tokio::sync::Notify,
    }

    impl GatedAdapter {
        pub fn new(
            name: &str,
            script: Vec<std::result::Result<Vec<RawRecord>, FetchError>>,
        ) -> Self {
            Self {
                inner: ScriptedAdapter::new(name, script),
                gate: tokio::sync::Notify::new(),
            }
        }

        pub fn release(&self) {
            self.gate.notify_one();
        }

        pub fn calls(&self) -> usize {
            self.inner.calls()
        }
    }

    #[async_trait]
    impl SourceAdapter for GatedAdapter {
        fn name(&self) -> &str {
            self.inner.name()
        }

        fn kind(&self) -> SourceKind {
            self.inner.kind()
        }

        async fn fetch(&self) -> std::result::Result<Vec<RawRecord>, FetchError> {
            let first = self.inner.calls() == 0;
            let result = self.inner.fetch().await;
            if first {
                self.gate.notified().await;
            }
            result
        }
    }
}
