// src/pipeline/mod.rs

//! Reconciliation core.
//!
//! - `normalize`: raw records to canonical entities
//! - `reconcile`: per-source lifecycle merging
//! - `aggregate`: cross-source projections
//! - `backoff` / `scheduler`: resilient per-source polling
//! - `coordinator`: owned state tying the stages together
//! - `events`: lifecycle messages and the bus that carries them

pub mod aggregate;
pub mod backoff;
pub mod coordinator;
pub mod diagnostics;
pub mod events;
pub mod normalize;
pub mod reconcile;
pub mod scheduler;

pub use aggregate::{AggregateSummary, AggregateView, duration_minutes};
pub use backoff::{Backoff, BackoffPolicy};
pub use coordinator::{Coordinator, SourceSlot, SourceStatus};
pub use diagnostics::Diagnostics;
pub use events::{ChannelBus, Event, EventBus, EventType, LifecycleStream};
pub use normalize::{Normalized, NormalizedSnapshot, normalize, normalize_snapshot};
pub use reconcile::{MergeOutcome, ReconciliationEngine};
pub use scheduler::Scheduler;
