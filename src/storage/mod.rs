// src/storage/mod.rs

//! Output sinks for reports and published events.
//!
//! Storage is write-mostly: reconciliation state is never reloaded from it,
//! so a restart starts from an empty view.
//!
//! ## Directory Structure
//!
//! ```text
//! {root}/
//! ├── diagnostics.json      # Latest diagnostics report (replaced atomically)
//! └── events.jsonl          # Every published event, one JSON object per line
//! ```

pub mod local;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::pipeline::{Diagnostics, Event};

pub use local::LocalStorage;

/// Metadata about a storage write operation.
#[derive(Debug, Clone)]
pub struct WriteMetadata {
    /// Where the data landed
    pub location: String,
    /// Bytes written by this operation
    pub bytes: usize,
    pub timestamp: DateTime<Utc>,
}

/// Trait for report and event storage backends.
#[async_trait]
pub trait ReportStorage: Send + Sync {
    /// Replace the stored diagnostics report.
    async fn write_diagnostics(&self, report: &Diagnostics) -> Result<WriteMetadata>;

    /// Append events in order.
    async fn append_events(&self, events: &[Event]) -> Result<WriteMetadata>;

    /// Load every stored event, oldest first.
    async fn load_events(&self) -> Result<Vec<Event>>;
}
