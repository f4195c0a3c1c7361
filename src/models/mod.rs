// src/models/mod.rs

//! Domain models for the incident feed service.
//!
//! This module contains the data structures shared by the adapters, the
//! reconciliation core and its consumers, organized by their primary purpose.

mod config;
mod incident;
mod raw;
mod zone;

// Re-export all public types
pub use config::{
    Config, FeedConfig, GeneralConfig, HttpConfig, LoggingConfig, RemovalPolicy, RetryConfig,
    SourceKind,
};
pub use incident::{
    CapAlert, CapArea, Circle, EntityKey, Incident, Lifecycle, Severity, TrackedEntity,
};
pub use raw::{
    BushfireCollection, BushfireFeature, BushfireProperties, CapAreaRecord, CapRecord,
    CriimsonRecord, RawRecord,
};
pub use zone::{Zone, ZoneSet, ZoneShape, area_contains, centroid, haversine_km, point_in_polygon};

#[cfg(test)]
pub(crate) use incident::fixtures;
