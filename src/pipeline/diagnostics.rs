// src/pipeline/diagnostics.rs

//! Point-in-time diagnostics report.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{CapAlert, Config, Incident};

use super::aggregate::AggregateView;
use super::coordinator::{Coordinator, SourceStatus};

/// Effective configuration as the service runs it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigSummary {
    pub enabled_regions: Vec<String>,
    pub update_interval_secs: u64,
    pub remove_stale: bool,
    pub stale_threshold: u32,
    pub feed_count: usize,
    pub zones: Vec<String>,
}

impl From<&Config> for ConfigSummary {
    fn from(config: &Config) -> Self {
        Self {
            enabled_regions: config.general.enabled_regions.clone(),
            update_interval_secs: config.general.update_interval_secs,
            remove_stale: config.general.remove_stale,
            stale_threshold: config.general.stale_threshold,
            feed_count: config.active_feeds().count(),
            zones: config.zones.iter().map(|z| z.name.clone()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticsSummary {
    pub total_incidents: usize,
    pub high_severity_incidents: usize,
    pub total_cap_alerts: usize,
    pub severity_breakdown: std::collections::BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncidentRow {
    pub source: String,
    pub source_id: String,
    #[serde(rename = "type")]
    pub incident_type: Option<String>,
    pub severity: String,
    pub status: Option<String>,
    pub region: Option<String>,
    pub location_name: Option<String>,
    pub has_coordinates: bool,
    pub in_zone: Vec<String>,
    pub duration_minutes: i64,
}

impl IncidentRow {
    fn new(incident: &Incident, view: &AggregateView, now: DateTime<Utc>) -> Self {
        Self {
            source: incident.source.clone(),
            source_id: incident.source_id.clone(),
            incident_type: incident.incident_type.clone(),
            severity: incident.severity.to_string(),
            status: incident.status_raw.clone(),
            region: incident.region.clone(),
            location_name: incident.location_name.clone(),
            has_coordinates: incident.coordinates().is_some(),
            in_zone: incident.in_zone.clone(),
            duration_minutes: view.duration_minutes(incident, now),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapAlertRow {
    pub source: String,
    pub id: String,
    pub event: Option<String>,
    pub severity: String,
    pub headline: Option<String>,
    pub area_count: usize,
    pub in_zone: Vec<String>,
}

impl From<&CapAlert> for CapAlertRow {
    fn from(alert: &CapAlert) -> Self {
        Self {
            source: alert.source.clone(),
            id: alert.source_id.clone(),
            event: alert.event.clone(),
            severity: alert.severity.to_string(),
            headline: alert.headline.clone(),
            area_count: alert.areas.len(),
            in_zone: alert.in_zone.clone(),
        }
    }
}

/// Everything an operator needs to see why the view looks the way it does.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostics {
    pub generated_at: DateTime<Utc>,
    pub config: ConfigSummary,
    pub sources: Vec<SourceStatus>,
    pub summary: DiagnosticsSummary,
    pub incidents: Vec<IncidentRow>,
    pub cap_alerts: Vec<CapAlertRow>,
}

impl Diagnostics {
    pub fn build(
        config: &Config,
        sources: Vec<SourceStatus>,
        view: &AggregateView,
        now: DateTime<Utc>,
    ) -> Self {
        let summary = view.summary();
        Self {
            generated_at: now,
            config: ConfigSummary::from(config),
            sources,
            summary: DiagnosticsSummary {
                total_incidents: summary.active_count,
                high_severity_incidents: summary.high_severity.len(),
                total_cap_alerts: summary.cap_alert_count,
                severity_breakdown: summary.count_by_severity,
            },
            incidents: view
                .incidents()
                .iter()
                .map(|i| IncidentRow::new(i, view, now))
                .collect(),
            cap_alerts: view.alerts().iter().map(CapAlertRow::from).collect(),
        }
    }

    /// Report on the coordinator's current state.
    pub async fn collect(config: &Config, coordinator: &Coordinator) -> Self {
        let sources = coordinator.statuses().await;
        let view = coordinator.aggregate().await;
        Self::build(config, sources, &view, Utc::now())
    }
}
