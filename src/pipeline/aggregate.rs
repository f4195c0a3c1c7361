// src/pipeline/aggregate.rs

//! Read-only projections over every source's live entities.
//!
//! The view is rebuilt from scratch after each reconciliation pass; nothing
//! is maintained incrementally.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{CapAlert, EntityKey, Incident, Severity, ZoneSet};

/// Whole minutes since `first_seen`, never negative.
pub fn duration_minutes(first_seen: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - first_seen).num_minutes().max(0)
}

/// Snapshot of all live incidents and CAP alerts at one instant.
#[derive(Debug, Clone, Default)]
pub struct AggregateView {
    incidents: Vec<Incident>,
    alerts: Vec<CapAlert>,
    zones: ZoneSet,
    computed_at: Option<DateTime<Utc>>,
}

impl AggregateView {
    /// Build the view, re-deriving zone membership for every entity.
    pub fn compute(
        mut incidents: Vec<Incident>,
        mut alerts: Vec<CapAlert>,
        zones: &ZoneSet,
        now: DateTime<Utc>,
    ) -> Self {
        for incident in &mut incidents {
            incident.in_zone = zones.zones_containing(incident.coordinates());
        }
        for alert in &mut alerts {
            alert.in_zone = zones.zones_for_areas(&alert.areas, alert.coordinates());
        }
        incidents.sort_by(|a, b| a.key().cmp(&b.key()));
        alerts.sort_by(|a, b| a.key().cmp(&b.key()));

        Self {
            incidents,
            alerts,
            zones: zones.clone(),
            computed_at: Some(now),
        }
    }

    pub fn incidents(&self) -> &[Incident] {
        &self.incidents
    }

    pub fn alerts(&self) -> &[CapAlert] {
        &self.alerts
    }

    pub fn computed_at(&self) -> Option<DateTime<Utc>> {
        self.computed_at
    }

    /// Live incidents across all sources.
    pub fn active_count(&self) -> usize {
        self.incidents.len()
    }

    /// Incident count per severity; every severity is present.
    pub fn count_by_severity(&self) -> BTreeMap<Severity, usize> {
        let mut counts: BTreeMap<Severity, usize> =
            Severity::ALL.iter().map(|s| (*s, 0)).collect();
        for incident in &self.incidents {
            *counts.entry(incident.severity).or_default() += 1;
        }
        counts
    }

    /// Incidents at Watch and Act or Emergency Warning.
    pub fn high_severity(&self) -> Vec<&Incident> {
        self.incidents
            .iter()
            .filter(|i| i.severity.is_high())
            .collect()
    }

    pub fn duration_minutes(&self, incident: &Incident, now: DateTime<Utc>) -> i64 {
        duration_minutes(incident.lifecycle.first_seen, now)
    }

    /// Configured zones containing the incident right now.
    pub fn zones_for(&self, incident: &Incident) -> Vec<String> {
        self.zones.zones_containing(incident.coordinates())
    }

    /// Incidents inside the named zone.
    pub fn in_zone(&self, zone: &str) -> Vec<&Incident> {
        self.incidents
            .iter()
            .filter(|i| i.in_zone.iter().any(|z| z == zone))
            .collect()
    }

    pub fn summary(&self) -> AggregateSummary {
        let mut zone_counts: BTreeMap<String, usize> = self
            .zones
            .zones()
            .iter()
            .map(|z| (z.name.clone(), 0))
            .collect();
        for incident in &self.incidents {
            for zone in &incident.in_zone {
                *zone_counts.entry(zone.clone()).or_default() += 1;
            }
        }

        AggregateSummary {
            active_count: self.active_count(),
            count_by_severity: self
                .count_by_severity()
                .into_iter()
                .map(|(severity, count)| (severity.as_str().to_string(), count))
                .collect(),
            high_severity: self.high_severity().iter().map(|i| i.key()).collect(),
            cap_alert_count: self.alerts.len(),
            zone_counts,
            computed_at: self.computed_at,
        }
    }
}

/// Serializable projection carried by `aggregate_updated` events.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateSummary {
    pub active_count: usize,
    pub count_by_severity: BTreeMap<String, usize>,
    pub high_severity: Vec<EntityKey>,
    pub cap_alert_count: usize,
    /// Incidents per configured zone
    pub zone_counts: BTreeMap<String, usize>,
    pub computed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::{incident, t};
    use crate::models::{Zone, ZoneShape};

    fn zones() -> ZoneSet {
        ZoneSet::new(vec![Zone {
            name: "backyard".to_string(),
            shape: ZoneShape::Circle {
                latitude: -35.07,
                longitude: 138.86,
                radius_km: 10.0,
            },
        }])
    }

    fn view() -> AggregateView {
        let mut far = incident("3", Severity::EmergencyWarning);
        far.latitude = Some(-31.95);
        far.longitude = Some(115.86);
        let mut unplaced = incident("4", Severity::Info);
        unplaced.latitude = None;

        AggregateView::compute(
            vec![
                incident("1", Severity::WatchAndAct),
                incident("2", Severity::Advice),
                far,
                unplaced,
            ],
            Vec::new(),
            &zones(),
            t(30),
        )
    }

    #[test]
    fn test_severity_counts_are_zero_filled_and_sum_to_active() {
        let view = view();
        let counts = view.count_by_severity();
        assert_eq!(counts.len(), Severity::ALL.len());
        assert_eq!(counts[&Severity::AllClear], 0);
        assert_eq!(counts[&Severity::Info], 1);
        assert_eq!(counts.values().sum::<usize>(), view.active_count());
    }

    #[test]
    fn test_empty_view_still_has_every_severity() {
        let view = AggregateView::default();
        let counts = view.count_by_severity();
        assert_eq!(counts.len(), 5);
        assert_eq!(counts.values().sum::<usize>(), 0);
        assert_eq!(view.active_count(), 0);
    }

    #[test]
    fn test_high_severity_subset() {
        let view = view();
        let ids: Vec<&str> = view
            .high_severity()
            .iter()
            .map(|i| i.source_id.as_str())
            .collect();
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[test]
    fn test_zone_membership_is_rederived() {
        let view = view();
        assert_eq!(view.incidents()[0].in_zone, vec!["backyard".to_string()]);
        assert!(view.incidents()[2].in_zone.is_empty());
        assert!(view.zones_for(&view.incidents()[3]).is_empty());
        assert_eq!(view.in_zone("backyard").len(), 2);
    }

    #[test]
    fn test_duration_is_computed_on_read() {
        let view = view();
        let first = &view.incidents()[0];
        assert_eq!(view.duration_minutes(first, t(30)), 30);
        assert_eq!(view.duration_minutes(first, t(45)), 45);
        assert_eq!(duration_minutes(t(10), t(0)), 0);
    }

    #[test]
    fn test_summary_serializes() {
        let summary = view().summary();
        assert_eq!(summary.active_count, 4);
        assert_eq!(summary.zone_counts["backyard"], 2);
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["count_by_severity"]["watch_and_act"], 1);
        assert_eq!(value["high_severity"][0]["source_id"], "1");
    }
}
