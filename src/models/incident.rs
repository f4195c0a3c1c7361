// src/models/incident.rs

//! Canonical incident and CAP alert entities.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Normalized five-level urgency, independent of any feed's vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Advice,
    WatchAndAct,
    EmergencyWarning,
    AllClear,
}

impl Severity {
    /// Every severity, in reporting order.
    pub const ALL: [Severity; 5] = [
        Severity::Info,
        Severity::Advice,
        Severity::WatchAndAct,
        Severity::EmergencyWarning,
        Severity::AllClear,
    ];

    /// Severity used when a feed's status code is present but unrecognized.
    pub const DEFAULT: Severity = Severity::Info;

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Advice => "advice",
            Severity::WatchAndAct => "watch_and_act",
            Severity::EmergencyWarning => "emergency_warning",
            Severity::AllClear => "all_clear",
        }
    }

    /// Watch and Act or Emergency Warning.
    pub fn is_high(&self) -> bool {
        matches!(self, Severity::WatchAndAct | Severity::EmergencyWarning)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Composite identity of an entity: unique across all sources.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub source: String,
    pub source_id: String,
}

impl EntityKey {
    pub fn new(source: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            source_id: source_id.into(),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.source, self.source_id)
    }
}

/// Engine-maintained timestamps.
///
/// Invariant: `first_seen <= last_changed <= last_seen`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lifecycle {
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub last_changed: DateTime<Utc>,
}

impl Lifecycle {
    /// Lifecycle of an entity first observed at `now`.
    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            first_seen: now,
            last_seen: now,
            last_changed: now,
        }
    }
}

/// Behaviour the reconciliation engine needs from a tracked entity.
pub trait TrackedEntity: Clone + fmt::Debug + Send + Sync + 'static {
    fn source_id(&self) -> &str;

    fn lifecycle(&self) -> &Lifecycle;

    fn lifecycle_mut(&mut self) -> &mut Lifecycle;

    /// Compare every source-derived attribute, ignoring lifecycle
    /// timestamps and zone membership.
    fn materially_eq(&self, other: &Self) -> bool;
}

/// One emergency event reported by one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    /// Feed name this incident came from
    pub source: String,

    /// Identifier assigned by the originating feed
    pub source_id: String,

    pub agency: Option<String>,

    #[serde(rename = "type")]
    pub incident_type: Option<String>,

    pub status_raw: Option<String>,

    pub severity: Severity,

    pub location_name: Option<String>,
    pub region: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,

    pub title: String,
    pub summary: String,

    /// Link to the agency's page for this incident
    pub link: Option<String>,

    /// Appliances and aircraft committed, where the feed reports them
    pub resources: Option<u32>,
    pub aircraft: Option<u32>,

    /// Time the source says the incident was last reported, in UTC
    pub reported_at: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub lifecycle: Lifecycle,

    /// Names of configured zones containing this incident
    pub in_zone: Vec<String>,
}

impl Incident {
    pub fn key(&self) -> EntityKey {
        EntityKey::new(&self.source, &self.source_id)
    }

    /// Coordinates as a `(lat, lon)` pair when both are known.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }
}

impl TrackedEntity for Incident {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut Lifecycle {
        &mut self.lifecycle
    }

    fn materially_eq(&self, other: &Self) -> bool {
        self.source == other.source
            && self.source_id == other.source_id
            && self.agency == other.agency
            && self.incident_type == other.incident_type
            && self.status_raw == other.status_raw
            && self.severity == other.severity
            && self.location_name == other.location_name
            && self.region == other.region
            && self.latitude == other.latitude
            && self.longitude == other.longitude
            && self.title == other.title
            && self.summary == other.summary
            && self.link == other.link
            && self.resources == other.resources
            && self.aircraft == other.aircraft
            && self.reported_at == other.reported_at
    }
}

/// A circular CAP area: centre point and radius.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_km: f64,
}

/// One `area` block of a CAP alert.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CapArea {
    pub description: Option<String>,

    /// Closed rings of `(lat, lon)` points
    pub polygons: Vec<Vec<(f64, f64)>>,

    pub circles: Vec<Circle>,
}

/// A Common Alerting Protocol alert, tracked on its own lifecycle stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapAlert {
    pub source: String,

    /// CAP `identifier`
    pub source_id: String,

    /// CAP `senderName`, falling back to `sender`
    pub agency: Option<String>,

    /// CAP `event`
    #[serde(rename = "type")]
    pub event: Option<String>,

    /// CAP `msgType` (Alert, Update, Cancel)
    pub status_raw: Option<String>,

    pub severity: Severity,

    /// CAP `severity`, `urgency` and `certainty` as published
    pub cap_severity: Option<String>,
    pub urgency: Option<String>,
    pub certainty: Option<String>,

    pub headline: Option<String>,
    pub description: Option<String>,
    pub instruction: Option<String>,

    pub location_name: Option<String>,
    pub region: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub areas: Vec<CapArea>,

    pub title: String,
    pub summary: String,
    pub link: Option<String>,

    pub effective: Option<DateTime<Utc>>,
    pub expires: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub lifecycle: Lifecycle,

    pub in_zone: Vec<String>,
}

impl CapAlert {
    pub fn key(&self) -> EntityKey {
        EntityKey::new(&self.source, &self.source_id)
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }
}

impl TrackedEntity for CapAlert {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut Lifecycle {
        &mut self.lifecycle
    }

    fn materially_eq(&self, other: &Self) -> bool {
        // Only lifecycle and zone membership are excluded.
        let mut other = other.clone();
        other.lifecycle = self.lifecycle;
        other.in_zone.clone_from(&self.in_zone);
        *self == other
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_severity_serializes_snake_case() {
        let json = serde_json::to_string(&Severity::WatchAndAct).unwrap();
        assert_eq!(json, "\"watch_and_act\"");
        assert_eq!(Severity::EmergencyWarning.to_string(), "emergency_warning");
    }

    #[test]
    fn test_high_severity_covers_watch_and_act_and_emergency() {
        let high: Vec<_> = Severity::ALL.iter().filter(|s| s.is_high()).collect();
        assert_eq!(high, vec![&Severity::WatchAndAct, &Severity::EmergencyWarning]);
    }

    #[test]
    fn test_material_comparison_ignores_lifecycle_and_zones() {
        let a = incident("1", Severity::Advice);
        let mut b = a.clone();
        b.lifecycle = Lifecycle::starting_at(t(30));
        b.in_zone = vec!["home".to_string()];
        assert!(a.materially_eq(&b));

        b.status_raw = Some("CONTAINED".to_string());
        assert!(!a.materially_eq(&b));
    }

    #[test]
    fn test_incident_payload_flattens_lifecycle() {
        let value = serde_json::to_value(incident("42", Severity::Info)).unwrap();
        assert_eq!(value["source_id"], "42");
        assert_eq!(value["type"], "Grass Fire");
        assert!(value.get("first_seen").is_some());
        assert!(value.get("lifecycle").is_none());
    }
}
