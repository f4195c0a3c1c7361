// src/pipeline/normalize.rs

//! Normalize raw feed records into canonical entities.
//!
//! Pure mapping: no state, no I/O. Severity comes from a fixed table per
//! feed kind; unknown codes map to [`Severity::DEFAULT`] so a present but
//! unrecognized incident is never lost.

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::error::NormalizationError;
use crate::models::{
    BushfireFeature, CapAlert, CapArea, CapAreaRecord, CapRecord, Circle, CriimsonRecord,
    FeedConfig, Incident, Lifecycle, RawRecord, Severity, SourceKind, centroid,
};
use crate::utils::text::{
    MAX_TEXT_GRAPHEMES, clean, normalize_whitespace, stable_id, strip_html, truncate_graphemes,
};

/// Local wall-clock formats seen across feeds.
const LOCAL_FORMATS: &[&str] = &[
    "%d/%m/%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %I:%M:%S %p",
    "%d/%m/%Y %I:%M %p",
    "%d %b %Y %H:%M",
    "%Y-%m-%d %H:%M:%S",
];

/// A canonical entity produced from one raw record.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Incident(Incident),
    CapAlert(CapAlert),
}

/// Every entity a snapshot produced, plus the records that were dropped.
#[derive(Debug, Default)]
pub struct NormalizedSnapshot {
    pub incidents: Vec<Incident>,
    pub alerts: Vec<CapAlert>,
    pub dropped: Vec<NormalizationError>,
}

/// Normalize a whole snapshot, dropping (and logging) bad records.
pub fn normalize_snapshot(
    feed: &FeedConfig,
    records: Vec<RawRecord>,
    now: DateTime<Utc>,
) -> NormalizedSnapshot {
    let mut snapshot = NormalizedSnapshot::default();
    for raw in records {
        match normalize(feed, raw, now) {
            Ok(Normalized::Incident(incident)) => snapshot.incidents.push(incident),
            Ok(Normalized::CapAlert(alert)) => snapshot.alerts.push(alert),
            Err(e) => {
                log::warn!("Dropping record: {}", e);
                snapshot.dropped.push(e);
            }
        }
    }
    snapshot
}

/// Normalize one raw record from `feed`.
///
/// Lifecycle timestamps are provisional (`now`); the reconciliation engine
/// owns their final values.
pub fn normalize(
    feed: &FeedConfig,
    raw: RawRecord,
    now: DateTime<Utc>,
) -> Result<Normalized, NormalizationError> {
    match (feed.kind, raw) {
        (SourceKind::Criimson, RawRecord::Criimson(record)) => {
            normalize_criimson(feed, record, now).map(Normalized::Incident)
        }
        (SourceKind::Cap, RawRecord::Cap(record)) => {
            normalize_cap(feed, record, now).map(Normalized::CapAlert)
        }
        (SourceKind::Bushfire, RawRecord::Bushfire(feature)) => {
            normalize_bushfire(feed, feature, now).map(Normalized::Incident)
        }
        (kind, _) => Err(NormalizationError::new(
            &feed.name,
            "record",
            format!("does not match feed kind {}", kind),
        )),
    }
}

fn normalize_criimson(
    feed: &FeedConfig,
    record: CriimsonRecord,
    now: DateTime<Utc>,
) -> Result<Incident, NormalizationError> {
    let location_name = clean(record.location_name.as_deref());
    let date = clean(record.date.as_deref());
    let time = clean(record.time.as_deref());

    let source_id = match clean(record.incident_no.as_deref()) {
        Some(id) => id,
        None if location_name.is_some() || date.is_some() || time.is_some() => {
            // Same place and report time always hash to the same id.
            let parts = [&location_name, &date, &time].map(|p| p.as_deref().unwrap_or(""));
            format!("derived-{}", stable_id(&parts))
        }
        None => {
            return Err(NormalizationError::new(
                &feed.name,
                "IncidentNo",
                "is missing and cannot be derived",
            ));
        }
    };

    let (latitude, longitude) = record
        .location
        .as_deref()
        .and_then(parse_lat_lon)
        .unzip();

    let level = clean(record.level.as_deref());
    let status = clean(record.status.as_deref());
    let severity = criimson_severity(level.as_deref(), status.as_deref());

    let agency = clean(record.service.as_deref()).or_else(|| clean(record.agency.as_deref()));
    let incident_type = clean(record.incident_type.as_deref());
    let status_raw = status.or(level);

    let reported_at = date.as_deref().and_then(|d| {
        let stamp = format!("{} {}", d, time.as_deref().unwrap_or("00:00"));
        parse_timestamp(&stamp, feed.utc_offset_minutes)
    });

    let title = derive_title(
        &[&incident_type, &location_name, &agency],
        || format!("{} Incident", feed.region),
    );
    let summary = clean(record.message.as_deref()).unwrap_or_else(|| {
        derive_summary(&incident_type, &location_name, &status_raw, &title)
    });

    Ok(Incident {
        source: feed.name.clone(),
        source_id,
        agency,
        incident_type,
        status_raw,
        severity,
        location_name,
        region: clean(record.region.as_deref()),
        latitude,
        longitude,
        title: truncate_graphemes(&title, MAX_TEXT_GRAPHEMES),
        summary: truncate_graphemes(&summary, MAX_TEXT_GRAPHEMES),
        link: clean(record.message_link.as_deref()),
        resources: parse_count(record.resources.as_deref()),
        aircraft: parse_count(record.aircraft.as_deref()),
        reported_at,
        lifecycle: Lifecycle::starting_at(now),
        in_zone: Vec::new(),
    })
}

fn normalize_cap(
    feed: &FeedConfig,
    record: CapRecord,
    now: DateTime<Utc>,
) -> Result<CapAlert, NormalizationError> {
    let source_id = clean(record.identifier.as_deref())
        .ok_or_else(|| NormalizationError::new(&feed.name, "identifier", "is missing"))?;

    let areas: Vec<CapArea> = record.areas.iter().map(parse_area).collect();
    let (latitude, longitude) = representative_area_point(&areas).unzip();

    let msg_type = clean(record.msg_type.as_deref());
    let event = clean(record.event.as_deref());
    let headline = clean(record.headline.as_deref());
    let severity = cap_severity(
        msg_type.as_deref(),
        record.severity.as_deref(),
        [event.as_deref(), headline.as_deref()],
    );

    let location_name = areas.iter().find_map(|a| a.description.clone());
    let description = record
        .description
        .as_deref()
        .map(|d| normalize_whitespace(&strip_html(d)))
        .filter(|d| !d.is_empty());
    let instruction = clean(record.instruction.as_deref());

    let title = match &headline {
        Some(headline) => headline.clone(),
        None => derive_title(&[&event, &location_name], || format!("CAP Alert {}", source_id)),
    };
    let summary = description
        .clone()
        .or_else(|| instruction.clone())
        .unwrap_or_else(|| title.clone());

    let offset = feed.utc_offset_minutes;
    Ok(CapAlert {
        source: feed.name.clone(),
        source_id,
        agency: clean(record.sender_name.as_deref()).or_else(|| clean(record.sender.as_deref())),
        event,
        status_raw: msg_type,
        severity,
        cap_severity: clean(record.severity.as_deref()),
        urgency: clean(record.urgency.as_deref()),
        certainty: clean(record.certainty.as_deref()),
        headline,
        description,
        instruction,
        location_name,
        region: Some(feed.region.clone()),
        latitude,
        longitude,
        areas,
        title: truncate_graphemes(&title, MAX_TEXT_GRAPHEMES),
        summary: truncate_graphemes(&summary, MAX_TEXT_GRAPHEMES),
        link: clean(record.web.as_deref()),
        effective: record
            .effective
            .as_deref()
            .and_then(|v| parse_timestamp(v, offset)),
        expires: record
            .expires
            .as_deref()
            .and_then(|v| parse_timestamp(v, offset)),
        lifecycle: Lifecycle::starting_at(now),
        in_zone: Vec::new(),
    })
}

fn normalize_bushfire(
    feed: &FeedConfig,
    feature: BushfireFeature,
    now: DateTime<Utc>,
) -> Result<Incident, NormalizationError> {
    let props = feature.properties;
    let point = feature.geometry.as_ref().and_then(geometry_point);

    // The link is a shared landing page, so it never identifies a fire.
    let source_id = match clean(props.guid.as_deref()) {
        Some(guid) => guid,
        None => {
            let title = clean(props.title.as_deref());
            let pub_date = clean(props.pub_date.as_deref());
            if title.is_none() && pub_date.is_none() && point.is_none() {
                return Err(NormalizationError::new(
                    &feed.name,
                    "guid",
                    "is missing and cannot be derived",
                ));
            }
            let point = point
                .map(|(lat, lon)| format!("{},{}", lat, lon))
                .unwrap_or_default();
            let parts = [
                title.as_deref().unwrap_or(""),
                pub_date.as_deref().unwrap_or(""),
                point.as_str(),
            ];
            format!("derived-{}", stable_id(&parts))
        }
    };

    let fields = props
        .description
        .as_deref()
        .map(parse_description_fields)
        .unwrap_or_default();
    let field = |key: &str| clean(fields.get(key).map(String::as_str));

    let category = clean(props.category.as_deref());
    let status_raw = field("STATUS");
    let severity = bushfire_severity(category.as_deref(), status_raw.as_deref());

    let incident_type = field("TYPE");
    let location_name = field("LOCATION").or_else(|| clean(props.title.as_deref()));
    let agency = field("RESPONSIBLE AGENCY");

    let (latitude, longitude) = point.unzip();

    let reported_at = field("UPDATED")
        .or_else(|| clean(props.pub_date.as_deref()))
        .and_then(|v| parse_timestamp(&v, feed.utc_offset_minutes));

    let title = clean(props.title.as_deref()).unwrap_or_else(|| {
        derive_title(&[&incident_type, &location_name, &agency], || {
            format!("{} Incident", feed.region)
        })
    });
    let mut summary = derive_summary(&incident_type, &location_name, &status_raw, &title);
    if let Some(size) = field("SIZE") {
        summary = format!("{}, {}", summary, size);
    }

    Ok(Incident {
        source: feed.name.clone(),
        source_id,
        agency,
        incident_type,
        status_raw,
        severity,
        location_name,
        region: field("COUNCIL AREA"),
        latitude,
        longitude,
        title: truncate_graphemes(&title, MAX_TEXT_GRAPHEMES),
        summary: truncate_graphemes(&summary, MAX_TEXT_GRAPHEMES),
        link: clean(props.link.as_deref()),
        resources: None,
        aircraft: None,
        reported_at,
        lifecycle: Lifecycle::starting_at(now),
        in_zone: Vec::new(),
    })
}

// --- Severity tables ---

/// Warning-level phrases shared by Australian feeds.
fn warning_phrase(text: &str) -> Option<Severity> {
    let text = text.to_ascii_lowercase();
    if text.contains("emergency warning") {
        Some(Severity::EmergencyWarning)
    } else if text.contains("watch and act") || text.contains("watch & act") {
        Some(Severity::WatchAndAct)
    } else if text.contains("advice") {
        Some(Severity::Advice)
    } else if text.contains("all clear") {
        Some(Severity::AllClear)
    } else {
        None
    }
}

/// CRIIMSON: warning phrases in `Level`/`Status`, then terminal statuses,
/// then numeric levels 3/2/1.
pub fn criimson_severity(level: Option<&str>, status: Option<&str>) -> Severity {
    if let Some(severity) = [level, status].into_iter().flatten().find_map(warning_phrase) {
        return severity;
    }
    if let Some(status) = status {
        let status = status.trim().to_ascii_lowercase();
        if matches!(status.as_str(), "safe" | "complete" | "completed") {
            return Severity::AllClear;
        }
    }
    match level.map(str::trim) {
        Some("3") => Severity::EmergencyWarning,
        Some("2") => Severity::WatchAndAct,
        Some("1") => Severity::Advice,
        _ => Severity::DEFAULT,
    }
}

/// CAP: cancellations and "All Clear" messages first, then `severity`.
pub fn cap_severity(
    msg_type: Option<&str>,
    severity: Option<&str>,
    texts: [Option<&str>; 2],
) -> Severity {
    if msg_type.is_some_and(|m| m.trim().eq_ignore_ascii_case("cancel")) {
        return Severity::AllClear;
    }
    if texts
        .into_iter()
        .flatten()
        .any(|t| t.to_ascii_lowercase().contains("all clear"))
    {
        return Severity::AllClear;
    }
    match severity.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
        Some("extreme") => Severity::EmergencyWarning,
        Some("severe") => Severity::WatchAndAct,
        Some("moderate") => Severity::Advice,
        Some("minor") => Severity::Info,
        _ => Severity::DEFAULT,
    }
}

/// Bushfire feeds: a fire that is out is all clear; otherwise the category.
pub fn bushfire_severity(category: Option<&str>, status: Option<&str>) -> Severity {
    if status.is_some_and(|s| s.trim().eq_ignore_ascii_case("out")) {
        return Severity::AllClear;
    }
    match category {
        Some(c) if c.trim().eq_ignore_ascii_case("not applicable") => Severity::Info,
        Some(c) => warning_phrase(c).unwrap_or(Severity::DEFAULT),
        None => Severity::DEFAULT,
    }
}

// --- Field helpers ---

/// Join the present parts with " - ", or fall back.
fn derive_title(parts: &[&Option<String>], fallback: impl FnOnce() -> String) -> String {
    let joined = parts
        .iter()
        .filter_map(|p| p.as_deref())
        .collect::<Vec<_>>()
        .join(" - ");
    if joined.is_empty() { fallback() } else { joined }
}

/// `"<type> at <location> (<status>)"`, omitting missing parts.
fn derive_summary(
    incident_type: &Option<String>,
    location: &Option<String>,
    status: &Option<String>,
    title: &str,
) -> String {
    let mut summary = match (incident_type, location) {
        (Some(t), Some(l)) => format!("{} at {}", t, l),
        (Some(t), None) => t.clone(),
        (None, Some(l)) => format!("Incident at {}", l),
        (None, None) => title.to_string(),
    };
    if let Some(status) = status {
        summary = format!("{} ({})", summary, status);
    }
    summary
}

/// Parse `"lat,lon"` into valid, finite coordinates.
pub fn parse_lat_lon(value: &str) -> Option<(f64, f64)> {
    let (lat, lon) = value.split_once(',')?;
    let lat: f64 = lat.trim().parse().ok()?;
    let lon: f64 = lon.trim().parse().ok()?;
    valid_point(lat, lon)
}

fn valid_point(lat: f64, lon: f64) -> Option<(f64, f64)> {
    let valid = lat.is_finite()
        && lon.is_finite()
        && (-90.0..=90.0).contains(&lat)
        && (-180.0..=180.0).contains(&lon);
    valid.then_some((lat, lon))
}

fn parse_count(value: Option<&str>) -> Option<u32> {
    value?.trim().parse().ok()
}

/// Parse an RFC 3339 / RFC 2822 stamp, or a local wall-clock time at the
/// feed's fixed UTC offset.
pub fn parse_timestamp(value: &str, utc_offset_minutes: i32) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.with_timezone(&Utc));
    }

    let offset = FixedOffset::east_opt(utc_offset_minutes.checked_mul(60)?)?;
    let naive = LOCAL_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%d/%m/%Y")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_area(record: &CapAreaRecord) -> CapArea {
    CapArea {
        description: clean(record.area_desc.as_deref()),
        polygons: record
            .polygons
            .iter()
            .filter_map(|p| parse_polygon(p))
            .collect(),
        circles: record
            .circles
            .iter()
            .filter_map(|c| parse_circle(c))
            .collect(),
    }
}

/// CAP polygon: whitespace-separated `lat,lon` pairs, at least 3 points.
fn parse_polygon(value: &str) -> Option<Vec<(f64, f64)>> {
    let points: Vec<(f64, f64)> = value.split_whitespace().filter_map(parse_lat_lon).collect();
    (points.len() >= 3).then_some(points)
}

/// CAP circle: `lat,lon radius_km`.
fn parse_circle(value: &str) -> Option<Circle> {
    let (point, radius) = value.trim().split_once(char::is_whitespace)?;
    let (latitude, longitude) = parse_lat_lon(point)?;
    let radius_km: f64 = radius.trim().parse().ok()?;
    (radius_km.is_finite() && radius_km >= 0.0).then_some(Circle {
        latitude,
        longitude,
        radius_km,
    })
}

/// Centroid of the first polygon, else centre of the first circle.
fn representative_area_point(areas: &[CapArea]) -> Option<(f64, f64)> {
    areas
        .iter()
        .flat_map(|a| a.polygons.iter())
        .find_map(|ring| centroid(ring))
        .or_else(|| {
            areas
                .iter()
                .flat_map(|a| a.circles.iter())
                .next()
                .map(|c| (c.latitude, c.longitude))
        })
}

/// First point of a GeoJSON geometry (`[lon, lat]` order), looking inside
/// collections; polygons fall back to their outer ring's centroid.
fn geometry_point(geometry: &serde_json::Value) -> Option<(f64, f64)> {
    let position = |v: &serde_json::Value| -> Option<(f64, f64)> {
        let coords = v.as_array()?;
        let lon = coords.first()?.as_f64()?;
        let lat = coords.get(1)?.as_f64()?;
        valid_point(lat, lon)
    };

    match geometry.get("type")?.as_str()? {
        "Point" => position(geometry.get("coordinates")?),
        "Polygon" => {
            let ring: Vec<(f64, f64)> = geometry
                .get("coordinates")?
                .as_array()?
                .first()?
                .as_array()?
                .iter()
                .filter_map(position)
                .collect();
            centroid(&ring)
        }
        "GeometryCollection" => {
            let geometries = geometry.get("geometries")?.as_array()?;
            geometries
                .iter()
                .filter(|g| g.get("type").and_then(|t| t.as_str()) == Some("Point"))
                .chain(geometries.iter())
                .find_map(geometry_point)
        }
        _ => None,
    }
}

/// `KEY: value` lines of an agency description, keys upper-cased.
fn parse_description_fields(html: &str) -> HashMap<String, String> {
    strip_html(html)
        .lines()
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            let key = key.trim().to_ascii_uppercase();
            (!key.is_empty()).then(|| (key, value.trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BushfireProperties, CapAreaRecord, RemovalPolicy};
    use chrono::TimeZone;

    fn feed(kind: SourceKind) -> FeedConfig {
        FeedConfig {
            name: "test_feed".to_string(),
            kind,
            region: "SA".to_string(),
            url: "https://example.com/feed".to_string(),
            enabled: true,
            interval_secs: None,
            utc_offset_minutes: 630,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 10, 4, 0, 0).unwrap()
    }

    fn criimson(no: Option<&str>) -> CriimsonRecord {
        CriimsonRecord {
            incident_no: no.map(String::from),
            date: Some("10/01/2026".into()),
            time: Some("14:32".into()),
            location_name: Some("Mount Barker".into()),
            location: Some("-35.07, 138.86".into()),
            region: Some("Region 1".into()),
            incident_type: Some("Grass Fire".into()),
            status: Some("GOING".into()),
            level: Some("2".into()),
            resources: Some("4".into()),
            service: Some("CFS".into()),
            ..CriimsonRecord::default()
        }
    }

    fn incident_of(result: Result<Normalized, NormalizationError>) -> Incident {
        match result.unwrap() {
            Normalized::Incident(incident) => incident,
            other => panic!("expected incident, got {:?}", other),
        }
    }

    #[test]
    fn test_criimson_record_maps_to_incident() {
        let feed = feed(SourceKind::Criimson);
        let incident = incident_of(normalize(
            &feed,
            RawRecord::Criimson(criimson(Some(" 12345 "))),
            now(),
        ));

        assert_eq!(incident.source, "test_feed");
        assert_eq!(incident.source_id, "12345");
        assert_eq!(incident.severity, Severity::WatchAndAct);
        assert_eq!(incident.coordinates(), Some((-35.07, 138.86)));
        assert_eq!(incident.agency.as_deref(), Some("CFS"));
        assert_eq!(incident.status_raw.as_deref(), Some("GOING"));
        assert_eq!(incident.resources, Some(4));
        assert_eq!(incident.title, "Grass Fire - Mount Barker - CFS");
        assert_eq!(incident.summary, "Grass Fire at Mount Barker (GOING)");
        // 14:32 at UTC+10:30 is 04:02 UTC.
        assert_eq!(
            incident.reported_at,
            Some(Utc.with_ymd_and_hms(2026, 1, 10, 4, 2, 0).unwrap())
        );
    }

    #[test]
    fn test_criimson_without_number_gets_stable_derived_id() {
        let feed = feed(SourceKind::Criimson);
        let a = incident_of(normalize(&feed, RawRecord::Criimson(criimson(None)), now()));
        let b = incident_of(normalize(&feed, RawRecord::Criimson(criimson(None)), now()));
        assert!(a.source_id.starts_with("derived-"));
        assert_eq!(a.source_id, b.source_id);
    }

    #[test]
    fn test_criimson_without_any_identity_fails() {
        let feed = feed(SourceKind::Criimson);
        let err = normalize(
            &feed,
            RawRecord::Criimson(CriimsonRecord {
                incident_type: Some("Grass Fire".into()),
                ..CriimsonRecord::default()
            }),
            now(),
        )
        .unwrap_err();
        assert_eq!(err.field, "IncidentNo");
    }

    #[test]
    fn test_bad_coordinates_are_dropped_not_fatal() {
        assert_eq!(parse_lat_lon("-35.07,138.86"), Some((-35.07, 138.86)));
        assert_eq!(parse_lat_lon("nan,138.86"), None);
        assert_eq!(parse_lat_lon("-135.0,138.86"), None);
        assert_eq!(parse_lat_lon("somewhere"), None);
    }

    #[test]
    fn test_unknown_status_maps_to_default_severity() {
        assert_eq!(criimson_severity(Some("7"), Some("GOING")), Severity::DEFAULT);
        assert_eq!(criimson_severity(None, None), Severity::DEFAULT);
        assert_eq!(
            criimson_severity(Some("Emergency Warning"), None),
            Severity::EmergencyWarning
        );
        assert_eq!(criimson_severity(Some("2"), Some("SAFE")), Severity::AllClear);
        assert_eq!(criimson_severity(Some("1"), Some("CONTAINED")), Severity::Advice);
    }

    #[test]
    fn test_cap_severity_table() {
        assert_eq!(cap_severity(None, Some("Extreme"), [None, None]), Severity::EmergencyWarning);
        assert_eq!(cap_severity(None, Some("Severe"), [None, None]), Severity::WatchAndAct);
        assert_eq!(cap_severity(None, Some("Moderate"), [None, None]), Severity::Advice);
        assert_eq!(cap_severity(None, Some("Minor"), [None, None]), Severity::Info);
        assert_eq!(cap_severity(None, Some("Unknown"), [None, None]), Severity::Info);
        assert_eq!(cap_severity(Some("Cancel"), Some("Extreme"), [None, None]), Severity::AllClear);
        assert_eq!(
            cap_severity(None, Some("Minor"), [Some("All Clear - Bago"), None]),
            Severity::AllClear
        );
    }

    #[test]
    fn test_cap_record_maps_to_alert_with_area_point() {
        let feed = feed(SourceKind::Cap);
        let record = CapRecord {
            identifier: Some("CFS-1".into()),
            sender: Some("cfs.sa.gov.au".into()),
            msg_type: Some("Alert".into()),
            event: Some("Bushfire".into()),
            severity: Some("Severe".into()),
            description: Some("Fire near <b>Bago</b>.".into()),
            expires: Some("2026-01-10T20:30:00+10:30".into()),
            areas: vec![CapAreaRecord {
                area_desc: Some("Bago".into()),
                polygons: vec!["0,0 0,2 2,2 2,0 0,0".into(), "bogus".into()],
                circles: vec!["-35.0,138.0 5".into()],
            }],
            ..CapRecord::default()
        };

        let alert = match normalize(&feed, RawRecord::Cap(record), now()).unwrap() {
            Normalized::CapAlert(alert) => alert,
            other => panic!("expected alert, got {:?}", other),
        };
        assert_eq!(alert.source_id, "CFS-1");
        assert_eq!(alert.severity, Severity::WatchAndAct);
        assert_eq!(alert.agency.as_deref(), Some("cfs.sa.gov.au"));
        assert_eq!(alert.areas[0].polygons.len(), 1);
        assert_eq!(alert.areas[0].circles[0].radius_km, 5.0);
        assert_eq!(alert.coordinates(), Some((1.0, 1.0)));
        assert_eq!(alert.location_name.as_deref(), Some("Bago"));
        assert_eq!(alert.title, "Bushfire - Bago");
        assert_eq!(alert.summary, "Fire near Bago.");
        assert_eq!(
            alert.expires,
            Some(Utc.with_ymd_and_hms(2026, 1, 10, 10, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_cap_without_identifier_fails() {
        let feed = feed(SourceKind::Cap);
        let err = normalize(&feed, RawRecord::Cap(CapRecord::default()), now()).unwrap_err();
        assert_eq!(err.field, "identifier");
    }

    #[test]
    fn test_bushfire_feature_maps_description_fields() {
        let feed = feed(SourceKind::Bushfire);
        let feature = BushfireFeature {
            properties: BushfireProperties {
                title: Some("Mount Tomah".into()),
                link: Some("https://www.rfs.nsw.gov.au/fire-information/fires-near-me".into()),
                category: Some("Watch and Act".into()),
                guid: Some("https://incidents.rfs.nsw.gov.au/api/v1/incidents/512345".into()),
                pub_date: Some("10/01/2026 3:30:00 PM".into()),
                description: Some(
                    "ALERT LEVEL: Watch and Act <br />LOCATION: Bells Line of Road, Mount Tomah <br />COUNCIL AREA: Blue Mountains <br />STATUS: Out of control <br />TYPE: Bush Fire <br />SIZE: 120 ha <br />RESPONSIBLE AGENCY: Rural Fire Service".into(),
                ),
            },
            geometry: Some(serde_json::json!({
                "type": "GeometryCollection",
                "geometries": [
                    {"type": "Polygon", "coordinates": [[[150.0, -33.0], [151.0, -33.0], [151.0, -34.0]]]},
                    {"type": "Point", "coordinates": [150.1, -33.7]}
                ]
            })),
        };

        let incident = incident_of(normalize(&feed, RawRecord::Bushfire(feature), now()));
        assert_eq!(incident.severity, Severity::WatchAndAct);
        assert_eq!(incident.incident_type.as_deref(), Some("Bush Fire"));
        assert_eq!(incident.status_raw.as_deref(), Some("Out of control"));
        assert_eq!(incident.region.as_deref(), Some("Blue Mountains"));
        assert_eq!(incident.agency.as_deref(), Some("Rural Fire Service"));
        assert_eq!(incident.coordinates(), Some((-33.7, 150.1)));
        assert_eq!(incident.title, "Mount Tomah");
        assert_eq!(
            incident.summary,
            "Bush Fire at Bells Line of Road, Mount Tomah (Out of control), 120 ha"
        );
        assert!(incident.reported_at.is_some());
    }

    #[test]
    fn test_bushfire_without_guid_derives_distinct_ids() {
        let feed = feed(SourceKind::Bushfire);
        let fire = |title: &str, lon: f64| {
            RawRecord::Bushfire(BushfireFeature {
                properties: BushfireProperties {
                    title: Some(title.into()),
                    link: Some("https://www.rfs.nsw.gov.au/fire-information/fires-near-me".into()),
                    category: Some("Advice".into()),
                    pub_date: Some("10/01/2026 3:30:00 PM".into()),
                    ..BushfireProperties::default()
                },
                geometry: Some(serde_json::json!({"type": "Point", "coordinates": [lon, -33.7]})),
            })
        };

        let snapshot = normalize_snapshot(
            &feed,
            vec![fire("Fire A", 150.1), fire("Fire B", 150.4)],
            now(),
        );
        assert!(snapshot.dropped.is_empty());
        let ids: Vec<&str> = snapshot.incidents.iter().map(|i| i.source_id.as_str()).collect();
        assert!(ids.iter().all(|id| id.starts_with("derived-")));
        assert_ne!(ids[0], ids[1]);

        let again = incident_of(normalize(&feed, fire("Fire A", 150.1), now()));
        assert_eq!(again.source_id, ids[0]);

        let mut engine = crate::pipeline::ReconciliationEngine::new("nsw_rfs", RemovalPolicy::Eager);
        let outcome = engine.merge(snapshot.incidents, now());
        assert_eq!(outcome.created.len(), 2);
        assert!(outcome.violations.is_empty());
        assert_eq!(engine.len(), 2);
    }

    #[test]
    fn test_bushfire_without_any_identity_fails() {
        let feed = feed(SourceKind::Bushfire);
        let feature = BushfireFeature {
            properties: BushfireProperties {
                link: Some("https://www.rfs.nsw.gov.au/fire-information/fires-near-me".into()),
                ..BushfireProperties::default()
            },
            geometry: None,
        };
        let err = normalize(&feed, RawRecord::Bushfire(feature), now()).unwrap_err();
        assert_eq!(err.field, "guid");
    }

    #[test]
    fn test_bushfire_out_is_all_clear() {
        assert_eq!(bushfire_severity(Some("Advice"), Some("Out")), Severity::AllClear);
        assert_eq!(bushfire_severity(Some("Not Applicable"), None), Severity::Info);
        assert_eq!(
            bushfire_severity(Some("Emergency Warning"), Some("Out of control")),
            Severity::EmergencyWarning
        );
    }

    #[test]
    fn test_mismatched_record_kind_is_rejected() {
        let feed = feed(SourceKind::Cap);
        assert!(normalize(&feed, RawRecord::Criimson(criimson(Some("1"))), now()).is_err());
    }

    #[test]
    fn test_snapshot_keeps_good_records_when_one_is_bad() {
        let feed = feed(SourceKind::Criimson);
        let snapshot = normalize_snapshot(
            &feed,
            vec![
                RawRecord::Criimson(criimson(Some("1"))),
                RawRecord::Criimson(CriimsonRecord::default()),
                RawRecord::Criimson(criimson(Some("2"))),
            ],
            now(),
        );
        assert_eq!(snapshot.incidents.len(), 2);
        assert_eq!(snapshot.dropped.len(), 1);
        assert!(snapshot.alerts.is_empty());
    }

    #[test]
    fn test_timestamps_normalize_to_utc() {
        assert_eq!(
            parse_timestamp("2026-01-10T14:30:00+10:30", 0),
            Some(Utc.with_ymd_and_hms(2026, 1, 10, 4, 0, 0).unwrap())
        );
        assert_eq!(
            parse_timestamp("10/01/2026 3:30:00 PM", 600),
            Some(Utc.with_ymd_and_hms(2026, 1, 10, 5, 30, 0).unwrap())
        );
        assert_eq!(parse_timestamp("not a date", 570), None);
    }
}
