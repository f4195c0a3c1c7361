// src/models/raw.rs

//! Raw record shapes, one per feed format, as adapters hand them over.

use serde::{Deserialize, Deserializer, Serialize};

/// A parsed but not yet normalized record.
#[derive(Debug, Clone, PartialEq)]
pub enum RawRecord {
    Criimson(CriimsonRecord),
    Cap(CapRecord),
    Bushfire(BushfireFeature),
}

/// One entry of a CRIIMSON `current_incidents.json` array.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CriimsonRecord {
    #[serde(rename = "IncidentNo", default, deserialize_with = "lenient_string")]
    pub incident_no: Option<String>,

    #[serde(rename = "Date", default, deserialize_with = "lenient_string")]
    pub date: Option<String>,

    #[serde(rename = "Time", default, deserialize_with = "lenient_string")]
    pub time: Option<String>,

    #[serde(rename = "Message", default, deserialize_with = "lenient_string")]
    pub message: Option<String>,

    #[serde(rename = "Message_link", default, deserialize_with = "lenient_string")]
    pub message_link: Option<String>,

    #[serde(rename = "Location_name", default, deserialize_with = "lenient_string")]
    pub location_name: Option<String>,

    /// `"lat,lon"`
    #[serde(rename = "Location", default, deserialize_with = "lenient_string")]
    pub location: Option<String>,

    #[serde(rename = "Region", default, deserialize_with = "lenient_string")]
    pub region: Option<String>,

    #[serde(rename = "Type", default, deserialize_with = "lenient_string")]
    pub incident_type: Option<String>,

    #[serde(rename = "Status", default, deserialize_with = "lenient_string")]
    pub status: Option<String>,

    #[serde(rename = "Level", default, deserialize_with = "lenient_string")]
    pub level: Option<String>,

    #[serde(rename = "Resources", default, deserialize_with = "lenient_string")]
    pub resources: Option<String>,

    #[serde(rename = "Aircraft", default, deserialize_with = "lenient_string")]
    pub aircraft: Option<String>,

    #[serde(rename = "Service", default, deserialize_with = "lenient_string")]
    pub service: Option<String>,

    #[serde(rename = "Agency", default, deserialize_with = "lenient_string")]
    pub agency: Option<String>,
}

/// Fields pulled from one CAP `alert` element.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CapRecord {
    pub identifier: Option<String>,
    pub sender: Option<String>,
    pub sender_name: Option<String>,
    pub msg_type: Option<String>,
    pub sent: Option<String>,
    pub event: Option<String>,
    pub headline: Option<String>,
    pub description: Option<String>,
    pub instruction: Option<String>,
    pub severity: Option<String>,
    pub urgency: Option<String>,
    pub certainty: Option<String>,
    pub effective: Option<String>,
    pub expires: Option<String>,
    pub web: Option<String>,
    pub areas: Vec<CapAreaRecord>,
}

/// Text of one CAP `area` element.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CapAreaRecord {
    pub area_desc: Option<String>,

    /// Space-separated `lat,lon` pairs
    pub polygons: Vec<String>,

    /// `lat,lon radius_km`
    pub circles: Vec<String>,
}

/// GeoJSON feature collection published by agency bushfire feeds.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct BushfireCollection {
    #[serde(default)]
    pub features: Vec<BushfireFeature>,
}

/// One GeoJSON feature of an agency major-incidents feed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BushfireFeature {
    #[serde(default)]
    pub properties: BushfireProperties,

    #[serde(default)]
    pub geometry: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BushfireProperties {
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub link: Option<String>,

    /// Warning level: "Advice", "Watch and Act", "Emergency Warning", "Not Applicable"
    #[serde(default, deserialize_with = "lenient_string")]
    pub category: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub guid: Option<String>,

    #[serde(rename = "pubDate", default, deserialize_with = "lenient_string")]
    pub pub_date: Option<String>,

    /// HTML fragment of `KEY: value` lines separated by `<br />`
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: Option<String>,
}

/// Accept strings, numbers and booleans as text; null as `None`.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(serde_json::Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}
