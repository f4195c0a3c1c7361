// src/services/bushfire.rs

//! Agency major-incidents GeoJSON feed (NSW RFS style).

use async_trait::async_trait;

use crate::error::FetchError;
use crate::models::{BushfireCollection, BushfireFeature, RawRecord, SourceKind};

use super::{Endpoint, SourceAdapter};

/// Adapter for a GeoJSON major-incidents endpoint.
pub struct BushfireSource {
    endpoint: Endpoint,
}

impl BushfireSource {
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl SourceAdapter for BushfireSource {
    fn name(&self) -> &str {
        &self.endpoint.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Bushfire
    }

    async fn fetch(&self) -> Result<Vec<RawRecord>, FetchError> {
        let body = self.endpoint.get().await?;
        let features = parse_bushfire(&body)?;
        Ok(features.into_iter().map(RawRecord::Bushfire).collect())
    }
}

/// Parse a GeoJSON `FeatureCollection`.
pub fn parse_bushfire(body: &str) -> Result<Vec<BushfireFeature>, FetchError> {
    let collection: BushfireCollection =
        serde_json::from_str(body).map_err(FetchError::payload)?;
    Ok(collection.features)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_feature_collection() {
        let body = r#"{
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "geometry": {"type": "Point", "coordinates": [150.1, -33.7]},
                "properties": {
                    "title": "Mount Tomah",
                    "category": "Advice",
                    "guid": "https://incidents.rfs.nsw.gov.au/api/v1/incidents/512345",
                    "pubDate": "10/01/2026 3:30:00 PM",
                    "description": "ALERT LEVEL: Advice <br />STATUS: Being controlled"
                }
            }]
        }"#;
        let features = parse_bushfire(body).unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].properties.category.as_deref(), Some("Advice"));
        assert!(features[0].geometry.is_some());
    }

    #[test]
    fn test_rejects_non_json() {
        assert!(matches!(
            parse_bushfire("<html></html>"),
            Err(FetchError::Payload(_))
        ));
    }
}
