// src/services/criimson.rs

//! CRIIMSON current-incidents feed (SA CFS / SES).

use async_trait::async_trait;

use crate::error::FetchError;
use crate::models::{CriimsonRecord, RawRecord, SourceKind};

use super::{Endpoint, SourceAdapter};

/// Adapter for a CRIIMSON `current_incidents.json` endpoint.
pub struct CriimsonSource {
    endpoint: Endpoint,
}

impl CriimsonSource {
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl SourceAdapter for CriimsonSource {
    fn name(&self) -> &str {
        &self.endpoint.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Criimson
    }

    async fn fetch(&self) -> Result<Vec<RawRecord>, FetchError> {
        let body = self.endpoint.get().await?;
        let records = parse_criimson(&body)?;
        Ok(records.into_iter().map(RawRecord::Criimson).collect())
    }
}

/// Parse a CRIIMSON body: a JSON array of incident objects.
///
/// An empty body is malformed (only `[]` means "no incidents"); entries
/// that are not objects are skipped so one odd row cannot fail the feed.
pub fn parse_criimson(body: &str) -> Result<Vec<CriimsonRecord>, FetchError> {
    if body.trim().is_empty() {
        return Err(FetchError::payload("empty body"));
    }

    let values: Vec<serde_json::Value> =
        serde_json::from_str(body).map_err(FetchError::payload)?;

    let mut records = Vec::with_capacity(values.len());
    for value in values {
        if !value.is_object() {
            log::debug!("Skipping non-object CRIIMSON entry: {}", value);
            continue;
        }
        match serde_json::from_value::<CriimsonRecord>(value) {
            Ok(record) => records.push(record),
            Err(e) => log::warn!("Skipping unreadable CRIIMSON entry: {}", e),
        }
    }
    Ok(records)
}
