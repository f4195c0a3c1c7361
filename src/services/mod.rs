// src/services/mod.rs

//! Feed adapters.
//!
//! Each adapter fetches one feed and parses it into [`RawRecord`]s:
//! - CRIIMSON current-incidents JSON (`CriimsonSource`)
//! - Common Alerting Protocol XML (`CapSource`)
//! - Agency major-incidents GeoJSON (`BushfireSource`)
//!
//! Adapters never touch reconciliation state; a fetch either yields a fully
//! parsed snapshot or a [`FetchError`].

mod bushfire;
mod cap;
mod criimson;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::FetchError;
use crate::models::{FeedConfig, RawRecord, SourceKind};

pub use bushfire::{BushfireSource, parse_bushfire};
pub use cap::{CapSource, parse_cap};
pub use criimson::{CriimsonSource, parse_criimson};

/// A pollable feed.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Feed name, unique across the configuration
    fn name(&self) -> &str;

    fn kind(&self) -> SourceKind;

    /// Fetch and parse the current snapshot.
    async fn fetch(&self) -> Result<Vec<RawRecord>, FetchError>;
}

/// Where and how an HTTP-backed adapter fetches.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub name: String,
    pub url: String,
    pub client: reqwest::Client,
    pub timeout_secs: u64,
}

impl Endpoint {
    pub fn new(feed: &FeedConfig, client: reqwest::Client, timeout_secs: u64) -> Self {
        Self {
            name: feed.name.clone(),
            url: feed.url.clone(),
            client,
            timeout_secs,
        }
    }

    async fn get(&self) -> Result<String, FetchError> {
        log::debug!("[{}] GET {}", self.name, self.url);
        crate::utils::http::fetch_text(&self.client, &self.url, self.timeout_secs).await
    }
}

/// Build the adapter matching a feed's kind.
pub fn build_adapter(
    feed: &FeedConfig,
    client: reqwest::Client,
    timeout_secs: u64,
) -> Arc<dyn SourceAdapter> {
    let endpoint = Endpoint::new(feed, client, timeout_secs);
    match feed.kind {
        SourceKind::Criimson => Arc::new(CriimsonSource::new(endpoint)),
        SourceKind::Cap => Arc::new(CapSource::new(endpoint)),
        SourceKind::Bushfire => Arc::new(BushfireSource::new(endpoint)),
    }
}
