// src/storage/local.rs

//! Local filesystem storage implementation.
//!
//! Reports are written atomically (temp file, then rename) so a reader never
//! sees a half-written `diagnostics.json`. Events are appended to a JSON
//! Lines file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::pipeline::{Diagnostics, Event};
use crate::storage::{ReportStorage, WriteMetadata};

const DIAGNOSTICS_KEY: &str = "diagnostics.json";
const EVENTS_KEY: &str = "events.jsonl";

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root_dir: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<WriteMetadata> {
        let path = self.path(key);
        self.ensure_dir(&path).await?;

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(WriteMetadata {
            location: path.display().to_string(),
            bytes: bytes.len(),
            timestamp: Utc::now(),
        })
    }

    /// Write JSON data.
    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<WriteMetadata> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(key, &bytes).await
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }
}

#[async_trait]
impl ReportStorage for LocalStorage {
    async fn write_diagnostics(&self, report: &Diagnostics) -> Result<WriteMetadata> {
        let meta = self.write_json(DIAGNOSTICS_KEY, report).await?;
        log::debug!("Diagnostics written to {} ({} bytes)", meta.location, meta.bytes);
        Ok(meta)
    }

    async fn append_events(&self, events: &[Event]) -> Result<WriteMetadata> {
        let path = self.path(EVENTS_KEY);
        self.ensure_dir(&path).await?;

        let mut buf = Vec::new();
        for event in events {
            serde_json::to_writer(&mut buf, event)?;
            buf.push(b'\n');
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(&buf).await?;
        file.flush().await?;

        Ok(WriteMetadata {
            location: path.display().to_string(),
            bytes: buf.len(),
            timestamp: Utc::now(),
        })
    }

    async fn load_events(&self) -> Result<Vec<Event>> {
        let Some(bytes) = self.read_bytes(EVENTS_KEY).await? else {
            return Ok(Vec::new());
        };
        let text = String::from_utf8_lossy(&bytes);
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(AppError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::{incident, t};
    use crate::models::{Config, Incident, Severity};
    use crate::pipeline::{AggregateView, EventType, LifecycleStream};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_events_append_in_order() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path());
        assert!(storage.load_events().await.unwrap().is_empty());

        let created = Event::lifecycle(Incident::CREATED, &incident("1", Severity::Info), t(0)).unwrap();
        let removed = Event::lifecycle(Incident::REMOVED, &incident("1", Severity::Info), t(9)).unwrap();
        storage.append_events(&[created]).await.unwrap();
        storage.append_events(&[removed]).await.unwrap();

        let events = storage.load_events().await.unwrap();
        let types: Vec<EventType> = events.iter().map(|e| e.event_type).collect();
        assert_eq!(types, vec![EventType::IncidentCreated, EventType::IncidentRemoved]);
        assert_eq!(events[1].payload["duration_minutes"], 9);
    }

    #[tokio::test]
    async fn test_diagnostics_written_atomically() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path().join("nested"));

        let report = Diagnostics::build(
            &Config::default(),
            Vec::new(),
            &AggregateView::default(),
            t(0),
        );
        let meta = storage.write_diagnostics(&report).await.unwrap();
        assert!(meta.bytes > 0);

        let path = dir.path().join("nested").join(DIAGNOSTICS_KEY);
        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());

        let value: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(value["summary"]["total_incidents"], 0);
    }
}
