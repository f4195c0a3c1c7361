// src/models/config.rs

//! Application configuration structures.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

use super::zone::{Zone, ZoneSet, ZoneShape};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Polling and lifecycle settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Failure backoff settings
    #[serde(default)]
    pub retry: RetryConfig,

    /// HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Feed definitions
    #[serde(default = "defaults::feeds")]
    pub feeds: Vec<FeedConfig>,

    /// Zones incidents are tagged against
    #[serde(default)]
    pub zones: Vec<Zone>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Feeds that are enabled and belong to an enabled region.
    pub fn active_feeds(&self) -> impl Iterator<Item = &FeedConfig> {
        self.feeds.iter().filter(|feed| {
            feed.enabled
                && self
                    .general
                    .enabled_regions
                    .iter()
                    .any(|region| region.eq_ignore_ascii_case(&feed.region))
        })
    }

    /// Stale-removal policy selected by `remove_stale` / `stale_threshold`.
    pub fn removal_policy(&self) -> RemovalPolicy {
        if self.general.remove_stale {
            RemovalPolicy::Eager
        } else {
            RemovalPolicy::Threshold(self.general.stale_threshold)
        }
    }

    /// Polling interval for a feed, honouring its override.
    pub fn interval_for(&self, feed: &FeedConfig) -> Duration {
        Duration::from_secs(
            feed.interval_secs
                .unwrap_or(self.general.update_interval_secs),
        )
    }

    pub fn zone_set(&self) -> ZoneSet {
        ZoneSet::new(self.zones.clone())
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.http.user_agent.trim().is_empty() {
            return Err(AppError::validation("http.user_agent is empty"));
        }
        if self.http.timeout_secs == 0 {
            return Err(AppError::validation("http.timeout_secs must be > 0"));
        }
        if self.general.update_interval_secs == 0 {
            return Err(AppError::validation(
                "general.update_interval_secs must be > 0",
            ));
        }
        if self.general.stale_threshold == 0 {
            return Err(AppError::validation("general.stale_threshold must be > 0"));
        }
        if self.retry.initial_secs == 0 {
            return Err(AppError::validation("retry.initial_secs must be > 0"));
        }
        if self.retry.max_secs < self.retry.initial_secs {
            return Err(AppError::validation(
                "retry.max_secs must be >= retry.initial_secs",
            ));
        }
        if self.retry.multiplier < 1 {
            return Err(AppError::validation("retry.multiplier must be >= 1"));
        }

        let mut feed_names = HashSet::new();
        for feed in &self.feeds {
            if feed.name.trim().is_empty() {
                return Err(AppError::validation("feed name is empty"));
            }
            if !feed_names.insert(feed.name.as_str()) {
                return Err(AppError::validation(format!(
                    "duplicate feed name '{}'",
                    feed.name
                )));
            }
            url::Url::parse(&feed.url).map_err(|e| {
                AppError::validation(format!("feed '{}' has invalid url: {}", feed.name, e))
            })?;
            if feed.interval_secs == Some(0) {
                return Err(AppError::validation(format!(
                    "feed '{}' interval_secs must be > 0",
                    feed.name
                )));
            }
        }

        let mut zone_names = HashSet::new();
        for zone in &self.zones {
            if !zone_names.insert(zone.name.as_str()) {
                return Err(AppError::validation(format!(
                    "duplicate zone name '{}'",
                    zone.name
                )));
            }
            match &zone.shape {
                ZoneShape::Circle {
                    latitude,
                    longitude,
                    radius_km,
                } => {
                    check_position(&zone.name, *latitude, *longitude)?;
                    if !radius_km.is_finite() || *radius_km <= 0.0 {
                        return Err(AppError::validation(format!(
                            "zone '{}' radius_km must be a finite value > 0",
                            zone.name
                        )));
                    }
                }
                ZoneShape::Polygon { points } => {
                    if points.len() < 3 {
                        return Err(AppError::validation(format!(
                            "zone '{}' polygon needs at least 3 points",
                            zone.name
                        )));
                    }
                    for (latitude, longitude) in points {
                        check_position(&zone.name, *latitude, *longitude)?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Latitude and longitude must be finite and on the globe.
fn check_position(zone: &str, latitude: f64, longitude: f64) -> Result<()> {
    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return Err(AppError::validation(format!(
            "zone '{}' has invalid position ({}, {})",
            zone, latitude, longitude
        )));
    }
    Ok(())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            retry: RetryConfig::default(),
            http: HttpConfig::default(),
            logging: LoggingConfig::default(),
            feeds: defaults::feeds(),
            zones: Vec::new(),
        }
    }
}

/// Polling and lifecycle behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Regions (state codes) whose feeds are polled
    #[serde(default = "defaults::enabled_regions")]
    pub enabled_regions: Vec<String>,

    /// Base polling interval in seconds
    #[serde(default = "defaults::update_interval")]
    pub update_interval_secs: u64,

    /// Remove incidents on their first absence
    #[serde(default)]
    pub remove_stale: bool,

    /// Consecutive absent polls before removal when `remove_stale` is off
    #[serde(default = "defaults::stale_threshold")]
    pub stale_threshold: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            enabled_regions: defaults::enabled_regions(),
            update_interval_secs: defaults::update_interval(),
            remove_stale: false,
            stale_threshold: defaults::stale_threshold(),
        }
    }
}

/// Exponential backoff applied after failed fetches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Delay after the first failure
    #[serde(default = "defaults::retry_initial")]
    pub initial_secs: u64,

    /// Upper bound on the delay
    #[serde(default = "defaults::retry_max")]
    pub max_secs: u64,

    #[serde(default = "defaults::retry_multiplier")]
    pub multiplier: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_secs: defaults::retry_initial(),
            max_secs: defaults::retry_max(),
            multiplier: defaults::retry_multiplier(),
        }
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

/// Format family of a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// CRIIMSON current-incidents JSON
    Criimson,
    /// Common Alerting Protocol XML
    Cap,
    /// Agency major-incidents GeoJSON
    Bushfire,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Criimson => "criimson",
            SourceKind::Cap => "cap",
            SourceKind::Bushfire => "bushfire",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One polled feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Unique feed name, used as the `source` of every entity it yields
    pub name: String,

    pub kind: SourceKind,

    /// State code, e.g. "SA"
    pub region: String,

    pub url: String,

    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    /// Overrides `general.update_interval_secs`
    #[serde(default)]
    pub interval_secs: Option<u64>,

    /// Offset of the feed's local wall-clock times from UTC
    #[serde(default = "defaults::utc_offset_minutes")]
    pub utc_offset_minutes: i32,
}

/// How long an absent entity is kept before it is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalPolicy {
    /// Remove on the first successful poll it is missing from
    Eager,
    /// Remove once missing from this many consecutive successful polls
    Threshold(u32),
}

impl RemovalPolicy {
    /// Absent polls after which an entity is removed.
    pub fn threshold(&self) -> u32 {
        match self {
            RemovalPolicy::Eager => 1,
            RemovalPolicy::Threshold(n) => (*n).max(1),
        }
    }
}

impl Default for RemovalPolicy {
    fn default() -> Self {
        RemovalPolicy::Threshold(defaults::stale_threshold())
    }
}

mod defaults {
    use super::{FeedConfig, SourceKind};

    // General defaults
    pub fn enabled_regions() -> Vec<String> {
        vec!["SA".into()]
    }
    pub fn update_interval() -> u64 {
        600
    }
    pub fn stale_threshold() -> u32 {
        3
    }

    // Retry defaults
    pub fn retry_initial() -> u64 {
        30
    }
    pub fn retry_max() -> u64 {
        600
    }
    pub fn retry_multiplier() -> u32 {
        2
    }

    // HTTP defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; aus-emergency/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }

    pub fn log_level() -> String {
        "info".into()
    }

    // Feed defaults
    pub fn enabled() -> bool {
        true
    }
    /// ACST
    pub fn utc_offset_minutes() -> i32 {
        570
    }

    pub fn feeds() -> Vec<FeedConfig> {
        vec![
            FeedConfig {
                name: "sa_cfs".to_string(),
                kind: SourceKind::Criimson,
                region: "SA".to_string(),
                url: "https://data.eso.sa.gov.au/prod/cfs/criimson/cfs_current_incidents.json"
                    .to_string(),
                enabled: true,
                interval_secs: None,
                utc_offset_minutes: 570,
            },
            FeedConfig {
                name: "sa_cfs_cap".to_string(),
                kind: SourceKind::Cap,
                region: "SA".to_string(),
                url: "https://data.eso.sa.gov.au/prod/cfs/criimson/cfs_cap_incidents.xml"
                    .to_string(),
                enabled: true,
                interval_secs: None,
                utc_offset_minutes: 570,
            },
            FeedConfig {
                name: "nsw_rfs".to_string(),
                kind: SourceKind::Bushfire,
                region: "NSW".to_string(),
                url: "https://www.rfs.nsw.gov.au/feeds/majorIncidents.json".to_string(),
                enabled: true,
                interval_secs: None,
                utc_offset_minutes: 600,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_user_agent() {
        let mut config = Config::default();
        config.http.user_agent = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_retry_bounds() {
        let mut config = Config::default();
        config.retry.max_secs = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_feed_names() {
        let mut config = Config::default();
        let dup = config.feeds[0].clone();
        config.feeds.push(dup);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_degenerate_polygon() {
        let mut config = Config::default();
        config.zones.push(Zone {
            name: "line".to_string(),
            shape: ZoneShape::Polygon {
                points: vec![(-35.0, 138.0), (-35.1, 138.1)],
            },
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_finite_or_off_globe_zones() {
        let circle = |latitude: f64, radius_km: f64| Zone {
            name: "home".to_string(),
            shape: ZoneShape::Circle {
                latitude,
                longitude: 138.6,
                radius_km,
            },
        };
        for zone in [
            circle(-34.9, f64::NAN),
            circle(-34.9, f64::INFINITY),
            circle(f64::NAN, 10.0),
            circle(-134.9, 10.0),
            Zone {
                name: "far".to_string(),
                shape: ZoneShape::Polygon {
                    points: vec![(-35.0, 138.0), (-35.1, 238.1), (-35.2, 138.0)],
                },
            },
        ] {
            let mut config = Config::default();
            config.zones.push(zone);
            assert!(config.validate().is_err());
        }

        let mut config = Config::default();
        config.zones.push(circle(-34.9, 10.0));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_only_enabled_regions_are_active() {
        let config = Config::default();
        let names: Vec<_> = config.active_feeds().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["sa_cfs", "sa_cfs_cap"]);
    }

    #[test]
    fn test_removal_policy_follows_remove_stale() {
        let mut config = Config::default();
        assert_eq!(config.removal_policy(), RemovalPolicy::Threshold(3));
        config.general.remove_stale = true;
        assert_eq!(config.removal_policy(), RemovalPolicy::Eager);
        assert_eq!(RemovalPolicy::Eager.threshold(), 1);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [general]
            enabled_regions = ["SA", "NSW"]
            update_interval_secs = 300

            [[zones]]
            name = "home"
            shape = "circle"
            latitude = -34.9
            longitude = 138.6
            radius_km = 10.0
            "#,
        )
        .unwrap();
        assert_eq!(config.general.update_interval_secs, 300);
        assert_eq!(config.general.stale_threshold, 3);
        assert_eq!(config.retry.initial_secs, 30);
        assert_eq!(config.feeds.len(), 3);
        assert_eq!(config.active_feeds().count(), 3);
        assert_eq!(config.zones.len(), 1);
        assert_eq!(
            config.interval_for(&config.feeds[0]),
            Duration::from_secs(300)
        );
    }
}
