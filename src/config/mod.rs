// src/config/mod.rs
//! Service configuration: one TOML or JSON file per operating mode, every key
//! optional, plus a handful of env overrides.
//!
//! Resolution:
//! 1) $URBAN_WATCH_CONFIG (must exist)
//! 2) config/{mode}.toml, then config/{mode}.json  (mode = $URBAN_WATCH_MODE or public_safety)
//! 3) built-in defaults

pub mod llm;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detector::rules::AnomalyRules;
use crate::event::Source;
pub use llm::{LlmConfig, RetrievalConfig};

pub const ENV_CONFIG_PATH: &str = "URBAN_WATCH_CONFIG";
pub const ENV_MODE: &str = "URBAN_WATCH_MODE";
pub const ENV_LLM_PROVIDER: &str = "URBAN_WATCH_LLM_PROVIDER";
pub const ENV_SPIKE_THRESHOLD: &str = "URBAN_WATCH_SPIKE_THRESHOLD";
pub const DEFAULT_CONFIG_DIR: &str = "config";

/// Which feed set runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    PublicSafety,
    UrbanPlanning,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::PublicSafety => "public_safety",
            Mode::UrbanPlanning => "urban_planning",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "public_safety" | "public-safety" => Some(Mode::PublicSafety),
            "urban_planning" | "urban-planning" => Some(Mode::UrbanPlanning),
            _ => None,
        }
    }
}

fn default_spike_window_secs() -> u64 {
    60
}
fn default_max_buckets() -> usize {
    10_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Minimum elapsed time before a bucket's social-media count is evaluated and reset.
    #[serde(default = "default_spike_window_secs")]
    pub spike_window_secs: u64,
    /// Bucket table capacity; least-recently-touched buckets are evicted beyond it.
    #[serde(default = "default_max_buckets")]
    pub max_buckets: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            spike_window_secs: default_spike_window_secs(),
            max_buckets: default_max_buckets(),
        }
    }
}

/// Bounding box for synthetic locations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AreaConfig {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl Default for AreaConfig {
    fn default() -> Self {
        Self {
            lat_min: 40.7,
            lat_max: 40.8,
            lon_min: -74.0,
            lon_max: -73.9,
        }
    }
}

impl AreaConfig {
    fn normalize(&mut self) {
        if !(self.lat_min.is_finite()
            && self.lat_max.is_finite()
            && self.lon_min.is_finite()
            && self.lon_max.is_finite())
        {
            *self = Self::default();
            return;
        }
        if self.lat_min > self.lat_max {
            std::mem::swap(&mut self.lat_min, &mut self.lat_max);
        }
        if self.lon_min > self.lon_max {
            std::mem::swap(&mut self.lon_min, &mut self.lon_max);
        }
    }
}

fn default_true() -> bool {
    true
}

/// Per-feed knobs. Unset values fall back to the feed's own defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds between records.
    #[serde(default, alias = "simulation_rate")]
    pub interval_secs: Option<f64>,
    /// Social media only: words drawn into posts and hashtags.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Chance that a generated reading is drawn from the abnormal range.
    #[serde(default)]
    pub anomaly_probability: Option<f64>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: None,
            keywords: Vec::new(),
            anomaly_probability: None,
        }
    }
}

const MIN_INTERVAL_SECS: f64 = 0.05;

impl FeedConfig {
    /// Configured interval (floored at 50 ms), or `fallback`.
    pub fn interval_or(&self, fallback: Duration) -> Duration {
        match self.interval_secs {
            Some(s) if s.is_finite() => Duration::from_secs_f64(s.max(MIN_INTERVAL_SECS)),
            _ => fallback,
        }
    }

    pub fn probability_or(&self, fallback: f64) -> f64 {
        match self.anomaly_probability {
            Some(p) if p.is_finite() => p.clamp(0.0, 1.0),
            _ => fallback,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataSourcesConfig {
    #[serde(default)]
    pub social_media: FeedConfig,
    #[serde(default)]
    pub public_safety: FeedConfig,
    #[serde(default)]
    pub iot_sensors: FeedConfig,
    #[serde(default)]
    pub transit: FeedConfig,
    #[serde(default)]
    pub traffic: FeedConfig,
    #[serde(default)]
    pub environment: FeedConfig,
}

impl DataSourcesConfig {
    pub fn feed(&self, source: &Source) -> Option<&FeedConfig> {
        match source {
            Source::SocialMedia => Some(&self.social_media),
            Source::PublicSafety => Some(&self.public_safety),
            Source::IotSensors => Some(&self.iot_sensors),
            Source::Transit => Some(&self.transit),
            Source::Traffic => Some(&self.traffic),
            Source::Environment => Some(&self.environment),
            Source::Other(_) => None,
        }
    }
}

fn default_processed_path() -> PathBuf {
    PathBuf::from("output/processed_data.jsonl")
}
fn default_anomalies_path() -> PathBuf {
    PathBuf::from("output/anomalies.csv")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Every annotated record, JSON Lines.
    #[serde(default = "default_processed_path")]
    pub processed_path: PathBuf,
    /// Anomalies only, CSV.
    #[serde(default = "default_anomalies_path")]
    pub anomalies_path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            processed_path: default_processed_path(),
            anomalies_path: default_anomalies_path(),
        }
    }
}

fn default_title() -> String {
    "Real-time Monitoring Dashboard".to_string()
}
fn default_refresh_secs() -> u64 {
    2
}
fn default_feed_rows() -> usize {
    10
}
fn default_history_capacity() -> usize {
    2000
}
fn default_anomaly_capacity() -> usize {
    500
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_refresh_secs")]
    pub refresh_secs: u64,
    #[serde(default = "default_feed_rows")]
    pub feed_rows: usize,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default = "default_anomaly_capacity")]
    pub anomaly_capacity: usize,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            refresh_secs: default_refresh_secs(),
            feed_rows: default_feed_rows(),
            history_capacity: default_history_capacity(),
            anomaly_capacity: default_anomaly_capacity(),
        }
    }
}

impl DashboardConfig {
    fn normalize(&mut self) {
        self.refresh_secs = self.refresh_secs.clamp(1, 60);
        self.feed_rows = self.feed_rows.max(1);
        self.history_capacity = self.history_capacity.clamp(1, 100_000);
        self.anomaly_capacity = self.anomaly_capacity.clamp(1, 100_000);
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub anomaly_rules: AnomalyRules,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub area: AreaConfig,
    #[serde(default)]
    pub data_sources: DataSourcesConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

impl MonitorConfig {
    /// Defaults for a given mode.
    pub fn for_mode(mode: Mode) -> Self {
        let mut cfg = Self {
            mode,
            ..Self::default()
        };
        cfg.normalize();
        cfg
    }

    /// Load from an explicit path. TOML or JSON by extension.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        Self::parse(&content, &ext).with_context(|| format!("parsing {}", path.display()))
    }

    /// Parse a config body; `ext` is "toml" or "json".
    pub fn parse(s: &str, ext: &str) -> Result<Self> {
        let mut cfg: MonitorConfig = match ext {
            "json" => serde_json::from_str(s)?,
            "toml" | "" => toml::from_str(s)?,
            other => return Err(anyhow!("unsupported config format: {other}")),
        };
        cfg.normalize();
        Ok(cfg)
    }

    /// Resolve via env var and fallbacks, then apply env overrides.
    pub fn load_default() -> Result<Self> {
        let mode = std::env::var(ENV_MODE)
            .ok()
            .and_then(|m| Mode::parse(&m));

        let mut cfg = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else {
            let m = mode.unwrap_or_default();
            let dir = Path::new(DEFAULT_CONFIG_DIR);
            let toml_p = dir.join(format!("{}.toml", m.as_str()));
            let json_p = dir.join(format!("{}.json", m.as_str()));
            if toml_p.exists() {
                Self::load_from(&toml_p)?
            } else if json_p.exists() {
                Self::load_from(&json_p)?
            } else {
                Self::for_mode(m)
            }
        };

        if let Some(m) = mode {
            cfg.mode = m;
        }
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    /// `URBAN_WATCH_LLM_PROVIDER`, `URBAN_WATCH_SPIKE_THRESHOLD`, `AI_TEST_MODE=mock`.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(p) = std::env::var(ENV_LLM_PROVIDER) {
            if !p.trim().is_empty() {
                self.llm.provider = p;
            }
        }
        if std::env::var("AI_TEST_MODE")
            .map(|v| v == "mock")
            .unwrap_or(false)
        {
            self.llm.provider = "mock".to_string();
        }
        if let Some(t) = std::env::var(ENV_SPIKE_THRESHOLD)
            .ok()
            .and_then(|v| v.trim().parse::<u32>().ok())
        {
            self.anomaly_rules.social_media_spike = t;
        }
        self.llm.normalize();
    }

    pub fn normalize(&mut self) {
        self.anomaly_rules.normalize();
        if self.detector.spike_window_secs == 0 {
            self.detector.spike_window_secs = default_spike_window_secs();
        }
        self.detector.max_buckets = self.detector.max_buckets.max(1);
        self.area.normalize();
        self.llm.normalize();
        self.retrieval.normalize();
        self.dashboard.normalize();
    }

    pub fn spike_window(&self) -> Duration {
        Duration::from_secs(self.detector.spike_window_secs)
    }
}
