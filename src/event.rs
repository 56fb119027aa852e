//! # Event Record
//! The single structured entity flowing through the pipeline: a timestamped,
//! geotagged record with an open-ended, insertion-ordered payload and an
//! optional anomaly annotation.
//!
//! Wire shape (one JSON object):
//! `{ timestamp, source, payload, location, [anomaly, anomaly_type, anomaly_description] }`
//! The three anomaly fields are either all present or all absent.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Origin feed of a record. Unknown tags are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Source {
    SocialMedia,
    PublicSafety,
    IotSensors,
    Transit,
    Traffic,
    Environment,
    Other(String),
}

impl Source {
    pub fn as_str(&self) -> &str {
        match self {
            Source::SocialMedia => "social_media",
            Source::PublicSafety => "public_safety",
            Source::IotSensors => "iot_sensors",
            Source::Transit => "transit",
            Source::Traffic => "traffic",
            Source::Environment => "environment",
            Source::Other(s) => s.as_str(),
        }
    }
}

impl From<String> for Source {
    fn from(s: String) -> Self {
        match s.as_str() {
            "social_media" => Source::SocialMedia,
            "public_safety" => Source::PublicSafety,
            "iot_sensors" => Source::IotSensors,
            "transit" => Source::Transit,
            "traffic" => Source::Traffic,
            "environment" => Source::Environment,
            _ => Source::Other(s),
        }
    }
}

impl From<&str> for Source {
    fn from(s: &str) -> Self {
        Source::from(s.to_string())
    }
}

impl From<Source> for String {
    fn from(s: Source) -> Self {
        match s {
            Source::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Geographic point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

impl Location {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// A payload value. Integers are kept apart from floats so they serialize back
/// exactly as they were read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<MetricValue>),
    Map(Payload),
}

impl MetricValue {
    /// Numeric view used by threshold rules. Bools and text are not numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Int(i) => Some(*i as f64),
            MetricValue::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Bool(b) => write!(f, "{b}"),
            MetricValue::Int(i) => write!(f, "{i}"),
            MetricValue::Float(x) => write!(f, "{x}"),
            MetricValue::Text(s) => f.write_str(s),
            other => {
                let json = serde_json::to_string(other).map_err(|_| fmt::Error)?;
                f.write_str(&json)
            }
        }
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Float(v)
    }
}

impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        MetricValue::Int(v)
    }
}

impl From<bool> for MetricValue {
    fn from(v: bool) -> Self {
        MetricValue::Bool(v)
    }
}

impl From<&str> for MetricValue {
    fn from(v: &str) -> Self {
        MetricValue::Text(v.to_string())
    }
}

impl From<String> for MetricValue {
    fn from(v: String) -> Self {
        MetricValue::Text(v)
    }
}

/// Metric name → value, iterated in insertion order.
pub type Payload = IndexMap<String, MetricValue>;

/// Kind of anomaly raised by the detector.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AnomalyKind {
    SocialMediaSpike,
    /// `<metric>_anomaly`
    Metric(String),
}

impl AnomalyKind {
    pub fn label(&self) -> String {
        match self {
            AnomalyKind::SocialMediaSpike => "social_media_spike".to_string(),
            AnomalyKind::Metric(m) => format!("{m}_anomaly"),
        }
    }
}

impl From<String> for AnomalyKind {
    fn from(s: String) -> Self {
        if s == "social_media_spike" {
            return AnomalyKind::SocialMediaSpike;
        }
        match s.strip_suffix("_anomaly") {
            Some(metric) if !metric.is_empty() => AnomalyKind::Metric(metric.to_string()),
            _ => AnomalyKind::Metric(s),
        }
    }
}

impl Serialize for AnomalyKind {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.label())
    }
}

impl<'de> Deserialize<'de> for AnomalyKind {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        String::deserialize(d).map(AnomalyKind::from)
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Marker serialized as `anomaly: true`. Deserializing `false` fails, which makes
/// the surrounding optional annotation read as absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Flagged;

impl Serialize for Flagged {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_bool(true)
    }
}

impl<'de> Deserialize<'de> for Flagged {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        if bool::deserialize(d)? {
            Ok(Flagged)
        } else {
            Err(serde::de::Error::custom("anomaly flag must be true"))
        }
    }
}

/// Complete anomaly annotation; the only way to flag a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anomaly {
    #[serde(rename = "anomaly")]
    flag: Flagged,
    #[serde(rename = "anomaly_type")]
    pub kind: AnomalyKind,
    #[serde(rename = "anomaly_description")]
    pub description: String,
}

impl Anomaly {
    pub fn new(kind: AnomalyKind, description: impl Into<String>) -> Self {
        Self {
            flag: Flagged,
            kind,
            description: description.into(),
        }
    }
}

/// One location-tagged observation from a feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// ISO-8601 string, kept verbatim.
    pub timestamp: String,
    pub source: Source,
    /// Required; a record without one is rejected rather than read as empty.
    pub payload: Payload,
    pub location: Location,
    #[serde(flatten)]
    pub anomaly: Option<Anomaly>,
}

impl EventRecord {
    pub fn new(
        timestamp: impl Into<String>,
        source: impl Into<Source>,
        payload: Payload,
        location: Location,
    ) -> Self {
        Self {
            timestamp: timestamp.into(),
            source: source.into(),
            payload,
            location,
            anomaly: None,
        }
    }

    /// Record stamped with the current UTC time (RFC 3339, microseconds).
    pub fn now(source: impl Into<Source>, payload: Payload, location: Location) -> Self {
        Self::new(iso_now(), source, payload, location)
    }

    pub fn is_anomaly(&self) -> bool {
        self.anomaly.is_some()
    }

    /// Replace any existing annotation.
    pub fn annotate(&mut self, anomaly: Anomaly) {
        self.anomaly = Some(anomaly);
    }

    /// Text rendering used for embeddings: `"{source}: {payload-json} at {lat},{lon}"`.
    pub fn document_text(&self) -> String {
        let data = serde_json::to_string(&self.payload).unwrap_or_else(|_| "{}".to_string());
        format!(
            "{}: {} at {},{}",
            self.source, data, self.location.lat, self.location.lon
        )
    }
}

/// Current UTC time as RFC 3339 with microseconds and a `Z` suffix.
pub fn iso_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

/// Build a payload from `(name, value)` pairs, keeping their order.
pub fn payload<I, K, V>(pairs: I) -> Payload
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<MetricValue>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
