//! Static threshold rules.
//!
//! One integer threshold for social-media spikes, plus any number of
//! `metric -> limit` pairs checked against IoT payloads. A reading fires when it
//! is strictly greater than its limit. Metrics without a limit are never checked.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::event::{Anomaly, AnomalyKind, Payload};

pub const DEFAULT_SOCIAL_MEDIA_SPIKE: u32 = 10;

fn default_spike() -> u32 {
    DEFAULT_SOCIAL_MEDIA_SPIKE
}

/// `[anomaly_rules]` table: `social_media_spike` plus flat metric thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRules {
    #[serde(default = "default_spike")]
    pub social_media_spike: u32,
    #[serde(flatten)]
    pub metrics: BTreeMap<String, f64>,
}

impl Default for AnomalyRules {
    fn default() -> Self {
        let mut metrics = BTreeMap::new();
        metrics.insert("noise_level".to_string(), 80.0);
        metrics.insert("crowd_density".to_string(), 0.8);
        Self {
            social_media_spike: DEFAULT_SOCIAL_MEDIA_SPIKE,
            metrics,
        }
    }
}

/// Outcome of scanning one payload.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricCheck {
    /// First metric over its limit.
    Exceeded { metric: String, value: String },
    /// Nothing over a limit; `skipped` lists configured metrics that carried a
    /// non-numeric value.
    Clear { skipped: Vec<String> },
}

impl AnomalyRules {
    /// Rules with no metric thresholds.
    pub fn spike_only(social_media_spike: u32) -> Self {
        Self {
            social_media_spike,
            metrics: BTreeMap::new(),
        }
    }

    pub fn with_metric(mut self, name: impl Into<String>, limit: f64) -> Self {
        self.metrics.insert(name.into(), limit);
        self
    }

    pub fn threshold(&self, metric: &str) -> Option<f64> {
        self.metrics.get(metric).copied()
    }

    /// Drop non-finite limits; they could never be compared meaningfully.
    pub fn normalize(&mut self) {
        self.metrics.retain(|_, v| v.is_finite());
    }

    /// Pre-reset count strictly above the spike threshold.
    pub fn is_spike(&self, count: u32) -> bool {
        count > self.social_media_spike
    }

    /// Walk `payload` in insertion order; the first configured metric whose
    /// numeric value exceeds its limit wins.
    pub fn check_metrics(&self, payload: &Payload) -> MetricCheck {
        let mut skipped = Vec::new();
        for (metric, value) in payload {
            let Some(limit) = self.threshold(metric) else {
                continue;
            };
            match value.as_f64() {
                Some(v) if v > limit => {
                    return MetricCheck::Exceeded {
                        metric: metric.clone(),
                        value: value.to_string(),
                    }
                }
                Some(_) => {}
                None => skipped.push(metric.clone()),
            }
        }
        MetricCheck::Clear { skipped }
    }
}

pub fn spike_anomaly(bucket_key: &str) -> Anomaly {
    Anomaly::new(
        AnomalyKind::SocialMediaSpike,
        format!("Spike in social media mentions at {bucket_key}"),
    )
}

pub fn metric_anomaly(metric: &str, value: &str) -> Anomaly {
    Anomaly::new(
        AnomalyKind::Metric(metric.to_string()),
        format!("High {metric} detected: {value}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{payload, MetricValue};

    fn rules() -> AnomalyRules {
        AnomalyRules::spike_only(10)
            .with_metric("noise_level", 80.0)
            .with_metric("crowd_density", 0.8)
    }

    #[test]
    fn first_match_follows_payload_order() {
        let p = payload([
            ("crowd_density", MetricValue::Float(0.95)),
            ("noise_level", MetricValue::Float(95.0)),
        ]);
        match rules().check_metrics(&p) {
            MetricCheck::Exceeded { metric, value } => {
                assert_eq!(metric, "crowd_density");
                assert_eq!(value, "0.95");
            }
            other => panic!("expected exceedance, got {other:?}"),
        }
    }

    #[test]
    fn equal_to_limit_does_not_fire() {
        let p = payload([("noise_level", 80i64)]);
        assert_eq!(
            rules().check_metrics(&p),
            MetricCheck::Clear { skipped: vec![] }
        );
    }

    #[test]
    fn unconfigured_metrics_are_ignored() {
        let p = payload([("temperature", 1_000.0)]);
        assert!(matches!(rules().check_metrics(&p), MetricCheck::Clear { .. }));
    }

    #[test]
    fn non_numeric_configured_metric_is_skipped_not_fatal() {
        let p = payload([
            ("noise_level", MetricValue::Text("loud".into())),
            ("crowd_density", MetricValue::Float(0.9)),
        ]);
        assert!(matches!(
            rules().check_metrics(&p),
            MetricCheck::Exceeded { ref metric, .. } if metric == "crowd_density"
        ));

        let p = payload([("noise_level", MetricValue::Bool(true))]);
        assert_eq!(
            rules().check_metrics(&p),
            MetricCheck::Clear {
                skipped: vec!["noise_level".to_string()]
            }
        );
    }

    #[test]
    fn spike_is_strictly_greater() {
        let r = rules();
        assert!(!r.is_spike(10));
        assert!(r.is_spike(11));
    }
}
