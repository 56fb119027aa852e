//! # Anomaly Detector
//! Stateful, single-writer evaluation of incoming records.
//!
//! Per record:
//! 1. Quantise the location into a bucket (two decimals) and create it lazily.
//! 2. `social_media`: bump the bucket counter; once more than the window has
//!    elapsed since the bucket's last reset, compare the pre-reset count with
//!    `social_media_spike`, annotate on a spike, then reset unconditionally.
//! 3. `iot_sensors`: first payload metric (insertion order) above its limit wins.
//!
//! Resets are lazy: a bucket only rolls over when its next social-media event
//! arrives. A bucket that goes quiet keeps its count and never fires.

pub mod buckets;
pub mod rules;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::{counter, gauge};
use std::time::Duration;

use crate::config::MonitorConfig;
use crate::event::{EventRecord, Location, Source};
use buckets::{bucket_key, BucketState, BucketTable};
use rules::{metric_anomaly, spike_anomaly, AnomalyRules, MetricCheck};

pub use buckets::BucketState as BucketSnapshot;

pub struct AnomalyDetector {
    rules: AnomalyRules,
    window: ChronoDuration,
    buckets: BucketTable,
}

impl AnomalyDetector {
    pub fn new(rules: AnomalyRules, window: Duration, max_buckets: usize) -> Self {
        let window = ChronoDuration::from_std(window).unwrap_or_else(|_| ChronoDuration::seconds(60));
        Self {
            rules,
            window,
            buckets: BucketTable::with_capacity(max_buckets),
        }
    }

    pub fn from_config(cfg: &MonitorConfig) -> Self {
        Self::new(
            cfg.anomaly_rules.clone(),
            cfg.spike_window(),
            cfg.detector.max_buckets,
        )
    }

    pub fn rules(&self) -> &AnomalyRules {
        &self.rules
    }

    pub fn location_key(loc: &Location) -> String {
        bucket_key(loc)
    }

    /// Evaluate against the wall clock.
    pub fn evaluate(&mut self, record: EventRecord) -> EventRecord {
        self.evaluate_at(record, Utc::now())
    }

    /// Evaluate with an explicit `now` (replay and tests).
    pub fn evaluate_at(&mut self, mut record: EventRecord, now: DateTime<Utc>) -> EventRecord {
        let key = bucket_key(&record.location);
        let bucket = self.buckets.touch(&key, now);

        // A record carries one source, so at most one arm can annotate.
        let anomaly = match record.source {
            Source::SocialMedia => check_spike(bucket, &self.rules, self.window, &key, now),
            Source::IotSensors => match self.rules.check_metrics(&record.payload) {
                MetricCheck::Exceeded { metric, value } => Some(metric_anomaly(&metric, &value)),
                MetricCheck::Clear { skipped } => {
                    for metric in skipped {
                        tracing::debug!(
                            target: "detector",
                            %metric,
                            bucket = %key,
                            "non-numeric value for configured metric, skipped"
                        );
                        counter!("detector_non_numeric_total").increment(1);
                    }
                    None
                }
            },
            _ => None,
        };

        gauge!("detector_buckets").set(self.buckets.len() as f64);

        if let Some(a) = anomaly {
            tracing::info!(
                target: "detector",
                kind = %a.kind,
                source = %record.source,
                bucket = %key,
                "anomaly flagged"
            );
            counter!("anomalies_total", "kind" => a.kind.label()).increment(1);
            record.annotate(a);
        }
        record
    }

    pub fn bucket(&self, key: &str) -> Option<BucketSnapshot> {
        self.buckets.get(key).copied()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn evicted_buckets(&self) -> u64 {
        self.buckets.evicted()
    }
}

fn check_spike(
    bucket: &mut BucketState,
    rules: &AnomalyRules,
    window: ChronoDuration,
    key: &str,
    now: DateTime<Utc>,
) -> Option<crate::event::Anomaly> {
    bucket.social_media = bucket.social_media.saturating_add(1);

    if now - bucket.last_reset <= window {
        return None;
    }

    let count = bucket.social_media;
    bucket.reset(now);
    tracing::debug!(target: "detector", bucket = %key, count, "bucket window rolled over");

    rules.is_spike(count).then(|| spike_anomaly(key))
}
