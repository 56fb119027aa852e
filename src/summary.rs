// src/summary.rs
//! Chart aggregations over retained records: share per source, a metric over
//! time, and a metric's mean per source. Records are taken oldest first.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::event::EventRecord;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceCount {
    pub source: String,
    pub count: u64,
    /// Share of all records, 0..=1.
    pub share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub timestamp: String,
    pub source: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupMean {
    pub source: String,
    pub mean: f64,
    pub count: u64,
}

/// Count per source, largest first; ties by name.
pub fn source_breakdown(records: &[EventRecord]) -> Vec<SourceCount> {
    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    for r in records {
        *counts.entry(r.source.to_string()).or_default() += 1;
    }
    let total = records.len().max(1) as f64;
    let mut out: Vec<SourceCount> = counts
        .into_iter()
        .map(|(source, count)| SourceCount {
            source,
            count,
            share: count as f64 / total,
        })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.source.cmp(&b.source)));
    out
}

/// Numeric values of `metric` in arrival order. Records without it (or with a
/// non-numeric value) are left out.
pub fn metric_series(records: &[EventRecord], metric: &str) -> Vec<SeriesPoint> {
    records
        .iter()
        .filter_map(|r| {
            let value = r.payload.get(metric)?.as_f64()?;
            Some(SeriesPoint {
                timestamp: r.timestamp.clone(),
                source: r.source.to_string(),
                value,
            })
        })
        .collect()
}

/// Mean of `metric` grouped by source, sorted by source.
pub fn metric_mean_by(records: &[EventRecord], metric: &str) -> Vec<GroupMean> {
    let mut acc: BTreeMap<String, (f64, u64)> = BTreeMap::new();
    for p in metric_series(records, metric) {
        let e = acc.entry(p.source).or_default();
        e.0 += p.value;
        e.1 += 1;
    }
    acc.into_iter()
        .map(|(source, (sum, count))| GroupMean {
            source,
            mean: sum / count as f64,
            count,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{payload, Location, MetricValue, Source};

    fn rec(source: Source, noise: MetricValue) -> EventRecord {
        EventRecord::new(
            "2025-06-01T12:00:00Z",
            source,
            payload([("noise_level", noise)]),
            Location::new(40.75, -73.95),
        )
    }

    fn sample() -> Vec<EventRecord> {
        vec![
            rec(Source::IotSensors, MetricValue::Float(60.0)),
            rec(Source::IotSensors, MetricValue::Int(90)),
            rec(Source::Environment, MetricValue::Float(50.0)),
            rec(Source::Environment, MetricValue::Text("n/a".into())),
            rec(Source::Traffic, MetricValue::Bool(true)),
        ]
    }

    #[test]
    fn breakdown_sorted_by_count() {
        let b = source_breakdown(&sample());
        let names: Vec<&str> = b.iter().map(|c| c.source.as_str()).collect();
        assert_eq!(names, vec!["environment", "iot_sensors", "traffic"]);
        assert_eq!(b[0].count, 2);
        assert!((b[2].share - 0.2).abs() < 1e-9);
        assert!(source_breakdown(&[]).is_empty());
    }

    #[test]
    fn series_skips_non_numeric() {
        let s = metric_series(&sample(), "noise_level");
        let values: Vec<f64> = s.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![60.0, 90.0, 50.0]);
        assert!(metric_series(&sample(), "temperature").is_empty());
    }

    #[test]
    fn mean_grouped_by_source() {
        let m = metric_mean_by(&sample(), "noise_level");
        assert_eq!(
            m,
            vec![
                GroupMean {
                    source: "environment".into(),
                    mean: 50.0,
                    count: 1
                },
                GroupMean {
                    source: "iot_sensors".into(),
                    mean: 75.0,
                    count: 2
                },
            ]
        );
    }
}
