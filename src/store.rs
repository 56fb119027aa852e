// src/store.rs
//! In-memory live view for the dashboard: the latest records, the latest
//! anomalies and running per-source counters.

use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use crate::config::DashboardConfig;
use crate::event::{EventRecord, Location, Source};

#[derive(Debug, Default)]
struct Inner {
    recent: VecDeque<EventRecord>,
    anomalies: VecDeque<EventRecord>,
    per_source: BTreeMap<String, u64>,
    total: u64,
    anomaly_total: u64,
}

#[derive(Debug)]
pub struct LiveStore {
    inner: Mutex<Inner>,
    cap: usize,
    anomaly_cap: usize,
}

/// Counters since start.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStats {
    pub total: u64,
    pub anomalies: u64,
    pub per_source: BTreeMap<String, u64>,
}

/// One marker for the map view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapPoint {
    pub lat: f64,
    pub lon: f64,
    pub source: Source,
    pub anomaly: bool,
    pub label: String,
}

impl LiveStore {
    pub fn with_capacity(cap: usize, anomaly_cap: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            cap: cap.clamp(1, 100_000),
            anomaly_cap: anomaly_cap.clamp(1, 100_000),
        }
    }

    pub fn from_config(cfg: &DashboardConfig) -> Self {
        Self::with_capacity(cfg.history_capacity, cfg.anomaly_capacity)
    }

    pub fn push(&self, record: &EventRecord) {
        let mut g = self.inner.lock().expect("store mutex poisoned");
        g.total += 1;
        *g.per_source.entry(record.source.to_string()).or_default() += 1;

        if record.is_anomaly() {
            g.anomaly_total += 1;
            g.anomalies.push_back(record.clone());
            while g.anomalies.len() > self.anomaly_cap {
                g.anomalies.pop_front();
            }
        }

        g.recent.push_back(record.clone());
        while g.recent.len() > self.cap {
            g.recent.pop_front();
        }
    }

    /// Last `n` records, oldest first.
    pub fn recent(&self, n: usize) -> Vec<EventRecord> {
        let g = self.inner.lock().expect("store mutex poisoned");
        tail(&g.recent, n)
    }

    /// Last `n` anomalies, oldest first.
    pub fn anomalies(&self, n: usize) -> Vec<EventRecord> {
        let g = self.inner.lock().expect("store mutex poisoned");
        tail(&g.anomalies, n)
    }

    /// Every retained record, oldest first (chart input).
    pub fn snapshot(&self) -> Vec<EventRecord> {
        let g = self.inner.lock().expect("store mutex poisoned");
        g.recent.iter().cloned().collect()
    }

    pub fn map_points(&self, n: usize) -> Vec<MapPoint> {
        self.recent(n)
            .into_iter()
            .map(|r| {
                let label = match &r.anomaly {
                    Some(a) => a.kind.label(),
                    None => r.source.to_string(),
                };
                let Location { lat, lon } = r.location;
                MapPoint {
                    lat,
                    lon,
                    anomaly: r.is_anomaly(),
                    source: r.source,
                    label,
                }
            })
            .collect()
    }

    pub fn stats(&self) -> StoreStats {
        let g = self.inner.lock().expect("store mutex poisoned");
        StoreStats {
            total: g.total,
            anomalies: g.anomaly_total,
            per_source: g.per_source.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("store mutex poisoned").recent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn tail(q: &VecDeque<EventRecord>, n: usize) -> Vec<EventRecord> {
    let start = q.len().saturating_sub(n);
    q.iter().skip(start).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{payload, Anomaly, AnomalyKind};

    fn rec(source: Source, i: i64) -> EventRecord {
        EventRecord::new(
            format!("2025-06-01T12:00:{i:02}Z"),
            source,
            payload([("i", i)]),
            Location::new(40.75, -73.95),
        )
    }

    #[test]
    fn bounded_and_ordered() {
        let s = LiveStore::with_capacity(3, 2);
        for i in 0..5 {
            s.push(&rec(Source::Traffic, i));
        }
        let r = s.recent(10);
        assert_eq!(r.len(), 3);
        assert_eq!(r[0].payload["i"].to_string(), "2");
        assert_eq!(r[2].payload["i"].to_string(), "4");
        assert_eq!(s.recent(1)[0].payload["i"].to_string(), "4");
        assert_eq!(s.stats().total, 5);
    }

    #[test]
    fn anomalies_tracked_separately() {
        let s = LiveStore::with_capacity(10, 10);
        s.push(&rec(Source::IotSensors, 1));
        let mut a = rec(Source::IotSensors, 2);
        a.annotate(Anomaly::new(
            AnomalyKind::Metric("noise_level".into()),
            "High noise_level detected: 95",
        ));
        s.push(&a);

        assert_eq!(s.anomalies(10), vec![a]);
        let st = s.stats();
        assert_eq!(st.anomalies, 1);
        assert_eq!(st.per_source.get("iot_sensors"), Some(&2));

        let pts = s.map_points(10);
        assert_eq!(pts.len(), 2);
        assert!(!pts[0].anomaly);
        assert_eq!(pts[1].label, "noise_level_anomaly");
    }
}
