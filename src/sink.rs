// src/sink.rs
//! Output streams: every annotated record as JSON Lines, anomalies as CSV.
//! Files are recreated on open and flushed after each record.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::config::OutputConfig;
use crate::event::EventRecord;

pub const ANOMALY_CSV_HEADER: [&str; 7] = [
    "timestamp",
    "source",
    "lat",
    "lon",
    "anomaly_type",
    "anomaly_description",
    "payload",
];

pub struct OutputSink {
    processed: Option<BufWriter<File>>,
    anomalies: Option<csv::Writer<File>>,
    written: u64,
    anomalies_written: u64,
}

impl OutputSink {
    /// No files; `write` only counts.
    pub fn disabled() -> Self {
        Self {
            processed: None,
            anomalies: None,
            written: 0,
            anomalies_written: 0,
        }
    }

    pub fn open(cfg: &OutputConfig) -> Result<Self> {
        if !cfg.enabled {
            return Ok(Self::disabled());
        }

        let processed = create(&cfg.processed_path)?;

        let file = create(&cfg.anomalies_path)?;
        let mut anomalies = csv::Writer::from_writer(file);
        anomalies
            .write_record(ANOMALY_CSV_HEADER)
            .context("writing anomalies header")?;
        anomalies.flush().context("flushing anomalies header")?;

        tracing::info!(
            target: "pipeline",
            processed = %cfg.processed_path.display(),
            anomalies = %cfg.anomalies_path.display(),
            "output sinks open"
        );

        Ok(Self {
            processed: Some(BufWriter::new(processed)),
            anomalies: Some(anomalies),
            written: 0,
            anomalies_written: 0,
        })
    }

    pub fn write(&mut self, record: &EventRecord) -> Result<()> {
        if let Some(w) = self.processed.as_mut() {
            serde_json::to_writer(&mut *w, record).context("encoding processed record")?;
            w.write_all(b"\n").context("writing processed record")?;
            w.flush().context("flushing processed output")?;
        }
        self.written += 1;

        let Some(anomaly) = &record.anomaly else {
            return Ok(());
        };
        if let Some(w) = self.anomalies.as_mut() {
            let payload = serde_json::to_string(&record.payload).context("encoding payload")?;
            let lat = record.location.lat.to_string();
            let lon = record.location.lon.to_string();
            let kind = anomaly.kind.label();
            w.write_record([
                record.timestamp.as_str(),
                record.source.as_str(),
                lat.as_str(),
                lon.as_str(),
                kind.as_str(),
                anomaly.description.as_str(),
                payload.as_str(),
            ])
            .context("writing anomaly row")?;
            w.flush().context("flushing anomalies output")?;
        }
        self.anomalies_written += 1;
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn anomalies_written(&self) -> u64 {
        self.anomalies_written
    }
}

fn create(path: &Path) -> Result<File> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    File::create(path).with_context(|| format!("creating {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{payload, Anomaly, AnomalyKind, Location, Source};

    fn cfg(dir: &Path) -> OutputConfig {
        OutputConfig {
            enabled: true,
            processed_path: dir.join("out/processed.jsonl"),
            anomalies_path: dir.join("out/anomalies.csv"),
        }
    }

    #[test]
    fn writes_every_record_and_only_anomaly_rows() {
        let tmp = tempfile::tempdir().unwrap();
        let c = cfg(tmp.path());
        let mut sink = OutputSink::open(&c).unwrap();

        let plain = EventRecord::new(
            "2025-06-01T12:00:00Z",
            Source::Traffic,
            payload([("incident_count", 2i64)]),
            Location::new(40.75, -73.95),
        );
        let mut flagged = EventRecord::new(
            "2025-06-01T12:00:01Z",
            Source::IotSensors,
            payload([("noise_level", 90i64)]),
            Location::new(40.7128, -74.006),
        );
        flagged.annotate(Anomaly::new(
            AnomalyKind::Metric("noise_level".into()),
            "High noise_level detected: 90",
        ));

        sink.write(&plain).unwrap();
        sink.write(&flagged).unwrap();
        assert_eq!(sink.written(), 2);
        assert_eq!(sink.anomalies_written(), 1);

        let jsonl = fs::read_to_string(&c.processed_path).unwrap();
        let lines: Vec<&str> = jsonl.lines().collect();
        assert_eq!(lines.len(), 2);
        let back: EventRecord = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(back, flagged);

        let mut rdr = csv::Reader::from_path(&c.anomalies_path).unwrap();
        let headers = rdr.headers().unwrap().clone();
        assert_eq!(headers.iter().collect::<Vec<_>>(), ANOMALY_CSV_HEADER.to_vec());
        let rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(&rows[0][1], "iot_sensors");
        assert_eq!(&rows[0][4], "noise_level_anomaly");
        assert_eq!(&rows[0][6], r#"{"noise_level":90}"#);
    }

    #[test]
    fn disabled_sink_touches_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let mut c = cfg(tmp.path());
        c.enabled = false;
        let mut sink = OutputSink::open(&c).unwrap();
        sink.write(&EventRecord::new(
            "t",
            Source::Transit,
            payload([("delay", 3.0)]),
            Location::new(0.0, 0.0),
        ))
        .unwrap();
        assert_eq!(sink.written(), 1);
        assert!(!c.processed_path.exists());
    }
}
