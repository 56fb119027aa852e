//! Replays a JSON Lines file of records through the detector and prints the
//! annotated records to stdout. Each record's own timestamp drives the window
//! clock, so a replay is deterministic. Annotations already present in the
//! input are discarded and recomputed.
//!
//! Usage: `replay <records.jsonl>` (reads stdin when no path is given).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::io::{self, BufRead, BufReader, Write};

use urban_watch::{AnomalyDetector, EventRecord, MonitorConfig};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cfg = MonitorConfig::load_default().context("loading configuration")?;
    let mut detector = AnomalyDetector::from_config(&cfg);

    let input: Box<dyn BufRead> = match std::env::args().nth(1) {
        Some(path) => Box::new(BufReader::new(
            std::fs::File::open(&path).with_context(|| format!("opening {path}"))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let (mut total, mut flagged, mut skipped) = (0u64, 0u64, 0u64);

    for (n, line) in input.lines().enumerate() {
        let line = line.context("reading input")?;
        if line.trim().is_empty() {
            continue;
        }
        let mut record: EventRecord = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(line = n + 1, error = %e, "skipping malformed record");
                skipped += 1;
                continue;
            }
        };

        // Re-derive annotations from scratch.
        record.anomaly = None;
        let now = DateTime::parse_from_rfc3339(&record.timestamp)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        let record = detector.evaluate_at(record, now);

        total += 1;
        if record.is_anomaly() {
            flagged += 1;
        }
        serde_json::to_writer(&mut out, &record).context("writing record")?;
        out.write_all(b"\n").context("writing record")?;
    }

    tracing::info!(total, flagged, skipped, buckets = detector.bucket_count(), "replay done");
    Ok(())
}
