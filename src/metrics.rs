// src/metrics.rs
use anyhow::{anyhow, Result};
use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder (once per process) and describe every series.
    pub fn init() -> Result<Self> {
        let handle = HANDLE
            .get_or_try_init(|| {
                let handle = PrometheusBuilder::new()
                    .install_recorder()
                    .map_err(|e| anyhow!("prometheus: install recorder: {e}"))?;
                describe_all();
                Ok::<_, anyhow::Error>(handle)
            })?
            .clone();
        Ok(Self { handle })
    }
}

fn describe_all() {
    describe_counter!("events_generated_total", "Records produced by synthetic feeds, by source");
    describe_counter!("events_total", "Records evaluated, by source");
    describe_counter!("anomalies_total", "Anomalies flagged, by kind");
    describe_gauge!("detector_buckets", "Location buckets currently tracked");
    describe_counter!(
        "detector_non_numeric_total",
        "Configured metrics skipped because the value was not numeric"
    );
    describe_gauge!("index_documents", "Documents in the retrieval index");
    describe_counter!("index_errors_total", "Records that failed to index");
    describe_counter!("index_dropped_total", "Records dropped because the index queue was full");
    describe_counter!("query_total", "Questions received");
    describe_counter!("query_errors_total", "Questions that failed");
    describe_histogram!("query_duration_ms", Unit::Milliseconds, "Question latency");
}
