// tests/metrics.rs
use std::sync::Arc;
use std::time::Duration;

use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use urban_watch::config::{Mode, MonitorConfig};
use urban_watch::detector::rules::AnomalyRules;
use urban_watch::event::{payload, Location};
use urban_watch::metrics::Metrics;
use urban_watch::retrieval::{DisabledGenerator, HashingEmbedder, RetryPolicy};
use urban_watch::store::LiveStore;
use urban_watch::{create_router, AnomalyDetector, AppState, EventRecord, RagSystem, Source};

#[tokio::test]
async fn metrics_endpoint_contains_expected_series() {
    let metrics = Metrics::init().expect("recorder");
    let cfg = MonitorConfig::for_mode(Mode::PublicSafety);

    let mut detector = AnomalyDetector::new(AnomalyRules::default(), Duration::from_secs(60), 10);
    detector.evaluate(EventRecord::new(
        "2025-06-01T12:00:00Z",
        Source::IotSensors,
        payload([("noise_level", 95.0)]),
        Location::new(40.75, -73.95),
    ));

    let rag = Arc::new(RagSystem::new(
        Arc::new(HashingEmbedder::new(32)),
        Arc::new(DisabledGenerator),
        RetryPolicy::default(),
        5,
    ));
    assert!(rag.query("anything?", 3).await.is_err());

    let state = AppState {
        store: Arc::new(LiveStore::from_config(&cfg.dashboard)),
        rag,
        config: Arc::new(cfg),
        ingest: None,
        metrics: Some(metrics.handle.clone()),
    };

    let req = Request::builder()
        .uri("/metrics")
        .body(Body::empty())
        .expect("build GET /metrics");
    let resp = create_router(state).oneshot(req).await.expect("oneshot /metrics");
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .expect("read body");
    let text = String::from_utf8(bytes.to_vec()).expect("utf8");
    for series in [
        "anomalies_total",
        "detector_buckets",
        "query_total",
        "query_errors_total",
        "query_duration_ms",
    ] {
        assert!(text.contains(series), "missing {series} in:\n{text}");
    }
    assert!(text.contains("kind=\"noise_level_anomaly\""));
}

#[tokio::test]
async fn metrics_route_is_404_without_recorder() {
    let cfg = MonitorConfig::for_mode(Mode::PublicSafety);
    let state = AppState {
        store: Arc::new(LiveStore::from_config(&cfg.dashboard)),
        rag: Arc::new(RagSystem::from_config(&cfg)),
        config: Arc::new(cfg),
        ingest: None,
        metrics: None,
    };
    let req = Request::builder()
        .uri("/metrics")
        .body(Body::empty())
        .unwrap();
    let resp = create_router(state).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
