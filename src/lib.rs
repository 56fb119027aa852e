// src/lib.rs
// Public library surface for the service binary, the replay tool and integration tests.

pub mod api;
pub mod config;
pub mod dashboard;
pub mod detector;
pub mod event;
pub mod metrics;
pub mod pipeline;
pub mod retrieval;
pub mod sink;
pub mod sources;
pub mod store;
pub mod summary;

use anyhow::Result;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

pub use crate::api::{create_router, AppState};
pub use crate::config::MonitorConfig;
pub use crate::detector::AnomalyDetector;
pub use crate::event::{EventRecord, Source};
pub use crate::pipeline::{Pipeline, PipelineHandle};
pub use crate::retrieval::RagSystem;

/// A running monitor: the HTTP router plus the background pipeline feeding it.
pub struct Service {
    pub router: Router,
    pub pipeline: PipelineHandle,
}

/// Build shared state, start the pipeline and return the router.
/// Must be called from inside a tokio runtime.
pub fn start(cfg: MonitorConfig, metrics: Option<PrometheusHandle>) -> Result<Service> {
    let store = Arc::new(store::LiveStore::from_config(&cfg.dashboard));
    let rag = Arc::new(RagSystem::from_config(&cfg));
    let pipeline = Pipeline::spawn(&cfg, store.clone(), rag.clone())?;

    let state = AppState {
        config: Arc::new(cfg),
        store,
        rag,
        ingest: Some(pipeline.sender()),
        metrics,
    };

    Ok(Service {
        router: create_router(state),
        pipeline,
    })
}
