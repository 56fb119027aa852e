// src/api.rs
use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;

use crate::config::MonitorConfig;
use crate::dashboard::{self, DashboardView, QueryOutcome};
use crate::detector::rules::AnomalyRules;
use crate::event::EventRecord;
use crate::retrieval::{query_id, RagSystem};
use crate::store::{LiveStore, MapPoint};
use crate::summary::{self, GroupMean, SeriesPoint, SourceCount};

const MAX_LIMIT: usize = 1000;
const MAX_K: usize = 50;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<MonitorConfig>,
    pub store: Arc<LiveStore>,
    pub rag: Arc<RagSystem>,
    /// `None` when no pipeline is running; external records are then refused.
    pub ingest: Option<mpsc::Sender<EventRecord>>,
    pub metrics: Option<PrometheusHandle>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/", get(dashboard_page))
        .route("/api/events", get(list_events).post(ingest_event))
        .route("/api/anomalies", get(list_anomalies))
        .route("/api/map", get(map_points))
        .route("/api/stats", get(stats))
        .route("/api/charts/sources", get(chart_sources))
        .route("/api/charts/metric", get(chart_metric))
        .route("/api/charts/mean", get(chart_mean))
        .route("/api/query", post(query))
        .route("/api/config", get(config_view))
        .route("/metrics", get(metrics_text))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

fn error(status: StatusCode, error: &'static str, detail: Option<String>) -> Response {
    (status, Json(ErrorBody { error, detail })).into_response()
}

#[derive(Deserialize)]
struct LimitQ {
    limit: Option<usize>,
}

fn limit(q: &LimitQ, default: usize) -> usize {
    q.limit.unwrap_or(default).clamp(1, MAX_LIMIT)
}

async fn list_events(State(state): State<AppState>, Query(q): Query<LimitQ>) -> Json<Vec<EventRecord>> {
    let n = limit(&q, state.config.dashboard.feed_rows);
    Json(state.store.recent(n))
}

async fn list_anomalies(
    State(state): State<AppState>,
    Query(q): Query<LimitQ>,
) -> Json<Vec<EventRecord>> {
    Json(state.store.anomalies(limit(&q, 50)))
}

async fn map_points(State(state): State<AppState>, Query(q): Query<LimitQ>) -> Json<Vec<MapPoint>> {
    Json(state.store.map_points(limit(&q, 200)))
}

#[derive(Serialize)]
struct StatsOut {
    mode: &'static str,
    total: u64,
    anomalies: u64,
    per_source: BTreeMap<String, u64>,
    documents_indexed: usize,
    pipeline_running: bool,
}

async fn stats(State(state): State<AppState>) -> Json<StatsOut> {
    let s = state.store.stats();
    Json(StatsOut {
        mode: state.config.mode.as_str(),
        total: s.total,
        anomalies: s.anomalies,
        per_source: s.per_source,
        documents_indexed: state.rag.document_count().await,
        pipeline_running: state.ingest.as_ref().is_some_and(|tx| !tx.is_closed()),
    })
}

async fn chart_sources(State(state): State<AppState>) -> Json<Vec<SourceCount>> {
    Json(summary::source_breakdown(&state.store.snapshot()))
}

#[derive(Deserialize)]
struct MetricQ {
    name: String,
}

async fn chart_metric(
    State(state): State<AppState>,
    Query(q): Query<MetricQ>,
) -> Json<Vec<SeriesPoint>> {
    Json(summary::metric_series(&state.store.snapshot(), &q.name))
}

async fn chart_mean(State(state): State<AppState>, Query(q): Query<MetricQ>) -> Json<Vec<GroupMean>> {
    Json(summary::metric_mean_by(&state.store.snapshot(), &q.name))
}

/// Annotations are the detector's output; any supplied with the record are dropped.
async fn ingest_event(
    State(state): State<AppState>,
    Json(mut record): Json<EventRecord>,
) -> Response {
    let Some(tx) = state.ingest.as_ref() else {
        return error(StatusCode::SERVICE_UNAVAILABLE, "pipeline not running", None);
    };
    let source = record.source.to_string();
    if record.anomaly.take().is_some() {
        tracing::debug!(target: "api", %source, "client-supplied annotation dropped");
    }
    match tx.send(record).await {
        Ok(()) => {
            tracing::debug!(target: "api", %source, "external record accepted");
            (StatusCode::ACCEPTED, Json(serde_json::json!({ "accepted": true }))).into_response()
        }
        Err(_) => error(StatusCode::SERVICE_UNAVAILABLE, "pipeline not running", None),
    }
}

#[derive(Deserialize)]
struct QueryReq {
    question: String,
    #[serde(default)]
    k: Option<usize>,
}

#[derive(Serialize)]
struct QueryResp {
    answer: String,
}

async fn query(State(state): State<AppState>, Json(req): Json<QueryReq>) -> Response {
    let question = req.question.trim();
    if question.is_empty() {
        return error(StatusCode::BAD_REQUEST, "empty question", None);
    }
    let k = req.k.unwrap_or(state.rag.default_k()).clamp(1, MAX_K);

    match state.rag.query(question, k).await {
        Ok(answer) => Json(QueryResp { answer }).into_response(),
        Err(e) => {
            tracing::warn!(target: "api", id = %query_id(question), error = %e, "query failed");
            error(
                StatusCode::SERVICE_UNAVAILABLE,
                "retrieval unavailable",
                Some(e.to_string()),
            )
        }
    }
}

#[derive(Deserialize)]
struct PageQ {
    q: Option<String>,
}

async fn dashboard_page(State(state): State<AppState>, Query(pq): Query<PageQ>) -> Html<String> {
    let cfg = &state.config;
    let question = pq.q.as_deref().map(str::trim).filter(|q| !q.is_empty());

    let answer = match question {
        Some(q) => Some(state.rag.query(q, state.rag.default_k()).await.map_err(|e| e.to_string())),
        None => None,
    };

    let recent = state.store.recent(cfg.dashboard.feed_rows);
    let anomalies = state.store.anomalies(cfg.dashboard.feed_rows);
    let points = state.store.map_points(200);
    let stats = state.store.stats();
    let breakdown = summary::source_breakdown(&state.store.snapshot());
    let documents = state.rag.document_count().await;

    let outcome = match (&question, &answer) {
        (Some(q), Some(Ok(a))) => Some((*q, QueryOutcome::Answer(a.as_str()))),
        (Some(q), Some(Err(e))) => Some((*q, QueryOutcome::Failed(e.as_str()))),
        _ => None,
    };

    Html(dashboard::render(&DashboardView {
        title: &cfg.dashboard.title,
        mode: cfg.mode,
        refresh_secs: cfg.dashboard.refresh_secs,
        area: &cfg.area,
        recent: &recent,
        anomalies: &anomalies,
        points: &points,
        stats: &stats,
        breakdown: &breakdown,
        documents,
        query: outcome,
    }))
}

#[derive(Serialize)]
struct ConfigOut<'a> {
    mode: &'static str,
    llm_provider: &'static str,
    llm_model: &'a str,
    embedder: &'static str,
    top_k: usize,
    spike_window_secs: u64,
    anomaly_rules: &'a AnomalyRules,
}

async fn config_view(State(state): State<AppState>) -> Response {
    let cfg = &state.config;
    Json(ConfigOut {
        mode: cfg.mode.as_str(),
        llm_provider: state.rag.generator_name(),
        llm_model: &cfg.llm.model,
        embedder: state.rag.embedder_name(),
        top_k: state.rag.default_k(),
        spike_window_secs: cfg.detector.spike_window_secs,
        anomaly_rules: &cfg.anomaly_rules,
    })
    .into_response()
}

async fn metrics_text(State(state): State<AppState>) -> Response {
    match state.metrics.as_ref() {
        Some(h) => h.render().into_response(),
        None => error(StatusCode::NOT_FOUND, "metrics disabled", None),
    }
}
