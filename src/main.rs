//! urban-watch service entrypoint.
//! Loads configuration, starts feeds, detector and indexer, and serves the dashboard.

use anyhow::Context;
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use urban_watch::metrics::Metrics;
use urban_watch::MonitorConfig;

/// Compact logs by default, JSON with `URBAN_WATCH_LOG_FORMAT=json`.
/// `try_init` leaves an already installed subscriber (e.g. the hosting runtime's) alone.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("urban_watch=info,warn"));

    let json = std::env::var("URBAN_WATCH_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = MonitorConfig::load_default().context("loading configuration")?;
    tracing::info!(mode = cfg.mode.as_str(), llm = %cfg.llm.provider, "configuration loaded");

    let metrics = Metrics::init()?;
    let service = urban_watch::start(cfg, Some(metrics.handle)).context("starting pipeline")?;
    tracing::info!(feeds = service.pipeline.feeds(), "monitor running");

    Ok(service.router.into())
}
