//! FallWatch API Server
//!
//! Hosts the slot control API and the alert receiver that stores uploaded
//! evidence and relays it over SMS and WhatsApp.

use alerting::{AlertLog, HttpAlertDispatcher, Notifiers};
use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use camera_capture::CameraSource;
use fall_detection::{HttpPoseEstimator, NoDetector, SlotActivity};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use slot_scheduler::{SlotManager, SlotResources};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};

pub mod config;
mod error;
pub mod routes;
pub mod store;

pub use config::{AppConfig, LogConfig, LogFormat, ServerConfig, SlotConfig};
pub use error::ApiError;
pub use store::CaptureStore;

/// Slot registry as wired by the binary
pub type Slots = SlotManager<CameraSource, HttpPoseEstimator, NoDetector, HttpAlertDispatcher>;

/// Application state shared across handlers
pub struct AppState {
    pub slots: RwLock<Slots>,
    pub alerts: RwLock<AlertLog>,
    pub notifiers: Notifiers,
    pub store: CaptureStore,
    /// Prometheus handle when a recorder is installed
    pub metrics: Option<PrometheusHandle>,
    pub max_upload_bytes: usize,
    pub version: String,
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Build slots, notifiers and storage from configuration
    pub fn from_config(config: &AppConfig, metrics: Option<PrometheusHandle>) -> Result<Self, ApiError> {
        let dispatcher = Arc::new(
            HttpAlertDispatcher::new(config.dispatch.clone())
                .map_err(|e| ApiError::Startup(e.to_string()))?,
        );
        info!("Alerts are dispatched to {}", dispatcher.endpoint());

        let mut slots = SlotManager::new(config.scheduler.clone());
        for slot in &config.slots {
            let source = CameraSource::from_config(&slot.camera)
                .map_err(|e| ApiError::Startup(format!("slot {}: {}", slot.id, e)))?;
            info!("Slot {}: {} camera source", slot.id, source.kind());
            let estimator = HttpPoseEstimator::new(slot.pose.clone())
                .map_err(|e| ApiError::Startup(format!("slot {}: {}", slot.id, e)))?;

            slots.add_slot(
                slot.id,
                SlotResources {
                    source: Arc::new(source),
                    estimator: Arc::new(estimator),
                    detector: Arc::new(NoDetector),
                    dispatcher: dispatcher.clone(),
                },
                slot.detection.clone(),
            )?;
        }

        let notifiers = Notifiers::new(config.notifiers.clone())
            .map_err(|e| ApiError::Startup(e.to_string()))?;

        Ok(Self {
            slots: RwLock::new(slots),
            alerts: RwLock::new(AlertLog::new(config.alert_log.clone())),
            notifiers,
            store: CaptureStore::new(&config.server.captures_dir),
            metrics,
            max_upload_bytes: config.server.max_upload_mb.saturating_mul(1024 * 1024),
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: std::time::Instant::now(),
        })
    }
}

/// Health response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub slots: SlotSummary,
    pub alerts: AlertSummary,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SlotSummary {
    pub total: usize,
    pub running: usize,
    pub alerting: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AlertSummary {
    pub received: u64,
    pub pending: usize,
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit = state.max_upload_bytes;

    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/slots", get(routes::slots::list_slots))
        .route("/api/v1/slots/:id/start", post(routes::slots::start_slot))
        .route("/api/v1/slots/:id/stop", post(routes::slots::stop_slot))
        .route("/api/v1/slots/:id/sensitivity", put(routes::slots::set_sensitivity))
        .route("/api/v1/alerts", get(routes::alerts::list_alerts))
        .route("/api/v1/alerts/:id/ack", post(routes::alerts::acknowledge_alert))
        .route("/api/alert", post(routes::alerts::receive_alert))
        .route("/metrics", get(metrics_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let statuses = state.slots.read().await.statuses();
    let count = |activity: SlotActivity| statuses.iter().filter(|(_, s)| s.activity == activity).count();
    let slots = SlotSummary {
        total: statuses.len(),
        running: count(SlotActivity::Running),
        alerting: count(SlotActivity::Alerting),
    };

    let alerts = {
        let log = state.alerts.read().await;
        AlertSummary {
            received: log.total(),
            pending: log.pending().len(),
        }
    };

    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp,
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        slots,
        alerts,
    })
}

/// Prometheus exposition
async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed".to_string()),
    }
}

/// Initialize logging
pub fn init_logging(config: &LogConfig) -> Result<(), ApiError> {
    let level: Level = config
        .level
        .parse()
        .map_err(|_| ApiError::Startup(format!("invalid log level {:?}", config.level)))?;

    let builder = tracing_subscriber::fmt().with_max_level(level).with_target(true);
    let result = match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish()),
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.finish()),
    };

    result.map_err(|e| ApiError::Startup(format!("failed to set tracing subscriber: {}", e)))
}

/// Run the server until Ctrl-C, then stop every slot
pub async fn run_server(config: AppConfig, metrics: Option<PrometheusHandle>) -> Result<(), ApiError> {
    let state = Arc::new(AppState::from_config(&config, metrics)?);
    state.store.ensure_dirs().await?;

    {
        let mut slots = state.slots.write().await;
        for slot in config.slots.iter().filter(|s| s.autostart) {
            slots.start(slot.id)?;
        }
    }

    let app = create_router(state.clone());

    info!("Starting API server on {}", config.server.addr);
    let listener = bind_listener(&config.server.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(ApiError::Serve)?;

    state.slots.write().await.stop_all().await;
    info!("Server stopped");
    Ok(())
}

async fn bind_listener(addr: &str) -> Result<TcpListener, ApiError> {
    TcpListener::bind(addr).await.map_err(|source| ApiError::Bind {
        addr: addr.to_string(),
        source,
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
