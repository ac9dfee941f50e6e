use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::{
    categorize::categorize,
    error::ApiError,
    export::{self, ExportFormat},
    job::{JobState, ScanJob},
    scanner::DEFAULT_CONCURRENCY,
    types::{CategorizedResults, ProbeResult, ScanConfig, ScanStats},
};

/// Finished jobs kept around for status/results/export queries.
const MAX_RETAINED_JOBS: usize = 16;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<RwLock<ServerState>>,
    export_dir: Arc<PathBuf>,
}

#[derive(Debug, Default)]
struct ServerState {
    jobs: BTreeMap<u64, ScanJob>,
    latest: Option<u64>,
    next_id: u64,
}

impl ServerState {
    /// The job named by `scan_id`, or the latest one when no id is given.
    fn job(&self, scan_id: Option<u64>) -> Result<Option<&ScanJob>, ApiError> {
        match scan_id {
            Some(id) => self
                .jobs
                .get(&id)
                .map(Some)
                .ok_or_else(|| ApiError::NotFound(format!("scan {id} not found"))),
            None => Ok(self.latest.and_then(|id| self.jobs.get(&id))),
        }
    }
}

impl AppState {
    /// Exports are written under `export_dir`.
    pub fn new(export_dir: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ServerState::default())),
            export_dir: Arc::new(export_dir.into()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub config: ScanConfig,
    #[serde(default)]
    pub concurrency: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ScanStarted {
    pub message: String,
    pub total_urls: usize,
    pub scan_id: u64,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct StatusResponse {
    pub status: String, // "idle" | "running" | "completed" | "failed"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<ScanStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incomplete: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Default)]
pub struct ResultsResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_id: Option<u64>,
    pub results: Vec<ProbeResult>,
    pub categories: CategorizedResults,
    pub stats: ScanStats,
    pub incomplete: bool,
}

#[derive(Debug, Serialize)]
pub struct ExportResponse {
    pub message: String,
    pub filename: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct JobQuery {
    pub scan_id: Option<u64>,
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/scan", post(post_scan))
        .route("/status", get(get_status))
        .route("/results", get(get_results))
        .route("/export/{format}", get(get_export))
        .with_state(state);

    Router::new()
        .route("/", get(index))
        .nest("/api", api)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Serve the API on `bind` until Ctrl+C.
pub async fn spawn_server(bind: &str, export_dir: PathBuf) -> Result<()> {
    let app = router(AppState::new(export_dir));
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!("serving API on http://{}", bind);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down API server");
        })
        .await?;
    Ok(())
}

async fn index() -> &'static str {
    "URL Scanner API Server is running. POST /api/scan to start scanning."
}

async fn post_scan(
    State(app): State<AppState>,
    Json(req): Json<ScanRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.urls.is_empty() {
        return Err(ApiError::BadRequest("No URLs provided".into()));
    }
    req.config.validate().map_err(ApiError::BadRequest)?;

    let total_urls = req.urls.len();
    let concurrency = req.concurrency.unwrap_or(DEFAULT_CONCURRENCY);

    let mut s = app.inner.write().await;
    // Supersede any scan still running.
    if let Some(prev) = s.latest.and_then(|id| s.jobs.get(&id)) {
        if !prev.is_finished() {
            info!(scan_id = prev.id(), "cancelling superseded scan");
            prev.cancel();
        }
    }

    s.next_id += 1;
    let scan_id = s.next_id;
    let job = ScanJob::spawn(scan_id, req.urls, req.config, concurrency);
    s.jobs.insert(scan_id, job);
    s.latest = Some(scan_id);
    while s.jobs.len() > MAX_RETAINED_JOBS {
        s.jobs.pop_first();
    }
    info!(scan_id, total_urls, "scan started");

    Ok((
        StatusCode::ACCEPTED,
        Json(ScanStarted {
            message: "Scan started".into(),
            total_urls,
            scan_id,
        }),
    ))
}

async fn get_status(
    State(app): State<AppState>,
    Query(q): Query<JobQuery>,
) -> Result<Json<StatusResponse>, ApiError> {
    let s = app.inner.read().await;
    let Some(job) = s.job(q.scan_id)? else {
        return Ok(Json(StatusResponse {
            status: "idle".into(),
            ..StatusResponse::default()
        }));
    };

    let state = job.state().await;
    let stats = job.stats().await;
    let incomplete = job.outcome().await.map(|outcome| outcome.incomplete);
    Ok(Json(StatusResponse {
        status: state_name(state).into(),
        scan_id: Some(job.id()),
        stats: Some(stats),
        progress_percent: Some(stats.progress_percent()),
        incomplete,
        error: job.error().await,
    }))
}

async fn get_results(
    State(app): State<AppState>,
    Query(q): Query<JobQuery>,
) -> Result<Json<ResultsResponse>, ApiError> {
    let s = app.inner.read().await;
    let Some(job) = s.job(q.scan_id)? else {
        return Ok(Json(ResultsResponse::default()));
    };

    let (results, stats, incomplete) = match job.outcome().await {
        Some(outcome) => (outcome.results, outcome.stats, outcome.incomplete),
        None => (job.progress().results().await, job.stats().await, false),
    };
    Ok(Json(ResultsResponse {
        scan_id: Some(job.id()),
        categories: categorize(&results),
        results,
        stats,
        incomplete,
    }))
}

async fn get_export(
    State(app): State<AppState>,
    Path(format): Path<String>,
    Query(q): Query<JobQuery>,
) -> Result<Json<ExportResponse>, ApiError> {
    let format: ExportFormat = format
        .parse()
        .map_err(|e: anyhow::Error| ApiError::BadRequest(e.to_string()))?;

    let (outcome, config) = {
        let s = app.inner.read().await;
        let Some(job) = s.job(q.scan_id)? else {
            return Err(ApiError::BadRequest("No results to export".into()));
        };
        if job.state().await == JobState::Running {
            return Err(ApiError::Conflict("Scan still running".into()));
        }
        let Some(outcome) = job.outcome().await else {
            return Err(ApiError::BadRequest("No results to export".into()));
        };
        (outcome, job.config().clone())
    };

    let filename = export::timestamped_filename(format);
    let path = app.export_dir.join(&filename);
    tokio::task::spawn_blocking(move || export::export_to_path(&path, format, &outcome, &config))
        .await
        .map_err(|e| ApiError::Internal(format!("export task failed: {e}")))??;

    Ok(Json(ExportResponse {
        message: format!("Results exported to {filename}"),
        filename,
    }))
}

fn state_name(state: JobState) -> &'static str {
    match state {
        JobState::Running => "running",
        JobState::Completed => "completed",
        JobState::Failed => "failed",
    }
}
