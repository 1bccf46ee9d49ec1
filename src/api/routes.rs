use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Query, State},
    response::Html,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::api::dashboard::render_dashboard;
use crate::api::health::HealthState;
use crate::error::AppError;
use crate::registry::{NodeRegistry, UpsertOutcome};
use crate::types::{now_secs, NodeRecord, UplinkReport};

#[derive(Clone)]
pub struct ApiState {
    pub registry: Arc<NodeRegistry>,
    pub health: Arc<HealthState>,
    /// Applied records flow to the RegistryWriter through here.
    pub persist_tx: mpsc::Sender<NodeRecord>,
    pub stale_after_secs: f64,
    pub started_at: Instant,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(get_dashboard))
        .route("/api/uplink", post(post_uplink))
        .route("/api/nodes", get(get_nodes))
        .route("/health", get(get_health))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param / response types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct NodesQuery {
    /// Override the staleness threshold (seconds) for this read.
    pub threshold: Option<f64>,
}

#[derive(Serialize)]
pub struct NodeStatusResponse {
    pub node_id: String,
    pub last_power_mw: f64,
    pub cumulative_valor: f64,
    pub last_seen: f64,
    pub online: bool,
}

#[derive(Serialize)]
pub struct UplinkAck {
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub uptime_secs: u64,
    pub nodes_total: usize,
    pub reports_received: u64,
    pub reports_rejected: u64,
    pub reports_ignored_stale: u64,
    pub write_queue_pending: u64,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Accept one telemetry report. Malformed payloads are rejected per-report
/// with a client error and no registry mutation; a stale timestamp is
/// acknowledged but not applied.
async fn post_uplink(
    State(state): State<ApiState>,
    Json(report): Json<UplinkReport>,
) -> Result<Json<UplinkAck>, AppError> {
    let outcome = state.registry.upsert(&report).inspect_err(|_| {
        state.health.inc_reports_rejected();
    })?;

    match outcome {
        UpsertOutcome::Inserted | UpsertOutcome::Replaced => {
            state.health.inc_reports_received();

            // Mirror the applied row to storage off the request path.
            if let Some(record) = state.registry.get(&report.auth.uuid) {
                match state.persist_tx.try_send(record) {
                    Ok(()) => state.health.inc_write_queue_pending(),
                    Err(e) => warn!("DB writer channel full, row not persisted: {e}"),
                }
            }
            Ok(Json(UplinkAck { status: "verified" }))
        }
        UpsertOutcome::IgnoredStale => {
            state.health.inc_reports_ignored_stale();
            debug!(node_id = %report.auth.uuid, "stale report ignored");
            Ok(Json(UplinkAck { status: "stale" }))
        }
    }
}

async fn get_nodes(
    State(state): State<ApiState>,
    Query(params): Query<NodesQuery>,
) -> Json<Vec<NodeStatusResponse>> {
    let threshold = params.threshold.unwrap_or(state.stale_after_secs);
    let rows = state
        .registry
        .list_active(now_secs(), threshold)
        .into_iter()
        .map(|s| NodeStatusResponse {
            node_id: s.record.node_id,
            last_power_mw: s.record.last_power_mw,
            cumulative_valor: s.record.cumulative_valor,
            last_seen: s.record.last_seen,
            online: s.online,
        })
        .collect();

    Json(rows)
}

/// The fleet dashboard: a pure view over the registry's current rows,
/// re-polled by the browser on a fixed cadence.
async fn get_dashboard(State(state): State<ApiState>) -> Html<String> {
    let now = now_secs();
    let rows = state.registry.list_active(now, state.stale_after_secs);
    Html(render_dashboard(&rows, now))
}

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        uptime_secs: state.started_at.elapsed().as_secs(),
        nodes_total: state.registry.len(),
        reports_received: state.health.reports_received(),
        reports_rejected: state.health.reports_rejected(),
        reports_ignored_stale: state.health.reports_ignored_stale(),
        write_queue_pending: state.health.write_queue_pending(),
    })
}
