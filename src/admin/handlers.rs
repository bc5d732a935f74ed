
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::SettlementError;
use crate::http::request::{SponsorRequest, WinnerTxidRequest};
use crate::http::server::AppState;
use crate::http::ApiResult;
use crate::ledger::queries::draws;
use crate::ledger::queries::sponsors::SponsorRow;
use crate::scheduler::EntityKey;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub sponsors: usize,
    pub last_finalized_draw: u64,
    /// A draw job holds the finalization chain.
    pub draws_busy: bool,
    /// Hook and admin jobs running or queued.
    pub background_jobs: usize,
}

pub async fn get_status(State(state): State<AppState>) -> ApiResult<Json<SystemStatus>> {
    let sponsors = state.registry.list_sponsors().await?.len();
    let last_finalized_draw = state
        .ledger
        .read(draws::last_finalized)
        .await
        .map_err(SettlementError::from)?;
    Ok(Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        sponsors,
        last_finalized_draw,
        draws_busy: state.scheduler.locks().is_locked(&EntityKey::Draws),
        background_jobs: state.scheduler.jobs().in_flight(),
    }))
}

pub async fn create_sponsor(
    State(state): State<AppState>,
    Json(body): Json<SponsorRequest>,
) -> ApiResult<(StatusCode, Json<SponsorRow>)> {
    let sponsor = state
        .registry
        .create_sponsor(&body.name, &body.url, chrono::Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(sponsor)))
}

/// Start finalizing a draw. The result lands in the draw report.
pub async fn finalize_draw(State(state): State<AppState>, Path(id): Path<u64>) -> (StatusCode, Json<Value>) {
    let submitted = state.spawn_job(format!("finalize:{id}"), "admin_finalize_draw", move |scheduler| async move {
        scheduler.finalize_draw(id).await
    });
    (
        StatusCode::ACCEPTED,
        Json(json!({ "draw_id": id, "status": "finalizing", "job": submitted.as_str() })),
    )
}

pub async fn set_winner_txid(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(body): Json<WinnerTxidRequest>,
) -> ApiResult<Json<Value>> {
    state.scheduler.record_winner_txid(id, &body.txid).await?;
    Ok(Json(json!({ "draw_id": id, "status": "paid" })))
}
