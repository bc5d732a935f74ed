//! Public request handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::{ErrorKind, SettlementError};
use crate::http::request::{ForwardingRequest, RegistrationRequest};
use crate::http::response::{ApiError, ApiResult};
use crate::http::server::AppState;
use crate::ledger::queries::addresses::RegisteredAddressRow;
use crate::ledger::queries::{draws, watermarks};
use crate::registry::Guarantee;
use crate::settlement::{draw_report, DrawReport};

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
    pub pot_address: String,
    pub pot_watermark: Option<u64>,
    pub last_finalized_draw: u64,
}

pub async fn health(State(state): State<AppState>) -> ApiResult<Json<Health>> {
    let pot = state.pot_address.clone();
    let (pot_watermark, last_finalized_draw) = state
        .ledger
        .read(move |c| Ok((watermarks::get(c, &pot)?, draws::last_finalized(c)?)))
        .await
        .map_err(SettlementError::from)?;

    Ok(Json(Health {
        status: "operational",
        version: env!("CARGO_PKG_VERSION"),
        pot_address: state.pot_address.clone(),
        pot_watermark,
        last_finalized_draw,
    }))
}

pub async fn get_draw(State(state): State<AppState>, Path(id): Path<u64>) -> ApiResult<Json<DrawReport>> {
    match draw_report(&state.ledger, &state.schedule, &state.pot_address, id).await {
        Ok(report) => Ok(Json(report)),
        Err(e) if e.kind() == ErrorKind::Validation => Err(ApiError::NotFound(format!("draw {id}"))),
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Serialize)]
pub struct RegistrationView {
    pub registration: RegisteredAddressRow,
    pub guarantee: Option<Guarantee>,
}

fn view(state: &AppState, registration: RegisteredAddressRow) -> ApiResult<RegistrationView> {
    let guarantee = if registration.is_forwarding() {
        Some(state.registry.guarantee_for(&registration)?)
    } else {
        None
    };
    Ok(RegistrationView {
        registration,
        guarantee,
    })
}

async fn find_registration(state: &AppState, id: &str) -> ApiResult<RegisteredAddressRow> {
    if Uuid::parse_str(id).is_err() {
        return Err(ApiError::NotFound(format!("registration {id}")));
    }
    state
        .registry
        .registration(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("registration {id}")))
}

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegistrationRequest>,
) -> ApiResult<(StatusCode, Json<RegistrationView>)> {
    let row = state
        .registry
        .register_address(&body.bitcoin_address, &body.signature, &body.message, chrono::Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(view(&state, row)?)))
}

pub async fn create_forwarding(
    State(state): State<AppState>,
    Json(body): Json<ForwardingRequest>,
) -> ApiResult<(StatusCode, Json<RegistrationView>)> {
    let row = state
        .registry
        .create_forwarding_address(&body.nick, &body.win_address, chrono::Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(view(&state, row)?)))
}

pub async fn get_registration(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<RegistrationView>> {
    let row = find_registration(&state, &id).await?;
    Ok(Json(view(&state, row)?))
}

pub async fn get_guarantee(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Guarantee>> {
    let row = find_registration(&state, &id).await?;
    if !row.is_forwarding() {
        return Err(ApiError::NotFound(format!("guarantee for {id}")));
    }
    Ok(Json(state.registry.guarantee_for(&row)?))
}

/// Sweep a forwarding registration now.
pub async fn process_registration(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let row = find_registration(&state, &id).await?;
    let Some(index) = row.forwarding_index else {
        return Err(ApiError::NotFound(format!("forwarding registration {id}")));
    };
    let outcome = state.scheduler.sweep(index).await?;
    let result = if outcome.forwarded { "FORWARDED" } else { "NOTHING_TO_FORWARD" };
    Ok(Json(json!({ "result": result, "sweep": outcome })))
}
