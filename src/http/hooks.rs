//! Chain data provider webhooks.
//!
//! Notifications only trigger work; the payload itself is never trusted
//! beyond the list of addresses it names.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use crate::http::request::AddressHook;
use crate::http::response::ApiResult;
use crate::http::server::AppState;
use crate::keys::parse_address;
use crate::scheduler::Submission;

type Accepted = (StatusCode, Json<Value>);

fn accepted(addresses: usize, jobs: &[Submission]) -> Accepted {
    let jobs: Vec<&str> = jobs.iter().map(Submission::as_str).collect();
    (
        StatusCode::ACCEPTED,
        Json(json!({ "status": "accepted", "addresses": addresses, "jobs": jobs })),
    )
}

/// Addresses from the hook body that parse on our network.
fn valid_addresses(state: &AppState, hook: &AddressHook) -> Vec<String> {
    hook.addresses()
        .filter(|a| match parse_address(a, state.network) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(address = %a, error = %e, "Ignoring invalid address in hook");
                false
            }
        })
        .map(str::to_string)
        .collect()
}

pub async fn lottery_payment(State(state): State<AppState>) -> Accepted {
    let submitted = state.spawn_job("reconcile_pot", "hook_lottery_payment", |scheduler| async move {
        scheduler.reconcile_pot().await
    });
    accepted(1, &[submitted])
}

pub async fn block(State(state): State<AppState>) -> Accepted {
    let submitted = state.spawn_job("process_block", "hook_block", |scheduler| async move {
        scheduler.process_block(None).await
    });
    accepted(0, &[submitted])
}

pub async fn sponsor_tx(State(state): State<AppState>, Json(hook): Json<AddressHook>) -> Accepted {
    let addresses = valid_addresses(&state, &hook);
    let jobs: Vec<Submission> = addresses
        .iter()
        .map(|address| {
            let address = address.clone();
            state.spawn_job(format!("sponsor:{address}"), "hook_sponsor_tx", move |scheduler| {
                let address = address.clone();
                async move { scheduler.reconcile_sponsor_address(&address).await }
            })
        })
        .collect();
    accepted(addresses.len(), &jobs)
}

pub async fn forwarding_tx(State(state): State<AppState>, Json(hook): Json<AddressHook>) -> ApiResult<Accepted> {
    let mut jobs = Vec::new();
    for address in valid_addresses(&state, &hook) {
        let Some(index) = state
            .registry
            .forwarding_by_address(&address)
            .await?
            .and_then(|r| r.forwarding_index)
        else {
            tracing::warn!(%address, "Hook address is not a forwarding address");
            continue;
        };
        jobs.push(state.spawn_job(format!("sweep:{index}"), "hook_forwarding_tx", move |scheduler| async move {
            scheduler.sweep(index).await
        }));
    }
    Ok(accepted(jobs.len(), &jobs))
}
