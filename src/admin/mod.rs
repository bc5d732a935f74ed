//! Bearer-token operator routes.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/sponsors", post(create_sponsor))
        .route("/admin/draws/{id}/finalize", post(finalize_draw))
        .route("/admin/draws/{id}/winner-txid", post(set_winner_txid))
        .route_layer(middleware::from_fn_with_state(state, admin_auth_middleware))
}
