pub mod auth;
pub mod devices;
pub mod runners;
pub mod runs;

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full API router.
///
/// `/runners/ws` carries its own token-based handshake (checked against
/// per-runner device-token hashes) and is intentionally left outside the
/// admin bearer-token middleware; every other route is protected.
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/healthz", get(runs::health))
        .route("/runners/ws", get(runners::runner_ws));

    let protected = Router::new()
        .route("/run", post(runs::create_run))
        .route("/run/:id/cancel", post(runs::cancel_run))
        .route("/stream/runs/:id", get(runs::stream_run))
        .route("/devices/tokens", post(devices::create_token).get(devices::list_tokens))
        .route("/devices/tokens/:id", delete(devices::revoke_token))
        .route_layer(middleware::from_fn_with_state(state, auth::require_admin_token));

    public
        .merge(protected)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
