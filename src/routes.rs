use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::{api, auth, state::PollStore, ws};

/// Assemble the HTTP and WebSocket routes around a poll store
pub fn build_router(store: Arc<PollStore>, auth_config: Arc<auth::AuthConfig>) -> Router {
    // Protected host routes (with HTTP Basic Auth)
    let host_routes = Router::new()
        .route("/api/state/export", get(api::export_state))
        .route("/api/state/import", post(api::import_state))
        .layer(middleware::from_fn_with_state(
            auth_config.clone(),
            auth::host_auth_middleware,
        ));

    let login_routes = Router::new()
        .route("/api/login", post(auth::login))
        .with_state(auth_config.clone());

    // Host connections must authenticate; audience connections pass through
    let ws_routes = Router::new()
        .route("/ws", get(ws::ws_handler))
        .layer(middleware::from_fn_with_state(
            auth_config,
            auth::host_ws_auth_middleware,
        ));

    Router::new()
        .merge(host_routes)
        .merge(login_routes)
        .merge(ws_routes)
        .fallback_service(ServeDir::new("static"))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(store)
}
