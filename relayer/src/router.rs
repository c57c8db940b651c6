use crate::constants::MAX_BODY_BYTES;
use crate::handlers;
use crate::state::AppState;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn build(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let public_routes = Router::new()
        .route("/health", get(handlers::public::health))
        .route("/ready", get(handlers::public::readiness))
        .route("/metrics", get(crate::metrics::metrics_handler));

    let api_routes = Router::new()
        .route(
            "/api/prove/:circuit",
            get(handlers::prove::prove_status).post(handlers::prove::prove),
        )
        .route("/api/verify/:circuit", post(handlers::prove::verify))
        .route("/api/relayer", post(handlers::relay::relay_handler));

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
