use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, patch, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod telemetry;
pub mod utils;

pub use config::Config;
pub use services::AppState;

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = cors_layer(&app_state.config.server.cors_origins);

    Router::new()
        // Not gated: must answer while a flush holds the lock
        .route("/health", get(handlers::health_check))
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
        )
        .merge(
            session_routes()
                .merge(session_answer_routes())
                .route_layer(middleware::from_fn_with_state(
                    app_state.clone(),
                    middlewares::request_gate::request_gate_middleware,
                )),
        )
        .with_state(app_state)
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(middleware::from_fn(
            middlewares::trace::trace_context_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

fn session_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sessions", post(handlers::sessions::create_session))
        .route("/sessions/", post(handlers::sessions::create_session))
        .route(
            "/sessions/{id}",
            get(handlers::sessions::get_session).patch(handlers::sessions::update_session),
        )
}

fn session_answer_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/session_answers/{session_id}/update-multiple-answers",
            patch(handlers::session_answers::update_session_answers),
        )
        .route(
            "/session_answers/{session_id}/{position}",
            get(handlers::session_answers::get_session_answer)
                .patch(handlers::session_answers::update_session_answer),
        )
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    if allowed.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(allowed))
    }
}
