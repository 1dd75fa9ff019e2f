//! `api` crate — the HTTP REST surface (spec §6).
//!
//! Routes:
//!   POST   /v1/executions
//!   GET    /v1/executions/:id
//!   POST   /v1/executions/:id/resume
//!   POST   /v1/executions/:id/retry
//!   POST   /v1/executions/:id/cancel
//!   GET    /v1/executions/:id/events           (SSE)
//!   GET    /v1/executions/:id/node-executions
//!   GET    /v1/workflows
//!   POST   /v1/workflows
//!   GET    /v1/workflows/:id
//!   DELETE /v1/workflows/:id
//!
//! Every route sits behind the bearer-token auth middleware in `auth.rs`;
//! webhook/cron triggers and the visual builder are out of scope (spec §1)
//! and have no HTTP surface here.

pub mod auth;
pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use db::DbPool;
use engine::collaborators::VerifySession;
use engine::{Dispatcher, EventHub};

pub use error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub dispatcher: Arc<Dispatcher>,
    pub event_hub: Arc<EventHub>,
    pub session_verifier: Arc<dyn VerifySession>,
}

pub async fn serve(bind: &str, state: AppState) -> Result<(), std::io::Error> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let v1 = Router::new()
        .route(
            "/executions",
            post(handlers::executions::start_execution),
        )
        .route("/executions/:id", get(handlers::executions::get_execution))
        .route(
            "/executions/:id/resume",
            post(handlers::executions::resume_execution),
        )
        .route(
            "/executions/:id/retry",
            post(handlers::executions::retry_execution),
        )
        .route(
            "/executions/:id/cancel",
            post(handlers::executions::cancel_execution),
        )
        .route(
            "/executions/:id/events",
            get(handlers::executions::stream_events),
        )
        .route(
            "/executions/:id/node-executions",
            get(handlers::executions::list_node_executions),
        )
        .route(
            "/workflows",
            get(handlers::workflows::list).post(handlers::workflows::create),
        )
        .route(
            "/workflows/:id",
            get(handlers::workflows::get).delete(handlers::workflows::delete),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_session));

    let app = Router::new()
        .nest("/v1", v1)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await
}
