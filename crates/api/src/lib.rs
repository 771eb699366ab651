//! `api` crate — HTTP REST API layer
//!
//! Exposes:
//!   POST /workflows
//!   POST /workflows/:id/publish
//!   POST /runs
//!   GET  /runs?workflowId=
//!   POST /triggers/hooks/:triggerId   (unauthenticated webhook intake)
//!   POST /triggers/:id/test
//!   GET  /healthz

pub mod handlers;

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use queue::JobQueue;
use store::{SecretBox, Store};

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub secret_box: SecretBox,
    pub queue: JobQueue,
    /// Base URL webhooks are reachable under, for integration snippets.
    pub public_url: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/workflows", post(handlers::workflows::create))
        .route("/workflows/:id/publish", post(handlers::workflows::publish))
        .route("/runs", post(handlers::runs::submit).get(handlers::runs::list))
        .route("/triggers/hooks/:trigger_id", post(handlers::hooks::intake))
        .route("/triggers/:id/test", post(handlers::hooks::test_trigger))
        .route("/healthz", get(|| async { "ok" }))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS from `CORS_ORIGINS` (comma-separated); permissive when unset.
fn cors_layer() -> CorsLayer {
    let origins: Vec<HeaderValue> = std::env::var("CORS_ORIGINS")
        .ok()
        .map(|raw| {
            raw.split(',')
                .filter_map(|origin| origin.trim().parse().ok())
                .collect()
        })
        .unwrap_or_default();

    if origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

pub async fn serve(bind: &str, state: AppState) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await
}
