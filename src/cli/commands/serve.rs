//! HTTP invocation server.
//!
//! `POST /invocations` takes the invocation payload and streams the answer
//! back as newline-delimited JSON. `GET /ping` is the health check.

use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::{InvocationRequest, Orchestrator};
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Shared application state.
struct AppState {
    orchestrator: Orchestrator,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Build the router over an orchestrator.
pub fn router(orchestrator: Orchestrator) -> Router {
    let state = Arc::new(AppState { orchestrator });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ping", get(ping))
        .route("/invocations", post(invocations))
        .layer(cors)
        .with_state(state)
}

/// Run the HTTP server.
pub async fn run_serve(host: Option<String>, port: Option<u16>, settings: Settings) -> anyhow::Result<()> {
    let orchestrator = Orchestrator::from_settings(&settings)?;
    let host = host.unwrap_or_else(|| settings.server.host.clone());
    let port = port.unwrap_or(settings.server.port);
    let addr = format!("{}:{}", host, port);

    Output::header("StreamLens Invocation Server");
    Output::kv("Address", &format!("http://{}", addr));
    Output::kv("Model", orchestrator.model_id());
    Output::kv(
        "Memory",
        if settings.memory.enabled { "enabled" } else { "disabled" },
    );
    println!();
    Output::info("Endpoints:");
    println!("  GET  /ping         - Health check");
    println!("  POST /invocations  - Ask a question (NDJSON stream)");
    println!();

    let app = router(orchestrator);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    Output::success(&format!("Server running on http://{}", addr));

    axum::serve(listener, app).await?;

    Ok(())
}

async fn ping() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "Healthy" }))
}

async fn invocations(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request: InvocationRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!("Rejected invocation payload: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: format!("Invalid invocation payload: {}", e),
                }),
            )
                .into_response();
        }
    };

    let lines = state
        .orchestrator
        .invoke(request)
        .map(Ok::<_, Infallible>);

    (
        [(header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)],
        Body::from_stream(lines),
    )
        .into_response()
}
