//! REST transport.
//!
//! `POST /tools/{name}` dispatches a tool with the JSON body as arguments.
//! `GET /tools` lists tool specs, `GET /healthz` and `GET /metrics` expose
//! liveness and the process counters.

use crate::metrics;
use crate::tools::ToolRegistry;
use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
struct AppState {
    registry: Arc<ToolRegistry>,
}

pub async fn run(registry: Arc<ToolRegistry>, host: &str, port: u16) -> Result<()> {
    let state = AppState { registry };
    let app = Router::new()
        .route("/tools", get(handle_list_tools))
        .route("/tools/{name}", post(handle_dispatch))
        .route("/healthz", get(handle_healthz))
        .route("/metrics", get(handle_metrics))
        .with_state(state);

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "rest transport listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn handle_list_tools(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({"tools": state.registry.specs()}))
}

async fn handle_dispatch(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Option<Json<Value>>,
) -> impl IntoResponse {
    let args = body.map_or_else(|| json!({}), |Json(value)| value);
    match state.registry.dispatch(&name, args).await {
        Ok(result) => (StatusCode::OK, Json(json!({"result": result}))).into_response(),
        Err(err) => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": {"message": err.to_string()}})),
        )
            .into_response(),
    }
}

async fn handle_healthz() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn handle_metrics() -> impl IntoResponse {
    Json(metrics::global().snapshot())
}
