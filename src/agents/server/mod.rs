//! HTTP surface for a [`CapabilityRegistry`].
//!
//! | Method | Path             | Response            |
//! |--------|------------------|---------------------|
//! | GET    | `/ping`          | `{}`                |
//! | GET    | `/agents`        | [`AgentList`]       |
//! | GET    | `/agents/{name}` | [`AgentManifest`]   |
//! | POST   | `/runs`          | [`RunResponse`]     |
//!
//! Runs are always answered synchronously. Agent failures come back as a
//! completed run whose text describes the error; only unknown agent names
//! produce an HTTP error.


use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use super::protocol::{AgentList, AgentManifest, ErrorBody, RunMode, RunRequest, RunResponse};
use super::registry::CapabilityRegistry;
use super::NO_INPUT_REPLY;

type ApiError = (StatusCode, Json<ErrorBody>);

#[inline]
pub fn router(registry: Arc<CapabilityRegistry>) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/agents", get(list_agents))
        .route("/agents/{name}", get(get_agent))
        .route("/runs", post(create_run))
        .with_state(registry)
}

/// Bind `addr` and serve until Ctrl-C
#[inline]
pub async fn serve(registry: Arc<CapabilityRegistry>, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind ACP server to {addr}"))?;

    serve_listener(listener, registry, shutdown_signal()).await
}

/// Serve on an already bound listener until `shutdown` resolves
#[inline]
pub async fn serve_listener<F>(
    listener: TcpListener,
    registry: Arc<CapabilityRegistry>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let local_addr = listener.local_addr()?;
    info!(
        "ACP server listening on http://{} with agents: {}",
        local_addr,
        registry.names().join(", ")
    );

    axum::serve(listener, router(registry))
        .with_graceful_shutdown(shutdown)
        .await
        .context("ACP server terminated")?;

    info!("ACP server on {} stopped", local_addr);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn not_found(name: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            code: "not_found".to_string(),
            message: format!("Agent {name} not found"),
        }),
    )
}

async fn ping() -> Json<Value> {
    Json(json!({}))
}

async fn list_agents(State(registry): State<Arc<CapabilityRegistry>>) -> Json<AgentList> {
    Json(AgentList {
        agents: registry.manifests(),
    })
}

async fn get_agent(
    State(registry): State<Arc<CapabilityRegistry>>,
    Path(name): Path<String>,
) -> Result<Json<AgentManifest>, ApiError> {
    registry
        .get(&name)
        .map(|capability| Json(capability.manifest()))
        .ok_or_else(|| not_found(&name))
}

async fn create_run(
    State(registry): State<Arc<CapabilityRegistry>>,
    Json(request): Json<RunRequest>,
) -> Result<Json<RunResponse>, ApiError> {
    let capability = registry
        .get(&request.agent_name)
        .ok_or_else(|| not_found(&request.agent_name))?;

    if request.mode != RunMode::Sync {
        debug!(
            "Run for {} requested {:?} mode, answering synchronously",
            request.agent_name, request.mode
        );
    }

    let reply = match request.input_text() {
        None => NO_INPUT_REPLY.to_string(),
        Some(text) => {
            debug!("Running {} on {} characters", request.agent_name, text.len());
            match capability.run(text).await {
                Ok(output) => output,
                Err(e) => {
                    warn!("Agent {} failed: {}", request.agent_name, e);
                    format!("Error processing request: {e}")
                }
            }
        }
    };

    Ok(Json(RunResponse::completed(request.agent_name, reply)))
}
