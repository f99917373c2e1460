//! HTTP server: routes, request decoding, outcome -> status mapping, graceful shutdown.

use crate::api::protocol::ApiResponse;
use crate::config::Config;
use crate::controller::{Controller, OperationError};
use crate::exec::{CommandRunner, ProcessRunner};
use crate::operation::{self, OperationKind};
use crate::outcome::Outcome;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{Method, StatusCode, Uri},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

/// Shared state for handlers.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<Controller>,
}

type Reply = (StatusCode, Json<ApiResponse>);

fn reply(status: StatusCode, body: ApiResponse) -> Reply {
    (status, Json(body))
}

/// Empty or whitespace-only body decodes as null so optional-body routes accept it.
fn decode_body(body: &[u8]) -> Result<Value, OperationError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body).map_err(|e| OperationError::InvalidBody(e.to_string()))
}

fn error_reply(kind: OperationKind, err: OperationError) -> Reply {
    if err.is_client_error() {
        log::warn!("{}: rejected request: {}", kind, err);
        reply(StatusCode::BAD_REQUEST, ApiResponse::error(err.to_string()))
    } else {
        reply(
            StatusCode::INTERNAL_SERVER_ERROR,
            ApiResponse::error(err.to_string()),
        )
    }
}

/// Validate, execute and map the outcome for one operation.
async fn dispatch(state: &AppState, kind: OperationKind, body: &[u8]) -> Reply {
    let request = match decode_body(body).and_then(|v| Ok(operation::validate(kind, &v)?)) {
        Ok(r) => r,
        Err(e) => return error_reply(kind, e),
    };
    log::info!("{}: {:?}", kind, request);
    match state.controller.execute(&request).await {
        Ok(Outcome::Success { message }) => reply(StatusCode::OK, ApiResponse::success(message)),
        Ok(Outcome::Failure { message, .. }) => reply(
            StatusCode::INTERNAL_SERVER_ERROR,
            ApiResponse::error(message),
        ),
        Err(e) => error_reply(kind, e),
    }
}

/// POST /network/up
async fn network_up(State(state): State<AppState>) -> Reply {
    dispatch(&state, OperationKind::NetworkUp, &[]).await
}

/// POST /network/down
async fn network_down(State(state): State<AppState>) -> Reply {
    dispatch(&state, OperationKind::NetworkDown, &[]).await
}

/// POST /channel/create — `{channel?}`.
async fn create_channel(State(state): State<AppState>, body: Bytes) -> Reply {
    dispatch(&state, OperationKind::ChannelCreate, &body).await
}

/// POST /chaincode/deploy — `{name, path, language, version?, channel?}`.
async fn deploy_chaincode(State(state): State<AppState>, body: Bytes) -> Reply {
    dispatch(&state, OperationKind::Deploy, &body).await
}

/// POST /chaincode/invoke — `{channel, chaincode, function, args}`.
async fn invoke_chaincode(State(state): State<AppState>, body: Bytes) -> Reply {
    dispatch(&state, OperationKind::Invoke, &body).await
}

/// POST /chaincode/query — same body as invoke.
async fn query_chaincode(State(state): State<AppState>, body: Bytes) -> Reply {
    dispatch(&state, OperationKind::Query, &body).await
}

/// Any other method on an operation route.
async fn method_not_allowed(method: Method, uri: Uri) -> Reply {
    log::warn!("method not allowed: {} {}", method, uri.path());
    reply(
        StatusCode::METHOD_NOT_ALLOWED,
        ApiResponse::error("Method not allowed"),
    )
}

/// GET / and GET /health return a simple health JSON (for probes).
async fn health_http() -> Json<Value> {
    Json(json!({
        "runtime": "running",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Build the router over a controller.
pub fn router(controller: Arc<Controller>) -> Router {
    let state = AppState { controller };
    Router::new()
        .route("/", get(health_http))
        .route("/health", get(health_http))
        .route("/network/up", post(network_up).fallback(method_not_allowed))
        .route("/network/down", post(network_down).fallback(method_not_allowed))
        .route("/channel/create", post(create_channel).fallback(method_not_allowed))
        .route("/chaincode/deploy", post(deploy_chaincode).fallback(method_not_allowed))
        .route("/chaincode/invoke", post(invoke_chaincode).fallback(method_not_allowed))
        .route("/chaincode/query", post(query_chaincode).fallback(method_not_allowed))
        .with_state(state)
}

/// Run the server with the real process runner; binds to config.server.bind:config.server.port.
/// Blocks until shutdown (Ctrl+C or SIGTERM).
pub async fn run_server(config: Config) -> Result<()> {
    let runner = Arc::new(ProcessRunner::from_config(&config.execution));
    run_server_with_runner(config, runner).await
}

/// Same as [`run_server`] with an injected runner.
pub async fn run_server_with_runner(config: Config, runner: Arc<dyn CommandRunner>) -> Result<()> {
    let script = std::path::Path::new(&config.network.script_path);
    if !script.is_file() {
        log::warn!(
            "network script not found at {}; script operations will fail until it exists",
            script.display()
        );
    }

    let bind_addr = format!("{}:{}", config.server.bind.trim(), config.server.port);
    let controller = Arc::new(Controller::new(Arc::new(config), runner));
    let app = router(controller);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("controller listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("controller server exited")?;
    log::info!("controller stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
/// In-flight requests finish; their child processes are still bounded by their deadlines.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                log::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining in-flight requests");
}
