// SoleStream Server - HTTP and WebSocket handlers
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! HTTP routes and the WebSocket subscriber endpoint.
//!
//! ## WebSocket protocol
//!
//! Clients connect to `/ws`. The first message is the connection status,
//! followed by one telemetry message per published frame and a new status
//! message whenever the connection changes. Text frames sent by the client
//! are parsed as control commands, e.g. `{"action": "pattern", "pattern":
//! "running"}`, and answered with `{"status": "ok"}` or an error object.

use std::time::Instant;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use solestream::{
    ConnectError, ConnectResponse, ControlCommand, ControlError, ControlResponse,
    DisconnectResponse, EngineHandle, TelemetryError, TransportKind,
};
use tracing::{debug, info, warn};

use crate::metrics::{encode_metrics, update_from_snapshot};

/// Default number of entries returned by `/history`.
const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: EngineHandle,
    pub started: Instant,
}

impl AppState {
    pub fn new(engine: EngineHandle) -> Self {
        Self {
            engine,
            started: Instant::now(),
        }
    }
}

/// Build the router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/metrics", get(metrics_handler))
        .route("/ports", get(ports_handler))
        .route("/history", get(history_handler))
        .route("/connect", post(connect_handler))
        .route("/disconnect", post(disconnect_handler))
        .route("/control", post(control_handler))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

/// HTTP status for an engine error.
pub fn status_code(err: &TelemetryError) -> StatusCode {
    match err {
        TelemetryError::Control(ControlError::SimulationControlsDisabled) => StatusCode::CONFLICT,
        TelemetryError::Control(ControlError::InvalidControl(_)) => StatusCode::BAD_REQUEST,
        TelemetryError::Connect(ConnectError::NoDeviceFound { .. }) => StatusCode::NOT_FOUND,
        TelemetryError::Connect(ConnectError::HandshakeFailed { .. }) => {
            StatusCode::GATEWAY_TIMEOUT
        }
        TelemetryError::Connect(ConnectError::Transport { .. }) => StatusCode::BAD_GATEWAY,
        TelemetryError::Connect(ConnectError::UnsupportedKind { .. }) => StatusCode::BAD_REQUEST,
        TelemetryError::Config(_) => StatusCode::BAD_REQUEST,
        TelemetryError::EngineStopped => StatusCode::SERVICE_UNAVAILABLE,
        TelemetryError::Read(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Engine error rendered as a JSON response.
pub struct ApiError(pub TelemetryError);

impl From<TelemetryError> for ApiError {
    fn from(err: TelemetryError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ControlResponse::from_result(&Err(self.0.clone()));
        (status_code(&self.0), Json(body)).into_response()
    }
}

/// Root handler - shows a simple HTML page.
async fn root_handler() -> Html<&'static str> {
    Html(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>SoleStream</title>
    <style>
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; max-width: 800px; margin: 50px auto; padding: 20px; }
        h1 { color: #2c3e50; }
        a { color: #3498db; text-decoration: none; }
        .endpoints { background: #f8f9fa; padding: 20px; border-radius: 8px; margin: 20px 0; }
        .endpoint { margin: 10px 0; }
        code { background: #e9ecef; padding: 2px 6px; border-radius: 4px; }
    </style>
</head>
<body>
    <h1>SoleStream</h1>
    <p>Live insole pressure telemetry.</p>

    <div class="endpoints">
        <h2>Endpoints</h2>
        <div class="endpoint"><code>GET</code> <a href="/status">/status</a> - Engine snapshot (JSON)</div>
        <div class="endpoint"><code>GET</code> <a href="/history">/history?limit=N</a> - Recent frames</div>
        <div class="endpoint"><code>GET</code> <a href="/ports">/ports</a> - Serial ports</div>
        <div class="endpoint"><code>GET</code> <a href="/metrics">/metrics</a> - Prometheus metrics</div>
        <div class="endpoint"><code>GET</code> <a href="/health">/health</a> - Health check</div>
        <div class="endpoint"><code>POST</code> /connect - <code>{"kind": "hardware-serial", "hint": "/dev/ttyUSB0"}</code></div>
        <div class="endpoint"><code>POST</code> /disconnect</div>
        <div class="endpoint"><code>POST</code> /control - <code>{"action": "pattern", "pattern": "walking"}</code></div>
        <div class="endpoint"><code>WS</code> /ws - Telemetry stream</div>
    </div>
</body>
</html>"#,
    )
}

/// Health check handler.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    if state.engine.is_running() {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "engine stopped")
    }
}

/// Status response: engine snapshot plus server info.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    version: &'static str,
    uptime_secs: u64,
    #[serde(flatten)]
    snapshot: solestream::Snapshot,
}

async fn status_handler(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state.engine.snapshot().await?;
    Ok(Json(StatusResponse {
        version: solestream::VERSION,
        uptime_secs: state.started.elapsed().as_secs(),
        snapshot,
    }))
}

/// Metrics handler - returns Prometheus text format.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.engine.snapshot().await {
        Ok(snapshot) => update_from_snapshot(&snapshot),
        Err(e) => warn!("metrics scrape without snapshot: {}", e),
    }
    match encode_metrics() {
        Ok(metrics) => (
            StatusCode::OK,
            [("Content-Type", "text/plain; charset=utf-8")],
            metrics,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn ports_handler(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.engine.list_serial_ports().await?))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

async fn history_handler(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    Ok(Json(state.engine.history(limit).await?))
}

/// Body of `POST /connect`.
#[derive(Debug, Deserialize)]
pub struct ConnectRequest {
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub hint: Option<String>,
}

fn default_kind() -> String {
    TransportKind::Serial.source_kind().to_string()
}

async fn connect_handler(
    State(state): State<AppState>,
    Json(request): Json<ConnectRequest>,
) -> (StatusCode, Json<ConnectResponse>) {
    let kind: TransportKind = match request.kind.parse() {
        Ok(kind) => kind,
        Err(_) => {
            let err = TelemetryError::from(ConnectError::UnsupportedKind { kind: request.kind });
            return (status_code(&err), Json(ConnectResponse::error(&err)));
        }
    };

    info!("connect requested: {} {:?}", kind, request.hint);
    let result = state.engine.connect(kind, request.hint).await;
    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(e) => status_code(e),
    };
    (status, Json(ConnectResponse::from_result(&result)))
}

async fn disconnect_handler(
    State(state): State<AppState>,
) -> Result<Json<DisconnectResponse>, ApiError> {
    state.engine.disconnect().await?;
    Ok(Json(DisconnectResponse::default()))
}

async fn control_handler(State(state): State<AppState>, body: String) -> Response {
    let result = apply_control_text(&state.engine, &body).await;
    let status = match &result {
        Ok(()) => StatusCode::OK,
        Err(e) => status_code(e),
    };
    (status, Json(ControlResponse::from_result(&result))).into_response()
}

async fn apply_control_text(engine: &EngineHandle, text: &str) -> Result<(), TelemetryError> {
    let command = ControlCommand::from_json(text)?;
    engine.send_control(command).await
}

/// WebSocket upgrade handler.
async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Forward engine messages to one client and apply its control commands.
async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let mut subscription = match state.engine.subscribe_channel().await {
        Ok(subscription) => subscription,
        Err(e) => {
            warn!("cannot subscribe WebSocket client: {}", e);
            return;
        }
    };
    debug!("WebSocket client subscribed as {}", subscription.id);

    loop {
        tokio::select! {
            outbound = subscription.receiver.recv() => match outbound {
                Some(envelope) => {
                    if socket.send(Message::Text(envelope.json.clone())).await.is_err() {
                        break;
                    }
                }
                // Pruned by the hub or the engine stopped
                None => break,
            },
            inbound = socket.recv() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    let result = apply_control_text(&state.engine, &text).await;
                    let reply = ControlResponse::from_result(&result);
                    match serde_json::to_string(&reply) {
                        Ok(json) => {
                            if socket.send(Message::Text(json)).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("cannot serialize control reply: {}", e),
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    let _ = state.engine.unsubscribe(subscription.id).await;
    debug!("WebSocket client {} closed", subscription.id);
}
