//! HTTP API for the client application on the same host.
//!
//! Routes:
//!
//! | Method | Path              | Body                        | Answer                 |
//! |--------|-------------------|-----------------------------|------------------------|
//! | GET    | `/wifiStatus`     |                             | `NetworkStatus`        |
//! | GET    | `/wifiScan`       |                             | `[ScannedNetwork]`     |
//! | GET    | `/wifiSaved`      |                             | `[SavedNetwork]`       |
//! | GET    | `/wifiConnected`  |                             | `[ConnectedNetwork]`   |
//! | POST   | `/wifiToggle`     | `{"wifi_state": bool}`      | `{"wifi_state": bool}` |
//! | POST   | `/wifiConnect`    | `{"ssid", "password"}`      | `{"success": true}`    |
//! | POST   | `/wifiDisconnect` | `{"ssid"}`                  | `{"success": true}`    |
//! | POST   | `/wifiForget`     | `{"ssid"}`                  | `{"success": true}`    |
//!
//! Failures answer `{"error": <kind>, "message": <text>}`.

use std::sync::Arc;

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::error::WifiError;
use crate::manager::WifiManager;
use crate::types::{ConnectedNetwork, NetworkStatus, SavedNetwork, ScannedNetwork};

type AppState = Arc<WifiManager>;

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub wifi_state: bool,
}

#[derive(Debug, Deserialize)]
pub struct ConnectRequest {
    #[serde(alias = "wifi_ssid")]
    pub ssid: String,
    #[serde(default, alias = "wifi_password")]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct SsidRequest {
    #[serde(alias = "wifi_ssid")]
    pub ssid: String,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    pub wifi_state: bool,
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

pub enum ApiError {
    Wifi(WifiError),
    BadRequest(String),
}

impl From<WifiError> for ApiError {
    fn from(e: WifiError) -> Self {
        Self::Wifi(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        Self::BadRequest(e.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, "bad_request", message),
            Self::Wifi(e) => {
                let status = match &e {
                    WifiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                    WifiError::Connection(_)
                    | WifiError::NoInterfaceFound
                    | WifiError::InterfaceNotFound(_) => StatusCode::SERVICE_UNAVAILABLE,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.kind(), e.to_string())
            }
        };

        (status, Json(ErrorBody { error: kind, message })).into_response()
    }
}

fn require_ssid(ssid: &str) -> Result<(), ApiError> {
    if ssid.trim().is_empty() {
        return Err(ApiError::BadRequest("ssid must not be empty".to_string()));
    }
    Ok(())
}

/// Build the application router around a shared manager.
pub fn router(manager: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/wifiStatus", get(wifi_status))
        .route("/wifiScan", get(wifi_scan))
        .route("/wifiSaved", get(wifi_saved))
        .route("/wifiConnected", get(wifi_connected))
        .route("/wifiToggle", post(wifi_toggle))
        .route("/wifiConnect", post(wifi_connect))
        .route("/wifiDisconnect", post(wifi_disconnect))
        .route("/wifiForget", post(wifi_forget))
        .layer(cors)
        .with_state(manager)
}

/// Serve until `shutdown` is cancelled, then close the control channel.
pub async fn run_server(
    manager: AppState,
    config: &ServerConfig,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let app = router(manager.clone());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(
        "Serving Wi-Fi API for {} on http://{}",
        manager.interface(),
        listener.local_addr()?
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    manager.shutdown().await;
    info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Shutdown requested");
}

async fn wifi_status(State(manager): State<AppState>) -> Result<Json<NetworkStatus>, ApiError> {
    Ok(Json(manager.status().await?))
}

async fn wifi_scan(
    State(manager): State<AppState>,
) -> Result<Json<Vec<ScannedNetwork>>, ApiError> {
    Ok(Json(manager.scan().await?))
}

async fn wifi_saved(State(manager): State<AppState>) -> Result<Json<Vec<SavedNetwork>>, ApiError> {
    Ok(Json(manager.list_saved().await?))
}

async fn wifi_connected(
    State(manager): State<AppState>,
) -> Result<Json<Vec<ConnectedNetwork>>, ApiError> {
    Ok(Json(manager.list_connected().await?))
}

async fn wifi_toggle(
    State(manager): State<AppState>,
    payload: Result<Json<ToggleRequest>, JsonRejection>,
) -> Result<Json<ToggleResponse>, ApiError> {
    let Json(request) = payload?;
    let wifi_state = manager.toggle_radio(request.wifi_state).await?;
    Ok(Json(ToggleResponse { wifi_state }))
}

async fn wifi_connect(
    State(manager): State<AppState>,
    payload: Result<Json<ConnectRequest>, JsonRejection>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let Json(request) = payload?;
    require_ssid(&request.ssid)?;
    manager.connect(&request.ssid, &request.password).await?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn wifi_disconnect(
    State(manager): State<AppState>,
    payload: Result<Json<SsidRequest>, JsonRejection>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let Json(request) = payload?;
    require_ssid(&request.ssid)?;
    manager.disconnect(&request.ssid).await?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn wifi_forget(
    State(manager): State<AppState>,
    payload: Result<Json<SsidRequest>, JsonRejection>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let Json(request) = payload?;
    require_ssid(&request.ssid)?;
    manager.forget(&request.ssid).await?;
    Ok(Json(SuccessResponse { success: true }))
}
