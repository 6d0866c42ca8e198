//! HTTP dashboard, live catalog, polling control and the notification websocket.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::brochure::{BrochureRenderer, PdfError, PdfGenerator, Selection, group_by_category};
use crate::core::{Catalog, CatalogError};
use crate::polling::{NotificationHub, PollingError, PollingService};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PollingService>,
    pub hub: NotificationHub,
    pub renderer: Arc<BrochureRenderer>,
    pub pdf: PdfGenerator,
    /// Scratch directory for PDF conversion.
    pub work_dir: PathBuf,
}

impl AppState {
    fn load_catalog(&self) -> Result<Catalog, ServerError> {
        Ok(self.service.processor().store().load()?)
    }
}

#[derive(Debug)]
pub enum ServerError {
    Catalog(CatalogError),
    Polling(PollingError),
    Render(String),
    Pdf(PdfError),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::Catalog(e) => write!(f, "{e}"),
            ServerError::Polling(e) => write!(f, "{e}"),
            ServerError::Render(e) => write!(f, "{e}"),
            ServerError::Pdf(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<CatalogError> for ServerError {
    fn from(e: CatalogError) -> Self {
        ServerError::Catalog(e)
    }
}

impl From<PollingError> for ServerError {
    fn from(e: PollingError) -> Self {
        ServerError::Polling(e)
    }
}

impl From<crate::brochure::RenderError> for ServerError {
    fn from(e: crate::brochure::RenderError) -> Self {
        ServerError::Render(e.to_string())
    }
}

impl From<PdfError> for ServerError {
    fn from(e: PdfError) -> Self {
        ServerError::Pdf(e)
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServerError::Polling(PollingError::AlreadyRunning | PollingError::NotRunning) => {
                StatusCode::CONFLICT
            }
            ServerError::Pdf(PdfError::EngineUnavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }
        (status, Json(json!({ "status": "error", "message": self.to_string() }))).into_response()
    }
}

/// Filters accepted by `/catalog` and `/catalog.pdf`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CatalogQuery {
    /// Comma-separated category names.
    pub categories: Option<String>,
    /// Comma-separated model numbers.
    pub models: Option<String>,
    pub active_only: bool,
}

impl CatalogQuery {
    fn selection(&self) -> Selection {
        let split = |list: &Option<String>| -> Vec<String> {
            list.as_deref()
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        };
        Selection {
            categories: split(&self.categories),
            models: split(&self.models),
            active_only: self.active_only,
        }
    }
}

#[derive(Serialize)]
struct ControlResponse {
    status: &'static str,
    message: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(dashboard))
        .route("/catalog", get(live_catalog))
        .route("/catalog.pdf", get(catalog_pdf))
        .route("/api/products", get(products))
        .route("/polling/start", post(start_polling))
        .route("/polling/stop", post(stop_polling))
        .route("/polling/status", get(polling_status))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

/// Binds `addr` and serves until Ctrl-C.
pub async fn serve(state: AppState, addr: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutting down server");
}

async fn dashboard(State(state): State<AppState>) -> Result<Html<String>, ServerError> {
    let catalog = state.load_catalog()?;
    let html = state
        .renderer
        .render_dashboard(&state.service.status(), &catalog.category_counts())?;
    Ok(Html(html))
}

async fn live_catalog(
    State(state): State<AppState>,
    Query(query): Query<CatalogQuery>,
) -> Result<Html<String>, ServerError> {
    let catalog = state.load_catalog()?;
    let groups = group_by_category(query.selection().apply(&catalog.products));
    let html = state
        .renderer
        .render_live_catalog(&groups, catalog.metadata.last_synchronized)?;
    Ok(Html(html))
}

async fn catalog_pdf(
    State(state): State<AppState>,
    Query(query): Query<CatalogQuery>,
) -> Result<Response, ServerError> {
    let catalog = state.load_catalog()?;
    let groups = group_by_category(query.selection().apply(&catalog.products));
    let html = state.renderer.render_brochure(&groups)?;
    let bytes = state.pdf.render_bytes(&html, &state.work_dir).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf"),
            (header::CONTENT_DISPOSITION, "inline; filename=\"catalog.pdf\""),
        ],
        bytes,
    )
        .into_response())
}

async fn products(State(state): State<AppState>) -> Result<Json<Catalog>, ServerError> {
    Ok(Json(state.load_catalog()?))
}

async fn start_polling(
    State(state): State<AppState>,
) -> Result<Json<ControlResponse>, ServerError> {
    state.service.start()?;
    Ok(Json(ControlResponse {
        status: "success",
        message: "Polling service started".to_string(),
    }))
}

async fn stop_polling(State(state): State<AppState>) -> Result<Json<ControlResponse>, ServerError> {
    state.service.stop()?;
    Ok(Json(ControlResponse {
        status: "success",
        message: "Polling service stopped".to_string(),
    }))
}

async fn polling_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.service.status())
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let rx = state.hub.subscribe();
    debug!(subscribers = state.hub.subscriber_count(), "Websocket upgrade requested");
    ws.on_upgrade(move |socket| client_session(socket, rx))
}

async fn client_session(
    mut socket: WebSocket,
    mut rx: tokio::sync::broadcast::Receiver<crate::polling::Notification>,
) {
    let client = Uuid::new_v4();
    info!(%client, "Websocket client connected");
    loop {
        tokio::select! {
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    debug!(%client, text = %text, "Websocket message");
                    let reply = Message::Text(format!("Server received: {text}"));
                    if socket.send(reply).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(%client, error = %e, "Websocket receive failed");
                    break;
                }
            },
            notification = rx.recv() => match notification {
                Ok(notification) => match serde_json::to_string(&notification) {
                    Ok(text) => {
                        if socket.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "Failed to encode notification"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!(%client, skipped, "Websocket client lagging, notifications dropped");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
    info!(%client, "Websocket client disconnected");
}
