use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use secrecy::SecretString;
use tokio::sync::oneshot;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Instrument};

use lanes_core::RequestId;
use lanes_settings::LanesSettings;
use lanes_store::Database;

use crate::actions::ActionConfig;
use crate::handlers::{HandlerState, RequestAuth};
use crate::rpc::{RpcRequest, RpcResponse};

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    /// `0` binds an ephemeral port.
    pub port: u16,
    pub request_timeout_secs: u64,
    pub actions: ActionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9300,
            request_timeout_secs: 30,
            actions: ActionConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_settings(settings: &LanesSettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            request_timeout_secs: settings.server.request_timeout_secs,
            actions: ActionConfig {
                delete_policy: settings.todos.delete_policy,
                default_color: settings.todos.default_color.clone(),
            },
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub handler_state: Arc<HandlerState>,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/rpc", post(rpc_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(timeout_layer(request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Requests running past `timeout` are answered with `408 Request Timeout`.
fn timeout_layer(timeout: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout)
}

/// Bind and start serving. Returns once the listener is up.
pub async fn start(config: ServerConfig, db: Database) -> Result<ServerHandle, std::io::Error> {
    let handler_state = Arc::new(HandlerState::new(db, config.actions.clone()));
    let router = build_router(
        AppState { handler_state },
        Duration::from_secs(config.request_timeout_secs),
    );

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    let addr = listener.local_addr()?;
    info!(%addr, "lanes server started");

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await;
        if let Err(e) = result {
            warn!(error = %e, "server exited with error");
        }
    });

    Ok(ServerHandle {
        addr,
        port: addr.port(),
        shutdown: Some(shutdown_tx),
        server,
    })
}

/// Handle returned by `start()`. Dropping it leaves the server running.
pub struct ServerHandle {
    pub addr: SocketAddr,
    pub port: u16,
    shutdown: Option<oneshot::Sender<()>>,
    server: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    /// Stop accepting connections and wait for in-flight requests.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = self.server.await {
            warn!(error = %e, "server task failed");
        }
    }
}

/// `Authorization: Bearer <token>`, if present and well-formed.
fn bearer_token(headers: &HeaderMap) -> Option<SecretString> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| SecretString::from(token.to_string()))
}

/// `POST /rpc`: one request, one response.
async fn rpc_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Json<RpcResponse> {
    let request: RpcRequest = match serde_json::from_str(&body) {
        Ok(req) => req,
        Err(_) => return Json(RpcResponse::parse_error()),
    };

    let token = bearer_token(&headers);
    let caller = match state.handler_state.authenticate(token.as_ref()) {
        Ok(caller) => caller,
        Err(e) => {
            tracing::error!(error = %e, "session lookup failed");
            return Json(RpcResponse::internal_error(request.id, e.to_string()));
        }
    };

    let span = tracing::info_span!(
        "rpc",
        method = %request.method,
        request_id = %RequestId::new(),
        user_id = caller.user_id().map(|u| u.as_str()).unwrap_or("anonymous"),
    );
    let auth = RequestAuth { caller, token };
    let params = request.params.unwrap_or(serde_json::json!({}));
    let response = crate::handlers::dispatch(
        &state.handler_state,
        &auth,
        &request.method,
        &params,
        request.id,
    )
    .instrument(span)
    .await;
    Json(response)
}

/// Health check HTTP endpoint.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let resp = crate::handlers::dispatch(
        &state.handler_state,
        &RequestAuth::default(),
        "health",
        &serde_json::json!({}),
        None,
    )
    .await;

    let status = resp
        .result
        .as_ref()
        .and_then(|r| r.get("status"))
        .and_then(|s| s.as_str())
        .unwrap_or("unknown");

    let http_status = if status == "healthy" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (http_status, Json(resp.result.unwrap_or_default()))
}
