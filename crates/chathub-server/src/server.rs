//! `ChatServer`: axum HTTP + WebSocket server around the hub.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::{Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::collab::{Authenticator, MessageStore};
use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::http::{AuthUser, api};
use crate::hub::Hub;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::session::run_ws_session;

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Connection hub.
    pub hub: Arc<Hub>,
    /// Resolves callers from request credentials.
    pub authenticator: Arc<dyn Authenticator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus renderer for `/metrics`.
    pub metrics: PrometheusHandle,
}

/// The chat hub server.
pub struct ChatServer {
    config: ServerConfig,
    state: AppState,
    shutdown: Arc<ShutdownCoordinator>,
}

impl ChatServer {
    /// Create a server with its own hub.
    pub fn new(
        config: ServerConfig,
        store: Arc<dyn MessageStore>,
        authenticator: Arc<dyn Authenticator>,
        metrics: PrometheusHandle,
    ) -> Self {
        let hub = Arc::new(Hub::new(config.hub.clone(), store));
        Self {
            config,
            state: AppState {
                hub,
                authenticator,
                start_time: Instant::now(),
                metrics,
            },
            shutdown: Arc::new(ShutdownCoordinator::new()),
        }
    }

    /// Build the axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .route(
                "/api/messages",
                get(api::list_messages).post(api::post_message),
            )
            .route("/api/users/online", get(api::online_users))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind and serve in a background task.
    ///
    /// Returns the bound address (useful with port 0) and the serving task.
    /// Cancelling the shutdown token stops accepting and closes every hub
    /// connection.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();
        let hub = Arc::clone(&self.state.hub);

        info!(%addr, "chat hub listening");

        let handle = tokio::spawn(async move {
            let signal = async move {
                token.cancelled().await;
                let closed = hub.shutdown();
                info!(closed, "shutdown signalled, closing connections");
            };
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(signal)
                .await
            {
                error!(error = %e, "server stopped with error");
            }
        });
        Ok((addr, handle))
    }

    /// The hub behind this server.
    pub fn hub(&self) -> &Arc<Hub> {
        &self.state.hub
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /ws
///
/// Authentication runs before the upgrade so a bad token gets a plain 401.
async fn ws_handler(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    ws: WebSocketUpgrade,
) -> Response {
    let hub = Arc::clone(&state.hub);
    ws.max_message_size(hub.max_message_size())
        .on_upgrade(move |socket| run_ws_session(socket, identity, hub))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.hub.connection_count(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    crate::metrics::render(&state.metrics)
}
