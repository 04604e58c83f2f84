//! HTTP server exposing the alert stream.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::auth::TokenValidator;
use crate::consumer::handle_socket;
use crate::error::{AuthError, Result, StreamError};
use crate::hub::{AlertHub, DEFAULT_CHANNEL_CAPACITY};

pub const ALERTS_WS_PATH: &str = "/ws/alerts/";
pub const HEALTH_PATH: &str = "/health/";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// Shared HS256 secret; when set, clients must pass a valid `token`.
    pub jwt_secret: Option<String>,
    /// Frames buffered per client before it starts skipping.
    pub channel_capacity: usize,
}

impl Default for StreamServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 8000,
            jwt_secret: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl StreamServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind_address, self.port)
            .parse()
            .map_err(|e| StreamError::InvalidAddress(format!("{}:{} ({e})", self.bind_address, self.port)))
    }
}

/// Query parameters for WebSocket connection (JWT token).
#[derive(Debug, Deserialize)]
pub struct WsAuthParams {
    pub token: Option<String>,
}

#[derive(Clone)]
struct StreamState {
    hub: AlertHub,
    validator: Option<Arc<TokenValidator>>,
    shutdown: CancellationToken,
}

async fn alerts_ws(
    ws: WebSocketUpgrade,
    State(state): State<StreamState>,
    Query(auth): Query<WsAuthParams>,
) -> std::result::Result<Response, AuthError> {
    if let Some(validator) = &state.validator {
        let token = auth.token.as_deref().ok_or(AuthError::MissingToken)?;
        if let Err(e) = validator.validate(token) {
            warn!(error = %e, "Rejected WebSocket client");
            return Err(e);
        }
    }

    let StreamState { hub, shutdown, .. } = state;
    Ok(ws
        .on_upgrade(move |socket| handle_socket(socket, hub, shutdown))
        .into_response())
}

async fn health() -> &'static str {
    "OK"
}

/// The alert streaming server.
pub struct AlertStreamServer {
    config: StreamServerConfig,
    hub: AlertHub,
    validator: Option<Arc<TokenValidator>>,
    cancel_token: CancellationToken,
}

impl AlertStreamServer {
    pub fn new(config: StreamServerConfig) -> Self {
        let hub = AlertHub::new(config.channel_capacity);
        let validator = config
            .jwt_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|secret| Arc::new(TokenValidator::new(secret)));
        Self {
            config,
            hub,
            validator,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Publisher handle for this server's clients.
    pub fn hub(&self) -> AlertHub {
        self.hub.clone()
    }

    pub fn validator(&self) -> Option<&TokenValidator> {
        self.validator.as_deref()
    }

    /// Get the cancellation token for graceful shutdown.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route(ALERTS_WS_PATH, get(alerts_ws))
            .route(HEALTH_PATH, get(health))
            .with_state(StreamState {
                hub: self.hub.clone(),
                validator: self.validator.clone(),
                shutdown: self.cancel_token.clone(),
            })
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the configured address and serve until shut down.
    pub async fn run(&self) -> Result<()> {
        let addr = self.config.socket_addr()?;
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until shut down.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let addr = listener.local_addr()?;
        info!(
            "Alert stream listening on ws://{}{} (auth: {})",
            addr,
            ALERTS_WS_PATH,
            if self.validator.is_some() { "jwt" } else { "none" }
        );

        let cancel_token = self.cancel_token.clone();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                info!("Alert stream shutting down...");
            })
            .await?;
        Ok(())
    }

    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = StreamServerConfig::default();
        assert_eq!(config.bind_address, "127.0.0.1");
        assert_eq!(config.port, 8000);
        assert!(config.jwt_secret.is_none());
        assert_eq!(config.socket_addr().unwrap().port(), 8000);
    }

    #[test]
    fn test_invalid_address() {
        let config = StreamServerConfig {
            bind_address: "not an address".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.socket_addr(),
            Err(StreamError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_empty_secret_disables_auth() {
        let server = AlertStreamServer::new(StreamServerConfig {
            jwt_secret: Some(String::new()),
            ..Default::default()
        });
        assert!(server.validator().is_none());
        assert!(!server.cancel_token().is_cancelled());
    }
}
