//! HTTP surface for the code registry

mod handlers;

use axum::routing::{delete, get, post, put};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServerConfig;
use crate::error::{Result, ScanmarkError};
use crate::registry::CodeStore;

/// Registry HTTP server over an in-memory code store
pub struct RegistryServer {
    config: ServerConfig,
    store: Arc<CodeStore>,
}

impl RegistryServer {
    pub fn new(config: ServerConfig, store: Arc<CodeStore>) -> Self {
        Self { config, store }
    }

    /// Build the API router; exposed separately so tests can drive it
    /// without binding a socket.
    pub fn router(store: Arc<CodeStore>) -> Router {
        Router::new()
            .route("/codes", post(handlers::add_code))
            .route("/codes", get(handlers::list_codes))
            .route("/codes/confirm", put(handlers::confirm_code))
            .route("/codes/:id", delete(handlers::remove_code))
            .route("/healthz", get(handlers::health))
            .layer(TraceLayer::new_for_http())
            .with_state(store)
    }

    /// Bind and serve until the process exits
    pub async fn serve(&self) -> Result<()> {
        let app = Self::router(Arc::clone(&self.store));
        let addr = format!("{}:{}", self.config.ip, self.config.port);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| ScanmarkError::server(format!("failed to bind {}: {}", addr, e)))?;

        info!("registry server listening on {}", addr);

        axum::serve(listener, app)
            .await
            .map_err(|e| ScanmarkError::server(format!("server error: {}", e)))?;

        Ok(())
    }
}
