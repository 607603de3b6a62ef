//! API server for echoline

use anyhow::Result;
use axum::{
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::history::HistoryManager;

use super::middleware::request_logging;
use super::routes::{chat, health_check, readiness, AppState};

/// Configuration for the API server
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    pub host: String,
    pub port: u16,
    /// Cap on each store health check in `/health/ready`
    pub readiness_timeout: Duration,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            readiness_timeout: Duration::from_secs(2),
        }
    }
}

/// API server
pub struct ApiServer {
    config: ApiServerConfig,
    manager: Arc<HistoryManager>,
}

impl ApiServer {
    /// Create a new API server with configuration
    pub fn new(config: ApiServerConfig, manager: Arc<HistoryManager>) -> Self {
        Self { config, manager }
    }

    /// Create a new API server with default configuration
    pub fn with_defaults(manager: Arc<HistoryManager>) -> Self {
        Self::new(ApiServerConfig::default(), manager)
    }

    /// Build the application router
    pub fn router(&self) -> Router {
        let app_state = Arc::new(AppState {
            manager: self.manager.clone(),
            readiness_timeout: self.config.readiness_timeout,
        });

        Router::new()
            .route("/chat", post(chat))
            .route("/health", get(health_check))
            .route("/health/ready", get(readiness))
            .with_state(app_state)
            .layer(from_fn(request_logging))
            // Add CORS layer
            .layer(CorsLayer::permissive())
    }

    /// Bind the configured address and serve until Ctrl-C / SIGTERM
    pub async fn start(self) -> Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        info!("Starting API server on {}", addr);

        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let app = self.router();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("API server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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

    info!("Shutdown signal received");
}
