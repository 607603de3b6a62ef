//! API routes for the echoline server

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use echoline_store::{HealthStatus, Turn};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::error::ChatError;
use crate::history::HistoryManager;

/// Application state
pub struct AppState {
    pub manager: Arc<HistoryManager>,
    /// Upper bound on each store health check behind `/health/ready`
    pub readiness_timeout: Duration,
}

/// Chat request
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub user_id: String,
    pub message: String,
}

/// Chat response
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
    pub history: Vec<Turn>,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    pub backend: &'static str,
    pub status: HealthStatus,
}

/// Readiness response
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: HealthStatus,
    pub cache: ComponentHealth,
    pub durable: ComponentHealth,
    pub checked_at: DateTime<Utc>,
}

/// Chat endpoint: record the message, reply, and return the full history
pub async fn chat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ChatError> {
    let Json(request) = payload.map_err(|rejection| ChatError::InvalidInput(rejection.body_text()))?;

    let exchange = state
        .manager
        .handle(&request.user_id, &request.message)
        .await?;

    Ok(Json(ChatResponse {
        reply: exchange.reply,
        history: exchange.history,
    }))
}

/// Liveness endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness endpoint; only the durable store can make it fail
pub async fn readiness(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let cache = state.manager.cache();
    let durable = state.manager.durable();

    let limit = state.readiness_timeout;
    let (cache_status, durable_status) = tokio::join!(
        within(limit, cache.backend_name(), cache.health_check()),
        within(limit, durable.backend_name(), durable.health_check()),
    );

    // Cache trouble caps at degraded
    let cache_effect = match cache_status {
        HealthStatus::Healthy => HealthStatus::Healthy,
        _ => HealthStatus::Degraded,
    };
    let status = durable_status.worst(cache_effect);
    let code = StatusCode::from_u16(status.to_http_status_code())
        .unwrap_or(StatusCode::SERVICE_UNAVAILABLE);

    (
        code,
        Json(ReadinessResponse {
            status,
            cache: ComponentHealth {
                backend: cache.backend_name(),
                status: cache_status,
            },
            durable: ComponentHealth {
                backend: durable.backend_name(),
                status: durable_status,
            },
            checked_at: Utc::now(),
        }),
    )
}

async fn within(
    limit: Duration,
    backend: &str,
    check: impl Future<Output = HealthStatus>,
) -> HealthStatus {
    match tokio::time::timeout(limit, check).await {
        Ok(status) => status,
        Err(_) => {
            warn!("{} health check did not answer within {:?}", backend, limit);
            HealthStatus::Unhealthy
        }
    }
}
