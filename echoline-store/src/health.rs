//! Store health: the status every adapter reports, plus the probe policy
//! and report used for database-backed stores

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Health status enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Store is healthy and responsive
    Healthy,
    /// Store is responsive but slow (above degraded threshold)
    Degraded,
    /// Store is not responsive or erroring
    Unhealthy,
}

impl HealthStatus {
    /// Convert to HTTP status code equivalent
    pub fn to_http_status_code(&self) -> u16 {
        match self {
            HealthStatus::Healthy => 200,
            HealthStatus::Degraded => 200,
            HealthStatus::Unhealthy => 503,
        }
    }

    /// Check if status is healthy or degraded (operational)
    pub fn is_operational(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }

    /// The worse of two statuses
    pub fn worst(self, other: HealthStatus) -> HealthStatus {
        match (self, other) {
            (HealthStatus::Unhealthy, _) | (_, HealthStatus::Unhealthy) => HealthStatus::Unhealthy,
            (HealthStatus::Degraded, _) | (_, HealthStatus::Degraded) => HealthStatus::Degraded,
            _ => HealthStatus::Healthy,
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Query used to check that a database answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Probe {
    /// `RETURN 1`
    Simple,
    /// `CALL db.ping()`, Neo4j 4.1+
    Ping,
}

/// How a store probes its database
#[derive(Debug, Clone)]
pub struct ProbePolicy {
    pub probe: Probe,
    /// Bound on a single probe attempt
    pub attempt_timeout: Duration,
    /// Extra attempts after a failed one
    pub retries: u32,
    pub retry_delay: Duration,
    /// Retry a failed `Ping` once as `Simple` (servers without `db.ping()`)
    pub fall_back_to_simple: bool,
    /// Answers slower than this report `Degraded`
    pub degraded_after: Duration,
}

impl Default for ProbePolicy {
    fn default() -> Self {
        Self {
            probe: Probe::Ping,
            attempt_timeout: Duration::from_secs(5),
            retries: 3,
            retry_delay: Duration::from_millis(500),
            fall_back_to_simple: true,
            degraded_after: Duration::from_secs(1),
        }
    }
}

/// Outcome of a probe run, suitable for logs and health endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeReport {
    pub status: HealthStatus,
    pub latency_ms: u64,
    pub checked_at: DateTime<Utc>,
    /// Probe that produced this answer
    pub probe: Probe,
    pub attempts: u32,
    pub fell_back: bool,
    pub error: Option<String>,
}

impl ProbeReport {
    /// Classify a single attempt: failure is unhealthy, a slow answer degraded
    pub fn classify<E: fmt::Display>(
        probe: Probe,
        latency: Duration,
        outcome: Result<(), E>,
        degraded_after: Duration,
    ) -> Self {
        let (status, error) = match outcome {
            Ok(()) if latency > degraded_after => (HealthStatus::Degraded, None),
            Ok(()) => (HealthStatus::Healthy, None),
            Err(e) => (HealthStatus::Unhealthy, Some(e.to_string())),
        };

        Self {
            status,
            latency_ms: latency.as_millis() as u64,
            checked_at: Utc::now(),
            probe,
            attempts: 1,
            fell_back: false,
            error,
        }
    }
}
