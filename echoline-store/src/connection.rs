//! Neo4j connection management
//!
//! [`Neo4jClient`] owns the driver pool, bounds every conversation query by
//! an operation timeout and probes the server according to a [`ProbePolicy`].

use crate::error::{Result, StoreError};
use crate::health::{Probe, ProbePolicy, ProbeReport};
use neo4rs::{query, ConfigBuilder, Graph};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Connection settings for Neo4j
#[derive(Debug, Clone)]
pub struct Neo4jConfig {
    /// e.g. `bolt://localhost:7687`
    pub uri: String,
    pub user: String,
    pub password: String,
    pub database: String,
    /// Driver pool size
    pub max_connections: usize,
    /// Upper bound on every conversation query
    pub operation_timeout: Duration,
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: "password".to_string(),
            database: "neo4j".to_string(),
            max_connections: 16,
            operation_timeout: Duration::from_secs(2),
        }
    }
}

impl Neo4jConfig {
    /// Read `NEO4J_URI`, `NEO4J_USER`, `NEO4J_PASSWORD` and `NEO4J_DATABASE`,
    /// falling back to the defaults for anything unset
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            uri: std::env::var("NEO4J_URI").unwrap_or(defaults.uri),
            user: std::env::var("NEO4J_USER").unwrap_or(defaults.user),
            password: std::env::var("NEO4J_PASSWORD").unwrap_or(defaults.password),
            database: std::env::var("NEO4J_DATABASE").unwrap_or(defaults.database),
            ..defaults
        }
    }
}

pub struct Neo4jClient {
    graph: Graph,
    operation_timeout: Duration,
    probe_policy: ProbePolicy,
}

impl Neo4jClient {
    /// Connect with the default probe policy
    ///
    /// # Example
    /// ```no_run
    /// use echoline_store::{Neo4jClient, Neo4jConfig};
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let client = Neo4jClient::connect(Neo4jConfig::from_env()).await?;
    ///     let report = client.probe().await;
    ///     println!("Neo4j is {} ({}ms)", report.status, report.latency_ms);
    ///     Ok(())
    /// }
    /// ```
    pub async fn connect(config: Neo4jConfig) -> Result<Self> {
        Self::connect_with_policy(config, ProbePolicy::default()).await
    }

    pub async fn connect_with_policy(config: Neo4jConfig, probe_policy: ProbePolicy) -> Result<Self> {
        info!("Connecting to Neo4j at {} (database: {})", config.uri, config.database);

        let driver_config = ConfigBuilder::default()
            .uri(config.uri.as_str())
            .user(config.user.as_str())
            .password(config.password.as_str())
            .db(config.database.as_str())
            .max_connections(config.max_connections)
            .build()
            .map_err(|e| StoreError::ConfigError(e.to_string()))?;

        let graph = Graph::connect(driver_config)
            .await
            .map_err(|e| StoreError::ConnectionError(e.to_string()))?;

        info!("Neo4j connection pool ready");

        Ok(Self {
            graph,
            operation_timeout: config.operation_timeout,
            probe_policy,
        })
    }

    /// Run a database future under the configured operation timeout
    pub async fn bounded<T, F>(&self, context: &str, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        within(self.operation_timeout, context, operation).await
    }

    /// Run one probe query, without retries
    pub async fn run_probe(&self, probe: Probe) -> Result<()> {
        match probe {
            Probe::Simple => {
                self.graph.run(query("RETURN 1")).await?;
                Ok(())
            }
            Probe::Ping => {
                let mut rows = self.graph.execute(query("CALL db.ping()")).await?;
                match rows.next().await? {
                    Some(row) if row.get::<bool>("success").unwrap_or(false) => Ok(()),
                    Some(_) => Err(StoreError::QueryError("db.ping() reported failure".to_string())),
                    None => Err(StoreError::QueryError("db.ping() returned no rows".to_string())),
                }
            }
        }
    }

    /// Probe the server following the policy's retry and fallback rules
    ///
    /// Never fails; problems are reported through the returned status.
    pub async fn probe(&self) -> ProbeReport {
        let policy = &self.probe_policy;
        let mut probe = policy.probe;
        let mut fell_back = false;
        let mut attempts = 0;

        loop {
            attempts += 1;
            let started = Instant::now();
            let mut outcome = self.timed_probe(probe).await;

            if let Err(e) = &outcome {
                if probe == Probe::Ping && policy.fall_back_to_simple && !fell_back {
                    warn!("db.ping() failed, falling back to RETURN 1: {}", e);
                    probe = Probe::Simple;
                    fell_back = true;
                    outcome = self.timed_probe(probe).await;
                }
            }

            let mut report =
                ProbeReport::classify(probe, started.elapsed(), outcome, policy.degraded_after);
            report.attempts = attempts;
            report.fell_back = fell_back;

            if report.status.is_operational() || attempts > policy.retries {
                debug!("Neo4j probe finished: {:?}", report);
                return report;
            }

            warn!(
                "Neo4j probe failed (attempt {}/{}), retrying in {:?}",
                attempts,
                policy.retries + 1,
                policy.retry_delay
            );
            tokio::time::sleep(policy.retry_delay).await;
        }
    }

    async fn timed_probe(&self, probe: Probe) -> Result<()> {
        within(self.probe_policy.attempt_timeout, "health probe", self.run_probe(probe)).await
    }

    /// Underlying driver handle
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn probe_policy(&self) -> &ProbePolicy {
        &self.probe_policy
    }
}

async fn within<T, F>(limit: Duration, context: &str, operation: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(result) => result,
        Err(_) => {
            warn!("Neo4j operation '{}' timed out after {:?}", context, limit);
            Err(StoreError::TimeoutError {
                timeout_ms: limit.as_millis() as u64,
                context: context.to_string(),
            })
        }
    }
}
