//! Dependency probes and the registry that runs them.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::future::join_all;
use serde::Serialize;

use crate::cache::RedisCache;
use crate::messaging::RabbitMqEventBus;
use crate::observability::metrics;
use crate::persistence::DbContext;

pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status")]
pub enum HealthStatus {
    Healthy,
    Unhealthy { reason: String },
}

impl HealthStatus {
    pub fn unhealthy(reason: impl ToString) -> Self {
        Self::Unhealthy {
            reason: reason.to_string(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

#[async_trait]
pub trait HealthCheck: Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn check(&self) -> HealthStatus;
}

pub struct RedisHealthCheck {
    cache: RedisCache,
}

impl RedisHealthCheck {
    pub fn new(cache: RedisCache) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl HealthCheck for RedisHealthCheck {
    fn name(&self) -> &str {
        "redis"
    }

    async fn check(&self) -> HealthStatus {
        match self.cache.ping().await {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => HealthStatus::unhealthy(e),
        }
    }
}

pub struct MySqlHealthCheck {
    db: DbContext,
}

impl MySqlHealthCheck {
    pub fn new(db: DbContext) -> Self {
        Self { db }
    }
}

#[async_trait]
impl HealthCheck for MySqlHealthCheck {
    fn name(&self) -> &str {
        "mysql"
    }

    async fn check(&self) -> HealthStatus {
        match self.db.ping().await {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => HealthStatus::unhealthy(e),
        }
    }
}

pub struct RabbitMqHealthCheck {
    bus: Arc<RabbitMqEventBus>,
}

impl RabbitMqHealthCheck {
    pub fn new(bus: Arc<RabbitMqEventBus>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl HealthCheck for RabbitMqHealthCheck {
    fn name(&self) -> &str {
        "rabbitmq"
    }

    async fn check(&self) -> HealthStatus {
        if self.bus.is_connected() {
            HealthStatus::Healthy
        } else {
            HealthStatus::unhealthy("connection is not open")
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    #[serde(flatten)]
    pub status: HealthStatus,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub checks: BTreeMap<String, CheckResult>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.checks.values().all(|c| c.status.is_healthy())
    }
}

/// Ordered set of checks, immutable once the host is built.
pub struct HealthRegistry {
    checks: Vec<Arc<dyn HealthCheck>>,
    timeout: Duration,
}

impl HealthRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            checks: Vec::new(),
            timeout,
        }
    }

    pub fn with_check(mut self, check: impl HealthCheck) -> Self {
        self.checks.push(Arc::new(check));
        self
    }

    pub fn names(&self) -> Vec<String> {
        self.checks.iter().map(|c| c.name().to_string()).collect()
    }

    pub async fn run(&self) -> HealthReport {
        let probes = self.checks.iter().map(|check| {
            let check = check.clone();
            let timeout = self.timeout;
            async move {
                let start = Instant::now();
                let status = match tokio::time::timeout(timeout, check.check()).await {
                    Ok(status) => status,
                    Err(_) => HealthStatus::unhealthy(format!("timed out after {timeout:?}")),
                };
                if let HealthStatus::Unhealthy { reason } = &status {
                    tracing::warn!(check = check.name(), %reason, "Health check failed");
                }
                metrics::record_dependency_health(check.name(), status.is_healthy());
                (
                    check.name().to_string(),
                    CheckResult {
                        status,
                        duration_ms: start.elapsed().as_millis() as u64,
                    },
                )
            }
        });

        let checks: BTreeMap<_, _> = join_all(probes).await.into_iter().collect();
        let healthy = checks.values().all(|c| c.status.is_healthy());
        HealthReport {
            status: if healthy { "Healthy" } else { "Unhealthy" },
            checks,
        }
    }
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_CHECK_TIMEOUT)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Check with a fixed outcome.
    pub(crate) struct StaticCheck {
        pub name: &'static str,
        pub healthy: bool,
    }

    #[async_trait]
    impl HealthCheck for StaticCheck {
        fn name(&self) -> &str {
            self.name
        }

        async fn check(&self) -> HealthStatus {
            if self.healthy {
                HealthStatus::Healthy
            } else {
                HealthStatus::unhealthy("down")
            }
        }
    }

    struct SlowCheck;

    #[async_trait]
    impl HealthCheck for SlowCheck {
        fn name(&self) -> &str {
            "slow"
        }

        async fn check(&self) -> HealthStatus {
            tokio::time::sleep(Duration::from_secs(60)).await;
            HealthStatus::Healthy
        }
    }

    #[tokio::test]
    async fn test_empty_registry_is_healthy() {
        let report = HealthRegistry::default().run().await;
        assert!(report.is_healthy());
        assert_eq!(report.status, "Healthy");
    }

    #[tokio::test]
    async fn test_one_failure_makes_report_unhealthy() {
        let registry = HealthRegistry::default()
            .with_check(StaticCheck { name: "a", healthy: true })
            .with_check(StaticCheck { name: "b", healthy: false });

        let report = registry.run().await;
        assert!(!report.is_healthy());
        assert_eq!(report.status, "Unhealthy");
        assert!(report.checks["a"].status.is_healthy());
        assert_eq!(report.checks["b"].status, HealthStatus::unhealthy("down"));
    }

    #[tokio::test]
    async fn test_slow_check_times_out() {
        let registry = HealthRegistry::new(Duration::from_millis(20)).with_check(SlowCheck);

        let report = registry.run().await;
        assert!(!report.checks["slow"].status.is_healthy());
    }

    #[test]
    fn test_report_json_shape() {
        let result = CheckResult {
            status: HealthStatus::unhealthy("refused"),
            duration_ms: 3,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "Unhealthy");
        assert_eq!(json["reason"], "refused");
        assert_eq!(json["durationMs"], 3);
    }
}
