//! Health check service for verifying external dependencies
//!
//! Redis is the only hard dependency of the sync server; when it is down
//! the server keeps running in degraded single-instance mode, which the
//! readiness probe surfaces.

use serde::Serialize;
use std::time::{Duration, Instant};

/// Status of an individual service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    /// Service is healthy and responding
    Healthy,
    /// Service is unhealthy or unreachable
    Unhealthy,
}

/// Result of a single service health check
#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    /// Name of the service
    pub name: &'static str,
    /// Current status
    pub status: ServiceStatus,
    /// Response time in milliseconds (if available)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    /// Error message if unhealthy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServiceHealth {
    /// Create a healthy service result
    pub fn healthy(name: &'static str, response_time: Duration) -> Self {
        Self {
            name,
            status: ServiceStatus::Healthy,
            response_time_ms: Some(response_time.as_millis() as u64),
            error: None,
        }
    }

    /// Create an unhealthy service result
    pub fn unhealthy(name: &'static str, error: impl Into<String>) -> Self {
        Self {
            name,
            status: ServiceStatus::Unhealthy,
            response_time_ms: None,
            error: Some(error.into()),
        }
    }
}

/// Aggregated readiness response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: ServiceStatus,
    pub checks: Vec<ServiceHealth>,
}

impl HealthResponse {
    pub fn is_healthy(&self) -> bool {
        self.status == ServiceStatus::Healthy
    }
}

/// Timeout for an individual dependency check
const CHECK_TIMEOUT: Duration = Duration::from_secs(3);

/// Health check service
#[derive(Debug, Default)]
pub struct HealthService;

impl HealthService {
    pub fn new() -> Self {
        Self
    }

    /// Check all external dependencies
    pub async fn check_all(&self, redis_url: &str) -> HealthResponse {
        let checks = vec![self.check_redis(redis_url).await];

        let status = if checks.iter().all(|c| c.status == ServiceStatus::Healthy) {
            ServiceStatus::Healthy
        } else {
            ServiceStatus::Unhealthy
        };

        HealthResponse { status, checks }
    }

    /// Check Redis connectivity with a PING round trip
    pub async fn check_redis(&self, redis_url: &str) -> ServiceHealth {
        let start = Instant::now();

        let client = match redis::Client::open(redis_url) {
            Ok(client) => client,
            Err(e) => return ServiceHealth::unhealthy("redis", e.to_string()),
        };

        let ping = tokio::time::timeout(CHECK_TIMEOUT, async {
            let mut conn = client.get_multiplexed_async_connection().await?;
            redis::cmd("PING").query_async::<_, String>(&mut conn).await
        })
        .await;

        match ping {
            Ok(Ok(_)) => ServiceHealth::healthy("redis", start.elapsed()),
            Ok(Err(e)) => ServiceHealth::unhealthy("redis", e.to_string()),
            Err(_) => ServiceHealth::unhealthy("redis", "health check timed out"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_health_constructors() {
        let healthy = ServiceHealth::healthy("redis", Duration::from_millis(5));
        assert_eq!(healthy.status, ServiceStatus::Healthy);
        assert!(healthy.error.is_none());

        let unhealthy = ServiceHealth::unhealthy("redis", "connection refused");
        assert_eq!(unhealthy.status, ServiceStatus::Unhealthy);
        assert!(unhealthy.error.unwrap().contains("refused"));
    }

    #[test]
    fn test_health_response_aggregation() {
        let response = HealthResponse {
            status: ServiceStatus::Healthy,
            checks: vec![ServiceHealth::healthy("redis", Duration::from_millis(1))],
        };
        assert!(response.is_healthy());

        let degraded = HealthResponse {
            status: ServiceStatus::Unhealthy,
            checks: vec![ServiceHealth::unhealthy("redis", "down")],
        };
        assert!(!degraded.is_healthy());
    }

    #[tokio::test]
    async fn test_unreachable_redis_is_unhealthy() {
        let service = HealthService::new();
        // Reserved port with nothing listening
        let health = service.check_redis("redis://127.0.0.1:1").await;
        assert_eq!(health.status, ServiceStatus::Unhealthy);
    }
}
