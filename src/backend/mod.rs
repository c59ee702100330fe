pub mod client;
pub mod inference;
pub mod types;

pub use client::{BackendKind, MetricMetadata, MetricsClient};
pub use types::{Point, QueryResult, Sample, Series};

use crate::breaker::{CircuitBreaker, CircuitState};
use crate::config::{BackendConfig, BreakerConfig};
use crate::error::BackendError;
use tracing::warn;

/// The metrics backend as the rest of the crate sees it: every client
/// operation gated by the circuit breaker, identically.
pub struct Backend {
    client: MetricsClient,
    breaker: CircuitBreaker,
}

impl Backend {
    pub fn new(backend: &BackendConfig, breaker: &BreakerConfig) -> Self {
        Self {
            client: MetricsClient::new(backend),
            breaker: CircuitBreaker::new("backend", breaker),
        }
    }

    pub async fn query(
        &self,
        expr: &str,
        time: Option<f64>,
    ) -> Result<QueryResult, BackendError> {
        self.breaker
            .execute("query", || self.client.query(expr, time))
            .await
    }

    pub async fn query_range(
        &self,
        expr: &str,
        start: f64,
        end: f64,
        step_secs: u64,
    ) -> Result<QueryResult, BackendError> {
        self.breaker
            .execute("query_range", || {
                self.client.query_range(expr, start, end, step_secs)
            })
            .await
    }

    pub async fn metric_names(&self) -> Result<Vec<String>, BackendError> {
        self.breaker
            .execute("metric_names", || self.client.metric_names())
            .await
    }

    pub async fn label_values(
        &self,
        label: &str,
        matchers: &[String],
    ) -> Result<Vec<String>, BackendError> {
        self.breaker
            .execute("label_values", || self.client.label_values(label, matchers))
            .await
    }

    /// Metadata lookups degrade to the naming heuristic rather than failing
    /// the caller.
    pub async fn metric_metadata(&self, metric: &str) -> MetricMetadata {
        match self
            .breaker
            .execute("metadata", || self.client.metric_metadata(metric))
            .await
        {
            Ok(meta) => meta,
            Err(e) => {
                warn!(metric = metric, error = %e, "metadata lookup failed, inferring type from name");
                MetricMetadata::inferred(metric)
            }
        }
    }

    pub async fn test_connection(&self) -> Result<(), BackendError> {
        self.breaker
            .execute("test_connection", || self.client.test_connection())
            .await
    }

    pub fn breaker_state(&self) -> CircuitState {
        self.breaker.state()
    }
}
