use crate::{
    backend::inference::infer_metric_type,
    backend::types::{parse_query_result, ApiResponse, QueryData, QueryResult},
    config::BackendConfig,
    error::BackendError,
};
use reqwest::Client;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Prometheus exposes the query API under `/api/v1`.
const PROMETHEUS_PREFIX: &str = "/api/v1";
/// Mimir exposes the identical API under `/prometheus/api/v1`.
const MIMIR_PREFIX: &str = "/prometheus/api/v1";

/// Backend vendor selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Auto,
    Prometheus,
    Mimir,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Auto => "auto",
            BackendKind::Prometheus => "prometheus",
            BackendKind::Mimir => "mimir",
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(BackendKind::Auto),
            "prometheus" => Ok(BackendKind::Prometheus),
            "mimir" => Ok(BackendKind::Mimir),
            _ => Err(format!("invalid backend kind: {}", s)),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Authentication applied to every backend request.
#[derive(Debug, Clone)]
enum AuthMode {
    None,
    Basic { username: String, password: String },
    Bearer { token: String },
}

/// Metadata for a single metric, either from the backend or inferred.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricMetadata {
    pub metric_type: String,
    pub help: String,
    /// True when the backend had no registered metadata and the type was
    /// inferred from the metric name.
    pub inferred: bool,
}

impl MetricMetadata {
    pub fn inferred(metric: &str) -> Self {
        Self {
            metric_type: infer_metric_type(metric).to_string(),
            help: String::new(),
            inferred: true,
        }
    }
}

/// Uniform query/label/metadata client for Prometheus-compatible backends.
///
/// Stateless beyond the cached prefix decision: safe for unlimited
/// concurrent callers. The API path prefix is decided once, lazily on first
/// use (or eagerly from the configured kind), and never re-evaluated.
pub struct MetricsClient {
    http: Client,
    base_url: String,
    kind: BackendKind,
    auth: AuthMode,
    tenant_id: Option<String>,
    timeout: Duration,
    prefix: OnceCell<&'static str>,
}

impl MetricsClient {
    pub fn new(config: &BackendConfig) -> Self {
        let auth = match config.auth_mode.as_str() {
            "basic" => AuthMode::Basic {
                username: config.username.clone(),
                password: config.password.clone(),
            },
            "bearer" => AuthMode::Bearer {
                token: config.bearer_token.clone(),
            },
            _ => AuthMode::None,
        };

        let kind = config.kind.parse().unwrap_or(BackendKind::Auto);

        Self {
            http: Client::new(),
            base_url: config.url.trim_end_matches('/').to_string(),
            kind,
            auth,
            tenant_id: config.tenant_id.clone(),
            timeout: Duration::from_secs(config.timeout_seconds),
            prefix: OnceCell::new(),
        }
    }

    /// Execute an instant query at an optional evaluation timestamp.
    pub async fn query(
        &self,
        expr: &str,
        time: Option<f64>,
    ) -> Result<QueryResult, BackendError> {
        let mut params = vec![("query".to_string(), expr.to_string())];
        if let Some(t) = time {
            params.push(("time".to_string(), t.to_string()));
        }

        let data = self.get_envelope("/query", &params).await?;
        parse_query_data(data)
    }

    /// Execute a range query with an integer step in seconds.
    pub async fn query_range(
        &self,
        expr: &str,
        start: f64,
        end: f64,
        step_secs: u64,
    ) -> Result<QueryResult, BackendError> {
        let params = vec![
            ("query".to_string(), expr.to_string()),
            ("start".to_string(), start.to_string()),
            ("end".to_string(), end.to_string()),
            ("step".to_string(), step_secs.to_string()),
        ];

        let data = self.get_envelope("/query_range", &params).await?;
        parse_query_data(data)
    }

    /// Fetch the complete metric-name catalog.
    pub async fn metric_names(&self) -> Result<Vec<String>, BackendError> {
        self.label_values("__name__", &[]).await
    }

    /// Fetch the values of a label, optionally scoped by series matchers.
    pub async fn label_values(
        &self,
        label: &str,
        matchers: &[String],
    ) -> Result<Vec<String>, BackendError> {
        let params: Vec<(String, String)> = matchers
            .iter()
            .map(|m| ("match[]".to_string(), m.clone()))
            .collect();

        let data = self
            .get_envelope(&format!("/label/{}/values", label), &params)
            .await?;

        serde_json::from_value(data).map_err(|e| {
            BackendError::MalformedResponse(format!("label values are not a string array: {}", e))
        })
    }

    /// Fetch metadata for a metric. When the backend has none registered
    /// (common for ad-hoc/custom metrics) the type is inferred from the
    /// naming convention instead. Transport errors still surface; the
    /// `Backend` facade degrades those to inference as well.
    pub async fn metric_metadata(&self, metric: &str) -> Result<MetricMetadata, BackendError> {
        let params = vec![("metric".to_string(), metric.to_string())];
        let data = self.get_envelope("/metadata", &params).await?;

        let entry = data
            .get(metric)
            .and_then(|v| v.as_array())
            .and_then(|a| a.first())
            .cloned();

        if let Some(entry) = entry {
            let metric_type = entry
                .get("type")
                .and_then(|t| t.as_str())
                .unwrap_or("unknown")
                .to_string();
            let help = entry
                .get("help")
                .and_then(|h| h.as_str())
                .unwrap_or_default()
                .to_string();
            return Ok(MetricMetadata {
                metric_type,
                help,
                inferred: false,
            });
        }

        debug!(metric = metric, "no registered metadata, inferring type from name");
        Ok(MetricMetadata::inferred(metric))
    }

    /// Verify the backend answers a trivial query.
    pub async fn test_connection(&self) -> Result<(), BackendError> {
        self.query("vector(1)", None).await.map(|_| ())
    }

    /// The resolved API prefix, deciding it on first use.
    async fn prefix(&self) -> Result<&'static str, BackendError> {
        self.prefix
            .get_or_try_init(|| async {
                match self.kind {
                    BackendKind::Prometheus => Ok(PROMETHEUS_PREFIX),
                    BackendKind::Mimir => Ok(MIMIR_PREFIX),
                    BackendKind::Auto => self.detect_prefix().await,
                }
            })
            .await
            .copied()
    }

    /// Probe both known path conventions with a lightweight test query.
    /// Whichever responds without a 404 or 5xx wins; both vendors expose the
    /// identical PromQL contract under their respective namespaces.
    async fn detect_prefix(&self) -> Result<&'static str, BackendError> {
        for candidate in [PROMETHEUS_PREFIX, MIMIR_PREFIX] {
            let url = format!("{}{}/query", self.base_url, candidate);
            let request = self
                .apply_auth(self.http.get(&url))
                .query(&[("query", "vector(1)")])
                .timeout(self.timeout);

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status != reqwest::StatusCode::NOT_FOUND && !status.is_server_error() {
                        info!(prefix = candidate, "detected backend API prefix");
                        return Ok(candidate);
                    }
                    debug!(prefix = candidate, status = %status, "prefix probe rejected");
                }
                Err(e) => {
                    debug!(prefix = candidate, error = %e, "prefix probe failed");
                }
            }
        }

        Err(BackendError::Connectivity(format!(
            "no known API prefix responded at {}",
            self.base_url
        )))
    }

    fn apply_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = match &self.auth {
            AuthMode::None => request,
            AuthMode::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
            AuthMode::Bearer { token } => request.bearer_auth(token),
        };

        match &self.tenant_id {
            Some(tenant) => request.header("X-Scope-OrgID", tenant),
            None => request,
        }
    }

    /// Issue a GET against the resolved prefix and unwrap the response
    /// envelope, returning its `data` payload.
    async fn get_envelope(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> Result<serde_json::Value, BackendError> {
        let prefix = self.prefix().await?;
        let url = format!("{}{}{}", self.base_url, prefix, path);

        debug!(url = %url, "backend request");

        let response = self
            .apply_auth(self.http.get(&url))
            .query(params)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::HttpStatus { status, body });
        }

        let envelope: ApiResponse = response.json().await?;

        if envelope.status != "success" {
            return Err(BackendError::MalformedResponse(format!(
                "backend reported {}: {}",
                envelope.error_type.unwrap_or_else(|| "error".to_string()),
                envelope.error.unwrap_or_default()
            )));
        }

        if !envelope.warnings.is_empty() {
            warn!(warnings = ?envelope.warnings, "backend returned warnings");
        }

        envelope
            .data
            .ok_or_else(|| BackendError::MalformedResponse("envelope has no data".into()))
    }
}

fn parse_query_data(data: serde_json::Value) -> Result<QueryResult, BackendError> {
    let data: QueryData = serde_json::from_value(data)
        .map_err(|e| BackendError::MalformedResponse(format!("bad query data: {}", e)))?;
    parse_query_result(data)
}
