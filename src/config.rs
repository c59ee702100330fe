use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub backend: BackendConfig,
    #[serde(default)]
    pub circuit_breaker: BreakerConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub processor: ProcessorConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Connection settings for the Prometheus-compatible backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    pub url: String,
    /// One of "auto", "prometheus", "mimir". With "auto" the client probes
    /// both URL-prefix conventions on first use.
    #[serde(default = "default_backend_kind")]
    pub kind: String,
    /// One of "none", "basic", "bearer".
    #[serde(default = "default_auth_mode")]
    pub auth_mode: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub bearer_token: String,
    /// Sent as `X-Scope-OrgID` when set (Mimir multi-tenancy).
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default = "default_backend_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BreakerConfig {
    /// Minimum requests in the counting window before the breaker may trip.
    #[serde(default = "default_min_requests")]
    pub min_requests: u32,
    /// Consecutive failures that trip the breaker.
    #[serde(default = "default_consecutive_failures")]
    pub consecutive_failures: u32,
    /// Failure ratio within the window that trips the breaker.
    #[serde(default = "default_failure_ratio")]
    pub failure_ratio: f64,
    /// Length of the rolling counting window.
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    /// How long the breaker stays open before admitting trial calls.
    #[serde(default = "default_open_timeout_seconds")]
    pub open_timeout_seconds: u64,
    /// Trial calls admitted while half-open.
    #[serde(default = "default_half_open_max_calls")]
    pub half_open_max_calls: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            min_requests: default_min_requests(),
            consecutive_failures: default_consecutive_failures(),
            failure_ratio: default_failure_ratio(),
            window_seconds: default_window_seconds(),
            open_timeout_seconds: default_open_timeout_seconds(),
            half_open_max_calls: default_half_open_max_calls(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_discovery_interval")]
    pub interval_seconds: u64,
    /// Label names tried in priority order when resolving the owning service
    /// of a metric.
    #[serde(default = "default_service_labels")]
    pub service_labels: Vec<String>,
    /// Metrics matching any of these regexes are dropped before service
    /// resolution.
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,
    /// When non-empty, only services in these namespaces are kept.
    #[serde(default)]
    pub namespaces: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: default_discovery_interval(),
            service_labels: default_service_labels(),
            exclude_patterns: default_exclude_patterns(),
            namespaces: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SafetyConfig {
    #[serde(default = "default_max_query_length")]
    pub max_query_length: usize,
    /// Case-insensitive regexes matched against the whole query text.
    #[serde(default = "default_forbidden_patterns")]
    pub forbidden_patterns: Vec<String>,
    /// Extra plain substrings rejected case-insensitively.
    #[serde(default)]
    pub custom_forbidden: Vec<String>,
    /// Largest duration literal allowed anywhere in a query.
    #[serde(default = "default_max_range_seconds")]
    pub max_range_seconds: u64,
    #[serde(default = "default_max_nesting_depth")]
    pub max_nesting_depth: usize,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            max_query_length: default_max_query_length(),
            forbidden_patterns: default_forbidden_patterns(),
            custom_forbidden: Vec::new(),
            max_range_seconds: default_max_range_seconds(),
            max_nesting_depth: default_max_nesting_depth(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProcessorConfig {
    /// Instant-vector series returned before truncation kicks in.
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,
    /// Time points kept per range series after downsampling.
    #[serde(default = "default_max_time_points")]
    pub max_time_points: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_samples: default_max_samples(),
            max_time_points: default_max_time_points(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_backend_kind() -> String {
    "auto".to_string()
}

fn default_auth_mode() -> String {
    "none".to_string()
}

fn default_backend_timeout() -> u64 {
    30
}

fn default_min_requests() -> u32 {
    3
}

fn default_consecutive_failures() -> u32 {
    5
}

fn default_failure_ratio() -> f64 {
    0.6
}

fn default_window_seconds() -> u64 {
    60
}

fn default_open_timeout_seconds() -> u64 {
    30
}

fn default_half_open_max_calls() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

fn default_discovery_interval() -> u64 {
    300
}

fn default_service_labels() -> Vec<String> {
    vec![
        "service".to_string(),
        "job".to_string(),
        "app".to_string(),
        "application".to_string(),
    ]
}

fn default_exclude_patterns() -> Vec<String> {
    vec![
        "^go_.*".to_string(),
        "^process_.*".to_string(),
        "^promhttp_.*".to_string(),
        "^scrape_.*".to_string(),
    ]
}

fn default_max_query_length() -> usize {
    2000
}

fn default_forbidden_patterns() -> Vec<String> {
    vec![
        "secret".to_string(),
        "password".to_string(),
        "passwd".to_string(),
        "token".to_string(),
        "credential".to_string(),
        "api_?key".to_string(),
        "private_?key".to_string(),
    ]
}

fn default_max_range_seconds() -> u64 {
    7 * 24 * 3600
}

fn default_max_nesting_depth() -> usize {
    3
}

fn default_max_samples() -> usize {
    50
}

fn default_max_time_points() -> usize {
    100
}

pub fn load_config(path: &std::path::Path) -> anyhow::Result<Config> {
    let config = config::Config::builder()
        .add_source(config::File::from(path.to_path_buf()).required(false))
        .add_source(config::Environment::with_prefix("PROMSAGE").separator("__"))
        .build()?;

    let cfg: Config = config.try_deserialize()?;
    validate_config(&cfg)?;

    Ok(cfg)
}

pub fn validate_config(cfg: &Config) -> anyhow::Result<()> {
    if cfg.backend.url.is_empty() {
        anyhow::bail!("Backend URL must be configured");
    }
    if !cfg.backend.url.starts_with("http://") && !cfg.backend.url.starts_with("https://") {
        anyhow::bail!("Backend URL must start with http:// or https://");
    }

    match cfg.backend.kind.as_str() {
        "auto" | "prometheus" | "mimir" => {}
        other => anyhow::bail!("Invalid backend kind '{}': expected auto, prometheus, or mimir", other),
    }

    match cfg.backend.auth_mode.as_str() {
        "none" => {}
        "basic" => {
            if cfg.backend.username.is_empty() {
                anyhow::bail!("Basic auth requires a username");
            }
        }
        "bearer" => {
            if cfg.backend.bearer_token.is_empty() {
                anyhow::bail!("Bearer auth requires a token");
            }
        }
        other => anyhow::bail!("Invalid auth mode '{}': expected none, basic, or bearer", other),
    }

    if cfg.backend.timeout_seconds == 0 {
        anyhow::bail!("Backend timeout must be greater than zero");
    }

    if cfg.circuit_breaker.failure_ratio <= 0.0 || cfg.circuit_breaker.failure_ratio > 1.0 {
        anyhow::bail!("Circuit breaker failure ratio must be in (0, 1]");
    }

    if cfg.discovery.enabled {
        if cfg.discovery.interval_seconds == 0 {
            anyhow::bail!("Discovery interval must be greater than zero");
        }
        if cfg.discovery.service_labels.is_empty() {
            anyhow::bail!("Discovery requires at least one service label");
        }
    }

    if cfg.processor.max_samples == 0 {
        anyhow::bail!("Processor sample cap must be greater than zero");
    }
    if cfg.processor.max_time_points < 2 {
        anyhow::bail!("Processor time point cap must be at least 2 to keep range endpoints");
    }

    Ok(())
}
