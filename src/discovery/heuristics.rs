//! Lexical service-name inference for metrics that carry no service label.
//!
//! The fallback when no configured label yields a value: guess the owning
//! service from the metric name itself, rejecting tokens from a fixed
//! generic vocabulary so `http_requests_total` does not become a service
//! called "http".

/// Tokens that describe what a metric measures, never who owns it.
const GENERIC_VOCABULARY: &[&str] = &[
    "http", "https", "grpc", "tcp", "udp", "api", "rpc", "web", "cpu", "memory", "mem", "disk",
    "network", "net", "node", "host", "system", "process", "go", "jvm", "up", "error", "errors",
    "request", "requests", "response", "responses", "total", "count", "sum", "avg", "max", "min",
    "bucket", "gauge", "counter", "histogram", "summary", "duration", "time", "latency", "seconds",
    "milliseconds", "bytes", "info", "build", "version", "active", "current", "queue", "cache",
];

/// Infer an owning service from a metric name.
///
/// Candidates are tried in order: the leading underscore-delimited token,
/// then the token preceding a `_total`/`_count` suffix. The first candidate
/// outside the generic vocabulary wins; if only stop-words remain the metric
/// is attributed to no service.
pub fn service_from_metric_name(metric: &str) -> Option<String> {
    let tokens: Vec<&str> = metric.split('_').filter(|t| !t.is_empty()).collect();
    if tokens.is_empty() {
        return None;
    }

    let mut candidates = vec![tokens[0]];
    if matches!(tokens.last(), Some(&"total") | Some(&"count")) && tokens.len() >= 2 {
        candidates.push(tokens[tokens.len() - 2]);
    }

    candidates
        .into_iter()
        .find(|c| !is_generic(c))
        .map(|c| c.to_lowercase())
}

fn is_generic(token: &str) -> bool {
    let token = token.to_lowercase();
    GENERIC_VOCABULARY.contains(&token.as_str())
}
