//! Metric type inference from naming conventions.
//!
//! Backends commonly have no registered metadata for ad-hoc or custom
//! metrics. Rather than failing the caller, the type is inferred from the
//! metric name via an ordered rule table. Inference is pure and
//! deterministic.

/// How a rule matches against the metric name.
enum Match {
    Suffix(&'static str),
    Contains(&'static str),
}

/// Ordered inference rules; the first match wins.
const TYPE_RULES: &[(Match, &str)] = &[
    (Match::Suffix("_total"), "counter"),
    (Match::Suffix("_count"), "counter"),
    (Match::Contains("_bucket"), "histogram"),
    (Match::Contains("_histogram"), "histogram"),
    (Match::Contains("_duration"), "histogram"),
    (Match::Contains("_time"), "histogram"),
    (Match::Contains("_latency"), "histogram"),
    (Match::Contains("_summary"), "summary"),
];

/// Infer a metric type from its name. Falls back to `gauge`.
pub fn infer_metric_type(name: &str) -> &'static str {
    for (rule, metric_type) in TYPE_RULES {
        let matched = match rule {
            Match::Suffix(s) => name.ends_with(s),
            Match::Contains(s) => name.contains(s),
        };
        if matched {
            return metric_type;
        }
    }
    "gauge"
}
