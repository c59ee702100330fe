//! Pre-execution query vetting.
//!
//! A stateless gate applied to every candidate query before it reaches the
//! backend. Checks run in a fixed order and the first violation wins; every
//! rejection carries a category, an explanation, and a remediation
//! suggestion. The validator never rewrites a query.

use crate::config::SafetyConfig;
use crate::error::{SafetyViolation, ViolationKind};
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::warn;

/// Keywords that fan out or scan far more series than they appear to.
const EXPENSIVE_OPERATIONS: &[&str] = &["group_left", "group_right", "absent(", "or vector"];

/// Aggregation operators that collapse series when used without grouping.
const AGGREGATION_OPERATORS: &[&str] = &["sum", "avg", "min", "max", "count", "topk", "bottomk"];

fn duration_literal_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)(ms|s|m|h|d|w|y)\b").expect("static regex"))
}

fn empty_grouping_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(by|without)\s*\(\s*\)").expect("static regex"))
}

fn label_matcher_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"[a-zA-Z_][a-zA-Z0-9_]*\s*(=~|!~|!=|=)\s*""#).expect("static regex")
    })
}

fn grouping_clause_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bby\s*\(([^)]+)\)").expect("static regex"))
}

/// Immutable validation policy, compiled once per instance.
pub struct SafetyPolicy {
    max_query_length: usize,
    forbidden: Vec<Regex>,
    custom_forbidden: Vec<String>,
    max_range: Duration,
    max_nesting_depth: usize,
}

impl SafetyPolicy {
    pub fn from_config(config: &SafetyConfig) -> Self {
        let forbidden = config
            .forbidden_patterns
            .iter()
            .filter_map(|p| match Regex::new(&format!("(?i){}", p)) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(pattern = %p, error = %e, "invalid forbidden pattern, ignoring");
                    None
                }
            })
            .collect();

        Self {
            max_query_length: config.max_query_length,
            forbidden,
            custom_forbidden: config
                .custom_forbidden
                .iter()
                .map(|s| s.to_lowercase())
                .collect(),
            max_range: Duration::from_secs(config.max_range_seconds),
            max_nesting_depth: config.max_nesting_depth,
        }
    }

    /// Vet a candidate query. Checks run in order; the first violation wins.
    pub fn validate(&self, query: &str) -> Result<(), SafetyViolation> {
        self.check_length(query)?;
        self.check_forbidden_patterns(query)?;
        self.check_custom_forbidden(query)?;
        self.check_range(query)?;
        check_empty_grouping(query)?;
        check_expensive_operations(query)?;
        self.check_nesting(query)?;
        Ok(())
    }

    fn check_length(&self, query: &str) -> Result<(), SafetyViolation> {
        if query.len() > self.max_query_length {
            return Err(SafetyViolation {
                kind: ViolationKind::ExcessiveLength,
                message: format!(
                    "query is {} characters, limit is {}",
                    query.len(),
                    self.max_query_length
                ),
                suggestion: "Break the question into smaller queries".to_string(),
            });
        }
        Ok(())
    }

    fn check_forbidden_patterns(&self, query: &str) -> Result<(), SafetyViolation> {
        for pattern in &self.forbidden {
            if pattern.is_match(query) {
                return Err(SafetyViolation {
                    kind: ViolationKind::ForbiddenMetric,
                    message: format!(
                        "query matches forbidden pattern '{}'",
                        pattern.as_str().trim_start_matches("(?i)")
                    ),
                    suggestion: "Sensitive-sounding metrics cannot be queried".to_string(),
                });
            }
        }
        Ok(())
    }

    fn check_custom_forbidden(&self, query: &str) -> Result<(), SafetyViolation> {
        let lowered = query.to_lowercase();
        for needle in &self.custom_forbidden {
            if lowered.contains(needle) {
                return Err(SafetyViolation {
                    kind: ViolationKind::ForbiddenMetric,
                    message: format!("query contains forbidden term '{}'", needle),
                    suggestion: "Remove the forbidden term from the query".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Every duration literal in the query is parsed and compared against
    /// the configured ceiling.
    fn check_range(&self, query: &str) -> Result<(), SafetyViolation> {
        for capture in duration_literal_re().captures_iter(query) {
            let amount: u64 = match capture[1].parse() {
                Ok(n) => n,
                Err(_) => continue, // overflow-sized literal, handled below
            };
            let unit_secs = match &capture[2] {
                "ms" => {
                    // Sub-second literals cannot exceed a day-scale ceiling.
                    continue;
                }
                "s" => 1,
                "m" => 60,
                "h" => 3600,
                "d" => 86_400,
                "w" => 7 * 86_400,
                "y" => 365 * 86_400,
                _ => continue,
            };

            let literal = Duration::from_secs(amount.saturating_mul(unit_secs));
            if literal > self.max_range {
                return Err(SafetyViolation {
                    kind: ViolationKind::ExcessiveRange,
                    message: format!(
                        "duration literal '{}' exceeds the {} second ceiling",
                        &capture[0],
                        self.max_range.as_secs()
                    ),
                    suggestion: "Narrow the time range of the query".to_string(),
                });
            }
        }
        Ok(())
    }

    fn check_nesting(&self, query: &str) -> Result<(), SafetyViolation> {
        let mut depth: usize = 0;
        let mut max_depth: usize = 0;
        for c in query.chars() {
            match c {
                '(' => {
                    depth += 1;
                    max_depth = max_depth.max(depth);
                }
                ')' => depth = depth.saturating_sub(1),
                _ => {}
            }
        }

        if max_depth > self.max_nesting_depth {
            return Err(SafetyViolation {
                kind: ViolationKind::TooManyNested,
                message: format!(
                    "query nests {} levels deep, limit is {}",
                    max_depth, self.max_nesting_depth
                ),
                suggestion: "Simplify the query or split it into steps".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for SafetyPolicy {
    fn default() -> Self {
        Self::from_config(&SafetyConfig::default())
    }
}

fn check_empty_grouping(query: &str) -> Result<(), SafetyViolation> {
    if let Some(m) = empty_grouping_re().find(query) {
        return Err(SafetyViolation {
            kind: ViolationKind::HighCardinality,
            message: format!("empty grouping clause '{}'", m.as_str()),
            suggestion: "Group by at least one label, or drop the clause".to_string(),
        });
    }
    Ok(())
}

fn check_expensive_operations(query: &str) -> Result<(), SafetyViolation> {
    let lowered = query.to_lowercase();
    for op in EXPENSIVE_OPERATIONS {
        if lowered.contains(op) {
            return Err(SafetyViolation {
                kind: ViolationKind::ExpensiveOperation,
                message: format!("query uses the expensive operation '{}'", op.trim_end_matches('(')),
                suggestion: "Rework the query to avoid many-to-many joins and absent checks"
                    .to_string(),
            });
        }
    }
    Ok(())
}

/// Advisory estimate of how many series a query may touch. Never blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct CardinalityEstimate {
    pub estimated_series: u64,
    pub warning: Option<String>,
}

const BASE_SERIES: u64 = 10;
const CARDINALITY_WARN_THRESHOLD: u64 = 10_000;

/// Rough series-count estimate: multiply per label matcher, divide for bare
/// aggregations, multiply again for `by (...)` grouping.
pub fn estimate_cardinality(query: &str) -> CardinalityEstimate {
    let mut estimate = BASE_SERIES;

    for capture in label_matcher_re().captures_iter(query) {
        estimate = estimate.saturating_mul(match &capture[1] {
            "=~" | "!~" | "!=" => 10,
            _ => 2,
        });
    }

    let lowered = query.to_lowercase();
    let grouped_labels: u64 = grouping_clause_re()
        .captures_iter(query)
        .map(|c| c[1].split(',').filter(|l| !l.trim().is_empty()).count() as u64)
        .sum();

    let has_aggregation = AGGREGATION_OPERATORS
        .iter()
        .any(|op| lowered.contains(&format!("{}(", op)) || lowered.contains(&format!("{} (", op)));

    if has_aggregation && grouped_labels == 0 && !lowered.contains("without") {
        estimate = (estimate / 10).max(1);
    } else if grouped_labels > 0 {
        estimate = estimate.saturating_mul(grouped_labels.saturating_mul(5));
    }

    let warning = (estimate > CARDINALITY_WARN_THRESHOLD).then(|| {
        format!(
            "query may touch roughly {} series, consider narrowing label matchers",
            estimate
        )
    });

    CardinalityEstimate {
        estimated_series: estimate,
        warning,
    }
}
