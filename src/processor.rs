//! Turns raw query results into bounded, presentable summaries.
//!
//! Callers never consume a raw `QueryResult`: this module caps sample and
//! time-point counts, computes aggregate statistics for range data, and
//! derives visualization hints. Pure functions, safe for unbounded
//! concurrent use.

use crate::backend::{Point, QueryResult, Sample, Series};
use crate::config::ProcessorConfig;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Increasing => "increasing",
            Trend::Decreasing => "decreasing",
            Trend::Stable => "stable",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultStats {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub current: f64,
    pub trend: Trend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Visualization {
    TimeSeries,
    Stat,
    Table,
}

/// What callers consume instead of the raw backend payload.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedResult {
    pub result_kind: &'static str,
    pub samples: Vec<Sample>,
    pub series: Vec<Series>,
    pub stats: Option<ResultStats>,
    pub truncated: bool,
    pub summary: String,
    pub visualization: Option<Visualization>,
    pub recommendations: Vec<String>,
}

/// Series count above which a table view gets an aggregation suggestion.
const BUSY_TABLE_THRESHOLD: usize = 10;

pub fn process(result: &QueryResult, config: &ProcessorConfig) -> ProcessedResult {
    let mut processed = match result {
        QueryResult::Vector(samples) => process_vector(samples, config),
        QueryResult::Matrix(series) => process_matrix(series, config),
        QueryResult::Scalar(sample) => ProcessedResult {
            result_kind: "scalar",
            samples: vec![sample.clone()],
            series: Vec::new(),
            stats: None,
            truncated: false,
            summary: format!("Scalar result: {}", format_value(sample.value)),
            visualization: None,
            recommendations: Vec::new(),
        },
        QueryResult::String { timestamp, value } => ProcessedResult {
            result_kind: "string",
            samples: vec![Sample {
                labels: HashMap::new(),
                value: 0.0,
                timestamp: *timestamp,
            }],
            series: Vec::new(),
            stats: None,
            truncated: false,
            summary: format!("String result: {}", value),
            visualization: None,
            recommendations: Vec::new(),
        },
    };

    let (visualization, recommendations) = derive_visualization(&processed);
    processed.visualization = visualization;
    processed.recommendations = recommendations;
    processed
}

fn process_vector(samples: &[Sample], config: &ProcessorConfig) -> ProcessedResult {
    if samples.is_empty() {
        return ProcessedResult {
            result_kind: "vector",
            samples: Vec::new(),
            series: Vec::new(),
            stats: None,
            truncated: false,
            summary: "No data returned".to_string(),
            visualization: None,
            recommendations: Vec::new(),
        };
    }

    let total = samples.len();
    let values: Vec<f64> = samples.iter().map(|s| s.value).collect();

    let summary = if total == 1 {
        format!("Current value: {}", format_value(values[0]))
    } else {
        let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let sum: f64 = values.iter().sum();
        if total > config.max_samples {
            format!(
                "Showing {} of {} series (min={}, max={}, sum={})",
                config.max_samples,
                total,
                format_value(min),
                format_value(max),
                format_value(sum)
            )
        } else {
            format!(
                "{} series (min={}, max={}, sum={})",
                total,
                format_value(min),
                format_value(max),
                format_value(sum)
            )
        }
    };

    let truncated = total > config.max_samples;
    let kept: Vec<Sample> = samples.iter().take(config.max_samples).cloned().collect();

    ProcessedResult {
        result_kind: "vector",
        samples: kept,
        series: Vec::new(),
        stats: None,
        truncated,
        summary,
        visualization: None,
        recommendations: Vec::new(),
    }
}

fn process_matrix(series: &[Series], config: &ProcessorConfig) -> ProcessedResult {
    let all_points: Vec<Point> = series.iter().flat_map(|s| s.points.iter().copied()).collect();

    if all_points.is_empty() {
        return ProcessedResult {
            result_kind: "matrix",
            samples: Vec::new(),
            series: Vec::new(),
            stats: None,
            truncated: false,
            summary: "No data returned".to_string(),
            visualization: None,
            recommendations: Vec::new(),
        };
    }

    let min = all_points.iter().map(|p| p.value).fold(f64::INFINITY, f64::min);
    let max = all_points
        .iter()
        .map(|p| p.value)
        .fold(f64::NEG_INFINITY, f64::max);
    let avg = all_points.iter().map(|p| p.value).sum::<f64>() / all_points.len() as f64;

    // Trend and current value follow the first series.
    let lead = &series[0].points;
    let (first, last) = (lead.first(), lead.last());
    let trend = match (first, last) {
        (Some(f), Some(l)) => classify_trend(f.value, l.value),
        _ => Trend::Stable,
    };
    let current = last.map(|p| p.value).unwrap_or(0.0);

    let stats = ResultStats {
        min,
        max,
        avg,
        current,
        trend,
    };

    let truncated = series.iter().any(|s| s.points.len() > config.max_time_points);
    let downsampled: Vec<Series> = series
        .iter()
        .map(|s| Series {
            labels: s.labels.clone(),
            points: downsample(&s.points, config.max_time_points),
        })
        .collect();

    let summary = format!(
        "{} series (min={}, max={}, avg={}, trend={})",
        series.len(),
        format_value(min),
        format_value(max),
        format_value(avg),
        trend.as_str()
    );

    ProcessedResult {
        result_kind: "matrix",
        samples: Vec::new(),
        series: downsampled,
        stats: Some(stats),
        truncated,
        summary,
        visualization: None,
        recommendations: Vec::new(),
    }
}

/// Compare first and last values with a ±10% relative threshold, falling
/// back to an absolute ±0.1 threshold when the first value is near zero.
fn classify_trend(first: f64, last: f64) -> Trend {
    if first.abs() < 1e-9 {
        if last - first > 0.1 {
            Trend::Increasing
        } else if first - last > 0.1 {
            Trend::Decreasing
        } else {
            Trend::Stable
        }
    } else {
        let change = (last - first) / first.abs();
        if change > 0.10 {
            Trend::Increasing
        } else if change < -0.10 {
            Trend::Decreasing
        } else {
            Trend::Stable
        }
    }
}

/// Cap a series to `cap` points, keeping the first and last points exactly
/// and choosing evenly spaced interior indices.
fn downsample(points: &[Point], cap: usize) -> Vec<Point> {
    if points.len() <= cap {
        return points.to_vec();
    }
    if cap == 1 {
        return vec![points[0]];
    }

    let last = points.len() - 1;
    (0..cap).map(|i| points[i * last / (cap - 1)]).collect()
}

/// Pure function of result shape: statistics imply a time series; without
/// statistics one series is a single stat and many are a table; zero series
/// yields guidance instead of a visualization type.
fn derive_visualization(processed: &ProcessedResult) -> (Option<Visualization>, Vec<String>) {
    let series_count = match processed.result_kind {
        "matrix" => processed.series.len(),
        _ => processed.samples.len(),
    };

    if series_count == 0 {
        return (
            None,
            vec![
                "No data: check the metric name is spelled correctly".to_string(),
                "No data: widen the time range".to_string(),
                "No data: relax or remove label filters".to_string(),
            ],
        );
    }

    let mut recommendations = Vec::new();

    let visualization = if let Some(stats) = &processed.stats {
        if stats.trend != Trend::Stable {
            recommendations.push(format!(
                "Metric is {}: consider a threshold alert",
                stats.trend.as_str()
            ));
        }
        Visualization::TimeSeries
    } else if series_count == 1 {
        Visualization::Stat
    } else {
        if series_count > BUSY_TABLE_THRESHOLD {
            recommendations
                .push("Many series returned: consider aggregating with sum() by a label".to_string());
        }
        Visualization::Table
    };

    (Some(visualization), recommendations)
}

fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.0}", value)
    } else {
        format!("{:.2}", value)
    }
}
