//! Wire types for the Prometheus-compatible HTTP API.
//!
//! The response envelope carries a `resultType` discriminator; parsing maps
//! it to exactly one `QueryResult` variant. Downstream code only ever sees
//! the tagged variant, never the raw payload.

use crate::error::BackendError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// Top-level response envelope shared by every query endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiResponse {
    pub status: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(rename = "errorType", default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// `data` object for `/query` and `/query_range`.
#[derive(Debug, Deserialize)]
pub(crate) struct QueryData {
    #[serde(rename = "resultType")]
    pub result_type: String,
    pub result: serde_json::Value,
}

/// A single (label-set, value, timestamp) sample from an instant query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub labels: HashMap<String, String>,
    pub value: f64,
    pub timestamp: f64,
}

/// One time point within a range series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub timestamp: f64,
    pub value: f64,
}

/// A labeled series of ordered time points from a range query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub labels: HashMap<String, String>,
    pub points: Vec<Point>,
}

/// Parsed query response. The tag is decided once at parse time.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    Vector(Vec<Sample>),
    Matrix(Vec<Series>),
    Scalar(Sample),
    String { timestamp: f64, value: String },
}

impl QueryResult {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Vector(_) => "vector",
            Self::Matrix(_) => "matrix",
            Self::Scalar(_) => "scalar",
            Self::String { .. } => "string",
        }
    }
}

/// Parse the `data` object of a query response into a tagged result.
pub(crate) fn parse_query_result(data: QueryData) -> Result<QueryResult, BackendError> {
    match data.result_type.as_str() {
        "vector" => Ok(QueryResult::Vector(parse_vector(&data.result)?)),
        "matrix" => Ok(QueryResult::Matrix(parse_matrix(&data.result)?)),
        "scalar" => {
            let (timestamp, value) = parse_value_pair(&data.result)?;
            Ok(QueryResult::Scalar(Sample {
                labels: HashMap::new(),
                value: parse_sample_value(&value),
                timestamp,
            }))
        }
        "string" => {
            let (timestamp, value) = parse_value_pair(&data.result)?;
            Ok(QueryResult::String { timestamp, value })
        }
        other => Err(BackendError::MalformedResponse(format!(
            "unknown resultType '{}'",
            other
        ))),
    }
}

fn parse_vector(result: &serde_json::Value) -> Result<Vec<Sample>, BackendError> {
    let entries = result
        .as_array()
        .ok_or_else(|| BackendError::MalformedResponse("vector result is not an array".into()))?;

    let mut samples = Vec::with_capacity(entries.len());
    for entry in entries {
        let labels = parse_labels(entry.get("metric"));
        let value = entry
            .get("value")
            .ok_or_else(|| BackendError::MalformedResponse("vector sample missing value".into()))?;
        let (timestamp, raw) = parse_value_pair(value)?;
        samples.push(Sample {
            labels,
            value: parse_sample_value(&raw),
            timestamp,
        });
    }
    Ok(samples)
}

fn parse_matrix(result: &serde_json::Value) -> Result<Vec<Series>, BackendError> {
    let entries = result
        .as_array()
        .ok_or_else(|| BackendError::MalformedResponse("matrix result is not an array".into()))?;

    let mut series = Vec::with_capacity(entries.len());
    for entry in entries {
        let labels = parse_labels(entry.get("metric"));
        let values = entry
            .get("values")
            .and_then(|v| v.as_array())
            .ok_or_else(|| BackendError::MalformedResponse("matrix series missing values".into()))?;

        let mut points = Vec::with_capacity(values.len());
        for value in values {
            let (timestamp, raw) = parse_value_pair(value)?;
            points.push(Point {
                timestamp,
                value: parse_sample_value(&raw),
            });
        }
        series.push(Series { labels, points });
    }
    Ok(series)
}

fn parse_labels(metric: Option<&serde_json::Value>) -> HashMap<String, String> {
    metric
        .and_then(|m| m.as_object())
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

/// A Prometheus value is a `[timestamp, "stringified number"]` pair.
fn parse_value_pair(value: &serde_json::Value) -> Result<(f64, String), BackendError> {
    let pair = value
        .as_array()
        .filter(|a| a.len() == 2)
        .ok_or_else(|| BackendError::MalformedResponse("value is not a [ts, value] pair".into()))?;

    let timestamp = pair[0]
        .as_f64()
        .ok_or_else(|| BackendError::MalformedResponse("value timestamp is not a number".into()))?;
    let raw = pair[1]
        .as_str()
        .ok_or_else(|| BackendError::MalformedResponse("sample value is not a string".into()))?
        .to_string();

    Ok((timestamp, raw))
}

/// Numeric sample values arrive as strings. A parse failure must not crash
/// the call: it is logged and the sample defaults to zero.
fn parse_sample_value(raw: &str) -> f64 {
    match raw.parse::<f64>() {
        Ok(v) => v,
        Err(_) => {
            warn!(raw = raw, "unparsable sample value, defaulting to 0");
            0.0
        }
    }
}
