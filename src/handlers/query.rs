use crate::{
    error::AppError,
    handlers::AppState,
    processor::{process, ProcessedResult},
    safety::estimate_cardinality,
};
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const DEFAULT_STEP_SECONDS: u64 = 60;

/// A candidate PromQL query to validate and execute. The query text is
/// opaque here; upstream generation is someone else's problem.
#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    /// Evaluation timestamp for instant queries (unix seconds).
    #[serde(default)]
    pub time: Option<f64>,
    /// Presence of both start and end selects a range query.
    #[serde(default)]
    pub start: Option<f64>,
    #[serde(default)]
    pub end: Option<f64>,
    #[serde(default)]
    pub step_seconds: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub query: String,
    pub result: ProcessedResult,
    pub estimated_series: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cardinality_warning: Option<String>,
}

/// Validate a candidate query, execute it through the breaker-wrapped
/// backend, and return the bounded, processed result.
pub async fn handle_query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, AppError> {
    if let Err(violation) = state.policy.validate(&request.query) {
        crate::metrics::record_query_rejection(violation.kind.as_str());
        info!(
            kind = violation.kind.as_str(),
            query = %request.query,
            "query rejected by safety validator"
        );
        return Err(AppError::Validation(violation));
    }

    let estimate = estimate_cardinality(&request.query);
    if let Some(warning) = &estimate.warning {
        // Advisory only: logged and surfaced, never a block.
        warn!(query = %request.query, "{}", warning);
    }

    let result = match (request.start, request.end) {
        (Some(start), Some(end)) => {
            let step = request.step_seconds.unwrap_or(DEFAULT_STEP_SECONDS);
            state
                .backend
                .query_range(&request.query, start, end, step)
                .await?
        }
        _ => state.backend.query(&request.query, request.time).await?,
    };

    let processed = process(&result, &state.processor);

    Ok(Json(QueryResponse {
        query: request.query,
        result: processed,
        estimated_series: estimate.estimated_series,
        cardinality_warning: estimate.warning,
    }))
}
