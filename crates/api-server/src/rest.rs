//! REST handlers for event ingestion, recommendations, and operational
//! endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use learn_core::error::LearnError;
use learn_core::types::{BatchReceipt, EventRecord, RecommendationSet};
use learn_mastery::MasterySnapshot;
use learn_pipeline::UpdateEngine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, warn};

/// Maximum number of events per ingestion batch.
const MAX_BATCH_EVENTS: usize = 1000;

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<UpdateEngine>,
    pub node_id: String,
    pub start_time: Instant,
}

#[derive(Debug, Deserialize)]
pub struct EventBatch {
    pub events: Vec<EventRecord>,
}

#[derive(Debug, Deserialize)]
pub struct ContextQuery {
    pub context_id: String,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
}

#[derive(Serialize)]
pub struct NextActionResponse {
    pub action_label: String,
    pub estimated_value: f64,
    pub explored: bool,
}

fn validate_batch(batch: &EventBatch) -> Result<(), &'static str> {
    if batch.events.is_empty() {
        return Err("batch must contain at least one event");
    }
    if batch.events.len() > MAX_BATCH_EVENTS {
        return Err("batch exceeds maximum number of events");
    }
    Ok(())
}

/// POST /v1/events — batch ingestion endpoint. Acknowledges immediately;
/// model updates run in the background.
pub async fn ingest_events(
    State(state): State<AppState>,
    Json(batch): Json<EventBatch>,
) -> Result<(StatusCode, Json<BatchReceipt>), (StatusCode, Json<ErrorResponse>)> {
    if let Err(msg) = validate_batch(&batch) {
        warn!(error = msg, "Event batch validation failed");
        metrics::counter!("api.validation_errors").increment(1);
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "invalid_batch".to_string(),
                message: msg.to_string(),
            }),
        ));
    }

    match state.engine.ingest(&batch.events) {
        Ok(receipt) => Ok((StatusCode::ACCEPTED, Json(receipt))),
        Err(LearnError::Backpressure) => {
            metrics::counter!("api.backpressure").increment(1);
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    error: "backpressure".to_string(),
                    message: "update queue is full; retry with backoff".to_string(),
                }),
            ))
        }
        Err(e) => {
            error!(error = %e, "Event ingestion failed");
            metrics::counter!("api.errors").increment(1);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "ingestion_failed".to_string(),
                    message: "Internal processing error".to_string(),
                }),
            ))
        }
    }
}

/// GET /v1/recommendations/{learner_id}?context_id= — ordered top-k
/// recommendations for a (learner, context) pair.
pub async fn get_recommendations(
    State(state): State<AppState>,
    Path(learner_id): Path<String>,
    Query(query): Query<ContextQuery>,
) -> Result<Json<RecommendationSet>, (StatusCode, Json<ErrorResponse>)> {
    match state
        .engine
        .recommendations(&learner_id, &query.context_id)
        .await
    {
        Ok(set) => Ok(Json(set)),
        Err(e) => {
            error!(error = %e, learner_id = %learner_id, "Recommendation lookup failed");
            metrics::counter!("api.errors").increment(1);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "recommendation_lookup_failed".to_string(),
                    message: "Internal processing error".to_string(),
                }),
            ))
        }
    }
}

/// GET /v1/learners/{learner_id}/mastery — mastery snapshot with the
/// predicted assessment outcome, for the serving side's explanations.
pub async fn get_mastery(
    State(state): State<AppState>,
    Path(learner_id): Path<String>,
) -> Result<Json<MasterySnapshot>, (StatusCode, Json<ErrorResponse>)> {
    match state.engine.mastery().snapshot(&learner_id) {
        Some(snapshot) => Ok(Json(snapshot)),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "unknown_learner".to_string(),
                message: format!("no mastery profile for learner '{learner_id}'"),
            }),
        )),
    }
}

/// GET /v1/learners/{learner_id}/next_action?context_id= — one
/// epsilon-greedy selection against the learner's current state.
pub async fn get_next_action(
    State(state): State<AppState>,
    Path(learner_id): Path<String>,
    Query(query): Query<ContextQuery>,
) -> Result<Json<NextActionResponse>, (StatusCode, Json<ErrorResponse>)> {
    match state
        .engine
        .select_next_action(&learner_id, &query.context_id)
        .await
    {
        Ok(Some(selected)) => Ok(Json(NextActionResponse {
            action_label: selected.action.label(),
            estimated_value: selected.estimate,
            explored: selected.explored,
        })),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "unknown_learner".to_string(),
                message: format!("no state for learner '{learner_id}'"),
            }),
        )),
        Err(e) => {
            error!(error = %e, learner_id = %learner_id, "Next-action lookup failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "next_action_failed".to_string(),
                    message: "Internal processing error".to_string(),
                }),
            ))
        }
    }
}

/// GET /health — Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /ready — Readiness probe. Degrades while persistence is failing.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    if state.engine.is_degraded() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    }
}

/// GET /live — Liveness probe.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_batches_are_rejected() {
        let batch = EventBatch { events: Vec::new() };
        assert!(validate_batch(&batch).is_err());
    }

    #[test]
    fn oversized_batches_are_rejected() {
        let record = EventRecord {
            learner_id: Some("l-1".to_string()),
            context_id: Some("course-101".to_string()),
            action_label: Some("view_content".to_string()),
            timestamp: Some(chrono::Utc::now()),
            module_index: None,
            progress: None,
            score: None,
            success: None,
            segment: None,
            skill_scores: Default::default(),
        };
        let batch = EventBatch {
            events: vec![record; MAX_BATCH_EVENTS + 1],
        };
        assert!(validate_batch(&batch).is_err());
    }
}
