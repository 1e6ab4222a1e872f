use std::sync::Arc;

use axum::{
    Json,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
};
use chrono::{DateTime, Utc};
use member_qa_retrieval::{BuildReport, MatchResult};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

/// Answer returned when no message is relevant enough.
pub const NOT_AVAILABLE: &str = "The information is not available in the member messages.";

/// `GET /ask` query string and `POST /ask` body
#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct AskResponse {
    pub answer: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub records: usize,
    pub model: String,
    pub built_at: Option<DateTime<Utc>>,
}

/// Render a match as the one-line answer string.
pub fn format_answer(result: &MatchResult) -> String {
    match result {
        MatchResult::Found { record, .. } => format!(
            "Member: {} | Timestamp: {} | Message: {}",
            record.identity,
            record.timestamp.to_rfc3339(),
            record.text
        ),
        MatchResult::NotFound => NOT_AVAILABLE.to_string(),
    }
}

async fn answer(state: &AppState, question: &str) -> Result<Json<AskResponse>, ApiError> {
    let question = question.trim();
    if question.is_empty() {
        return Err(ApiError::BadRequest("Question must not be empty".into()));
    }

    let result = state.engine.answer(question).await?;
    if let MatchResult::Found { record, score } = &result {
        info!(record = %record.id, score, "question answered");
    } else {
        info!("question not answered");
    }

    Ok(Json(AskResponse {
        answer: format_answer(&result),
    }))
}

/// GET /ask?question=...
pub async fn ask_get(
    State(state): State<Arc<AppState>>,
    query: Result<Query<AskRequest>, QueryRejection>,
) -> Result<Json<AskResponse>, ApiError> {
    let Query(req) = query?;
    answer(&state, &req.question).await
}

/// POST /ask
pub async fn ask_post(
    State(state): State<Arc<AppState>>,
    body: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<AskResponse>, ApiError> {
    let Json(req) = body?;
    answer(&state, &req.question).await
}

/// GET /health - Health check
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let stats = state.engine.stats().await;
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        records: stats.records,
        model: stats.model,
        built_at: stats.built_at,
    })
}

/// POST /reload - Re-fetch messages and rebuild the index
pub async fn reload(State(state): State<Arc<AppState>>) -> Result<Json<BuildReport>, ApiError> {
    let report = state.reload().await?;
    Ok(Json(report))
}
