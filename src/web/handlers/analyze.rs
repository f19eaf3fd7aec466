// POST /api/analyze: run the full pipeline on the request's texts.
//
// Request:  {"topics": [..], "opinions": [..]}
// Response: {"opinions": [{text, topic, type}],
//            "topics": [{topic_name, summary, effectiveness}]}
//
// Returns 422 when no topic survives normalization, 503 when the worker
// pool has shut down. Failed batches are not an error: the response simply
// carries fewer records.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::PipelineError;
use crate::models::{AnalysisReport, ClassifiedComment, Conclusion, Effectiveness};
use crate::web::{api_error, AppState};

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub topics: Vec<String>,
    pub opinions: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TopicConclusion {
    pub topic_name: String,
    pub summary: String,
    pub effectiveness: Effectiveness,
}

impl From<Conclusion> for TopicConclusion {
    fn from(c: Conclusion) -> Self {
        Self {
            topic_name: c.topic,
            summary: c.summary,
            effectiveness: c.effectiveness,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub opinions: Vec<ClassifiedComment>,
    pub topics: Vec<TopicConclusion>,
}

impl From<AnalysisReport> for AnalyzeResponse {
    fn from(report: AnalysisReport) -> Self {
        Self {
            opinions: report.comments,
            topics: report.conclusions.into_iter().map(Into::into).collect(),
        }
    }
}

pub async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Response {
    let Ok(_permit) = state.workers.acquire().await else {
        return api_error(StatusCode::SERVICE_UNAVAILABLE, "Service is shutting down");
    };

    info!(
        topics = request.topics.len(),
        opinions = request.opinions.len(),
        "Analysis request received"
    );

    match state
        .orchestrator
        .run(&request.topics, &request.opinions)
        .await
    {
        Ok(report) => Json(AnalyzeResponse::from(report)).into_response(),
        Err(e) => {
            error!(error = %e, "Analysis request failed");
            api_error(status_for(&e), &e.to_string())
        }
    }
}

fn status_for(error: &PipelineError) -> StatusCode {
    match error {
        PipelineError::NoTopics | PipelineError::Source { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        PipelineError::Scoring(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    #[test]
    fn test_response_shape() {
        let report = AnalysisReport {
            comments: vec![ClassifiedComment {
                text: "rising temperature fact".to_string(),
                topic: "climate change".to_string(),
                role: Role::Claim,
            }],
            conclusions: vec![Conclusion {
                topic: "climate change".to_string(),
                effectiveness: Effectiveness::Effective,
                summary: "temperatures are rising".to_string(),
            }],
            ..Default::default()
        };

        let json = serde_json::to_value(AnalyzeResponse::from(report)).unwrap();
        assert_eq!(json["opinions"][0]["type"], "Claim");
        assert_eq!(json["topics"][0]["topic_name"], "climate change");
        assert_eq!(json["topics"][0]["effectiveness"], "Effective");
        assert!(json.get("failed_batches").is_none());
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(status_for(&PipelineError::NoTopics), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            status_for(&PipelineError::Scoring(crate::error::ScoreError::NotASequence)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
