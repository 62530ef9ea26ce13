use serde::{Deserialize, Serialize};

use crate::models::{AnalysisError, AnalysisOutcome, FoodItem, VisionEstimate};
use crate::services::encoding::RawImage;
use crate::services::CaloriePipeline;

/// `POST /analyze` body
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    /// Data URL, e.g. `data:image/jpeg;base64,...`
    pub image: String,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub items: Vec<FoodItem>,
    pub total_calories: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reported_total_calories: Option<f64>,
    /// Raw model answer when it could not be read as item JSON
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimate_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation_error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl From<AnalysisOutcome> for AnalyzeResponse {
    fn from(outcome: AnalysisOutcome) -> Self {
        let total_calories = outcome.estimate.total_calories();
        let (items, reported_total_calories, estimate_text) = match outcome.estimate {
            VisionEstimate::Structured {
                items,
                reported_total,
                ..
            } => (items, reported_total, None),
            VisionEstimate::Text(text) => (Vec::new(), None, Some(text)),
        };

        let (explanation, explanation_error) = match outcome.explanation {
            Ok(explanation) => (Some(explanation.0), None),
            Err(e) => (None, Some(e.to_string())),
        };

        Self {
            items,
            total_calories,
            reported_total_calories,
            estimate_text,
            explanation,
            explanation_error,
        }
    }
}

/// Run one analysis for a raw `/analyze` request body
pub async fn handle_analyze_request(
    pipeline: &CaloriePipeline,
    body: &[u8],
) -> Result<AnalyzeResponse, AnalysisError> {
    let request: AnalyzeRequest = serde_json::from_slice(body).map_err(|e| {
        AnalysisError::InvalidRequest(format!(
            "body must be {{\"image\": \"<data URL>\"}}: {}",
            e
        ))
    })?;

    let outcome = pipeline.analyze(RawImage::DataUrl(&request.image)).await?;
    Ok(outcome.into())
}

// Axum integration
#[cfg(feature = "web-server")]
pub mod server {
    use super::*;
    use axum::{
        body::Bytes,
        extract::{rejection::BytesRejection, DefaultBodyLimit, State},
        http::StatusCode,
        response::{IntoResponse, Response},
        routing::{get, post},
        Json, Router,
    };
    use std::sync::Arc;

    pub struct AppState {
        pub pipeline: Arc<CaloriePipeline>,
        pub max_body_bytes: usize,
    }

    pub fn create_router(pipeline: Arc<CaloriePipeline>, max_body_bytes: usize) -> Router {
        let state = Arc::new(AppState {
            pipeline,
            max_body_bytes,
        });

        // Oversized bodies reach the handler as a `BytesRejection`
        Router::new()
            .route("/", get(root_handler))
            .route("/analyze", post(analyze_handler))
            .route("/health", get(health_check))
            .layer(DefaultBodyLimit::max(max_body_bytes))
            .with_state(state)
    }

    async fn analyze_handler(
        State(state): State<Arc<AppState>>,
        body: Result<Bytes, BytesRejection>,
    ) -> Response {
        let result = match body {
            Ok(body) => {
                log::info!("🔔 Analyze request received ({} bytes)", body.len());
                handle_analyze_request(&state.pipeline, &body).await
            }
            Err(rejection) => Err(body_rejection_error(&rejection, state.max_body_bytes)),
        };

        match result {
            Ok(response) => {
                log::info!("✅ Analyze request completed");
                (StatusCode::OK, Json(response)).into_response()
            }
            Err(e) => {
                log::error!("❌ Analyze request failed: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse {
                        error: e.to_string(),
                    }),
                )
                    .into_response()
            }
        }
    }

    fn body_rejection_error(rejection: &BytesRejection, max_body_bytes: usize) -> AnalysisError {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AnalysisError::InvalidRequest(format!(
                "body exceeds the {} byte limit",
                max_body_bytes
            ))
        } else {
            AnalysisError::InvalidRequest(rejection.body_text())
        }
    }

    async fn root_handler() -> &'static str {
        "Calorie Camera - POST a photo as {\"image\": \"data:image/jpeg;base64,...\"} to /analyze"
    }

    async fn health_check() -> &'static str {
        "OK"
    }

}
