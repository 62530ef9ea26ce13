use std::sync::Arc;

use super::ai_service::{ExplanationModel, VisionModel};
use super::credentials::{self, CredentialConfig};
use super::encoding::{self, RawImage};
use crate::models::{AnalysisError, AnalysisOutcome};

/// Image → vision estimate → explanation, one request at a time.
///
/// Credentials and image format are checked before any network call. A failed estimate ends
/// the run; a failed explanation is kept in the outcome next to the estimate.
pub struct CaloriePipeline {
    credentials: CredentialConfig,
    vision: Arc<dyn VisionModel>,
    explainer: Arc<dyn ExplanationModel>,
}

impl CaloriePipeline {
    pub fn new(
        credentials: CredentialConfig,
        vision: Arc<dyn VisionModel>,
        explainer: Arc<dyn ExplanationModel>,
    ) -> Self {
        Self {
            credentials,
            vision,
            explainer,
        }
    }

    pub async fn analyze(&self, input: RawImage<'_>) -> Result<AnalysisOutcome, AnalysisError> {
        let credential = credentials::resolve(&self.credentials)?;
        let image = encoding::normalize(input)?;

        log::info!("📸 Starting calorie estimate for {} image", image.format());

        let estimate = self.vision.estimate(&image, &credential).await?;
        match estimate.total_calories() {
            Some(total) => log::info!(
                "✅ Estimated {} items, {:.0} kcal total",
                estimate.items().len(),
                total
            ),
            None => log::info!("✅ Received free-text estimate"),
        }

        let explanation = self.explainer.explain(&estimate, &credential).await;
        if let Err(e) = &explanation {
            log::error!("❌ Explanation failed, returning estimate only: {}", e);
        }

        Ok(AnalysisOutcome {
            estimate,
            explanation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ApiError, EncodedImage, Explanation, VisionEstimate};
    use crate::services::credentials::ApiCredential;
    use crate::services::gemini::{GeminiClient, GeminiSettings};
    use httpmock::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const JPEG_URL: &str = "data:image/jpeg;base64,/9j/4AAQSkZJRvs=";
    const VISION_PATH: &str = "/v1beta/models/vision-model:generateContent";
    const TEXT_PATH: &str = "/v1beta/models/text-model:generateContent";

    fn gemini_for(server: &MockServer) -> Arc<GeminiClient> {
        Arc::new(GeminiClient::new(
            GeminiSettings {
                base_url: server.base_url(),
                vision_model: "vision-model".to_string(),
                text_model: "text-model".to_string(),
                ..GeminiSettings::default()
            },
            reqwest::Client::new(),
        ))
    }

    fn pipeline_for(server: &MockServer, credentials: CredentialConfig) -> CaloriePipeline {
        let gemini = gemini_for(server);
        CaloriePipeline::new(credentials, gemini.clone(), gemini)
    }

    fn api_key() -> CredentialConfig {
        CredentialConfig::ApiKey("test-key".to_string())
    }

    fn gemini_text_body(text: &str) -> serde_json::Value {
        serde_json::json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] })
    }

    struct CountingVision {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl VisionModel for CountingVision {
        async fn estimate(
            &self,
            _image: &EncodedImage,
            _credential: &ApiCredential,
        ) -> Result<VisionEstimate, AnalysisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(VisionEstimate::Text("toast".to_string()))
        }
    }

    #[async_trait::async_trait]
    impl ExplanationModel for CountingVision {
        async fn explain(
            &self,
            _estimate: &VisionEstimate,
            _credential: &ApiCredential,
        ) -> Result<Explanation, AnalysisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Explanation("toast".to_string()))
        }
    }

    #[tokio::test]
    async fn test_missing_credential_makes_no_calls() {
        let server = MockServer::start_async().await;
        let any_call = server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200).json_body(gemini_text_body("{\"items\":[]}"));
            })
            .await;

        let pipeline = pipeline_for(&server, CredentialConfig::Missing);
        let err = pipeline.analyze(RawImage::DataUrl(JPEG_URL)).await.unwrap_err();

        assert!(matches!(err, AnalysisError::MissingCredential));
        any_call.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn test_invalid_input_never_reaches_models() {
        let fake = Arc::new(CountingVision {
            calls: AtomicUsize::new(0),
        });
        let pipeline = CaloriePipeline::new(api_key(), fake.clone(), fake.clone());

        let err = pipeline
            .analyze(RawImage::DataUrl("data:image/gif;base64,R0lGODlh"))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidFormat(_)));

        let err = pipeline
            .analyze(RawImage::DataUrl("data:image/jpeg;base64,R0lGODlh"))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::UnsupportedImageFormat));

        let err = CaloriePipeline::new(
            CredentialConfig::ServiceAccount("{oops".to_string()),
            fake.clone(),
            fake.clone(),
        )
        .analyze(RawImage::DataUrl(JPEG_URL))
        .await
        .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidCredential(_)));

        assert_eq!(fake.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_full_pipeline() {
        let server = MockServer::start_async().await;
        let vision_mock = server
            .mock_async(|when, then| {
                when.method(POST).path(VISION_PATH);
                then.status(200).json_body(gemini_text_body(
                    r#"{"items":[{"name":"rice","calories":250},{"name":"miso soup","calories":80}]}"#,
                ));
            })
            .await;
        let text_mock = server
            .mock_async(|when, then| {
                when.method(POST).path(TEXT_PATH).body_contains("rice");
                then.status(200).json_body(gemini_text_body("合計は330kcalです。"));
            })
            .await;

        let outcome = pipeline_for(&server, api_key())
            .analyze(RawImage::DataUrl(JPEG_URL))
            .await
            .unwrap();

        assert_eq!(outcome.estimate.total_calories(), Some(330.0));
        assert_eq!(outcome.explanation.unwrap().text(), "合計は330kcalです。");
        vision_mock.assert_hits_async(1).await;
        text_mock.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_vision_failure_skips_explanation() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(VISION_PATH);
                then.status(400).body(
                    r#"{"error":{"code":400,"status":"INVALID_ARGUMENT","message":"bad image"}}"#,
                );
            })
            .await;
        let text_mock = server
            .mock_async(|when, then| {
                when.method(POST).path(TEXT_PATH);
                then.status(200).json_body(gemini_text_body("unused"));
            })
            .await;

        let err = pipeline_for(&server, api_key())
            .analyze(RawImage::DataUrl(JPEG_URL))
            .await
            .unwrap_err();

        match err {
            AnalysisError::Api(api) => {
                assert_eq!(api.status(), Some(400));
                assert_eq!(api.message(), "bad image");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        text_mock.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn test_explanation_failure_keeps_estimate() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(VISION_PATH);
                then.status(200).json_body(gemini_text_body(
                    r#"{"items":[{"name":"rice","calories":250}]}"#,
                ));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(TEXT_PATH);
                then.status(500).json_body(serde_json::json!({
                    "error": { "code": 500, "status": "INTERNAL", "message": "model overloaded" }
                }));
            })
            .await;

        let outcome = pipeline_for(&server, api_key())
            .analyze(RawImage::DataUrl(JPEG_URL))
            .await
            .unwrap();

        assert_eq!(outcome.estimate.total_calories(), Some(250.0));
        match outcome.explanation {
            Err(AnalysisError::Api(ApiError::Status { status, message, .. })) => {
                assert_eq!(status, 500);
                assert_eq!(message, "model overloaded");
            }
            other => panic!("expected explanation error, got {:?}", other),
        }
    }
}
