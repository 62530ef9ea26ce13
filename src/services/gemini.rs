use serde::{Deserialize, Serialize};

use super::ai_service::{ExplanationModel, VisionModel};
use super::credentials::ApiCredential;
use crate::models::{AnalysisError, ApiError, EncodedImage, Explanation, VisionEstimate};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

const VISION_PROMPT: &str = "You are a nutrition analyst. Look carefully at this photo of a meal.\n\
    \n\
    1. Identify every visible food item and drink.\n\
    2. Infer how each item was prepared (grilled, fried, boiled, raw, ...).\n\
    3. Estimate the portion of each item from its visual size.\n\
    4. Estimate the calories of each item and the total for the whole meal.\n\
    \n\
    Answer with JSON only, no prose, in exactly this shape:\n\
    {\"items\": [{\"name\": \"<dish name>\", \"calories\": <number>, \"cooking_method\": \"<method>\", \"portion\": \"<estimated portion>\"}], \"total_calories\": <number>}";

/// Optional sampling bounds sent as `generationConfig`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
}

impl GenerationOptions {
    pub fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.top_p.is_none() && self.top_k.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct GeminiSettings {
    pub base_url: String,
    pub vision_model: String,
    pub text_model: String,
    pub generation: GenerationOptions,
    /// Language the explanation is written in
    pub explanation_language: String,
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            vision_model: DEFAULT_MODEL.to_string(),
            text_model: DEFAULT_MODEL.to_string(),
            generation: GenerationOptions::default(),
            explanation_language: "Japanese".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<&'a GenerationOptions>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData<'a>,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

/// Client for Gemini `generateContent`, serving both the vision and the explanation call
pub struct GeminiClient {
    settings: GeminiSettings,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(settings: GeminiSettings, client: reqwest::Client) -> Self {
        Self { settings, client }
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.settings.base_url.trim_end_matches('/'),
            model
        )
    }

    fn vision_request<'a>(&'a self, image: &'a EncodedImage) -> GenerateContentRequest<'a> {
        GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Text {
                        text: VISION_PROMPT.to_string(),
                    },
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: image.mime_type(),
                            data: image.data(),
                        },
                    },
                ],
            }],
            generation_config: Some(&self.settings.generation).filter(|g| !g.is_empty()),
        }
    }

    fn explanation_prompt(&self, estimate: &VisionEstimate) -> String {
        let kind = if estimate.is_structured() {
            "JSON"
        } else {
            "free text"
        };

        format!(
            "A meal photo was analysed and produced the following estimate ({}).\n\
             Explain it to the user in plain {}:\n\
             1. The name and estimated calories of each dish\n\
             2. The total calories of the whole meal\n\
             3. The likely cooking method of each dish\n\
             \n\
             Estimate:\n{}",
            kind,
            self.settings.explanation_language,
            estimate.raw_text()
        )
    }

    /// POST a request and return the raw success body
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest<'_>,
        credential: &ApiCredential,
    ) -> Result<String, AnalysisError> {
        let token = credential.bearer_token(&self.client).await?;

        log::info!("🤖 Sending request to Gemini with model: {}", model);

        let response = self
            .client
            .post(self.endpoint(model))
            .header("Authorization", format!("Bearer {}", token))
            .json(request)
            .send()
            .await
            .map_err(|e| {
                log::error!("❌ Gemini request failed: {}", e);
                ApiError::from_reqwest(e)
            })?;

        let status = response.status();
        log::info!("📥 Gemini response status: {}", status);

        let body = response.text().await.map_err(ApiError::from_reqwest)?;
        log::debug!("📄 Raw Gemini response size: {} bytes", body.len());

        if !status.is_success() {
            let err = ApiError::from_response(status.as_u16(), &body);
            log::error!("❌ Gemini API error: {}", err);
            return Err(err.into());
        }

        Ok(body)
    }
}

/// Concatenated text parts of the first candidate
fn candidate_text(body: &str) -> Result<String, AnalysisError> {
    let response: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|e| AnalysisError::MalformedResponse(format!("not a generateContent response: {}", e)))?;

    let text = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<String>()
        })
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| AnalysisError::MalformedResponse("response has no candidate text".to_string()))?;

    Ok(text)
}

#[async_trait::async_trait]
impl VisionModel for GeminiClient {
    async fn estimate(
        &self,
        image: &EncodedImage,
        credential: &ApiCredential,
    ) -> Result<VisionEstimate, AnalysisError> {
        log::debug!("📊 Vision payload: {} ({} base64 chars)", image.mime_type(), image.data().len());

        let request = self.vision_request(image);
        let body = self
            .generate_content(&self.settings.vision_model, &request, credential)
            .await?;

        let estimate = match candidate_text(&body) {
            Ok(text) => VisionEstimate::interpret(&text),
            Err(e) => {
                log::warn!("⚠️ {}; interpreting the raw body instead", e);
                VisionEstimate::interpret(&body)
            }
        };

        if !estimate.is_structured() {
            log::warn!("⚠️ Vision answer is not item JSON, passing it on as text");
        }

        Ok(estimate)
    }
}

#[async_trait::async_trait]
impl ExplanationModel for GeminiClient {
    async fn explain(
        &self,
        estimate: &VisionEstimate,
        credential: &ApiCredential,
    ) -> Result<Explanation, AnalysisError> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part::Text {
                    text: self.explanation_prompt(estimate),
                }],
            }],
            generation_config: None,
        };

        let body = self
            .generate_content(&self.settings.text_model, &request, credential)
            .await?;

        let text = candidate_text(&body).unwrap_or_else(|e| {
            log::warn!("⚠️ {}; using the raw body as explanation", e);
            body
        });

        Ok(Explanation(text))
    }
}
