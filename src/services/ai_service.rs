use crate::models::{AnalysisError, EncodedImage, Explanation, VisionEstimate};
use crate::services::credentials::ApiCredential;

/// Vision-capable model that estimates the dishes and calories in a photo
#[async_trait::async_trait]
pub trait VisionModel: Send + Sync {
    async fn estimate(
        &self,
        image: &EncodedImage,
        credential: &ApiCredential,
    ) -> Result<VisionEstimate, AnalysisError>;
}

/// Text model that turns an estimate into a readable explanation
#[async_trait::async_trait]
pub trait ExplanationModel: Send + Sync {
    async fn explain(
        &self,
        estimate: &VisionEstimate,
        credential: &ApiCredential,
    ) -> Result<Explanation, AnalysisError>;
}
