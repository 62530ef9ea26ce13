pub mod ai_service; // Model traits
pub mod credentials;
pub mod encoding;
pub mod gemini; // Google Gemini generateContent client
pub mod pipeline;

pub use ai_service::{ExplanationModel, VisionModel};
pub use gemini::GeminiClient;
pub use pipeline::CaloriePipeline;
