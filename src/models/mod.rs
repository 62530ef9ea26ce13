use serde::{Deserialize, Deserializer, Serialize};

pub mod errors;

pub use errors::{AnalysisError, ApiError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
        }
    }

    /// Leading bytes every file of this format starts with
    pub fn magic(&self) -> &'static [u8] {
        match self {
            ImageFormat::Jpeg => &[0xFF, 0xD8],
            ImageFormat::Png => &[0x89, b'P', b'N', b'G'],
        }
    }

    /// Detect the format from the first bytes of an image
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        [ImageFormat::Jpeg, ImageFormat::Png]
            .into_iter()
            .find(|format| bytes.starts_with(format.magic()))
    }

    pub fn from_mime_type(mime_type: &str) -> Option<Self> {
        match mime_type.trim().to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(ImageFormat::Jpeg),
            "image/png" => Some(ImageFormat::Png),
            _ => None,
        }
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.mime_type())
    }
}

/// A photograph as acquired from the camera or an upload
#[derive(Debug, Clone)]
pub struct ImagePayload {
    bytes: Vec<u8>,
    mime_type: String,
}

impl ImagePayload {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }
}

/// Canonical (standard alphabet, padded) base64 of a JPEG or PNG image.
///
/// Only produced by `services::encoding::normalize`, which guarantees that the text decodes to
/// bytes starting with the magic number of `format`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    data: String,
    format: ImageFormat,
}

impl EncodedImage {
    pub(crate) fn new(data: String, format: ImageFormat) -> Self {
        Self { data, format }
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodItem {
    pub name: String,
    #[serde(deserialize_with = "deserialize_calories")]
    pub calories: f64,
    #[serde(
        default,
        alias = "cookingMethod",
        alias = "preparation",
        skip_serializing_if = "Option::is_none"
    )]
    pub cooking_method: Option<String>,
    #[serde(
        default,
        alias = "estimated_portion",
        alias = "amount",
        skip_serializing_if = "Option::is_none"
    )]
    pub portion: Option<String>,
}

fn deserialize_calories<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    calories_from_value(&value)
        .ok_or_else(|| serde::de::Error::custom(format!("unrecognized calorie value: {}", value)))
}

fn calories_from_value(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => parse_calorie_text(s),
        _ => None,
    }
}

/// Pull the first number out of free text such as `"1,250 kcal"` or `"約250kcal"`.
///
/// Commas are read as thousands separators; a range like `"250-300"` yields its lower bound.
pub fn parse_calorie_text(text: &str) -> Option<f64> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let cleaned = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .filter(|c| *c != ',')
        .collect::<String>();

    cleaned.trim_end_matches('.').parse::<f64>().ok()
}

#[derive(Debug, Deserialize)]
struct EstimateDocument {
    items: Vec<FoodItem>,
    #[serde(default, alias = "totalCalories", alias = "total")]
    total_calories: Option<serde_json::Value>,
}

/// What the vision model made of the photo
#[derive(Debug, Clone, PartialEq)]
pub enum VisionEstimate {
    Structured {
        items: Vec<FoodItem>,
        /// The model's own total, kept for display; `total_calories` always sums the items
        reported_total: Option<f64>,
        raw: String,
    },
    /// The model answered, but not with the expected JSON
    Text(String),
}

impl VisionEstimate {
    /// Interpret model output as `{"items": [{name, calories}], ...}`, falling back to opaque text.
    pub fn interpret(text: &str) -> Self {
        let body = strip_code_fence(text);

        if let Ok(doc) = serde_json::from_str::<EstimateDocument>(body) {
            return VisionEstimate::Structured {
                items: doc.items,
                reported_total: doc.total_calories.as_ref().and_then(calories_from_value),
                raw: body.to_string(),
            };
        }

        // Some answers are a bare list of items
        if let Ok(items) = serde_json::from_str::<Vec<FoodItem>>(body) {
            return VisionEstimate::Structured {
                items,
                reported_total: None,
                raw: body.to_string(),
            };
        }

        VisionEstimate::Text(text.to_string())
    }

    pub fn items(&self) -> &[FoodItem] {
        match self {
            VisionEstimate::Structured { items, .. } => items,
            VisionEstimate::Text(_) => &[],
        }
    }

    pub fn total_calories(&self) -> Option<f64> {
        match self {
            VisionEstimate::Structured { items, .. } => {
                Some(items.iter().map(|item| item.calories).sum())
            }
            VisionEstimate::Text(_) => None,
        }
    }

    /// The text that was interpreted: JSON for a structured estimate, otherwise the raw answer
    pub fn raw_text(&self) -> &str {
        match self {
            VisionEstimate::Structured { raw, .. } => raw,
            VisionEstimate::Text(text) => text,
        }
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, VisionEstimate::Structured { .. })
    }
}

/// Body of the first fenced block, wherever it sits in the answer; the whole text otherwise
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(open) = trimmed.find("```") else {
        return trimmed;
    };
    let rest = &trimmed[open + 3..];

    // Drop the info string (```json) up to the first newline
    let rest = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    match rest.find("```") {
        Some(close) => rest[..close].trim(),
        None => rest.trim(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Explanation(pub String);

impl Explanation {
    #[cfg(test)]
    pub fn text(&self) -> &str {
        &self.0
    }
}

/// Result of one pipeline run. The estimate is always present; the explanation may have failed
/// on its own.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub estimate: VisionEstimate,
    pub explanation: Result<Explanation, AnalysisError>,
}
