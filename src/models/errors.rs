use serde::Deserialize;
use thiserror::Error;

/// Upper bound on how much of an unparsable error body is carried in an error message.
pub const MAX_ERROR_BODY_CHARS: usize = 1000;

/// Failure talking to a remote endpoint (Gemini or the OAuth token endpoint).
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("API error ({status}): {message}")]
    Status {
        status: u16,
        /// Provider status string such as `INVALID_ARGUMENT`, when the envelope carried one
        provider_status: Option<String>,
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    status: Option<String>,
    message: String,
    #[serde(default)]
    details: Option<serde_json::Value>,
}

impl ApiError {
    /// Build an error from a non-success response.
    ///
    /// The provider envelope `{"error": {code, status, message, details}}` is used when it parses;
    /// otherwise the raw body (truncated) becomes the message. The HTTP status is always the one
    /// reported, so a parse failure never hides the original failure.
    pub fn from_response(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(envelope) => ApiError::Status {
                status,
                provider_status: envelope.error.status,
                message: envelope.error.message,
                details: envelope.error.details,
            },
            Err(_) => ApiError::Status {
                status,
                provider_status: None,
                message: truncate_chars(body, MAX_ERROR_BODY_CHARS),
                details: None,
            },
        }
    }

    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else {
            ApiError::Transport(err.to_string())
        }
    }

    #[cfg(test)]
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    #[cfg(test)]
    pub fn message(&self) -> String {
        match self {
            ApiError::Status { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Everything that can stop an analysis request.
#[derive(Debug, Clone, Error)]
pub enum AnalysisError {
    #[error("no API credential configured (set GOOGLE_API_KEY or GOOGLE_SERVICE_ACCOUNT_INFO)")]
    MissingCredential,

    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid image data: {0}")]
    InvalidFormat(String),

    #[error("unsupported image format: expected JPEG or PNG data")]
    UnsupportedImageFormat,

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
