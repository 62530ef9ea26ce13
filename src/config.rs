use anyhow::{bail, Context, Result};
use std::time::Duration;

use crate::services::credentials::CredentialConfig;
use crate::services::gemini::{GeminiSettings, GenerationOptions, DEFAULT_BASE_URL, DEFAULT_MODEL};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024; // 10MB
const DEFAULT_EXPLANATION_LANGUAGE: &str = "Japanese";

/// Process configuration, read once at startup
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub credentials: CredentialConfig,
    pub gemini: GeminiSettings,
    pub request_timeout: Duration,
    pub bind_addr: String,
    /// Largest accepted `/analyze` request body
    pub max_image_bytes: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key/value source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let credentials = credential_config(
            get("GOOGLE_AUTH_MODE"),
            get("GOOGLE_API_KEY"),
            get("GOOGLE_SERVICE_ACCOUNT_INFO"),
        )?;

        let generation = GenerationOptions {
            temperature: parse_unit_interval("GEMINI_TEMPERATURE", get("GEMINI_TEMPERATURE"))?,
            top_p: parse_unit_interval("GEMINI_TOP_P", get("GEMINI_TOP_P"))?,
            top_k: match get("GEMINI_TOP_K") {
                Some(raw) => {
                    let top_k: u32 = raw
                        .parse()
                        .with_context(|| format!("GEMINI_TOP_K must be a positive integer, got '{}'", raw))?;
                    if top_k == 0 {
                        bail!("GEMINI_TOP_K must be greater than 0");
                    }
                    Some(top_k)
                }
                None => None,
            },
        };

        let gemini = GeminiSettings {
            base_url: get("GEMINI_API_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            vision_model: get("GEMINI_VISION_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            text_model: get("GEMINI_TEXT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            generation,
            explanation_language: get("EXPLANATION_LANGUAGE")
                .unwrap_or_else(|| DEFAULT_EXPLANATION_LANGUAGE.to_string()),
        };

        let timeout_secs = match get("REQUEST_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .with_context(|| format!("REQUEST_TIMEOUT_SECS must be a positive integer, got '{}'", raw))?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        let max_image_bytes = match get("MAX_IMAGE_BYTES") {
            Some(raw) => raw
                .parse::<usize>()
                .with_context(|| format!("MAX_IMAGE_BYTES must be a byte count, got '{}'", raw))?,
            None => DEFAULT_MAX_IMAGE_BYTES,
        };

        Ok(Self {
            credentials,
            gemini,
            request_timeout: Duration::from_secs(timeout_secs),
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            max_image_bytes,
        })
    }

    pub fn auth_mode(&self) -> &'static str {
        match self.credentials {
            CredentialConfig::Missing => "none",
            CredentialConfig::ApiKey(_) => "api_key",
            CredentialConfig::ServiceAccount(_) => "service_account",
        }
    }
}

/// Pick one authentication mode. An explicit `GOOGLE_AUTH_MODE` wins; otherwise a service
/// account bundle takes precedence over a bare key.
fn credential_config(
    mode: Option<String>,
    api_key: Option<String>,
    service_account: Option<String>,
) -> Result<CredentialConfig> {
    let from_key = |key: Option<String>| key.map(CredentialConfig::ApiKey);
    let from_bundle = |bundle: Option<String>| bundle.map(CredentialConfig::ServiceAccount);

    let selected = match mode.as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some("api_key") | Some("apikey") => from_key(api_key),
        Some("service_account") => from_bundle(service_account),
        Some(other) => bail!(
            "GOOGLE_AUTH_MODE must be 'api_key' or 'service_account', got '{}'",
            other
        ),
        None => from_bundle(service_account).or_else(|| from_key(api_key)),
    };

    Ok(selected.unwrap_or(CredentialConfig::Missing))
}

fn parse_unit_interval(key: &str, raw: Option<String>) -> Result<Option<f64>> {
    let Some(raw) = raw else {
        return Ok(None);
    };

    let value: f64 = raw
        .parse()
        .with_context(|| format!("{} must be a number, got '{}'", key, raw))?;
    if !(0.0..=1.0).contains(&value) {
        bail!("{} must be within [0, 1], got {}", key, value);
    }
    Ok(Some(value))
}
