use base64::{engine::general_purpose, Engine};

use crate::models::{AnalysisError, EncodedImage, ImageFormat, ImagePayload};

/// Data-URL prefixes accepted from the web UI
const ACCEPTED_PREFIXES: [&str; 2] = ["data:image/jpeg;base64,", "data:image/png;base64,"];

/// Image input as it arrives from the UI layer
#[derive(Debug, Clone)]
pub enum RawImage<'a> {
    DataUrl(&'a str),
    Bytes(ImagePayload),
}

/// Turn a data URL or raw image bytes into canonical base64.
///
/// URL-safe characters are translated, missing padding is repaired, and the decoded bytes must
/// start with a JPEG or PNG magic number.
pub fn normalize(input: RawImage<'_>) -> Result<EncodedImage, AnalysisError> {
    let bytes = match input {
        RawImage::DataUrl(data_url) => decode_data_url(data_url)?,
        RawImage::Bytes(payload) => {
            if ImageFormat::from_mime_type(payload.mime_type()).is_none() {
                log::warn!("⚠️ Unexpected MIME type for raw image: {}", payload.mime_type());
            }
            payload.bytes().to_vec()
        }
    };

    let format = ImageFormat::sniff(&bytes).ok_or(AnalysisError::UnsupportedImageFormat)?;
    let data = general_purpose::STANDARD.encode(&bytes);

    log::debug!("🖼️ Normalized {} image: {} bytes -> {} base64 chars", format, bytes.len(), data.len());

    Ok(EncodedImage::new(data, format))
}

fn decode_data_url(data_url: &str) -> Result<Vec<u8>, AnalysisError> {
    let trimmed = data_url.trim_start();
    let Some(comma) = trimmed.find(',') else {
        return Err(AnalysisError::InvalidFormat(
            "expected a data URL of the form data:image/jpeg;base64,<payload>".to_string(),
        ));
    };

    let prefix = &trimmed[..=comma];
    if !ACCEPTED_PREFIXES.contains(&prefix) {
        return Err(AnalysisError::InvalidFormat(format!(
            "unsupported data URL prefix '{}'",
            prefix.chars().take(64).collect::<String>()
        )));
    }

    let payload = repair_base64(&trimmed[comma + 1..]);
    general_purpose::STANDARD
        .decode(payload.as_bytes())
        .map_err(|e| AnalysisError::InvalidFormat(format!("payload is not valid base64: {}", e)))
}

/// Standard alphabet, no whitespace, padded to a multiple of 4
fn repair_base64(payload: &str) -> String {
    let mut repaired = payload
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect::<String>();

    while repaired.len() % 4 != 0 {
        repaired.push('=');
    }
    repaired
}
