mod config;
mod models;
mod services;
mod web; // HTTP surface for the camera UI

#[cfg(feature = "web-server")]
use web::server::create_router;

use anyhow::{Context, Result};
use dotenv::dotenv;
use std::path::Path;
use std::sync::Arc;

use config::AppConfig;
use models::ImagePayload;
use services::credentials::CredentialConfig;
use services::encoding::RawImage;
use services::{CaloriePipeline, GeminiClient};
use web::AnalyzeResponse;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env first so RUST_LOG from it applies
    dotenv().ok();
    env_logger::init();

    log::info!("🚀 Starting Calorie Camera...");

    let config = AppConfig::from_env()?;

    if config.credentials == CredentialConfig::Missing {
        log::warn!("⚠️ Neither GOOGLE_API_KEY nor GOOGLE_SERVICE_ACCOUNT_INFO is set; analysis requests will be refused");
    } else {
        log::info!("🔐 Auth mode: {}", config.auth_mode());
    }

    let http = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()?;
    let gemini = Arc::new(GeminiClient::new(config.gemini.clone(), http));
    log::info!(
        "✅ Gemini client initialized (vision: {}, text: {})",
        config.gemini.vision_model,
        config.gemini.text_model
    );

    let pipeline = Arc::new(CaloriePipeline::new(
        config.credentials.clone(),
        gemini.clone(),
        gemini,
    ));

    // One-shot mode: `calorie-camera <photo.jpg>`
    if let Some(path) = std::env::args().nth(1) {
        let response = analyze_path(&pipeline, Path::new(&path)).await?;
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    #[cfg(feature = "web-server")]
    {
        let app = create_router(pipeline.clone(), config.max_image_bytes);

        let listener = tokio::net::TcpListener::bind(&config.bind_addr)
            .await
            .with_context(|| format!("Failed to bind server to {}", config.bind_addr))?;

        log::info!("🌐 Server listening on http://{}", config.bind_addr);
        println!("\n📷 Calorie Camera is running: POST a photo to http://{}/analyze", config.bind_addr);
        println!("🛑 Press Ctrl+C to stop\n");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    }

    #[cfg(not(feature = "web-server"))]
    log::warn!("⚠️ Built without the web-server feature; pass an image path to analyze it");

    log::info!("🛑 Shutting down...");

    Ok(())
}

async fn analyze_path(pipeline: &CaloriePipeline, path: &Path) -> Result<AnalyzeResponse> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read image {}", path.display()))?;

    log::info!("📸 Analyzing {} ({} bytes)", path.display(), bytes.len());

    let outcome = pipeline
        .analyze(RawImage::Bytes(ImagePayload::new(bytes, declared_mime_type(path))))
        .await?;

    Ok(AnalyzeResponse::from(outcome))
}

/// MIME type implied by the file extension. Advisory only: the format sent to the model is
/// sniffed from the bytes.
fn declared_mime_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

#[cfg(feature = "web-server")]
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("❌ Failed to listen for Ctrl+C: {}", e);
    }
}
