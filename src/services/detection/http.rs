// OCR sidecar client
//
// Talks to an EasyOCR-style HTTP service:
//   GET  {endpoint}/health?languages=en,tr   -> 200 once the reader is loaded
//   POST {endpoint}/detect {image, languages} -> {detections: [{box, text, confidence}]}

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::DetectionProvider;
use crate::core::types::RawDetection;
use crate::utils::image_ops::encode_png_async;

pub struct HttpDetectionProvider {
    http_client: reqwest::Client,
    endpoint: String,
    languages: Vec<String>,
}

#[derive(Debug, Serialize)]
struct DetectRequest<'a> {
    image: String,
    languages: &'a [String],
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    detections: Vec<DetectionItem>,
}

#[derive(Debug, Deserialize)]
struct DetectionItem {
    #[serde(rename = "box")]
    quad: [[f32; 2]; 4],
    text: String,
    confidence: f32,
}

impl HttpDetectionProvider {
    /// Build the client and wait for the sidecar to report its reader is loaded.
    ///
    /// Model download happens on the sidecar during this call, so connectivity
    /// errors here are the ones worth retrying.
    pub async fn connect(endpoint: &str, languages: Vec<String>, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(2)
            .build()
            .context("Failed to create HTTP client")?;

        let endpoint = endpoint.trim_end_matches('/').to_string();
        let start = Instant::now();

        http_client
            .get(format!("{}/health", endpoint))
            .query(&[("languages", languages.join(","))])
            .send()
            .await
            .with_context(|| format!("OCR service unreachable at {}", endpoint))?
            .error_for_status()
            .context("OCR service is not ready")?;

        info!(
            "✓ OCR service ready at {} (languages: {}) in {:.2}s",
            endpoint,
            languages.join(","),
            start.elapsed().as_secs_f64()
        );

        Ok(Self {
            http_client,
            endpoint,
            languages,
        })
    }
}

#[async_trait]
impl DetectionProvider for HttpDetectionProvider {
    async fn detect(&self, image: &DynamicImage) -> Result<Vec<RawDetection>> {
        let png = encode_png_async(image.clone()).await?;
        let request = DetectRequest {
            image: BASE64.encode(png),
            languages: &self.languages,
        };

        let start = Instant::now();
        let response = self
            .http_client
            .post(format!("{}/detect", self.endpoint))
            .json(&request)
            .send()
            .await
            .context("Failed to send request to OCR service")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("OCR service error: {} - {}", status, error_text);
        }

        let body: DetectResponse = response
            .json()
            .await
            .context("Failed to parse OCR response")?;

        debug!(
            "OCR: {} raw detections in {:.2}s",
            body.detections.len(),
            start.elapsed().as_secs_f64()
        );

        Ok(body
            .detections
            .into_iter()
            .map(|d| RawDetection {
                quad: d.quad,
                text: d.text,
                confidence: d.confidence,
            })
            .collect())
    }
}
