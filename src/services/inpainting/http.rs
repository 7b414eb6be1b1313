// IOPaint / LaMa server client
//
// GET  {endpoint}/api/v1/server-config  -> readiness probe
// POST {endpoint}/api/v1/inpaint {image, mask} (base64 PNG) -> image bytes

use anyhow::{Context, Result};
use async_trait::async_trait;
use image::{DynamicImage, GrayImage, RgbaImage};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

use super::InpaintingProvider;
use crate::core::errors::{InpaintingError, InpaintingResult};
use crate::utils::image_ops::{encode_image_and_mask_base64, load_image_from_memory_async};

pub struct HttpInpaintingProvider {
    http_client: reqwest::Client,
    endpoint: String,
    model_name: String,
}

#[derive(Debug, Serialize)]
struct InpaintRequest {
    image: String,
    mask: String,
}

impl HttpInpaintingProvider {
    pub async fn connect(endpoint: &str, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        let endpoint = endpoint.trim_end_matches('/').to_string();
        let server_config: serde_json::Value = http_client
            .get(format!("{}/api/v1/server-config", endpoint))
            .send()
            .await
            .with_context(|| format!("Inpainting server unreachable at {}", endpoint))?
            .error_for_status()
            .context("Inpainting server is not ready")?
            .json()
            .await
            .context("Invalid server-config response")?;

        let model_name = server_config
            .get("modelInfos")
            .and_then(|m| m.get(0))
            .and_then(|m| m.get("name"))
            .and_then(|n| n.as_str())
            .unwrap_or("lama")
            .to_string();

        info!("✓ Inpainting server ready at {} (model: {})", endpoint, model_name);

        Ok(Self {
            http_client,
            endpoint,
            model_name,
        })
    }
}

#[async_trait]
impl InpaintingProvider for HttpInpaintingProvider {
    fn name(&self) -> &str {
        &self.model_name
    }

    async fn inpaint(&self, image: &RgbaImage, mask: &GrayImage) -> InpaintingResult<RgbaImage> {
        let (image_b64, mask_b64) =
            encode_image_and_mask_base64(DynamicImage::ImageRgba8(image.clone()), mask.clone())
                .await
                .map_err(|e| InpaintingError::ProviderFailed(format!("{:#}", e)))?;

        let response = self
            .http_client
            .post(format!("{}/api/v1/inpaint", self.endpoint))
            .json(&InpaintRequest {
                image: image_b64,
                mask: mask_b64,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(InpaintingError::ProviderFailed(format!(
                "{} returned {}: {}",
                self.model_name, status, error_text
            )));
        }

        let bytes = response.bytes().await?;
        debug!("Inpainting server returned {} bytes", bytes.len());

        let restored = load_image_from_memory_async(&bytes)
            .await
            .map_err(|e| InpaintingError::ProviderFailed(format!("{:#}", e)))?;
        Ok(restored.to_rgba8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let json = serde_json::to_value(InpaintRequest {
            image: "aW1n".into(),
            mask: "bWFzaw==".into(),
        })
        .unwrap();
        assert_eq!(json["image"], "aW1n");
        assert_eq!(json["mask"], "bWFzaw==");
    }
}
