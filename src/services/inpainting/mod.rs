// Text removal: learned inpainting with a classical fallback

pub mod classical;
pub mod http;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use image::{GrayImage, RgbaImage};
use imageproc::distance_transform::Norm;
use imageproc::morphology;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::core::capability::{LazyCapability, Readiness};
use crate::core::config::{DetectionConfig, InpaintingConfig};
use crate::core::errors::{InpaintingError, InpaintingResult};
use crate::core::retry::RetryPolicy;

pub use classical::inpaint_telea;
pub use http::HttpInpaintingProvider;

/// A learned inpainting backend
#[async_trait]
pub trait InpaintingProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn inpaint(&self, image: &RgbaImage, mask: &GrayImage) -> InpaintingResult<RgbaImage>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InpaintMethod {
    Model(String),
    Classical,
    /// Mask was empty; the image is unchanged
    Skipped,
}

#[derive(Debug, Clone)]
pub struct Restoration {
    pub image: RgbaImage,
    pub method: InpaintMethod,
}

/// Grow a mask with a `size` x `size` square structuring element.
///
/// Sizes 0 and 1 leave the mask unchanged. Even sizes use the next smaller
/// odd element so the dilation stays centered.
pub fn enhance_mask(mask: &GrayImage, size: u32) -> GrayImage {
    let radius = (size.saturating_sub(1) / 2).min(u8::MAX as u32) as u8;
    if radius == 0 {
        return mask.clone();
    }
    morphology::dilate(mask, Norm::LInf, radius)
}

pub struct Restorer {
    model: LazyCapability<dyn InpaintingProvider>,
    telea_radius: u32,
}

impl Restorer {
    pub fn new(model: LazyCapability<dyn InpaintingProvider>, telea_radius: u32) -> Self {
        Self {
            model,
            telea_radius,
        }
    }

    /// Classical-only restorer
    pub fn classical(telea_radius: u32) -> Self {
        Self::new(
            LazyCapability::unavailable("inpainting model", "no model configured"),
            telea_radius,
        )
    }

    /// Restorer whose model is created on first use.
    ///
    /// If initialization gives up, the restorer stays on Telea for the rest of
    /// the process instead of retrying on every page.
    pub fn lazy<F>(policy: RetryPolicy, telea_radius: u32, factory: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, anyhow::Result<Arc<dyn InpaintingProvider>>>
            + Send
            + Sync
            + 'static,
    {
        let model = LazyCapability::new("inpainting model", policy, factory).with_sticky_failure();
        Self::new(model, telea_radius)
    }

    /// Restorer backed by an IOPaint/LaMa server when `INPAINTING_ENDPOINT` is set.
    ///
    /// The model is created with the same bounded initialization retry as the detector.
    pub fn from_config(config: &InpaintingConfig, init: &DetectionConfig) -> Self {
        let Some(endpoint) = config.endpoint.clone() else {
            info!("No inpainting endpoint configured; using Telea inpainting");
            return Self::classical(config.telea_radius);
        };

        let timeout = config.request_timeout;
        let policy = RetryPolicy::initialization(init.init_max_attempts, init.init_backoff);
        Self::lazy(policy, config.telea_radius, move || {
            let endpoint = endpoint.clone();
            async move {
                let provider = HttpInpaintingProvider::connect(&endpoint, timeout).await?;
                Ok::<_, anyhow::Error>(Arc::new(provider) as Arc<dyn InpaintingProvider>)
            }
            .boxed()
        })
    }

    pub fn readiness(&self) -> Readiness {
        self.model.readiness()
    }

    /// Remove masked pixels.
    ///
    /// Any model problem (unavailable, request failure, bad output) falls back
    /// to Telea with the same inputs. Only a mask/image size mismatch or a
    /// failure inside OpenCV itself is an error.
    #[instrument(skip(self, image, mask), fields(width = image.width(), height = image.height()))]
    pub async fn inpaint(&self, image: &RgbaImage, mask: &GrayImage) -> InpaintingResult<Restoration> {
        if image.dimensions() != mask.dimensions() {
            return Err(InpaintingError::MaskSizeMismatch {
                image_width: image.width(),
                image_height: image.height(),
                mask_width: mask.width(),
                mask_height: mask.height(),
            });
        }

        if mask.pixels().all(|p| p[0] == 0) {
            debug!("Empty mask, nothing to inpaint");
            return Ok(Restoration {
                image: image.clone(),
                method: InpaintMethod::Skipped,
            });
        }

        match self.inpaint_with_model(image, mask).await {
            Ok(restoration) => return Ok(restoration),
            Err(e) => {
                if matches!(e, InpaintingError::Unavailable(_)) {
                    debug!("Inpainting model unavailable: {}", e);
                } else {
                    warn!("Model inpainting failed, falling back to Telea: {}", e);
                }
            }
        }

        self.inpaint_classical(image, mask).await
    }

    async fn inpaint_with_model(
        &self,
        image: &RgbaImage,
        mask: &GrayImage,
    ) -> InpaintingResult<Restoration> {
        let model = self.model.get().await?;
        let start = Instant::now();
        let restored = model.inpaint(image, mask).await?;

        if restored.dimensions() != image.dimensions() {
            return Err(InpaintingError::ProviderFailed(format!(
                "{} returned {}x{} for a {}x{} input",
                model.name(),
                restored.width(),
                restored.height(),
                image.width(),
                image.height()
            )));
        }

        info!(
            "✓ Inpainted with {} in {:.2}s",
            model.name(),
            start.elapsed().as_secs_f64()
        );
        Ok(Restoration {
            image: restored,
            method: InpaintMethod::Model(model.name().to_string()),
        })
    }

    async fn inpaint_classical(
        &self,
        image: &RgbaImage,
        mask: &GrayImage,
    ) -> InpaintingResult<Restoration> {
        let image = image.clone();
        let mask = mask.clone();
        let radius = self.telea_radius;
        let start = Instant::now();

        let restored = tokio::task::spawn_blocking(move || inpaint_telea(&image, &mask, radius))
            .await
            .map_err(|e| InpaintingError::ProviderFailed(format!("Telea task failed: {}", e)))??;

        info!(
            "✓ Inpainted with Telea (radius {}) in {:.2}s",
            radius,
            start.elapsed().as_secs_f64()
        );
        Ok(Restoration {
            image: restored,
            method: InpaintMethod::Classical,
        })
    }
}
