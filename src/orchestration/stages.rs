// Stage seams used by the orchestrator
//
// Each pipeline stage is a trait so runs can be assembled from the real
// services or from stubs.

use async_trait::async_trait;
use image::{DynamicImage, GrayImage, RgbaImage};
use tracing::debug;

use crate::core::errors::{DetectionResult, InpaintingResult, RenderingResult};
use crate::core::types::Region;
use crate::services::detection::TextDetector;
use crate::services::inpainting::Restorer;
use crate::services::rendering::TextRenderer;
use crate::services::translation::Translator;

#[async_trait]
pub trait TextDetection: Send + Sync {
    async fn detect(&self, image: &DynamicImage) -> DetectionResult<Vec<Region>>;

    /// Removal mask for `regions` on a `width` x `height` page
    fn text_mask(&self, width: u32, height: u32, regions: &[Region]) -> GrayImage;
}

#[async_trait]
pub trait TextTranslation: Send + Sync {
    async fn translate_regions(&self, regions: Vec<Region>) -> anyhow::Result<Vec<Region>>;
}

#[async_trait]
pub trait ImageRestoration: Send + Sync {
    async fn restore(&self, image: &RgbaImage, mask: &GrayImage) -> InpaintingResult<RgbaImage>;
}

/// Runs on a blocking thread
pub trait TextRendering: Send + Sync {
    fn render_regions(&self, image: &RgbaImage, regions: &[Region]) -> RenderingResult<RgbaImage>;
}

#[async_trait]
impl TextDetection for TextDetector {
    async fn detect(&self, image: &DynamicImage) -> DetectionResult<Vec<Region>> {
        TextDetector::detect(self, image).await
    }

    fn text_mask(&self, width: u32, height: u32, regions: &[Region]) -> GrayImage {
        self.get_text_mask(width, height, regions)
    }
}

#[async_trait]
impl TextTranslation for Translator {
    async fn translate_regions(&self, regions: Vec<Region>) -> anyhow::Result<Vec<Region>> {
        Ok(self.translate_all(regions).await)
    }
}

#[async_trait]
impl ImageRestoration for Restorer {
    async fn restore(&self, image: &RgbaImage, mask: &GrayImage) -> InpaintingResult<RgbaImage> {
        let restoration = self.inpaint(image, mask).await?;
        debug!("Restored with {:?}", restoration.method);
        Ok(restoration.image)
    }
}

impl TextRendering for TextRenderer {
    fn render_regions(&self, image: &RgbaImage, regions: &[Region]) -> RenderingResult<RgbaImage> {
        Ok(self.render(image, regions).image)
    }
}
