// Text detection: lazy OCR capability plus region post-processing

pub mod http;

use async_trait::async_trait;
use futures::FutureExt;
use image::{DynamicImage, GrayImage, Luma};
use std::sync::Arc;
use tracing::{debug, info, instrument, trace};

use crate::core::capability::{LazyCapability, Readiness};
use crate::core::config::DetectionConfig;
use crate::core::errors::{DetectionError, DetectionResult};
use crate::core::retry::RetryPolicy;
use crate::core::types::{BoundingBox, RawDetection, Region};

pub use http::HttpDetectionProvider;

/// Anything that can locate and read text in an image
#[async_trait]
pub trait DetectionProvider: Send + Sync {
    async fn detect(&self, image: &DynamicImage) -> anyhow::Result<Vec<RawDetection>>;
}

/// Thresholds applied to raw detections
#[derive(Debug, Clone)]
pub struct DetectionFilter {
    pub confidence_threshold: f32,
    pub min_region_size: u32,
    pub language: String,
}

impl DetectionFilter {
    /// Convert one raw detection into a region, or drop it
    pub fn apply(&self, raw: &RawDetection) -> Option<Region> {
        if !raw.confidence.is_finite() || raw.confidence < self.confidence_threshold {
            trace!("Dropping '{}' (confidence {:.3})", raw.text, raw.confidence);
            return None;
        }

        let bbox = quad_to_bbox(&raw.quad)?;
        if bbox.width < self.min_region_size || bbox.height < self.min_region_size {
            trace!(
                "Dropping '{}' ({}x{} below {}px)",
                raw.text,
                bbox.width,
                bbox.height,
                self.min_region_size
            );
            return None;
        }

        Some(Region {
            bbox,
            confidence: round3(raw.confidence.clamp(0.0, 1.0)),
            text: raw.text.trim().to_string(),
            translated_text: None,
            language: self.language.clone(),
        })
    }
}

/// Axis-aligned box around four vertices.
///
/// Origin is the truncated minimum; extent is the truncated span.
fn quad_to_bbox(quad: &[[f32; 2]; 4]) -> Option<BoundingBox> {
    if quad.iter().flatten().any(|v| !v.is_finite()) {
        return None;
    }
    let (min_x, max_x) = quad
        .iter()
        .fold((f32::MAX, f32::MIN), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])));
    let (min_y, max_y) = quad
        .iter()
        .fold((f32::MAX, f32::MIN), |(lo, hi), p| (lo.min(p[1]), hi.max(p[1])));

    Some(BoundingBox::new(
        min_x as i32,
        min_y as i32,
        (max_x - min_x) as u32,
        (max_y - min_y) as u32,
    ))
}

fn round3(v: f32) -> f32 {
    (v * 1000.0).round() / 1000.0
}

/// Binary mask with every region's padded box set to 255.
///
/// Boxes are clipped to the image; overlapping boxes simply union.
pub fn get_text_mask(width: u32, height: u32, regions: &[Region], padding: u32) -> GrayImage {
    let mut mask = GrayImage::new(width, height);
    for region in regions {
        let Some((x0, y0, x1, y1)) = region.bbox.padded_clip(padding, width, height) else {
            continue;
        };
        for y in y0..y1 {
            for x in x0..x1 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
    }
    mask
}

pub struct TextDetector {
    capability: LazyCapability<dyn DetectionProvider>,
    filter: DetectionFilter,
    mask_padding: u32,
}

impl TextDetector {
    pub fn new(
        capability: LazyCapability<dyn DetectionProvider>,
        config: &DetectionConfig,
        source_lang: &str,
    ) -> Self {
        Self {
            capability,
            filter: DetectionFilter {
                confidence_threshold: config.confidence_threshold,
                min_region_size: config.min_region_size,
                language: source_lang.to_string(),
            },
            mask_padding: config.mask_padding,
        }
    }

    /// Detector backed by the OCR sidecar. Nothing is contacted until the first `detect`.
    pub fn from_config(config: &DetectionConfig, source_lang: &str) -> Self {
        let endpoint = config.endpoint.clone();
        let languages = config.languages.clone();
        let timeout = config.request_timeout;
        let policy = RetryPolicy::initialization(config.init_max_attempts, config.init_backoff);

        let capability = LazyCapability::new("text detector", policy, move || {
            let endpoint = endpoint.clone();
            let languages = languages.clone();
            async move {
                let provider = HttpDetectionProvider::connect(&endpoint, languages, timeout).await?;
                Ok::<_, anyhow::Error>(Arc::new(provider) as Arc<dyn DetectionProvider>)
            }
            .boxed()
        });

        Self::new(capability, config, source_lang)
    }

    pub fn readiness(&self) -> Readiness {
        self.capability.readiness()
    }

    pub fn mask_padding(&self) -> u32 {
        self.mask_padding
    }

    /// Detect text regions in reading order, with noise filtered out
    #[instrument(skip(self, image), fields(width = image.width(), height = image.height()))]
    pub async fn detect(&self, image: &DynamicImage) -> DetectionResult<Vec<Region>> {
        let provider = self.capability.get().await?;

        let raw = provider
            .detect(image)
            .await
            .map_err(|e| DetectionError::ProviderFailed(format!("{:#}", e)))?;

        let regions: Vec<Region> = raw.iter().filter_map(|d| self.filter.apply(d)).collect();

        for region in &regions {
            debug!(
                "Detected '{}' at ({}, {}) {}x{} conf={:.3}",
                region.text,
                region.bbox.x,
                region.bbox.y,
                region.bbox.width,
                region.bbox.height,
                region.confidence
            );
        }
        info!("Detected {} text regions ({} raw)", regions.len(), raw.len());

        Ok(regions)
    }

    /// Removal mask for `regions` using the configured padding
    pub fn get_text_mask(&self, width: u32, height: u32, regions: &[Region]) -> GrayImage {
        get_text_mask(width, height, regions, self.mask_padding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::test_support::{raw_detection, StaticDetector};
    use std::time::Duration;

    fn filter() -> DetectionFilter {
        DetectionFilter {
            confidence_threshold: 0.3,
            min_region_size: 10,
            language: "en".to_string(),
        }
    }

    fn region_at(x: i32, y: i32, w: u32, h: u32) -> Region {
        Region {
            bbox: BoundingBox::new(x, y, w, h),
            confidence: 0.9,
            text: "HI".into(),
            translated_text: None,
            language: "en".into(),
        }
    }

    #[test]
    fn test_confidence_boundary() {
        let f = filter();
        assert!(f.apply(&raw_detection(0.0, 0.0, 50.0, 20.0, "a", 0.29)).is_none());
        assert!(f.apply(&raw_detection(0.0, 0.0, 50.0, 20.0, "a", 0.30)).is_some());
    }

    #[test]
    fn test_size_boundary() {
        let f = filter();
        assert!(f.apply(&raw_detection(0.0, 0.0, 9.0, 20.0, "a", 0.9)).is_none());
        assert!(f.apply(&raw_detection(0.0, 0.0, 20.0, 9.0, "a", 0.9)).is_none());
        let kept = f.apply(&raw_detection(0.0, 0.0, 10.0, 10.0, "a", 0.9)).unwrap();
        assert_eq!((kept.bbox.width, kept.bbox.height), (10, 10));
    }

    #[test]
    fn test_rounds_confidence_and_trims_text() {
        let region = filter()
            .apply(&raw_detection(3.7, 4.2, 40.0, 12.0, "  HELLO \n", 0.87654))
            .unwrap();
        assert_eq!(region.confidence, 0.877);
        assert_eq!(region.text, "HELLO");
        assert_eq!(region.bbox.x, 3);
        assert_eq!(region.bbox.y, 4);
        assert_eq!(region.language, "en");
        assert!(region.translated_text.is_none());
    }

    #[test]
    fn test_rotated_quad_uses_extremes() {
        let raw = RawDetection {
            quad: [[20.0, 0.0], [40.0, 20.0], [20.0, 40.0], [0.0, 20.0]],
            text: "x".into(),
            confidence: 0.5,
        };
        let region = filter().apply(&raw).unwrap();
        assert_eq!(region.bbox, BoundingBox::new(0, 0, 40, 40));
    }

    #[test]
    fn test_nan_confidence_dropped() {
        assert!(filter()
            .apply(&raw_detection(0.0, 0.0, 50.0, 50.0, "a", f32::NAN))
            .is_none());
    }

    #[test]
    fn test_mask_padding_and_clipping() {
        let mask = get_text_mask(50, 50, &[region_at(2, 10, 20, 10)], 5);
        assert_eq!(mask.get_pixel(0, 5)[0], 255);
        assert_eq!(mask.get_pixel(26, 24)[0], 255);
        assert_eq!(mask.get_pixel(27, 24)[0], 0);
        assert_eq!(mask.get_pixel(10, 25)[0], 0);
        assert_eq!(mask.get_pixel(10, 4)[0], 0);
    }

    #[test]
    fn test_mask_is_idempotent_and_unions_overlaps() {
        let regions = vec![region_at(10, 10, 20, 20), region_at(20, 20, 20, 20)];
        let a = get_text_mask(64, 64, &regions, 5);
        let b = get_text_mask(64, 64, &regions, 5);
        assert_eq!(a, b);
        assert!(a.pixels().all(|p| p[0] == 0 || p[0] == 255));
        // Overlap pixel set once, not accumulated
        assert_eq!(a.get_pixel(25, 25)[0], 255);
    }

    #[tokio::test]
    async fn test_detect_filters_provider_output() {
        let config = Config::default();
        let provider = StaticDetector::new(vec![
            raw_detection(10.0, 10.0, 100.0, 40.0, " HELLO ", 0.9),
            raw_detection(10.0, 60.0, 100.0, 40.0, "noise", 0.1),
            raw_detection(10.0, 60.0, 5.0, 40.0, "tiny", 0.9),
        ]);
        let detector = TextDetector::new(
            LazyCapability::ready("text detector", Arc::new(provider) as Arc<dyn DetectionProvider>),
            &config.detection,
            "en",
        );

        let regions = detector.detect(&DynamicImage::new_rgb8(200, 200)).await.unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].text, "HELLO");
        assert_eq!(regions[0].bbox, BoundingBox::new(10, 10, 100, 40));
    }

    #[tokio::test]
    async fn test_detect_fails_when_initialization_exhausted() {
        let mut config = Config::default().detection;
        // Discard port; connections are refused
        config.endpoint = "http://127.0.0.1:9".to_string();
        config.init_backoff = Duration::from_millis(10);
        config.request_timeout = Duration::from_millis(200);

        let detector = TextDetector::from_config(&config, "en");
        assert_eq!(detector.readiness(), Readiness::Uninitialized);

        let err = detector.detect(&DynamicImage::new_rgb8(10, 10)).await.unwrap_err();
        assert!(matches!(err, DetectionError::Unavailable(_)));
        assert!(matches!(detector.readiness(), Readiness::Failed { .. }));
    }
}
