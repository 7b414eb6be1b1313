// Text layout and compositing
//
// Each region's translated text is drawn centered in its box at the largest
// font size that fits, using the first font that covers the target language.

pub mod builtin;
pub mod fonts;

use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::core::config::RenderingConfig;
use crate::core::errors::{RenderingError, RenderingResult};
use crate::core::types::Region;

pub use builtin::BuiltinFont;
pub use fonts::{
    platform_fallback_fonts, probe_text, CosmicFontProvider, FontCache, FontFace, FontKey,
    FontProvider, FontResolver, TextExtent,
};

const TEXT_COLOR: Rgba<u8> = Rgba([0, 0, 0, 255]);
const BACKGROUND_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Largest integer size in `[min_size, max_size]` whose measured text fits
/// within `margin` of the box in both dimensions.
///
/// Binary search: a fit moves the lower bound up, anything else (including a
/// measurement error) moves the upper bound down. Returns `min_size` when
/// nothing fits. Assumes the extent grows with the size.
pub fn find_optimal_font_size<F>(
    min_size: u32,
    max_size: u32,
    box_width: u32,
    box_height: u32,
    margin: f32,
    mut measure: F,
) -> u32
where
    F: FnMut(u32) -> RenderingResult<TextExtent>,
{
    let max_width = box_width as f32 * margin;
    let max_height = box_height as f32 * margin;

    let mut low = min_size as i64;
    let mut high = max_size as i64;
    let mut best = min_size;

    while low <= high {
        let mid = (low + high) / 2;
        let fits = match measure(mid as u32) {
            Ok(extent) => extent.width as f32 <= max_width && extent.height as f32 <= max_height,
            Err(e) => {
                debug!("Measurement at {}px failed: {}", mid, e);
                false
            }
        };

        if fits {
            best = mid as u32;
            low = mid + 1;
        } else {
            high = mid - 1;
        }
    }

    best
}

/// Blend a filled box under every region:
/// `opacity * color + (1 - opacity) * original`
pub fn add_background_box(
    image: &RgbaImage,
    regions: &[Region],
    color: Rgba<u8>,
    opacity: f32,
) -> RgbaImage {
    let opacity = opacity.clamp(0.0, 1.0);
    let mut overlay = image.clone();
    for region in regions {
        let bbox = &region.bbox;
        if bbox.width == 0 || bbox.height == 0 {
            continue;
        }
        draw_filled_rect_mut(
            &mut overlay,
            Rect::at(bbox.x, bbox.y).of_size(bbox.width, bbox.height),
            color,
        );
    }

    let mut blended = image.clone();
    for ((out, over), orig) in blended
        .pixels_mut()
        .zip(overlay.pixels())
        .zip(image.pixels())
    {
        for c in 0..4 {
            let value = opacity * over[c] as f32 + (1.0 - opacity) * orig[c] as f32;
            out[c] = value.round().clamp(0.0, 255.0) as u8;
        }
    }
    blended
}

/// Result of one rendering pass
#[derive(Debug, Clone)]
pub struct RenderOutput {
    pub image: RgbaImage,
    /// Regions that received text
    pub rendered: usize,
    /// Regions skipped because of an error
    pub failed: usize,
}

pub struct TextRenderer {
    resolver: Arc<FontResolver>,
    font_path: Option<PathBuf>,
    min_size: u32,
    max_size: u32,
    margin: f32,
    background_opacity: Option<f32>,
}

impl TextRenderer {
    pub fn new(resolver: Arc<FontResolver>, config: &RenderingConfig) -> Self {
        Self {
            resolver,
            font_path: None,
            min_size: config.font_size_min,
            max_size: config.font_size_max,
            margin: config.fit_margin,
            background_opacity: config
                .background_box
                .then_some(config.background_opacity),
        }
    }

    /// Renderer using cosmic-text fonts for `target_lang`
    pub fn from_config(config: &RenderingConfig, target_lang: &str) -> Self {
        let resolver = FontResolver::with_system_fonts(&config.default_font_path, target_lang);
        Self::new(Arc::new(resolver), config)
    }

    /// Try this font before the configured default
    pub fn with_font_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_path = Some(path.into());
        self
    }

    pub fn resolver(&self) -> &Arc<FontResolver> {
        &self.resolver
    }

    /// Font size for `text` in a `box_width` x `box_height` region
    pub fn optimal_font_size(&self, text: &str, box_width: u32, box_height: u32) -> u32 {
        find_optimal_font_size(
            self.min_size,
            self.max_size,
            box_width,
            box_height,
            self.margin,
            |size| {
                self.resolver
                    .resolve(self.font_path.as_deref(), size)
                    .measure(text)
            },
        )
    }

    /// Composite every region's translated text onto a copy of `image`.
    ///
    /// Regions without translated text are skipped. An error on one region is
    /// logged and the remaining regions still render.
    #[instrument(skip_all, fields(regions = regions.len()))]
    pub fn render(&self, image: &RgbaImage, regions: &[Region]) -> RenderOutput {
        let mut canvas = match self.background_opacity {
            Some(opacity) => add_background_box(image, regions, BACKGROUND_COLOR, opacity),
            None => image.clone(),
        };

        let mut rendered = 0;
        let mut failed = 0;

        for (idx, region) in regions.iter().enumerate() {
            let Some(text) = region.render_text() else {
                debug!("Region {} has no translated text, skipping", idx);
                continue;
            };

            match self.render_region(&mut canvas, region, text) {
                Ok(()) => rendered += 1,
                Err(e) => {
                    warn!("Failed to render region {} ('{}'): {}", idx, text, e);
                    failed += 1;
                }
            }
        }

        info!("✓ Rendered {} regions ({} failed)", rendered, failed);
        RenderOutput {
            image: canvas,
            rendered,
            failed,
        }
    }

    fn render_region(&self, canvas: &mut RgbaImage, region: &Region, text: &str) -> RenderingResult<()> {
        let bbox = &region.bbox;
        if bbox.width == 0 || bbox.height == 0 {
            return Err(RenderingError::InvalidRegion(format!(
                "{}x{} at ({}, {})",
                bbox.width, bbox.height, bbox.x, bbox.y
            )));
        }

        let size = self.optimal_font_size(text, bbox.width, bbox.height);
        let font = self.resolver.resolve(self.font_path.as_deref(), size);
        let extent = font.measure(text)?;

        let x = bbox.x + (bbox.width as i32 - extent.width as i32).div_euclid(2);
        let y = bbox.y + (bbox.height as i32 - extent.height as i32).div_euclid(2);

        debug!(
            "'{}' at {}px with {} -> ({}, {}) {}x{}",
            text,
            size,
            font.label(),
            x,
            y,
            extent.width,
            extent.height
        );
        font.draw(canvas, text, x, y, TEXT_COLOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::BoundingBox;
    use crate::test_support::BuiltinFontProvider;

    fn builtin_renderer(config: &RenderingConfig) -> TextRenderer {
        let resolver = FontResolver::new(
            Arc::new(BuiltinFontProvider::new(&[])),
            "/nonexistent/font.ttf",
            "en",
            Arc::new(FontCache::new()),
        )
        .with_fallbacks(vec![]);
        TextRenderer::new(Arc::new(resolver), config)
    }

    fn region(x: i32, y: i32, w: u32, h: u32, translated: Option<&str>) -> Region {
        Region {
            bbox: BoundingBox::new(x, y, w, h),
            confidence: 0.9,
            text: "HELLO".to_string(),
            translated_text: translated.map(str::to_string),
            language: "en".to_string(),
        }
    }

    fn linear(k: u32) -> impl FnMut(u32) -> RenderingResult<TextExtent> {
        move |size| {
            Ok(TextExtent {
                width: size * k,
                height: size,
                missing_glyphs: 0,
            })
        }
    }

    #[test]
    fn test_search_returns_largest_fitting_size() {
        // 0.9 * 200 = 180 wide; width = 5 * size -> 36
        assert_eq!(find_optimal_font_size(12, 48, 200, 100, 0.9, linear(5)), 36);
        // Height bound: 0.9 * 30 = 27
        assert_eq!(find_optimal_font_size(12, 48, 1000, 30, 0.9, linear(1)), 27);
        // Everything fits
        assert_eq!(find_optimal_font_size(12, 48, 1000, 1000, 0.9, linear(1)), 48);
    }

    #[test]
    fn test_search_defaults_to_min_size() {
        assert_eq!(find_optimal_font_size(12, 48, 20, 20, 0.9, linear(10)), 12);
    }

    #[test]
    fn test_search_treats_errors_as_not_fitting() {
        let mut calls = 0;
        let size = find_optimal_font_size(12, 48, 500, 500, 0.9, |size| {
            calls += 1;
            if size > 20 {
                Err(RenderingError::MeasurementFailed("boom".into()))
            } else {
                Ok(TextExtent {
                    width: size,
                    height: size,
                    missing_glyphs: 0,
                })
            }
        });
        assert_eq!(size, 20);
        assert!(calls <= 6);
    }

    #[test]
    fn test_merhaba_fits_builtin_box() {
        let renderer = builtin_renderer(&RenderingConfig::default());
        assert_eq!(renderer.optimal_font_size("MERHABA", 100, 40), 17);
    }

    #[test]
    fn test_render_centers_text_in_region() {
        let renderer = builtin_renderer(&RenderingConfig::default());
        let image = RgbaImage::from_pixel(200, 100, Rgba([255, 255, 255, 255]));
        let regions = vec![region(50, 30, 100, 40, Some("MERHABA"))];

        let output = renderer.render(&image, &regions);
        assert_eq!((output.rendered, output.failed), (1, 0));

        let dark: Vec<(u32, u32)> = output
            .image
            .enumerate_pixels()
            .filter(|(_, _, p)| p[0] < 128)
            .map(|(x, y, _)| (x, y))
            .collect();
        assert!(!dark.is_empty());
        assert!(dark.iter().all(|&(x, y)| (50..150).contains(&x) && (30..70).contains(&y)));

        // 88x15 text centered in 100x40 -> starts at (56, 42)
        let min_x = dark.iter().map(|p| p.0).min().unwrap();
        let min_y = dark.iter().map(|p| p.1).min().unwrap();
        assert_eq!((min_x, min_y), (56, 42));
    }

    #[test]
    fn test_render_skips_regions_without_translation() {
        let renderer = builtin_renderer(&RenderingConfig::default());
        let image = RgbaImage::from_pixel(100, 100, Rgba([255, 255, 255, 255]));
        let regions = vec![region(0, 0, 100, 40, None), region(0, 50, 100, 40, Some("   "))];

        let output = renderer.render(&image, &regions);
        assert_eq!(output.rendered, 0);
        assert_eq!(output.image, image);
    }

    #[test]
    fn test_render_continues_after_region_failure() {
        let renderer = builtin_renderer(&RenderingConfig::default());
        let image = RgbaImage::from_pixel(200, 100, Rgba([255, 255, 255, 255]));
        let regions = vec![region(0, 0, 0, 40, Some("BAD")), region(50, 30, 100, 40, Some("OK"))];

        let output = renderer.render(&image, &regions);
        assert_eq!((output.rendered, output.failed), (1, 1));
    }

    #[test]
    fn test_background_box_blends_inside_regions_only() {
        let image = RgbaImage::from_pixel(20, 20, Rgba([0, 0, 0, 255]));
        let regions = vec![region(5, 5, 10, 10, Some("X"))];

        let out = add_background_box(&image, &regions, Rgba([255, 255, 255, 255]), 0.9);
        assert_eq!(out.get_pixel(10, 10)[0], 230);
        assert_eq!(out.get_pixel(10, 10)[3], 255);
        assert_eq!(out.get_pixel(0, 0), image.get_pixel(0, 0));
        assert_eq!(out.get_pixel(15, 15), image.get_pixel(15, 15));
    }

    #[test]
    fn test_background_box_enabled_from_config() {
        let config = RenderingConfig {
            background_box: true,
            background_opacity: 1.0,
            ..RenderingConfig::default()
        };
        let renderer = builtin_renderer(&config);
        let image = RgbaImage::from_pixel(40, 40, Rgba([0, 0, 0, 255]));
        let regions = vec![region(10, 10, 20, 20, None)];

        let output = renderer.render(&image, &regions);
        assert_eq!(*output.image.get_pixel(15, 15), Rgba([255, 255, 255, 255]));
        assert_eq!(*output.image.get_pixel(2, 2), Rgba([0, 0, 0, 255]));
    }
}
