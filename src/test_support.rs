// Provider stubs shared by unit tests

use async_trait::async_trait;
use image::{DynamicImage, GrayImage, Rgba, RgbaImage};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::core::errors::{
    InpaintingError, InpaintingResult, RenderingError, RenderingResult, TranslationError,
    TranslationResult,
};
use crate::core::types::{RawDetection, Region};
use crate::orchestration::{ImageRestoration, TextRendering, TextTranslation};
use crate::services::detection::DetectionProvider;
use crate::services::inpainting::InpaintingProvider;
use crate::services::rendering::{BuiltinFont, FontFace, FontProvider, TextExtent};
use crate::services::translation::TranslationProvider;

/// Axis-aligned quad at (x, y) with size w x h
pub fn raw_detection(x: f32, y: f32, w: f32, h: f32, text: &str, confidence: f32) -> RawDetection {
    RawDetection {
        quad: [[x, y], [x + w, y], [x + w, y + h], [x, y + h]],
        text: text.to_string(),
        confidence,
    }
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

pub struct StaticDetector {
    detections: Vec<RawDetection>,
}

impl StaticDetector {
    pub fn new(detections: Vec<RawDetection>) -> Self {
        Self { detections }
    }
}

#[async_trait]
impl DetectionProvider for StaticDetector {
    async fn detect(&self, _image: &DynamicImage) -> anyhow::Result<Vec<RawDetection>> {
        Ok(self.detections.clone())
    }
}

pub struct FailingDetector;

#[async_trait]
impl DetectionProvider for FailingDetector {
    async fn detect(&self, _image: &DynamicImage) -> anyhow::Result<Vec<RawDetection>> {
        anyhow::bail!("detector exploded")
    }
}

// ---------------------------------------------------------------------------
// Translation
// ---------------------------------------------------------------------------

/// Translates from a fixed table; unknown input is an error
pub struct MapProvider {
    name: String,
    table: HashMap<String, String>,
    calls: AtomicUsize,
}

impl MapProvider {
    pub fn new(name: &str, entries: &[(&str, &str)]) -> Self {
        Self {
            name: name.to_string(),
            table: entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranslationProvider for MapProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn translate(&self, text: &str, _source: &str, _target: &str) -> TranslationResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.table
            .get(text)
            .cloned()
            .ok_or_else(|| TranslationError::InvalidResponse(format!("no entry for '{}'", text)))
    }
}

pub struct FailingProvider {
    name: String,
    calls: AtomicUsize,
}

impl FailingProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranslationProvider for FailingProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn translate(&self, _text: &str, _source: &str, _target: &str) -> TranslationResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(TranslationError::BadStatus {
            provider: self.name.clone(),
            status: 503,
            body: "unavailable".to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Inpainting
// ---------------------------------------------------------------------------

/// Paints the whole image white
pub struct WhiteInpainter;

#[async_trait]
impl InpaintingProvider for WhiteInpainter {
    fn name(&self) -> &str {
        "white"
    }

    async fn inpaint(&self, image: &RgbaImage, _mask: &GrayImage) -> InpaintingResult<RgbaImage> {
        Ok(RgbaImage::from_pixel(
            image.width(),
            image.height(),
            Rgba([255, 255, 255, 255]),
        ))
    }
}

pub struct FailingInpainter;

#[async_trait]
impl InpaintingProvider for FailingInpainter {
    fn name(&self) -> &str {
        "failing"
    }

    async fn inpaint(&self, _image: &RgbaImage, _mask: &GrayImage) -> InpaintingResult<RgbaImage> {
        Err(InpaintingError::ProviderFailed("model crashed".to_string()))
    }
}

// ---------------------------------------------------------------------------
// Fonts
// ---------------------------------------------------------------------------

/// Serves the built-in bitmap font for a fixed set of "installed" paths
pub struct BuiltinFontProvider {
    installed: Vec<PathBuf>,
    loads: AtomicUsize,
}

impl BuiltinFontProvider {
    pub fn new(installed: &[&str]) -> Self {
        Self {
            installed: installed.iter().map(PathBuf::from).collect(),
            loads: AtomicUsize::new(0),
        }
    }

    /// Load attempts, successful or not
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl FontProvider for BuiltinFontProvider {
    fn load(&self, path: &Path, size: u32) -> RenderingResult<Arc<dyn FontFace>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if !self.installed.iter().any(|p| p == path) {
            return Err(RenderingError::FontLoadFailed {
                path: path.display().to_string(),
                reason: "not installed".to_string(),
            });
        }
        Ok(Arc::new(LabeledFace {
            label: path.display().to_string(),
            inner: BuiltinFont::new(size),
        }))
    }
}

struct LabeledFace {
    label: String,
    inner: BuiltinFont,
}

impl FontFace for LabeledFace {
    fn label(&self) -> &str {
        &self.label
    }

    fn size(&self) -> u32 {
        self.inner.size()
    }

    fn measure(&self, text: &str) -> RenderingResult<TextExtent> {
        self.inner.measure(text)
    }

    fn draw(&self, canvas: &mut RgbaImage, text: &str, x: i32, y: i32, color: Rgba<u8>) -> RenderingResult<()> {
        self.inner.draw(canvas, text, x, y, color)
    }
}

// ---------------------------------------------------------------------------
// Pipeline stages
// ---------------------------------------------------------------------------

/// A stage that always fails
pub struct FailingStage;

#[async_trait]
impl TextTranslation for FailingStage {
    async fn translate_regions(&self, _regions: Vec<Region>) -> anyhow::Result<Vec<Region>> {
        anyhow::bail!("translation stage crashed")
    }
}

#[async_trait]
impl ImageRestoration for FailingStage {
    async fn restore(&self, _image: &RgbaImage, _mask: &GrayImage) -> InpaintingResult<RgbaImage> {
        Err(InpaintingError::ProviderFailed("restoration stage crashed".to_string()))
    }
}

impl TextRendering for FailingStage {
    fn render_regions(&self, _image: &RgbaImage, _regions: &[Region]) -> RenderingResult<RgbaImage> {
        Err(RenderingError::MeasurementFailed("rendering stage crashed".to_string()))
    }
}
