// Font loading, script-coverage checks and the process-wide font cache

use cosmic_text::{
    fontdb, Attrs, Buffer, Color as CosmicColor, Family, FontSystem, Metrics, Shaping, SwashCache,
    Wrap,
};
use image::{Rgba, RgbaImage};
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::builtin::BuiltinFont;
use crate::core::errors::{RenderingError, RenderingResult};

const LINE_HEIGHT_RATIO: f32 = 1.2;
/// Extra width on each side for glyph overhangs
const OVERHANG_RATIO: f32 = 0.05;

/// Rendered size of a string in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextExtent {
    pub width: u32,
    pub height: u32,
    /// Characters the font has no glyph for
    pub missing_glyphs: usize,
}

/// A font loaded at one size
pub trait FontFace: Send + Sync {
    fn label(&self) -> &str;

    fn size(&self) -> u32;

    fn measure(&self, text: &str) -> RenderingResult<TextExtent>;

    /// Draw `text` with the top-left of its measured box at (x, y)
    fn draw(
        &self,
        canvas: &mut RgbaImage,
        text: &str,
        x: i32,
        y: i32,
        color: Rgba<u8>,
    ) -> RenderingResult<()>;
}

/// Turns a font file into a face at a given size
pub trait FontProvider: Send + Sync {
    fn load(&self, path: &Path, size: u32) -> RenderingResult<Arc<dyn FontFace>>;
}

/// Characters a font must cover to be used for `language`
pub fn probe_text(language: &str) -> &'static str {
    let primary = language
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    match primary.as_str() {
        "tr" => "ğüşıöçĞÜŞİÖÇ",
        "de" => "äöüßÄÖÜ",
        "fr" => "éèêàçôûÉÈ",
        "es" => "ñáéíóúÑ¿¡",
        "pl" => "ąćęłńóśźż",
        "ru" | "uk" => "абвгдежзий",
        "ja" => "あいうえおアイウエオ漢字",
        "zh" => "中文汉字",
        "ko" => "한국어",
        _ => "Aa",
    }
}

fn is_cjk_language(language: &str) -> bool {
    matches!(
        language.split(['-', '_']).next().unwrap_or_default(),
        "ja" | "zh" | "ko"
    )
}

/// Broad-coverage fonts commonly installed on this platform
pub fn platform_fallback_fonts(language: &str) -> Vec<PathBuf> {
    let mut fonts: Vec<&str> = Vec::new();

    if cfg!(target_os = "macos") {
        if is_cjk_language(language) {
            fonts.extend(["/System/Library/Fonts/PingFang.ttc", "/System/Library/Fonts/Hiragino Sans GB.ttc"]);
        }
        fonts.extend([
            "/System/Library/Fonts/Supplemental/Arial Unicode.ttf",
            "/Library/Fonts/Arial Unicode.ttf",
            "/System/Library/Fonts/Supplemental/Arial.ttf",
        ]);
    } else if cfg!(target_os = "windows") {
        if is_cjk_language(language) {
            fonts.extend([r"C:\Windows\Fonts\msyh.ttc", r"C:\Windows\Fonts\msgothic.ttc"]);
        }
        fonts.extend([r"C:\Windows\Fonts\arial.ttf", r"C:\Windows\Fonts\segoeui.ttf"]);
    } else {
        if is_cjk_language(language) {
            fonts.extend([
                "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
                "/usr/share/fonts/noto-cjk/NotoSansCJK-Regular.ttc",
            ]);
        }
        fonts.extend([
            "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
            "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
            "/usr/share/fonts/truetype/freefont/FreeSans.ttf",
            "/usr/share/fonts/truetype/noto/NotoSans-Regular.ttf",
        ]);
    }

    fonts.into_iter().map(PathBuf::from).collect()
}

// ---------------------------------------------------------------------------
// cosmic-text backed fonts
// ---------------------------------------------------------------------------

/// Shaping state for one font file, shared by every size loaded from it
struct FontState {
    font_system: FontSystem,
    swash_cache: SwashCache,
    family: String,
}

/// Loads TTF/OTF/TTC files with cosmic-text.
///
/// Each file gets its own `FontSystem` holding only that file, so shaping
/// never borrows glyphs from another font and missing characters show up as
/// `.notdef` in the layout.
#[derive(Default)]
pub struct CosmicFontProvider {
    states: Mutex<HashMap<PathBuf, Arc<Mutex<FontState>>>>,
}

impl CosmicFontProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn state_for(&self, path: &Path) -> RenderingResult<Arc<Mutex<FontState>>> {
        if let Some(state) = self.states.lock().get(path) {
            return Ok(state.clone());
        }

        let load_failed = |reason: String| RenderingError::FontLoadFailed {
            path: path.display().to_string(),
            reason,
        };

        let data = std::fs::read(path).map_err(|e| load_failed(e.to_string()))?;

        let mut db = fontdb::Database::new();
        db.load_font_data(data);
        let family = db
            .faces()
            .next()
            .and_then(|face| face.families.first())
            .map(|(name, _)| name.clone())
            .ok_or_else(|| load_failed("no usable font faces".to_string()))?;

        let state = Arc::new(Mutex::new(FontState {
            font_system: FontSystem::new_with_locale_and_db("en-US".to_string(), db),
            swash_cache: SwashCache::new(),
            family,
        }));

        debug!("Loaded font file {}", path.display());
        Ok(self
            .states
            .lock()
            .entry(path.to_path_buf())
            .or_insert(state)
            .clone())
    }
}

impl FontProvider for CosmicFontProvider {
    fn load(&self, path: &Path, size: u32) -> RenderingResult<Arc<dyn FontFace>> {
        if size == 0 {
            return Err(RenderingError::FontLoadFailed {
                path: path.display().to_string(),
                reason: "font size must be positive".to_string(),
            });
        }
        let state = self.state_for(path)?;
        Ok(Arc::new(CosmicFace {
            label: path.display().to_string(),
            size,
            state,
        }))
    }
}

struct CosmicFace {
    label: String,
    size: u32,
    state: Arc<Mutex<FontState>>,
}

/// Visual bounds of a shaped buffer
struct Layout {
    min_x: f32,
    visual_width: f32,
    lines: usize,
    missing_glyphs: usize,
}

impl CosmicFace {
    fn metrics(&self) -> Metrics {
        let size = self.size as f32;
        Metrics::new(size, size * LINE_HEIGHT_RATIO)
    }

    fn shape(&self, state: &mut FontState, text: &str) -> Buffer {
        let FontState {
            font_system,
            family,
            ..
        } = state;

        let mut buffer = Buffer::new(font_system, self.metrics());
        buffer.set_wrap(font_system, Wrap::None);
        let attrs = Attrs::new().family(Family::Name(family.as_str()));
        buffer.set_text(font_system, text, &attrs, Shaping::Advanced);
        buffer.shape_until_scroll(font_system, false);
        buffer
    }

    fn layout(buffer: &Buffer) -> Layout {
        let mut min_x = f32::MAX;
        let mut max_x = f32::MIN;
        let mut lines = 0;
        let mut missing_glyphs = 0;

        for run in buffer.layout_runs() {
            lines += 1;
            for glyph in run.glyphs.iter() {
                min_x = min_x.min(glyph.x);
                max_x = max_x.max(glyph.x + glyph.w);
                if glyph.glyph_id == 0 {
                    missing_glyphs += 1;
                }
            }
        }

        if min_x == f32::MAX {
            min_x = 0.0;
            max_x = 0.0;
        }

        Layout {
            min_x,
            visual_width: (max_x - min_x).max(0.0),
            lines,
            missing_glyphs,
        }
    }
}

impl FontFace for CosmicFace {
    fn label(&self) -> &str {
        &self.label
    }

    fn size(&self) -> u32 {
        self.size
    }

    fn measure(&self, text: &str) -> RenderingResult<TextExtent> {
        if text.is_empty() {
            return Ok(TextExtent::default());
        }

        let mut state = self.state.lock();
        let buffer = self.shape(&mut state, text);
        let layout = Self::layout(&buffer);

        let width = layout.visual_width * (1.0 + OVERHANG_RATIO * 2.0);
        let height = layout.lines as f32 * self.metrics().line_height;
        if !width.is_finite() || !height.is_finite() {
            return Err(RenderingError::MeasurementFailed(format!(
                "{} produced a non-finite extent for '{}'",
                self.label, text
            )));
        }

        Ok(TextExtent {
            width: width.ceil() as u32,
            height: height.ceil() as u32,
            missing_glyphs: layout.missing_glyphs,
        })
    }

    fn draw(
        &self,
        canvas: &mut RgbaImage,
        text: &str,
        x: i32,
        y: i32,
        color: Rgba<u8>,
    ) -> RenderingResult<()> {
        if text.is_empty() {
            return Ok(());
        }

        let mut state = self.state.lock();
        let buffer = self.shape(&mut state, text);
        let layout = Self::layout(&buffer);

        // Match the box returned by measure(): overhang padding on the left,
        // first glyph's left edge at the padding
        let origin_x = x + (layout.visual_width * OVERHANG_RATIO - layout.min_x).round() as i32;
        let (canvas_w, canvas_h) = (canvas.width() as i32, canvas.height() as i32);

        let FontState {
            font_system,
            swash_cache,
            ..
        } = &mut *state;
        let cosmic_color = CosmicColor::rgba(color[0], color[1], color[2], color[3]);

        buffer.draw(font_system, swash_cache, cosmic_color, |px, py, w, h, pixel| {
            if pixel.a() == 0 {
                return;
            }
            let alpha = pixel.a() as f32 / 255.0;
            let inv_alpha = 1.0 - alpha;

            for dy in 0..h as i32 {
                for dx in 0..w as i32 {
                    let img_x = origin_x + px + dx;
                    let img_y = y + py + dy;
                    if img_x < 0 || img_y < 0 || img_x >= canvas_w || img_y >= canvas_h {
                        continue;
                    }

                    let existing = canvas.get_pixel(img_x as u32, img_y as u32);
                    let blended = Rgba([
                        (pixel.r() as f32 * alpha + existing[0] as f32 * inv_alpha) as u8,
                        (pixel.g() as f32 * alpha + existing[1] as f32 * inv_alpha) as u8,
                        (pixel.b() as f32 * alpha + existing[2] as f32 * inv_alpha) as u8,
                        existing[3].max(pixel.a()),
                    ]);
                    canvas.put_pixel(img_x as u32, img_y as u32, blended);
                }
            }
        });

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// A resolved face is only valid for the language it was probed against
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FontKey {
    pub path: PathBuf,
    pub size: u32,
    pub language: String,
}

/// Resolved faces by (requested path, size, language). Unbounded, lives for the process.
#[derive(Default)]
pub struct FontCache {
    entries: RwLock<HashMap<FontKey, Arc<dyn FontFace>>>,
}

static GLOBAL_FONT_CACHE: Lazy<Arc<FontCache>> = Lazy::new(|| Arc::new(FontCache::default()));

impl FontCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> Arc<FontCache> {
        GLOBAL_FONT_CACHE.clone()
    }

    pub fn get(&self, key: &FontKey) -> Option<Arc<dyn FontFace>> {
        self.entries.read().get(key).cloned()
    }

    /// Insert unless another caller got there first; returns the cached face
    pub fn insert(&self, key: FontKey, face: Arc<dyn FontFace>) -> Arc<dyn FontFace> {
        self.entries.write().entry(key).or_insert(face).clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Picks a font that can render the target language
pub struct FontResolver {
    provider: Arc<dyn FontProvider>,
    default_path: PathBuf,
    fallbacks: Vec<PathBuf>,
    language: String,
    cache: Arc<FontCache>,
}

impl FontResolver {
    pub fn new(
        provider: Arc<dyn FontProvider>,
        default_path: impl Into<PathBuf>,
        language: &str,
        cache: Arc<FontCache>,
    ) -> Self {
        Self {
            provider,
            default_path: default_path.into(),
            fallbacks: platform_fallback_fonts(language),
            language: language.to_string(),
            cache,
        }
    }

    /// Replace the platform fallback list
    pub fn with_fallbacks(mut self, fallbacks: Vec<PathBuf>) -> Self {
        self.fallbacks = fallbacks;
        self
    }

    /// cosmic-text fonts with the shared process-wide cache
    pub fn with_system_fonts(default_path: impl Into<PathBuf>, language: &str) -> Self {
        let resolver = Self::new(
            Arc::new(CosmicFontProvider::new()),
            default_path,
            language,
            FontCache::global(),
        );
        info!(
            "Font resolver ready (default: {}, {} platform fallbacks, language: {})",
            resolver.default_path.display(),
            resolver.fallbacks.len(),
            resolver.language
        );
        resolver
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn cache(&self) -> &Arc<FontCache> {
        &self.cache
    }

    /// Resolve a face for `size`.
    ///
    /// Order: `requested`, the default font, the platform list, the built-in
    /// bitmap font. Each file font must cover the language probe. Never fails.
    pub fn resolve(&self, requested: Option<&Path>, size: u32) -> Arc<dyn FontFace> {
        let key = FontKey {
            path: requested.unwrap_or(self.default_path.as_path()).to_path_buf(),
            size,
            language: self.language.clone(),
        };
        if let Some(face) = self.cache.get(&key) {
            return face;
        }

        let candidates = requested
            .into_iter()
            .chain(std::iter::once(self.default_path.as_path()))
            .chain(self.fallbacks.iter().map(PathBuf::as_path));

        for path in candidates {
            match self.try_candidate(path, size) {
                Ok(face) => {
                    debug!("Resolved {} at {}px for '{}'", face.label(), size, self.language);
                    return self.cache.insert(key, face);
                }
                Err(e) => debug!("Font candidate rejected: {}", e),
            }
        }

        warn!(
            "No font covers '{}' at {}px; using the built-in bitmap font",
            self.language, size
        );
        self.cache.insert(key, Arc::new(BuiltinFont::new(size)))
    }

    fn try_candidate(&self, path: &Path, size: u32) -> RenderingResult<Arc<dyn FontFace>> {
        let face = self.provider.load(path, size)?;
        let probe = face.measure(probe_text(&self.language))?;
        if probe.missing_glyphs > 0 {
            return Err(RenderingError::MissingGlyphs {
                path: path.display().to_string(),
                language: self.language.clone(),
                missing: probe.missing_glyphs,
            });
        }
        Ok(face)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::BuiltinFontProvider;

    const DEJAVU: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf";

    #[test]
    fn test_probe_text_by_language() {
        assert_eq!(probe_text("tr"), "ğüşıöçĞÜŞİÖÇ");
        assert_eq!(probe_text("zh-CN"), "中文汉字");
        assert_eq!(probe_text("EN"), "Aa");
    }

    #[test]
    fn test_falls_back_to_builtin_when_nothing_loads() {
        let resolver = FontResolver::new(
            Arc::new(CosmicFontProvider::new()),
            "/nonexistent/font.ttf",
            "en",
            Arc::new(FontCache::new()),
        )
        .with_fallbacks(vec![PathBuf::from("/nonexistent/other.ttf")]);

        let face = resolver.resolve(None, 20);
        assert_eq!(face.label(), "builtin");
        assert_eq!(face.size(), 20);
    }

    #[test]
    fn test_probe_rejects_font_without_coverage() {
        // The ASCII-only provider cannot cover Turkish, so only the built-in font is left
        let provider = Arc::new(BuiltinFontProvider::new(&["/fonts/ascii.ttf"]));
        let resolver = FontResolver::new(provider.clone(), "/fonts/ascii.ttf", "tr", Arc::new(FontCache::new()))
            .with_fallbacks(vec![]);

        let face = resolver.resolve(None, 16);
        assert_eq!(face.label(), "builtin");
        assert_eq!(provider.loads(), 1);
    }

    #[test]
    fn test_requested_then_default_order() {
        let provider = Arc::new(BuiltinFontProvider::new(&["/fonts/default.ttf"]));
        let resolver = FontResolver::new(provider.clone(), "/fonts/default.ttf", "en", Arc::new(FontCache::new()))
            .with_fallbacks(vec![]);

        let face = resolver.resolve(Some(Path::new("/fonts/missing.ttf")), 16);
        assert_eq!(face.label(), "/fonts/default.ttf");
        assert_eq!(provider.loads(), 2);
    }

    #[test]
    fn test_cache_hits_skip_loading() {
        let provider = Arc::new(BuiltinFontProvider::new(&["/fonts/default.ttf"]));
        let cache = Arc::new(FontCache::new());
        let resolver = FontResolver::new(provider.clone(), "/fonts/default.ttf", "en", cache.clone())
            .with_fallbacks(vec![]);

        let first = resolver.resolve(None, 24);
        let second = resolver.resolve(None, 24);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(provider.loads(), 1);

        resolver.resolve(None, 25);
        assert_eq!(cache.len(), 2);
        assert_eq!(provider.loads(), 2);
    }

    #[test]
    fn test_shared_cache_keeps_languages_apart() {
        let provider = Arc::new(BuiltinFontProvider::new(&["/fonts/ascii.ttf"]));
        let cache = Arc::new(FontCache::new());
        let english = FontResolver::new(provider.clone(), "/fonts/ascii.ttf", "en", cache.clone())
            .with_fallbacks(vec![]);
        let turkish = FontResolver::new(provider.clone(), "/fonts/ascii.ttf", "tr", cache.clone())
            .with_fallbacks(vec![]);

        assert_eq!(english.resolve(None, 16).label(), "/fonts/ascii.ttf");
        // Same path and size, but the face accepted for English must not be reused
        assert_eq!(turkish.resolve(None, 16).label(), "builtin");
        assert_eq!(cache.len(), 2);
        assert_eq!(provider.loads(), 2);
    }

    #[test]
    fn test_cache_is_shared_across_threads() {
        let provider = Arc::new(BuiltinFontProvider::new(&["/fonts/default.ttf"]));
        let resolver = Arc::new(
            FontResolver::new(provider, "/fonts/default.ttf", "en", Arc::new(FontCache::new()))
                .with_fallbacks(vec![]),
        );

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let resolver = resolver.clone();
                std::thread::spawn(move || resolver.resolve(None, 12 + (i % 2)).size())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(resolver.cache().len(), 2);
    }

    #[test]
    fn test_missing_font_file_fails_to_load() {
        let err = CosmicFontProvider::new()
            .load(Path::new("/nonexistent/font.ttf"), 16)
            .err()
            .unwrap();
        assert!(matches!(err, RenderingError::FontLoadFailed { .. }));
    }

    #[test]
    fn test_cosmic_font_measures_and_probes() {
        if !Path::new(DEJAVU).exists() {
            return;
        }
        let provider = CosmicFontProvider::new();
        let face = provider.load(Path::new(DEJAVU), 20).unwrap();

        let small = face.measure("HELLO").unwrap();
        assert!(small.width > 0 && small.height >= 20);
        assert_eq!(small.missing_glyphs, 0);

        let wide = face.measure("HELLO WORLD").unwrap();
        assert!(wide.width > small.width);

        assert_eq!(face.measure(probe_text("tr")).unwrap().missing_glyphs, 0);
        assert!(face.measure(probe_text("ja")).unwrap().missing_glyphs > 0);
    }

    #[test]
    fn test_cosmic_font_draws_inside_measured_box() {
        if !Path::new(DEJAVU).exists() {
            return;
        }
        let face = CosmicFontProvider::new().load(Path::new(DEJAVU), 24).unwrap();
        let extent = face.measure("MERHABA").unwrap();

        let mut canvas = RgbaImage::from_pixel(300, 100, Rgba([255, 255, 255, 255]));
        face.draw(&mut canvas, "MERHABA", 20, 20, Rgba([0, 0, 0, 255])).unwrap();

        let mut inked = 0;
        for (x, y, p) in canvas.enumerate_pixels() {
            if p[0] < 128 {
                inked += 1;
                assert!(x >= 20 && x <= 20 + extent.width, "x={}", x);
                assert!(y >= 20 && y <= 20 + extent.height, "y={}", y);
            }
        }
        assert!(inked > 0);
    }
}
