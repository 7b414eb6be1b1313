pub mod detection;
pub mod inpainting;
pub mod rendering;
pub mod translation;

// Re-export commonly used services
pub use detection::{DetectionProvider, HttpDetectionProvider, TextDetector};
pub use inpainting::{HttpInpaintingProvider, InpaintingProvider, Restorer};
pub use rendering::{CosmicFontProvider, FontResolver, TextRenderer};
pub use translation::{
    GoogleTranslateProvider, LibreTranslateProvider, TranslationProvider, Translator,
};
