use crate::core::errors::ConfigError;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub log_level: Level,
}

/// Text detection configuration
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    /// OCR sidecar base URL (EasyOCR-compatible `/detect` endpoint)
    pub endpoint: String,
    /// Languages the OCR reader is created with
    pub languages: Vec<String>,
    pub confidence_threshold: f32,
    /// Minimum box width and height in pixels
    pub min_region_size: u32,
    pub mask_padding: u32,
    pub init_max_attempts: usize,
    /// Linear backoff step between initialization attempts (2s, 4s, ...)
    pub init_backoff: Duration,
    pub request_timeout: Duration,
}

/// Translation configuration
#[derive(Debug, Clone)]
pub struct TranslationConfig {
    pub source_lang: String,
    pub target_lang: String,
    /// Provider names in priority order (`google`, `libre`)
    pub providers: Vec<String>,
    pub libre_url: Option<String>,
    pub libre_api_key: Option<String>,
    pub max_attempts: usize,
    /// Linear backoff step between attempts on one provider (0.5s, 1.0s, ...)
    pub retry_backoff: Duration,
    pub request_timeout: Duration,
    pub circuit_failure_threshold: usize,
    pub circuit_cooldown: Duration,
}

/// Inpainting configuration
#[derive(Debug, Clone)]
pub struct InpaintingConfig {
    /// IOPaint/LaMa server URL; classical inpainting only when unset
    pub endpoint: Option<String>,
    /// Side of the square dilation element; 0 or 1 disables dilation, other
    /// values must be odd so the element has a center pixel
    pub dilation_size: u32,
    pub telea_radius: u32,
    pub request_timeout: Duration,
}

/// Rendering configuration
#[derive(Debug, Clone)]
pub struct RenderingConfig {
    pub default_font_path: PathBuf,
    pub font_size_min: u32,
    pub font_size_max: u32,
    /// Fraction of the region the text may occupy in each dimension
    pub fit_margin: f32,
    pub background_box: bool,
    pub background_opacity: f32,
}

/// Artifact storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub temp_dir: PathBuf,
    pub max_file_size: u64,
    pub min_image_dimension: u32,
}

/// Main application configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub detection: DetectionConfig,
    pub translation: TranslationConfig,
    pub inpainting: InpaintingConfig,
    pub rendering: RenderingConfig,
    pub storage: StorageConfig,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8866".to_string(),
            languages: vec!["en".to_string(), "tr".to_string()],
            confidence_threshold: 0.3,
            min_region_size: 10,
            mask_padding: 5,
            init_max_attempts: 3,
            init_backoff: Duration::from_secs(2),
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            source_lang: "en".to_string(),
            target_lang: "tr".to_string(),
            providers: vec!["google".to_string(), "libre".to_string()],
            libre_url: None,
            libre_api_key: None,
            max_attempts: 3,
            retry_backoff: Duration::from_millis(500),
            request_timeout: Duration::from_secs(15),
            circuit_failure_threshold: 5,
            circuit_cooldown: Duration::from_secs(60),
        }
    }
}

impl Default for InpaintingConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            dilation_size: 5,
            telea_radius: 3,
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl Default for RenderingConfig {
    fn default() -> Self {
        Self {
            default_font_path: PathBuf::from("./fonts/arial.ttf"),
            font_size_min: 12,
            font_size_max: 48,
            fit_margin: 0.9,
            background_box: false,
            background_opacity: 0.9,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            temp_dir: PathBuf::from("./temp"),
            max_file_size: 10 * 1024 * 1024,
            min_image_dimension: 100,
        }
    }
}

impl Config {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let config = Self::load_from_env();
        config.validate()?;
        Ok(config)
    }

    fn load_from_env() -> Self {
        let defaults = Self::default();

        let log_level = env::var("LOG_LEVEL")
            .ok()
            .and_then(|s| match s.to_lowercase().as_str() {
                "trace" => Some(Level::TRACE),
                "debug" => Some(Level::DEBUG),
                "info" => Some(Level::INFO),
                "warn" | "warning" => Some(Level::WARN),
                "error" => Some(Level::ERROR),
                _ => None,
            })
            .unwrap_or(defaults.logging.log_level);

        let d = defaults.detection;
        let t = defaults.translation;
        let i = defaults.inpainting;
        let r = defaults.rendering;
        let s = defaults.storage;

        Self {
            logging: LoggingConfig { log_level },
            detection: DetectionConfig {
                endpoint: env::var("OCR_ENDPOINT").unwrap_or(d.endpoint),
                languages: env_list("OCR_LANGUAGES").unwrap_or(d.languages),
                confidence_threshold: env_parse("OCR_CONFIDENCE_THRESHOLD")
                    .unwrap_or(d.confidence_threshold),
                min_region_size: env_parse("OCR_MIN_REGION_SIZE").unwrap_or(d.min_region_size),
                mask_padding: env_parse("MASK_PADDING").unwrap_or(d.mask_padding),
                init_max_attempts: env_parse("OCR_INIT_ATTEMPTS").unwrap_or(d.init_max_attempts),
                init_backoff: env_parse("OCR_INIT_BACKOFF_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(d.init_backoff),
                request_timeout: env_parse("OCR_TIMEOUT_SECONDS")
                    .map(Duration::from_secs)
                    .unwrap_or(d.request_timeout),
            },
            translation: TranslationConfig {
                source_lang: env::var("TRANSLATION_SOURCE_LANG").unwrap_or(t.source_lang),
                target_lang: env::var("TRANSLATION_TARGET_LANG").unwrap_or(t.target_lang),
                providers: env_list("TRANSLATION_PROVIDERS").unwrap_or(t.providers),
                libre_url: env::var("LIBRETRANSLATE_URL")
                    .ok()
                    .map(|s| s.trim().trim_end_matches('/').to_string())
                    .filter(|s| !s.is_empty()),
                libre_api_key: env::var("LIBRETRANSLATE_API_KEY")
                    .ok()
                    .filter(|s| !s.trim().is_empty()),
                max_attempts: env_parse("TRANSLATION_MAX_ATTEMPTS").unwrap_or(t.max_attempts),
                retry_backoff: env_parse("TRANSLATION_BACKOFF_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(t.retry_backoff),
                request_timeout: env_parse("TRANSLATION_TIMEOUT_SECONDS")
                    .map(Duration::from_secs)
                    .unwrap_or(t.request_timeout),
                circuit_failure_threshold: env_parse("TRANSLATION_CIRCUIT_THRESHOLD")
                    .unwrap_or(t.circuit_failure_threshold),
                circuit_cooldown: env_parse("TRANSLATION_CIRCUIT_COOLDOWN_SECONDS")
                    .map(Duration::from_secs)
                    .unwrap_or(t.circuit_cooldown),
            },
            inpainting: InpaintingConfig {
                endpoint: env::var("INPAINTING_ENDPOINT")
                    .ok()
                    .map(|s| s.trim().trim_end_matches('/').to_string())
                    .filter(|s| !s.is_empty()),
                dilation_size: env_parse("MASK_DILATION_SIZE").unwrap_or(i.dilation_size),
                telea_radius: env_parse("TELEA_RADIUS").unwrap_or(i.telea_radius),
                request_timeout: env_parse("INPAINTING_TIMEOUT_SECONDS")
                    .map(Duration::from_secs)
                    .unwrap_or(i.request_timeout),
            },
            rendering: RenderingConfig {
                default_font_path: env::var("DEFAULT_FONT_PATH")
                    .map(PathBuf::from)
                    .unwrap_or(r.default_font_path),
                font_size_min: env_parse("FONT_SIZE_MIN").unwrap_or(r.font_size_min),
                font_size_max: env_parse("FONT_SIZE_MAX").unwrap_or(r.font_size_max),
                fit_margin: env_parse("FONT_FIT_MARGIN").unwrap_or(r.fit_margin),
                background_box: env_parse("TEXT_BACKGROUND_BOX").unwrap_or(r.background_box),
                background_opacity: env_parse("TEXT_BACKGROUND_OPACITY")
                    .unwrap_or(r.background_opacity),
            },
            storage: StorageConfig {
                temp_dir: env::var("TEMP_DIR").map(PathBuf::from).unwrap_or(s.temp_dir),
                max_file_size: env_parse("MAX_FILE_SIZE").unwrap_or(s.max_file_size),
                min_image_dimension: env_parse("MIN_IMAGE_DIMENSION")
                    .unwrap_or(s.min_image_dimension),
            },
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.detection.confidence_threshold) {
            return Err(ConfigError::InvalidConfidenceThreshold(
                self.detection.confidence_threshold,
            ));
        }

        if self.detection.init_max_attempts == 0 {
            return Err(ConfigError::InvalidDetectionConfig(
                "init_max_attempts must be > 0".to_string(),
            ));
        }

        if self.translation.source_lang.trim().is_empty()
            || self.translation.target_lang.trim().is_empty()
        {
            return Err(ConfigError::InvalidTranslationConfig(
                "source and target languages must be set".to_string(),
            ));
        }

        if self.translation.max_attempts == 0 {
            return Err(ConfigError::InvalidTranslationConfig(
                "max_attempts must be > 0".to_string(),
            ));
        }

        if self.translation.circuit_failure_threshold == 0 {
            return Err(ConfigError::InvalidTranslationConfig(
                "circuit_failure_threshold must be > 0".to_string(),
            ));
        }

        if self.inpainting.telea_radius == 0 {
            return Err(ConfigError::InvalidInpaintingConfig(
                "telea_radius must be > 0".to_string(),
            ));
        }

        if self.inpainting.dilation_size > 1 && self.inpainting.dilation_size % 2 == 0 {
            return Err(ConfigError::InvalidInpaintingConfig(format!(
                "dilation_size must be odd, got {}",
                self.inpainting.dilation_size
            )));
        }

        if self.inpainting.dilation_size > 255 {
            return Err(ConfigError::InvalidInpaintingConfig(format!(
                "dilation_size must be <= 255, got {}",
                self.inpainting.dilation_size
            )));
        }

        let r = &self.rendering;
        if r.font_size_min == 0 || r.font_size_min > r.font_size_max {
            return Err(ConfigError::InvalidRenderingConfig(format!(
                "font size range must satisfy 0 < min <= max, got {}..={}",
                r.font_size_min, r.font_size_max
            )));
        }

        if !(r.fit_margin > 0.0 && r.fit_margin <= 1.0) {
            return Err(ConfigError::InvalidRenderingConfig(format!(
                "fit_margin must be in (0.0, 1.0], got {}",
                r.fit_margin
            )));
        }

        if !(0.0..=1.0).contains(&r.background_opacity) {
            return Err(ConfigError::InvalidRenderingConfig(format!(
                "background_opacity must be in [0.0, 1.0], got {}",
                r.background_opacity
            )));
        }

        if self.storage.temp_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidStorageConfig(
                "temp_dir must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    pub fn log_level(&self) -> Level {
        self.logging.log_level
    }

    pub fn source_lang(&self) -> &str {
        &self.translation.source_lang
    }

    pub fn target_lang(&self) -> &str {
        &self.translation.target_lang
    }

    pub fn temp_dir(&self) -> &PathBuf {
        &self.storage.temp_dir
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

/// Comma-separated list; `None` when unset or empty
fn env_list(key: &str) -> Option<Vec<String>> {
    env::var(key)
        .ok()
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
        })
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.source_lang(), "en");
        assert_eq!(config.target_lang(), "tr");
        assert_eq!(config.rendering.font_size_min, 12);
        assert_eq!(config.rendering.font_size_max, 48);
        assert_eq!(config.detection.mask_padding, 5);
        assert_eq!(config.inpainting.dilation_size, 5);
        assert!(!config.rendering.background_box);
    }

    #[test]
    fn test_rejects_inverted_font_range() {
        let mut config = Config::default();
        config.rendering.font_size_min = 50;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRenderingConfig(_))
        ));
    }

    #[test]
    fn test_rejects_out_of_range_confidence() {
        let mut config = Config::default();
        config.detection.confidence_threshold = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConfidenceThreshold(_))
        ));
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let mut config = Config::default();
        config.translation.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_even_dilation_size() {
        let mut config = Config::default();
        config.inpainting.dilation_size = 4;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidInpaintingConfig(_))
        ));

        config.inpainting.dilation_size = 0;
        assert!(config.validate().is_ok());
        config.inpainting.dilation_size = 7;
        assert!(config.validate().is_ok());
    }
}
