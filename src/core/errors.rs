// Error types for the page translation pipeline
//
// Every service gets its own thiserror enum. Only `PipelineError` is ever
// surfaced to the caller of `PipelineOrchestrator::process`; the rest are
// either absorbed by a fallback (and logged) or wrapped into it.

use crate::core::types::Stage;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// A lazily-created capability (detector, inpainting model) never became ready.
#[derive(Debug, Error)]
#[error("{capability} failed to initialize after {attempts} attempt(s): {message}")]
pub struct InitializationError {
    pub capability: String,
    pub attempts: usize,
    pub message: String,
}

/// Text detection errors
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error(transparent)]
    Unavailable(#[from] InitializationError),

    #[error("Detection provider failed: {0}")]
    ProviderFailed(String),

    #[error("Detection request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Image encoding failed: {0}")]
    ImageError(#[from] image::ImageError),
}

/// Translation errors
#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("API request failed: {0}")]
    ApiRequestFailed(#[from] reqwest::Error),

    #[error("Provider {provider} returned status {status}: {body}")]
    BadStatus {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Provider {0} returned an empty translation")]
    EmptyResult(String),

    #[error("Provider {0} is not configured")]
    NotConfigured(String),

    #[error("Provider {provider} is temporarily disabled (circuit open)")]
    CircuitOpen { provider: String },
}

/// Inpainting errors
#[derive(Debug, Error)]
pub enum InpaintingError {
    #[error(transparent)]
    Unavailable(#[from] InitializationError),

    #[error("Inpainting request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Inpainting provider failed: {0}")]
    ProviderFailed(String),

    #[error("Mask is {mask_width}x{mask_height} but image is {image_width}x{image_height}")]
    MaskSizeMismatch {
        image_width: u32,
        image_height: u32,
        mask_width: u32,
        mask_height: u32,
    },

    #[error("Image processing failed: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("OpenCV inpainting failed: {0}")]
    OpenCv(#[from] opencv::Error),
}

/// Rendering errors
#[derive(Debug, Error)]
pub enum RenderingError {
    #[error("Font could not be loaded from {path}: {reason}")]
    FontLoadFailed { path: String, reason: String },

    #[error("Font {path} cannot render {missing} of the probe glyphs for '{language}'")]
    MissingGlyphs {
        path: String,
        language: String,
        missing: usize,
    },

    #[error("Invalid region dimensions: {0}")]
    InvalidRegion(String),

    #[error("Text measurement failed: {0}")]
    MeasurementFailed(String),
}

/// A stage failed but a fallback produced usable output.
///
/// Never returned from `process`; carried in `ProcessingResult::degraded_stages`
/// and logged at warn level.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("{stage} degraded: {reason}")]
pub struct DegradedResultError {
    pub stage: Stage,
    pub reason: String,
}

impl DegradedResultError {
    pub fn new(stage: Stage, reason: impl ToString) -> Self {
        Self {
            stage,
            reason: reason.to_string(),
        }
    }
}

/// Fatal pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Text detection failed for job {job_id}: {source}")]
    DetectionFailed {
        job_id: String,
        #[source]
        source: DetectionError,
    },

    #[error("Failed to read input image {path}: {message}")]
    ImageLoadFailed { path: PathBuf, message: String },

    #[error("Failed to write artifact {path}: {message}")]
    ArtifactWriteFailed { path: PathBuf, message: String },

    #[error("Invalid job id '{0}'")]
    InvalidJobId(String),

    #[error("Task join failed: {0}")]
    TaskJoinFailed(String),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Confidence threshold must be in [0.0, 1.0], got {0}")]
    InvalidConfidenceThreshold(f32),

    #[error("Invalid detection config: {0}")]
    InvalidDetectionConfig(String),

    #[error("Invalid translation config: {0}")]
    InvalidTranslationConfig(String),

    #[error("Invalid inpainting config: {0}")]
    InvalidInpaintingConfig(String),

    #[error("Invalid rendering config: {0}")]
    InvalidRenderingConfig(String),

    #[error("Invalid storage config: {0}")]
    InvalidStorageConfig(String),
}

// Convenience type aliases for Results
pub type DetectionResult<T> = Result<T, DetectionError>;
pub type TranslationResult<T> = Result<T, TranslationError>;
pub type InpaintingResult<T> = Result<T, InpaintingError>;
pub type RenderingResult<T> = Result<T, RenderingError>;
pub type PipelineResult<T> = Result<T, PipelineError>;
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Attach the job id to a detection failure
pub trait ErrorContext<T> {
    fn with_job_context(self, job_id: &str) -> PipelineResult<T>;
}

impl<T> ErrorContext<T> for DetectionResult<T> {
    fn with_job_context(self, job_id: &str) -> PipelineResult<T> {
        self.map_err(|source| PipelineError::DetectionFailed {
            job_id: job_id.to_string(),
            source,
        })
    }
}
