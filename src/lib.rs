// Manga page translation pipeline
//
// Detect text, translate it, erase it from the page and typeset the
// translation back into the same boxes.

pub mod core;
pub mod middleware;
pub mod orchestration;
pub mod services;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types and functions
pub use crate::core::{
    config::Config,
    errors::{
        ConfigError, DegradedResultError, DetectionError, InitializationError, InpaintingError,
        PipelineError, RenderingError, TranslationError,
    },
    types::{BoundingBox, ProcessingResult, ProcessingStatus, Region, Stage},
};

pub use middleware::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

pub use orchestration::{ArtifactStore, PipelineOrchestrator};

pub use services::{Restorer, TextDetector, TextRenderer, Translator};

pub use utils::{Metrics, MetricsSnapshot};
