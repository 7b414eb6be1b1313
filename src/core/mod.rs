pub mod capability;
pub mod config;
pub mod errors;
pub mod retry;
pub mod types;

// Re-export commonly used items for convenience
pub use capability::{LazyCapability, Readiness};
pub use config::Config;
pub use errors::{
    ConfigError, DegradedResultError, DetectionError, InitializationError, InpaintingError,
    PipelineError, RenderingError, TranslationError,
};
pub use retry::{is_transient_network_error, RetryExhausted, RetryPolicy};
pub use types::{
    BoundingBox, ProcessingResult, ProcessingStatus, RawDetection, Region, Stage, StageOutcome,
};
