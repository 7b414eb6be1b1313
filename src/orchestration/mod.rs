pub mod artifacts;
pub mod pipeline;
pub mod stages;

pub use artifacts::{validate_job_id, ArtifactStore};
pub use pipeline::PipelineOrchestrator;
pub use stages::{ImageRestoration, TextDetection, TextRendering, TextTranslation};
