// Page pipeline: Detecting -> Translating -> Restoring -> Rendering -> Done
//
// Detection, reading the input and writing the artifact are fatal. The other
// stages degrade: translation falls back to the source text, restoration to
// the original page, rendering to the restored page.

use image::RgbaImage;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

use super::artifacts::{validate_job_id, ArtifactStore};
use super::stages::{ImageRestoration, TextDetection, TextRendering, TextTranslation};
use crate::core::config::Config;
use crate::core::errors::{
    DegradedResultError, ErrorContext, PipelineError, PipelineResult,
};
use crate::core::types::{ProcessingResult, ProcessingStatus, Region, Stage, StageOutcome};
use crate::services::detection::TextDetector;
use crate::services::inpainting::{enhance_mask, Restorer};
use crate::services::rendering::TextRenderer;
use crate::services::translation::Translator;
use crate::utils::image_ops::load_image_file_async;
use crate::utils::metrics::Metrics;

const DEFAULT_DILATION_SIZE: u32 = 5;

pub struct PipelineOrchestrator {
    detector: Arc<dyn TextDetection>,
    translator: Arc<dyn TextTranslation>,
    restorer: Arc<dyn ImageRestoration>,
    renderer: Arc<dyn TextRendering>,
    artifacts: ArtifactStore,
    dilation_size: u32,
    metrics: Metrics,
}

impl PipelineOrchestrator {
    pub fn new(
        detector: Arc<dyn TextDetection>,
        translator: Arc<dyn TextTranslation>,
        restorer: Arc<dyn ImageRestoration>,
        renderer: Arc<dyn TextRendering>,
        artifacts: ArtifactStore,
    ) -> Self {
        Self {
            detector,
            translator,
            restorer,
            renderer,
            artifacts,
            dilation_size: DEFAULT_DILATION_SIZE,
            metrics: Metrics::new(),
        }
    }

    /// Build every stage from configuration.
    ///
    /// Model handles are created lazily on first use, so this never touches
    /// the network.
    pub fn from_config(config: &Config) -> Self {
        let detector = TextDetector::from_config(&config.detection, config.source_lang());
        let translator = Translator::from_config(&config.translation);
        let restorer = Restorer::from_config(&config.inpainting, &config.detection);
        let renderer = TextRenderer::from_config(&config.rendering, config.target_lang());

        info!(
            "✓ Pipeline ready ({} -> {}, providers: [{}], output: {})",
            config.source_lang(),
            config.target_lang(),
            translator.provider_names().join(", "),
            config.temp_dir().display()
        );

        Self::new(
            Arc::new(detector),
            Arc::new(translator),
            Arc::new(restorer),
            Arc::new(renderer),
            ArtifactStore::new(config.temp_dir()),
        )
        .with_dilation_size(config.inpainting.dilation_size)
    }

    pub fn with_dilation_size(mut self, dilation_size: u32) -> Self {
        self.dilation_size = dilation_size;
        self
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    /// Translate one page and write `{job_id}_translated.*` to the output directory
    #[instrument(skip(self, image_path), fields(image = %image_path.display()))]
    pub async fn process(&self, image_path: &Path, job_id: &str) -> PipelineResult<ProcessingResult> {
        let start = Instant::now();
        self.metrics.record_run_started();

        let result = self.run(image_path, job_id, start).await;
        if let Err(e) = &result {
            error!("[{}] {} -> {}: {}", job_id, Stage::Failed, image_path.display(), e);
            self.metrics.record_run_failed();
        }
        result
    }

    /// Remove this job's files from the output directory
    pub async fn cleanup(&self, job_id: &str) -> Vec<String> {
        self.artifacts.cleanup(job_id).await
    }

    async fn run(&self, image_path: &Path, job_id: &str, start: Instant) -> PipelineResult<ProcessingResult> {
        validate_job_id(job_id)?;

        let (bytes, image) = load_image_file_async(image_path)
            .await
            .map_err(|e| PipelineError::ImageLoadFailed {
                path: image_path.to_path_buf(),
                message: format!("{:#}", e),
            })?;
        let (width, height) = (image.width(), image.height());

        // Detecting
        let mut stage = Stage::Detecting;
        info!("[{}] {} ({}x{})", job_id, stage, width, height);
        let stage_start = Instant::now();
        let regions = self.detector.detect(&image).await.with_job_context(job_id)?;
        self.metrics.record_stage_duration(stage, stage_start.elapsed());

        if regions.is_empty() {
            let output_path = self
                .artifacts
                .write_passthrough(job_id, image_path, &bytes)
                .await?;
            info!("[{}] {}: no text detected", job_id, Stage::Done);
            self.metrics.record_run_no_text(start.elapsed());
            return Ok(Self::result(
                job_id,
                output_path,
                Vec::new(),
                ProcessingStatus::NoTextDetected,
                Vec::new(),
                start,
            ));
        }

        let mut degraded = Vec::new();

        stage = self.advance(job_id, stage, Stage::Translating);
        let stage_start = Instant::now();
        let outcome = self.translate_stage(regions).await;
        let regions = self.settle(job_id, stage, outcome, &mut degraded);
        self.metrics.record_stage_duration(stage, stage_start.elapsed());

        stage = self.advance(job_id, stage, Stage::Restoring);
        let stage_start = Instant::now();
        let original = image.to_rgba8();
        let outcome = self.restore_stage(original, &regions).await;
        let restored = self.settle(job_id, stage, outcome, &mut degraded);
        self.metrics.record_stage_duration(stage, stage_start.elapsed());

        stage = self.advance(job_id, stage, Stage::Rendering);
        let stage_start = Instant::now();
        let outcome = self.render_stage(restored, &regions).await;
        let rendered = self.settle(job_id, stage, outcome, &mut degraded);
        self.metrics.record_stage_duration(stage, stage_start.elapsed());

        let output_path = self.artifacts.write_translated(job_id, rendered).await?;
        stage = self.advance(job_id, stage, Stage::Done);

        info!(
            "[{}] {}: {} regions in {:.2}s ({} degraded) -> {}",
            job_id,
            stage,
            regions.len(),
            start.elapsed().as_secs_f64(),
            degraded.len(),
            output_path.display()
        );
        self.metrics.record_run_processed(regions.len(), start.elapsed());

        Ok(Self::result(
            job_id,
            output_path,
            regions,
            ProcessingStatus::Processed,
            degraded,
            start,
        ))
    }

    fn advance(&self, job_id: &str, from: Stage, to: Stage) -> Stage {
        info!("[{}] {} -> {}", job_id, from, to);
        to
    }

    /// Unwrap a stage outcome, recording any degradation
    fn settle<T>(
        &self,
        job_id: &str,
        stage: Stage,
        outcome: StageOutcome<T>,
        degraded: &mut Vec<DegradedResultError>,
    ) -> T {
        let (output, error) = outcome.into_parts();
        if let Some(error) = error {
            warn!("[{}] {}", job_id, error);
            self.metrics.record_degraded(stage);
            degraded.push(error);
        }
        output
    }

    async fn translate_stage(&self, regions: Vec<Region>) -> StageOutcome<Vec<Region>> {
        let fallback: Vec<Region> = regions
            .iter()
            .cloned()
            .map(|mut region| {
                region.translated_text = Some(region.text.clone());
                region
            })
            .collect();

        match self.translator.translate_regions(regions).await {
            Ok(translated) => StageOutcome::Completed(translated),
            Err(e) => StageOutcome::degraded(Stage::Translating, fallback, format!("{:#}", e)),
        }
    }

    async fn restore_stage(&self, original: RgbaImage, regions: &[Region]) -> StageOutcome<RgbaImage> {
        let (width, height) = original.dimensions();
        let mask = self.detector.text_mask(width, height, regions);
        let mask = enhance_mask(&mask, self.dilation_size);

        match self.restorer.restore(&original, &mask).await {
            Ok(restored) if restored.dimensions() == original.dimensions() => {
                StageOutcome::Completed(restored)
            }
            Ok(restored) => StageOutcome::degraded(
                Stage::Restoring,
                original,
                format!(
                    "restored image is {}x{}, expected {}x{}",
                    restored.width(),
                    restored.height(),
                    width,
                    height
                ),
            ),
            Err(e) => StageOutcome::degraded(Stage::Restoring, original, e),
        }
    }

    async fn render_stage(&self, base: RgbaImage, regions: &[Region]) -> StageOutcome<RgbaImage> {
        let renderer = self.renderer.clone();
        let input = base.clone();
        let regions = regions.to_vec();

        let rendered =
            tokio::task::spawn_blocking(move || renderer.render_regions(&input, &regions)).await;

        match rendered {
            Ok(Ok(image)) => StageOutcome::Completed(image),
            Ok(Err(e)) => StageOutcome::degraded(Stage::Rendering, base, e),
            Err(e) => StageOutcome::degraded(
                Stage::Rendering,
                base,
                PipelineError::TaskJoinFailed(e.to_string()),
            ),
        }
    }

    fn result(
        job_id: &str,
        output_path: std::path::PathBuf,
        regions: Vec<Region>,
        status: ProcessingStatus,
        degraded_stages: Vec<DegradedResultError>,
        start: Instant,
    ) -> ProcessingResult {
        ProcessingResult {
            job_id: job_id.to_string(),
            output_path,
            total_text_regions: regions.len(),
            regions,
            status,
            message: status.message().to_string(),
            degraded_stages,
            processing_time_ms: start.elapsed().as_secs_f64() * 1000.0,
        }
    }
}
