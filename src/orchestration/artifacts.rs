// Job-named output files

use image::{DynamicImage, RgbaImage};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::core::errors::{PipelineError, PipelineResult};
use crate::utils::image_ops::write_png_async;

const MAX_JOB_ID_LEN: usize = 128;

/// Job ids become file name prefixes, so only `[A-Za-z0-9_-]` is accepted
pub fn validate_job_id(job_id: &str) -> PipelineResult<()> {
    let valid = !job_id.is_empty()
        && job_id.len() <= MAX_JOB_ID_LEN
        && job_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(PipelineError::InvalidJobId(job_id.to_string()))
    }
}

/// Output directory holding one artifact per job
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    output_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// `{job_id}_translated.png`
    pub fn translated_path(&self, job_id: &str) -> PathBuf {
        self.output_dir.join(format!("{}_translated.png", job_id))
    }

    /// `{job_id}_translated.{ext}`, keeping the source file's extension
    pub fn passthrough_path(&self, job_id: &str, source: &Path) -> PathBuf {
        let ext = source
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty())
            .unwrap_or("png")
            .to_ascii_lowercase();
        self.output_dir.join(format!("{}_translated.{}", job_id, ext))
    }

    async fn ensure_dir(&self) -> PipelineResult<()> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| PipelineError::ArtifactWriteFailed {
                path: self.output_dir.clone(),
                message: e.to_string(),
            })
    }

    /// Encode the final page as PNG
    pub async fn write_translated(&self, job_id: &str, image: RgbaImage) -> PipelineResult<PathBuf> {
        self.ensure_dir().await?;
        let path = self.translated_path(job_id);
        write_png_async(DynamicImage::ImageRgba8(image), path.clone())
            .await
            .map_err(|e| PipelineError::ArtifactWriteFailed {
                path: path.clone(),
                message: format!("{:#}", e),
            })?;
        debug!("Wrote {}", path.display());
        Ok(path)
    }

    /// Store the untouched source bytes for a page without text
    pub async fn write_passthrough(
        &self,
        job_id: &str,
        source: &Path,
        bytes: &[u8],
    ) -> PipelineResult<PathBuf> {
        self.ensure_dir().await?;
        let path = self.passthrough_path(job_id, source);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| PipelineError::ArtifactWriteFailed {
                path: path.clone(),
                message: e.to_string(),
            })?;
        debug!("Copied source to {}", path.display());
        Ok(path)
    }

    /// Remove every file whose name starts with `job_id`.
    ///
    /// Returns the removed file names. Failures are logged and skipped.
    pub async fn cleanup(&self, job_id: &str) -> Vec<String> {
        let mut removed = Vec::new();
        if job_id.is_empty() {
            warn!("Refusing to clean up with an empty job id");
            return removed;
        }

        let mut entries = match tokio::fs::read_dir(&self.output_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Nothing to clean in {}: {}", self.output_dir.display(), e);
                return removed;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to list {}: {}", self.output_dir.display(), e);
                    break;
                }
            };

            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(job_id) {
                continue;
            }
            match entry.file_type().await {
                Ok(file_type) if file_type.is_file() => {}
                _ => continue,
            }

            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => {
                    info!("Removed {}", name);
                    removed.push(name);
                }
                Err(e) => warn!("Failed to remove {}: {}", name, e),
            }
        }

        removed.sort();
        removed
    }
}
