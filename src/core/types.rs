// Data model shared by every pipeline stage

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::core::errors::DegradedResultError;

/// Axis-aligned text box in image pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Box grown by `padding` on every side and clipped to `[0, img_w) x [0, img_h)`.
    ///
    /// Returns `(x0, y0, x1, y1)` with exclusive upper bounds, or `None` when
    /// nothing of the box remains inside the image.
    pub fn padded_clip(&self, padding: u32, img_w: u32, img_h: u32) -> Option<(u32, u32, u32, u32)> {
        let p = padding as i64;
        let x0 = (self.x as i64 - p).max(0);
        let y0 = (self.y as i64 - p).max(0);
        let x1 = (self.x as i64 + self.width as i64 + p).min(img_w as i64);
        let y1 = (self.y as i64 + self.height as i64 + p).min(img_h as i64);

        if x0 >= x1 || y0 >= y1 {
            return None;
        }
        Some((x0 as u32, y0 as u32, x1 as u32, y1 as u32))
    }
}

/// One detected text instance
///
/// Created by the detector; only the translator fills `translated_text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub bbox: BoundingBox,
    /// Rounded to 3 decimals, always in [0, 1]
    pub confidence: f32,
    pub text: String,
    pub translated_text: Option<String>,
    pub language: String,
}

impl Region {
    /// Target text if it is present and non-blank
    pub fn render_text(&self) -> Option<&str> {
        self.translated_text
            .as_deref()
            .filter(|t| !t.trim().is_empty())
    }
}

/// Raw output of a detection provider, before filtering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    /// Four (x, y) vertices, in any winding order
    pub quad: [[f32; 2]; 4],
    pub text: String,
    pub confidence: f32,
}

/// Pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Detecting,
    Translating,
    Restoring,
    Rendering,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Detecting => "detecting",
            Stage::Translating => "translating",
            Stage::Restoring => "restoring",
            Stage::Rendering => "rendering",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Result of a non-fatal stage
#[derive(Debug)]
pub enum StageOutcome<T> {
    Completed(T),
    /// The stage failed and `output` is the fallback value
    Degraded {
        output: T,
        error: DegradedResultError,
    },
}

impl<T> StageOutcome<T> {
    pub fn degraded(stage: Stage, output: T, reason: impl ToString) -> Self {
        StageOutcome::Degraded {
            output,
            error: DegradedResultError::new(stage, reason),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, StageOutcome::Degraded { .. })
    }

    /// Split into the usable value and the degradation, if any
    pub fn into_parts(self) -> (T, Option<DegradedResultError>) {
        match self {
            StageOutcome::Completed(output) => (output, None),
            StageOutcome::Degraded { output, error } => (output, Some(error)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    NoTextDetected,
    Processed,
}

impl ProcessingStatus {
    pub fn message(&self) -> &'static str {
        match self {
            ProcessingStatus::NoTextDetected => "No text detected",
            ProcessingStatus::Processed => "Processing successful",
        }
    }
}

/// Output of one `process` run
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingResult {
    pub job_id: String,
    pub output_path: PathBuf,
    pub regions: Vec<Region>,
    pub status: ProcessingStatus,
    pub message: String,
    pub degraded_stages: Vec<DegradedResultError>,
    pub total_text_regions: usize,
    pub processing_time_ms: f64,
}
