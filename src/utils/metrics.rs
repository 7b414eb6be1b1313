use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::types::Stage;

/// Duration samples kept per series; older samples are dropped
const MAX_SAMPLES: usize = 1024;

/// Process-wide pipeline metrics.
///
/// Tracks runs, per-stage durations and degradations. Cheap to clone and
/// safe to share between concurrent runs.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    // Run outcomes
    runs_started: AtomicUsize,
    runs_processed: AtomicUsize,
    runs_no_text: AtomicUsize,
    runs_failed: AtomicUsize,
    regions_detected: AtomicUsize,

    // Stage durations
    detection_ms: Samples,
    translation_ms: Samples,
    restoration_ms: Samples,
    rendering_ms: Samples,
    total_ms: Samples,

    // Degradations
    translation_degraded: AtomicUsize,
    restoration_degraded: AtomicUsize,
    rendering_degraded: AtomicUsize,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                runs_started: AtomicUsize::new(0),
                runs_processed: AtomicUsize::new(0),
                runs_no_text: AtomicUsize::new(0),
                runs_failed: AtomicUsize::new(0),
                regions_detected: AtomicUsize::new(0),
                detection_ms: Samples::default(),
                translation_ms: Samples::default(),
                restoration_ms: Samples::default(),
                rendering_ms: Samples::default(),
                total_ms: Samples::default(),
                translation_degraded: AtomicUsize::new(0),
                restoration_degraded: AtomicUsize::new(0),
                rendering_degraded: AtomicUsize::new(0),
                start_time: Instant::now(),
            }),
        }
    }

    pub fn record_run_started(&self) {
        self.inner.runs_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_run_processed(&self, regions: usize, total: Duration) {
        self.inner.runs_processed.fetch_add(1, Ordering::Relaxed);
        self.inner.regions_detected.fetch_add(regions, Ordering::Relaxed);
        self.inner.total_ms.push(total);
    }

    pub fn record_run_no_text(&self, total: Duration) {
        self.inner.runs_no_text.fetch_add(1, Ordering::Relaxed);
        self.inner.total_ms.push(total);
    }

    pub fn record_run_failed(&self) {
        self.inner.runs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stage_duration(&self, stage: Stage, duration: Duration) {
        let samples = match stage {
            Stage::Detecting => &self.inner.detection_ms,
            Stage::Translating => &self.inner.translation_ms,
            Stage::Restoring => &self.inner.restoration_ms,
            Stage::Rendering => &self.inner.rendering_ms,
            Stage::Done | Stage::Failed => return,
        };
        samples.push(duration);
    }

    pub fn record_degraded(&self, stage: Stage) {
        let counter = match stage {
            Stage::Translating => &self.inner.translation_degraded,
            Stage::Restoring => &self.inner.restoration_degraded,
            Stage::Rendering => &self.inner.rendering_degraded,
            Stage::Detecting | Stage::Done | Stage::Failed => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    // Get snapshot for reporting
    pub fn snapshot(&self) -> MetricsSnapshot {
        let total = self.inner.total_ms.values();

        MetricsSnapshot {
            runs_started: self.inner.runs_started.load(Ordering::Relaxed),
            runs_processed: self.inner.runs_processed.load(Ordering::Relaxed),
            runs_no_text: self.inner.runs_no_text.load(Ordering::Relaxed),
            runs_failed: self.inner.runs_failed.load(Ordering::Relaxed),
            regions_detected: self.inner.regions_detected.load(Ordering::Relaxed),
            detection_avg_ms: avg(&self.inner.detection_ms.values()),
            translation_avg_ms: avg(&self.inner.translation_ms.values()),
            restoration_avg_ms: avg(&self.inner.restoration_ms.values()),
            rendering_avg_ms: avg(&self.inner.rendering_ms.values()),
            total_avg_ms: avg(&total),
            total_p95_ms: percentile(&total, 0.95),
            translation_degraded: self.inner.translation_degraded.load(Ordering::Relaxed),
            restoration_degraded: self.inner.restoration_degraded.load(Ordering::Relaxed),
            rendering_degraded: self.inner.rendering_degraded.load(Ordering::Relaxed),
            uptime_seconds: self.inner.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub runs_started: usize,
    pub runs_processed: usize,
    pub runs_no_text: usize,
    pub runs_failed: usize,
    pub regions_detected: usize,
    pub detection_avg_ms: u64,
    pub translation_avg_ms: u64,
    pub restoration_avg_ms: u64,
    pub rendering_avg_ms: u64,
    pub total_avg_ms: u64,
    pub total_p95_ms: u64,
    pub translation_degraded: usize,
    pub restoration_degraded: usize,
    pub rendering_degraded: usize,
    pub uptime_seconds: u64,
}

/// Rolling window of the most recent durations, in milliseconds
#[derive(Default)]
struct Samples {
    values: RwLock<VecDeque<u64>>,
}

impl Samples {
    fn push(&self, duration: Duration) {
        let mut values = self.values.write();
        if values.len() == MAX_SAMPLES {
            values.pop_front();
        }
        values.push_back(duration.as_millis() as u64);
    }

    fn values(&self) -> Vec<u64> {
        self.values.read().iter().copied().collect()
    }
}

fn percentile(values: &[u64], p: f64) -> u64 {
    if values.is_empty() {
        return 0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let idx = ((values.len() as f64 - 1.0) * p) as usize;
    sorted[idx]
}

fn avg(values: &[u64]) -> u64 {
    if values.is_empty() {
        return 0;
    }
    values.iter().sum::<u64>() / values.len() as u64
}
