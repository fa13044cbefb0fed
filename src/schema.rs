use serde::{Deserialize, Serialize};

use crate::fixture::FixtureInfo;
use crate::harness::{Diagnostic, MeasurementResult, Mode};

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMeta {
    pub schema_version: u32,
    pub bench_version: String,
    pub profile: String,
    pub seed: u64,
    pub threads: usize,
    pub timestamp_utc: String,
    pub git_sha: Option<String>,
}

/// Summary statistics over per-iteration scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p95: f64,
    pub stddev: f64,
}

impl Summary {
    /// `None` for an empty slice.
    pub fn from_scores(scores: &[f64]) -> Option<Self> {
        if scores.is_empty() {
            return None;
        }
        let mut sorted = scores.to_vec();
        sorted.sort_by(f64::total_cmp);

        let n = sorted.len() as f64;
        let mean = sorted.iter().sum::<f64>() / n;
        // Sample standard deviation; zero for a single score.
        let stddev = if sorted.len() > 1 {
            let var = sorted.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (n - 1.0);
            var.sqrt()
        } else {
            0.0
        };

        Some(Self {
            mean,
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            p50: percentile(&sorted, 0.50),
            p95: percentile(&sorted, 0.95),
            stddev,
        })
    }
}

/// Nearest-rank percentile of an ascending, non-empty slice.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let rank = (q * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Measurement {
    pub name: String,
    pub backend: String,
    pub mode: Mode,
    pub unit: String,
    pub worker: usize,

    pub batch_size: u64,
    pub warmup_iterations: usize,
    pub measurement_iterations: usize,

    pub sample_durations_ns: Vec<u64>,
    pub sample_operations: Vec<u64>,
    pub scores: Vec<f64>,
    pub summary: Option<Summary>,

    pub fixtures: Vec<FixtureInfo>,
    pub diagnostics: Vec<Diagnostic>,

    pub extra: serde_json::Value,
}

impl Measurement {
    pub fn from_result(
        result: &MeasurementResult,
        backend: impl Into<String>,
        extra: serde_json::Value,
    ) -> Self {
        let scores = result.scores();
        let config = result.config();
        Self {
            name: result.benchmark().to_string(),
            backend: backend.into(),
            mode: result.mode(),
            unit: result.mode().unit().to_string(),
            worker: result.worker(),
            batch_size: result.batch_size(),
            warmup_iterations: config.warmup_iterations,
            measurement_iterations: config.measurement_iterations,
            sample_durations_ns: result.sample_durations_ns(),
            sample_operations: result.samples().iter().map(|s| s.operations).collect(),
            summary: Summary::from_scores(&scores),
            scores,
            fixtures: result.fixtures().to_vec(),
            diagnostics: result.diagnostics().to_vec(),
            extra,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    pub run: RunMeta,
    pub measurements: Vec<Measurement>,
    /// Benchmark bodies that failed, with the error message.
    #[serde(default)]
    pub failures: Vec<Failure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Failure {
    pub name: String,
    pub error: String,
}
