//! Measurement driver.
//!
//! A run goes through `Warmup -> Measuring -> Aggregating -> Done`. Warmup
//! iterations execute exactly like measured ones but their samples are thrown
//! away; only measured samples reach the [`MeasurementResult`].

use serde::{Deserialize, Serialize};
use std::hint::black_box;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Barrier;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

use crate::dataset::derive_seed;
use crate::error::BenchError;
use crate::fixture::{Benchmark, FixtureContext, FixtureInfo, Phase};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Profile {
    Quick,
    Full,
}

impl Profile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Quick => "quick",
            Profile::Full => "full",
        }
    }
}

/// Run-wide settings shared by every suite.
#[derive(Clone, Debug)]
pub struct BenchConfig {
    pub profile: Profile,
    pub seed: u64,
    /// Worker threads per benchmark body.
    pub threads: usize,
    pub script_dir: Option<PathBuf>,
}

impl BenchConfig {
    pub fn new(profile: Profile, seed: u64) -> Self {
        Self {
            profile,
            seed,
            threads: 1,
            script_dir: None,
        }
    }

    pub fn warmup_iterations(&self) -> usize {
        match self.profile {
            Profile::Quick => 2,
            Profile::Full => 5,
        }
    }

    pub fn measurement_iterations(&self) -> usize {
        match self.profile {
            Profile::Quick => 3,
            Profile::Full => 5,
        }
    }

    pub fn iteration_time(&self) -> Duration {
        match self.profile {
            Profile::Quick => Duration::from_millis(100),
            Profile::Full => Duration::from_secs(1),
        }
    }

    /// Profile defaults for `mode`. Suites override individual fields.
    pub fn run_config(&self, mode: Mode) -> RunConfig {
        RunConfig {
            mode,
            warmup_iterations: self.warmup_iterations(),
            measurement_iterations: self.measurement_iterations(),
            batch_size: 1,
            warmup_batch_size: None,
            iteration_time: self.iteration_time(),
            seed: self.seed,
        }
    }
}

/// How an iteration is timed and scored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Loop for `iteration_time`; score is operations per second.
    Throughput,
    /// Loop for `iteration_time`; score is nanoseconds per operation.
    AverageTime,
    /// Exactly `batch_size` operations timed as one sample; score is nanoseconds
    /// per batch.
    SingleShotBatched,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Throughput => "throughput",
            Mode::AverageTime => "average_time",
            Mode::SingleShotBatched => "single_shot_batched",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Mode::Throughput => "ops/s",
            Mode::AverageTime => "ns/op",
            Mode::SingleShotBatched => "ns/batch",
        }
    }

    fn windowed(&self) -> bool {
        !matches!(self, Mode::SingleShotBatched)
    }
}

/// Settings for one benchmark body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    pub mode: Mode,
    pub warmup_iterations: usize,
    pub measurement_iterations: usize,
    /// Operations per sample in `SingleShotBatched`; ignored otherwise.
    pub batch_size: u64,
    /// Warmup batch size; defaults to `batch_size`.
    pub warmup_batch_size: Option<u64>,
    /// Window length in the looping modes.
    pub iteration_time: Duration,
    pub seed: u64,
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), BenchError> {
        if self.measurement_iterations == 0 {
            return Err(BenchError::config("measurement_iterations must be > 0"));
        }
        if self.mode.windowed() {
            if self.iteration_time.is_zero() {
                return Err(BenchError::config(format!(
                    "iteration_time must be > 0 in {} mode",
                    self.mode.as_str()
                )));
            }
        } else {
            if self.batch_size == 0 {
                return Err(BenchError::config("batch_size must be > 0"));
            }
            if self.warmup_batch_size == Some(0) {
                return Err(BenchError::config("warmup_batch_size must be > 0"));
            }
        }
        Ok(())
    }

    pub fn warmup_batch(&self) -> u64 {
        self.warmup_batch_size.unwrap_or(self.batch_size)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverState {
    Warmup,
    Measuring,
    Aggregating,
    Done,
}

/// Monotonic time source read at the edges of each sample.
pub trait Clock: Send + Sync {
    /// Nanoseconds since a fixed, clock-specific origin.
    fn now_ns(&self) -> u128;
}

#[derive(Clone, Copy, Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now_ns(&self) -> u128 {
        self.origin.elapsed().as_nanos()
    }
}

/// `end - start`, failing when the reading went backwards or does not fit `u64`.
pub fn elapsed_ns(start: u128, end: u128) -> Result<u64, BenchError> {
    end.checked_sub(start)
        .and_then(|d| u64::try_from(d).ok())
        .ok_or_else(|| {
            BenchError::TimingOverflow(format!("clock read {start}ns then {end}ns"))
        })
}

/// One timed iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub operations: u64,
    pub elapsed_ns: u64,
}

impl Sample {
    pub fn score(&self, mode: Mode) -> f64 {
        let ns = self.elapsed_ns.max(1) as f64;
        match mode {
            Mode::Throughput => self.operations as f64 * 1e9 / ns,
            Mode::AverageTime => ns / self.operations.max(1) as f64,
            Mode::SingleShotBatched => self.elapsed_ns as f64,
        }
    }
}

/// A non-fatal problem noticed during a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub phase: Phase,
    pub iteration: usize,
    pub message: String,
}

/// Measured samples of one trial. Built once by the driver and never mutated.
#[derive(Clone, Debug)]
pub struct MeasurementResult {
    benchmark: String,
    worker: usize,
    seed: u64,
    config: RunConfig,
    fixtures: Vec<FixtureInfo>,
    samples: Vec<Sample>,
    diagnostics: Vec<Diagnostic>,
}

impl MeasurementResult {
    pub fn benchmark(&self) -> &str {
        &self.benchmark
    }

    pub fn worker(&self) -> usize {
        self.worker
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn mode(&self) -> Mode {
        self.config.mode
    }

    /// Operations per sample in `SingleShotBatched`, 1 otherwise.
    pub fn batch_size(&self) -> u64 {
        match self.config.mode {
            Mode::SingleShotBatched => self.config.batch_size,
            _ => 1,
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn fixtures(&self) -> &[FixtureInfo] {
        &self.fixtures
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn sample_durations_ns(&self) -> Vec<u64> {
        self.samples.iter().map(|s| s.elapsed_ns).collect()
    }

    pub fn scores(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.score(self.config.mode)).collect()
    }

    pub fn total_operations(&self) -> u64 {
        self.samples.iter().map(|s| s.operations).sum()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

/// Run one trial of `bench` on the calling thread.
pub fn run_benchmark<B: Benchmark>(
    bench: &B,
    config: &RunConfig,
) -> Result<MeasurementResult, BenchError> {
    run_with_clock(bench, config, &MonotonicClock::new())
}

pub fn run_with_clock<B: Benchmark, C: Clock>(
    bench: &B,
    config: &RunConfig,
    clock: &C,
) -> Result<MeasurementResult, BenchError> {
    config.validate()?;
    run_trial(bench, config, clock, 0, None)
}

/// Run one full, independent trial per worker. Workers finish trial setup, then
/// start warming up together.
pub fn run_concurrent<B>(
    bench: &B,
    config: &RunConfig,
    workers: usize,
) -> Result<Vec<MeasurementResult>, BenchError>
where
    B: Benchmark + Sync,
{
    if workers == 0 {
        return Err(BenchError::config("workers must be > 0"));
    }
    config.validate()?;

    let barrier = Barrier::new(workers);
    let clock = MonotonicClock::new();
    debug!(benchmark = bench.name(), workers, "starting concurrent trials");

    thread::scope(|s| {
        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                let barrier = &barrier;
                let clock = &clock;
                s.spawn(move || run_trial(bench, config, clock, worker, Some(barrier)))
            })
            .collect();

        handles
            .into_iter()
            .map(|h| match h.join() {
                Ok(result) => result,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    })
}

fn worker_seed(seed: u64, worker: usize) -> u64 {
    if worker == 0 {
        seed
    } else {
        derive_seed(seed, worker as u64)
    }
}

/// Waits on the shared start barrier when dropped, including during unwinding.
struct StartLine<'a>(Option<&'a Barrier>);

impl Drop for StartLine<'_> {
    fn drop(&mut self) {
        if let Some(barrier) = self.0.take() {
            barrier.wait();
        }
    }
}

fn run_trial<B: Benchmark, C: Clock>(
    bench: &B,
    config: &RunConfig,
    clock: &C,
    worker: usize,
    start_line: Option<&Barrier>,
) -> Result<MeasurementResult, BenchError> {
    let seed = worker_seed(config.seed, worker);
    let trial_ctx = FixtureContext::trial(worker, seed);

    debug!(benchmark = bench.name(), worker, seed, "trial setup");
    // Failed or panicking workers still reach the barrier so the others are released.
    let start_line = StartLine(start_line);
    let trial = bench.setup_trial(&trial_ctx);
    drop(start_line);
    let mut trial = trial?;

    let mut diagnostics = Vec::new();
    let mut state = DriverState::Warmup;
    debug!(benchmark = bench.name(), worker, ?state, iterations = config.warmup_iterations);
    for i in 0..config.warmup_iterations {
        let ctx = trial_ctx.iteration(Phase::Warmup, i);
        match run_iteration(bench, &mut trial, &ctx, config, config.warmup_batch(), clock) {
            Ok(sample) => trace!(worker, iteration = i, ?sample, "warmup sample discarded"),
            Err(BenchError::TimingOverflow(message)) => {
                record_overflow(&mut diagnostics, Phase::Warmup, i, message)
            }
            Err(e) => return Err(e),
        }
    }

    state = DriverState::Measuring;
    debug!(benchmark = bench.name(), worker, ?state, iterations = config.measurement_iterations);
    let mut samples = Vec::with_capacity(config.measurement_iterations);
    for i in 0..config.measurement_iterations {
        let ctx = trial_ctx.iteration(Phase::Measurement, i);
        match run_iteration(bench, &mut trial, &ctx, config, config.batch_size, clock) {
            Ok(sample) => {
                trace!(worker, iteration = i, ?sample, "sample recorded");
                samples.push(sample);
            }
            Err(BenchError::TimingOverflow(message)) => {
                record_overflow(&mut diagnostics, Phase::Measurement, i, message)
            }
            Err(e) => return Err(e),
        }
    }

    state = DriverState::Aggregating;
    debug!(benchmark = bench.name(), worker, ?state, samples = samples.len());
    if samples.is_empty() {
        return Err(BenchError::TimingOverflow(format!(
            "all {} measured samples of `{}` were dropped",
            config.measurement_iterations,
            bench.name()
        )));
    }
    let result = MeasurementResult {
        benchmark: bench.name().to_string(),
        worker,
        seed,
        config: config.clone(),
        fixtures: bench.fixture_scopes(),
        samples,
        diagnostics,
    };

    state = DriverState::Done;
    debug!(benchmark = bench.name(), worker, ?state);
    Ok(result)
}

fn record_overflow(diagnostics: &mut Vec<Diagnostic>, phase: Phase, iteration: usize, message: String) {
    warn!(?phase, iteration, %message, "sample dropped");
    diagnostics.push(Diagnostic {
        phase,
        iteration,
        message,
    });
}

/// Build the iteration fixture, time one sample, drop the fixture.
fn run_iteration<B: Benchmark, C: Clock>(
    bench: &B,
    trial: &mut B::Trial,
    ctx: &FixtureContext,
    config: &RunConfig,
    batch: u64,
    clock: &C,
) -> Result<Sample, BenchError> {
    let mut iteration = bench.setup_iteration(trial, ctx)?;
    if config.mode.windowed() {
        timed_window(bench, trial, &mut iteration, config.iteration_time, clock)
    } else {
        timed_batch(bench, trial, &mut iteration, batch, clock)
    }
}

fn timed_batch<B: Benchmark, C: Clock>(
    bench: &B,
    trial: &mut B::Trial,
    iteration: &mut B::Iteration,
    batch: u64,
    clock: &C,
) -> Result<Sample, BenchError> {
    let start = clock.now_ns();
    for _ in 0..batch {
        black_box(bench.invoke(trial, iteration)?);
    }
    let end = clock.now_ns();
    Ok(Sample {
        operations: batch,
        elapsed_ns: elapsed_ns(start, end)?,
    })
}

fn timed_window<B: Benchmark, C: Clock>(
    bench: &B,
    trial: &mut B::Trial,
    iteration: &mut B::Iteration,
    window: Duration,
    clock: &C,
) -> Result<Sample, BenchError> {
    let stop = AtomicBool::new(false);
    let deadline = Instant::now() + window;

    thread::scope(|s| {
        let timer = s.spawn(|| {
            loop {
                let now = Instant::now();
                if now >= deadline || stop.load(Ordering::Acquire) {
                    break;
                }
                thread::park_timeout(deadline - now);
            }
            stop.store(true, Ordering::Release);
        });

        let result = (|| -> Result<Sample, BenchError> {
            let mut operations = 0u64;
            let start = clock.now_ns();
            loop {
                black_box(bench.invoke(trial, iteration)?);
                operations += 1;
                if stop.load(Ordering::Relaxed) {
                    break;
                }
            }
            let end = clock.now_ns();
            Ok(Sample {
                operations,
                elapsed_ns: elapsed_ns(start, end)?,
            })
        })();

        // Early exit on error must not wait out the window.
        stop.store(true, Ordering::Release);
        timer.thread().unpark();
        result
    })
}
