//! Fixture lifecycle: what a benchmark builds, and how often.
//!
//! The driver calls [`Benchmark::setup_trial`] once per worker before any
//! measured work, [`Benchmark::setup_iteration`] at the start of every warmup and
//! measurement iteration, and [`Benchmark::invoke`] once per measured operation.
//! Invocation-scoped state is whatever `invoke` keeps in locals.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::BenchError;

/// Lifetime granularity of a piece of fixture state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixtureScope {
    Trial,
    Iteration,
    Invocation,
}

impl FixtureScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            FixtureScope::Trial => "trial",
            FixtureScope::Iteration => "iteration",
            FixtureScope::Invocation => "invocation",
        }
    }

    /// True when state at `self` lives at least as long as state at `other`.
    pub fn outlives(&self, other: FixtureScope) -> bool {
        *self <= other
    }
}

impl fmt::Display for FixtureScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an iteration is warmup or measured.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Warmup,
    Measurement,
}

/// Declared fixture of a benchmark, reported alongside its results.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureInfo {
    pub name: String,
    pub scope: FixtureScope,
}

impl FixtureInfo {
    pub fn new(name: impl Into<String>, scope: FixtureScope) -> Self {
        Self {
            name: name.into(),
            scope,
        }
    }
}

/// Where in the run a setup call happens.
#[derive(Clone, Copy, Debug)]
pub struct FixtureContext {
    /// Worker index, 0 for single-threaded runs.
    pub worker: usize,
    /// Seed for this worker, derived from the run seed.
    pub seed: u64,
    pub phase: Phase,
    /// Iteration number within `phase`; 0 during trial setup.
    pub iteration: usize,
    pub scope: FixtureScope,
}

impl FixtureContext {
    pub(crate) fn trial(worker: usize, seed: u64) -> Self {
        Self {
            worker,
            seed,
            phase: Phase::Warmup,
            iteration: 0,
            scope: FixtureScope::Trial,
        }
    }

    pub(crate) fn iteration(&self, phase: Phase, iteration: usize) -> Self {
        Self {
            phase,
            iteration,
            scope: FixtureScope::Iteration,
            ..*self
        }
    }

    /// Seed unique to this (worker, phase, iteration).
    pub fn iteration_seed(&self) -> u64 {
        let offset = match self.phase {
            Phase::Warmup => 0,
            Phase::Measurement => 1 << 32,
        };
        crate::dataset::derive_seed(self.seed, offset + self.iteration as u64)
    }
}

/// A benchmark body and its fixtures.
///
/// `Trial` is built once per worker and lives until the run ends; the driver never
/// rebuilds it, so call targets resolved there stay bound for every measured
/// operation. `Iteration` is rebuilt for every iteration and dropped at its end.
pub trait Benchmark {
    type Trial;
    type Iteration;
    type Output;

    fn name(&self) -> &str;

    fn fixture_scopes(&self) -> Vec<FixtureInfo> {
        Vec::new()
    }

    fn setup_trial(&self, ctx: &FixtureContext) -> Result<Self::Trial, BenchError>;

    fn setup_iteration(
        &self,
        trial: &Self::Trial,
        ctx: &FixtureContext,
    ) -> Result<Self::Iteration, BenchError>;

    /// One measured operation. Runs inside the timed window.
    fn invoke(
        &self,
        trial: &mut Self::Trial,
        iteration: &mut Self::Iteration,
    ) -> Result<Self::Output, BenchError>;
}

/// A fixture-free benchmark over a closure.
pub struct FnBenchmark<F> {
    name: String,
    f: F,
}

impl<F, T> FnBenchmark<F>
where
    F: Fn() -> T,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F, T> Benchmark for FnBenchmark<F>
where
    F: Fn() -> T,
{
    type Trial = ();
    type Iteration = ();
    type Output = T;

    fn name(&self) -> &str {
        &self.name
    }

    fn setup_trial(&self, _ctx: &FixtureContext) -> Result<(), BenchError> {
        Ok(())
    }

    fn setup_iteration(&self, _trial: &(), _ctx: &FixtureContext) -> Result<(), BenchError> {
        Ok(())
    }

    #[inline]
    fn invoke(&self, _trial: &mut (), _iteration: &mut ()) -> Result<T, BenchError> {
        Ok((self.f)())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coarser_scopes_outlive_finer() {
        assert!(FixtureScope::Trial.outlives(FixtureScope::Iteration));
        assert!(FixtureScope::Iteration.outlives(FixtureScope::Invocation));
        assert!(!FixtureScope::Invocation.outlives(FixtureScope::Trial));
    }

    #[test]
    fn iteration_seeds_are_distinct_per_phase_and_index() {
        let trial = FixtureContext::trial(0, 42);
        let w0 = trial.iteration(Phase::Warmup, 0).iteration_seed();
        let w1 = trial.iteration(Phase::Warmup, 1).iteration_seed();
        let m0 = trial.iteration(Phase::Measurement, 0).iteration_seed();
        assert_ne!(w0, w1);
        assert_ne!(w0, m0);
        assert_eq!(m0, trial.iteration(Phase::Measurement, 0).iteration_seed());
    }

    #[test]
    fn fn_benchmark_calls_closure() {
        let b = FnBenchmark::new("answer", || 42);
        let ctx = FixtureContext::trial(0, 1);
        let mut trial = b.setup_trial(&ctx).unwrap();
        let mut it = b.setup_iteration(&trial, &ctx).unwrap();
        assert_eq!(b.invoke(&mut trial, &mut it).unwrap(), 42);
        assert_eq!(b.name(), "answer");
    }
}
