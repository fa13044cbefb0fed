//! Benchmark suites. Each suite returns a [`SuiteOutput`]; one failing body is
//! logged and recorded without stopping the rest of the suite.

pub mod decorators;
pub mod filter_map_reduce;

use serde_json::{json, Value as Json};
use tracing::{error, info};

use crate::error::BenchError;
use crate::fixture::{Benchmark, FixtureScope};
use crate::harness::{run_benchmark, run_concurrent, BenchConfig, RunConfig};
use crate::native::NativeProvider;
use crate::schema::{Failure, Measurement};
use crate::script::ScriptProvider;
use crate::target::{resolve, CallTarget, GuestProvider, Signature, Value};

/// Measurements and failures collected by a suite.
#[derive(Debug, Default)]
pub struct SuiteOutput {
    pub measurements: Vec<Measurement>,
    pub failures: Vec<Failure>,
}

impl SuiteOutput {
    pub fn record(&mut self, name: &str, outcome: Result<Vec<Measurement>, BenchError>) {
        match outcome {
            Ok(m) => self.measurements.extend(m),
            Err(e) => {
                error!(benchmark = name, error = %e, "benchmark body failed");
                self.failures.push(Failure {
                    name: name.to_string(),
                    error: e.to_string(),
                });
            }
        }
    }

    pub fn extend(&mut self, other: SuiteOutput) {
        self.measurements.extend(other.measurements);
        self.failures.extend(other.failures);
    }
}

/// The providers every suite resolves against.
pub struct Providers {
    pub native: NativeProvider,
    pub script: ScriptProvider,
}

impl Providers {
    pub fn new(cfg: &BenchConfig) -> Self {
        let script = match &cfg.script_dir {
            Some(dir) => ScriptProvider::with_search_dir(dir),
            None => ScriptProvider::new(),
        };
        Self {
            native: NativeProvider::standard(),
            script,
        }
    }

    /// Digest of a script module for report extras, `null` when it does not load.
    pub fn script_digest(&self, module: &str) -> Json {
        match self.script.load(module) {
            Ok(handle) => json!(ScriptProvider::module_digest(&handle)),
            Err(_) => Json::Null,
        }
    }
}

/// What a body resolves during trial setup.
#[derive(Clone, Copy)]
pub struct TargetSpec<'p> {
    pub provider: &'p dyn GuestProvider,
    pub module: &'static str,
    pub identifier: &'static str,
    pub signature: Signature,
}

impl<'p> TargetSpec<'p> {
    pub fn new(
        provider: &'p dyn GuestProvider,
        module: &'static str,
        identifier: &'static str,
        signature: Signature,
    ) -> Self {
        Self {
            provider,
            module,
            identifier,
            signature,
        }
    }

    pub fn resolve(&self) -> Result<CallTarget, BenchError> {
        Ok(resolve(
            self.provider,
            self.module,
            self.identifier,
            self.signature,
        )?)
    }
}

/// Invoke `target` once outside any timed window and compare with `expected`.
pub(crate) fn check_target(
    target: &CallTarget,
    args: &[Value],
    expected: i64,
) -> Result<(), BenchError> {
    let got = target.invoke_i64(args)?;
    if got != expected {
        return Err(BenchError::fixture(
            FixtureScope::Trial,
            format!("`{}` returned {got}, expected {expected}", target.name()),
        ));
    }
    Ok(())
}

/// Run `bench` on `cfg.threads` workers, one [`Measurement`] per worker.
pub(crate) fn measure<B>(
    cfg: &BenchConfig,
    bench: &B,
    run: &RunConfig,
    backend: &str,
    extra: Json,
) -> Result<Vec<Measurement>, BenchError>
where
    B: Benchmark + Sync,
{
    info!(
        benchmark = bench.name(),
        backend,
        mode = run.mode.as_str(),
        threads = cfg.threads,
        "running"
    );
    let results = if cfg.threads <= 1 {
        vec![run_benchmark(bench, run)?]
    } else {
        run_concurrent(bench, run, cfg.threads)?
    };
    Ok(results
        .iter()
        .map(|r| Measurement::from_result(r, backend, extra.clone()))
        .collect())
}
