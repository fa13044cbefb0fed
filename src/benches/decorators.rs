//! `(a + b) * c`, where the multiplication is a decorator wrapped around `add`.

use serde_json::json;

use super::{check_target, measure, Providers, SuiteOutput, TargetSpec};
use crate::error::BenchError;
use crate::fixture::{Benchmark, FixtureContext, FixtureInfo, FixtureScope};
use crate::harness::{BenchConfig, Mode};
use crate::native::{self, DECORATOR_FACTOR};
use crate::target::{CallTarget, Signature, Value};
use crate::Backend;

pub const A: i64 = 123_456;
pub const B: i64 = 465;
pub const C: i64 = DECORATOR_FACTOR;

pub const EXPECTED: i64 = (A + B) * C;

pub struct DecoratedBench<'p> {
    name: &'static str,
    target: Option<TargetSpec<'p>>,
}

impl<'p> DecoratedBench<'p> {
    pub fn baseline() -> Self {
        Self {
            name: "decorators.baseline",
            target: None,
        }
    }

    pub fn new(name: &'static str, target: TargetSpec<'p>) -> Self {
        Self {
            name,
            target: Some(target),
        }
    }
}

pub enum DecoratedTrial {
    Static { a: i64, b: i64, c: i64 },
    Target(CallTarget, [Value; 2]),
}

impl Benchmark for DecoratedBench<'_> {
    type Trial = DecoratedTrial;
    type Iteration = ();
    type Output = i64;

    fn name(&self) -> &str {
        self.name
    }

    fn fixture_scopes(&self) -> Vec<FixtureInfo> {
        match self.target {
            Some(_) => vec![
                FixtureInfo::new("operands", FixtureScope::Trial),
                FixtureInfo::new("target", FixtureScope::Trial),
            ],
            None => vec![FixtureInfo::new("operands", FixtureScope::Trial)],
        }
    }

    fn setup_trial(&self, _ctx: &FixtureContext) -> Result<DecoratedTrial, BenchError> {
        let Some(spec) = self.target else {
            return Ok(DecoratedTrial::Static { a: A, b: B, c: C });
        };
        let target = spec.resolve()?;
        let repr = spec.signature.repr;
        let args = [Value::int_as(A, repr), Value::int_as(B, repr)];
        check_target(&target, &args, EXPECTED)?;
        Ok(DecoratedTrial::Target(target, args))
    }

    fn setup_iteration(&self, _trial: &DecoratedTrial, _ctx: &FixtureContext) -> Result<(), BenchError> {
        Ok(())
    }

    #[inline]
    fn invoke(&self, trial: &mut DecoratedTrial, _iteration: &mut ()) -> Result<i64, BenchError> {
        match trial {
            DecoratedTrial::Static { a, b, c } => Ok(native::times(native::add(*a, *b), *c)),
            DecoratedTrial::Target(target, args) => Ok(target.invoke_i64(&args[..])?),
        }
    }
}

pub fn run(cfg: &BenchConfig, backend: Backend) -> SuiteOutput {
    let providers = Providers::new(cfg);
    let run_cfg = cfg.run_config(Mode::Throughput);
    let native = &providers.native;

    let bodies = [
        (Backend::Native, "baseline", DecoratedBench::baseline()),
        (
            Backend::Native,
            "native",
            DecoratedBench::new(
                "decorators.native_add_then_times",
                TargetSpec::new(native, "decorators", "add_then_times", Signature::primitive(2)),
            ),
        ),
        (
            Backend::Boxed,
            "boxed",
            DecoratedBench::new(
                "decorators.native_boxed_add_then_times",
                TargetSpec::new(native, "decorators", "add_then_times", Signature::generic(2)),
            ),
        ),
        (
            Backend::Script,
            "script",
            DecoratedBench::new(
                "decorators.script_add",
                TargetSpec::new(&providers.script, "decorators", "add", Signature::primitive(2)),
            ),
        ),
    ];

    let digest = providers.script_digest("decorators");
    let mut out = SuiteOutput::default();
    for (tag, label, bench) in &bodies {
        if !backend.includes(*tag) {
            continue;
        }
        let mut extra = json!({ "a": A, "b": B, "c": C });
        if *tag == Backend::Script {
            extra["script_digest"] = digest.clone();
        }
        out.record(bench.name, measure(cfg, bench, &run_cfg, label, extra));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::Phase;
    use crate::native::NativeProvider;
    use crate::script::ScriptProvider;

    #[test]
    fn every_body_computes_the_decorated_sum() {
        let native = NativeProvider::standard();
        let script = ScriptProvider::new();
        let ctx = FixtureContext {
            worker: 0,
            seed: 0,
            phase: Phase::Warmup,
            iteration: 0,
            scope: FixtureScope::Trial,
        };
        let bodies = [
            DecoratedBench::baseline(),
            DecoratedBench::new(
                "n",
                TargetSpec::new(&native, "decorators", "add_then_times", Signature::primitive(2)),
            ),
            DecoratedBench::new(
                "b",
                TargetSpec::new(&native, "decorators", "add_then_times", Signature::generic(2)),
            ),
            DecoratedBench::new(
                "s",
                TargetSpec::new(&script, "decorators", "add", Signature::primitive(2)),
            ),
        ];
        for bench in &bodies {
            let mut trial = bench.setup_trial(&ctx).unwrap();
            assert_eq!(bench.invoke(&mut trial, &mut ()).unwrap(), EXPECTED);
        }
    }
}
