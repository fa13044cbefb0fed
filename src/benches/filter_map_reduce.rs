//! Keep the even values of `0..4096`, double them and sum, through three
//! pipelines: an iterator chain, a copying pipeline of boxed closures, and a
//! generic call target taking the list as one boxed argument.

use serde_json::json;
use std::sync::Arc;

use super::{check_target, measure, Providers, SuiteOutput, TargetSpec};
use crate::dataset::{self, GenerateConfig, IndexedDataset, OperandDomain};
use crate::error::BenchError;
use crate::fixture::{Benchmark, FixtureContext, FixtureInfo, FixtureScope};
use crate::harness::{BenchConfig, Mode};
use crate::native;
use crate::target::{CallTarget, Signature, Value};
use crate::Backend;

pub const LIST_LEN: usize = 4096;

type Predicate = Box<dyn Fn(i64) -> bool + Send + Sync>;
type MapFn = Box<dyn Fn(i64) -> i64 + Send + Sync>;
type ReduceFn = Box<dyn Fn(i64, i64) -> i64 + Send + Sync>;

/// Filter, map and reduce stages behind trait objects; every stage collects
/// into a fresh `Vec` before the next one runs.
pub struct CopyingPipeline {
    filter: Predicate,
    map: MapFn,
    reduce: ReduceFn,
}

impl CopyingPipeline {
    pub fn new(filter: Predicate, map: MapFn, reduce: ReduceFn) -> Self {
        Self {
            filter,
            map,
            reduce,
        }
    }

    pub fn even_doubled_sum() -> Self {
        Self::new(
            Box::new(|v| v % 2 == 0),
            Box::new(|v| v.wrapping_mul(2)),
            Box::new(i64::wrapping_add),
        )
    }

    pub fn run(&self, data: &[i64]) -> i64 {
        let filtered: Vec<i64> = data.iter().copied().filter(|&v| (self.filter)(v)).collect();
        let mapped: Vec<i64> = filtered.into_iter().map(|v| (self.map)(v)).collect();
        mapped.into_iter().fold(0, |acc, v| (self.reduce)(acc, v))
    }
}

#[derive(Clone, Copy)]
pub enum Pipeline<'p> {
    IteratorChain,
    Copying,
    Target(TargetSpec<'p>),
}

pub enum FmrTrial {
    Chain(IndexedDataset),
    Copying(IndexedDataset, CopyingPipeline),
    Target(CallTarget, [Value; 1]),
}

pub struct FmrBench<'p> {
    name: &'static str,
    pipeline: Pipeline<'p>,
    seed: u64,
}

impl<'p> FmrBench<'p> {
    pub fn new(name: &'static str, pipeline: Pipeline<'p>, seed: u64) -> Self {
        Self {
            name,
            pipeline,
            seed,
        }
    }
}

/// The `0..LIST_LEN` list.
fn list(seed: u64) -> Result<IndexedDataset, BenchError> {
    dataset::generate_with(&GenerateConfig {
        count: LIST_LEN,
        arity: 1,
        seed,
        domain: OperandDomain::Sequential,
    })
}

impl Benchmark for FmrBench<'_> {
    type Trial = FmrTrial;
    type Iteration = ();
    type Output = i64;

    fn name(&self) -> &str {
        self.name
    }

    fn fixture_scopes(&self) -> Vec<FixtureInfo> {
        let mut out = vec![FixtureInfo::new("list", FixtureScope::Trial)];
        match self.pipeline {
            Pipeline::IteratorChain => {}
            Pipeline::Copying => out.push(FixtureInfo::new("stages", FixtureScope::Trial)),
            Pipeline::Target(_) => out.push(FixtureInfo::new("target", FixtureScope::Trial)),
        }
        out
    }

    fn setup_trial(&self, _ctx: &FixtureContext) -> Result<FmrTrial, BenchError> {
        let data = list(self.seed)?;
        Ok(match self.pipeline {
            Pipeline::IteratorChain => FmrTrial::Chain(data),
            Pipeline::Copying => FmrTrial::Copying(data, CopyingPipeline::even_doubled_sum()),
            Pipeline::Target(spec) => {
                let expected = native::filter_map_reduce(data.values());
                let target = spec.resolve()?;
                let args = [Value::boxed(Arc::new(data.values().to_vec()))];
                check_target(&target, &args, expected)?;
                FmrTrial::Target(target, args)
            }
        })
    }

    fn setup_iteration(&self, _trial: &FmrTrial, _ctx: &FixtureContext) -> Result<(), BenchError> {
        Ok(())
    }

    #[inline]
    fn invoke(&self, trial: &mut FmrTrial, _iteration: &mut ()) -> Result<i64, BenchError> {
        match trial {
            FmrTrial::Chain(data) => Ok(native::filter_map_reduce(data.values())),
            FmrTrial::Copying(data, pipeline) => Ok(pipeline.run(data.values())),
            FmrTrial::Target(target, args) => Ok(target.invoke_i64(&args[..])?),
        }
    }
}

pub fn run(cfg: &BenchConfig, backend: Backend) -> SuiteOutput {
    let providers = Providers::new(cfg);
    let run_cfg = cfg.run_config(Mode::AverageTime);

    let bodies = [
        (
            Backend::Native,
            "baseline",
            FmrBench::new("filter_map_reduce.iterator_chain", Pipeline::IteratorChain, cfg.seed),
        ),
        (
            Backend::Boxed,
            "boxed",
            FmrBench::new("filter_map_reduce.copying_pipeline", Pipeline::Copying, cfg.seed),
        ),
        (
            Backend::Boxed,
            "boxed",
            FmrBench::new(
                "filter_map_reduce.generic_target",
                Pipeline::Target(TargetSpec::new(
                    &providers.native,
                    "filter-map-reduce",
                    "run",
                    Signature::generic(1),
                )),
                cfg.seed,
            ),
        ),
    ];

    let mut out = SuiteOutput::default();
    for (tag, label, bench) in &bodies {
        if !backend.includes(*tag) {
            continue;
        }
        let extra = json!({ "list_len": LIST_LEN });
        out.record(bench.name, measure(cfg, bench, &run_cfg, label, extra));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::Phase;
    use crate::native::NativeProvider;

    // 2 * (0 + 2 + ... + 4094)
    const EXPECTED: i64 = 8_384_512;

    fn ctx() -> FixtureContext {
        FixtureContext {
            worker: 0,
            seed: 11,
            phase: Phase::Warmup,
            iteration: 0,
            scope: FixtureScope::Trial,
        }
    }

    #[test]
    fn all_pipelines_agree() {
        let native = NativeProvider::standard();
        let pipelines = [
            Pipeline::IteratorChain,
            Pipeline::Copying,
            Pipeline::Target(TargetSpec::new(
                &native,
                "filter-map-reduce",
                "run",
                Signature::generic(1),
            )),
        ];
        for p in pipelines {
            let bench = FmrBench::new("fmr", p, 11);
            let mut trial = bench.setup_trial(&ctx()).unwrap();
            assert_eq!(bench.invoke(&mut trial, &mut ()).unwrap(), EXPECTED);
        }
    }

    #[test]
    fn copying_pipeline_uses_its_stages() {
        let odd_tripled = CopyingPipeline::new(
            Box::new(|v| v % 2 != 0),
            Box::new(|v| v * 3),
            Box::new(|a, b| a + b),
        );
        assert_eq!(odd_tripled.run(&[1, 2, 3, 4]), 12);
    }
}
