//! Criterion view of per-call dispatch cost.
//!
//! Complements the JSON runner: the same targets, but measured by criterion's
//! own sampling so the two can be cross-checked.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dispatch_microbench::dataset;
use dispatch_microbench::native::{self, NativeProvider};
use dispatch_microbench::script::ScriptProvider;
use dispatch_microbench::target::{resolve, GuestProvider, Signature, Value};

fn bench_sum_targets(c: &mut Criterion) {
    let native_provider = NativeProvider::standard();
    let script_provider = ScriptProvider::new();

    let mut group = c.benchmark_group("sum_dispatch");

    group.bench_function("static_call", |bencher| {
        bencher.iter(|| native::sum(black_box(7), black_box(35)))
    });

    let cases: [(&str, &dyn GuestProvider, &str, Signature); 4] = [
        ("native_direct", &native_provider, "sum", Signature::primitive(2)),
        ("native_boxed", &native_provider, "boxed_sum", Signature::generic(2)),
        ("script_direct", &script_provider, "sum", Signature::primitive(2)),
        ("script_boxed", &script_provider, "sum", Signature::generic(2)),
    ];
    for (label, provider, identifier, signature) in cases {
        let target = resolve(provider, "arithmetic", identifier, signature).expect(label);
        let args = [
            Value::int_as(7, signature.repr),
            Value::int_as(35, signature.repr),
        ];
        group.bench_function(label, |bencher| {
            bencher.iter(|| target.invoke(black_box(&args[..])))
        });
    }

    group.finish();
}

fn bench_gcd_targets(c: &mut Criterion) {
    let native_provider = NativeProvider::standard();
    let script_provider = ScriptProvider::new();
    let pairs = dataset::generate_with(&dataset::GenerateConfig {
        count: 1024,
        arity: 2,
        seed: 999_666,
        domain: dataset::OperandDomain::NonNegative,
    })
    .expect("pair table");

    let mut group = c.benchmark_group("gcd_dispatch");
    group.throughput(criterion::Throughput::Elements(pairs.len() as u64));

    group.bench_function("static_call", |bencher| {
        bencher.iter(|| {
            let mut acc = 0i64;
            for pair in pairs.values().chunks_exact(2) {
                acc ^= native::gcd(black_box(pair[0]), black_box(pair[1]));
            }
            acc
        })
    });

    let cases: [(&str, &dyn GuestProvider, Signature); 3] = [
        ("native_direct", &native_provider, Signature::primitive(2)),
        ("native_boxed", &native_provider, Signature::generic(2)),
        ("script", &script_provider, Signature::primitive(2)),
    ];
    for (label, provider, signature) in cases {
        let target = resolve(provider, "arithmetic", "gcd", signature).expect("gcd target");
        group.bench_with_input(BenchmarkId::new("target", label), &pairs, |bencher, pairs| {
            bencher.iter(|| {
                let mut acc = 0i64;
                for pair in pairs.values().chunks_exact(2) {
                    let args = [
                        Value::int_as(pair[0], signature.repr),
                        Value::int_as(pair[1], signature.repr),
                    ];
                    acc ^= target.invoke_i64(black_box(&args[..])).unwrap_or_default();
                }
                acc
            })
        });
    }

    group.finish();
}

fn bench_resolution(c: &mut Criterion) {
    let native_provider = NativeProvider::standard();
    let script_provider = ScriptProvider::new();

    let mut group = c.benchmark_group("resolution");
    group.bench_function("native_gcd", |bencher| {
        bencher.iter(|| {
            resolve(
                &native_provider,
                black_box("arithmetic"),
                black_box("gcd"),
                Signature::primitive(2),
            )
        })
    });
    // Includes compiling the built-in module source.
    group.bench_function("script_gcd", |bencher| {
        bencher.iter(|| {
            resolve(
                &script_provider,
                black_box("arithmetic"),
                black_box("gcd"),
                Signature::primitive(2),
            )
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_sum_targets,
    bench_gcd_targets,
    bench_resolution
);
criterion_main!(benches);
