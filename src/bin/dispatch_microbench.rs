use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use dispatch_microbench::benches::{self, gcd::GcdArgs, SuiteOutput};
use dispatch_microbench::dataset::{self, GenerateConfig, OperandDomain};
use dispatch_microbench::harness::{BenchConfig, Profile};
use dispatch_microbench::schema::{RunMeta, SuiteReport, SCHEMA_VERSION};
use dispatch_microbench::Backend;
use std::fs;
use std::path::PathBuf;
use tracing::info;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ProfileArg {
    Quick,
    Full,
}

impl From<ProfileArg> for Profile {
    fn from(v: ProfileArg) -> Self {
        match v {
            ProfileArg::Quick => Profile::Quick,
            ProfileArg::Full => Profile::Full,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DomainArg {
    Signed32,
    NonNegative,
    Sequential,
}

impl From<DomainArg> for OperandDomain {
    fn from(v: DomainArg) -> Self {
        match v {
            DomainArg::Signed32 => OperandDomain::Signed32,
            DomainArg::NonNegative => OperandDomain::NonNegative,
            DomainArg::Sequential => OperandDomain::Sequential,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Cost of an integer sum: baseline, direct, boxed and script targets.
    Arithmetic {
        #[arg(long, value_enum, default_value_t = Backend::All)]
        backend: Backend,
    },

    /// Subtraction GCD over a table of operand pairs, one sample per table pass.
    Gcd {
        #[arg(long, value_enum, default_value_t = Backend::All)]
        backend: Backend,

        /// Pairs to generate when no dataset file is given.
        #[arg(long)]
        count: Option<usize>,

        /// Dataset file of operand pairs written by `generate-dataset`.
        #[arg(long, value_name = "FILE")]
        dataset: Option<PathBuf>,
    },

    /// Even filter, doubling map and sum over `0..4096`.
    FilterMapReduce {
        #[arg(long, value_enum, default_value_t = Backend::All)]
        backend: Backend,
    },

    /// `(a + b) * c` with the multiplication as a decorator.
    Decorators {
        #[arg(long, value_enum, default_value_t = Backend::All)]
        backend: Backend,
    },

    /// Run every suite.
    Suite {
        #[arg(long, value_enum, default_value_t = Backend::All)]
        backend: Backend,

        #[arg(long, value_name = "FILE")]
        gcd_dataset: Option<PathBuf>,
    },

    /// Generate a deterministic workload dataset file.
    GenerateDataset {
        /// Number of samples to generate.
        #[arg(long, short = 'n', default_value_t = 100_000)]
        count: usize,

        /// Operands per sample.
        #[arg(long, default_value_t = 2)]
        arity: usize,

        #[arg(long, value_enum, default_value_t = DomainArg::NonNegative)]
        domain: DomainArg,

        /// Output file. The global `--seed` picks the data, 999666 when omitted.
        #[arg(long, short = 'o', value_name = "FILE")]
        output: PathBuf,
    },

    /// Show metadata for a dataset file.
    DatasetInfo {
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },
}

#[derive(Parser, Debug)]
#[command(name = "dispatch-microbench")]
#[command(about = "Call-dispatch overhead micro-benchmarks (JSON output)")]
struct Args {
    #[arg(long, value_enum, default_value_t = ProfileArg::Quick, global = true)]
    profile: ProfileArg,

    /// Run seed. When omitted the harness uses 0 and the gcd table its reference
    /// seed 999666.
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Where to write the JSON report. If omitted, prints to stdout.
    #[arg(long, global = true)]
    out: Option<PathBuf>,

    /// Worker threads per benchmark body; each runs its own trial.
    #[arg(long, default_value_t = 1, global = true)]
    threads: usize,

    /// Directory of `*.bench` script modules overriding the built-in ones.
    #[arg(long, value_name = "DIR", global = true)]
    script_dir: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

fn now_utc() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("unix:{secs}")
}

fn git_sha_short() -> Option<String> {
    std::env::var("GIT_SHA")
        .ok()
        .or_else(|| std::env::var("GITHUB_SHA").ok())
        .map(|s| s.chars().take(12).collect())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if args.threads == 0 {
        bail!("--threads must be at least 1");
    }
    let cfg = BenchConfig {
        profile: args.profile.into(),
        seed: args.seed.unwrap_or(0),
        threads: args.threads,
        script_dir: args.script_dir.clone(),
    };

    let output = match &args.cmd {
        Command::Arithmetic { backend } => benches::arithmetic::run(&cfg, *backend),
        Command::Gcd {
            backend,
            count,
            dataset,
        } => {
            let gcd_args = GcdArgs {
                count: *count,
                dataset: dataset.clone(),
                seed: args.seed,
            };
            benches::gcd::run(&cfg, *backend, &gcd_args)
        }
        Command::FilterMapReduce { backend } => benches::filter_map_reduce::run(&cfg, *backend),
        Command::Decorators { backend } => benches::decorators::run(&cfg, *backend),
        Command::Suite {
            backend,
            gcd_dataset,
        } => {
            let mut all = SuiteOutput::default();
            all.extend(benches::arithmetic::run(&cfg, *backend));
            let gcd_args = GcdArgs {
                count: None,
                dataset: gcd_dataset.clone(),
                seed: args.seed,
            };
            all.extend(benches::gcd::run(&cfg, *backend, &gcd_args));
            all.extend(benches::filter_map_reduce::run(&cfg, *backend));
            all.extend(benches::decorators::run(&cfg, *backend));
            all
        }
        Command::GenerateDataset {
            count,
            arity,
            domain,
            output,
        } => {
            let seed = args.seed.unwrap_or(benches::gcd::DEFAULT_SEED);
            let gen_config = GenerateConfig {
                count: *count,
                arity: *arity,
                seed,
                domain: (*domain).into(),
            };
            if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }

            let start = std::time::Instant::now();
            let data = dataset::generate_with(&gen_config)?;
            dataset::write_dataset(output, &data)
                .with_context(|| format!("writing {}", output.display()))?;
            let elapsed = start.elapsed();

            let file_size = fs::metadata(output)?.len();
            info!(
                path = %output.display(),
                count,
                arity,
                domain = gen_config.domain.as_str(),
                seed,
                bytes = file_size,
                secs = elapsed.as_secs_f64(),
                "dataset written"
            );
            eprintln!("Dataset saved: {}", output.display());
            eprintln!("  Samples: {}", count);
            eprintln!("  Arity: {}", arity);
            eprintln!("  Domain: {}", gen_config.domain.as_str());
            eprintln!("  Seed: {}", seed);
            eprintln!("  File size: {:.2} MB", file_size as f64 / 1_048_576.0);
            return Ok(());
        }
        Command::DatasetInfo { path } => {
            let meta = dataset::read_dataset_meta(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let file_size = fs::metadata(path)?.len();
            eprintln!("Dataset: {}", path.display());
            eprintln!("  Samples: {}", meta.count);
            eprintln!("  Arity: {}", meta.arity);
            eprintln!("  Domain: {}", meta.domain.as_str());
            eprintln!("  Seed: {}", meta.seed);
            eprintln!("  File size: {:.2} MB", file_size as f64 / 1_048_576.0);
            if dataset::expected_file_size(meta.count, meta.arity) != Some(file_size) {
                eprintln!("  Warning: size does not match header");
            }
            return Ok(());
        }
    };

    let report = SuiteReport {
        run: RunMeta {
            schema_version: SCHEMA_VERSION,
            bench_version: env!("CARGO_PKG_VERSION").to_string(),
            profile: cfg.profile.as_str().to_string(),
            seed: cfg.seed,
            threads: cfg.threads,
            timestamp_utc: now_utc(),
            git_sha: git_sha_short(),
        },
        measurements: output.measurements,
        failures: output.failures,
    };

    let json = serde_json::to_string_pretty(&report)?;
    if let Some(out) = args.out {
        fs::write(&out, json).with_context(|| format!("writing {}", out.display()))?;
    } else {
        println!("{json}");
    }

    if !report.failures.is_empty() {
        bail!("{} benchmark bod(ies) failed", report.failures.len());
    }
    Ok(())
}
