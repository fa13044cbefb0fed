use clap::ValueEnum;

pub mod benches;
pub mod dataset;
pub mod error;
pub mod fixture;
pub mod harness;
pub mod native;
pub mod schema;
pub mod script;
pub mod target;

pub use error::{BenchError, InvokeError, ResolutionError};
pub use fixture::{Benchmark, FixtureContext, FixtureScope};
pub use harness::{run_benchmark, run_concurrent, Mode, RunConfig};
pub use target::{CallTarget, GuestProvider, Signature, Value};

/// Dispatch backend(s) a suite should measure.
#[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq)]
pub enum Backend {
    /// Every backend, plus the static-call baselines.
    #[default]
    All,
    /// Native functions called through direct call targets.
    Native,
    /// Native functions behind boxed/generic call targets.
    Boxed,
    /// Functions of the script guest provider.
    Script,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::All => "all",
            Backend::Native => "native",
            Backend::Boxed => "boxed",
            Backend::Script => "script",
        }
    }

    /// Whether a body tagged `body` runs under this filter. Baselines run with
    /// the native backend.
    pub fn includes(&self, body: Backend) -> bool {
        *self == Backend::All || *self == body
    }
}
