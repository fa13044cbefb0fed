//! Scripted guest provider.
//!
//! Modules are small source files in a tiny integer language (see [`syntax`] for the
//! grammar). A module is compiled once on [`GuestProvider::load`]; resolution binds
//! one of its functions by name and hands back a [`CallTarget::dynamic`].
//!
//! Lookup order for a module name: `<search_dir>/<name>.bench` if a search directory
//! is configured and the file exists, otherwise the built-in module of that name.

mod program;
mod syntax;

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

pub use program::{Program, MAX_CALL_DEPTH};

use crate::error::{InvokeError, ResolutionError};
use crate::target::{
    foreign_handle, int_arg, CallTarget, GuestProvider, Invocable, ModuleHandle, Signature, Value,
};

const PROVIDER: &str = "script";

/// File extension of script modules in a search directory.
pub const MODULE_EXTENSION: &str = "bench";

/// Compile-time failure of a script module.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("in `{function}`: {message}")]
    Semantic { function: String, message: String },
}

/// Built-in `arithmetic` module.
pub const ARITHMETIC_SOURCE: &str = r#"
# Integer sums, mirrored by the native `arithmetic` module.
fn sum(x, y) { x + y }
fn sum_with_constant(x) { x + 10 }
fn sum_of_constants() { 1 + 2 }

fn abs(v) { if v < 0 { -v } else { v } }

# Subtraction-based Euclid; gcd(0, n) == n.
fn gcd(x, y) {
    let a = abs(x);
    let b = abs(y);
    if a == 0 { b } else if b == 0 { a } else {
        while a != b {
            if a > b { a = a - b; } else { b = b - a; }
        }
        a
    }
}
"#;

/// Built-in `decorators` module: `add` is `times` wrapped around a sum.
pub const DECORATORS_SOURCE: &str = r#"
fn times(v, n) { v * n }
fn add(v, n) { times(v + n, 123) }
"#;

fn builtin_source(module: &str) -> Option<&'static str> {
    match module {
        "arithmetic" => Some(ARITHMETIC_SOURCE),
        "decorators" => Some(DECORATORS_SOURCE),
        _ => None,
    }
}

/// A module loaded by [`ScriptProvider`].
#[derive(Debug)]
pub struct ScriptModule {
    program: Arc<Program>,
    origin: Option<PathBuf>,
}

impl ScriptModule {
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Source file, or `None` for a built-in module.
    pub fn origin(&self) -> Option<&Path> {
        self.origin.as_deref()
    }
}

/// A script function bound to a signature.
struct ScriptFunction {
    program: Arc<Program>,
    index: usize,
    signature: Signature,
}

impl Invocable for ScriptFunction {
    fn arity(&self) -> usize {
        self.signature.arity
    }

    fn call(&self, args: &[Value]) -> Result<Value, InvokeError> {
        let out = match args.len() {
            0 => self.program.call(self.index, &[])?,
            1 => self.program.call(self.index, &[int_arg(args, 0)?])?,
            2 => self
                .program
                .call(self.index, &[int_arg(args, 0)?, int_arg(args, 1)?])?,
            n => {
                let mut ints = Vec::with_capacity(n);
                for i in 0..n {
                    ints.push(int_arg(args, i)?);
                }
                self.program.call(self.index, &ints)?
            }
        };
        Ok(Value::int_as(out, self.signature.repr))
    }
}

/// Guest provider over script modules.
#[derive(Debug, Clone, Default)]
pub struct ScriptProvider {
    search_dir: Option<PathBuf>,
}

impl ScriptProvider {
    /// Provider with the built-in modules only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider that also looks for `<dir>/<module>.bench`.
    pub fn with_search_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            search_dir: Some(dir.into()),
        }
    }

    pub fn search_dir(&self) -> Option<&Path> {
        self.search_dir.as_deref()
    }

    /// Module names available to [`GuestProvider::load`], built-ins included.
    pub fn available_modules(&self) -> Vec<String> {
        let mut names: BTreeSet<String> = ["arithmetic", "decorators"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        if let Some(dir) = &self.search_dir {
            for entry in WalkDir::new(dir)
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let path = entry.path();
                if !entry.file_type().is_file()
                    || path.extension().and_then(|e| e.to_str()) != Some(MODULE_EXTENSION)
                {
                    continue;
                }
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    if valid_module_name(stem) {
                        names.insert(stem.to_string());
                    }
                }
            }
        }
        names.into_iter().collect()
    }

    /// Hex SHA-256 of the module source behind `handle`.
    pub fn module_digest(handle: &ModuleHandle) -> Option<String> {
        handle
            .downcast_ref::<ScriptModule>()
            .map(|m| m.program.digest().to_string())
    }

    fn load_error(module: &str, reason: impl std::fmt::Display) -> ResolutionError {
        ResolutionError::Load {
            provider: PROVIDER.to_string(),
            module: module.to_string(),
            reason: reason.to_string(),
        }
    }

    fn source_for(&self, module: &str) -> Result<(String, Option<PathBuf>), ResolutionError> {
        if let Some(dir) = &self.search_dir {
            let path = dir.join(format!("{module}.{MODULE_EXTENSION}"));
            if path.is_file() {
                let src =
                    fs::read_to_string(&path).map_err(|e| Self::load_error(module, e))?;
                return Ok((src, Some(path)));
            }
        }
        builtin_source(module)
            .map(|s| (s.to_string(), None))
            .ok_or_else(|| ResolutionError::ModuleNotFound {
                provider: PROVIDER.to_string(),
                module: module.to_string(),
            })
    }
}

fn valid_module_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl GuestProvider for ScriptProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn load(&self, module: &str) -> Result<ModuleHandle, ResolutionError> {
        if !valid_module_name(module) {
            return Err(ResolutionError::ModuleNotFound {
                provider: PROVIDER.to_string(),
                module: module.to_string(),
            });
        }
        let (src, origin) = self.source_for(module)?;
        let program = Program::compile(&src).map_err(|e| Self::load_error(module, e))?;
        debug!(
            module,
            digest = program.digest(),
            origin = ?origin,
            "compiled script module"
        );
        Ok(ModuleHandle::new(
            PROVIDER,
            module,
            ScriptModule {
                program: Arc::new(program),
                origin,
            },
        ))
    }

    fn resolve(
        &self,
        handle: &ModuleHandle,
        identifier: &str,
        signature: Signature,
    ) -> Result<CallTarget, ResolutionError> {
        let module = handle
            .downcast_ref::<ScriptModule>()
            .ok_or_else(|| foreign_handle(PROVIDER, handle))?;
        let index = module.program.lookup(identifier).ok_or_else(|| {
            ResolutionError::UnknownIdentifier {
                provider: PROVIDER.to_string(),
                module: handle.name().to_string(),
                identifier: identifier.to_string(),
            }
        })?;
        let arity = module.program.arity(index);
        if arity != signature.arity {
            return Err(ResolutionError::ArityMismatch {
                provider: PROVIDER.to_string(),
                identifier: identifier.to_string(),
                expected: signature.arity,
                actual: arity,
            });
        }

        let f = ScriptFunction {
            program: Arc::clone(&module.program),
            index,
            signature,
        };
        Ok(CallTarget::dynamic(
            format!("{}::{}", handle.name(), identifier),
            Arc::new(f),
            signature,
        ))
    }
}
