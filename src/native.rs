//! In-process provider: a name-indexed symbol table of Rust functions.
//!
//! Looking a symbol up by `(module, name)` and checking it against a requested
//! signature is the reflective path; once bound, primitive symbols become
//! [`CallTarget::direct`] and boxed symbols [`CallTarget::generic`].

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{InvokeError, ResolutionError};
use crate::target::{
    foreign_handle, int_arg, CallTarget, GenericFn, GuestProvider, ModuleHandle, NativeFn, Repr,
    Signature, Value,
};

const PROVIDER: &str = "native";

/// A registered native function.
#[derive(Clone, Copy, Debug)]
pub enum NativeSymbol {
    Primitive(NativeFn),
    Boxed { arity: usize, f: GenericFn },
}

impl NativeSymbol {
    pub fn arity(&self) -> usize {
        match self {
            NativeSymbol::Primitive(f) => f.arity(),
            NativeSymbol::Boxed { arity, .. } => *arity,
        }
    }
}

#[derive(Debug, Default, Clone)]
struct NativeModule {
    symbols: BTreeMap<String, NativeSymbol>,
}

/// Symbol-table provider over Rust functions.
#[derive(Debug, Default, Clone)]
pub struct NativeProvider {
    modules: BTreeMap<String, Arc<NativeModule>>,
}

impl NativeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider preloaded with the `arithmetic`, `decorators` and
    /// `filter-map-reduce` modules.
    pub fn standard() -> Self {
        let mut p = Self::new();
        p.register("arithmetic", "sum", NativeSymbol::Primitive(NativeFn::Arity2(sum)));
        p.register(
            "arithmetic",
            "sum_with_constant",
            NativeSymbol::Primitive(NativeFn::Arity1(sum_with_constant)),
        );
        p.register(
            "arithmetic",
            "sum_of_constants",
            NativeSymbol::Primitive(NativeFn::Arity0(sum_of_constants)),
        );
        p.register(
            "arithmetic",
            "boxed_sum",
            NativeSymbol::Boxed {
                arity: 2,
                f: boxed_sum,
            },
        );
        p.register(
            "arithmetic",
            "boxed_sum_with_constant",
            NativeSymbol::Boxed {
                arity: 1,
                f: boxed_sum_with_constant,
            },
        );
        p.register("arithmetic", "gcd", NativeSymbol::Primitive(NativeFn::Arity2(gcd)));

        p.register("decorators", "add", NativeSymbol::Primitive(NativeFn::Arity2(add)));
        p.register("decorators", "times", NativeSymbol::Primitive(NativeFn::Arity2(times)));
        p.register(
            "decorators",
            "add_then_times",
            NativeSymbol::Primitive(NativeFn::Arity2(add_then_times)),
        );

        p.register(
            "filter-map-reduce",
            "run",
            NativeSymbol::Boxed {
                arity: 1,
                f: boxed_filter_map_reduce,
            },
        );
        p
    }

    /// Add or replace `module::name`. Handles loaded earlier keep their snapshot.
    pub fn register(&mut self, module: &str, name: &str, symbol: NativeSymbol) {
        let entry = self.modules.entry(module.to_string()).or_default();
        Arc::make_mut(entry)
            .symbols
            .insert(name.to_string(), symbol);
    }

    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }
}

impl GuestProvider for NativeProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn load(&self, module: &str) -> Result<ModuleHandle, ResolutionError> {
        let m = self
            .modules
            .get(module)
            .ok_or_else(|| ResolutionError::ModuleNotFound {
                provider: PROVIDER.to_string(),
                module: module.to_string(),
            })?;
        Ok(ModuleHandle::new(PROVIDER, module, Arc::clone(m)))
    }

    fn resolve(
        &self,
        handle: &ModuleHandle,
        identifier: &str,
        signature: Signature,
    ) -> Result<CallTarget, ResolutionError> {
        let module = handle
            .downcast_ref::<Arc<NativeModule>>()
            .ok_or_else(|| foreign_handle(PROVIDER, handle))?;
        let symbol = module.symbols.get(identifier).ok_or_else(|| {
            ResolutionError::UnknownIdentifier {
                provider: PROVIDER.to_string(),
                module: handle.name().to_string(),
                identifier: identifier.to_string(),
            }
        })?;
        if symbol.arity() != signature.arity {
            return Err(ResolutionError::ArityMismatch {
                provider: PROVIDER.to_string(),
                identifier: identifier.to_string(),
                expected: signature.arity,
                actual: symbol.arity(),
            });
        }

        let qualified = format!("{}::{}", handle.name(), identifier);
        match (*symbol, signature.repr) {
            (NativeSymbol::Primitive(f), repr) => Ok(CallTarget::direct(qualified, f, repr)),
            (NativeSymbol::Boxed { arity, f }, Repr::Boxed) => {
                Ok(CallTarget::generic(qualified, f, arity))
            }
            (NativeSymbol::Boxed { .. }, Repr::Primitive) => {
                Err(ResolutionError::UnsupportedRepresentation {
                    provider: PROVIDER.to_string(),
                    identifier: identifier.to_string(),
                    repr: Repr::Primitive.as_str(),
                })
            }
        }
    }
}

// --- arithmetic ---

pub fn sum(x: i64, y: i64) -> i64 {
    x.wrapping_add(y)
}

pub fn sum_with_constant(x: i64) -> i64 {
    x.wrapping_add(10)
}

pub fn sum_of_constants() -> i64 {
    1 + 2
}

pub fn boxed_sum(args: &[Value]) -> Result<Value, InvokeError> {
    Ok(Value::boxed(int_arg(args, 0)?.wrapping_add(int_arg(args, 1)?)))
}

pub fn boxed_sum_with_constant(args: &[Value]) -> Result<Value, InvokeError> {
    Ok(Value::boxed(int_arg(args, 0)?.wrapping_add(10)))
}

/// Subtraction-based Euclid. Operands are taken by magnitude and `gcd(0, n) == n`;
/// inputs are expected to fit in 32 bits.
pub fn gcd(x: i64, y: i64) -> i64 {
    let mut a = x.wrapping_abs();
    let mut b = y.wrapping_abs();
    if a == 0 {
        return b;
    }
    if b == 0 {
        return a;
    }
    while a != b {
        if a > b {
            a -= b;
        } else {
            b -= a;
        }
    }
    a
}

// --- decorators ---

pub fn add(v: i64, n: i64) -> i64 {
    v.wrapping_add(n)
}

pub fn times(v: i64, n: i64) -> i64 {
    v.wrapping_mul(n)
}

/// Multiplier applied by the `add_then_times` decorator.
pub const DECORATOR_FACTOR: i64 = 123;

pub fn add_then_times(v: i64, n: i64) -> i64 {
    times(add(v, n), DECORATOR_FACTOR)
}

// --- filter-map-reduce ---

/// Keep even values, double them, sum.
pub fn filter_map_reduce(data: &[i64]) -> i64 {
    data.iter()
        .filter(|&&v| v % 2 == 0)
        .map(|&v| v.wrapping_mul(2))
        .fold(0i64, i64::wrapping_add)
}

fn boxed_filter_map_reduce(args: &[Value]) -> Result<Value, InvokeError> {
    let data = args[0]
        .downcast_ref::<Arc<Vec<i64>>>()
        .ok_or(InvokeError::Type { position: 0 })?;
    Ok(Value::boxed(filter_map_reduce(data)))
}
