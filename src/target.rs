//! Call targets: one `invoke` contract over every dispatch mechanism.
//!
//! A [`CallTarget`] is bound once (during trial setup) against a backend and then
//! invoked many times. Whatever the backend, the call site looks the same:
//! `target.invoke(&[args])`. The per-backend difference is decided by the variant
//! chosen at resolution time, never by inspecting argument types per call.
//!
//! | Backend | Produced by | Entry point |
//! |---------|-------------|-------------|
//! | native direct | [`CallTarget::direct`], native provider | `fn` pointer over `i64` |
//! | generic/boxed | [`CallTarget::generic`], native provider | `fn(&[Value]) -> Result<Value, _>` |
//! | dynamic | a [`GuestProvider`] | `Arc<dyn Invocable>` |

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::{InvokeError, ResolutionError};

/// An argument or result crossing a call target.
#[derive(Debug)]
pub enum Value {
    /// Unboxed machine integer.
    Int(i64),
    /// Heap value behind a uniform reference.
    Boxed(Box<dyn Any + Send + Sync>),
}

impl Value {
    #[inline]
    pub fn boxed<T: Any + Send + Sync>(v: T) -> Self {
        Value::Boxed(Box::new(v))
    }

    /// Integer content in either representation.
    #[inline]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Boxed(b) => b.downcast_ref::<i64>().copied(),
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Value::Int(_) => None,
            Value::Boxed(b) => b.downcast_ref::<T>(),
        }
    }

    pub fn repr(&self) -> Repr {
        match self {
            Value::Int(_) => Repr::Primitive,
            Value::Boxed(_) => Repr::Boxed,
        }
    }

    /// Integer `v` in representation `repr`.
    #[inline]
    pub fn int_as(v: i64, repr: Repr) -> Self {
        match repr {
            Repr::Primitive => Value::Int(v),
            Repr::Boxed => Value::boxed(v),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

/// Value representation a signature promises.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Repr {
    Primitive,
    Boxed,
}

impl Repr {
    pub fn as_str(&self) -> &'static str {
        match self {
            Repr::Primitive => "primitive",
            Repr::Boxed => "boxed",
        }
    }
}

/// Declared arity and representation of a call target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    pub arity: usize,
    pub repr: Repr,
}

impl Signature {
    /// `(i64, ..) -> i64`
    pub const fn primitive(arity: usize) -> Self {
        Self {
            arity,
            repr: Repr::Primitive,
        }
    }

    /// `(Value, ..) -> Value` with a boxed result.
    pub const fn generic(arity: usize) -> Self {
        Self {
            arity,
            repr: Repr::Boxed,
        }
    }
}

/// Backend family a target was bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    NativeDirect,
    Generic,
    Dynamic,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::NativeDirect => "native_direct",
            BackendKind::Generic => "generic",
            BackendKind::Dynamic => "dynamic",
        }
    }
}

/// Plain function pointer over unboxed integers.
#[derive(Clone, Copy, Debug)]
pub enum NativeFn {
    Arity0(fn() -> i64),
    Arity1(fn(i64) -> i64),
    Arity2(fn(i64, i64) -> i64),
}

impl NativeFn {
    pub fn arity(&self) -> usize {
        match self {
            NativeFn::Arity0(_) => 0,
            NativeFn::Arity1(_) => 1,
            NativeFn::Arity2(_) => 2,
        }
    }
}

/// Function over boxed values.
pub type GenericFn = fn(&[Value]) -> Result<Value, InvokeError>;

/// Entry point handed out by a guest provider.
///
/// Implementations must return results in the representation they were resolved
/// with.
pub trait Invocable: Send + Sync {
    fn arity(&self) -> usize;
    fn call(&self, args: &[Value]) -> Result<Value, InvokeError>;
}

#[derive(Clone)]
enum Entry {
    Direct(NativeFn),
    Generic(GenericFn),
    Dynamic(Arc<dyn Invocable>),
}

/// A resolved, immutable handle to an invocable unit of work.
#[derive(Clone)]
pub struct CallTarget {
    name: Arc<str>,
    signature: Signature,
    entry: Entry,
}

impl CallTarget {
    /// Native function called directly; the result is boxed when `repr` is `Boxed`.
    pub fn direct(name: impl Into<Arc<str>>, f: NativeFn, repr: Repr) -> Self {
        Self {
            name: name.into(),
            signature: Signature {
                arity: f.arity(),
                repr,
            },
            entry: Entry::Direct(f),
        }
    }

    pub fn generic(name: impl Into<Arc<str>>, f: GenericFn, arity: usize) -> Self {
        Self {
            name: name.into(),
            signature: Signature::generic(arity),
            entry: Entry::Generic(f),
        }
    }

    pub fn dynamic(
        name: impl Into<Arc<str>>,
        f: Arc<dyn Invocable>,
        signature: Signature,
    ) -> Self {
        Self {
            name: name.into(),
            signature,
            entry: Entry::Dynamic(f),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> Signature {
        self.signature
    }

    pub fn arity(&self) -> usize {
        self.signature.arity
    }

    pub fn kind(&self) -> BackendKind {
        match self.entry {
            Entry::Direct(_) => BackendKind::NativeDirect,
            Entry::Generic(_) => BackendKind::Generic,
            Entry::Dynamic(_) => BackendKind::Dynamic,
        }
    }

    /// Call the target. The result is in the representation of `signature().repr`.
    #[inline]
    pub fn invoke(&self, args: &[Value]) -> Result<Value, InvokeError> {
        if args.len() != self.signature.arity {
            return Err(InvokeError::Arity {
                expected: self.signature.arity,
                actual: args.len(),
            });
        }
        match &self.entry {
            Entry::Direct(f) => {
                let out = match *f {
                    NativeFn::Arity0(f) => f(),
                    NativeFn::Arity1(f) => f(int_arg(args, 0)?),
                    NativeFn::Arity2(f) => f(int_arg(args, 0)?, int_arg(args, 1)?),
                };
                Ok(Value::int_as(out, self.signature.repr))
            }
            Entry::Generic(f) => f(args),
            Entry::Dynamic(f) => f.call(args),
        }
    }

    /// [`invoke`](Self::invoke) and read the result as an integer.
    #[inline]
    pub fn invoke_i64(&self, args: &[Value]) -> Result<i64, InvokeError> {
        self.invoke(args)?.as_i64().ok_or(InvokeError::ResultType)
    }
}

impl fmt::Debug for CallTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallTarget")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .field("kind", &self.kind())
            .finish()
    }
}

#[inline]
pub(crate) fn int_arg(args: &[Value], position: usize) -> Result<i64, InvokeError> {
    args[position]
        .as_i64()
        .ok_or(InvokeError::Type { position })
}

/// Opaque loaded module, only meaningful to the provider that produced it.
#[derive(Clone)]
pub struct ModuleHandle {
    name: Arc<str>,
    provider: Arc<str>,
    inner: Arc<dyn Any + Send + Sync>,
}

impl ModuleHandle {
    pub fn new<T: Any + Send + Sync>(
        provider: impl Into<Arc<str>>,
        name: impl Into<Arc<str>>,
        inner: T,
    ) -> Self {
        Self {
            name: name.into(),
            provider: provider.into(),
            inner: Arc::new(inner),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }
}

impl fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleHandle")
            .field("provider", &self.provider)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// A loader of callable units, such as a guest-language runtime.
///
/// Providers are shared between worker threads; each worker resolves its own
/// targets during trial setup.
pub trait GuestProvider: Send + Sync {
    fn name(&self) -> &str;

    fn load(&self, module: &str) -> Result<ModuleHandle, ResolutionError>;

    fn resolve(
        &self,
        handle: &ModuleHandle,
        identifier: &str,
        signature: Signature,
    ) -> Result<CallTarget, ResolutionError>;
}

/// Load `module` from `provider` and bind `identifier` with `signature`.
pub fn resolve(
    provider: &dyn GuestProvider,
    module: &str,
    identifier: &str,
    signature: Signature,
) -> Result<CallTarget, ResolutionError> {
    let handle = provider.load(module)?;
    provider.resolve(&handle, identifier, signature)
}

/// Error for a handle that was produced by another provider.
pub(crate) fn foreign_handle(provider: &str, handle: &ModuleHandle) -> ResolutionError {
    ResolutionError::Load {
        provider: provider.to_string(),
        module: handle.name().to_string(),
        reason: format!("handle was produced by `{}`", handle.provider()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(x: i64, y: i64) -> i64 {
        x.wrapping_add(y)
    }

    fn boxed_add(args: &[Value]) -> Result<Value, InvokeError> {
        Ok(Value::boxed(int_arg(args, 0)? + int_arg(args, 1)?))
    }

    struct Doubler;

    impl Invocable for Doubler {
        fn arity(&self) -> usize {
            1
        }

        fn call(&self, args: &[Value]) -> Result<Value, InvokeError> {
            Ok(Value::Int(int_arg(args, 0)? * 2))
        }
    }

    #[test]
    fn direct_target_returns_declared_representation() {
        let prim = CallTarget::direct("add", NativeFn::Arity2(add), Repr::Primitive);
        let out = prim.invoke(&[Value::Int(7), Value::Int(35)]).unwrap();
        assert!(matches!(out, Value::Int(42)));

        let boxed = CallTarget::direct("add", NativeFn::Arity2(add), Repr::Boxed);
        let out = boxed.invoke(&[Value::Int(7), Value::Int(35)]).unwrap();
        assert_eq!(out.repr(), Repr::Boxed);
        assert_eq!(out.as_i64(), Some(42));
    }

    #[test]
    fn all_backends_share_the_call_shape() {
        let targets = [
            CallTarget::direct("add", NativeFn::Arity2(add), Repr::Primitive),
            CallTarget::generic("boxed_add", boxed_add, 2),
        ];
        for t in &targets {
            assert_eq!(t.invoke_i64(&[Value::Int(7), Value::boxed(35i64)]).unwrap(), 42);
        }
        let dynamic = CallTarget::dynamic("double", Arc::new(Doubler), Signature::primitive(1));
        assert_eq!(dynamic.kind(), BackendKind::Dynamic);
        assert_eq!(dynamic.invoke_i64(&[Value::Int(21)]).unwrap(), 42);
    }

    #[test]
    fn arity_is_checked_before_dispatch() {
        let t = CallTarget::direct("add", NativeFn::Arity2(add), Repr::Primitive);
        assert_eq!(
            t.invoke(&[Value::Int(1)]).unwrap_err(),
            InvokeError::Arity {
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn non_integer_argument_is_a_type_error() {
        let t = CallTarget::direct("add", NativeFn::Arity2(add), Repr::Primitive);
        let err = t
            .invoke(&[Value::Int(1), Value::boxed("nope")])
            .unwrap_err();
        assert_eq!(err, InvokeError::Type { position: 1 });
    }
}
