//! Descriptors for target callables and sub-dependencies.
//!
//! Signature introspection is an external collaborator: a [Callable] bundles
//! what that collaborator would produce for one function: an ordered list of
//! [parameter descriptors](crate::injectable::ParamSpec), a declared return
//! type and the invocable body. Bodies come in four flavors: plain sync,
//! plain async, and the two scoped variants whose acquisition yields a value
//! together with a paired release step (the context-manager protocol reduced
//! to an explicit `(value, release)` pair).
//!
//! A [Callable] is cheap to clone and carries a stable [CallableId], which is
//! what the [override registry](crate::overrides) keys on.

use derivative::Derivative;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::InjectError;
use crate::future::{BoxFuture, FutureExt};
use crate::injectable::ParamSpec;
use crate::value::{Args, TypeKey, Value};

/// Stable identity of a [Callable], unique within the process.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Debug)]
pub struct CallableId(u64);

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

impl CallableId {
    fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Release step paired with a synchronously acquired scoped resource.
pub type ReleaseFn = Box<dyn FnOnce() + Send>;

type SyncCallFn = Box<dyn Fn(Args) -> Result<Value, InjectError> + Send + Sync>;
type AsyncCallFn = Box<dyn Fn(Args) -> BoxFuture<'static, Result<Value, InjectError>> + Send + Sync>;
// Arc rather than Box: acquisition runs on a blocking worker thread, which
// needs its own handle to the closure.
type SyncAcquireFn = Arc<dyn Fn(Args) -> Result<(Value, ReleaseFn), InjectError> + Send + Sync>;
type AsyncAcquireFn = Box<
    dyn Fn(Args) -> BoxFuture<'static, Result<(Value, BoxFuture<'static, ()>), InjectError>>
        + Send
        + Sync,
>;

/// The invocable part of a [Callable].
#[derive(Derivative)]
#[derivative(Debug)]
pub enum CallBody {
    /// Produces its value without suspending.
    Sync(#[derivative(Debug = "ignore")] SyncCallFn),
    /// Must be awaited.
    Async(#[derivative(Debug = "ignore")] AsyncCallFn),
    /// Acquires a scoped resource on a blocking thread; the release runs
    /// there too.
    SyncScoped(#[derivative(Debug = "ignore")] SyncAcquireFn),
    /// Acquires a scoped resource cooperatively; the release is awaited.
    AsyncScoped(#[derivative(Debug = "ignore")] AsyncAcquireFn),
}

impl CallBody {
    /// Whether invoking this body involves the concurrency scheduler.
    pub fn is_async(&self) -> bool {
        !matches!(self, CallBody::Sync(_))
    }

    pub fn is_scoped(&self) -> bool {
        matches!(self, CallBody::SyncScoped(_) | CallBody::AsyncScoped(_))
    }
}

#[derive(Debug)]
struct CallableInner {
    id: CallableId,
    name: String,
    params: Vec<ParamSpec>,
    returns: Option<TypeKey>,
    body: CallBody,
}

/// A target function or sub-dependency as seen by the resolution engine.
#[derive(Clone, Debug)]
pub struct Callable {
    inner: Arc<CallableInner>,
}

impl Callable {
    pub fn builder<N: Into<String>>(name: N) -> CallableBuilder {
        CallableBuilder {
            name: name.into(),
            params: Vec::new(),
            returns: None,
        }
    }

    #[inline]
    pub fn id(&self) -> CallableId {
        self.inner.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[inline]
    pub fn params(&self) -> &[ParamSpec] {
        &self.inner.params
    }

    #[inline]
    pub fn returns(&self) -> Option<TypeKey> {
        self.inner.returns
    }

    #[inline]
    pub fn body(&self) -> &CallBody {
        &self.inner.body
    }
}

impl PartialEq for Callable {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Callable {}

/// Builder for [Callable]s. The terminal methods select the body flavor and
/// wrap the typed return value into a [Value].
pub struct CallableBuilder {
    name: String,
    params: Vec<ParamSpec>,
    returns: Option<TypeKey>,
}

impl CallableBuilder {
    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    /// Declares the return type, used by the signature check to validate
    /// dependency compatibility.
    pub fn returns<T: 'static>(mut self) -> Self {
        self.returns = Some(TypeKey::of::<T>());
        self
    }

    fn build(self, body: CallBody) -> Callable {
        Callable {
            inner: Arc::new(CallableInner {
                id: CallableId::next(),
                name: self.name,
                params: self.params,
                returns: self.returns,
                body,
            }),
        }
    }

    pub fn sync_body<F, T>(self, f: F) -> Callable
    where
        F: Fn(Args) -> Result<T, InjectError> + Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        self.build(CallBody::Sync(Box::new(move |args| {
            f(args).map(Value::new)
        })))
    }

    pub fn async_body<F, Fut, T>(self, f: F) -> Callable
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<T, InjectError>> + Send + 'static,
        T: Send + Sync + 'static,
    {
        self.build(CallBody::Async(Box::new(move |args| {
            let fut = f(args);
            async move { fut.await.map(Value::new) }.boxed()
        })))
    }

    pub fn scoped_sync_body<F, T>(self, f: F) -> Callable
    where
        F: Fn(Args) -> Result<(T, ReleaseFn), InjectError> + Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        self.build(CallBody::SyncScoped(Arc::new(move |args| {
            f(args).map(|(value, release)| (Value::new(value), release))
        })))
    }

    pub fn scoped_async_body<F, Fut, T>(self, f: F) -> Callable
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(T, BoxFuture<'static, ()>), InjectError>>
            + Send
            + 'static,
        T: Send + Sync + 'static,
    {
        self.build(CallBody::AsyncScoped(Box::new(move |args| {
            let fut = f(args);
            async move {
                fut.await
                    .map(|(value, release)| (Value::new(value), release))
            }
            .boxed()
        })))
    }
}
