//! The resolution entry point.
//!
//! [inject] ties the pieces together: build the resolver plan for a target,
//! execute it against the caller's context and hand back a [BoundCall] with
//! every resolvable argument already bound. Arguments left unresolved (with
//! [InjectOptions::allow_incomplete] on) can still be supplied at call time;
//! calling without them fails with an error naming each missing parameter.
//!
//! Scoped resources acquired while resolving live exactly as long as the
//! bound call: they are released, in reverse-acquisition order, when the call
//! completes or when resolution fails partway.

use derivative::Derivative;
use tracing::debug;

use crate::callable::Callable;
use crate::context::Context;
use crate::error::InjectError;
use crate::injectable::ParamSpec;
use crate::overrides::OverrideRegistry;
use crate::resolver::{build_plan, invoke, resolve_plan, InjectOptions};
use crate::resource::ResourceScope;
use crate::value::{Args, Value};

/// Resolves `context` into bound arguments for `target`. The first
/// definition, validation or lookup failure encountered propagates
/// unmodified; on failure every scoped resource acquired so far is released
/// before the error is returned.
pub async fn inject(
    target: &Callable,
    context: &Context,
    overrides: Option<&OverrideRegistry>,
    options: InjectOptions,
) -> Result<BoundCall, InjectError> {
    let plan = build_plan(target, context, overrides, options)?;
    debug!(
        "Resolving {} of {} argument(s) for '{}'.",
        plan.len(),
        target.params().len(),
        target.name()
    );

    let scope = ResourceScope::new();
    match resolve_plan(&plan, context, &scope).await {
        Ok(resolved) => Ok(BoundCall {
            target: target.clone(),
            resolved,
            scope,
        }),
        Err(error) => {
            scope.close().await;
            Err(error)
        }
    }
}

/// A target callable with resolved arguments bound, plus the scope owning any
/// resources acquired along the way.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct BoundCall {
    target: Callable,
    resolved: Args,
    #[derivative(Debug = "ignore")]
    scope: ResourceScope,
}

impl BoundCall {
    #[inline]
    pub fn target(&self) -> &Callable {
        &self.target
    }

    #[inline]
    pub fn resolved(&self) -> &Args {
        &self.resolved
    }

    /// Parameters which resolution left unbound.
    pub fn missing(&self) -> Vec<&str> {
        self.target
            .params()
            .iter()
            .map(ParamSpec::name)
            .filter(|name| !self.resolved.contains(name))
            .collect()
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }

    /// Invokes the target with the bound arguments.
    pub async fn call(self) -> Result<Value, InjectError> {
        self.call_with(Args::new()).await
    }

    /// Invokes the target with the bound arguments plus caller-supplied ones.
    /// Bound arguments win on conflict; arguments still missing after the
    /// merge fail the call with their names.
    pub async fn call_with(self, supplied: Args) -> Result<Value, InjectError> {
        let mut args = self.resolved;
        args.fill_missing(supplied);

        let missing = self
            .target
            .params()
            .iter()
            .map(ParamSpec::name)
            .filter(|name| !args.contains(name))
            .map(str::to_string)
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            self.scope.close().await;
            return Err(InjectError::Unresolved(missing));
        }

        let result = invoke(self.target, args, &self.scope).await;
        self.scope.close().await;
        result
    }
}
