//! Resolver construction and execution.
//!
//! [build_plan] classifies every parameter of a target callable into an
//! injection strategy and produces a [Plan]: one deferred resolver per
//! parameter, in declaration order. Strategy precedence is fixed and
//! documented: by-name, then the explicit marker, then by-type, then the
//! declared default. Explicit name targeting is the most specific request, so
//! it wins even when the parameter's type is also present in the context.
//!
//! [resolve_plan] executes a plan: synchronous resolvers run on the calling
//! turn, in declaration order; asynchronous resolvers are launched together
//! so independent sub-dependencies overlap in wall-clock time, and the first
//! failure cancels whatever is still pending and propagates unmodified.
//!
//! Sub-dependency plans are built recursively at plan-building time, which is
//! where overrides are applied and where cycles surface as definition errors
//! instead of runaway recursion.

use derivative::Derivative;
use futures::future::try_join_all;
use std::panic::resume_unwind;
use std::sync::Arc;
use tracing::debug;

use crate::callable::{CallBody, Callable, CallableId};
use crate::constraint::ConstraintSet;
use crate::context::{Context, ModelPtr};
use crate::error::{DefinitionError, InjectError};
use crate::future::{BoxFuture, FutureExt};
use crate::injectable::{Marker, ParamSpec};
use crate::overrides::{self, OverrideRegistry};
use crate::resource::ResourceScope;
use crate::validate::converters;
use crate::value::{Args, TypeKey, Value};

/// Backstop for pathological dependency nesting which a cycle check over ids
/// cannot catch (e.g. builders minting fresh callables at every level).
pub const MAX_DEPTH: usize = 64;

type SyncResolveFn = Box<dyn Fn(&Context) -> Result<Value, InjectError> + Send + Sync>;
type AsyncResolveFn = Box<
    dyn for<'a> Fn(&'a Context, &'a ResourceScope) -> BoxFuture<'a, Result<Value, InjectError>>
        + Send
        + Sync,
>;

/// Deferred computation producing one parameter's value.
#[derive(Derivative)]
#[derivative(Debug)]
pub enum Resolver {
    /// Produces its value from the context without suspending.
    Sync(#[derivative(Debug = "ignore")] SyncResolveFn),
    /// Goes through the concurrency scheduler; may acquire scoped resources.
    Async(#[derivative(Debug = "ignore")] AsyncResolveFn),
}

/// Knobs for plan building.
#[derive(Clone, Copy, Debug)]
pub struct InjectOptions {
    /// When off, a parameter with no applicable strategy fails plan building;
    /// when on, it is simply left out of the resolved arguments.
    pub allow_incomplete: bool,
    /// Whether declared constraint rules are enforced on resolved values.
    pub validate: bool,
}

impl Default for InjectOptions {
    fn default() -> Self {
        Self {
            allow_incomplete: true,
            validate: true,
        }
    }
}

/// Resolvers for one callable, in parameter declaration order. Owned by one
/// resolution pass.
#[derive(Debug)]
pub struct Plan {
    entries: Vec<(String, Resolver)>,
}

impl Plan {
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builds the resolver plan for `target` against `context`, recursing into
/// sub-dependencies with `overrides` applied.
pub fn build_plan(
    target: &Callable,
    context: &Context,
    overrides: Option<&OverrideRegistry>,
    options: InjectOptions,
) -> Result<Plan, InjectError> {
    debug!("Building resolution plan for '{}'.", target.name());
    let mut visiting = Vec::new();
    build_inner(target, context, overrides, options, &mut visiting)
}

fn build_inner(
    target: &Callable,
    context: &Context,
    overrides: Option<&OverrideRegistry>,
    options: InjectOptions,
    visiting: &mut Vec<CallableId>,
) -> Result<Plan, InjectError> {
    visiting.push(target.id());

    let mut entries = Vec::with_capacity(target.params().len());
    let mut unresolved = Vec::new();
    for param in target.params() {
        match classify(param, context, overrides, options, visiting)? {
            Some(resolver) => {
                let resolver = if options.validate {
                    match param.constraints() {
                        Some(rules) => with_validation(resolver, param, rules.clone()),
                        None => resolver,
                    }
                } else {
                    resolver
                };
                entries.push((param.name().to_string(), resolver));
            }
            None => unresolved.push(param.name().to_string()),
        }
    }

    visiting.pop();

    if !options.allow_incomplete && !unresolved.is_empty() {
        return Err(InjectError::Unresolved(unresolved));
    }
    Ok(Plan { entries })
}

/// Picks the injection strategy for one parameter, or `None` when nothing
/// applies.
fn classify(
    param: &ParamSpec,
    context: &Context,
    overrides: Option<&OverrideRegistry>,
    options: InjectOptions,
    visiting: &mut Vec<CallableId>,
) -> Result<Option<Resolver>, InjectError> {
    let marker = param.primary_marker()?;

    if context.contains_name(param.name()) {
        return Ok(Some(by_name(param.name())));
    }

    match marker {
        Some(Marker::Depends(sub)) => {
            return depends(sub, context, overrides, options, visiting).map(Some);
        }
        Some(Marker::ModelField { model, field, .. }) if context.contains_type(model) => {
            let path = field.clone().unwrap_or_else(|| param.name().to_string());
            return Ok(Some(model_field(*model, path)));
        }
        _ => {}
    }

    if let Some(ty) = param.ty() {
        if context.contains_type(&ty) {
            return Ok(Some(by_type(ty)));
        }
    }

    if let Some(default) = param.default() {
        let default = default.clone();
        return Ok(Some(Resolver::Sync(Box::new(move |_| Ok(default.clone())))));
    }

    Ok(None)
}

fn by_name(name: &str) -> Resolver {
    let name = name.to_string();
    Resolver::Sync(Box::new(move |context| {
        context
            .value_by_name(&name)
            .cloned()
            .ok_or_else(|| InjectError::MissingKey(name.clone()))
    }))
}

fn by_type(ty: TypeKey) -> Resolver {
    Resolver::Sync(Box::new(move |context| {
        context
            .value_by_type(&ty)
            .cloned()
            .ok_or_else(|| InjectError::MissingKey(ty.name().to_string()))
    }))
}

fn model_field(model: TypeKey, path: String) -> Resolver {
    Resolver::Sync(Box::new(move |context| {
        let root = context
            .model(&model)
            .ok_or_else(|| InjectError::MissingKey(model.name().to_string()))?
            .clone();
        walk_fields(root, &model, &path)
    }))
}

/// Walks a dotted field chain. An absent intermediate resolves the whole
/// chain to [Value::nil]; a field the model does not expose is an error.
fn walk_fields(root: ModelPtr, model: &TypeKey, path: &str) -> Result<Value, InjectError> {
    use crate::context::FieldResult;

    let mut current = root;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        let terminal = segments.peek().is_none();
        match current.field(segment) {
            FieldResult::Value(value) if terminal => return Ok(value),
            FieldResult::Model(value, _) if terminal => return Ok(value),
            FieldResult::Model(_, next) => current = next,
            FieldResult::Nil => return Ok(Value::nil()),
            FieldResult::Value(_) | FieldResult::Missing => {
                return Err(InjectError::MissingField {
                    model: model.name().to_string(),
                    field: segment.to_string(),
                })
            }
        }
    }
    Err(InjectError::MissingField {
        model: model.name().to_string(),
        field: path.to_string(),
    })
}

fn depends(
    sub: &Callable,
    context: &Context,
    overrides: Option<&OverrideRegistry>,
    options: InjectOptions,
    visiting: &mut Vec<CallableId>,
) -> Result<Resolver, InjectError> {
    let effective = overrides::lookup(overrides, sub.id()).unwrap_or_else(|| sub.clone());

    if visiting.contains(&effective.id()) {
        return Err(DefinitionError::DependencyCycle {
            callable: effective.name().to_string(),
        }
        .into());
    }
    if visiting.len() >= MAX_DEPTH {
        return Err(DefinitionError::DepthExceeded {
            callable: effective.name().to_string(),
            max: MAX_DEPTH,
        }
        .into());
    }

    // sub-dependency arguments are never left out silently
    let sub_options = InjectOptions {
        allow_incomplete: true,
        ..options
    };
    let plan = Arc::new(build_inner(
        &effective, context, overrides, sub_options, visiting,
    )?);

    Ok(Resolver::Async(Box::new(move |context, scope| {
        let sub = effective.clone();
        let plan = plan.clone();
        async move {
            let args = resolve_plan(&plan, context, scope).await?;
            let missing = sub
                .params()
                .iter()
                .map(ParamSpec::name)
                .filter(|name| !args.contains(name))
                .map(str::to_string)
                .collect::<Vec<_>>();
            if !missing.is_empty() {
                return Err(InjectError::Unresolved(missing));
            }
            invoke(sub, args, scope).await
        }
        .boxed()
    })))
}

/// Invokes a resolved sub-dependency, registering any scoped release on the
/// enclosing scope.
pub(crate) async fn invoke(
    sub: Callable,
    args: Args,
    scope: &ResourceScope,
) -> Result<Value, InjectError> {
    match sub.body() {
        CallBody::Sync(call) => call(args),
        CallBody::Async(call) => call(args).await,
        CallBody::SyncScoped(acquire) => {
            let acquire = acquire.clone();
            let acquired = match tokio::task::spawn_blocking(move || acquire(args)).await {
                Ok(result) => result?,
                Err(error) if error.is_panic() => resume_unwind(error.into_panic()),
                Err(_) => {
                    return Err(InjectError::Argument {
                        name: sub.name().to_string(),
                        message: "scoped acquisition was cancelled".to_string(),
                    })
                }
            };
            let (value, release) = acquired;
            scope.push_sync(release);
            Ok(value)
        }
        CallBody::AsyncScoped(acquire) => {
            let (value, release) = acquire(args).await?;
            scope.push_async(release);
            Ok(value)
        }
    }
}

fn with_validation(resolver: Resolver, param: &ParamSpec, rules: ConstraintSet) -> Resolver {
    let name = param.name().to_string();
    let ty = param.ty();
    match resolver {
        Resolver::Sync(resolve) => Resolver::Sync(Box::new(move |context| {
            let value = resolve(context)?;
            converters()
                .validate(&value, ty, &rules)
                .map_err(|error| error.for_param(&name).into())
        })),
        Resolver::Async(resolve) => Resolver::Async(Box::new(move |context, scope| {
            let pending = resolve(context, scope);
            let name = name.clone();
            let rules = rules.clone();
            async move {
                let value = pending.await?;
                converters()
                    .validate(&value, ty, &rules)
                    .map_err(|error| error.for_param(name).into())
            }
            .boxed()
        })),
    }
}

/// Executes a plan against a context. Synchronous resolvers run first, in
/// declaration order; asynchronous resolvers are then awaited as one
/// concurrent batch. The first failure, sync or async, propagates unmodified
/// and drops still-pending siblings.
pub async fn resolve_plan(
    plan: &Plan,
    context: &Context,
    scope: &ResourceScope,
) -> Result<Args, InjectError> {
    let mut args = Args::new();
    let mut pending = Vec::new();
    for (name, resolver) in &plan.entries {
        match resolver {
            Resolver::Sync(resolve) => {
                args.insert_value(name.clone(), resolve(context)?);
            }
            Resolver::Async(resolve) => pending.push(async move {
                resolve(context, scope)
                    .await
                    .map(|value| (name.clone(), value))
            }),
        }
    }
    for (name, value) in try_join_all(pending).await? {
        args.insert_value(name, value);
    }
    Ok(args)
}
