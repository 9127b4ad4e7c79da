//! Type-erased values and type keys used throughout the resolution engine.
//!
//! Resolved argument values are shared between concurrently running resolvers
//! and the final bound call, so they are stored behind
//! `Arc<dyn Any + Send + Sync>` with typed accessors, mirroring how
//! instances are passed around in runtime DI containers.

use fxhash::FxHashMap;
use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::error::InjectError;

/// Pointer to a type-erased, shareable value.
pub type AnyPtr = Arc<dyn Any + Send + Sync>;

/// Identifies a Rust type in context keys, converter dispatch tables and
/// error messages. Equality and hashing use the [TypeId] only; the name is
/// carried for diagnostics.
#[derive(Clone, Copy, Debug)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    #[inline]
    pub fn id(&self) -> TypeId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeKey {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl std::hash::Hash for TypeKey {
    #[inline]
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Marker stored inside a [Value] produced by a model-field chain whose
/// intermediate attribute was absent.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct Nil;

/// A cheaply clonable, type-erased value flowing through resolvers,
/// converters and bound calls.
#[derive(Clone)]
pub struct Value(AnyPtr);

impl Value {
    pub fn new<T: Send + Sync + 'static>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn from_ptr(ptr: AnyPtr) -> Self {
        Self(ptr)
    }

    /// The distinguished "absent" value. Not an error; see
    /// [FieldResult::Nil](crate::context::FieldResult).
    pub fn nil() -> Self {
        Self::new(Nil)
    }

    pub fn is_nil(&self) -> bool {
        self.downcast_ref::<Nil>().is_some()
    }

    #[inline]
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }

    /// Clones out the inner value, when it is of the requested type.
    pub fn cloned<T: Clone + 'static>(&self) -> Option<T> {
        self.downcast_ref::<T>().cloned()
    }

    /// [TypeId] of the contained value (not of the pointer).
    #[inline]
    pub fn type_id(&self) -> TypeId {
        (*self.0).type_id()
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Value").field(&self.type_id()).finish()
    }
}

/// Resolved arguments for one callable: a `name -> Value` mapping with typed
/// accessors used inside callable bodies.
#[derive(Clone, Default, Debug)]
pub struct Args {
    values: FxHashMap<String, Value>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Send + Sync + 'static, N: Into<String>>(&mut self, name: N, value: T) {
        self.values.insert(name.into(), Value::new(value));
    }

    pub fn insert_value<N: Into<String>>(&mut self, name: N, value: Value) {
        self.values.insert(name.into(), value);
    }

    #[inline]
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn get<T: 'static>(&self, name: &str) -> Option<&T> {
        self.values.get(name).and_then(Value::downcast_ref)
    }

    /// Typed access which fails with a descriptive [InjectError::Argument]
    /// when the argument is absent or of a different type.
    pub fn require<T: 'static>(&self, name: &str) -> Result<&T, InjectError> {
        let value = self.values.get(name).ok_or_else(|| InjectError::Argument {
            name: name.to_string(),
            message: "missing".to_string(),
        })?;

        value
            .downcast_ref()
            .ok_or_else(|| InjectError::Argument {
                name: name.to_string(),
                message: format!("cannot be accessed as '{}'", type_name::<T>()),
            })
    }

    /// Like [Args::require], but clones the value out.
    pub fn require_cloned<T: Clone + 'static>(&self, name: &str) -> Result<T, InjectError> {
        self.require::<T>(name).cloned()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Fills entries absent from `self` with entries from `other`. Existing
    /// entries win, so already-resolved arguments cannot be displaced.
    pub fn fill_missing(&mut self, other: Args) {
        for (name, value) in other.values {
            self.values.entry(name).or_insert(value);
        }
    }
}

impl FromIterator<(String, Value)> for Args {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}
