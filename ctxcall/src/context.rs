//! The context is the mapping of available values supplied by the caller,
//! keyed either by parameter name or by type. During one resolution pass the
//! engine treats it as read-only, which is what allows all resolvers to read
//! it concurrently without coordination.
//!
//! Model instances are inserted with [Context::insert_model] so that
//! model-field resolvers can traverse their fields through the [FieldAccess]
//! trait, including dotted chains (`"owner.address.city"`). A field backed by
//! a method is simply computed inside the `field` implementation; there is no
//! runtime probing of whether an attribute is callable.

use fxhash::FxHashMap;
#[cfg(test)]
use mockall::automock;
use std::sync::Arc;

use crate::value::{TypeKey, Value};

/// Pointer to a traversable model stored in the context.
pub type ModelPtr = Arc<dyn FieldAccess>;

/// Outcome of looking up one segment of a model-field chain.
pub enum FieldResult {
    /// A terminal value.
    Value(Value),
    /// A nested model which further segments can traverse. Carries its own
    /// value so a chain may also terminate here.
    Model(Value, ModelPtr),
    /// The field exists but is absent; the whole chain resolves to
    /// [Value::nil].
    Nil,
    /// No such field; resolution fails with a lookup error.
    Missing,
}

impl FieldResult {
    /// Convenience constructor for nested models.
    pub fn model<T: FieldAccess + Send + Sync + 'static>(model: Arc<T>) -> Self {
        FieldResult::Model(Value::from_ptr(model.clone()), model)
    }
}

/// Field lookup on a model instance, implemented by types which want to be
/// sources for model-field injection.
#[cfg_attr(test, automock)]
pub trait FieldAccess: Send + Sync {
    fn field(&self, name: &str) -> FieldResult;
}

#[derive(Clone)]
struct TypedEntry {
    value: Value,
    model: Option<ModelPtr>,
}

/// The input mapping for one resolution pass. Name and type keyspaces are
/// kept separate, which is the statically-typed rendition of a mixed-key map.
#[derive(Clone, Default)]
pub struct Context {
    by_name: FxHashMap<String, Value>,
    by_type: FxHashMap<TypeKey, TypedEntry>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a value under a parameter name.
    pub fn insert_named<N: Into<String>, T: Send + Sync + 'static>(&mut self, name: N, value: T) {
        self.by_name.insert(name.into(), Value::new(value));
    }

    pub fn insert_named_value<N: Into<String>>(&mut self, name: N, value: Value) {
        self.by_name.insert(name.into(), value);
    }

    /// Registers a value under its own type.
    pub fn insert_typed<T: Send + Sync + 'static>(&mut self, value: T) {
        self.by_type.insert(
            TypeKey::of::<T>(),
            TypedEntry {
                value: Value::new(value),
                model: None,
            },
        );
    }

    /// Registers a model instance under its own type, additionally exposing
    /// it for model-field traversal.
    pub fn insert_model<T: FieldAccess + Send + Sync + 'static>(&mut self, value: T) {
        let model = Arc::new(value);
        self.by_type.insert(
            TypeKey::of::<T>(),
            TypedEntry {
                value: Value::from_ptr(model.clone()),
                model: Some(model),
            },
        );
    }

    #[inline]
    pub fn value_by_name(&self, name: &str) -> Option<&Value> {
        self.by_name.get(name)
    }

    #[inline]
    pub fn value_by_type(&self, key: &TypeKey) -> Option<&Value> {
        self.by_type.get(key).map(|entry| &entry.value)
    }

    #[inline]
    pub fn model(&self, key: &TypeKey) -> Option<&ModelPtr> {
        self.by_type.get(key).and_then(|entry| entry.model.as_ref())
    }

    #[inline]
    pub fn contains_name(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    #[inline]
    pub fn contains_type(&self, key: &TypeKey) -> bool {
        self.by_type.contains_key(key)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.by_name.len() + self.by_type.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty() && self.by_type.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use crate::context::{Context, FieldAccess, FieldResult};
    use crate::value::TypeKey;

    struct Settings {
        timeout: i64,
    }

    impl FieldAccess for Settings {
        fn field(&self, name: &str) -> FieldResult {
            match name {
                "timeout" => FieldResult::Value(crate::value::Value::new(self.timeout)),
                _ => FieldResult::Missing,
            }
        }
    }

    #[test]
    fn should_separate_name_and_type_keyspaces() {
        let mut context = Context::new();
        context.insert_named("id", 42_i64);
        context.insert_typed(7_i64);

        assert_eq!(
            context
                .value_by_name("id")
                .and_then(|value| value.cloned::<i64>()),
            Some(42)
        );
        assert_eq!(
            context
                .value_by_type(&TypeKey::of::<i64>())
                .and_then(|value| value.cloned::<i64>()),
            Some(7)
        );
    }

    #[test]
    fn should_expose_models_for_field_access() {
        let mut context = Context::new();
        context.insert_model(Settings { timeout: 30 });

        let key = TypeKey::of::<Settings>();
        assert!(context.contains_type(&key));

        let model = context.model(&key).unwrap();
        assert!(matches!(model.field("timeout"), FieldResult::Value(_)));
        assert!(matches!(model.field("nope"), FieldResult::Missing));
    }

    #[test]
    fn should_treat_nil_fields_as_present() {
        let mut mock = crate::context::MockFieldAccess::new();
        mock.expect_field()
            .returning(|_| FieldResult::Nil);

        assert!(matches!(mock.field("anything"), FieldResult::Nil));
    }

    #[test]
    fn should_not_expose_plain_typed_values_as_models() {
        let mut context = Context::new();
        context.insert_typed(1_i64);
        assert!(context.model(&TypeKey::of::<i64>()).is_none());
    }
}
