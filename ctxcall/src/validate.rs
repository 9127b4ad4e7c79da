//! Type-directed converter dispatch.
//!
//! A converter turns a raw resolved value into its validated, possibly
//! coerced form. Which converter runs is decided by the
//! `(source type, target type)` pair, looked up in a [ConverterRegistry].
//! The built-in table covers strings, numbers, date/time parsing, identifier
//! parsing, structured-document parsing and nested collection rules; unknown
//! pairs pass the value through unchanged, which is the deliberate escape
//! hatch for types the table does not know about.
//!
//! Additional converters can be contributed from any linked crate by
//! submitting a [ConverterRegistration] via [inventory], the same link-time
//! collection mechanism used for framework-wide registrations elsewhere in
//! the ecosystem.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use fxhash::FxHashMap;
use once_cell::sync::Lazy;
use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::constraint::{
    constrained_datetime, constrained_instance, constrained_int, constrained_json,
    constrained_json_bytes, constrained_len, constrained_number, constrained_str,
    constrained_uuid, ConstraintSet,
};
use crate::error::ValidationError;
use crate::value::{TypeKey, Value};

/// A parsed structured document; what JSON-like payload converters produce.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// Checks or coerces one value against a rule set. Receives the registry so
/// collection converters can recursively dispatch on element types.
pub type Converter =
    Arc<dyn Fn(&ConverterRegistry, &Value, &ConstraintSet) -> Result<Value, ValidationError> + Send + Sync>;

/// Dispatch table from `(source type, target type)` pairs to converters.
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    converters: FxHashMap<(TypeId, TypeId), Converter>,
}

impl ConverterRegistry {
    /// An empty registry; values of every type pass through unchanged.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry preloaded with the built-in converter table.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        register_builtins(&mut registry);
        registry
    }

    /// Registers a converter for values of source type `S` targeting
    /// parameters of type `T`, replacing any previous entry for the pair.
    pub fn register<S, T, F>(&mut self, converter: F)
    where
        S: 'static,
        T: 'static,
        F: Fn(&ConverterRegistry, &S, &ConstraintSet) -> Result<Value, ValidationError>
            + Send
            + Sync
            + 'static,
    {
        self.converters.insert(
            (TypeId::of::<S>(), TypeId::of::<T>()),
            Arc::new(move |registry, value, rules| {
                let typed = value.downcast_ref::<S>().ok_or_else(|| {
                    ValidationError::message(format!(
                        "Value should be of type \"{}\"",
                        type_name::<S>()
                    ))
                })?;
                converter(registry, typed, rules)
            }),
        );
    }

    #[inline]
    pub fn contains(&self, source: TypeId, target: TypeId) -> bool {
        self.converters.contains_key(&(source, target))
    }

    /// Dispatch on the target type alone; the value's runtime type selects
    /// the table entry when the produced function runs. Used for nested item
    /// rules, where only the declared element type is known up front.
    pub fn converter_for_type(
        &self,
        target: TypeKey,
    ) -> impl Fn(&Value, &ConstraintSet) -> Result<Value, ValidationError> + '_ {
        move |value, rules| self.validate(value, Some(target), rules)
    }

    /// Runs the converter selected by the value's own type and the declared
    /// target type. Enumeration-style exact-type membership is checked first,
    /// independently of the dispatch outcome. Without a declared target, or
    /// without a table entry for the pair, the value passes through.
    pub fn validate(
        &self,
        value: &Value,
        target: Option<TypeKey>,
        rules: &ConstraintSet,
    ) -> Result<Value, ValidationError> {
        if let Some(expected) = &rules.instance_of {
            constrained_instance(value, expected)?;
        }
        let Some(target) = target else {
            return Ok(value.clone());
        };
        match self.converters.get(&(value.type_id(), target.id())) {
            Some(converter) => converter(self, value, rules),
            None => Ok(value.clone()),
        }
    }
}

fn register_builtins(registry: &mut ConverterRegistry) {
    registry.register::<String, String, _>(|_, value, rules| {
        constrained_str(value, rules)?;
        Ok(Value::new(value.clone()))
    });
    registry.register::<i64, i64, _>(|_, value, rules| {
        constrained_int(*value, rules).map(Value::new)
    });
    registry.register::<f64, f64, _>(|_, value, rules| {
        constrained_number(*value, rules)?;
        Ok(Value::new(*value))
    });
    registry.register::<String, NaiveDateTime, _>(|_, value, rules| {
        constrained_datetime(value, rules).map(Value::new)
    });
    registry.register::<String, NaiveDate, _>(|_, value, rules| {
        constrained_datetime(value, rules).map(|parsed| Value::new(parsed.date()))
    });
    registry.register::<String, NaiveTime, _>(|_, value, rules| {
        constrained_datetime(value, rules).map(|parsed| Value::new(parsed.time()))
    });
    registry.register::<String, Uuid, _>(|_, value, _| constrained_uuid(value).map(Value::new));
    registry.register::<String, JsonMap, _>(|_, value, _| constrained_json(value).map(Value::new));
    registry
        .register::<Vec<u8>, JsonMap, _>(|_, value, _| constrained_json_bytes(value).map(Value::new));
    registry.register::<Vec<Value>, Vec<Value>, _>(|registry, items, rules| {
        constrained_len(items.len(), rules)?;
        match &rules.items {
            Some((item_ty, item_rules)) => {
                let mut validated = Vec::with_capacity(items.len());
                for item in items {
                    validated.push(registry.validate(item, Some(*item_ty), item_rules)?);
                }
                Ok(Value::new(validated))
            }
            None => Ok(Value::new(items.clone())),
        }
    });
    registry.register::<HashMap<String, Value>, HashMap<String, Value>, _>(
        |registry, entries, rules| {
            constrained_len(entries.len(), rules)?;
            if let Some((_, key_rules)) = &rules.items {
                for key in entries.keys() {
                    constrained_str(key, key_rules)?;
                }
            }
            match &rules.values {
                Some((value_ty, value_rules)) => {
                    let mut validated = HashMap::with_capacity(entries.len());
                    for (key, entry) in entries {
                        validated.insert(
                            key.clone(),
                            registry.validate(entry, Some(*value_ty), value_rules)?,
                        );
                    }
                    Ok(Value::new(validated))
                }
                None => Ok(Value::new(entries.clone())),
            }
        },
    );
}

/// Link-time converter contribution; collected into the
/// [process-wide registry](converters) on first use.
pub struct ConverterRegistration {
    pub register: fn(&mut ConverterRegistry),
}

inventory::collect!(ConverterRegistration);

/// The process-wide registry: built-ins plus all collected
/// [ConverterRegistration]s.
pub fn converters() -> &'static ConverterRegistry {
    static CONVERTERS: Lazy<ConverterRegistry> = Lazy::new(|| {
        let mut registry = ConverterRegistry::with_builtins();
        for registration in inventory::iter::<ConverterRegistration> {
            (registration.register)(&mut registry);
        }
        registry
    });
    &CONVERTERS
}
