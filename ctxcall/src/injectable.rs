//! Injectable markers and parameter descriptors.
//!
//! A [Marker] declares *how* a parameter obtains its value. Markers form a
//! closed enum resolved via pattern matching; there is no runtime capability
//! probing. Each parameter carries an ordered list of markers as metadata,
//! but at most one of them may apply; duplicates are a definition error
//! caught by the plan builder and the signature check alike.
//!
//! Constraint rules attach to a parameter independently of its primary
//! marker, so any strategy's output can be validated.

use crate::callable::Callable;
use crate::constraint::ConstraintSet;
use crate::error::DefinitionError;
use crate::value::{TypeKey, Value};

/// Declarative annotation describing how to obtain one parameter's value.
#[derive(Clone, Debug)]
pub enum Marker {
    /// Resolve from the context using the parameter name as key.
    ByName,
    /// Resolve from the context using the parameter's base type as key.
    ByType,
    /// Fetch the model instance from the context, then read the named field
    /// (or the parameter name when `field` is `None`). Dotted chains traverse
    /// nested models. `field_ty`, when declared, lets the signature check
    /// verify the field type against the parameter type.
    ModelField {
        model: TypeKey,
        field: Option<String>,
        field_ty: Option<TypeKey>,
    },
    /// Resolve by recursively resolving and invoking another callable.
    Depends(Callable),
    /// No context lookup; the marker itself carries the value.
    DefaultValue(Value),
}

impl Marker {
    pub fn model_field<M: 'static>() -> Self {
        Marker::ModelField {
            model: TypeKey::of::<M>(),
            field: None,
            field_ty: None,
        }
    }

    pub fn model_field_named<M: 'static, F: Into<String>>(field: F) -> Self {
        Marker::ModelField {
            model: TypeKey::of::<M>(),
            field: Some(field.into()),
            field_ty: None,
        }
    }

    /// Declares the type of the targeted field, for the signature check.
    pub fn field_ty<T: 'static>(mut self) -> Self {
        if let Marker::ModelField { field_ty, .. } = &mut self {
            *field_ty = Some(TypeKey::of::<T>());
        }
        self
    }

    pub fn depends(callable: Callable) -> Self {
        Marker::Depends(callable)
    }

    pub fn default_value<T: Send + Sync + 'static>(value: T) -> Self {
        Marker::DefaultValue(Value::new(value))
    }

    /// Short description used in definition-error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Marker::ByName => "ByName",
            Marker::ByType => "ByType",
            Marker::ModelField { .. } => "ModelField",
            Marker::Depends(_) => "Depends",
            Marker::DefaultValue(_) => "DefaultValue",
        }
    }
}

/// Immutable view of one callable parameter: its name, declared type, marker
/// metadata, default and constraint rules. Built once per callable and read
/// by the plan builder and the signature check.
#[derive(Clone, Debug)]
pub struct ParamSpec {
    name: String,
    ty: Option<TypeKey>,
    default: Option<Value>,
    markers: Vec<Marker>,
    constraints: Option<ConstraintSet>,
}

impl ParamSpec {
    pub fn new<N: Into<String>>(name: N) -> Self {
        Self {
            name: name.into(),
            ty: None,
            default: None,
            markers: Vec::new(),
            constraints: None,
        }
    }

    /// Declares the parameter's base type.
    pub fn of<T: 'static>(mut self) -> Self {
        self.ty = Some(TypeKey::of::<T>());
        self
    }

    pub fn with(mut self, marker: Marker) -> Self {
        self.markers.push(marker);
        self
    }

    /// Declares a plain default, making the parameter optional.
    pub fn default_value<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.default = Some(Value::new(value));
        self
    }

    pub fn constrained(mut self, rules: ConstraintSet) -> Self {
        self.constraints = Some(rules);
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn ty(&self) -> Option<TypeKey> {
        self.ty
    }

    #[inline]
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    #[inline]
    pub fn constraints(&self) -> Option<&ConstraintSet> {
        self.constraints.as_ref()
    }

    /// The declared default: either the marker-carried one or the plain
    /// signature default, in that order.
    pub fn default(&self) -> Option<&Value> {
        self.markers
            .iter()
            .find_map(|marker| match marker {
                Marker::DefaultValue(value) => Some(value),
                _ => None,
            })
            .or(self.default.as_ref())
    }

    /// The single applicable marker, or a definition error when more than
    /// one is attached.
    pub fn primary_marker(&self) -> Result<Option<&Marker>, DefinitionError> {
        if self.markers.len() > 1 {
            return Err(DefinitionError::MultipleMarkers {
                param: self.name.clone(),
            });
        }
        Ok(self.markers.first())
    }
}
