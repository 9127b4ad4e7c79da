use thiserror::Error;

/// Errors raised while a target callable or one of its dependencies is being
/// defined or classified. These are meant to surface during development,
/// typically through [signature_check](crate::sigcheck::signature_check),
/// rather than at resolution time.
#[derive(Error, Clone, Eq, PartialEq, Debug)]
pub enum DefinitionError {
    #[error("Argument '{param}' has multiple injectable markers")]
    MultipleMarkers { param: String },
    #[error("Dependency cycle detected involving '{callable}'")]
    DependencyCycle { callable: String },
    #[error("Dependency nesting of '{callable}' exceeds the maximum depth of {max}")]
    DepthExceeded { callable: String, max: usize },
}

/// Error raised by the constraint subsystem when a value fails its rules.
/// Always names the offending argument and the violated constraint.
#[derive(Error, Clone, Eq, PartialEq, Debug)]
#[error("Validation failed for argument '{param}': {message}")]
pub struct ValidationError {
    pub param: String,
    pub message: String,
}

impl ValidationError {
    /// Creates an error with an empty argument name; converters use this and
    /// the resolver attaches the name via [ValidationError::for_param].
    pub fn message<M: Into<String>>(message: M) -> Self {
        Self {
            param: String::new(),
            message: message.into(),
        }
    }

    pub fn for_param<P: Into<String>>(mut self, param: P) -> Self {
        self.param = param.into();
        self
    }
}

/// Errors produced while resolving a context into bound arguments. The engine
/// propagates the first error encountered unmodified; nothing is wrapped in
/// an aggregate type.
#[derive(Error, Clone, Eq, PartialEq, Debug)]
pub enum InjectError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// No injection strategy applies to the named arguments and
    /// `allow_incomplete` is off, or a bound call is still missing them.
    #[error("No value could be resolved for argument(s): {}", .0.join(", "))]
    Unresolved(Vec<String>),
    /// A context entry vanished between plan building and resolution.
    #[error("Missing context entry for key '{0}'")]
    MissingKey(String),
    /// A model-field chain named an attribute the model does not expose.
    #[error("Model '{model}' has no field '{field}'")]
    MissingField { model: String, field: String },
    /// Typed access to a resolved argument failed inside a callable body.
    #[error("Argument '{name}': {message}")]
    Argument { name: String, message: String },
}
