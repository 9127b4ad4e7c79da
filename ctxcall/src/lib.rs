//! Dependency injection for asynchronous function calls.
//!
//! Given a target [Callable](callable::Callable) whose parameters carry
//! [injectable markers](injectable::Marker), [inject](inject::inject)
//! resolves a caller-supplied [Context](context::Context) into concrete
//! argument values - by name, by type, through model fields or by invoking
//! sub-dependencies recursively - optionally validating each value against
//! declared [constraints](constraint::ConstraintSet), and hands back a
//! callable with everything resolvable already bound. Independent async
//! sub-dependencies resolve concurrently with fail-fast semantics, and
//! scoped resources they acquire are released when the bound call finishes.

pub mod callable;
pub mod constraint;
pub mod context;
pub mod error;
pub mod future;
pub mod inject;
pub mod injectable;
pub mod overrides;
pub mod resolver;
pub mod resource;
pub mod sigcheck;
pub mod validate;
pub mod value;

pub use callable::Callable;
pub use context::Context;
pub use error::{DefinitionError, InjectError, ValidationError};
pub use inject::{inject, BoundCall};
pub use injectable::{Marker, ParamSpec};
pub use resolver::InjectOptions;
pub use sigcheck::signature_check;
