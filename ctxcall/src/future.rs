//! Re-exports of commonly used future-related types, for crates which don't
//! want to explicitly depend on [futures].

pub use futures::future::BoxFuture;
pub use futures::FutureExt;
