//! Sub-dependency override registries.
//!
//! An override substitutes one callable for another, keyed by the original's
//! [CallableId]. Lookups consult the caller-supplied local registry first and
//! fall back to the single process-wide registry, so tests can install
//! replacements globally while individual resolution calls can still shadow
//! them. The process-wide registry is explicit global mutable state with an
//! explicit lifecycle; [clear_global] resets it.

use fxhash::FxHashMap;
use once_cell::sync::Lazy;
use std::sync::Mutex;

use crate::callable::{Callable, CallableId};

/// Mapping from original callables to their replacements.
#[derive(Clone, Default, Debug)]
pub struct OverrideRegistry {
    entries: FxHashMap<CallableId, Callable>,
}

impl OverrideRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a point override, replacing any prior override for the same
    /// original. Returns the displaced replacement when there was one.
    pub fn override_with(&mut self, original: &Callable, replacement: Callable) -> Option<Callable> {
        self.entries.insert(original.id(), replacement)
    }

    pub fn override_many<I: IntoIterator<Item = (Callable, Callable)>>(&mut self, overrides: I) {
        for (original, replacement) in overrides {
            self.entries.insert(original.id(), replacement);
        }
    }

    #[inline]
    pub fn get(&self, id: CallableId) -> Option<&Callable> {
        self.entries.get(&id)
    }

    pub fn remove(&mut self, id: CallableId) -> Option<Callable> {
        self.entries.remove(&id)
    }

    /// A new registry containing this registry's entries overlaid with
    /// `other`'s; `other` wins on conflict. Neither input is mutated.
    pub fn merge(&self, other: &OverrideRegistry) -> OverrideRegistry {
        let mut merged = self.clone();
        merged
            .entries
            .extend(other.entries.iter().map(|(id, callable)| (*id, callable.clone())));
        merged
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

static GLOBAL: Lazy<Mutex<OverrideRegistry>> = Lazy::new(|| Mutex::new(OverrideRegistry::new()));

/// Runs `f` with exclusive access to the process-wide registry.
pub fn with_global<R>(f: impl FnOnce(&mut OverrideRegistry) -> R) -> R {
    // an override registry holds only cloneable handles, so a panic while
    // holding the lock cannot leave it in a torn state
    let mut guard = GLOBAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    f(&mut guard)
}

/// Installs a point override on the process-wide registry.
pub fn global_override(original: &Callable, replacement: Callable) {
    with_global(|registry| {
        registry.override_with(original, replacement);
    });
}

/// Resets the process-wide registry.
pub fn clear_global() {
    with_global(OverrideRegistry::clear);
}

/// Local-first lookup: the caller-supplied registry shadows the process-wide
/// one.
pub(crate) fn lookup(local: Option<&OverrideRegistry>, id: CallableId) -> Option<Callable> {
    if let Some(replacement) = local.and_then(|registry| registry.get(id)) {
        return Some(replacement.clone());
    }
    with_global(|registry| registry.get(id).cloned())
}

/// Scoped override on the process-wide registry. Installing the guard
/// replaces the entry for the original; dropping it restores whatever was
/// installed before, on every exit path.
#[must_use = "dropping the guard immediately removes the override"]
pub struct OverrideGuard {
    id: CallableId,
    previous: Option<Callable>,
}

impl OverrideGuard {
    pub fn install(original: &Callable, replacement: Callable) -> Self {
        let id = original.id();
        let previous = with_global(|registry| registry.entries.insert(id, replacement));
        Self { id, previous }
    }
}

impl Drop for OverrideGuard {
    fn drop(&mut self) {
        let id = self.id;
        let previous = self.previous.take();
        with_global(|registry| match previous {
            Some(previous) => {
                registry.entries.insert(id, previous);
            }
            None => {
                registry.entries.remove(&id);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use crate::callable::Callable;
    use crate::overrides::{lookup, OverrideRegistry};

    fn constant(name: &str, value: i64) -> Callable {
        Callable::builder(name).sync_body(move |_| Ok(value))
    }

    #[test]
    fn should_replace_prior_point_overrides() {
        let original = constant("original", 1);
        let mut registry = OverrideRegistry::new();

        assert!(registry.override_with(&original, constant("first", 2)).is_none());
        let displaced = registry.override_with(&original, constant("second", 3));

        assert_eq!(displaced.map(|callable| callable.name().to_string()), Some("first".to_string()));
        assert_eq!(
            registry.get(original.id()).map(Callable::name),
            Some("second")
        );
    }

    #[test]
    fn should_merge_without_mutating_inputs() {
        let a = constant("a", 1);
        let b = constant("b", 2);

        let mut left = OverrideRegistry::new();
        left.override_with(&a, constant("left_a", 10));
        left.override_with(&b, constant("left_b", 20));

        let mut right = OverrideRegistry::new();
        right.override_with(&a, constant("right_a", 30));

        let merged = left.merge(&right);
        assert_eq!(merged.get(a.id()).map(Callable::name), Some("right_a"));
        assert_eq!(merged.get(b.id()).map(Callable::name), Some("left_b"));
        assert_eq!(left.get(a.id()).map(Callable::name), Some("left_a"));
        assert_eq!(right.len(), 1);
    }

    #[test]
    fn should_prefer_local_over_global_lookups() {
        let original = constant("original", 1);

        let mut local = OverrideRegistry::new();
        local.override_with(&original, constant("local", 2));

        let found = lookup(Some(&local), original.id());
        assert_eq!(found.map(|callable| callable.name().to_string()), Some("local".to_string()));
        assert!(lookup(None, original.id()).is_none());
    }
}
