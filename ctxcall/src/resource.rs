//! Call-scoped resource tracking.
//!
//! Scoped sub-dependencies acquire a value together with a paired release
//! step. Every release registered during one resolution pass lands on a
//! [ResourceScope], which runs them in reverse-acquisition order when the
//! pass completes or fails, including the partial case where only some
//! acquisitions succeeded before a later resolver errored.
//!
//! Synchronous releases run on a blocking worker thread so teardown cannot
//! stall the cooperative scheduler; asynchronous releases are awaited in
//! place.

use std::panic::resume_unwind;
use std::sync::Mutex;
use tracing::warn;

use crate::callable::ReleaseFn;
use crate::future::BoxFuture;

enum Release {
    Sync(ReleaseFn),
    Async(BoxFuture<'static, ()>),
}

/// Stack of pending release steps for one resolution pass.
#[derive(Default)]
pub struct ResourceScope {
    releases: Mutex<Vec<Release>>,
}

impl ResourceScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_sync(&self, release: ReleaseFn) {
        self.lock().push(Release::Sync(release));
    }

    pub fn push_async(&self, release: BoxFuture<'static, ()>) {
        self.lock().push(Release::Async(release));
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Runs all registered releases in reverse-acquisition order. Each
    /// release runs exactly once; calling this again is a no-op.
    pub async fn close(&self) {
        let mut releases = {
            let mut guard = self.lock();
            std::mem::take(&mut *guard)
        };
        while let Some(release) = releases.pop() {
            match release {
                Release::Sync(release) => match tokio::task::spawn_blocking(release).await {
                    Ok(()) => {}
                    Err(error) if error.is_panic() => resume_unwind(error.into_panic()),
                    Err(_) => {}
                },
                Release::Async(release) => release.await,
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Release>> {
        // a panicked release cannot corrupt a Vec of opaque closures
        self.releases
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for ResourceScope {
    fn drop(&mut self) {
        let pending = self.lock().len();
        if pending > 0 {
            warn!("Dropping a resource scope with {pending} unreleased resource(s)");
        }
    }
}
