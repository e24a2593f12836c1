// Copyright 2026 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

#![deny(warnings)]
// Enable all clippy lints except for many of the pedantic ones. It's a shame this needs to be copied and pasted across crates, but there doesn't appear to be a way to include inner attributes from a common source.
#![deny(
    clippy::all,
    clippy::default_trait_access,
    clippy::expl_impl_clone_on_copy,
    clippy::if_not_else,
    clippy::needless_continue,
    clippy::unseparated_literal_suffix,
    clippy::used_underscore_binding
)]
// It is often more clear to show that nothing is being moved.
#![allow(clippy::match_ref_pats)]
// Subjective style.
#![allow(
    clippy::len_without_is_empty,
    clippy::redundant_field_names,
    clippy::too_many_arguments
)]
// Default isn't as big a deal as people seem to think it is.
#![allow(clippy::new_without_default, clippy::new_ret_no_self)]
// Arc<Mutex> can be more clear than needing to grok Orderings:
#![allow(clippy::mutex_atomic)]

use std::sync::Arc;

use parking_lot::Mutex;

/// A point-in-time snapshot handle, externally produced. `dispose` releases whatever underlying
/// resource (a filesystem snapshot, a VSS shadow copy, ...) the handle represents, and may fail:
/// callers never see that failure directly, only through the tracker's `ErrorLogger`.
pub trait SnapshotHandle: Send + 'static {
    fn dispose(self: Box<Self>) -> Result<(), String>;
}

/// Records non-fatal errors encountered off the caller's stack, e.g. a failed snapshot disposal.
/// Kept as a narrow trait (rather than pulling in `logging`'s `DiagnosticOutput`) so that a
/// `SnapshotReferenceTracker` can be constructed with nothing more than this one capability.
pub trait ErrorLogger: Send + Sync + 'static {
    fn log_error(&self, message: &str, detail: &str);
}

/// An `ErrorLogger` that reports through the `log` facade at `error` level.
pub struct LogErrorLogger;

impl ErrorLogger for LogErrorLogger {
    fn log_error(&self, message: &str, detail: &str) {
        log::error!("{message}: {detail}");
    }
}

struct Inner {
    count: usize,
    snapshot: Option<Box<dyn SnapshotHandle>>,
    disposed: bool,
}

/// Reference-counted lifetime wrapper around a `SnapshotHandle`. The snapshot is disposed exactly
/// once, the instant the last outstanding `SnapshotReference` is released, regardless of release
/// order or how many threads race to release concurrently.
#[derive(Clone)]
pub struct SnapshotReferenceTracker {
    inner: Arc<Mutex<Inner>>,
    error_logger: Arc<dyn ErrorLogger>,
}

impl SnapshotReferenceTracker {
    pub fn new(snapshot: Box<dyn SnapshotHandle>, error_logger: Arc<dyn ErrorLogger>) -> Self {
        SnapshotReferenceTracker {
            inner: Arc::new(Mutex::new(Inner {
                count: 0,
                snapshot: Some(snapshot),
                disposed: false,
            })),
            error_logger,
        }
    }

    /// Atomically increments the reference count and returns a token tagged with `path`. The
    /// token must eventually be `release`d or the snapshot will never be disposed.
    pub fn add_reference(&self, path: impl Into<String>) -> SnapshotReference {
        let mut inner = self.inner.lock();
        inner.count += 1;
        SnapshotReference {
            tracker: self.clone(),
            path: path.into(),
            released: false,
        }
    }

    /// Number of currently outstanding references. Exposed for tests and diagnostics only; not
    /// part of the lifetime contract.
    pub fn reference_count(&self) -> usize {
        self.inner.lock().count
    }

    fn release_one(&self) {
        let snapshot_to_dispose = {
            let mut inner = self.inner.lock();
            debug_assert!(inner.count > 0, "released more references than were added");
            inner.count -= 1;
            if inner.count == 0 && !inner.disposed {
                inner.disposed = true;
                inner.snapshot.take()
            } else {
                None
            }
        };

        // Disposal runs outside the lock: it may be slow (a real filesystem/VSS operation), and
        // holding `inner`'s lock across it would block any thread still calling `add_reference` or
        // `release` on other tokens for no reason once `disposed` has already been latched true.
        if let Some(snapshot) = snapshot_to_dispose {
            if let Err(e) = snapshot.dispose() {
                self.error_logger
                    .log_error("failed to dispose of snapshot", &e);
            }
        }
    }
}

/// A token produced by `SnapshotReferenceTracker::add_reference`. Dropping it without calling
/// `release` still releases the reference (see the `Drop` impl below), so callers that bail out
/// early via `?` or panic don't leak the tracker's count.
pub struct SnapshotReference {
    tracker: SnapshotReferenceTracker,
    path: String,
    released: bool,
}

impl SnapshotReference {
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Idempotent: a second call (or a call after `Drop` has already released this token) is a
    /// no-op.
    pub fn release(mut self) {
        self.release_mut();
    }

    fn release_mut(&mut self) {
        if !self.released {
            self.released = true;
            self.tracker.release_one();
        }
    }
}

impl Drop for SnapshotReference {
    fn drop(&mut self) {
        self.release_mut();
    }
}

#[cfg(test)]
mod tests;
