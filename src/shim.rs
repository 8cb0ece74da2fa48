//! `--cfg loom` indirection for the engine's concurrency primitives.
//!
//! Under normal builds these are std atomics plus `parking_lot` locks; under
//! `RUSTFLAGS="--cfg loom"` they map onto loom's modeled equivalents so the
//! small-N interleaving models in `tests/loom.rs` can drive the real engine
//! code.

#[cfg(not(loom))]
pub(crate) use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, AtomicU32, AtomicU64, AtomicU8};

#[cfg(loom)]
pub(crate) use loom::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, AtomicU32, AtomicU64, AtomicU8};

pub(crate) use std::sync::atomic::Ordering;

#[cfg(not(loom))]
pub(crate) use std::sync::Arc;

#[cfg(loom)]
pub(crate) use loom::sync::Arc;

use std::time::Instant;

/// Mutex with a `parking_lot`-shaped API on both std and loom builds.
#[derive(Debug)]
pub(crate) struct Mutex<T> {
    #[cfg(not(loom))]
    inner: parking_lot::Mutex<T>,
    #[cfg(loom)]
    inner: loom::sync::Mutex<T>,
}

impl<T> Mutex<T> {
    pub(crate) fn new(value: T) -> Self {
        Self {
            #[cfg(not(loom))]
            inner: parking_lot::Mutex::new(value),
            #[cfg(loom)]
            inner: loom::sync::Mutex::new(value),
        }
    }

    #[cfg(not(loom))]
    pub(crate) fn lock(&self) -> parking_lot::MutexGuard<'_, T> {
        self.inner.lock()
    }

    #[cfg(loom)]
    pub(crate) fn lock(&self) -> loom::sync::MutexGuard<'_, T> {
        self.inner.lock().expect("lock poisoned")
    }
}

#[cfg(not(loom))]
pub(crate) type MutexGuard<'a, T> = parking_lot::MutexGuard<'a, T>;

#[cfg(loom)]
pub(crate) type MutexGuard<'a, T> = loom::sync::MutexGuard<'a, T>;

/// Condvar wrapper matching `parking_lot`'s in-place guard API.
#[derive(Debug)]
pub(crate) struct Condvar {
    #[cfg(not(loom))]
    inner: parking_lot::Condvar,
    #[cfg(loom)]
    inner: loom::sync::Condvar,
}

impl Condvar {
    pub(crate) fn new() -> Self {
        Self {
            #[cfg(not(loom))]
            inner: parking_lot::Condvar::new(),
            #[cfg(loom)]
            inner: loom::sync::Condvar::new(),
        }
    }

    pub(crate) fn notify_one(&self) {
        self.inner.notify_one();
    }

    #[cfg(not(loom))]
    pub(crate) fn wait<T>(&self, guard: &mut Option<MutexGuard<'_, T>>) {
        let held = guard.as_mut().expect("guard present");
        self.inner.wait(held);
    }

    /// Waits until `deadline`; returns true if the wait timed out.
    #[cfg(not(loom))]
    pub(crate) fn wait_until<T>(
        &self,
        guard: &mut Option<MutexGuard<'_, T>>,
        deadline: Instant,
    ) -> bool {
        let held = guard.as_mut().expect("guard present");
        self.inner.wait_until(held, deadline).timed_out()
    }

    #[cfg(loom)]
    pub(crate) fn wait<T>(&self, guard: &mut Option<MutexGuard<'_, T>>) {
        let taken = guard.take().expect("guard present");
        *guard = Some(self.inner.wait(taken).expect("lock poisoned"));
    }

    /// Loom has no modeled clock; deadline waits degrade to plain waits and
    /// never report a timeout, so loom models must avoid the timed paths.
    #[cfg(loom)]
    pub(crate) fn wait_until<T>(
        &self,
        guard: &mut Option<MutexGuard<'_, T>>,
        _deadline: Instant,
    ) -> bool {
        self.wait(guard);
        false
    }
}
