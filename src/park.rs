//! Thread suspension and resumption with interrupt delivery.
//!
//! A [`ParkHandle`] is an opaque capability to suspend the thread it belongs
//! to until it is explicitly resumed, an interrupt signal is delivered, or a
//! deadline elapses. It is the only suspension point in the engine; every
//! other path is a non-blocking CAS loop on the caller's own stack.
//!
//! # Model
//!
//! Each handle carries a token, initially absent:
//!
//! - [`ParkHandle::park`] blocks until the token is available, then consumes
//!   it atomically. If [`ParkHandle::unpark`] ran first, the next park does
//!   not block. Spurious returns are permitted; callers always recheck.
//! - [`ParkHandle::unpark`] makes the token available if it was not already.
//! - [`ParkHandle::interrupt`] sets a sticky flag and unparks. The flag is
//!   observed with [`ParkHandle::take_interrupt`], which clears it; the
//!   uninterruptible acquire paths use this to swallow the signal during the
//!   wait and re-assert it on exit.

use crate::shim::{Arc, AtomicBool, AtomicI32, Condvar, Mutex, Ordering};
use std::fmt;
use std::time::Instant;

const EMPTY: i32 = 0;
const PARKED: i32 = -1;
const NOTIFIED: i32 = 1;

#[derive(Debug)]
struct ParkInner {
    /// EMPTY, PARKED or NOTIFIED.
    state: AtomicI32,
    /// Sticky interrupt flag, cleared only by `take_interrupt`.
    interrupted: AtomicBool,
    lock: Mutex<()>,
    cvar: Condvar,
}

/// Suspend/resume capability for one logical thread.
///
/// Cloning yields another reference to the same thread's parker; clones are
/// how other threads deliver `unpark` and `interrupt`.
#[derive(Clone)]
pub struct ParkHandle {
    inner: Arc<ParkInner>,
}

impl ParkHandle {
    /// Creates a fresh handle, token absent, not interrupted.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ParkInner {
                state: AtomicI32::new(EMPTY),
                interrupted: AtomicBool::new(false),
                lock: Mutex::new(()),
                cvar: Condvar::new(),
            }),
        }
    }

    /// Returns the calling thread's handle.
    #[cfg(not(loom))]
    #[must_use]
    pub fn current() -> Self {
        std::thread_local! {
            static CURRENT: ParkHandle = ParkHandle::new();
        }
        CURRENT.with(Self::clone)
    }

    /// Returns the calling thread's handle.
    #[cfg(loom)]
    #[must_use]
    pub fn current() -> Self {
        loom::thread_local! {
            static CURRENT: ParkHandle = ParkHandle::new();
        }
        CURRENT.with(Self::clone)
    }

    /// True if both handles belong to the same logical thread.
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Blocks until the token is available, consuming it.
    ///
    /// Returns immediately if an interrupt is pending, like the park
    /// primitive the engine's wait loops expect. May also return spuriously.
    pub fn park(&self) {
        let inner = &*self.inner;
        if inner.interrupted.load(Ordering::Acquire) {
            return;
        }
        let mut guard = Some(inner.lock.lock());
        match inner
            .state
            .compare_exchange(EMPTY, PARKED, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => {}
            Err(_) => {
                // A token is pending; consume it and return.
                inner.state.store(EMPTY, Ordering::SeqCst);
                return;
            }
        }
        loop {
            inner.cvar.wait(&mut guard);
            if inner
                .state
                .compare_exchange(NOTIFIED, EMPTY, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return;
            }
            if inner.interrupted.load(Ordering::Acquire) {
                let _ = inner.state.compare_exchange(
                    PARKED,
                    EMPTY,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                );
                return;
            }
        }
    }

    /// Blocks until the token is available or `deadline` passes.
    ///
    /// Same token semantics as [`park`](Self::park); spurious returns are
    /// permitted, and the caller rechecks its own deadline.
    pub fn park_deadline(&self, deadline: Instant) {
        let inner = &*self.inner;
        if inner.interrupted.load(Ordering::Acquire) {
            return;
        }
        let mut guard = Some(inner.lock.lock());
        match inner
            .state
            .compare_exchange(EMPTY, PARKED, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => {}
            Err(_) => {
                inner.state.store(EMPTY, Ordering::SeqCst);
                return;
            }
        }
        loop {
            let timed_out = inner.cvar.wait_until(&mut guard, deadline);
            if inner
                .state
                .compare_exchange(NOTIFIED, EMPTY, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return;
            }
            if timed_out || inner.interrupted.load(Ordering::Acquire) {
                let _ = inner.state.compare_exchange(
                    PARKED,
                    EMPTY,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                );
                return;
            }
        }
    }

    /// Makes the token available, waking the parked thread if any.
    pub fn unpark(&self) {
        let inner = &*self.inner;
        if inner.state.swap(NOTIFIED, Ordering::SeqCst) == PARKED {
            // Acquire and release the lock so the notify cannot slot in
            // between the parker's state CAS and its wait.
            drop(inner.lock.lock());
            inner.cvar.notify_one();
        }
    }

    /// Delivers an interrupt: sets the sticky flag and unparks.
    pub fn interrupt(&self) {
        self.inner.interrupted.store(true, Ordering::Release);
        self.unpark();
    }

    /// True if an interrupt is pending. Does not clear the flag.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.inner.interrupted.load(Ordering::Acquire)
    }

    /// Clears and returns the pending-interrupt flag.
    #[must_use]
    pub fn take_interrupt(&self) -> bool {
        self.inner.interrupted.swap(false, Ordering::AcqRel)
    }
}

impl Default for ParkHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ParkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParkHandle")
            .field("state", &self.inner.state.load(Ordering::Relaxed))
            .field(
                "interrupted",
                &self.inner.interrupted.load(Ordering::Relaxed),
            )
            .finish()
    }
}
