//! The acquire/release engine.
//!
//! [`SynchronizerCore`] owns the state word and the wait queue and drives
//! the full protocol: hook fast path, enqueue, spin/park loop, wakeup
//! propagation, and cancellation on every abandoned path. A concrete
//! primitive implements [`Synchronizer`] and overrides only the hooks for
//! the modes it supports.
//!
//! # Acquire protocol
//!
//! 1. Try the hook. Success means the caller never queues (barging).
//! 2. Enqueue a node, then loop: whenever the node is first in line, retry
//!    the hook; otherwise arrange a wakeup promise on the predecessor and
//!    park.
//! 3. On success the node becomes the new head. On timeout, interrupt, or
//!    a hook error the node is cancelled and unspliced before returning.
//!
//! Shared acquires additionally propagate: when a shared grant leaves
//! capacity behind, the new head wakes its successor in turn so a burst of
//! shared waiters drains without one release per waiter.

use crate::condition::Condition;
use crate::error::SyncError;
use crate::node::{self, NodeMode, NodeRef};
use crate::park::ParkHandle;
use crate::queue::SyncQueue;
use crate::shim::{AtomicI64, Ordering};
use std::time::{Duration, Instant};
use tracing::trace;

/// Remaining-timeout threshold below which a timed acquire spins instead
/// of parking; a park/unpark pair costs more than this.
pub(crate) const SPIN_FOR_TIMEOUT_THRESHOLD: Duration = Duration::from_micros(1);

/// The synchronizer's single word of state.
///
/// Its meaning belongs entirely to the [`Synchronizer`] hooks: lock
/// held/free, permit count, reentrancy depth, or packed reader/writer
/// counts. The engine never interprets it.
#[derive(Debug, Default)]
pub struct StateCell {
    value: AtomicI64,
}

impl StateCell {
    /// Creates a cell holding `initial`.
    #[cfg(not(loom))]
    #[must_use]
    pub const fn new(initial: i64) -> Self {
        Self {
            value: AtomicI64::new(initial),
        }
    }

    /// Creates a cell holding `initial`. Loom's atomics have no const
    /// constructors.
    #[cfg(loom)]
    #[must_use]
    pub fn new(initial: i64) -> Self {
        Self {
            value: AtomicI64::new(initial),
        }
    }

    /// Current state, with acquire ordering.
    #[must_use]
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }

    /// Unconditional store, with release ordering.
    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Release);
    }

    /// Atomic compare-and-set; the synchronization backbone of every hook.
    pub fn compare_and_set(&self, expected: i64, new: i64) -> bool {
        self.value
            .compare_exchange(expected, new, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// The hook predicates a concrete primitive plugs into the engine.
///
/// Every hook receives the shared [`StateCell`] and the caller's `arg`
/// (permit count, reentrancy increment, or whatever the primitive
/// defines). Hooks must be lock-free state transitions: read the state,
/// decide, publish with [`StateCell::compare_and_set`]. They must not
/// block and must tolerate being called from any thread at any time,
/// including speculatively by a barging caller.
///
/// Unimplemented hooks default to [`SyncError::unsupported`], so an
/// exclusive-only primitive simply ignores the shared pair and vice versa.
#[allow(unused_variables)]
pub trait Synchronizer: Send + Sync {
    /// Attempts an exclusive grant. `Ok(true)` means granted.
    fn try_acquire(&self, state: &StateCell, arg: i64) -> Result<bool, SyncError> {
        Err(SyncError::unsupported("try_acquire"))
    }

    /// Attempts an exclusive release. `Ok(true)` means fully released and
    /// a waiter may now succeed.
    fn try_release(&self, state: &StateCell, arg: i64) -> Result<bool, SyncError> {
        Err(SyncError::unsupported("try_release"))
    }

    /// Attempts a shared grant. Negative means failure; zero means granted
    /// with nothing left over; positive means granted with capacity to
    /// spare, which makes the engine propagate wakeups to further shared
    /// waiters.
    fn try_acquire_shared(&self, state: &StateCell, arg: i64) -> Result<i64, SyncError> {
        Err(SyncError::unsupported("try_acquire_shared"))
    }

    /// Attempts a shared release. `Ok(true)` means a waiter may now
    /// succeed.
    fn try_release_shared(&self, state: &StateCell, arg: i64) -> Result<bool, SyncError> {
        Err(SyncError::unsupported("try_release_shared"))
    }

    /// Whether the calling thread holds this synchronizer exclusively.
    /// Required by [`Condition`]; primitives without conditions keep the
    /// default.
    fn is_held_exclusively(&self, state: &StateCell) -> Result<bool, SyncError> {
        Err(SyncError::unsupported("is_held_exclusively"))
    }
}

/// State word + wait queue + protocol, parameterized by a hook set.
#[derive(Debug)]
pub struct SynchronizerCore<S: Synchronizer> {
    pub(crate) hooks: S,
    pub(crate) state: StateCell,
    pub(crate) queue: SyncQueue,
}

impl<S: Synchronizer> SynchronizerCore<S> {
    /// Creates a core with state `0`.
    #[must_use]
    pub fn new(hooks: S) -> Self {
        Self::with_state(hooks, 0)
    }

    /// Creates a core with the given initial state.
    #[must_use]
    pub fn with_state(hooks: S, initial: i64) -> Self {
        Self {
            hooks,
            state: StateCell::new(initial),
            queue: SyncQueue::new(),
        }
    }

    /// The state word, for hooks and introspection.
    #[must_use]
    pub fn state(&self) -> &StateCell {
        &self.state
    }

    /// Current value of the state word.
    #[must_use]
    pub fn get_state(&self) -> i64 {
        self.state.get()
    }

    /// Unconditionally overwrites the state word.
    pub fn set_state(&self, value: i64) {
        self.state.set(value);
    }

    /// Atomically replaces `expected` with `new` in the state word.
    pub fn compare_and_set_state(&self, expected: i64, new: i64) -> bool {
        self.state.compare_and_set(expected, new)
    }

    /// The hook set.
    #[must_use]
    pub fn hooks(&self) -> &S {
        &self.hooks
    }

    /// Creates a condition queue bound to this core. The hooks must
    /// implement [`Synchronizer::is_held_exclusively`].
    #[must_use]
    pub fn new_condition(&self) -> Condition<'_, S> {
        Condition::new(self)
    }

    // ── exclusive ──

    /// Acquires in exclusive mode, blocking until granted. Interrupts
    /// received while blocked are re-asserted on the caller's
    /// [`ParkHandle`] instead of aborting the acquire.
    pub fn acquire(&self, arg: i64) -> Result<(), SyncError> {
        if self.hooks.try_acquire(&self.state, arg)? {
            return Ok(());
        }
        self.do_acquire(arg, NodeMode::Exclusive, false, None)
            .map(drop)
    }

    /// Acquires in exclusive mode, aborting with
    /// [`SyncError::interrupted`] if the caller's handle is interrupted
    /// before or during the wait. The interrupt flag is consumed.
    pub fn acquire_interruptibly(&self, arg: i64) -> Result<(), SyncError> {
        if ParkHandle::current().take_interrupt() {
            return Err(SyncError::interrupted("acquire"));
        }
        if self.hooks.try_acquire(&self.state, arg)? {
            return Ok(());
        }
        self.do_acquire(arg, NodeMode::Exclusive, true, None)
            .map(drop)
    }

    /// Acquires in exclusive mode with a timeout. `Ok(false)` means the
    /// timeout elapsed; timeout is an expected outcome, not an error.
    /// Interruptible like [`Self::acquire_interruptibly`].
    pub fn try_acquire_timed(&self, arg: i64, timeout: Duration) -> Result<bool, SyncError> {
        if ParkHandle::current().take_interrupt() {
            return Err(SyncError::interrupted("timed acquire"));
        }
        if self.hooks.try_acquire(&self.state, arg)? {
            return Ok(true);
        }
        let deadline = Instant::now() + timeout;
        self.do_acquire(arg, NodeMode::Exclusive, true, Some(deadline))
    }

    /// Releases in exclusive mode. When the hook reports a full release,
    /// wakes the head's successor.
    pub fn release(&self, arg: i64) -> Result<bool, SyncError> {
        if !self.hooks.try_release(&self.state, arg)? {
            return Ok(false);
        }
        let h = self.queue.head();
        if let Some(hn) = self.queue.arena().resolve(h) {
            if hn.status() != 0 {
                self.queue.unpark_successor(h);
            }
        }
        Ok(true)
    }

    // ── shared ──

    /// Acquires in shared mode, blocking until granted. Uninterruptible;
    /// see [`Self::acquire`] for interrupt handling.
    pub fn acquire_shared(&self, arg: i64) -> Result<(), SyncError> {
        if self.hooks.try_acquire_shared(&self.state, arg)? >= 0 {
            return Ok(());
        }
        self.do_acquire(arg, NodeMode::Shared, false, None).map(drop)
    }

    /// Interruptible shared acquire.
    pub fn acquire_shared_interruptibly(&self, arg: i64) -> Result<(), SyncError> {
        if ParkHandle::current().take_interrupt() {
            return Err(SyncError::interrupted("shared acquire"));
        }
        if self.hooks.try_acquire_shared(&self.state, arg)? >= 0 {
            return Ok(());
        }
        self.do_acquire(arg, NodeMode::Shared, true, None).map(drop)
    }

    /// Timed shared acquire; `Ok(false)` on timeout.
    pub fn try_acquire_shared_timed(
        &self,
        arg: i64,
        timeout: Duration,
    ) -> Result<bool, SyncError> {
        if ParkHandle::current().take_interrupt() {
            return Err(SyncError::interrupted("timed shared acquire"));
        }
        if self.hooks.try_acquire_shared(&self.state, arg)? >= 0 {
            return Ok(true);
        }
        let deadline = Instant::now() + timeout;
        self.do_acquire(arg, NodeMode::Shared, true, Some(deadline))
    }

    /// Releases in shared mode; on success propagates wakeups.
    pub fn release_shared(&self, arg: i64) -> Result<bool, SyncError> {
        if !self.hooks.try_release_shared(&self.state, arg)? {
            return Ok(false);
        }
        self.do_release_shared();
        Ok(true)
    }

    // ── introspection ──

    /// Whether any thread is currently queued. A racy snapshot, like every
    /// query below.
    #[must_use]
    pub fn has_queued_threads(&self) -> bool {
        self.queue.has_queued_threads()
    }

    /// Whether any acquire has ever contended (the queue was initialized).
    #[must_use]
    pub fn has_contended(&self) -> bool {
        !self.queue.head().is_none()
    }

    /// Number of queued waiters.
    #[must_use]
    pub fn queue_length(&self) -> usize {
        self.queue.queue_length()
    }

    /// Whether `handle`'s thread occupies a queued node.
    #[must_use]
    pub fn is_queued(&self, handle: &ParkHandle) -> bool {
        self.queue.is_queued(handle)
    }

    /// Parker of the longest-waiting thread, if any.
    #[must_use]
    pub fn first_queued_thread(&self) -> Option<ParkHandle> {
        self.queue.first_queued_thread()
    }

    /// Whether another thread queued before the caller. Hooks consult this
    /// for strict FIFO granting.
    #[must_use]
    pub fn has_queued_predecessors(&self) -> bool {
        self.queue.has_queued_predecessors(&ParkHandle::current())
    }

    /// Whether the frontmost waiter wants exclusive access. Read/write
    /// primitives use this to keep shared bargers from starving a writer.
    #[must_use]
    pub fn apparently_first_queued_is_exclusive(&self) -> bool {
        self.queue.apparently_first_queued_is_exclusive()
    }

    // ── internals ──

    /// The queued acquire loop shared by every blocking flavor.
    ///
    /// `Ok(true)` acquired, `Ok(false)` deadline elapsed, `Err` interrupt
    /// or hook failure. The node is cancelled on every non-acquired exit.
    fn do_acquire(
        &self,
        arg: i64,
        mode: NodeMode,
        interruptible: bool,
        deadline: Option<Instant>,
    ) -> Result<bool, SyncError> {
        let handle = ParkHandle::current();
        let node = self.queue.add_waiter(mode, handle.clone());
        trace!(?node, ?mode, "queued for acquire");
        let mut interrupted = false;
        let outcome = loop {
            let pred = self.queue.owned(node).prev_ref();
            if pred == self.queue.head() {
                match self.try_grant(node, mode, arg) {
                    Ok(true) => break Ok(true),
                    Ok(false) => {}
                    Err(e) => break Err(e),
                }
            }
            if self.queue.should_park_after_failed_acquire(node) {
                match deadline {
                    None => handle.park(),
                    Some(d) => {
                        let now = Instant::now();
                        if now >= d {
                            break Ok(false);
                        }
                        if d - now > SPIN_FOR_TIMEOUT_THRESHOLD {
                            handle.park_deadline(d);
                        }
                    }
                }
                if interruptible {
                    if handle.take_interrupt() {
                        break Err(SyncError::interrupted("acquire while queued"));
                    }
                } else if handle.take_interrupt() {
                    interrupted = true;
                }
            }
        };
        match outcome {
            Ok(true) => {
                if interrupted {
                    handle.interrupt();
                }
                Ok(true)
            }
            Ok(false) => {
                trace!(?node, "acquire timed out");
                self.queue.cancel_acquire(node);
                Ok(false)
            }
            Err(e) => {
                trace!(?node, error = %e, "acquire aborted");
                self.queue.cancel_acquire(node);
                Err(e)
            }
        }
    }

    /// Hook retry for the frontmost node; on success installs it as head.
    fn try_grant(&self, node: NodeRef, mode: NodeMode, arg: i64) -> Result<bool, SyncError> {
        match mode {
            NodeMode::Exclusive => {
                if self.hooks.try_acquire(&self.state, arg)? {
                    self.queue.set_head(node);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            NodeMode::Shared => {
                let propagate = self.hooks.try_acquire_shared(&self.state, arg)?;
                if propagate >= 0 {
                    self.set_head_and_propagate(node, propagate);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }

    /// Reacquire path for a node transferred off a condition queue.
    /// Uninterruptible; reports whether an interrupt arrived while queued.
    pub(crate) fn acquire_transferred(&self, node: NodeRef, arg: i64) -> Result<bool, SyncError> {
        let handle = ParkHandle::current();
        let mut interrupted = false;
        let outcome = loop {
            let pred = self.queue.owned(node).prev_ref();
            if pred == self.queue.head() {
                match self.try_grant(node, NodeMode::Exclusive, arg) {
                    Ok(true) => break Ok(()),
                    Ok(false) => {}
                    Err(e) => break Err(e),
                }
            }
            if self.queue.should_park_after_failed_acquire(node) {
                handle.park();
                if handle.take_interrupt() {
                    interrupted = true;
                }
            }
        };
        match outcome {
            Ok(()) => Ok(interrupted),
            Err(e) => {
                self.queue.cancel_acquire(node);
                Err(e)
            }
        }
    }

    /// Makes `node` the head after a shared grant and decides whether the
    /// grant's leftover capacity should cascade to the next waiter.
    fn set_head_and_propagate(&self, node: NodeRef, propagate: i64) {
        let old_head = self.queue.head();
        // Capture the old head's status before it is retired under us.
        let old_status = self.queue.arena().resolve(old_head).map(|n| n.status());
        self.queue.set_head(node);

        let must_propagate = propagate > 0
            || old_head.is_none()
            || old_status.map_or(true, |s| s < 0)
            || {
                let h = self.queue.head();
                self.queue.arena().resolve(h).map_or(true, |n| n.status() < 0)
            };
        if !must_propagate {
            return;
        }
        // `node` may already have turned over if our successor raced ahead;
        // in that case a successor certainly existed, so propagate anyway.
        let successor_shared = match self.queue.arena().resolve(node) {
            Some(n) => {
                let s = n.next_ref();
                s.is_none()
                    || self
                        .queue
                        .arena()
                        .resolve(s)
                        .map_or(true, |sn| sn.node_mode() == NodeMode::Shared)
            }
            None => true,
        };
        if successor_shared {
            self.do_release_shared();
        }
    }

    /// Shared-mode wakeup loop. Keeps signalling the head's successor
    /// until the head stops changing, recording `PROPAGATE` when a release
    /// lands between a wakeup and the woken thread's head turnover.
    pub(crate) fn do_release_shared(&self) {
        loop {
            let h = self.queue.head();
            if !h.is_none() && h != self.queue.tail() {
                if let Some(hn) = self.queue.arena().resolve(h) {
                    let ws = hn.status();
                    if ws == node::SIGNAL {
                        if !hn.cas_status(node::SIGNAL, 0) {
                            continue;
                        }
                        self.queue.unpark_successor(h);
                    } else if ws == 0 && !hn.cas_status(0, node::PROPAGATE) {
                        continue;
                    }
                }
            }
            if h == self.queue.head() {
                return;
            }
        }
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering as StdOrdering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn init_test(name: &str) {
        crate::test_utils::init_test_logging();
        crate::test_phase!(name);
    }

    /// Non-reentrant binary lock: 0 free, 1 held.
    struct Binary;

    impl Synchronizer for Binary {
        fn try_acquire(&self, state: &StateCell, _arg: i64) -> Result<bool, SyncError> {
            Ok(state.compare_and_set(0, 1))
        }
        fn try_release(&self, state: &StateCell, _arg: i64) -> Result<bool, SyncError> {
            state.set(0);
            Ok(true)
        }
        fn is_held_exclusively(&self, state: &StateCell) -> Result<bool, SyncError> {
            Ok(state.get() == 1)
        }
    }

    /// Counting semaphore over the state word.
    struct Permits;

    impl Synchronizer for Permits {
        fn try_acquire_shared(&self, state: &StateCell, arg: i64) -> Result<i64, SyncError> {
            loop {
                let available = state.get();
                let remaining = available - arg;
                if remaining < 0 || state.compare_and_set(available, remaining) {
                    return Ok(remaining);
                }
            }
        }
        fn try_release_shared(&self, state: &StateCell, arg: i64) -> Result<bool, SyncError> {
            loop {
                let available = state.get();
                if state.compare_and_set(available, available + arg) {
                    return Ok(true);
                }
            }
        }
    }

    #[test]
    fn state_cell_initializes_a_static() {
        init_test("state_cell_initializes_a_static");
        static SHARED: StateCell = StateCell::new(5);
        crate::assert_with_log!(SHARED.get() == 5, "static state", 5, SHARED.get());
        crate::test_complete!("state_cell_initializes_a_static");
    }

    #[test]
    fn state_word_delegates_mirror_the_cell() {
        init_test("state_word_delegates_mirror_the_cell");
        let core = SynchronizerCore::with_state(Binary, 3);
        crate::assert_with_log!(core.get_state() == 3, "initial", 3, core.get_state());
        assert!(core.compare_and_set_state(3, 7));
        assert!(!core.compare_and_set_state(3, 9));
        core.set_state(0);
        crate::assert_with_log!(core.get_state() == 0, "reset", 0, core.get_state());
        crate::test_complete!("state_word_delegates_mirror_the_cell");
    }

    #[test]
    fn uncontended_acquire_release() {
        init_test("uncontended_acquire_release");
        let core = SynchronizerCore::new(Binary);
        core.acquire(1).unwrap();
        crate::assert_with_log!(core.state().get() == 1, "held", 1, core.state().get());
        assert!(!core.has_contended(), "fast path never queues");
        assert!(core.release(1).unwrap());
        crate::assert_with_log!(core.state().get() == 0, "free", 0, core.state().get());
        crate::test_complete!("uncontended_acquire_release");
    }

    #[test]
    fn contended_handoff() {
        init_test("contended_handoff");
        let core = Arc::new(SynchronizerCore::new(Binary));
        core.acquire(1).unwrap();
        let acquired = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&core);
        let a = Arc::clone(&acquired);
        let waiter = thread::spawn(move || {
            c.acquire(1).unwrap();
            a.store(1, StdOrdering::SeqCst);
            c.release(1).unwrap();
        });
        // Give the waiter time to queue and park.
        while !core.has_queued_threads() {
            thread::yield_now();
        }
        assert_eq!(acquired.load(StdOrdering::SeqCst), 0, "waiter blocked");
        core.release(1).unwrap();
        waiter.join().unwrap();
        crate::assert_with_log!(
            acquired.load(StdOrdering::SeqCst) == 1,
            "waiter ran",
            1,
            acquired.load(StdOrdering::SeqCst)
        );
        crate::test_complete!("contended_handoff");
    }

    #[test]
    fn timed_acquire_times_out_cleanly() {
        init_test("timed_acquire_times_out_cleanly");
        let core = Arc::new(SynchronizerCore::new(Binary));
        core.acquire(1).unwrap();
        let c = Arc::clone(&core);
        let t = thread::spawn(move || c.try_acquire_timed(1, Duration::from_millis(10)));
        let granted = t.join().unwrap().unwrap();
        crate::assert_with_log!(!granted, "timed out", false, granted);
        // The cancelled node is unspliced; only the sentinel head remains.
        crate::assert_with_log!(
            core.queue_length() == 0,
            "no residual waiters",
            0,
            core.queue_length()
        );
        core.release(1).unwrap();
        core.acquire(1).unwrap();
        core.release(1).unwrap();
        crate::test_complete!("timed_acquire_times_out_cleanly");
    }

    #[test]
    fn interrupt_aborts_interruptible_acquire() {
        init_test("interrupt_aborts_interruptible_acquire");
        let core = Arc::new(SynchronizerCore::new(Binary));
        core.acquire(1).unwrap();
        let c = Arc::clone(&core);
        let (tx, rx) = std::sync::mpsc::channel();
        let t = thread::spawn(move || {
            tx.send(ParkHandle::current()).unwrap();
            c.acquire_interruptibly(1)
        });
        let handle = rx.recv().unwrap();
        while !core.has_queued_threads() {
            thread::yield_now();
        }
        handle.interrupt();
        let err = t.join().unwrap().unwrap_err();
        crate::assert_with_log!(err.is_interrupted(), "interrupted", true, err.is_interrupted());
        crate::assert_with_log!(
            core.queue_length() == 0,
            "node cancelled",
            0,
            core.queue_length()
        );
        core.release(1).unwrap();
        crate::test_complete!("interrupt_aborts_interruptible_acquire");
    }

    #[test]
    fn uninterruptible_acquire_reasserts_interrupt() {
        init_test("uninterruptible_acquire_reasserts_interrupt");
        let core = Arc::new(SynchronizerCore::new(Binary));
        core.acquire(1).unwrap();
        let c = Arc::clone(&core);
        let (tx, rx) = std::sync::mpsc::channel();
        let t = thread::spawn(move || {
            tx.send(ParkHandle::current()).unwrap();
            c.acquire(1).unwrap();
            let pending = ParkHandle::current().take_interrupt();
            c.release(1).unwrap();
            pending
        });
        let handle = rx.recv().unwrap();
        while !core.has_queued_threads() {
            thread::yield_now();
        }
        handle.interrupt();
        thread::sleep(Duration::from_millis(5));
        core.release(1).unwrap();
        let pending = t.join().unwrap();
        crate::assert_with_log!(pending, "interrupt survived acquire", true, pending);
        crate::test_complete!("uninterruptible_acquire_reasserts_interrupt");
    }

    #[test]
    fn shared_permits_bound_concurrency() {
        init_test("shared_permits_bound_concurrency");
        let core = Arc::new(SynchronizerCore::with_state(Permits, 2));
        let inside = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..6 {
            let c = Arc::clone(&core);
            let i = Arc::clone(&inside);
            let p = Arc::clone(&peak);
            handles.push(thread::spawn(move || {
                c.acquire_shared(1).unwrap();
                let now = i.fetch_add(1, StdOrdering::SeqCst) + 1;
                p.fetch_max(now, StdOrdering::SeqCst);
                thread::sleep(Duration::from_millis(2));
                i.fetch_sub(1, StdOrdering::SeqCst);
                c.release_shared(1).unwrap();
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        let peak = peak.load(StdOrdering::SeqCst);
        crate::assert_with_log!(peak <= 2, "bounded by permits", 2, peak);
        crate::assert_with_log!(core.state().get() == 2, "permits restored", 2, core.state().get());
        crate::test_complete!("shared_permits_bound_concurrency");
    }

    #[test]
    fn unsupported_mode_is_an_error() {
        init_test("unsupported_mode_is_an_error");
        let core = SynchronizerCore::new(Binary);
        let err = core.acquire_shared(1).unwrap_err();
        crate::assert_with_log!(err.is_unsupported(), "unsupported", true, err.is_unsupported());
        crate::test_complete!("unsupported_mode_is_an_error");
    }

    #[test]
    fn pending_interrupt_fails_interruptible_acquire_fast() {
        init_test("pending_interrupt_fails_interruptible_acquire_fast");
        let core = SynchronizerCore::new(Binary);
        ParkHandle::current().interrupt();
        let err = core.acquire_interruptibly(1).unwrap_err();
        assert!(err.is_interrupted());
        // Flag was consumed; the next attempt succeeds.
        core.acquire_interruptibly(1).unwrap();
        core.release(1).unwrap();
        crate::test_complete!("pending_interrupt_fails_interruptible_acquire_fast");
    }
}
