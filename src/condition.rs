//! Condition queues integrated with the sync queue.
//!
//! A [`Condition`] is a second FIFO of nodes, linked through `next_waiter`
//! and guarded by the owning synchronizer's exclusive lock: every list
//! mutation happens while the caller holds the lock, so the list needs no
//! synchronization of its own. A waiting node carries status `CONDITION`;
//! signalling moves it onto the sync queue with an atomic status CAS, and
//! the winner of the CAS race between signal and a cancelling waiter
//! decides whether the wait counts as signalled.
//!
//! Waking from a condition wait always goes through a full reacquire of
//! the lock, so `wait` returns with the lock held on every path, including
//! timeout and interrupt.

use crate::engine::{SynchronizerCore, Synchronizer, SPIN_FOR_TIMEOUT_THRESHOLD};
use crate::error::SyncError;
use crate::node::{self, NodeRef};
use crate::park::ParkHandle;
use crate::shim::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::trace;

/// How an interrupt observed during a wait is reported after reacquire.
#[derive(Clone, Copy, PartialEq, Eq)]
enum InterruptMode {
    /// No interrupt observed.
    None,
    /// Interrupt won the race against signal; surface it as an error.
    Throw,
    /// Signal won; complete the wait and re-assert the interrupt flag.
    Reinterrupt,
}

/// A condition wait queue bound to one [`SynchronizerCore`].
///
/// All operations require the bound synchronizer to be held exclusively by
/// the caller and fail with [`SyncError::illegal_state`] otherwise.
#[derive(Debug)]
pub struct Condition<'c, S: Synchronizer> {
    core: &'c SynchronizerCore<S>,
    first_waiter: AtomicU64,
    last_waiter: AtomicU64,
}

impl<'c, S: Synchronizer> Condition<'c, S> {
    pub(crate) fn new(core: &'c SynchronizerCore<S>) -> Self {
        Self {
            core,
            first_waiter: AtomicU64::new(NodeRef::NONE.raw()),
            last_waiter: AtomicU64::new(NodeRef::NONE.raw()),
        }
    }

    /// Whether this condition was created by `core`.
    #[must_use]
    pub fn is_owned_by(&self, core: &SynchronizerCore<S>) -> bool {
        std::ptr::eq(self.core, core)
    }

    // ── waiting ──

    /// Releases the lock, waits until signalled, and reacquires.
    ///
    /// Interruptible: an interrupt pending on entry, or one that arrives
    /// before a signal, aborts with [`SyncError::interrupted`] after the
    /// lock has been reacquired. An interrupt that loses the race against
    /// a signal completes the wait and re-asserts the flag instead.
    pub fn wait(&self) -> Result<(), SyncError> {
        let handle = ParkHandle::current();
        if handle.take_interrupt() {
            return Err(SyncError::interrupted("condition wait"));
        }
        let node = self.add_waiter(&handle)?;
        let saved = self.fully_release(node)?;
        let mut mode = InterruptMode::None;
        while !self.core.queue.is_on_sync_queue(node) {
            handle.park();
            mode = self.check_interrupt_while_waiting(node, &handle);
            if mode != InterruptMode::None {
                break;
            }
        }
        if self.core.acquire_transferred(node, saved)? && mode != InterruptMode::Throw {
            mode = InterruptMode::Reinterrupt;
        }
        if !self.core.queue.owned(node).next_waiter_ref().is_none() {
            self.unlink_cancelled_waiters();
        }
        self.report_interrupt(mode, &handle)
    }

    /// Like [`Self::wait`] but interrupts only mark the flag; the wait
    /// keeps going until a signal arrives.
    pub fn wait_uninterruptibly(&self) -> Result<(), SyncError> {
        let handle = ParkHandle::current();
        let node = self.add_waiter(&handle)?;
        let saved = self.fully_release(node)?;
        let mut interrupted = false;
        while !self.core.queue.is_on_sync_queue(node) {
            handle.park();
            if handle.take_interrupt() {
                interrupted = true;
            }
        }
        if self.core.acquire_transferred(node, saved)? || interrupted {
            handle.interrupt();
        }
        if !self.core.queue.owned(node).next_waiter_ref().is_none() {
            self.unlink_cancelled_waiters();
        }
        Ok(())
    }

    /// Timed wait. `Ok(true)` means signalled; `Ok(false)` means the
    /// timeout elapsed first. The lock is reacquired either way.
    pub fn wait_timed(&self, timeout: Duration) -> Result<bool, SyncError> {
        self.wait_until(Instant::now() + timeout)
    }

    /// Deadline wait; semantics of [`Self::wait_timed`].
    pub fn wait_until(&self, deadline: Instant) -> Result<bool, SyncError> {
        let handle = ParkHandle::current();
        if handle.take_interrupt() {
            return Err(SyncError::interrupted("timed condition wait"));
        }
        let node = self.add_waiter(&handle)?;
        let saved = self.fully_release(node)?;
        let mut timed_out = false;
        let mut mode = InterruptMode::None;
        while !self.core.queue.is_on_sync_queue(node) {
            let now = Instant::now();
            if now >= deadline {
                // The CAS decides: if a signal got there first, the wait
                // counts as signalled even at the deadline.
                timed_out = self.transfer_after_cancelled_wait(node);
                break;
            }
            if deadline - now > SPIN_FOR_TIMEOUT_THRESHOLD {
                handle.park_deadline(deadline);
            }
            mode = self.check_interrupt_while_waiting(node, &handle);
            if mode != InterruptMode::None {
                break;
            }
        }
        if self.core.acquire_transferred(node, saved)? && mode != InterruptMode::Throw {
            mode = InterruptMode::Reinterrupt;
        }
        if !self.core.queue.owned(node).next_waiter_ref().is_none() {
            self.unlink_cancelled_waiters();
        }
        self.report_interrupt(mode, &handle)?;
        Ok(!timed_out)
    }

    // ── signalling ──

    /// Moves the longest-waiting node to the sync queue. Signalling with
    /// no waiters is a no-op.
    pub fn signal(&self) -> Result<(), SyncError> {
        self.check_owns()?;
        self.do_signal(false);
        Ok(())
    }

    /// Moves every waiting node to the sync queue.
    pub fn signal_all(&self) -> Result<(), SyncError> {
        self.check_owns()?;
        self.do_signal(true);
        Ok(())
    }

    fn do_signal(&self, all: bool) {
        loop {
            let first = self.first();
            if first.is_none() {
                return;
            }
            let next = self
                .core
                .queue
                .arena()
                .resolve(first)
                .map_or(NodeRef::NONE, |n| n.next_waiter_ref());
            self.set_first(next);
            if next.is_none() {
                self.set_last(NodeRef::NONE);
            }
            if let Some(n) = self.core.queue.arena().resolve(first) {
                n.set_next_waiter(NodeRef::NONE);
            }
            if self.transfer_for_signal(first) && !all {
                return;
            }
        }
    }

    // ── introspection ──

    /// Whether any thread is waiting on this condition.
    pub fn has_waiters(&self) -> Result<bool, SyncError> {
        self.check_owns()?;
        Ok(self.count_waiters(true) > 0)
    }

    /// Number of threads waiting on this condition.
    pub fn wait_queue_length(&self) -> Result<usize, SyncError> {
        self.check_owns()?;
        Ok(self.count_waiters(false))
    }

    fn count_waiters(&self, stop_at_one: bool) -> usize {
        let mut count = 0;
        let mut cur = self.first();
        while !cur.is_none() {
            let Some(n) = self.core.queue.arena().resolve(cur) else {
                break;
            };
            if n.status() == node::CONDITION {
                count += 1;
                if stop_at_one {
                    break;
                }
            }
            cur = n.next_waiter_ref();
        }
        count
    }

    // ── transfer protocol ──

    /// Signal side of the status race. `false` means the wait was already
    /// cancelled and the signal should move on to the next waiter.
    fn transfer_for_signal(&self, node: NodeRef) -> bool {
        let Some(n) = self.core.queue.arena().resolve(node) else {
            return false;
        };
        if !n.cas_status(node::CONDITION, 0) {
            return false;
        }
        trace!(?node, "transferring signalled waiter");
        let pred = self.core.queue.enq(node);
        // If the predecessor cannot promise a wakeup, wake the transferred
        // thread now so it re-parks on the sync queue itself.
        let needs_unpark = match self.core.queue.arena().resolve(pred) {
            Some(p) => {
                let ws = p.status();
                ws > 0 || !p.cas_status(ws, node::SIGNAL)
            }
            None => true,
        };
        if needs_unpark {
            n.unpark_waiter();
        }
        true
    }

    /// Waiter side of the status race, taken on timeout or interrupt.
    /// `true` means the cancellation won and no signal was consumed.
    fn transfer_after_cancelled_wait(&self, node: NodeRef) -> bool {
        let n = self.core.queue.owned(node);
        if n.cas_status(node::CONDITION, 0) {
            self.core.queue.enq(node);
            return true;
        }
        // A signal won the CAS; wait for its enqueue to complete so the
        // reacquire below finds the node linked.
        while !self.core.queue.is_on_sync_queue(node) {
            std::thread::yield_now();
        }
        false
    }

    fn check_interrupt_while_waiting(&self, node: NodeRef, handle: &ParkHandle) -> InterruptMode {
        if handle.take_interrupt() {
            if self.transfer_after_cancelled_wait(node) {
                InterruptMode::Throw
            } else {
                InterruptMode::Reinterrupt
            }
        } else {
            InterruptMode::None
        }
    }

    fn report_interrupt(&self, mode: InterruptMode, handle: &ParkHandle) -> Result<(), SyncError> {
        match mode {
            InterruptMode::None => Ok(()),
            InterruptMode::Throw => Err(SyncError::interrupted("condition wait")),
            InterruptMode::Reinterrupt => {
                handle.interrupt();
                Ok(())
            }
        }
    }

    // ── waiter list (guarded by the exclusive lock) ──

    fn first(&self) -> NodeRef {
        NodeRef::from_raw(self.first_waiter.load(Ordering::Acquire))
    }

    fn set_first(&self, node: NodeRef) {
        self.first_waiter.store(node.raw(), Ordering::Release);
    }

    fn last(&self) -> NodeRef {
        NodeRef::from_raw(self.last_waiter.load(Ordering::Acquire))
    }

    fn set_last(&self, node: NodeRef) {
        self.last_waiter.store(node.raw(), Ordering::Release);
    }

    fn check_owns(&self) -> Result<(), SyncError> {
        if self.core.hooks.is_held_exclusively(&self.core.state)? {
            Ok(())
        } else {
            Err(SyncError::illegal_state("condition used without its lock"))
        }
    }

    /// Appends a fresh `CONDITION` node for the caller.
    fn add_waiter(&self, handle: &ParkHandle) -> Result<NodeRef, SyncError> {
        self.check_owns()?;
        let mut last = self.last();
        if !last.is_none() {
            let stale = self
                .core
                .queue
                .arena()
                .resolve(last)
                .map_or(true, |n| n.status() != node::CONDITION);
            if stale {
                self.unlink_cancelled_waiters();
                last = self.last();
            }
        }
        let node = self.core.queue.alloc_condition_node(handle.clone());
        if last.is_none() {
            self.set_first(node);
        } else if let Some(tail) = self.core.queue.arena().resolve(last) {
            tail.set_next_waiter(node);
        }
        self.set_last(node);
        Ok(node)
    }

    /// Sweeps nodes that stopped waiting out of the list. Nodes that left
    /// by cancellation before any transfer are retired here; nodes that
    /// transferred to the sync queue are only unlinked, their slot belongs
    /// to the sync-queue lifecycle.
    fn unlink_cancelled_waiters(&self) {
        let mut trail = NodeRef::NONE;
        let mut cur = self.first();
        while !cur.is_none() {
            match self.core.queue.arena().resolve(cur) {
                Some(n) if n.status() == node::CONDITION => {
                    trail = cur;
                    cur = n.next_waiter_ref();
                }
                Some(n) => {
                    let next = n.next_waiter_ref();
                    let cancelled = n.status() == node::CANCELLED;
                    n.set_next_waiter(NodeRef::NONE);
                    self.splice_out(trail, next);
                    if cancelled {
                        self.core.queue.arena().retire(cur);
                    }
                    cur = next;
                }
                None => {
                    // Retired nodes only ever sit at the list tail.
                    self.splice_out(trail, NodeRef::NONE);
                    return;
                }
            }
        }
    }

    fn splice_out(&self, trail: NodeRef, next: NodeRef) {
        if trail.is_none() {
            self.set_first(next);
        } else if let Some(t) = self.core.queue.arena().resolve(trail) {
            t.set_next_waiter(next);
        }
        if next.is_none() {
            self.set_last(trail);
        }
    }

    /// Releases the entire lock hold (all reentrant levels at once) before
    /// parking on the condition.
    fn fully_release(&self, node: NodeRef) -> Result<i64, SyncError> {
        let saved = self.core.state.get();
        match self.core.release(saved) {
            Ok(true) => Ok(saved),
            Ok(false) => {
                self.core.queue.owned(node).set_status(node::CANCELLED);
                Err(SyncError::illegal_state("lock not released for wait"))
            }
            Err(e) => {
                self.core.queue.owned(node).set_status(node::CANCELLED);
                Err(e)
            }
        }
    }
}
