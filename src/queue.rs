//! Lock-free FIFO queue of blocked threads (CLH variant).
//!
//! # Structure
//!
//! `head` points at a dummy node: either the sentinel installed by the
//! first enqueue or the node of the thread that most recently acquired.
//! Real waiters hang off it in arrival order; `tail` is the last of them.
//! Enqueue is a tail CAS; dequeue is [`SyncQueue::set_head`] performed by
//! the thread that just acquired.
//!
//! # Link discipline
//!
//! - `prev` is authoritative. It is written before the tail CAS publishes
//!   a node, and only ever rewritten by the node's own thread (or, for a
//!   cancelled run, by the unique live successor skipping past it).
//! - `next` is an optimistic hint, written after the tail CAS. A missing
//!   or stale `next` is repaired by scanning backward from `tail`.
//!
//! # Node reclamation
//!
//! Nodes live in a [`WaitArena`]; every traversal re-validates handles
//! against slot generations and restarts from `tail` when a node was
//! retired mid-walk. Retirement responsibility is unambiguous:
//!
//! - the old head is retired by `set_head`,
//! - a cancelled tail is retired by its canceller after the tail CAS,
//! - a cancelled interior run is retired by the live successor that
//!   rewrites its `prev` past the run.
//!
//! A stale status write to a recycled slot can at worst cause a spurious
//! unpark, never a lost one.

use crate::arena::WaitArena;
use crate::node::{self, NodeMode, NodeRef, WaitNode};
use crate::park::ParkHandle;
use crate::shim::{AtomicU64, Ordering};
use smallvec::SmallVec;

/// The parked-thread queue plus the arena its nodes live in.
#[derive(Debug)]
pub(crate) struct SyncQueue {
    arena: WaitArena,
    head: AtomicU64,
    tail: AtomicU64,
}

impl SyncQueue {
    pub(crate) fn new() -> Self {
        Self {
            arena: WaitArena::new(),
            head: AtomicU64::new(NodeRef::NONE.raw()),
            tail: AtomicU64::new(NodeRef::NONE.raw()),
        }
    }

    pub(crate) fn arena(&self) -> &WaitArena {
        &self.arena
    }

    pub(crate) fn head(&self) -> NodeRef {
        NodeRef::from_raw(self.head.load(Ordering::Acquire))
    }

    pub(crate) fn tail(&self) -> NodeRef {
        NodeRef::from_raw(self.tail.load(Ordering::Acquire))
    }

    fn cas_head(&self, expected: NodeRef, new: NodeRef) -> bool {
        self.head
            .compare_exchange(expected.raw(), new.raw(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn cas_tail(&self, expected: NodeRef, new: NodeRef) -> bool {
        self.tail
            .compare_exchange(expected.raw(), new.raw(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Resolves a handle the caller knows is live (its own node, or the
    /// node it is about to publish).
    ///
    /// # Panics
    ///
    /// Panics if the handle was retired, which indicates a reclamation
    /// protocol violation.
    pub(crate) fn owned(&self, node: NodeRef) -> &WaitNode {
        self.arena
            .resolve(node)
            .expect("caller-owned node outlives the operation")
    }

    // ── enqueue ──

    /// Allocates a node for the calling thread and appends it.
    pub(crate) fn add_waiter(&self, mode: NodeMode, handle: ParkHandle) -> NodeRef {
        let node = self.arena.alloc(mode, 0, Some(handle));
        self.enq(node);
        node
    }

    /// Allocates a node parked on a condition queue. Not linked into the
    /// sync queue until transferred.
    pub(crate) fn alloc_condition_node(&self, handle: ParkHandle) -> NodeRef {
        self.arena
            .alloc(NodeMode::Exclusive, node::CONDITION, Some(handle))
    }

    /// Appends `node`, installing the sentinel head first if the queue has
    /// never been used. Returns the predecessor.
    pub(crate) fn enq(&self, node: NodeRef) -> NodeRef {
        loop {
            let t = self.tail();
            if t.is_none() {
                let sentinel = self.arena.alloc(NodeMode::Exclusive, 0, None);
                if self.cas_head(NodeRef::NONE, sentinel) {
                    self.tail.store(sentinel.raw(), Ordering::Release);
                } else {
                    self.arena.retire(sentinel);
                }
                continue;
            }
            self.owned(node).set_prev(t);
            if self.cas_tail(t, node) {
                // Tail-held handles are never retired, so `t` is live here;
                // the hint write still tolerates a racing retirement.
                if let Some(pred) = self.arena.resolve(t) {
                    pred.set_next(node);
                }
                return t;
            }
        }
    }

    // ── dequeue ──

    /// Publishes `node` as the new head after its thread acquired, and
    /// retires the old head. Called only by the acquiring thread.
    pub(crate) fn set_head(&self, node: NodeRef) {
        let old = self.head();
        let n = self.owned(node);
        // Strip waiter and prev before publication so no reader of the new
        // head can reach the node being retired.
        n.set_waiter(None);
        n.set_prev(NodeRef::NONE);
        self.head.store(node.raw(), Ordering::Release);
        self.arena.retire(old);
    }

    // ── wakeups ──

    /// Wakes the first live waiter behind `node` (normally the head).
    pub(crate) fn unpark_successor(&self, node: NodeRef) {
        let Some(n) = self.arena.resolve(node) else {
            return;
        };
        let ws = n.status();
        if ws < 0 {
            n.cas_status(ws, 0);
        }
        // Prefer the next hint; fall back to a validated backward scan.
        let mut successor = n.next_ref();
        let stale = match self.arena.resolve(successor) {
            Some(s) => s.status() > 0,
            None => true,
        };
        if successor.is_none() || stale {
            successor = self.rescan_successor(node);
        }
        if let Some(s) = self.arena.resolve(successor) {
            s.unpark_waiter();
        }
    }

    /// Backward scan from `tail` for the closest non-cancelled node after
    /// `node`. Restarts whenever a traversed handle dies underneath it.
    fn rescan_successor(&self, node: NodeRef) -> NodeRef {
        'restart: loop {
            let mut candidate = NodeRef::NONE;
            let mut cur = self.tail();
            while !cur.is_none() && cur != node {
                let Some(c) = self.arena.resolve(cur) else {
                    continue 'restart;
                };
                let status = c.status();
                let prev = c.prev_ref();
                if !self.arena.is_live(cur) {
                    continue 'restart;
                }
                if status <= 0 {
                    candidate = cur;
                }
                cur = prev;
            }
            return candidate;
        }
    }

    // ── park protocol ──

    /// After a failed acquire attempt, decides whether the owner of `node`
    /// may park. Parking is only safe once the predecessor has promised a
    /// wakeup by carrying `SIGNAL`; one more acquire retry happens after
    /// every status repair.
    pub(crate) fn should_park_after_failed_acquire(&self, node: NodeRef) -> bool {
        let n = self.owned(node);
        let pred = n.prev_ref();
        let Some(p) = self.arena.resolve(pred) else {
            return false;
        };
        let ws = p.status();
        if ws == node::SIGNAL {
            return true;
        }
        if ws > 0 {
            self.skip_cancelled_predecessors(node);
            return false;
        }
        // 0 or PROPAGATE; request the wakeup promise and retry once more.
        p.cas_status(ws, node::SIGNAL);
        false
    }

    /// Rewrites `node.prev` past a run of cancelled predecessors and, as
    /// the run's unique live successor, retires it. Each link read is
    /// re-validated against the slot generation; a node retired mid-walk
    /// restarts the walk from `node.prev` (which only `node`'s own thread
    /// rewrites, so the restart always begins on a published ref).
    fn skip_cancelled_predecessors(&self, node: NodeRef) {
        let n = self.owned(node);
        'restart: loop {
            let mut skipped: SmallVec<[NodeRef; 4]> = SmallVec::new();
            let mut cur = n.prev_ref();
            loop {
                let Some(c) = self.arena.resolve(cur) else {
                    // The run's base was retired out from under us; leave
                    // the links alone and let the retry re-read a repaired
                    // prev.
                    return;
                };
                let status = c.status();
                let before = c.prev_ref();
                if !self.arena.is_live(cur) {
                    continue 'restart;
                }
                if status > 0 {
                    skipped.push(cur);
                    cur = before;
                    continue;
                }
                if skipped.is_empty() {
                    // A racing repair already slid prev to a live node.
                    return;
                }
                n.set_prev(cur);
                c.set_next(node);
                for dead in skipped {
                    self.arena.retire(dead);
                }
                return;
            }
        }
    }

    // ── cancellation ──

    /// Unlinks `node` after an abandoned acquire (timeout, interrupt, or a
    /// hook error) and hands any pending wakeup to a live successor.
    pub(crate) fn cancel_acquire(&self, node: NodeRef) {
        let Some(n) = self.arena.resolve(node) else {
            return;
        };
        n.set_waiter(None);

        // Slide prev past already-cancelled predecessors and retire them.
        // Generation-validated like every other walk: a node retired under
        // us restarts from our own prev, which nobody else rewrites.
        let mut skipped: SmallVec<[NodeRef; 4]> = SmallVec::new();
        let (pred, pred_node) = 'restart: loop {
            skipped.clear();
            let mut cur = n.prev_ref();
            loop {
                let Some(p) = self.arena.resolve(cur) else {
                    // Predecessor vanished (it reached head and was
                    // retired); nothing behind us needs repair.
                    n.set_status(node::CANCELLED);
                    n.set_next(NodeRef::NONE);
                    return;
                };
                let status = p.status();
                let before = p.prev_ref();
                if !self.arena.is_live(cur) {
                    continue 'restart;
                }
                if status <= 0 {
                    break 'restart (cur, p);
                }
                skipped.push(cur);
                cur = before;
            }
        };
        n.set_prev(pred);
        let pred_next = pred_node.next_ref();

        n.set_status(node::CANCELLED);

        if node == self.tail() && self.cas_tail(node, pred) {
            // We were last; nobody points at us. Clear the hint and retire
            // ourselves along with the run we skipped.
            pred_node.cas_next(pred_next, NodeRef::NONE);
            for dead in skipped {
                self.arena.retire(dead);
            }
            self.arena.retire(node);
            return;
        }

        // A successor exists. Either splice the hint around us so the
        // successor's next wakeup reaches it, or wake it now to let it
        // repair the links itself (it will retire us via its prev rewrite).
        let pred_ws = pred_node.status();
        let pred_promises = pred != self.head()
            && (pred_ws == node::SIGNAL
                || (pred_ws <= 0 && pred_node.cas_status(pred_ws, node::SIGNAL)))
            && pred_node.waiter_handle().is_some();
        if pred_promises {
            let next = n.next_ref();
            if let Some(s) = self.arena.resolve(next) {
                if s.status() <= 0 {
                    pred_node.cas_next(node, next);
                }
            }
        } else {
            self.unpark_successor(node);
        }
        n.set_next(NodeRef::NONE);
        for dead in skipped {
            self.arena.retire(dead);
        }
    }

    // ── condition support ──

    /// True once a condition node has been transferred to the sync queue.
    pub(crate) fn is_on_sync_queue(&self, node: NodeRef) -> bool {
        let Some(n) = self.arena.resolve(node) else {
            // Retired means it went through head turnover on the sync queue.
            return true;
        };
        if n.status() == node::CONDITION || n.prev_ref().is_none() {
            return false;
        }
        if !n.next_ref().is_none() {
            return true;
        }
        self.find_node_from_tail(node)
    }

    /// Validated backward search for `node`; restarts on retirement races.
    fn find_node_from_tail(&self, node: NodeRef) -> bool {
        'restart: loop {
            let mut cur = self.tail();
            while !cur.is_none() {
                if cur == node {
                    return true;
                }
                let Some(c) = self.arena.resolve(cur) else {
                    continue 'restart;
                };
                let prev = c.prev_ref();
                if !self.arena.is_live(cur) {
                    continue 'restart;
                }
                cur = prev;
            }
            return false;
        }
    }

    // ── introspection ──

    /// Whether any thread is, or recently was, queued behind the head.
    pub(crate) fn has_queued_threads(&self) -> bool {
        let h = self.head();
        !h.is_none() && h != self.tail()
    }

    /// Count of queued waiter nodes; a racy snapshot.
    pub(crate) fn queue_length(&self) -> usize {
        self.fold_from_tail(0usize, |acc, n| {
            if n.waiter_handle().is_some() {
                acc + 1
            } else {
                acc
            }
        })
    }

    /// Parker of the longest-waiting queued thread, if any.
    pub(crate) fn first_queued_thread(&self) -> Option<ParkHandle> {
        // Fast path via the head's next hint.
        let h = self.head();
        if h.is_none() || h == self.tail() {
            return None;
        }
        if let Some(hn) = self.arena.resolve(h) {
            if let Some(s) = self.arena.resolve(hn.next_ref()) {
                if let Some(handle) = s.waiter_handle() {
                    return Some(handle);
                }
            }
        }
        // Hint unreliable; take the frontmost waiter from a backward scan.
        self.fold_from_tail(None, |acc, n| n.waiter_handle().or(acc))
    }

    /// Whether `handle`'s thread currently occupies a queued node.
    pub(crate) fn is_queued(&self, handle: &ParkHandle) -> bool {
        self.fold_from_tail(false, |acc, n| {
            acc || n.waiter_handle().is_some_and(|w| w.same(handle))
        })
    }

    /// Whether some other thread is queued ahead of the caller. The
    /// fairness primitive: an acquire hook that consults this yields to
    /// earlier arrivals.
    pub(crate) fn has_queued_predecessors(&self, handle: &ParkHandle) -> bool {
        let t = self.tail();
        let h = self.head();
        if h.is_none() || h == t {
            return false;
        }
        if let Some(hn) = self.arena.resolve(h) {
            let s = hn.next_ref();
            if let Some(sn) = self.arena.resolve(s) {
                return match sn.waiter_handle() {
                    Some(w) => !w.same(handle),
                    None => true,
                };
            }
        }
        // Head turned over or the hint is missing; be conservative.
        true
    }

    /// Whether the frontmost waiter, if any, wants exclusive access.
    pub(crate) fn apparently_first_queued_is_exclusive(&self) -> bool {
        let h = self.head();
        let Some(hn) = self.arena.resolve(h) else {
            return false;
        };
        let Some(s) = self.arena.resolve(hn.next_ref()) else {
            return false;
        };
        s.node_mode() == NodeMode::Exclusive && s.waiter_handle().is_some()
    }

    /// Validated tail-to-head fold over queued nodes (head excluded).
    fn fold_from_tail<T: Clone>(&self, init: T, f: impl Fn(T, &WaitNode) -> T) -> T {
        'restart: loop {
            let head = self.head();
            let mut acc = init.clone();
            let mut cur = self.tail();
            while !cur.is_none() && cur != head {
                let Some(c) = self.arena.resolve(cur) else {
                    continue 'restart;
                };
                let next_acc = f(acc.clone(), c);
                let prev = c.prev_ref();
                if !self.arena.is_live(cur) {
                    continue 'restart;
                }
                acc = next_acc;
                cur = prev;
            }
            return acc;
        }
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    fn init_test(name: &str) {
        crate::test_utils::init_test_logging();
        crate::test_phase!(name);
    }

    fn push(q: &SyncQueue) -> NodeRef {
        q.add_waiter(NodeMode::Exclusive, ParkHandle::new())
    }

    #[test]
    fn first_enqueue_installs_sentinel() {
        init_test("first_enqueue_installs_sentinel");
        let q = SyncQueue::new();
        assert!(q.head().is_none());
        let a = push(&q);
        let head = q.head();
        crate::assert_with_log!(!head.is_none(), "sentinel installed", true, !head.is_none());
        crate::assert_with_log!(q.tail() == a, "tail is new node", true, q.tail() == a);
        assert_eq!(q.owned(a).prev_ref(), head);
        assert_eq!(q.owned(head).next_ref(), a);
        crate::test_complete!("first_enqueue_installs_sentinel");
    }

    #[test]
    fn fifo_link_order() {
        init_test("fifo_link_order");
        let q = SyncQueue::new();
        let a = push(&q);
        let b = push(&q);
        let c = push(&q);
        assert_eq!(q.owned(b).prev_ref(), a);
        assert_eq!(q.owned(c).prev_ref(), b);
        assert_eq!(q.owned(a).next_ref(), b);
        assert_eq!(q.owned(b).next_ref(), c);
        crate::assert_with_log!(q.queue_length() == 3, "three waiters", 3, q.queue_length());
        crate::test_complete!("fifo_link_order");
    }

    #[test]
    fn set_head_retires_old_head() {
        init_test("set_head_retires_old_head");
        let q = SyncQueue::new();
        let a = push(&q);
        let old = q.head();
        q.set_head(a);
        crate::assert_with_log!(q.head() == a, "new head", true, q.head() == a);
        assert!(q.arena().resolve(old).is_none(), "old head retired");
        assert!(q.owned(a).waiter_handle().is_none(), "head carries no waiter");
        assert!(q.owned(a).prev_ref().is_none());
        crate::assert_with_log!(
            q.arena().live_count() == 1,
            "only head live",
            1,
            q.arena().live_count()
        );
        crate::test_complete!("set_head_retires_old_head");
    }

    #[test]
    fn cancel_tail_unlinks_and_retires() {
        init_test("cancel_tail_unlinks_and_retires");
        let q = SyncQueue::new();
        let a = push(&q);
        let b = push(&q);
        q.cancel_acquire(b);
        crate::assert_with_log!(q.tail() == a, "tail rolled back", true, q.tail() == a);
        assert!(q.arena().resolve(b).is_none(), "cancelled tail retired");
        assert!(q.owned(a).next_ref().is_none(), "hint cleared");
        crate::test_complete!("cancel_tail_unlinks_and_retires");
    }

    #[test]
    fn cancel_interior_leaves_node_for_successor() {
        init_test("cancel_interior_leaves_node_for_successor");
        let q = SyncQueue::new();
        let a = push(&q);
        q.owned(a).set_status(crate::node::SIGNAL);
        let b = push(&q);
        let c = push(&q);
        q.cancel_acquire(b);
        // Interior cancel: node stays until the successor walks past it.
        assert_eq!(q.owned(b).status(), crate::node::CANCELLED);
        assert_eq!(q.owned(a).next_ref(), c, "hint spliced around cancelled node");
        // Successor's park check rewrites prev, retires the run, and asks
        // for one more acquire retry before parking.
        let should = q.should_park_after_failed_acquire(c);
        crate::assert_with_log!(!should, "retry after repair", false, should);
        assert_eq!(q.owned(c).prev_ref(), a);
        assert!(q.arena().resolve(b).is_none(), "run retired by successor");
        assert!(q.should_park_after_failed_acquire(c), "promise already present");
        crate::test_complete!("cancel_interior_leaves_node_for_successor");
    }

    #[test]
    fn overlapping_cancel_walks_converge_despite_recycling() {
        init_test("overlapping_cancel_walks_converge_despite_recycling");
        // Two threads repair past the same cancelled run while the freed
        // slots get recycled under them. Both walks must revalidate
        // generations, retire the run at most once, and end with the live
        // survivor linked straight to the live base.
        for _ in 0..100 {
            let q = SyncQueue::new();
            let a = push(&q);
            q.owned(a).set_status(crate::node::SIGNAL);
            let b = push(&q);
            let c = push(&q);
            let d = push(&q);
            let e = push(&q);
            q.owned(b).set_status(crate::node::CANCELLED);
            q.owned(c).set_status(crate::node::CANCELLED);
            std::thread::scope(|s| {
                s.spawn(|| {
                    q.cancel_acquire(d);
                    // Recycle the freed slots while the other walk may
                    // still hold refs to their old generations.
                    for _ in 0..3 {
                        let _ = q.alloc_condition_node(ParkHandle::new());
                    }
                });
                s.spawn(|| {
                    for _ in 0..100_000 {
                        let _ = q.should_park_after_failed_acquire(e);
                        if q.owned(e).prev_ref() == a {
                            return;
                        }
                        std::hint::spin_loop();
                    }
                    panic!("prev repair never converged");
                });
            });
            assert_eq!(q.owned(e).prev_ref(), a);
            assert!(q.arena().resolve(b).is_none(), "run node retired");
            assert!(q.arena().resolve(c).is_none(), "run node retired");
            assert!(q.arena().resolve(d).is_none(), "cancelled node retired");
        }
        crate::test_complete!("overlapping_cancel_walks_converge_despite_recycling");
    }

    #[test]
    fn should_park_requires_signal_promise() {
        init_test("should_park_requires_signal_promise");
        let q = SyncQueue::new();
        let a = push(&q);
        // First call repairs status and asks for a retry.
        assert!(!q.should_park_after_failed_acquire(a));
        assert_eq!(q.owned(q.head()).status(), crate::node::SIGNAL);
        // Second call sees the promise.
        assert!(q.should_park_after_failed_acquire(a));
        crate::test_complete!("should_park_requires_signal_promise");
    }

    #[test]
    fn unpark_successor_wakes_front_waiter() {
        init_test("unpark_successor_wakes_front_waiter");
        let q = SyncQueue::new();
        let handle = ParkHandle::new();
        let a = q.add_waiter(NodeMode::Exclusive, handle.clone());
        let head = q.head();
        q.owned(head).set_status(crate::node::SIGNAL);
        q.unpark_successor(head);
        assert_eq!(q.owned(head).status(), 0, "signal consumed");
        // The pending token makes the next park return immediately.
        handle.park();
        let _ = a;
        crate::test_complete!("unpark_successor_wakes_front_waiter");
    }

    #[test]
    fn unpark_successor_skips_cancelled_front() {
        init_test("unpark_successor_skips_cancelled_front");
        let q = SyncQueue::new();
        let a = push(&q);
        let live = ParkHandle::new();
        let b = q.add_waiter(NodeMode::Exclusive, live.clone());
        q.owned(a).set_status(crate::node::CANCELLED);
        q.unpark_successor(q.head());
        live.park();
        let _ = b;
        crate::test_complete!("unpark_successor_skips_cancelled_front");
    }

    #[test]
    fn introspection_reports_queue_shape() {
        init_test("introspection_reports_queue_shape");
        let q = SyncQueue::new();
        assert!(!q.has_queued_threads());
        let me = ParkHandle::new();
        let other = ParkHandle::new();
        let a = q.add_waiter(NodeMode::Exclusive, other.clone());
        assert!(q.has_queued_threads());
        assert!(q.is_queued(&other));
        assert!(!q.is_queued(&me));
        assert!(q.has_queued_predecessors(&me));
        assert!(!q.has_queued_predecessors(&other));
        assert!(q.apparently_first_queued_is_exclusive());
        let first = q.first_queued_thread().expect("one waiter");
        crate::assert_with_log!(first.same(&other), "front waiter", true, first.same(&other));
        let _ = a;
        crate::test_complete!("introspection_reports_queue_shape");
    }

    #[test]
    fn shared_front_is_not_exclusive() {
        init_test("shared_front_is_not_exclusive");
        let q = SyncQueue::new();
        let _a = q.add_waiter(NodeMode::Shared, ParkHandle::new());
        assert!(!q.apparently_first_queued_is_exclusive());
        crate::test_complete!("shared_front_is_not_exclusive");
    }

    #[test]
    fn condition_node_not_on_sync_queue_until_enqueued() {
        init_test("condition_node_not_on_sync_queue_until_enqueued");
        let q = SyncQueue::new();
        let n = q.alloc_condition_node(ParkHandle::new());
        assert!(!q.is_on_sync_queue(n));
        q.owned(n).set_status(0);
        q.enq(n);
        assert!(q.is_on_sync_queue(n));
        crate::test_complete!("condition_node_not_on_sync_queue_until_enqueued");
    }
}
