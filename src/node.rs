//! Wait-queue node representation.
//!
//! A [`WaitNode`] is one blocked acquirer: intrusive prev/next links inside
//! the sync queue, a wait-status tag, and the [`ParkHandle`] of the thread
//! it represents. Nodes live in slots owned by the
//! [`WaitArena`](crate::arena::WaitArena) and are addressed by [`NodeRef`]
//! handles that carry the slot's generation counter, so a handle to a
//! retired node resolves to nothing instead of to whatever reused the slot.

use crate::park::ParkHandle;
use crate::shim::{AtomicI32, AtomicU32, AtomicU64, AtomicU8, Mutex, Ordering};
use core::fmt;

/// Node was cancelled by timeout or interrupt. Terminal: a node never leaves
/// this status.
pub const CANCELLED: i32 = 1;
/// The node's successor is (or is about to be) parked; a release must wake it.
pub const SIGNAL: i32 = -1;
/// The node sits on a condition queue, not the sync queue.
pub const CONDITION: i32 = -2;
/// Shared mode only: the next release must keep propagating wakeups even if
/// another thread raced ahead.
pub const PROPAGATE: i32 = -3;

/// Whether the node waits for an exclusive or a shared acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeMode {
    /// Exclusive acquire.
    Exclusive,
    /// Shared acquire.
    Shared,
}

impl NodeMode {
    const fn as_u8(self) -> u8 {
        match self {
            Self::Exclusive => 0,
            Self::Shared => 1,
        }
    }

    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Exclusive,
            _ => Self::Shared,
        }
    }
}

/// Packed handle to an arena slot: generation in the high 32 bits, slot
/// index plus one in the low 32 bits, so the all-zero value means "none".
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef(u64);

impl NodeRef {
    /// The absent reference.
    pub const NONE: Self = Self(0);

    pub(crate) const fn pack(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | (index as u64 + 1))
    }

    pub(crate) const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub(crate) const fn raw(self) -> u64 {
        self.0
    }

    /// True if this is the absent reference.
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Slot index. Meaningless for [`NodeRef::NONE`].
    #[must_use]
    pub const fn index(self) -> u32 {
        (self.0 as u32).wrapping_sub(1)
    }

    /// Generation the slot had when this handle was issued.
    #[must_use]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "NodeRef(none)")
        } else {
            write!(f, "NodeRef({}:{})", self.index(), self.generation())
        }
    }
}

/// One intrusive wait-queue element.
///
/// Every field is atomic (or an uncontended mutex for the parker) because a
/// slot may be read through a stale [`NodeRef`] after it has been retired
/// and reused; such reads are logically rejected by the generation check and
/// are harmless to the slot's new occupant.
#[derive(Debug)]
pub struct WaitNode {
    /// One of [`CANCELLED`], [`SIGNAL`], [`CONDITION`], [`PROPAGATE`] or 0.
    pub(crate) status: AtomicI32,
    /// Predecessor in the sync queue. Reliable once published.
    pub(crate) prev: AtomicU64,
    /// Successor hint; may lag behind `prev` and is reconstructed by
    /// backward traversal from the tail when needed.
    pub(crate) next: AtomicU64,
    /// Link within a condition queue; unused while on the sync queue.
    pub(crate) next_waiter: AtomicU64,
    /// Exclusive or shared, fixed at admission.
    pub(crate) mode: AtomicU8,
    /// Slot generation, owned by the arena; bumped on retire.
    pub(crate) generation: AtomicU32,
    /// Parker of the blocked thread; cleared when the node leaves a queue.
    pub(crate) waiter: Mutex<Option<ParkHandle>>,
}

impl WaitNode {
    pub(crate) fn new_slot() -> Self {
        Self {
            status: AtomicI32::new(0),
            prev: AtomicU64::new(NodeRef::NONE.raw()),
            next: AtomicU64::new(NodeRef::NONE.raw()),
            next_waiter: AtomicU64::new(NodeRef::NONE.raw()),
            mode: AtomicU8::new(NodeMode::Exclusive.as_u8()),
            generation: AtomicU32::new(0),
            waiter: Mutex::new(None),
        }
    }

    pub(crate) fn status(&self) -> i32 {
        self.status.load(Ordering::Acquire)
    }

    pub(crate) fn set_status(&self, status: i32) {
        self.status.store(status, Ordering::Release);
    }

    pub(crate) fn cas_status(&self, expected: i32, new: i32) -> bool {
        self.status
            .compare_exchange(expected, new, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn prev_ref(&self) -> NodeRef {
        NodeRef::from_raw(self.prev.load(Ordering::Acquire))
    }

    pub(crate) fn set_prev(&self, prev: NodeRef) {
        self.prev.store(prev.raw(), Ordering::Release);
    }

    pub(crate) fn next_ref(&self) -> NodeRef {
        NodeRef::from_raw(self.next.load(Ordering::Acquire))
    }

    pub(crate) fn set_next(&self, next: NodeRef) {
        self.next.store(next.raw(), Ordering::Release);
    }

    pub(crate) fn cas_next(&self, expected: NodeRef, new: NodeRef) -> bool {
        self.next
            .compare_exchange(expected.raw(), new.raw(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn next_waiter_ref(&self) -> NodeRef {
        NodeRef::from_raw(self.next_waiter.load(Ordering::Acquire))
    }

    pub(crate) fn set_next_waiter(&self, next: NodeRef) {
        self.next_waiter.store(next.raw(), Ordering::Release);
    }

    pub(crate) fn node_mode(&self) -> NodeMode {
        NodeMode::from_u8(self.mode.load(Ordering::Acquire))
    }

    pub(crate) fn set_mode(&self, mode: NodeMode) {
        self.mode.store(mode.as_u8(), Ordering::Release);
    }

    pub(crate) fn waiter_handle(&self) -> Option<ParkHandle> {
        self.waiter.lock().clone()
    }

    pub(crate) fn set_waiter(&self, handle: Option<ParkHandle>) {
        *self.waiter.lock() = handle;
    }

    pub(crate) fn unpark_waiter(&self) {
        if let Some(handle) = self.waiter_handle() {
            handle.unpark();
        }
    }
}
