//! Generational arena for wait-queue nodes.
//!
//! # Design
//!
//! - Node slots live in fixed-size chunks that never move once created, so
//!   a resolved `&WaitNode` stays valid for the arena's lifetime and slot
//!   resolution is a lock-free atomic load.
//! - Every slot carries a generation counter bumped on retire; a
//!   [`NodeRef`] embeds the generation it was issued with, so handles to
//!   retired slots resolve to `None` instead of to the slot's new occupant
//!   (ABA safety).
//! - Retired slots are recycled through a FIFO free list, which maximizes
//!   the time between a slot's retirement and its reuse so in-flight stale
//!   handles die out first.
//!
//! Readers that traverse node links re-validate the generation after each
//! link load ([`WaitArena::is_live`]) and restart their walk when a node
//! was retired underneath them.

use crate::node::{NodeMode, NodeRef, WaitNode};
use crate::park::ParkHandle;
use crate::shim::{AtomicU32, Ordering};
use crossbeam_queue::SegQueue;
use std::sync::OnceLock;

const CHUNK_SIZE: usize = 128;
const MAX_CHUNKS: usize = 256;

/// Largest number of simultaneously live nodes one arena supports. One node
/// per blocked thread; OS thread limits bite long before this does.
pub const MAX_NODES: usize = CHUNK_SIZE * MAX_CHUNKS;

/// Concurrent slab of [`WaitNode`] slots addressed by generation-checked
/// [`NodeRef`] handles.
#[derive(Debug)]
pub struct WaitArena {
    /// Chunk table; chunks are allocated on first use and never move. The
    /// table itself is sized up front so resolution never locks.
    chunks: Box<[OnceLock<Box<[WaitNode]>>]>,
    /// FIFO recycle list of retired slot indices.
    free: SegQueue<u32>,
    /// High-water mark of slots ever handed out.
    next_fresh: AtomicU32,
    /// Currently live (allocated, not retired) slots.
    live: AtomicU32,
}

impl WaitArena {
    /// Creates an empty arena. No chunk is allocated until first use.
    #[must_use]
    pub fn new() -> Self {
        Self {
            chunks: (0..MAX_CHUNKS).map(|_| OnceLock::new()).collect(),
            free: SegQueue::new(),
            next_fresh: AtomicU32::new(0),
            live: AtomicU32::new(0),
        }
    }

    /// Number of live nodes. Diagnostic; racy by nature.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live.load(Ordering::Acquire) as usize
    }

    /// Allocates a node, returning its handle.
    ///
    /// # Panics
    ///
    /// Panics if more than [`MAX_NODES`] nodes are live at once.
    pub(crate) fn alloc(
        &self,
        mode: NodeMode,
        status: i32,
        handle: Option<ParkHandle>,
    ) -> NodeRef {
        let index = self.free.pop().unwrap_or_else(|| {
            let fresh = self.next_fresh.fetch_add(1, Ordering::Relaxed);
            assert!((fresh as usize) < MAX_NODES, "wait arena exhausted");
            fresh
        });
        let node = self.slot(index);
        let generation = node.generation.load(Ordering::Acquire);
        node.set_prev(NodeRef::NONE);
        node.set_next(NodeRef::NONE);
        node.set_next_waiter(NodeRef::NONE);
        node.set_mode(mode);
        node.set_waiter(handle);
        node.set_status(status);
        self.live.fetch_add(1, Ordering::AcqRel);
        NodeRef::pack(index, generation)
    }

    /// Resolves a handle to its node, or `None` if the slot was retired.
    pub(crate) fn resolve(&self, node: NodeRef) -> Option<&WaitNode> {
        if node.is_none() {
            return None;
        }
        let index = node.index() as usize;
        if index >= MAX_NODES {
            return None;
        }
        let chunk = self.chunks[index / CHUNK_SIZE].get()?;
        let slot = &chunk[index % CHUNK_SIZE];
        (slot.generation.load(Ordering::Acquire) == node.generation()).then_some(slot)
    }

    /// True if the handle still names a live node. Used to re-validate a
    /// link read against concurrent retirement.
    pub(crate) fn is_live(&self, node: NodeRef) -> bool {
        self.resolve(node).is_some()
    }

    /// Retires a node: invalidates outstanding handles, drops the parker,
    /// and recycles the slot. Retiring an already-retired handle is a no-op.
    pub(crate) fn retire(&self, node: NodeRef) {
        let Some(slot) = self.resolve(node) else {
            return;
        };
        let bumped = node.generation().wrapping_add(1);
        if slot
            .generation
            .compare_exchange(node.generation(), bumped, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            slot.set_waiter(None);
            self.live.fetch_sub(1, Ordering::AcqRel);
            self.free.push(node.index());
        }
    }

    fn slot(&self, index: u32) -> &WaitNode {
        let index = index as usize;
        let chunk = self.chunks[index / CHUNK_SIZE]
            .get_or_init(|| (0..CHUNK_SIZE).map(|_| WaitNode::new_slot()).collect());
        &chunk[index % CHUNK_SIZE]
    }
}

impl Default for WaitArena {
    fn default() -> Self {
        Self::new()
    }
}
