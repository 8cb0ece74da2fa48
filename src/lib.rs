//! Generic FIFO blocking-synchronizer framework.
//!
//! `parkqueue` is the machinery that blocking synchronization primitives
//! (mutexes, semaphores, latches, read/write locks) have in common: one
//! atomic state word plus a lock-free FIFO queue of parked threads. A
//! concrete primitive supplies only the hook predicates that define *its*
//! acquire/release semantics; the engine supplies queuing, parking,
//! cancellation, timeout and condition-variable wait/transfer.
//!
//! # Architecture
//!
//! - [`park::ParkHandle`]: per-thread suspend/resume capability with an
//!   interrupt flag and deadline parks.
//! - [`arena::WaitArena`]: generational arena that owns wait-node storage;
//!   nodes are addressed by ABA-safe packed handles ([`node::NodeRef`]).
//! - `SyncQueue` (internal): CLH-variant lock-free FIFO of blocked
//!   acquirers with cancellation unsplicing.
//! - [`engine::SynchronizerCore`]: the acquire/release protocol in
//!   exclusive and shared mode, each in uninterruptible, interruptible and
//!   timed flavors, driven by a caller-supplied [`engine::Synchronizer`]
//!   hook set.
//! - [`condition::Condition`]: per-condition wait queue integrated with the
//!   sync queue via atomic status transfer.
//!
//! # Fairness
//!
//! Admission into the wait queue is FIFO; *granting* is not. A fresh caller
//! may barge past queued waiters because the hook fast path runs before
//! enqueueing. Hooks that want strict fairness consult
//! [`engine::SynchronizerCore::has_queued_predecessors`] before granting.
//!
//! # Example
//!
//! ```
//! use parkqueue::{StateCell, SyncError, Synchronizer, SynchronizerCore};
//!
//! /// A non-reentrant binary lock: state 0 = free, 1 = held.
//! struct Binary;
//!
//! impl Synchronizer for Binary {
//!     fn try_acquire(&self, state: &StateCell, _arg: i64) -> Result<bool, SyncError> {
//!         Ok(state.compare_and_set(0, 1))
//!     }
//!     fn try_release(&self, state: &StateCell, _arg: i64) -> Result<bool, SyncError> {
//!         state.set(0);
//!         Ok(true)
//!     }
//!     fn is_held_exclusively(&self, state: &StateCell) -> Result<bool, SyncError> {
//!         Ok(state.get() == 1)
//!     }
//! }
//!
//! let lock = SynchronizerCore::new(Binary);
//! lock.acquire(1).unwrap();
//! assert!(!lock.state().compare_and_set(0, 1));
//! lock.release(1).unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod arena;
pub mod condition;
pub mod engine;
pub mod error;
pub mod node;
pub mod park;
pub(crate) mod queue;
pub(crate) mod shim;
#[cfg(test)]
pub(crate) mod test_utils;

pub use condition::Condition;
pub use engine::{StateCell, Synchronizer, SynchronizerCore};
pub use error::{SyncError, SyncErrorKind};
pub use park::ParkHandle;

// Macro support; keeps the logging macros usable from crates that do not
// themselves depend on tracing.
#[doc(hidden)]
pub use tracing as __tracing;

/// Phase tracking macro for structured test logging.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        $crate::__tracing::info!(test = $name, "=== TEST START ===");
    };
}

/// Completion marker for structured test logging.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        $crate::__tracing::info!(test = $name, "=== TEST COMPLETE ===");
    };
}

/// Assertion with logging for better test output.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr) => {
        if !$cond {
            $crate::__tracing::error!(
                message = $msg,
                expected = ?$expected,
                actual = ?$actual,
                "Assertion failed"
            );
        }
        assert!($cond, "{}: expected {:?}, got {:?}", $msg, $expected, $actual);
    };
}
