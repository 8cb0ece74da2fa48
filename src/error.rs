//! Error types and error handling strategy for the synchronizer engine.
//!
//! Error handling follows these principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - Timing out is an expected outcome, not an error: timed operations
//!   return `Ok(false)` on deadline instead of an `Err`
//! - Hook failures are never caught by the engine; they propagate after the
//!   engine's queue cleanup (node cancellation) has run
//!
//! # Error Categories
//!
//! - **Interrupted**: an external interrupt signal was observed during an
//!   interruptible wait. Uninterruptible variants swallow the signal during
//!   the wait and re-assert it on exit, so it is never silently lost.
//! - **IllegalState**: programmer error: calling `release`, `wait` or
//!   `signal` without holding the resource (or not holding it exclusively
//!   for condition operations). Fatal to the calling operation.
//! - **UnsupportedMode**: calling a shared operation on a core whose hooks
//!   only implement exclusive mode, or vice versa. Detected at first use.

use core::fmt;

/// The kind of synchronizer error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncErrorKind {
    /// An interrupt signal was delivered while waiting.
    Interrupted,
    /// Operation performed without holding the resource appropriately.
    IllegalState,
    /// The hook set does not implement the requested mode.
    UnsupportedMode,
}

impl SyncErrorKind {
    /// Returns a short static name for the kind.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Interrupted => "interrupted",
            Self::IllegalState => "illegal state",
            Self::UnsupportedMode => "unsupported mode",
        }
    }
}

impl fmt::Display for SyncErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An error surfaced by a synchronizer operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncError {
    kind: SyncErrorKind,
    context: &'static str,
}

impl SyncError {
    /// Creates an error with the given kind and context.
    #[must_use]
    pub const fn new(kind: SyncErrorKind, context: &'static str) -> Self {
        Self { kind, context }
    }

    /// An interrupt observed during an interruptible wait.
    #[must_use]
    pub const fn interrupted(context: &'static str) -> Self {
        Self::new(SyncErrorKind::Interrupted, context)
    }

    /// A release/wait/signal performed without the required hold.
    #[must_use]
    pub const fn illegal_state(context: &'static str) -> Self {
        Self::new(SyncErrorKind::IllegalState, context)
    }

    /// A hook invoked in a mode its implementor does not support.
    #[must_use]
    pub const fn unsupported(context: &'static str) -> Self {
        Self::new(SyncErrorKind::UnsupportedMode, context)
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> SyncErrorKind {
        self.kind
    }

    /// Returns the static context string attached at creation.
    #[must_use]
    pub const fn context(&self) -> &'static str {
        self.context
    }

    /// True if this error is an interrupt.
    #[must_use]
    pub const fn is_interrupted(&self) -> bool {
        matches!(self.kind, SyncErrorKind::Interrupted)
    }

    /// True if this error is a programmer-error illegal state.
    #[must_use]
    pub const fn is_illegal_state(&self) -> bool {
        matches!(self.kind, SyncErrorKind::IllegalState)
    }

    /// True if this error reports an unimplemented hook mode.
    #[must_use]
    pub const fn is_unsupported(&self) -> bool {
        matches!(self.kind, SyncErrorKind::UnsupportedMode)
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.context)
    }
}

impl std::error::Error for SyncError {}
