//! Scheduler Capability
//!
//! What the lifecycle code needs from the thread scheduler, and nothing
//! more: start a new schedulable unit, block the calling unit until a
//! condition holds, and nudge a unit whose condition may have changed.

use alloc::sync::Arc;

use super::{Pid, Process};
use crate::exception::TrapFrame;

/// Why a new schedulable unit could not be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnError {
    /// No memory for a thread control block or kernel stack.
    OutOfMemory,
    /// The scheduler refuses new units (shutting down, limit reached).
    Refused,
}

impl core::fmt::Display for SpawnError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::OutOfMemory => write!(f, "out of memory for a new thread"),
            Self::Refused => write!(f, "scheduler refused a new thread"),
        }
    }
}

/// Thread scheduler operations used by the lifecycle code.
pub trait Scheduler: Send + Sync {
    /// Create a unit that runs `process` and enters user mode with `frame`
    /// when first scheduled. On error nothing has been made runnable.
    fn spawn(&self, process: Arc<Process>, frame: TrapFrame) -> Result<(), SpawnError>;

    /// Block the calling unit until `ready` returns true.
    ///
    /// `ready` is re-evaluated after every [`wake`](Self::wake) aimed at the
    /// caller, and must be cheap and non-blocking.
    fn block_until(&self, ready: &dyn Fn() -> bool);

    /// Signal that a condition the unit running `pid` may be blocked on has
    /// changed.
    fn wake(&self, pid: Pid);
}
