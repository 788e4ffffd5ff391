//! Processes as seen from the syscall boundary
//!
//! # Design
//! - A [`Process`] record owns its descriptor table, address space and
//!   running executable; nothing else can reach them
//! - A parent only holds [`ChildHandle`]s: a pid plus the shared exit slot,
//!   never the child's resources
//! - Records are reference counted, so a zombie whose parent is gone is
//!   reclaimed as soon as the scheduler drops it
//!
//! # Lifecycle
//! ```text
//! RUNNING --exit/fault--> ZOMBIE --wait by parent--> REAPED
//!    |  \--fork--> child RUNNING
//!    \--exec--> RUNNING (same pid, new image)
//! ```

pub mod argv;
pub mod lifecycle;
pub mod loader;
pub mod record;
pub mod sched;

pub use argv::{ArgError, CommandLine};
pub use lifecycle::{ExecError, ExitReason, ForkError, InitError};
pub use loader::{LoadError, LoadedImage, Loader};
pub use record::{ChildHandle, LifeState, Process};
pub use sched::{Scheduler, SpawnError};

/// Longest process name kept, in bytes.
pub const NAME_MAX: usize = 15;

/// Most arguments one command line may carry.
pub const MAX_ARGS: usize = 64;

/// Process identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[repr(transparent)]
pub struct Pid(i32);

impl Pid {
    /// Wrap a raw process id.
    #[inline]
    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    /// Get the raw value.
    #[inline]
    pub const fn raw(self) -> i32 {
        self.0
    }
}

impl core::fmt::Display for Pid {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}
