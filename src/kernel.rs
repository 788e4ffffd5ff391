//! The syscall layer's view of the kernel
//!
//! [`Kernel`] bundles the collaborators the syscall layer depends on. It is
//! built once by the embedding kernel and passed by reference into every
//! trap, together with the trapping process and its saved frame. Nothing in
//! this crate reaches for a global "current thread".

use alloc::sync::Arc;
use core::sync::atomic::{AtomicI32, Ordering};

use log::warn;

use crate::drivers::Console;
use crate::exception::{TrapFrame, UserFault};
use crate::fs::FileSystem;
use crate::process::{ExitReason, Loader, Pid, Process, Scheduler};
use crate::syscall::Flow;

/// First pid handed out.
const FIRST_PID: i32 = 1;

/// Collaborators plus the kernel-wide pid counter.
pub struct Kernel {
    pub(crate) fs: Arc<dyn FileSystem>,
    pub(crate) console: Arc<dyn Console>,
    pub(crate) scheduler: Arc<dyn Scheduler>,
    pub(crate) loader: Arc<dyn Loader>,
    next_pid: AtomicI32,
}

impl Kernel {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        console: Arc<dyn Console>,
        scheduler: Arc<dyn Scheduler>,
        loader: Arc<dyn Loader>,
    ) -> Self {
        Self {
            fs,
            console,
            scheduler,
            loader,
            next_pid: AtomicI32::new(FIRST_PID),
        }
    }

    pub(crate) fn allocate_pid(&self) -> Pid {
        Pid::new(self.next_pid.fetch_add(1, Ordering::Relaxed))
    }

    /// Entry for user-mode exceptions other than `syscall` (page faults on
    /// bad addresses, invalid opcodes, ...). The process is terminated with
    /// status -1.
    pub fn handle_user_fault(
        &self,
        process: &Process,
        fault: UserFault,
        frame: &TrapFrame,
    ) -> Flow {
        warn!(
            "[EXCEPTION] {} user fault {:?} at rip={:#018x}",
            process.pid(),
            fault,
            frame.rip
        );
        Flow::Exited(self.exit(process, ExitReason::Killed))
    }
}

impl core::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Kernel")
            .field("next_pid", &self.next_pid.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
