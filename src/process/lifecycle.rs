//! Process Lifecycle: fork, exec, wait, exit
//!
//! # Ordering Guarantees
//! - `fork` builds the child's address space, descriptor table and register
//!   context in the parent's context before the child is made runnable, so
//!   a successful pid can be waited on immediately
//! - `wait` returns only after moving the child to REAPED under the exit
//!   slot's lock; a second wait for the same pid fails
//! - `exit` releases every resource before publishing ZOMBIE, then wakes
//!   the parent

use alloc::sync::Arc;

use log::{debug, warn};

use super::argv::{self, ArgError, CommandLine};
use super::loader::LoadError;
use super::record::{ChildHandle, Process};
use super::sched::SpawnError;
use super::Pid;
use crate::cprintln;
use crate::exception::TrapFrame;
use crate::fd::{FdError, FdTable};
use crate::kernel::Kernel;
use crate::mm::MappingError;
use crate::syscall::validate::Fault;

/// Why a process terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Voluntary `exit(status)`.
    Exited(i32),
    /// Killed by the kernel (invalid access, fault, failed exec, ...).
    /// Always reported as -1.
    Killed,
}

impl ExitReason {
    /// Status delivered to the parent.
    pub const fn status(self) -> i32 {
        match self {
            ExitReason::Exited(status) => status,
            ExitReason::Killed => -1,
        }
    }
}

/// Why fork failed. The parent is left untouched in every case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkError {
    /// The parent has no address space to copy.
    NoAddressSpace,
    /// Copying the address space failed.
    AddressSpace(MappingError),
    /// Copying the descriptor table failed.
    Files(FdError),
    /// Reopening the running executable failed.
    Executable,
    /// The scheduler could not start the child.
    Spawn(SpawnError),
}

impl core::fmt::Display for ForkError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NoAddressSpace => write!(f, "parent has no address space"),
            Self::AddressSpace(e) => write!(f, "address space copy failed: {}", e),
            Self::Files(e) => write!(f, "descriptor table copy failed: {}", e),
            Self::Executable => write!(f, "could not reopen executable"),
            Self::Spawn(e) => write!(f, "spawn failed: {}", e),
        }
    }
}

/// Why exec failed. Always fatal to the calling process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecError {
    /// Command line was not valid UTF-8.
    InvalidUtf8,
    CommandLine(ArgError),
    Load(LoadError),
    /// Arguments did not fit on the new user stack.
    ArgumentStack(Fault),
}

impl core::fmt::Display for ExecError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidUtf8 => write!(f, "command line is not UTF-8"),
            Self::CommandLine(e) => write!(f, "bad command line: {}", e),
            Self::Load(e) => write!(f, "load failed: {}", e),
            Self::ArgumentStack(e) => write!(f, "argument stack setup failed: {}", e),
        }
    }
}

/// Why the initial process could not be started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
    Exec(ExecError),
    Spawn(SpawnError),
}

impl core::fmt::Display for InitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Exec(e) => write!(f, "initial exec failed: {}", e),
            Self::Spawn(e) => write!(f, "initial spawn failed: {}", e),
        }
    }
}

impl Kernel {
    /// Duplicate `parent` into a new runnable child named `name`.
    ///
    /// `frame` is the parent's trapped context; the child resumes from a
    /// copy of it with a fork return value of 0.
    pub fn fork(&self, parent: &Process, name: &str, frame: &TrapFrame) -> Result<Pid, ForkError> {
        let space = parent
            .duplicate_space()
            .ok_or(ForkError::NoAddressSpace)?
            .map_err(ForkError::AddressSpace)?;
        let files: FdTable = parent.files().duplicate_for_fork().map_err(ForkError::Files)?;
        let executable = match parent.duplicate_executable() {
            Some(copy) => {
                let mut exe = copy.ok_or(ForkError::Executable)?;
                exe.deny_write();
                Some(exe)
            }
            None => None,
        };

        let pid = self.allocate_pid();
        let child = Arc::new(Process::new(
            pid,
            name,
            Some(parent.pid()),
            Some(space),
            files,
            executable,
        ));

        let mut child_frame = *frame;
        child_frame.set_return(0);

        // Adopt first: a child that exits before we get back here must
        // still find its slot collectable.
        parent.adopt(child.handle());
        if let Err(e) = self.scheduler.spawn(child, child_frame) {
            parent.forget_child(pid);
            return Err(ForkError::Spawn(e));
        }

        debug!("[PROCESS] {} forked child {} ({})", parent.pid(), pid, name);
        Ok(pid)
    }

    /// Replace the program image of `process` with `cmdline`.
    ///
    /// On success `frame` is the new image's entry context and the caller
    /// must not write a return value into it. Process id, descriptor table
    /// and parent/child links are preserved.
    pub fn exec(
        &self,
        process: &Process,
        cmdline: &str,
        frame: &mut TrapFrame,
    ) -> Result<(), ExecError> {
        let cmd = CommandLine::parse(cmdline).map_err(ExecError::CommandLine)?;

        let mut entry = TrapFrame::user_entry();
        let mut image = self
            .loader
            .load(&*self.fs, cmd.program(), &mut entry)
            .map_err(ExecError::Load)?;
        argv::push_arguments(&*image.space, &mut entry, &cmd)
            .map_err(ExecError::ArgumentStack)?;
        image.executable.deny_write();

        let (old_space, old_exe) =
            process.replace_image(cmd.program(), image.space, image.executable);
        drop(old_exe);
        drop(old_space);
        *frame = entry;

        debug!("[PROCESS] {} exec '{}' argc={}", process.pid(), cmd.program(), cmd.argc());
        Ok(())
    }

    /// Wait for direct child `pid` to terminate and collect its status.
    ///
    /// `None` if `pid` is not a collectable child of `process`, or if the
    /// wait was abandoned because `process` is being killed.
    pub fn wait(&self, process: &Process, pid: Pid) -> Option<i32> {
        let child = process.child(pid)?;
        self.scheduler
            .block_until(&|| child.is_terminated() || process.kill_requested());

        let status = child.reap()?;
        process.forget_child(pid);
        debug!("[PROCESS] {} reaped {} status={}", process.pid(), pid, status);
        Some(status)
    }

    /// Terminate `process`, releasing everything it owns.
    ///
    /// Idempotent: a second call does nothing and returns the status the
    /// first call recorded.
    pub fn exit(&self, process: &Process, reason: ExitReason) -> i32 {
        let status = reason.status();
        if !process.begin_exit() {
            return match process.state() {
                super::LifeState::Zombie(recorded) => recorded,
                _ => status,
            };
        }

        cprintln!(&*self.console, "{}: exit({})", process.name(), status);

        process.files().close_all();
        drop(process.take_executable());
        drop(process.take_space());
        // Orphaned children keep their own slots alive until they finish.
        drop(process.take_children());

        process.publish_exit(status);
        if let Some(parent) = process.parent() {
            self.scheduler.wake(parent);
        }

        match reason {
            ExitReason::Exited(_) => {
                debug!("[PROCESS] {} exited status={}", process.pid(), status)
            }
            ExitReason::Killed => warn!("[PROCESS] {} killed", process.pid()),
        }
        status
    }

    /// Request external termination of `process`.
    ///
    /// A blocked `wait` in that process is abandoned; the process exits
    /// with -1 when its current syscall returns.
    pub fn kill(&self, process: &Process) {
        process.request_kill();
        self.scheduler.wake(process.pid());
    }

    /// Start the first user process from `cmdline`.
    ///
    /// The process has no parent; the returned handle lets the kernel's
    /// main thread wait for it with [`wait_initd`](Self::wait_initd).
    pub fn create_initd(&self, cmdline: &str) -> Result<ChildHandle, InitError> {
        let pid = self.allocate_pid();
        let process = Process::new(pid, cmdline, None, None, FdTable::new(), None);
        let mut frame = TrapFrame::user_entry();
        self.exec(&process, cmdline, &mut frame)
            .map_err(InitError::Exec)?;

        let handle = process.handle();
        self.scheduler
            .spawn(Arc::new(process), frame)
            .map_err(InitError::Spawn)?;
        Ok(handle)
    }

    /// Block until the initial process terminates and return its status.
    pub fn wait_initd(&self, handle: &ChildHandle) -> i32 {
        self.scheduler.block_until(&|| handle.is_terminated());
        handle.reap().unwrap_or(-1)
    }
}
