//! Process Records and Exit Slots
//!
//! The exit slot is the only state shared between a parent and a child.
//! Every transition on it happens under its lock, which is what makes
//! "wait succeeds exactly once" hold under true parallelism.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, Ordering};

use spin::{Mutex, MutexGuard};

use super::{Pid, NAME_MAX};
use crate::fd::FdTable;
use crate::fs::OpenFile;
use crate::mm::{AddressSpace, MappingError};
use crate::syscall::validate::{Fault, UserMemory};

/// Where a process is in its life, as its parent sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifeState {
    Running,
    /// Terminated; status not yet collected.
    Zombie(i32),
    /// Status collected by the parent. Absorbing.
    Reaped,
}

#[derive(Debug)]
struct ExitSlot {
    state: Mutex<LifeState>,
}

/// A parent's weak view of one child: its pid and exit slot.
#[derive(Debug, Clone)]
pub struct ChildHandle {
    pid: Pid,
    slot: Arc<ExitSlot>,
}

impl ChildHandle {
    fn new(pid: Pid) -> Self {
        Self {
            pid,
            slot: Arc::new(ExitSlot {
                state: Mutex::new(LifeState::Running),
            }),
        }
    }

    #[inline]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn state(&self) -> LifeState {
        *self.slot.state.lock()
    }

    /// Zombie or reaped.
    pub fn is_terminated(&self) -> bool {
        !matches!(self.state(), LifeState::Running)
    }

    /// Collect the exit status: ZOMBIE -> REAPED.
    ///
    /// Returns `None` if the child is still running or was already reaped.
    pub fn reap(&self) -> Option<i32> {
        let mut state = self.slot.state.lock();
        match *state {
            LifeState::Zombie(status) => {
                *state = LifeState::Reaped;
                Some(status)
            }
            LifeState::Running | LifeState::Reaped => None,
        }
    }

    /// RUNNING -> ZOMBIE. Returns false if the process had already exited.
    fn publish_exit(&self, status: i32) -> bool {
        let mut state = self.slot.state.lock();
        if *state != LifeState::Running {
            return false;
        }
        *state = LifeState::Zombie(status);
        true
    }
}

/// Kernel-side record of one user process.
pub struct Process {
    pid: Pid,
    parent: Option<Pid>,
    name: Mutex<String>,
    files: Mutex<FdTable>,
    space: Mutex<Option<Box<dyn AddressSpace>>>,
    /// Running executable, write-protected while held.
    executable: Mutex<Option<Box<dyn OpenFile>>>,
    children: Mutex<BTreeMap<Pid, ChildHandle>>,
    exit: ChildHandle,
    exiting: AtomicBool,
    kill_requested: AtomicBool,
}

impl Process {
    pub(crate) fn new(
        pid: Pid,
        name: &str,
        parent: Option<Pid>,
        space: Option<Box<dyn AddressSpace>>,
        files: FdTable,
        executable: Option<Box<dyn OpenFile>>,
    ) -> Self {
        Self {
            pid,
            parent,
            name: Mutex::new(truncate_name(name)),
            files: Mutex::new(files),
            space: Mutex::new(space),
            executable: Mutex::new(executable),
            children: Mutex::new(BTreeMap::new()),
            exit: ChildHandle::new(pid),
            exiting: AtomicBool::new(false),
            kill_requested: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    #[inline]
    pub fn parent(&self) -> Option<Pid> {
        self.parent
    }

    pub fn name(&self) -> String {
        self.name.lock().clone()
    }

    /// Handle on this process's own exit slot, as its parent holds it.
    pub fn handle(&self) -> ChildHandle {
        self.exit.clone()
    }

    /// Lifecycle state (RUNNING, ZOMBIE or REAPED).
    pub fn state(&self) -> LifeState {
        self.exit.state()
    }

    /// Lock the descriptor table.
    pub fn files(&self) -> MutexGuard<'_, FdTable> {
        self.files.lock()
    }

    /// Whether `pid` is a direct child whose status is still collectable.
    pub fn has_child(&self, pid: Pid) -> bool {
        self.children.lock().contains_key(&pid)
    }

    /// Run `f` against this process's user memory.
    ///
    /// The address space stays locked for the duration of `f`.
    pub fn with_memory<R>(
        &self,
        f: impl FnOnce(&UserMemory<'_>) -> Result<R, Fault>,
    ) -> Result<R, Fault> {
        let guard = self.space.lock();
        let space = guard.as_deref().ok_or(Fault::NoAddressSpace)?;
        f(&UserMemory::new(space))
    }

    /// Ask the process to terminate at its next return to user mode.
    pub fn request_kill(&self) {
        self.kill_requested.store(true, Ordering::Release);
    }

    pub fn kill_requested(&self) -> bool {
        self.kill_requested.load(Ordering::Acquire)
    }

    /// Whether `exit` has started for this process.
    pub fn is_exiting(&self) -> bool {
        self.exiting.load(Ordering::Acquire)
    }

    pub(crate) fn begin_exit(&self) -> bool {
        !self.exiting.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn publish_exit(&self, status: i32) -> bool {
        self.exit.publish_exit(status)
    }

    pub(crate) fn duplicate_space(&self) -> Option<Result<Box<dyn AddressSpace>, MappingError>> {
        self.space.lock().as_ref().map(|space| space.duplicate())
    }

    pub(crate) fn duplicate_executable(&self) -> Option<Option<Box<dyn OpenFile>>> {
        self.executable.lock().as_ref().map(|exe| exe.duplicate())
    }

    /// Install a new program image, returning the previous one so the
    /// caller can drop it outside the locks.
    pub(crate) fn replace_image(
        &self,
        name: &str,
        space: Box<dyn AddressSpace>,
        executable: Box<dyn OpenFile>,
    ) -> (Option<Box<dyn AddressSpace>>, Option<Box<dyn OpenFile>>) {
        *self.name.lock() = truncate_name(name);
        let old_space = self.space.lock().replace(space);
        let old_exe = self.executable.lock().replace(executable);
        (old_space, old_exe)
    }

    pub(crate) fn take_space(&self) -> Option<Box<dyn AddressSpace>> {
        self.space.lock().take()
    }

    pub(crate) fn take_executable(&self) -> Option<Box<dyn OpenFile>> {
        self.executable.lock().take()
    }

    pub(crate) fn adopt(&self, child: ChildHandle) {
        self.children.lock().insert(child.pid(), child);
    }

    pub(crate) fn child(&self, pid: Pid) -> Option<ChildHandle> {
        self.children.lock().get(&pid).cloned()
    }

    pub(crate) fn forget_child(&self, pid: Pid) -> Option<ChildHandle> {
        self.children.lock().remove(&pid)
    }

    pub(crate) fn take_children(&self) -> BTreeMap<Pid, ChildHandle> {
        core::mem::take(&mut *self.children.lock())
    }
}

impl core::fmt::Debug for Process {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("parent", &self.parent)
            .field("name", &*self.name.lock())
            .field("state", &self.state())
            .finish()
    }
}

/// Cut a name to `NAME_MAX` bytes without splitting a character.
pub fn truncate_name(name: &str) -> String {
    let mut end = name.len().min(NAME_MAX);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    String::from(&name[..end])
}
