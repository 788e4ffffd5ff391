//! Filesystem Capability
//!
//! The syscall layer treats the filesystem as an opaque collaborator. It
//! only needs to create, remove and open files by name, and to drive an
//! open file through its own cursor.
//!
//! # Ownership
//! An [`OpenFile`] is owned by exactly one descriptor-table entry (or by a
//! process as its running executable). Dropping the box closes the file;
//! there is no separate close call, so a handle can only be closed once.

use alloc::boxed::Box;

/// Filesystem operations reachable from syscalls.
///
/// Implementations serialize access to shared on-disk state themselves.
pub trait FileSystem: Send + Sync {
    /// Create `name` with `initial_size` bytes. `false` if it exists or
    /// cannot be created.
    fn create(&self, name: &str, initial_size: u32) -> bool;

    /// Remove `name`. Open handles keep working until closed.
    fn remove(&self, name: &str) -> bool;

    /// Open `name`, yielding an independent handle with its own cursor.
    fn open(&self, name: &str) -> Option<Box<dyn OpenFile>>;
}

/// One open file with a private cursor.
pub trait OpenFile: Send {
    /// Read at the cursor, advancing it. Returns bytes read (0 at EOF).
    fn read(&mut self, buf: &mut [u8]) -> usize;

    /// Write at the cursor, advancing it. Returns bytes written, which may
    /// be short if the file cannot grow or writes are denied.
    fn write(&mut self, buf: &[u8]) -> usize;

    /// Move the cursor. Seeking past the end is allowed.
    fn seek(&mut self, pos: u32);

    /// Current cursor position.
    fn tell(&self) -> u32;

    /// File length in bytes.
    fn length(&self) -> u32;

    /// Reopen the same file with an independent cursor at the same
    /// position. `None` on resource exhaustion.
    fn duplicate(&self) -> Option<Box<dyn OpenFile>>;

    /// Refuse writes to the underlying file while this handle is open
    /// (running executables).
    fn deny_write(&mut self);
}
