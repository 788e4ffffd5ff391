//! File Descriptor Table
//!
//! A per-process map from small integer handles to open files.
//!
//! # Design
//! - Ordered map keyed by descriptor number, owned by the process record
//! - Numbers come from a counter that starts at [`FIRST_FD`] and never
//!   decreases, so a closed number is never handed out again
//! - Descriptors 0 and 1 are the console and never appear as entries

use alloc::boxed::Box;
use alloc::collections::BTreeMap;

use crate::fs::OpenFile;

/// Console input.
pub const STDIN: Fd = Fd(0);
/// Console output.
pub const STDOUT: Fd = Fd(1);
/// First number handed out by `open`.
pub const FIRST_FD: Fd = Fd(2);
/// Most entries one process may hold open at once.
pub const MAX_OPEN_FILES: usize = 128;

/// A file descriptor number as seen by user code.
///
/// This is a newtype to keep raw argument words from being used as
/// descriptors without going through a table lookup.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[repr(transparent)]
pub struct Fd(i32);

impl Fd {
    /// Wrap a raw descriptor number.
    #[inline]
    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    /// Get the raw value.
    #[inline]
    pub const fn raw(self) -> i32 {
        self.0
    }

    /// 0 or 1: handled by the console, never by the table.
    #[inline]
    pub const fn is_console(self) -> bool {
        self.0 == STDIN.0 || self.0 == STDOUT.0
    }
}

/// Error type for descriptor table operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdError {
    /// The process already holds `MAX_OPEN_FILES` entries.
    TableFull,
    /// The descriptor counter cannot advance any further.
    Exhausted,
    /// Duplicating an open file during fork failed.
    DuplicateFailed,
}

impl core::fmt::Display for FdError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::TableFull => write!(f, "too many open files"),
            Self::Exhausted => write!(f, "descriptor numbers exhausted"),
            Self::DuplicateFailed => write!(f, "could not duplicate open file"),
        }
    }
}

/// Descriptor table for one process.
pub struct FdTable {
    /// Open entries. Each box is the sole owner of its file.
    entries: BTreeMap<Fd, Box<dyn OpenFile>>,
    /// Next number to hand out.
    next: Fd,
}

impl FdTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            next: FIRST_FD,
        }
    }

    /// Install `file` under a fresh descriptor.
    ///
    /// On failure the file is dropped (closed) and the counter is left
    /// untouched, so the next successful open gets the same number it
    /// would have gotten anyway.
    pub fn open(&mut self, file: Box<dyn OpenFile>) -> Result<Fd, FdError> {
        if self.entries.len() >= MAX_OPEN_FILES {
            return Err(FdError::TableFull);
        }
        let fd = self.next;
        let next = fd.0.checked_add(1).ok_or(FdError::Exhausted)?;
        self.entries.insert(fd, file);
        self.next = Fd(next);
        Ok(fd)
    }

    /// Look up an open file. Console numbers and unknown numbers give `None`.
    #[inline]
    pub fn lookup(&mut self, fd: Fd) -> Option<&mut (dyn OpenFile + 'static)> {
        if fd.is_console() {
            return None;
        }
        self.entries.get_mut(&fd).map(|file| file.as_mut())
    }

    /// Close `fd`. Unknown and console descriptors are ignored.
    ///
    /// Returns whether an entry was actually closed.
    pub fn close(&mut self, fd: Fd) -> bool {
        if fd.is_console() {
            return false;
        }
        // Dropping the box closes the file.
        self.entries.remove(&fd).is_some()
    }

    /// Close every entry. Safe to call repeatedly.
    pub fn close_all(&mut self) {
        self.entries.clear();
    }

    /// Build the child's table for fork.
    ///
    /// Every entry gets a freshly duplicated handle under the same number,
    /// so the child's cursors and closes never affect the parent. If any
    /// duplication fails, the handles duplicated so far are closed again.
    pub fn duplicate_for_fork(&self) -> Result<FdTable, FdError> {
        let mut entries = BTreeMap::new();
        for (&fd, file) in &self.entries {
            let copy = file.duplicate().ok_or(FdError::DuplicateFailed)?;
            entries.insert(fd, copy);
        }
        Ok(FdTable {
            entries,
            next: self.next,
        })
    }

    /// Number of open entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The number the next successful `open` will return.
    pub fn peek_next(&self) -> Fd {
        self.next
    }
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for FdTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FdTable")
            .field("open", &self.entries.keys().collect::<alloc::vec::Vec<_>>())
            .field("next", &self.next)
            .finish()
    }
}
