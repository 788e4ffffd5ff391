//! Program Loader Capability
//!
//! Builds a fresh user image for `exec`. The loader owns executable-format
//! parsing and page-table construction; the syscall layer only swaps the
//! result into the process and lays out the argument stack.

use alloc::boxed::Box;

use crate::exception::TrapFrame;
use crate::fs::{FileSystem, OpenFile};
use crate::mm::AddressSpace;

/// A loaded, not yet running, program image.
pub struct LoadedImage {
    /// New address space with code, data and one stack page mapped.
    pub space: Box<dyn AddressSpace>,
    /// The executable, kept open (and write-protected) while it runs.
    pub executable: Box<dyn OpenFile>,
}

/// Why a program could not be loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadError {
    /// No file with that name.
    NotFound,
    /// The file is not a valid executable for this machine.
    BadExecutable,
    /// Not enough memory for the image.
    OutOfMemory,
}

impl core::fmt::Display for LoadError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "executable not found"),
            Self::BadExecutable => write!(f, "not a valid executable"),
            Self::OutOfMemory => write!(f, "out of memory loading image"),
        }
    }
}

/// Executable loader.
pub trait Loader: Send + Sync {
    /// Load `path` into a new address space.
    ///
    /// On success `frame.rip` holds the entry point and `frame.rsp` the top
    /// of the mapped user stack.
    fn load(
        &self,
        fs: &dyn FileSystem,
        path: &str,
        frame: &mut TrapFrame,
    ) -> Result<LoadedImage, LoadError>;
}
