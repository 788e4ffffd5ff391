//! Address Space Capability
//!
//! The syscall layer never walks page tables itself. It asks the process's
//! [`AddressSpace`] to translate one user page at a time and gets back the
//! kernel-visible frame plus the page's permission flags.
//!
//! [`PageMap`] is a sparse software page map implementing the capability.
//! It backs host-side tooling and the test suite; a hardware-backed kernel
//! implements [`AddressSpace`] over its own page tables.
//!
//! # Security Properties
//! - Page flags are strictly typed (`bitflags`) so permission checks cannot
//!   confuse raw bits
//! - Kernel addresses can never be mapped into a `PageMap`

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use core::cell::UnsafeCell;
use core::ptr::NonNull;

use bitflags::bitflags;

use super::address::{pages_spanned, VirtAddr, PAGE_SIZE};

bitflags! {
    /// Permission bits of a user page (x86-64 PTE layout).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageFlags: u64 {
        /// Page is mapped.
        const PRESENT = 1 << 0;
        /// Page may be written.
        const WRITABLE = 1 << 1;
        /// Page is reachable from user mode.
        const USER = 1 << 2;

        /// Read-only user page (code, rodata).
        const USER_RO = Self::PRESENT.bits() | Self::USER.bits();
        /// Read-write user page (data, stack).
        const USER_RW = Self::USER_RO.bits() | Self::WRITABLE.bits();
    }
}

/// Result of translating one user page.
#[derive(Debug, Clone, Copy)]
pub struct Mapping {
    /// Kernel pointer to the first byte of the backing frame.
    pub frame: NonNull<u8>,
    /// Permissions of the user page.
    pub flags: PageFlags,
}

/// Error type for page mapping operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingError {
    /// The virtual address is already mapped.
    AlreadyMapped,
    /// The virtual address is not mapped.
    NotMapped,
    /// No memory left for frames.
    OutOfMemory,
    /// The address is not properly aligned.
    MisalignedAddress,
    /// Attempted to map a kernel address into a user address space.
    InvalidPermissions,
}

impl core::fmt::Display for MappingError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::AlreadyMapped => write!(f, "virtual address already mapped"),
            Self::NotMapped => write!(f, "virtual address not mapped"),
            Self::OutOfMemory => write!(f, "out of memory for frames"),
            Self::MisalignedAddress => write!(f, "address not properly aligned"),
            Self::InvalidPermissions => write!(f, "kernel address in user mapping"),
        }
    }
}

/// A process's user address space as seen by the syscall layer.
///
/// # Safety
/// Implementors guarantee that for every `Mapping` returned by
/// [`translate`](Self::translate), `frame` points to `PAGE_SIZE` bytes of
/// kernel-accessible memory that back the requested user page, and that the
/// memory stays valid for as long as the address space is borrowed and not
/// modified. The syscall layer reads and writes those bytes directly.
pub unsafe trait AddressSpace: Send {
    /// Translate the page containing `addr`, or `None` if it is unmapped.
    fn translate(&self, addr: VirtAddr) -> Option<Mapping>;

    /// Produce an independent copy of every mapping (used by fork).
    fn duplicate(&self) -> Result<Box<dyn AddressSpace>, MappingError>;
}

/// One 4 KiB frame. Interior mutability because user memory is written
/// through pointers handed out by `translate(&self)`.
struct Frame(UnsafeCell<[u8; PAGE_SIZE]>);

impl Frame {
    fn zeroed() -> Box<Self> {
        Box::new(Self(UnsafeCell::new([0; PAGE_SIZE])))
    }

    fn as_ptr(&self) -> *mut u8 {
        self.0.get().cast()
    }
}

/// Sparse software page map keyed by virtual page number.
#[derive(Default)]
pub struct PageMap {
    pages: BTreeMap<usize, (Box<Frame>, PageFlags)>,
}

impl PageMap {
    /// Create an empty address space.
    pub fn new() -> Self {
        Self::default()
    }

    /// Map one zeroed page at `page` with `flags`.
    ///
    /// `PRESENT` and `USER` are always added.
    pub fn map(&mut self, page: VirtAddr, flags: PageFlags) -> Result<(), MappingError> {
        if !page.is_aligned() {
            return Err(MappingError::MisalignedAddress);
        }
        if !page.is_user() {
            return Err(MappingError::InvalidPermissions);
        }
        if self.pages.contains_key(&page.page_number()) {
            return Err(MappingError::AlreadyMapped);
        }
        self.pages.insert(
            page.page_number(),
            (Frame::zeroed(), flags | PageFlags::USER_RO),
        );
        Ok(())
    }

    /// Map every page touched by `[start, start + len)`.
    pub fn map_range(
        &mut self,
        start: VirtAddr,
        len: usize,
        flags: PageFlags,
    ) -> Result<(), MappingError> {
        let pages = pages_spanned(start, len).ok_or(MappingError::InvalidPermissions)?;
        for page in pages {
            self.map(page, flags)?;
        }
        Ok(())
    }

    /// Remove the mapping for `page`.
    pub fn unmap(&mut self, page: VirtAddr) -> Result<(), MappingError> {
        self.pages
            .remove(&page.page_number())
            .map(|_| ())
            .ok_or(MappingError::NotMapped)
    }

    /// Number of mapped pages.
    pub fn mapped_pages(&self) -> usize {
        self.pages.len()
    }

    /// Copy bytes out of the map, ignoring user permissions (loader side).
    pub fn read_bytes(&self, addr: VirtAddr, dst: &mut [u8]) -> Result<(), MappingError> {
        let mut done = 0;
        while done < dst.len() {
            let at = addr.checked_add(done).ok_or(MappingError::NotMapped)?;
            let (frame, _) = self
                .pages
                .get(&at.page_number())
                .ok_or(MappingError::NotMapped)?;
            let n = (PAGE_SIZE - at.page_offset()).min(dst.len() - done);
            // SAFETY: offset + n stays inside the frame; `&self` excludes
            // concurrent writes through `write_bytes`.
            unsafe {
                core::ptr::copy_nonoverlapping(
                    frame.as_ptr().add(at.page_offset()),
                    dst[done..].as_mut_ptr(),
                    n,
                );
            }
            done += n;
        }
        Ok(())
    }

    /// Copy bytes into the map, ignoring user permissions (loader side).
    pub fn write_bytes(&mut self, addr: VirtAddr, src: &[u8]) -> Result<(), MappingError> {
        let mut done = 0;
        while done < src.len() {
            let at = addr.checked_add(done).ok_or(MappingError::NotMapped)?;
            let (frame, _) = self
                .pages
                .get(&at.page_number())
                .ok_or(MappingError::NotMapped)?;
            let n = (PAGE_SIZE - at.page_offset()).min(src.len() - done);
            // SAFETY: offset + n stays inside the frame; `&mut self` is exclusive.
            unsafe {
                core::ptr::copy_nonoverlapping(
                    src[done..].as_ptr(),
                    frame.as_ptr().add(at.page_offset()),
                    n,
                );
            }
            done += n;
        }
        Ok(())
    }
}

// SAFETY: every frame is a boxed PAGE_SIZE array owned by the map; boxes do
// not move while the map is borrowed.
unsafe impl AddressSpace for PageMap {
    fn translate(&self, addr: VirtAddr) -> Option<Mapping> {
        if !addr.is_user() {
            return None;
        }
        self.pages
            .get(&addr.page_number())
            .and_then(|(frame, flags)| {
                NonNull::new(frame.as_ptr()).map(|frame| Mapping { frame, flags: *flags })
            })
    }

    fn duplicate(&self) -> Result<Box<dyn AddressSpace>, MappingError> {
        let mut copy = PageMap::new();
        for (&vpn, (frame, flags)) in &self.pages {
            let fresh = Frame::zeroed();
            // SAFETY: both frames are PAGE_SIZE bytes and distinct allocations.
            unsafe {
                core::ptr::copy_nonoverlapping(frame.as_ptr(), fresh.as_ptr(), PAGE_SIZE);
            }
            copy.pages.insert(vpn, (fresh, *flags));
        }
        Ok(Box::new(copy))
    }
}

impl core::fmt::Debug for PageMap {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "PageMap({} pages)", self.pages.len())
    }
}
