//! User Virtual Address Types
//!
//! Type-safe wrapper for user-supplied addresses so that raw syscall
//! argument words are never mixed up with kernel pointers.
//!
//! # Address Space Layout (x86-64)
//! - `[0, KERN_BASE)`: user-reachable
//! - `[KERN_BASE, ..)`: kernel reserved, never valid as a user pointer
//!
//! # Security Properties
//! - A `VirtAddr` cannot be dereferenced; it must be translated through an
//!   [`AddressSpace`](super::AddressSpace) first
//! - Arithmetic is checked so a range can never wrap around into low memory

use core::fmt;

/// Page size (4 KiB)
pub const PAGE_SIZE: usize = 4096;
/// Page size mask
pub const PAGE_MASK: usize = PAGE_SIZE - 1;
/// Bits to shift for page number
pub const PAGE_SHIFT: usize = 12;

/// First kernel virtual address. Everything below is user space.
pub const KERN_BASE: usize = 0x80_0400_0000;

/// Top of the initial user stack set up by the program loader.
pub const USER_STACK: usize = 0x4748_0000;

/// A user virtual address as it arrived from a syscall argument.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct VirtAddr(usize);

impl VirtAddr {
    /// Wrap a raw address. No validation happens here.
    #[inline]
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    /// Get the raw address value.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Get the raw address as u64 (for register slots).
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0 as u64
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Check if the address is page-aligned.
    #[inline]
    pub const fn is_aligned(self) -> bool {
        self.0 & PAGE_MASK == 0
    }

    /// Align the address down to the nearest page boundary.
    #[inline]
    pub const fn align_down(self) -> Self {
        Self(self.0 & !PAGE_MASK)
    }

    /// Align the address down to a multiple of `align` (a power of two).
    #[inline]
    pub const fn align_down_to(self, align: usize) -> Self {
        Self(self.0 & !(align - 1))
    }

    /// Get the page offset (lowest 12 bits).
    #[inline]
    pub const fn page_offset(self) -> usize {
        self.0 & PAGE_MASK
    }

    /// Virtual page number.
    #[inline]
    pub const fn page_number(self) -> usize {
        self.0 >> PAGE_SHIFT
    }

    /// Add an offset, returning `None` on overflow.
    #[inline]
    pub const fn checked_add(self, offset: usize) -> Option<Self> {
        match self.0.checked_add(offset) {
            Some(addr) => Some(Self(addr)),
            None => None,
        }
    }

    /// Subtract an offset, returning `None` on underflow.
    #[inline]
    pub const fn checked_sub(self, offset: usize) -> Option<Self> {
        match self.0.checked_sub(offset) {
            Some(addr) => Some(Self(addr)),
            None => None,
        }
    }

    /// Check if this is a user address (below `KERN_BASE`).
    #[inline]
    pub const fn is_user(self) -> bool {
        self.0 < KERN_BASE
    }

    /// Check if this is a kernel address.
    #[inline]
    pub const fn is_kernel(self) -> bool {
        !self.is_user()
    }
}

impl fmt::Debug for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtAddr({:#018x})", self.0)
    }
}

impl fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// Iterate over the base address of every page touched by `[start, start + len)`.
///
/// Returns `None` if the range wraps the address space. An empty range
/// touches no pages.
pub fn pages_spanned(start: VirtAddr, len: usize) -> Option<impl Iterator<Item = VirtAddr>> {
    let end = start.checked_add(len)?;
    let first = start.page_number();
    let last = if len == 0 {
        first
    } else {
        (end.as_usize() - 1) >> PAGE_SHIFT
    };
    let count = if len == 0 { 0 } else { last - first + 1 };
    Some((first..first + count).map(|vpn| VirtAddr::new(vpn << PAGE_SHIFT)))
}
