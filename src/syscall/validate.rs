//! System Call Input Validation
//!
//! Proves that user pointers are safe to touch before any handler uses them.
//!
//! # Security Principles
//! - Validate ALL inputs before use
//! - Fail-secure: deny by default
//! - Prevent common vulnerabilities:
//!   - Kernel memory disclosure (user range check on every page)
//!   - Buffers that start mapped and run into a hole (per-page checks)
//!   - Strings that straddle into an unmapped page (progressive scan)
//!   - TOCTOU races (payloads are copied through kernel bounce buffers)
//!   - Null pointer dereference (explicit checks)
//!
//! A [`Fault`] is not an error code for user space. The dispatcher turns it
//! into termination of the offending process.

use alloc::vec::Vec;

use crate::mm::address::{pages_spanned, VirtAddr, PAGE_SIZE};
use crate::mm::{AddressSpace, Mapping, PageFlags};

/// Longest string argument accepted, terminator excluded.
pub const MAX_STR_LEN: usize = PAGE_SIZE;

/// Why a user pointer was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Null pointer.
    Null,
    /// Address range wraps around the address space.
    Overflow,
    /// Address lies in the kernel's reserved range.
    KernelAddress(VirtAddr),
    /// Page is not mapped in the caller's address space.
    Unmapped(VirtAddr),
    /// Kernel would write to a read-only page.
    ReadOnly(VirtAddr),
    /// No terminator within `MAX_STR_LEN` bytes.
    StringTooLong,
    /// The process has no address space (already torn down).
    NoAddressSpace,
}

impl core::fmt::Display for Fault {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Null => write!(f, "null user pointer"),
            Self::Overflow => write!(f, "user range wraps the address space"),
            Self::KernelAddress(addr) => write!(f, "kernel address {} from user", addr),
            Self::Unmapped(addr) => write!(f, "unmapped user address {}", addr),
            Self::ReadOnly(addr) => write!(f, "write to read-only user page {}", addr),
            Self::StringTooLong => write!(f, "unterminated user string"),
            Self::NoAddressSpace => write!(f, "process has no address space"),
        }
    }
}

/// How the kernel will touch a user buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Kernel reads user memory (`write` payload, strings).
    Read,
    /// Kernel writes user memory (`read` payload, argument stack).
    Write,
}

impl Access {
    fn required_flags(self) -> PageFlags {
        match self {
            Access::Read => PageFlags::USER_RO,
            Access::Write => PageFlags::USER_RW,
        }
    }
}

/// A validated user-space buffer
///
/// This type guarantees that, at validation time:
/// - Every byte is below the kernel base
/// - Every page spanned is mapped with the permissions `access` needs
/// - The range doesn't overflow
///
/// It holds no pointers; copies re-translate each page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserSlice {
    addr: VirtAddr,
    len: usize,
    access: Access,
}

impl UserSlice {
    #[inline]
    pub fn addr(&self) -> VirtAddr {
        self.addr
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn access(&self) -> Access {
        self.access
    }
}

/// Checked view of one process's user memory.
pub struct UserMemory<'a> {
    space: &'a dyn AddressSpace,
}

impl<'a> UserMemory<'a> {
    pub fn new(space: &'a dyn AddressSpace) -> Self {
        Self { space }
    }

    /// Translate the page containing `addr` and check its permissions.
    fn page(&self, addr: VirtAddr, access: Access) -> Result<Mapping, Fault> {
        if !addr.is_user() {
            return Err(Fault::KernelAddress(addr));
        }
        let mapping = self.space.translate(addr).ok_or(Fault::Unmapped(addr))?;
        let needed = access.required_flags();
        if !mapping.flags.contains(PageFlags::USER_RO) {
            return Err(Fault::Unmapped(addr));
        }
        if !mapping.flags.contains(needed) {
            return Err(Fault::ReadOnly(addr));
        }
        Ok(mapping)
    }

    /// Validate a user buffer of `len` bytes starting at `ptr`.
    ///
    /// # Security Checks
    /// 1. Pointer is not null
    /// 2. Pointer + length doesn't overflow
    /// 3. Every page in the range is user, mapped and permitted
    ///
    /// A zero-length buffer still needs a non-null user address, but no
    /// page is translated for it; no byte of it will ever be touched.
    pub fn check(&self, ptr: u64, len: usize, access: Access) -> Result<UserSlice, Fault> {
        let addr = VirtAddr::new(ptr as usize);
        if addr.is_null() {
            return Err(Fault::Null);
        }
        if len == 0 {
            if !addr.is_user() {
                return Err(Fault::KernelAddress(addr));
            }
            return Ok(UserSlice { addr, len, access });
        }
        let pages = pages_spanned(addr, len).ok_or(Fault::Overflow)?;
        for page in pages {
            self.page(page, access)?;
        }
        Ok(UserSlice { addr, len, access })
    }

    /// Copy a NUL-terminated string out of user memory.
    ///
    /// The string is validated page by page while it is scanned, so a
    /// string running into an unmapped page faults at that page instead of
    /// being read past it. The terminator is not included.
    pub fn read_cstr(&self, ptr: u64) -> Result<Vec<u8>, Fault> {
        let mut addr = VirtAddr::new(ptr as usize);
        if addr.is_null() {
            return Err(Fault::Null);
        }
        let mut out = Vec::new();
        loop {
            let mapping = self.page(addr, Access::Read)?;
            let offset = addr.page_offset();
            let avail = PAGE_SIZE - offset;
            // SAFETY: `page` proved this user page is mapped; the frame is
            // PAGE_SIZE bytes and offset + avail == PAGE_SIZE.
            let bytes = unsafe {
                core::slice::from_raw_parts(mapping.frame.as_ptr().add(offset), avail)
            };
            match bytes.iter().position(|&b| b == 0) {
                Some(end) => {
                    if out.len() + end > MAX_STR_LEN {
                        return Err(Fault::StringTooLong);
                    }
                    out.extend_from_slice(&bytes[..end]);
                    return Ok(out);
                }
                None => {
                    if out.len() + avail > MAX_STR_LEN {
                        return Err(Fault::StringTooLong);
                    }
                    out.extend_from_slice(bytes);
                    addr = addr.checked_add(avail).ok_or(Fault::Overflow)?;
                }
            }
        }
    }

    /// Copy `dst.len()` bytes from `src` starting `offset` bytes in.
    pub fn copy_in(&self, src: &UserSlice, offset: usize, dst: &mut [u8]) -> Result<(), Fault> {
        debug_assert!(offset + dst.len() <= src.len);
        let start = src.addr.checked_add(offset).ok_or(Fault::Overflow)?;
        self.for_each_chunk(start, dst.len(), Access::Read, |frame, done, n| {
            // SAFETY: `frame` is valid for `n` bytes (see `for_each_chunk`),
            // and `done + n <= dst.len()`.
            unsafe { core::ptr::copy_nonoverlapping(frame, dst[done..].as_mut_ptr(), n) };
        })
    }

    /// Copy `src` into `dst` starting `offset` bytes in.
    pub fn copy_out(&self, dst: &UserSlice, offset: usize, src: &[u8]) -> Result<(), Fault> {
        debug_assert!(offset + src.len() <= dst.len);
        let start = dst.addr.checked_add(offset).ok_or(Fault::Overflow)?;
        self.write_bytes(start, src)
    }

    /// Validate and write `src` at `addr` (argument stack setup).
    pub fn write_bytes(&self, addr: VirtAddr, src: &[u8]) -> Result<(), Fault> {
        self.check(addr.as_u64(), src.len(), Access::Write)?;
        self.for_each_chunk(addr, src.len(), Access::Write, |frame, done, n| {
            // SAFETY: as in `copy_in`, with `done + n <= src.len()`.
            unsafe { core::ptr::copy_nonoverlapping(src[done..].as_ptr(), frame, n) };
        })
    }

    /// Walk `[addr, addr + len)` one page-bounded chunk at a time, handing
    /// `f` a kernel pointer valid for the chunk, the bytes done so far and
    /// the chunk length.
    fn for_each_chunk(
        &self,
        addr: VirtAddr,
        len: usize,
        access: Access,
        mut f: impl FnMut(*mut u8, usize, usize),
    ) -> Result<(), Fault> {
        let mut done = 0;
        while done < len {
            let at = addr.checked_add(done).ok_or(Fault::Overflow)?;
            let mapping = self.page(at, access)?;
            let n = (PAGE_SIZE - at.page_offset()).min(len - done);
            // SAFETY: the offset stays inside the PAGE_SIZE frame.
            let frame = unsafe { mapping.frame.as_ptr().add(at.page_offset()) };
            f(frame, done, n);
            done += n;
        }
        Ok(())
    }
}
