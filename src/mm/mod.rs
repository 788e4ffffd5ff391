//! Memory management interface for the syscall layer
//!
//! Provides:
//! - User virtual address types and the address-space layout
//! - The [`AddressSpace`] translation capability
//! - A software page map usable without hardware paging
//!
//! # Security Principles
//! - User addresses are never dereferenced before translation
//! - Unsafe code is confined to frame copies and audited

pub mod address;
pub mod paging;

pub use address::{VirtAddr, KERN_BASE, PAGE_SIZE, USER_STACK};
pub use paging::{AddressSpace, Mapping, MappingError, PageFlags, PageMap};
