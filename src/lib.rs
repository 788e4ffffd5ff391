//! sysgate - the syscall boundary of a teaching x86-64 kernel
//!
//! Everything between a user-mode `syscall` trap and the kernel services it
//! asks for: decoding the request, proving its pointers are safe, driving
//! the per-process descriptor table, and the fork/exec/wait/exit lifecycle.
//!
//! # Security Features
//! - Every user pointer is validated page by page before it is touched
//! - Invalid memory terminates the offending process, never the kernel
//! - Descriptor numbers are never reused within a process
//! - Exit statuses are collected exactly once
//!
//! # Architecture
//! - Target: x86-64, arguments in rdi, rsi, rdx, r10, r8, r9
//! - The trap trampoline, boot code, global allocator, scheduler,
//!   filesystem and loader belong to the embedding kernel and are injected
//!   into [`Kernel`] as trait objects
//! - Built as `no_std` + `alloc`; host tests link `std`

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

pub mod drivers;
pub mod exception;
pub mod fd;
pub mod fs;
pub mod kernel;
pub mod mm;
pub mod process;
pub mod syscall;

#[cfg(test)]
mod testing;

pub use drivers::Console;
pub use exception::{TrapFrame, UserFault};
pub use fd::{Fd, FdTable};
pub use fs::{FileSystem, OpenFile};
pub use kernel::Kernel;
pub use mm::{AddressSpace, PageMap};
pub use process::{ChildHandle, ExitReason, Loader, Pid, Process, Scheduler};
pub use syscall::{Fault, Flow};
