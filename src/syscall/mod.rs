//! System Call Interface
//!
//! The kernel's only gate between untrusted user requests and kernel state.
//!
//! # Security Model
//! - Whitelist approach: only syscalls present in the table are allowed
//! - All pointer arguments are validated before any handler runs
//! - Invalid memory terminates the caller; it never panics the kernel
//!
//! # Current Syscalls
//! - 0: halt() - power the machine off
//! - 1: exit(status) - terminate the current process
//! - 2: fork(name) - duplicate the current process
//! - 3: exec(cmdline) - replace the current program
//! - 4: wait(pid) - collect a child's exit status
//! - 5..=13: create, remove, open, filesize, read, write, seek, tell, close

pub mod handler;
pub mod table;
pub mod validate;

pub use handler::{Arg, Call, Flow, Outcome};
pub use table::{lookup, numbers, ArgKind, SyscallEntry, SYSCALL_TABLE};
pub use validate::{Access, Fault, UserMemory, UserSlice};
