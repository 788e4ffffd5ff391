//! Per-process File Descriptors
//!
//! # Security Properties
//! - Descriptor numbers are never reused within a process, so a stale
//!   number cannot reach a file opened later
//! - Each entry exclusively owns its open file; closing closes it once
//! - Fork copies duplicate the underlying handles instead of sharing them

pub mod table;

pub use table::{Fd, FdError, FdTable, FIRST_FD, MAX_OPEN_FILES, STDIN, STDOUT};
