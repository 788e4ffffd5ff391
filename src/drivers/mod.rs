//! Device capabilities used by the syscall layer
//!
//! All drivers follow these security principles:
//! - No panics on invalid input
//! - Console descriptors never touch the descriptor table

pub mod console;

pub use console::{Console, ConsoleInput};
