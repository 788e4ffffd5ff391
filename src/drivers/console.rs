//! Console Capability
//!
//! Descriptors 0 and 1 are the console. They bypass the descriptor table
//! and go straight to this device.
//!
//! # Semantics
//! - Input is polled with `try_getc`, which never blocks; a reader that
//!   finds nothing waits through the scheduler until `has_input` holds, so
//!   an external kill can end the wait
//! - The driver must `wake` a blocked reader when a byte arrives or the
//!   input stream closes
//! - `putbuf` writes a whole buffer without interleaving with other writers

use alloc::string::String;
use core::fmt::{self, Write};

/// Result of polling console input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleInput {
    /// Next input byte.
    Byte(u8),
    /// Nothing buffered right now; more may arrive.
    Empty,
    /// The stream is closed and no more bytes will ever arrive.
    Closed,
}

/// Console device used for descriptors 0/1 and the exit line.
pub trait Console: Send + Sync {
    /// Take one input byte if one is buffered. Never blocks.
    fn try_getc(&self) -> ConsoleInput;

    /// Whether `try_getc` would return something other than `Empty`.
    fn has_input(&self) -> bool;

    /// Write a buffer to the console as one unit.
    fn putbuf(&self, buf: &[u8]);
}

/// Render `args` and hand the result to the console in one `putbuf`.
#[doc(hidden)]
pub fn _print(console: &dyn Console, args: fmt::Arguments<'_>) {
    let mut line = String::new();
    let _ = line.write_fmt(args);
    console.putbuf(line.as_bytes());
}

/// Print to a console, like `print!`.
#[macro_export]
macro_rules! cprint {
    ($console:expr, $($arg:tt)*) => {
        $crate::drivers::console::_print($console, format_args!($($arg)*))
    };
}

/// Print a line to a console, like `println!`. The newline goes out in the
/// same `putbuf` as the text.
#[macro_export]
macro_rules! cprintln {
    ($console:expr) => {
        $crate::cprint!($console, "\n")
    };
    ($console:expr, $($arg:tt)*) => {
        $crate::cprint!($console, "{}\n", format_args!($($arg)*))
    };
}
