//! Syscall Table
//!
//! Static table indexed by syscall number. Each entry declares the shape of
//! its arguments; the dispatcher derives all pointer validation from the
//! shape, so no handler validates its own pointers.

use super::handler::{self as h, Call, Outcome};
use super::validate::{Access, Fault};

/// System call numbers (user library ABI).
pub mod numbers {
    pub const SYS_HALT: u64 = 0;
    pub const SYS_EXIT: u64 = 1;
    pub const SYS_FORK: u64 = 2;
    pub const SYS_EXEC: u64 = 3;
    pub const SYS_WAIT: u64 = 4;
    pub const SYS_CREATE: u64 = 5;
    pub const SYS_REMOVE: u64 = 6;
    pub const SYS_OPEN: u64 = 7;
    pub const SYS_FILESIZE: u64 = 8;
    pub const SYS_READ: u64 = 9;
    pub const SYS_WRITE: u64 = 10;
    pub const SYS_SEEK: u64 = 11;
    pub const SYS_TELL: u64 = 12;
    pub const SYS_CLOSE: u64 = 13;
}

/// Shape of one argument register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// Plain integer, passed through.
    Int,
    /// NUL-terminated user string, copied into the kernel.
    CStr,
    /// User buffer whose length is the argument at `len_arg`.
    Buffer { len_arg: usize, access: Access },
}

/// Handler type: validated arguments in, outcome out.
pub type Handler = fn(&mut Call<'_>) -> Result<Outcome, Fault>;

/// One dispatch table entry.
pub struct SyscallEntry {
    pub number: u64,
    pub name: &'static str,
    pub args: &'static [ArgKind],
    pub handler: Handler,
}

impl core::fmt::Debug for SyscallEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SyscallEntry")
            .field("number", &self.number)
            .field("name", &self.name)
            .field("args", &self.args)
            .finish()
    }
}

use ArgKind::{CStr, Int};

const READ_BUF: ArgKind = ArgKind::Buffer {
    len_arg: 2,
    access: Access::Write,
};
const WRITE_BUF: ArgKind = ArgKind::Buffer {
    len_arg: 2,
    access: Access::Read,
};

/// Dispatch table, position == syscall number.
pub static SYSCALL_TABLE: [SyscallEntry; 14] = [
    SyscallEntry {
        number: numbers::SYS_HALT,
        name: "halt",
        args: &[],
        handler: h::sys_halt,
    },
    SyscallEntry {
        number: numbers::SYS_EXIT,
        name: "exit",
        args: &[Int],
        handler: h::sys_exit,
    },
    SyscallEntry {
        number: numbers::SYS_FORK,
        name: "fork",
        args: &[CStr],
        handler: h::sys_fork,
    },
    SyscallEntry {
        number: numbers::SYS_EXEC,
        name: "exec",
        args: &[CStr],
        handler: h::sys_exec,
    },
    SyscallEntry {
        number: numbers::SYS_WAIT,
        name: "wait",
        args: &[Int],
        handler: h::sys_wait,
    },
    SyscallEntry {
        number: numbers::SYS_CREATE,
        name: "create",
        args: &[CStr, Int],
        handler: h::sys_create,
    },
    SyscallEntry {
        number: numbers::SYS_REMOVE,
        name: "remove",
        args: &[CStr],
        handler: h::sys_remove,
    },
    SyscallEntry {
        number: numbers::SYS_OPEN,
        name: "open",
        args: &[CStr],
        handler: h::sys_open,
    },
    SyscallEntry {
        number: numbers::SYS_FILESIZE,
        name: "filesize",
        args: &[Int],
        handler: h::sys_filesize,
    },
    SyscallEntry {
        number: numbers::SYS_READ,
        name: "read",
        args: &[Int, READ_BUF, Int],
        handler: h::sys_read,
    },
    SyscallEntry {
        number: numbers::SYS_WRITE,
        name: "write",
        args: &[Int, WRITE_BUF, Int],
        handler: h::sys_write,
    },
    SyscallEntry {
        number: numbers::SYS_SEEK,
        name: "seek",
        args: &[Int, Int],
        handler: h::sys_seek,
    },
    SyscallEntry {
        number: numbers::SYS_TELL,
        name: "tell",
        args: &[Int],
        handler: h::sys_tell,
    },
    SyscallEntry {
        number: numbers::SYS_CLOSE,
        name: "close",
        args: &[Int],
        handler: h::sys_close,
    },
];

/// Find the entry for `number`.
pub fn lookup(number: u64) -> Option<&'static SyscallEntry> {
    let index = usize::try_from(number).ok()?;
    SYSCALL_TABLE.get(index).filter(|entry| entry.number == number)
}
