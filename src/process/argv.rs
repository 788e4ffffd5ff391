//! Command Lines and the Initial Argument Stack
//!
//! # Stack Layout (x86-64, grows down)
//! ```text
//! USER_STACK ->  argument strings, NUL terminated, last argument highest
//!                zero padding to 8-byte alignment
//!                argv[argc] = 0
//!                argv[argc-1] .. argv[0]     <- rsi
//!                fake return address 0       <- rsp
//! ```
//! `rdi` holds argc.

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use super::MAX_ARGS;
use crate::exception::TrapFrame;
use crate::mm::address::{VirtAddr, PAGE_SIZE};
use crate::mm::AddressSpace;
use crate::syscall::validate::{Fault, UserMemory};

const WORD: usize = core::mem::size_of::<u64>();

/// Why a command line was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgError {
    /// No program name.
    Empty,
    /// More than `MAX_ARGS` arguments.
    TooManyArgs,
    /// Longer than one page.
    TooLong,
}

impl core::fmt::Display for ArgError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Empty => write!(f, "empty command line"),
            Self::TooManyArgs => write!(f, "too many arguments"),
            Self::TooLong => write!(f, "command line too long"),
        }
    }
}

/// A command line split into program path and arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    args: Vec<String>,
}

impl CommandLine {
    /// Split `line` on spaces. Runs of spaces separate nothing.
    pub fn parse(line: &str) -> Result<Self, ArgError> {
        if line.len() >= PAGE_SIZE {
            return Err(ArgError::TooLong);
        }
        let args: Vec<String> = line
            .split(' ')
            .filter(|word| !word.is_empty())
            .map(ToString::to_string)
            .collect();
        if args.is_empty() {
            return Err(ArgError::Empty);
        }
        if args.len() > MAX_ARGS {
            return Err(ArgError::TooManyArgs);
        }
        Ok(Self { args })
    }

    /// Program path (argv[0]).
    pub fn program(&self) -> &str {
        &self.args[0]
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn argc(&self) -> usize {
        self.args.len()
    }
}

/// Lay out `cmd` on the user stack of `space`, starting at `frame.rsp`,
/// and point `rdi`/`rsi`/`rsp` at it.
pub fn push_arguments(
    space: &dyn AddressSpace,
    frame: &mut TrapFrame,
    cmd: &CommandLine,
) -> Result<(), Fault> {
    let mem = UserMemory::new(space);
    let mut sp = VirtAddr::new(frame.rsp as usize);

    let mut argv = Vec::with_capacity(cmd.argc());
    for arg in cmd.args().iter().rev() {
        let mut bytes = Vec::with_capacity(arg.len() + 1);
        bytes.extend_from_slice(arg.as_bytes());
        bytes.push(0);
        sp = sp.checked_sub(bytes.len()).ok_or(Fault::Overflow)?;
        mem.write_bytes(sp, &bytes)?;
        argv.push(sp);
    }

    let aligned = sp.align_down_to(WORD);
    let padding = sp.as_usize() - aligned.as_usize();
    if padding > 0 {
        mem.write_bytes(aligned, &[0; WORD][..padding])?;
    }
    sp = aligned;

    push_word(&mem, &mut sp, 0)?;
    // `argv` was filled last-to-first, which is the push order.
    for addr in &argv {
        push_word(&mem, &mut sp, addr.as_u64())?;
    }
    let argv_base = sp;
    push_word(&mem, &mut sp, 0)?;

    frame.regs.rdi = cmd.argc() as u64;
    frame.regs.rsi = argv_base.as_u64();
    frame.rsp = sp.as_u64();
    Ok(())
}

fn push_word(mem: &UserMemory<'_>, sp: &mut VirtAddr, value: u64) -> Result<(), Fault> {
    *sp = sp.checked_sub(WORD).ok_or(Fault::Overflow)?;
    mem.write_bytes(*sp, &value.to_le_bytes())
}
