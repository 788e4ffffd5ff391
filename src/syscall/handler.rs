//! System Call Handler
//!
//! Dispatches system calls and implements individual syscall handlers.
//!
//! # Security Considerations
//! - Syscall numbers are looked up in the static table; anything else
//!   terminates the caller
//! - Every pointer argument is validated from the table's argument shape
//!   before the handler runs; handlers never see a raw user pointer
//! - Payloads move through kernel bounce buffers, one chunk at a time
//!
//! # Return Conventions
//! Ordinary failures (unknown fd, missing file, non-child pid) come back to
//! user space as a sentinel. Invalid memory never does: it is a [`Fault`]
//! and the process is terminated with status -1.

use alloc::borrow::ToOwned;
use alloc::string::String;
use alloc::vec::Vec;

use log::{debug, trace, warn};

use super::table::{self, ArgKind};
use super::validate::{Fault, UserSlice};
use crate::drivers::ConsoleInput;
use crate::exception::TrapFrame;
use crate::fd::{Fd, STDIN, STDOUT};
use crate::kernel::Kernel;
use crate::process::{ExitReason, Pid, Process};

/// Size of the kernel bounce buffer used for `read`/`write` payloads.
const CHUNK: usize = 512;

/// What the trap glue must do after a syscall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Return to the process with the (possibly updated) frame.
    Resume,
    /// The process is now a zombie with this status; switch away.
    Exited(i32),
    /// Power the machine off.
    PowerOff,
}

/// Result of a handler that completed without faulting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Write this value to the return slot.
    Value(i64),
    /// Handled, nothing to report. The return slot is left alone.
    Silent,
    /// Terminate the caller.
    Exit(ExitReason),
    /// Shut the machine down.
    PowerOff,
    /// The frame now holds a fresh program image; do not touch it.
    Replaced,
}

/// One decoded argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Int(u64),
    /// String copied into the kernel, terminator excluded.
    Str(Vec<u8>),
    /// Validated user buffer.
    Buf(UserSlice),
}

/// A syscall in flight: the caller, its trapped frame and its decoded
/// arguments.
pub struct Call<'a> {
    pub kernel: &'a Kernel,
    pub process: &'a Process,
    pub frame: &'a mut TrapFrame,
    args: Vec<Arg>,
}

impl Call<'_> {
    /// Integer argument `i`.
    pub fn int(&self, i: usize) -> u64 {
        match self.args.get(i) {
            Some(Arg::Int(value)) => *value,
            other => {
                debug_assert!(false, "argument {} is {:?}, not an int", i, other);
                0
            }
        }
    }

    /// Integer argument `i` as a descriptor (C `int`).
    pub fn fd(&self, i: usize) -> Fd {
        Fd::new(self.int(i) as i32)
    }

    /// String argument `i`.
    pub fn str(&self, i: usize) -> &[u8] {
        match self.args.get(i) {
            Some(Arg::Str(bytes)) => bytes.as_slice(),
            other => {
                debug_assert!(false, "argument {} is {:?}, not a string", i, other);
                &[]
            }
        }
    }

    /// Buffer argument `i`.
    pub fn buf(&self, i: usize) -> Option<UserSlice> {
        match self.args.get(i) {
            Some(Arg::Buf(slice)) => Some(*slice),
            _ => None,
        }
    }
}

impl Kernel {
    /// Handle a `syscall` trap from `process`.
    ///
    /// The number and arguments are read from `frame`; the return value,
    /// if any, is written back into it.
    pub fn dispatch(&self, process: &Process, frame: &mut TrapFrame) -> Flow {
        let number = frame.syscall_number();
        let Some(entry) = table::lookup(number) else {
            warn!("[SYSCALL] {} unknown syscall {}", process.pid(), number);
            return self.terminate(process);
        };
        trace!("[SYSCALL] {} {}", process.pid(), entry.name);

        let raw = frame.syscall_args();
        let args = match decode_args(process, entry.args, &raw) {
            Ok(args) => args,
            Err(fault) => {
                warn!("[SYSCALL] {} {}: {}", process.pid(), entry.name, fault);
                return self.terminate(process);
            }
        };

        let outcome = {
            let mut call = Call {
                kernel: self,
                process,
                frame: &mut *frame,
                args,
            };
            (entry.handler)(&mut call)
        };

        match outcome {
            Ok(Outcome::Value(value)) => frame.set_return(value),
            Ok(Outcome::Silent) | Ok(Outcome::Replaced) => {}
            Ok(Outcome::Exit(reason)) => return Flow::Exited(self.exit(process, reason)),
            Ok(Outcome::PowerOff) => return Flow::PowerOff,
            Err(fault) => {
                warn!("[SYSCALL] {} {}: {}", process.pid(), entry.name, fault);
                return self.terminate(process);
            }
        }

        if process.kill_requested() {
            return self.terminate(process);
        }
        Flow::Resume
    }

    fn terminate(&self, process: &Process) -> Flow {
        Flow::Exited(self.exit(process, ExitReason::Killed))
    }
}

/// Validate and decode every argument `shape` declares.
fn decode_args(process: &Process, shape: &[ArgKind], raw: &[u64; 6]) -> Result<Vec<Arg>, Fault> {
    let mut args = Vec::with_capacity(shape.len());
    for (kind, &word) in shape.iter().zip(raw.iter()) {
        let arg = match *kind {
            ArgKind::Int => Arg::Int(word),
            ArgKind::CStr => Arg::Str(process.with_memory(|mem| mem.read_cstr(word))?),
            ArgKind::Buffer { len_arg, access } => {
                let len = raw.get(len_arg).copied().unwrap_or(0) as u32 as usize;
                Arg::Buf(process.with_memory(|mem| mem.check(word, len, access))?)
            }
        };
        args.push(arg);
    }
    Ok(args)
}

pub(super) fn sys_halt(_call: &mut Call<'_>) -> Result<Outcome, Fault> {
    Ok(Outcome::PowerOff)
}

pub(super) fn sys_exit(call: &mut Call<'_>) -> Result<Outcome, Fault> {
    let status = call.int(0) as i32;
    Ok(Outcome::Exit(ExitReason::Exited(status)))
}

pub(super) fn sys_fork(call: &mut Call<'_>) -> Result<Outcome, Fault> {
    let name = String::from_utf8_lossy(call.str(0)).into_owned();
    match call.kernel.fork(call.process, &name, call.frame) {
        Ok(pid) => Ok(Outcome::Value(pid.raw() as i64)),
        Err(e) => {
            debug!("[SYSCALL] {} fork failed: {}", call.process.pid(), e);
            Ok(Outcome::Value(-1))
        }
    }
}

pub(super) fn sys_exec(call: &mut Call<'_>) -> Result<Outcome, Fault> {
    let cmdline = match core::str::from_utf8(call.str(0)) {
        Ok(line) => line.to_owned(),
        Err(_) => {
            warn!("[SYSCALL] {} exec: command line is not UTF-8", call.process.pid());
            return Ok(Outcome::Exit(ExitReason::Killed));
        }
    };
    match call.kernel.exec(call.process, &cmdline, call.frame) {
        Ok(()) => Ok(Outcome::Replaced),
        Err(e) => {
            warn!("[SYSCALL] {} exec '{}': {}", call.process.pid(), cmdline, e);
            Ok(Outcome::Exit(ExitReason::Killed))
        }
    }
}

pub(super) fn sys_wait(call: &mut Call<'_>) -> Result<Outcome, Fault> {
    let pid = Pid::new(call.int(0) as i32);
    let status = call.kernel.wait(call.process, pid);
    Ok(Outcome::Value(status.map_or(-1, i64::from)))
}

pub(super) fn sys_create(call: &mut Call<'_>) -> Result<Outcome, Fault> {
    let size = call.int(1) as u32;
    let created = match core::str::from_utf8(call.str(0)) {
        Ok(name) => call.kernel.fs.create(name, size),
        Err(_) => false,
    };
    Ok(Outcome::Value(created as i64))
}

pub(super) fn sys_remove(call: &mut Call<'_>) -> Result<Outcome, Fault> {
    let removed = match core::str::from_utf8(call.str(0)) {
        Ok(name) => call.kernel.fs.remove(name),
        Err(_) => false,
    };
    Ok(Outcome::Value(removed as i64))
}

pub(super) fn sys_open(call: &mut Call<'_>) -> Result<Outcome, Fault> {
    let Ok(name) = core::str::from_utf8(call.str(0)) else {
        return Ok(Outcome::Value(-1));
    };
    let Some(file) = call.kernel.fs.open(name) else {
        return Ok(Outcome::Value(-1));
    };
    match call.process.files().open(file) {
        Ok(fd) => Ok(Outcome::Value(fd.raw() as i64)),
        Err(e) => {
            debug!("[SYSCALL] {} open '{}': {}", call.process.pid(), name, e);
            Ok(Outcome::Value(-1))
        }
    }
}

pub(super) fn sys_filesize(call: &mut Call<'_>) -> Result<Outcome, Fault> {
    let fd = call.fd(0);
    let mut files = call.process.files();
    let size = files.lookup(fd).map_or(-1, |file| file.length() as i64);
    Ok(Outcome::Value(size))
}

pub(super) fn sys_read(call: &mut Call<'_>) -> Result<Outcome, Fault> {
    let fd = call.fd(0);
    let Some(buf) = call.buf(1) else {
        return Ok(Outcome::Value(-1));
    };
    if fd == STDIN {
        return read_console(call, &buf);
    }

    let process = call.process;
    let mut files = process.files();
    let Some(file) = files.lookup(fd) else {
        return Ok(Outcome::Value(-1));
    };
    let mut bounce = [0u8; CHUNK];
    let mut done = 0;
    while done < buf.len() {
        let want = (buf.len() - done).min(CHUNK);
        let got = file.read(&mut bounce[..want]);
        if got == 0 {
            break;
        }
        process.with_memory(|mem| mem.copy_out(&buf, done, &bounce[..got]))?;
        done += got;
        if got < want {
            break;
        }
    }
    Ok(Outcome::Value(done as i64))
}

/// Fill `buf` from the console one byte at a time.
///
/// Blocks while no input is buffered. Stops early when the input stream
/// closes or the process is being killed; bytes already read are kept.
fn read_console(call: &Call<'_>, buf: &UserSlice) -> Result<Outcome, Fault> {
    let console = &*call.kernel.console;
    let process = call.process;
    let mut bounce = [0u8; CHUNK];
    let mut done = 0;
    'fill: while done < buf.len() {
        let want = (buf.len() - done).min(CHUNK);
        let mut got = 0;
        let mut stop = false;
        while got < want {
            match console.try_getc() {
                ConsoleInput::Byte(byte) => {
                    bounce[got] = byte;
                    got += 1;
                }
                ConsoleInput::Closed => stop = true,
                ConsoleInput::Empty if process.kill_requested() => stop = true,
                ConsoleInput::Empty => {
                    call.kernel
                        .scheduler
                        .block_until(&|| console.has_input() || process.kill_requested());
                }
            }
            if stop {
                break;
            }
        }
        if got > 0 {
            process.with_memory(|mem| mem.copy_out(buf, done, &bounce[..got]))?;
            done += got;
        }
        if stop {
            break 'fill;
        }
    }
    Ok(Outcome::Value(done as i64))
}

pub(super) fn sys_write(call: &mut Call<'_>) -> Result<Outcome, Fault> {
    let fd = call.fd(0);
    let Some(buf) = call.buf(1) else {
        return Ok(Outcome::Value(0));
    };
    let process = call.process;
    let mut bounce = [0u8; CHUNK];

    if fd == STDOUT {
        let console = &*call.kernel.console;
        let mut done = 0;
        while done < buf.len() {
            let n = (buf.len() - done).min(CHUNK);
            process.with_memory(|mem| mem.copy_in(&buf, done, &mut bounce[..n]))?;
            console.putbuf(&bounce[..n]);
            done += n;
        }
        return Ok(Outcome::Value(done as i64));
    }

    let mut files = process.files();
    let Some(file) = files.lookup(fd) else {
        return Ok(Outcome::Value(0));
    };
    let mut done = 0;
    while done < buf.len() {
        let n = (buf.len() - done).min(CHUNK);
        process.with_memory(|mem| mem.copy_in(&buf, done, &mut bounce[..n]))?;
        let wrote = file.write(&bounce[..n]);
        done += wrote;
        if wrote < n {
            break;
        }
    }
    Ok(Outcome::Value(done as i64))
}

pub(super) fn sys_seek(call: &mut Call<'_>) -> Result<Outcome, Fault> {
    let fd = call.fd(0);
    let position = call.int(1) as u32;
    if let Some(file) = call.process.files().lookup(fd) {
        file.seek(position);
    }
    Ok(Outcome::Silent)
}

pub(super) fn sys_tell(call: &mut Call<'_>) -> Result<Outcome, Fault> {
    let fd = call.fd(0);
    let mut files = call.process.files();
    let position = files.lookup(fd).map_or(-1, |file| file.tell() as i64);
    Ok(Outcome::Value(position))
}

pub(super) fn sys_close(call: &mut Call<'_>) -> Result<Outcome, Fault> {
    let fd = call.fd(0);
    call.process.files().close(fd);
    Ok(Outcome::Silent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exception::UserFault;
    use crate::mm::{KERN_BASE, PAGE_SIZE};
    use crate::syscall::numbers::*;
    use crate::testing::{Rig, CODE_BASE, SCRATCH};

    const BUF: u64 = SCRATCH + 0x800;

    fn ret(frame: &TrapFrame) -> i64 {
        frame.return_value()
    }

    #[test]
    fn test_console_writes_concatenate() {
        let rig = Rig::new();
        let (p, mut frame) = rig.start("prog");
        rig.poke(&p, BUF, b"hi!");

        assert_eq!(rig.syscall(&p, &mut frame, SYS_WRITE, &[1, BUF, 2]), Flow::Resume);
        assert_eq!(ret(&frame), 2);
        rig.syscall(&p, &mut frame, SYS_WRITE, &[1, BUF + 2, 1]);
        assert_eq!(ret(&frame), 1);
        assert_eq!(rig.console.output(), "hi!");
    }

    #[test]
    fn test_console_read_fills_buffer() {
        let rig = Rig::with_input(b"abc");
        let (p, mut frame) = rig.start("prog");
        rig.syscall(&p, &mut frame, SYS_READ, &[0, BUF, 3]);
        assert_eq!(ret(&frame), 3);
        assert_eq!(rig.peek(&p, BUF, 3), b"abc");
    }

    #[test]
    fn test_console_read_stops_at_end_of_input() {
        let rig = Rig::with_input(b"abc");
        let (p, mut frame) = rig.start("prog");
        rig.poke(&p, BUF, b"zzzzz");
        rig.syscall(&p, &mut frame, SYS_READ, &[0, BUF, 5]);
        assert_eq!(ret(&frame), 3);
        assert_eq!(rig.peek(&p, BUF, 5), b"abczz");
    }

    #[test]
    fn test_console_read_waits_for_input() {
        let rig = Rig::new();
        rig.console.keep_open();
        let (p, frame) = rig.start("prog");
        let mut reader_frame = frame;

        std::thread::scope(|s| {
            let reader = s.spawn(|| rig.syscall(&p, &mut reader_frame, SYS_READ, &[0, BUF, 4]));
            std::thread::sleep(std::time::Duration::from_millis(20));
            rig.console.push_input(b"ab");
            std::thread::sleep(std::time::Duration::from_millis(20));
            rig.console.close_input();
            assert_eq!(reader.join().unwrap(), Flow::Resume);
        });
        assert_eq!(ret(&reader_frame), 2);
        assert_eq!(rig.peek(&p, BUF, 2), b"ab");
    }

    #[test]
    fn test_kill_abandons_blocked_console_read() {
        let rig = Rig::new();
        rig.console.keep_open();
        let (p, frame) = rig.start("prog");
        let mut reader_frame = frame;

        std::thread::scope(|s| {
            let reader = s.spawn(|| rig.syscall(&p, &mut reader_frame, SYS_READ, &[0, BUF, 4]));
            std::thread::sleep(std::time::Duration::from_millis(20));
            rig.kernel.kill(&p);
            assert_eq!(reader.join().unwrap(), Flow::Exited(-1));
        });
        assert!(rig.sched.wakes().contains(&p.pid()));
        assert_eq!(rig.console.output(), "prog: exit(-1)\n");
    }

    #[test]
    fn test_wrong_console_direction() {
        let rig = Rig::with_input(b"abc");
        let (p, mut frame) = rig.start("prog");
        rig.syscall(&p, &mut frame, SYS_READ, &[1, BUF, 3]);
        assert_eq!(ret(&frame), -1);
        rig.syscall(&p, &mut frame, SYS_WRITE, &[0, BUF, 3]);
        assert_eq!(ret(&frame), 0);
        assert_eq!(rig.console.output(), "");
    }

    #[test]
    fn test_descriptors_increase_and_are_not_reused() {
        let rig = Rig::new();
        rig.fs.insert("a", b"12345");
        let (p, mut frame) = rig.start("prog");
        let name = rig.poke_str(&p, BUF, "a");
        let missing = rig.poke_str(&p, BUF + 0x100, "nonexistent");

        rig.syscall(&p, &mut frame, SYS_OPEN, &[name]);
        assert_eq!(ret(&frame), 2);
        rig.syscall(&p, &mut frame, SYS_OPEN, &[missing]);
        assert_eq!(ret(&frame), -1);
        rig.syscall(&p, &mut frame, SYS_OPEN, &[name]);
        assert_eq!(ret(&frame), 3);

        rig.syscall(&p, &mut frame, SYS_CLOSE, &[2]);
        rig.syscall(&p, &mut frame, SYS_FILESIZE, &[2]);
        assert_eq!(ret(&frame), -1);
        rig.syscall(&p, &mut frame, SYS_TELL, &[2]);
        assert_eq!(ret(&frame), -1);
        rig.syscall(&p, &mut frame, SYS_READ, &[2, BUF, 1]);
        assert_eq!(ret(&frame), -1);
        rig.syscall(&p, &mut frame, SYS_WRITE, &[2, BUF, 1]);
        assert_eq!(ret(&frame), 0);

        rig.syscall(&p, &mut frame, SYS_OPEN, &[name]);
        assert_eq!(ret(&frame), 4);
    }

    #[test]
    fn test_file_calls() {
        let rig = Rig::new();
        let (p, mut frame) = rig.start("prog");
        let name = rig.poke_str(&p, BUF, "f");
        let data = BUF + 0x100;
        rig.poke(&p, data, b"abcdefghij");

        rig.syscall(&p, &mut frame, SYS_CREATE, &[name, 8]);
        assert_eq!(ret(&frame), 1);
        rig.syscall(&p, &mut frame, SYS_CREATE, &[name, 8]);
        assert_eq!(ret(&frame), 0);

        rig.syscall(&p, &mut frame, SYS_OPEN, &[name]);
        let fd = ret(&frame) as u64;
        rig.syscall(&p, &mut frame, SYS_WRITE, &[fd, data, 10]);
        assert_eq!(ret(&frame), 8, "files do not grow");
        rig.syscall(&p, &mut frame, SYS_TELL, &[fd]);
        assert_eq!(ret(&frame), 8);
        rig.syscall(&p, &mut frame, SYS_FILESIZE, &[fd]);
        assert_eq!(ret(&frame), 8);

        rig.syscall(&p, &mut frame, SYS_SEEK, &[fd, 2]);
        let out = BUF + 0x200;
        rig.syscall(&p, &mut frame, SYS_READ, &[fd, out, 3]);
        assert_eq!(ret(&frame), 3);
        assert_eq!(rig.peek(&p, out, 3), b"cde");

        rig.syscall(&p, &mut frame, SYS_REMOVE, &[name]);
        assert_eq!(ret(&frame), 1);
        rig.syscall(&p, &mut frame, SYS_REMOVE, &[name]);
        assert_eq!(ret(&frame), 0);
        assert_eq!(rig.fs.contents("f"), None);
    }

    #[test]
    fn test_silent_calls_leave_return_slot_alone() {
        let rig = Rig::new();
        let (p, mut frame) = rig.start("prog");
        assert_eq!(rig.syscall(&p, &mut frame, SYS_SEEK, &[77, 4]), Flow::Resume);
        assert_eq!(ret(&frame), SYS_SEEK as i64);
        rig.syscall(&p, &mut frame, SYS_CLOSE, &[1]);
        assert_eq!(ret(&frame), SYS_CLOSE as i64);
    }

    #[test]
    fn test_large_file_read_crosses_pages() {
        let rig = Rig::new();
        let contents: Vec<u8> = (0..3000u32).map(|i| (i % 251) as u8).collect();
        rig.fs.insert("big", &contents);
        let (p, mut frame) = rig.start("prog");
        let name = rig.poke_str(&p, SCRATCH, "big");
        rig.syscall(&p, &mut frame, SYS_OPEN, &[name]);
        let fd = ret(&frame) as u64;

        let dst = SCRATCH + PAGE_SIZE as u64 - 1000;
        rig.syscall(&p, &mut frame, SYS_READ, &[fd, dst, 4000]);
        assert_eq!(ret(&frame), 3000);
        assert_eq!(rig.peek(&p, dst, 3000), contents);
    }

    #[test]
    fn test_zero_length_buffer_skips_translation() {
        let rig = Rig::new();
        let (p, mut frame) = rig.start("prog");
        assert_eq!(
            rig.syscall(&p, &mut frame, SYS_WRITE, &[1, 0x7000_0000, 0]),
            Flow::Resume
        );
        assert_eq!(ret(&frame), 0);
    }

    #[test]
    fn test_zero_length_kernel_buffer_kills() {
        let rig = Rig::new();
        let (p, mut frame) = rig.start("prog");
        assert_eq!(
            rig.syscall(&p, &mut frame, SYS_WRITE, &[1, KERN_BASE as u64, 0]),
            Flow::Exited(-1)
        );
        let (q, mut frame) = rig.start("prog");
        assert_eq!(rig.syscall(&q, &mut frame, SYS_READ, &[0, 0, 0]), Flow::Exited(-1));
    }

    #[test]
    fn test_buffer_running_into_unmapped_page_kills() {
        let rig = Rig::new();
        let (p, mut frame) = rig.start("prog");
        let end = SCRATCH + 2 * PAGE_SIZE as u64;
        assert_eq!(
            rig.syscall(&p, &mut frame, SYS_WRITE, &[1, end - 4, 8]),
            Flow::Exited(-1)
        );
        assert_eq!(rig.console.output(), "prog: exit(-1)\n");
    }

    #[test]
    fn test_invalid_pointers_kill() {
        let cases: [(u64, [u64; 3]); 4] = [
            (SYS_WRITE, [1, KERN_BASE as u64, 4]),
            (SYS_READ, [0, CODE_BASE, 4]),
            (SYS_OPEN, [0, 0, 0]),
            (SYS_CREATE, [0x7000_0000, 1, 0]),
        ];
        for (number, args) in cases {
            let rig = Rig::with_input(b"data");
            let (p, mut frame) = rig.start("prog");
            assert_eq!(
                rig.syscall(&p, &mut frame, number, &args),
                Flow::Exited(-1),
                "syscall {}",
                number
            );
            assert!(p.files().is_empty());
        }
    }

    #[test]
    fn test_unknown_syscall_kills() {
        let rig = Rig::new();
        let (p, mut frame) = rig.start("prog");
        assert_eq!(rig.syscall(&p, &mut frame, 0x1d, &[]), Flow::Exited(-1));
        assert_eq!(rig.console.output(), "prog: exit(-1)\n");
    }

    #[test]
    fn test_exit_and_halt() {
        let rig = Rig::new();
        let (p, mut frame) = rig.start("prog");
        assert_eq!(rig.syscall(&p, &mut frame, SYS_EXIT, &[u64::MAX]), Flow::Exited(-1));
        assert_eq!(rig.console.output(), "prog: exit(-1)\n");

        let (q, mut frame) = rig.start("prog");
        assert_eq!(rig.syscall(&q, &mut frame, SYS_HALT, &[]), Flow::PowerOff);
    }

    #[test]
    fn test_fork_and_wait_through_syscalls() {
        let rig = Rig::new();
        rig.fs.insert("data", b"hello world");
        let (parent, mut frame) = rig.start("prog");
        let file = rig.poke_str(&parent, BUF, "data");
        let kid = rig.poke_str(&parent, BUF + 0x100, "kid");
        rig.syscall(&parent, &mut frame, SYS_OPEN, &[file]);
        let fd = ret(&frame) as u64;

        rig.syscall(&parent, &mut frame, SYS_FORK, &[kid]);
        let pid = ret(&frame) as u64;
        assert!(pid > 0);
        let (child, mut child_frame) = rig.sched.take_spawned().unwrap();
        assert_eq!(ret(&child_frame), 0);

        rig.syscall(&child, &mut child_frame, SYS_SEEK, &[fd, 6]);
        rig.syscall(&child, &mut child_frame, SYS_READ, &[fd, BUF, 5]);
        assert_eq!(rig.peek(&child, BUF, 5), b"world");
        rig.syscall(&parent, &mut frame, SYS_TELL, &[fd]);
        assert_eq!(ret(&frame), 0);

        assert_eq!(
            rig.syscall(&child, &mut child_frame, SYS_EXIT, &[42]),
            Flow::Exited(42)
        );
        rig.syscall(&parent, &mut frame, SYS_WAIT, &[pid]);
        assert_eq!(ret(&frame), 42);
        rig.syscall(&parent, &mut frame, SYS_WAIT, &[pid]);
        assert_eq!(ret(&frame), -1);
        assert_eq!(rig.console.output(), "kid: exit(42)\n");
    }

    #[test]
    fn test_faulting_child_is_reported_as_killed() {
        let rig = Rig::new();
        let (parent, mut frame) = rig.start("prog");
        let kid = rig.poke_str(&parent, BUF, "kid");
        rig.syscall(&parent, &mut frame, SYS_FORK, &[kid]);
        let pid = ret(&frame) as u64;
        let (child, child_frame) = rig.sched.take_spawned().unwrap();

        let fault = UserFault::PageFault { addr: 0, write: true };
        assert_eq!(
            rig.kernel.handle_user_fault(&child, fault, &child_frame),
            Flow::Exited(-1)
        );
        rig.syscall(&parent, &mut frame, SYS_WAIT, &[pid]);
        assert_eq!(ret(&frame), -1);
    }

    #[test]
    fn test_exec_through_syscall() {
        let rig = Rig::new();
        let (p, mut frame) = rig.start("prog");
        let cmd = rig.poke_str(&p, BUF, "child arg");
        assert_eq!(rig.syscall(&p, &mut frame, SYS_EXEC, &[cmd]), Flow::Resume);
        assert_eq!(frame.rip, CODE_BASE);
        assert_eq!(frame.regs.rdi, 2);
        assert_eq!(p.name(), "child");

        let missing = rig.poke_str(&p, BUF, "missing");
        assert_eq!(rig.syscall(&p, &mut frame, SYS_EXEC, &[missing]), Flow::Exited(-1));
        assert_eq!(rig.console.output(), "child: exit(-1)\n");
    }

    #[test]
    fn test_running_executable_rejects_writes() {
        let rig = Rig::new();
        let (p, mut frame) = rig.start("prog");
        let name = rig.poke_str(&p, BUF, "prog");
        rig.syscall(&p, &mut frame, SYS_OPEN, &[name]);
        let fd = ret(&frame) as u64;
        rig.syscall(&p, &mut frame, SYS_WRITE, &[fd, BUF, 2]);
        assert_eq!(ret(&frame), 0);
    }

    #[test]
    fn test_pending_kill_terminates_after_call() {
        let rig = Rig::new();
        let (p, mut frame) = rig.start("prog");
        rig.kernel.kill(&p);
        assert_eq!(rig.syscall(&p, &mut frame, SYS_TELL, &[5]), Flow::Exited(-1));
        assert_eq!(ret(&frame), -1);
    }

    #[test]
    fn test_invalid_utf8_names_fail_quietly() {
        let rig = Rig::new();
        let (p, mut frame) = rig.start("prog");
        rig.poke(&p, BUF, &[0xff, 0xfe, 0]);
        rig.syscall(&p, &mut frame, SYS_OPEN, &[BUF]);
        assert_eq!(ret(&frame), -1);
        rig.syscall(&p, &mut frame, SYS_CREATE, &[BUF, 0]);
        assert_eq!(ret(&frame), 0);
        assert_eq!(rig.syscall(&p, &mut frame, SYS_EXEC, &[BUF]), Flow::Exited(-1));
    }
}
