//! In-memory collaborators for unit tests.

use alloc::boxed::Box;
use alloc::collections::{BTreeMap, VecDeque};
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use spin::Mutex;

use crate::drivers::{Console, ConsoleInput};
use crate::exception::TrapFrame;
use crate::fs::{FileSystem, OpenFile};
use crate::kernel::Kernel;
use crate::mm::{PageFlags, PageMap, VirtAddr, PAGE_SIZE, USER_STACK};
use crate::process::{LoadError, LoadedImage, Loader, Pid, Process, Scheduler, SpawnError};
use crate::syscall::{Access, Flow};

/// Where `TestLoader` maps the (read-only) code page.
pub const CODE_BASE: u64 = 0x40_0000;
/// Two read-write pages tests use for strings and buffers.
pub const SCRATCH: u64 = 0x1000_0000;
/// Contents every loadable test executable starts with.
pub const EXE_MAGIC: &[u8] = b"\x7fELF";

struct FileData {
    bytes: Vec<u8>,
    deny_writes: usize,
}

#[derive(Default)]
struct FsState {
    files: BTreeMap<String, Arc<Mutex<FileData>>>,
    closes: usize,
    duplicate_budget: Option<usize>,
}

/// RAM filesystem with close and duplicate accounting. Files cannot grow.
#[derive(Clone, Default)]
pub struct RamFs {
    state: Arc<Mutex<FsState>>,
}

impl RamFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: &str, data: &[u8]) {
        self.state.lock().files.insert(
            String::from(name),
            Arc::new(Mutex::new(FileData {
                bytes: data.to_vec(),
                deny_writes: 0,
            })),
        );
    }

    pub fn contents(&self, name: &str) -> Option<Vec<u8>> {
        let file = self.state.lock().files.get(name).cloned()?;
        let bytes = file.lock().bytes.clone();
        Some(bytes)
    }

    /// Handles closed so far.
    pub fn closes(&self) -> usize {
        self.state.lock().closes
    }

    /// Let `n` more duplications succeed, then fail every one after.
    pub fn fail_duplicates_after(&self, n: usize) {
        self.state.lock().duplicate_budget = Some(n);
    }

    fn handle(&self, data: Arc<Mutex<FileData>>, pos: u32) -> Box<dyn OpenFile> {
        Box::new(RamFile {
            fs: self.clone(),
            data,
            pos,
            denying: false,
        })
    }
}

impl FileSystem for RamFs {
    fn create(&self, name: &str, initial_size: u32) -> bool {
        let mut state = self.state.lock();
        if name.is_empty() || state.files.contains_key(name) {
            return false;
        }
        state.files.insert(
            String::from(name),
            Arc::new(Mutex::new(FileData {
                bytes: alloc::vec![0; initial_size as usize],
                deny_writes: 0,
            })),
        );
        true
    }

    fn remove(&self, name: &str) -> bool {
        self.state.lock().files.remove(name).is_some()
    }

    fn open(&self, name: &str) -> Option<Box<dyn OpenFile>> {
        let data = self.state.lock().files.get(name).cloned()?;
        Some(self.handle(data, 0))
    }
}

struct RamFile {
    fs: RamFs,
    data: Arc<Mutex<FileData>>,
    pos: u32,
    denying: bool,
}

impl OpenFile for RamFile {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        let data = self.data.lock();
        let start = (self.pos as usize).min(data.bytes.len());
        let n = buf.len().min(data.bytes.len() - start);
        buf[..n].copy_from_slice(&data.bytes[start..start + n]);
        self.pos += n as u32;
        n
    }

    fn write(&mut self, buf: &[u8]) -> usize {
        let mut data = self.data.lock();
        if data.deny_writes > 0 {
            return 0;
        }
        let start = (self.pos as usize).min(data.bytes.len());
        let n = buf.len().min(data.bytes.len() - start);
        data.bytes[start..start + n].copy_from_slice(&buf[..n]);
        self.pos += n as u32;
        n
    }

    fn seek(&mut self, pos: u32) {
        self.pos = pos;
    }

    fn tell(&self) -> u32 {
        self.pos
    }

    fn length(&self) -> u32 {
        self.data.lock().bytes.len() as u32
    }

    fn duplicate(&self) -> Option<Box<dyn OpenFile>> {
        {
            let mut state = self.fs.state.lock();
            match state.duplicate_budget {
                Some(0) => return None,
                Some(ref mut n) => *n -= 1,
                None => {}
            }
        }
        Some(self.fs.handle(self.data.clone(), self.pos))
    }

    fn deny_write(&mut self) {
        if !self.denying {
            self.denying = true;
            self.data.lock().deny_writes += 1;
        }
    }
}

impl Drop for RamFile {
    fn drop(&mut self) {
        if self.denying {
            self.data.lock().deny_writes -= 1;
        }
        self.fs.state.lock().closes += 1;
    }
}

/// Console fed from an input script. The stream closes when the script
/// runs out, unless it was kept open with [`ScriptConsole::keep_open`].
#[derive(Default)]
pub struct ScriptConsole {
    input: Mutex<VecDeque<u8>>,
    output: Mutex<Vec<u8>>,
    open: AtomicBool,
}

impl ScriptConsole {
    pub fn new(input: &[u8]) -> Self {
        Self {
            input: Mutex::new(input.iter().copied().collect()),
            output: Mutex::new(Vec::new()),
            open: AtomicBool::new(false),
        }
    }

    /// Readers finding no input wait instead of seeing end of stream.
    pub fn keep_open(&self) {
        self.open.store(true, Ordering::SeqCst);
    }

    /// Queue more input, as a keyboard interrupt would.
    pub fn push_input(&self, bytes: &[u8]) {
        self.input.lock().extend(bytes.iter().copied());
    }

    pub fn close_input(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    pub fn output(&self) -> String {
        String::from_utf8_lossy(&self.output.lock()).into_owned()
    }
}

impl Console for ScriptConsole {
    fn try_getc(&self) -> ConsoleInput {
        match self.input.lock().pop_front() {
            Some(byte) => ConsoleInput::Byte(byte),
            None if self.open.load(Ordering::SeqCst) => ConsoleInput::Empty,
            None => ConsoleInput::Closed,
        }
    }

    fn has_input(&self) -> bool {
        !self.input.lock().is_empty() || !self.open.load(Ordering::SeqCst)
    }

    fn putbuf(&self, buf: &[u8]) {
        self.output.lock().extend_from_slice(buf);
    }
}

/// Scheduler that records spawns instead of running them. `block_until`
/// spins the host thread, so the condition must be made true by another
/// thread (or already hold).
#[derive(Default)]
pub struct TestScheduler {
    spawned: Mutex<Vec<(Arc<Process>, TrapFrame)>>,
    wakes: Mutex<Vec<Pid>>,
    refuse_next: AtomicBool,
}

impl TestScheduler {
    /// Most recently spawned process with its entry frame.
    pub fn take_spawned(&self) -> Option<(Arc<Process>, TrapFrame)> {
        self.spawned.lock().pop()
    }

    pub fn refuse_next_spawn(&self) {
        self.refuse_next.store(true, Ordering::SeqCst);
    }

    pub fn wakes(&self) -> Vec<Pid> {
        self.wakes.lock().clone()
    }
}

impl Scheduler for TestScheduler {
    fn spawn(&self, process: Arc<Process>, frame: TrapFrame) -> Result<(), SpawnError> {
        if self.refuse_next.swap(false, Ordering::SeqCst) {
            return Err(SpawnError::Refused);
        }
        self.spawned.lock().push((process, frame));
        Ok(())
    }

    fn block_until(&self, ready: &dyn Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !ready() {
            assert!(Instant::now() < deadline, "blocked forever");
            std::thread::yield_now();
        }
    }

    fn wake(&self, pid: Pid) {
        self.wakes.lock().push(pid);
    }
}

/// Loader that accepts any file starting with [`EXE_MAGIC`] and maps one
/// read-only code page, two scratch pages and one stack page.
pub struct TestLoader;

impl Loader for TestLoader {
    fn load(
        &self,
        fs: &dyn FileSystem,
        path: &str,
        frame: &mut TrapFrame,
    ) -> Result<LoadedImage, LoadError> {
        let mut executable = fs.open(path).ok_or(LoadError::NotFound)?;
        let mut magic = [0u8; 4];
        if executable.read(&mut magic) != magic.len() || magic != EXE_MAGIC {
            return Err(LoadError::BadExecutable);
        }

        let mut space = PageMap::new();
        space
            .map(VirtAddr::new(CODE_BASE as usize), PageFlags::USER_RO)
            .map_err(|_| LoadError::OutOfMemory)?;
        space
            .map_range(VirtAddr::new(SCRATCH as usize), 2 * PAGE_SIZE, PageFlags::USER_RW)
            .map_err(|_| LoadError::OutOfMemory)?;
        space
            .map(VirtAddr::new(USER_STACK - PAGE_SIZE), PageFlags::USER_RW)
            .map_err(|_| LoadError::OutOfMemory)?;

        frame.rip = CODE_BASE;
        frame.rsp = USER_STACK as u64;
        Ok(LoadedImage {
            space: Box::new(space),
            executable,
        })
    }
}

/// A kernel wired to the test collaborators.
pub struct Rig {
    pub kernel: Kernel,
    pub fs: RamFs,
    pub console: Arc<ScriptConsole>,
    pub sched: Arc<TestScheduler>,
}

impl Rig {
    /// Rig with programs `prog` and `child` installed and no console input.
    pub fn new() -> Self {
        Self::with_input(b"")
    }

    pub fn with_input(input: &[u8]) -> Self {
        let fs = RamFs::new();
        fs.insert("prog", EXE_MAGIC);
        fs.insert("child", EXE_MAGIC);
        let console = Arc::new(ScriptConsole::new(input));
        let sched = Arc::new(TestScheduler::default());
        let kernel = Kernel::new(
            Arc::new(fs.clone()),
            console.clone(),
            sched.clone(),
            Arc::new(TestLoader),
        );
        Self {
            kernel,
            fs,
            console,
            sched,
        }
    }

    /// Start `cmdline` as the initial process and return it with its
    /// entry frame.
    pub fn start(&self, cmdline: &str) -> (Arc<Process>, TrapFrame) {
        self.kernel.create_initd(cmdline).unwrap();
        self.sched.take_spawned().unwrap()
    }

    /// Issue syscall `number` with `args` from `process`.
    pub fn syscall(
        &self,
        process: &Process,
        frame: &mut TrapFrame,
        number: u64,
        args: &[u64],
    ) -> Flow {
        let mut regs = [0u64; 6];
        regs[..args.len()].copy_from_slice(args);
        frame.regs.rax = number;
        frame.regs.rdi = regs[0];
        frame.regs.rsi = regs[1];
        frame.regs.rdx = regs[2];
        frame.regs.r10 = regs[3];
        frame.regs.r8 = regs[4];
        frame.regs.r9 = regs[5];
        self.kernel.dispatch(process, frame)
    }

    /// Write `bytes` into user memory at `addr`.
    pub fn poke(&self, process: &Process, addr: u64, bytes: &[u8]) {
        process
            .with_memory(|mem| mem.write_bytes(VirtAddr::new(addr as usize), bytes))
            .unwrap();
    }

    /// Write `s` plus a terminator at `addr` and return `addr`.
    pub fn poke_str(&self, process: &Process, addr: u64, s: &str) -> u64 {
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        self.poke(process, addr, &bytes);
        addr
    }

    /// Read `len` bytes of user memory at `addr`.
    pub fn peek(&self, process: &Process, addr: u64, len: usize) -> Vec<u8> {
        process
            .with_memory(|mem| {
                let slice = mem.check(addr, len, Access::Read)?;
                let mut out = alloc::vec![0u8; len];
                mem.copy_in(&slice, 0, &mut out)?;
                Ok(out)
            })
            .unwrap()
    }
}
