//! x86-64 Trap Frame
//!
//! The register state saved by the trap trampoline when user code executes
//! `syscall` or faults. The syscall layer reads the syscall number and
//! arguments from it and writes the return value back into it.
//!
//! # Calling Convention
//! - `rax`: syscall number on entry, return value on exit
//! - `rdi, rsi, rdx, r10, r8, r9`: arguments 1 through 6
//!
//! # Security Considerations
//! - The frame is passed explicitly to every handler that needs it; there is
//!   no global "current frame" a concurrent trap could overwrite
//! - Frames built for fresh user images only ever carry user selectors

/// User code segment selector.
pub const SEL_UCSEG: u64 = 0x23;
/// User data segment selector.
pub const SEL_UDSEG: u64 = 0x1b;
/// Interrupt enable flag.
pub const FLAG_IF: u64 = 1 << 9;
/// Must-be-set flag bit.
pub const FLAG_MBS: u64 = 1 << 1;

/// General purpose registers in the order the trampoline pushes them.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Registers {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rsi: u64,
    pub rdi: u64,
    pub rbp: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rbx: u64,
    pub rax: u64,
}

/// Saved user context.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrapFrame {
    /// General purpose registers.
    pub regs: Registers,
    pub es: u64,
    pub ds: u64,
    pub vec_no: u64,
    pub error_code: u64,
    /// Return address in user code.
    pub rip: u64,
    pub cs: u64,
    pub eflags: u64,
    /// User stack pointer.
    pub rsp: u64,
    pub ss: u64,
}

impl TrapFrame {
    /// Frame for entering a freshly loaded user image.
    ///
    /// The loader fills in `rip` and `rsp`.
    pub fn user_entry() -> Self {
        Self {
            es: SEL_UDSEG,
            ds: SEL_UDSEG,
            ss: SEL_UDSEG,
            cs: SEL_UCSEG,
            eflags: FLAG_IF | FLAG_MBS,
            ..Self::default()
        }
    }

    /// Syscall number (`rax`).
    #[inline]
    pub fn syscall_number(&self) -> u64 {
        self.regs.rax
    }

    /// The six argument registers in ABI order.
    #[inline]
    pub fn syscall_args(&self) -> [u64; 6] {
        let r = &self.regs;
        [r.rdi, r.rsi, r.rdx, r.r10, r.r8, r.r9]
    }

    /// Store a syscall return value into `rax`.
    #[inline]
    pub fn set_return(&mut self, value: i64) {
        self.regs.rax = value as u64;
    }

    /// Return value as user code will see it.
    #[inline]
    pub fn return_value(&self) -> i64 {
        self.regs.rax as i64
    }
}

/// Kind of trap that arrived from user mode outside the syscall path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserFault {
    /// Page fault on an unmapped or protected user page.
    PageFault { addr: u64, write: bool },
    /// Any other exception (divide error, invalid opcode, ...).
    Exception { vector: u64 },
}
