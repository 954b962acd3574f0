// Saved execution context for Imperium processes
use core::fmt;
use x86_64::VirtAddr;

use crate::config::PAGE_SIZE;

pub const KERNEL_CODE_SELECTOR: u64 = 0x08;
pub const KERNEL_DATA_SELECTOR: u64 = 0x10;
pub const USER_CODE_SELECTOR: u64 = 0x1B;
pub const USER_DATA_SELECTOR: u64 = 0x23;

/// RFLAGS with only the interrupt flag (and the always-one bit 1) set.
pub const INITIAL_RFLAGS: u64 = 0x202;

/// Register snapshot taken at the interrupt boundary.
///
/// The interrupt layer pushes this on entry and pops whatever
/// [`dispatch`](crate::process::scheduler::Scheduler::dispatch) hands back,
/// so the layout is fixed.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuRegisters {
    pub rax: u64,
    pub rbx: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rsi: u64,
    pub rdi: u64,
    pub rbp: u64,
    pub r8: u64,
    pub r9: u64,
    pub r10: u64,
    pub r11: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
    pub rip: u64,    // Instruction pointer
    pub cs: u64,     // Code segment
    pub rflags: u64, // CPU flags
    pub rsp: u64,    // Kernel stack pointer
    pub user_rsp: u64,
    pub ss: u64, // Stack segment
}

impl Default for CpuRegisters {
    fn default() -> Self {
        Self {
            rax: 0, rbx: 0, rcx: 0, rdx: 0,
            rsi: 0, rdi: 0, rbp: 0,
            r8: 0, r9: 0, r10: 0, r11: 0,
            r12: 0, r13: 0, r14: 0, r15: 0,
            rip: 0,
            cs: KERNEL_CODE_SELECTOR,
            rflags: INITIAL_RFLAGS,
            rsp: 0,
            user_rsp: 0,
            ss: KERNEL_DATA_SELECTOR,
        }
    }
}

impl CpuRegisters {
    /// Context for a kernel thread that has never run: execution starts at
    /// `entry` on top of the kernel stack at `kernel_stack_base`.
    pub fn kernel_thread(entry: VirtAddr, kernel_stack_base: u64, stack_pages: usize) -> Self {
        let top = stack_top(kernel_stack_base, stack_pages);
        Self {
            rip: entry.as_u64(),
            rsp: top,
            rbp: top,
            ..Self::default()
        }
    }

    /// Context for a user process that has never run. The kernel stack
    /// still backs the trap path, `user_rsp` is what ring 3 starts with.
    pub fn user_process(
        entry: VirtAddr,
        kernel_stack_base: u64,
        kernel_stack_pages: usize,
        user_stack_base: u64,
        user_stack_pages: usize,
    ) -> Self {
        let user_top = stack_top(user_stack_base, user_stack_pages);
        Self {
            rip: entry.as_u64(),
            cs: USER_CODE_SELECTOR,
            ss: USER_DATA_SELECTOR,
            rsp: stack_top(kernel_stack_base, kernel_stack_pages),
            user_rsp: user_top,
            rbp: user_top,
            ..Self::default()
        }
    }

    pub fn is_user_mode(&self) -> bool {
        self.cs & 0b11 == 3
    }
}

/// First usable stack address of a run of pages, aligned down to 16 bytes.
fn stack_top(base: u64, pages: usize) -> u64 {
    (base + pages as u64 * PAGE_SIZE) & !0xF
}

impl fmt::Display for CpuRegisters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows: [[(&str, u64); 4]; 5] = [
            [("rax", self.rax), ("rbx", self.rbx), ("rcx", self.rcx), ("rdx", self.rdx)],
            [("rsi", self.rsi), ("rdi", self.rdi), ("rbp", self.rbp), ("r8", self.r8)],
            [("r9", self.r9), ("r10", self.r10), ("r11", self.r11), ("r12", self.r12)],
            [("r13", self.r13), ("r14", self.r14), ("r15", self.r15), ("rsp", self.rsp)],
            [("rip", self.rip), ("cs", self.cs), ("rflags", self.rflags), ("ursp", self.user_rsp)],
        ];
        for row in rows.iter() {
            for (name, value) in row.iter() {
                write!(f, "{:>6}: {:#018x} ", name, value)?;
            }
            writeln!(f)?;
        }
        write!(f, "{:>6}: {:#018x}", "ss", self.ss)
    }
}
