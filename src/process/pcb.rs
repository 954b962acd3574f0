// Process Control Block (PCB) for Imperium
use alloc::string::String;
use core::fmt;

use super::context::CpuRegisters;
use super::fd::FdTable;

/// Process ID type
pub type Pid = u64;

/// The idle/bootstrap process.
pub const IDLE_PID: Pid = 0;

/// Process state enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Ready,    // In the ready queue
    Running,  // Currently executing
    Sleeping, // Waiting for its wake tick
    Zombie,   // Exited, waiting to be reaped
    Dead,     // Reaped, slot reusable
}

impl ProcessState {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessState::Ready => "ready",
            ProcessState::Running => "running",
            ProcessState::Sleeping => "sleeping",
            ProcessState::Zombie => "zombie",
            ProcessState::Dead => "dead",
        }
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessKind {
    KernelThread,
    User,
}

/// Non-owning link to a parent PCB.
///
/// Slots are reused after reaping, so the pid is kept alongside the slot
/// and both must match for the link to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentRef {
    pub slot: usize,
    pub pid: Pid,
}

/// Process Control Block
#[derive(Debug)]
pub struct ProcessControlBlock {
    pub pid: Pid,
    pub name: String,
    pub kind: ProcessKind,
    pub state: ProcessState,
    pub context: CpuRegisters,
    pub kernel_stack: u64,
    /// Zero for kernel threads.
    pub user_stack: u64,
    /// Only meaningful while `state == Sleeping`.
    pub wake_tick: u64,
    pub parent: Option<ParentRef>,
    pub open_files: FdTable,
    pub exit_code: Option<i32>,
}

impl ProcessControlBlock {
    pub fn new(pid: Pid, name: &str, kind: ProcessKind, context: CpuRegisters) -> Self {
        Self {
            pid,
            name: String::from(name),
            kind,
            state: ProcessState::Ready,
            context,
            kernel_stack: 0,
            user_stack: 0,
            wake_tick: 0,
            parent: None,
            open_files: FdTable::new(),
            exit_code: None,
        }
    }
}

/// Process management errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessError {
    TableFull,
    OutOfMemory,
    NotFound,
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessError::TableFull => f.write_str("process table is full"),
            ProcessError::OutOfMemory => f.write_str("out of memory for process stacks"),
            ProcessError::NotFound => f.write_str("no such process"),
        }
    }
}

/// Read-only snapshot of a PCB for shell-style tooling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: Pid,
    pub name: String,
    pub state: ProcessState,
    pub parent: Option<Pid>,
    pub wake_tick: Option<u64>,
    pub exit_code: Option<i32>,
}

impl fmt::Display for ProcessInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{:<8}\t{}\t{}",
            self.pid,
            self.state,
            self.parent.unwrap_or(IDLE_PID),
            self.name
        )
    }
}
