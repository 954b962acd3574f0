// Process Management Module for Imperium
pub mod context;
pub mod fd;
pub mod pcb;
pub mod queue;
pub mod scheduler;
pub mod table;

pub use context::CpuRegisters;
pub use fd::{FdTable, FileHandle, FileTable};
pub use pcb::{Pid, ProcessError, ProcessInfo, ProcessKind, ProcessState, IDLE_PID};
pub use scheduler::{Scheduler, SchedulerStats};
pub use table::ProcessTable;
