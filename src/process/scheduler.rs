// Process Scheduler for Imperium
//
// Preemptive round-robin over a single ready queue. Every timer tick is a
// quantum boundary: the running process goes to the tail, elapsed sleepers
// follow it, and the head of the queue runs next.
use alloc::vec::Vec;
use core::panic::Location;
use x86_64::VirtAddr;

use super::context::CpuRegisters;
use super::fd::{FdTable, FileTable};
use super::pcb::{ParentRef, Pid, ProcessError, ProcessInfo, ProcessKind, ProcessState, IDLE_PID};
use super::queue::ReadyQueue;
use super::table::ProcessTable;
use crate::config::SchedulerConfig;
use crate::fatal::report_fatal;
use crate::memory::PhysicalMemoryManager;
use crate::{kassert, kfatal};

/// Scheduler statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerStats {
    pub current: Pid,
    /// Tick value handed to the most recent dispatch; not the live system
    /// tick count.
    pub last_dispatch_tick: u64,
    pub total_switches: u64,
    pub ready: usize,
    pub sleeping: usize,
    pub zombies: usize,
    pub live: usize,
}

pub struct Scheduler {
    config: SchedulerConfig,
    table: ProcessTable,
    ready: ReadyQueue,
    idle_slot: usize,
    current: Option<usize>,
    last_tick: u64,
    total_switches: u64,
}

impl Scheduler {
    /// Build the process table and register the code running right now as
    /// the idle process (pid 0, RUNNING).
    #[track_caller]
    pub fn new(config: SchedulerConfig) -> Self {
        config.validate();
        let mut table = ProcessTable::new(&config);
        let idle_slot = table.register_idle();

        log::info!(
            target: "sched",
            "process manager and scheduler initialized: {} slots, {} ms quantum ({} Hz)",
            config.max_processes,
            config.quantum_ms,
            config.tick_hz()
        );

        Self {
            config,
            ready: ReadyQueue::new(config.max_processes),
            table,
            idle_slot,
            current: Some(idle_slot),
            last_tick: 0,
            total_switches: 0,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Create a kernel thread starting at `entry`.
    pub fn spawn(&mut self, entry: VirtAddr, pmm: &mut PhysicalMemoryManager) -> Result<Pid, ProcessError> {
        self.create(entry, ProcessKind::KernelThread, "kthread", pmm)
    }

    /// Create a process, parented to the current one, and append it to the
    /// ready queue.
    #[track_caller]
    pub fn create(
        &mut self,
        entry: VirtAddr,
        kind: ProcessKind,
        name: &str,
        pmm: &mut PhysicalMemoryManager,
    ) -> Result<Pid, ProcessError> {
        let parent = self.current.and_then(|slot| {
            self.table.get(slot).map(|pcb| ParentRef { slot, pid: pcb.pid })
        });
        let (slot, pid) = self.table.create(entry, kind, name, parent, pmm)?;
        self.enqueue(slot);

        log::info!(target: "sched", "created process '{}' with pid {}", name, pid);
        Ok(pid)
    }

    /// Save `saved` into the outgoing process and pick the next one to run.
    ///
    /// Called on every timer tick and on every voluntary yield, sleep or
    /// exit. The returned context is what the interrupt return path must
    /// restore.
    #[track_caller]
    pub fn dispatch(&mut self, saved: &CpuRegisters, now: u64) -> CpuRegisters {
        self.last_tick = now;
        let previous = self.current.take();

        if let Some(slot) = previous {
            let pcb = match self.table.get_mut(slot) {
                Some(pcb) => pcb,
                None => report_fatal(
                    format_args!("scheduler: current slot {} holds no process", slot),
                    Location::caller(),
                    Some(saved),
                ),
            };
            let requeue = match pcb.state {
                ProcessState::Running => {
                    pcb.context = *saved;
                    pcb.state = ProcessState::Ready;
                    true
                }
                ProcessState::Sleeping => {
                    pcb.context = *saved;
                    false
                }
                ProcessState::Zombie => false,
                state => report_fatal(
                    format_args!("scheduler: outgoing pid {} in state {}", pcb.pid, state),
                    Location::caller(),
                    Some(saved),
                ),
            };
            if requeue {
                self.enqueue(slot);
            }
        }

        self.wake_sleepers(now);

        let next = match self.ready.pop() {
            Some(slot) => slot,
            None => report_fatal(
                format_args!("scheduler: no runnable process, not even idle"),
                Location::caller(),
                Some(saved),
            ),
        };
        let pcb = match self.table.get_mut(next) {
            Some(pcb) if pcb.state == ProcessState::Ready => pcb,
            _ => kfatal!("scheduler: ready queue held slot {} which is not READY", next),
        };
        pcb.state = ProcessState::Running;
        let context = pcb.context;

        if previous != Some(next) {
            self.total_switches += 1;
        }
        self.current = Some(next);
        context
    }

    /// Voluntarily give up the rest of the quantum.
    #[track_caller]
    pub fn yield_now(&mut self, saved: &CpuRegisters, now: u64) -> CpuRegisters {
        self.dispatch(saved, now)
    }

    /// Put the running process to sleep for at least `ms` and dispatch.
    #[track_caller]
    pub fn sleep(&mut self, ms: u64, saved: &CpuRegisters, now: u64) -> CpuRegisters {
        let delta = self.config.ms_to_ticks(ms);
        let slot = self.running_slot();
        kassert!(slot != self.idle_slot, "scheduler: the idle process cannot sleep");

        if let Some(pcb) = self.table.get_mut(slot) {
            pcb.wake_tick = now.saturating_add(delta);
            pcb.state = ProcessState::Sleeping;
            log::debug!(target: "sched", "pid {} sleeping until tick {}", pcb.pid, pcb.wake_tick);
        }
        self.dispatch(saved, now)
    }

    /// Terminate the running process with `code` and dispatch. The process
    /// stays a ZOMBIE until reaped; its children are handed to idle.
    #[track_caller]
    pub fn exit(&mut self, code: i32, saved: &CpuRegisters, now: u64) -> CpuRegisters {
        let slot = self.running_slot();
        kassert!(slot != self.idle_slot, "scheduler: the idle process cannot exit");

        let pid = match self.table.get_mut(slot) {
            Some(pcb) => {
                pcb.state = ProcessState::Zombie;
                pcb.exit_code = Some(code);
                pcb.pid
            }
            None => kfatal!("scheduler: current slot {} holds no process", slot),
        };
        self.reparent_children(ParentRef { slot, pid });

        log::info!(target: "sched", "pid {} exited with code {}", pid, code);
        self.dispatch(saved, now)
    }

    /// Reclaim an exited process. See [`ProcessTable::reap`].
    #[track_caller]
    pub fn reap(
        &mut self,
        pid: Pid,
        pmm: &mut PhysicalMemoryManager,
        files: &mut dyn FileTable,
    ) -> Result<ProcessInfo, ProcessError> {
        let info = self.table.reap(pid, pmm, files)?;
        log::debug!(target: "sched", "reaped pid {} (exit code {:?})", pid, info.exit_code);
        Ok(info)
    }

    pub fn current_pid(&self) -> Pid {
        self.current
            .and_then(|slot| self.table.get(slot))
            .map_or(IDLE_PID, |pcb| pcb.pid)
    }

    pub fn lookup(&self, pid: Pid) -> Option<ProcessInfo> {
        self.table.info(self.table.lookup(pid)?)
    }

    /// Snapshot of every live PCB in table-slot order.
    pub fn processes(&self) -> Vec<ProcessInfo> {
        self.table
            .iter()
            .filter_map(|(slot, _)| self.table.info(slot))
            .collect()
    }

    /// Descriptor table of `pid`, for the VFS to fill.
    pub fn open_files_mut(&mut self, pid: Pid) -> Option<&mut FdTable> {
        let slot = self.table.lookup(pid)?;
        self.table.get_mut(slot).map(|pcb| &mut pcb.open_files)
    }

    pub fn stats(&self) -> SchedulerStats {
        let count = |state: ProcessState| self.table.iter().filter(|(_, pcb)| pcb.state == state).count();
        SchedulerStats {
            current: self.current_pid(),
            last_dispatch_tick: self.last_tick,
            total_switches: self.total_switches,
            ready: self.ready.len(),
            sleeping: count(ProcessState::Sleeping),
            zombies: count(ProcessState::Zombie),
            live: self.table.iter().count(),
        }
    }

    #[track_caller]
    fn enqueue(&mut self, slot: usize) {
        let queued = self.ready.push(slot);
        kassert!(queued, "scheduler: slot {} enqueued twice", slot);
    }

    /// Slot of the RUNNING process; only it may change its own state.
    #[track_caller]
    fn running_slot(&self) -> usize {
        let running = self
            .current
            .filter(|&slot| matches!(self.table.get(slot), Some(pcb) if pcb.state == ProcessState::Running));
        match running {
            Some(slot) => slot,
            None => kfatal!("scheduler: no running process to change state"),
        }
    }

    /// Move every elapsed sleeper to the tail of the ready queue, earliest
    /// wake tick first, slot order among equals.
    fn wake_sleepers(&mut self, now: u64) {
        let mut woken: Vec<(u64, usize)> = self
            .table
            .iter()
            .filter(|(_, pcb)| pcb.state == ProcessState::Sleeping && pcb.wake_tick <= now)
            .map(|(slot, pcb)| (pcb.wake_tick, slot))
            .collect();
        woken.sort_unstable();

        for (_, slot) in woken {
            if let Some(pcb) = self.table.get_mut(slot) {
                pcb.state = ProcessState::Ready;
            }
            self.enqueue(slot);
        }
    }

    fn reparent_children(&mut self, parent: ParentRef) {
        let idle = ParentRef {
            slot: self.idle_slot,
            pid: IDLE_PID,
        };
        for (_, pcb) in self.table.iter_mut() {
            if pcb.parent == Some(parent) {
                pcb.parent = Some(idle);
            }
        }
    }
}
