// Process table: fixed-capacity arena of PCBs indexed by slot
use alloc::vec::Vec;
use x86_64::{PhysAddr, VirtAddr};

use super::context::CpuRegisters;
use super::fd::FileTable;
use super::pcb::{
    ParentRef, Pid, ProcessControlBlock, ProcessError, ProcessInfo, ProcessKind, ProcessState,
    IDLE_PID,
};
use crate::config::SchedulerConfig;
use crate::kassert;
use crate::memory::PhysicalMemoryManager;

pub struct ProcessTable {
    slots: Vec<Option<ProcessControlBlock>>,
    next_pid: Pid,
    kernel_stack_pages: usize,
    user_stack_pages: usize,
}

impl ProcessTable {
    pub fn new(config: &SchedulerConfig) -> Self {
        let mut slots = Vec::with_capacity(config.max_processes);
        slots.resize_with(config.max_processes, || None);
        Self {
            slots,
            next_pid: IDLE_PID + 1,
            kernel_stack_pages: config.kernel_stack_pages,
            user_stack_pages: config.user_stack_pages,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Record the code already executing at boot as pid 0, RUNNING. It runs
    /// on the boot stack, so no pages are allocated for it.
    #[track_caller]
    pub fn register_idle(&mut self) -> usize {
        kassert!(
            self.slots.iter().all(Option::is_none),
            "process table: idle process registered into a populated table"
        );
        let mut idle =
            ProcessControlBlock::new(IDLE_PID, "idle", ProcessKind::KernelThread, CpuRegisters::default());
        idle.state = ProcessState::Running;
        self.slots[0] = Some(idle);
        0
    }

    /// Allocate a slot and stack pages for a new process in READY state.
    ///
    /// Nothing is left behind on failure: the slot stays free and any page
    /// already taken goes back to `pmm`.
    pub fn create(
        &mut self,
        entry: VirtAddr,
        kind: ProcessKind,
        name: &str,
        parent: Option<ParentRef>,
        pmm: &mut PhysicalMemoryManager,
    ) -> Result<(usize, Pid), ProcessError> {
        let slot = match self.slots.iter().position(Option::is_none) {
            Some(slot) => slot,
            None => {
                log::warn!(target: "sched", "process table full ({} slots)", self.capacity());
                return Err(ProcessError::TableFull);
            }
        };

        let kernel_stack = alloc_stack(pmm, self.kernel_stack_pages).ok_or(ProcessError::OutOfMemory)?;
        let (user_stack, context) = match kind {
            ProcessKind::KernelThread => (
                0,
                CpuRegisters::kernel_thread(entry, kernel_stack.as_u64(), self.kernel_stack_pages),
            ),
            ProcessKind::User => {
                let user_stack = match alloc_stack(pmm, self.user_stack_pages) {
                    Some(stack) => stack,
                    None => {
                        free_stack(pmm, kernel_stack.as_u64(), self.kernel_stack_pages);
                        return Err(ProcessError::OutOfMemory);
                    }
                };
                let context = CpuRegisters::user_process(
                    entry,
                    kernel_stack.as_u64(),
                    self.kernel_stack_pages,
                    user_stack.as_u64(),
                    self.user_stack_pages,
                );
                (user_stack.as_u64(), context)
            }
        };

        let pid = self.next_pid;
        self.next_pid += 1;

        let mut pcb = ProcessControlBlock::new(pid, name, kind, context);
        pcb.kernel_stack = kernel_stack.as_u64();
        pcb.user_stack = user_stack;
        pcb.parent = parent;
        self.slots[slot] = Some(pcb);
        Ok((slot, pid))
    }

    /// Linear scan from pid to slot.
    pub fn lookup(&self, pid: Pid) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| matches!(slot, Some(pcb) if pcb.pid == pid))
    }

    pub fn get(&self, slot: usize) -> Option<&ProcessControlBlock> {
        self.slots.get(slot)?.as_ref()
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut ProcessControlBlock> {
        self.slots.get_mut(slot)?.as_mut()
    }

    /// Live PCBs in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &ProcessControlBlock)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, pcb)| pcb.as_ref().map(|pcb| (slot, pcb)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut ProcessControlBlock)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(slot, pcb)| pcb.as_mut().map(|pcb| (slot, pcb)))
    }

    /// Follow a parent link, `None` once the parent's slot was reaped or reused.
    pub fn resolve_parent(&self, parent: Option<ParentRef>) -> Option<Pid> {
        let parent = parent?;
        self.get(parent.slot)
            .filter(|pcb| pcb.pid == parent.pid)
            .map(|pcb| pcb.pid)
    }

    pub fn info(&self, slot: usize) -> Option<ProcessInfo> {
        let pcb = self.get(slot)?;
        Some(ProcessInfo {
            pid: pcb.pid,
            name: pcb.name.clone(),
            state: pcb.state,
            parent: self.resolve_parent(pcb.parent),
            wake_tick: (pcb.state == ProcessState::Sleeping).then(|| pcb.wake_tick),
            exit_code: pcb.exit_code,
        })
    }

    /// Reclaim a ZOMBIE: close its descriptors, give its stacks back and
    /// free the slot. Returns the final snapshot, in state DEAD.
    #[track_caller]
    pub fn reap(
        &mut self,
        pid: Pid,
        pmm: &mut PhysicalMemoryManager,
        files: &mut dyn FileTable,
    ) -> Result<ProcessInfo, ProcessError> {
        let slot = self.lookup(pid).ok_or(ProcessError::NotFound)?;
        let state = self.slots[slot].as_ref().map(|pcb| pcb.state);
        kassert!(
            state == Some(ProcessState::Zombie),
            "reap of pid {} which is not a zombie ({:?})",
            pid,
            state
        );

        let mut info = match self.info(slot) {
            Some(info) => info,
            None => return Err(ProcessError::NotFound),
        };
        let mut pcb = match self.slots[slot].take() {
            Some(pcb) => pcb,
            None => return Err(ProcessError::NotFound),
        };
        pcb.open_files.close_all(files);
        free_stack(pmm, pcb.kernel_stack, self.kernel_stack_pages);
        if pcb.kind == ProcessKind::User {
            free_stack(pmm, pcb.user_stack, self.user_stack_pages);
        }

        info.state = ProcessState::Dead;
        Ok(info)
    }
}

fn alloc_stack(pmm: &mut PhysicalMemoryManager, pages: usize) -> Option<PhysAddr> {
    if pages == 1 {
        pmm.alloc_page()
    } else {
        pmm.alloc_contiguous(pages)
    }
}

fn free_stack(pmm: &mut PhysicalMemoryManager, base: u64, pages: usize) {
    if pages == 1 {
        pmm.free_page(PhysAddr::new(base));
    } else {
        pmm.free_contiguous(PhysAddr::new(base), pages);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PAGE_SIZE;
    use crate::process::fd::FileHandle;

    fn pmm(pages: u64) -> PhysicalMemoryManager {
        let mut pmm = PhysicalMemoryManager::new();
        pmm.initialize((pages + 1) * PAGE_SIZE, PhysAddr::new(PAGE_SIZE));
        pmm
    }

    fn entry(n: u64) -> VirtAddr {
        VirtAddr::new(0x10_0000 + n * 0x1000)
    }

    struct NoFiles;

    impl FileTable for NoFiles {
        fn close(&mut self, _handle: FileHandle) {}
    }

    #[test]
    fn full_table_refuses_third_process() {
        let mut pmm = pmm(16);
        let mut table = ProcessTable::new(&SchedulerConfig::with_capacity(2));

        let (a, pid_a) = table.create(entry(1), ProcessKind::KernelThread, "a", None, &mut pmm).unwrap();
        let (b, pid_b) = table.create(entry(2), ProcessKind::KernelThread, "b", None, &mut pmm).unwrap();
        let used = pmm.used_pages();

        let third = table.create(entry(3), ProcessKind::KernelThread, "c", None, &mut pmm);
        assert_eq!(third, Err(ProcessError::TableFull));
        assert_eq!(pmm.used_pages(), used);
        assert_eq!(table.get(a).unwrap().state, ProcessState::Ready);
        assert_eq!(table.get(b).unwrap().state, ProcessState::Ready);
        assert_eq!((pid_a, pid_b), (1, 2));
    }

    #[test]
    fn out_of_memory_rolls_back_slot() {
        let mut pmm = pmm(1);
        let mut table = ProcessTable::new(&SchedulerConfig::with_capacity(4));

        table.create(entry(1), ProcessKind::KernelThread, "a", None, &mut pmm).unwrap();
        let failed = table.create(entry(2), ProcessKind::KernelThread, "b", None, &mut pmm);
        assert_eq!(failed, Err(ProcessError::OutOfMemory));
        assert_eq!(table.iter().count(), 1);
    }

    #[test]
    fn user_process_releases_kernel_stack_when_user_stack_fails() {
        let mut pmm = pmm(1);
        let mut table = ProcessTable::new(&SchedulerConfig::with_capacity(4));

        let failed = table.create(entry(1), ProcessKind::User, "u", None, &mut pmm);
        assert_eq!(failed, Err(ProcessError::OutOfMemory));
        assert_eq!(pmm.used_pages(), 1);
        assert_eq!(table.iter().count(), 0);
    }

    #[test]
    fn new_process_context_points_at_its_stack() {
        let mut pmm = pmm(8);
        let mut table = ProcessTable::new(&SchedulerConfig::default());
        let (slot, _) = table.create(entry(7), ProcessKind::KernelThread, "k", None, &mut pmm).unwrap();

        let pcb = table.get(slot).unwrap();
        assert_eq!(pcb.context.rip, entry(7).as_u64());
        assert_eq!(pcb.context.rsp, pcb.kernel_stack + PAGE_SIZE);
        assert!(pmm.is_allocated(PhysAddr::new(pcb.kernel_stack)));
        assert_eq!(pcb.user_stack, 0);
    }

    #[test]
    fn lookup_scans_by_pid_not_slot() {
        let mut pmm = pmm(8);
        let mut table = ProcessTable::new(&SchedulerConfig::default());
        assert_eq!(table.register_idle(), 0);
        let (slot, pid) = table.create(entry(1), ProcessKind::KernelThread, "a", None, &mut pmm).unwrap();

        assert_eq!(table.lookup(IDLE_PID), Some(0));
        assert_eq!(table.lookup(pid), Some(slot));
        assert_eq!(table.lookup(99), None);
    }

    #[test]
    fn stale_parent_link_does_not_resolve() {
        let mut pmm = pmm(8);
        let mut table = ProcessTable::new(&SchedulerConfig::default());
        let (slot, pid) = table.create(entry(1), ProcessKind::KernelThread, "p", None, &mut pmm).unwrap();
        let link = Some(ParentRef { slot, pid });
        assert_eq!(table.resolve_parent(link), Some(pid));

        table.get_mut(slot).unwrap().state = ProcessState::Zombie;
        table.reap(pid, &mut pmm, &mut NoFiles).unwrap();
        table.create(entry(2), ProcessKind::KernelThread, "q", None, &mut pmm).unwrap();
        assert_eq!(table.resolve_parent(link), None);
    }

    #[test]
    fn reap_unknown_pid_is_not_found() {
        let mut pmm = pmm(8);
        let mut table = ProcessTable::new(&SchedulerConfig::default());
        assert_eq!(table.reap(5, &mut pmm, &mut NoFiles).unwrap_err(), ProcessError::NotFound);
    }

    #[test]
    #[should_panic(expected = "not a zombie")]
    fn reap_of_live_process_is_fatal() {
        let mut pmm = pmm(8);
        let mut table = ProcessTable::new(&SchedulerConfig::default());
        let (_, pid) = table.create(entry(1), ProcessKind::KernelThread, "a", None, &mut pmm).unwrap();
        let _ = table.reap(pid, &mut pmm, &mut NoFiles);
    }
}
