// Physical memory service for Imperium
use x86_64::PhysAddr;

use super::{with_core, KernelCore};
use crate::kassert;
use crate::memory::PhysicalMemoryManager;

#[track_caller]
fn initialized(core: &KernelCore) -> &PhysicalMemoryManager {
    kassert!(core.pmm.is_initialized(), "pmm: used before initialization");
    &core.pmm
}

// Memory service API functions

/// Bring up the page allocator. Everything below `reserved_end` belongs to
/// the kernel image and stays allocated forever.
pub fn pmm_initialize(total_memory_bytes: u64, reserved_end: PhysAddr) {
    with_core(|core| core.pmm.initialize(total_memory_bytes, reserved_end))
}

pub fn pmm_alloc_page() -> Option<PhysAddr> {
    with_core(|core| core.pmm.alloc_page())
}

pub fn pmm_free_page(addr: PhysAddr) {
    with_core(|core| core.pmm.free_page(addr))
}

pub fn pmm_alloc_contiguous(count: usize) -> Option<PhysAddr> {
    with_core(|core| core.pmm.alloc_contiguous(count))
}

pub fn pmm_free_contiguous(base: PhysAddr, count: usize) {
    with_core(|core| core.pmm.free_contiguous(base, count))
}

pub fn pmm_is_allocated(addr: PhysAddr) -> bool {
    with_core(|core| initialized(core).is_allocated(addr))
}

pub fn pmm_used_bytes() -> u64 {
    with_core(|core| initialized(core).used_bytes())
}

pub fn pmm_free_bytes() -> u64 {
    with_core(|core| initialized(core).free_bytes())
}

pub fn pmm_total_bytes() -> u64 {
    with_core(|core| initialized(core).total_bytes())
}
