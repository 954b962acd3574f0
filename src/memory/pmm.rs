// Physical Memory Manager for Imperium
use x86_64::PhysAddr;

use super::bitmap::PageBitmap;
use crate::config::PAGE_SIZE;
use crate::kassert;

/// Bitmap allocator over the physical pages `0..total_pages`.
///
/// Single pages are handed out with a rotating cursor: each scan starts
/// right after the last successful allocation and wraps around once, so a
/// sequential workload never rescans the low, reserved end of memory.
#[derive(Debug)]
pub struct PhysicalMemoryManager {
    bitmap: PageBitmap,
    total_pages: usize,
    used_pages: usize,
    next_index: usize,
    initialized: bool,
}

impl Default for PhysicalMemoryManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicalMemoryManager {
    /// An allocator that still needs [`initialize`](Self::initialize).
    pub fn new() -> Self {
        Self {
            bitmap: PageBitmap::new(0),
            total_pages: 0,
            used_pages: 0,
            next_index: 0,
            initialized: false,
        }
    }

    /// Size the bitmap for `total_memory_bytes` and reserve every page below
    /// `reserved_end` (rounded up to a page boundary): the kernel image and
    /// the allocator's own storage.
    #[track_caller]
    pub fn initialize(&mut self, total_memory_bytes: u64, reserved_end: PhysAddr) {
        kassert!(!self.initialized, "pmm: initialized twice");

        let total_pages = (total_memory_bytes / PAGE_SIZE) as usize;
        let reserved_pages = ((reserved_end.as_u64() + PAGE_SIZE - 1) / PAGE_SIZE) as usize;
        kassert!(
            reserved_pages < total_pages,
            "pmm: not enough memory to start ({} pages, {} reserved)",
            total_pages,
            reserved_pages
        );

        let mut bitmap = PageBitmap::new(total_pages);
        for index in 0..reserved_pages {
            bitmap.set(index);
        }

        self.bitmap = bitmap;
        self.total_pages = total_pages;
        self.used_pages = reserved_pages;
        self.next_index = reserved_pages;
        self.initialized = true;

        log::info!(
            target: "pmm",
            "physical memory manager initialized: {} KiB in {} pages, {} reserved",
            total_pages as u64 * PAGE_SIZE / 1024,
            total_pages,
            reserved_pages
        );
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Allocate one page frame. `None` means out of memory.
    #[track_caller]
    pub fn alloc_page(&mut self) -> Option<PhysAddr> {
        self.ensure_initialized();

        let start = self.next_index;
        let found = self
            .bitmap
            .find_clear_in(start, self.total_pages)
            .or_else(|| self.bitmap.find_clear_in(0, start));

        match found {
            Some(index) => {
                self.bitmap.set(index);
                self.used_pages += 1;
                self.next_index = index + 1;
                Some(page_address(index))
            }
            None => {
                log::warn!(target: "pmm", "out of physical memory ({} pages in use)", self.used_pages);
                None
            }
        }
    }

    /// Release a page obtained from [`alloc_page`](Self::alloc_page).
    ///
    /// Unaligned, out-of-range or already free addresses are caller bugs and
    /// go to the fatal reporter before any bookkeeping changes.
    #[track_caller]
    pub fn free_page(&mut self, addr: PhysAddr) {
        self.ensure_initialized();
        let index = self.checked_index(addr);
        kassert!(self.bitmap.test(index), "pmm: double free of page {:#x}", addr.as_u64());

        self.bitmap.clear(index);
        self.used_pages -= 1;
    }

    /// Allocate `count` adjacent pages, all or nothing. Returns the base.
    #[track_caller]
    pub fn alloc_contiguous(&mut self, count: usize) -> Option<PhysAddr> {
        self.ensure_initialized();

        let base = match self.bitmap.find_clear_run(count) {
            Some(base) => base,
            None => {
                log::warn!(target: "pmm", "no run of {} free pages", count);
                return None;
            }
        };
        for index in base..base + count {
            self.bitmap.set(index);
        }
        self.used_pages += count;
        Some(page_address(base))
    }

    /// Release a run of `count` pages starting at `base`. Every page is
    /// validated before any is cleared.
    #[track_caller]
    pub fn free_contiguous(&mut self, base: PhysAddr, count: usize) {
        self.ensure_initialized();
        let first = self.checked_index(base);
        kassert!(
            count <= self.total_pages - first,
            "pmm: run of {} pages at {:#x} leaves physical memory",
            count,
            base.as_u64()
        );
        for index in first..first + count {
            kassert!(
                self.bitmap.test(index),
                "pmm: double free of page {:#x}",
                page_address(index).as_u64()
            );
        }

        for index in first..first + count {
            self.bitmap.clear(index);
        }
        self.used_pages -= count;
    }

    /// Whether the page holding `addr` is currently allocated. Addresses
    /// outside physical memory always are.
    pub fn is_allocated(&self, addr: PhysAddr) -> bool {
        self.bitmap.test((addr.as_u64() / PAGE_SIZE) as usize)
    }

    pub fn total_pages(&self) -> usize {
        self.total_pages
    }

    pub fn used_pages(&self) -> usize {
        self.used_pages
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_pages as u64 * PAGE_SIZE
    }

    pub fn used_bytes(&self) -> u64 {
        self.used_pages as u64 * PAGE_SIZE
    }

    pub fn free_bytes(&self) -> u64 {
        (self.total_pages - self.used_pages) as u64 * PAGE_SIZE
    }

    #[track_caller]
    fn ensure_initialized(&self) {
        kassert!(self.initialized, "pmm: used before initialization");
    }

    #[track_caller]
    fn checked_index(&self, addr: PhysAddr) -> usize {
        let raw = addr.as_u64();
        kassert!(raw % PAGE_SIZE == 0, "pmm: free of unaligned address {:#x}", raw);
        let index = (raw / PAGE_SIZE) as usize;
        kassert!(
            index < self.total_pages,
            "pmm: free of address {:#x} outside physical memory",
            raw
        );
        index
    }
}

fn page_address(index: usize) -> PhysAddr {
    PhysAddr::new(index as u64 * PAGE_SIZE)
}
