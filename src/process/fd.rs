// Per-process open file descriptor slots
use alloc::vec;
use alloc::vec::Vec;

use crate::config::MAX_FILE_DESCRIPTORS;

/// Opaque handle owned by the VFS; the scheduler never looks inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FileHandle(pub u64);

/// The external open-file table. Reaping a process closes every handle
/// the process still holds through this trait.
pub trait FileTable {
    fn close(&mut self, handle: FileHandle);
}

/// Fixed-capacity descriptor table owned by a PCB.
#[derive(Debug, Clone)]
pub struct FdTable {
    slots: Vec<Option<FileHandle>>,
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new()
    }
}

impl FdTable {
    pub fn new() -> Self {
        Self {
            slots: vec![None; MAX_FILE_DESCRIPTORS],
        }
    }

    /// Store `handle` in the lowest free descriptor. `None` when all
    /// `MAX_FILE_DESCRIPTORS` slots are taken.
    pub fn install(&mut self, handle: FileHandle) -> Option<usize> {
        let fd = self.slots.iter().position(Option::is_none)?;
        self.slots[fd] = Some(handle);
        Some(fd)
    }

    pub fn get(&self, fd: usize) -> Option<FileHandle> {
        self.slots.get(fd).copied().flatten()
    }

    pub fn remove(&mut self, fd: usize) -> Option<FileHandle> {
        self.slots.get_mut(fd)?.take()
    }

    pub fn open_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Close every open descriptor through `files`, leaving the table empty.
    pub fn close_all(&mut self, files: &mut dyn FileTable) {
        for slot in self.slots.iter_mut() {
            if let Some(handle) = slot.take() {
                files.close(handle);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder(Vec<FileHandle>);

    impl FileTable for Recorder {
        fn close(&mut self, handle: FileHandle) {
            self.0.push(handle);
        }
    }

    #[test]
    fn install_uses_lowest_free_descriptor() {
        let mut table = FdTable::new();
        assert_eq!(table.install(FileHandle(10)), Some(0));
        assert_eq!(table.install(FileHandle(11)), Some(1));
        assert_eq!(table.remove(0), Some(FileHandle(10)));
        assert_eq!(table.install(FileHandle(12)), Some(0));
        assert_eq!(table.get(1), Some(FileHandle(11)));
        assert_eq!(table.get(MAX_FILE_DESCRIPTORS), None);
    }

    #[test]
    fn full_table_refuses_install() {
        let mut table = FdTable::new();
        for i in 0..MAX_FILE_DESCRIPTORS {
            assert_eq!(table.install(FileHandle(i as u64)), Some(i));
        }
        assert_eq!(table.install(FileHandle(999)), None);
    }

    #[test]
    fn close_all_delegates_every_open_handle() {
        let mut table = FdTable::new();
        table.install(FileHandle(1));
        table.install(FileHandle(2));
        table.install(FileHandle(3));
        table.remove(1);

        let mut files = Recorder(Vec::new());
        table.close_all(&mut files);
        assert_eq!(files.0, vec![FileHandle(1), FileHandle(3)]);
        assert_eq!(table.open_count(), 0);
    }
}
