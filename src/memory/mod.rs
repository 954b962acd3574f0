// Physical memory management
pub mod bitmap;
pub mod pmm;

pub use bitmap::PageBitmap;
pub use pmm::PhysicalMemoryManager;
