// kernel/src/memory/mod.rs

use core::sync::atomic::{AtomicU64, Ordering};
use x86_64::VirtAddr;

pub mod demand_paging;
pub mod frame_table;
pub mod heap;
pub mod layout;
pub mod page_table;
pub mod vma;

static PHYSICAL_MEMORY_OFFSET: AtomicU64 = AtomicU64::new(0);

/// Records the offset at which the bootloader mapped all of physical
/// memory into kernel virtual space. Must be called once from
/// `kernel_main` before any frame is dereferenced via this offset.
pub fn init(physical_memory_offset: VirtAddr) {
    PHYSICAL_MEMORY_OFFSET.store(physical_memory_offset.as_u64(), Ordering::Relaxed);
}

pub fn physical_memory_offset() -> VirtAddr {
    VirtAddr::new(PHYSICAL_MEMORY_OFFSET.load(Ordering::Relaxed))
}
