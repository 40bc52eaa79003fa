// kernel/src/init/memory.rs
//
// Brings up the memory subsystems in the only order that works: the
// physical-memory-offset must be recorded before anything dereferences
// a frame through it, and the frame table (C1) must be populated
// before the first `palloc` — including the one the kernel's own bump
// heap's `init_heap` does not need, but every page-table operation
// after it does.

use bootloader_api::info::MemoryRegions;
use x86_64::VirtAddr;

use crate::{allocator, memory, serial_println};

/// Initializes, in order: the physical-memory offset, the frame table
/// (C1) from the bootloader's memory map, and the kernel's own bump
/// heap. The kernel's own image is already mapped by the bootloader
/// before this function runs; §4.2's kernel-mapping policy is actually
/// satisfied later, per-process, by `PageTableRoot::new_for`'s PML4-
/// entry copy (`memory/page_table.rs`) — there is no separate identity
/// map to install here.
pub fn init_core(phys_mem_offset: VirtAddr, memory_regions: &'static MemoryRegions) {
    serial_println!(
        "physical memory offset: {:#x} (PML4 entry {})",
        phys_mem_offset.as_u64(),
        phys_mem_offset.as_u64() >> 39
    );

    memory::init(phys_mem_offset);
    memory::frame_table::init(memory_regions);

    allocator::bump::init_heap();
}

/// Boot-time smoke test for the kernel's own allocator (bump heap, not
/// to be confused with the per-process demand-paged heap in C6 or the
/// user-space `useralloc` in C7). Exercises `alloc`/`dealloc` directly
/// and through `Vec`/`String`, then prints usage.
pub fn test_allocators() {
    {
        use core::alloc::Layout;

        let layout = Layout::from_size_align(8, 8).unwrap();
        let ptr = unsafe { alloc::alloc::alloc(layout) };

        if ptr.is_null() {
            serial_println!("  FAILED: kernel heap returned a null pointer");
            panic!("kernel heap allocation failed");
        }
        unsafe {
            *(ptr as *mut u64) = 0xDEADBEEF;
            let val = *(ptr as *const u64);
            serial_println!("  write/read test: {:#x}", val);
            assert_eq!(val, 0xDEADBEEF);
            alloc::alloc::dealloc(ptr, layout);
        }
        serial_println!("  SUCCESS: kernel heap alloc/dealloc");
    }

    {
        use alloc::vec::Vec;
        let mut v: Vec<u8> = Vec::new();
        v.push(1);
        v.push(2);
        v.push(3);
        serial_println!("  Vec OK: len={}", v.len());
    }

    {
        use alloc::string::String;
        let s = String::from("kernel heap ready");
        serial_println!("  String test: {}", s);
    }

    let (used, total) = allocator::bump::heap_stats();
    serial_println!("  kernel heap usage: {}/{} bytes", used, total);
}
