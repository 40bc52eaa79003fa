// kernel/src/memory/layout.rs
//
// Shared constants describing the physical and virtual memory map.
// Kept in one place so the frame table, page-table engine, process
// loader and heap all agree on where things live.

/// Size of one physical/virtual page.
pub const PAGE_SIZE: u64 = 4096;

/// Number of process table slots. Small and fixed, as befits an
/// educational kernel: process 0 is reserved for the idle process.
pub const NPROC: usize = 8;

/// Below this, physical memory is BIOS / low-memory and reserved.
pub const LOW_MEMORY_END: u64 = 0x40000;

/// Kernel image + kernel stack live in this range (identity mapped).
pub const KERNEL_IMAGE_END: u64 = 0x80000;

/// I/O hole: video memory, BIOS data areas. Never allocated.
pub const IO_HOLE_START: u64 = 0x80000;
pub const IO_HOLE_END: u64 = 0x100000;

/// The console's well-known physical frame, inside the I/O hole.
/// Shared read/write by every process; its refcount accumulates but
/// its owner never leaves RESERVED.
pub const CONSOLE_FRAME: u64 = 0xB8000;

/// First frame available for process images and heaps.
pub const PROC_START_PHYS: u64 = 0x100000;

/// Physical span handed to each process's program image (loader lays
/// process `pid` out at `PROC_START_PHYS + (pid - 1) * PROC_SIZE`).
pub const PROC_SIZE: u64 = 0x40000;

/// Virtual base at which the loader places user code/data.
pub const PROC_START_ADDR: u64 = 0x0000_0000_0040_0000;

/// Virtual ceiling for a process's heap. Chosen comfortably below the
/// user stack's virtual address so heap growth can never collide with
/// it; see DESIGN.md for why this value over the stack's own base.
pub const VIRTUAL_MAX: u64 = 0x0000_0000_4000_0000;

/// Virtual base of the user stack region (top of the region, stack
/// grows down from here). One page below this is the first stack
/// byte; processes share this base in virtual space since each has
/// its own page table.
pub const USER_STACK_TOP: u64 = VIRTUAL_MAX - PAGE_SIZE;

#[inline]
pub const fn page_align_down(addr: u64) -> u64 {
    addr & !(PAGE_SIZE - 1)
}

#[inline]
pub const fn page_align_up(addr: u64) -> u64 {
    page_align_down(addr + PAGE_SIZE - 1)
}
