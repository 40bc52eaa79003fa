// kernel/src/allocator/bump.rs
//
// The kernel's global allocator: a lock-free bump allocator over a
// fixed static array. Never reclaims on dealloc — fine for the small,
// short-lived allocations the kernel itself makes (process table
// snapshots, log formatting); anything that needs real reuse belongs
// in a per-process heap (C6/C7), not here.

use core::{
    alloc::{GlobalAlloc, Layout},
    ptr::null_mut,
    sync::atomic::{AtomicUsize, Ordering},
};

use crate::serial_println;

const fn align_up(addr: usize, align: usize) -> usize {
    (addr + align - 1) & !(align - 1)
}

pub struct BumpAllocator {
    pub heap_start: AtomicUsize,
    pub heap_end: AtomicUsize,
    next: AtomicUsize,
}

impl BumpAllocator {
    pub const fn new() -> Self {
        Self {
            heap_start: AtomicUsize::new(0),
            heap_end: AtomicUsize::new(0),
            next: AtomicUsize::new(0),
        }
    }

    pub unsafe fn init(&self, heap_start: usize, heap_size: usize) {
        self.heap_start.store(heap_start, Ordering::Release);
        self.heap_end.store(heap_start + heap_size, Ordering::Release);
        self.next.store(heap_start, Ordering::Release);
    }

    fn used_internal(&self) -> usize {
        self.next.load(Ordering::Relaxed) - self.heap_start.load(Ordering::Relaxed)
    }

    fn size_internal(&self) -> usize {
        self.heap_end.load(Ordering::Relaxed) - self.heap_start.load(Ordering::Relaxed)
    }

}

unsafe impl GlobalAlloc for BumpAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let size = layout.size();
        let align = layout.align();

        let heap_start = self.heap_start.load(Ordering::Acquire);
        let heap_end = self.heap_end.load(Ordering::Acquire);
        if heap_start == 0 || heap_end == 0 {
            serial_println!("kernel heap: alloc before init_heap()");
            return null_mut();
        }

        loop {
            let current = self.next.load(Ordering::Relaxed);
            let aligned = align_up(current, align);
            let new_next = aligned.saturating_add(size);

            if new_next > heap_end {
                serial_println!("kernel heap: out of memory (requested {} bytes)", size);
                return null_mut();
            }

            if self
                .next
                .compare_exchange(current, new_next, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                return aligned as *mut u8;
            }
        }
    }

    unsafe fn dealloc(&self, _ptr: *mut u8, _layout: Layout) {
        // Bump allocator never reclaims; memory is only reset at init.
    }
}

pub static mut HEAP_MEMORY: [u8; 100 * 1024] = [0; 100 * 1024];

#[global_allocator]
static ALLOCATOR: BumpAllocator = BumpAllocator::new();

pub fn init_heap() {
    unsafe {
        let heap_start = HEAP_MEMORY.as_ptr() as usize;
        let heap_size = HEAP_MEMORY.len();
        serial_println!("kernel heap: {:#x}..{:#x} ({} bytes)", heap_start, heap_start + heap_size, heap_size);
        ALLOCATOR.init(heap_start, heap_size);
    }
}

/// Returns (bytes used, total capacity).
pub fn heap_stats() -> (usize, usize) {
    (ALLOCATOR.used_internal(), ALLOCATOR.size_internal())
}
