// kernel/src/memory/heap.rs
//
// The demand-paged heap (C6): servicing for the `brk`/`sbrk` syscalls.
// Growing the break never allocates a page; C4's page-fault handler
// faults pages in lazily against the process's heap VMA. Shrinking
// unmaps and frees pages immediately, since there is no lazy way to
// give memory back.

use crate::memory::layout::{page_align_up, PAGE_SIZE, VIRTUAL_MAX};
use crate::memory::page_table::PageTableRoot;
use crate::memory::vma;
use x86_64::VirtAddr;

/// Implements `sbrk_internal(p, delta)`. `original_break` and
/// `program_break` are the process's current values; on success the
/// new break is returned so the caller can store it back onto the
/// process, matching the "grow never fails, shrink always succeeds or
/// the request was invalid" shape described for C6.
///
/// Also resizes `pid`'s heap VMA (registered at `original_break`) to
/// span exactly `[original_break, new)`, so the page-fault handler only
/// ever demand-pages addresses the process actually grew into.
pub fn sbrk_internal(
    page_table: &PageTableRoot,
    pid: usize,
    original_break: u64,
    program_break: u64,
    delta: i64,
) -> Result<u64, ()> {
    let old = program_break;
    let new = if delta >= 0 {
        old.checked_add(delta as u64).ok_or(())?
    } else {
        old.checked_sub((-delta) as u64).ok_or(())?
    };

    if new < original_break || new >= VIRTUAL_MAX - PAGE_SIZE {
        return Err(());
    }

    if delta < 0 {
        let mut addr = page_align_up(new);
        let limit = page_align_up(old);
        while addr < limit {
            unsafe {
                page_table.virtual_memory_unmap(VirtAddr::new(addr));
            }
            addr += PAGE_SIZE;
        }
    }
    // Growing: no pages touched here. C4's page-fault handler maps
    // them in when the process first touches the new range.

    let new_pages = ((new - original_break) + PAGE_SIZE - 1) / PAGE_SIZE;
    if vma::resize_vma(pid, original_break, new_pages as usize).is_err() {
        crate::serial_println!("sbrk: no heap VMA registered at {:#x} for pid {}", original_break, pid);
    }

    Ok(new)
}
