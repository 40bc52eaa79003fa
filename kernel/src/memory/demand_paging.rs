// kernel/src/memory/demand_paging.rs
//
// Demand paging — pure memory operations, no process layer dependency.
//
// Two entry points:
//   1. `is_demand_pageable(error_code)` — pre-filter on CPU error code.
//   2. `map_demand_page(fault_addr, vma, pid)` — allocate, zero, map.
//
// The page fault handler (init/devices.rs) owns the rest: reading
// CR2, looking up the VMA via the scheduler, and deciding what to do
// when this module says the fault isn't demand-pageable.

use x86_64::{
    registers::control::Cr3,
    structures::paging::{Mapper, OffsetPageTable, Page, PageTable, Size4KiB},
    VirtAddr,
};

use crate::memory::frame_table::{Owner, FRAME_TABLE};
use crate::memory::layout::PAGE_SIZE;
use crate::memory::page_table::FrameTableAllocator;
use crate::memory::vma::{Vma, VmaKind};

bitflags::bitflags! {
    /// The CPU's page-fault error code, pushed onto the stack below the
    /// `ExceptionStackFrame` for vector 14. Same hardware-bit-structure
    /// idiom the teacher uses for its own page-table entry flags.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct PageFaultError: u64 {
        /// 0 = fault was a not-present page, 1 = a protection violation
        /// on a page that was already present.
        const PRESENT = 1 << 0;
        /// 0 = fault was on a read, 1 = fault was on a write.
        const WRITE = 1 << 1;
        /// 0 = fault happened in kernel mode, 1 = user mode (CPL 3).
        const USER = 1 << 2;
        /// Set if a reserved bit was found set while walking the page
        /// table on this access — always a kernel/page-table bug.
        const RESERVED = 1 << 3;
    }
}

#[inline]
pub fn read_cr2() -> u64 {
    let addr: u64;
    unsafe {
        core::arch::asm!("mov {}, cr2", out(reg) addr);
    }
    addr
}

/// Pure function of the CPU error code: is this fault even a candidate
/// for demand paging? `WRITE` is accepted either way since both reads
/// and writes to an unmapped anonymous page should fault in a fresh
/// zero frame.
pub fn is_demand_pageable(error_code: u64) -> Result<(), &'static str> {
    let flags = PageFaultError::from_bits_truncate(error_code);
    if flags.contains(PageFaultError::RESERVED) {
        return Err("reserved bit set in page table entry");
    }
    if !flags.contains(PageFaultError::USER) {
        return Err("kernel-mode page fault");
    }
    if flags.contains(PageFaultError::PRESENT) {
        return Err("protection violation on a present page");
    }
    Ok(())
}

/// Allocates a frame from the frame table, zeroes it, and maps it at
/// the page containing `fault_addr` using `vma`'s flags in the
/// *currently active* page table (valid during a page fault, since the
/// CPU never changes CR3 on its own). On any failure after the frame
/// is claimed, the frame is returned to the table before the error
/// propagates, per §4.4's "free any partial frame" rule.
pub fn map_demand_page(fault_addr: u64, vma: &Vma, pid: usize) -> Result<(), &'static str> {
    match vma.kind {
        VmaKind::Anonymous | VmaKind::Heap => {}
        VmaKind::Code => return Err("code page not present, should have been pre-mapped"),
    }

    let owner = Owner::Process(pid as u8);
    let frame_addr = FRAME_TABLE.lock().palloc(owner).ok_or("out of physical memory")?;
    let frame = x86_64::structures::paging::PhysFrame::containing_address(
        x86_64::PhysAddr::new(frame_addr),
    );

    unsafe {
        let phys_offset = crate::memory::physical_memory_offset();
        let frame_virt = phys_offset + frame.start_address().as_u64();
        core::ptr::write_bytes(frame_virt.as_mut_ptr::<u8>(), 0, PAGE_SIZE as usize);
    }

    let page: Page<Size4KiB> =
        Page::containing_address(VirtAddr::new(fault_addr & !(PAGE_SIZE - 1)));

    let map_result = unsafe {
        let phys_offset = crate::memory::physical_memory_offset();
        let (cr3_frame, _) = Cr3::read();
        let pml4_virt = phys_offset + cr3_frame.start_address().as_u64();
        let pml4: &mut PageTable = &mut *pml4_virt.as_mut_ptr::<PageTable>();
        let mut mapper = OffsetPageTable::new(pml4, phys_offset);
        let mut alloc = FrameTableAllocator { owner };
        mapper.map_to(page, frame, vma.page_table_flags(), &mut alloc).map(|flush| flush.flush())
    };

    if map_result.is_err() {
        FRAME_TABLE.lock().freepage(frame_addr);
        return Err("demand paging: map_to failed");
    }

    crate::serial_println!(
        "demand page: pid {} fault at {:#x} -> mapped {:#x} (phys {:#x})",
        pid,
        fault_addr,
        page.start_address().as_u64(),
        frame.start_address().as_u64(),
    );

    Ok(())
}
