// kernel/src/memory/frame_table.rs
//
// Ground truth for every physical frame: who owns it and how many live
// mappings point at it. Supersedes the old region-scanning bump
// allocator (`frame_allocator.rs`) as the sole source of physical
// frames; the kernel heap's buddy allocator is seeded from frames this
// table hands out with `Owner::Kernel`, so the two never disagree
// about which frame is free.

use crate::memory::layout::{
    page_align_down, CONSOLE_FRAME, IO_HOLE_START, IO_HOLE_END, KERNEL_IMAGE_END, PAGE_SIZE,
};
use crate::serial_println_raw;
use bootloader_api::info::{MemoryRegionKind, MemoryRegions};
use spin::Mutex;

/// Physical memory this kernel is willing to track. Frames beyond this
/// are never handed out; an educational kernel targeting QEMU's
/// default 128-512 MiB is comfortably inside this bound.
pub const MAX_PHYS_FRAMES: usize = 1 << 18; // covers up to 1 GiB

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Owner {
    Free,
    Reserved,
    Kernel,
    Process(u8),
}

#[derive(Clone, Copy)]
struct Entry {
    owner: Owner,
    refcount: u16,
}

impl Entry {
    const fn free() -> Self {
        Entry { owner: Owner::Free, refcount: 0 }
    }
}

pub struct FrameTable {
    entries: &'static mut [Entry],
}

// Backing storage lives in `.bss`; it is far too large to place on any
// stack and the frame table must exist before a heap does.
static mut FRAME_ENTRIES: [Entry; MAX_PHYS_FRAMES] = [Entry::free(); MAX_PHYS_FRAMES];

fn is_reserved(phys_addr: u64) -> bool {
    phys_addr < KERNEL_IMAGE_END
        || (phys_addr >= IO_HOLE_START && phys_addr < IO_HOLE_END)
        || page_align_down(phys_addr) == page_align_down(CONSOLE_FRAME)
}

impl FrameTable {
    fn frame_index(phys_addr: u64) -> Option<usize> {
        let idx = (phys_addr / PAGE_SIZE) as usize;
        if idx < MAX_PHYS_FRAMES {
            Some(idx)
        } else {
            None
        }
    }

    /// Walks every region the bootloader reports and classifies every
    /// frame it covers as KERNEL, RESERVED, or FREE. Usable regions
    /// below `KERNEL_IMAGE_END` are folded into KERNEL since the image
    /// and its boot stack live there; everything inside the I/O hole
    /// or the console frame is RESERVED; everything else usable is
    /// FREE.
    fn init_from_regions(&mut self, regions: &MemoryRegions) {
        for region in regions.iter() {
            if region.kind != MemoryRegionKind::Usable {
                continue;
            }
            let mut addr = page_align_down(region.start);
            while addr < region.end {
                if let Some(idx) = Self::frame_index(addr) {
                    let owner = if is_reserved(addr) {
                        Owner::Reserved
                    } else if addr < KERNEL_IMAGE_END {
                        Owner::Kernel
                    } else {
                        Owner::Free
                    };
                    let refcount = if owner == Owner::Free { 0 } else { 1 };
                    self.entries[idx] = Entry { owner, refcount };
                }
                addr += PAGE_SIZE;
            }
        }
        // The I/O hole and low memory are never reported "Usable" by
        // the bootloader but must still be marked RESERVED so palloc
        // never hands them out.
        let mut addr = 0u64;
        while addr < IO_HOLE_END {
            if let Some(idx) = Self::frame_index(addr) {
                if self.entries[idx].refcount == 0 && self.entries[idx].owner == Owner::Free {
                    let owner = if addr < KERNEL_IMAGE_END { Owner::Kernel } else { Owner::Reserved };
                    self.entries[idx] = Entry { owner, refcount: 1 };
                }
            }
            addr += PAGE_SIZE;
        }
    }

    /// Claims a specific page-aligned frame for `owner`. Fails if the
    /// address is misaligned, out of the tracked range, or the frame
    /// is already claimed.
    pub fn assign_physical_page(&mut self, addr: u64, owner: Owner) -> Result<(), ()> {
        if addr % PAGE_SIZE != 0 {
            return Err(());
        }
        let idx = match Self::frame_index(addr) {
            Some(idx) => idx,
            None => return Err(()),
        };
        if self.entries[idx].refcount != 0 {
            return Err(());
        }
        self.entries[idx] = Entry { owner, refcount: 1 };
        Ok(())
    }

    /// Scans ascending from frame zero for a FREE frame, claims it for
    /// `owner`, and returns its physical address. Scan order is not
    /// spec-mandated beyond "skip RESERVED/KERNEL"; ascending keeps
    /// low-memory allocation patterns deterministic for tests.
    pub fn palloc(&mut self, owner: Owner) -> Option<u64> {
        for idx in 0..MAX_PHYS_FRAMES {
            if self.entries[idx].owner == Owner::Free && self.entries[idx].refcount == 0 {
                self.entries[idx] = Entry { owner, refcount: 1 };
                return Some(idx as u64 * PAGE_SIZE);
            }
        }
        None
    }

    /// Decrements the refcount of the frame at `physical_addr`
    /// (aligned down first). Reaching zero returns it to FREE. Double
    /// frees and frees of address zero are logged, not fatal.
    pub fn freepage(&mut self, physical_addr: u64) {
        if physical_addr == 0 {
            serial_println_raw!("frame_table: freepage(0) ignored");
            return;
        }
        let aligned = page_align_down(physical_addr);
        let idx = match Self::frame_index(aligned) {
            Some(idx) => idx,
            None => {
                serial_println_raw!("frame_table: freepage out of range: {:#x}", physical_addr);
                return;
            }
        };
        if self.entries[idx].refcount == 0 {
            serial_println_raw!("frame_table: double free at {:#x}", aligned);
            return;
        }
        self.entries[idx].refcount -= 1;
        if self.entries[idx].refcount == 0 {
            self.entries[idx].owner = Owner::Free;
        }
    }

    /// Adds one more live mapping to an already-owned frame (the
    /// console frame, or kernel page-table sharing). Does not change
    /// ownership.
    pub fn share(&mut self, physical_addr: u64) {
        let aligned = page_align_down(physical_addr);
        if let Some(idx) = Self::frame_index(aligned) {
            self.entries[idx].refcount = self.entries[idx].refcount.saturating_add(1);
        }
    }

    pub fn owner_of(&self, physical_addr: u64) -> Option<Owner> {
        Self::frame_index(page_align_down(physical_addr)).map(|idx| self.entries[idx].owner)
    }

    pub fn refcount_of(&self, physical_addr: u64) -> Option<u16> {
        Self::frame_index(page_align_down(physical_addr)).map(|idx| self.entries[idx].refcount)
    }

    /// Debug invariant sweep: refcount==0 iff owner==Free. Panics on
    /// violation; meant to be called at fault/syscall boundaries in
    /// debug builds.
    pub fn check_invariants(&self) {
        for e in self.entries.iter() {
            debug_assert!((e.refcount == 0) == (e.owner == Owner::Free));
        }
    }
}

lazy_static::lazy_static! {
    pub static ref FRAME_TABLE: Mutex<FrameTable> = Mutex::new(FrameTable {
        entries: unsafe { &mut *core::ptr::addr_of_mut!(FRAME_ENTRIES) },
    });
}

/// Must be called exactly once, early in boot, before any palloc.
pub fn init(regions: &MemoryRegions) {
    FRAME_TABLE.lock().init_from_regions(regions);
}
