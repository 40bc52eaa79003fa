// kernel/src/memory/page_table.rs
//
// The 4-level page-table engine (C2). Every frame a page table needs,
// whether a leaf or an intermediate node, is drawn from the frame
// table (C1) so ownership and refcounts stay authoritative in one
// place. Generalizes the teacher's `OwnedPageTable`/`BuddyFrameAllocator`
// pair: the allocator below asks `frame_table::palloc` instead of the
// buddy heap, and carries an explicit owner so intermediate nodes are
// billed to the right process.

use crate::memory::frame_table::{Owner, FRAME_TABLE};
use crate::memory::layout::PAGE_SIZE;
use x86_64::{
    registers::control::{Cr3, Cr3Flags},
    structures::paging::{
        mapper::{MapToError, UnmapError},
        FrameAllocator, Mapper, OffsetPageTable, Page, PageTable as X86PageTable, PageTableFlags,
        PhysFrame, Size4KiB,
    },
    PhysAddr, VirtAddr,
};

/// Every user address this kernel hands out — code, heap, and stack —
/// falls under `VIRTUAL_MAX` (1 GiB), comfortably inside a single PML4
/// entry. One slot is therefore enough to carve out of the kernel's
/// own identity map when building a fresh process page table.
const USER_REGION_BASE: u64 = crate::memory::layout::PROC_START_ADDR;

#[inline]
const fn pml4_index(va: u64) -> usize {
    ((va >> 39) & 0x1FF) as usize
}

const USER_PML4_ENTRIES: [usize; 1] = [pml4_index(USER_REGION_BASE)];

fn is_user_pml4_entry(index: usize) -> bool {
    USER_PML4_ENTRIES.contains(&index)
}

/// Adapts the frame table to the `x86_64` crate's allocator trait,
/// billing every frame it hands out (leaf or intermediate node) to a
/// fixed owner.
pub struct FrameTableAllocator {
    pub owner: Owner,
}

unsafe impl FrameAllocator<Size4KiB> for FrameTableAllocator {
    fn allocate_frame(&mut self) -> Option<PhysFrame<Size4KiB>> {
        let addr = FRAME_TABLE.lock().palloc(self.owner)?;
        Some(PhysFrame::containing_address(PhysAddr::new(addr)))
    }
}

/// A page table root that owns its PML4 frame (except the kernel's,
/// which merely borrows CR3).
pub struct PageTableRoot {
    pml4_frame: PhysFrame,
    owner: Owner,
    owned: bool,
}

unsafe impl Send for PageTableRoot {}

impl PageTableRoot {
    /// Wrap the currently-active (kernel) page table. Used by kernel
    /// processes that share the kernel address space.
    pub fn from_current() -> Self {
        let (frame, _) = Cr3::read();
        Self { pml4_frame: frame, owner: Owner::Kernel, owned: false }
    }

    /// Builds a fresh page table for `owner`, installing the kernel's
    /// identity map in every PML4 slot except the ones reserved for
    /// user code/heap and user stack, which each process must build
    /// independently so they never share an intermediate node. This
    /// PML4-entry copy, plus the bootloader's own mapping of the kernel
    /// image set up before any of this kernel's code runs, is the whole
    /// of §4.2's kernel-mapping policy — there is no separate identity
    /// map installed anywhere else.
    pub unsafe fn new_for(owner: Owner) -> Result<Self, &'static str> {
        let phys_offset = crate::memory::physical_memory_offset();
        let mut alloc = FrameTableAllocator { owner };
        let new_frame = alloc.allocate_frame().ok_or("out of physical memory")?;

        let new_pml4_virt = phys_offset + new_frame.start_address().as_u64();
        let new_pml4: &mut X86PageTable = &mut *new_pml4_virt.as_mut_ptr::<X86PageTable>();
        new_pml4.zero();

        let (kernel_frame, _) = Cr3::read();
        let kernel_pml4_virt = phys_offset + kernel_frame.start_address().as_u64();
        let kernel_pml4: &X86PageTable = &*kernel_pml4_virt.as_ptr::<X86PageTable>();

        for i in 0..512 {
            if kernel_pml4[i].is_unused() || is_user_pml4_entry(i) {
                continue;
            }
            new_pml4[i] = kernel_pml4[i].clone();
        }

        Ok(Self { pml4_frame: new_frame, owner, owned: true })
    }

    pub fn root_frame(&self) -> PhysFrame {
        self.pml4_frame
    }

    pub fn pml4_phys(&self) -> PhysAddr {
        self.pml4_frame.start_address()
    }

    /// Switches CR3 to this table. No-op if already active.
    pub unsafe fn activate(&self) {
        let (current, _) = Cr3::read();
        if current == self.pml4_frame {
            return;
        }
        Cr3::write(self.pml4_frame, Cr3Flags::empty());
    }

    unsafe fn mapper(&self) -> OffsetPageTable<'static> {
        let phys_offset = crate::memory::physical_memory_offset();
        let pml4_virt = phys_offset + self.pml4_phys().as_u64();
        let pml4: &mut X86PageTable = &mut *pml4_virt.as_mut_ptr::<X86PageTable>();
        OffsetPageTable::new(pml4, phys_offset)
    }

    /// Installs `va -> pa` with the given permission flags, allocating
    /// any missing intermediate page-table nodes from the frame table
    /// and billing them to this table's owner. The leaf frame is
    /// assumed already owned by the caller (typically via a prior
    /// `palloc`).
    pub unsafe fn virtual_memory_map(
        &self,
        va: VirtAddr,
        pa: PhysAddr,
        flags: PageTableFlags,
    ) -> Result<(), MapToError<Size4KiB>> {
        let page: Page<Size4KiB> = Page::containing_address(va);
        let frame = PhysFrame::containing_address(pa);
        let mut alloc = FrameTableAllocator { owner: self.owner };
        self.mapper().map_to(page, frame, flags, &mut alloc)?.flush();
        Ok(())
    }

    /// Walks the table for `va`, returning its mapped physical address
    /// and flags if present.
    pub unsafe fn virtual_memory_lookup(&self, va: VirtAddr) -> Option<(PhysAddr, PageTableFlags)> {
        use x86_64::structures::paging::mapper::Translate;
        let mapper = self.mapper();
        match mapper.translate(va) {
            x86_64::structures::paging::mapper::TranslateResult::Mapped { frame, flags, .. } => {
                Some((frame.start_address(), flags))
            }
            _ => None,
        }
    }

    /// Clears the leaf entry for `va` without touching the frame
    /// table's refcount. An explicit primitive rather than routing
    /// through `virtual_memory_map` with an empty permission set,
    /// which would otherwise require a dummy frame argument.
    pub unsafe fn virtual_memory_clear(&self, va: VirtAddr) -> Result<PhysFrame, UnmapError> {
        let page: Page<Size4KiB> = Page::containing_address(va);
        let (frame, flush) = self.mapper().unmap(page)?;
        flush.flush();
        Ok(frame)
    }

    /// Looks up `va`, clears the leaf, and decrements the mapped
    /// frame's refcount via `freepage`. A lookup miss is a no-op
    /// success.
    pub unsafe fn virtual_memory_unmap(&self, va: VirtAddr) {
        if let Ok(frame) = self.virtual_memory_clear(va) {
            FRAME_TABLE.lock().freepage(frame.start_address().as_u64());
        }
    }

    /// Writes raw bytes into a physical frame via the phys-memory
    /// offset mapping.
    pub unsafe fn write_to_frame(frame: PhysFrame, data: &[u8], offset: usize) {
        let phys_offset = crate::memory::physical_memory_offset();
        let dst = (phys_offset + frame.start_address().as_u64()).as_mut_ptr::<u8>().add(offset);
        core::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
    }

    pub unsafe fn zero_frame(frame: PhysFrame) {
        let phys_offset = crate::memory::physical_memory_offset();
        let virt = phys_offset + frame.start_address().as_u64();
        core::ptr::write_bytes(virt.as_mut_ptr::<u8>(), 0, PAGE_SIZE as usize);
    }

    /// Tears down every user mapping reachable from this root, then
    /// frees the intermediate nodes themselves (process_free, C3).
    /// Kernel identity entries are skipped: this table never owns
    /// those nodes.
    pub unsafe fn teardown_user_mappings(&self) {
        let phys_offset = crate::memory::physical_memory_offset();
        let pml4_virt = phys_offset + self.pml4_phys().as_u64();
        let pml4: &X86PageTable = &*pml4_virt.as_ptr::<X86PageTable>();

        for l4i in 0..512 {
            if !is_user_pml4_entry(l4i) || pml4[l4i].is_unused() {
                continue;
            }
            let pdpt_frame = pml4[l4i].frame().unwrap();
            let pdpt_virt = phys_offset + pdpt_frame.start_address().as_u64();
            let pdpt: &X86PageTable = &*pdpt_virt.as_ptr::<X86PageTable>();

            for l3i in 0..512 {
                if pdpt[l3i].is_unused() {
                    continue;
                }
                let pd_frame = pdpt[l3i].frame().unwrap();
                let pd_virt = phys_offset + pd_frame.start_address().as_u64();
                let pd: &X86PageTable = &*pd_virt.as_ptr::<X86PageTable>();

                for l2i in 0..512 {
                    if pd[l2i].is_unused() {
                        continue;
                    }
                    let pt_frame = pd[l2i].frame().unwrap();
                    let pt_virt = phys_offset + pt_frame.start_address().as_u64();
                    let pt: &X86PageTable = &*pt_virt.as_ptr::<X86PageTable>();

                    for l1i in 0..512 {
                        if pt[l1i].is_unused() {
                            continue;
                        }
                        let leaf = pt[l1i].frame().unwrap();
                        FRAME_TABLE.lock().freepage(leaf.start_address().as_u64());
                    }
                    FRAME_TABLE.lock().freepage(pt_frame.start_address().as_u64());
                }
                FRAME_TABLE.lock().freepage(pd_frame.start_address().as_u64());
            }
            FRAME_TABLE.lock().freepage(pdpt_frame.start_address().as_u64());
        }
        if self.owned {
            FRAME_TABLE.lock().freepage(self.pml4_frame.start_address().as_u64());
        }
    }
}
