// kernel/src/process/mod.rs
//
// The process table and its lifecycle operations (C3): a fixed array
// of `NPROC` slots, no heap allocation for the table itself. Pid 0 is
// reserved for the idle process and the scheduler never schedules a
// FREE or BROKEN slot onto the CPU.

use crate::memory::frame_table::{Owner, FRAME_TABLE};
use crate::memory::layout::{page_align_up, NPROC, PAGE_SIZE, PROC_START_ADDR, USER_STACK_TOP};
use crate::memory::page_table::PageTableRoot;
use crate::memory::vma::{self, Vma, VmaKind};
use crate::process::trapframe::TrapFrame;
use core::arch::global_asm;
use lazy_static::lazy_static;
use spin::Mutex;
use x86_64::structures::paging::PageTableFlags;
use x86_64::{PhysAddr, VirtAddr};

pub mod scheduler;
pub mod syscall;
pub mod timer_preempt;
pub mod trapframe;
pub mod tss;
pub mod user_programs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Pid(pub u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    FREE,
    RUNNABLE,
    BROKEN,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivilegeLevel {
    Kernel,
    User,
}

pub struct Process {
    pub pid: Pid,
    pub state: ProcessState,
    pub privilege: PrivilegeLevel,
    pub page_table: Option<PageTableRoot>,
    pub trapframe: TrapFrame,
    /// End of the loaded image, page-aligned up. The heap may never
    /// shrink below this.
    pub original_break: u64,
    /// Current end of the heap, advanced by `sbrk`.
    pub program_break: u64,
    pub name: [u8; 32],
}

impl Process {
    const fn free(pid: u8) -> Self {
        Self {
            pid: Pid(pid),
            state: ProcessState::FREE,
            privilege: PrivilegeLevel::Kernel,
            page_table: None,
            trapframe: TrapFrame::zeroed(),
            original_break: 0,
            program_break: 0,
            name: [0; 32],
        }
    }

    pub fn set_name(&mut self, name: &str) {
        let bytes = name.as_bytes();
        let len = bytes.len().min(self.name.len() - 1);
        self.name[..len].copy_from_slice(&bytes[..len]);
        self.name[len] = 0;
    }
}

lazy_static! {
    pub static ref PROCESS_TABLE: Mutex<[Process; NPROC]> =
        Mutex::new(core::array::from_fn(|i| Process::free(i as u8)));
}

/// Finds a FREE slot, claims it for `privilege`, and returns its pid.
/// Pid 0 is reserved for idle and is only ever claimed once at boot.
pub fn process_init(privilege: PrivilegeLevel) -> Option<Pid> {
    let mut table = PROCESS_TABLE.lock();
    for proc in table.iter_mut().skip(1) {
        if proc.state == ProcessState::FREE {
            let pid = proc.pid;
            proc.state = ProcessState::RUNNABLE;
            proc.privilege = privilege;
            proc.original_break = 0;
            proc.program_break = 0;
            proc.trapframe = TrapFrame::zeroed();
            return Some(pid);
        }
    }
    None
}

/// Allocates and installs a private page table for `pid`, sharing the
/// kernel identity map and transferring ownership of its own nodes to
/// `pid` with refcount 1 each (handled by `PageTableRoot::new_for`,
/// which routes every node through the frame table).
pub fn process_config_tables(pid: Pid) -> Result<(), &'static str> {
    let root = unsafe { PageTableRoot::new_for(Owner::Process(pid.0))? };
    PROCESS_TABLE.lock()[pid.0 as usize].page_table = Some(root);
    Ok(())
}

/// Copies `program` into freshly-assigned frames, maps them into the
/// process page table, and points `rip` at the entry point (the start
/// of the image). Also registers the code VMA and sets
/// `original_break = program_break` to the page-aligned end of the
/// image.
pub fn process_load(pid: Pid, program: &[u8]) -> Result<(), &'static str> {
    let num_pages = (program.len() + PAGE_SIZE as usize - 1) / PAGE_SIZE as usize;
    let owner = Owner::Process(pid.0);

    {
        let table = PROCESS_TABLE.lock();
        let root = table[pid.0 as usize].page_table.as_ref().ok_or("page table not configured")?;

        for page_idx in 0..num_pages.max(1) {
            let va = VirtAddr::new(PROC_START_ADDR + page_idx as u64 * PAGE_SIZE);
            let frame_addr = FRAME_TABLE.lock().palloc(owner).ok_or("out of physical memory")?;
            let flags = PageTableFlags::PRESENT | PageTableFlags::WRITABLE | PageTableFlags::USER_ACCESSIBLE;
            unsafe {
                root.virtual_memory_map(va, PhysAddr::new(frame_addr), flags)
                    .map_err(|_| "failed to map code page")?;

                let frame = x86_64::structures::paging::PhysFrame::containing_address(PhysAddr::new(frame_addr));
                PageTableRoot::zero_frame(frame);
                let start = page_idx * PAGE_SIZE as usize;
                let end = (start + PAGE_SIZE as usize).min(program.len());
                if start < program.len() {
                    PageTableRoot::write_to_frame(frame, &program[start..end], 0);
                }
            }
        }
    }

    vma::register_vma(
        pid.0 as usize,
        Vma {
            start: PROC_START_ADDR,
            size_pages: num_pages.max(1),
            flags: (PageTableFlags::PRESENT | PageTableFlags::USER_ACCESSIBLE).bits(),
            kind: VmaKind::Code,
        },
    )?;

    let image_end = page_align_up(PROC_START_ADDR + program.len() as u64);

    // The heap is demand-paged (C6): no frame is allocated here, but
    // the page-fault handler needs a VMA to recognize a heap touch as
    // legitimate rather than a segfault. Registered empty at load time
    // (program_break == original_break == image_end), `sbrk_internal`
    // grows or shrinks this same VMA's `size_pages` via
    // `vma::resize_vma` as the break moves, so only addresses actually
    // inside `[original_break, program_break)` are ever demand-pageable.
    vma::register_vma(
        pid.0 as usize,
        Vma {
            start: image_end,
            size_pages: 0,
            flags: (PageTableFlags::PRESENT | PageTableFlags::WRITABLE | PageTableFlags::USER_ACCESSIBLE).bits(),
            kind: VmaKind::Heap,
        },
    )?;

    {
        let mut table = PROCESS_TABLE.lock();
        let proc = &mut table[pid.0 as usize];
        proc.original_break = image_end;
        proc.program_break = image_end;
        proc.trapframe.rip = PROC_START_ADDR;
    }

    Ok(())
}

/// Registers the (demand-paged) stack VMA and points `rsp` at the top
/// of the user stack region. No frame is allocated here; the first
/// touch of the stack faults one in via C4.
pub fn process_setup_stack(pid: Pid) -> Result<(), &'static str> {
    const STACK_PAGES: usize = 16;
    let stack_base = USER_STACK_TOP - STACK_PAGES as u64 * PAGE_SIZE;
    let flags = PageTableFlags::PRESENT | PageTableFlags::WRITABLE | PageTableFlags::USER_ACCESSIBLE;

    vma::register_vma(
        pid.0 as usize,
        Vma { start: stack_base, size_pages: STACK_PAGES, flags: flags.bits(), kind: VmaKind::Anonymous },
    )?;

    let mut table = PROCESS_TABLE.lock();
    table[pid.0 as usize].trapframe.rsp = USER_STACK_TOP - 8;
    Ok(())
}

/// Duplicates `parent`'s page table into a freshly-claimed child slot:
/// every present user mapping is copied into a fresh frame with the
/// same permissions, kernel identity mappings are shared, and the
/// register frame is inherited with the return-value split (0 for the
/// child, child pid for the parent). Any failure during the copy
/// rolls the partially-built child all the way back to FREE and
/// returns `None`.
pub fn process_fork(parent: Pid) -> Option<Pid> {
    let child_pid = process_init(PrivilegeLevel::User)?;

    let result = (|| -> Result<(), &'static str> {
        process_config_tables(child_pid)?;

        let mut table = PROCESS_TABLE.lock();
        let (parent_idx, child_idx) = (parent.0 as usize, child_pid.0 as usize);
        let parent_trapframe = table[parent_idx].trapframe;
        let parent_break = (table[parent_idx].original_break, table[parent_idx].program_break);
        drop(table);

        copy_user_mappings(parent, child_pid)?;

        let mut table = PROCESS_TABLE.lock();
        table[child_idx].trapframe = parent_trapframe;
        table[child_idx].trapframe.rax = 0;
        table[child_idx].original_break = parent_break.0;
        table[child_idx].program_break = parent_break.1;
        table[child_idx].state = ProcessState::RUNNABLE;
        Ok(())
    })();

    match result {
        Ok(()) => Some(child_pid),
        Err(reason) => {
            crate::serial_println!("fork: rolling back child pid {} ({})", child_pid.0, reason);
            process_free(child_pid);
            None
        }
    }
}

fn copy_user_mappings(parent: Pid, child: Pid) -> Result<(), &'static str> {
    let parent_vmas = vma::vmas_of(parent.0 as usize);

    for area in parent_vmas.iter() {
        vma::register_vma(child.0 as usize, *area)?;
        let mut page_addr = area.start;
        while page_addr < area.end() {
            copy_one_page_if_present(parent, child, page_addr)?;
            page_addr += PAGE_SIZE;
        }
    }
    Ok(())
}

fn copy_one_page_if_present(parent: Pid, child: Pid, va: u64) -> Result<(), &'static str> {
    let table = PROCESS_TABLE.lock();
    let parent_root = table[parent.0 as usize].page_table.as_ref().ok_or("no parent table")?;
    let looked_up = unsafe { parent_root.virtual_memory_lookup(VirtAddr::new(va)) };
    let (parent_pa, flags) = match looked_up {
        Some(v) => v,
        None => return Ok(()), // not yet faulted in, nothing to copy
    };

    let child_root = table[child.0 as usize].page_table.as_ref().ok_or("no child table")?;
    let child_frame_addr =
        FRAME_TABLE.lock().palloc(Owner::Process(child.0)).ok_or("out of physical memory")?;

    unsafe {
        let offset = crate::memory::physical_memory_offset();
        let src = (offset + parent_pa.as_u64()).as_ptr::<u8>();
        let dst = (offset + child_frame_addr).as_mut_ptr::<u8>();
        core::ptr::copy_nonoverlapping(src, dst, PAGE_SIZE as usize);

        if let Err(e) = child_root.virtual_memory_map(VirtAddr::new(va), PhysAddr::new(child_frame_addr), flags) {
            let _ = e;
            // The frame never made it into any page table, so
            // `teardown_user_mappings` will never see it to free it on
            // rollback — free it here instead, or it leaks forever
            // with a stale owner once the child slot returns to FREE.
            FRAME_TABLE.lock().freepage(child_frame_addr);
            return Err("failed to map forked page");
        }
    }
    Ok(())
}

/// For every user mapping, decrements the target frame's refcount via
/// `teardown_user_mappings`, then frees the intermediate page-table
/// nodes, clears the process's VMAs, and marks the slot FREE.
pub fn process_free(pid: Pid) {
    let mut table = PROCESS_TABLE.lock();
    if let Some(root) = table[pid.0 as usize].page_table.take() {
        unsafe { root.teardown_user_mappings() };
    }
    vma::clear_vmas(pid.0 as usize);
    table[pid.0 as usize] = Process::free(pid.0);
    drop(table);
    check_invariants_at_boundary();
}

/// Runs the frame-table and process-table invariant sweeps (§1.2):
/// refcount/owner agreement and FREE-slot/page-table agreement. A
/// no-op in release builds, since both sweeps are built on
/// `debug_assert!` internally — gating the call itself means the
/// iteration cost disappears too, not just the assertion.
#[cfg(debug_assertions)]
pub fn check_invariants_at_boundary() {
    FRAME_TABLE.lock().check_invariants();
    scheduler::check_process_invariants();
}

#[cfg(not(debug_assertions))]
pub fn check_invariants_at_boundary() {}

// Cold boot has no trap to return from, so there is no hardware IRETQ
// frame sitting on a stack already. `enter_first_process` builds that
// resume sequence from scratch: point rsp at a `TrapFrame` the caller
// prepared, pop the general-purpose registers off it in the same order
// `syscall_entry`/`timer_interrupt_entry` do, then `iretq` into ring 3.
global_asm!(
    ".global enter_first_process",
    "enter_first_process:",
    "mov rsp, rdi",
    "pop r15",
    "pop r14",
    "pop r13",
    "pop r12",
    "pop r11",
    "pop r10",
    "pop r9",
    "pop r8",
    "pop rbp",
    "pop rdi",
    "pop rsi",
    "pop rdx",
    "pop rcx",
    "pop rbx",
    "pop rax",
    "iretq",
);

extern "C" {
    fn enter_first_process(trapframe: *const TrapFrame) -> !;
}

/// Picks the first runnable process and jumps to it. Called exactly
/// once, at the end of boot; never returns.
pub fn start_first_process() -> ! {
    let pid = scheduler::schedule().expect("no runnable process to start");
    let tf_ptr = &PROCESS_TABLE.lock()[pid.0 as usize].trapframe as *const TrapFrame;
    unsafe { enter_first_process(tf_ptr) }
}
