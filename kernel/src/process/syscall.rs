// kernel/src/process/syscall.rs
//
// The syscall ABI (C4): a user process enters with `int 0x80`, rax
// holding the trap number and rdi/rsi/rdx/r10/r8/r9 holding up to six
// arguments. The asm stub pushes every general-purpose register on top
// of the hardware's own IRETQ frame, which makes the whole block on
// the stack exactly a `TrapFrame` (same layout `timer_preempt` uses).
// The handler below can therefore do more than return a value in rax:
// for EXIT/YIELD/TIMER it swaps in a *different* process's saved
// TrapFrame and the asm resumes from there instead, exactly like
// `timer_preempt_handler` does on a timer tick.

use core::arch::global_asm;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::memory::frame_table::{Owner, FRAME_TABLE};
use crate::memory::heap::sbrk_internal;
use crate::memory::layout::NPROC;
use crate::process::scheduler::{current_pid, schedule};
use crate::process::trapframe::TrapFrame;
use crate::process::{process_fork, process_free, PROCESS_TABLE};
use x86_64::structures::paging::{Page, PageTableFlags};
use x86_64::{PhysAddr, VirtAddr};

global_asm!(
    ".global syscall_entry",
    "syscall_entry:",
    "push rax",
    "push rbx",
    "push rcx",
    "push rdx",
    "push rsi",
    "push rdi",
    "push rbp",
    "push r8",
    "push r9",
    "push r10",
    "push r11",
    "push r12",
    "push r13",
    "push r14",
    "push r15",
    "mov rdi, rsp",
    "call syscall_handler_asm",
    "mov rsp, rax",
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

/// Called from assembly with a pointer to the full in-progress
/// TrapFrame (GP registers + the hardware IRETQ frame, contiguous on
/// the stack). Dispatches the trap, stashes the frame onto the
/// current process, mutates `rax` (or swaps in a different process's
/// frame entirely), and returns the frame the assembly should resume
/// from.
#[no_mangle]
extern "C" fn syscall_handler_asm(tf: *mut TrapFrame) -> u64 {
    let num = unsafe { (*tf).rax };
    let (rdi, rsi, rdx, r10, r8, r9) = unsafe {
        ((*tf).rdi, (*tf).rsi, (*tf).rdx, (*tf).r10, (*tf).r8, (*tf).r9)
    };

    let caller = current_pid();
    if caller.0 != 0 {
        PROCESS_TABLE.lock()[caller.0 as usize].trapframe = unsafe { *tf };
    }

    let outcome = syscall_handler(num, rdi, rsi, rdx, r10, r8, r9);

    crate::process::check_invariants_at_boundary();

    let resume = match outcome {
        SyscallOutcome::Return(value) => {
            unsafe { (*tf).rax = value as u64 };
            tf as u64
        }
        SyscallOutcome::Reschedule => reschedule_from(caller, tf),
    };
    resume
}

fn reschedule_from(caller: crate::process::Pid, current_tf: *mut TrapFrame) -> u64 {
    match schedule() {
        Some(next) => {
            let next_tf = &mut PROCESS_TABLE.lock()[next.0 as usize].trapframe as *mut TrapFrame;
            next_tf as u64
        }
        None => {
            let _ = caller;
            current_tf as u64
        }
    }
}

enum SyscallOutcome {
    Return(i64),
    Reschedule,
}

/// The trap-number table this kernel actually implements. Deliberately
/// not Linux-compatible: this is an educational ABI, not a syscall
/// layer meant to run unmodified ELF binaries.
#[derive(Debug, Clone, Copy)]
#[repr(u64)]
pub enum Trap {
    Panic = 0,
    Getpid = 1,
    Fork = 2,
    Exit = 3,
    Yield = 4,
    PageAlloc = 5,
    Brk = 6,
    Sbrk = 7,
    Mapping = 8,
    MemToggle = 9,
    Timer = 10,
}

impl Trap {
    fn from_u64(n: u64) -> Option<Self> {
        Some(match n {
            0 => Self::Panic,
            1 => Self::Getpid,
            2 => Self::Fork,
            3 => Self::Exit,
            4 => Self::Yield,
            5 => Self::PageAlloc,
            6 => Self::Brk,
            7 => Self::Sbrk,
            8 => Self::Mapping,
            9 => Self::MemToggle,
            10 => Self::Timer,
            _ => return None,
        })
    }
}

static GLOBAL_VIEWER: AtomicBool = AtomicBool::new(false);
static DISPLAY_STATUS: [AtomicBool; NPROC] = [const { AtomicBool::new(false) }; NPROC];
static TICK_COUNT: AtomicU64 = AtomicU64::new(0);

pub fn global_viewer_enabled() -> bool {
    GLOBAL_VIEWER.load(Ordering::Relaxed)
}

pub fn display_status_enabled(pid: usize) -> bool {
    pid < NPROC && DISPLAY_STATUS[pid].load(Ordering::Relaxed)
}

fn syscall_handler(
    num: u64,
    arg1: u64,
    arg2: u64,
    _arg3: u64,
    _arg4: u64,
    _arg5: u64,
    _arg6: u64,
) -> SyscallOutcome {
    let trap = match Trap::from_u64(num) {
        Some(t) => t,
        None => {
            crate::serial_println!("syscall: unknown trap {}", num);
            return SyscallOutcome::Return(-1);
        }
    };

    match trap {
        Trap::Panic => SyscallOutcome::Return(sys_panic(arg1)),
        Trap::Getpid => SyscallOutcome::Return(current_pid().0 as i64),
        Trap::Fork => SyscallOutcome::Return(sys_fork()),
        Trap::Exit => {
            process_free(current_pid());
            SyscallOutcome::Reschedule
        }
        Trap::Yield => SyscallOutcome::Reschedule,
        Trap::PageAlloc => SyscallOutcome::Return(sys_page_alloc(arg1)),
        Trap::Brk => SyscallOutcome::Return(sys_brk(arg1)),
        Trap::Sbrk => SyscallOutcome::Return(sys_sbrk(arg1 as i64)),
        Trap::Mapping => SyscallOutcome::Return(sys_mapping(arg1, arg2)),
        Trap::MemToggle => SyscallOutcome::Return(sys_mem_toggle(arg1)),
        Trap::Timer => {
            TICK_COUNT.fetch_add(1, Ordering::Relaxed);
            SyscallOutcome::Reschedule
        }
    }
}

/// Copies up to 160 bytes from the mapped physical page backing `ptr`
/// (the user's own address space, already active) and halts the VM.
/// A null pointer panics with no message.
fn sys_panic(ptr: u64) -> i64 {
    if ptr == 0 {
        panic!("user process called PANIC with a null message");
    }
    let len = 160usize;
    let slice = unsafe { core::slice::from_raw_parts(ptr as *const u8, len) };
    let end = slice.iter().position(|&b| b == 0).unwrap_or(len);
    let msg = core::str::from_utf8(&slice[..end]).unwrap_or("<invalid utf8>");
    panic!("user process panicked: {}", msg);
}

fn sys_fork() -> i64 {
    match process_fork(current_pid()) {
        Some(pid) => pid.0 as i64,
        None => -1,
    }
}

fn sys_page_alloc(va: u64) -> i64 {
    let pid = current_pid();
    let owner = Owner::Process(pid.0);
    let frame_addr = match FRAME_TABLE.lock().palloc(owner) {
        Some(a) => a,
        None => return -1,
    };

    let table = PROCESS_TABLE.lock();
    let root = match table[pid.0 as usize].page_table.as_ref() {
        Some(r) => r,
        None => {
            FRAME_TABLE.lock().freepage(frame_addr);
            return -1;
        }
    };

    let page: Page = Page::containing_address(VirtAddr::new(va));
    let flags = PageTableFlags::PRESENT | PageTableFlags::WRITABLE | PageTableFlags::USER_ACCESSIBLE;
    let result = unsafe { root.virtual_memory_map(page.start_address(), PhysAddr::new(frame_addr), flags) };
    if result.is_err() {
        FRAME_TABLE.lock().freepage(frame_addr);
        return -1;
    }
    0
}

fn sys_brk(new_break: u64) -> i64 {
    let pid = current_pid();
    let table = PROCESS_TABLE.lock();
    let proc = &table[pid.0 as usize];
    let root = match proc.page_table.as_ref() {
        Some(r) => r,
        None => return -1,
    };
    let delta = new_break as i64 - proc.program_break as i64;
    match sbrk_internal(root, pid.0 as usize, proc.original_break, proc.program_break, delta) {
        Ok(new) => {
            drop(table);
            PROCESS_TABLE.lock()[pid.0 as usize].program_break = new;
            0
        }
        Err(()) => -1,
    }
}

fn sys_sbrk(increment: i64) -> i64 {
    let pid = current_pid();
    let table = PROCESS_TABLE.lock();
    let proc = &table[pid.0 as usize];
    let root = match proc.page_table.as_ref() {
        Some(r) => r,
        None => return -1,
    };
    let old = proc.program_break;
    match sbrk_internal(root, pid.0 as usize, proc.original_break, proc.program_break, increment) {
        Ok(new) => {
            drop(table);
            PROCESS_TABLE.lock()[pid.0 as usize].program_break = new;
            old as i64
        }
        Err(()) => -1,
    }
}

/// Writes `virtual_memory_lookup(va)` — physical address, permission
/// bits, and presence, in that order — into `*result_ptr` after
/// verifying the destination itself is USER|WRITABLE, so a malicious
/// or buggy process cannot use MAPPING to clobber read-only or
/// kernel-only memory.
fn sys_mapping(result_ptr: u64, va: u64) -> i64 {
    let pid = current_pid();
    let table = PROCESS_TABLE.lock();
    let root = match table[pid.0 as usize].page_table.as_ref() {
        Some(r) => r,
        None => return -1,
    };

    let dest_ok = unsafe { root.virtual_memory_lookup(VirtAddr::new(result_ptr)) }
        .map(|(_, flags)| flags.contains(PageTableFlags::USER_ACCESSIBLE | PageTableFlags::WRITABLE))
        .unwrap_or(false);
    if !dest_ok {
        return -1;
    }

    let looked_up = unsafe { root.virtual_memory_lookup(VirtAddr::new(va)) };
    let (pa, perm_bits, present) = match looked_up {
        Some((pa, flags)) => (pa.as_u64(), flags.bits(), 1u64),
        None => (0, 0, 0u64),
    };

    unsafe {
        let dst = result_ptr as *mut u64;
        core::ptr::write(dst, pa);
        core::ptr::write(dst.add(1), perm_bits);
        core::ptr::write(dst.add(2), present);
    }
    0
}

fn sys_mem_toggle(pid_arg: u64) -> i64 {
    if pid_arg == 0 {
        let prev = GLOBAL_VIEWER.fetch_xor(true, Ordering::Relaxed);
        let _ = prev;
    } else {
        let pid = current_pid();
        if (pid.0 as usize) < NPROC {
            DISPLAY_STATUS[pid.0 as usize].fetch_xor(true, Ordering::Relaxed);
        }
    }
    0
}

pub fn tick_count() -> u64 {
    TICK_COUNT.load(Ordering::Relaxed)
}
