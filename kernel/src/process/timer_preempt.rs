// kernel/src/process/timer_preempt.rs
//
// C5's timer-driven preemption. Every PIT tick this stub saves the
// interrupted process's full register state, gives the scheduler a
// chance to rotate onto the next RUNNABLE slot, and resumes by
// swapping `rsp` onto whichever TrapFrame comes back - same mechanism
// EXIT/YIELD use from the syscall path.

use super::trapframe::TrapFrame;
use core::arch::global_asm;
use core::sync::atomic::{AtomicUsize, Ordering};

global_asm!(
    ".global timer_interrupt_entry",
    "timer_interrupt_entry:",
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
    "call timer_preempt_handler",
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

extern "C" {
    pub fn timer_interrupt_entry();
}

/// Ticks between preemptions. Every tick still counts toward
/// `syscall::tick_count()` bookkeeping; only every Nth one actually
/// rotates the scheduler, so a process gets a fair slice instead of
/// being kicked off after a single instruction.
const TICKS_PER_SLICE: usize = 10;

static SLICE_TICKS: AtomicUsize = AtomicUsize::new(0);

/// Called from assembly with a pointer to the interrupted process's
/// full TrapFrame. Acks the PIC, saves the frame onto the current
/// process, and either keeps running it (slice not yet up) or asks
/// the scheduler for the next RUNNABLE one and returns that frame
/// instead.
#[no_mangle]
pub extern "C" fn timer_preempt_handler(current_tf: *mut TrapFrame) -> *const TrapFrame {
    unsafe {
        use x86_64::instructions::port::PortWriteOnly;
        PortWriteOnly::<u8>::new(0x20).write(0x20);
    }

    let pid = super::scheduler::current_pid();
    if pid.0 != 0 {
        super::PROCESS_TABLE.lock()[pid.0 as usize].trapframe = unsafe { *current_tf };
    }

    crate::console_viewer::update();

    let ticks = SLICE_TICKS.fetch_add(1, Ordering::Relaxed) + 1;
    if ticks < TICKS_PER_SLICE {
        return current_tf;
    }
    SLICE_TICKS.store(0, Ordering::Relaxed);

    match super::scheduler::schedule() {
        Some(next) => &super::PROCESS_TABLE.lock()[next.0 as usize].trapframe as *const TrapFrame,
        None => current_tf,
    }
}
