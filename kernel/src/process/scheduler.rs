// kernel/src/process/scheduler.rs
//
// Round-robin scheduling (C5) over the fixed process array. Pid 0
// (idle) is never selected by the rotation; it only runs when nothing
// else is RUNNABLE, and even then the caller spins polling the
// keyboard rather than switching into it, mirroring a machine that is
// simply idle.

use super::{Pid, Process, ProcessState, PROCESS_TABLE};
use crate::memory::layout::NPROC;
use crate::memory::vma::{find_vma, Vma};
use core::sync::atomic::{AtomicU8, Ordering};

static CURRENT_PID: AtomicU8 = AtomicU8::new(0);

pub fn current_pid() -> Pid {
    Pid(CURRENT_PID.load(Ordering::Relaxed))
}

fn set_current(pid: Pid) {
    CURRENT_PID.store(pid.0, Ordering::Relaxed);
}

/// Scans `[(current+1) mod NPROC .. current+1+NPROC)` for the first
/// RUNNABLE, non-idle slot. Returns `None` if nothing is runnable
/// (caller should poll the keyboard and try again).
pub fn pick_next() -> Option<Pid> {
    let table = PROCESS_TABLE.lock();
    let start = (current_pid().0 as usize + 1) % NPROC;
    for offset in 0..NPROC {
        let idx = (start + offset) % NPROC;
        if idx == 0 {
            continue; // pid 0 is never scheduled by rotation
        }
        if table[idx].state == ProcessState::RUNNABLE {
            return Some(Pid(idx as u8));
        }
    }
    None
}

/// Runs the scheduler loop: pick a runnable process and return its
/// pid, switching `CURRENT_PID` as a side effect. If nothing is
/// runnable, polls the keyboard (so the VM can still be exited) and
/// returns `None`.
pub fn schedule() -> Option<Pid> {
    match pick_next() {
        Some(pid) => {
            set_current(pid);
            Some(pid)
        }
        None => {
            let _ = crate::keyboard::read_key();
            None
        }
    }
}

/// Finds the VMA covering `fault_addr` in the currently running
/// process, for the page-fault handler. Returns the owning pid too,
/// since the handler logs it.
pub fn find_current_vma(fault_addr: u64) -> Option<(usize, Vma)> {
    let pid = current_pid();
    if pid.0 == 0 {
        return None;
    }
    find_vma(pid.0 as usize, fault_addr).map(|vma| (pid.0 as usize, vma))
}

/// Marks the current process BROKEN (printing `reason`), then picks
/// the next runnable process and returns its saved trapframe so the
/// caller's exception handler can redirect `iretq` onto it.
pub fn kill_and_switch(reason: &str) -> super::trapframe::TrapFrame {
    let pid = current_pid();
    {
        let mut table = PROCESS_TABLE.lock();
        if pid.0 != 0 {
            table[pid.0 as usize].state = ProcessState::BROKEN;
        }
        crate::serial_println!("process {} killed: {}", pid.0, reason);
    }

    loop {
        if let Some(next) = schedule() {
            return PROCESS_TABLE.lock()[next.0 as usize].trapframe;
        }
        // Nothing runnable: fall back to idle's trapframe, which just
        // halts forever.
        return PROCESS_TABLE.lock()[0].trapframe;
    }
}

/// Debug helper matching the frame table's invariant sweep: asserts
/// every RUNNABLE/BROKEN slot owns a page table and every FREE slot
/// does not.
pub fn check_process_invariants() {
    let table = PROCESS_TABLE.lock();
    for proc in table.iter() {
        match proc.state {
            ProcessState::FREE => debug_assert!(proc.page_table.is_none() || proc.pid.0 == 0),
            _ => {}
        }
    }
}

#[allow(dead_code)]
fn name_of(proc: &Process) -> &str {
    let len = proc.name.iter().position(|&b| b == 0).unwrap_or(proc.name.len());
    core::str::from_utf8(&proc.name[..len]).unwrap_or("?")
}
