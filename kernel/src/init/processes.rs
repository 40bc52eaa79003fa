// kernel/src/init/processes.rs
//
// Turns the boot command string (§6) into the first user process: the
// Cargo feature baked in at build time (there is no argv on bare
// metal) selects one of the four embedded test programs in
// `process::user_programs`, and `boot-test2` additionally spawns a
// second copy to exercise fork isolation across two independently
// scheduled processes instead of parent/child alone.

use crate::{
    process::{self, user_programs, Pid, PrivilegeLevel, PROCESS_TABLE},
    serial_println,
};

/// Which embedded program the boot command string selects, per §6:
/// default boot → 0, `boot-malloc` → 1, `boot-alloctests` → 2,
/// `boot-test`/`boot-test2` → 3.
fn boot_program_index() -> u8 {
    if cfg!(feature = "boot-malloc") {
        1
    } else if cfg!(feature = "boot-alloctests") {
        2
    } else if cfg!(feature = "boot-test") || cfg!(feature = "boot-test2") {
        3
    } else {
        0
    }
}

fn boot_command_name() -> &'static str {
    if cfg!(feature = "boot-malloc") {
        "malloc"
    } else if cfg!(feature = "boot-alloctests") {
        "alloctests"
    } else if cfg!(feature = "boot-test2") {
        "test2"
    } else if cfg!(feature = "boot-test") {
        "test"
    } else {
        "default"
    }
}

/// Spawns one user process running `program_index`'s embedded image:
/// claims a process table slot, gives it its own page table, loads the
/// program, sets up its stack, and points its trapframe at ring 3 with
/// interrupts enabled (`rflags` bit 9). Every trap into ring 0 lands on
/// the single shared stack `tss::init` installs in
/// `privilege_stack_table[0]` — there is only one CPU and interrupts
/// stay disabled for the duration of a trap, so no per-process kernel
/// stack is needed.
fn spawn_user_process(program_index: u8) -> Pid {
    let pid = process::process_init(PrivilegeLevel::User)
        .expect("process table exhausted while spawning boot program");

    process::process_config_tables(pid).expect("failed to configure page tables for new process");

    let image = user_programs::program_image(program_index);
    process::process_load(pid, image).expect("failed to load user program image");
    process::process_setup_stack(pid).expect("failed to set up user stack");

    let (user_cs, user_ss) = process::tss::get_user_selectors();
    {
        let mut table = PROCESS_TABLE.lock();
        let proc = &mut table[pid.0 as usize];
        proc.trapframe.cs = user_cs.0 as u64 | 3; // force RPL 3
        proc.trapframe.ss = user_ss.0 as u64 | 3;
        proc.trapframe.rflags = 0x202; // IF set
        proc.set_name(boot_command_name());
    }

    pid
}

/// Spawns the processes the boot command string asks for: always one
/// running the selected program, plus a second copy of the same
/// program when the command is `boot-test2` (two independently
/// scheduled instances of the fork-isolation test, per §8 property 3).
pub fn init_all() {
    let program_index = boot_program_index();
    serial_println!("boot command: '{}' -> program {}", boot_command_name(), program_index);

    let pid1 = spawn_user_process(program_index);
    serial_println!("spawned pid {} running '{}'", pid1.0, boot_command_name());

    if cfg!(feature = "boot-test2") {
        let pid2 = spawn_user_process(program_index);
        serial_println!("spawned pid {} running '{}'", pid2.0, boot_command_name());
    }
}
