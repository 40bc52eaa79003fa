// kernel/src/process/user_programs.rs
//
// Hand-written x86-64 user test programs, embedded directly in the
// kernel image the same way the teacher's own `user_test_fileio`
// module embeds its tests: raw instructions in a `.text.user` section,
// read back as a byte slice and copied into a fresh process's frames
// by `process_load`. These target the trap ABI in `syscall.rs`
// (§4.4) rather than the teacher's file-I/O one.
//
// Every program is position-independent by construction: no absolute
// addresses, only relative jumps/calls and RIP-relative `lea` for the
// string literals, since `process_load` copies the bytes verbatim to
// `PROC_START_ADDR` regardless of where the linker placed them in the
// kernel binary.
//
// The boot command string (§6) selects which image becomes PID 1 (and,
// for `test2`, PID 2 as well) — see `init::processes::boot_program_index`.

use core::arch::global_asm;

// Program #0 (default boot): grows the heap by one page and touches
// its first byte, driving the demand-paging path (§4.4 step 1), then
// yields forever.
global_asm!(
    ".section .text.user",
    ".align 16",
    ".global program0_start",
    "program0_start:",
    "    mov rdi, 4096",
    "    mov rax, 7", // SBRK
    "    int 0x80",
    "    mov r12, rax", // r12 = old break = VA of the fresh page
    "    mov byte ptr [r12], 65", // write 'A', faults the page in
    "program0_loop:",
    "    mov rax, 4", // YIELD
    "    int 0x80",
    "    jmp program0_loop",
    ".global program0_end",
    "program0_end:",
);

// Program #1 ("malloc" boot command): grows the heap by three pages,
// touches each one, then shrinks by two — exercising both halves of
// C6's `sbrk_internal` (growth never allocates, shrink unmaps
// immediately).
global_asm!(
    ".section .text.user",
    ".align 16",
    ".global program1_start",
    "program1_start:",
    "    mov rdi, 12288",
    "    mov rax, 7",
    "    int 0x80",
    "    mov r12, rax",
    "    mov byte ptr [r12], 1",
    "    mov byte ptr [r12 + 4096], 2",
    "    mov byte ptr [r12 + 8192], 3",
    "    mov rdi, -8192",
    "    mov rax, 7",
    "    int 0x80",
    "program1_loop:",
    "    mov rax, 4",
    "    int 0x80",
    "    jmp program1_loop",
    ".global program1_end",
    "program1_end:",
);

// Program #2 ("alloctests" boot command): grows the heap by one page,
// then maps that same virtual address explicitly via PAGE_ALLOC,
// exercising the direct-mapping syscall independently of the
// page-fault path.
global_asm!(
    ".section .text.user",
    ".align 16",
    ".global program2_start",
    "program2_start:",
    "    mov rdi, 4096",
    "    mov rax, 7", // SBRK
    "    int 0x80",
    "    mov r12, rax",
    "    mov rdi, r12",
    "    mov rax, 5", // PAGE_ALLOC
    "    int 0x80",
    "    mov byte ptr [r12], 9",
    "program2_loop:",
    "    mov rax, 4",
    "    int 0x80",
    "    jmp program2_loop",
    ".global program2_end",
    "program2_end:",
);

// Program #3 ("test"/"test2" boot commands): the fork-isolation
// scenario from §8 property 3. Writes a sentinel into a freshly
// demand-paged heap byte, forks, and has the child overwrite that same
// virtual address with a different sentinel while the parent yields a
// while and then re-checks its own copy is untouched. Reports the
// outcome via PANIC (which halts the VM with the copied message,
// §4.4), since there is no other output channel from ring 3.
global_asm!(
    ".section .text.user",
    ".align 16",
    ".global program3_start",
    "program3_start:",
    "    mov rdi, 4096",
    "    mov rax, 7", // SBRK
    "    int 0x80",
    "    mov r12, rax",
    "    mov byte ptr [r12], 0xAA",
    "    mov rax, 2", // FORK
    "    int 0x80",
    "    cmp rax, 0",
    "    je program3_child",
    "    jl program3_fork_failed",
    "    mov r13, 200000",
    "program3_parent_wait:",
    "    mov rax, 4", // YIELD
    "    int 0x80",
    "    dec r13",
    "    jnz program3_parent_wait",
    "    movzx rax, byte ptr [r12]",
    "    cmp rax, 0xAA",
    "    je program3_parent_ok",
    "    lea rdi, [rip + program3_msg_fail]",
    "    mov rax, 0", // PANIC
    "    int 0x80",
    "program3_parent_ok:",
    "    lea rdi, [rip + program3_msg_ok]",
    "    mov rax, 0",
    "    int 0x80",
    "program3_fork_failed:",
    "    lea rdi, [rip + program3_msg_forkfail]",
    "    mov rax, 0",
    "    int 0x80",
    "program3_child:",
    "    mov byte ptr [r12], 0xBB",
    "program3_child_loop:",
    "    mov rax, 4",
    "    int 0x80",
    "    jmp program3_child_loop",
    "program3_msg_ok:",
    "    .asciz \"fork isolation ok: parent heap byte unchanged\"",
    "program3_msg_fail:",
    "    .asciz \"fork isolation FAILED: parent heap byte clobbered\"",
    "program3_msg_forkfail:",
    "    .asciz \"fork() returned -1: out of process slots or memory\"",
    ".global program3_end",
    "program3_end:",
);

extern "C" {
    static program0_start: u8;
    static program0_end: u8;
    static program1_start: u8;
    static program1_end: u8;
    static program2_start: u8;
    static program2_end: u8;
    static program3_start: u8;
    static program3_end: u8;
}

/// Selects program `index` (0-3, per §6's boot command table) as a
/// byte slice ready for `process::process_load`.
pub fn program_image(index: u8) -> &'static [u8] {
    unsafe {
        let (start, end): (*const u8, *const u8) = match index {
            0 => (&program0_start, &program0_end),
            1 => (&program1_start, &program1_end),
            2 => (&program2_start, &program2_end),
            _ => (&program3_start, &program3_end),
        };
        core::slice::from_raw_parts(start, end as usize - start as usize)
    }
}
