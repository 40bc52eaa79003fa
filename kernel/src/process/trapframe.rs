// kernel/src/process/trapframe.rs
//
// Layout compatible with the stack frame IRETQ expects: general
// purpose registers pushed by the kernel, followed by the frame the
// CPU itself pushes on any trap into a lower privilege level.

// Field order matters: it must mirror the order `push`/`pop` leave the
// general-purpose registers in on the stack (last pushed sits at the
// lowest address, i.e. becomes the first field), not the order they
// were pushed in.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct TrapFrame {
    // Saved by the kernel (push/pop), lowest address first
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rbp: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rbx: u64,
    pub rax: u64,

    // Saved by hardware on trap into Ring 3 (the IRETQ frame)
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

impl TrapFrame {
    pub const fn zeroed() -> Self {
        Self {
            r15: 0, r14: 0, r13: 0, r12: 0, r11: 0, r10: 0, r9: 0, r8: 0,
            rbp: 0, rdi: 0, rsi: 0, rdx: 0, rcx: 0, rbx: 0, rax: 0,
            rip: 0, cs: 0, rflags: 0, rsp: 0, ss: 0,
        }
    }

    /// A trapframe for a process that has never run: general purpose
    /// registers cleared, `rip`/`rsp` set by the caller, RPL forced to
    /// 3 and interrupts enabled.
    pub fn new_user(entry_point: u64, user_stack: u64, user_cs: u64, user_ss: u64) -> Self {
        Self {
            rip: entry_point,
            cs: user_cs | 3,
            rflags: 0x202, // IF set
            rsp: user_stack,
            ss: user_ss | 3,
            ..Self::zeroed()
        }
    }

    pub fn debug_print(&self) {
        crate::serial_println!(
            "trapframe: rip={:#x} cs={:#x} rflags={:#x} rsp={:#x} ss={:#x}",
            self.rip, self.cs, self.rflags, self.rsp, self.ss,
        );
        if self.cs & 3 != 3 || self.ss & 3 != 3 {
            crate::serial_println!("  warning: RPL is not 3, iretq will fault");
        }
    }
}
