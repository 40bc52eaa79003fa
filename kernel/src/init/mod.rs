// kernel/src/init/mod.rs
//
// Boot orchestration: IDT, framebuffer, memory, interrupts, TSS, then
// hand off to the first scheduled process. Order matters throughout —
// each step depends on state the previous one established.

pub mod devices;
pub mod memory;
pub mod processes;

use bootloader_api::BootInfo;
use x86_64::VirtAddr;

use crate::{
    framebuffer::{init_global_framebuffer, Framebuffer},
    process,
    serial_println,
};

pub fn boot(boot_info: &'static mut BootInfo) -> ! {
    devices::init_idt();

    // Stays here because buffer_mut() requires the &'static mut
    // lifetime that flows from boot_info.
    let fb = boot_info.framebuffer.as_mut().expect("no framebuffer provided by bootloader");
    let info = fb.info();
    let buffer = fb.buffer_mut();

    let framebuffer = Framebuffer::new(
        buffer,
        info.width as usize,
        info.height as usize,
        info.stride as usize,
        info.bytes_per_pixel as usize,
    );
    init_global_framebuffer(framebuffer);

    let phys_mem_offset =
        VirtAddr::new(boot_info.physical_memory_offset.into_option().expect("no physical memory offset"));

    memory::init_core(phys_mem_offset, &boot_info.memory_regions);
    memory::test_allocators();

    devices::draw_boot_screen();
    devices::init_hardware_interrupts();

    serial_println!("initializing TSS and GDT");
    process::tss::init();

    serial_println!("creating first process");
    processes::init_all();

    serial_println!("starting first process");
    process::start_first_process();
}
