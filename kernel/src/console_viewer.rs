// kernel/src/console_viewer.rs
//
// C8: a framebuffer-driven memory visualizer. Two independent toggles
// (both flipped through the MEM_TOGGLE syscall, §4.4) gate what gets
// painted on each timer tick:
//   - the global viewer paints a grid over the whole physical frame
//     table, one cell per tracked frame, colored by owner;
//   - a per-process "display status" flag additionally paints that
//     process's page-table occupancy as a second, smaller grid.
// Neither toggle is on by default — a process opts in by calling
// MEM_TOGGLE, matching the teacher's habit of keeping diagnostic
// output behind an explicit switch rather than always-on logging.

use crate::framebuffer::{Color, FRAMEBUFFER};
use crate::memory::frame_table::{Owner, FRAME_TABLE};
use crate::memory::layout::NPROC;
use crate::memory::vma::vmas_of;
use crate::process::syscall::{display_status_enabled, global_viewer_enabled};
use core::sync::atomic::{AtomicUsize, Ordering};
use x86_64::structures::paging::PageTableFlags;

/// Cell size in pixels for the frame-table grid.
const CELL_SIZE: usize = 4;
/// Only the first N frames are painted — past that the grid would run
/// off a typical boot framebuffer's height anyway, and this is a
/// diagnostic overlay, not a complete memory map.
const GRID_FRAMES: usize = 4096;
const GRID_TOP: usize = 40;
const GRID_LEFT: usize = 10;

/// How many frames the grid is wide; derived from a typical 1024+ px
/// wide boot framebuffer so the whole strip fits without querying the
/// real width on every tick.
const GRID_COLUMNS: usize = 200;

fn owner_color(owner: Owner) -> Color {
    match owner {
        Owner::Free => Color::rgb(20, 20, 20),
        Owner::Reserved => Color::rgb(120, 120, 0),
        Owner::Kernel => Color::rgb(0, 90, 200),
        Owner::Process(pid) => process_color(pid),
    }
}

fn process_color(pid: u8) -> Color {
    // Cheap deterministic hash into a visually distinct palette so
    // processes stay a consistent color across ticks without a lookup
    // table.
    const PALETTE: [Color; 8] = [
        Color::rgb(220, 40, 40),
        Color::rgb(40, 200, 80),
        Color::rgb(220, 160, 0),
        Color::rgb(200, 40, 200),
        Color::rgb(0, 200, 200),
        Color::rgb(240, 240, 240),
        Color::rgb(255, 120, 0),
        Color::rgb(120, 80, 220),
    ];
    PALETTE[pid as usize % PALETTE.len()]
}

fn paint_frame_grid() {
    let table = FRAME_TABLE.lock();
    let mut fb = FRAMEBUFFER.lock();
    let fb = match fb.as_mut() {
        Some(fb) => fb,
        None => return,
    };

    for idx in 0..GRID_FRAMES {
        let addr = idx as u64 * crate::memory::layout::PAGE_SIZE;
        let owner = match table.owner_of(addr) {
            Some(o) => o,
            None => break,
        };
        let col = idx % GRID_COLUMNS;
        let row = idx / GRID_COLUMNS;
        let x = GRID_LEFT + col * CELL_SIZE;
        let y = GRID_TOP + row * CELL_SIZE;
        fb.fill_rect(x, y, CELL_SIZE, CELL_SIZE, owner_color(owner));
    }
}

/// Rotates through whichever processes have their own display flag
/// set, devoting a few ticks to each so a human watching the boot
/// screen can actually read one before it changes (see
/// `TICKS_PER_PROCESS_VIEW`).
static VIEW_ROTATION: AtomicUsize = AtomicUsize::new(0);
const TICKS_PER_PROCESS_VIEW: usize = 30;
static ROTATION_TICKS: AtomicUsize = AtomicUsize::new(0);

fn next_display_pid() -> Option<usize> {
    let ticks = ROTATION_TICKS.fetch_add(1, Ordering::Relaxed);
    if ticks % TICKS_PER_PROCESS_VIEW == 0 {
        VIEW_ROTATION.fetch_add(1, Ordering::Relaxed);
    }
    let start = VIEW_ROTATION.load(Ordering::Relaxed);
    for offset in 0..NPROC {
        let pid = (start + offset) % NPROC;
        if pid == 0 || !display_status_enabled(pid) {
            continue;
        }
        let is_free = crate::process::PROCESS_TABLE.lock()[pid].state
            == crate::process::ProcessState::FREE;
        if !is_free {
            return Some(pid);
        }
    }
    None
}

const PROC_GRID_TOP: usize = 420;

fn paint_process_vmas(pid: usize) {
    let vmas = vmas_of(pid);
    let mut fb = FRAMEBUFFER.lock();
    let fb = match fb.as_mut() {
        Some(fb) => fb,
        None => return,
    };

    fb.fill_rect(GRID_LEFT, PROC_GRID_TOP - 20, 400, 20, Color::BLACK);
    let label = match pid {
        0..=9 => [b'p', b'i', b'd', b' ', b'0' + pid as u8],
        _ => [b'p', b'i', b'd', b' ', b'?'],
    };
    let label_str = core::str::from_utf8(&label).unwrap_or("pid ?");
    fb.draw_text(GRID_LEFT, PROC_GRID_TOP - 20, label_str, Color::WHITE, Color::BLACK, 1);

    for (i, vma) in vmas.iter().enumerate() {
        let (fg, bg) = match vma.kind {
            crate::memory::vma::VmaKind::Code => (Color::rgb(0, 200, 255), Color::BLACK),
            crate::memory::vma::VmaKind::Anonymous => (Color::rgb(0, 220, 100), Color::BLACK),
        };
        let width = (vma.size_pages * CELL_SIZE).min(400);
        let y = PROC_GRID_TOP + i * (CELL_SIZE + 2);

        // User-accessible pages render with fore/back swapped (a
        // colored border around a dark interior) rather than the
        // kernel-only solid block, so the strip distinguishes the two
        // at a glance without a separate legend.
        let user_accessible = vma.page_table_flags().contains(PageTableFlags::USER_ACCESSIBLE);
        if user_accessible {
            fb.fill_rect(GRID_LEFT, y, width, CELL_SIZE, fg);
            if width > 2 && CELL_SIZE > 2 {
                fb.fill_rect(GRID_LEFT + 1, y + 1, width - 2, CELL_SIZE - 2, bg);
            }
        } else {
            fb.fill_rect(GRID_LEFT, y, width, CELL_SIZE, fg);
        }
    }
}

/// Called once per timer tick from `timer_preempt_handler`. A cheap
/// no-op when both toggles are off, so leaving the viewer disabled
/// costs nothing beyond the two atomic loads.
pub fn update() {
    if global_viewer_enabled() {
        paint_frame_grid();
    }
    if let Some(pid) = next_display_pid() {
        paint_process_vmas(pid);
    }
}
