// kernel/src/keyboard_buffer.rs
//
// Lock-free SPSC ring buffer: the keyboard IRQ handler pushes, the
// scheduler's idle-poll loop pops. No Mutex, so a handler running with
// interrupts disabled can never deadlock against itself.

use core::sync::atomic::{AtomicUsize, Ordering};

const BUFFER_SIZE: usize = 128;

pub struct KeyboardBuffer {
    buffer: [Option<char>; BUFFER_SIZE],
    read_index: AtomicUsize,
    write_index: AtomicUsize,
}

// SAFETY: only ever touched through the atomic indices below.
unsafe impl Sync for KeyboardBuffer {}

impl KeyboardBuffer {
    pub const fn new() -> Self {
        Self {
            buffer: [None; BUFFER_SIZE],
            read_index: AtomicUsize::new(0),
            write_index: AtomicUsize::new(0),
        }
    }

    /// Called from the IRQ handler. Drops the character if the buffer
    /// is full rather than blocking.
    pub fn push(&self, c: char) {
        let write = self.write_index.load(Ordering::Acquire);
        let read = self.read_index.load(Ordering::Acquire);

        let next_write = (write + 1) % BUFFER_SIZE;
        if next_write == read {
            return;
        }

        // SAFETY: only the IRQ handler writes, and it is the sole
        // producer; `next_write != read` guarantees this slot isn't
        // also being read right now.
        unsafe {
            let ptr = self.buffer.as_ptr() as *mut Option<char>;
            ptr.add(write).write(Some(c));
        }

        self.write_index.store(next_write, Ordering::Release);
    }

    /// Called from the consumer (scheduler idle-poll). Returns `None`
    /// if nothing has been typed since the last read.
    pub fn pop(&self) -> Option<char> {
        let read = self.read_index.load(Ordering::Acquire);
        let write = self.write_index.load(Ordering::Acquire);

        if read == write {
            return None;
        }

        // SAFETY: only the consumer reads, and `read != write`
        // guarantees this slot has been published.
        let c = unsafe {
            let ptr = self.buffer.as_ptr() as *const Option<char>;
            ptr.add(read).read()
        };

        let next_read = (read + 1) % BUFFER_SIZE;
        self.read_index.store(next_read, Ordering::Release);

        c
    }

    pub fn len(&self) -> usize {
        let write = self.write_index.load(Ordering::Relaxed);
        let read = self.read_index.load(Ordering::Relaxed);

        if write >= read {
            write - read
        } else {
            BUFFER_SIZE - read + write
        }
    }
}

pub static KEYBOARD_BUFFER: KeyboardBuffer = KeyboardBuffer::new();
