// kernel/src/framebuffer.rs
//
// Thin wrapper around the boot-time linear framebuffer handed to us by
// the bootloader. Used for the panic screen and the console memory
// viewer (C8); nothing else in this kernel touches pixels directly.

use font8x8::legacy::BASIC_LEGACY;
use spin::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
}

pub struct Framebuffer<'a> {
    buffer: &'a mut [u8],
    width: usize,
    height: usize,
    stride: usize,
    bytes_per_pixel: usize,
}

impl<'a> Framebuffer<'a> {
    pub fn new(
        buffer: &'a mut [u8],
        width: usize,
        height: usize,
        stride: usize,
        bytes_per_pixel: usize,
    ) -> Self {
        Self { buffer, width, height, stride, bytes_per_pixel }
    }

    pub fn clear(&mut self, color: Color) {
        let total_pixels = self.stride * self.height;
        for i in 0..total_pixels {
            let idx = i * self.bytes_per_pixel;
            if idx + 3 < self.buffer.len() {
                self.buffer[idx] = color.b;
                self.buffer[idx + 1] = color.g;
                self.buffer[idx + 2] = color.r;
                self.buffer[idx + 3] = 0x00;
            }
        }
    }

    pub fn draw_pixel(&mut self, x: usize, y: usize, color: Color) {
        if x >= self.width || y >= self.height {
            return;
        }
        let idx = (y * self.stride + x) * self.bytes_per_pixel;
        if idx + 3 < self.buffer.len() {
            self.buffer[idx] = color.b;
            self.buffer[idx + 1] = color.g;
            self.buffer[idx + 2] = color.r;
            self.buffer[idx + 3] = 0x00;
        }
    }

    /// Fills an axis-aligned rectangle, clipped to the screen bounds.
    /// Used by the console viewer to paint one grid cell per frame.
    pub fn fill_rect(&mut self, x: usize, y: usize, w: usize, h: usize, color: Color) {
        for row in y..(y + h).min(self.height) {
            for col in x..(x + w).min(self.width) {
                self.draw_pixel(col, row, color);
            }
        }
    }

    pub fn draw_char(
        &mut self,
        x: usize,
        y: usize,
        ascii: u8,
        fg_color: Color,
        bg_color: Color,
        scale: usize,
    ) {
        let glyph: [u8; 8] = BASIC_LEGACY[ascii as usize];

        for (row, &bits) in glyph.iter().enumerate() {
            for col in 0..8 {
                let bit_set = (bits >> col) & 1 != 0;
                let color = if bit_set { fg_color } else { bg_color };

                for sy in 0..scale {
                    for sx in 0..scale {
                        let px = x + col * scale + sx;
                        let py = y + row * scale + sy;
                        self.draw_pixel(px, py, color);
                    }
                }
            }
        }
    }

    pub fn draw_text(
        &mut self,
        x: usize,
        y: usize,
        text: &str,
        fg_color: Color,
        bg_color: Color,
        scale: usize,
    ) {
        let char_width = 8 * scale;
        for (i, &byte) in text.as_bytes().iter().enumerate() {
            let char_x = x + i * char_width;
            self.draw_char(char_x, y, byte, fg_color, bg_color, scale);
        }
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }
}

/// The single boot-time framebuffer, installed once at boot and shared
/// by the panic handler and the console viewer. `None` until
/// `init_global_framebuffer` runs.
pub static FRAMEBUFFER: Mutex<Option<Framebuffer<'static>>> = Mutex::new(None);

pub fn init_global_framebuffer(fb: Framebuffer<'static>) {
    *FRAMEBUFFER.lock() = Some(fb);
}
