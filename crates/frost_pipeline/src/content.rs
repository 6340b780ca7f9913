//! UI content source and the CPU side of the capture surface

use frost_core::{Color, IntSize, Rect};

/// The live UI layer being blurred
///
/// Implemented by the host's compositor bridge. `draw` is called on the GPU
/// command thread once per content change.
pub trait UiContent: Send + Sync {
    /// Current pixel size of the content
    fn size(&self) -> IntSize;

    /// Paint the current content; the canvas is already cleared to transparent
    fn draw(&self, canvas: &mut ContentCanvas);
}

/// Top-down RGBA8 pixel surface the UI content is drawn into before upload
pub struct ContentCanvas {
    size: IntSize,
    pixels: Vec<u8>,
}

impl ContentCanvas {
    pub fn new(size: IntSize) -> Self {
        Self {
            size,
            pixels: vec![0; (size.area() * 4) as usize],
        }
    }

    pub fn size(&self) -> IntSize {
        self.size
    }

    pub fn width(&self) -> u32 {
        self.size.width
    }

    pub fn height(&self) -> u32 {
        self.size.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Reallocate for a new size, contents become transparent
    pub fn resize(&mut self, size: IntSize) {
        self.size = size;
        self.pixels.clear();
        self.pixels.resize((size.area() * 4) as usize, 0);
    }

    pub fn clear(&mut self, color: Color) {
        let rgba = color.to_rgba8();
        for px in self.pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, color: Color) {
        if x < self.size.width && y < self.size.height {
            let i = ((y * self.size.width + x) * 4) as usize;
            self.pixels[i..i + 4].copy_from_slice(&color.to_rgba8());
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x < self.size.width && y < self.size.height {
            let i = ((y * self.size.width + x) * 4) as usize;
            Some([
                self.pixels[i],
                self.pixels[i + 1],
                self.pixels[i + 2],
                self.pixels[i + 3],
            ])
        } else {
            None
        }
    }

    /// Fill the pixels whose centers fall inside `rect` (clipped to the canvas)
    pub fn fill_rect(&mut self, rect: Rect, color: Color) {
        let x0 = rect.x().round().max(0.0) as u32;
        let y0 = rect.y().round().max(0.0) as u32;
        let x1 = (rect.right().round().max(0.0) as u32).min(self.size.width);
        let y1 = (rect.bottom().round().max(0.0) as u32).min(self.size.height);
        let rgba = color.to_rgba8();
        for y in y0..y1 {
            for x in x0..x1 {
                let i = ((y * self.size.width + x) * 4) as usize;
                self.pixels[i..i + 4].copy_from_slice(&rgba);
            }
        }
    }
}
