use super::layout::Rect;
use crate::errors::RtcError;
use image::{imageops, ImageBuffer, Rgba, RgbaImage};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// One blit request handed to a surface.
#[derive(Debug)]
pub struct PresentedFrame<'a> {
    /// Packed BGRA pixels, `width * height * 4` bytes.
    pub pixels: &'a [u8],
    pub width: u32,
    pub height: u32,
    /// Where the scaled picture goes inside the client area.
    pub dest: Rect,
    /// Letterbox background as [r, g, b].
    pub fill: [u8; 3],
}

/// A presentation target (window, texture, off-screen canvas).
pub trait RenderSurface: Send + Sync {
    /// False once the underlying window or handle is gone.
    fn is_valid(&self) -> bool;

    /// Size of the drawable client area in pixels.
    fn client_size(&self) -> (u32, u32);

    /// Fill the client area with `frame.fill` and draw the picture scaled into
    /// `frame.dest`.
    fn present(&self, frame: &PresentedFrame<'_>) -> Result<(), RtcError>;
}

/// Off-screen surface backed by an RGBA image.
pub struct ImageSurface {
    width: u32,
    height: u32,
    canvas: Mutex<RgbaImage>,
    valid: AtomicBool,
    presented: AtomicU64,
}

impl ImageSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            canvas: Mutex::new(RgbaImage::new(width, height)),
            valid: AtomicBool::new(true),
            presented: AtomicU64::new(0),
        }
    }

    /// Mark the surface as gone; later frames are converted but not drawn.
    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::SeqCst);
    }

    pub fn frames_presented(&self) -> u64 {
        self.presented.load(Ordering::SeqCst)
    }

    /// Copy of the last presented client area.
    pub fn snapshot(&self) -> RgbaImage {
        self.canvas
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Write the last presented client area to an image file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), RtcError> {
        self.snapshot()
            .save(path.as_ref())
            .map_err(|e| RtcError::Media(format!("Failed to save snapshot: {}", e)))
    }
}

impl RenderSurface for ImageSurface {
    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    fn client_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn present(&self, frame: &PresentedFrame<'_>) -> Result<(), RtcError> {
        let [r, g, b] = frame.fill;
        let mut canvas = RgbaImage::from_pixel(self.width, self.height, Rgba([r, g, b, 255]));

        if !frame.dest.is_empty() {
            let rgba: Vec<u8> = frame
                .pixels
                .chunks_exact(4)
                .flat_map(|px| [px[2], px[1], px[0], px[3]])
                .collect();
            let picture: RgbaImage = ImageBuffer::from_raw(frame.width, frame.height, rgba)
                .ok_or_else(|| {
                    RtcError::Media(format!(
                        "{} bytes do not form a {}x{} picture",
                        frame.pixels.len(),
                        frame.width,
                        frame.height
                    ))
                })?;

            let scaled = if (frame.dest.width, frame.dest.height) == (frame.width, frame.height) {
                picture
            } else {
                imageops::resize(
                    &picture,
                    frame.dest.width,
                    frame.dest.height,
                    imageops::FilterType::Triangle,
                )
            };
            imageops::replace(&mut canvas, &scaled, frame.dest.x as i64, frame.dest.y as i64);
        }

        *self.canvas.lock().unwrap_or_else(PoisonError::into_inner) = canvas;
        self.presented.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_present_letterboxes_with_fill() {
        let surface = ImageSurface::new(4, 4);
        // 2x1 white picture scaled into the middle rows
        let pixels = [255u8; 8];
        surface
            .present(&PresentedFrame {
                pixels: &pixels,
                width: 2,
                height: 1,
                dest: Rect {
                    x: 0,
                    y: 1,
                    width: 4,
                    height: 2,
                },
                fill: [10, 20, 30],
            })
            .unwrap();

        let image = surface.snapshot();
        assert_eq!(image.get_pixel(0, 0), &Rgba([10, 20, 30, 255]));
        assert_eq!(image.get_pixel(0, 3), &Rgba([10, 20, 30, 255]));
        assert_eq!(image.get_pixel(1, 1), &Rgba([255, 255, 255, 255]));
        assert_eq!(surface.frames_presented(), 1);
    }

    #[test]
    fn test_invalidate() {
        let surface = ImageSurface::new(2, 2);
        assert!(surface.is_valid());
        surface.invalidate();
        assert!(!surface.is_valid());
    }
}
