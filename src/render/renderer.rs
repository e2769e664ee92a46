use super::convert::{i420_to_bgra, BGRA_BYTES_PER_PIXEL};
use super::layout::letterbox;
use super::surface::{PresentedFrame, RenderSurface};
use crate::media::frame::{VideoFrame, VideoRotation};
use crate::media::track::{SinkId, VideoSink};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Packed BGRA pixel buffer owned by one renderer.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    reallocations: u64,
}

impl FrameBuffer {
    /// Resize to `width` x `height`. Unchanged dimensions keep the current
    /// allocation. The first allocation is not counted as a reallocation.
    pub fn set_size(&mut self, width: u32, height: u32) {
        if width == self.width && height == self.height && !self.pixels.is_empty() {
            return;
        }

        if !self.pixels.is_empty() {
            self.reallocations += 1;
        }
        self.width = width;
        self.height = height;
        self.pixels = vec![0u8; width as usize * height as usize * BGRA_BYTES_PER_PIXEL];
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    pub fn reallocations(&self) -> u64 {
        self.reallocations
    }

    /// True when the allocation matches the declared dimensions.
    pub fn is_consistent(&self) -> bool {
        self.pixels.len() == self.width as usize * self.height as usize * BGRA_BYTES_PER_PIXEL
    }
}

/// Point-in-time view of a renderer's buffer, taken under its lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferInfo {
    pub width: u32,
    pub height: u32,
    /// Bytes actually allocated.
    pub allocated: usize,
    pub reallocations: u64,
    pub frames_rendered: u64,
}

impl BufferInfo {
    pub fn is_consistent(&self) -> bool {
        self.allocated == self.width as usize * self.height as usize * BGRA_BYTES_PER_PIXEL
    }
}

struct RenderState {
    buffer: FrameBuffer,
    frames: u64,
    surface_warned: bool,
}

/// Frame sink that converts frames and blits them onto a surface.
///
/// All work for one frame happens under the renderer's mutex. Producers block
/// on contention; frames are never skipped.
pub struct FrameRenderer {
    id: SinkId,
    surface: Arc<dyn RenderSurface>,
    fill: [u8; 3],
    state: Mutex<RenderState>,
}

impl FrameRenderer {
    pub fn new(surface: Arc<dyn RenderSurface>, fill: [u8; 3]) -> Self {
        Self {
            id: SinkId::next(),
            surface,
            fill,
            state: Mutex::new(RenderState {
                buffer: FrameBuffer::default(),
                frames: 0,
                surface_warned: false,
            }),
        }
    }

    pub fn surface(&self) -> &Arc<dyn RenderSurface> {
        &self.surface
    }

    pub fn buffer_info(&self) -> BufferInfo {
        let state = self.lock();
        BufferInfo {
            width: state.buffer.width(),
            height: state.buffer.height(),
            allocated: state.buffer.pixels().len(),
            reallocations: state.buffer.reallocations(),
            frames_rendered: state.frames,
        }
    }

    /// Convert and present one frame.
    pub fn render(&self, frame: &VideoFrame) {
        let mut state = self.lock();

        let rotated;
        let buffer = if frame.rotation() != VideoRotation::Rotation0 {
            rotated = frame.buffer().rotate(frame.rotation());
            &rotated
        } else {
            frame.buffer()
        };

        state.buffer.set_size(buffer.width(), buffer.height());
        if let Err(e) = i420_to_bgra(buffer, state.buffer.pixels_mut()) {
            log::error!("Renderer {:?} failed to convert frame: {}", self.id, e);
            return;
        }
        state.frames += 1;

        if !self.surface.is_valid() {
            if !state.surface_warned {
                log::warn!("Renderer {:?}: surface is no longer valid, not drawing", self.id);
                state.surface_warned = true;
            }
            return;
        }

        let (client_width, client_height) = self.surface.client_size();
        let dest = letterbox(
            state.buffer.width(),
            state.buffer.height(),
            client_width,
            client_height,
        );
        let presented = PresentedFrame {
            pixels: state.buffer.pixels(),
            width: state.buffer.width(),
            height: state.buffer.height(),
            dest,
            fill: self.fill,
        };
        if let Err(e) = self.surface.present(&presented) {
            log::warn!("Renderer {:?} failed to present frame: {}", self.id, e);
        }
    }

    fn lock(&self) -> MutexGuard<'_, RenderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl VideoSink for FrameRenderer {
    fn id(&self) -> SinkId {
        self.id
    }

    fn on_frame(&self, frame: &VideoFrame) {
        self.render(frame);
    }
}
