//! Frame presentation: pixel conversion, letterbox layout, surfaces and the
//! renderer sink that ties them together.

pub mod convert;
pub mod layout;
pub mod renderer;
pub mod surface;

pub use layout::{letterbox, Rect};
pub use renderer::{BufferInfo, FrameBuffer, FrameRenderer};
pub use surface::{ImageSurface, PresentedFrame, RenderSurface};
