use crate::errors::RtcError;
use crate::render::convert::rotate_plane;
use bytes::Bytes;
use chrono::{DateTime, Utc};

/// Clockwise rotation the producer attached to a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoRotation {
    #[default]
    Rotation0,
    Rotation90,
    Rotation180,
    Rotation270,
}

impl VideoRotation {
    pub fn degrees(&self) -> u32 {
        match self {
            VideoRotation::Rotation0 => 0,
            VideoRotation::Rotation90 => 90,
            VideoRotation::Rotation180 => 180,
            VideoRotation::Rotation270 => 270,
        }
    }

    /// True when applying this rotation swaps width and height.
    pub fn swaps_dimensions(&self) -> bool {
        matches!(self, VideoRotation::Rotation90 | VideoRotation::Rotation270)
    }
}

/// Planar YUV 4:2:0 picture with tightly packed planes.
///
/// Luma stride equals `width`; chroma planes are `(width + 1) / 2` by
/// `(height + 1) / 2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct I420Buffer {
    width: u32,
    height: u32,
    y: Bytes,
    u: Bytes,
    v: Bytes,
}

impl I420Buffer {
    pub fn new(width: u32, height: u32, y: Bytes, u: Bytes, v: Bytes) -> Result<Self, RtcError> {
        if width == 0 || height == 0 {
            return Err(RtcError::Media(format!(
                "invalid frame dimensions {}x{}",
                width, height
            )));
        }
        let luma = width as usize * height as usize;
        let chroma = chroma_len(width, height);
        if y.len() != luma || u.len() != chroma || v.len() != chroma {
            return Err(RtcError::Media(format!(
                "plane sizes {}/{}/{} do not match {}x{} I420",
                y.len(),
                u.len(),
                v.len(),
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            y,
            u,
            v,
        })
    }

    /// Uniform picture with the given YUV value.
    pub fn filled(width: u32, height: u32, y: u8, u: u8, v: u8) -> Result<Self, RtcError> {
        let luma = width as usize * height as usize;
        let chroma = chroma_len(width, height);
        Self::new(
            width,
            height,
            Bytes::from(vec![y; luma]),
            Bytes::from(vec![u; chroma]),
            Bytes::from(vec![v; chroma]),
        )
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn chroma_width(&self) -> u32 {
        self.width.div_ceil(2)
    }

    pub fn chroma_height(&self) -> u32 {
        self.height.div_ceil(2)
    }

    pub fn data_y(&self) -> &[u8] {
        &self.y
    }

    pub fn data_u(&self) -> &[u8] {
        &self.u
    }

    pub fn data_v(&self) -> &[u8] {
        &self.v
    }

    /// Returns an upright copy of this buffer rotated clockwise.
    pub fn rotate(&self, rotation: VideoRotation) -> I420Buffer {
        if rotation == VideoRotation::Rotation0 {
            return self.clone();
        }

        let (cw, ch) = (self.chroma_width(), self.chroma_height());
        let (width, height) = if rotation.swaps_dimensions() {
            (self.height, self.width)
        } else {
            (self.width, self.height)
        };

        I420Buffer {
            width,
            height,
            y: Bytes::from(rotate_plane(&self.y, self.width, self.height, rotation)),
            u: Bytes::from(rotate_plane(&self.u, cw, ch, rotation)),
            v: Bytes::from(rotate_plane(&self.v, cw, ch, rotation)),
        }
    }
}

fn chroma_len(width: u32, height: u32) -> usize {
    width.div_ceil(2) as usize * height.div_ceil(2) as usize
}

/// Decoded picture delivered to sinks.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    buffer: I420Buffer,
    rotation: VideoRotation,
    timestamp: DateTime<Utc>,
}

impl VideoFrame {
    pub fn new(buffer: I420Buffer) -> Self {
        Self {
            buffer,
            rotation: VideoRotation::Rotation0,
            timestamp: Utc::now(),
        }
    }

    pub fn with_rotation(mut self, rotation: VideoRotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn buffer(&self) -> &I420Buffer {
        &self.buffer
    }

    pub fn rotation(&self) -> VideoRotation {
        self.rotation
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Width after the rotation has been applied.
    pub fn display_width(&self) -> u32 {
        if self.rotation.swaps_dimensions() {
            self.buffer.height()
        } else {
            self.buffer.width()
        }
    }

    /// Height after the rotation has been applied.
    pub fn display_height(&self) -> u32 {
        if self.rotation.swaps_dimensions() {
            self.buffer.width()
        } else {
            self.buffer.height()
        }
    }
}
