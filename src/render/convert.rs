//! Pixel format conversion between capture, frame and surface formats.

use crate::errors::RtcError;
use crate::media::frame::{I420Buffer, VideoRotation};
use bytes::Bytes;

/// Bytes per pixel of the packed surface format (B, G, R, A).
pub const BGRA_BYTES_PER_PIXEL: usize = 4;

/// Rotate one plane of `width` x `height` bytes clockwise.
pub fn rotate_plane(src: &[u8], width: u32, height: u32, rotation: VideoRotation) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;
    let mut dst = vec![0u8; w * h];

    match rotation {
        VideoRotation::Rotation0 => dst.copy_from_slice(&src[..w * h]),
        VideoRotation::Rotation90 => {
            // dst is h wide, w tall
            for dy in 0..w {
                for dx in 0..h {
                    dst[dy * h + dx] = src[(h - 1 - dx) * w + dy];
                }
            }
        }
        VideoRotation::Rotation180 => {
            for (i, px) in src[..w * h].iter().rev().enumerate() {
                dst[i] = *px;
            }
        }
        VideoRotation::Rotation270 => {
            for dy in 0..w {
                for dx in 0..h {
                    dst[dy * h + dx] = src[dx * w + (w - 1 - dy)];
                }
            }
        }
    }

    dst
}

/// Convert an I420 buffer into packed BGRA (BT.601, limited range).
///
/// `dst` must hold exactly `width * height * 4` bytes.
pub fn i420_to_bgra(buffer: &I420Buffer, dst: &mut [u8]) -> Result<(), RtcError> {
    let w = buffer.width() as usize;
    let h = buffer.height() as usize;
    if dst.len() != w * h * BGRA_BYTES_PER_PIXEL {
        return Err(RtcError::Media(format!(
            "destination holds {} bytes, {}x{} BGRA needs {}",
            dst.len(),
            w,
            h,
            w * h * BGRA_BYTES_PER_PIXEL
        )));
    }

    let cw = buffer.chroma_width() as usize;
    let (y_plane, u_plane, v_plane) = (buffer.data_y(), buffer.data_u(), buffer.data_v());

    for row in 0..h {
        let chroma_row = (row / 2) * cw;
        for col in 0..w {
            let c = y_plane[row * w + col] as i32 - 16;
            let d = u_plane[chroma_row + col / 2] as i32 - 128;
            let e = v_plane[chroma_row + col / 2] as i32 - 128;

            let r = (298 * c + 409 * e + 128) >> 8;
            let g = (298 * c - 100 * d - 208 * e + 128) >> 8;
            let b = (298 * c + 516 * d + 128) >> 8;

            let idx = (row * w + col) * BGRA_BYTES_PER_PIXEL;
            dst[idx] = b.clamp(0, 255) as u8;
            dst[idx + 1] = g.clamp(0, 255) as u8;
            dst[idx + 2] = r.clamp(0, 255) as u8;
            dst[idx + 3] = 255;
        }
    }

    Ok(())
}

/// Convert RGB24 into an I420 buffer, subsampling chroma from the top-left
/// pixel of each 2x2 block.
pub fn rgb24_to_i420(rgb: &[u8], width: u32, height: u32) -> Result<I420Buffer, RtcError> {
    let w = width as usize;
    let h = height as usize;
    if rgb.len() != w * h * 3 {
        return Err(RtcError::Capture(format!(
            "RGB frame holds {} bytes, {}x{} needs {}",
            rgb.len(),
            w,
            h,
            w * h * 3
        )));
    }

    let cw = w.div_ceil(2);
    let ch = h.div_ceil(2);
    let mut y_plane = vec![0u8; w * h];
    let mut u_plane = vec![0u8; cw * ch];
    let mut v_plane = vec![0u8; cw * ch];

    for y in 0..h {
        for x in 0..w {
            let rgb_idx = (y * w + x) * 3;
            let r = rgb[rgb_idx] as i32;
            let g = rgb[rgb_idx + 1] as i32;
            let b = rgb[rgb_idx + 2] as i32;

            let y_val = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
            y_plane[y * w + x] = y_val.clamp(0, 255) as u8;

            if y % 2 == 0 && x % 2 == 0 {
                let uv_idx = (y / 2) * cw + (x / 2);
                let u_val = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
                let v_val = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
                u_plane[uv_idx] = u_val.clamp(0, 255) as u8;
                v_plane[uv_idx] = v_val.clamp(0, 255) as u8;
            }
        }
    }

    I420Buffer::new(
        width,
        height,
        Bytes::from(y_plane),
        Bytes::from(u_plane),
        Bytes::from(v_plane),
    )
}
