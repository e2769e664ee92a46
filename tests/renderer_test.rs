//! Renderer buffer management and presentation tests.

use std::sync::Arc;
use std::thread;
use strtc::media::{I420Buffer, VideoFrame, VideoRotation, VideoSink};
use strtc::render::{FrameRenderer, ImageSurface, RenderSurface};
use strtc::testing::synthetic_i420_frame;

fn solid(width: u32, height: u32, y: u8) -> VideoFrame {
    VideoFrame::new(I420Buffer::filled(width, height, y, 128, 128).unwrap())
}

#[test]
fn test_buffer_reallocates_only_on_size_change() {
    let surface = Arc::new(ImageSurface::new(64, 64));
    let renderer = FrameRenderer::new(surface.clone(), [0, 0, 0]);

    for _ in 0..5 {
        renderer.render(&solid(32, 16, 100));
    }
    for _ in 0..5 {
        renderer.render(&solid(16, 16, 100));
    }

    let info = renderer.buffer_info();
    assert_eq!(info.reallocations, 1);
    assert_eq!(info.frames_rendered, 10);
    assert_eq!((info.width, info.height), (16, 16));
    assert!(info.is_consistent());
    assert_eq!(surface.frames_presented(), 10);
}

#[test]
fn test_concurrent_producers_keep_buffer_consistent() {
    let surface = Arc::new(ImageSurface::new(48, 48));
    let renderer = Arc::new(FrameRenderer::new(surface, [0, 0, 0]));

    let producers: Vec<_> = [(32u32, 24u32), (24, 32), (16, 16)]
        .into_iter()
        .map(|(w, h)| {
            let renderer = renderer.clone();
            thread::spawn(move || {
                for n in 0..50 {
                    renderer.on_frame(&synthetic_i420_frame(n, w, h).unwrap());
                }
            })
        })
        .collect();

    let sampler = {
        let renderer = renderer.clone();
        thread::spawn(move || {
            for _ in 0..200 {
                assert!(renderer.buffer_info().is_consistent());
                thread::yield_now();
            }
        })
    };

    for producer in producers {
        producer.join().unwrap();
    }
    sampler.join().unwrap();

    let info = renderer.buffer_info();
    assert_eq!(info.frames_rendered, 150);
    assert!(info.is_consistent());
}

#[test]
fn test_letterbox_fill_on_image_surface() {
    let surface = Arc::new(ImageSurface::new(16, 16));
    let renderer = FrameRenderer::new(surface.clone(), [0, 0, 255]);

    // 2:1 picture in a square: 16x8 centered, 4 rows of fill above and below
    renderer.render(&solid(32, 16, 235));

    let canvas = surface.snapshot();
    assert_eq!(canvas.get_pixel(8, 0).0, [0, 0, 255, 255]);
    assert_eq!(canvas.get_pixel(8, 15).0, [0, 0, 255, 255]);
    let middle = canvas.get_pixel(8, 8).0;
    assert!(middle[0] > 240 && middle[1] > 240 && middle[2] > 240);
}

#[test]
fn test_invalid_surface_is_not_drawn() {
    let surface = Arc::new(ImageSurface::new(16, 16));
    let renderer = FrameRenderer::new(surface.clone(), [0, 0, 0]);
    surface.invalidate();
    assert!(!surface.is_valid());

    renderer.render(&solid(8, 8, 100));
    renderer.render(&solid(8, 8, 100));

    assert_eq!(renderer.buffer_info().frames_rendered, 2);
    assert_eq!(surface.frames_presented(), 0);
}

#[test]
fn test_rotated_frame_swaps_buffer_dimensions() {
    let surface = Arc::new(ImageSurface::new(32, 32));
    let renderer = FrameRenderer::new(surface, [0, 0, 0]);

    renderer.render(&solid(8, 4, 100).with_rotation(VideoRotation::Rotation90));

    let info = renderer.buffer_info();
    assert_eq!((info.width, info.height), (4, 8));
    assert!(info.is_consistent());
}

#[test]
fn test_snapshot_is_saved_as_png() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frame.png");

    let surface = Arc::new(ImageSurface::new(20, 10));
    let renderer = FrameRenderer::new(surface.clone(), [10, 20, 30]);
    renderer.render(&synthetic_i420_frame(7, 20, 10).unwrap());
    surface.save(&path).unwrap();

    let loaded = image::open(&path).unwrap();
    assert_eq!((loaded.width(), loaded.height()), (20, 10));
}
