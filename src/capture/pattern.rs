//! Synthetic capture device producing a moving gradient.

use super::{CaptureBackend, CaptureDeviceInfo, FrameCallback, VideoCapturer};
use crate::config::MAX_DIMENSION;
use crate::errors::RtcError;
use crate::media::engine::CaptureParams;
use crate::media::frame::VideoFrame;
use crate::render::convert::rgb24_to_i420;
use crate::types::StreamKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const BACKEND_NAME: &str = "test-pattern";

/// Gradient frame that shifts with `frame_number`, so consecutive frames differ.
pub fn test_pattern_frame(frame_number: u64, width: u32, height: u32) -> Result<VideoFrame, RtcError> {
    let (w, h) = (width as usize, height as usize);
    let mut rgb = vec![0u8; w * h * 3];
    let base = (frame_number % 256) as u8;
    for y in 0..h {
        for x in 0..w {
            let idx = (y * w + x) * 3;
            rgb[idx] = base.wrapping_add((x % 256) as u8);
            rgb[idx + 1] = base.wrapping_add((y % 256) as u8);
            rgb[idx + 2] = base.wrapping_add(((x + y) % 256) as u8);
        }
    }
    Ok(VideoFrame::new(rgb24_to_i420(&rgb, width, height)?))
}

/// Backend exposing one test-pattern device per stream kind.
#[derive(Debug, Default)]
pub struct TestPatternBackend;

impl TestPatternBackend {
    pub fn new() -> Self {
        Self
    }
}

impl CaptureBackend for TestPatternBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    fn devices(&self, kind: StreamKind) -> Result<Vec<CaptureDeviceInfo>, RtcError> {
        let (id, name) = match kind {
            StreamKind::Camera => ("test-pattern:camera", "Test Pattern Camera"),
            StreamKind::Screen => ("test-pattern:screen", "Test Pattern Screen"),
        };
        Ok(vec![CaptureDeviceInfo::new(id, name, kind, BACKEND_NAME)])
    }

    fn open(
        &self,
        device: &CaptureDeviceInfo,
        params: CaptureParams,
    ) -> Result<Box<dyn VideoCapturer>, RtcError> {
        if params.width == 0
            || params.height == 0
            || params.fps == 0
            || params.width > MAX_DIMENSION
            || params.height > MAX_DIMENSION
        {
            return Err(RtcError::Capture(format!(
                "{} cannot capture {}x{} @ {}fps",
                device.name, params.width, params.height, params.fps
            )));
        }
        Ok(Box::new(TestPatternCapturer {
            params,
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
        }))
    }
}

struct TestPatternCapturer {
    params: CaptureParams,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl VideoCapturer for TestPatternCapturer {
    fn start(&mut self, mut on_frame: FrameCallback) -> Result<(), RtcError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(RtcError::Capture("Test pattern already running".to_string()));
        }

        let running = self.running.clone();
        let params = self.params;
        let interval = Duration::from_millis(1000 / params.fps as u64);

        let handle = std::thread::Builder::new()
            .name("strtc-capture".to_string())
            .spawn(move || {
                let mut frame_number = 0u64;
                while running.load(Ordering::SeqCst) {
                    match test_pattern_frame(frame_number, params.width, params.height) {
                        Ok(frame) => on_frame(frame),
                        Err(e) => {
                            log::error!("Test pattern generation failed: {}", e);
                            break;
                        }
                    }
                    frame_number += 1;
                    std::thread::sleep(interval);
                }
            })
            .map_err(|e| RtcError::Capture(format!("Failed to spawn capture thread: {}", e)))?;

        self.thread = Some(handle);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), RtcError> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            handle
                .join()
                .map_err(|_| RtcError::Capture("Capture thread panicked".to_string()))?;
        }
        Ok(())
    }
}

impl Drop for TestPatternCapturer {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
