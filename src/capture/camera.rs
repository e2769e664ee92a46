//! Camera capture through nokhwa.

use super::{CaptureBackend, CaptureDeviceInfo, FrameCallback, VideoCapturer};
use crate::errors::RtcError;
use crate::media::engine::CaptureParams;
use crate::media::frame::VideoFrame;
use crate::render::convert::rgb24_to_i420;
use crate::types::StreamKind;
use nokhwa::{
    pixel_format::RgbFormat,
    query,
    utils::{
        ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
        Resolution,
    },
    CallbackCamera,
};

const BACKEND_NAME: &str = "camera";

/// Native cameras. Lists no screen devices.
#[derive(Debug, Default)]
pub struct CameraBackend;

impl CameraBackend {
    pub fn new() -> Self {
        Self
    }
}

impl CaptureBackend for CameraBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    fn devices(&self, kind: StreamKind) -> Result<Vec<CaptureDeviceInfo>, RtcError> {
        if kind != StreamKind::Camera {
            return Ok(Vec::new());
        }

        let cameras = query(ApiBackend::Auto)
            .map_err(|e| RtcError::Capture(format!("Failed to query cameras: {}", e)))?;

        Ok(cameras
            .into_iter()
            .map(|info| {
                CaptureDeviceInfo::new(
                    info.index().to_string(),
                    info.human_name(),
                    StreamKind::Camera,
                    BACKEND_NAME,
                )
            })
            .collect())
    }

    fn open(
        &self,
        device: &CaptureDeviceInfo,
        params: CaptureParams,
    ) -> Result<Box<dyn VideoCapturer>, RtcError> {
        let index = device
            .id
            .parse::<u32>()
            .map_err(|_| RtcError::Capture(format!("Invalid camera id {:?}", device.id)))?;

        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
            CameraFormat::new(
                Resolution::new(params.width, params.height),
                FrameFormat::MJPEG,
                params.fps,
            ),
        ));

        let camera = CallbackCamera::new(CameraIndex::Index(index), requested, |_| {})
            .map_err(|e| {
                RtcError::Capture(format!("Failed to open camera {}: {}", device.name, e))
            })?;

        log::info!(
            "Opened camera {} ({}) at {}x{} @ {}fps",
            device.name,
            device.id,
            params.width,
            params.height,
            params.fps
        );

        Ok(Box::new(CameraCapturer {
            camera,
            name: device.name.clone(),
        }))
    }
}

struct CameraCapturer {
    camera: CallbackCamera,
    name: String,
}

impl VideoCapturer for CameraCapturer {
    fn start(&mut self, mut on_frame: FrameCallback) -> Result<(), RtcError> {
        let name = self.name.clone();
        self.camera
            .set_callback(move |buffer: nokhwa::Buffer| {
                let image = match buffer.decode_image::<RgbFormat>() {
                    Ok(image) => image,
                    Err(e) => {
                        log::warn!("Dropping undecodable frame from {}: {}", name, e);
                        return;
                    }
                };
                match rgb24_to_i420(image.as_raw(), image.width(), image.height()) {
                    Ok(i420) => on_frame(VideoFrame::new(i420)),
                    Err(e) => log::warn!("Dropping frame from {}: {}", name, e),
                }
            })
            .map_err(|e| RtcError::Capture(format!("Failed to set callback: {}", e)))?;

        self.camera
            .open_stream()
            .map_err(|e| RtcError::Capture(format!("Failed to start stream: {}", e)))
    }

    fn stop(&mut self) -> Result<(), RtcError> {
        self.camera
            .stop_stream()
            .map_err(|e| RtcError::Capture(format!("Failed to stop stream: {}", e)))
    }
}
