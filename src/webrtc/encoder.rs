//! H.264 encoding of local video for a peer connection sender.
//!
//! Captured I420 frames are encoded with openh264 on the capture thread and
//! queued to a task that writes them to the sender's sample track.

use crate::errors::RtcError;
use crate::media::frame::{I420Buffer, VideoFrame, VideoRotation};
use crate::media::track::{SinkId, VideoSink};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use openh264::encoder::{Encoder, FrameType};
use openh264::formats::YUVBuffer;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedSender};
use webrtc::media::Sample;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

/// Used for the first frame and whenever timestamps go backwards.
const DEFAULT_FRAME_DURATION: Duration = Duration::from_millis(33);

/// One encoded access unit in Annex B format.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub data: Bytes,
    pub is_keyframe: bool,
}

/// openh264 encoder that follows the input resolution.
pub struct H264Encoder {
    encoder: Encoder,
    size: Option<(u32, u32)>,
    frame_count: u64,
}

impl H264Encoder {
    pub fn new() -> Result<Self, RtcError> {
        let encoder = Encoder::new()
            .map_err(|e| RtcError::Media(format!("Failed to create H.264 encoder: {}", e)))?;
        Ok(Self {
            encoder,
            size: None,
            frame_count: 0,
        })
    }

    /// Encode `buffer`. Both dimensions must be even.
    pub fn encode(&mut self, buffer: &I420Buffer) -> Result<EncodedFrame, RtcError> {
        let (width, height) = (buffer.width(), buffer.height());
        if width % 2 != 0 || height % 2 != 0 {
            return Err(RtcError::Media(format!(
                "H.264 needs even dimensions, got {}x{}",
                width, height
            )));
        }

        if self.size != Some((width, height)) {
            if self.size.is_some() {
                log::info!("Encoder input changed to {}x{}", width, height);
                self.encoder.force_intra_frame();
            }
            self.size = Some((width, height));
        }

        let mut yuv =
            Vec::with_capacity(buffer.data_y().len() + buffer.data_u().len() * 2);
        yuv.extend_from_slice(buffer.data_y());
        yuv.extend_from_slice(buffer.data_u());
        yuv.extend_from_slice(buffer.data_v());
        let source = YUVBuffer::from_vec(yuv, width as usize, height as usize);

        let bitstream = self
            .encoder
            .encode(&source)
            .map_err(|e| RtcError::Media(format!("H.264 encoding failed: {}", e)))?;
        let is_keyframe = matches!(bitstream.frame_type(), FrameType::IDR | FrameType::I);
        let data = Bytes::from(bitstream.to_vec());

        self.frame_count += 1;
        Ok(EncodedFrame { data, is_keyframe })
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

struct EncoderState {
    encoder: H264Encoder,
    last_timestamp: Option<DateTime<Utc>>,
}

/// Sink that turns the frames of a local video track into samples.
pub struct VideoSampleSink {
    id: SinkId,
    state: Mutex<EncoderState>,
    samples: UnboundedSender<Sample>,
}

impl VideoSampleSink {
    /// Samples go to `samples` in frame order.
    pub fn new(samples: UnboundedSender<Sample>) -> Result<Self, RtcError> {
        Ok(Self {
            id: SinkId::next(),
            state: Mutex::new(EncoderState {
                encoder: H264Encoder::new()?,
                last_timestamp: None,
            }),
            samples,
        })
    }

    /// Sink writing to `track`. The writer task runs on the current runtime
    /// and ends once the sink is dropped.
    pub(crate) fn spawn(track: Arc<TrackLocalStaticSample>) -> Result<Arc<Self>, RtcError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Sample>();
        let sink = Arc::new(Self::new(tx)?);

        tokio::spawn(async move {
            while let Some(sample) = rx.recv().await {
                if let Err(e) = track.write_sample(&sample).await {
                    log::debug!("Dropping video sample for {}: {}", track.id(), e);
                }
            }
            log::debug!("Video sample writer for {} finished", track.id());
        });

        Ok(sink)
    }

    pub fn frames_encoded(&self) -> u64 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .encoder
            .frame_count()
    }
}

impl VideoSink for VideoSampleSink {
    fn id(&self) -> SinkId {
        self.id
    }

    fn on_frame(&self, frame: &VideoFrame) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let encoded = if frame.rotation() == VideoRotation::Rotation0 {
            state.encoder.encode(frame.buffer())
        } else {
            state.encoder.encode(&frame.buffer().rotate(frame.rotation()))
        };
        let encoded = match encoded {
            Ok(encoded) => encoded,
            Err(e) => {
                log::warn!("Skipping local video frame: {}", e);
                return;
            }
        };

        if encoded.data.is_empty() {
            // rate control skipped the frame
            return;
        }

        let duration = state
            .last_timestamp
            .and_then(|last| (frame.timestamp() - last).to_std().ok())
            .filter(|d| !d.is_zero())
            .unwrap_or(DEFAULT_FRAME_DURATION);
        state.last_timestamp = Some(frame.timestamp());

        let sample = Sample {
            data: encoded.data,
            duration,
            ..Default::default()
        };
        if self.samples.send(sample).is_err() {
            log::trace!("Sample writer gone, dropping encoded frame");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::synthetic_i420_frame;

    #[test]
    fn test_first_frame_is_annex_b_keyframe() {
        let mut encoder = H264Encoder::new().unwrap();
        let frame = synthetic_i420_frame(0, 64, 48).unwrap();

        let encoded = encoder.encode(frame.buffer()).unwrap();
        assert!(encoded.is_keyframe);
        assert!(
            encoded.data.starts_with(&[0x00, 0x00, 0x00, 0x01])
                || encoded.data.starts_with(&[0x00, 0x00, 0x01])
        );
        assert_eq!(encoder.frame_count(), 1);
    }

    #[test]
    fn test_odd_dimensions_are_rejected() {
        let mut encoder = H264Encoder::new().unwrap();
        let frame = synthetic_i420_frame(0, 15, 9).unwrap();
        assert!(encoder.encode(frame.buffer()).is_err());
        assert_eq!(encoder.frame_count(), 0);
    }

    #[test]
    fn test_sink_queues_one_sample_per_frame() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = VideoSampleSink::new(tx).unwrap();
        let start = Utc::now();

        for n in 0..3u64 {
            let frame = synthetic_i420_frame(n, 32, 32)
                .unwrap()
                .with_timestamp(start + chrono::Duration::milliseconds(40 * n as i64));
            sink.on_frame(&frame);
        }
        sink.on_frame(&synthetic_i420_frame(3, 31, 31).unwrap());

        let first = rx.try_recv().unwrap();
        assert!(!first.data.is_empty());
        assert_eq!(first.duration, DEFAULT_FRAME_DURATION);

        // later samples cover the gap since the previous sample
        let mut rest = Duration::ZERO;
        while let Ok(sample) = rx.try_recv() {
            rest += sample.duration;
        }
        assert_eq!(rest, Duration::from_millis(80));
        assert_eq!(sink.frames_encoded(), 3);
    }
}
