use super::engine::{CaptureParams, MediaEngine};
use super::track::{MediaTrack, TrackSet, VideoSink};
use crate::errors::RtcError;
use crate::render::{FrameRenderer, RenderSurface};
use crate::types::StreamConfig;
use std::sync::Arc;

const AUDIO_LABEL: &str = "strtc-audio";
const VIDEO_LABEL: &str = "strtc-video";

/// Local audio/video tracks built from a [`StreamConfig`], plus the optional
/// local preview renderer.
pub struct MediaStream {
    config: StreamConfig,
    tracks: TrackSet,
    renderer: Option<Arc<FrameRenderer>>,
}

impl MediaStream {
    pub fn new(config: StreamConfig) -> Self {
        Self {
            config,
            tracks: TrackSet::default(),
            renderer: None,
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Build the track set. Video uses the first capture device that opens at
    /// the configured size and rate; if none does, the whole call fails and no
    /// track is kept.
    pub fn start(&mut self, engine: &dyn MediaEngine) -> Result<(), RtcError> {
        self.stop_tracks();

        let audio = if self.config.has_audio {
            let track = engine.create_audio_track(AUDIO_LABEL)?;
            log::info!("Created local audio track {}", track.id());
            Some(track)
        } else {
            None
        };

        let video = if self.config.has_video {
            match self.open_video(engine) {
                Ok(track) => Some(track),
                Err(e) => {
                    if let Some(audio) = audio {
                        audio.stop();
                    }
                    return Err(e);
                }
            }
        } else {
            None
        };

        self.tracks = TrackSet { audio, video };

        if let (Some(renderer), Some(video)) = (&self.renderer, &self.tracks.video) {
            video.add_or_update_sink(renderer.clone());
        }
        Ok(())
    }

    fn open_video(&self, engine: &dyn MediaEngine) -> Result<Arc<dyn MediaTrack>, RtcError> {
        let params = CaptureParams {
            width: self.config.width,
            height: self.config.height,
            fps: self.config.fps,
        };
        let devices = engine.capture_devices(self.config.kind)?;
        log::debug!("{} {:?} capture device(s) available", devices.len(), self.config.kind);

        for device in &devices {
            match engine.create_video_track(VIDEO_LABEL, device, params) {
                Ok(track) => {
                    log::info!(
                        "Capturing from {} at {}x{} @ {}fps",
                        device.name,
                        params.width,
                        params.height,
                        params.fps
                    );
                    return Ok(track);
                }
                Err(e) => log::warn!("Capture device {} unusable: {}", device.name, e),
            }
        }

        Err(RtcError::Capture(format!(
            "No {:?} capture device could be opened at {}x{} @ {}fps",
            self.config.kind, params.width, params.height, params.fps
        )))
    }

    /// Detach the preview renderer and release every track.
    pub fn stop(&mut self) {
        if let (Some(renderer), Some(video)) = (&self.renderer, &self.tracks.video) {
            video.remove_sink(renderer.id());
        }
        self.stop_tracks();
    }

    fn stop_tracks(&mut self) {
        for track in self.tracks.iter() {
            track.stop();
        }
        self.tracks = TrackSet::default();
    }

    /// Bind a preview renderer to the video track, replacing any previous one.
    pub fn set_video_render(
        &mut self,
        surface: Arc<dyn RenderSurface>,
        fill: [u8; 3],
    ) -> Arc<FrameRenderer> {
        let renderer = Arc::new(FrameRenderer::new(surface, fill));
        if let Some(video) = &self.tracks.video {
            if let Some(old) = &self.renderer {
                video.remove_sink(old.id());
            }
            video.add_or_update_sink(renderer.clone());
        }
        self.renderer = Some(renderer.clone());
        renderer
    }

    pub fn renderer(&self) -> Option<&Arc<FrameRenderer>> {
        self.renderer.as_ref()
    }

    pub fn tracks(&self) -> TrackSet {
        self.tracks.clone()
    }

    pub fn set_audio_enabled(&self, enabled: bool) {
        if let Some(audio) = &self.tracks.audio {
            audio.set_enabled(enabled);
        }
    }

    pub fn set_video_enabled(&self, enabled: bool) {
        if let Some(video) = &self.tracks.video {
            video.set_enabled(enabled);
        }
    }
}

impl Drop for MediaStream {
    fn drop(&mut self) {
        self.stop();
    }
}
