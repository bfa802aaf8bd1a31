//! Video file playback producer.
//!
//! This module provides `VideoPlaybackProducer`, which plays a local video
//! file back as if it were a live camera feed.
//!
//! The playback producer is responsible for:
//! - Pacing reads to the target frame rate
//! - Looping (or stopping) at end of stream
//! - Restart and seek by frame or by time
//!
//! The playback producer MUST NOT:
//! - Fetch remote URLs
//! - Retain frames beyond handoff to the host

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;

use super::capture::{CaptureBackend, CaptureDevice, CaptureProperty, FileCaptureBackend};
use super::synthetic::is_stub_address;
use crate::frame::{FrameEmitter, RawFrame};
use crate::module::{IuFactory, ProducingModule, StopHandle, UpdateMessage};
use crate::pacing::{Clock, Pacer, SystemClock};

const CREATOR: &str = "video_playback";

/// Configuration for a playback source.
#[derive(Clone, Debug)]
pub struct PlaybackConfig {
    /// Local file path (or a `stub://` synthetic clip).
    pub path: String,
    /// Target playback rate. `None` plays at the native rate, `Some(0.0)`
    /// disables pacing.
    pub fps: Option<f64>,
    pub loop_playback: bool,
    pub wrap_image: bool,
}

impl PlaybackConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            fps: None,
            loop_playback: true,
            wrap_image: true,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !is_local_file_path(&self.path) {
            bail!(
                "video playback only supports local paths (no URL schemes), got '{}'",
                self.path
            );
        }
        if !is_stub_address(&self.path) && !Path::new(&self.path).exists() {
            bail!("video file not found: {}", self.path);
        }
        if let Some(fps) = self.fps {
            if !fps.is_finite() || fps < 0.0 {
                bail!("playback fps must be a non-negative number, got {}", fps);
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackState {
    Playing,
    /// Past the last frame with looping off. Cleared by restart, seek or setup.
    EndOfStream,
    Stopped,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PlaybackCursor {
    /// Index of the next frame to be read.
    pub current_frame: u64,
    /// Frames in the file as reported by the backend; 0 when unknown.
    pub total_frames: u64,
    pub native_fps: f64,
}

impl PlaybackCursor {
    fn seconds(&self, frames: u64) -> f64 {
        if self.native_fps > 0.0 {
            frames as f64 / self.native_fps
        } else {
            0.0
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct VideoInfo {
    pub path: String,
    pub total_frames: u64,
    pub current_frame: u64,
    pub native_fps: f64,
    pub target_fps: f64,
    pub duration_secs: f64,
    pub current_time_secs: f64,
}

/// Statistics for a playback producer.
#[derive(Clone, Debug, Default)]
pub struct PlaybackStats {
    pub frames_emitted: u64,
    pub loops_completed: u64,
    pub path: String,
}

/// Producer that replays a video file as image IUs.
pub struct VideoPlaybackProducer {
    config: PlaybackConfig,
    backend: Box<dyn CaptureBackend>,
    clock: Arc<dyn Clock>,
    capture: Option<Box<dyn CaptureDevice>>,
    cursor: PlaybackCursor,
    state: PlaybackState,
    target_fps: f64,
    pacer: Pacer,
    emitter: FrameEmitter,
    ius: IuFactory,
    stop: StopHandle,
    stats: PlaybackStats,
}

impl VideoPlaybackProducer {
    /// Open `config.path` with the default file backend.
    pub fn new(config: PlaybackConfig) -> Result<Self> {
        Self::with_backend(
            config,
            Box::new(FileCaptureBackend::default()),
            Arc::new(SystemClock),
        )
    }

    /// Open `config.path` with the given backend and clock.
    ///
    /// Fails if the path is invalid, missing, or does not open.
    pub fn with_backend(
        config: PlaybackConfig,
        backend: Box<dyn CaptureBackend>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let mut producer = Self {
            emitter: FrameEmitter::new(0.0, config.wrap_image),
            stats: PlaybackStats {
                path: config.path.clone(),
                ..PlaybackStats::default()
            },
            config,
            backend,
            clock,
            capture: None,
            cursor: PlaybackCursor::default(),
            state: PlaybackState::Stopped,
            target_fps: 0.0,
            pacer: Pacer::new(0.0),
            ius: IuFactory::new(CREATOR),
            stop: StopHandle::new(),
        };
        producer.open()?;
        Ok(producer)
    }

    fn open(&mut self) -> Result<()> {
        let path = &self.config.path;
        let mut capture = self
            .backend
            .open(path)
            .with_context(|| format!("open video file {}", path))?;
        if !capture.is_opened() {
            capture.release();
            bail!("could not open video file {}", path);
        }

        let total = capture.get(CaptureProperty::FrameCount);
        let total_frames = if total.is_finite() && total > 0.0 {
            total as u64
        } else {
            0
        };
        let native = capture.get(CaptureProperty::Fps);
        let native_fps = if native.is_finite() && native > 0.0 {
            native
        } else {
            0.0
        };

        self.target_fps = self.config.fps.unwrap_or(native_fps);
        self.pacer = Pacer::new(self.target_fps);
        self.emitter = FrameEmitter::new(self.target_fps, self.config.wrap_image);
        self.cursor = PlaybackCursor {
            current_frame: 0,
            total_frames,
            native_fps,
        };
        self.capture = Some(capture);
        self.state = PlaybackState::Playing;
        log::info!(
            "VideoPlaybackProducer: opened {} ({} frames, native {:.2} fps, target {:.2} fps)",
            self.config.path,
            total_frames,
            native_fps,
            self.target_fps
        );
        Ok(())
    }

    /// Rewind to the first frame.
    ///
    /// Applies whenever a handle is held, including when the frame count is
    /// unknown. Returns `false` without a handle.
    pub fn restart(&mut self) -> bool {
        if self.capture.is_none() {
            return false;
        }
        self.rewind();
        if self.state == PlaybackState::EndOfStream {
            self.state = PlaybackState::Playing;
        }
        true
    }

    /// Position the next read at `frame`.
    ///
    /// Ignored (returns `false`) without a handle or when `frame` is outside
    /// `[0, total_frames)`.
    pub fn seek_to_frame(&mut self, frame: u64) -> bool {
        if frame >= self.cursor.total_frames {
            return false;
        }
        let Some(capture) = self.capture.as_mut() else {
            return false;
        };
        if !capture.set(CaptureProperty::PosFrames, frame as f64) {
            log::warn!(
                "VideoPlaybackProducer: backend refused seek to frame {} in {}",
                frame,
                self.config.path
            );
        }
        self.cursor.current_frame = frame;
        if self.state == PlaybackState::EndOfStream {
            self.state = PlaybackState::Playing;
        }
        true
    }

    /// Seek to `seconds` into the file, truncated to a whole frame.
    pub fn seek_to_time(&mut self, seconds: f64) -> bool {
        if self.capture.is_none() || self.cursor.native_fps <= 0.0 {
            return false;
        }
        let frame = (seconds * self.cursor.native_fps).trunc();
        if !frame.is_finite() || frame < 0.0 {
            return false;
        }
        self.seek_to_frame(frame as u64)
    }

    /// `None` when no handle is held.
    pub fn video_info(&self) -> Option<VideoInfo> {
        self.capture.as_ref()?;
        Some(VideoInfo {
            path: self.config.path.clone(),
            total_frames: self.cursor.total_frames,
            current_frame: self.cursor.current_frame,
            native_fps: self.cursor.native_fps,
            target_fps: self.target_fps,
            duration_secs: self.cursor.seconds(self.cursor.total_frames),
            current_time_secs: self.cursor.seconds(self.cursor.current_frame),
        })
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    pub fn cursor(&self) -> PlaybackCursor {
        self.cursor
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn target_fps(&self) -> f64 {
        self.target_fps
    }

    pub fn holds_capture(&self) -> bool {
        self.capture.is_some()
    }

    pub fn stats(&self) -> PlaybackStats {
        self.stats.clone()
    }

    fn play_frame(&mut self) -> Option<UpdateMessage> {
        self.pacer.wait(self.clock.as_ref());
        let next = self.read_with_loop();
        self.pacer.mark_frame(self.clock.now());

        let (frame, index) = next?;
        self.stats.frames_emitted += 1;
        Some(self.emitter.emit(&mut self.ius, frame, index))
    }

    /// Read the next frame, applying the loop policy at end of stream.
    fn read_with_loop(&mut self) -> Option<(RawFrame, u64)> {
        let past_end =
            self.cursor.total_frames > 0 && self.cursor.current_frame >= self.cursor.total_frames;
        if !past_end {
            if let Some(frame) = self.read_next() {
                return Some(self.advance(frame));
            }
        }

        if self.config.loop_playback && self.cursor.total_frames > 0 {
            log::info!(
                "VideoPlaybackProducer: looping {} after {} frames",
                self.config.path,
                self.cursor.current_frame
            );
            self.rewind();
            self.stats.loops_completed += 1;
            match self.read_next() {
                Some(frame) => Some(self.advance(frame)),
                None => {
                    log::error!(
                        "VideoPlaybackProducer: could not read {} after rewinding",
                        self.config.path
                    );
                    None
                }
            }
        } else {
            log::info!(
                "VideoPlaybackProducer: end of {} reached after {} frames",
                self.config.path,
                self.cursor.current_frame
            );
            self.state = PlaybackState::EndOfStream;
            None
        }
    }

    fn advance(&mut self, frame: RawFrame) -> (RawFrame, u64) {
        let index = self.cursor.current_frame;
        self.cursor.current_frame += 1;
        (frame, index)
    }

    fn read_next(&mut self) -> Option<RawFrame> {
        let capture = self.capture.as_mut()?;
        match capture.read() {
            Ok(frame) => frame,
            Err(err) => {
                log::warn!(
                    "VideoPlaybackProducer: decode error in {}: {:#}",
                    self.config.path,
                    err
                );
                None
            }
        }
    }

    fn rewind(&mut self) {
        if let Some(capture) = self.capture.as_mut() {
            capture.set(CaptureProperty::PosFrames, 0.0);
        }
        self.cursor.current_frame = 0;
    }

    fn release_capture(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            capture.release();
        }
    }
}

impl ProducingModule for VideoPlaybackProducer {
    fn name(&self) -> &'static str {
        "Video Playback Module"
    }

    fn description(&self) -> &'static str {
        "A producing module that plays back video files frame by frame."
    }

    /// Re-open the file if the handle was released, and re-arm the stop flag.
    /// A producer parked at end of stream starts over from the first frame.
    fn setup(&mut self) -> Result<()> {
        self.stop.reset();
        if self.capture.is_none() {
            self.open()?;
        } else if self.state == PlaybackState::EndOfStream {
            self.rewind();
            self.state = PlaybackState::Playing;
        }
        self.pacer.reset();
        Ok(())
    }

    fn process_update(&mut self) -> Option<UpdateMessage> {
        if self.stop.is_stopped() {
            self.shutdown();
            return None;
        }
        match self.state {
            PlaybackState::Stopped | PlaybackState::EndOfStream => None,
            PlaybackState::Playing => self.play_frame(),
        }
    }

    fn shutdown(&mut self) {
        if self.capture.is_some() {
            self.release_capture();
            log::info!(
                "VideoPlaybackProducer: closed {} ({} frames emitted)",
                self.config.path,
                self.stats.frames_emitted
            );
        }
        self.state = PlaybackState::Stopped;
    }

    fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }
}

impl Drop for VideoPlaybackProducer {
    fn drop(&mut self) {
        self.release_capture();
    }
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if is_stub_address(path) {
        return true;
    }
    !path.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_path_check() {
        assert!(is_local_file_path("/var/lib/videos/clip.mp4"));
        assert!(is_local_file_path("clip.mp4"));
        assert!(is_local_file_path("stub://clip"));
        assert!(!is_local_file_path(""));
        assert!(!is_local_file_path("  "));
        assert!(!is_local_file_path("http://example.com/clip.mp4"));
    }

    #[test]
    fn config_rejects_missing_file_and_urls() {
        assert!(PlaybackConfig::new("/nonexistent/clip.mp4").validate().is_err());
        assert!(PlaybackConfig::new("rtsp://cam/stream").validate().is_err());
        assert!(PlaybackConfig::new("").validate().is_err());

        let mut config = PlaybackConfig::new("stub://clip");
        config.fps = Some(-1.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn open_reads_metadata() -> Result<()> {
        let producer =
            VideoPlaybackProducer::new(PlaybackConfig::new("stub://clip?frames=50&fps=25"))?;
        assert_eq!(producer.state(), PlaybackState::Playing);
        assert_eq!(producer.cursor().total_frames, 50);
        assert_eq!(producer.cursor().native_fps, 25.0);
        assert_eq!(producer.target_fps(), 25.0);
        Ok(())
    }

    #[test]
    fn video_info_reports_duration_and_position() -> Result<()> {
        let mut config = PlaybackConfig::new("stub://clip?frames=50&fps=25");
        config.fps = Some(10.0);
        let mut producer = VideoPlaybackProducer::new(config)?;
        assert!(producer.seek_to_frame(25));

        let info = producer.video_info().expect("info while open");
        assert_eq!(info.total_frames, 50);
        assert_eq!(info.current_frame, 25);
        assert_eq!(info.target_fps, 10.0);
        assert_eq!(info.duration_secs, 2.0);
        assert_eq!(info.current_time_secs, 1.0);

        producer.shutdown();
        assert!(producer.video_info().is_none());
        Ok(())
    }

    #[test]
    fn seek_to_time_truncates() -> Result<()> {
        let mut producer =
            VideoPlaybackProducer::new(PlaybackConfig::new("stub://clip?frames=100&fps=10"))?;
        assert!(producer.seek_to_time(2.59));
        assert_eq!(producer.cursor().current_frame, 25);
        assert!(!producer.seek_to_time(10.0));
        assert!(!producer.seek_to_time(-1.0));
        assert_eq!(producer.cursor().current_frame, 25);
        Ok(())
    }
}
