//! Frame ingestion producers.
//!
//! This module provides the two producers and the capture layer beneath them:
//! - IP camera streams (HTTP/MJPEG, RTSP; feature: ipcam-gstreamer)
//! - Local video files played back as a live feed (feature: ingest-file-ffmpeg)
//! - Synthetic `stub://` sources (always available, for tests and dry runs)
//!
//! Producers own exactly one capture handle at a time and release it on
//! shutdown, on a dropped stream, or before reconnecting.
//!
//! The ingestion layer MUST NOT:
//! - Store frames to disk
//! - Retain frames beyond handoff to the host
//! - Log credentials or frame content

pub mod capture;
#[cfg(feature = "ipcam-gstreamer")]
mod capture_gstreamer;
pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
mod file_ffmpeg;
pub mod ip_camera;
pub mod synthetic;

pub use capture::{
    CaptureBackend, CaptureDevice, CaptureProperty, FileCaptureBackend, NetworkCaptureBackend,
};
pub use file::{
    PlaybackConfig, PlaybackCursor, PlaybackState, PlaybackStats, VideoInfo,
    VideoPlaybackProducer,
};
pub use ip_camera::{
    ConnectionState, IpCameraConfig, IpCameraProducer, IpCameraStats, NegotiatedFormat,
};
pub use synthetic::{SyntheticBackend, SyntheticCapture, SyntheticSpec};
