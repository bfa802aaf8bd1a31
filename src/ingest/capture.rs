//! Capture handle abstraction.
//!
//! A `CaptureBackend` opens addresses; each open yields one `CaptureDevice`
//! (the capture handle) owned by exactly one producer. The property surface
//! mirrors what capture libraries usually expose: get/set of numeric
//! properties, a blocking read, and an explicit release.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "ipcam-gstreamer")]
use super::capture_gstreamer::GstreamerCapture;
#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegCapture;
use super::synthetic::{is_stub_address, SyntheticBackend};
use crate::frame::RawFrame;

/// Numeric properties of a capture handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureProperty {
    FrameWidth,
    FrameHeight,
    Fps,
    /// Number of frames the backend may queue ahead of the reader.
    BufferSize,
    /// Index of the next frame to be read.
    PosFrames,
    /// Total frames in the source; 0 when unknown or unbounded.
    FrameCount,
}

/// An open connection to a frame source.
pub trait CaptureDevice: Send {
    fn is_opened(&self) -> bool;

    /// Current value of `property`, or 0 when the backend does not know it.
    fn get(&self, property: CaptureProperty) -> f64;

    /// Request a property change. Best effort: returns `false` when the
    /// backend refuses, and backends may accept a value and ignore it.
    fn set(&mut self, property: CaptureProperty, value: f64) -> bool;

    /// Blocking read of the next frame.
    ///
    /// `Ok(None)` means no frame is available (end of stream, stalled stream,
    /// or released handle). `Err` is a decode or transport failure.
    fn read(&mut self) -> Result<Option<RawFrame>>;

    /// Release the underlying resources. Further reads yield `Ok(None)`.
    fn release(&mut self);
}

/// Opens capture handles by address.
pub trait CaptureBackend: Send {
    fn open(&self, address: &str) -> Result<Box<dyn CaptureDevice>>;
}

impl<B: CaptureBackend + Sync> CaptureBackend for Arc<B> {
    fn open(&self, address: &str) -> Result<Box<dyn CaptureDevice>> {
        (**self).open(address)
    }
}

/// Default backend for network sources.
///
/// `stub://` addresses go to the synthetic backend; everything else needs the
/// `ipcam-gstreamer` feature.
#[derive(Debug)]
pub struct NetworkCaptureBackend {
    read_timeout: Duration,
    synthetic: SyntheticBackend,
}

impl NetworkCaptureBackend {
    pub fn new(read_timeout: Duration) -> Self {
        Self {
            read_timeout,
            synthetic: SyntheticBackend::default(),
        }
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }
}

impl CaptureBackend for NetworkCaptureBackend {
    fn open(&self, address: &str) -> Result<Box<dyn CaptureDevice>> {
        if is_stub_address(address) {
            return self.synthetic.open(address);
        }
        #[cfg(feature = "ipcam-gstreamer")]
        {
            Ok(Box::new(GstreamerCapture::open(address, self.read_timeout)?))
        }
        #[cfg(not(feature = "ipcam-gstreamer"))]
        {
            anyhow::bail!("network capture requires the ipcam-gstreamer feature")
        }
    }
}

/// Default backend for local video files.
///
/// `stub://` paths go to the synthetic backend; everything else needs the
/// `ingest-file-ffmpeg` feature.
#[derive(Debug, Default)]
pub struct FileCaptureBackend {
    synthetic: SyntheticBackend,
}

impl CaptureBackend for FileCaptureBackend {
    fn open(&self, address: &str) -> Result<Box<dyn CaptureDevice>> {
        if is_stub_address(address) {
            return self.synthetic.open(address);
        }
        #[cfg(feature = "ingest-file-ffmpeg")]
        {
            Ok(Box::new(FfmpegCapture::open(address)?))
        }
        #[cfg(not(feature = "ingest-file-ffmpeg"))]
        {
            anyhow::bail!("file playback requires the ingest-file-ffmpeg feature")
        }
    }
}
