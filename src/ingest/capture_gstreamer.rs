//! Network capture handle using GStreamer.
//!
//! `uridecodebin` handles HTTP/MJPEG, RTSP and anything else GStreamer has a
//! source for. Frames leave the pipeline as packed BGR through an appsink
//! that keeps only the newest buffer.

use anyhow::{anyhow, bail, Context, Result};
use gstreamer::prelude::*;
use std::time::Duration;

use super::capture::{CaptureDevice, CaptureProperty};
use crate::frame::{PixelOrder, RawFrame};

pub(crate) struct GstreamerCapture {
    pipeline: gstreamer::Pipeline,
    appsink: gstreamer_app::AppSink,
    capsfilter: gstreamer::Element,
    read_timeout: Duration,
    requested_width: Option<u32>,
    requested_height: Option<u32>,
    requested_fps: Option<f64>,
    width: u32,
    height: u32,
    fps: f64,
    frames_read: u64,
    started: bool,
    eos: bool,
    opened: bool,
}

impl GstreamerCapture {
    /// Build the pipeline for `uri`. Streaming starts on the first read so
    /// that format hints are in place before caps are negotiated.
    pub(crate) fn open(uri: &str, read_timeout: Duration) -> Result<Self> {
        gstreamer::init().context("initialize gstreamer")?;
        if uri.contains('"') {
            bail!("stream uri must not contain quotes");
        }

        let pipeline_description = format!(
            "uridecodebin uri=\"{}\" ! videoconvert ! videoscale ! videorate ! \
             capsfilter name=caps caps=video/x-raw,format=BGR ! \
             appsink name=appsink sync=false max-buffers=1 drop=true",
            uri
        );
        let pipeline = gstreamer::parse::launch(&pipeline_description)
            .context("build stream pipeline")?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| anyhow!("stream pipeline is not a Pipeline"))?;

        let appsink = pipeline
            .by_name("appsink")
            .context("appsink element missing from pipeline")?
            .downcast::<gstreamer_app::AppSink>()
            .map_err(|_| anyhow!("appsink element has unexpected type"))?;
        let capsfilter = pipeline
            .by_name("caps")
            .context("capsfilter element missing from pipeline")?;

        Ok(Self {
            pipeline,
            appsink,
            capsfilter,
            read_timeout,
            requested_width: None,
            requested_height: None,
            requested_fps: None,
            width: 0,
            height: 0,
            fps: 0.0,
            frames_read: 0,
            started: false,
            eos: false,
            opened: true,
        })
    }

    fn update_caps(&self) {
        let mut caps = gstreamer::Caps::builder("video/x-raw").field("format", "BGR");
        if let Some(width) = self.requested_width {
            caps = caps.field("width", width as i32);
        }
        if let Some(height) = self.requested_height {
            caps = caps.field("height", height as i32);
        }
        if let Some(fps) = self.requested_fps {
            let rate = gstreamer::Fraction::approximate_f64(fps)
                .unwrap_or_else(|| gstreamer::Fraction::new(fps.round() as i32, 1));
            caps = caps.field("framerate", rate);
        }
        self.capsfilter.set_property("caps", caps.build());
    }

    fn start(&mut self) -> Result<()> {
        self.pipeline
            .set_state(gstreamer::State::Playing)
            .context("set stream pipeline to Playing")?;
        self.started = true;
        Ok(())
    }

    fn poll_bus(&mut self) -> Result<()> {
        let Some(bus) = self.pipeline.bus() else {
            return Ok(());
        };
        while let Some(message) = bus.timed_pop(gstreamer::ClockTime::ZERO) {
            use gstreamer::MessageView;
            match message.view() {
                MessageView::Error(err) => {
                    bail!(
                        "gstreamer error from {:?}: {}",
                        err.src().map(|s| s.path_string()),
                        err.error()
                    );
                }
                MessageView::Eos(..) => self.eos = true,
                _ => {}
            }
        }
        Ok(())
    }
}

impl CaptureDevice for GstreamerCapture {
    fn is_opened(&self) -> bool {
        self.opened
    }

    fn get(&self, property: CaptureProperty) -> f64 {
        match property {
            CaptureProperty::FrameWidth => self.width as f64,
            CaptureProperty::FrameHeight => self.height as f64,
            CaptureProperty::Fps => {
                if self.fps > 0.0 {
                    self.fps
                } else {
                    self.requested_fps.unwrap_or(0.0)
                }
            }
            CaptureProperty::BufferSize => self.appsink.property::<u32>("max-buffers") as f64,
            CaptureProperty::PosFrames => self.frames_read as f64,
            CaptureProperty::FrameCount => 0.0,
        }
    }

    fn set(&mut self, property: CaptureProperty, value: f64) -> bool {
        if !self.opened || !value.is_finite() || value <= 0.0 {
            return false;
        }
        match property {
            CaptureProperty::FrameWidth => self.requested_width = Some(value as u32),
            CaptureProperty::FrameHeight => self.requested_height = Some(value as u32),
            CaptureProperty::Fps => self.requested_fps = Some(value),
            CaptureProperty::BufferSize => {
                self.appsink.set_property("max-buffers", value as u32);
                return true;
            }
            CaptureProperty::PosFrames | CaptureProperty::FrameCount => return false,
        }
        self.update_caps();
        true
    }

    fn read(&mut self) -> Result<Option<RawFrame>> {
        if !self.opened || self.eos {
            return Ok(None);
        }
        if !self.started {
            self.start()?;
        }
        self.poll_bus()?;

        let timeout = gstreamer::ClockTime::from_mseconds(self.read_timeout.as_millis() as u64);
        let Some(sample) = self.appsink.try_pull_sample(timeout) else {
            self.poll_bus()?;
            return Ok(None);
        };

        let (frame, fps) = sample_to_frame(&sample)?;
        self.width = frame.width;
        self.height = frame.height;
        if fps > 0.0 {
            self.fps = fps;
        }
        self.frames_read += 1;
        Ok(Some(frame))
    }

    fn release(&mut self) {
        if self.opened {
            let _ = self.pipeline.set_state(gstreamer::State::Null);
            self.opened = false;
        }
    }
}

impl Drop for GstreamerCapture {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gstreamer::State::Null);
    }
}

fn sample_to_frame(sample: &gstreamer::Sample) -> Result<(RawFrame, f64)> {
    let buffer = sample.buffer().context("stream sample missing buffer")?;
    let caps = sample.caps().context("stream sample missing caps")?;
    let info =
        gstreamer_video::VideoInfo::from_caps(caps).context("parse stream caps as video info")?;

    let width = info.width();
    let height = info.height();
    let fps = {
        let rate = info.fps();
        if rate.denom() > 0 {
            rate.numer() as f64 / rate.denom() as f64
        } else {
            0.0
        }
    };
    let row_bytes = (width as usize) * 3;
    let stride = info.stride()[0] as usize;

    let map = buffer.map_readable().context("map stream buffer")?;
    let data = map.as_slice();

    if stride == row_bytes {
        let len = row_bytes * height as usize;
        let pixels = data
            .get(..len)
            .context("stream buffer is shorter than its caps")?;
        return Ok((RawFrame::new(pixels.to_vec(), width, height, PixelOrder::Bgr), fps));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("stream buffer row is out of bounds")?,
        );
    }

    Ok((RawFrame::new(pixels, width, height, PixelOrder::Bgr), fps))
}
