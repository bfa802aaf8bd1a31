//! Local video file capture handle using FFmpeg.
//!
//! Frames are decoded in-memory and converted to packed BGR24. Frame count
//! and rate come from stream metadata; seeking is by timestamp followed by
//! decoding forward to the requested frame.

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;

use super::capture::{CaptureDevice, CaptureProperty};
use crate::frame::{PixelOrder, RawFrame};

pub(crate) struct FfmpegCapture {
    path: String,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    time_base: f64,
    start_pts: i64,
    decoder: ffmpeg::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    fps: f64,
    frame_count: u64,
    position: u64,
    skip_until_pts: Option<i64>,
    flushing: bool,
    opened: bool,
}

// Safety: FfmpegCapture is owned by a single producer and only used from one
// thread at a time. The raw pointers inside ffmpeg types are not shared.
unsafe impl Send for FfmpegCapture {}

impl FfmpegCapture {
    pub(crate) fn open(path: &str) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(path)
            .with_context(|| format!("failed to open video file '{}' with ffmpeg", path))?;
        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow!("{} has no video track", path))?;
        let stream_index = stream.index();
        let time_base = f64::from(stream.time_base());
        let start_pts = match stream.start_time() {
            ffmpeg::ffi::AV_NOPTS_VALUE => 0,
            start => start,
        };

        let mut fps = f64::from(stream.avg_frame_rate());
        if !fps.is_finite() || fps <= 0.0 {
            fps = f64::from(stream.rate());
        }
        if !fps.is_finite() || fps <= 0.0 {
            fps = 0.0;
        }

        let frame_count = if stream.frames() > 0 {
            stream.frames() as u64
        } else if stream.duration() > 0 && fps > 0.0 {
            (stream.duration() as f64 * time_base * fps).round() as u64
        } else if input.duration() > 0 && fps > 0.0 {
            let seconds = input.duration() as f64 / f64::from(ffmpeg::ffi::AV_TIME_BASE);
            (seconds * fps).round() as u64
        } else {
            0
        };

        let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;
        let scaler = ffmpeg::software::scaling::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::format::Pixel::BGR24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        log::debug!(
            "FfmpegCapture: {} is {}x{}, {} frames at {:.3} fps",
            path,
            decoder.width(),
            decoder.height(),
            frame_count,
            fps
        );

        Ok(Self {
            path: path.to_string(),
            input,
            stream_index,
            time_base,
            start_pts,
            decoder,
            scaler,
            fps,
            frame_count,
            position: 0,
            skip_until_pts: None,
            flushing: false,
            opened: true,
        })
    }

    fn receive(&mut self) -> Result<Option<RawFrame>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        while self.decoder.receive_frame(&mut decoded).is_ok() {
            if let Some(target) = self.skip_until_pts {
                let pts = decoded.timestamp().or(decoded.pts());
                if pts.is_some_and(|pts| pts < target) {
                    continue;
                }
                self.skip_until_pts = None;
            }
            let mut bgr = ffmpeg::frame::Video::empty();
            self.scaler
                .run(&decoded, &mut bgr)
                .context("convert frame to BGR")?;
            return frame_to_raw(&bgr).map(Some);
        }
        Ok(None)
    }

    fn seek(&mut self, frame: u64) -> Result<()> {
        let seconds = frame as f64 / self.fps;
        let timestamp = (seconds * f64::from(ffmpeg::ffi::AV_TIME_BASE)) as i64;
        self.input
            .seek(timestamp, ..timestamp)
            .with_context(|| format!("seek {} to frame {}", self.path, frame))?;
        self.decoder.flush();
        self.flushing = false;
        self.skip_until_pts = Some(self.start_pts + (seconds / self.time_base).round() as i64);
        self.position = frame;
        Ok(())
    }
}

impl CaptureDevice for FfmpegCapture {
    fn is_opened(&self) -> bool {
        self.opened
    }

    fn get(&self, property: CaptureProperty) -> f64 {
        match property {
            CaptureProperty::FrameWidth => self.decoder.width() as f64,
            CaptureProperty::FrameHeight => self.decoder.height() as f64,
            CaptureProperty::Fps => self.fps,
            CaptureProperty::BufferSize => 0.0,
            CaptureProperty::PosFrames => self.position as f64,
            CaptureProperty::FrameCount => self.frame_count as f64,
        }
    }

    fn set(&mut self, property: CaptureProperty, value: f64) -> bool {
        match property {
            CaptureProperty::PosFrames if self.opened && self.fps > 0.0 && value >= 0.0 => {
                match self.seek(value as u64) {
                    Ok(()) => true,
                    Err(err) => {
                        log::warn!("FfmpegCapture: {:#}", err);
                        false
                    }
                }
            }
            _ => false,
        }
    }

    fn read(&mut self) -> Result<Option<RawFrame>> {
        if !self.opened {
            return Ok(None);
        }
        loop {
            if let Some(frame) = self.receive()? {
                self.position += 1;
                return Ok(Some(frame));
            }
            if self.flushing {
                return Ok(None);
            }

            let stream_index = self.stream_index;
            let packet = self
                .input
                .packets()
                .find(|(stream, _)| stream.index() == stream_index)
                .map(|(_, packet)| packet);
            match packet {
                Some(packet) => {
                    if let Err(err) = self.decoder.send_packet(&packet) {
                        log::debug!("FfmpegCapture: skipping packet in {}: {}", self.path, err);
                    }
                }
                None => {
                    self.decoder.send_eof().context("flush ffmpeg decoder")?;
                    self.flushing = true;
                }
            }
        }
    }

    fn release(&mut self) {
        self.opened = false;
    }
}

fn frame_to_raw(frame: &ffmpeg::frame::Video) -> Result<RawFrame> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        let len = row_bytes * height as usize;
        let pixels = data
            .get(..len)
            .context("ffmpeg frame is shorter than its dimensions")?;
        return Ok(RawFrame::new(pixels.to_vec(), width, height, PixelOrder::Bgr));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }

    Ok(RawFrame::new(pixels, width, height, PixelOrder::Bgr))
}
