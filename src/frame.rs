//! Decoded frames and the frame emitter.
//!
//! - `RawFrame`: tightly packed 3-channel pixels as handed over by a capture
//!   backend, in the backend's channel order.
//! - `ImagePayload`: what an IU carries downstream, always RGB.
//! - `FrameEmitter`: turns a `RawFrame` into an add update for the host.

use image::RgbImage;

use crate::module::{IuFactory, UpdateMessage, UpdateType};

/// Channel order of a packed 3-channel frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelOrder {
    Bgr,
    Rgb,
}

/// A single decoded frame.
#[derive(Clone, Debug)]
pub struct RawFrame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub order: PixelOrder,
}

impl RawFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, order: PixelOrder) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * 3,
            "data length must equal width * height * 3"
        );
        Self {
            data,
            width,
            height,
            order,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Convert to RGB channel order in place.
    pub fn into_rgb(mut self) -> Self {
        if self.order == PixelOrder::Bgr {
            swap_red_blue(&mut self.data);
            self.order = PixelOrder::Rgb;
        }
        self
    }
}

fn swap_red_blue(data: &mut [u8]) {
    for pixel in data.chunks_exact_mut(3) {
        pixel.swap(0, 2);
    }
}

/// Image carried by an IU.
#[derive(Clone, Debug)]
pub enum ImagePayload {
    /// Wrapped as an `image` buffer.
    Image(RgbImage),
    /// Packed RGB pixels.
    Rgb(RawFrame),
}

impl ImagePayload {
    pub fn width(&self) -> u32 {
        match self {
            ImagePayload::Image(image) => image.width(),
            ImagePayload::Rgb(frame) => frame.width,
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            ImagePayload::Image(image) => image.height(),
            ImagePayload::Rgb(frame) => frame.height,
        }
    }

    /// Packed RGB bytes, row-major.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            ImagePayload::Image(image) => image.as_raw(),
            ImagePayload::Rgb(frame) => frame.data(),
        }
    }

    /// Copy into an `image` buffer (e.g. for saving to disk).
    pub fn to_rgb_image(&self) -> Option<RgbImage> {
        match self {
            ImagePayload::Image(image) => Some(image.clone()),
            ImagePayload::Rgb(frame) => {
                RgbImage::from_raw(frame.width, frame.height, frame.data().to_vec())
            }
        }
    }
}

/// Wraps decoded frames into IUs.
#[derive(Clone, Debug)]
pub struct FrameEmitter {
    rate: f64,
    wrap_image: bool,
}

impl FrameEmitter {
    pub fn new(rate: f64, wrap_image: bool) -> Self {
        Self { rate, wrap_image }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Convert `frame` to RGB and optionally wrap it as an image.
    pub fn payload(&self, frame: RawFrame) -> ImagePayload {
        let mut frame = frame.into_rgb();
        if !self.wrap_image {
            return ImagePayload::Rgb(frame);
        }
        match take_rgb_image(&mut frame) {
            Some(image) => ImagePayload::Image(image),
            None => {
                log::debug!(
                    "frame buffer is {} bytes for {}x{}; emitting unwrapped",
                    frame.data().len(),
                    frame.width,
                    frame.height
                );
                ImagePayload::Rgb(frame)
            }
        }
    }

    /// Build the add update for one frame.
    pub fn emit(&self, ius: &mut IuFactory, frame: RawFrame, frame_index: u64) -> UpdateMessage {
        let iu = ius.create(self.payload(frame), 1, self.rate, frame_index);
        UpdateMessage::from_iu(iu, UpdateType::Add)
    }
}

/// Move the pixels of an exactly sized RGB frame into an image buffer.
///
/// Leaves `frame` untouched when its buffer does not match its dimensions.
fn take_rgb_image(frame: &mut RawFrame) -> Option<RgbImage> {
    let expected = (frame.width as usize) * (frame.height as usize) * 3;
    if frame.data.len() != expected {
        return None;
    }
    RgbImage::from_raw(frame.width, frame.height, std::mem::take(&mut frame.data))
}
