//! Video producers for incremental dialogue pipelines.
//!
//! This crate implements two producing modules for a host pipeline that pulls
//! one update per cycle:
//!
//! - [`IpCameraProducer`]: frames from a network camera stream, with bounded
//!   connection retries and reconnect on a dropped stream.
//! - [`VideoPlaybackProducer`]: frames from a local video file, paced to a
//!   target rate, with looping and seeking.
//!
//! Each decoded frame becomes one image IU carried in an add update.
//!
//! # Module Structure
//!
//! - `module`: Host contract (ProducingModule, ImageIu, UpdateMessage, StopHandle)
//! - `frame`: Decoded frames and the frame emitter
//! - `pacing`: Clock abstraction and frame-rate pacing
//! - `ingest`: Capture backends and the two producers
//! - `config`: File and environment configuration

pub mod config;
pub mod frame;
pub mod ingest;
pub mod module;
pub mod pacing;

pub use config::ProducerConfig;
pub use frame::{FrameEmitter, ImagePayload, PixelOrder, RawFrame};
pub use ingest::{
    CaptureBackend, CaptureDevice, CaptureProperty, ConnectionState, IpCameraConfig,
    IpCameraProducer, NegotiatedFormat, PlaybackConfig, PlaybackState, VideoPlaybackProducer,
};
pub use module::{ImageIu, IuFactory, ProducingModule, StopHandle, UpdateMessage, UpdateType};
pub use pacing::{Clock, ManualClock, Pacer, SystemClock};
