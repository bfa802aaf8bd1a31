//! Host pipeline contract.
//!
//! The host runtime owns scheduling and routing. A producer only implements
//! [`ProducingModule`]: the host calls `setup` once, `process_update` once per
//! cycle, and `shutdown` when the pipeline stops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use crate::frame::ImagePayload;

/// A component that produces incremental units on demand.
pub trait ProducingModule {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Prepare the source before the first cycle.
    fn setup(&mut self) -> anyhow::Result<()>;

    /// Produce the next update, or `None` if nothing is ready this cycle.
    ///
    /// Recoverable source failures are logged and reported as `None`.
    fn process_update(&mut self) -> Option<UpdateMessage>;

    /// Release the capture handle. Safe to call any number of times.
    fn shutdown(&mut self);

    /// Handle that asks the producer to stop from another thread.
    fn stop_handle(&self) -> StopHandle;
}

/// Cross-thread stop request.
///
/// Setting the flag does not touch the capture handle. The owning producer
/// observes it at its next cycle (or between retry attempts) and performs the
/// release itself.
#[derive(Clone, Debug, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Kind of change an update message applies to the IU network.
///
/// The producers in this crate only ever emit [`UpdateType::Add`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateType {
    Add,
    Revoke,
    Commit,
}

/// Incremental unit carrying one image.
#[derive(Clone, Debug)]
pub struct ImageIu {
    pub iu_id: u64,
    pub creator: &'static str,
    pub previous_iu: Option<u64>,
    pub created_at: SystemTime,
    pub image: ImagePayload,
    /// Number of frames the image stands for.
    pub nframes: u32,
    /// Output rate annotation in frames per second.
    pub rate: f64,
    /// Position of the frame in its source.
    pub frame_index: u64,
}

/// Batch of IU updates handed to the host.
#[derive(Clone, Debug)]
pub struct UpdateMessage {
    updates: Vec<(ImageIu, UpdateType)>,
}

impl UpdateMessage {
    pub fn from_iu(iu: ImageIu, update_type: UpdateType) -> Self {
        Self {
            updates: vec![(iu, update_type)],
        }
    }

    pub fn updates(&self) -> &[(ImageIu, UpdateType)] {
        &self.updates
    }

    pub fn into_updates(self) -> Vec<(ImageIu, UpdateType)> {
        self.updates
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// First IU in the message, if any.
    pub fn first_iu(&self) -> Option<&ImageIu> {
        self.updates.first().map(|(iu, _)| iu)
    }
}

/// Assigns ids and links each new IU to the previous one from the same
/// producer.
#[derive(Clone, Debug)]
pub struct IuFactory {
    creator: &'static str,
    next_id: u64,
    previous: Option<u64>,
}

impl IuFactory {
    pub fn new(creator: &'static str) -> Self {
        Self {
            creator,
            next_id: 0,
            previous: None,
        }
    }

    pub fn create(
        &mut self,
        image: ImagePayload,
        nframes: u32,
        rate: f64,
        frame_index: u64,
    ) -> ImageIu {
        let iu_id = self.next_id;
        self.next_id += 1;
        let iu = ImageIu {
            iu_id,
            creator: self.creator,
            previous_iu: self.previous,
            created_at: SystemTime::now(),
            image,
            nframes,
            rate,
            frame_index,
        };
        self.previous = Some(iu_id);
        iu
    }

    /// Number of IUs created so far.
    pub fn created(&self) -> u64 {
        self.next_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{PixelOrder, RawFrame};

    fn payload() -> ImagePayload {
        ImagePayload::Rgb(RawFrame::new(vec![0u8; 12], 2, 2, PixelOrder::Rgb))
    }

    #[test]
    fn iu_factory_chains_previous_ids() {
        let mut factory = IuFactory::new("test");
        let first = factory.create(payload(), 1, 30.0, 0);
        let second = factory.create(payload(), 1, 30.0, 1);

        assert_eq!(first.iu_id, 0);
        assert_eq!(first.previous_iu, None);
        assert_eq!(second.iu_id, 1);
        assert_eq!(second.previous_iu, Some(0));
        assert_eq!(second.creator, "test");
        assert_eq!(factory.created(), 2);
    }

    #[test]
    fn update_message_wraps_single_add() {
        let mut factory = IuFactory::new("test");
        let msg = UpdateMessage::from_iu(factory.create(payload(), 1, 15.0, 7), UpdateType::Add);

        assert_eq!(msg.len(), 1);
        let (iu, kind) = &msg.updates()[0];
        assert_eq!(*kind, UpdateType::Add);
        assert_eq!(iu.frame_index, 7);
        assert_eq!(iu.rate, 15.0);
    }

    #[test]
    fn stop_handle_is_shared_between_clones() {
        let handle = StopHandle::new();
        let remote = handle.clone();
        assert!(!handle.is_stopped());

        std::thread::spawn(move || remote.stop())
            .join()
            .expect("stop thread");
        assert!(handle.is_stopped());

        handle.reset();
        assert!(!handle.is_stopped());
    }
}
