//! Live interaction sources
//!
//! A source hands the recorder raw [`Interaction`] notifications. The
//! recorder assigns capture timestamps itself, so sources only need to
//! preserve arrival order.

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::types::Interaction;

/// Something that produces interaction notifications
pub trait InteractionSource {
    /// Drain every notification that arrived since the last call
    fn poll_interactions(&mut self) -> Vec<Interaction>;
}

/// Source fed through a crossbeam channel, e.g. from an input thread
#[derive(Debug)]
pub struct ChannelSource {
    receiver: Receiver<Interaction>,
}

impl ChannelSource {
    /// Create a source and the sender that feeds it
    pub fn new() -> (Sender<Interaction>, Self) {
        let (sender, receiver) = unbounded();
        (sender, Self { receiver })
    }
}

impl InteractionSource for ChannelSource {
    fn poll_interactions(&mut self) -> Vec<Interaction> {
        self.receiver.try_iter().collect()
    }
}

impl InteractionSource for Vec<Interaction> {
    fn poll_interactions(&mut self) -> Vec<Interaction> {
        std::mem::take(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_source_preserves_order() {
        let (sender, mut source) = ChannelSource::new();
        sender.send(Interaction::pointer_move(1.0, 1.0)).unwrap();
        sender.send(Interaction::click(1.0, 1.0, None)).unwrap();

        let drained = source.poll_interactions();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[1], Interaction::click(1.0, 1.0, None));
        assert!(source.poll_interactions().is_empty());
    }
}
