//! Channel type definitions for inter-task communication

use tokio::sync::mpsc;

use super::types::OutboundMessage;

/// Default subscriber queue depth
pub const DEFAULT_CHANNEL_SIZE: usize = 1000;

/// Create a new outbound message channel with the default buffer size
pub fn create_outbound_channel() -> (
    mpsc::Sender<OutboundMessage>,
    mpsc::Receiver<OutboundMessage>,
) {
    mpsc::channel(DEFAULT_CHANNEL_SIZE)
}

/// Create a new outbound message channel with a custom buffer size
pub fn create_outbound_channel_with_size(
    size: usize,
) -> (
    mpsc::Sender<OutboundMessage>,
    mpsc::Receiver<OutboundMessage>,
) {
    mpsc::channel(size)
}
