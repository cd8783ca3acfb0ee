//! Bus adapter trait

use std::time::Duration;

use async_trait::async_trait;
use cansim_core::Frame;

use super::TransportError;

/// Transport-agnostic handle onto a broadcast CAN bus
///
/// Each node owns its own adapter. Frames sent through one adapter are
/// eventually observed by every other adapter on the same bus, with no
/// ordering guarantee across senders. An adapter never receives its own
/// frames.
#[async_trait]
pub trait BusAdapter: Send + Sync {
    /// Put a frame on the bus
    async fn send(&self, frame: &Frame) -> Result<(), TransportError>;

    /// Wait for the next frame from another participant
    ///
    /// Returns `TransportError::Timeout` if nothing arrives in time.
    async fn receive(&self, timeout: Duration) -> Result<Frame, TransportError>;

    /// Human-readable name of the attachment point (for logs)
    fn name(&self) -> &str;
}
