//! Raw CAN adapter over a SocketCAN interface

use std::time::Duration;

use async_trait::async_trait;
use cansim_core::Frame;
use parking_lot::Mutex;
use socketcan::{
    CanFrame, CanSocket, EmbeddedFrame, ExtendedId, Frame as _, Id, Socket, StandardId,
};
use tracing::debug;

use super::{BusAdapter, TransportError};

const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Raw CAN socket shared by one participant
///
/// The socket is non-blocking; receive polls it until the deadline so the
/// lock is never held across an await point.
pub struct SocketCanAdapter {
    name: String,
    interface: String,
    socket: Mutex<CanSocket>,
}

impl SocketCanAdapter {
    pub fn open(interface: &str, name: impl Into<String>) -> Result<Self, TransportError> {
        let socket = CanSocket::open(interface).map_err(|e| {
            TransportError::ConnectionFailed(format!("Failed to open {}: {}", interface, e))
        })?;
        socket.set_nonblocking(true).map_err(|e| {
            TransportError::ConnectionFailed(format!("Failed to set non-blocking: {}", e))
        })?;

        Ok(Self {
            name: name.into(),
            interface: interface.to_string(),
            socket: Mutex::new(socket),
        })
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    fn to_can_frame(frame: &Frame) -> Result<CanFrame, TransportError> {
        let id: Id = if frame.extended {
            ExtendedId::new(frame.id)
                .ok_or_else(|| TransportError::SendFailed(format!("bad id 0x{:X}", frame.id)))?
                .into()
        } else {
            StandardId::new(frame.id as u16)
                .ok_or_else(|| TransportError::SendFailed(format!("bad id 0x{:X}", frame.id)))?
                .into()
        };
        CanFrame::new(id, frame.data())
            .ok_or_else(|| TransportError::SendFailed("frame construction failed".to_string()))
    }

    fn from_can_frame(frame: &CanFrame) -> Result<Option<Frame>, TransportError> {
        if frame.is_error_frame() {
            return Err(TransportError::ReceiveFailed(format!(
                "error frame 0x{:X}",
                frame.raw_id()
            )));
        }
        if frame.is_remote_frame() {
            return Ok(None);
        }

        let mut out = Frame::new(frame.raw_id(), frame.data())
            .map_err(|e| TransportError::ReceiveFailed(e.to_string()))?;
        if frame.is_extended() {
            out = out.into_extended();
        }
        Ok(Some(out))
    }
}

#[async_trait]
impl BusAdapter for SocketCanAdapter {
    async fn send(&self, frame: &Frame) -> Result<(), TransportError> {
        let can_frame = Self::to_can_frame(frame)?;
        self.socket
            .lock()
            .write_frame(&can_frame)
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn receive(&self, timeout: Duration) -> Result<Frame, TransportError> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let read = self.socket.lock().read_frame();
            match read {
                Ok(can_frame) => match Self::from_can_frame(&can_frame)? {
                    Some(frame) => return Ok(frame),
                    None => debug!(interface = %self.interface, "Ignoring remote frame"),
                },
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if tokio::time::Instant::now() >= deadline {
                        return Err(TransportError::Timeout);
                    }
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                Err(e) => return Err(TransportError::ReceiveFailed(e.to_string())),
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
