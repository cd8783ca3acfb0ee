//! In-process broadcast bus
//!
//! Every port shares one tokio broadcast channel. A port drops the frames it
//! sent itself, so each participant sees exactly the traffic of the others.
//! A slow receiver that falls more than `capacity` frames behind loses the
//! oldest frames and gets `TransportError::Lagged` once.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cansim_core::Frame;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Mutex;

use super::{BusAdapter, TransportError};
use crate::config::VirtualBusConfig;

#[derive(Debug, Clone)]
struct BusMessage {
    sender: u64,
    frame: Frame,
}

/// Shared in-memory bus; hand out one port per participant
#[derive(Debug, Clone)]
pub struct VirtualBus {
    tx: broadcast::Sender<BusMessage>,
    next_port: Arc<AtomicU64>,
}

impl Default for VirtualBus {
    fn default() -> Self {
        Self::new(&VirtualBusConfig::default())
    }
}

impl VirtualBus {
    pub fn new(config: &VirtualBusConfig) -> Self {
        let (tx, _) = broadcast::channel(config.capacity.max(1));
        Self {
            tx,
            next_port: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Attach a new participant
    ///
    /// The port only sees frames sent after it was created.
    pub fn connect(&self, name: impl Into<String>) -> VirtualBusPort {
        VirtualBusPort {
            name: name.into(),
            port_id: self.next_port.fetch_add(1, Ordering::Relaxed),
            tx: self.tx.clone(),
            rx: Mutex::new(self.tx.subscribe()),
            connected: AtomicBool::new(true),
        }
    }

    /// Number of attached ports
    pub fn port_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// One participant's attachment to a [`VirtualBus`]
pub struct VirtualBusPort {
    name: String,
    port_id: u64,
    tx: broadcast::Sender<BusMessage>,
    rx: Mutex<broadcast::Receiver<BusMessage>>,
    connected: AtomicBool,
}

impl VirtualBusPort {
    /// Simulate a transmitter fault
    ///
    /// While disconnected every send fails with `ConnectionClosed`; frames
    /// from other ports still arrive.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BusAdapter for VirtualBusPort {
    async fn send(&self, frame: &Frame) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::ConnectionClosed);
        }

        let msg = BusMessage {
            sender: self.port_id,
            frame: *frame,
        };
        // Our own receiver keeps the channel open, so this only fails if
        // the port was torn down underneath us
        self.tx
            .send(msg)
            .map(|_| ())
            .map_err(|_| TransportError::SendFailed("no receivers on bus".to_string()))
    }

    async fn receive(&self, timeout: Duration) -> Result<Frame, TransportError> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut rx = self.rx.lock().await;

        loop {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Ok(msg)) if msg.sender == self.port_id => continue,
                Ok(Ok(msg)) => return Ok(msg.frame),
                Ok(Err(RecvError::Lagged(lost))) => return Err(TransportError::Lagged(lost)),
                Ok(Err(RecvError::Closed)) => return Err(TransportError::ConnectionClosed),
                Err(_) => return Err(TransportError::Timeout),
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
