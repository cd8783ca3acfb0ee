//! Simulated ECU node
//!
//! A [`NodeSimulator`] owns its [`NodeState`] outright and runs as one tokio
//! task. Telemetry ticks, frame reception, bus-off recovery and shutdown are
//! branches of a single `select!` loop, so the state has exactly one writer
//! and needs no lock. Observers read published [`NodeStatus`] snapshots.
//!
//! ```text
//!   tick ──▶ sample ──▶ encode ──▶ send ──▶ error counters
//!                                    │
//!                     BusOff: suppressed until recovery timer
//!
//!   receive ──▶ rx counters ──▶ DiagnosticService ──▶ response
//! ```

use std::sync::Arc;
use std::time::Duration;

use cansim_core::{
    ErrorThresholds, EventKind, EventSink, Frame, NodeEvent, NodeState, NodeStatus,
    StateTransition, TracingSink,
};
use cansim_dbc::FrameCodec;
use cansim_uds::{BusAdapter, DiagnosticService, ServiceId, TransportError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::catalog::DtcCatalog;
use crate::clock;
use crate::fault::{first_triggered, FaultPolicy, FaultRule, NoFaults};
use crate::sampler::{SampleSource, ScriptedSampler};

/// Upper bound for one receive call; other branches cancel it earlier
const RECEIVE_WAIT: Duration = Duration::from_secs(1);

/// Pause after a transport receive error before listening again
const RECEIVE_BACKOFF: Duration = Duration::from_millis(100);

/// How long [`NodeHandle::shutdown`] waits for the task to finish
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// One logical ECU attached to the bus
pub struct NodeSimulator {
    name: String,
    message_id: u32,
    period: Duration,
    codec: FrameCodec,
    service: DiagnosticService,
    adapter: Arc<dyn BusAdapter>,
    state: NodeState,
    sampler: Box<dyn SampleSource>,
    faults: Box<dyn FaultPolicy>,
    rules: Vec<FaultRule>,
    catalog: DtcCatalog,
    sink: Arc<dyn EventSink>,
    status: watch::Sender<NodeStatus>,
}

impl NodeSimulator {
    pub fn new(
        name: impl Into<String>,
        message_id: u32,
        service: DiagnosticService,
        codec: FrameCodec,
        adapter: Arc<dyn BusAdapter>,
    ) -> Self {
        let name = name.into();
        let (status, _) = watch::channel(NodeStatus::initial(&name));
        Self {
            name,
            message_id,
            period: Duration::from_millis(100),
            codec,
            service,
            adapter,
            state: NodeState::default(),
            sampler: Box::new(ScriptedSampler::default()),
            faults: Box::new(NoFaults),
            rules: Vec::new(),
            catalog: DtcCatalog::default(),
            sink: Arc::new(TracingSink),
            status,
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Replace the error-model limits (resets the counters)
    pub fn with_thresholds(mut self, thresholds: ErrorThresholds) -> Self {
        self.state = NodeState::new(thresholds);
        self
    }

    pub fn with_sampler(mut self, sampler: Box<dyn SampleSource>) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn with_fault_policy(mut self, faults: Box<dyn FaultPolicy>) -> Self {
        self.faults = faults;
        self
    }

    pub fn with_rules(mut self, rules: Vec<FaultRule>) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_catalog(mut self, catalog: DtcCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> &NodeState {
        &self.state
    }

    pub fn status(&self) -> NodeStatus {
        self.state.snapshot(&self.name)
    }

    /// Receive every published status snapshot
    pub fn subscribe(&self) -> watch::Receiver<NodeStatus> {
        self.status.subscribe()
    }

    /// One telemetry period
    ///
    /// Suppressed while bus-off. A sample that trips a fault rule makes its
    /// DTC active and counts as a transmit failure even if the frame went out.
    pub async fn tick(&mut self) {
        if !self.state.errors.can_transmit() {
            if self.state.recovery_due(clock()) {
                self.poll_recovery();
            } else {
                self.emit(EventKind::TransmitSuppressed);
                return;
            }
        }

        let sample = self.sampler.sample();
        let frame = match self.codec.encode(self.message_id, &sample) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(node = %self.name, %e, "Failed to encode telemetry");
                return;
            }
        };
        let detected = first_triggered(&self.rules, &sample).map(|rule| rule.dtc);

        let transition = if self.faults.transmit_fails() {
            self.emit(EventKind::TransmitFailed {
                reason: "injected bus error".to_string(),
            });
            self.state.errors.on_transmit_failure(clock())
        } else {
            match self.adapter.send(&frame).await {
                Ok(()) => {
                    self.state.record_sent();
                    self.emit(EventKind::FrameSent {
                        can_id: frame.id,
                        dlc: frame.dlc,
                    });
                    if detected.is_some() {
                        self.state.errors.on_transmit_failure(clock())
                    } else {
                        self.state.errors.on_transmit_success(clock())
                    }
                }
                Err(e) => {
                    self.emit(EventKind::TransmitFailed {
                        reason: e.to_string(),
                    });
                    self.state.errors.on_transmit_failure(clock())
                }
            }
        };

        if let Some(code) = detected {
            if self.state.raise_dtc(code) {
                self.emit(EventKind::DtcRaised {
                    code,
                    description: self.catalog.describe(&code),
                });
            }
        }

        self.report(transition);
        self.publish();
    }

    /// Account for a frame seen on the bus and serve it if it is a request
    pub async fn handle_frame(&mut self, frame: Frame) {
        if self.faults.receive_fails() {
            let transition = self.state.errors.on_receive_failure(clock());
            self.emit(EventKind::ReceiveFailed {
                reason: format!("corrupted frame 0x{:03X}", frame.id),
            });
            self.report(transition);
            self.publish();
            return;
        }

        self.state.record_received();
        let transition = self.state.errors.on_receive_success(clock());
        self.report(transition);

        if self.service.is_addressed_to(&frame) {
            self.serve_diagnostic(&frame).await;
        }
        self.publish();
    }

    /// Leave bus-off if the quiescent interval has elapsed
    pub fn poll_recovery(&mut self) {
        let transition = self.state.errors.poll_recovery(clock());
        if transition.is_some() {
            self.report(transition);
            self.emit(EventKind::BusOffRecovered);
            self.publish();
        }
    }

    /// Run until `shutdown` turns true or its sender is dropped
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let adapter = Arc::clone(&self.adapter);
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            node = %self.name,
            can_id = format!("0x{:03X}", self.message_id),
            request_id = format!("0x{:03X}", self.service.request_id()),
            period_ms = self.period.as_millis() as u64,
            "Node started"
        );
        self.publish();

        while !*shutdown.borrow() {
            let recovery_at = self
                .state
                .errors
                .recovery_deadline()
                .map(Instant::from_std);

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep_until(recovery_at.unwrap_or_else(Instant::now)),
                    if recovery_at.is_some() => self.poll_recovery(),
                _ = ticker.tick() => self.tick().await,
                received = adapter.receive(RECEIVE_WAIT) => self.on_receive(received).await,
            }
        }

        info!(node = %self.name, "Node stopped");
    }

    /// Run on its own task
    pub fn spawn(self) -> NodeHandle {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let status = self.subscribe();
        let name = self.name.clone();
        let task = tokio::spawn(self.run(shutdown_rx));
        NodeHandle {
            name,
            shutdown,
            status,
            task,
        }
    }

    async fn on_receive(&mut self, received: Result<Frame, TransportError>) {
        match received {
            Ok(frame) => self.handle_frame(frame).await,
            Err(TransportError::Timeout) => {}
            Err(e) => {
                let transition = self.state.errors.on_receive_failure(clock());
                self.emit(EventKind::ReceiveFailed {
                    reason: e.to_string(),
                });
                self.report(transition);
                self.publish();
                if !matches!(e, TransportError::Lagged(_)) {
                    tokio::time::sleep(RECEIVE_BACKOFF).await;
                }
            }
        }
    }

    async fn serve_diagnostic(&mut self, frame: &Frame) {
        let outcome = match self.service.handle(frame, &mut self.state) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.emit(EventKind::DiagnosticDropped {
                    service_id: frame.data().first().copied().unwrap_or_default(),
                    reason: e.to_string(),
                });
                return;
            }
        };

        if outcome.request.service_id == ServiceId::ClearDtc {
            self.emit(EventKind::DtcCleared {
                code: outcome.cleared,
            });
        }

        // Sent regardless of bus state
        let transition = match self.adapter.send(&outcome.frame).await {
            Ok(()) => {
                self.state.record_sent();
                self.emit(EventKind::DiagnosticServed {
                    service_id: outcome.request.service_id.as_byte(),
                    sub_function: outcome.request.sub_function,
                });
                self.state.errors.on_transmit_success(clock())
            }
            Err(e) => {
                debug!(node = %self.name, %e, "Diagnostic response not sent");
                self.emit(EventKind::TransmitFailed {
                    reason: e.to_string(),
                });
                self.state.errors.on_transmit_failure(clock())
            }
        };
        self.report(transition);
    }

    fn report(&self, transition: Option<StateTransition>) {
        if let Some(StateTransition { from, to }) = transition {
            self.emit(EventKind::StateChanged {
                from,
                to,
                tx_errors: self.state.errors.tx_errors(),
                rx_errors: self.state.errors.rx_errors(),
            });
        }
    }

    fn emit(&self, kind: EventKind) {
        self.sink.emit(NodeEvent::now(self.name.as_str(), kind));
    }

    fn publish(&self) {
        self.status.send_replace(self.state.snapshot(&self.name));
    }
}

/// Control handle for a spawned node
pub struct NodeHandle {
    name: String,
    shutdown: watch::Sender<bool>,
    status: watch::Receiver<NodeStatus>,
    task: JoinHandle<()>,
}

impl NodeHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Latest published snapshot
    pub fn status(&self) -> NodeStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<NodeStatus> {
        self.status.clone()
    }

    /// Ask the node to stop; further calls have no effect
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the node and wait for its task, returning the final snapshot
    pub async fn shutdown(self) -> NodeStatus {
        self.stop();
        let Self {
            name, status, task, ..
        } = self;

        let abort = task.abort_handle();
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, task).await {
            Ok(Ok(())) => debug!(node = %name, "Node task joined"),
            Ok(Err(e)) => warn!(node = %name, %e, "Node task failed"),
            Err(_) => {
                warn!(node = %name, "Node did not stop in time, aborting");
                abort.abort();
            }
        }

        let last = status.borrow().clone();
        last
    }
}
