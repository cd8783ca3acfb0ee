//! Diagnostic tester - round-robin read-then-clear of fault codes

use std::sync::Arc;
use std::time::Duration;

use cansim_core::{DtcCode, EventKind, EventSink, NodeEvent};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{DiagnosticError, DiagnosticRequest, DiagnosticResponse, DiagnosticResult};
use crate::config::TesterConfig;
use crate::transport::{BusAdapter, TransportError};

/// A node the tester polls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticTarget {
    pub name: String,
    pub request_id: u32,
    pub response_id: u32,
}

impl DiagnosticTarget {
    pub fn new(name: impl Into<String>, request_id: u32, response_id: u32) -> Self {
        Self {
            name: name.into(),
            request_id,
            response_id,
        }
    }
}

/// What one target reported during a sweep
#[derive(Debug, Clone, PartialEq)]
pub struct SweepEntry {
    pub target: String,
    /// Fault code read, or the error that prevented reading it
    pub read: DiagnosticResult<Option<DtcCode>>,
    /// Whether a ClearDTC followed and was acknowledged
    pub cleared: bool,
}

/// Polls every target with ReadDTC and clears any active fault it finds
pub struct DiagnosticTester {
    adapter: Arc<dyn BusAdapter>,
    targets: Vec<DiagnosticTarget>,
    config: TesterConfig,
    sink: Arc<dyn EventSink>,
}

impl DiagnosticTester {
    pub fn new(
        adapter: Arc<dyn BusAdapter>,
        targets: Vec<DiagnosticTarget>,
        config: TesterConfig,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            adapter,
            targets,
            config,
            sink,
        }
    }

    pub fn targets(&self) -> &[DiagnosticTarget] {
        &self.targets
    }

    /// Ask a node for its active fault code
    pub async fn read_dtc(&self, target: &DiagnosticTarget) -> DiagnosticResult<Option<DtcCode>> {
        let request = DiagnosticRequest::read_dtc(self.config.read_sub_function);
        let response = self.exchange(target, &request).await?;
        Ok(response.dtc())
    }

    /// Ask a node to clear its active fault code
    pub async fn clear_dtc(&self, target: &DiagnosticTarget) -> DiagnosticResult<()> {
        let request = DiagnosticRequest::clear_dtc(self.config.clear_sub_function);
        self.exchange(target, &request).await.map(|_| ())
    }

    /// Read one target and clear it if a fault was reported
    pub async fn check_target(&self, target: &DiagnosticTarget) -> SweepEntry {
        let read = self.read_dtc(target).await;

        let cleared = match &read {
            Ok(Some(code)) => {
                info!(
                    node = %target.name,
                    %code,
                    description = code.description(),
                    "Fault reported, clearing"
                );
                match self.clear_dtc(target).await {
                    Ok(()) => true,
                    Err(e) => {
                        self.report_error(target, &e);
                        false
                    }
                }
            }
            Ok(None) => {
                debug!(node = %target.name, "No active fault");
                false
            }
            Err(e) => {
                self.report_error(target, e);
                false
            }
        };

        SweepEntry {
            target: target.name.clone(),
            read,
            cleared,
        }
    }

    /// One immediate pass over every target, without pacing
    pub async fn sweep(&self) -> Vec<SweepEntry> {
        let mut entries = Vec::with_capacity(self.targets.len());
        for target in &self.targets {
            entries.push(self.check_target(target).await);
        }
        entries
    }

    /// Sweep until shutdown, pausing after each node and between sweeps
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(targets = self.targets.len(), "Diagnostic tester started");

        'outer: while !*shutdown.borrow() {
            for target in &self.targets {
                tokio::select! {
                    _ = shutdown.changed() => break 'outer,
                    _ = self.check_target(target) => {}
                }
                tokio::select! {
                    _ = shutdown.changed() => break 'outer,
                    _ = tokio::time::sleep(self.config.node_interval()) => {}
                }
            }
            tokio::select! {
                _ = shutdown.changed() => break 'outer,
                _ = tokio::time::sleep(self.config.sweep_interval()) => {}
            }
        }

        info!("Diagnostic tester stopped");
    }

    async fn exchange(
        &self,
        target: &DiagnosticTarget,
        request: &DiagnosticRequest,
    ) -> DiagnosticResult<DiagnosticResponse> {
        let frame = request.to_frame(target.request_id)?;
        self.discard_pending().await;
        self.adapter.send(&frame).await?;

        let deadline = Instant::now() + self.config.response_timeout();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(DiagnosticError::Timeout(target.request_id));
            }

            match self.adapter.receive(remaining).await {
                Ok(frame) if frame.id == target.response_id => {
                    match DiagnosticResponse::from_frame(&frame) {
                        Ok(response) if response.service_id == request.service_id => {
                            return Ok(response)
                        }
                        Ok(response) => debug!(
                            node = %target.name,
                            expected = %request.service_id,
                            got = %response.service_id,
                            "Ignoring response for another service"
                        ),
                        Err(e) => debug!(node = %target.name, %e, "Ignoring malformed response"),
                    }
                }
                // Telemetry and other nodes' traffic
                Ok(_) => continue,
                Err(TransportError::Timeout) => {
                    return Err(DiagnosticError::Timeout(target.request_id))
                }
                Err(TransportError::Lagged(lost)) => {
                    debug!(lost, "Tester receiver lagged");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Drop frames queued before this exchange, such as a response that
    /// arrived after an earlier exchange had already timed out
    async fn discard_pending(&self) {
        let mut discarded = 0usize;
        loop {
            match self.adapter.receive(Duration::ZERO).await {
                Ok(_) => discarded += 1,
                Err(TransportError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        if discarded > 0 {
            debug!(discarded, "Discarded stale frames before request");
        }
    }

    fn report_error(&self, target: &DiagnosticTarget, error: &DiagnosticError) {
        match error {
            DiagnosticError::Timeout(request_id) => {
                self.sink.emit(NodeEvent::now(
                    target.name.as_str(),
                    EventKind::DiagnosticTimeout {
                        request_id: *request_id,
                    },
                ));
            }
            e => warn!(node = %target.name, %e, "Diagnostic exchange failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::VirtualBus;
    use crate::uds::DiagnosticService;
    use cansim_core::{ChannelSink, Frame, NodeState, TracingSink};

    /// Minimal node that only answers diagnostics
    fn spawn_responder(
        bus: &VirtualBus,
        service: DiagnosticService,
        initial: Option<DtcCode>,
    ) -> tokio::task::JoinHandle<()> {
        let port = bus.connect("responder");
        tokio::spawn(async move {
            let mut state = NodeState::default();
            if let Some(code) = initial {
                state.raise_dtc(code);
            }
            loop {
                match port.receive(Duration::from_secs(60)).await {
                    Ok(frame) if service.is_addressed_to(&frame) => {
                        if let Ok(outcome) = service.handle(&frame, &mut state) {
                            let _ = port.send(&outcome.frame).await;
                        }
                    }
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        })
    }

    fn make_tester(
        bus: &VirtualBus,
        targets: Vec<DiagnosticTarget>,
        sink: Arc<dyn EventSink>,
    ) -> DiagnosticTester {
        DiagnosticTester::new(
            Arc::new(bus.connect("tester")),
            targets,
            TesterConfig::default(),
            sink,
        )
    }

    #[tokio::test]
    async fn test_sweep_reads_then_clears() {
        let bus = VirtualBus::default();
        let code: DtcCode = "P0217".parse().unwrap();
        let tester = make_tester(
            &bus,
            vec![DiagnosticTarget::new("engine", 0x7E0, 0x7E8)],
            Arc::new(TracingSink),
        );
        let responder = spawn_responder(&bus, DiagnosticService::new(0x7E0, 0x7E8), Some(code));

        let first = tester.sweep().await;
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].read, Ok(Some(code)));
        assert!(first[0].cleared);

        let second = tester.sweep().await;
        assert_eq!(second[0].read, Ok(None));
        assert!(!second[0].cleared);

        responder.abort();
    }

    #[tokio::test]
    async fn test_ignores_unrelated_traffic() {
        let bus = VirtualBus::default();
        let noise = bus.connect("noise");
        let tester = make_tester(
            &bus,
            vec![DiagnosticTarget::new("abs", 0x7E2, 0x7EA)],
            Arc::new(TracingSink),
        );
        let responder = spawn_responder(&bus, DiagnosticService::new(0x7E2, 0x7EA), None);

        // Telemetry from another node lands in the tester's queue first
        noise.send(&Frame::new(0x200, &[1, 2, 3]).unwrap()).await.unwrap();

        let target = &tester.targets()[0];
        assert_eq!(tester.read_dtc(target).await, Ok(None));
        responder.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_response_not_taken_for_next_read() {
        let bus = VirtualBus::default();
        let late = bus.connect("late");
        let tester = make_tester(
            &bus,
            vec![DiagnosticTarget::new("engine", 0x7E0, 0x7E8)],
            Arc::new(TracingSink),
        );
        let target = tester.targets()[0].clone();

        // Nobody answers in time
        assert_eq!(
            tester.read_dtc(&target).await,
            Err(DiagnosticError::Timeout(0x7E0))
        );

        // The answer to that request shows up afterwards
        let stale = DiagnosticResponse::read_dtc(0x02, Some(DtcCode::powertrain(0x0217)));
        late.send(&stale.to_frame(0x7E8).unwrap()).await.unwrap();

        let responder = spawn_responder(&bus, DiagnosticService::new(0x7E0, 0x7E8), None);
        assert_eq!(tester.read_dtc(&target).await, Ok(None));
        responder.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_emits_event() {
        let bus = VirtualBus::default();
        let (sink, mut events) = ChannelSink::channel();
        let tester = make_tester(
            &bus,
            vec![DiagnosticTarget::new("transmission", 0x7E1, 0x7E9)],
            Arc::new(sink),
        );

        let entries = tester.sweep().await;
        assert_eq!(entries[0].read, Err(DiagnosticError::Timeout(0x7E1)));
        assert!(!entries[0].cleared);

        let event = events.try_recv().unwrap();
        assert_eq!(event.node_id, "transmission");
        assert_eq!(event.event, EventKind::DiagnosticTimeout { request_id: 0x7E1 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let bus = VirtualBus::default();
        let tester = make_tester(
            &bus,
            vec![DiagnosticTarget::new("engine", 0x7E0, 0x7E8)],
            Arc::new(TracingSink),
        );
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(tester.run(rx));

        tokio::time::sleep(Duration::from_secs(5)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
