//! Read-only bus observer
//!
//! The monitor decodes every frame it sees, tracks the fault codes the
//! tester's exchanges reveal, and reports bus load. It never transmits.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use cansim_core::{BusLoadMeter, DtcCode, EventKind, EventSink, Frame, NodeEvent, TracingSink};
use cansim_dbc::FrameCodec;
use cansim_uds::{BusAdapter, DiagnosticResponse, DiagnosticTarget, ServiceId, TransportError};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use crate::clock;

/// Node id used for events that belong to the bus rather than a node
pub const MONITOR_ID: &str = "monitor";

const RECEIVE_WAIT: Duration = Duration::from_secs(1);
const RECEIVE_BACKOFF: Duration = Duration::from_millis(100);

pub struct BusMonitor {
    codec: FrameCodec,
    adapter: Arc<dyn BusAdapter>,
    sink: Arc<dyn EventSink>,
    catalog: crate::DtcCatalog,
    meter: BusLoadMeter,
    report_interval: Duration,
    /// Response id -> node name
    responders: HashMap<u32, String>,
    requests: HashSet<u32>,
    /// Last fault code seen per node, until a clear is observed
    reported: HashMap<String, DtcCode>,
}

impl BusMonitor {
    pub fn new(codec: FrameCodec, adapter: Arc<dyn BusAdapter>, targets: &[DiagnosticTarget]) -> Self {
        Self {
            codec,
            adapter,
            sink: Arc::new(TracingSink),
            catalog: crate::DtcCatalog::default(),
            meter: BusLoadMeter::new(cansim_core::DEFAULT_BITRATE),
            report_interval: Duration::from_secs(1),
            responders: targets
                .iter()
                .map(|t| (t.response_id, t.name.clone()))
                .collect(),
            requests: targets.iter().map(|t| t.request_id).collect(),
            reported: HashMap::new(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_catalog(mut self, catalog: crate::DtcCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_bitrate(mut self, bitrate: u32) -> Self {
        self.meter = BusLoadMeter::new(bitrate);
        self
    }

    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    /// Fault codes currently believed active, per node
    pub fn active_faults(&self) -> &HashMap<String, DtcCode> {
        &self.reported
    }

    pub fn load_percent(&mut self) -> f64 {
        self.meter.load_percent(clock())
    }

    pub fn frames_seen(&self) -> u64 {
        self.meter.total_frames()
    }

    /// Classify and account for one frame
    pub fn observe(&mut self, frame: &Frame) {
        self.meter.record(clock(), frame);

        if let Some(node) = self.responders.get(&frame.id).cloned() {
            self.observe_response(&node, frame);
            return;
        }
        if self.requests.contains(&frame.id) {
            trace!(can_id = format!("0x{:03X}", frame.id), "Diagnostic request");
            return;
        }

        match self.codec.database().get(frame.id) {
            Some(message) => {
                let values: BTreeMap<String, f64> = self.codec.decode(frame).into_iter().collect();
                self.emit(
                    message.label(),
                    EventKind::SignalsDecoded {
                        can_id: frame.id,
                        values,
                    },
                );
            }
            None => self.emit(
                MONITOR_ID.to_string(),
                EventKind::FrameDropped {
                    can_id: frame.id,
                    data: frame.data_hex(),
                },
            ),
        }
    }

    /// Emit the current bus load
    pub fn report_load(&mut self) {
        let percent = self.load_percent();
        let frames = self.meter.total_frames();
        self.emit(MONITOR_ID.to_string(), EventKind::BusLoad { percent, frames });
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let adapter = Arc::clone(&self.adapter);
        let start = tokio::time::Instant::now() + self.report_interval;
        let mut reports = tokio::time::interval_at(start, self.report_interval);

        info!(targets = self.responders.len(), "Bus monitor started");

        while !*shutdown.borrow() {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = reports.tick() => self.report_load(),
                received = adapter.receive(RECEIVE_WAIT) => match received {
                    Ok(frame) => self.observe(&frame),
                    Err(TransportError::Timeout) => {}
                    Err(TransportError::Lagged(lost)) => warn!(lost, "Bus monitor fell behind"),
                    Err(e) => {
                        warn!(%e, "Bus monitor receive failed");
                        tokio::time::sleep(RECEIVE_BACKOFF).await;
                    }
                },
            }
        }

        info!(frames = self.meter.total_frames(), "Bus monitor stopped");
    }

    fn observe_response(&mut self, node: &str, frame: &Frame) {
        let response = match DiagnosticResponse::from_frame(frame) {
            Ok(response) => response,
            Err(e) => {
                debug!(node, %e, "Undecodable diagnostic response");
                return;
            }
        };

        match response.service_id {
            ServiceId::ReadDtc => match response.dtc() {
                Some(code) => {
                    if self.reported.insert(node.to_string(), code) != Some(code) {
                        let description = self.catalog.describe(&code);
                        self.emit(node.to_string(), EventKind::FaultReported { code, description });
                    }
                }
                None => {
                    self.reported.remove(node);
                }
            },
            ServiceId::ClearDtc => {
                if self.reported.remove(node).is_some() {
                    self.emit(node.to_string(), EventKind::FaultCleared);
                }
            }
        }
    }

    fn emit(&self, node_id: String, kind: EventKind) {
        self.sink.emit(NodeEvent::now(node_id, kind));
    }
}
