//! Fault code exchange between the tester and a running node
//!
//! Run with: cargo test -p cansim-tests --test diagnostics_test

use std::sync::Arc;
use std::time::Duration;

use cansim_core::{BusState, ChannelSink, DtcCode, EventKind, NodeEvent};
use cansim_node::sampler::sample_of;
use cansim_node::{FaultRule, NodeHandle, NodeSimulator, ScriptedFaults, ScriptedSampler};
use cansim_tests::{
    drain, engine_codec, events_for, ENGINE_ID, ENGINE_REQUEST_ID, ENGINE_RESPONSE_ID, PERIOD,
};
use cansim_uds::{
    DiagnosticError, DiagnosticService, DiagnosticTarget, DiagnosticTester, TesterConfig,
    VirtualBus,
};
use pretty_assertions::assert_eq;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_test::{assert_err, assert_ok};

const OVERHEAT: DtcCode = DtcCode::powertrain(0x0217);

fn spawn_engine(bus: &VirtualBus, samples: Vec<f64>, faults: ScriptedFaults) -> NodeHandle {
    let samples = samples
        .into_iter()
        .map(|temp| sample_of([("EngineTemp", temp), ("BatteryVolt", 13.8), ("RPM", 1200.0)]));
    NodeSimulator::new(
        "engine",
        ENGINE_ID,
        DiagnosticService::new(ENGINE_REQUEST_ID, ENGINE_RESPONSE_ID),
        engine_codec(),
        Arc::new(bus.connect("engine")),
    )
    .with_period(PERIOD)
    .with_sampler(Box::new(ScriptedSampler::new(samples)))
    .with_fault_policy(Box::new(faults))
    .with_rules(vec![FaultRule::above("EngineTemp", 115.0, OVERHEAT)])
    .spawn()
}

fn tester(bus: &VirtualBus) -> (DiagnosticTester, DiagnosticTarget, UnboundedReceiver<NodeEvent>) {
    let (sink, events) = ChannelSink::channel();
    let target = DiagnosticTarget::new("engine", ENGINE_REQUEST_ID, ENGINE_RESPONSE_ID);
    let tester = DiagnosticTester::new(
        Arc::new(bus.connect("tester")),
        vec![target.clone()],
        TesterConfig::default(),
        Arc::new(sink),
    );
    (tester, target, events)
}

#[tokio::test(start_paused = true)]
async fn test_read_clear_read() {
    let bus = VirtualBus::default();
    let (tester, target, _events) = tester(&bus);
    // Hot on the first tick only
    let engine = spawn_engine(&bus, vec![120.0, 90.0], ScriptedFaults::default());

    let mut status = engine.subscribe();
    status
        .wait_for(|s| s.active_dtc == Some(OVERHEAT))
        .await
        .unwrap();

    assert_eq!(assert_ok!(tester.read_dtc(&target).await), Some(OVERHEAT));
    assert_ok!(tester.clear_dtc(&target).await);
    assert_eq!(assert_ok!(tester.read_dtc(&target).await), None);

    let last = engine.shutdown().await;
    assert_eq!(last.active_dtc, None);
}

#[tokio::test(start_paused = true)]
async fn test_sweep_clears_active_fault() {
    let bus = VirtualBus::default();
    let (tester, _target, _events) = tester(&bus);
    let engine = spawn_engine(&bus, vec![120.0, 90.0], ScriptedFaults::default());

    engine
        .subscribe()
        .wait_for(|s| s.active_dtc.is_some())
        .await
        .unwrap();

    let entries = tester.sweep().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].target, "engine");
    assert_eq!(entries[0].read.as_ref().ok(), Some(&Some(OVERHEAT)));
    assert!(entries[0].cleared);

    let entries = tester.sweep().await;
    assert_eq!(entries[0].read.as_ref().ok(), Some(&None));
    assert!(!entries[0].cleared);

    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_bus_off_node_still_answers() {
    let bus = VirtualBus::default();
    let (tester, target, _events) = tester(&bus);
    let engine = spawn_engine(&bus, vec![120.0, 90.0], ScriptedFaults::failing_transmits(32));

    engine
        .subscribe()
        .wait_for(|s| s.state == BusState::BusOff)
        .await
        .unwrap();

    assert_eq!(assert_ok!(tester.read_dtc(&target).await), Some(OVERHEAT));
    assert_ok!(tester.clear_dtc(&target).await);
    assert_eq!(assert_ok!(tester.read_dtc(&target).await), None);

    let last = engine.shutdown().await;
    assert_eq!(last.state, BusState::BusOff);
}

#[tokio::test(start_paused = true)]
async fn test_missing_node_times_out() {
    let bus = VirtualBus::default();
    let (tester, _target, mut events) = tester(&bus);
    let ghost = DiagnosticTarget::new("ghost", 0x7E5, 0x7ED);

    let started = tokio::time::Instant::now();
    let error = assert_err!(tester.read_dtc(&ghost).await);
    assert!(matches!(error, DiagnosticError::Timeout(0x7E5)));
    assert!(started.elapsed() >= Duration::from_millis(200));

    // Only sweeps report timeouts as events
    assert!(drain(&mut events).is_empty());
    let entry = tester.check_target(&ghost).await;
    assert!(entry.read.is_err());
    let events = drain(&mut events);
    assert_eq!(
        events_for(&events, "ghost", |kind| matches!(
            kind,
            EventKind::DiagnosticTimeout { request_id: 0x7E5 }
        ))
        .count(),
        1
    );
}
