//! Whole-vehicle runner
//!
//! Starts one task per configured node plus the diagnostic tester and the
//! bus monitor, all attached to the same bus.

use std::sync::Arc;
use std::time::Duration;

use cansim_core::{EventSink, NodeStatus};
use cansim_dbc::FrameCodec;
use cansim_uds::{Bus, DiagnosticTester};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::VehicleConfig;
use crate::error::VehicleError;
use crate::monitor::{BusMonitor, MONITOR_ID};
use crate::node::{NodeHandle, NodeSimulator};
use crate::sampler::RandomSampler;

const AUXILIARY_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Bus participant name of the diagnostic tester
pub const TESTER_NAME: &str = "tester";

/// A running vehicle
pub struct Vehicle {
    name: String,
    nodes: Vec<NodeHandle>,
    shutdown: watch::Sender<bool>,
    tester: Option<JoinHandle<()>>,
    monitor: Option<JoinHandle<()>>,
}

impl Vehicle {
    /// Spawn every task described by `config`
    ///
    /// Must be called from within a tokio runtime. With a `seed`, each node
    /// draws samples and injected failures from its own deterministic stream.
    pub fn start(
        config: &VehicleConfig,
        bus: &Bus,
        sink: Arc<dyn EventSink>,
        seed: Option<u64>,
    ) -> Result<Self, VehicleError> {
        config.validate()?;

        let codec = FrameCodec::new(Arc::new(config.database()?));
        let catalog = config.catalog()?;
        let targets = config.targets();
        let (shutdown, shutdown_rx) = watch::channel(false);

        let mut nodes = Vec::with_capacity(config.nodes.len());
        for (index, node) in config.nodes.iter().enumerate() {
            let stream = index as u64 * 2;
            let simulator = NodeSimulator::new(
                node.name.clone(),
                node.message_id,
                node.service(),
                codec.clone(),
                bus.connect(&node.name)?,
            )
            .with_period(node.period())
            .with_thresholds(config.thresholds.clone())
            .with_sampler(Box::new(RandomSampler::new(
                node.samples.clone(),
                seed.map(|s| s.wrapping_add(stream)),
            )))
            .with_fault_policy(node.faults.policy(seed.map(|s| s.wrapping_add(stream + 1))))
            .with_rules(node.fault_rules.clone())
            .with_catalog(catalog.clone())
            .with_sink(Arc::clone(&sink));

            debug!(
                node = %node.name,
                message_id = format!("0x{:03X}", node.message_id),
                period_ms = node.period_ms,
                "Starting node"
            );
            nodes.push(simulator.spawn());
        }

        let tester = if config.tester.enabled {
            let tester = DiagnosticTester::new(
                bus.connect(TESTER_NAME)?,
                targets.clone(),
                config.tester.clone(),
                Arc::clone(&sink),
            );
            Some(tokio::spawn(tester.run(shutdown_rx.clone())))
        } else {
            None
        };

        let monitor = if config.monitor.enabled {
            let monitor = BusMonitor::new(codec, bus.connect(MONITOR_ID)?, &targets)
                .with_sink(Arc::clone(&sink))
                .with_catalog(catalog)
                .with_bitrate(config.transport.bitrate())
                .with_report_interval(config.monitor.load_report_interval());
            Some(tokio::spawn(monitor.run(shutdown_rx)))
        } else {
            None
        };

        info!(
            vehicle = %config.name,
            nodes = nodes.len(),
            tester = tester.is_some(),
            monitor = monitor.is_some(),
            "Vehicle started"
        );

        Ok(Self {
            name: config.name.clone(),
            nodes,
            shutdown,
            tester,
            monitor,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nodes(&self) -> &[NodeHandle] {
        &self.nodes
    }

    pub fn node(&self, name: &str) -> Option<&NodeHandle> {
        self.nodes.iter().find(|node| node.name() == name)
    }

    /// Latest snapshot of every node, in configuration order
    pub fn status(&self) -> Vec<NodeStatus> {
        self.nodes.iter().map(NodeHandle::status).collect()
    }

    /// Stop the tester first, then the nodes, then the monitor
    pub async fn shutdown(self) -> Vec<NodeStatus> {
        let Self {
            name,
            nodes,
            shutdown,
            tester,
            monitor,
        } = self;

        shutdown.send_replace(true);
        if let Some(task) = tester {
            join_auxiliary(TESTER_NAME, task).await;
        }

        let mut statuses = Vec::with_capacity(nodes.len());
        for node in nodes {
            statuses.push(node.shutdown().await);
        }

        if let Some(task) = monitor {
            join_auxiliary(MONITOR_ID, task).await;
        }

        info!(vehicle = %name, "Vehicle stopped");
        statuses
    }
}

async fn join_auxiliary(name: &str, task: JoinHandle<()>) {
    let abort = task.abort_handle();
    match tokio::time::timeout(AUXILIARY_SHUTDOWN_TIMEOUT, task).await {
        Ok(Ok(())) => debug!(task = name, "Task joined"),
        Ok(Err(e)) => warn!(task = name, %e, "Task failed"),
        Err(_) => {
            warn!(task = name, "Task did not stop in time, aborting");
            abort.abort();
        }
    }
}
