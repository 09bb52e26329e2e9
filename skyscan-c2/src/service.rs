//! Service runtime around the decision engine.
//!
//! One tokio task owns the `DecisionEngine`. Ledger batches, override
//! changes, and ticks all arrive on a single bounded channel; the task
//! drains whatever is queued, applies it, runs one decision cycle, then
//! updates the status watch channel read by HTTP handlers. Cycle output is
//! handed to a separate publisher task, so the decision loop never waits on
//! the transport.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use skyscan_core::engine::EngineStats;
use skyscan_core::{
    now, AircraftState, CycleOutcome, DecisionEngine, EngineStatus, ServiceConfig,
};

use crate::transport::Transport;

/// Inputs queued ahead of the engine before senders wait.
const INPUT_QUEUE: usize = 256;

/// Most inputs folded into a single decision cycle.
const MAX_BATCH: usize = 64;

/// Outbound messages buffered ahead of a slow transport.
const OUTBOX_QUEUE: usize = 1024;

// ---------------------------------------------------------------------------
// Inputs and handle
// ---------------------------------------------------------------------------

/// A trigger for the engine task. Each carries the time it was produced.
#[derive(Debug, Clone)]
pub enum EngineInput {
    Ledger { reports: Vec<AircraftState>, at: f64 },
    Override { id: Option<String>, at: f64 },
    Tick { at: f64 },
}

impl EngineInput {
    fn at(&self) -> f64 {
        match self {
            EngineInput::Ledger { at, .. }
            | EngineInput::Override { at, .. }
            | EngineInput::Tick { at } => *at,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("engine is not running")]
    Stopped,
}

/// Cloneable sender side of the engine task.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineInput>,
    status: watch::Receiver<EngineStatus>,
}

impl EngineHandle {
    async fn send(&self, input: EngineInput) -> Result<(), ServiceError> {
        self.tx.send(input).await.map_err(|_| ServiceError::Stopped)
    }

    pub async fn submit_ledger(
        &self,
        reports: Vec<AircraftState>,
        at: f64,
    ) -> Result<(), ServiceError> {
        self.send(EngineInput::Ledger { reports, at }).await
    }

    pub async fn set_override(&self, id: Option<String>, at: f64) -> Result<(), ServiceError> {
        self.send(EngineInput::Override { id, at }).await
    }

    pub async fn tick(&self, at: f64) -> Result<(), ServiceError> {
        self.send(EngineInput::Tick { at }).await
    }

    /// Latest published engine status.
    pub fn status(&self) -> EngineStatus {
        self.status.borrow().clone()
    }

    /// Receiver that is notified after every decision cycle.
    pub fn subscribe(&self) -> watch::Receiver<EngineStatus> {
        self.status.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Where engine output is published.
#[derive(Debug, Clone)]
pub struct Topics {
    pub object: String,
    pub prioritized_ledger: String,
    pub heartbeat: String,
}

impl From<&ServiceConfig> for Topics {
    fn from(config: &ServiceConfig) -> Self {
        Topics {
            object: config.object_topic.clone(),
            prioritized_ledger: config.prioritized_ledger_topic.clone(),
            heartbeat: config.heartbeat_topic.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Engine task
// ---------------------------------------------------------------------------

/// Spawn the task that owns `engine`. It runs until `shutdown` becomes true
/// or every handle is dropped, and returns the final counters.
pub fn spawn_engine(
    engine: DecisionEngine,
    transport: Arc<dyn Transport>,
    topics: Topics,
    shutdown: watch::Receiver<bool>,
) -> (EngineHandle, JoinHandle<EngineStats>) {
    let (tx, rx) = mpsc::channel(INPUT_QUEUE);
    let (status_tx, status_rx) = watch::channel(engine.status());
    let task = tokio::spawn(run_engine(engine, rx, transport, topics, status_tx, shutdown));
    (
        EngineHandle {
            tx,
            status: status_rx,
        },
        task,
    )
}

async fn run_engine(
    mut engine: DecisionEngine,
    mut rx: mpsc::Receiver<EngineInput>,
    transport: Arc<dyn Transport>,
    topics: Topics,
    status_tx: watch::Sender<EngineStatus>,
    mut shutdown: watch::Receiver<bool>,
) -> EngineStats {
    tracing::info!("engine task started");
    let (outbox, publisher) = spawn_publisher(transport);

    loop {
        if *shutdown.borrow() {
            break;
        }
        let first = tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            input = rx.recv() => match input {
                Some(input) => input,
                None => break,
            },
        };

        let mut batch = vec![first];
        while batch.len() < MAX_BATCH {
            match rx.try_recv() {
                Ok(input) => batch.push(input),
                Err(_) => break,
            }
        }

        let outcome = apply_batch(&mut engine, batch);
        status_tx.send_replace(engine.status());
        enqueue_outcome(&outbox, &topics, &outcome);
    }

    // Stop accepting, then decide once more over anything already accepted
    rx.close();
    let mut remaining = Vec::new();
    while let Ok(input) = rx.try_recv() {
        remaining.push(input);
    }
    if !remaining.is_empty() {
        tracing::info!(inputs = remaining.len(), "applying inputs queued before shutdown");
        let outcome = apply_batch(&mut engine, remaining);
        enqueue_outcome(&outbox, &topics, &outcome);
    }

    let idle = engine.release(now());
    status_tx.send_replace(engine.status());
    let last = Outbound {
        topic: topics.object.clone(),
        payload: json!(idle),
    };
    if outbox.send(last).await.is_err() {
        tracing::warn!("publisher stopped before the final idle command");
    }
    drop(outbox);
    if let Err(e) = publisher.await {
        tracing::warn!(error = %e, "publisher task failed");
    }

    let stats = engine.stats().clone();
    tracing::info!(
        cycles = stats.cycles,
        updates = stats.updates_applied,
        commands = stats.commands_emitted,
        "engine task stopped"
    );
    stats
}

/// Apply every queued input, then run exactly one cycle at the latest input
/// time.
fn apply_batch(engine: &mut DecisionEngine, batch: Vec<EngineInput>) -> CycleOutcome {
    let cycle_at = batch.iter().map(EngineInput::at).fold(f64::MIN, f64::max);
    let mut evicted = Vec::new();

    for input in batch {
        match input {
            EngineInput::Ledger { reports, .. } => {
                for report in reports {
                    engine.upsert(report);
                }
            }
            EngineInput::Override { id, .. } => engine.pin_override(id.as_deref()),
            EngineInput::Tick { at } => evicted.extend(engine.evict_stale(at)),
        }
    }

    let mut outcome = engine.run_cycle(cycle_at);
    outcome.evicted = evicted;
    outcome
}

// ---------------------------------------------------------------------------
// Publisher
// ---------------------------------------------------------------------------

/// One message waiting for the transport.
#[derive(Debug)]
struct Outbound {
    topic: String,
    payload: Value,
}

/// Spawn the task that drains the outbox into `transport`, in order. It
/// ends once every sender is dropped and the queue is empty.
fn spawn_publisher(transport: Arc<dyn Transport>) -> (mpsc::Sender<Outbound>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<Outbound>(OUTBOX_QUEUE);
    let task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            publish(transport.as_ref(), &message.topic, message.payload).await;
        }
    });
    (tx, task)
}

/// Queue a cycle's output without waiting on the transport. Messages that
/// do not fit are dropped with a warning.
fn enqueue_outcome(outbox: &mpsc::Sender<Outbound>, topics: &Topics, outcome: &CycleOutcome) {
    let messages = outcome
        .commands
        .iter()
        .map(|command| (&topics.object, json!(command)))
        .chain(std::iter::once((
            &topics.prioritized_ledger,
            json!(outcome.prioritized),
        )));

    for (topic, payload) in messages {
        let message = Outbound {
            topic: topic.clone(),
            payload,
        };
        match outbox.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(m)) => {
                tracing::warn!(topic = %m.topic, "publisher backlog full, dropping message");
            }
            Err(TrySendError::Closed(m)) => {
                tracing::warn!(topic = %m.topic, "publisher stopped, dropping message");
            }
        }
    }
}

async fn publish(transport: &dyn Transport, topic: &str, payload: Value) {
    if let Err(e) = transport.publish(topic, &payload).await {
        tracing::warn!(topic, error = %e, "publish failed");
    }
}

// ---------------------------------------------------------------------------
// Periodic tasks
// ---------------------------------------------------------------------------

fn interval(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Send a `Tick` to the engine every `period` until shutdown.
pub fn spawn_ticker(
    handle: EngineHandle,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticks = interval(period);
        loop {
            tokio::select! {
                _ = ticks.tick() => {
                    if handle.tick(now()).await.is_err() {
                        break;
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    })
}

/// Publish a registration message, then a heartbeat every `period` until
/// shutdown.
pub fn spawn_heartbeat(
    transport: Arc<dyn Transport>,
    topic: String,
    hostname: String,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let registration = json!({
            "type": "registration",
            "hostname": hostname,
            "service": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "timestamp": now(),
        });
        publish(transport.as_ref(), &topic, registration).await;

        let mut beats = interval(period);
        // First tick completes immediately
        beats.tick().await;
        loop {
            tokio::select! {
                _ = beats.tick() => {
                    let beat = json!({
                        "type": "heartbeat",
                        "hostname": hostname,
                        "timestamp": now(),
                    });
                    publish(transport.as_ref(), &topic, beat).await;
                }
                _ = shutdown.changed() => break,
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// The running engine task plus its ticker and heartbeat.
pub struct Service {
    handle: EngineHandle,
    shutdown_tx: watch::Sender<bool>,
    engine_task: JoinHandle<EngineStats>,
    background: Vec<JoinHandle<()>>,
}

impl Service {
    pub fn start(
        engine: DecisionEngine,
        transport: Arc<dyn Transport>,
        config: &ServiceConfig,
    ) -> skyscan_core::Result<Self> {
        let tick_period = config.tick_period()?;
        let heartbeat_period = config.heartbeat_period()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let topics = Topics::from(config);

        let (handle, engine_task) =
            spawn_engine(engine, transport.clone(), topics.clone(), shutdown_rx.clone());
        let ticker = spawn_ticker(handle.clone(), tick_period, shutdown_rx.clone());
        let heartbeat = spawn_heartbeat(
            transport,
            topics.heartbeat,
            config.hostname.clone(),
            heartbeat_period,
            shutdown_rx,
        );

        tracing::info!(
            tick = config.tick_interval,
            heartbeat = config.heartbeat_interval,
            "service started"
        );
        Ok(Service {
            handle,
            shutdown_tx,
            engine_task,
            background: vec![ticker, heartbeat],
        })
    }

    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    /// Receiver that turns true when shutdown begins.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Signal shutdown and wait for every task to finish.
    pub async fn shutdown(self) -> EngineStats {
        self.shutdown_tx.send_replace(true);
        for task in self.background {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "background task failed");
            }
        }
        match self.engine_task.await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::error!(error = %e, "engine task failed");
                EngineStats::default()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
