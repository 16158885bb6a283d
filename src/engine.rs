// ===============================
// src/engine.rs
// ===============================
//
// Feed -> dispatcher -> bounded mpsc per symbol -> satu task per symbol.
// Task memiliki SymbolPipeline + executor-nya sendiri; tidak ada state
// yang dibagi antar symbol. Keluaran: snapshot (watch), recorder, posttrade.
//
use ahash::AHashMap as HashMap;
use tokio::{sync::mpsc, task::JoinHandle, time::Instant};
use tracing::{debug, info, warn};

use crate::config::{Limits, PipelineCfg};
use crate::domain::{Decision, Event, ExecutionResult, RawEvent};
use crate::execution::Executor;
use crate::metrics::{CYCLE_LATENCY, DATA_AGE_MS, DISPATCH_DROPPED};
use crate::pipeline::{PipelineError, SymbolPipeline};
use crate::positions::Confirmation;
use crate::snapshot::{ReceiptClock, SnapshotBoard, SnapshotPublisher, Staleness, SymbolView};

#[derive(Debug, Clone)]
pub enum Inbound {
    Event(RawEvent),
    Confirm(Confirmation),
}

/// Where worker output goes besides the snapshot board.
#[derive(Clone)]
pub struct Sinks {
    pub record: mpsc::Sender<Event>,
    pub exec: mpsc::Sender<ExecutionResult>,
}

pub struct Dispatcher {
    txs: HashMap<String, mpsc::Sender<Inbound>>,
    clock: ReceiptClock,
}

impl Dispatcher {
    /// Route by symbol. Awaits when the worker queue is full.
    pub async fn dispatch(&self, raw: RawEvent) -> bool {
        // key sama dengan normalize(): trim + uppercase
        let key = raw.symbol.trim().to_ascii_uppercase();
        let Some(tx) = self.txs.get(&key) else {
            DISPATCH_DROPPED.with_label_values(&[&key]).inc();
            debug!(symbol = %raw.symbol, "no worker for symbol, event dropped");
            return false;
        };
        self.clock.stamp(&key, chrono::Utc::now().timestamp_millis());
        tx.send(Inbound::Event(raw)).await.is_ok()
    }

    pub async fn confirm(&self, symbol: &str, c: Confirmation) -> bool {
        match self.txs.get(symbol) {
            Some(tx) => tx.send(Inbound::Confirm(c)).await.is_ok(),
            None => false,
        }
    }

    pub async fn run(self, mut feed_rx: mpsc::Receiver<RawEvent>) {
        while let Some(raw) = feed_rx.recv().await {
            self.dispatch(raw).await;
        }
        info!("dispatcher: feed closed");
    }
}

pub struct Runtime {
    pub dispatcher: Dispatcher,
    pub board: SnapshotBoard,
    pub clock: ReceiptClock,
    pub workers: Vec<JoinHandle<()>>,
}

/// Spawn one worker per allowlisted symbol.
pub fn spawn<F>(cfg: &PipelineCfg, limits: Limits, capacity: usize, sinks: Sinks, mut make_executor: F) -> Runtime
where
    F: FnMut(&str) -> Box<dyn Executor>,
{
    let clock = ReceiptClock::new(cfg.allowlist.as_slice());
    let mut board = SnapshotBoard::new(cfg.baseline_capacity);
    let mut txs = HashMap::new();
    let mut workers = Vec::with_capacity(cfg.allowlist.len());

    for sym in cfg.allowlist.iter().cloned() {
        let (tx, rx) = mpsc::channel::<Inbound>(capacity.max(1));
        txs.insert(sym.clone(), tx);
        let publisher = board.register(&sym);
        let pipeline = SymbolPipeline::new(&sym, cfg, limits.clone());
        let executor = make_executor(&sym);
        workers.push(tokio::spawn(run_symbol(rx, pipeline, executor, publisher, sinks.clone())));
    }

    Runtime { dispatcher: Dispatcher { txs, clock: clock.clone() }, board, clock, workers }
}

async fn run_symbol(
    mut rx: mpsc::Receiver<Inbound>,
    mut pipeline: SymbolPipeline,
    mut executor: Box<dyn Executor>,
    publisher: SnapshotPublisher,
    sinks: Sinks,
) {
    let symbol = pipeline.symbol().to_string();
    info!(%symbol, "symbol worker started");
    let mut last_decision: Option<Decision> = None;

    while let Some(msg) = rx.recv().await {
        match msg {
            Inbound::Event(raw) => {
                let t0 = Instant::now();
                let _ = sinks.record.try_send(Event::Raw(raw.clone()));
                match pipeline.on_event(raw, executor.as_mut()) {
                    Ok(outcomes) => {
                        for o in outcomes {
                            if let Some(p) = o.promotion.event {
                                let _ = sinks.record.try_send(Event::Promotion(p));
                            }
                            let _ = sinks.record.try_send(Event::Decision {
                                symbol: symbol.clone(),
                                cycle: o.cycle,
                                window_end_ts: o.window.end_ts,
                                decision: o.decision,
                                action: o.action,
                            });
                            if let Some(r) = o.result {
                                let _ = sinks.record.try_send(Event::Exec(r.clone()));
                                let _ = sinks.exec.send(r).await;
                            }
                            last_decision = Some(o.decision);
                        }
                        CYCLE_LATENCY.observe(t0.elapsed().as_secs_f64() * 1_000.0);
                    }
                    Err(PipelineError::Normalize(_)) => {}
                    Err(PipelineError::Invariant(v)) => {
                        let _ = sinks.record.try_send(Event::Failure { symbol: symbol.clone(), reason: v.to_string() });
                    }
                    Err(PipelineError::Halted(_)) => continue,
                }
            }
            Inbound::Confirm(c) => {
                if let Err(e) = pipeline.confirm(c) {
                    warn!(%symbol, error = %e, "confirmation rejected");
                }
            }
        }
        publisher.publish(SymbolView::of(&pipeline, last_decision));
    }
    info!(%symbol, "symbol worker stopped");
}

/// External time tick: annotate data age. Read-only with respect to pipelines.
pub fn liveness_tick(board: &SnapshotBoard, clock: &ReceiptClock, now_ms: i64, stale_after_ms: i64) -> Vec<Staleness> {
    let report = board.staleness(clock, now_ms, stale_after_ms);
    for s in &report {
        DATA_AGE_MS.with_label_values(&[&s.symbol]).set(s.age_ms.unwrap_or(-1));
        if s.stale {
            warn!(symbol = %s.symbol, age_ms = ?s.age_ms, "market data stale");
        }
    }
    report
}
