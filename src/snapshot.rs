// ===============================
// src/snapshot.rs
// ===============================
//
// Publish: tiap worker symbol menulis SymbolView baru lalu `send_replace`
// Arc-nya (swap atomik). Reader selalu melihat view yang utuh.
// Liveness: umur data diukur di wall-clock dari waktu terima event terakhir;
// murni anotasi, tidak pernah menyentuh status pipeline.
//
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use ahash::AHashMap;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;

use crate::domain::{Decision, PositionState};
use crate::pipeline::{PipelineStatus, SymbolPipeline};

/// Immutable per-symbol view, replaced wholesale on every publish.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolView {
    pub symbol: String,
    pub status: PipelineStatus,
    pub last_event_ts: Option<i64>,
    pub cycle: u64,
    pub events: u64,
    pub normalize_errors: u64,
    pub position: PositionState,
    pub baseline_len: usize,
    pub baseline_warm: bool,
    pub last_decision: Option<Decision>,
}

impl SymbolView {
    pub fn initial(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            status: PipelineStatus::Uninitialized,
            last_event_ts: None,
            cycle: 0,
            events: 0,
            normalize_errors: 0,
            position: PositionState::Flat,
            baseline_len: 0,
            baseline_warm: false,
            last_decision: None,
        }
    }

    pub fn of(p: &SymbolPipeline, last_decision: Option<Decision>) -> Self {
        Self {
            symbol: p.symbol().to_string(),
            status: p.status().clone(),
            last_event_ts: p.last_event_ts(),
            cycle: p.cycle(),
            events: p.events(),
            normalize_errors: p.normalize_errors(),
            position: p.position().state(),
            baseline_len: p.baseline().flow.len(),
            baseline_warm: p.baseline().is_warm(),
            last_decision,
        }
    }
}

pub struct SnapshotPublisher {
    tx: watch::Sender<Arc<SymbolView>>,
}

impl SnapshotPublisher {
    pub fn publish(&self, view: SymbolView) {
        self.tx.send_replace(Arc::new(view));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOrder {
    Symbol,
    DerivedScore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookback {
    Latest,
    Windows(usize),
    Unbounded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotQuery {
    pub symbols: Vec<String>,
    pub order: QueryOrder,
    pub lookback: Lookback,
}

impl SnapshotQuery {
    pub fn latest<S: AsRef<str>>(symbols: &[S]) -> Self {
        Self {
            symbols: symbols.iter().map(|s| s.as_ref().to_string()).collect(),
            order: QueryOrder::Symbol,
            lookback: Lookback::Latest,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("ordering by derived score is not supported")]
    DerivedScoreOrder,
    #[error("unbounded lookback is not supported")]
    UnboundedLookback,
    #[error("lookback of {requested} windows exceeds retained {max}")]
    LookbackTooLong { requested: usize, max: usize },
    #[error("no symbols requested")]
    NoSymbols,
    #[error("unknown symbol {0}")]
    UnknownSymbol(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SnapshotStatus {
    Uninitialized,
    Failed,
}

/// The only externally visible shape. No other fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObservationSnapshot {
    pub status: SnapshotStatus,
    pub timestamp: Option<i64>,
    pub symbols_active: BTreeSet<String>,
}

/// Fold a set of symbol views into the external snapshot.
pub fn observe<'a, I>(views: I) -> ObservationSnapshot
where
    I: IntoIterator<Item = &'a SymbolView>,
{
    let mut status = SnapshotStatus::Uninitialized;
    let mut timestamp: Option<i64> = None;
    let mut symbols_active = BTreeSet::new();

    for v in views {
        if v.status.is_failed() {
            status = SnapshotStatus::Failed;
            continue;
        }
        if let Some(ts) = v.last_event_ts {
            timestamp = Some(timestamp.map_or(ts, |t| t.max(ts)));
            symbols_active.insert(v.symbol.clone());
        }
    }
    ObservationSnapshot { status, timestamp, symbols_active }
}

/// Wall-clock receipt stamps per symbol. Fixed symbol set, lock-free.
#[derive(Debug, Clone, Default)]
pub struct ReceiptClock {
    stamps: AHashMap<String, Arc<AtomicI64>>,
}

const NEVER: i64 = i64::MIN;

impl ReceiptClock {
    pub fn new<S: AsRef<str>>(symbols: &[S]) -> Self {
        let stamps = symbols
            .iter()
            .map(|s| (s.as_ref().to_string(), Arc::new(AtomicI64::new(NEVER))))
            .collect();
        Self { stamps }
    }

    pub fn stamp(&self, symbol: &str, wall_ms: i64) {
        if let Some(s) = self.stamps.get(symbol) {
            s.store(wall_ms, Ordering::Relaxed);
        }
    }

    pub fn last_receipt(&self, symbol: &str) -> Option<i64> {
        self.stamps.get(symbol).map(|s| s.load(Ordering::Relaxed)).filter(|t| *t != NEVER)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Staleness {
    pub symbol: String,
    /// None: belum pernah ada event
    pub age_ms: Option<i64>,
    pub stale: bool,
}

pub struct SnapshotBoard {
    views: BTreeMap<String, watch::Receiver<Arc<SymbolView>>>,
    max_lookback: usize,
}

impl SnapshotBoard {
    pub fn new(max_lookback: usize) -> Self {
        Self { views: BTreeMap::new(), max_lookback }
    }

    /// Register a symbol and hand back the writer half for its worker.
    pub fn register(&mut self, symbol: &str) -> SnapshotPublisher {
        let (tx, rx) = watch::channel(Arc::new(SymbolView::initial(symbol)));
        self.views.insert(symbol.to_string(), rx);
        SnapshotPublisher { tx }
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.views.keys().map(String::as_str)
    }

    pub fn view(&self, symbol: &str) -> Option<Arc<SymbolView>> {
        self.views.get(symbol).map(|rx| rx.borrow().clone())
    }

    pub fn query(&self, q: &SnapshotQuery) -> Result<ObservationSnapshot, QueryError> {
        if q.order == QueryOrder::DerivedScore {
            return Err(QueryError::DerivedScoreOrder);
        }
        match q.lookback {
            Lookback::Unbounded => return Err(QueryError::UnboundedLookback),
            Lookback::Windows(n) if n > self.max_lookback => {
                return Err(QueryError::LookbackTooLong { requested: n, max: self.max_lookback })
            }
            _ => {}
        }
        if q.symbols.is_empty() {
            return Err(QueryError::NoSymbols);
        }

        let mut views = Vec::with_capacity(q.symbols.len());
        for s in &q.symbols {
            let v = self.view(s).ok_or_else(|| QueryError::UnknownSymbol(s.clone()))?;
            views.push(v);
        }
        Ok(observe(views.iter().map(|v| v.as_ref())))
    }

    pub fn staleness(&self, clock: &ReceiptClock, now_ms: i64, stale_after_ms: i64) -> Vec<Staleness> {
        self.symbols()
            .map(|s| {
                let age_ms = clock.last_receipt(s).map(|t| (now_ms - t).max(0));
                Staleness { symbol: s.to_string(), age_ms, stale: age_ms.map_or(true, |a| a > stale_after_ms) }
            })
            .collect()
    }
}
