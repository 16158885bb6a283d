// ===============================
// src/pipeline.rs
// ===============================
//
// Konteks per-symbol yang dimiliki secara eksplisit (tidak ada state global):
//   normalize -> window -> {baseline, promotion, primitives} -> mandates
//             -> arbitration -> execution -> lifecycle
// Single-threaded, sinkron, waktu hanya maju lewat timestamp event.
// Satu cycle = satu window trade yang tertutup.
// FAILED bersifat absorbing: setelah itu tidak ada output lagi.
//
use std::collections::VecDeque;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::arbitration::{arbitrate, Cycle};
use crate::baseline::BaselineEstimator;
use crate::config::{Limits, PipelineCfg};
use crate::domain::{Decision, EventPayload, ExecutionAction, ExecutionResult, Mandate, PositionState, RawEvent, StreamKind};
use crate::execution::{self, ExecutionTranslator, Executor};
use crate::mandate::MandateEmitter;
use crate::metrics::{BASELINE_WARM, DECISIONS, EVENTS_BY, NORMALIZE_ERRORS, PROMOTIONS, SYMBOL_FAILED, WINDOWS_CLOSED};
use crate::normalize::{normalize, NormalizeError};
use crate::positions::{Confirmation, LifecycleError, PositionLifecycle};
use crate::primitives::{self, PrimitiveSet};
use crate::promotion::{PromotionEvaluator, PromotionOutcome, StressBuffer};
use crate::window::{KlineAgg, Window, WindowAggregator, WindowError};

const KLINE_HISTORY: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PipelineStatus {
    Uninitialized,
    Running,
    Failed(String),
}

impl PipelineStatus {
    pub fn is_failed(&self) -> bool { matches!(self, PipelineStatus::Failed(_)) }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvariantViolation {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error("window duration for {kind:?} is {duration}")]
    WindowDuration { kind: StreamKind, duration: i64 },
    #[error("window boundary overflow at {0}")]
    WindowOverflow(i64),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("normalization: {0}")]
    Normalize(#[from] NormalizeError),
    #[error("invariant violation: {0}")]
    Invariant(#[from] InvariantViolation),
    #[error("pipeline for {0} halted after failure")]
    Halted(String),
}

/// Everything one cycle produced. Mandates live only inside this value.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub cycle: u64,
    pub window: Window,
    pub promotion: PromotionOutcome,
    pub primitives: PrimitiveSet,
    pub mandates: Vec<Mandate>,
    pub decision: Decision,
    pub action: ExecutionAction,
    pub result: Option<ExecutionResult>,
    pub state_after: PositionState,
}

pub struct SymbolPipeline {
    symbol: String,
    allowlist: Vec<String>,
    status: PipelineStatus,
    aggregator: WindowAggregator,
    baseline: BaselineEstimator,
    stress: StressBuffer,
    klines: VecDeque<Window>,
    promotion: PromotionEvaluator,
    emitter: MandateEmitter,
    translator: ExecutionTranslator,
    lifecycle: PositionLifecycle,
    cycle: u64,
    events: u64,
    normalize_errors: u64,
    last_event_ts: Option<i64>,
}

impl SymbolPipeline {
    pub fn new(symbol: &str, cfg: &PipelineCfg, limits: Limits) -> Self {
        Self {
            symbol: symbol.to_string(),
            allowlist: cfg.allowlist.clone(),
            status: PipelineStatus::Uninitialized,
            aggregator: WindowAggregator::new(symbol, cfg.windows.clone()),
            baseline: BaselineEstimator::new(cfg.baseline_capacity),
            stress: StressBuffer::new(),
            klines: VecDeque::with_capacity(KLINE_HISTORY),
            promotion: PromotionEvaluator::new(cfg),
            emitter: MandateEmitter::new(cfg),
            translator: ExecutionTranslator::new(cfg, limits),
            lifecycle: PositionLifecycle::new(symbol),
            cycle: 0,
            events: 0,
            normalize_errors: 0,
            last_event_ts: None,
        }
    }

    pub fn symbol(&self) -> &str { &self.symbol }
    pub fn status(&self) -> &PipelineStatus { &self.status }
    pub fn position(&self) -> &PositionLifecycle { &self.lifecycle }
    pub fn baseline(&self) -> &BaselineEstimator { &self.baseline }
    pub fn cycle(&self) -> u64 { self.cycle }
    pub fn events(&self) -> u64 { self.events }
    pub fn normalize_errors(&self) -> u64 { self.normalize_errors }
    pub fn last_event_ts(&self) -> Option<i64> { self.last_event_ts }

    /// Feed one raw event. Returns one outcome per primary window it closed.
    pub fn on_event(&mut self, raw: RawEvent, executor: &mut dyn Executor) -> Result<Vec<CycleOutcome>, PipelineError> {
        if self.status.is_failed() {
            return Err(PipelineError::Halted(self.symbol.clone()));
        }

        let ev = match normalize(raw, &self.allowlist) {
            Ok(ev) if ev.symbol() != self.symbol => {
                let e = NormalizeError::WrongSymbol { expected: self.symbol.clone(), got: ev.symbol().to_string() };
                return Err(self.reject(e));
            }
            Ok(ev) => ev,
            Err(e) => return Err(self.reject(e)),
        };

        let closed = match self.aggregator.on_event(&ev) {
            Ok(closed) => closed,
            Err(WindowError::OutOfOrder(e)) => return Err(self.reject(e)),
            Err(WindowError::BadDuration { kind, duration }) => {
                return Err(self.fail(InvariantViolation::WindowDuration { kind, duration }))
            }
            Err(WindowError::BoundaryOverflow(ts)) => return Err(self.fail(InvariantViolation::WindowOverflow(ts))),
        };

        self.status = PipelineStatus::Running;
        self.events += 1;
        self.last_event_ts = Some(self.last_event_ts.map_or(ev.ts_ms(), |t| t.max(ev.ts_ms())));
        EVENTS_BY.with_label_values(&[&self.symbol, ev.kind().label()]).inc();

        match ev.payload() {
            EventPayload::Liquidation { .. } => self.stress.record_liquidation(ev.ts_ms()),
            EventPayload::OpenInterest { value } => self.stress.record_open_interest(ev.ts_ms(), *value),
            _ => {}
        }

        let mut outcomes = Vec::new();
        for w in closed {
            WINDOWS_CLOSED.with_label_values(&[&self.symbol, w.kind.label()]).inc();
            match w.kind {
                StreamKind::Trade => {
                    let out = self.run_cycle(w, executor).map_err(|v| self.fail(v))?;
                    outcomes.push(out);
                }
                StreamKind::Kline => {
                    if self.klines.len() == KLINE_HISTORY {
                        self.klines.pop_front();
                    }
                    self.klines.push_back(w);
                }
                StreamKind::Liquidation | StreamKind::OpenInterest => {}
            }
        }
        Ok(outcomes)
    }

    /// External confirmation of a pending lifecycle step.
    pub fn confirm(&mut self, c: Confirmation) -> Result<(), PipelineError> {
        if self.status.is_failed() {
            return Err(PipelineError::Halted(self.symbol.clone()));
        }
        self.lifecycle.confirm(c).map_err(|e| self.fail(e.into()))
    }

    fn kline_for(&self, trade_window: &Window) -> Option<KlineAgg> {
        let open = self.aggregator.open_window(StreamKind::Kline);
        self.klines
            .iter()
            .rev()
            .chain(open)
            .find(|k| k.contains(trade_window.start_ts))
            .and_then(|k| k.aggregates.as_kline().cloned())
    }

    fn run_cycle(&mut self, w: Window, executor: &mut dyn Executor) -> Result<CycleOutcome, InvariantViolation> {
        self.cycle += 1;
        let cycle = Cycle::window_close(self.cycle);
        let kline = self.kline_for(&w);

        // evaluasi dulu terhadap baseline lama, baru window ini masuk baseline
        let promotion = self.promotion.evaluate(&w, kline.as_ref(), &self.baseline, &self.stress);
        let primitives = primitives::extract(&w, kline.as_ref(), &self.stress, promotion.check.promoted());
        if let Some(t) = w.aggregates.as_trade() {
            self.baseline.on_trade_window(t);
        }
        self.stress.trim_before(w.end_ts - self.promotion.liq_lookback_ms());
        BASELINE_WARM.with_label_values(&[&self.symbol]).set(i64::from(self.baseline.is_warm()));

        if let Some(p) = &promotion.event {
            PROMOTIONS.with_label_values(&[&self.symbol]).inc();
            info!(symbol = %self.symbol, window_end = p.window_end_ts, side = ?p.dominant_side, stress = ?p.stress_sources, "window promoted");
        }

        let state = self.lifecycle.state();
        let mandates = self.emitter.emit(&self.symbol, cycle.id, &primitives, state, self.lifecycle.direction());
        let decision = arbitrate(&mandates, state, &cycle);
        DECISIONS.with_label_values(&[&self.symbol, decision.label()]).inc();

        let action = self.translator.translate(&self.symbol, decision, &self.lifecycle);
        let result = execution::execute(executor, &action);
        if let Some(r) = &result {
            self.lifecycle.apply(&action, r)?;
        }

        debug!(
            symbol = %self.symbol,
            cycle = cycle.id,
            window_end = w.end_ts,
            mandates = mandates.len(),
            decision = decision.label(),
            action = action.action_type.label(),
            state = self.lifecycle.state().label(),
            "cycle"
        );

        Ok(CycleOutcome {
            cycle: cycle.id,
            window: w,
            promotion,
            primitives,
            mandates,
            decision,
            action,
            result,
            state_after: self.lifecycle.state(),
        })
    }

    fn reject(&mut self, e: NormalizeError) -> PipelineError {
        self.normalize_errors += 1;
        NORMALIZE_ERRORS.with_label_values(&[&self.symbol, e.reason()]).inc();
        warn!(symbol = %self.symbol, error = %e, "event dropped");
        PipelineError::Normalize(e)
    }

    fn fail(&mut self, v: InvariantViolation) -> PipelineError {
        error!(symbol = %self.symbol, violation = %v, "invariant violated, symbol halted");
        self.status = PipelineStatus::Failed(v.to_string());
        SYMBOL_FAILED.with_label_values(&[&self.symbol]).set(1);
        PipelineError::Invariant(v)
    }
}
