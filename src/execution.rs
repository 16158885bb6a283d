// ===============================
// src/execution.rs
// ===============================
//
// Decision -> tepat satu ExecutionAction (tabel tetap), lalu satu submit ke
// executor eksternal dan satu ExecutionResult kembali. Gagal = FAILED apa adanya:
// tanpa retry, tanpa aksi alternatif.
//
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::{Limits, PipelineCfg};
use crate::domain::{ActionType, Constraints, Decision, ExecStatus, ExecutionAction, ExecutionResult};
use crate::positions::PositionLifecycle;
use crate::risk;

/// What the exchange boundary reports back for one submitted action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExchangeResponse {
    Filled { qty: f64 },
    Rejected { reason: String },
    Unreachable,
}

/// The only call shape towards an exchange: one action in, one response out.
pub trait Executor: Send {
    fn submit(&mut self, action: &ExecutionAction) -> ExchangeResponse;
}

/// ENTRY->OPEN, EXIT->CLOSE, REDUCE->REDUCE, HOLD/BLOCK/NO_ACTION->NONE.
pub fn action_type_for(decision: Decision) -> ActionType {
    match decision {
        Decision::Entry(_) => ActionType::Open,
        Decision::Exit => ActionType::Close,
        Decision::Reduce => ActionType::Reduce,
        Decision::Hold | Decision::Block | Decision::NoAction => ActionType::None,
    }
}

pub struct ExecutionTranslator {
    base_order_size: f64,
    reduce_fraction: f64,
    limits: Limits,
}

impl ExecutionTranslator {
    pub fn new(cfg: &PipelineCfg, limits: Limits) -> Self {
        Self { base_order_size: cfg.base_order_size, reduce_fraction: cfg.reduce_fraction, limits }
    }

    pub fn translate(&self, symbol: &str, decision: Decision, position: &PositionLifecycle) -> ExecutionAction {
        let action_type = action_type_for(decision);
        let (requested, direction) = match (action_type, decision) {
            (ActionType::Open, Decision::Entry(dir)) => (self.base_order_size, Some(dir)),
            (ActionType::Reduce, _) => (position.size() * self.reduce_fraction, position.direction()),
            (ActionType::Close, _) => (position.size(), position.direction()),
            _ => return ExecutionAction::none(),
        };

        match risk::clip(action_type, requested, position.size(), &self.limits) {
            Ok(size) => ExecutionAction::order(
                symbol,
                action_type,
                direction,
                size,
                Constraints {
                    max_order_size: self.limits.max_order_size,
                    max_position_size: self.limits.max_position_size,
                    reduce_only: action_type != ActionType::Open,
                },
            ),
            Err(e) => {
                warn!(%symbol, action = action_type.label(), requested, error = %e, "risk clipped action to none");
                ExecutionAction::none()
            }
        }
    }
}

/// Pure: identical (action, response) always yields the identical result.
pub fn settle(action: &ExecutionAction, response: &ExchangeResponse) -> Option<ExecutionResult> {
    let (symbol, requested) = match (&action.symbol, action.size) {
        (Some(s), Some(r)) if !action.is_none() => (s.clone(), r),
        _ => return None,
    };

    let (executed_size, status) = match response {
        ExchangeResponse::Filled { qty } if qty.is_finite() && *qty >= requested => (requested, ExecStatus::Success),
        ExchangeResponse::Filled { qty } if qty.is_finite() && *qty > 0.0 => (*qty, ExecStatus::Partial),
        _ => (0.0, ExecStatus::Failed),
    };

    Some(ExecutionResult { symbol, action_type: action.action_type, requested_size: requested, executed_size, status })
}

/// Submit once and settle. NONE actions are never submitted.
pub fn execute(executor: &mut dyn Executor, action: &ExecutionAction) -> Option<ExecutionResult> {
    if action.is_none() {
        return None;
    }
    let response = executor.submit(action);
    settle(action, &response)
}
