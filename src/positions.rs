// ===============================
// src/positions.rs (position lifecycle FSM)
// ===============================
//
// FLAT -> ENTERING -> OPEN -> (REDUCING <-> OPEN) -> CLOSING -> FLAT
// Hanya transisi di `is_legal` yang boleh; selain itu fatal (LifecycleError),
// bukan di-ignore diam-diam. Mutasi hanya lewat postcondition ExecutionResult
// atau konfirmasi eksternal.
//
use thiserror::Error;
use tracing::info;

use crate::domain::{ActionType, Direction, ExecStatus, ExecutionAction, ExecutionResult, PositionState};
use crate::metrics::POSITION_STATE;

const SIZE_EPS: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LifecycleError {
    #[error("illegal transition {from:?} -> {to:?}")]
    IllegalTransition { from: PositionState, to: PositionState },
    #[error("result for {result:?} does not match action {action:?}")]
    ResultMismatch { action: ActionType, result: ActionType },
    #[error("open action without direction")]
    MissingDirection,
    #[error("invalid confirmed size {0}")]
    InvalidSize(f64),
}

pub fn is_legal(from: PositionState, to: PositionState) -> bool {
    use PositionState::*;
    matches!(
        (from, to),
        (Flat, Entering)
            | (Entering, Open)
            | (Entering, Closing)
            | (Open, Reducing)
            | (Open, Closing)
            | (Reducing, Open)
            | (Reducing, Closing)
            | (Closing, Flat)
    )
}

/// External confirmations that complete a pending transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Confirmation {
    EntryFilled { total_size: f64 },
    ReduceCompleted { remaining: f64 },
    CloseCompleted,
}

#[derive(Debug, Clone)]
pub struct PositionLifecycle {
    symbol: String,
    state: PositionState,
    direction: Option<Direction>,
    size: f64,
}

impl PositionLifecycle {
    pub fn new(symbol: &str) -> Self {
        let lc = Self { symbol: symbol.to_string(), state: PositionState::Flat, direction: None, size: 0.0 };
        lc.export();
        lc
    }

    pub fn state(&self) -> PositionState { self.state }
    pub fn direction(&self) -> Option<Direction> { self.direction }
    pub fn size(&self) -> f64 { self.size }

    fn export(&self) {
        for s in [PositionState::Flat, PositionState::Entering, PositionState::Open, PositionState::Reducing, PositionState::Closing] {
            POSITION_STATE
                .with_label_values(&[&self.symbol, s.label()])
                .set(i64::from(s == self.state));
        }
    }

    fn transition(&mut self, to: PositionState) -> Result<(), LifecycleError> {
        if !is_legal(self.state, to) {
            return Err(LifecycleError::IllegalTransition { from: self.state, to });
        }
        info!(symbol = %self.symbol, from = self.state.label(), to = to.label(), "position transition");
        self.state = to;
        if to == PositionState::Flat {
            self.direction = None;
            self.size = 0.0;
        }
        self.export();
        Ok(())
    }

    /// Postconditions of one execution. FAILED and NONE leave the state untouched.
    pub fn apply(&mut self, action: &ExecutionAction, result: &ExecutionResult) -> Result<(), LifecycleError> {
        if action.is_none() || result.status == ExecStatus::Failed {
            return Ok(());
        }
        if action.action_type != result.action_type {
            return Err(LifecycleError::ResultMismatch { action: action.action_type, result: result.action_type });
        }
        let done = result.status == ExecStatus::Success;

        match action.action_type {
            ActionType::Open => {
                let dir = action.direction.ok_or(LifecycleError::MissingDirection)?;
                self.transition(PositionState::Entering)?;
                self.direction = Some(dir);
                self.size = result.executed_size;
                if done {
                    self.transition(PositionState::Open)?;
                }
            }
            ActionType::Reduce => {
                self.transition(PositionState::Reducing)?;
                self.size = (self.size - result.executed_size).max(0.0);
                if done {
                    self.finish_reduce()?;
                }
            }
            ActionType::Close => {
                self.transition(PositionState::Closing)?;
                self.size = (self.size - result.executed_size).max(0.0);
                // order bisa di-clip max_order_size; sisa posisi tunggu CloseCompleted
                if done && self.size <= SIZE_EPS {
                    self.transition(PositionState::Flat)?;
                }
            }
            ActionType::None => {}
        }
        Ok(())
    }

    pub fn confirm(&mut self, c: Confirmation) -> Result<(), LifecycleError> {
        match c {
            Confirmation::EntryFilled { total_size } => {
                if !total_size.is_finite() || total_size <= SIZE_EPS {
                    return Err(LifecycleError::InvalidSize(total_size));
                }
                self.transition(PositionState::Open)?;
                self.size = total_size;
            }
            Confirmation::ReduceCompleted { remaining } => {
                if !remaining.is_finite() || remaining < 0.0 {
                    return Err(LifecycleError::InvalidSize(remaining));
                }
                if self.state != PositionState::Reducing {
                    return Err(LifecycleError::IllegalTransition { from: self.state, to: PositionState::Open });
                }
                self.size = remaining;
                self.finish_reduce()?;
            }
            Confirmation::CloseCompleted => self.transition(PositionState::Flat)?,
        }
        Ok(())
    }

    fn finish_reduce(&mut self) -> Result<(), LifecycleError> {
        if self.size > SIZE_EPS {
            self.transition(PositionState::Open)
        } else {
            self.transition(PositionState::Closing)?;
            self.transition(PositionState::Flat)
        }
    }
}
