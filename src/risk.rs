// ===============================
// src/risk.rs
// ===============================
use thiserror::Error;

use crate::config::Limits;
use crate::domain::ActionType;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RiskError {
    #[error("Position limit exhausted")]
    Exposure,
    #[error("Nothing to trade")]
    ZeroSize,
    #[error("Invalid requested size {0}")]
    InvalidSize(f64),
}

/// Pre-trade clip: hasil selalu <= requested, tidak pernah diperbesar.
pub fn clip(action: ActionType, requested: f64, held: f64, lim: &Limits) -> Result<f64, RiskError> {
    if !requested.is_finite() || requested < 0.0 {
        return Err(RiskError::InvalidSize(requested));
    }

    // 1) Max order size
    let mut size = requested.min(lim.max_order_size);

    // 2) Exposure: hanya OPEN yang menambah posisi
    if action == ActionType::Open {
        let room = (lim.max_position_size - held).max(0.0);
        if room <= 0.0 {
            return Err(RiskError::Exposure);
        }
        size = size.min(room);
    }

    if size <= 0.0 {
        return Err(RiskError::ZeroSize);
    }
    Ok(size)
}
