// ===============================
// src/gateway.rs (paper venue)
// ===============================
use tracing::debug;

use crate::domain::ExecutionAction;
use crate::execution::{ExchangeResponse, Executor};
use crate::metrics::SUBMISSIONS;

/// Paper venue: fills `size * fill_ratio` immediately, or rejects everything.
#[derive(Debug, Clone)]
pub struct PaperExecutor {
    venue: String,
    fill_ratio: f64,
    reject_reason: Option<String>,
}

impl PaperExecutor {
    pub fn new(venue: &str) -> Self {
        Self { venue: venue.to_string(), fill_ratio: 1.0, reject_reason: None }
    }

    pub fn with_fill_ratio(mut self, ratio: f64) -> Self {
        self.fill_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    pub fn rejecting(mut self, reason: &str) -> Self {
        self.reject_reason = Some(reason.to_string());
        self
    }
}

impl Executor for PaperExecutor {
    fn submit(&mut self, action: &ExecutionAction) -> ExchangeResponse {
        if let Some(reason) = &self.reject_reason {
            SUBMISSIONS.with_label_values(&["rejected", &self.venue]).inc();
            return ExchangeResponse::Rejected { reason: reason.clone() };
        }
        let qty = action.size.unwrap_or(0.0) * self.fill_ratio;
        debug!(venue = %self.venue, action = action.action_type.label(), qty, "paper fill");
        SUBMISSIONS.with_label_values(&["filled", &self.venue]).inc();
        ExchangeResponse::Filled { qty }
    }
}
