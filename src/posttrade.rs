// ===============================
// src/posttrade.rs
// ===============================
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::domain::{ExecStatus, ExecutionResult};
use crate::metrics::EXEC_RESULTS;

pub fn report(r: &ExecutionResult) {
    EXEC_RESULTS.with_label_values(&[&r.symbol, r.status.label()]).inc();
    match r.status {
        ExecStatus::Success => info!(symbol = %r.symbol, action = r.action_type.label(), qty = r.executed_size, "SUCCESS"),
        ExecStatus::Partial => info!(
            symbol = %r.symbol,
            action = r.action_type.label(),
            requested = r.requested_size,
            qty = r.executed_size,
            "PARTIAL"
        ),
        // verbatim, tanpa retry
        ExecStatus::Failed => warn!(symbol = %r.symbol, action = r.action_type.label(), requested = r.requested_size, "FAILED"),
    }
}

pub async fn run(mut exec_rx: mpsc::Receiver<ExecutionResult>) {
    while let Some(r) = exec_rx.recv().await {
        report(&r);
    }
}
