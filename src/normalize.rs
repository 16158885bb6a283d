// ===============================
// src/normalize.rs
// ===============================
//
// Validasi satu RawEvent menjadi record kanonik. Stateless: urutan
// (out-of-order) diperiksa di window aggregator, bukan di sini.
//
use thiserror::Error;

use crate::domain::{EventPayload, RawEvent, StreamKind};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormalizeError {
    #[error("empty symbol")]
    EmptySymbol,
    #[error("symbol {0} is not in the allowlist")]
    UnknownSymbol(String),
    #[error("event for {got} delivered to pipeline of {expected}")]
    WrongSymbol { expected: String, got: String },
    #[error("negative timestamp {0}")]
    NegativeTimestamp(i64),
    #[error("non-finite {field}")]
    NonFinite { field: &'static str },
    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: f64 },
    #[error("kline bounds inconsistent (o={open} h={high} l={low} c={close})")]
    KlineBounds { open: f64, high: f64, low: f64, close: f64 },
    #[error("{kind:?} event at {ts} precedes open window start {window_start}")]
    OutOfOrder { kind: StreamKind, ts: i64, window_start: i64 },
}

impl NormalizeError {
    /// Label pendek untuk metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            NormalizeError::EmptySymbol => "empty_symbol",
            NormalizeError::UnknownSymbol(_) => "unknown_symbol",
            NormalizeError::WrongSymbol { .. } => "wrong_symbol",
            NormalizeError::NegativeTimestamp(_) => "negative_ts",
            NormalizeError::NonFinite { .. } => "non_finite",
            NormalizeError::NonPositive { .. } => "non_positive",
            NormalizeError::KlineBounds { .. } => "kline_bounds",
            NormalizeError::OutOfOrder { .. } => "out_of_order",
        }
    }
}

/// A validated event. Only [`normalize`] constructs one.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedEvent {
    symbol: String,
    ts_ms: i64,
    payload: EventPayload,
}

impl NormalizedEvent {
    pub fn symbol(&self) -> &str { &self.symbol }
    pub fn ts_ms(&self) -> i64 { self.ts_ms }
    pub fn payload(&self) -> &EventPayload { &self.payload }
    pub fn kind(&self) -> StreamKind { self.payload.kind() }
}

fn finite(field: &'static str, v: f64) -> Result<f64, NormalizeError> {
    if v.is_finite() { Ok(v) } else { Err(NormalizeError::NonFinite { field }) }
}

fn positive(field: &'static str, v: f64) -> Result<f64, NormalizeError> {
    let v = finite(field, v)?;
    if v > 0.0 { Ok(v) } else { Err(NormalizeError::NonPositive { field, value: v }) }
}

pub fn normalize(raw: RawEvent, allowlist: &[String]) -> Result<NormalizedEvent, NormalizeError> {
    let symbol = raw.symbol.trim().to_ascii_uppercase();
    if symbol.is_empty() {
        return Err(NormalizeError::EmptySymbol);
    }
    if !allowlist.iter().any(|s| *s == symbol) {
        return Err(NormalizeError::UnknownSymbol(symbol));
    }
    if raw.ts_ms < 0 {
        return Err(NormalizeError::NegativeTimestamp(raw.ts_ms));
    }

    match &raw.payload {
        EventPayload::Trade { price, qty, .. } | EventPayload::Liquidation { price, qty, .. } => {
            positive("price", *price)?;
            positive("qty", *qty)?;
        }
        EventPayload::Kline { open, high, low, close, volume } => {
            positive("open", *open)?;
            positive("high", *high)?;
            positive("low", *low)?;
            positive("close", *close)?;
            if finite("volume", *volume)? < 0.0 {
                return Err(NormalizeError::NonPositive { field: "volume", value: *volume });
            }
            if *low > open.min(*close) || *high < open.max(*close) {
                return Err(NormalizeError::KlineBounds { open: *open, high: *high, low: *low, close: *close });
            }
        }
        EventPayload::OpenInterest { value } => {
            if finite("open_interest", *value)? < 0.0 {
                return Err(NormalizeError::NonPositive { field: "open_interest", value: *value });
            }
        }
    }

    Ok(NormalizedEvent { symbol, ts_ms: raw.ts_ms, payload: raw.payload })
}
