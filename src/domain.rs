// ===============================
// src/domain.rs
// ===============================
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side { Buy, Sell }
impl Side { pub fn sign(&self) -> f64 { match self { Side::Buy => 1.0, Side::Sell => -1.0 } } }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction { Long, Short }
impl Direction {
    pub fn opposite(&self) -> Direction { match self { Direction::Long => Direction::Short, Direction::Short => Direction::Long } }
    /// Arah dari tanda net flow; None kalau flow nol.
    pub fn from_flow(flow: f64) -> Option<Direction> {
        if flow > 0.0 { Some(Direction::Long) } else if flow < 0.0 { Some(Direction::Short) } else { None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StreamKind { Trade, Liquidation, Kline, OpenInterest }
impl StreamKind {
    pub const ALL: [StreamKind; 4] = [StreamKind::Trade, StreamKind::Liquidation, StreamKind::Kline, StreamKind::OpenInterest];
    pub fn label(&self) -> &'static str {
        match self {
            StreamKind::Trade => "trade",
            StreamKind::Liquidation => "liquidation",
            StreamKind::Kline => "kline",
            StreamKind::OpenInterest => "open_interest",
        }
    }
}

// ---- Raw market events (pushed by the collector) ----
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    Trade { price: f64, qty: f64, aggressor: Side },
    Liquidation { price: f64, qty: f64, side: Side },
    Kline { open: f64, high: f64, low: f64, close: f64, volume: f64 },
    OpenInterest { value: f64 },
}
impl EventPayload {
    pub fn kind(&self) -> StreamKind {
        match self {
            EventPayload::Trade { .. } => StreamKind::Trade,
            EventPayload::Liquidation { .. } => StreamKind::Liquidation,
            EventPayload::Kline { .. } => StreamKind::Kline,
            EventPayload::OpenInterest { .. } => StreamKind::OpenInterest,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent { pub symbol: String, pub ts_ms: i64, pub payload: EventPayload }
impl RawEvent {
    pub fn kind(&self) -> StreamKind { self.payload.kind() }
}

// ---- Promotion metadata (descriptive only) ----
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DominantSide { Buy, Sell, Flat }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StressSource { Liquidation, OpenInterest }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionEvent {
    pub symbol: String,
    pub window_end_ts: i64,
    pub dominant_side: DominantSide,
    pub stress_sources: Vec<StressSource>,
}

// ---- Mandates ----
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MandateType { Entry, Exit, Reduce, Hold, Block }

/// Highest authority first. Never derived from mandate content.
pub const AUTHORITY_ORDER: [MandateType; 5] =
    [MandateType::Exit, MandateType::Reduce, MandateType::Block, MandateType::Hold, MandateType::Entry];

impl MandateType {
    pub fn authority_rank(&self) -> i32 {
        let idx = AUTHORITY_ORDER.iter().position(|t| t == self).unwrap_or(AUTHORITY_ORDER.len() - 1);
        (AUTHORITY_ORDER.len() - idx) as i32
    }
    pub fn label(&self) -> &'static str {
        match self {
            MandateType::Entry => "entry",
            MandateType::Exit => "exit",
            MandateType::Reduce => "reduce",
            MandateType::Hold => "hold",
            MandateType::Block => "block",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpiryPolicy {
    /// Valid only inside the cycle that emitted it.
    Immediate,
    /// Valid only inside the emitting cycle, and only when that cycle is a window close.
    NextCloseOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mandate {
    pub symbol: String,
    pub kind: MandateType,
    pub authority_rank: i32,
    pub direction: Option<Direction>,
    pub expiry: ExpiryPolicy,
    pub cycle: u64,
}
impl Mandate {
    pub fn new(symbol: &str, kind: MandateType, direction: Option<Direction>, expiry: ExpiryPolicy, cycle: u64) -> Self {
        Self { symbol: symbol.to_string(), kind, authority_rank: kind.authority_rank(), direction, expiry, cycle }
    }
}

/// Hasil arbitrase: tepat satu per symbol per cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision { Entry(Direction), Exit, Reduce, Hold, Block, NoAction }
impl Decision {
    pub fn label(&self) -> &'static str {
        match self {
            Decision::Entry(_) => "entry",
            Decision::Exit => "exit",
            Decision::Reduce => "reduce",
            Decision::Hold => "hold",
            Decision::Block => "block",
            Decision::NoAction => "no_action",
        }
    }
}

// ---- Position lifecycle ----
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PositionState { #[default] Flat, Entering, Open, Reducing, Closing }
impl PositionState {
    pub fn label(&self) -> &'static str {
        match self {
            PositionState::Flat => "flat",
            PositionState::Entering => "entering",
            PositionState::Open => "open",
            PositionState::Reducing => "reducing",
            PositionState::Closing => "closing",
        }
    }
}

// ---- Execution contract ----
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionType { Open, Close, Reduce, None }
impl ActionType {
    pub fn label(&self) -> &'static str {
        match self { ActionType::Open => "open", ActionType::Close => "close", ActionType::Reduce => "reduce", ActionType::None => "none" }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraints { pub max_order_size: f64, pub max_position_size: f64, pub reduce_only: bool }

/// When `action_type` is `None` every other field is `None` too; use the constructors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionAction {
    pub symbol: Option<String>,
    pub action_type: ActionType,
    pub direction: Option<Direction>,
    pub size: Option<f64>,
    pub constraints: Option<Constraints>,
}
impl ExecutionAction {
    pub fn none() -> Self {
        Self { symbol: None, action_type: ActionType::None, direction: None, size: None, constraints: None }
    }
    pub fn order(symbol: &str, action_type: ActionType, direction: Option<Direction>, size: f64, constraints: Constraints) -> Self {
        if action_type == ActionType::None { return Self::none(); }
        Self { symbol: Some(symbol.to_string()), action_type, direction, size: Some(size), constraints: Some(constraints) }
    }
    pub fn is_none(&self) -> bool { self.action_type == ActionType::None }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecStatus { Success, Partial, Failed }
impl ExecStatus {
    pub fn label(&self) -> &'static str {
        match self { ExecStatus::Success => "success", ExecStatus::Partial => "partial", ExecStatus::Failed => "failed" }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub symbol: String,
    pub action_type: ActionType,
    pub requested_size: f64,
    pub executed_size: f64,
    pub status: ExecStatus,
}

// ---- Recorder events ----
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    Raw(RawEvent),
    Promotion(PromotionEvent),
    Decision { symbol: String, cycle: u64, window_end_ts: i64, decision: Decision, action: ExecutionAction },
    Exec(ExecutionResult),
    Failure { symbol: String, reason: String },
    Note(String),
}
