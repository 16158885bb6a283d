// ===============================
// src/primitives.rs
// ===============================
//
// Fakta skalar mentah per cycle. Nilai null berarti "tidak bisa dihitung dari
// data saat ini": tidak pernah dipaksa jadi 0, tidak pernah diberi default.
//
use serde::{Deserialize, Serialize};

use crate::promotion::StressBuffer;
use crate::window::{KlineAgg, Window};

pub const NET_FLOW: &str = "net_flow";
pub const TRADE_COUNT: &str = "trade_count";
pub const MAX_TRADE_SIZE: &str = "max_trade_size";
pub const PRICE_CHANGE: &str = "price_change";
pub const BODY_RANGE_RATIO: &str = "body_range_ratio";
pub const LIQUIDATION_COUNT: &str = "liquidation_count";
pub const OI_DELTA: &str = "oi_delta";
pub const WINDOW_PROMOTED: &str = "window_promoted";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PrimitiveValue { Number(f64), Flag(bool) }

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Primitive { pub name: &'static str, pub value: Option<PrimitiveValue> }

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct PrimitiveSet { items: Vec<Primitive> }

impl PrimitiveSet {
    pub fn new() -> Self { Self::default() }

    pub fn number(mut self, name: &'static str, v: Option<f64>) -> Self {
        self.items.push(Primitive { name, value: v.map(PrimitiveValue::Number) });
        self
    }

    pub fn flag(mut self, name: &'static str, v: Option<bool>) -> Self {
        self.items.push(Primitive { name, value: v.map(PrimitiveValue::Flag) });
        self
    }

    pub fn get(&self, name: &str) -> Option<&Primitive> { self.items.iter().find(|p| p.name == name) }

    /// None when absent, null, or not a number.
    pub fn get_number(&self, name: &str) -> Option<f64> {
        match self.get(name)?.value? {
            PrimitiveValue::Number(v) => Some(v),
            PrimitiveValue::Flag(_) => None,
        }
    }

    pub fn get_flag(&self, name: &str) -> Option<bool> {
        match self.get(name)?.value? {
            PrimitiveValue::Flag(v) => Some(v),
            PrimitiveValue::Number(_) => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Primitive> { self.items.iter() }
}

pub fn extract(trade_window: &Window, kline: Option<&KlineAgg>, stress: &StressBuffer, promoted: bool) -> PrimitiveSet {
    let trade = trade_window.aggregates.as_trade();
    let (start, end) = (trade_window.start_ts, trade_window.end_ts);

    let liquidation_count = stress
        .liquidation_stream_seen()
        .then(|| stress.liquidations_between(start, end) as f64);

    PrimitiveSet::new()
        .number(NET_FLOW, trade.map(|t| t.net_flow))
        .number(TRADE_COUNT, trade.map(|t| t.trade_count as f64))
        .number(MAX_TRADE_SIZE, trade.filter(|t| t.trade_count > 0).map(|t| t.max_trade_size))
        .number(PRICE_CHANGE, kline.and_then(|k| k.price_change()))
        .number(BODY_RANGE_RATIO, kline.and_then(|k| k.body_range_ratio()))
        .number(LIQUIDATION_COUNT, liquidation_count)
        .number(OI_DELTA, stress.open_interest_delta(start, end))
        .flag(WINDOW_PROMOTED, Some(promoted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StreamKind;
    use crate::window::{Aggregates, TradeAgg};

    fn window(count: u64) -> Window {
        Window {
            symbol: "BTCUSDT".into(),
            kind: StreamKind::Trade,
            start_ts: 1_000,
            end_ts: 2_000,
            aggregates: Aggregates::Trade(TradeAgg { net_flow: 2.0, trade_count: count, max_trade_size: 1.0, ..TradeAgg::default() }),
        }
    }

    #[test]
    fn missing_streams_yield_nulls() {
        let p = extract(&window(1), None, &StressBuffer::new(), false);
        assert_eq!(p.get_number(NET_FLOW), Some(2.0));
        assert!(p.get(PRICE_CHANGE).unwrap().value.is_none());
        assert!(p.get(BODY_RANGE_RATIO).unwrap().value.is_none());
        assert!(p.get(LIQUIDATION_COUNT).unwrap().value.is_none());
        assert!(p.get(OI_DELTA).unwrap().value.is_none());
        assert_eq!(p.get_flag(WINDOW_PROMOTED), Some(false));
    }

    #[test]
    fn liquidation_count_is_zero_once_stream_seen() {
        let mut stress = StressBuffer::new();
        stress.record_liquidation(500);
        let p = extract(&window(1), None, &stress, false);
        assert_eq!(p.get_number(LIQUIDATION_COUNT), Some(0.0));
        stress.record_liquidation(1_500);
        let p = extract(&window(1), None, &stress, false);
        assert_eq!(p.get_number(LIQUIDATION_COUNT), Some(1.0));
    }

    #[test]
    fn empty_window_has_no_max_size() {
        let p = extract(&window(0), None, &StressBuffer::new(), false);
        assert_eq!(p.get_number(TRADE_COUNT), Some(0.0));
        assert_eq!(p.get_number(MAX_TRADE_SIZE), None);
    }

    #[test]
    fn flag_is_not_a_number() {
        let p = extract(&window(1), None, &StressBuffer::new(), true);
        assert_eq!(p.get_number(WINDOW_PROMOTED), None);
    }
}
