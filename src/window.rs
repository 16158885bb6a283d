// ===============================
// src/window.rs
// ===============================
//
// Fixed-duration, non-overlapping windows per (symbol, stream kind).
// Penutupan window dipicu event (ts >= end_ts), tidak pernah oleh jam dinding.
// Gap: setiap window kosong di antaranya tetap di-emit dengan agregat netral.
//
use ahash::AHashMap as HashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::WindowDurations;
use crate::domain::{EventPayload, Side, StreamKind};
use crate::normalize::{NormalizeError, NormalizedEvent};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WindowError {
    #[error(transparent)]
    OutOfOrder(#[from] NormalizeError),
    #[error("window duration for {kind:?} is {duration}, must be positive")]
    BadDuration { kind: StreamKind, duration: i64 },
    #[error("window boundary overflow at {0}")]
    BoundaryOverflow(i64),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TradeAgg {
    pub buy_volume: f64,
    pub sell_volume: f64,
    pub net_flow: f64,
    pub trade_count: u64,
    pub max_trade_size: f64,
    pub first_price: Option<f64>,
    pub last_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LiquidationAgg { pub count: u64, pub buy_qty: f64, pub sell_qty: f64, pub notional: f64 }

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct KlineAgg {
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: f64,
    pub updates: u64,
}

impl KlineAgg {
    /// |close - open| / (high - low); None for an empty window or a zero range.
    pub fn body_range_ratio(&self) -> Option<f64> {
        let (o, h, l, c) = (self.open?, self.high?, self.low?, self.close?);
        let range = h - l;
        if range <= 0.0 {
            return None;
        }
        Some((c - o).abs() / range)
    }

    pub fn price_change(&self) -> Option<f64> {
        Some(self.close? - self.open?)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OpenInterestAgg { pub first: Option<f64>, pub last: Option<f64>, pub updates: u64 }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Aggregates {
    Trade(TradeAgg),
    Liquidation(LiquidationAgg),
    Kline(KlineAgg),
    OpenInterest(OpenInterestAgg),
}

impl Aggregates {
    pub fn neutral(kind: StreamKind) -> Self {
        match kind {
            StreamKind::Trade => Aggregates::Trade(TradeAgg::default()),
            StreamKind::Liquidation => Aggregates::Liquidation(LiquidationAgg::default()),
            StreamKind::Kline => Aggregates::Kline(KlineAgg::default()),
            StreamKind::OpenInterest => Aggregates::OpenInterest(OpenInterestAgg::default()),
        }
    }

    fn fold(&mut self, payload: &EventPayload) {
        match (self, payload) {
            (Aggregates::Trade(a), EventPayload::Trade { price, qty, aggressor }) => {
                match aggressor {
                    Side::Buy => a.buy_volume += qty,
                    Side::Sell => a.sell_volume += qty,
                }
                a.net_flow += aggressor.sign() * qty;
                a.trade_count += 1;
                a.max_trade_size = a.max_trade_size.max(*qty);
                a.first_price.get_or_insert(*price);
                a.last_price = Some(*price);
            }
            (Aggregates::Liquidation(a), EventPayload::Liquidation { price, qty, side }) => {
                a.count += 1;
                match side {
                    Side::Buy => a.buy_qty += qty,
                    Side::Sell => a.sell_qty += qty,
                }
                a.notional += price * qty;
            }
            (Aggregates::Kline(a), EventPayload::Kline { open, high, low, close, volume }) => {
                a.open.get_or_insert(*open);
                a.high = Some(a.high.map_or(*high, |h| h.max(*high)));
                a.low = Some(a.low.map_or(*low, |l| l.min(*low)));
                a.close = Some(*close);
                a.volume = *volume;
                a.updates += 1;
            }
            (Aggregates::OpenInterest(a), EventPayload::OpenInterest { value }) => {
                a.first.get_or_insert(*value);
                a.last = Some(*value);
                a.updates += 1;
            }
            // kind selalu cocok: window dibuat dari kind event yang sama
            _ => {}
        }
    }

    pub fn as_trade(&self) -> Option<&TradeAgg> { if let Aggregates::Trade(a) = self { Some(a) } else { None } }
    pub fn as_kline(&self) -> Option<&KlineAgg> { if let Aggregates::Kline(a) = self { Some(a) } else { None } }
    pub fn as_liquidation(&self) -> Option<&LiquidationAgg> { if let Aggregates::Liquidation(a) = self { Some(a) } else { None } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub symbol: String,
    pub kind: StreamKind,
    pub start_ts: i64,
    pub end_ts: i64,
    pub aggregates: Aggregates,
}

impl Window {
    fn open(symbol: &str, kind: StreamKind, start_ts: i64, duration: i64) -> Result<Self, WindowError> {
        let end_ts = start_ts.checked_add(duration).ok_or(WindowError::BoundaryOverflow(start_ts))?;
        Ok(Self { symbol: symbol.to_string(), kind, start_ts, end_ts, aggregates: Aggregates::neutral(kind) })
    }

    pub fn contains(&self, ts: i64) -> bool { self.start_ts <= ts && ts < self.end_ts }
}

/// One open window per stream kind for a single symbol.
pub struct WindowAggregator {
    symbol: String,
    durations: WindowDurations,
    open: HashMap<StreamKind, Window>,
}

impl WindowAggregator {
    pub fn new(symbol: &str, durations: WindowDurations) -> Self {
        Self { symbol: symbol.to_string(), durations, open: HashMap::new() }
    }

    pub fn open_window(&self, kind: StreamKind) -> Option<&Window> { self.open.get(&kind) }

    /// Fold one event; returns every window closed by it, oldest first.
    pub fn on_event(&mut self, ev: &NormalizedEvent) -> Result<Vec<Window>, WindowError> {
        let kind = ev.kind();
        let duration = self.durations.for_kind(kind);
        if duration <= 0 {
            return Err(WindowError::BadDuration { kind, duration });
        }
        let ts = ev.ts_ms();
        let mut closed = Vec::new();

        let mut current = match self.open.remove(&kind) {
            Some(w) => w,
            None => Window::open(&self.symbol, kind, ts.div_euclid(duration) * duration, duration)?,
        };

        if ts < current.start_ts {
            let window_start = current.start_ts;
            self.open.insert(kind, current);
            return Err(NormalizeError::OutOfOrder { kind, ts, window_start }.into());
        }

        while ts >= current.end_ts {
            let next = match Window::open(&self.symbol, kind, current.end_ts, duration) {
                Ok(w) => w,
                Err(e) => {
                    self.open.insert(kind, current);
                    return Err(e);
                }
            };
            closed.push(std::mem::replace(&mut current, next));
        }

        current.aggregates.fold(ev.payload());
        self.open.insert(kind, current);
        Ok(closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RawEvent;
    use crate::normalize::normalize;

    fn durations(ms: i64) -> WindowDurations {
        WindowDurations { trade: ms, liquidation: ms, kline: ms, open_interest: ms }
    }

    fn trade(ts: i64, qty: f64, aggressor: Side) -> NormalizedEvent {
        let raw = RawEvent { symbol: "BTCUSDT".into(), ts_ms: ts, payload: EventPayload::Trade { price: 100.0, qty, aggressor } };
        normalize(raw, &["BTCUSDT".to_string()]).unwrap()
    }

    #[test]
    fn folds_events_inside_window() {
        let mut agg = WindowAggregator::new("BTCUSDT", durations(1_000));
        assert!(agg.on_event(&trade(1_000, 2.0, Side::Buy)).unwrap().is_empty());
        assert!(agg.on_event(&trade(1_500, 0.5, Side::Sell)).unwrap().is_empty());
        let w = agg.open_window(StreamKind::Trade).unwrap();
        let t = w.aggregates.as_trade().unwrap();
        assert_eq!((w.start_ts, w.end_ts), (1_000, 2_000));
        assert_eq!(t.trade_count, 2);
        assert!((t.net_flow - 1.5).abs() < 1e-12);
        assert_eq!(t.max_trade_size, 2.0);
    }

    #[test]
    fn gap_emits_empty_windows() {
        let mut agg = WindowAggregator::new("BTCUSDT", durations(1_000));
        agg.on_event(&trade(0, 1.0, Side::Buy)).unwrap();
        let closed = agg.on_event(&trade(3_200, 1.0, Side::Buy)).unwrap();
        let starts: Vec<i64> = closed.iter().map(|w| w.start_ts).collect();
        assert_eq!(starts, vec![0, 1_000, 2_000]);
        assert_eq!(closed[1].aggregates.as_trade().unwrap().trade_count, 0);
        assert_eq!(agg.open_window(StreamKind::Trade).unwrap().start_ts, 3_000);
    }

    #[test]
    fn long_gap_emits_every_window_in_order() {
        let mut agg = WindowAggregator::new("BTCUSDT", durations(1_000));
        agg.on_event(&trade(0, 1.0, Side::Buy)).unwrap();
        let closed = agg.on_event(&trade(10_000_500, 1.0, Side::Buy)).unwrap();
        assert_eq!(closed.len(), 10_000);
        assert!(closed.windows(2).all(|p| p[0].end_ts == p[1].start_ts));
        assert_eq!(closed.last().unwrap().end_ts, 10_000_000);
        assert_eq!(closed.iter().skip(1).map(|w| w.aggregates.as_trade().unwrap().trade_count).sum::<u64>(), 0);
    }

    #[test]
    fn out_of_order_is_rejected_and_window_kept() {
        let mut agg = WindowAggregator::new("BTCUSDT", durations(1_000));
        agg.on_event(&trade(2_100, 1.0, Side::Buy)).unwrap();
        let err = agg.on_event(&trade(1_900, 1.0, Side::Buy)).unwrap_err();
        assert!(matches!(err, WindowError::OutOfOrder(NormalizeError::OutOfOrder { .. })));
        assert_eq!(agg.open_window(StreamKind::Trade).unwrap().aggregates.as_trade().unwrap().trade_count, 1);
    }

    #[test]
    fn late_event_inside_open_window_is_accepted() {
        let mut agg = WindowAggregator::new("BTCUSDT", durations(1_000));
        agg.on_event(&trade(2_700, 1.0, Side::Buy)).unwrap();
        assert!(agg.on_event(&trade(2_100, 1.0, Side::Buy)).is_ok());
    }

    #[test]
    fn zero_duration_is_an_invariant_error() {
        let mut agg = WindowAggregator::new("BTCUSDT", durations(0));
        assert!(matches!(agg.on_event(&trade(1, 1.0, Side::Buy)), Err(WindowError::BadDuration { .. })));
    }

    #[test]
    fn kline_ratio_needs_range() {
        let k = KlineAgg { open: Some(10.0), high: Some(10.0), low: Some(10.0), close: Some(10.0), volume: 0.0, updates: 1 };
        assert_eq!(k.body_range_ratio(), None);
        let k = KlineAgg { open: Some(10.0), high: Some(12.0), low: Some(9.0), close: Some(11.5), volume: 0.0, updates: 1 };
        assert!((k.body_range_ratio().unwrap() - 0.5).abs() < 1e-12);
        assert_eq!(KlineAgg::default().price_change(), None);
    }
}
