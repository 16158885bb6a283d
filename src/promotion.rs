// ===============================
// src/promotion.rs
// ===============================
//
// Multi-stream coincidence rule, dievaluasi sekali per window trade yang tertutup.
// Empat kondisi, semuanya wajib (AND):
//   1) flow surge          : |net_flow| >= P90(flow)        (baseline harus warm)
//   2) large participation : max trade size >= P95(size)    (baseline harus warm)
//   3) price structure     : body/range <= compression  ATAU  >= expansion
//   4) external stress     : likuidasi dalam lookback  ATAU  |delta OI| > threshold
// PromotionEvent hanya metadata; tidak pernah dipakai balik ke evaluasi boolean.
//
use std::collections::VecDeque;

use crate::baseline::BaselineEstimator;
use crate::config::PipelineCfg;
use crate::domain::{DominantSide, PromotionEvent, StressSource};
use crate::window::{KlineAgg, Window};

const MAX_BUFFERED: usize = 100_000;

/// Trailing liquidation timestamps and open-interest observations for one symbol.
#[derive(Debug, Default)]
pub struct StressBuffer {
    liquidations: VecDeque<i64>,
    open_interest: VecDeque<(i64, f64)>,
    liquidation_seen: bool,
}

impl StressBuffer {
    pub fn new() -> Self { Self::default() }

    pub fn record_liquidation(&mut self, ts: i64) {
        self.liquidation_seen = true;
        if self.liquidations.len() == MAX_BUFFERED {
            self.liquidations.pop_front();
        }
        // per-stream ordering dijamin aggregator; insert tetap terurut
        let pos = self.liquidations.partition_point(|&t| t <= ts);
        self.liquidations.insert(pos, ts);
    }

    pub fn record_open_interest(&mut self, ts: i64, value: f64) {
        if self.open_interest.len() == MAX_BUFFERED {
            self.open_interest.pop_front();
        }
        let pos = self.open_interest.partition_point(|&(t, _)| t <= ts);
        self.open_interest.insert(pos, (ts, value));
    }

    pub fn liquidation_stream_seen(&self) -> bool { self.liquidation_seen }

    /// Liquidations with `from <= ts < to`.
    pub fn liquidations_between(&self, from: i64, to: i64) -> usize {
        self.liquidations.iter().filter(|&&t| from <= t && t < to).count()
    }

    /// Last open-interest observation strictly before `t`.
    pub fn open_interest_at(&self, t: i64) -> Option<f64> {
        let idx = self.open_interest.partition_point(|&(ts, _)| ts < t);
        if idx == 0 { None } else { Some(self.open_interest[idx - 1].1) }
    }

    pub fn open_interest_delta(&self, start: i64, end: i64) -> Option<f64> {
        Some(self.open_interest_at(end)? - self.open_interest_at(start)?)
    }

    /// Drop entries no query at or after `cutoff` can need. Keeps one OI
    /// observation before the cutoff so `open_interest_at(cutoff)` stays answerable.
    pub fn trim_before(&mut self, cutoff: i64) {
        while self.liquidations.front().is_some_and(|&t| t < cutoff) {
            self.liquidations.pop_front();
        }
        while self.open_interest.len() > 1 && self.open_interest[1].0 < cutoff {
            self.open_interest.pop_front();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PromotionCheck {
    pub flow_surge: bool,
    pub large_participation: bool,
    pub price_structure: bool,
    pub external_stress: bool,
}

impl PromotionCheck {
    pub fn promoted(&self) -> bool {
        self.flow_surge && self.large_participation && self.price_structure && self.external_stress
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PromotionOutcome {
    pub check: PromotionCheck,
    pub event: Option<PromotionEvent>,
}

pub struct PromotionEvaluator {
    flow_percentile: f64,
    size_percentile: f64,
    compression_ratio: f64,
    expansion_ratio: f64,
    liq_lookback_ms: i64,
    oi_delta_threshold: f64,
}

impl PromotionEvaluator {
    pub fn new(cfg: &PipelineCfg) -> Self {
        Self {
            flow_percentile: cfg.flow_percentile,
            size_percentile: cfg.size_percentile,
            compression_ratio: cfg.compression_ratio,
            expansion_ratio: cfg.expansion_ratio,
            liq_lookback_ms: cfg.liq_lookback_ms,
            oi_delta_threshold: cfg.oi_delta_threshold,
        }
    }

    pub fn liq_lookback_ms(&self) -> i64 { self.liq_lookback_ms }

    /// `baseline` must not yet contain `trade_window`.
    pub fn evaluate(
        &self,
        trade_window: &Window,
        kline: Option<&KlineAgg>,
        baseline: &BaselineEstimator,
        stress: &StressBuffer,
    ) -> PromotionOutcome {
        let Some(trade) = trade_window.aggregates.as_trade() else {
            return PromotionOutcome { check: PromotionCheck::default(), event: None };
        };

        let flow_surge = baseline
            .flow
            .percentile(self.flow_percentile)
            .is_some_and(|p| trade.net_flow.abs() >= p);

        let large_participation = trade.trade_count > 0
            && baseline
                .trade_size
                .percentile(self.size_percentile)
                .is_some_and(|p| trade.max_trade_size >= p);

        let price_structure = kline
            .and_then(|k| k.body_range_ratio())
            .is_some_and(|r| r <= self.compression_ratio || r >= self.expansion_ratio);

        let liq_stress = stress
            .liquidations_between(trade_window.end_ts - self.liq_lookback_ms, trade_window.end_ts)
            > 0;
        let oi_stress = stress
            .open_interest_delta(trade_window.start_ts, trade_window.end_ts)
            .is_some_and(|d| d.abs() > self.oi_delta_threshold);

        let check = PromotionCheck {
            flow_surge,
            large_participation,
            price_structure,
            external_stress: liq_stress || oi_stress,
        };

        let event = check.promoted().then(|| {
            let mut stress_sources = Vec::new();
            if liq_stress {
                stress_sources.push(StressSource::Liquidation);
            }
            if oi_stress {
                stress_sources.push(StressSource::OpenInterest);
            }
            let dominant_side = if trade.net_flow > 0.0 {
                DominantSide::Buy
            } else if trade.net_flow < 0.0 {
                DominantSide::Sell
            } else {
                DominantSide::Flat
            };
            PromotionEvent {
                symbol: trade_window.symbol.clone(),
                window_end_ts: trade_window.end_ts,
                dominant_side,
                stress_sources,
            }
        });

        PromotionOutcome { check, event }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StreamKind;
    use crate::window::{Aggregates, TradeAgg};

    fn warm_baseline(flow: f64, size: f64) -> BaselineEstimator {
        let mut b = BaselineEstimator::new(60);
        for _ in 0..60 {
            b.on_trade_window(&TradeAgg { net_flow: flow, max_trade_size: size, trade_count: 1, ..TradeAgg::default() });
        }
        b
    }

    fn trade_window(net_flow: f64, max_size: f64) -> Window {
        Window {
            symbol: "BTCUSDT".into(),
            kind: StreamKind::Trade,
            start_ts: 60_000,
            end_ts: 61_000,
            aggregates: Aggregates::Trade(TradeAgg { net_flow, max_trade_size: max_size, trade_count: 3, ..TradeAgg::default() }),
        }
    }

    fn expansion_kline() -> KlineAgg {
        KlineAgg { open: Some(100.0), high: Some(110.0), low: Some(99.0), close: Some(109.0), volume: 1.0, updates: 2 }
    }

    #[test]
    fn all_four_conditions_promote() {
        let eval = PromotionEvaluator::new(&PipelineCfg::default());
        let mut stress = StressBuffer::new();
        stress.record_liquidation(30_000);
        let out = eval.evaluate(&trade_window(-5.0, 3.0), Some(&expansion_kline()), &warm_baseline(1.0, 1.0), &stress);
        assert!(out.check.promoted());
        let ev = out.event.unwrap();
        assert_eq!(ev.dominant_side, DominantSide::Sell);
        assert_eq!(ev.stress_sources, vec![StressSource::Liquidation]);
        assert_eq!(ev.window_end_ts, 61_000);
    }

    #[test]
    fn cold_baseline_never_promotes() {
        let eval = PromotionEvaluator::new(&PipelineCfg::default());
        let mut stress = StressBuffer::new();
        stress.record_liquidation(60_500);
        let cold = BaselineEstimator::new(60);
        let out = eval.evaluate(&trade_window(100.0, 100.0), Some(&expansion_kline()), &cold, &stress);
        assert!(!out.check.flow_surge);
        assert!(!out.check.large_participation);
        assert!(out.event.is_none());
    }

    #[test]
    fn mid_body_kline_fails_price_structure() {
        let eval = PromotionEvaluator::new(&PipelineCfg::default());
        let k = KlineAgg { open: Some(100.0), high: Some(110.0), low: Some(100.0), close: Some(105.0), volume: 1.0, updates: 1 };
        let mut stress = StressBuffer::new();
        stress.record_liquidation(60_500);
        let out = eval.evaluate(&trade_window(5.0, 3.0), Some(&k), &warm_baseline(1.0, 1.0), &stress);
        assert!(out.check.flow_surge && out.check.large_participation && out.check.external_stress);
        assert!(!out.check.price_structure);
        assert!(!out.check.promoted());
    }

    #[test]
    fn liquidation_outside_lookback_is_not_stress() {
        let eval = PromotionEvaluator::new(&PipelineCfg::default());
        let mut stress = StressBuffer::new();
        stress.record_liquidation(500);
        let out = eval.evaluate(&trade_window(5.0, 3.0), Some(&expansion_kline()), &warm_baseline(1.0, 1.0), &stress);
        assert!(!out.check.external_stress);
    }

    #[test]
    fn open_interest_jump_is_stress() {
        let eval = PromotionEvaluator::new(&PipelineCfg::default());
        let mut stress = StressBuffer::new();
        stress.record_open_interest(59_000, 1_000.0);
        stress.record_open_interest(60_400, 1_080.0);
        let out = eval.evaluate(&trade_window(5.0, 3.0), Some(&expansion_kline()), &warm_baseline(1.0, 1.0), &stress);
        assert!(out.check.external_stress);
        assert_eq!(out.event.unwrap().stress_sources, vec![StressSource::OpenInterest]);
    }

    #[test]
    fn open_interest_lookup_is_strictly_before() {
        let mut stress = StressBuffer::new();
        stress.record_open_interest(100, 1.0);
        stress.record_open_interest(200, 2.0);
        assert_eq!(stress.open_interest_at(100), None);
        assert_eq!(stress.open_interest_at(200), Some(1.0));
        assert_eq!(stress.open_interest_at(201), Some(2.0));
        stress.trim_before(250);
        assert_eq!(stress.open_interest_at(300), Some(2.0));
    }
}
