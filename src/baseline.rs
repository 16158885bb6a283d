// ===============================
// src/baseline.rs
// ===============================
//
// Rolling history of closed-window statistics (ring buffer, kapasitas tetap N).
// Percentile: linear interpolation between closest ranks over the sorted
// contents, h = p * (n - 1) (0-based). Untuk isi 1..=60: P90 = 54.1, P95 = 57.05.
//
use std::collections::VecDeque;

use crate::window::TradeAgg;

pub struct BaselineSeries {
    values: VecDeque<f64>,
    cap: usize,
}

impl BaselineSeries {
    pub fn new(cap: usize) -> Self {
        Self { values: VecDeque::with_capacity(cap), cap }
    }

    /// Append, evicting the oldest entry when at capacity.
    pub fn push(&mut self, v: f64) {
        if self.values.len() == self.cap {
            self.values.pop_front();
        }
        self.values.push_back(v);
    }

    pub fn len(&self) -> usize { self.values.len() }
    pub fn is_empty(&self) -> bool { self.values.is_empty() }
    pub fn capacity(&self) -> usize { self.cap }

    /// Pure function of entry count.
    pub fn is_warm(&self) -> bool { self.values.len() >= self.cap }

    pub fn iter(&self) -> impl Iterator<Item = &f64> { self.values.iter() }

    /// None until warm.
    pub fn percentile(&self, p: f64) -> Option<f64> {
        if !self.is_warm() {
            return None;
        }
        interpolate(&self.values, p)
    }

    pub fn p90(&self) -> Option<f64> { self.percentile(0.90) }
    pub fn p95(&self) -> Option<f64> { self.percentile(0.95) }
}

fn interpolate(values: &VecDeque<f64>, p: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=1.0).contains(&p) {
        return None;
    }
    let mut sorted: Vec<f64> = values.iter().copied().collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let h = p * (sorted.len() - 1) as f64;
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    Some(sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo]))
}

/// Per-symbol baselines fed by closed primary (trade) windows.
pub struct BaselineEstimator {
    pub flow: BaselineSeries,
    pub trade_size: BaselineSeries,
}

impl BaselineEstimator {
    pub fn new(cap: usize) -> Self {
        Self { flow: BaselineSeries::new(cap), trade_size: BaselineSeries::new(cap) }
    }

    pub fn on_trade_window(&mut self, agg: &TradeAgg) {
        self.flow.push(agg.net_flow.abs());
        self.trade_size.push(agg.max_trade_size);
    }

    pub fn is_warm(&self) -> bool { self.flow.is_warm() && self.trade_size.is_warm() }
}
