// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : mandate_bot_rust — deterministic observation-to-decision engine
Module  : config.rs
Version : 0.6.0
Author  : Kukuh Tripamungkas Wicaksono (Kukuh TW)
Email   : kukuhtw@gmail.com
WhatsApp: https://wa.me/628129893706
LinkedIn: https://id.linkedin.com/in/kukuhtw
License : MIT (see LICENSE)

Summary : Streams per-symbol market events (mock/Binance/replay), buckets
          them into fixed windows, compares against rolling percentile
          baselines, emits mandates, arbitrates one action per cycle,
          tracks position lifecycle, exposes Prometheus metrics, and
          records JSONL events.

(c) 2025 Kukuh TW. All rights reserved where applicable.
=============================================================================
*/
use std::env;
use std::str::FromStr;

use clap::Parser;
use dotenvy::dotenv;
use thiserror::Error;

use crate::domain::StreamKind;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Parse { key: &'static str, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// CLI flags; semua parameter lain dibaca dari ENV (.env).
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "mandate_bot_rust", about = "Deterministic per-symbol market observation and mandate engine")]
pub struct Cli {
    /// Feed source: mock | binance | replay
    #[arg(long)]
    pub feed: Option<String>,
    /// JSONL file of recorded raw events (implies --feed replay)
    #[arg(long)]
    pub replay: Option<String>,
    /// JSONL output for raw events, promotions, decisions and execution results
    #[arg(long)]
    pub record: Option<String>,
    /// Comma separated symbol allowlist (overrides SYMBOLS)
    #[arg(long)]
    pub symbols: Option<String>,
}

/// Sumber market data
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FeedMode {
    Mock,
    Binance,
    Replay(String),
}

impl FeedMode {
    fn parse(s: &str, replay: Option<String>) -> Result<FeedMode, ConfigError> {
        if let Some(path) = replay {
            return Ok(FeedMode::Replay(path));
        }
        match s.trim().to_ascii_lowercase().as_str() {
            "mock" | "" => Ok(FeedMode::Mock),
            "binance" => Ok(FeedMode::Binance),
            "replay" => Err(ConfigError::Invalid("replay feed requires --replay <file> or REPLAY_FILE".into())),
            other => Err(ConfigError::Parse { key: "FEED_MODE", value: other.to_string() }),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FeedMode::Mock => "mock",
            FeedMode::Binance => "binance",
            FeedMode::Replay(_) => "replay",
        }
    }
}

/// Fixed window duration per stream kind (milliseconds).
#[derive(Clone, Debug, PartialEq)]
pub struct WindowDurations {
    pub trade: i64,
    pub liquidation: i64,
    pub kline: i64,
    pub open_interest: i64,
}

impl WindowDurations {
    pub fn for_kind(&self, kind: StreamKind) -> i64 {
        match kind {
            StreamKind::Trade => self.trade,
            StreamKind::Liquidation => self.liquidation,
            StreamKind::Kline => self.kline,
            StreamKind::OpenInterest => self.open_interest,
        }
    }
}

/// Static parameters of the per-symbol core. Changing any of these is a reviewed change.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineCfg {
    pub allowlist: Vec<String>,
    pub windows: WindowDurations,
    pub baseline_capacity: usize,
    pub flow_percentile: f64,
    pub size_percentile: f64,
    pub compression_ratio: f64,
    pub expansion_ratio: f64,
    pub liq_lookback_ms: i64,
    pub oi_delta_threshold: f64,
    pub exit_liquidation_count: u32,
    pub base_order_size: f64,
    pub reduce_fraction: f64,
}

impl Default for PipelineCfg {
    fn default() -> Self {
        Self {
            allowlist: vec!["BTCUSDT".to_string()],
            windows: WindowDurations { trade: 1_000, liquidation: 1_000, kline: 1_000, open_interest: 1_000 },
            baseline_capacity: 60,
            flow_percentile: 0.90,
            size_percentile: 0.95,
            compression_ratio: 0.25,
            expansion_ratio: 0.75,
            liq_lookback_ms: 60_000,
            oi_delta_threshold: 50.0,
            exit_liquidation_count: 3,
            base_order_size: 1.0,
            reduce_fraction: 0.5,
        }
    }
}

impl PipelineCfg {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.allowlist.is_empty() {
            return Err(ConfigError::Invalid("symbol allowlist is empty".into()));
        }
        for kind in StreamKind::ALL {
            if self.windows.for_kind(kind) <= 0 {
                return Err(ConfigError::Invalid(format!("window duration for {} must be positive", kind.label())));
            }
        }
        if self.baseline_capacity == 0 {
            return Err(ConfigError::Invalid("baseline capacity must be positive".into()));
        }
        for (name, p) in [("flow percentile", self.flow_percentile), ("size percentile", self.size_percentile)] {
            if !(p > 0.0 && p < 1.0) {
                return Err(ConfigError::Invalid(format!("{name} must lie in (0, 1), got {p}")));
            }
        }
        if !(0.0 <= self.compression_ratio && self.compression_ratio < self.expansion_ratio && self.expansion_ratio <= 1.0) {
            return Err(ConfigError::Invalid("require 0 <= compression ratio < expansion ratio <= 1".into()));
        }
        if self.liq_lookback_ms <= 0 {
            return Err(ConfigError::Invalid("liquidation lookback must be positive".into()));
        }
        if !(self.oi_delta_threshold >= 0.0) {
            return Err(ConfigError::Invalid("open interest delta threshold must be non-negative".into()));
        }
        if self.exit_liquidation_count == 0 {
            return Err(ConfigError::Invalid("exit liquidation count must be at least 1".into()));
        }
        if !(self.base_order_size > 0.0) {
            return Err(ConfigError::Invalid("base order size must be positive".into()));
        }
        if !(self.reduce_fraction > 0.0 && self.reduce_fraction <= 1.0) {
            return Err(ConfigError::Invalid("reduce fraction must lie in (0, 1]".into()));
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct Args {
    pub symbols: Vec<String>,

    // files/metrics
    pub record_file: Option<String>,
    pub metrics_port: u16,

    // runtime
    pub feed_mode: FeedMode,
    pub binance_ws_url: String,
    pub binance_rest_url: String,
    pub channel_capacity: usize,
    pub stale_after_ms: i64,
    pub mock_seed: u64,

    pub pipeline: PipelineCfg,
}

/// Batas risiko eksternal: ukuran hanya boleh dipotong, tidak pernah diperbesar.
#[derive(Clone, Debug, PartialEq)]
pub struct Limits {
    pub max_order_size: f64,
    pub max_position_size: f64,
}

impl Default for Limits {
    fn default() -> Self {
        Self { max_order_size: 5.0, max_position_size: 10.0 }
    }
}

fn env_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Parse { key, value: v }),
        _ => Ok(default),
    }
}

fn parse_symbols(s: &str) -> Vec<String> {
    let mut out: Vec<String> = s
        .split(',')
        .map(|x| x.trim())
        .filter(|x| !x.is_empty())
        .map(|x| x.to_ascii_uppercase())
        .collect();
    out.sort();
    out.dedup();
    out
}

pub fn load(cli: &Cli) -> Result<(Args, Limits), ConfigError> {
    // Pastikan .env dibaca (agar RECORD_FILE, SYMBOLS, dll ter-load)
    let _ = dotenv();

    // Multi-symbol: SYMBOLS=BTCUSDT,ETHUSDT,SOLUSDT
    let symbols = match &cli.symbols {
        Some(s) => parse_symbols(s),
        None => parse_symbols(&env::var("SYMBOLS").unwrap_or_else(|_| "BTCUSDT".to_string())),
    };

    let record_file = cli.record.clone().or_else(|| env::var("RECORD_FILE").ok());
    let metrics_port = env_or("METRICS_PORT", 9898u16)?;

    let feed_raw = cli.feed.clone().unwrap_or_else(|| env::var("FEED_MODE").unwrap_or_default());
    let replay = cli.replay.clone().or_else(|| env::var("REPLAY_FILE").ok());
    let feed_mode = FeedMode::parse(&feed_raw, replay)?;

    let binance_ws_url = env::var("BINANCE_WS_URL").unwrap_or_else(|_| "wss://fstream.binance.com".to_string());
    let binance_rest_url = env::var("BINANCE_REST_URL").unwrap_or_else(|_| "https://fapi.binance.com".to_string());

    let d = PipelineCfg::default();
    let pipeline = PipelineCfg {
        allowlist: symbols.clone(),
        windows: WindowDurations {
            trade: env_or("WINDOW_MS_TRADE", d.windows.trade)?,
            liquidation: env_or("WINDOW_MS_LIQUIDATION", d.windows.liquidation)?,
            kline: env_or("WINDOW_MS_KLINE", d.windows.kline)?,
            open_interest: env_or("WINDOW_MS_OPEN_INTEREST", d.windows.open_interest)?,
        },
        baseline_capacity: env_or("BASELINE_CAPACITY", d.baseline_capacity)?,
        flow_percentile: env_or("FLOW_PERCENTILE", d.flow_percentile)?,
        size_percentile: env_or("SIZE_PERCENTILE", d.size_percentile)?,
        compression_ratio: env_or("COMPRESSION_RATIO", d.compression_ratio)?,
        expansion_ratio: env_or("EXPANSION_RATIO", d.expansion_ratio)?,
        liq_lookback_ms: env_or("LIQ_LOOKBACK_MS", d.liq_lookback_ms)?,
        oi_delta_threshold: env_or("OI_DELTA_THRESHOLD", d.oi_delta_threshold)?,
        exit_liquidation_count: env_or("EXIT_LIQUIDATION_COUNT", d.exit_liquidation_count)?,
        base_order_size: env_or("BASE_ORDER_SIZE", d.base_order_size)?,
        reduce_fraction: env_or("REDUCE_FRACTION", d.reduce_fraction)?,
    };
    pipeline.validate()?;

    let args = Args {
        symbols,
        record_file,
        metrics_port,
        feed_mode,
        binance_ws_url,
        binance_rest_url,
        channel_capacity: env_or("CHANNEL_CAPACITY", 4096usize)?,
        stale_after_ms: env_or("STALE_AFTER_MS", 5_000i64)?,
        mock_seed: env_or("MOCK_SEED", 7u64)?,
        pipeline,
    };

    // ===== Limits =====
    let dl = Limits::default();
    let limits = Limits {
        max_order_size: env_or("MAX_ORDER_SIZE", dl.max_order_size)?,
        max_position_size: env_or("MAX_POSITION_SIZE", dl.max_position_size)?,
    };
    if !(limits.max_order_size > 0.0 && limits.max_position_size > 0.0) {
        return Err(ConfigError::Invalid("risk limits must be positive".into()));
    }
    Ok((args, limits))
}
