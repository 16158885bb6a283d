// ===============================
// src/main.rs
// ===============================
/*
 # jalankan mock feed + rekam JSONL
 cargo run --release -- --feed mock --record data/events.jsonl

 # putar ulang rekaman (deterministik: urutan file = urutan event)
 cargo run --release -- --replay data/events.jsonl

 # konfigurasi & aktivitas
curl -s localhost:9898/metrics | egrep '^config_(feed_mode|symbol)'
curl -s localhost:9898/metrics | egrep '^(decisions_total|promotions_total|position_state)'
*/
/*
=============================================================================
Project : mandate_bot_rust — deterministic observation-to-decision engine
Module  : main.rs
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
use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tokio::{
    select,
    sync::mpsc,
    time::{interval, Duration, MissedTickBehavior},
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use mandate_bot_rust::config::{self, Cli, FeedMode};
use mandate_bot_rust::domain::{Event, ExecutionResult, RawEvent};
use mandate_bot_rust::engine::{self, Runtime, Sinks};
use mandate_bot_rust::execution::Executor;
use mandate_bot_rust::gateway::PaperExecutor;
use mandate_bot_rust::snapshot::SnapshotQuery;
use mandate_bot_rust::{feed, metrics, posttrade, recorder};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ---- Logging (RUST_LOG override, default info) ----
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ---- Load config & limits ----
    let cli = Cli::parse();
    let (args, limits) = config::load(&cli).context("loading configuration")?;

    // ---- Metrics ----
    metrics::init();
    metrics::serve_metrics(args.metrics_port);

    info!(
        feed_mode = args.feed_mode.label(),
        symbols = ?args.symbols,
        windows = ?args.pipeline.windows,
        baseline = args.pipeline.baseline_capacity,
        max_order = limits.max_order_size,
        max_position = limits.max_position_size,
        binance_ws = %args.binance_ws_url,
        binance_rest = %args.binance_rest_url,
        "startup config"
    );
    metrics::CONFIG_FEED_MODE.with_label_values(&[args.feed_mode.label()]).set(1);
    for s in &args.symbols {
        metrics::CONFIG_SYMBOL.with_label_values(&[s]).set(1);
    }

    // ---- Recorder (optional) ----
    let (rec_tx, rec_rx) = mpsc::channel::<Event>(8192);
    let recorder_task = match args.record_file.clone() {
        Some(path) => Some(tokio::spawn(recorder::run(rec_rx, path))),
        None => {
            drop(rec_rx);
            None
        }
    };
    let _ = rec_tx.try_send(Event::Note(format!("start feed={} symbols={:?}", args.feed_mode.label(), args.symbols)));

    // ---- Post-Trade ----
    let (exec_tx, exec_rx) = mpsc::channel::<ExecutionResult>(4096);
    let posttrade_task = tokio::spawn(posttrade::run(exec_rx));

    // ---- Symbol workers ----
    let Runtime { dispatcher, board, clock, workers } = engine::spawn(
        &args.pipeline,
        limits,
        args.channel_capacity,
        Sinks { record: rec_tx, exec: exec_tx },
        |_| -> Box<dyn Executor> { Box::new(PaperExecutor::new("paper")) },
    );

    // ---- FEED (Market Data) ----
    let (feed_tx, feed_rx) = mpsc::channel::<RawEvent>(args.channel_capacity.max(1));
    let symbols = args.symbols.clone();
    match args.feed_mode.clone() {
        FeedMode::Mock => {
            tokio::spawn(feed::run_mock(feed_tx, symbols, args.mock_seed, Utc::now().timestamp_millis()));
        }
        FeedMode::Binance => {
            tokio::spawn(feed::run_binance(feed_tx, symbols, args.binance_ws_url.clone(), args.binance_rest_url.clone()));
        }
        FeedMode::Replay(path) => {
            tokio::spawn(async move {
                if let Err(e) = feed::run_replay(feed_tx, path.clone()).await {
                    error!(%path, error = %e, "replay failed");
                }
            });
        }
    }
    let mut dispatch = tokio::spawn(dispatcher.run(feed_rx));

    // ---- Heartbeat + liveness tick ----
    let query = SnapshotQuery::latest(args.symbols.as_slice());
    let mut hb = interval(Duration::from_secs(1));
    hb.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let drained = loop {
        select! {
            _ = hb.tick() => {
                engine::liveness_tick(&board, &clock, Utc::now().timestamp_millis(), args.stale_after_ms);
                match board.query(&query) {
                    Ok(snap) => info!(status = ?snap.status, ts = ?snap.timestamp, active = ?snap.symbols_active, "heartbeat"),
                    Err(e) => warn!(error = %e, "snapshot query failed"),
                }
            }
            _ = &mut dispatch => break true,
            _ = &mut shutdown => {
                info!("ctrl-c, shutting down");
                break false;
            }
        }
    };

    if drained {
        // feed habis (replay): tunggu worker, recorder & posttrade menutup
        for w in workers {
            let _ = w.await;
        }
        if let Some(t) = recorder_task {
            let _ = t.await;
        }
        let _ = posttrade_task.await;
    }

    for sym in board.symbols() {
        if let Some(v) = board.view(sym) {
            info!(
                symbol = %v.symbol,
                status = ?v.status,
                cycles = v.cycle,
                events = v.events,
                rejected = v.normalize_errors,
                position = v.position.label(),
                "final state"
            );
        }
    }
    Ok(())
}
