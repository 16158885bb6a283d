// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use tracing::{error, info, warn};

// Single custom registry (semua metric didaftarkan di sini)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

fn counter_vec(name: &str, help: &str, labels: &[&str]) -> IntCounterVec {
    IntCounterVec::new(Opts::new(name, help), labels).unwrap()
}

fn gauge_vec(name: &str, help: &str, labels: &[&str]) -> IntGaugeVec {
    IntGaugeVec::new(Opts::new(name, help), labels).unwrap()
}

// -------- Ingest --------
pub static EVENTS_BY: Lazy<IntCounterVec> =
    Lazy::new(|| counter_vec("events_total_by", "accepted events (labels: symbol, kind)", &["symbol", "kind"]));

pub static NORMALIZE_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    counter_vec("normalize_errors_total", "rejected events (labels: symbol, reason)", &["symbol", "reason"])
});

pub static DISPATCH_DROPPED: Lazy<IntCounterVec> = Lazy::new(|| {
    counter_vec("dispatch_dropped_total", "events without a symbol worker", &["symbol"])
});

// -------- Windows / promotion --------
pub static WINDOWS_CLOSED: Lazy<IntCounterVec> =
    Lazy::new(|| counter_vec("windows_closed_total", "closed windows (labels: symbol, kind)", &["symbol", "kind"]));

pub static PROMOTIONS: Lazy<IntCounterVec> =
    Lazy::new(|| counter_vec("promotions_total", "promoted windows", &["symbol"]));

pub static BASELINE_WARM: Lazy<IntGaugeVec> =
    Lazy::new(|| gauge_vec("baseline_warm", "1 once the rolling baseline is full", &["symbol"]));

// -------- Decisions / execution --------
pub static DECISIONS: Lazy<IntCounterVec> =
    Lazy::new(|| counter_vec("decisions_total", "arbitration outcomes (labels: symbol, decision)", &["symbol", "decision"]));

pub static SUBMISSIONS: Lazy<IntCounterVec> =
    Lazy::new(|| counter_vec("submissions_total", "actions sent to a venue", &["outcome", "venue"]));

pub static EXEC_RESULTS: Lazy<IntCounterVec> =
    Lazy::new(|| counter_vec("exec_results_total", "execution results (labels: symbol, status)", &["symbol", "status"]));

pub static POSITION_STATE: Lazy<IntGaugeVec> =
    Lazy::new(|| gauge_vec("position_state", "1 for the current lifecycle state", &["symbol", "state"]));

// Latency event diterima -> cycle selesai (ms)
pub static CYCLE_LATENCY: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(HistogramOpts::new("cycle_latency_ms", "Latency from event receipt to cycle output (ms)"))
        .unwrap()
});

// -------- Health --------
pub static SYMBOL_FAILED: Lazy<IntGaugeVec> =
    Lazy::new(|| gauge_vec("symbol_failed", "1 if the symbol pipeline halted", &["symbol"]));

pub static DATA_AGE_MS: Lazy<IntGaugeVec> =
    Lazy::new(|| gauge_vec("data_age_ms", "wall-clock age of the last dispatched event", &["symbol"]));

pub static WS_RECONNECTS: Lazy<IntCounterVec> =
    Lazy::new(|| counter_vec("ws_reconnects_total", "market stream reconnects", &["venue"]));

// ---- Config visibility ----
pub static CONFIG_FEED_MODE: Lazy<IntGaugeVec> =
    Lazy::new(|| gauge_vec("config_feed_mode", "feed mode (label: mode)", &["mode"]));

pub static CONFIG_SYMBOL: Lazy<IntGaugeVec> =
    Lazy::new(|| gauge_vec("config_symbol", "configured symbols (label: symbol)", &["symbol"]));

pub fn init() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(EVENTS_BY.clone()),
        Box::new(NORMALIZE_ERRORS.clone()),
        Box::new(DISPATCH_DROPPED.clone()),
        Box::new(WINDOWS_CLOSED.clone()),
        Box::new(PROMOTIONS.clone()),
        Box::new(BASELINE_WARM.clone()),
        Box::new(DECISIONS.clone()),
        Box::new(SUBMISSIONS.clone()),
        Box::new(EXEC_RESULTS.clone()),
        Box::new(POSITION_STATE.clone()),
        Box::new(CYCLE_LATENCY.clone()),
        Box::new(SYMBOL_FAILED.clone()),
        Box::new(DATA_AGE_MS.clone()),
        Box::new(WS_RECONNECTS.clone()),
        Box::new(CONFIG_FEED_MODE.clone()),
        Box::new(CONFIG_SYMBOL.clone()),
    ];
    for c in collectors {
        // AlreadyReg kalau init() dipanggil dua kali; aman diabaikan
        if let Err(e) = REGISTRY.register(c) {
            warn!(error = %e, "metric registration skipped");
        }
    }
}

// Encode all metrics in Prometheus text format
pub fn encode_metrics() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}

// Serve one HTTP request (GET / or /metrics), tanpa parsing header
fn handle_client(mut stream: TcpStream) {
    let mut req_buf = [0u8; 1024];
    let _ = stream.read(&mut req_buf);

    let body = encode_metrics();
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );

    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(&body);
    let _ = stream.flush();
}

// Metrics server di OS thread sendiri (runtime Tokio tetap bersih)
pub fn serve_metrics(port: u16) {
    thread::spawn(move || {
        let addr = format!("0.0.0.0:{port}");
        let listener = match TcpListener::bind(&addr) {
            Ok(l) => l,
            Err(e) => {
                error!(%addr, error = %e, "metrics bind failed");
                return;
            }
        };
        info!("metrics listening on http://{addr}/ (and /metrics)");

        for conn in listener.incoming() {
            match conn {
                Ok(stream) => handle_client(stream),
                Err(e) => warn!(error = %e, "metrics accept error"),
            }
        }
    });
}
