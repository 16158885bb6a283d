// ===============================
// src/feed.rs
// ===============================
//
// Market Data adapters (semua menghasilkan RawEvent ke satu mpsc):
// - run_mock      : random walk deterministik per seed, keempat stream
// - run_binance   : combined WS aggTrade/forceOrder/kline_1m + poller REST open interest
// - run_replay    : file JSONL (RawEvent per baris, atau output recorder)
//
use std::time::Duration;

use futures_util::StreamExt; // for .next()
use rand::{rngs::StdRng, Rng, SeedableRng};
use thiserror::Error;
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
    time::{interval, sleep, MissedTickBehavior},
};
use tokio_tungstenite::connect_async;
use tracing::{error, info, warn};
use url::Url;

use crate::binance;
use crate::domain::{Event, EventPayload, RawEvent, Side};
use crate::metrics::WS_RECONNECTS;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("bad url {url}: {source}")]
    Url { url: String, source: url::ParseError },
}

// ---------------- mock ----------------

struct MockBook {
    symbol: String,
    price: f64,
    open_interest: f64,
    candle_start: i64,
    candle: (f64, f64, f64, f64, f64),
    next_kline_ms: i64,
    next_oi_ms: i64,
}

/// Seeded market generator. Same seed and start give the same sequence.
pub struct MockMarket {
    rng: StdRng,
    clock_ms: i64,
    books: Vec<MockBook>,
}

const MOCK_KLINE_EVERY_MS: i64 = 250;
const MOCK_OI_EVERY_MS: i64 = 1_000;
const MOCK_CANDLE_MS: i64 = 1_000;

impl MockMarket {
    pub fn new<S: AsRef<str>>(symbols: &[S], seed: u64, start_ms: i64) -> Self {
        let books = symbols
            .iter()
            .map(|s| MockBook {
                symbol: s.as_ref().to_string(),
                price: 100.0,
                open_interest: 10_000.0,
                candle_start: start_ms.div_euclid(MOCK_CANDLE_MS) * MOCK_CANDLE_MS,
                candle: (100.0, 100.0, 100.0, 100.0, 0.0),
                next_kline_ms: start_ms,
                next_oi_ms: start_ms,
            })
            .collect();
        Self { rng: StdRng::seed_from_u64(seed), clock_ms: start_ms, books }
    }

    pub fn next_event(&mut self) -> Option<RawEvent> {
        if self.books.is_empty() {
            return None;
        }
        self.clock_ms += self.rng.gen_range(1..=10);
        let now = self.clock_ms;
        let idx = self.rng.gen_range(0..self.books.len());
        let rng = &mut self.rng;
        let b = &mut self.books[idx];

        let candle_start = now.div_euclid(MOCK_CANDLE_MS) * MOCK_CANDLE_MS;
        if candle_start != b.candle_start {
            b.candle_start = candle_start;
            b.candle = (b.price, b.price, b.price, b.price, 0.0);
        }

        let payload = if now >= b.next_oi_ms {
            b.next_oi_ms = now + MOCK_OI_EVERY_MS;
            b.open_interest = (b.open_interest + rng.gen_range(-80.0..80.0)).max(0.0);
            EventPayload::OpenInterest { value: b.open_interest }
        } else if now >= b.next_kline_ms {
            b.next_kline_ms = now + MOCK_KLINE_EVERY_MS;
            let (open, high, low, close, volume) = b.candle;
            EventPayload::Kline { open, high, low, close, volume }
        } else if rng.gen_bool(0.01) {
            let side = if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };
            EventPayload::Liquidation { price: b.price, qty: rng.gen_range(0.5..5.0), side }
        } else {
            b.price = (b.price + rng.gen_range(-0.05..0.05)).max(1.0);
            let mut qty = rng.gen_range(0.001..1.0);
            if rng.gen_bool(0.02) {
                qty *= 20.0;
            }
            let aggressor = if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };
            let c = &mut b.candle;
            c.1 = c.1.max(b.price);
            c.2 = c.2.min(b.price);
            c.3 = b.price;
            c.4 += qty;
            EventPayload::Trade { price: b.price, qty, aggressor }
        };

        Some(RawEvent { symbol: b.symbol.clone(), ts_ms: now, payload })
    }
}

/// Mock feed, paced ~200 events/s.
pub async fn run_mock(tx: mpsc::Sender<RawEvent>, symbols: Vec<String>, seed: u64, start_ms: i64) {
    let mut market = MockMarket::new(symbols.as_slice(), seed, start_ms);
    while let Some(ev) = market.next_event() {
        if tx.send(ev).await.is_err() {
            break;
        }
        sleep(Duration::from_millis(5)).await;
    }
    info!("mock feed stopped");
}

// ---------------- binance ----------------

fn backoff_ms(attempt: u32) -> u64 {
    let shift = attempt.min(6); // 0..=6
    let base_ms = 500u64.saturating_mul(1u64 << shift); // 0.5s..32s
    base_ms + rand::thread_rng().gen_range(0..=250)
}

/// Combined market stream. `ws_base` mis. wss://fstream.binance.com
pub async fn run_binance(tx: mpsc::Sender<RawEvent>, symbols: Vec<String>, ws_base: String, rest_base: String) {
    tokio::spawn(poll_open_interest(tx.clone(), symbols.clone(), rest_base, Duration::from_secs(1)));

    let ws_url = format!("{}/stream?streams={}", ws_base.trim_end_matches('/'), binance::stream_names(symbols.as_slice()));
    let url = match Url::parse(&ws_url) {
        Ok(u) => u,
        Err(source) => {
            error!(error = %FeedError::Url { url: ws_url.clone(), source }, "binance feed disabled");
            return;
        }
    };

    let mut attempt: u32 = 0;
    loop {
        info!(%ws_url, "connecting binance market streams");
        match connect_async(url.clone()).await {
            Ok((mut ws, _resp)) => {
                info!(symbols = ?symbols, "connected to market streams");
                attempt = 0; // reset backoff

                while let Some(frame) = ws.next().await {
                    match frame {
                        Ok(m) if m.is_text() => {
                            let txt = match m.into_text() {
                                Ok(t) => t,
                                Err(e) => {
                                    warn!(?e, "failed to read text frame");
                                    continue;
                                }
                            };
                            match binance::parse_combined(&txt) {
                                Ok(Some(ev)) => {
                                    if tx.send(ev).await.is_err() {
                                        return;
                                    }
                                }
                                Ok(None) => {}
                                Err(e) => warn!(error = %e, "undecodable frame"),
                            }
                        }
                        Ok(_) => {} // ping/pong/binary
                        Err(e) => {
                            error!(?e, "ws read error");
                            break;
                        }
                    }
                }
                info!("market streams disconnected, will reconnect");
            }
            Err(e) => error!(?e, "connect failed"),
        }

        WS_RECONNECTS.with_label_values(&["binance"]).inc();
        attempt = attempt.saturating_add(1);
        sleep(Duration::from_millis(backoff_ms(attempt))).await;
    }
}

/// Open interest tidak ada di WS; poll REST per symbol.
pub async fn poll_open_interest(tx: mpsc::Sender<RawEvent>, symbols: Vec<String>, rest_base: String, every: Duration) {
    let client = reqwest::Client::new();
    let mut tick = interval(every);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tick.tick().await;
        for sym in &symbols {
            let url = format!("{}/fapi/v1/openInterest", rest_base.trim_end_matches('/'));
            let resp = client.get(&url).query(&[("symbol", sym.as_str())]).send().await;
            let body = match resp {
                Ok(r) => r.json::<binance::OpenInterest>().await,
                Err(e) => Err(e),
            };
            match body.map_err(|e| e.to_string()).and_then(|oi| oi.into_raw().map_err(|e| e.to_string())) {
                Ok(ev) => {
                    if tx.send(ev).await.is_err() {
                        return;
                    }
                }
                Err(e) => warn!(symbol = %sym, error = %e, "open interest poll failed"),
            }
        }
    }
}

// ---------------- replay ----------------

/// A replay line is either a bare RawEvent or a recorder `{"Raw": ...}` line.
/// Other recorder lines yield `Ok(None)`.
pub fn parse_replay_line(line: &str) -> Result<Option<RawEvent>, serde_json::Error> {
    if let Ok(raw) = serde_json::from_str::<RawEvent>(line) {
        return Ok(Some(raw));
    }
    match serde_json::from_str::<Event>(line)? {
        Event::Raw(raw) => Ok(Some(raw)),
        _ => Ok(None),
    }
}

/// Replay in file order. Returns number of events sent.
pub async fn run_replay(tx: mpsc::Sender<RawEvent>, path: String) -> Result<usize, FeedError> {
    let file = File::open(&path).await?;
    let mut lines = BufReader::new(file).lines();
    let mut sent = 0usize;
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        match parse_replay_line(&line) {
            Ok(Some(ev)) => {
                if tx.send(ev).await.is_err() {
                    break;
                }
                sent += 1;
            }
            Ok(None) => {}
            Err(e) => warn!(%path, line = line_no, error = %e, "replay: skip malformed line"),
        }
    }
    info!(%path, sent, "replay finished");
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StreamKind;
    use std::io::Write;

    #[test]
    fn mock_is_deterministic_per_seed() {
        let mut a = MockMarket::new(&["BTCUSDT", "ETHUSDT"], 7, 1_000_000);
        let mut b = MockMarket::new(&["BTCUSDT", "ETHUSDT"], 7, 1_000_000);
        for _ in 0..500 {
            assert_eq!(a.next_event(), b.next_event());
        }
    }

    #[test]
    fn mock_covers_all_kinds_in_time_order() {
        let mut m = MockMarket::new(&["BTCUSDT"], 1, 0);
        let mut last = i64::MIN;
        let mut seen = std::collections::BTreeSet::new();
        for _ in 0..5_000 {
            let ev = m.next_event().unwrap();
            assert!(ev.ts_ms >= last);
            last = ev.ts_ms;
            seen.insert(ev.kind());
        }
        assert_eq!(seen.into_iter().collect::<Vec<_>>(), StreamKind::ALL.to_vec());
    }

    #[test]
    fn replay_line_formats() {
        let raw = r#"{"symbol":"BTCUSDT","ts_ms":5,"payload":{"kind":"open_interest","value":3.0}}"#;
        assert_eq!(parse_replay_line(raw).unwrap().unwrap().ts_ms, 5);
        let rec = format!(r#"{{"Raw":{raw}}}"#);
        assert_eq!(parse_replay_line(&rec).unwrap().unwrap().ts_ms, 5);
        assert!(parse_replay_line(r#"{"Note":"hello"}"#).unwrap().is_none());
        assert!(parse_replay_line("nope").is_err());
    }

    #[tokio::test]
    async fn replay_skips_bad_lines() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, r#"{{"symbol":"BTCUSDT","ts_ms":1,"payload":{{"kind":"trade","price":1.0,"qty":1.0,"aggressor":"Buy"}}}}"#).unwrap();
        writeln!(f, "garbage").unwrap();
        writeln!(f).unwrap();
        writeln!(f, r#"{{"symbol":"BTCUSDT","ts_ms":2,"payload":{{"kind":"open_interest","value":1.0}}}}"#).unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        let sent = run_replay(tx, f.path().to_string_lossy().into_owned()).await.unwrap();
        assert_eq!(sent, 2);
        assert_eq!(rx.recv().await.unwrap().ts_ms, 1);
        assert_eq!(rx.recv().await.unwrap().ts_ms, 2);
    }
}
