// ===============================
// src/binance.rs
// ===============================
//
// Model payload Binance USD-M futures (read-only market data):
//   combined WS  : {"stream": "<sym>@aggTrade|forceOrder|kline_1m", "data": {...}}
//   REST OI      : GET /fapi/v1/openInterest?symbol=BTCUSDT
// Angka Binance dikirim sebagai string; parse di sini, validasi di normalizer.
//
use serde::Deserialize;
use thiserror::Error;

use crate::domain::{EventPayload, RawEvent, Side};

#[derive(Debug, Error)]
pub enum BinanceError {
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("field {field} is not a number: {value:?}")]
    Number { field: &'static str, value: String },
    #[error("unknown side {0:?}")]
    Side(String),
}

fn num(field: &'static str, value: &str) -> Result<f64, BinanceError> {
    value.parse::<f64>().map_err(|_| BinanceError::Number { field, value: value.to_string() })
}

#[derive(Debug, Deserialize)]
pub struct Combined {
    pub stream: String,
    pub data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct AggTrade {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "p")]
    pub price: String,
    #[serde(rename = "q")]
    pub qty: String,
    #[serde(rename = "T")]
    pub trade_time: i64,
    /// buyer is maker -> agresornya seller
    #[serde(rename = "m")]
    pub buyer_is_maker: bool,
}

#[derive(Debug, Deserialize)]
pub struct ForceOrder {
    #[serde(rename = "o")]
    pub order: ForceOrderBody,
}

#[derive(Debug, Deserialize)]
pub struct ForceOrderBody {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "S")]
    pub side: String,
    #[serde(rename = "ap")]
    pub avg_price: String,
    #[serde(rename = "z")]
    pub filled_qty: String,
    #[serde(rename = "T")]
    pub trade_time: i64,
}

#[derive(Debug, Deserialize)]
pub struct KlineEnvelope {
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "k")]
    pub kline: KlineBody,
}

#[derive(Debug, Deserialize)]
pub struct KlineBody {
    #[serde(rename = "o")]
    pub open: String,
    #[serde(rename = "h")]
    pub high: String,
    #[serde(rename = "l")]
    pub low: String,
    #[serde(rename = "c")]
    pub close: String,
    #[serde(rename = "v")]
    pub volume: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInterest {
    pub symbol: String,
    pub open_interest: String,
    pub time: i64,
}

impl AggTrade {
    pub fn into_raw(self) -> Result<RawEvent, BinanceError> {
        let aggressor = if self.buyer_is_maker { Side::Sell } else { Side::Buy };
        Ok(RawEvent {
            symbol: self.symbol,
            ts_ms: self.trade_time,
            payload: EventPayload::Trade { price: num("p", &self.price)?, qty: num("q", &self.qty)?, aggressor },
        })
    }
}

impl ForceOrder {
    pub fn into_raw(self) -> Result<RawEvent, BinanceError> {
        let o = self.order;
        let side = match o.side.as_str() {
            "BUY" => Side::Buy,
            "SELL" => Side::Sell,
            _ => return Err(BinanceError::Side(o.side)),
        };
        Ok(RawEvent {
            symbol: o.symbol,
            ts_ms: o.trade_time,
            payload: EventPayload::Liquidation { price: num("ap", &o.avg_price)?, qty: num("z", &o.filled_qty)?, side },
        })
    }
}

impl KlineEnvelope {
    pub fn into_raw(self) -> Result<RawEvent, BinanceError> {
        let k = self.kline;
        Ok(RawEvent {
            symbol: self.symbol,
            ts_ms: self.event_time,
            payload: EventPayload::Kline {
                open: num("o", &k.open)?,
                high: num("h", &k.high)?,
                low: num("l", &k.low)?,
                close: num("c", &k.close)?,
                volume: num("v", &k.volume)?,
            },
        })
    }
}

impl OpenInterest {
    pub fn into_raw(self) -> Result<RawEvent, BinanceError> {
        Ok(RawEvent {
            symbol: self.symbol,
            ts_ms: self.time,
            payload: EventPayload::OpenInterest { value: num("openInterest", &self.open_interest)? },
        })
    }
}

/// Decode one combined-stream frame. Unknown streams yield `Ok(None)`.
pub fn parse_combined(txt: &str) -> Result<Option<RawEvent>, BinanceError> {
    let frame: Combined = serde_json::from_str(txt)?;
    let kind = frame.stream.rsplit('@').next().unwrap_or_default();
    let raw = match kind {
        "aggTrade" => serde_json::from_value::<AggTrade>(frame.data)?.into_raw()?,
        "forceOrder" => serde_json::from_value::<ForceOrder>(frame.data)?.into_raw()?,
        k if k.starts_with("kline_") => serde_json::from_value::<KlineEnvelope>(frame.data)?.into_raw()?,
        _ => return Ok(None),
    };
    Ok(Some(raw))
}

/// Combined stream path for a set of symbols.
pub fn stream_names<S: AsRef<str>>(symbols: &[S]) -> String {
    symbols
        .iter()
        .flat_map(|s| {
            let s = s.as_ref().to_lowercase();
            [format!("{s}@aggTrade"), format!("{s}@forceOrder"), format!("{s}@kline_1m")]
        })
        .collect::<Vec<_>>()
        .join("/")
}
