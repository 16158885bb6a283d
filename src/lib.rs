// ===============================
// src/lib.rs
// ===============================
//
// Core deterministik (normalize .. positions) + runtime (engine, feed,
// recorder, posttrade). Binary ada di main.rs.
//
pub mod domain;
pub mod config;
pub mod metrics;

pub mod normalize;
pub mod window;
pub mod baseline;
pub mod promotion;
pub mod primitives;
pub mod mandate;
pub mod arbitration;
pub mod positions;
pub mod risk;
pub mod execution;
pub mod gateway; // paper executor
pub mod pipeline;
pub mod snapshot;

pub mod engine;
pub mod feed;
pub mod binance; // payload models Binance futures
pub mod recorder;
pub mod posttrade;
