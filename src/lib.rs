//! ARBSCAN: CEX/DEX arbitrage scanner
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod chain;
pub mod config;
pub mod dex;
pub mod engine;
pub mod exchanges;
pub mod market_data;
pub mod notify;
pub mod pnl;
pub mod rate_limit;
pub mod storage;
pub mod types;
