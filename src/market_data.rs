//! Realtime market data (gas prices, fiat rate) consumed once per scan.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Gas conditions on one chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GasQuote {
    pub gas_price_gwei: f64,
    /// USD price of the chain's native coin.
    pub native_price_usd: f64,
}

impl GasQuote {
    /// USD cost of spending `gas_units` at this price.
    pub fn cost_usd(&self, gas_units: u64) -> f64 {
        self.gas_price_gwei * 1e-9 * gas_units as f64 * self.native_price_usd
    }
}

/// Snapshot taken at scan start.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RealtimeData {
    /// Keyed by chain key.
    pub gas: HashMap<String, GasQuote>,
    /// Local fiat units per USD, used for display only.
    pub rate: f64,
}

#[async_trait]
pub trait RealtimeMarketDataProvider: Send + Sync {
    /// Data for exactly the listed chains.
    async fn get_all_realtime_data(&self, chain_keys: &[String]) -> Result<RealtimeData>;
}

/// Provider serving fixed values from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticMarketData {
    gas: HashMap<String, GasQuote>,
    rate: f64,
}

impl StaticMarketData {
    pub fn new(gas: HashMap<String, GasQuote>, rate: f64) -> Self {
        Self { gas, rate }
    }
}

#[async_trait]
impl RealtimeMarketDataProvider for StaticMarketData {
    async fn get_all_realtime_data(&self, chain_keys: &[String]) -> Result<RealtimeData> {
        if !(self.rate.is_finite() && self.rate > 0.0) {
            anyhow::bail!("Fiat rate is not configured");
        }
        let gas = chain_keys
            .iter()
            .filter_map(|key| {
                let quote = self.gas.get(key).copied();
                if quote.is_none() {
                    debug!(chain = %key, "No gas defaults for chain");
                }
                quote.map(|q| (key.clone(), q))
            })
            .collect();
        Ok(RealtimeData {
            gas,
            rate: self.rate,
        })
    }
}
