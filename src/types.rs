//! Shared types for the ARBSCAN scanner.
//!
//! These types form the data model used across all modules. Exchange
//! adapters produce them, the engine consumes them, and the external
//! collaborators (DEX quotes, PnL, notifications) speak in them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Quote/settlement asset every CEX leg is priced against.
pub const SETTLEMENT_ASSET: &str = "USDT";

// ---------------------------------------------------------------------------
// Exchange
// ---------------------------------------------------------------------------

/// Centralized exchanges with a data adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Exchange {
    Binance,
    Mexc,
    Gate,
    Kucoin,
    Bitget,
    Bybit,
    Indodax,
}

impl Exchange {
    pub const ALL: &'static [Exchange] = &[
        Exchange::Binance,
        Exchange::Mexc,
        Exchange::Gate,
        Exchange::Kucoin,
        Exchange::Bitget,
        Exchange::Bybit,
        Exchange::Indodax,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Exchange::Binance => "binance",
            Exchange::Mexc => "mexc",
            Exchange::Gate => "gate",
            Exchange::Kucoin => "kucoin",
            Exchange::Bitget => "bitget",
            Exchange::Bybit => "bybit",
            Exchange::Indodax => "indodax",
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl std::str::FromStr for Exchange {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "binance" => Ok(Exchange::Binance),
            "mexc" => Ok(Exchange::Mexc),
            "gate" | "gateio" | "gate.io" => Ok(Exchange::Gate),
            "kucoin" => Ok(Exchange::Kucoin),
            "bitget" => Ok(Exchange::Bitget),
            "bybit" => Ok(Exchange::Bybit),
            "indodax" => Ok(Exchange::Indodax),
            _ => Err(ScanError::UnknownExchange(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Gateway records
// ---------------------------------------------------------------------------

/// One deposit/withdraw network of one coin on one exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinNetworkRecord {
    pub exchange: Exchange,
    /// Vendor network string as returned by the adapter; rewritten to the
    /// chain key once the gateway has alias-matched it.
    pub chain: String,
    pub base_ticker: String,
    pub contract_address: String,
    pub deposit_enabled: bool,
    pub withdraw_enabled: bool,
    pub withdrawal_fee: f64,
}

/// Top of book for one market.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderbookSnapshot {
    pub best_bid: f64,
    pub best_ask: f64,
}

/// CEX legs gathered for one token.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CexPrices {
    pub exchange: Option<Exchange>,
    pub base: Option<OrderbookSnapshot>,
    pub pair: Option<OrderbookSnapshot>,
}

impl CexPrices {
    pub fn is_empty(&self) -> bool {
        self.base.is_none() && self.pair.is_none()
    }
}

// ---------------------------------------------------------------------------
// Scanner input
// ---------------------------------------------------------------------------

/// Per-DEX settings stored on a tracked token.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DexSetting {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub modal_left: f64,
    #[serde(default)]
    pub modal_right: f64,
}

/// Deposit/withdraw/trade flags a user recorded for a token on one CEX.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CexStatusFlags {
    #[serde(default = "yes")]
    pub deposit: bool,
    #[serde(default = "yes")]
    pub withdraw: bool,
    #[serde(default = "yes")]
    pub trade: bool,
}

fn yes() -> bool {
    true
}

/// A token/pair combination the scanner watches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedPairToken {
    pub id: String,
    pub chain: String,
    /// Exchange key, e.g. "binance". Unknown keys are treated as absent.
    #[serde(default)]
    pub primary_cex: Option<String>,
    pub base_ticker: String,
    pub pair_ticker: String,
    #[serde(default)]
    pub base_contract: Option<String>,
    #[serde(default)]
    pub base_decimals: Option<u8>,
    #[serde(default)]
    pub pair_contract: Option<String>,
    #[serde(default)]
    pub pair_decimals: Option<u8>,
    #[serde(default)]
    pub per_dex: BTreeMap<String, DexSetting>,
    #[serde(default)]
    pub cex_status: HashMap<String, CexStatusFlags>,
}

impl TrackedPairToken {
    /// The primary exchange, if configured and known.
    pub fn primary_exchange(&self) -> Option<Exchange> {
        self.primary_cex
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .and_then(|s| s.parse().ok())
    }

    /// DEX keys enabled on this token and active in `filter`, in key order.
    pub fn active_dexes(&self, filter: &ScanFilter) -> Vec<String> {
        self.per_dex
            .iter()
            .filter(|(key, setting)| setting.enabled && filter.is_active(key))
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn label(&self) -> String {
        format!("{}/{}", self.base_ticker, self.pair_ticker)
    }

    /// Normalized chain key used for gas, fee and realtime lookups.
    pub fn chain_key(&self) -> String {
        self.chain.trim().to_lowercase()
    }
}

/// Which DEXes the current scan may call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanFilter {
    #[serde(default)]
    pub dex: HashMap<String, bool>,
}

impl ScanFilter {
    pub fn is_active(&self, dex_key: &str) -> bool {
        self.dex.get(dex_key).copied().unwrap_or(false)
    }
}

/// Per-run scan settings. Immutable for the duration of one scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSettings {
    pub batch_size: usize,
    pub notional_usd: f64,
    pub min_absolute_profit: f64,
    pub auto_notify: bool,
    pub settlement_asset: String,
    pub bot_name: String,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            batch_size: 5,
            notional_usd: 100.0,
            min_absolute_profit: 1.0,
            auto_notify: false,
            settlement_asset: SETTLEMENT_ASSET.to_string(),
            bot_name: "ARBSCAN".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// DEX / PnL
// ---------------------------------------------------------------------------

/// Swap direction of an arbitrage leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Buy the token on the CEX, swap token → pair on the DEX.
    TokenToPair,
    /// Buy the pair on the CEX, swap pair → token on the DEX.
    PairToToken,
}

impl Direction {
    pub const BOTH: [Direction; 2] = [Direction::TokenToPair, Direction::PairToToken];
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::TokenToPair => write!(f, "TOKEN→PAIR"),
            Direction::PairToToken => write!(f, "PAIR→TOKEN"),
        }
    }
}

/// Amount-out for both swap directions from one DEX.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DexQuotePair {
    pub token_to_pair: Option<f64>,
    pub pair_to_token: Option<f64>,
}

impl DexQuotePair {
    pub fn get(&self, direction: Direction) -> Option<f64> {
        match direction {
            Direction::TokenToPair => self.token_to_pair,
            Direction::PairToToken => self.pair_to_token,
        }
    }
}

/// Exact swap inputs for both directions, already net of withdrawal fees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct InputAmounts {
    pub token_to_pair: f64,
    pub pair_to_token: f64,
}

/// Hypothetical arbitrage result for one direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PnlResult {
    pub pnl: f64,
    pub pnl_percent: f64,
    pub costs: f64,
    pub details: String,
}

/// PnL outcome for one direction; `Err` carries the error marker text.
pub type DirectionPnl = Result<PnlResult, String>;

/// Both-direction PnL from one DEX for one token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DexPnl {
    pub dex: String,
    pub quote: Option<DexQuotePair>,
    pub token_to_pair: DirectionPnl,
    pub pair_to_token: DirectionPnl,
}

impl DexPnl {
    /// A result where both directions carry the same error marker.
    pub fn failed(dex: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            dex: dex.to_string(),
            quote: None,
            token_to_pair: Err(message.clone()),
            pair_to_token: Err(message),
        }
    }

    pub fn get(&self, direction: Direction) -> &DirectionPnl {
        match direction {
            Direction::TokenToPair => &self.token_to_pair,
            Direction::PairToToken => &self.pair_to_token,
        }
    }
}

// ---------------------------------------------------------------------------
// Scan bookkeeping
// ---------------------------------------------------------------------------

/// Running counters for one scan. Frozen once the scan ends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanStats {
    pub total_tokens: usize,
    pub processed_tokens: usize,
    pub success_count: usize,
    pub error_count: usize,
    /// Directions that met the profit threshold. Counted whether or not
    /// `auto_notify` actually sent an alert.
    pub profitable_signals: usize,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl ScanStats {
    pub fn new(total_tokens: usize) -> Self {
        Self {
            total_tokens,
            start_time: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// Progress in percent (0–100).
    pub fn progress_pct(&self) -> f64 {
        if self.total_tokens == 0 {
            return 100.0;
        }
        self.processed_tokens as f64 / self.total_tokens as f64 * 100.0
    }

    pub fn duration(&self) -> chrono::Duration {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => end - start,
            (Some(start), None) => Utc::now() - start,
            _ => chrono::Duration::zero(),
        }
    }
}

impl fmt::Display for ScanStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} tokens | ok: {} | err: {} | signals: {}",
            self.processed_tokens,
            self.total_tokens,
            self.success_count,
            self.error_count,
            self.profitable_signals,
        )
    }
}

/// Orchestrator lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanState {
    Idle,
    Running,
    Completed,
    Aborted,
    Errored,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for ARBSCAN.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Missing API credentials for {vendor}")]
    MissingCredentials { vendor: Exchange },

    #[error("{vendor} request failed: {source}")]
    Vendor {
        vendor: Exchange,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("{vendor} did not answer within {timeout_ms}ms")]
    Timeout { vendor: Exchange, timeout_ms: u64 },

    #[error("Exchange not configured: {0}")]
    ExchangeNotConfigured(Exchange),

    #[error("Unknown exchange: {0}")]
    UnknownExchange(String),

    #[error("Batch size must be greater than zero")]
    InvalidBatchSize,

    #[error("Realtime market data unavailable: {0}")]
    RealtimeData(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
