//! Profit-and-loss seam.
//!
//! The pipeline asks a `PnlCalculator` for one direction at a time and for
//! withdrawal fees when sizing swap inputs. `SpreadPnlCalculator` is the
//! reference implementation.

pub mod spread;

use anyhow::Result;

use crate::market_data::GasQuote;
use crate::types::{CexPrices, Direction, DexQuotePair, Exchange, InputAmounts, PnlResult, TrackedPairToken};

/// Everything needed to price one direction.
#[derive(Debug, Clone, Copy)]
pub struct PnlInput<'a> {
    pub token: &'a TrackedPairToken,
    pub cex: &'a CexPrices,
    pub dex: &'a str,
    pub quote: &'a DexQuotePair,
    pub direction: Direction,
    pub amounts: InputAmounts,
    pub notional_usd: f64,
    pub gas: Option<GasQuote>,
    /// Local fiat units per USD.
    pub rate: f64,
}

/// Which side of the token a fee query is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Base,
    Pair,
}

#[derive(Debug, Clone, Copy)]
pub struct FeeQuery<'a> {
    pub exchange: Exchange,
    pub symbol: &'a str,
    pub token: &'a TrackedPairToken,
    pub asset: AssetKind,
}

pub trait PnlCalculator: Send + Sync {
    fn calculate(&self, input: &PnlInput<'_>) -> Result<PnlResult>;

    /// Withdrawal fee in units of `query.symbol`; 0 when unknown.
    fn withdrawal_fee(&self, query: &FeeQuery<'_>) -> f64;
}
