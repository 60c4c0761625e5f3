//! CEX/DEX spread calculator.
//!
//! TOKEN→PAIR: buy the token at the CEX ask, withdraw, swap to the pair on
//! the DEX, sell the pair at the CEX bid. PAIR→TOKEN mirrors it. The
//! settlement asset is valued at 1. Withdrawal fees are already netted out
//! of the swap inputs; gas is charged per swap.

use anyhow::Result;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

use super::{AssetKind, FeeQuery, PnlCalculator, PnlInput};
use crate::types::{CoinNetworkRecord, Direction, Exchange, PnlResult, TrackedPairToken};

/// Gas charged for one aggregator swap when nothing else is configured.
pub const DEFAULT_SWAP_GAS_UNITS: u64 = 250_000;

type FeeKey = (Exchange, String, String);

pub struct SpreadPnlCalculator {
    settlement_asset: String,
    gas_units: u64,
    fees: RwLock<HashMap<FeeKey, f64>>,
}

impl SpreadPnlCalculator {
    pub fn new(settlement_asset: impl Into<String>, gas_units: u64) -> Self {
        Self {
            settlement_asset: settlement_asset.into().to_uppercase(),
            gas_units,
            fees: RwLock::new(HashMap::new()),
        }
    }

    /// Merge withdrawal fees from gateway coin lists. Records must already
    /// carry the chain key.
    pub fn load_fees(&self, records: &[CoinNetworkRecord]) {
        let mut fees = self.fees.write();
        for r in records {
            fees.insert(
                (r.exchange, r.base_ticker.to_uppercase(), r.chain.to_lowercase()),
                r.withdrawal_fee,
            );
        }
        debug!(loaded = records.len(), total = fees.len(), "Withdrawal fees loaded");
    }

    fn is_settlement(&self, symbol: &str) -> bool {
        symbol.trim().eq_ignore_ascii_case(&self.settlement_asset)
    }

    /// Price at which `token`'s pair can be sold (`bid`) or bought.
    fn pair_price(&self, token: &TrackedPairToken, input: &PnlInput<'_>, bid: bool) -> Option<f64> {
        if self.is_settlement(&token.pair_ticker) {
            return Some(1.0);
        }
        input
            .cex
            .pair
            .map(|book| if bid { book.best_bid } else { book.best_ask })
    }
}

impl PnlCalculator for SpreadPnlCalculator {
    fn calculate(&self, input: &PnlInput<'_>) -> Result<PnlResult> {
        let token = input.token;
        let Some(out) = input.quote.get(input.direction) else {
            anyhow::bail!("{} returned no {} quote", input.dex, input.direction);
        };
        let base = input
            .cex
            .base
            .ok_or_else(|| anyhow::anyhow!("No CEX book for {}", token.base_ticker))?;

        let (amount_in, buy_price, sell_price, symbol_in, symbol_out) = match input.direction {
            Direction::TokenToPair => (
                input.amounts.token_to_pair,
                Some(base.best_ask),
                self.pair_price(token, input, true),
                &token.base_ticker,
                &token.pair_ticker,
            ),
            Direction::PairToToken => (
                input.amounts.pair_to_token,
                self.pair_price(token, input, false),
                Some(base.best_bid),
                &token.pair_ticker,
                &token.base_ticker,
            ),
        };
        if amount_in <= 0.0 {
            anyhow::bail!("Nothing to swap for {}", input.direction);
        }
        let (Some(buy_price), Some(sell_price)) = (buy_price, sell_price) else {
            anyhow::bail!("No CEX price for {}", token.pair_ticker);
        };

        let revenue = out * sell_price;
        let gas = input.gas.map(|g| g.cost_usd(self.gas_units)).unwrap_or(0.0);
        let withdrawal_cost = (input.notional_usd - amount_in * buy_price).max(0.0);
        let pnl = revenue - input.notional_usd - gas;
        let pnl_percent = if input.notional_usd > 0.0 {
            pnl / input.notional_usd * 100.0
        } else {
            0.0
        };

        let mut details = format!(
            "{} {}: in {amount_in:.6} {symbol_in} → out {out:.6} {symbol_out}, revenue ${revenue:.2}, gas ${gas:.2}",
            input.direction, input.dex,
        );
        if input.rate > 0.0 {
            details.push_str(&format!(", pnl ≈ {:.0} local", pnl * input.rate));
        }

        Ok(PnlResult {
            pnl,
            pnl_percent,
            costs: gas + withdrawal_cost,
            details,
        })
    }

    fn withdrawal_fee(&self, query: &FeeQuery<'_>) -> f64 {
        if query.asset == AssetKind::Pair && self.is_settlement(query.symbol) {
            return 0.0;
        }
        let key = (
            query.exchange,
            query.symbol.trim().to_uppercase(),
            query.token.chain_key(),
        );
        self.fees.read().get(&key).copied().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::GasQuote;
    use crate::types::{CexPrices, DexQuotePair, InputAmounts, OrderbookSnapshot};
    use std::collections::{BTreeMap, HashMap};

    fn token(pair: &str) -> TrackedPairToken {
        TrackedPairToken {
            id: "1".into(),
            chain: "bsc".into(),
            primary_cex: Some("binance".into()),
            base_ticker: "CAKE".into(),
            pair_ticker: pair.into(),
            base_contract: None,
            base_decimals: None,
            pair_contract: None,
            pair_decimals: None,
            per_dex: BTreeMap::new(),
            cex_status: HashMap::new(),
        }
    }

    fn cex(bid: f64, ask: f64) -> CexPrices {
        CexPrices {
            exchange: Some(Exchange::Binance),
            base: Some(OrderbookSnapshot { best_bid: bid, best_ask: ask }),
            pair: None,
        }
    }

    fn input<'a>(
        token: &'a TrackedPairToken,
        cex: &'a CexPrices,
        quote: &'a DexQuotePair,
        direction: Direction,
    ) -> PnlInput<'a> {
        PnlInput {
            token,
            cex,
            dex: "kyber",
            quote,
            direction,
            amounts: InputAmounts { token_to_pair: 100.0, pair_to_token: 100.0 },
            notional_usd: 100.0,
            gas: None,
            rate: 0.0,
        }
    }

    #[test]
    fn test_token_to_pair_settlement_pair() {
        let calc = SpreadPnlCalculator::new("USDT", DEFAULT_SWAP_GAS_UNITS);
        let t = token("USDT");
        let prices = cex(0.99, 1.0);
        let quote = DexQuotePair { token_to_pair: Some(105.0), pair_to_token: Some(98.0) };

        let fwd = calc.calculate(&input(&t, &prices, &quote, Direction::TokenToPair)).unwrap();
        assert!((fwd.pnl - 5.0).abs() < 1e-9);
        assert!((fwd.pnl_percent - 5.0).abs() < 1e-9);

        let back = calc.calculate(&input(&t, &prices, &quote, Direction::PairToToken)).unwrap();
        assert!((back.pnl - (98.0 * 0.99 - 100.0)).abs() < 1e-9);
    }

    #[test]
    fn test_gas_and_withdrawal_in_costs() {
        let calc = SpreadPnlCalculator::new("USDT", 200_000);
        let t = token("USDT");
        let prices = cex(0.99, 1.0);
        let quote = DexQuotePair { token_to_pair: Some(105.0), pair_to_token: None };
        let mut inp = input(&t, &prices, &quote, Direction::TokenToPair);
        inp.amounts.token_to_pair = 99.5;
        inp.gas = Some(GasQuote { gas_price_gwei: 3.0, native_price_usd: 600.0 });

        let r = calc.calculate(&inp).unwrap();
        assert!((r.pnl - (105.0 - 100.0 - 0.36)).abs() < 1e-9);
        assert!((r.costs - (0.36 + 0.5)).abs() < 1e-9);
    }

    #[test]
    fn test_missing_direction_quote_is_error() {
        let calc = SpreadPnlCalculator::new("USDT", 0);
        let t = token("USDT");
        let prices = cex(0.99, 1.0);
        let quote = DexQuotePair { token_to_pair: Some(105.0), pair_to_token: None };
        assert!(calc.calculate(&input(&t, &prices, &quote, Direction::PairToToken)).is_err());
    }

    #[test]
    fn test_non_settlement_pair_needs_book() {
        let calc = SpreadPnlCalculator::new("USDT", 0);
        let t = token("WBNB");
        let mut prices = cex(0.99, 1.0);
        let quote = DexQuotePair { token_to_pair: Some(0.2), pair_to_token: Some(98.0) };
        assert!(calc.calculate(&input(&t, &prices, &quote, Direction::TokenToPair)).is_err());

        prices.pair = Some(OrderbookSnapshot { best_bid: 600.0, best_ask: 601.0 });
        let r = calc.calculate(&input(&t, &prices, &quote, Direction::TokenToPair)).unwrap();
        assert!((r.pnl - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_withdrawal_fee_lookup() {
        let calc = SpreadPnlCalculator::new("USDT", 0);
        calc.load_fees(&[CoinNetworkRecord {
            exchange: Exchange::Binance,
            chain: "bsc".into(),
            base_ticker: "CAKE".into(),
            contract_address: String::new(),
            deposit_enabled: true,
            withdraw_enabled: true,
            withdrawal_fee: 0.012,
        }]);
        let t = token("USDT");
        let fee = |exchange: Exchange, symbol: &'static str, asset: AssetKind| {
            calc.withdrawal_fee(&FeeQuery { exchange, symbol, token: &t, asset })
        };

        assert_eq!(fee(Exchange::Binance, "cake", AssetKind::Base), 0.012);
        assert_eq!(fee(Exchange::Mexc, "CAKE", AssetKind::Base), 0.0);
        assert_eq!(fee(Exchange::Binance, "USDT", AssetKind::Pair), 0.0);
    }
}
