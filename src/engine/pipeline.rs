//! Per-token scan pipeline.
//!
//! One `run` call per token: CEX legs (sequential, paced), swap sizing, a
//! staggered DEX fan-out with per-DEX PnL, signals, then bookkeeping. Every
//! failure stays inside the token; `run` itself never fails.

use futures::future::join_all;
use parking_lot::Mutex;
use serde_json::json;
use tracing::{debug, info, warn};

use super::events::{EventBus, ScanEvent, Stage, TokenSnapshot};
use crate::dex::{DexQuoteGateway, QuoteRequest};
use crate::exchanges::OrderbookSource;
use crate::market_data::RealtimeData;
use crate::notify::{format_signal, NotificationChannel};
use crate::pnl::{AssetKind, FeeQuery, PnlCalculator, PnlInput};
use crate::rate_limit::DelayManager;
use crate::types::{
    CexPrices, Direction, DexPnl, Exchange, InputAmounts, OrderbookSnapshot, ScanFilter,
    ScanSettings, ScanStats, TrackedPairToken,
};

/// Immutable inputs of one scan run.
#[derive(Debug, Clone)]
pub struct ScanContext {
    pub filter: ScanFilter,
    pub settings: ScanSettings,
    pub realtime: RealtimeData,
}

/// Borrowed view of the orchestrator's collaborators for one run.
pub(crate) struct TokenPipeline<'a> {
    pub orderbooks: &'a dyn OrderbookSource,
    pub dex: &'a dyn DexQuoteGateway,
    pub pnl: &'a dyn PnlCalculator,
    pub notifier: &'a dyn NotificationChannel,
    pub delays: &'a DelayManager,
    pub events: &'a EventBus,
    pub stats: &'a Mutex<ScanStats>,
    pub ctx: &'a ScanContext,
}

/// Why a token ended without DEX results.
#[derive(Debug)]
struct TokenFailure {
    cex: CexPrices,
    message: String,
}

/// `true` when `pnl` meets the signal threshold (inclusive).
pub fn qualifies(pnl: f64, min_absolute_profit: f64) -> bool {
    pnl >= min_absolute_profit
}

/// `max(notional / price - fee, 0)`; 0 when there is no usable price.
pub fn amount_after_withdrawal(notional_usd: f64, price: Option<f64>, fee: f64) -> f64 {
    match price {
        Some(p) if p > 0.0 && p.is_finite() => (notional_usd / p - fee).max(0.0),
        _ => 0.0,
    }
}

impl<'a> TokenPipeline<'a> {
    /// Process one token. The first await is the item stagger.
    pub async fn run(&self, token: &TrackedPairToken, index_in_batch: usize) {
        self.delays.wait_item_stagger(index_in_batch).await;
        debug!(token = %token.label(), index_in_batch, "Token job started");

        let (snapshot, failed) = match self.process(token).await {
            Ok((cex, dex)) => (
                TokenSnapshot {
                    token_id: token.id.clone(),
                    label: token.label(),
                    cex,
                    dex,
                    error: None,
                },
                false,
            ),
            Err(failure) => {
                warn!(token = %token.label(), error = %failure.message, "Token failed");
                self.events.emit(ScanEvent::progress_with(
                    Stage::Token,
                    format!("{} failed: {}", token.label(), failure.message),
                    json!({ "token_id": token.id }),
                ));
                (
                    TokenSnapshot {
                        token_id: token.id.clone(),
                        label: token.label(),
                        cex: failure.cex,
                        dex: Vec::new(),
                        error: Some(failure.message),
                    },
                    true,
                )
            }
        };

        let progress_pct = {
            let mut stats = self.stats.lock();
            stats.processed_tokens += 1;
            if failed {
                stats.error_count += 1;
            } else {
                stats.success_count += 1;
            }
            stats.progress_pct()
        };
        self.events.emit(ScanEvent::TokenComplete {
            snapshot,
            progress_pct,
        });
    }

    async fn process(&self, token: &TrackedPairToken) -> Result<(CexPrices, Vec<DexPnl>), TokenFailure> {
        let Some(exchange) = token.primary_exchange() else {
            info!(token = %token.label(), primary_cex = ?token.primary_cex, "No primary CEX, skipping price legs");
            let cex = CexPrices::default();
            self.emit_cex(token, &cex);
            self.events.emit(ScanEvent::progress(
                Stage::Dex,
                format!("{}: no CEX leg, DEX quotes skipped", token.label()),
            ));
            return Ok((cex, Vec::new()));
        };

        let cex = self.fetch_cex(token, exchange).await;
        self.emit_cex(token, &cex);

        let Some(base_book) = cex.base else {
            return Err(TokenFailure {
                cex,
                message: format!("no {} order book for {}", exchange, token.base_ticker),
            });
        };

        let amounts = self.input_amounts(token, exchange, base_book, cex.pair);
        let dex = self.fan_out(token, exchange, &cex, amounts).await;
        Ok((cex, dex))
    }

    fn emit_cex(&self, token: &TrackedPairToken, cex: &CexPrices) {
        self.events.emit(ScanEvent::CexResult {
            token_id: token.id.clone(),
            prices: cex.clone(),
        });
    }

    // -- CEX legs --------------------------------------------------------

    async fn fetch_cex(&self, token: &TrackedPairToken, exchange: Exchange) -> CexPrices {
        let base = self.fetch_leg(exchange, &token.base_ticker, "base").await;

        let settlement = &self.ctx.settings.settlement_asset;
        let pair = if token.pair_ticker.trim().eq_ignore_ascii_case(settlement) {
            None
        } else {
            self.fetch_leg(exchange, &token.pair_ticker, "pair").await
        };

        CexPrices {
            exchange: Some(exchange),
            base,
            pair,
        }
    }

    /// One order-book call followed by the exchange delay. Blank symbols and
    /// failures give an empty leg.
    async fn fetch_leg(&self, exchange: Exchange, symbol: &str, leg: &str) -> Option<OrderbookSnapshot> {
        if symbol.trim().is_empty() {
            warn!(exchange = %exchange, leg, "Blank symbol, leg left empty");
            return None;
        }

        let result = self
            .orderbooks
            .fetch_orderbook(exchange, symbol, self.delays.request_timeout())
            .await;
        self.delays.wait_exchange_delay(exchange.key()).await;

        match result {
            Ok(book) => {
                self.events.emit(ScanEvent::progress_with(
                    Stage::Cex,
                    format!("{exchange} {symbol} book"),
                    json!({ "bid": book.best_bid, "ask": book.best_ask }),
                ));
                Some(book)
            }
            Err(e) => {
                warn!(exchange = %exchange, symbol, leg, error = %e, "Order book fetch failed");
                self.events.emit(ScanEvent::progress(
                    Stage::Cex,
                    format!("{exchange} {symbol} book failed: {e}"),
                ));
                None
            }
        }
    }

    fn input_amounts(
        &self,
        token: &TrackedPairToken,
        exchange: Exchange,
        base_book: OrderbookSnapshot,
        pair_book: Option<OrderbookSnapshot>,
    ) -> InputAmounts {
        let settings = &self.ctx.settings;
        let notional = settings.notional_usd;

        let base_fee = self.pnl.withdrawal_fee(&FeeQuery {
            exchange,
            symbol: &token.base_ticker,
            token,
            asset: AssetKind::Base,
        });
        let token_to_pair = amount_after_withdrawal(notional, Some(base_book.best_ask), base_fee);

        let pair_to_token = if token.pair_ticker.trim().eq_ignore_ascii_case(&settings.settlement_asset) {
            amount_after_withdrawal(notional, Some(1.0), 0.0)
        } else {
            let pair_fee = self.pnl.withdrawal_fee(&FeeQuery {
                exchange,
                symbol: &token.pair_ticker,
                token,
                asset: AssetKind::Pair,
            });
            amount_after_withdrawal(notional, pair_book.map(|b| b.best_ask), pair_fee)
        };

        InputAmounts {
            token_to_pair,
            pair_to_token,
        }
    }

    // -- DEX fan-out -----------------------------------------------------

    async fn fan_out(
        &self,
        token: &TrackedPairToken,
        exchange: Exchange,
        cex: &CexPrices,
        amounts: InputAmounts,
    ) -> Vec<DexPnl> {
        let dexes = token.active_dexes(&self.ctx.filter);
        if dexes.is_empty() {
            debug!(token = %token.label(), "No active DEX for token");
            return Vec::new();
        }

        join_all(
            dexes
                .iter()
                .enumerate()
                .map(|(i, dex)| self.dex_job(token, exchange, cex, amounts, dex, i)),
        )
        .await
    }

    async fn dex_job(
        &self,
        token: &TrackedPairToken,
        exchange: Exchange,
        cex: &CexPrices,
        amounts: InputAmounts,
        dex: &str,
        index: usize,
    ) -> DexPnl {
        self.delays.wait_dex_stagger(dex, index).await;

        let request = QuoteRequest { token, dex, amounts };
        let result = match self.dex.get_quotes(request, self.delays.request_timeout()).await {
            Ok(quote) => {
                let pnl_for = |direction: Direction| {
                    self.pnl
                        .calculate(&PnlInput {
                            token,
                            cex,
                            dex,
                            quote: &quote,
                            direction,
                            amounts,
                            notional_usd: self.ctx.settings.notional_usd,
                            gas: self.ctx.realtime.gas.get(&token.chain_key()).copied(),
                            rate: self.ctx.realtime.rate,
                        })
                        .map_err(|e| format!("{e:#}"))
                };
                DexPnl {
                    dex: dex.to_string(),
                    quote: Some(quote),
                    token_to_pair: pnl_for(Direction::TokenToPair),
                    pair_to_token: pnl_for(Direction::PairToToken),
                }
            }
            Err(e) => {
                warn!(token = %token.label(), dex, error = %e, "DEX quote failed");
                DexPnl::failed(dex, format!("quote failed: {e:#}"))
            }
        };

        self.events.emit(ScanEvent::PnlResult {
            token_id: token.id.clone(),
            result: result.clone(),
        });

        if result.quote.is_some() {
            self.signal(token, exchange, &result).await;
        }
        result
    }

    async fn signal(&self, token: &TrackedPairToken, exchange: Exchange, result: &DexPnl) {
        let settings = &self.ctx.settings;
        for direction in Direction::BOTH {
            let Ok(pnl) = result.get(direction) else { continue };
            if !qualifies(pnl.pnl, settings.min_absolute_profit) {
                continue;
            }

            self.stats.lock().profitable_signals += 1;
            info!(
                token = %token.label(),
                dex = %result.dex,
                %direction,
                pnl = format!("${:.2}", pnl.pnl),
                "Profitable signal"
            );
            if settings.auto_notify {
                let message = format_signal(token, exchange.key(), &result.dex, direction, pnl);
                self.notifier.send_signal(&message).await;
                self.events.emit(ScanEvent::progress(
                    Stage::Signal,
                    format!("{} {direction} via {} signalled", token.label(), result.dex),
                ));
            }
        }
    }
}
