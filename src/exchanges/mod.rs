//! Exchange data gateway.
//!
//! Defines the `ExchangeAdapter` trait (one implementation per vendor) and
//! the `ExchangeDataGateway` that fronts them:
//! - coin/network lists, alias-filtered to one chain
//! - "tradeable against USDT" symbol sets, degrading per exchange
//! - last-trade price maps, degrading per exchange
//! - top-of-book snapshots for the scan pipeline (`OrderbookSource`)

pub mod binance;
pub mod bitget;
pub mod bybit;
pub mod coerce;
pub mod gate;
pub mod indodax;
pub mod kucoin;
pub mod mexc;
pub mod signing;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::join_all;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::chain::ChainAliasResolver;
use crate::types::{CoinNetworkRecord, Exchange, OrderbookSnapshot, ScanError};
use coerce::coerce_f64;
use signing::ApiCredentials;

/// Default per-call timeout for gateway requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// One centralized exchange's public/private REST surface, normalized.
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    fn exchange(&self) -> Exchange;

    /// Every coin network the vendor lists. `chain` holds the vendor's own
    /// network label; the gateway alias-matches and rewrites it.
    async fn fetch_networks(&self) -> Result<Vec<CoinNetworkRecord>>;

    /// Fill fields the vendor's list call does not carry. Records have
    /// already been filtered to `chain_key`.
    fn backfill(&self, _chain_key: &str, _records: &mut [CoinNetworkRecord]) {}

    /// Base symbols currently tradeable against USDT (upper-case).
    async fn fetch_tradeable_symbols(&self) -> Result<HashSet<String>>;

    /// Last-trade USDT price per base symbol (upper-case keys).
    async fn fetch_last_prices(&self) -> Result<HashMap<String, f64>>;

    /// Best bid/ask of `<base>/USDT`.
    async fn fetch_orderbook(&self, base: &str) -> Result<OrderbookSnapshot>;
}

/// Source of CEX top-of-book snapshots for the scan pipeline.
#[async_trait]
pub trait OrderbookSource: Send + Sync {
    /// Fetch the book of `<base>/USDT` on `exchange`, giving up after `timeout`.
    async fn fetch_orderbook(
        &self,
        exchange: Exchange,
        base: &str,
        timeout: Duration,
    ) -> Result<OrderbookSnapshot, ScanError>;
}

// ---------------------------------------------------------------------------
// Adapter construction
// ---------------------------------------------------------------------------

/// Everything needed to build one adapter.
#[derive(Debug, Clone, Default)]
pub struct AdapterSettings {
    pub base_url: Option<String>,
    pub credentials: Option<ApiCredentials>,
    /// URL prefix for vendors reached through a relay (Gate).
    pub proxy_prefix: Option<String>,
    /// Known contract/fee data for vendors whose list omits it (Indodax).
    pub snapshot: Vec<CoinNetworkRecord>,
}

/// Build the adapter for `exchange`.
pub fn build_adapter(
    exchange: Exchange,
    settings: AdapterSettings,
) -> Result<Arc<dyn ExchangeAdapter>> {
    let adapter: Arc<dyn ExchangeAdapter> = match exchange {
        Exchange::Binance => Arc::new(binance::BinanceClient::new(
            settings.base_url,
            settings.credentials,
        )?),
        Exchange::Mexc => Arc::new(mexc::MexcClient::new(settings.base_url, settings.credentials)?),
        Exchange::Gate => Arc::new(gate::GateClient::new(settings.base_url, settings.proxy_prefix)?),
        Exchange::Kucoin => Arc::new(kucoin::KucoinClient::new(settings.base_url)?),
        Exchange::Bitget => Arc::new(bitget::BitgetClient::new(settings.base_url)?),
        Exchange::Bybit => Arc::new(bybit::BybitClient::new(settings.base_url, settings.credentials)?),
        Exchange::Indodax => Arc::new(indodax::IndodaxClient::new(
            settings.base_url,
            settings.credentials,
            settings.snapshot,
        )?),
    };
    Ok(adapter)
}

// ---------------------------------------------------------------------------
// Shared HTTP helpers
// ---------------------------------------------------------------------------

pub(crate) fn http_client(vendor: Exchange) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(30))
        .user_agent("ARBSCAN/0.1.0 (arbitrage-scanner)")
        .build()
        .with_context(|| format!("Failed to build HTTP client for {vendor}"))
}

/// Send a request and decode a JSON body, failing on non-2xx statuses.
pub(crate) async fn send_json(req: RequestBuilder, vendor: Exchange) -> Result<Value> {
    let resp = req
        .send()
        .await
        .with_context(|| format!("{vendor} API request failed"))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("{vendor} API error {status}: {body}");
    }

    resp.json()
        .await
        .with_context(|| format!("Failed to parse {vendor} response"))
}

pub(crate) fn missing_credentials(vendor: Exchange) -> anyhow::Error {
    ScanError::MissingCredentials { vendor }.into()
}

/// Join the non-empty parts of a vendor network label.
pub(crate) fn network_label(parts: &[Option<&str>]) -> String {
    parts
        .iter()
        .flatten()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" / ")
}

/// Price of the first `[price, qty]` level.
pub(crate) fn best_level(levels: &Value) -> Option<f64> {
    levels
        .as_array()?
        .first()?
        .as_array()?
        .first()
        .and_then(coerce_f64)
        .filter(|p| *p > 0.0)
}

pub(crate) fn top_of_book(bids: &Value, asks: &Value, vendor: Exchange) -> Result<OrderbookSnapshot> {
    match (best_level(bids), best_level(asks)) {
        (Some(best_bid), Some(best_ask)) => Ok(OrderbookSnapshot { best_bid, best_ask }),
        _ => anyhow::bail!("{vendor} order book is empty"),
    }
}

fn vendor_error(vendor: Exchange, err: anyhow::Error) -> ScanError {
    match err.downcast::<ScanError>() {
        Ok(typed) => typed,
        Err(other) => ScanError::Vendor {
            vendor,
            source: other.into(),
        },
    }
}

// ---------------------------------------------------------------------------
// Resolver books
// ---------------------------------------------------------------------------

/// Per-exchange "tradeable against USDT" sets.
#[derive(Debug, Clone, Default)]
pub struct TradeStatusBook {
    sets: HashMap<Exchange, HashSet<String>>,
}

impl TradeStatusBook {
    pub fn is_tradeable(&self, exchange: Exchange, symbol: &str) -> bool {
        self.sets
            .get(&exchange)
            .map(|set| set.contains(&symbol.trim().to_uppercase()))
            .unwrap_or(false)
    }

    pub fn symbol_count(&self, exchange: Exchange) -> usize {
        self.sets.get(&exchange).map(HashSet::len).unwrap_or(0)
    }
}

/// Per-exchange last-trade USDT prices.
#[derive(Debug, Clone, Default)]
pub struct PriceBook {
    prices: HashMap<Exchange, HashMap<String, f64>>,
}

impl PriceBook {
    pub fn price(&self, exchange: Exchange, symbol: &str) -> Option<f64> {
        self.prices
            .get(&exchange)?
            .get(&symbol.trim().to_uppercase())
            .copied()
    }
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

/// Registry of vendor adapters plus the chain alias resolver.
pub struct ExchangeDataGateway {
    adapters: HashMap<Exchange, Arc<dyn ExchangeAdapter>>,
    resolver: Arc<ChainAliasResolver>,
    timeout: Duration,
}

impl ExchangeDataGateway {
    pub fn new(resolver: Arc<ChainAliasResolver>) -> Self {
        Self {
            adapters: HashMap::new(),
            resolver,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Register (or replace) the adapter for its exchange.
    pub fn register(&mut self, adapter: Arc<dyn ExchangeAdapter>) {
        self.adapters.insert(adapter.exchange(), adapter);
    }

    pub fn exchanges(&self) -> Vec<Exchange> {
        let mut list: Vec<_> = self.adapters.keys().copied().collect();
        list.sort();
        list
    }

    fn adapter(&self, exchange: Exchange) -> Result<&Arc<dyn ExchangeAdapter>, ScanError> {
        self.adapters
            .get(&exchange)
            .ok_or(ScanError::ExchangeNotConfigured(exchange))
    }

    async fn timed<T, F>(&self, exchange: Exchange, fut: F) -> Result<T, ScanError>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(vendor_error(exchange, e)),
            Err(_) => Err(ScanError::Timeout {
                vendor: exchange,
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }

    /// Coin networks on `exchange` that belong to `chain_key`.
    pub async fn fetch_coin_list(
        &self,
        exchange: Exchange,
        chain_key: &str,
    ) -> Result<Vec<CoinNetworkRecord>, ScanError> {
        let adapter = self.adapter(exchange)?;
        let all = self.timed(exchange, adapter.fetch_networks()).await?;
        let total = all.len();

        let mut records: Vec<CoinNetworkRecord> = all
            .into_iter()
            .filter(|r| self.resolver.matches(chain_key, &r.chain))
            .map(|mut r| {
                r.chain = chain_key.to_string();
                r
            })
            .collect();
        adapter.backfill(chain_key, &mut records);

        info!(
            exchange = %exchange,
            chain = chain_key,
            total,
            matched = records.len(),
            "Coin list fetched"
        );
        Ok(records)
    }

    /// Tradeable-symbol sets for every listed exchange. A failing exchange
    /// contributes an empty set.
    pub async fn fetch_trade_status(&self, exchanges: &[Exchange]) -> TradeStatusBook {
        let results = join_all(exchanges.iter().map(|&ex| async move {
            let set = match self.adapter(ex) {
                Ok(adapter) => self.timed(ex, adapter.fetch_tradeable_symbols()).await,
                Err(e) => Err(e),
            };
            (ex, set)
        }))
        .await;

        let mut book = TradeStatusBook::default();
        for (ex, result) in results {
            let set = result.unwrap_or_else(|e| {
                warn!(exchange = %ex, error = %e, "Trade status fetch failed, using empty set");
                HashSet::new()
            });
            debug!(exchange = %ex, symbols = set.len(), "Trade status loaded");
            book.sets.insert(ex, set);
        }
        book
    }

    /// Price maps for every listed exchange. A failing exchange contributes
    /// an empty map.
    pub async fn fetch_prices(&self, exchanges: &[Exchange]) -> PriceBook {
        let results = join_all(exchanges.iter().map(|&ex| async move {
            let prices = match self.adapter(ex) {
                Ok(adapter) => self.timed(ex, adapter.fetch_last_prices()).await,
                Err(e) => Err(e),
            };
            (ex, prices)
        }))
        .await;

        let mut book = PriceBook::default();
        for (ex, result) in results {
            let prices = result.unwrap_or_else(|e| {
                warn!(exchange = %ex, error = %e, "Price fetch failed, using empty map");
                HashMap::new()
            });
            debug!(exchange = %ex, symbols = prices.len(), "Prices loaded");
            book.prices.insert(ex, prices);
        }
        book
    }
}

#[async_trait]
impl OrderbookSource for ExchangeDataGateway {
    async fn fetch_orderbook(
        &self,
        exchange: Exchange,
        base: &str,
        timeout: Duration,
    ) -> Result<OrderbookSnapshot, ScanError> {
        let adapter = self.adapter(exchange)?;
        match tokio::time::timeout(timeout, adapter.fetch_orderbook(base)).await {
            Ok(Ok(book)) => Ok(book),
            Ok(Err(e)) => Err(vendor_error(exchange, e)),
            Err(_) => Err(ScanError::Timeout {
                vendor: exchange,
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainDef;
    use serde_json::json;

    /// Adapter returning canned data, or failing on demand.
    struct FakeAdapter {
        exchange: Exchange,
        networks: Vec<CoinNetworkRecord>,
        fail_with: Option<fn(Exchange) -> anyhow::Error>,
        slow: bool,
    }

    impl FakeAdapter {
        fn ok(exchange: Exchange, networks: Vec<CoinNetworkRecord>) -> Self {
            Self { exchange, networks, fail_with: None, slow: false }
        }

        fn failing(exchange: Exchange, f: fn(Exchange) -> anyhow::Error) -> Self {
            Self { exchange, networks: Vec::new(), fail_with: Some(f), slow: false }
        }

        fn check(&self) -> Result<()> {
            match self.fail_with {
                Some(f) => Err(f(self.exchange)),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl ExchangeAdapter for FakeAdapter {
        fn exchange(&self) -> Exchange {
            self.exchange
        }

        async fn fetch_networks(&self) -> Result<Vec<CoinNetworkRecord>> {
            self.check()?;
            Ok(self.networks.clone())
        }

        async fn fetch_tradeable_symbols(&self) -> Result<HashSet<String>> {
            self.check()?;
            Ok(["BTC", "CAKE"].iter().map(|s| s.to_string()).collect())
        }

        async fn fetch_last_prices(&self) -> Result<HashMap<String, f64>> {
            self.check()?;
            Ok([("CAKE".to_string(), 2.5)].into_iter().collect())
        }

        async fn fetch_orderbook(&self, _base: &str) -> Result<OrderbookSnapshot> {
            if self.slow {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            self.check()?;
            Ok(OrderbookSnapshot { best_bid: 0.99, best_ask: 1.01 })
        }
    }

    fn record(exchange: Exchange, ticker: &str, network: &str) -> CoinNetworkRecord {
        CoinNetworkRecord {
            exchange,
            chain: network.to_string(),
            base_ticker: ticker.to_string(),
            contract_address: String::new(),
            deposit_enabled: true,
            withdraw_enabled: true,
            withdrawal_fee: 0.1,
        }
    }

    fn resolver() -> Arc<ChainAliasResolver> {
        Arc::new(ChainAliasResolver::new(vec![ChainDef {
            key: "bsc".into(),
            name: "BNB Smart Chain".into(),
            short_code: Some("BSC".into()),
            synonyms: vec!["BEP20".into()],
        }]))
    }

    fn gateway(adapters: Vec<FakeAdapter>) -> ExchangeDataGateway {
        let mut gw = ExchangeDataGateway::new(resolver());
        for a in adapters {
            gw.register(Arc::new(a));
        }
        gw
    }

    #[tokio::test]
    async fn test_coin_list_filters_by_alias_and_rewrites_chain() {
        let gw = gateway(vec![FakeAdapter::ok(
            Exchange::Binance,
            vec![
                record(Exchange::Binance, "CAKE", "BSC / BNB Smart Chain (BEP20)"),
                record(Exchange::Binance, "ETH", "ETH / Ethereum (ERC20)"),
                record(Exchange::Binance, "USDT", "bep20"),
            ],
        )]);

        let list = gw.fetch_coin_list(Exchange::Binance, "bsc").await.unwrap();
        assert_eq!(list.len(), 2);
        assert!(list.iter().all(|r| r.chain == "bsc"));
        assert_eq!(list[0].base_ticker, "CAKE");
        assert_eq!(list[1].base_ticker, "USDT");
    }

    #[tokio::test]
    async fn test_coin_list_missing_credentials_is_config_error() {
        let gw = gateway(vec![FakeAdapter::failing(Exchange::Bybit, missing_credentials)]);
        let err = gw.fetch_coin_list(Exchange::Bybit, "bsc").await.unwrap_err();
        assert!(matches!(err, ScanError::MissingCredentials { vendor: Exchange::Bybit }));
    }

    #[tokio::test]
    async fn test_coin_list_transport_error_names_vendor() {
        let gw = gateway(vec![FakeAdapter::failing(Exchange::Gate, |_| {
            anyhow::anyhow!("connection reset")
        })]);
        let err = gw.fetch_coin_list(Exchange::Gate, "bsc").await.unwrap_err();
        assert!(matches!(err, ScanError::Vendor { vendor: Exchange::Gate, .. }));
        let msg = err.to_string();
        assert!(msg.contains("gate"), "{msg}");
        assert!(msg.contains("connection reset"), "{msg}");
    }

    #[tokio::test]
    async fn test_coin_list_unregistered_exchange() {
        let gw = gateway(vec![]);
        let err = gw.fetch_coin_list(Exchange::Mexc, "bsc").await.unwrap_err();
        assert!(matches!(err, ScanError::ExchangeNotConfigured(Exchange::Mexc)));
    }

    #[tokio::test]
    async fn test_trade_status_degrades_per_exchange() {
        let gw = gateway(vec![
            FakeAdapter::ok(Exchange::Binance, vec![]),
            FakeAdapter::failing(Exchange::Kucoin, |_| anyhow::anyhow!("503")),
        ]);
        let book = gw
            .fetch_trade_status(&[Exchange::Binance, Exchange::Kucoin, Exchange::Bitget])
            .await;

        assert!(book.is_tradeable(Exchange::Binance, "cake"));
        assert!(!book.is_tradeable(Exchange::Binance, "DOGE"));
        assert!(!book.is_tradeable(Exchange::Kucoin, "CAKE"));
        assert_eq!(book.symbol_count(Exchange::Kucoin), 0);
        assert_eq!(book.symbol_count(Exchange::Bitget), 0);
    }

    #[tokio::test]
    async fn test_prices_degrade_per_exchange() {
        let gw = gateway(vec![
            FakeAdapter::ok(Exchange::Binance, vec![]),
            FakeAdapter::failing(Exchange::Mexc, |_| anyhow::anyhow!("timeout")),
        ]);
        let book = gw.fetch_prices(&[Exchange::Binance, Exchange::Mexc]).await;
        assert_eq!(book.price(Exchange::Binance, "CAKE"), Some(2.5));
        assert_eq!(book.price(Exchange::Mexc, "CAKE"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_orderbook_times_out() {
        let mut slow = FakeAdapter::ok(Exchange::Binance, vec![]);
        slow.slow = true;
        let gw = gateway(vec![slow]);
        let err = gw
            .fetch_orderbook(Exchange::Binance, "CAKE", Duration::from_millis(500))
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::Timeout { timeout_ms: 500, .. }));
    }

    #[tokio::test]
    async fn test_orderbook_ok() {
        let gw = gateway(vec![FakeAdapter::ok(Exchange::Binance, vec![])]);
        let book = gw
            .fetch_orderbook(Exchange::Binance, "CAKE", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(book.best_ask, 1.01);
    }

    #[test]
    fn test_best_level_accepts_strings_and_numbers() {
        assert_eq!(best_level(&json!([["1.5", "10"], ["1.4", "2"]])), Some(1.5));
        assert_eq!(best_level(&json!([[2.0, 1.0]])), Some(2.0));
        assert_eq!(best_level(&json!([])), None);
        assert_eq!(best_level(&json!(null)), None);
    }

    #[test]
    fn test_network_label_skips_blanks() {
        assert_eq!(network_label(&[Some("BSC"), None, Some(" "), Some("BEP20")]), "BSC / BEP20");
    }
}
