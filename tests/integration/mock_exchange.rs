//! Mock vendors for integration testing.
//!
//! Provides a deterministic `ExchangeAdapter`, a canned DEX quote gateway
//! and a recording notifier. All state is in-memory with no external
//! dependencies.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arbscan::dex::{DexQuoteGateway, QuoteRequest};
use arbscan::market_data::{RealtimeData, RealtimeMarketDataProvider};
use arbscan::notify::{BotStatus, NotificationChannel};
use arbscan::types::*;

/// A mock exchange with fixed books per base symbol.
///
/// Symbols without a book fail with a transport-style error.
pub struct MockExchange {
    exchange: Exchange,
    books: HashMap<String, OrderbookSnapshot>,
    networks: Vec<CoinNetworkRecord>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockExchange {
    pub fn new(exchange: Exchange) -> Self {
        Self {
            exchange,
            books: HashMap::new(),
            networks: Vec::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_book(mut self, base: &str, bid: f64, ask: f64) -> Self {
        self.books.insert(
            base.to_uppercase(),
            OrderbookSnapshot {
                best_bid: bid,
                best_ask: ask,
            },
        );
        self
    }

    /// Add one network listing using the vendor's own label.
    pub fn with_network(mut self, base: &str, vendor_label: &str, fee: f64) -> Self {
        self.networks.push(CoinNetworkRecord {
            exchange: self.exchange,
            chain: vendor_label.to_string(),
            base_ticker: base.to_uppercase(),
            contract_address: String::new(),
            deposit_enabled: true,
            withdraw_enabled: true,
            withdrawal_fee: fee,
        });
        self
    }

    /// Handle on the order-book call log, in call order.
    pub fn calls(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl arbscan::exchanges::ExchangeAdapter for MockExchange {
    fn exchange(&self) -> Exchange {
        self.exchange
    }

    async fn fetch_networks(&self) -> Result<Vec<CoinNetworkRecord>> {
        Ok(self.networks.clone())
    }

    async fn fetch_tradeable_symbols(&self) -> Result<HashSet<String>> {
        Ok(self.books.keys().cloned().collect())
    }

    async fn fetch_last_prices(&self) -> Result<HashMap<String, f64>> {
        Ok(self
            .books
            .iter()
            .map(|(k, b)| (k.clone(), (b.best_bid + b.best_ask) / 2.0))
            .collect())
    }

    async fn fetch_orderbook(&self, base: &str) -> Result<OrderbookSnapshot> {
        self.calls.lock().unwrap().push(base.to_uppercase());
        self.books
            .get(&base.to_uppercase())
            .copied()
            .ok_or_else(|| anyhow!("connection reset fetching {base}"))
    }
}

/// DEX gateway returning the same amounts for every request.
pub struct CannedDex {
    pub quote: DexQuotePair,
    pub requests: Mutex<Vec<(String, String, InputAmounts)>>,
}

impl CannedDex {
    pub fn new(token_to_pair: f64, pair_to_token: f64) -> Self {
        Self {
            quote: DexQuotePair {
                token_to_pair: Some(token_to_pair),
                pair_to_token: Some(pair_to_token),
            },
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl DexQuoteGateway for CannedDex {
    async fn get_quotes(&self, request: QuoteRequest<'_>, _timeout: Duration) -> Result<DexQuotePair> {
        self.requests.lock().unwrap().push((
            request.token.id.clone(),
            request.dex.to_string(),
            request.amounts,
        ));
        Ok(self.quote)
    }
}

/// Notifier that records everything it is asked to send.
#[derive(Default)]
pub struct RecordingNotifier {
    pub identity: Mutex<String>,
    pub statuses: Mutex<Vec<BotStatus>>,
    pub signals: Mutex<Vec<String>>,
}

#[async_trait]
impl NotificationChannel for RecordingNotifier {
    fn set_identity(&self, name: &str) {
        *self.identity.lock().unwrap() = name.to_string();
    }

    async fn send_status(&self, status: BotStatus) {
        self.statuses.lock().unwrap().push(status);
    }

    async fn send_signal(&self, message: &str) {
        self.signals.lock().unwrap().push(message.to_string());
    }
}

/// Market data with no gas and a fixed rate.
pub struct FlatMarketData;

#[async_trait]
impl RealtimeMarketDataProvider for FlatMarketData {
    async fn get_all_realtime_data(&self, _chain_keys: &[String]) -> Result<RealtimeData> {
        Ok(RealtimeData {
            gas: HashMap::new(),
            rate: 16_000.0,
        })
    }
}

/// A USDT-paired token on BSC with one DEX enabled.
pub fn tracked_token(id: &str, base: &str, primary_cex: &str) -> TrackedPairToken {
    TrackedPairToken {
        id: id.to_string(),
        chain: "bsc".to_string(),
        primary_cex: Some(primary_cex.to_string()),
        base_ticker: base.to_string(),
        pair_ticker: "USDT".to_string(),
        base_contract: Some(format!("0x{}", base.to_lowercase())),
        base_decimals: Some(18),
        pair_contract: Some("0x55d398326f99059ff775485246999027b3197955".to_string()),
        pair_decimals: Some(18),
        per_dex: BTreeMap::from([(
            "kyber".to_string(),
            DexSetting {
                enabled: true,
                ..Default::default()
            },
        )]),
        cex_status: HashMap::new(),
    }
}

pub fn kyber_only() -> ScanFilter {
    ScanFilter {
        dex: HashMap::from([("kyber".to_string(), true)]),
    }
}
