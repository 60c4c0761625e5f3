//! Binance spot integration.
//!
//! API docs: https://developers.binance.com/docs/binance-spot-api-docs
//! Base URL: https://api.binance.com
//! Auth: `X-MBX-APIKEY` header + HMAC-SHA256 `signature` over the query
//! string (which must include `timestamp`). Only the capital config call
//! is signed; market data is public.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::coerce::{coerce_bool, coerce_f64};
use super::signing::{signed_query, timestamp_ms, ApiCredentials};
use super::{http_client, missing_credentials, network_label, send_json, top_of_book, ExchangeAdapter};
use crate::types::{CoinNetworkRecord, Exchange, OrderbookSnapshot, SETTLEMENT_ASSET};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const BASE_URL: &str = "https://api.binance.com";
const RECV_WINDOW: &str = "5000";
const API_KEY_HEADER: &str = "X-MBX-APIKEY";

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

/// Entry of `/sapi/v1/capital/config/getall`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CapitalCoin {
    coin: String,
    #[serde(default)]
    network_list: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CapitalNetwork {
    network: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    contract_address: Option<String>,
    #[serde(default)]
    deposit_enable: Value,
    #[serde(default)]
    withdraw_enable: Value,
    #[serde(default)]
    withdraw_fee: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeSymbol {
    base_asset: String,
    quote_asset: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    symbol: String,
    price: String,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

pub(crate) fn parse_networks(body: &Value) -> Vec<CoinNetworkRecord> {
    let Some(coins) = body.as_array() else {
        return Vec::new();
    };

    coins
        .iter()
        .filter_map(|c| serde_json::from_value::<CapitalCoin>(c.clone()).ok())
        .flat_map(|coin| {
            let ticker = coin.coin.trim().to_uppercase();
            coin.network_list
                .into_iter()
                .filter_map(|n| serde_json::from_value::<CapitalNetwork>(n).ok())
                .map(move |n| CoinNetworkRecord {
                    exchange: Exchange::Binance,
                    chain: network_label(&[Some(n.network.as_str()), n.name.as_deref()]),
                    base_ticker: ticker.clone(),
                    contract_address: n.contract_address.unwrap_or_default(),
                    deposit_enabled: coerce_bool(&n.deposit_enable),
                    withdraw_enabled: coerce_bool(&n.withdraw_enable),
                    withdrawal_fee: coerce_f64(&n.withdraw_fee).unwrap_or(0.0),
                })
        })
        .filter(|r| !r.base_ticker.is_empty() && !r.chain.is_empty())
        .collect()
}

/// `/api/v3/exchangeInfo` → bases trading against USDT.
pub(crate) fn parse_trade_status(body: &Value) -> HashSet<String> {
    body.get("symbols")
        .and_then(Value::as_array)
        .map(|symbols| {
            symbols
                .iter()
                .filter_map(|s| serde_json::from_value::<ExchangeSymbol>(s.clone()).ok())
                .filter(|s| s.quote_asset.eq_ignore_ascii_case(SETTLEMENT_ASSET))
                .filter(|s| s.status.eq_ignore_ascii_case("TRADING"))
                .map(|s| s.base_asset.to_uppercase())
                .collect()
        })
        .unwrap_or_default()
}

/// `/api/v3/ticker/price` → USDT price per base. Shared with MEXC.
pub(crate) fn parse_ticker_prices(body: &Value) -> HashMap<String, f64> {
    body.as_array()
        .map(|tickers| {
            tickers
                .iter()
                .filter_map(|t| serde_json::from_value::<TickerPrice>(t.clone()).ok())
                .filter_map(|t| {
                    let base = t.symbol.to_uppercase().strip_suffix(SETTLEMENT_ASSET)?.to_string();
                    let price = t.price.parse::<f64>().ok().filter(|p| *p > 0.0)?;
                    (!base.is_empty()).then_some((base, price))
                })
                .collect()
        })
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Binance platform client.
pub struct BinanceClient {
    http: Client,
    base_url: String,
    credentials: Option<ApiCredentials>,
}

impl BinanceClient {
    pub fn new(base_url: Option<String>, credentials: Option<ApiCredentials>) -> Result<Self> {
        Ok(Self {
            http: http_client(Exchange::Binance)?,
            base_url: base_url.unwrap_or_else(|| BASE_URL.to_string()),
            credentials,
        })
    }
}

#[async_trait]
impl ExchangeAdapter for BinanceClient {
    fn exchange(&self) -> Exchange {
        Exchange::Binance
    }

    async fn fetch_networks(&self) -> Result<Vec<CoinNetworkRecord>> {
        let creds = self
            .credentials
            .as_ref()
            .ok_or_else(|| missing_credentials(Exchange::Binance))?;
        let query = signed_query(creds, &[("recvWindow", RECV_WINDOW.to_string())], timestamp_ms())?;
        let url = format!("{}/sapi/v1/capital/config/getall?{query}", self.base_url);

        let body = send_json(
            self.http.get(&url).header(API_KEY_HEADER, &creds.api_key),
            Exchange::Binance,
        )
        .await?;

        let records = parse_networks(&body);
        debug!(count = records.len(), "Binance networks parsed");
        Ok(records)
    }

    async fn fetch_tradeable_symbols(&self) -> Result<HashSet<String>> {
        let url = format!("{}/api/v3/exchangeInfo", self.base_url);
        let body = send_json(self.http.get(&url), Exchange::Binance).await?;
        Ok(parse_trade_status(&body))
    }

    async fn fetch_last_prices(&self) -> Result<HashMap<String, f64>> {
        let url = format!("{}/api/v3/ticker/price", self.base_url);
        let body = send_json(self.http.get(&url), Exchange::Binance).await?;
        Ok(parse_ticker_prices(&body))
    }

    async fn fetch_orderbook(&self, base: &str) -> Result<OrderbookSnapshot> {
        let symbol = format!("{}{SETTLEMENT_ASSET}", base.trim().to_uppercase());
        let url = format!("{}/api/v3/depth?symbol={symbol}&limit=5", self.base_url);
        let body = send_json(self.http.get(&url), Exchange::Binance).await?;
        top_of_book(&body["bids"], &body["asks"], Exchange::Binance)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
