//! MEXC spot integration.
//!
//! API docs: https://mexcdevelop.github.io/apidocs/spot_v3_en/
//! Base URL: https://api.mexc.com
//! Auth: same query-signature scheme as Binance, key sent in
//! `X-MEXC-APIKEY`. Market data endpoints mirror Binance's shapes.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::binance::parse_ticker_prices;
use super::coerce::{coerce_bool, coerce_f64, coerce_str};
use super::signing::{signed_query, timestamp_ms, ApiCredentials};
use super::{http_client, missing_credentials, network_label, send_json, top_of_book, ExchangeAdapter};
use crate::types::{CoinNetworkRecord, Exchange, OrderbookSnapshot, SETTLEMENT_ASSET};

const BASE_URL: &str = "https://api.mexc.com";
const RECV_WINDOW: &str = "5000";
const API_KEY_HEADER: &str = "X-MEXC-APIKEY";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MexcCoin {
    coin: String,
    #[serde(default)]
    network_list: Vec<Value>,
}

/// MEXC networks carry both `network` (display) and `netWork` (code).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MexcNetwork {
    #[serde(default)]
    network: Option<String>,
    #[serde(default, rename = "netWork")]
    net_work: Option<String>,
    #[serde(default)]
    contract: Option<String>,
    #[serde(default)]
    deposit_enable: Value,
    #[serde(default)]
    withdraw_enable: Value,
    #[serde(default)]
    withdraw_fee: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MexcSymbol {
    base_asset: String,
    quote_asset: String,
    #[serde(default)]
    status: Value,
    #[serde(default)]
    is_spot_trading_allowed: Option<bool>,
}

pub(crate) fn parse_networks(body: &Value) -> Vec<CoinNetworkRecord> {
    let Some(coins) = body.as_array() else {
        return Vec::new();
    };

    coins
        .iter()
        .filter_map(|c| serde_json::from_value::<MexcCoin>(c.clone()).ok())
        .flat_map(|coin| {
            let ticker = coin.coin.trim().to_uppercase();
            coin.network_list
                .into_iter()
                .filter_map(|n| serde_json::from_value::<MexcNetwork>(n).ok())
                .map(move |n| CoinNetworkRecord {
                    exchange: Exchange::Mexc,
                    chain: network_label(&[n.net_work.as_deref(), n.network.as_deref()]),
                    base_ticker: ticker.clone(),
                    contract_address: n.contract.unwrap_or_default(),
                    deposit_enabled: coerce_bool(&n.deposit_enable),
                    withdraw_enabled: coerce_bool(&n.withdraw_enable),
                    withdrawal_fee: coerce_f64(&n.withdraw_fee).unwrap_or(0.0),
                })
        })
        .filter(|r| !r.base_ticker.is_empty() && !r.chain.is_empty())
        .collect()
}

/// MEXC reports symbol status as "1"/"ENABLED" (v3) and sometimes an
/// explicit spot-trading flag.
pub(crate) fn parse_trade_status(body: &Value) -> HashSet<String> {
    body.get("symbols")
        .and_then(Value::as_array)
        .map(|symbols| {
            symbols
                .iter()
                .filter_map(|s| serde_json::from_value::<MexcSymbol>(s.clone()).ok())
                .filter(|s| s.quote_asset.eq_ignore_ascii_case(SETTLEMENT_ASSET))
                .filter(|s| {
                    let status_ok = match &s.status {
                        Value::String(raw) => coerce_str(raw).unwrap_or(false),
                        other => coerce_bool(other),
                    };
                    status_ok && s.is_spot_trading_allowed.unwrap_or(true)
                })
                .map(|s| s.base_asset.to_uppercase())
                .collect()
        })
        .unwrap_or_default()
}

/// MEXC platform client.
pub struct MexcClient {
    http: Client,
    base_url: String,
    credentials: Option<ApiCredentials>,
}

impl MexcClient {
    pub fn new(base_url: Option<String>, credentials: Option<ApiCredentials>) -> Result<Self> {
        Ok(Self {
            http: http_client(Exchange::Mexc)?,
            base_url: base_url.unwrap_or_else(|| BASE_URL.to_string()),
            credentials,
        })
    }
}

#[async_trait]
impl ExchangeAdapter for MexcClient {
    fn exchange(&self) -> Exchange {
        Exchange::Mexc
    }

    async fn fetch_networks(&self) -> Result<Vec<CoinNetworkRecord>> {
        let creds = self
            .credentials
            .as_ref()
            .ok_or_else(|| missing_credentials(Exchange::Mexc))?;
        let query = signed_query(creds, &[("recvWindow", RECV_WINDOW.to_string())], timestamp_ms())?;
        let url = format!("{}/api/v3/capital/config/getall?{query}", self.base_url);

        let body = send_json(
            self.http.get(&url).header(API_KEY_HEADER, &creds.api_key),
            Exchange::Mexc,
        )
        .await?;

        let records = parse_networks(&body);
        debug!(count = records.len(), "MEXC networks parsed");
        Ok(records)
    }

    async fn fetch_tradeable_symbols(&self) -> Result<HashSet<String>> {
        let url = format!("{}/api/v3/exchangeInfo", self.base_url);
        let body = send_json(self.http.get(&url), Exchange::Mexc).await?;
        Ok(parse_trade_status(&body))
    }

    async fn fetch_last_prices(&self) -> Result<HashMap<String, f64>> {
        let url = format!("{}/api/v3/ticker/price", self.base_url);
        let body = send_json(self.http.get(&url), Exchange::Mexc).await?;
        Ok(parse_ticker_prices(&body))
    }

    async fn fetch_orderbook(&self, base: &str) -> Result<OrderbookSnapshot> {
        let symbol = format!("{}{SETTLEMENT_ASSET}", base.trim().to_uppercase());
        let url = format!("{}/api/v3/depth?symbol={symbol}&limit=5", self.base_url);
        let body = send_json(self.http.get(&url), Exchange::Mexc).await?;
        top_of_book(&body["bids"], &body["asks"], Exchange::Mexc)
    }
}
