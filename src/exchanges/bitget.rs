//! Bitget spot integration.
//!
//! API docs: https://www.bitget.com/api-doc/spot/intro
//! Base URL: https://api.bitget.com
//! Auth: none for the endpoints used here. Responses are wrapped as
//! `{ "code": "00000", "msg": "success", "data": ... }`.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::coerce::{coerce_bool, coerce_f64};
use super::{http_client, network_label, send_json, top_of_book, ExchangeAdapter};
use crate::types::{CoinNetworkRecord, Exchange, OrderbookSnapshot, SETTLEMENT_ASSET};

const BASE_URL: &str = "https://api.bitget.com";
const OK_CODE: &str = "00000";

#[derive(Debug, Deserialize)]
struct BitgetCoin {
    coin: String,
    #[serde(default)]
    chains: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BitgetChain {
    chain: String,
    #[serde(default)]
    contract_address: Option<String>,
    #[serde(default)]
    rechargeable: Value,
    #[serde(default)]
    withdrawable: Value,
    #[serde(default)]
    withdraw_fee: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BitgetSymbol {
    base_coin: String,
    quote_coin: String,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BitgetTicker {
    symbol: String,
    #[serde(default)]
    last_pr: Value,
}

fn unwrap_data(body: Value) -> Result<Value> {
    let code = body.get("code").and_then(Value::as_str).unwrap_or_default();
    if code != OK_CODE {
        let msg = body.get("msg").and_then(Value::as_str).unwrap_or("unknown error");
        anyhow::bail!("bitget API error code {code}: {msg}");
    }
    Ok(body.get("data").cloned().unwrap_or(Value::Null))
}

pub(crate) fn parse_networks(data: &Value) -> Vec<CoinNetworkRecord> {
    let Some(coins) = data.as_array() else {
        return Vec::new();
    };

    coins
        .iter()
        .filter_map(|c| serde_json::from_value::<BitgetCoin>(c.clone()).ok())
        .flat_map(|coin| {
            let ticker = coin.coin.trim().to_uppercase();
            coin.chains
                .into_iter()
                .filter_map(|c| serde_json::from_value::<BitgetChain>(c).ok())
                .map(move |c| CoinNetworkRecord {
                    exchange: Exchange::Bitget,
                    chain: network_label(&[Some(c.chain.as_str())]),
                    base_ticker: ticker.clone(),
                    contract_address: c.contract_address.unwrap_or_default(),
                    deposit_enabled: coerce_bool(&c.rechargeable),
                    withdraw_enabled: coerce_bool(&c.withdrawable),
                    withdrawal_fee: coerce_f64(&c.withdraw_fee).unwrap_or(0.0),
                })
        })
        .filter(|r| !r.base_ticker.is_empty() && !r.chain.is_empty())
        .collect()
}

pub(crate) fn parse_trade_status(data: &Value) -> HashSet<String> {
    data.as_array()
        .map(|symbols| {
            symbols
                .iter()
                .filter_map(|s| serde_json::from_value::<BitgetSymbol>(s.clone()).ok())
                .filter(|s| s.quote_coin.eq_ignore_ascii_case(SETTLEMENT_ASSET))
                .filter(|s| s.status.eq_ignore_ascii_case("online"))
                .map(|s| s.base_coin.to_uppercase())
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn parse_prices(data: &Value) -> HashMap<String, f64> {
    data.as_array()
        .map(|tickers| {
            tickers
                .iter()
                .filter_map(|t| serde_json::from_value::<BitgetTicker>(t.clone()).ok())
                .filter_map(|t| {
                    let base = t.symbol.to_uppercase().strip_suffix(SETTLEMENT_ASSET)?.to_string();
                    let price = coerce_f64(&t.last_pr).filter(|p| *p > 0.0)?;
                    (!base.is_empty()).then_some((base, price))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Bitget platform client.
pub struct BitgetClient {
    http: Client,
    base_url: String,
}

impl BitgetClient {
    pub fn new(base_url: Option<String>) -> Result<Self> {
        Ok(Self {
            http: http_client(Exchange::Bitget)?,
            base_url: base_url.unwrap_or_else(|| BASE_URL.to_string()),
        })
    }

    async fn get_data(&self, path: &str) -> Result<Value> {
        let url = format!("{}{path}", self.base_url);
        let body = send_json(self.http.get(&url), Exchange::Bitget).await?;
        unwrap_data(body)
    }
}

#[async_trait]
impl ExchangeAdapter for BitgetClient {
    fn exchange(&self) -> Exchange {
        Exchange::Bitget
    }

    async fn fetch_networks(&self) -> Result<Vec<CoinNetworkRecord>> {
        let data = self.get_data("/api/v2/spot/public/coins").await?;
        let records = parse_networks(&data);
        debug!(count = records.len(), "Bitget networks parsed");
        Ok(records)
    }

    async fn fetch_tradeable_symbols(&self) -> Result<HashSet<String>> {
        let data = self.get_data("/api/v2/spot/public/symbols").await?;
        Ok(parse_trade_status(&data))
    }

    async fn fetch_last_prices(&self) -> Result<HashMap<String, f64>> {
        let data = self.get_data("/api/v2/spot/market/tickers").await?;
        Ok(parse_prices(&data))
    }

    async fn fetch_orderbook(&self, base: &str) -> Result<OrderbookSnapshot> {
        let symbol = format!("{}{SETTLEMENT_ASSET}", base.trim().to_uppercase());
        let data = self
            .get_data(&format!(
                "/api/v2/spot/market/orderbook?symbol={symbol}&type=step0&limit=5"
            ))
            .await?;
        top_of_book(&data["bids"], &data["asks"], Exchange::Bitget)
    }
}
