//! KuCoin spot integration.
//!
//! API docs: https://www.kucoin.com/docs/rest/spot-trading/market-data/introduction
//! Base URL: https://api.kucoin.com
//! Auth: none for the endpoints used here.
//!
//! Every response is wrapped as `{ "code": "200000", "data": ... }`; any
//! other code is an application error even on HTTP 200.

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

const BASE_URL: &str = "https://api.kucoin.com";
const OK_CODE: &str = "200000";

#[derive(Debug, Deserialize)]
struct KucoinCurrency {
    currency: String,
    #[serde(default)]
    chains: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KucoinChain {
    #[serde(default)]
    chain_name: Option<String>,
    #[serde(default)]
    chain_id: Option<String>,
    #[serde(default)]
    contract_address: Option<String>,
    #[serde(default)]
    is_deposit_enabled: Value,
    #[serde(default)]
    is_withdraw_enabled: Value,
    #[serde(default)]
    withdrawal_min_fee: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KucoinSymbol {
    base_currency: String,
    quote_currency: String,
    #[serde(default)]
    enable_trading: bool,
}

#[derive(Debug, Deserialize)]
struct KucoinTicker {
    symbol: String,
    #[serde(default)]
    last: Value,
}

/// Unwrap the `{code, data}` envelope.
fn unwrap_data(body: Value) -> Result<Value> {
    let code = body.get("code").and_then(Value::as_str).unwrap_or_default();
    if code != OK_CODE {
        let msg = body.get("msg").and_then(Value::as_str).unwrap_or("unknown error");
        anyhow::bail!("kucoin API error code {code}: {msg}");
    }
    Ok(body.get("data").cloned().unwrap_or(Value::Null))
}

pub(crate) fn parse_networks(data: &Value) -> Vec<CoinNetworkRecord> {
    let Some(currencies) = data.as_array() else {
        return Vec::new();
    };

    currencies
        .iter()
        .filter_map(|c| serde_json::from_value::<KucoinCurrency>(c.clone()).ok())
        .flat_map(|currency| {
            let ticker = currency.currency.trim().to_uppercase();
            currency
                .chains
                .unwrap_or_default()
                .into_iter()
                .filter_map(|c| serde_json::from_value::<KucoinChain>(c).ok())
                .map(move |c| CoinNetworkRecord {
                    exchange: Exchange::Kucoin,
                    chain: network_label(&[c.chain_name.as_deref(), c.chain_id.as_deref()]),
                    base_ticker: ticker.clone(),
                    contract_address: c.contract_address.unwrap_or_default(),
                    deposit_enabled: coerce_bool(&c.is_deposit_enabled),
                    withdraw_enabled: coerce_bool(&c.is_withdraw_enabled),
                    withdrawal_fee: coerce_f64(&c.withdrawal_min_fee).unwrap_or(0.0),
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
                .filter_map(|s| serde_json::from_value::<KucoinSymbol>(s.clone()).ok())
                .filter(|s| s.enable_trading)
                .filter(|s| s.quote_currency.eq_ignore_ascii_case(SETTLEMENT_ASSET))
                .map(|s| s.base_currency.to_uppercase())
                .collect()
        })
        .unwrap_or_default()
}

/// `data.ticker[]` of `allTickers`, symbols formatted `BASE-USDT`.
pub(crate) fn parse_prices(data: &Value) -> HashMap<String, f64> {
    let suffix = format!("-{SETTLEMENT_ASSET}");
    data.get("ticker")
        .and_then(Value::as_array)
        .map(|tickers| {
            tickers
                .iter()
                .filter_map(|t| serde_json::from_value::<KucoinTicker>(t.clone()).ok())
                .filter_map(|t| {
                    let base = t.symbol.to_uppercase().strip_suffix(&suffix)?.to_string();
                    let price = coerce_f64(&t.last).filter(|p| *p > 0.0)?;
                    Some((base, price))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// KuCoin platform client.
pub struct KucoinClient {
    http: Client,
    base_url: String,
}

impl KucoinClient {
    pub fn new(base_url: Option<String>) -> Result<Self> {
        Ok(Self {
            http: http_client(Exchange::Kucoin)?,
            base_url: base_url.unwrap_or_else(|| BASE_URL.to_string()),
        })
    }

    async fn get_data(&self, path: &str) -> Result<Value> {
        let url = format!("{}{path}", self.base_url);
        let body = send_json(self.http.get(&url), Exchange::Kucoin).await?;
        unwrap_data(body)
    }
}

#[async_trait]
impl ExchangeAdapter for KucoinClient {
    fn exchange(&self) -> Exchange {
        Exchange::Kucoin
    }

    async fn fetch_networks(&self) -> Result<Vec<CoinNetworkRecord>> {
        let data = self.get_data("/api/v3/currencies").await?;
        let records = parse_networks(&data);
        debug!(count = records.len(), "KuCoin networks parsed");
        Ok(records)
    }

    async fn fetch_tradeable_symbols(&self) -> Result<HashSet<String>> {
        let data = self.get_data("/api/v2/symbols").await?;
        Ok(parse_trade_status(&data))
    }

    async fn fetch_last_prices(&self) -> Result<HashMap<String, f64>> {
        let data = self.get_data("/api/v1/market/allTickers").await?;
        Ok(parse_prices(&data))
    }

    async fn fetch_orderbook(&self, base: &str) -> Result<OrderbookSnapshot> {
        let symbol = format!("{}-{SETTLEMENT_ASSET}", base.trim().to_uppercase());
        let data = self
            .get_data(&format!("/api/v1/market/orderbook/level2_20?symbol={symbol}"))
            .await?;
        top_of_book(&data["bids"], &data["asks"], Exchange::Kucoin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unwrap_data_rejects_error_code() {
        let err = unwrap_data(json!({"code": "400100", "msg": "Invalid symbol"})).unwrap_err();
        assert!(err.to_string().contains("400100"));
        assert!(err.to_string().contains("Invalid symbol"));

        let data = unwrap_data(json!({"code": "200000", "data": [1, 2]})).unwrap();
        assert_eq!(data, json!([1, 2]));
    }

    #[test]
    fn test_parse_networks() {
        let data = json!([
            {
                "currency": "usdt",
                "chains": [
                    {
                        "chainName": "BEP20",
                        "chainId": "bsc",
                        "contractAddress": "0x55d398326f99059ff775485246999027b3197955",
                        "isDepositEnabled": true,
                        "isWithdrawEnabled": false,
                        "withdrawalMinFee": "0.8"
                    }
                ]
            },
            { "currency": "NOCHAINS", "chains": null }
        ]);
        let records = parse_networks(&data);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].base_ticker, "USDT");
        assert_eq!(records[0].chain, "BEP20 / bsc");
        assert!(records[0].deposit_enabled);
        assert!(!records[0].withdraw_enabled);
        assert_eq!(records[0].withdrawal_fee, 0.8);
    }

    #[test]
    fn test_parse_trade_status() {
        let data = json!([
            {"symbol": "KCS-USDT", "baseCurrency": "KCS", "quoteCurrency": "USDT", "enableTrading": true},
            {"symbol": "OLD-USDT", "baseCurrency": "OLD", "quoteCurrency": "USDT", "enableTrading": false},
            {"symbol": "KCS-BTC", "baseCurrency": "KCS", "quoteCurrency": "BTC", "enableTrading": true}
        ]);
        let set = parse_trade_status(&data);
        assert_eq!(set, HashSet::from(["KCS".to_string()]));
    }

    #[test]
    fn test_parse_prices() {
        let data = json!({
            "time": 1700000000000u64,
            "ticker": [
                {"symbol": "BTC-USDT", "last": "64000"},
                {"symbol": "BTC-USDC", "last": "64001"},
                {"symbol": "DEAD-USDT", "last": null}
            ]
        });
        let prices = parse_prices(&data);
        assert_eq!(prices.len(), 1);
        assert_eq!(prices["BTC"], 64000.0);
    }
}
