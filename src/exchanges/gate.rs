//! Gate spot integration.
//!
//! API docs: https://www.gate.io/docs/developers/apiv4/
//! Base URL: https://api.gateio.ws/api/v4
//! Auth: none for the endpoints used here. Requests may be routed through
//! a relay by configuring a URL prefix.
//!
//! Gate's currency list is flat: each currency carries a `chains[]` array
//! whose status fields are inverted (`deposit_disabled`, `withdraw_disabled`).

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::coerce::{coerce_bool, coerce_f64, pick};
use super::{http_client, network_label, send_json, top_of_book, ExchangeAdapter};
use crate::types::{CoinNetworkRecord, Exchange, OrderbookSnapshot, SETTLEMENT_ASSET};

const BASE_URL: &str = "https://api.gateio.ws/api/v4";

#[derive(Debug, Deserialize)]
struct GateCurrency {
    currency: String,
    #[serde(default)]
    delisted: bool,
    #[serde(default)]
    chains: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct GateChain {
    name: String,
    #[serde(default)]
    addr: Option<String>,
    #[serde(default)]
    deposit_disabled: Value,
    #[serde(default)]
    withdraw_disabled: Value,
    #[serde(default)]
    withdraw_delayed: Value,
}

#[derive(Debug, Deserialize)]
struct GatePair {
    base: String,
    quote: String,
    #[serde(default)]
    trade_status: String,
}

#[derive(Debug, Deserialize)]
struct GateTicker {
    currency_pair: String,
    #[serde(default)]
    last: Value,
}

pub(crate) fn parse_networks(body: &Value) -> Vec<CoinNetworkRecord> {
    let Some(currencies) = body.as_array() else {
        return Vec::new();
    };

    currencies
        .iter()
        .filter_map(|c| serde_json::from_value::<GateCurrency>(c.clone()).ok())
        .filter(|c| !c.delisted)
        .flat_map(|currency| {
            let ticker = currency.currency.trim().to_uppercase();
            currency.chains.into_iter().filter_map(move |raw| {
                let chain = serde_json::from_value::<GateChain>(raw.clone()).ok()?;
                let fee = pick(&raw, &["withdraw_fee", "withdraw_fix"])
                    .and_then(coerce_f64)
                    .unwrap_or(0.0);
                Some(CoinNetworkRecord {
                    exchange: Exchange::Gate,
                    chain: network_label(&[Some(chain.name.as_str())]),
                    base_ticker: ticker.clone(),
                    contract_address: chain.addr.unwrap_or_default(),
                    deposit_enabled: !coerce_bool(&chain.deposit_disabled),
                    withdraw_enabled: !coerce_bool(&chain.withdraw_disabled)
                        && !coerce_bool(&chain.withdraw_delayed),
                    withdrawal_fee: fee,
                })
            })
        })
        .filter(|r| !r.base_ticker.is_empty() && !r.chain.is_empty())
        .collect()
}

pub(crate) fn parse_trade_status(body: &Value) -> HashSet<String> {
    body.as_array()
        .map(|pairs| {
            pairs
                .iter()
                .filter_map(|p| serde_json::from_value::<GatePair>(p.clone()).ok())
                .filter(|p| p.quote.eq_ignore_ascii_case(SETTLEMENT_ASSET))
                .filter(|p| p.trade_status.eq_ignore_ascii_case("tradable"))
                .map(|p| p.base.to_uppercase())
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn parse_prices(body: &Value) -> HashMap<String, f64> {
    let suffix = format!("_{SETTLEMENT_ASSET}");
    body.as_array()
        .map(|tickers| {
            tickers
                .iter()
                .filter_map(|t| serde_json::from_value::<GateTicker>(t.clone()).ok())
                .filter_map(|t| {
                    let base = t.currency_pair.to_uppercase().strip_suffix(&suffix)?.to_string();
                    let price = coerce_f64(&t.last).filter(|p| *p > 0.0)?;
                    Some((base, price))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Gate platform client.
pub struct GateClient {
    http: Client,
    base_url: String,
    proxy_prefix: Option<String>,
}

impl GateClient {
    pub fn new(base_url: Option<String>, proxy_prefix: Option<String>) -> Result<Self> {
        Ok(Self {
            http: http_client(Exchange::Gate)?,
            base_url: base_url.unwrap_or_else(|| BASE_URL.to_string()),
            proxy_prefix: proxy_prefix.filter(|p| !p.trim().is_empty()),
        })
    }

    fn url(&self, path: &str) -> String {
        match &self.proxy_prefix {
            Some(prefix) => format!("{prefix}{}{path}", self.base_url),
            None => format!("{}{path}", self.base_url),
        }
    }
}

#[async_trait]
impl ExchangeAdapter for GateClient {
    fn exchange(&self) -> Exchange {
        Exchange::Gate
    }

    async fn fetch_networks(&self) -> Result<Vec<CoinNetworkRecord>> {
        let body = send_json(self.http.get(self.url("/spot/currencies")), Exchange::Gate).await?;
        let records = parse_networks(&body);
        debug!(count = records.len(), "Gate networks parsed");
        Ok(records)
    }

    async fn fetch_tradeable_symbols(&self) -> Result<HashSet<String>> {
        let body = send_json(self.http.get(self.url("/spot/currency_pairs")), Exchange::Gate).await?;
        Ok(parse_trade_status(&body))
    }

    async fn fetch_last_prices(&self) -> Result<HashMap<String, f64>> {
        let body = send_json(self.http.get(self.url("/spot/tickers")), Exchange::Gate).await?;
        Ok(parse_prices(&body))
    }

    async fn fetch_orderbook(&self, base: &str) -> Result<OrderbookSnapshot> {
        let pair = format!("{}_{SETTLEMENT_ASSET}", base.trim().to_uppercase());
        let url = self.url(&format!("/spot/order_book?currency_pair={pair}&limit=5"));
        let body = send_json(self.http.get(url), Exchange::Gate).await?;
        top_of_book(&body["bids"], &body["asks"], Exchange::Gate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_networks_inverts_disabled_flags() {
        let body = json!([
            {
                "currency": "cake",
                "delisted": false,
                "chains": [
                    {
                        "name": "BSC",
                        "addr": "0x0e09fabb73bd3ade0a17ecc321fd13a19e81ce82",
                        "withdraw_disabled": false,
                        "withdraw_delayed": false,
                        "deposit_disabled": true
                    },
                    {
                        "name": "ETH",
                        "withdraw_disabled": "0",
                        "withdraw_delayed": "1",
                        "deposit_disabled": "0",
                        "withdraw_fix": "2.5"
                    },
                    { "addr": "no name" }
                ]
            },
            { "currency": "DEAD", "delisted": true, "chains": [{ "name": "ETH" }] }
        ]);

        let records = parse_networks(&body);
        assert_eq!(records.len(), 2);

        let bsc = &records[0];
        assert_eq!(bsc.base_ticker, "CAKE");
        assert!(!bsc.deposit_enabled);
        assert!(bsc.withdraw_enabled);
        assert_eq!(bsc.withdrawal_fee, 0.0);

        let eth = &records[1];
        assert!(eth.deposit_enabled);
        assert!(!eth.withdraw_enabled, "delayed withdrawals count as disabled");
        assert_eq!(eth.withdrawal_fee, 2.5);
    }

    #[test]
    fn test_parse_trade_status() {
        let body = json!([
            {"id": "BTC_USDT", "base": "BTC", "quote": "USDT", "trade_status": "tradable"},
            {"id": "OLD_USDT", "base": "OLD", "quote": "USDT", "trade_status": "untradable"},
            {"id": "ETH_BTC", "base": "ETH", "quote": "BTC", "trade_status": "tradable"}
        ]);
        let set = parse_trade_status(&body);
        assert_eq!(set.len(), 1);
        assert!(set.contains("BTC"));
    }

    #[test]
    fn test_parse_prices() {
        let body = json!([
            {"currency_pair": "BTC_USDT", "last": "64000.5"},
            {"currency_pair": "ETH_BTC", "last": "0.05"},
            {"currency_pair": "NOPE_USDT", "last": ""}
        ]);
        let prices = parse_prices(&body);
        assert_eq!(prices.len(), 1);
        assert_eq!(prices["BTC"], 64000.5);
    }

    #[test]
    fn test_proxy_prefix_applied() {
        let client = GateClient::new(None, Some("https://relay.example/?u=".into())).unwrap();
        assert_eq!(
            client.url("/spot/tickers"),
            "https://relay.example/?u=https://api.gateio.ws/api/v4/spot/tickers"
        );

        let direct = GateClient::new(None, Some("  ".into())).unwrap();
        assert_eq!(direct.url("/spot/tickers"), "https://api.gateio.ws/api/v4/spot/tickers");
    }
}
