//! Indodax integration (IDR-quoted market).
//!
//! API docs: https://github.com/btcid/indodax-official-api-docs
//! Base URL: https://indodax.com
//! Auth: private calls are form-encoded POSTs to `/tapi`, signed with
//! HMAC-SHA512 over the body and sent with `Key` / `Sign` headers.
//!
//! `getInfo` only says which networks each coin travels on. Contract
//! addresses and withdrawal fees come from a snapshot supplied at build
//! time. Prices and books are IDR-quoted and converted through USDT/IDR.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::coerce::{coerce_bool, coerce_f64};
use super::signing::{encode_query, timestamp_ms, ApiCredentials};
use super::{best_level, http_client, missing_credentials, send_json, ExchangeAdapter};
use crate::types::{CoinNetworkRecord, Exchange, OrderbookSnapshot};

const BASE_URL: &str = "https://indodax.com";
const RECV_WINDOW: &str = "5000";
const USDT_IDR: &str = "usdt_idr";

#[derive(Debug, Deserialize)]
struct IndodaxPair {
    #[serde(default)]
    base_currency: String,
    #[serde(default)]
    traded_currency: String,
    #[serde(default)]
    is_maintenance: Value,
    #[serde(default)]
    is_market_suspended: Value,
}

/// `return.network` of `getInfo`: symbol → one network name or several.
pub(crate) fn parse_networks(body: &Value) -> Result<Vec<CoinNetworkRecord>> {
    if !coerce_bool(body.get("success").unwrap_or(&Value::Null)) {
        let msg = body.get("error").and_then(Value::as_str).unwrap_or("unknown error");
        anyhow::bail!("indodax API error: {msg}");
    }

    let Some(networks) = body.pointer("/return/network").and_then(Value::as_object) else {
        return Ok(Vec::new());
    };

    let mut records = Vec::new();
    for (symbol, value) in networks {
        let ticker = symbol.trim().to_uppercase();
        let names: Vec<&str> = match value {
            Value::String(s) => vec![s.as_str()],
            Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };
        records.extend(
            names
                .into_iter()
                .map(str::trim)
                .filter(|n| !n.is_empty() && !ticker.is_empty())
                .map(|name| CoinNetworkRecord {
                    exchange: Exchange::Indodax,
                    chain: name.to_string(),
                    base_ticker: ticker.clone(),
                    contract_address: String::new(),
                    deposit_enabled: true,
                    withdraw_enabled: true,
                    withdrawal_fee: 0.0,
                }),
        );
    }
    records.sort_by(|a, b| a.base_ticker.cmp(&b.base_ticker).then(a.chain.cmp(&b.chain)));
    Ok(records)
}

/// Bases with an active IDR or USDT market.
pub(crate) fn parse_trade_status(body: &Value) -> HashSet<String> {
    body.as_array()
        .map(|pairs| {
            pairs
                .iter()
                .filter_map(|p| serde_json::from_value::<IndodaxPair>(p.clone()).ok())
                .filter(|p| {
                    let quote = p.base_currency.to_lowercase();
                    quote == "idr" || quote == "usdt"
                })
                .filter(|p| !coerce_bool(&p.is_maintenance) && !coerce_bool(&p.is_market_suspended))
                .map(|p| p.traded_currency.to_uppercase())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// `tickers` of `ticker_all`, converted to USDT. `_usdt` markets win over
/// converted `_idr` ones.
pub(crate) fn parse_prices(body: &Value) -> HashMap<String, f64> {
    let Some(tickers) = body.get("tickers").and_then(Value::as_object) else {
        return HashMap::new();
    };
    let last = |t: &Value| t.get("last").and_then(coerce_f64).filter(|p| *p > 0.0);
    let usdt_idr = tickers.get(USDT_IDR).and_then(last);

    let mut prices = HashMap::new();
    for (pair, ticker) in tickers {
        let Some(price) = last(ticker) else { continue };
        if let Some(base) = pair.strip_suffix("_idr") {
            if let Some(rate) = usdt_idr {
                prices.entry(base.to_uppercase()).or_insert(price / rate);
            }
        }
    }
    for (pair, ticker) in tickers {
        if let (Some(base), Some(price)) = (pair.strip_suffix("_usdt"), last(ticker)) {
            prices.insert(base.to_uppercase(), price);
        }
    }
    prices.insert("USDT".to_string(), 1.0);
    prices
}

/// Depth endpoint of the `<base>idr` market.
pub(crate) fn depth_path(base: &str) -> String {
    format!("/api/depth/{}idr", base.trim().to_lowercase())
}

/// Convert an IDR book to USDT through the USDT/IDR book: selling the
/// token yields IDR that buys USDT at the ask, and vice versa.
pub(crate) fn convert_book(token_idr: &Value, usdt_idr: &Value) -> Result<OrderbookSnapshot> {
    let (Some(bid_idr), Some(ask_idr)) = (best_level(&token_idr["buy"]), best_level(&token_idr["sell"]))
    else {
        anyhow::bail!("indodax order book is empty");
    };
    let (Some(usdt_bid), Some(usdt_ask)) = (best_level(&usdt_idr["buy"]), best_level(&usdt_idr["sell"]))
    else {
        anyhow::bail!("indodax USDT/IDR order book is empty");
    };
    Ok(OrderbookSnapshot {
        best_bid: bid_idr / usdt_ask,
        best_ask: ask_idr / usdt_bid,
    })
}

/// Indodax platform client.
pub struct IndodaxClient {
    http: Client,
    base_url: String,
    credentials: Option<ApiCredentials>,
    snapshot: Vec<CoinNetworkRecord>,
}

impl IndodaxClient {
    pub fn new(
        base_url: Option<String>,
        credentials: Option<ApiCredentials>,
        snapshot: Vec<CoinNetworkRecord>,
    ) -> Result<Self> {
        Ok(Self {
            http: http_client(Exchange::Indodax)?,
            base_url: base_url.unwrap_or_else(|| BASE_URL.to_string()),
            credentials,
            snapshot,
        })
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let url = format!("{}{path}", self.base_url);
        send_json(self.http.get(&url), Exchange::Indodax).await
    }
}

/// Fill contract and fee from `snapshot` entries for the same ticker on
/// `chain_key`.
pub(crate) fn backfill_from(
    snapshot: &[CoinNetworkRecord],
    chain_key: &str,
    records: &mut [CoinNetworkRecord],
) {
    for record in records.iter_mut() {
        let known = snapshot.iter().find(|s| {
            s.base_ticker.eq_ignore_ascii_case(&record.base_ticker)
                && s.chain.eq_ignore_ascii_case(chain_key)
        });
        if let Some(known) = known {
            if record.contract_address.is_empty() {
                record.contract_address = known.contract_address.clone();
            }
            if record.withdrawal_fee == 0.0 {
                record.withdrawal_fee = known.withdrawal_fee;
            }
        }
    }
}

#[async_trait]
impl ExchangeAdapter for IndodaxClient {
    fn exchange(&self) -> Exchange {
        Exchange::Indodax
    }

    async fn fetch_networks(&self) -> Result<Vec<CoinNetworkRecord>> {
        let creds = self
            .credentials
            .as_ref()
            .ok_or_else(|| missing_credentials(Exchange::Indodax))?;

        let body = encode_query(&[
            ("method", "getInfo".to_string()),
            ("timestamp", timestamp_ms().to_string()),
            ("recvWindow", RECV_WINDOW.to_string()),
        ]);
        let signature = creds.sign_sha512(&body)?;
        let url = format!("{}/tapi", self.base_url);

        let req = self
            .http
            .post(&url)
            .header("Key", &creds.api_key)
            .header("Sign", signature)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body);
        let response = send_json(req, Exchange::Indodax).await?;

        let records = parse_networks(&response).context("Failed to read indodax getInfo")?;
        debug!(count = records.len(), "Indodax networks parsed");
        Ok(records)
    }

    fn backfill(&self, chain_key: &str, records: &mut [CoinNetworkRecord]) {
        backfill_from(&self.snapshot, chain_key, records);
    }

    async fn fetch_tradeable_symbols(&self) -> Result<HashSet<String>> {
        let body = self.get("/api/pairs").await?;
        Ok(parse_trade_status(&body))
    }

    async fn fetch_last_prices(&self) -> Result<HashMap<String, f64>> {
        let body = self.get("/api/ticker_all").await?;
        Ok(parse_prices(&body))
    }

    async fn fetch_orderbook(&self, base: &str) -> Result<OrderbookSnapshot> {
        let token_path = depth_path(base);
        let usdt_path = depth_path("usdt");
        let (token, usdt) = futures::try_join!(self.get(&token_path), self.get(&usdt_path))?;
        convert_book(&token, &usdt)
    }
}
