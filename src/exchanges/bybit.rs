//! Bybit v5 spot integration.
//!
//! API docs: https://bybit-exchange.github.io/docs/v5/intro
//! Base URL: https://api.bybit.com
//! Auth: HMAC-SHA256 over `timestamp + apiKey + recvWindow + queryString`,
//! sent with the five `X-BAPI-*` headers. Only the coin info call is signed.
//!
//! Coin info rows have drifted across API revisions, so field names are
//! looked up through alias lists rather than a fixed struct.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::coerce::{coerce_bool, coerce_f64, pick, pick_str};
use super::signing::{timestamp_ms, ApiCredentials};
use super::{http_client, missing_credentials, network_label, send_json, top_of_book, ExchangeAdapter};
use crate::types::{CoinNetworkRecord, Exchange, OrderbookSnapshot, SETTLEMENT_ASSET};

const BASE_URL: &str = "https://api.bybit.com";
const RECV_WINDOW: &str = "5000";

const COIN_KEYS: &[&str] = &["coin", "name", "currency"];
const CHAIN_LIST_KEYS: &[&str] = &["chains", "chainInfos", "chainList"];
const CHAIN_TYPE_KEYS: &[&str] = &["chainType", "chainName", "name"];
const CHAIN_CODE_KEYS: &[&str] = &["chain", "chainCode", "network"];
const CONTRACT_KEYS: &[&str] = &["contractAddress", "contract", "tokenAddress"];
const DEPOSIT_KEYS: &[&str] = &["chainDeposit", "depositEnable", "canDeposit", "rechargeable"];
const WITHDRAW_KEYS: &[&str] = &["chainWithdraw", "withdrawEnable", "canWithdraw", "withdrawable"];
const FEE_KEYS: &[&str] = &["withdrawFee", "withdrawalFee", "fee"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BybitInstrument {
    base_coin: String,
    quote_coin: String,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BybitTicker {
    symbol: String,
    #[serde(default)]
    last_price: Value,
}

/// Check `retCode == 0` and return `result`.
fn unwrap_result(body: Value) -> Result<Value> {
    let code = body.get("retCode").and_then(Value::as_i64).unwrap_or(-1);
    if code != 0 {
        let msg = body.get("retMsg").and_then(Value::as_str).unwrap_or("unknown error");
        anyhow::bail!("bybit API error retCode {code}: {msg}");
    }
    Ok(body.get("result").cloned().unwrap_or(Value::Null))
}

/// Sign payload: `timestamp + apiKey + recvWindow + queryString`.
pub(crate) fn sign_payload(creds: &ApiCredentials, timestamp: i64, query: &str) -> Result<String> {
    creds.sign_sha256(&format!("{timestamp}{}{RECV_WINDOW}{query}", creds.api_key))
}

fn parse_chain(ticker: &str, chain: &Value) -> Option<CoinNetworkRecord> {
    let label = network_label(&[
        pick_str(chain, CHAIN_TYPE_KEYS).as_deref(),
        pick_str(chain, CHAIN_CODE_KEYS).as_deref(),
    ]);
    if label.is_empty() {
        return None;
    }
    Some(CoinNetworkRecord {
        exchange: Exchange::Bybit,
        chain: label,
        base_ticker: ticker.to_string(),
        contract_address: pick_str(chain, CONTRACT_KEYS).unwrap_or_default(),
        deposit_enabled: pick(chain, DEPOSIT_KEYS).map(coerce_bool).unwrap_or(false),
        withdraw_enabled: pick(chain, WITHDRAW_KEYS).map(coerce_bool).unwrap_or(false),
        withdrawal_fee: pick(chain, FEE_KEYS).and_then(coerce_f64).unwrap_or(0.0),
    })
}

pub(crate) fn parse_networks(result: &Value) -> Vec<CoinNetworkRecord> {
    let rows = pick(result, &["rows", "list"])
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    rows.iter()
        .filter_map(|row| {
            let ticker = pick_str(row, COIN_KEYS)?.to_uppercase();
            let chains = pick(row, CHAIN_LIST_KEYS)?.as_array()?;
            Some(
                chains
                    .iter()
                    .filter_map(|c| parse_chain(&ticker, c))
                    .collect::<Vec<_>>(),
            )
        })
        .flatten()
        .collect()
}

pub(crate) fn parse_trade_status(result: &Value) -> HashSet<String> {
    result
        .get("list")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(|s| serde_json::from_value::<BybitInstrument>(s.clone()).ok())
                .filter(|s| s.quote_coin.eq_ignore_ascii_case(SETTLEMENT_ASSET))
                .filter(|s| s.status.eq_ignore_ascii_case("Trading"))
                .map(|s| s.base_coin.to_uppercase())
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn parse_prices(result: &Value) -> HashMap<String, f64> {
    result
        .get("list")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(|t| serde_json::from_value::<BybitTicker>(t.clone()).ok())
                .filter_map(|t| {
                    let base = t.symbol.to_uppercase().strip_suffix(SETTLEMENT_ASSET)?.to_string();
                    let price = coerce_f64(&t.last_price).filter(|p| *p > 0.0)?;
                    (!base.is_empty()).then_some((base, price))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Bybit platform client.
pub struct BybitClient {
    http: Client,
    base_url: String,
    credentials: Option<ApiCredentials>,
}

impl BybitClient {
    pub fn new(base_url: Option<String>, credentials: Option<ApiCredentials>) -> Result<Self> {
        Ok(Self {
            http: http_client(Exchange::Bybit)?,
            base_url: base_url.unwrap_or_else(|| BASE_URL.to_string()),
            credentials,
        })
    }

    async fn get_public(&self, path: &str) -> Result<Value> {
        let url = format!("{}{path}", self.base_url);
        let body = send_json(self.http.get(&url), Exchange::Bybit).await?;
        unwrap_result(body)
    }
}

#[async_trait]
impl ExchangeAdapter for BybitClient {
    fn exchange(&self) -> Exchange {
        Exchange::Bybit
    }

    async fn fetch_networks(&self) -> Result<Vec<CoinNetworkRecord>> {
        let creds = self
            .credentials
            .as_ref()
            .ok_or_else(|| missing_credentials(Exchange::Bybit))?;

        let query = "";
        let timestamp = timestamp_ms();
        let signature = sign_payload(creds, timestamp, query)?;
        let url = format!("{}/v5/asset/coin/query-info", self.base_url);

        let req = self
            .http
            .get(&url)
            .header("X-BAPI-API-KEY", &creds.api_key)
            .header("X-BAPI-SIGN", signature)
            .header("X-BAPI-SIGN-TYPE", "2")
            .header("X-BAPI-TIMESTAMP", timestamp.to_string())
            .header("X-BAPI-RECV-WINDOW", RECV_WINDOW);
        let result = unwrap_result(send_json(req, Exchange::Bybit).await?)?;

        let records = parse_networks(&result);
        debug!(count = records.len(), "Bybit networks parsed");
        Ok(records)
    }

    async fn fetch_tradeable_symbols(&self) -> Result<HashSet<String>> {
        let result = self
            .get_public("/v5/market/instruments-info?category=spot")
            .await?;
        Ok(parse_trade_status(&result))
    }

    async fn fetch_last_prices(&self) -> Result<HashMap<String, f64>> {
        let result = self.get_public("/v5/market/tickers?category=spot").await?;
        Ok(parse_prices(&result))
    }

    async fn fetch_orderbook(&self, base: &str) -> Result<OrderbookSnapshot> {
        let symbol = format!("{}{SETTLEMENT_ASSET}", base.trim().to_uppercase());
        let result = self
            .get_public(&format!("/v5/market/orderbook?category=spot&symbol={symbol}&limit=5"))
            .await?;
        top_of_book(&result["b"], &result["a"], Exchange::Bybit)
    }
}
