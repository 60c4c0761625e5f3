//! HTTP quote gateway for aggregator-style endpoints.
//!
//! Each DEX key maps to a quote URL answering
//! `GET {url}?chain=..&inputMint=..&outputMint=..&amount=<raw units>` with a
//! JSON body carrying `outAmount` in raw output units (Jupiter's shape).

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use super::{DexQuoteGateway, QuoteRequest};
use crate::types::{Direction, DexQuotePair, TrackedPairToken};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteResponse {
    out_amount: String,
}

/// Human units → integer raw units, or `None` for non-positive amounts.
pub(crate) fn to_raw(amount: f64, decimals: u8) -> Option<String> {
    if !amount.is_finite() || amount <= 0.0 {
        return None;
    }
    let raw = (amount * 10f64.powi(decimals as i32)).floor();
    (raw >= 1.0).then(|| format!("{raw:.0}"))
}

pub(crate) fn from_raw(raw: &str, decimals: u8) -> Result<f64> {
    let value: f64 = raw
        .trim()
        .parse()
        .with_context(|| format!("Invalid outAmount: {raw}"))?;
    Ok(value / 10f64.powi(decimals as i32))
}

/// Mint addresses and decimals for one swap direction.
struct Leg<'a> {
    input_mint: &'a str,
    output_mint: &'a str,
    input_decimals: u8,
    output_decimals: u8,
}

fn leg(token: &TrackedPairToken, direction: Direction) -> Option<Leg<'_>> {
    let base = (token.base_contract.as_deref()?, token.base_decimals?);
    let pair = (token.pair_contract.as_deref()?, token.pair_decimals?);
    let (input, output) = match direction {
        Direction::TokenToPair => (base, pair),
        Direction::PairToToken => (pair, base),
    };
    Some(Leg {
        input_mint: input.0,
        output_mint: output.0,
        input_decimals: input.1,
        output_decimals: output.1,
    })
}

/// Quote gateway backed by one HTTP endpoint per DEX.
pub struct HttpDexQuoteGateway {
    http: Client,
    endpoints: HashMap<String, String>,
    api_key: Option<SecretString>,
}

impl HttpDexQuoteGateway {
    pub fn new(endpoints: HashMap<String, String>, api_key: Option<SecretString>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("ARBSCAN/0.1.0 (arbitrage-scanner)")
            .build()
            .context("Failed to build HTTP client for DEX quotes")?;
        Ok(Self {
            http,
            endpoints,
            api_key,
        })
    }

    fn endpoint(&self, dex: &str) -> Result<&str> {
        self.endpoints
            .get(dex)
            .map(String::as_str)
            .ok_or_else(|| anyhow!("No quote endpoint configured for DEX {dex}"))
    }

    async fn quote_direction(
        &self,
        url: &str,
        request: &QuoteRequest<'_>,
        direction: Direction,
    ) -> Result<Option<f64>> {
        let Some(leg) = leg(request.token, direction) else {
            debug!(token = %request.token.label(), %direction, "Missing contract or decimals, skipping direction");
            return Ok(None);
        };
        let amount = match direction {
            Direction::TokenToPair => request.amounts.token_to_pair,
            Direction::PairToToken => request.amounts.pair_to_token,
        };
        let Some(raw) = to_raw(amount, leg.input_decimals) else {
            return Ok(None);
        };

        let mut req = self.http.get(url).query(&[
            ("chain", request.token.chain.as_str()),
            ("inputMint", leg.input_mint),
            ("outputMint", leg.output_mint),
            ("amount", raw.as_str()),
        ]);
        if let Some(key) = &self.api_key {
            req = req.header("x-api-key", key.expose_secret());
        }

        let resp = req
            .send()
            .await
            .with_context(|| format!("{} quote request failed", request.dex))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("{} quote error {status}: {body}", request.dex);
        }
        let quote: QuoteResponse = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse {} quote", request.dex))?;

        from_raw(&quote.out_amount, leg.output_decimals).map(Some)
    }
}

#[async_trait]
impl DexQuoteGateway for HttpDexQuoteGateway {
    async fn get_quotes(&self, request: QuoteRequest<'_>, timeout: Duration) -> Result<DexQuotePair> {
        let url = self.endpoint(request.dex)?;

        let both = async {
            tokio::join!(
                self.quote_direction(url, &request, Direction::TokenToPair),
                self.quote_direction(url, &request, Direction::PairToToken),
            )
        };
        let (forward, backward) = tokio::time::timeout(timeout, both).await.map_err(|_| {
            anyhow!("{} quote timed out after {}ms", request.dex, timeout.as_millis())
        })?;

        match (forward, backward) {
            (Err(e), Err(_)) => Err(e),
            (forward, backward) => {
                let keep = |r: Result<Option<f64>>, direction: Direction| {
                    r.unwrap_or_else(|e| {
                        warn!(dex = request.dex, %direction, error = %e, "Quote direction failed");
                        None
                    })
                };
                Ok(DexQuotePair {
                    token_to_pair: keep(forward, Direction::TokenToPair),
                    pair_to_token: keep(backward, Direction::PairToToken),
                })
            }
        }
    }
}
