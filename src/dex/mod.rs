//! DEX quote gateway.
//!
//! Defines the `DexQuoteGateway` trait the scan pipeline calls once per
//! (token, DEX) pair, and an HTTP implementation for aggregator-style quote
//! endpoints.

pub mod http;

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

use crate::types::{DexQuotePair, InputAmounts, TrackedPairToken};

/// One both-direction quote request.
#[derive(Debug, Clone, Copy)]
pub struct QuoteRequest<'a> {
    pub token: &'a TrackedPairToken,
    pub dex: &'a str,
    /// Human-unit inputs, already net of withdrawal fees.
    pub amounts: InputAmounts,
}

/// Source of DEX swap quotes.
///
/// A returned `Ok` is the single result for this request; either direction
/// may be `None` when the DEX has no route for it. Implementors give up
/// after `timeout`.
#[async_trait]
pub trait DexQuoteGateway: Send + Sync {
    async fn get_quotes(&self, request: QuoteRequest<'_>, timeout: Duration) -> Result<DexQuotePair>;
}
