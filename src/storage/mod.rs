//! Persistence layer.
//!
//! JSON files only: the tracked token list and optional coin snapshots are
//! read at startup, and the last scan report is written after each scan.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::engine::{ScanSummary, TokenSnapshot};
use crate::types::{CoinNetworkRecord, ScanState, ScanStats, TrackedPairToken};

/// What the last scan produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub generated_at: DateTime<Utc>,
    pub state: ScanState,
    pub aborted: bool,
    pub stats: ScanStats,
    pub tokens: Vec<TokenSnapshot>,
}

impl ScanReport {
    pub fn new(summary: &ScanSummary, tokens: Vec<TokenSnapshot>) -> Self {
        Self {
            generated_at: Utc::now(),
            state: summary.state,
            aborted: summary.aborted,
            stats: summary.stats.clone(),
            tokens,
        }
    }

    /// Token and PnL of the best successful direction across the report.
    pub fn best_pnl(&self) -> Option<(&TokenSnapshot, f64)> {
        self.tokens
            .iter()
            .flat_map(|t| {
                t.dex.iter().flat_map(move |d| {
                    [&d.token_to_pair, &d.pair_to_token]
                        .into_iter()
                        .filter_map(move |r| r.as_ref().ok().map(|p| (t, p.pnl)))
                })
            })
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }
}

/// Load the tracked token list.
pub fn load_tokens(path: &str) -> Result<Vec<TrackedPairToken>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read token list from {path}"))?;
    let tokens: Vec<TrackedPairToken> = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse token list from {path}"))?;

    let without_cex = tokens.iter().filter(|t| t.primary_exchange().is_none()).count();
    if without_cex > 0 {
        warn!(path, count = without_cex, "Tokens without a usable primary CEX");
    }
    info!(path, count = tokens.len(), "Token list loaded");
    Ok(tokens)
}

/// Load a coin-network snapshot. A missing file gives an empty snapshot.
pub fn load_coin_snapshot(path: &str) -> Result<Vec<CoinNetworkRecord>> {
    if !Path::new(path).exists() {
        info!(path, "No coin snapshot found");
        return Ok(Vec::new());
    }
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read coin snapshot from {path}"))?;
    let records: Vec<CoinNetworkRecord> = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse coin snapshot from {path}"))?;
    debug!(path, records = records.len(), "Coin snapshot loaded");
    Ok(records)
}

/// Save a scan report to a JSON file.
pub fn save_report(report: &ScanReport, path: &str) -> Result<()> {
    let json = serde_json::to_string_pretty(report)
        .context("Failed to serialise scan report")?;

    std::fs::write(path, &json)
        .with_context(|| format!("Failed to write scan report to {path}"))?;

    debug!(path, tokens = report.tokens.len(), "Scan report saved");
    Ok(())
}

/// Load the last scan report.
/// Returns None if the file doesn't exist (no scan yet).
pub fn load_report(path: &str) -> Result<Option<ScanReport>> {
    if !Path::new(path).exists() {
        return Ok(None);
    }

    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read scan report from {path}"))?;
    let report: ScanReport = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse scan report from {path}"))?;

    info!(
        path,
        generated_at = %report.generated_at,
        stats = %report.stats,
        "Previous scan report loaded"
    );
    Ok(Some(report))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
