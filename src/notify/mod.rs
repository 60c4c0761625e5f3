//! Outbound alerts.
//!
//! Defines the `NotificationChannel` trait the orchestrator reports status
//! changes and profitable signals through. Delivery is best effort: channels
//! log their own failures and never hand an error back to the scan.

pub mod log;
pub mod telegram;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{Direction, PnlResult, TrackedPairToken};

/// Bot lifecycle status pushed to the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BotStatus {
    Online,
    Offline,
    Stopped,
    Error,
}

impl fmt::Display for BotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BotStatus::Online => "ONLINE",
            BotStatus::Offline => "OFFLINE",
            BotStatus::Stopped => "STOPPED",
            BotStatus::Error => "ERROR",
        })
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Name shown as the sender of every message.
    fn set_identity(&self, name: &str);

    async fn send_status(&self, status: BotStatus);

    async fn send_signal(&self, message: &str);
}

/// One-line signal text for a qualifying direction.
pub fn format_signal(
    token: &TrackedPairToken,
    exchange: &str,
    dex: &str,
    direction: Direction,
    result: &PnlResult,
) -> String {
    format!(
        "{} [{}] {} via {} on {}: pnl ${:.2} ({:.2}%), costs ${:.2}. {}",
        token.label(),
        token.chain.to_uppercase(),
        direction,
        dex,
        exchange,
        result.pnl,
        result.pnl_percent,
        result.costs,
        result.details,
    )
}
