//! Scan pacing.
//!
//! `DelayManager` owns every pacing knob of a scan: the per-item stagger
//! inside a batch, the pause between batches, the pause after each CEX
//! order-book call, the stagger inside one token's DEX fan-out, and the
//! outbound request timeout. All magnitudes are milliseconds.

use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Pacing magnitudes. Zero disables a given pause.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DelayConfig {
    #[serde(default = "default_per_item_ms")]
    pub per_item_ms: u64,
    #[serde(default = "default_group_ms")]
    pub group_ms: u64,
    #[serde(default = "default_exchange_ms")]
    pub exchange_ms: u64,
    /// Per-exchange override of `exchange_ms`, keyed by exchange key.
    #[serde(default)]
    pub exchange_overrides: HashMap<String, u64>,
    #[serde(default = "default_dex_stagger_ms")]
    pub dex_stagger_ms: u64,
    /// Per-DEX override of `dex_stagger_ms`.
    #[serde(default)]
    pub dex_overrides: HashMap<String, u64>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_per_item_ms() -> u64 {
    150
}
fn default_group_ms() -> u64 {
    1_000
}
fn default_exchange_ms() -> u64 {
    200
}
fn default_dex_stagger_ms() -> u64 {
    120
}
fn default_request_timeout_ms() -> u64 {
    8_000
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            per_item_ms: default_per_item_ms(),
            group_ms: default_group_ms(),
            exchange_ms: default_exchange_ms(),
            exchange_overrides: HashMap::new(),
            dex_stagger_ms: default_dex_stagger_ms(),
            dex_overrides: HashMap::new(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl DelayConfig {
    /// All pauses disabled; timeout kept. Handy for tests and dry runs.
    pub fn no_delay() -> Self {
        Self {
            per_item_ms: 0,
            group_ms: 0,
            exchange_ms: 0,
            dex_stagger_ms: 0,
            ..Self::default()
        }
    }
}

/// Single point enforcing scan pacing. Reconfigurable while a scan runs.
pub struct DelayManager {
    config: RwLock<Arc<DelayConfig>>,
}

impl DelayManager {
    pub fn new(config: DelayConfig) -> Self {
        Self {
            config: RwLock::new(Arc::new(config)),
        }
    }

    /// Current configuration snapshot.
    pub fn config(&self) -> Arc<DelayConfig> {
        Arc::clone(&self.config.read())
    }

    /// Swap every magnitude at once. Waits already sleeping keep the
    /// duration they started with.
    pub fn update_config(&self, config: DelayConfig) {
        debug!(?config, "Delay configuration updated");
        *self.config.write() = Arc::new(config);
    }

    // -- Magnitudes ------------------------------------------------------

    pub fn item_stagger(&self, index_in_batch: usize) -> Duration {
        let per_item = self.config().per_item_ms;
        Duration::from_millis(per_item.saturating_mul(index_in_batch as u64))
    }

    pub fn group_delay(&self) -> Duration {
        Duration::from_millis(self.config().group_ms)
    }

    pub fn exchange_delay(&self, exchange_key: &str) -> Duration {
        let cfg = self.config();
        let ms = cfg
            .exchange_overrides
            .get(&exchange_key.to_lowercase())
            .copied()
            .unwrap_or(cfg.exchange_ms);
        Duration::from_millis(ms)
    }

    pub fn dex_stagger(&self, dex_key: &str, index_in_fanout: usize) -> Duration {
        let cfg = self.config();
        let step = cfg
            .dex_overrides
            .get(&dex_key.to_lowercase())
            .copied()
            .unwrap_or(cfg.dex_stagger_ms);
        Duration::from_millis(step.saturating_mul(index_in_fanout as u64))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.config().request_timeout_ms)
    }

    // -- Waits -----------------------------------------------------------

    pub async fn wait_item_stagger(&self, index_in_batch: usize) {
        sleep_for(self.item_stagger(index_in_batch)).await;
    }

    pub async fn wait_group_delay(&self) {
        sleep_for(self.group_delay()).await;
    }

    pub async fn wait_exchange_delay(&self, exchange_key: &str) {
        sleep_for(self.exchange_delay(exchange_key)).await;
    }

    pub async fn wait_dex_stagger(&self, dex_key: &str, index_in_fanout: usize) {
        sleep_for(self.dex_stagger(dex_key, index_in_fanout)).await;
    }
}

impl Default for DelayManager {
    fn default() -> Self {
        Self::new(DelayConfig::default())
    }
}

async fn sleep_for(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    fn manager() -> DelayManager {
        let mut cfg = DelayConfig {
            per_item_ms: 100,
            group_ms: 500,
            exchange_ms: 50,
            dex_stagger_ms: 30,
            request_timeout_ms: 4_000,
            ..DelayConfig::default()
        };
        cfg.exchange_overrides.insert("indodax".into(), 300);
        cfg.dex_overrides.insert("odos".into(), 75);
        DelayManager::new(cfg)
    }

    #[test]
    fn test_item_stagger_is_linear() {
        let dm = manager();
        for i in 0..3 {
            assert_eq!(dm.item_stagger(i), Duration::from_millis(i as u64 * 100));
        }
        assert_eq!(dm.item_stagger(0), Duration::ZERO);
    }

    #[test]
    fn test_exchange_override() {
        let dm = manager();
        assert_eq!(dm.exchange_delay("binance"), Duration::from_millis(50));
        assert_eq!(dm.exchange_delay("INDODAX"), Duration::from_millis(300));
    }

    #[test]
    fn test_dex_stagger_index_zero_never_waits() {
        let dm = manager();
        assert_eq!(dm.dex_stagger("kyber", 0), Duration::ZERO);
        assert_eq!(dm.dex_stagger("odos", 0), Duration::ZERO);
        assert_eq!(dm.dex_stagger("kyber", 2), Duration::from_millis(60));
        assert_eq!(dm.dex_stagger("odos", 2), Duration::from_millis(150));
    }

    #[test]
    fn test_update_config_swaps_all_magnitudes() {
        let dm = manager();
        dm.update_config(DelayConfig::no_delay());
        assert_eq!(dm.item_stagger(5), Duration::ZERO);
        assert_eq!(dm.group_delay(), Duration::ZERO);
        assert_eq!(dm.exchange_delay("indodax"), Duration::ZERO);
        assert_eq!(dm.request_timeout(), Duration::from_millis(8_000));
    }

    #[test]
    fn test_defaults_deserialize_from_empty_table() {
        let cfg: DelayConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, DelayConfig::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_item_stagger_sleeps_expected_time() {
        let dm = manager();
        let start = Instant::now();
        dm.wait_item_stagger(2).await;
        assert_eq!(start.elapsed(), Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_wait_keeps_original_magnitude() {
        let dm = manager();
        let start = Instant::now();
        let wait = dm.wait_group_delay();
        tokio::pin!(wait);
        assert!(futures::poll!(&mut wait).is_pending());

        dm.update_config(DelayConfig { group_ms: 5_000, ..DelayConfig::default() });
        wait.await;
        assert_eq!(start.elapsed(), Duration::from_millis(500));
        assert_eq!(dm.group_delay(), Duration::from_millis(5_000));
    }
}
