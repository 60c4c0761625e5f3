//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys, bot tokens) are referenced by env-var name in the
//! config and resolved at runtime into `SecretString`s.

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use tracing::warn;

use crate::chain::ChainDef;
use crate::exchanges::signing::ApiCredentials;
use crate::exchanges::AdapterSettings;
use crate::market_data::GasQuote;
use crate::pnl::spread::DEFAULT_SWAP_GAS_UNITS;
use crate::rate_limit::DelayConfig;
use crate::types::{Exchange, ScanError, ScanFilter, ScanSettings, SETTLEMENT_ASSET};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub delays: DelayConfig,
    #[serde(default)]
    pub exchanges: BTreeMap<String, ExchangeConfig>,
    #[serde(default)]
    pub chains: BTreeMap<String, ChainConfig>,
    #[serde(default)]
    pub dex: BTreeMap<String, DexConfig>,
    #[serde(default)]
    pub alerts: AlertsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScannerConfig {
    pub bot_name: String,
    pub scan_interval_secs: u64,
    pub batch_size: usize,
    pub notional_usd: f64,
    pub min_absolute_profit: f64,
    #[serde(default)]
    pub auto_notify: bool,
    #[serde(default = "default_settlement_asset")]
    pub settlement_asset: String,
    pub tokens_file: String,
    #[serde(default = "default_report_file")]
    pub report_file: String,
    /// Local fiat units per USD, shown next to PnL figures.
    #[serde(default)]
    pub fiat_rate: f64,
    #[serde(default = "default_swap_gas_units")]
    pub swap_gas_units: u64,
    /// Env var holding the key sent to DEX quote endpoints.
    #[serde(default)]
    pub dex_api_key_env: Option<String>,
}

fn default_settlement_asset() -> String {
    SETTLEMENT_ASSET.to_string()
}

fn default_report_file() -> String {
    "arbscan_report.json".to_string()
}

fn default_swap_gas_units() -> u64 {
    DEFAULT_SWAP_GAS_UNITS
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExchangeConfig {
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub api_secret_env: Option<String>,
    /// Relay prefix placed in front of every request URL.
    #[serde(default)]
    pub proxy: Option<String>,
    /// JSON file of known coin networks, for vendors whose list omits
    /// contracts or fees.
    #[serde(default)]
    pub snapshot_file: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChainConfig {
    pub name: String,
    #[serde(default)]
    pub short_code: Option<String>,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub gas_price_gwei: Option<f64>,
    #[serde(default)]
    pub native_price_usd: Option<f64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DexConfig {
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    pub quote_url: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AlertsConfig {
    pub telegram_bot_token_env: Option<String>,
    pub telegram_chat_id_env: Option<String>,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ScanError> {
        if self.scanner.batch_size == 0 {
            return Err(ScanError::InvalidBatchSize);
        }
        for key in self.exchanges.keys() {
            key.parse::<Exchange>()
                .map_err(|_| ScanError::Config(format!("unknown exchange section [exchanges.{key}]")))?;
        }
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    fn resolve_secret(env_name: Option<&str>) -> Option<SecretString> {
        let name = env_name?;
        match Self::resolve_env(name) {
            Ok(value) if !value.trim().is_empty() => Some(SecretString::new(value)),
            _ => None,
        }
    }

    // -- Derived views ---------------------------------------------------

    pub fn scan_settings(&self) -> ScanSettings {
        let s = &self.scanner;
        ScanSettings {
            batch_size: s.batch_size,
            notional_usd: s.notional_usd,
            min_absolute_profit: s.min_absolute_profit,
            auto_notify: s.auto_notify,
            settlement_asset: s.settlement_asset.to_uppercase(),
            bot_name: s.bot_name.clone(),
        }
    }

    /// DEX toggles for the scan, from `[dex.<key>]` `enabled`.
    pub fn scan_filter(&self) -> ScanFilter {
        ScanFilter {
            dex: self
                .dex
                .iter()
                .map(|(key, cfg)| (key.to_lowercase(), cfg.enabled))
                .collect(),
        }
    }

    pub fn chain_defs(&self) -> Vec<ChainDef> {
        self.chains
            .iter()
            .map(|(key, c)| ChainDef {
                key: key.clone(),
                name: c.name.clone(),
                short_code: c.short_code.clone(),
                synonyms: c.synonyms.clone(),
            })
            .collect()
    }

    /// Gas defaults for chains that configure both numbers.
    pub fn gas_defaults(&self) -> HashMap<String, GasQuote> {
        self.chains
            .iter()
            .filter_map(|(key, c)| match (c.gas_price_gwei, c.native_price_usd) {
                (Some(gas_price_gwei), Some(native_price_usd)) => Some((
                    key.to_lowercase(),
                    GasQuote {
                        gas_price_gwei,
                        native_price_usd,
                    },
                )),
                _ => None,
            })
            .collect()
    }

    pub fn dex_endpoints(&self) -> HashMap<String, String> {
        self.dex
            .iter()
            .map(|(key, cfg)| (key.to_lowercase(), cfg.quote_url.clone()))
            .collect()
    }

    pub fn dex_api_key(&self) -> Option<SecretString> {
        Self::resolve_secret(self.scanner.dex_api_key_env.as_deref())
    }

    /// Enabled exchanges with their adapter settings. Credentials are
    /// attached only when both env vars resolve; adapters needing them fail
    /// at call time otherwise.
    pub fn adapter_settings(&self) -> Vec<(Exchange, AdapterSettings, Option<String>)> {
        self.exchanges
            .iter()
            .filter(|(_, cfg)| cfg.enabled)
            .filter_map(|(key, cfg)| {
                let exchange = key.parse::<Exchange>().ok()?;
                let credentials = match (
                    cfg.api_key_env.as_deref().and_then(|n| Self::resolve_env(n).ok()),
                    Self::resolve_secret(cfg.api_secret_env.as_deref()),
                ) {
                    (Some(api_key), Some(api_secret)) => Some(ApiCredentials { api_key, api_secret }),
                    (None, None) => None,
                    _ => {
                        warn!(exchange = %exchange, "Only one of API key/secret resolved, ignoring both");
                        None
                    }
                };
                let settings = AdapterSettings {
                    base_url: cfg.base_url.clone(),
                    credentials,
                    proxy_prefix: cfg.proxy.clone(),
                    snapshot: Vec::new(),
                };
                Some((exchange, settings, cfg.snapshot_file.clone()))
            })
            .collect()
    }

    /// Telegram bot token and chat id, when both are configured and set.
    pub fn telegram(&self) -> Option<(SecretString, String)> {
        let token = Self::resolve_secret(self.alerts.telegram_bot_token_env.as_deref())?;
        let chat_id = Self::resolve_env(self.alerts.telegram_chat_id_env.as_deref()?).ok()?;
        Some((token, chat_id))
    }
}
