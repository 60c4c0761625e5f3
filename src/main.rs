//! ARBSCAN: CEX/DEX arbitrage scanner
//!
//! Entry point. Loads configuration, initialises structured logging,
//! builds the exchange gateway and scan collaborators, and runs a scan
//! every interval with graceful shutdown.

use anyhow::Result;
use futures::future::join_all;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use arbscan::chain::ChainAliasResolver;
use arbscan::config::AppConfig;
use arbscan::dex::http::HttpDexQuoteGateway;
use arbscan::engine::{Collaborators, ScanEvent, ScanOrchestrator, ScanSummary, TokenSnapshot};
use arbscan::exchanges::{build_adapter, ExchangeDataGateway};
use arbscan::market_data::StaticMarketData;
use arbscan::notify::log::LogNotifier;
use arbscan::notify::telegram::TelegramNotifier;
use arbscan::notify::NotificationChannel;
use arbscan::pnl::spread::SpreadPnlCalculator;
use arbscan::storage::{self, ScanReport};
use arbscan::types::{ScanError, TrackedPairToken};

const BANNER: &str = r#"
    _    ____  ____  ____   ____    _    _   _
   / \  |  _ \| __ )/ ___| / ___|  / \  | \ | |
  / _ \ | |_) |  _ \\___ \| |     / _ \ |  \| |
 / ___ \|  _ <| |_) |___) | |___ / ___ \| |\  |
/_/   \_\_| \_\____/|____/ \____/_/   \_\_| \_|

  CEX/DEX arbitrage scanner
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = AppConfig::load("config.toml")?;

    init_logging();

    println!("{BANNER}");
    info!(
        bot_name = %cfg.scanner.bot_name,
        scan_interval_secs = cfg.scanner.scan_interval_secs,
        batch_size = cfg.scanner.batch_size,
        notional_usd = cfg.scanner.notional_usd,
        "ARBSCAN starting up"
    );

    let tokens = storage::load_tokens(&cfg.scanner.tokens_file)?;

    if let Some(previous) = storage::load_report(&cfg.scanner.report_file)? {
        if let Some((token, pnl)) = previous.best_pnl() {
            info!(token = %token.label, pnl = format!("${pnl:.2}"), "Best result of previous scan");
        }
    }

    // -- Exchange gateway ------------------------------------------------

    let resolver = Arc::new(ChainAliasResolver::new(cfg.chain_defs()));
    let mut gateway = ExchangeDataGateway::new(resolver);
    for (exchange, mut settings, snapshot_file) in cfg.adapter_settings() {
        if let Some(path) = snapshot_file {
            settings.snapshot = storage::load_coin_snapshot(&path)?;
        }
        gateway.register(build_adapter(exchange, settings)?);
    }
    let gateway = Arc::new(gateway);
    info!(exchanges = ?gateway.exchanges(), "Exchange adapters registered");

    check_tradeable(&gateway, &tokens).await;

    // -- Collaborators ---------------------------------------------------

    let pnl = Arc::new(SpreadPnlCalculator::new(
        cfg.scan_settings().settlement_asset,
        cfg.scanner.swap_gas_units,
    ));
    load_withdrawal_fees(&gateway, &pnl, &tokens).await;

    let notifier: Arc<dyn NotificationChannel> = match cfg.telegram() {
        Some((bot_token, chat_id)) => {
            info!("Telegram alerts enabled");
            Arc::new(TelegramNotifier::new(bot_token, chat_id)?)
        }
        None => {
            warn!("No Telegram credentials configured, alerts go to the log");
            Arc::new(LogNotifier::new())
        }
    };

    let collaborators = Collaborators {
        orderbooks: gateway.clone(),
        dex: Arc::new(HttpDexQuoteGateway::new(cfg.dex_endpoints(), cfg.dex_api_key())?),
        pnl,
        notifier,
        market_data: Arc::new(StaticMarketData::new(cfg.gas_defaults(), cfg.scanner.fiat_rate)),
    };
    let orchestrator = ScanOrchestrator::new(collaborators, cfg.delays.clone());

    // -- Main loop -------------------------------------------------------

    let mut interval = tokio::time::interval(Duration::from_secs(cfg.scanner.scan_interval_secs));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = cfg.scanner.scan_interval_secs,
        tokens = tokens.len(),
        "Entering main loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let (result, snapshots, interrupted) = run_scan(&orchestrator, &tokens, &cfg).await;
                match result {
                    Ok(Some(summary)) => {
                        log_summary(&summary);
                        let report = ScanReport::new(&summary, snapshots);
                        if let Err(e) = storage::save_report(&report, &cfg.scanner.report_file) {
                            error!(error = %e, "Failed to save scan report");
                        }
                    }
                    Ok(None) => warn!("Previous scan still running, tick skipped"),
                    Err(e) => error!(error = %e, "Scan failed, continuing to next interval"),
                }
                if interrupted {
                    break;
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                orchestrator.stop().await;
                break;
            }
        }
    }

    info!(stats = %orchestrator.last_stats(), "ARBSCAN shut down cleanly.");
    Ok(())
}

/// Run one scan. Ctrl+C during the scan requests a stop and lets the
/// current batch finish. Returns the result, the token snapshots seen, and
/// whether shutdown was requested.
async fn run_scan(
    orchestrator: &ScanOrchestrator,
    tokens: &[TrackedPairToken],
    cfg: &AppConfig,
) -> (Result<Option<ScanSummary>, ScanError>, Vec<TokenSnapshot>, bool) {
    let mut events = orchestrator.subscribe();
    let scan = orchestrator.start(tokens, cfg.scan_filter(), cfg.scan_settings());
    tokio::pin!(scan);

    let mut interrupted = false;
    let result = loop {
        tokio::select! {
            result = &mut scan => break result,
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                info!("Shutdown signal received, stopping after the current batch");
                interrupted = true;
                orchestrator.stop().await;
            }
        }
    };

    let mut snapshots = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let ScanEvent::TokenComplete { snapshot, .. } = event {
            snapshots.push(snapshot);
        }
    }
    (result, snapshots, interrupted)
}

/// Warn about tokens their primary exchange does not trade against USDT.
async fn check_tradeable(gateway: &ExchangeDataGateway, tokens: &[TrackedPairToken]) {
    let exchanges = gateway.exchanges();
    let book = gateway.fetch_trade_status(&exchanges).await;
    for exchange in &exchanges {
        info!(exchange = %exchange, symbols = book.symbol_count(*exchange), "Tradeable symbols");
    }
    for token in tokens {
        let Some(exchange) = token.primary_exchange() else { continue };
        if exchanges.contains(&exchange) && !book.is_tradeable(exchange, &token.base_ticker) {
            warn!(token = %token.label(), exchange = %exchange, "Token not tradeable on primary exchange");
        }
    }
}

/// Seed the PnL calculator with withdrawal fees for every chain in use.
async fn load_withdrawal_fees(
    gateway: &ExchangeDataGateway,
    pnl: &SpreadPnlCalculator,
    tokens: &[TrackedPairToken],
) {
    let chains: BTreeSet<String> = tokens.iter().map(|t| t.chain.to_lowercase()).collect();
    let jobs = gateway
        .exchanges()
        .into_iter()
        .flat_map(|ex| chains.iter().map(move |chain| (ex, chain.clone())))
        .map(|(ex, chain)| async move {
            match gateway.fetch_coin_list(ex, &chain).await {
                Ok(records) => pnl.load_fees(&records),
                Err(e) => warn!(exchange = %ex, chain = %chain, error = %e, "Coin list unavailable, fees default to 0"),
            }
        });
    join_all(jobs).await;
}

/// Log a human-readable scan summary.
fn log_summary(summary: &ScanSummary) {
    info!(
        state = ?summary.state,
        processed = summary.stats.processed_tokens,
        total = summary.stats.total_tokens,
        ok = summary.stats.success_count,
        errors = summary.stats.error_count,
        signals = summary.stats.profitable_signals,
        duration_ms = summary.stats.duration().num_milliseconds(),
        aborted = summary.aborted,
        "Scan complete"
    );
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("arbscan=info"));

    let json_logging = std::env::var("ARBSCAN_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
