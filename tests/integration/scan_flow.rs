//! End-to-end scans: gateway → orchestrator → spread PnL → notifier.

use std::sync::Arc;

use arbscan::chain::{ChainAliasResolver, ChainDef};
use arbscan::engine::{Collaborators, ScanEvent, ScanOrchestrator};
use arbscan::exchanges::{ExchangeAdapter, ExchangeDataGateway};
use arbscan::notify::BotStatus;
use arbscan::pnl::spread::SpreadPnlCalculator;
use arbscan::rate_limit::DelayConfig;
use arbscan::types::*;

use super::mock_exchange::*;

fn resolver() -> Arc<ChainAliasResolver> {
    Arc::new(ChainAliasResolver::new([ChainDef {
        key: "bsc".into(),
        name: "BNB Smart Chain".into(),
        short_code: Some("BEP20".into()),
        synonyms: vec!["BSC".into()],
    }]))
}

fn gateway(adapters: Vec<Arc<dyn ExchangeAdapter>>) -> Arc<ExchangeDataGateway> {
    let mut gw = ExchangeDataGateway::new(resolver());
    for adapter in adapters {
        gw.register(adapter);
    }
    Arc::new(gw)
}

struct Rig {
    orchestrator: ScanOrchestrator,
    dex: Arc<CannedDex>,
    notifier: Arc<RecordingNotifier>,
}

fn rig(gateway: Arc<ExchangeDataGateway>, pnl: Arc<SpreadPnlCalculator>) -> Rig {
    let dex = Arc::new(CannedDex::new(105.0, 98.0));
    let notifier = Arc::new(RecordingNotifier::default());
    let orchestrator = ScanOrchestrator::new(
        Collaborators {
            orderbooks: gateway,
            dex: dex.clone(),
            pnl,
            notifier: notifier.clone(),
            market_data: Arc::new(FlatMarketData),
        },
        DelayConfig::no_delay(),
    );
    Rig {
        orchestrator,
        dex,
        notifier,
    }
}

fn settings() -> ScanSettings {
    ScanSettings {
        batch_size: 5,
        notional_usd: 100.0,
        min_absolute_profit: 1.0,
        auto_notify: true,
        bot_name: "ARBSCAN-IT".into(),
        ..ScanSettings::default()
    }
}

fn pnl_events(events: &[ScanEvent]) -> Vec<(String, DexPnl)> {
    events
        .iter()
        .filter_map(|e| match e {
            ScanEvent::PnlResult { token_id, result } => Some((token_id.clone(), result.clone())),
            _ => None,
        })
        .collect()
}

fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<ScanEvent>) -> Vec<ScanEvent> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        out.push(ev);
    }
    out
}

#[tokio::test]
async fn test_two_tokens_one_dex_end_to_end() {
    let exchange = MockExchange::new(Exchange::Binance)
        .with_book("CAKE", 0.99, 1.00)
        .with_book("XVS", 0.99, 1.00);
    let rig = rig(
        gateway(vec![Arc::new(exchange)]),
        Arc::new(SpreadPnlCalculator::new("USDT", 0)),
    );
    let tokens = vec![
        tracked_token("cake", "CAKE", "binance"),
        tracked_token("xvs", "XVS", "binance"),
    ];
    let mut rx = rig.orchestrator.subscribe();

    let summary = rig
        .orchestrator
        .start(&tokens, kyber_only(), settings())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(summary.state, ScanState::Completed);
    assert!(!summary.aborted);
    assert_eq!(summary.stats.processed_tokens, 2);
    assert_eq!(summary.stats.success_count, 2);
    assert_eq!(summary.stats.error_count, 0);
    assert!(summary.stats.end_time.is_some());

    let events = drain(&mut rx);
    let results = pnl_events(&events);
    assert_eq!(results.len(), 2);
    for (_, result) in &results {
        assert_eq!(result.dex, "kyber");
        let forward = result.token_to_pair.as_ref().unwrap();
        assert!((forward.pnl - 5.0).abs() < 1e-9);
        let backward = result.pair_to_token.as_ref().unwrap();
        assert!(backward.pnl < 0.0);
    }
    assert!(matches!(events.first(), Some(ScanEvent::Start { total_tokens: 2, .. })));
    assert!(matches!(events.last(), Some(ScanEvent::Complete { aborted: false, .. })));

    // Inputs are the full notional at ask 1.00 with no fees known.
    for (_, _, amounts) in rig.dex.requests.lock().unwrap().iter() {
        assert_eq!(amounts.token_to_pair, 100.0);
        assert_eq!(amounts.pair_to_token, 100.0);
    }

    assert_eq!(*rig.notifier.identity.lock().unwrap(), "ARBSCAN-IT");
    assert_eq!(
        *rig.notifier.statuses.lock().unwrap(),
        vec![BotStatus::Online, BotStatus::Offline]
    );
    let signals = rig.notifier.signals.lock().unwrap();
    assert_eq!(signals.len(), 2);
    assert!(signals.iter().all(|s| s.contains("TOKEN→PAIR")));
    assert_eq!(summary.stats.profitable_signals, 2);
}

#[tokio::test]
async fn test_failing_book_is_isolated() {
    let exchange = MockExchange::new(Exchange::Binance)
        .with_book("CAKE", 0.99, 1.00)
        .with_book("XVS", 0.99, 1.00);
    let calls = exchange.calls();
    let rig = rig(
        gateway(vec![Arc::new(exchange)]),
        Arc::new(SpreadPnlCalculator::new("USDT", 0)),
    );
    let tokens = vec![
        tracked_token("cake", "CAKE", "binance"),
        tracked_token("dead", "DEAD", "binance"),
        tracked_token("xvs", "XVS", "binance"),
    ];
    let mut rx = rig.orchestrator.subscribe();

    let summary = rig
        .orchestrator
        .start(&tokens, kyber_only(), settings())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(summary.stats.processed_tokens, 3);
    assert_eq!(summary.stats.success_count, 2);
    assert_eq!(summary.stats.error_count, 1);
    assert_eq!(calls.lock().unwrap().len(), 3);

    let events = drain(&mut rx);
    let ids: Vec<String> = pnl_events(&events).into_iter().map(|(id, _)| id).collect();
    assert!(!ids.contains(&"dead".to_string()));
    assert_eq!(ids.len(), 2);

    let progress = events
        .iter()
        .filter_map(|e| match e {
            ScanEvent::TokenComplete { progress_pct, .. } => Some(*progress_pct),
            _ => None,
        })
        .fold(0.0_f64, f64::max);
    assert!((progress - 100.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_unregistered_primary_exchange_errors_token() {
    let rig = rig(
        gateway(vec![Arc::new(MockExchange::new(Exchange::Binance).with_book("CAKE", 0.99, 1.0))]),
        Arc::new(SpreadPnlCalculator::new("USDT", 0)),
    );
    let tokens = vec![tracked_token("cake", "CAKE", "gate")];

    let summary = rig
        .orchestrator
        .start(&tokens, kyber_only(), settings())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(summary.stats.error_count, 1);
    assert!(rig.dex.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_withdrawal_fee_from_coin_list_reduces_swap_input() {
    let exchange = MockExchange::new(Exchange::Binance)
        .with_book("CAKE", 0.99, 1.00)
        .with_network("CAKE", "BNB Smart Chain (BEP20)", 2.0)
        .with_network("CAKE", "ERC20", 9.0);
    let gw = gateway(vec![Arc::new(exchange)]);

    let records = gw.fetch_coin_list(Exchange::Binance, "bsc").await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].chain, "bsc");

    let pnl = Arc::new(SpreadPnlCalculator::new("USDT", 0));
    pnl.load_fees(&records);

    let rig = rig(gw, pnl);
    rig.orchestrator
        .start(&[tracked_token("cake", "CAKE", "binance")], kyber_only(), settings())
        .await
        .unwrap();

    let requests = rig.dex.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].2.token_to_pair, 98.0);
    assert_eq!(requests[0].2.pair_to_token, 100.0);
}

#[tokio::test]
async fn test_trade_status_and_prices_from_mock() {
    let gw = gateway(vec![Arc::new(
        MockExchange::new(Exchange::Mexc).with_book("PEPE", 0.000010, 0.000012),
    )]);

    let status = gw.fetch_trade_status(&[Exchange::Mexc, Exchange::Bybit]).await;
    assert!(status.is_tradeable(Exchange::Mexc, "pepe"));
    assert_eq!(status.symbol_count(Exchange::Bybit), 0);

    let prices = gw.fetch_prices(&[Exchange::Mexc]).await;
    let mid = prices.price(Exchange::Mexc, "PEPE").unwrap();
    assert!((mid - 0.000011).abs() < 1e-12);
}
