//! Scan orchestrator: the top-level control loop.
//!
//! State machine `Idle → Running → {Completed | Aborted | Errored} → Idle`.
//! At most one scan runs per instance; a second `start` while running is a
//! no-op. Cancellation is cooperative and checked before each batch and
//! before each inter-batch wait.

use chrono::Utc;
use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info, warn};

use super::events::{EventBus, ScanEvent, Stage};
use super::pipeline::{ScanContext, TokenPipeline};
use crate::dex::DexQuoteGateway;
use crate::exchanges::OrderbookSource;
use crate::market_data::RealtimeMarketDataProvider;
use crate::notify::{BotStatus, NotificationChannel};
use crate::pnl::PnlCalculator;
use crate::rate_limit::{DelayConfig, DelayManager};
use crate::types::{ScanError, ScanFilter, ScanSettings, ScanState, ScanStats, TrackedPairToken};

/// External services the orchestrator drives.
#[derive(Clone)]
pub struct Collaborators {
    pub orderbooks: Arc<dyn OrderbookSource>,
    pub dex: Arc<dyn DexQuoteGateway>,
    pub pnl: Arc<dyn PnlCalculator>,
    pub notifier: Arc<dyn NotificationChannel>,
    pub market_data: Arc<dyn RealtimeMarketDataProvider>,
}

/// Outcome of a finished (not errored) scan.
#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    pub state: ScanState,
    pub stats: ScanStats,
    pub aborted: bool,
}

/// Split `tokens` into order-preserving batches of `batch_size`.
pub fn partition_batches<T>(tokens: &[T], batch_size: usize) -> Result<Vec<&[T]>, ScanError> {
    if batch_size == 0 {
        return Err(ScanError::InvalidBatchSize);
    }
    Ok(tokens.chunks(batch_size).collect())
}

/// Chain keys present in `tokens`, first-seen order, no duplicates.
fn chains_in(tokens: &[TrackedPairToken]) -> Vec<String> {
    let mut chains: Vec<String> = Vec::new();
    for t in tokens {
        let key = t.chain_key();
        if !key.is_empty() && !chains.contains(&key) {
            chains.push(key);
        }
    }
    chains
}

pub struct ScanOrchestrator {
    collaborators: Collaborators,
    delays: DelayManager,
    events: EventBus,
    running: AtomicBool,
    cancel: AtomicBool,
    state: Mutex<ScanState>,
    stats: Mutex<ScanStats>,
}

/// Resets the running flag and state when a scan ends, however it ends.
struct RunGuard<'a>(&'a ScanOrchestrator);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        *self.0.state.lock() = ScanState::Idle;
        self.0.running.store(false, Ordering::SeqCst);
    }
}

impl ScanOrchestrator {
    pub fn new(collaborators: Collaborators, delays: DelayConfig) -> Self {
        Self {
            collaborators,
            delays: DelayManager::new(delays),
            events: EventBus::new(),
            running: AtomicBool::new(false),
            cancel: AtomicBool::new(false),
            state: Mutex::new(ScanState::Idle),
            stats: Mutex::new(ScanStats::default()),
        }
    }

    pub fn subscribe(&self) -> UnboundedReceiver<ScanEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> ScanState {
        *self.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stats of the current or most recent scan.
    pub fn last_stats(&self) -> ScanStats {
        self.stats.lock().clone()
    }

    pub fn delays(&self) -> &DelayManager {
        &self.delays
    }

    /// Hot-swap pacing. Applies to the next wait of a running scan.
    pub fn update_settings(&self, delays: DelayConfig) {
        self.delays.update_config(delays);
    }

    /// Request a cooperative stop and announce it.
    pub async fn stop(&self) {
        info!(running = self.is_running(), "Stop requested");
        self.cancel.store(true, Ordering::SeqCst);
        self.collaborators.notifier.send_status(BotStatus::Stopped).await;
    }

    /// Run one scan over `tokens`.
    ///
    /// Returns `Ok(None)` without touching anything when a scan is already
    /// running, and `Err` when the run itself failed (state Errored).
    pub async fn start(
        &self,
        tokens: &[TrackedPairToken],
        filter: ScanFilter,
        settings: ScanSettings,
    ) -> Result<Option<ScanSummary>, ScanError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Scan already running, start ignored");
            return Ok(None);
        }
        let _guard = RunGuard(self);

        self.cancel.store(false, Ordering::SeqCst);
        *self.state.lock() = ScanState::Running;
        *self.stats.lock() = ScanStats::new(tokens.len());

        let notifier = &self.collaborators.notifier;
        notifier.set_identity(&settings.bot_name);
        notifier.send_status(BotStatus::Online).await;

        info!(
            tokens = tokens.len(),
            batch_size = settings.batch_size,
            notional_usd = settings.notional_usd,
            "Scan started"
        );
        self.events.emit(ScanEvent::Start {
            total_tokens: tokens.len(),
            batch_size: settings.batch_size,
        });

        match self.run(tokens, filter, settings).await {
            Ok(aborted) => {
                if !aborted {
                    notifier.send_status(BotStatus::Offline).await;
                }
                let state = if aborted {
                    ScanState::Aborted
                } else {
                    ScanState::Completed
                };
                let stats = self.finish(state);
                info!(%stats, aborted, duration_ms = stats.duration().num_milliseconds(), "Scan finished");
                self.events.emit(ScanEvent::Complete {
                    stats: stats.clone(),
                    duration_ms: stats.duration().num_milliseconds(),
                    aborted,
                });
                Ok(Some(ScanSummary {
                    state,
                    stats,
                    aborted,
                }))
            }
            Err(e) => {
                error!(error = %e, "Scan aborted by error");
                self.finish(ScanState::Errored);
                notifier.send_status(BotStatus::Error).await;
                self.events.emit(ScanEvent::Error {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Freeze stats with an end time and record the terminal state.
    fn finish(&self, state: ScanState) -> ScanStats {
        *self.state.lock() = state;
        let mut stats = self.stats.lock();
        stats.end_time = Some(Utc::now());
        stats.clone()
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Batch loop. Returns whether the scan was aborted.
    async fn run(
        &self,
        tokens: &[TrackedPairToken],
        filter: ScanFilter,
        settings: ScanSettings,
    ) -> Result<bool, ScanError> {
        let chains = chains_in(tokens);
        self.events.emit(ScanEvent::progress_with(
            Stage::Realtime,
            "Fetching realtime data",
            serde_json::json!({ "chains": chains }),
        ));
        let realtime = self
            .collaborators
            .market_data
            .get_all_realtime_data(&chains)
            .await
            .map_err(|e| ScanError::RealtimeData(format!("{e:#}")))?;

        let batches = partition_batches(tokens, settings.batch_size)?;
        let batch_count = batches.len();

        let ctx = ScanContext {
            filter,
            settings,
            realtime,
        };
        let pipeline = TokenPipeline {
            orderbooks: self.collaborators.orderbooks.as_ref(),
            dex: self.collaborators.dex.as_ref(),
            pnl: self.collaborators.pnl.as_ref(),
            notifier: self.collaborators.notifier.as_ref(),
            delays: &self.delays,
            events: &self.events,
            stats: &self.stats,
            ctx: &ctx,
        };

        for (batch_index, batch) in batches.into_iter().enumerate() {
            if self.cancelled() {
                info!(batch_index, "Stop flag set, no further batches dispatched");
                break;
            }

            self.events.emit(ScanEvent::progress(
                Stage::Batch,
                format!("Batch {}/{batch_count}: {} tokens", batch_index + 1, batch.len()),
            ));
            join_all(
                batch
                    .iter()
                    .enumerate()
                    .map(|(i, token)| pipeline.run(token, i)),
            )
            .await;
            self.events.emit(ScanEvent::BatchComplete {
                batch_index,
                batch_count,
            });

            if self.cancelled() {
                info!(batch_index, "Stop flag set, skipping remaining batches");
                break;
            }
            if batch_index + 1 < batch_count {
                self.delays.wait_group_delay().await;
            }
        }

        Ok(self.cancelled())
    }
}
