//! # Orchestrator (C11)
//!
//! ## Purpose
//!
//! Wires C4-C10 together and owns the process lifecycle (§4.8): `Start`
//! initializes chain adapters, constructs the shared caches/queues, spawns
//! one scanner task per chain and the coordinator's worker pool, and only
//! reports `ready` once every chain adapter is healthy. `Stop` cancels the
//! shared token and waits out `shutdownGrace`. `Health` reports per-chain
//! adapter status, queue depths, and active worker count. `Force` delegates
//! straight to the Coordinator.

use crate::aggregator::Aggregator;
use crate::clock::Clock;
use crate::coordinator::Coordinator;
use crate::metrics::Metrics;
use crate::price_cache::PriceCache;
use crate::queue::{kind_config_key, QueueManager};
use crate::risk::{RiskManager, SuccessRateEstimator};
use crate::scanner::{self, ScannerContext};
use adapters::{ChainAdapter, OpaqueSigner, PriceOracle, VenueAdapter};
use config::OrchestratorConfig;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use types::{ChainHealth, ChainId, OpportunityId, OpportunityKind};

/// Wall-clock distance to the next UTC date rollover, for the daily-counter
/// reset task (§4.4 `Reset()`, §10). Falls back to a minute if, somehow,
/// the next midnight isn't representable (never in practice).
fn duration_until_next_utc_midnight(now: chrono::DateTime<chrono::Utc>) -> Duration {
    let tomorrow = now.date_naive().succ_opt().unwrap_or(now.date_naive());
    let next_midnight_naive = tomorrow.and_hms_opt(0, 0, 0).unwrap_or(now.naive_utc());
    let next_midnight = chrono::DateTime::<chrono::Utc>::from_naive_utc_and_offset(next_midnight_naive, chrono::Utc);
    (next_midnight - now).to_std().unwrap_or(Duration::from_secs(60))
}

/// A provisioned chain: its adapter plus every venue available on it.
pub struct ChainHandle {
    pub chain: ChainId,
    pub adapter: Arc<dyn ChainAdapter>,
    pub venues: HashMap<String, Arc<dyn VenueAdapter>>,
}

#[derive(Debug, Clone)]
pub struct ChainHealthReport {
    pub chain: String,
    pub healthy: bool,
}

#[derive(Debug, Clone)]
pub struct HealthReport {
    pub ready: bool,
    pub chains: Vec<ChainHealthReport>,
    pub queue_depths: HashMap<&'static str, usize>,
    pub active_workers: usize,
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    clock: Clock,
    price_cache: Arc<PriceCache>,
    queues: Arc<QueueManager>,
    risk: Arc<RiskManager>,
    metrics: Arc<Metrics>,
    coordinator: Arc<Coordinator>,
    success_rate: Arc<SuccessRateEstimator>,
    chains: Vec<ChainHandle>,
    wallet: String,
    token: CancellationToken,
    scanner_tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
    pump_task: std::sync::Mutex<Option<JoinHandle<()>>>,
    health_poll_task: std::sync::Mutex<Option<JoinHandle<()>>>,
    daily_reset_task: std::sync::Mutex<Option<JoinHandle<()>>>,
    ready: AtomicBool,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: OrchestratorConfig,
        chains: Vec<ChainHandle>,
        price_oracle: Arc<dyn PriceOracle>,
        signer: OpaqueSigner,
        wallet: String,
    ) -> Self {
        let wallet_copy = wallet.clone();
        let clock = Clock::start();
        let price_cache = Arc::new(PriceCache::new(Duration::from_secs(
            config.timeouts.price_freshness_ttl_secs,
        )));
        let queues = Arc::new(QueueManager::new(&config.queue.capacity, &config.queue.weights));
        let blacklists = types::Blacklists {
            tokens: config.blacklist.tokens.iter().cloned().map(types::TokenId::new).collect(),
            venues: config.blacklist.venues.iter().cloned().map(types::VenueId::new).collect(),
        };
        let risk = Arc::new(RiskManager::new(
            config.limits.clone(),
            config.profit.min_liquidity_usd,
            config.profit.max_price_impact,
            blacklists,
            price_oracle.clone(),
        ));
        let metrics = Arc::new(Metrics::new());

        let mut chain_adapters = HashMap::new();
        let mut venue_adapters = HashMap::new();
        for handle in &chains {
            chain_adapters.insert(handle.chain.as_str().to_string(), handle.adapter.clone());
            for (name, venue) in &handle.venues {
                venue_adapters.entry(name.clone()).or_insert_with(|| venue.clone());
            }
        }

        let coordinator = Arc::new(Coordinator::new(
            queues.clone(),
            risk.clone(),
            metrics.clone(),
            chain_adapters,
            venue_adapters,
            clock.clone(),
            config.timeouts.clone(),
            signer,
            wallet,
            price_oracle,
        ));

        Self {
            config,
            clock,
            price_cache,
            queues,
            risk,
            metrics,
            coordinator,
            success_rate: Arc::new(SuccessRateEstimator::new()),
            chains,
            wallet: wallet_copy,
            token: CancellationToken::new(),
            scanner_tasks: std::sync::Mutex::new(Vec::new()),
            pump_task: std::sync::Mutex::new(None),
            health_poll_task: std::sync::Mutex::new(None),
            daily_reset_task: std::sync::Mutex::new(None),
            ready: AtomicBool::new(false),
        }
    }

    /// §4.8 `Start(ctx)`: spins up every chain's scanner, the aggregator
    /// pump, and the coordinator's worker pool. Only flips `ready` once
    /// every chain adapter reports healthy.
    pub async fn start(&self) -> anyhow::Result<()> {
        for handle in &self.chains {
            if !handle.adapter.is_healthy().await {
                anyhow::bail!("chain adapter {} is not healthy at startup", handle.chain);
            }
        }

        let (sink, mut rx) = scanner::opportunity_channel(1024);

        for handle in &self.chains {
            let ctx = Arc::new(ScannerContext {
                chain: handle.chain.clone(),
                venues: handle.venues.clone(),
                price_cache: self.price_cache.clone(),
                clock: self.clock.clone(),
                scanner_config: self.config.scanner.clone(),
                flash_loan_config: self.config.flash_loan.clone(),
                min_profit_pct: self.config.profit.min_profit_pct,
                quote_deadline: Duration::from_millis(self.config.timeouts.quote_deadline_ms),
                notional_amount_in: self.config.limits.max_single_trade_usd,
                sink: sink.clone(),
            });
            let token = self.token.clone();
            let handle_task = tokio::spawn(scanner::run(ctx, token));
            self.scanner_tasks.lock().unwrap().push(handle_task);
        }
        drop(sink);

        let aggregator = Aggregator::new(self.config.profit.clone(), Duration::from_secs(self.config.timeouts.opportunity_ttl_secs));
        let queues = self.queues.clone();
        let success_rate = self.success_rate.clone();
        let clock = self.clock.clone();
        let coordinator = self.coordinator.clone();
        let pump = tokio::spawn(async move {
            let mut batch = Vec::new();
            loop {
                let received = rx.recv().await;
                let Some(opp) = received else {
                    return;
                };
                batch.push(opp);
                // drain whatever else is immediately available so the
                // aggregator dedups across a whole scan tick, not one at a
                // time.
                while let Ok(extra) = rx.try_recv() {
                    batch.push(extra);
                }
                let validated = aggregator.process(std::mem::take(&mut batch), clock.now(), &success_rate);
                for opp in validated {
                    coordinator.track_pending(opp.clone());
                    if !queues.enqueue(opp.kind, opp.clone()) {
                        coordinator.untrack_pending(&opp.id);
                        warn!(opportunity_id = %opp.id, "execution queue full, opportunity dropped");
                    }
                }
            }
        });
        *self.pump_task.lock().unwrap() = Some(pump);

        self.coordinator.start(self.config.limits.max_concurrent_trades);

        let health_handles: Vec<(ChainId, Arc<dyn ChainAdapter>)> = self
            .chains
            .iter()
            .map(|h| (h.chain.clone(), h.adapter.clone()))
            .collect();
        let risk_for_health = self.risk.clone();
        let health_poll_interval = Duration::from_secs(self.config.timeouts.chain_health_poll_secs);
        let health_token = self.token.clone();
        let health_poll = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(health_poll_interval) => {}
                    _ = health_token.cancelled() => return,
                }
                for (chain, adapter) in &health_handles {
                    let health = if adapter.is_healthy().await {
                        ChainHealth::Active
                    } else {
                        ChainHealth::Degraded
                    };
                    risk_for_health.set_chain_health(chain.clone(), health);
                }
            }
        });
        *self.health_poll_task.lock().unwrap() = Some(health_poll);

        let risk_for_reset = self.risk.clone();
        let reset_token = self.token.clone();
        let daily_reset = tokio::spawn(async move {
            loop {
                let sleep_for = duration_until_next_utc_midnight(chrono::Utc::now());
                tokio::select! {
                    _ = tokio::time::sleep(sleep_for) => {
                        risk_for_reset.reset_daily();
                        info!("daily counters reset at UTC midnight");
                    }
                    _ = reset_token.cancelled() => return,
                }
            }
        });
        *self.daily_reset_task.lock().unwrap() = Some(daily_reset);

        self.ready.store(true, Ordering::SeqCst);
        info!("orchestrator ready: {} chains, {} worker(s)", self.chains.len(), self.config.limits.max_concurrent_trades);
        Ok(())
    }

    /// §4.8 `Stop()`: cancels the shared token, waits for scanners and
    /// workers to reach a terminal state or `shutdownGrace`, then lets
    /// metrics settle (they're already consistent — no explicit flush
    /// needed since `Metrics` has no write buffering).
    pub async fn stop(&self) {
        self.ready.store(false, Ordering::SeqCst);
        self.token.cancel();

        let grace = Duration::from_secs(self.config.timeouts.shutdown_grace_secs);
        self.coordinator.stop(grace).await;

        let scanner_handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.scanner_tasks.lock().unwrap());
        let joined = tokio::time::timeout(grace, async {
            for handle in scanner_handles {
                let _ = handle.await;
            }
        })
        .await;
        if joined.is_err() {
            warn!("shutdown grace period elapsed before all scanners stopped");
        }

        if let Some(pump) = self.pump_task.lock().unwrap().take() {
            pump.abort();
        }
        if let Some(health_poll) = self.health_poll_task.lock().unwrap().take() {
            health_poll.abort();
        }
        if let Some(daily_reset) = self.daily_reset_task.lock().unwrap().take() {
            daily_reset.abort();
        }
        info!("orchestrator stopped");
    }

    /// §4.8 `Health()`.
    pub async fn health(&self) -> HealthReport {
        let mut chains = Vec::with_capacity(self.chains.len());
        for handle in &self.chains {
            chains.push(ChainHealthReport {
                chain: handle.chain.as_str().to_string(),
                healthy: handle.adapter.is_healthy().await,
            });
        }
        let mut queue_depths = HashMap::new();
        for kind in [
            OpportunityKind::CrossExchange,
            OpportunityKind::Triangular,
            OpportunityKind::FlashLoan,
            OpportunityKind::Backrun,
        ] {
            queue_depths.insert(kind_config_key(kind), self.queues.queue_depth(kind));
        }
        HealthReport {
            ready: self.ready.load(Ordering::SeqCst),
            chains,
            queue_depths,
            active_workers: self.coordinator.active_trades(),
        }
    }

    /// §4.8 `Force(id)`: bypasses risk gates, still honors single-flight.
    pub async fn force(&self, id: OpportunityId) -> Option<types::ExecutionResult> {
        self.coordinator.force(id).await
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<types::ExecutionResult> {
        self.coordinator.subscribe()
    }

    pub fn reset_daily_counters(&self) {
        self.risk.reset_daily();
    }

    /// Per-chain wallet balance of `token`, for the `/balances` surface.
    /// A chain whose adapter call fails is simply omitted rather than
    /// failing the whole response.
    pub async fn chain_balances(&self, token: &types::TokenId) -> HashMap<String, rust_decimal::Decimal> {
        let mut balances = HashMap::new();
        for handle in &self.chains {
            if let Ok(balance) = handle.adapter.get_balance(token, &self.wallet).await {
                balances.insert(handle.chain.as_str().to_string(), balance);
            }
        }
        balances
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adapters::testing::{InMemoryChainAdapter, InMemoryVenueAdapter, StaticOracle};
    use std::collections::HashMap as StdHashMap;

    fn chain_handle(name: &str) -> ChainHandle {
        let mut venues: HashMap<String, Arc<dyn VenueAdapter>> = HashMap::new();
        venues.insert("uniswap".to_string(), Arc::new(InMemoryVenueAdapter::new()));
        ChainHandle {
            chain: ChainId::new(name),
            adapter: Arc::new(InMemoryChainAdapter::new()),
            venues,
        }
    }

    fn unhealthy_chain_handle(name: &str) -> ChainHandle {
        let adapter = InMemoryChainAdapter::new();
        adapter.set_healthy(false);
        let mut venues: HashMap<String, Arc<dyn VenueAdapter>> = HashMap::new();
        venues.insert("uniswap".to_string(), Arc::new(InMemoryVenueAdapter::new()));
        ChainHandle {
            chain: ChainId::new(name),
            adapter: Arc::new(adapter),
            venues,
        }
    }

    #[tokio::test]
    async fn start_reports_ready_when_chains_healthy() {
        let config = OrchestratorConfig::default();
        let oracle = Arc::new(StaticOracle::new(StdHashMap::new()));
        let orchestrator = Arc::new(Orchestrator::new(
            config,
            vec![chain_handle("ethereum")],
            oracle,
            OpaqueSigner("test-signer".to_string()),
            "0xwallet".to_string(),
        ));
        orchestrator.start().await.unwrap();
        let health = orchestrator.health().await;
        assert!(health.ready);
        assert_eq!(health.chains.len(), 1);
        assert!(health.chains[0].healthy);
        orchestrator.stop().await;
    }

    /// §10 "chain health registry... driving scenario 6": once a chain
    /// adapter goes unhealthy, the periodic poll task must observe it and
    /// flip the Risk Manager's view without anything else re-checking it.
    #[tokio::test]
    async fn health_poll_task_degrades_risk_manager_on_unhealthy_chain() {
        let mut config = OrchestratorConfig::default();
        config.timeouts.chain_health_poll_secs = 1;
        let oracle = Arc::new(StaticOracle::new(StdHashMap::new()));
        let adapter = Arc::new(InMemoryChainAdapter::new());
        let mut venues: HashMap<String, Arc<dyn VenueAdapter>> = HashMap::new();
        venues.insert("uniswap".to_string(), Arc::new(InMemoryVenueAdapter::new()));
        let handle = ChainHandle {
            chain: ChainId::new("ethereum"),
            adapter: adapter.clone(),
            venues,
        };
        let orchestrator = Arc::new(Orchestrator::new(
            config,
            vec![handle],
            oracle,
            OpaqueSigner("test-signer".to_string()),
            "0xwallet".to_string(),
        ));
        orchestrator.start().await.unwrap();
        assert_eq!(orchestrator.risk.chain_health(&ChainId::new("ethereum")), ChainHealth::Active);

        adapter.set_healthy(false);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(orchestrator.risk.chain_health(&ChainId::new("ethereum")), ChainHealth::Degraded);

        orchestrator.stop().await;
    }

    #[test]
    fn duration_until_next_utc_midnight_is_never_negative_or_over_a_day() {
        use chrono::TimeZone;
        let now = chrono::Utc.with_ymd_and_hms(2026, 3, 5, 23, 59, 0).unwrap();
        let d = duration_until_next_utc_midnight(now);
        assert!(d.as_secs() > 0 && d.as_secs() <= 60);

        let midday = chrono::Utc.with_ymd_and_hms(2026, 3, 5, 12, 0, 0).unwrap();
        let d2 = duration_until_next_utc_midnight(midday);
        assert!(d2.as_secs() <= 24 * 3600);
    }

    #[tokio::test]
    async fn start_fails_when_a_chain_adapter_is_unhealthy() {
        let config = OrchestratorConfig::default();
        let oracle = Arc::new(StaticOracle::new(StdHashMap::new()));
        let unhealthy = unhealthy_chain_handle("polygon");
        let orchestrator = Arc::new(Orchestrator::new(
            config,
            vec![unhealthy],
            oracle,
            OpaqueSigner("test-signer".to_string()),
            "0xwallet".to_string(),
        ));
        assert!(orchestrator.start().await.is_err());
    }
}
