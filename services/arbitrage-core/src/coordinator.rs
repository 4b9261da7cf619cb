//! # Execution Coordinator (C9) — the state machine
//!
//! ## Purpose
//!
//! A fixed-size worker pool (size `limits.max_concurrent_trades`) drains
//! the execution queues and drives each opportunity through the eight-step
//! flow of §4.6: single-flight, freshness re-check, risk re-check, mode
//! selection, plan derivation, step execution, receipt observation, and
//! reporting. Every worker is a plain `tokio::spawn`'d loop, matching the
//! teacher's `executor.rs` worker-task pattern; concurrency is bounded by
//! spawning exactly `max_concurrent_trades` workers rather than layering a
//! semaphore over an unbounded pool.

use crate::metrics::Metrics;
use crate::queue::QueueManager;
use crate::risk::RiskManager;
use adapters::{
    ChainAdapter, GasPrice, OpaqueSigner, PriceOracle, ReceiptStatus, SwapDirection, VenueAdapter,
};
use chrono::Utc;
use config::TimeoutsConfig;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use types::{
    ChainId, ExecutionMode, ExecutionPlan, ExecutionResult, MonoTimestamp, Opportunity,
    OpportunityId, OpportunityKind, PlanStep, RiskLevel, TerminalState,
};

use crate::clock::Clock;
use crate::errors::{CoreError, RetryPolicy};

const NOTIFY_CHANNEL_CAPACITY: usize = 256;

pub struct CoordinatorContext {
    pub queues: Arc<QueueManager>,
    pub risk: Arc<RiskManager>,
    pub metrics: Arc<Metrics>,
    pub chains: HashMap<String, Arc<dyn ChainAdapter>>,
    pub venues: HashMap<String, Arc<dyn VenueAdapter>>,
    pub notifier: broadcast::Sender<ExecutionResult>,
    single_flight: DashMap<OpportunityId, ()>,
    pending: DashMap<OpportunityId, Opportunity>,
    pub clock: Clock,
    pub timeouts: TimeoutsConfig,
    active_trades: AtomicUsize,
    pub signer: OpaqueSigner,
    pub wallet: String,
    price_oracle: Arc<dyn PriceOracle>,
}

impl CoordinatorContext {
    fn execution_freshness_ttl(&self) -> Duration {
        Duration::from_secs(self.timeouts.execution_freshness_ttl_secs)
    }

    fn step_deadline(&self) -> Duration {
        Duration::from_secs(self.timeouts.step_deadline_secs)
    }

    fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.execution_timeout_secs)
    }

    fn quote_deadline(&self) -> Duration {
        Duration::from_millis(self.timeouts.quote_deadline_ms)
    }
}

/// Removes the single-flight entry on drop, so any early return (including
/// panics unwinding through `?`) releases the lock.
struct SingleFlightGuard<'a> {
    ctx: &'a CoordinatorContext,
    id: OpportunityId,
}

impl<'a> Drop for SingleFlightGuard<'a> {
    fn drop(&mut self) {
        self.ctx.single_flight.remove(&self.id);
    }
}

struct ActiveTradeGuard<'a> {
    active_trades: &'a AtomicUsize,
}

impl<'a> ActiveTradeGuard<'a> {
    fn enter(active_trades: &'a AtomicUsize) -> Self {
        active_trades.fetch_add(1, Ordering::SeqCst);
        Self { active_trades }
    }
}

impl<'a> Drop for ActiveTradeGuard<'a> {
    fn drop(&mut self) {
        self.active_trades.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct Coordinator {
    ctx: Arc<CoordinatorContext>,
    token: CancellationToken,
    workers: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl Coordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queues: Arc<QueueManager>,
        risk: Arc<RiskManager>,
        metrics: Arc<Metrics>,
        chains: HashMap<String, Arc<dyn ChainAdapter>>,
        venues: HashMap<String, Arc<dyn VenueAdapter>>,
        clock: Clock,
        timeouts: TimeoutsConfig,
        signer: OpaqueSigner,
        wallet: String,
        price_oracle: Arc<dyn PriceOracle>,
    ) -> Self {
        let (notifier, _rx) = broadcast::channel(NOTIFY_CHANNEL_CAPACITY);
        let ctx = Arc::new(CoordinatorContext {
            queues,
            risk,
            metrics,
            chains,
            venues,
            notifier,
            single_flight: DashMap::new(),
            pending: DashMap::new(),
            clock,
            timeouts,
            active_trades: AtomicUsize::new(0),
            signer,
            wallet,
            price_oracle,
        });
        Self {
            ctx,
            token: CancellationToken::new(),
            workers: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionResult> {
        self.ctx.notifier.subscribe()
    }

    /// Registers an opportunity as pending so `Force` can look it up by id.
    /// Actual handoff into the priority queue is the caller's
    /// responsibility (the Orchestrator owns the `Aggregator -> Queue`
    /// wiring); this just keeps `pending` and the queues consistent.
    pub fn track_pending(&self, opp: Opportunity) {
        self.ctx.pending.insert(opp.id.clone(), opp);
    }

    pub fn untrack_pending(&self, id: &OpportunityId) {
        self.ctx.pending.remove(id);
    }

    /// Spawns exactly `worker_count` worker tasks (§4.6: "single
    /// process-wide worker pool of size limits.max_concurrent_trades").
    pub fn start(&self, worker_count: usize) {
        let mut workers = self.workers.lock().unwrap();
        for _ in 0..worker_count {
            let ctx = self.ctx.clone();
            let token = self.token.clone();
            workers.push(tokio::spawn(worker_loop(ctx, token)));
        }
    }

    /// Cancels the shared token and waits up to `shutdown_grace` for every
    /// worker to reach a terminal state (§4.8 `Stop()`, §8 "shutdown
    /// safety").
    pub async fn stop(&self, shutdown_grace: Duration) {
        self.token.cancel();
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock().unwrap());
        let joined = tokio::time::timeout(shutdown_grace, futures_join_all(handles)).await;
        if joined.is_err() {
            tracing::warn!("shutdown grace period elapsed before all workers joined");
        }
    }

    pub fn active_trades(&self) -> usize {
        self.ctx.active_trades.load(Ordering::SeqCst)
    }

    /// `Force(id)`: operator override. Bypasses the risk gate but still
    /// honors single-flight — if a worker already holds the lock for this
    /// id, this call drops and returns `None` just like a duplicate
    /// dequeue would (§4.8).
    pub async fn force(&self, id: OpportunityId) -> Option<ExecutionResult> {
        let opp = self.ctx.pending.get(&id).map(|entry| entry.value().clone())?;
        process_opportunity(self.ctx.clone(), opp, true, self.token.clone()).await
    }
}

/// `tokio::JoinHandle` has no built-in "join all", and the teacher doesn't
/// carry `futures::future::join_all` in this workspace's trimmed
/// dependency set; a small sequential awaiter is enough for a bounded
/// worker pool (`max_concurrent_trades` is single digits).
async fn futures_join_all(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        let _ = handle.await;
    }
}

async fn worker_loop(ctx: Arc<CoordinatorContext>, token: CancellationToken) {
    loop {
        let next = ctx.queues.dequeue_next(&token).await;
        let Some((_kind, opp)) = next else {
            return;
        };
        process_opportunity(ctx.clone(), opp, false, token.clone()).await;
    }
}

/// Drives one opportunity through steps 1-8 of §4.6. Returns `None` only
/// when the single-flight lock was already held (a genuine duplicate,
/// never recorded twice — §8 "idempotent enqueue").
async fn process_opportunity(
    ctx: Arc<CoordinatorContext>,
    opp: Opportunity,
    bypass_risk: bool,
    token: CancellationToken,
) -> Option<ExecutionResult> {
    // Step 1: single-flight.
    if ctx.single_flight.insert(opp.id.clone(), ()).is_some() {
        tracing::warn!(opportunity_id = %opp.id, "single-flight already held, dropping duplicate");
        return None;
    }
    let _guard = SingleFlightGuard {
        ctx: &ctx,
        id: opp.id.clone(),
    };
    ctx.pending.remove(&opp.id);

    let start = ctx.clock.now_precise();
    let now = ctx.clock.now();

    // Step 2: freshness re-check.
    if opp.detected_at.elapsed_since(now) > ctx.execution_freshness_ttl() {
        let result = ExecutionResult::failure(
            opp.id.clone(),
            TerminalState::Expired,
            Decimal::ZERO,
            start.elapsed_since(ctx.clock.now_precise()),
            "opportunity aged past executionFreshnessTTL",
            ctx.clock.now_precise(),
        );
        return Some(finalize(&ctx, &opp, result));
    }

    // Step 3: risk re-check (skipped under Force, which still honors
    // single-flight above).
    if !bypass_risk {
        let today = Utc::now().date_naive();
        let (accept, _assessment) = ctx
            .risk
            .validate(&opp, today, ctx.active_trades.load(Ordering::SeqCst))
            .await;
        if !accept {
            let result = ExecutionResult::failure(
                opp.id.clone(),
                TerminalState::Rejected,
                Decimal::ZERO,
                start.elapsed_since(ctx.clock.now_precise()),
                "risk re-check rejected the opportunity",
                ctx.clock.now_precise(),
            );
            return Some(finalize(&ctx, &opp, result));
        }
    }

    let _active_guard = ActiveTradeGuard::enter(&ctx.active_trades);

    // Step 4: mode selection. No ContractExecutor adapter is modeled in
    // this workspace's external interfaces (§6.1/§6.2 name only Chain and
    // Venue adapters), so Cross/Triangular/Backrun always fall back to
    // DirectStrategy's sequenced swaps; FlashLoan always uses
    // FlashLoanProvider (§4.6 step 4).
    let mode = match opp.kind {
        OpportunityKind::FlashLoan => ExecutionMode::FlashLoanProvider,
        _ => ExecutionMode::DirectStrategy,
    };

    // Step 5: plan (pure, clock-independent given the same opportunity and
    // mode — §8 "Plan is deterministic").
    let plan = build_plan(&opp, mode, ctx.step_deadline());

    // Step 6/7: execute plan steps, observe receipts.
    let deadline_remaining = ctx.execution_timeout();
    let mut gas_cost_acc = Decimal::ZERO;
    let outcome = tokio::time::timeout(
        deadline_remaining,
        execute_plan(&ctx, &opp, &plan, &token, &mut gas_cost_acc),
    )
    .await;

    let result = match outcome {
        Err(_) => ExecutionResult::failure(
            opp.id.clone(),
            TerminalState::Failed,
            gas_cost_acc,
            start.elapsed_since(ctx.clock.now_precise()),
            "executionTimeout exceeded",
            ctx.clock.now_precise(),
        ),
        Ok(Ok(execution)) => ExecutionResult::success(
            opp.id.clone(),
            execution.realized_profit_usd,
            execution.realized_gas_cost_usd,
            execution.tx_refs,
            start.elapsed_since(ctx.clock.now_precise()),
            ctx.clock.now_precise(),
        ),
        Ok(Err(err)) => ExecutionResult::failure(
            opp.id.clone(),
            TerminalState::Failed,
            gas_cost_acc,
            start.elapsed_since(ctx.clock.now_precise()),
            err.to_string(),
            ctx.clock.now_precise(),
        ),
    };

    Some(finalize(&ctx, &opp, result))
}

fn finalize(ctx: &CoordinatorContext, opp: &Opportunity, result: ExecutionResult) -> ExecutionResult {
    ctx.metrics.record(opp.kind, result.clone());
    ctx.risk.record(&opp.chain, opp.kind, &result);
    let _ = ctx.notifier.send(result.clone());
    result
}

/// `Plan(opportunity)` (§4.6 step 5 / §8 determinism). No adapter calls:
/// same `(opportunity, mode, step_deadline)` always yields the same plan.
fn build_plan(opp: &Opportunity, mode: ExecutionMode, step_deadline: Duration) -> ExecutionPlan {
    let risk_level = RiskLevel::from_score(opp.risk_score);
    let hops = opp.venues.len();
    let steps = match opp.kind {
        OpportunityKind::FlashLoan => vec![
            PlanStep { name: "borrow".into(), deadline: step_deadline },
            PlanStep { name: "swap_buy".into(), deadline: step_deadline },
            PlanStep { name: "swap_sell".into(), deadline: step_deadline },
            PlanStep { name: "repay".into(), deadline: step_deadline },
        ],
        _ => {
            let mut steps = vec![PlanStep { name: "check_balance".into(), deadline: step_deadline }];
            for i in 0..hops {
                steps.push(PlanStep {
                    name: format!("swap_{i}"),
                    deadline: step_deadline,
                });
            }
            steps
        }
    };
    let estimated_gas = match opp.kind {
        OpportunityKind::FlashLoan => 350_000,
        _ => 150_000 * hops.max(1) as u64,
    };
    ExecutionPlan {
        opportunity_id: opp.id.clone(),
        kind: opp.kind,
        mode,
        steps,
        estimated_gas,
        risk_level,
    }
}

struct ExecutionOutcome {
    realized_profit_usd: Decimal,
    realized_gas_cost_usd: Decimal,
    tx_refs: Vec<String>,
}

/// Steps 6/7: runs the plan's swaps in strict order (§5 "strict FIFO
/// within a single opportunity's step plan"), checking `token` between
/// each hop. `check_balance`/`approve`/`borrow`/`repay` have no standalone
/// primitive in the external interfaces (§6.1/§6.2 expose only
/// balance/gas/quote/swap/receipt), so they are folded into the
/// surrounding swap calls; only `check_balance` makes a real adapter call,
/// the rest are accounting steps.
async fn execute_plan(
    ctx: &CoordinatorContext,
    opp: &Opportunity,
    plan: &ExecutionPlan,
    token: &CancellationToken,
    gas_cost_acc: &mut Decimal,
) -> Result<ExecutionOutcome, CoreError> {
    let chain = ctx
        .chains
        .get(opp.chain.as_str())
        .ok_or_else(|| CoreError::Fatal {
            cause: format!("no chain adapter registered for {}", opp.chain),
        })?
        .clone();

    if token.is_cancelled() {
        return Err(CoreError::Timeout {
            stage: "cancelled before execution".into(),
        });
    }

    chain
        .get_balance(&opp.path[0], &ctx.wallet)
        .await
        .map_err(adapter_err_to_core)?;

    let mut tx_refs = Vec::new();
    let initial_amount = opp.loan.as_ref().map(|l| l.amount).unwrap_or(opp.amount_in);
    let mut amount = initial_amount;

    for (hop, step) in plan
        .steps
        .iter()
        .filter(|s| s.name.starts_with("swap"))
        .enumerate()
    {
        if token.is_cancelled() {
            return Err(CoreError::Timeout {
                stage: step.name.clone(),
            });
        }
        // Flash-loan paths carry only one venue (path.len() == 2 implies
        // venues.len() == 1); the sell leg reuses it in the reverse
        // direction rather than indexing a second venue that doesn't exist.
        let (venue_key, token_a, token_b, direction) = if opp.kind == OpportunityKind::FlashLoan {
            let key = opp.venues.first().ok_or_else(|| CoreError::Fatal {
                cause: "flash loan opportunity has no venue".into(),
            })?;
            if hop == 0 {
                (key, &opp.path[0], &opp.path[1], SwapDirection::AToB)
            } else {
                (key, &opp.path[1], &opp.path[0], SwapDirection::BToA)
            }
        } else {
            let key = opp
                .venues
                .get(hop)
                .ok_or_else(|| CoreError::ExecutionPartial {
                    step_index: hop,
                    cause: "plan has more swap steps than venues".into(),
                })?;
            let a = &opp.path[hop];
            let b = opp.path.get(hop + 1).unwrap_or(&opp.path[0]);
            (key, a, b, SwapDirection::AToB)
        };
        let venue = ctx
            .venues
            .get(venue_key.as_str())
            .ok_or_else(|| CoreError::Fatal {
                cause: format!("no venue adapter registered for {venue_key}"),
            })?
            .clone();

        let quote_deadline = ctx.quote_deadline();
        let quote = with_retry(&RetryPolicy::default(), || {
            let venue = venue.clone();
            let stage = step.name.clone();
            async move {
                tokio::time::timeout(quote_deadline, venue.quote(token_a, token_b, amount))
                    .await
                    .unwrap_or_else(|_| Err(adapters::AdapterError::Timeout { stage }))
            }
        })
        .await
        .map_err(adapter_err_to_core)?;

        let swap_tx = venue
            .build_swap(
                token_a,
                token_b,
                direction,
                amount,
                quote.amount_out,
                &ctx.wallet,
                ctx.clock.now(),
            )
            .await
            .map_err(adapter_err_to_core)?;

        let tx_ref = with_retry(&RetryPolicy::default(), || {
            let chain = chain.clone();
            let swap_tx = swap_tx.clone();
            async move { chain.send_transaction(swap_tx, &ctx.signer).await }
        })
        .await
        .map_err(adapter_err_to_core)?;

        let receipt = tokio::time::timeout(
            ctx.step_deadline(),
            chain.wait_for_receipt(&tx_ref, ctx.step_deadline()),
        )
        .await
        .map_err(|_| CoreError::Timeout {
            stage: step.name.clone(),
        })?
        .map_err(adapter_err_to_core)?;

        let gas_price = chain.get_gas_price().await.map_err(adapter_err_to_core)?;
        *gas_cost_acc += Decimal::from(receipt.gas_used) * gas_price_unit(&gas_price);
        tx_refs.push(tx_ref.0.clone());

        if receipt.status == ReceiptStatus::Reverted {
            return match opp.kind {
                OpportunityKind::FlashLoan => Err(CoreError::ExecutionAtomicFailed {
                    cause: format!("{} reverted", step.name),
                }),
                _ => Err(CoreError::ExecutionPartial {
                    step_index: hop,
                    cause: format!("{} reverted", step.name),
                }),
            };
        }

        amount = quote.amount_out;
    }

    // Every plan shape closes back to `path[0]`'s token (the generic branch
    // wraps its last hop to `path[0]`; the flash-loan branch's second hop
    // explicitly swaps back), so `amount` here is directly comparable to
    // `initial_amount` without re-deriving a trade path. Valued through the
    // same oracle the Risk Manager uses for `amount_in_usd` (§4.4), not the
    // venue's relative quote price, which is the real on-chain result
    // rather than the pre-execution estimate (§4.6 step 7).
    let loan_fee = opp.loan.as_ref().map(|l| l.fee).unwrap_or(Decimal::ZERO);
    let realized_token_delta = amount - initial_amount - loan_fee;
    let realized_profit_usd = match ctx.price_oracle.usd_price(&opp.path[0]).await {
        Some(price) => realized_token_delta * price,
        // Oracle can't price this token post-execution; reporting is best
        // effort here (the trade already happened), so fall back to the
        // pre-execution estimate rather than fabricate a rate.
        None => opp.net_profit_usd,
    };

    Ok(ExecutionOutcome {
        realized_profit_usd,
        realized_gas_cost_usd: *gas_cost_acc,
        tx_refs,
    })
}

/// Retries `attempt_fn` under `policy` while the adapter reports
/// `AdapterError::Transient` (§7 propagation policy), stopping at the
/// first non-transient error or once the attempt budget is spent.
async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut attempt_fn: F) -> Result<T, adapters::AdapterError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, adapters::AdapterError>>,
{
    let mut attempt = 0;
    loop {
        match attempt_fn().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !matches!(err, adapters::AdapterError::Transient { .. }) || attempt + 1 >= policy.max_attempts {
                    return Err(err);
                }
                tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
                attempt += 1;
            }
        }
    }
}

fn gas_price_unit(price: &GasPrice) -> Decimal {
    match price {
        GasPrice::Legacy { price } => *price,
        GasPrice::Eip1559 { base, priority, .. } => *base + *priority,
    }
}

fn adapter_err_to_core(err: adapters::AdapterError) -> CoreError {
    match err {
        adapters::AdapterError::Transient { source, .. } => CoreError::Transient { source },
        adapters::AdapterError::QuoteUnavailable { venue, pair } => {
            CoreError::QuoteUnavailable { venue, pair }
        }
        adapters::AdapterError::Timeout { stage } => CoreError::Timeout { stage },
        adapters::AdapterError::Fatal { cause } => CoreError::Fatal { cause },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adapters::testing::{InMemoryChainAdapter, InMemoryVenueAdapter};
    use adapters::testing::StaticOracle;
    use adapters::Quote;
    use config::{LimitsConfig, TimeoutsConfig};
    use rust_decimal_macros::dec;
    use std::collections::HashMap as StdHashMap;
    use types::{Blacklists, TokenId, VenueId};

    fn timeouts() -> TimeoutsConfig {
        TimeoutsConfig {
            quote_deadline_ms: 2_000,
            step_deadline_secs: 5,
            execution_timeout_secs: 30,
            shutdown_grace_secs: 5,
            opportunity_ttl_secs: 60,
            execution_freshness_ttl_secs: 10,
            price_freshness_ttl_secs: 120,
            chain_health_poll_secs: 15,
        }
    }

    fn opp(id: &str, detected_ns: u64) -> Opportunity {
        Opportunity::new(
            OpportunityId::new(id),
            OpportunityKind::CrossExchange,
            ChainId::new("ethereum"),
            MonoTimestamp::from_nanos(detected_ns),
            vec![TokenId::new("WETH"), TokenId::new("USDC")],
            vec![VenueId::new("uniswap")],
            dec!(1),
            dec!(101),
            dec!(20),
            dec!(2),
            dec!(0.001),
            dec!(100000),
            None,
        )
        .unwrap()
        .with_enrichment(10, 8, 90)
    }

    fn build_coordinator() -> (Coordinator, Arc<InMemoryChainAdapter>, Arc<InMemoryVenueAdapter>) {
        let chain_adapter = Arc::new(InMemoryChainAdapter::new());
        let venue_adapter = Arc::new(InMemoryVenueAdapter::new());
        venue_adapter.set_quote(
            &TokenId::new("WETH"),
            &TokenId::new("USDC"),
            Quote {
                price: dec!(100),
                amount_out: dec!(101),
                price_impact: dec!(0.001),
            },
        );

        let mut chains: HashMap<String, Arc<dyn ChainAdapter>> = StdHashMap::new();
        chains.insert("ethereum".to_string(), chain_adapter.clone());
        let mut venues: HashMap<String, Arc<dyn VenueAdapter>> = StdHashMap::new();
        venues.insert("uniswap".to_string(), venue_adapter.clone());

        let limits = LimitsConfig {
            max_single_trade_usd: dec!(5000),
            max_daily_volume_usd: StdHashMap::new(),
            max_concurrent_trades: 2,
            max_gas_cost_pct_of_profit: dec!(0.5),
            min_liquidity_ratio: dec!(0.1),
        };
        let mut prices = StdHashMap::new();
        prices.insert("WETH".to_string(), dec!(100));
        let oracle = Arc::new(StaticOracle::new(prices));
        let risk = Arc::new(RiskManager::new(limits, dec!(10000), dec!(0.02), Blacklists::default(), oracle.clone()));
        let metrics = Arc::new(Metrics::new());
        let queues = Arc::new(QueueManager::new(&StdHashMap::new(), &StdHashMap::new()));

        let coordinator = Coordinator::new(
            queues,
            risk,
            metrics,
            chains,
            venues,
            Clock::start(),
            timeouts(),
            OpaqueSigner("signer".to_string()),
            "0xwallet".to_string(),
            oracle,
        );
        (coordinator, chain_adapter, venue_adapter)
    }

    #[tokio::test]
    async fn happy_path_executes_and_reports_success() {
        let (coordinator, _chain, _venue) = build_coordinator();
        let token = CancellationToken::new();
        let result = process_opportunity(coordinator.ctx.clone(), opp("happy", 0), false, token)
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(coordinator.ctx.metrics.snapshot(OpportunityKind::CrossExchange).successes, 1);
    }

    #[tokio::test]
    async fn stale_opportunity_expires_without_touching_chain() {
        let (coordinator, chain, _venue) = build_coordinator();
        let far_past = 0u64;
        let token = CancellationToken::new();
        let stale = opp("stale", far_past);
        // simulate a clock well past the freshness TTL by waiting is not
        // practical in a unit test; instead construct detected_at using the
        // clock's current precise reading minus more than the TTL.
        let now = coordinator.ctx.clock.now_precise();
        let old_detected = MonoTimestamp::from_nanos(
            now.0.saturating_sub(Duration::from_secs(11).as_nanos() as u64),
        );
        let mut aged = stale;
        aged.detected_at = old_detected;
        let result = process_opportunity(coordinator.ctx.clone(), aged, false, token)
            .await
            .unwrap();
        assert_eq!(result.status, TerminalState::Expired);
        assert!(chain.sent_transactions().is_empty());
    }

    #[tokio::test]
    async fn duplicate_single_flight_is_dropped() {
        let (coordinator, _chain, _venue) = build_coordinator();
        let id = OpportunityId::new("dup");
        coordinator.ctx.single_flight.insert(id.clone(), ());
        let token = CancellationToken::new();
        let result = process_opportunity(coordinator.ctx.clone(), opp("dup", 0), false, token).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn flash_loan_revert_surfaces_atomic_failure() {
        let (coordinator, chain, venue) = build_coordinator();
        chain.set_next_receipt(ReceiptStatus::Reverted);
        venue.set_quote(
            &TokenId::new("WETH"),
            &TokenId::new("USDC"),
            Quote {
                price: dec!(100),
                amount_out: dec!(101),
                price_impact: dec!(0.001),
            },
        );
        let mut flash = Opportunity::new(
            OpportunityId::new("flash"),
            OpportunityKind::FlashLoan,
            ChainId::new("ethereum"),
            MonoTimestamp::from_nanos(0),
            vec![TokenId::new("WETH"), TokenId::new("USDC")],
            vec![VenueId::new("uniswap")],
            dec!(1),
            dec!(101),
            dec!(20),
            dec!(2),
            dec!(0.001),
            dec!(100000),
            Some(types::LoanInfo {
                provider_id: "aave".to_string(),
                amount: dec!(1000),
                fee: dec!(1),
            }),
        )
        .unwrap();
        flash = flash.with_enrichment(10, 8, 90);
        let token = CancellationToken::new();
        let result = process_opportunity(coordinator.ctx.clone(), flash, false, token)
            .await
            .unwrap();
        assert_eq!(result.status, TerminalState::Failed);
        assert!(result.realized_gas_cost_usd > Decimal::ZERO);
    }

    /// §8 "shutdown safety": `stop()` must return within its grace period
    /// even while a worker is mid-flight, and no worker should be left
    /// running afterwards.
    #[tokio::test]
    async fn stop_joins_workers_within_grace_period() {
        let (coordinator, _chain, _venue) = build_coordinator();
        coordinator.start(2);
        coordinator.ctx.queues.enqueue(OpportunityKind::CrossExchange, opp("shutdown-a", 0));
        coordinator.ctx.queues.enqueue(OpportunityKind::CrossExchange, opp("shutdown-b", 0));

        tokio::time::sleep(Duration::from_millis(20)).await;
        let stopped = tokio::time::timeout(Duration::from_secs(2), coordinator.stop(Duration::from_secs(1))).await;
        assert!(stopped.is_ok(), "stop() did not return within its own grace-period timeout");
        assert_eq!(coordinator.active_trades(), 0);
    }

    /// §8 "concurrency cap": the worker pool's size bounds how many trades
    /// run at once, regardless of how many opportunities are queued.
    #[tokio::test]
    async fn worker_pool_size_bounds_concurrent_trades() {
        let (coordinator, _chain, _venue) = build_coordinator();
        coordinator.start(2);
        for i in 0..6 {
            coordinator
                .ctx
                .queues
                .enqueue(OpportunityKind::CrossExchange, opp(&format!("cap-{i}"), i as u64));
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(coordinator.active_trades() <= 2);
        coordinator.stop(Duration::from_secs(2)).await;
        assert_eq!(coordinator.active_trades(), 0);
    }
}
