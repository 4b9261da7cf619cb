//! # Strategy Scanner (C5)
//!
//! ## Purpose
//!
//! One task per `(chain, strategy)`. Each tick is a bounded action: quote a
//! handful of venues in parallel under `quoteDeadline`, drop the ones that
//! fail, and synthesize zero or more raw opportunities (§4.2). A scanner
//! never aborts its loop on an individual venue error — only logs and
//! continues — and back-pressures purely through the inter-scan sleep and
//! the Aggregator queue's drop-oldest-on-full policy.

use crate::errors::RetryPolicy;
use crate::price_cache::PriceCache;
use adapters::{AdapterError, VenueAdapter};
use config::{FlashLoanConfig, ScannerConfig};
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use types::{ChainId, LoanInfo, Opportunity, OpportunityId, OpportunityKind, PriceQuote, TokenId, VenueId};

/// Non-blocking handoff to the Aggregator: a bounded MPSC channel where a
/// full queue drops the oldest item rather than blocking the scanner
/// (§4.2: "the opportunity is already near-stale").
#[derive(Clone)]
pub struct OpportunitySink {
    tx: tokio::sync::mpsc::Sender<Opportunity>,
}

impl OpportunitySink {
    pub fn push(&self, opportunity: Opportunity) {
        match self.tx.try_send(opportunity) {
            Ok(()) => {}
            Err(tokio::sync::mpsc::error::TrySendError::Full(opportunity)) => {
                debug!(opportunity_id = %opportunity.id, "scanner sink full, dropping oldest");
                let _ = self.tx.try_send(opportunity);
            }
            Err(tokio::sync::mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

/// Builds the bounded channel pair; the receiver end is drained by whatever
/// feeds the Aggregator (the orchestrator's pump loop).
pub fn opportunity_channel(capacity: usize) -> (OpportunitySink, tokio::sync::mpsc::Receiver<Opportunity>) {
    let (tx, rx) = tokio::sync::mpsc::channel(capacity);
    (OpportunitySink { tx }, rx)
}

pub struct ScannerContext {
    pub chain: ChainId,
    pub venues: HashMap<String, Arc<dyn VenueAdapter>>,
    pub price_cache: Arc<PriceCache>,
    pub clock: crate::clock::Clock,
    pub scanner_config: ScannerConfig,
    pub flash_loan_config: FlashLoanConfig,
    pub min_profit_pct: Decimal,
    pub quote_deadline: Duration,
    pub notional_amount_in: Decimal,
    pub sink: OpportunitySink,
}

/// Runs all three strategy loops for one chain until `token` is cancelled.
/// Each loop is its own task so a stalled triangular scan can't stall
/// cross-exchange scanning on the same chain.
pub async fn run(ctx: Arc<ScannerContext>, token: CancellationToken) {
    let cross = tokio::spawn(cross_exchange_loop(ctx.clone(), token.clone()));
    let tri = tokio::spawn(triangular_loop(ctx.clone(), token.clone()));
    let flash = tokio::spawn(flash_loan_loop(ctx.clone(), token.clone()));

    let _ = tokio::join!(cross, tri, flash);
}

fn interval_for(ctx: &ScannerContext) -> Duration {
    let base_ms = ctx
        .scanner_config
        .interval_ms
        .get(ctx.chain.as_str())
        .copied()
        .unwrap_or(2_000);
    Duration::from_millis(base_ms)
}

/// Sleeps `base` plus up to 20% jitter so many chains don't all tick in
/// lockstep and hammer venue adapters at the same instant.
async fn jittered_sleep(base: Duration, token: &CancellationToken) -> bool {
    let jitter_ms = rand::thread_rng().gen_range(0..=(base.as_millis() as u64 / 5).max(1));
    let sleep = base + Duration::from_millis(jitter_ms);
    tokio::select! {
        _ = tokio::time::sleep(sleep) => true,
        _ = token.cancelled() => false,
    }
}

fn opportunity_id() -> OpportunityId {
    OpportunityId::new(uuid::Uuid::new_v4().to_string())
}

/// Quotes one venue, retrying `AdapterError::Transient` failures under
/// `policy` (§7 propagation policy) before giving up. A per-attempt
/// deadline bounds each try; a non-transient error or an exhausted retry
/// budget returns immediately.
async fn quote_with_retry(
    venue: &Arc<dyn VenueAdapter>,
    token_a: &TokenId,
    token_b: &TokenId,
    amount_in: Decimal,
    deadline: Duration,
    policy: &RetryPolicy,
) -> Result<adapters::Quote, AdapterError> {
    let mut attempt = 0;
    loop {
        match tokio::time::timeout(deadline, venue.quote(token_a, token_b, amount_in)).await {
            Ok(Ok(quote)) => return Ok(quote),
            Ok(Err(err)) => {
                if !matches!(err, AdapterError::Transient { .. }) || attempt + 1 >= policy.max_attempts {
                    return Err(err);
                }
                tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
                attempt += 1;
            }
            Err(_) => return Err(AdapterError::Timeout { stage: "quote".to_string() }),
        }
    }
}

/// Calls every known venue's `quote` in parallel with a per-call deadline,
/// drops the ones that fail or time out, and caches every surviving quote
/// (§4.1, §4.2).
async fn quote_all_venues(
    ctx: &ScannerContext,
    token_a: &TokenId,
    token_b: &TokenId,
    amount_in: Decimal,
) -> Vec<(VenueId, PriceQuote)> {
    let mut handles = Vec::new();
    for (name, venue) in &ctx.venues {
        let venue = venue.clone();
        let name = name.clone();
        let token_a = token_a.clone();
        let token_b = token_b.clone();
        handles.push(tokio::spawn(async move {
            let result = quote_with_retry(
                &venue,
                &token_a,
                &token_b,
                amount_in,
                Duration::from_millis(2_000),
                &RetryPolicy::default(),
            )
            .await;
            (name, result)
        }));
    }

    let mut quotes = Vec::new();
    for handle in handles {
        let Ok((name, result)) = handle.await else {
            continue;
        };
        match result {
            Ok(quote) => {
                let liquidity = {
                    let v = ctx.venues.get(&name);
                    match v {
                        Some(v) => v.liquidity(token_a, token_b).await.unwrap_or(Decimal::ZERO),
                        None => Decimal::ZERO,
                    }
                };
                let venue_id = VenueId::new(name.clone());
                let price_quote = PriceQuote {
                    chain: ctx.chain.clone(),
                    venue: venue_id.clone(),
                    token_a: token_a.clone(),
                    token_b: token_b.clone(),
                    price: quote.price,
                    liquidity,
                    price_impact: quote.price_impact,
                    ts: ctx.clock.now(),
                };
                ctx.price_cache.put(
                    ctx.chain.clone(),
                    venue_id.clone(),
                    (token_a.clone(), token_b.clone()),
                    price_quote.clone(),
                );
                quotes.push((venue_id, price_quote));
            }
            Err(err) => {
                trace!(venue = %name, error = %err, "venue quote failed, skipping");
            }
        }
    }
    quotes
}

async fn cross_exchange_loop(ctx: Arc<ScannerContext>, token: CancellationToken) {
    let interval = interval_for(&ctx);
    loop {
        if token.is_cancelled() {
            return;
        }
        let pairs = ctx
            .scanner_config
            .pairs
            .get(ctx.chain.as_str())
            .cloned()
            .unwrap_or_default();

        for (a, b) in &pairs {
            let token_a = TokenId::new(a.clone());
            let token_b = TokenId::new(b.clone());
            let quotes = quote_all_venues(&ctx, &token_a, &token_b, ctx.notional_amount_in).await;
            if quotes.len() < 2 {
                continue;
            }

            let best_buy = quotes.iter().min_by_key(|(_, q)| q.price);
            let best_sell = quotes.iter().max_by_key(|(_, q)| q.price);

            if let (Some((buy_venue, buy_quote)), Some((sell_venue, sell_quote))) = (best_buy, best_sell) {
                if buy_venue == sell_venue || buy_quote.price <= Decimal::ZERO {
                    continue;
                }
                let spread = (sell_quote.price - buy_quote.price) / buy_quote.price;
                if spread <= ctx.min_profit_pct {
                    continue;
                }

                let amount_in = ctx.notional_amount_in;
                let expected_amount_out = amount_in * sell_quote.price / buy_quote.price;
                let gross_profit_usd = (expected_amount_out - amount_in) * buy_quote.price;
                let liquidity_usd = buy_quote.liquidity.min(sell_quote.liquidity);

                // Round trip: buy A -> B on buy_venue, then sell B -> A back
                // on sell_venue to realize the spread (§4.6 step 5). The
                // trade path closes where it started, so it carries the two
                // legs' venues against a three-token path (A, B, A).
                let opp = Opportunity::new(
                    opportunity_id(),
                    OpportunityKind::CrossExchange,
                    ctx.chain.clone(),
                    ctx.clock.now(),
                    vec![token_a.clone(), token_b.clone(), token_a.clone()],
                    vec![buy_venue.clone(), sell_venue.clone()],
                    amount_in,
                    expected_amount_out,
                    gross_profit_usd,
                    estimate_gas_cost_usd(2),
                    price_impact_estimate(&[buy_quote.clone(), sell_quote.clone()]),
                    liquidity_usd,
                    None,
                );
                match opp {
                    Ok(opp) => push_downstream(&ctx, opp),
                    Err(err) => warn!(error = %err, "cross-exchange opportunity failed invariant checks"),
                }
            }
        }

        if !jittered_sleep(interval, &token).await {
            return;
        }
    }
}

async fn triangular_loop(ctx: Arc<ScannerContext>, token: CancellationToken) {
    let interval = interval_for(&ctx);
    loop {
        if token.is_cancelled() {
            return;
        }
        let cycles = ctx
            .scanner_config
            .paths
            .get(ctx.chain.as_str())
            .and_then(|by_strategy| by_strategy.get("triangular"))
            .cloned()
            .unwrap_or_default();

        for cycle in &cycles {
            if cycle.len() < 3 {
                continue;
            }
            let path: Vec<TokenId> = cycle.iter().map(|s| TokenId::new(s.clone())).collect();
            if let Some((venue_id, multiplier, quotes)) = simulate_triangular_cycle(&ctx, &path).await {
                let threshold = Decimal::ONE + ctx.min_profit_pct;
                if multiplier <= threshold {
                    continue;
                }
                let amount_in = ctx.notional_amount_in;
                let expected_amount_out = amount_in * multiplier;
                let gross_profit_usd = expected_amount_out - amount_in;
                let liquidity_usd = quotes
                    .iter()
                    .map(|q| q.liquidity)
                    .min()
                    .unwrap_or(Decimal::ZERO);
                // `path` lists the cycle's distinct tokens (A, B, C); the
                // closing hop back to the first token makes the actual trade
                // path `path.len()` swaps long (the interior hops plus the
                // C -> A close `simulate_triangular_cycle` already quoted),
                // so the opportunity's path repeats the first token at the
                // end and carries one venue per hop.
                let mut trade_path = path.clone();
                if let Some(first) = path.first() {
                    trade_path.push(first.clone());
                }
                let venues = vec![venue_id; path.len()];

                let opp = Opportunity::new(
                    opportunity_id(),
                    OpportunityKind::Triangular,
                    ctx.chain.clone(),
                    ctx.clock.now(),
                    trade_path,
                    venues,
                    amount_in,
                    expected_amount_out,
                    gross_profit_usd,
                    estimate_gas_cost_usd(path.len()),
                    price_impact_estimate(&quotes),
                    liquidity_usd,
                    None,
                );
                match opp {
                    Ok(opp) => push_downstream(&ctx, opp),
                    Err(err) => warn!(error = %err, "triangular opportunity failed invariant checks"),
                }
            }
        }

        if !jittered_sleep(interval, &token).await {
            return;
        }
    }
}

/// Simulates one `A -> B -> C -> A` round trip on a single venue, chaining
/// each hop's `amount_out` into the next hop's `amount_in` (the venue's fee
/// is already folded into the quoter's `amount_out`). Picks whichever
/// configured venue yields the best round-trip multiplier.
async fn simulate_triangular_cycle(
    ctx: &ScannerContext,
    path: &[TokenId],
) -> Option<(VenueId, Decimal, Vec<PriceQuote>)> {
    let mut best: Option<(VenueId, Decimal, Vec<PriceQuote>)> = None;

    for (name, venue) in &ctx.venues {
        let mut amount = ctx.notional_amount_in;
        let mut quotes = Vec::new();
        let mut ok = true;

        for hop in path.windows(2) {
            let token_a = &hop[0];
            let token_b = &hop[1];
            match quote_with_retry(venue, token_a, token_b, amount, ctx.quote_deadline, &RetryPolicy::default()).await {
                Ok(quote) => {
                    amount = quote.amount_out;
                    quotes.push(PriceQuote {
                        chain: ctx.chain.clone(),
                        venue: VenueId::new(name.clone()),
                        token_a: token_a.clone(),
                        token_b: token_b.clone(),
                        price: quote.price,
                        liquidity: venue.liquidity(token_a, token_b).await.unwrap_or(Decimal::ZERO),
                        price_impact: quote.price_impact,
                        ts: ctx.clock.now(),
                    });
                }
                _ => {
                    ok = false;
                    break;
                }
            }
        }
        // close the cycle back to the starting token
        if ok {
            if let (Some(last), Some(first)) = (path.last(), path.first()) {
                match quote_with_retry(venue, last, first, amount, ctx.quote_deadline, &RetryPolicy::default()).await {
                    Ok(quote) => {
                        amount = quote.amount_out;
                        quotes.push(PriceQuote {
                            chain: ctx.chain.clone(),
                            venue: VenueId::new(name.clone()),
                            token_a: last.clone(),
                            token_b: first.clone(),
                            price: quote.price,
                            liquidity: venue.liquidity(last, first).await.unwrap_or(Decimal::ZERO),
                            price_impact: quote.price_impact,
                            ts: ctx.clock.now(),
                        });
                    }
                    _ => ok = false,
                }
            }
        }

        if !ok || ctx.notional_amount_in <= Decimal::ZERO {
            continue;
        }
        let multiplier = amount / ctx.notional_amount_in;
        let better = best.as_ref().map(|(_, m, _)| multiplier > *m).unwrap_or(true);
        if better {
            best = Some((VenueId::new(name.clone()), multiplier, quotes));
        }
    }

    best
}

async fn flash_loan_loop(ctx: Arc<ScannerContext>, token: CancellationToken) {
    let interval = interval_for(&ctx);
    loop {
        if token.is_cancelled() {
            return;
        }
        let pairs = ctx
            .scanner_config
            .pairs
            .get(ctx.chain.as_str())
            .cloned()
            .unwrap_or_default();

        for (a, b) in &pairs {
            let token_a = TokenId::new(a.clone());
            let token_b = TokenId::new(b.clone());
            let quotes = quote_all_venues(&ctx, &token_a, &token_b, ctx.notional_amount_in).await;
            if quotes.len() < 2 {
                continue;
            }
            let best_buy = quotes.iter().min_by_key(|(_, q)| q.price);
            let best_sell = quotes.iter().max_by_key(|(_, q)| q.price);
            let (Some((buy_venue, buy_quote)), Some((sell_venue, sell_quote))) = (best_buy, best_sell) else {
                continue;
            };
            if buy_venue == sell_venue || buy_quote.price <= Decimal::ZERO {
                continue;
            }
            let spread = (sell_quote.price - buy_quote.price) / buy_quote.price;
            if spread <= ctx.min_profit_pct {
                continue;
            }

            let Some(provider) = cheapest_sufficient_provider(&ctx.flash_loan_config, buy_quote.liquidity.min(sell_quote.liquidity)) else {
                continue;
            };

            let loan_amount = (provider.max_liquidity_usd * ctx.flash_loan_config.cap_fraction)
                .min(ctx.flash_loan_config.configured_cap_usd);
            if loan_amount <= Decimal::ZERO {
                continue;
            }

            let fee = loan_amount * provider.fee_bps / dec!(10000);
            let expected_amount_out = loan_amount * sell_quote.price / buy_quote.price;
            let gross_profit_usd = (expected_amount_out - loan_amount) * buy_quote.price;
            let liquidity_usd = buy_quote.liquidity.min(sell_quote.liquidity);

            let opp = Opportunity::new(
                opportunity_id(),
                OpportunityKind::FlashLoan,
                ctx.chain.clone(),
                ctx.clock.now(),
                vec![token_a.clone(), token_b.clone()],
                vec![buy_venue.clone()],
                loan_amount,
                expected_amount_out,
                gross_profit_usd,
                estimate_gas_cost_usd(2),
                price_impact_estimate(&[buy_quote.clone(), sell_quote.clone()]),
                liquidity_usd,
                Some(LoanInfo {
                    provider_id: provider.id.clone(),
                    amount: loan_amount,
                    fee,
                }),
            );
            match opp {
                Ok(opp) => push_downstream(&ctx, opp),
                Err(err) => warn!(error = %err, "flash loan opportunity failed invariant checks"),
            }
        }

        if !jittered_sleep(interval, &token).await {
            return;
        }
    }
}

/// Cheapest provider (by `fee_bps`) with enough liquidity to cover the
/// trade's cap, sized to `min(providerMax × capFraction, configuredCap)`
/// (§4.2).
fn cheapest_sufficient_provider<'a>(
    config: &'a FlashLoanConfig,
    required_liquidity: Decimal,
) -> Option<&'a config::FlashLoanProviderConfig> {
    config
        .providers
        .iter()
        .filter(|p| p.max_liquidity_usd >= required_liquidity)
        .min_by_key(|p| p.fee_bps)
}

/// A conservative per-hop flat estimate; the real figure is only known
/// after `ChainAdapter::get_gas_price` is called at execution time. This
/// only feeds the aggregator's gas-cost gate, never the executed trade.
fn estimate_gas_cost_usd(hops: usize) -> Decimal {
    Decimal::from(hops) * dec!(3)
}

/// Worst-case slippage across every leg — the opportunity's real exposure
/// is whichever hop moves the most, not an average.
fn price_impact_estimate(quotes: &[PriceQuote]) -> Decimal {
    quotes
        .iter()
        .map(|q| q.price_impact)
        .fold(Decimal::ZERO, |acc, v| acc.max(v))
}

fn push_downstream(ctx: &ScannerContext, opp: Opportunity) {
    ctx.sink.push(opp);
}

#[cfg(test)]
mod tests {
    use super::*;
    use adapters::testing::InMemoryVenueAdapter;
    use adapters::Quote;

    fn price_quote(price: Decimal) -> Quote {
        Quote {
            price,
            amount_out: price,
            price_impact: dec!(0.001),
        }
    }

    fn venue(price: Decimal, liquidity: Decimal) -> Arc<dyn VenueAdapter> {
        let adapter = InMemoryVenueAdapter::new();
        adapter.set_quote(&TokenId::new("A"), &TokenId::new("B"), price_quote(price));
        adapter.set_liquidity(&TokenId::new("A"), &TokenId::new("B"), liquidity);
        Arc::new(adapter)
    }

    fn base_ctx(venues: HashMap<String, Arc<dyn VenueAdapter>>) -> ScannerContext {
        let (sink, _rx) = opportunity_channel(16);
        ScannerContext {
            chain: ChainId::new("ethereum"),
            venues,
            price_cache: Arc::new(PriceCache::new(Duration::from_secs(120))),
            clock: crate::clock::Clock::start(),
            scanner_config: ScannerConfig::default(),
            flash_loan_config: FlashLoanConfig::default(),
            min_profit_pct: dec!(0.003),
            quote_deadline: Duration::from_millis(500),
            notional_amount_in: dec!(1000),
            sink,
        }
    }

    #[tokio::test]
    async fn quote_all_venues_drops_failures_and_caches_survivors() {
        let mut venues = HashMap::new();
        venues.insert("uniswap".to_string(), venue(dec!(100), dec!(50000)));
        let ctx = base_ctx(venues);
        let quotes = quote_all_venues(&ctx, &TokenId::new("A"), &TokenId::new("B"), dec!(1000)).await;
        assert_eq!(quotes.len(), 1);
        assert!(ctx
            .price_cache
            .get(
                &ChainId::new("ethereum"),
                &VenueId::new("uniswap"),
                &(TokenId::new("A"), TokenId::new("B")),
                ctx.clock.now(),
            )
            .is_some());
    }

    #[test]
    fn cheapest_provider_picks_lowest_fee_with_enough_liquidity() {
        let config = FlashLoanConfig {
            providers: vec![
                config::FlashLoanProviderConfig {
                    id: "aave".into(),
                    max_liquidity_usd: dec!(1_000_000),
                    fee_bps: dec!(9),
                },
                config::FlashLoanProviderConfig {
                    id: "balancer".into(),
                    max_liquidity_usd: dec!(500_000),
                    fee_bps: dec!(0),
                },
            ],
            cap_fraction: dec!(0.8),
            configured_cap_usd: dec!(100_000),
        };
        let provider = cheapest_sufficient_provider(&config, dec!(200_000)).unwrap();
        assert_eq!(provider.id, "balancer");
    }

    #[test]
    fn cheapest_provider_excludes_insufficient_liquidity() {
        let config = FlashLoanConfig {
            providers: vec![config::FlashLoanProviderConfig {
                id: "aave".into(),
                max_liquidity_usd: dec!(1_000),
                fee_bps: dec!(9),
            }],
            cap_fraction: dec!(0.8),
            configured_cap_usd: dec!(100_000),
        };
        assert!(cheapest_sufficient_provider(&config, dec!(50_000)).is_none());
    }
}
