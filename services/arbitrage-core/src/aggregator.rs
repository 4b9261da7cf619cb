//! # Opportunity Aggregator (C6)
//!
//! ## Purpose
//!
//! `Process(raw_opportunities) -> validated[]` (§4.3): filter through five
//! validation gates, enrich survivors with risk/priority/confidence, drop
//! duplicates by `(chain, kind, path, venues)` fingerprint, and return them
//! sorted by descending priority then descending net profit. A background
//! cross-chain analyzer runs over the same input independently and never
//! affects what the Coordinator executes.

use crate::risk::SuccessRateEstimator;
use crate::scoring;
use config::ProfitConfig;
use std::collections::HashMap;
use std::time::Duration;
use types::{CrossChainOpportunity, MonoTimestamp, Opportunity};

pub struct Aggregator {
    profit: ProfitConfig,
    opportunity_ttl: Duration,
}

impl Aggregator {
    pub fn new(profit: ProfitConfig, opportunity_ttl: Duration) -> Self {
        Self {
            profit,
            opportunity_ttl,
        }
    }

    /// Validation gates (§4.3), all must hold.
    fn passes_gates(&self, opp: &Opportunity, now: MonoTimestamp) -> bool {
        if opp.net_profit_usd < self.profit.min_profit_usd {
            return false;
        }
        if opp.gross_profit_usd <= rust_decimal::Decimal::ZERO {
            return false;
        }
        if opp.gas_cost_usd / opp.gross_profit_usd > self.profit.max_gas_cost_fraction {
            return false;
        }
        if opp.liquidity_usd < self.profit.min_liquidity_usd {
            return false;
        }
        if opp.price_impact > self.profit.max_price_impact {
            return false;
        }
        if opp.detected_at.elapsed_since(now) > self.opportunity_ttl {
            return false;
        }
        true
    }

    fn enrich(&self, opp: Opportunity, success_rate: &SuccessRateEstimator) -> Opportunity {
        let factors = scoring::risk_factors(&opp, self.profit.min_liquidity_usd, self.profit.max_price_impact);
        let risk_score = scoring::weighted_risk_score(&factors);
        let rate = success_rate.get(&opp.chain, opp.kind);
        let confidence = scoring::confidence(&factors, rate);
        let priority = scoring::priority(&opp, risk_score, confidence);
        opp.with_enrichment(risk_score, priority, confidence)
    }

    /// Keeps the higher `net_profit_usd` on a fingerprint collision,
    /// favoring the newer `detected_at` on a tie.
    fn dedup(opportunities: Vec<Opportunity>) -> Vec<Opportunity> {
        let mut best: HashMap<String, Opportunity> = HashMap::new();
        for opp in opportunities {
            let fp = opp.fingerprint();
            match best.get(&fp) {
                None => {
                    best.insert(fp, opp);
                }
                Some(existing) => {
                    let replace = match opp.net_profit_usd.cmp(&existing.net_profit_usd) {
                        std::cmp::Ordering::Greater => true,
                        std::cmp::Ordering::Equal => opp.detected_at > existing.detected_at,
                        std::cmp::Ordering::Less => false,
                    };
                    if replace {
                        best.insert(fp, opp);
                    }
                }
            }
        }
        best.into_values().collect()
    }

    /// Descending priority, then descending net_profit_usd, then oldest
    /// `detected_at` first for full determinism (§4.3, with the `queue.rs`
    /// tie-break extended here for a stable total order).
    fn sort(mut opportunities: Vec<Opportunity>) -> Vec<Opportunity> {
        opportunities.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(b.net_profit_usd.cmp(&a.net_profit_usd))
                .then(a.detected_at.cmp(&b.detected_at))
        });
        opportunities
    }

    pub fn process(
        &self,
        raw: Vec<Opportunity>,
        now: MonoTimestamp,
        success_rate: &SuccessRateEstimator,
    ) -> Vec<Opportunity> {
        let validated: Vec<Opportunity> = raw
            .into_iter()
            .filter(|opp| self.passes_gates(opp, now))
            .map(|opp| self.enrich(opp, success_rate))
            .collect();
        let deduped = Self::dedup(validated);
        Self::sort(deduped)
    }
}

/// Minimum average price delta between two chains for the same token pair
/// to be worth reporting (§4.3: "average price delta > 1%").
const CROSS_CHAIN_SPREAD_THRESHOLD: f64 = 0.01;

/// Purely informational; separate from `Aggregator::process` because its
/// output never enters the execution queue.
pub fn analyze_cross_chain(opportunities: &[Opportunity], now: MonoTimestamp) -> Vec<CrossChainOpportunity> {
    use rust_decimal::prelude::ToPrimitive;
    use std::collections::BTreeMap;

    // pair -> chain -> (sum of implied prices, count)
    let mut by_pair: BTreeMap<(String, String), BTreeMap<String, (rust_decimal::Decimal, u32)>> = BTreeMap::new();

    for opp in opportunities {
        if opp.amount_in <= rust_decimal::Decimal::ZERO || opp.path.len() < 2 {
            continue;
        }
        let pair = (opp.path[0].as_str().to_string(), opp.path[opp.path.len() - 1].as_str().to_string());
        let implied_price = opp.expected_amount_out / opp.amount_in;
        let entry = by_pair
            .entry(pair)
            .or_default()
            .entry(opp.chain.as_str().to_string())
            .or_insert((rust_decimal::Decimal::ZERO, 0));
        entry.0 += implied_price;
        entry.1 += 1;
    }

    let mut results = Vec::new();
    for ((token_a, token_b), by_chain) in by_pair {
        let averages: Vec<(String, rust_decimal::Decimal)> = by_chain
            .into_iter()
            .map(|(chain, (sum, count))| (chain, sum / rust_decimal::Decimal::from(count)))
            .collect();
        for i in 0..averages.len() {
            for j in (i + 1)..averages.len() {
                let (chain_a, price_a) = &averages[i];
                let (chain_b, price_b) = &averages[j];
                if price_a.is_zero() || price_b.is_zero() {
                    continue;
                }
                let low = (*price_a).min(*price_b);
                let delta = (*price_a - *price_b).abs() / low;
                let delta_f64 = delta.to_f64().unwrap_or(0.0);
                if delta_f64 > CROSS_CHAIN_SPREAD_THRESHOLD {
                    results.push(CrossChainOpportunity {
                        token_pair: (token_a.as_str().into(), token_b.as_str().into()),
                        chain_a: chain_a.as_str().into(),
                        chain_b: chain_b.as_str().into(),
                        price_a: *price_a,
                        price_b: *price_b,
                        spread_pct: delta,
                        detected_at: now,
                    });
                }
            }
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use types::{ChainId, OpportunityId, OpportunityKind, TokenId, VenueId};

    fn profit_config() -> ProfitConfig {
        ProfitConfig {
            min_profit_pct: dec!(0.003),
            min_profit_usd: dec!(10),
            min_liquidity_usd: dec!(10000),
            max_gas_cost_fraction: dec!(0.3),
            max_price_impact: dec!(0.02),
        }
    }

    fn opp(id: &str, chain: &str, net_profit: rust_decimal::Decimal, detected_ns: u64) -> Opportunity {
        Opportunity::new(
            OpportunityId::new(id),
            OpportunityKind::CrossExchange,
            ChainId::new(chain),
            MonoTimestamp::from_nanos(detected_ns),
            vec![TokenId::new("WETH"), TokenId::new("USDC")],
            vec![VenueId::new("v")],
            dec!(1000),
            dec!(1000) + net_profit + dec!(2),
            net_profit + dec!(2),
            dec!(2),
            dec!(0.001),
            dec!(50000),
            None,
        )
        .unwrap()
    }

    #[test]
    fn filters_below_min_profit() {
        let aggregator = Aggregator::new(profit_config(), Duration::from_secs(60));
        let rate = SuccessRateEstimator::new();
        let low = opp("low", "ethereum", dec!(1), 0);
        let result = aggregator.process(vec![low], MonoTimestamp::from_nanos(0), &rate);
        assert!(result.is_empty());
    }

    #[test]
    fn filters_stale_opportunities() {
        let aggregator = Aggregator::new(profit_config(), Duration::from_secs(60));
        let rate = SuccessRateEstimator::new();
        let stale = opp("stale", "ethereum", dec!(50), 0);
        let now = MonoTimestamp::from_nanos(Duration::from_secs(61).as_nanos() as u64);
        let result = aggregator.process(vec![stale], now, &rate);
        assert!(result.is_empty());
    }

    #[test]
    fn enriches_and_sorts_by_priority_then_profit() {
        let aggregator = Aggregator::new(profit_config(), Duration::from_secs(60));
        let rate = SuccessRateEstimator::new();
        let cheap = opp("cheap", "ethereum", dec!(15), 0);
        let rich = opp("rich", "ethereum", dec!(500), 0);
        let result = aggregator.process(vec![cheap, rich], MonoTimestamp::from_nanos(0), &rate);
        assert_eq!(result.len(), 2);
        assert!(result[0].priority >= result[1].priority);
        for o in &result {
            assert!(o.priority >= 1 && o.priority <= 10);
        }
    }

    #[test]
    fn dedup_keeps_higher_net_profit_same_fingerprint() {
        let aggregator = Aggregator::new(profit_config(), Duration::from_secs(60));
        let rate = SuccessRateEstimator::new();
        let low = opp("a", "ethereum", dec!(15), 0);
        let high = opp("b", "ethereum", dec!(50), 0);
        let result = aggregator.process(vec![low, high], MonoTimestamp::from_nanos(0), &rate);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id, OpportunityId::new("b"));
    }

    #[test]
    fn cross_chain_analyzer_detects_spread_above_threshold() {
        let cheap = opp("cheap-leg", "ethereum", dec!(15), 0);
        let mut pricey = opp("pricey-leg", "polygon", dec!(15), 0);
        pricey.expected_amount_out = pricey.amount_in * dec!(1.05);
        let found = analyze_cross_chain(&[cheap, pricey], MonoTimestamp::from_nanos(0));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].chain_a.as_str(), "ethereum");
        assert_eq!(found[0].chain_b.as_str(), "polygon");
    }

    #[test]
    fn cross_chain_analyzer_ignores_small_spread() {
        let a = opp("a", "ethereum", dec!(15), 0);
        let b = opp("b", "polygon", dec!(15), 0);
        let found = analyze_cross_chain(&[a, b], MonoTimestamp::from_nanos(0));
        assert!(found.is_empty());
    }
}
