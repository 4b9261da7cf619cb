//! # Risk Manager (C7)
//!
//! ## Purpose
//!
//! Gates opportunities against portfolio limits and blacklists, tracks
//! daily traded volume per chain, maintains an EWMA success-rate estimate
//! per `(chain, kind)`, and tracks per-chain health (supplementing the
//! original's `ChainStatus` registry, driving scenario 6 in §8).
//!
//! USD valuation is an injected [`PriceOracle`]; if it cannot price the
//! opportunity's input token, `Validate` fails closed with `RiskRejected`
//! rather than fabricate a value (§9 Open Question decision).

use crate::scoring;
use adapters::PriceOracle;
use chrono::NaiveDate;
use config::LimitsConfig;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use std::sync::Arc;
use types::{Blacklists, ChainHealth, ChainId, DailyCounters, ExecutionResult, Opportunity, OpportunityKind, RiskAssessment, RiskLevel};

fn kind_index(kind: OpportunityKind) -> u8 {
    match kind {
        OpportunityKind::CrossExchange => 0,
        OpportunityKind::Triangular => 1,
        OpportunityKind::FlashLoan => 2,
        OpportunityKind::Backrun => 3,
    }
}

/// EWMA success-rate estimator per `(chain, kind)`, α = 0.1 (§4.4).
pub struct SuccessRateEstimator {
    alpha: f64,
    rates: DashMap<(ChainId, u8), f64>,
}

impl SuccessRateEstimator {
    pub fn new() -> Self {
        Self {
            alpha: 0.1,
            rates: DashMap::new(),
        }
    }

    /// Neutral prior (0.5) for a `(chain, kind)` never observed before.
    pub fn get(&self, chain: &ChainId, kind: OpportunityKind) -> f64 {
        self.rates
            .get(&(chain.clone(), kind_index(kind)))
            .map(|r| *r)
            .unwrap_or(0.5)
    }

    pub fn update(&self, chain: &ChainId, kind: OpportunityKind, success: bool) {
        let outcome = if success { 1.0 } else { 0.0 };
        self.rates
            .entry((chain.clone(), kind_index(kind)))
            .and_modify(|rate| *rate = self.alpha * outcome + (1.0 - self.alpha) * *rate)
            .or_insert(self.alpha * outcome + (1.0 - self.alpha) * 0.5);
    }
}

impl Default for SuccessRateEstimator {
    fn default() -> Self {
        Self::new()
    }
}

pub enum RiskRejection {
    CriticalRisk,
    PriceUnavailable,
    SingleTradeLimit,
    DailyVolumeLimit,
    ConcurrencyLimit,
    Blacklisted,
    ChainDegraded,
}

impl RiskRejection {
    pub fn reason(&self) -> &'static str {
        match self {
            RiskRejection::CriticalRisk => "risk level is Critical",
            RiskRejection::PriceUnavailable => "price oracle could not value the input token",
            RiskRejection::SingleTradeLimit => "amount exceeds max_single_trade_usd",
            RiskRejection::DailyVolumeLimit => "amount would exceed max_daily_volume_usd for chain",
            RiskRejection::ConcurrencyLimit => "max_concurrent_trades reached",
            RiskRejection::Blacklisted => "path or venue is blacklisted",
            RiskRejection::ChainDegraded => "chain is Degraded or Error",
        }
    }
}

pub struct RiskManager {
    limits: LimitsConfig,
    min_liquidity_usd: Decimal,
    max_price_impact: Decimal,
    daily: Mutex<DailyCounters>,
    blacklists: RwLock<Blacklists>,
    pub success_rate: SuccessRateEstimator,
    chain_health: DashMap<ChainId, ChainHealth>,
    price_oracle: Arc<dyn PriceOracle>,
}

impl RiskManager {
    pub fn new(
        limits: LimitsConfig,
        min_liquidity_usd: Decimal,
        max_price_impact: Decimal,
        blacklists: Blacklists,
        price_oracle: Arc<dyn PriceOracle>,
    ) -> Self {
        Self {
            limits,
            min_liquidity_usd,
            max_price_impact,
            daily: Mutex::new(DailyCounters::new()),
            blacklists: RwLock::new(blacklists),
            success_rate: SuccessRateEstimator::new(),
            chain_health: DashMap::new(),
            price_oracle,
        }
    }

    pub fn chain_health(&self, chain: &ChainId) -> ChainHealth {
        self.chain_health
            .get(chain)
            .map(|h| *h)
            .unwrap_or(ChainHealth::Active)
    }

    pub fn set_chain_health(&self, chain: ChainId, health: ChainHealth) {
        self.chain_health.insert(chain, health);
    }

    /// `Validate(opportunity) -> (accept, assessment)` (§4.4). `today` and
    /// `current_active_trades` are supplied by the caller (the Coordinator
    /// owns the concurrency counter; the Risk Manager does not duplicate
    /// it).
    pub async fn validate(
        &self,
        opp: &Opportunity,
        today: NaiveDate,
        current_active_trades: usize,
    ) -> (bool, RiskAssessment) {
        let factors = scoring::risk_factors(opp, self.min_liquidity_usd, self.max_price_impact);
        let overall_risk = RiskLevel::from_score(opp.risk_score);
        let mut recommendations = Vec::new();

        let reject = |reason: RiskRejection, recommendations: &mut Vec<String>| {
            recommendations.push(reason.reason().to_string());
            reason
        };

        if self.chain_health(&opp.chain) != ChainHealth::Active {
            let r = reject(RiskRejection::ChainDegraded, &mut recommendations);
            return (false, self.assessment(opp, overall_risk, factors, recommendations, r, Decimal::ZERO));
        }

        if matches!(overall_risk, RiskLevel::Critical) {
            let r = reject(RiskRejection::CriticalRisk, &mut recommendations);
            return (false, self.assessment(opp, overall_risk, factors, recommendations, r, Decimal::ZERO));
        }

        if self.blacklists.read().contains_any(&opp.path, &opp.venues) {
            let r = reject(RiskRejection::Blacklisted, &mut recommendations);
            return (false, self.assessment(opp, overall_risk, factors, recommendations, r, Decimal::ZERO));
        }

        if current_active_trades >= self.limits.max_concurrent_trades {
            let r = reject(RiskRejection::ConcurrencyLimit, &mut recommendations);
            return (false, self.assessment(opp, overall_risk, factors, recommendations, r, Decimal::ZERO));
        }

        let Some(token_price) = self.price_oracle.usd_price(&opp.path[0]).await else {
            let r = reject(RiskRejection::PriceUnavailable, &mut recommendations);
            return (false, self.assessment(opp, overall_risk, factors, recommendations, r, Decimal::ZERO));
        };
        let amount_in_usd = token_price * opp.amount_in;

        if amount_in_usd > self.limits.max_single_trade_usd {
            let r = reject(RiskRejection::SingleTradeLimit, &mut recommendations);
            return (false, self.assessment(opp, overall_risk, factors, recommendations, r, amount_in_usd));
        }

        let max_daily = self
            .limits
            .max_daily_volume_usd
            .get(opp.chain.as_str())
            .copied();

        {
            let mut daily = self.daily.lock();
            let current = daily.volume_for(&opp.chain, today);
            if let Some(max_daily) = max_daily {
                if current + amount_in_usd > max_daily {
                    let r = reject(RiskRejection::DailyVolumeLimit, &mut recommendations);
                    return (false, self.assessment(opp, overall_risk, factors, recommendations, r, amount_in_usd));
                }
            }
            // Accept: reserve the volume atomically with the check above so
            // the "daily_volume + amount <= max" property holds immediately
            // after the transition to Executing.
            daily.add(&opp.chain, today, amount_in_usd);
        }

        recommendations.push("accepted".to_string());
        let assessment = RiskAssessment {
            opportunity_id: opp.id.clone(),
            overall_risk,
            risk_score: Decimal::from(opp.risk_score),
            risk_factors: factors,
            recommendations,
            max_position_size: self.limits.max_single_trade_usd,
            confidence_level: opp.confidence,
        };
        (true, assessment)
    }

    fn assessment(
        &self,
        opp: &Opportunity,
        overall_risk: RiskLevel,
        factors: std::collections::BTreeMap<types::RiskFactor, Decimal>,
        recommendations: Vec<String>,
        _rejection: RiskRejection,
        max_position_size: Decimal,
    ) -> RiskAssessment {
        RiskAssessment {
            opportunity_id: opp.id.clone(),
            overall_risk,
            risk_score: Decimal::from(opp.risk_score),
            risk_factors: factors,
            recommendations,
            max_position_size,
            confidence_level: opp.confidence,
        }
    }

    /// `Record(execution_result)`: updates the success-rate estimator. Daily
    /// volume is reserved at `Validate` time, not here, so a later failure
    /// does not un-reserve capital that was genuinely put at risk on-chain.
    pub fn record(&self, chain: &ChainId, kind: OpportunityKind, result: &ExecutionResult) {
        self.success_rate.update(chain, kind, result.success);
    }

    /// `Reset()`: scheduled at UTC midnight; clears daily counters only.
    pub fn reset_daily(&self) {
        self.daily.lock().reset();
    }

    pub fn daily_volume(&self, chain: &ChainId, date: NaiveDate) -> Decimal {
        self.daily.lock().volume_for(chain, date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adapters::testing::StaticOracle;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use types::{MonoTimestamp, OpportunityId, TokenId, VenueId};

    fn limits() -> LimitsConfig {
        LimitsConfig {
            max_single_trade_usd: dec!(5000),
            max_daily_volume_usd: {
                let mut m = HashMap::new();
                m.insert("ethereum".to_string(), dec!(1000));
                m
            },
            max_concurrent_trades: 2,
            max_gas_cost_pct_of_profit: dec!(0.5),
            min_liquidity_ratio: dec!(0.1),
        }
    }

    fn oracle() -> Arc<dyn PriceOracle> {
        let mut prices = HashMap::new();
        prices.insert("T0".to_string(), dec!(1));
        Arc::new(StaticOracle::new(prices))
    }

    fn opp(amount_in: Decimal) -> Opportunity {
        Opportunity::new(
            OpportunityId::new("o1"),
            OpportunityKind::CrossExchange,
            ChainId::new("ethereum"),
            MonoTimestamp::from_nanos(0),
            vec![TokenId::new("T0"), TokenId::new("T1")],
            vec![VenueId::new("v")],
            amount_in,
            dec!(1),
            dec!(20),
            dec!(2),
            dec!(0.001),
            dec!(200000),
            None,
        )
        .unwrap()
        .with_enrichment(10, 5, 90)
    }

    #[tokio::test]
    async fn accepts_within_limits() {
        let rm = RiskManager::new(limits(), dec!(10000), dec!(0.02), Blacklists::default(), oracle());
        let today = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let (accept, _assessment) = rm.validate(&opp(dec!(100)), today, 0).await;
        assert!(accept);
    }

    #[tokio::test]
    async fn rejects_daily_volume_breach() {
        let rm = RiskManager::new(limits(), dec!(10000), dec!(0.02), Blacklists::default(), oracle());
        let today = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let (accept1, _) = rm.validate(&opp(dec!(950)), today, 0).await;
        assert!(accept1);
        let (accept2, _) = rm.validate(&opp(dec!(100)), today, 0).await;
        assert!(!accept2);
        assert_eq!(rm.daily_volume(&ChainId::new("ethereum"), today), dec!(950));
        let (accept3, _) = rm.validate(&opp(dec!(40)), today, 0).await;
        assert!(accept3);
    }

    #[tokio::test]
    async fn rejects_when_concurrency_exhausted() {
        let rm = RiskManager::new(limits(), dec!(10000), dec!(0.02), Blacklists::default(), oracle());
        let today = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let (accept, _) = rm.validate(&opp(dec!(10)), today, 2).await;
        assert!(!accept);
    }

    #[tokio::test]
    async fn rejects_when_chain_degraded() {
        let rm = RiskManager::new(limits(), dec!(10000), dec!(0.02), Blacklists::default(), oracle());
        rm.set_chain_health(ChainId::new("ethereum"), ChainHealth::Degraded);
        let today = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let (accept, _) = rm.validate(&opp(dec!(10)), today, 0).await;
        assert!(!accept);
    }

    #[test]
    fn success_rate_converges_toward_observed_outcomes() {
        let estimator = SuccessRateEstimator::new();
        let chain = ChainId::new("ethereum");
        for _ in 0..50 {
            estimator.update(&chain, OpportunityKind::CrossExchange, true);
        }
        assert!(estimator.get(&chain, OpportunityKind::CrossExchange) > 0.9);
    }
}
