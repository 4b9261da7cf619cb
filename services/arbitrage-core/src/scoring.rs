//! Pure risk/priority/confidence scoring functions shared by the
//! Aggregator (C6, which enriches a raw opportunity) and the Risk Manager
//! (C7, which recomputes the same breakdown for a `RiskAssessment`).
//!
//! `RiskScore(opportunity)` must be pure (§8): same inputs, same score.
//! Keeping the formulas here as free functions over plain `Decimal`/field
//! inputs (rather than methods that might reach into mutable state) is what
//! makes that property easy to hold.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;
use types::{Opportunity, RiskFactor};

/// Each factor is normalized to 0-100, higher meaning riskier.
pub fn risk_factors(opp: &Opportunity, min_liquidity_usd: Decimal, max_price_impact: Decimal) -> BTreeMap<RiskFactor, Decimal> {
    let mut factors = BTreeMap::new();
    factors.insert(RiskFactor::Profit, profit_risk(opp));
    factors.insert(RiskFactor::Liquidity, liquidity_risk(opp, min_liquidity_usd));
    factors.insert(RiskFactor::Gas, gas_risk(opp));
    factors.insert(RiskFactor::Market, market_risk(opp, max_price_impact));
    factors.insert(RiskFactor::Technical, technical_risk(opp));
    factors.insert(RiskFactor::Execution, execution_risk(opp));
    factors
}

/// Weighted sum of the six factors (§4.3 weights), clamped to 0-100.
pub fn weighted_risk_score(factors: &BTreeMap<RiskFactor, Decimal>) -> u8 {
    let sum: Decimal = factors
        .iter()
        .map(|(factor, value)| value * factor.weight())
        .sum();
    clamp_u8(sum)
}

/// `priority = clip(1..10, round(profit_score * (1 - risk/100) * (confidence/100) * 10))`.
pub fn priority(opp: &Opportunity, risk_score: u8, confidence: u8) -> u8 {
    let profit_score = dec!(100) - profit_risk(opp);
    let risk_multiplier = (dec!(100) - Decimal::from(risk_score)) / dec!(100);
    let confidence_multiplier = Decimal::from(confidence) / dec!(100);
    let raw = (profit_score / dec!(100)) * risk_multiplier * confidence_multiplier * dec!(10);
    let rounded = raw.round().to_i64().unwrap_or(1);
    rounded.clamp(1, 10) as u8
}

/// `confidence = clip(0..100, 100 - Σfactor×0.1)`, then scaled by the
/// historical success rate for `(chain, kind)`.
pub fn confidence(factors: &BTreeMap<RiskFactor, Decimal>, success_rate: f64) -> u8 {
    let penalty: Decimal = factors.values().map(|v| v * dec!(0.1)).sum();
    let base = clamp_u8(dec!(100) - penalty);
    ((base as f64) * success_rate.clamp(0.0, 1.0)).round().clamp(0.0, 100.0) as u8
}

fn profit_risk(opp: &Opportunity) -> Decimal {
    if opp.gross_profit_usd <= Decimal::ZERO {
        return dec!(100);
    }
    let margin = (opp.net_profit_usd / opp.gross_profit_usd).clamp(Decimal::ZERO, Decimal::ONE);
    ((Decimal::ONE - margin) * dec!(100)).clamp(Decimal::ZERO, dec!(100))
}

fn liquidity_risk(opp: &Opportunity, min_liquidity_usd: Decimal) -> Decimal {
    if min_liquidity_usd <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let ratio = (opp.liquidity_usd / min_liquidity_usd).min(dec!(2));
    (dec!(100) - (ratio / dec!(2)) * dec!(100)).clamp(Decimal::ZERO, dec!(100))
}

fn gas_risk(opp: &Opportunity) -> Decimal {
    if opp.gross_profit_usd <= Decimal::ZERO {
        return dec!(100);
    }
    ((opp.gas_cost_usd / opp.gross_profit_usd) * dec!(100)).clamp(Decimal::ZERO, dec!(100))
}

fn market_risk(opp: &Opportunity, max_price_impact: Decimal) -> Decimal {
    if max_price_impact <= Decimal::ZERO {
        return dec!(100);
    }
    ((opp.price_impact / max_price_impact) * dec!(100)).clamp(Decimal::ZERO, dec!(100))
}

fn technical_risk(opp: &Opportunity) -> Decimal {
    let extra_hops = opp.path.len().saturating_sub(2) as i64;
    (Decimal::from(extra_hops) * dec!(25)).clamp(Decimal::ZERO, dec!(100))
}

fn execution_risk(opp: &Opportunity) -> Decimal {
    let base = if opp.loan.is_some() { dec!(60) } else { dec!(20) };
    let per_venue = Decimal::from(opp.venues.len() as i64) * dec!(5);
    (base + per_venue).clamp(Decimal::ZERO, dec!(100))
}

fn clamp_u8(value: Decimal) -> u8 {
    let clamped = value.clamp(Decimal::ZERO, dec!(100)).round();
    clamped.to_u8().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::{ChainId, MonoTimestamp, OpportunityId, OpportunityKind, TokenId, VenueId};

    fn sample() -> Opportunity {
        Opportunity::new(
            OpportunityId::new("o1"),
            OpportunityKind::CrossExchange,
            ChainId::new("ethereum"),
            MonoTimestamp::from_nanos(0),
            vec![TokenId::new("A"), TokenId::new("B")],
            vec![VenueId::new("v")],
            dec!(1000),
            dec!(1020),
            dec!(20),
            dec!(2),
            dec!(0.001),
            dec!(200000),
            None,
        )
        .unwrap()
    }

    #[test]
    fn weighted_score_is_deterministic() {
        let opp = sample();
        let factors = risk_factors(&opp, dec!(10000), dec!(0.02));
        let a = weighted_risk_score(&factors);
        let b = weighted_risk_score(&factors);
        assert_eq!(a, b);
    }

    #[test]
    fn priority_is_in_range() {
        let opp = sample();
        let factors = risk_factors(&opp, dec!(10000), dec!(0.02));
        let score = weighted_risk_score(&factors);
        let conf = confidence(&factors, 0.9);
        let p = priority(&opp, score, conf);
        assert!((1..=10).contains(&p));
    }

    #[test]
    fn confidence_is_bounded() {
        let opp = sample();
        let factors = risk_factors(&opp, dec!(10000), dec!(0.02));
        let c = confidence(&factors, 1.0);
        assert!(c <= 100);
    }

    #[test]
    fn zero_success_rate_zeroes_confidence() {
        let opp = sample();
        let factors = risk_factors(&opp, dec!(10000), dec!(0.02));
        assert_eq!(confidence(&factors, 0.0), 0);
    }
}
