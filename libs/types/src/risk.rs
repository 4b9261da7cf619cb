//! Risk scoring vocabulary shared between the Aggregator (C6) and the Risk
//! Manager (C7).

use crate::ids::OpportunityId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Low <25, Medium <50, High <75, Critical >=75 (§4.4).
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=24 => RiskLevel::Low,
            25..=49 => RiskLevel::Medium,
            50..=74 => RiskLevel::High,
            _ => RiskLevel::Critical,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskFactor {
    Profit,
    Liquidity,
    Gas,
    Market,
    Technical,
    Execution,
}

impl RiskFactor {
    /// Weights from §4.3: profit 0.25, liquidity 0.20, gas 0.15, market
    /// 0.15, technical 0.15, execution 0.10.
    pub fn weight(self) -> Decimal {
        use rust_decimal_macros::dec;
        match self {
            RiskFactor::Profit => dec!(0.25),
            RiskFactor::Liquidity => dec!(0.20),
            RiskFactor::Gas => dec!(0.15),
            RiskFactor::Market => dec!(0.15),
            RiskFactor::Technical => dec!(0.15),
            RiskFactor::Execution => dec!(0.10),
        }
    }

    pub const ALL: [RiskFactor; 6] = [
        RiskFactor::Profit,
        RiskFactor::Liquidity,
        RiskFactor::Gas,
        RiskFactor::Market,
        RiskFactor::Technical,
        RiskFactor::Execution,
    ];
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub opportunity_id: OpportunityId,
    pub overall_risk: RiskLevel,
    pub risk_score: Decimal,
    pub risk_factors: BTreeMap<RiskFactor, Decimal>,
    pub recommendations: Vec<String>,
    pub max_position_size: Decimal,
    pub confidence_level: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_level_boundaries() {
        assert_eq!(RiskLevel::from_score(0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(24), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(25), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(49), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(50), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(74), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(75), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(100), RiskLevel::Critical);
    }

    #[test]
    fn weights_sum_to_one() {
        let sum: Decimal = RiskFactor::ALL.iter().map(|f| f.weight()).sum();
        assert_eq!(sum, rust_decimal_macros::dec!(1.00));
    }
}
