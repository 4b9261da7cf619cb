//! The canonical `Opportunity` record.
//!
//! One schema for every strategy kind, per `opportunity_id` vs `id` and
//! `type` vs `kind` inconsistencies in the source this pipeline replaces.
//! Fields are predeclared; enrichment (risk/priority/confidence) returns a
//! new value rather than attaching attributes in place.

use crate::ids::{ChainId, MonoTimestamp, OpportunityId, TokenId, VenueId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpportunityKind {
    CrossExchange,
    Triangular,
    FlashLoan,
    Backrun,
}

impl OpportunityKind {
    /// Minimum `path` length implied by the strategy kind.
    pub fn min_path_len(self) -> usize {
        match self {
            OpportunityKind::CrossExchange => 2,
            OpportunityKind::Triangular => 3,
            OpportunityKind::FlashLoan => 2,
            OpportunityKind::Backrun => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanInfo {
    pub provider_id: String,
    pub amount: Decimal,
    pub fee: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: OpportunityId,
    pub kind: OpportunityKind,
    pub chain: ChainId,
    pub detected_at: MonoTimestamp,
    pub path: Vec<TokenId>,
    pub venues: Vec<VenueId>,
    pub amount_in: Decimal,
    pub expected_amount_out: Decimal,
    pub gross_profit_usd: Decimal,
    pub gas_cost_usd: Decimal,
    pub net_profit_usd: Decimal,
    pub price_impact: Decimal,
    pub liquidity_usd: Decimal,
    /// 0-100, higher is riskier. Zero until the aggregator enriches it.
    pub risk_score: u8,
    /// 1-10, higher dequeues first. Zero until enriched.
    pub priority: u8,
    /// 0-100. Zero until enriched.
    pub confidence: u8,
    pub loan: Option<LoanInfo>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum OpportunityError {
    #[error("path length {actual} is too short for {kind:?} (needs >= {min})")]
    PathTooShort {
        kind: OpportunityKind,
        actual: usize,
        min: usize,
    },
    #[error("venues length {venues} must equal path length {path} minus one")]
    VenuesPathMismatch { venues: usize, path: usize },
    #[error("amount_in must be non-negative, got {0}")]
    NegativeAmountIn(Decimal),
}

impl std::fmt::Debug for OpportunityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OpportunityKind::CrossExchange => "CrossExchange",
            OpportunityKind::Triangular => "Triangular",
            OpportunityKind::FlashLoan => "FlashLoan",
            OpportunityKind::Backrun => "Backrun",
        };
        write!(f, "{s}")
    }
}

impl Opportunity {
    /// Construct a freshly-detected opportunity, validating the §3 shape
    /// invariants (`len(venues) == len(path) - 1`, non-negative amount_in,
    /// a path long enough for the declared kind).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: OpportunityId,
        kind: OpportunityKind,
        chain: ChainId,
        detected_at: MonoTimestamp,
        path: Vec<TokenId>,
        venues: Vec<VenueId>,
        amount_in: Decimal,
        expected_amount_out: Decimal,
        gross_profit_usd: Decimal,
        gas_cost_usd: Decimal,
        price_impact: Decimal,
        liquidity_usd: Decimal,
        loan: Option<LoanInfo>,
    ) -> Result<Self, OpportunityError> {
        if path.len() < kind.min_path_len() {
            return Err(OpportunityError::PathTooShort {
                kind,
                actual: path.len(),
                min: kind.min_path_len(),
            });
        }
        if venues.len() + 1 != path.len() {
            return Err(OpportunityError::VenuesPathMismatch {
                venues: venues.len(),
                path: path.len(),
            });
        }
        if amount_in < Decimal::ZERO {
            return Err(OpportunityError::NegativeAmountIn(amount_in));
        }

        let loan_fee = loan.as_ref().map(|l| l.fee).unwrap_or(Decimal::ZERO);
        let net_profit_usd = gross_profit_usd - gas_cost_usd - loan_fee;

        Ok(Self {
            id,
            kind,
            chain,
            detected_at,
            path,
            venues,
            amount_in,
            expected_amount_out,
            gross_profit_usd,
            gas_cost_usd,
            net_profit_usd,
            price_impact,
            liquidity_usd,
            risk_score: 0,
            priority: 0,
            confidence: 0,
            loan,
        })
    }

    /// The `(chain, kind, path, venues)` dedup fingerprint from §4.3.
    pub fn fingerprint(&self) -> String {
        format!(
            "{}|{:?}|{}|{}",
            self.chain,
            self.kind,
            self.path
                .iter()
                .map(|t| t.as_str())
                .collect::<Vec<_>>()
                .join(">"),
            self.venues
                .iter()
                .map(|v| v.as_str())
                .collect::<Vec<_>>()
                .join(">"),
        )
    }

    /// Returns a copy with enrichment fields replaced; never mutates in
    /// place, matching the "single well-typed record, no dynamic attribute
    /// attachment" rule.
    pub fn with_enrichment(&self, risk_score: u8, priority: u8, confidence: u8) -> Self {
        Self {
            risk_score,
            priority,
            confidence,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample(kind: OpportunityKind, path_len: usize) -> Result<Opportunity, OpportunityError> {
        let path = (0..path_len)
            .map(|i| TokenId::new(format!("T{i}")))
            .collect::<Vec<_>>();
        let venues = (0..path_len.saturating_sub(1))
            .map(|i| VenueId::new(format!("V{i}")))
            .collect::<Vec<_>>();
        Opportunity::new(
            OpportunityId::new("opp-1"),
            kind,
            ChainId::new("ethereum"),
            MonoTimestamp::from_nanos(1),
            path,
            venues,
            dec!(100),
            dec!(101),
            dec!(20),
            dec!(2),
            dec!(0.01),
            dec!(100_000),
            None,
        )
    }

    #[test]
    fn net_profit_is_gross_minus_gas_minus_loan_fee() {
        let opp = sample(OpportunityKind::CrossExchange, 2).unwrap();
        assert_eq!(opp.net_profit_usd, dec!(18));
    }

    #[test]
    fn rejects_path_too_short_for_triangular() {
        let err = sample(OpportunityKind::Triangular, 2).unwrap_err();
        assert!(matches!(err, OpportunityError::PathTooShort { .. }));
    }

    #[test]
    fn rejects_venue_path_mismatch() {
        let err = Opportunity::new(
            OpportunityId::new("opp-2"),
            OpportunityKind::CrossExchange,
            ChainId::new("ethereum"),
            MonoTimestamp::from_nanos(1),
            vec![TokenId::new("A"), TokenId::new("B")],
            vec![VenueId::new("V0"), VenueId::new("V1")],
            dec!(1),
            dec!(1),
            dec!(1),
            dec!(0),
            dec!(0),
            dec!(0),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, OpportunityError::VenuesPathMismatch { .. }));
    }

    #[test]
    fn with_enrichment_does_not_mutate_original() {
        let opp = sample(OpportunityKind::CrossExchange, 2).unwrap();
        let enriched = opp.with_enrichment(10, 5, 90);
        assert_eq!(opp.risk_score, 0);
        assert_eq!(enriched.risk_score, 10);
        assert_eq!(enriched.priority, 5);
        assert_eq!(enriched.confidence, 90);
    }
}
