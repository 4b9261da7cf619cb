//! Terminal states and the outcome record the Coordinator (C9) produces.

use crate::ids::{MonoTimestamp, OpportunityId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-opportunity lifecycle terminal states (§3 Lifecycle).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminalState {
    Success,
    Failed,
    Expired,
    Rejected,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub opportunity_id: OpportunityId,
    pub status: TerminalState,
    pub success: bool,
    pub realized_profit_usd: Decimal,
    pub realized_gas_cost_usd: Decimal,
    pub tx_refs: Vec<String>,
    pub elapsed: Duration,
    pub error: Option<String>,
    /// Monotonic time this result was recorded, used to order the history
    /// ring and to check the "monotone history" property (§8).
    pub recorded_at: MonoTimestamp,
}

impl ExecutionResult {
    pub fn success(
        opportunity_id: OpportunityId,
        realized_profit_usd: Decimal,
        realized_gas_cost_usd: Decimal,
        tx_refs: Vec<String>,
        elapsed: Duration,
        recorded_at: MonoTimestamp,
    ) -> Self {
        Self {
            opportunity_id,
            status: TerminalState::Success,
            success: true,
            realized_profit_usd,
            realized_gas_cost_usd,
            tx_refs,
            elapsed,
            error: None,
            recorded_at,
        }
    }

    pub fn failure(
        opportunity_id: OpportunityId,
        status: TerminalState,
        realized_gas_cost_usd: Decimal,
        elapsed: Duration,
        error: impl Into<String>,
        recorded_at: MonoTimestamp,
    ) -> Self {
        debug_assert!(status != TerminalState::Success);
        Self {
            opportunity_id,
            status,
            success: false,
            realized_profit_usd: Decimal::ZERO,
            realized_gas_cost_usd,
            tx_refs: Vec::new(),
            elapsed,
            error: Some(error.into()),
            recorded_at,
        }
    }
}
