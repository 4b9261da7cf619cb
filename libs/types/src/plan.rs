//! `ExecutionPlan` — named but left unspecified by §4.6 step 5; shape is
//! grounded in the original `execution_coordinator.py`'s `ExecutionPlan`
//! dataclass.

use crate::ids::OpportunityId;
use crate::opportunity::OpportunityKind;
use crate::risk::RiskLevel;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// §4.6 step 4: one of {DirectStrategy, ContractExecutor, FlashLoanProvider}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionMode {
    DirectStrategy,
    ContractExecutor,
    FlashLoanProvider,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub name: String,
    pub deadline: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub opportunity_id: OpportunityId,
    pub kind: OpportunityKind,
    pub mode: ExecutionMode,
    pub steps: Vec<PlanStep>,
    pub estimated_gas: u64,
    pub risk_level: RiskLevel,
}
