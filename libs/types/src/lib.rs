//! # Domain model for the multi-chain arbitrage pipeline
//!
//! ## Purpose
//!
//! One canonical schema shared by every producer and consumer in the
//! pipeline: scanners (C5) construct `Opportunity`, the aggregator (C6)
//! enriches it, the queue (C8) moves it by value, the coordinator (C9)
//! drives it to a `TerminalState`, and metrics (C10) records the resulting
//! `ExecutionResult`. No component reaches for ad-hoc dicts or attaches
//! attributes dynamically; every field is predeclared here.
//!
//! ## Integration Points
//!
//! - `services/arbitrage-core` depends on every type in this crate.
//! - `libs/adapters` borrows `ids`, `quote`, and `execution` for the
//!   `ChainAdapter` / `VenueAdapter` / `PriceOracle` trait signatures.

pub mod chain;
pub mod cross_chain;
pub mod execution;
pub mod ids;
pub mod limits;
pub mod opportunity;
pub mod plan;
pub mod quote;
pub mod risk;

pub use chain::ChainHealth;
pub use cross_chain::CrossChainOpportunity;
pub use execution::{ExecutionResult, TerminalState};
pub use ids::{ChainId, MonoTimestamp, OpportunityId, TokenId, VenueId};
pub use limits::{Blacklists, DailyCounters, PortfolioLimits};
pub use opportunity::{LoanInfo, Opportunity, OpportunityError, OpportunityKind};
pub use plan::{ExecutionMode, ExecutionPlan, PlanStep};
pub use quote::PriceQuote;
pub use risk::{RiskAssessment, RiskFactor, RiskLevel};
