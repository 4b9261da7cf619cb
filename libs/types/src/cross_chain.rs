//! `CrossChainOpportunity` — the background cross-chain analyzer's purely
//! informational output (§4.3). Never executed by the core.

use crate::ids::{ChainId, MonoTimestamp, TokenId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossChainOpportunity {
    pub token_pair: (TokenId, TokenId),
    pub chain_a: ChainId,
    pub chain_b: ChainId,
    pub price_a: Decimal,
    pub price_b: Decimal,
    pub spread_pct: Decimal,
    pub detected_at: MonoTimestamp,
}
