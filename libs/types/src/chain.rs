//! Chain health, tracked by the Orchestrator (C11) and driving scenario 6
//! (chain degradation) in §8. Grounded in the original's `ChainStatus` enum.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainHealth {
    Active,
    Degraded,
    Error,
}

impl ChainHealth {
    pub fn is_active(self) -> bool {
        matches!(self, ChainHealth::Active)
    }
}
