//! Adapter-facing error taxonomy, the `Transient` / `QuoteUnavailable` /
//! `Timeout` / `Fatal` variants named in §7 that the chain and venue
//! collaborators can raise.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdapterError {
    #[error("transient error from {source}: {detail}")]
    Transient { source: String, detail: String },
    #[error("quote unavailable for {pair} on {venue}")]
    QuoteUnavailable { venue: String, pair: String },
    #[error("deadline exceeded at stage {stage}")]
    Timeout { stage: String },
    #[error("fatal adapter failure: {cause}")]
    Fatal { cause: String },
}
