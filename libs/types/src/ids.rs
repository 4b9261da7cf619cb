//! Newtype identifiers used throughout the pipeline.
//!
//! Kept as thin `String` wrappers rather than bare `String` so a chain tag
//! can never be passed where a token id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(ChainId);
string_id!(VenueId);
string_id!(TokenId);
string_id!(OpportunityId);

/// Monotonic timestamp, nanoseconds since an arbitrary process-local epoch.
///
/// Never compared across processes or persisted; `detected_at` and friends
/// only ever mean "how long ago, relative to `Clock::now_ns()`".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MonoTimestamp(pub u64);

impl MonoTimestamp {
    pub fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    pub fn elapsed_since(&self, now: MonoTimestamp) -> std::time::Duration {
        std::time::Duration::from_nanos(now.0.saturating_sub(self.0))
    }
}
