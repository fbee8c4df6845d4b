//! Transport-derived concurrency defaults
//!
//! The platform client negotiates either a legacy serial transport or a
//! multiplexed one, and bulk API fan-out is throttled accordingly: legacy
//! connections suffer head-of-line blocking and get a low ceiling, multiplexed
//! connections a high one. The signal is injected into the executor as a
//! capability rather than read from a global.

use serde::{Deserialize, Serialize};

/// Batch concurrency over legacy (serial, head-of-line-blocking) transports.
pub const LEGACY_BATCH_CONCURRENCY: usize = 5;

/// Batch concurrency over multiplexed transports.
pub const MULTIPLEXED_BATCH_CONCURRENCY: usize = 30;

/// Negotiated transport characteristics observed by the API client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportProfile {
    /// One request per connection at a time
    Legacy,
    /// Many concurrent streams per connection
    Multiplexed,
}

/// Source of the default batch concurrency when the caller does not pick one.
///
/// Implementations must be deterministic: the same observed state yields the
/// same ceiling on every call.
pub trait ConcurrencySource: Send + Sync {
    /// Effective concurrency ceiling for bulk API calls.
    fn batch_concurrency(&self) -> usize;
}

/// [`ConcurrencySource`] derived from the negotiated transport profile.
#[derive(Debug, Clone, Copy)]
pub struct TransportConcurrency {
    profile: TransportProfile,
}

impl TransportConcurrency {
    /// Create a concurrency source for the given transport profile.
    pub fn new(profile: TransportProfile) -> Self {
        Self { profile }
    }
}

impl ConcurrencySource for TransportConcurrency {
    fn batch_concurrency(&self) -> usize {
        match self.profile {
            TransportProfile::Legacy => LEGACY_BATCH_CONCURRENCY,
            TransportProfile::Multiplexed => MULTIPLEXED_BATCH_CONCURRENCY,
        }
    }
}
