use serde_json::Value;
use tracing::debug;

use super::payload::CanonicalPayload;

/// Advisory flag telling the page its results no longer match the inputs.
///
/// Only [`StalenessTracker::reset`] clears the flag; observations never trigger
/// a recomputation.
#[derive(Debug, Default)]
pub struct StalenessTracker {
    fingerprint: Option<Value>,
    results_stale: bool,
    in_flight: bool,
}

impl StalenessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the payload a new calculation was dispatched with.
    pub fn reset(&mut self, payload: &CanonicalPayload) {
        self.fingerprint = Some(payload.as_value());
        self.results_stale = false;
        self.in_flight = true;
    }

    /// Called once the dispatch that started with [`reset`](Self::reset) has settled.
    pub fn settle(&mut self) {
        self.in_flight = false;
    }

    /// Compare a freshly rebuilt payload against the fingerprint.
    pub fn observe(&mut self, payload: &CanonicalPayload) -> bool {
        if self.in_flight {
            return self.results_stale;
        }
        if let Some(fingerprint) = &self.fingerprint {
            if !self.results_stale && *fingerprint != payload.as_value() {
                debug!("inputs diverged from last calculation");
                self.results_stale = true;
            }
        }
        self.results_stale
    }

    pub fn results_stale(&self) -> bool {
        self.results_stale
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn fingerprint(&self) -> Option<&Value> {
        self.fingerprint.as_ref()
    }
}
