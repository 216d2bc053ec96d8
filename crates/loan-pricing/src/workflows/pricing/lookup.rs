use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::task::AbortHandle;
use tracing::debug;

use super::form::PropertyAddress;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressSuggestion {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    #[serde(default)]
    pub county: String,
}

impl AddressSuggestion {
    /// Copy the suggestion into the form, keeping the unit the user typed.
    pub fn apply_to(&self, address: &mut PropertyAddress) {
        address.street = self.street.clone();
        address.city = self.city.clone();
        address.state = self.state.clone();
        address.zip = self.zip.clone();
        address.county = self.county.clone();
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum LookupError {
    #[error("address lookup failed: {0}")]
    Resolver(String),
    #[error("address lookup task failed: {0}")]
    Task(String),
}

/// Address autocomplete backend.
#[async_trait]
pub trait AddressResolver: Send + Sync {
    async fn resolve(&self, query: &str) -> Result<Vec<AddressSuggestion>, LookupError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    Resolved(Vec<AddressSuggestion>),
    /// A newer lookup started before this one finished.
    Superseded,
}

/// Runs at most one lookup at a time; starting a lookup aborts the previous one.
pub struct AddressLookup {
    resolver: Arc<dyn AddressResolver>,
    in_flight: Mutex<Option<AbortHandle>>,
}

impl AddressLookup {
    pub fn new(resolver: Arc<dyn AddressResolver>) -> Self {
        Self {
            resolver,
            in_flight: Mutex::new(None),
        }
    }

    pub async fn lookup(&self, query: impl Into<String>) -> Result<LookupOutcome, LookupError> {
        let query = query.into();
        let resolver = Arc::clone(&self.resolver);
        let task = tokio::spawn(async move { resolver.resolve(&query).await });

        let previous = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .replace(task.abort_handle());
        if let Some(previous) = previous {
            debug!("aborting superseded address lookup");
            previous.abort();
        }

        match task.await {
            Ok(result) => result.map(LookupOutcome::Resolved),
            Err(err) if err.is_cancelled() => Ok(LookupOutcome::Superseded),
            Err(err) => Err(LookupError::Task(err.to_string())),
        }
    }
}
