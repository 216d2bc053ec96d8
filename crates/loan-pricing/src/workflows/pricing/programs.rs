use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::dispatch::GatewayError;
use super::form::LoanType;

/// Lightweight program handle returned by discovery before any pricing exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramDescriptor {
    #[serde(default, rename = "id", skip_serializing_if = "Option::is_none")]
    pub internal_id: Option<String>,
    #[serde(rename = "name")]
    pub external_name: String,
}

impl ProgramDescriptor {
    pub fn new(internal_id: impl Into<String>, external_name: impl Into<String>) -> Self {
        Self {
            internal_id: Some(internal_id.into()),
            external_name: external_name.into(),
        }
    }

    /// Internal identifier, falling back to the display name.
    pub fn identity(&self) -> &str {
        match self.internal_id.as_deref() {
            Some(id) if !id.is_empty() => id,
            _ => &self.external_name,
        }
    }

    pub fn matches_id(&self, candidate: &str) -> bool {
        self.internal_id.as_deref() == Some(candidate) || self.external_name == candidate
    }

    pub fn matches_name(&self, candidate: &str) -> bool {
        self.external_name == candidate
    }
}

/// External catalog listing the programs applicable to a loan type, in display order.
#[async_trait]
pub trait ProgramCatalog: Send + Sync {
    async fn programs(&self, loan_type: LoanType) -> Result<Vec<ProgramDescriptor>, GatewayError>;
}

/// Ask the catalog for programs, degrading to an empty list on any failure.
pub async fn discover_programs(
    catalog: &dyn ProgramCatalog,
    loan_type: LoanType,
) -> Vec<ProgramDescriptor> {
    match catalog.programs(loan_type).await {
        Ok(programs) => {
            debug!(
                loan_type = loan_type.label(),
                count = programs.len(),
                "program discovery complete"
            );
            programs
        }
        Err(err) => {
            warn!(
                loan_type = loan_type.label(),
                error = %err,
                "program discovery failed; continuing with no programs"
            );
            Vec::new()
        }
    }
}
