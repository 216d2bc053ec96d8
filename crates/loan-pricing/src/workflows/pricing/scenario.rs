use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::payload::CanonicalPayload;
use super::selection::SelectedRow;

/// Identifier wrapper for persisted scenarios.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScenarioId(pub String);

impl fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Selection as persisted: the row plus the identity its program resolved to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSelection {
    #[serde(flatten)]
    pub row: SelectedRow,
    pub program_identity: String,
}

impl StoredSelection {
    pub fn from_selected(row: SelectedRow) -> Self {
        let program_identity = row
            .program_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| row.program_name.clone());
        Self {
            row,
            program_identity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveScenarioRequest {
    pub name: String,
    pub payload: CanonicalPayload,
    #[serde(default)]
    pub selection: Option<StoredSelection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedScenario {
    pub scenario_id: ScenarioId,
    #[serde(default)]
    pub selection_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadedScenario {
    pub payload: CanonicalPayload,
    #[serde(default)]
    pub selection: Option<StoredSelection>,
}

/// Persistence failures. The only tier shown to the user.
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("scenario {0} not found")]
    NotFound(ScenarioId),
    #[error("scenario storage unavailable: {0}")]
    Unavailable(String),
    #[error("scenario rejected: {0}")]
    Rejected(String),
    #[error("no pricing inputs to save")]
    NothingToSave,
}

/// Storage abstraction for saved pricing scenarios.
#[async_trait]
pub trait ScenarioStore: Send + Sync {
    async fn save(&self, request: SaveScenarioRequest) -> Result<SavedScenario, ScenarioError>;
    async fn load(&self, id: &ScenarioId) -> Result<LoadedScenario, ScenarioError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::pricing::results::{AmortizingRow, RowValues};
    use serde_json::json;

    fn row(program_id: Option<&str>) -> SelectedRow {
        SelectedRow {
            program_idx: 1,
            row_idx: 2,
            program_name: "DSCR Select".to_string(),
            program_id: program_id.map(str::to_string),
            values: RowValues::Amortizing(AmortizingRow {
                loan_price: Some(100.5),
                dscr: Some(1.2),
                ..AmortizingRow::default()
            }),
        }
    }

    #[test]
    fn stored_selection_flattens_the_row() {
        let stored = StoredSelection::from_selected(row(Some("d-1")));
        let value = serde_json::to_value(&stored).expect("serializes");
        assert_eq!(
            value,
            json!({
                "program_idx": 1,
                "row_idx": 2,
                "program_name": "DSCR Select",
                "program_id": "d-1",
                "values": { "loan_price": 100.5, "dscr": 1.2 },
                "program_identity": "d-1",
            })
        );
        let back: StoredSelection = serde_json::from_value(value).expect("deserializes");
        assert_eq!(back, stored);
    }

    #[test]
    fn identity_falls_back_to_program_name() {
        let stored = StoredSelection::from_selected(row(None));
        assert_eq!(stored.program_identity, "DSCR Select");
    }
}
