//! Orchestration layer for one pricing page.
//!
//! A session is the only writer of the result board and the selected row. It
//! sequences discovery, slot allocation and dispatch for each calculation
//! cycle, and carries a pending restore target across a scenario re-price.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::NaiveDate;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use super::dispatch::{DispatchReport, Dispatcher, PricingGateway};
use super::form::{LoanType, PricingForm};
use super::payload::{build_payload, CanonicalPayload};
use super::programs::{discover_programs, ProgramCatalog};
use super::scenario::{
    LoadedScenario, SaveScenarioRequest, SavedScenario, ScenarioError, ScenarioId, ScenarioStore,
    StoredSelection,
};
use super::selection::{remap, select_row, MainSummary, SelectedRow, SelectionError};
use super::slots::{BoardSnapshot, CycleToken, ResultBoard, ResultSlot};
use super::staleness::StalenessTracker;

/// Remote collaborators a session talks to.
#[derive(Clone)]
pub struct PricingCollaborators {
    pub catalog: Arc<dyn ProgramCatalog>,
    pub gateway: Arc<dyn PricingGateway>,
    pub scenarios: Arc<dyn ScenarioStore>,
}

/// Summary of one calculation cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CalculationOutcome {
    pub generation: u64,
    pub programs: usize,
    pub report: DispatchReport,
    /// A newer calculation started before this one settled.
    pub superseded: bool,
}

/// Everything a renderer needs for one frame.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub generation: u64,
    pub slots: Vec<ResultSlot>,
    pub dispatching: bool,
    pub results_stale: bool,
    pub selected: Option<SelectedRow>,
    pub main: Option<MainSummary>,
}

#[derive(Debug, Default)]
struct SessionState {
    cycle: Option<CycleToken>,
    selected: Option<SelectedRow>,
    restore_target: Option<SelectedRow>,
    staleness: StalenessTracker,
    inputs: Option<CanonicalPayload>,
}

pub struct PricingSession {
    catalog: Arc<dyn ProgramCatalog>,
    scenarios: Arc<dyn ScenarioStore>,
    dispatcher: Dispatcher,
    board: ResultBoard,
    reference_date: NaiveDate,
    state: Mutex<SessionState>,
}

impl PricingSession {
    /// `reference_date` anchors default dates for the lifetime of the session.
    pub fn new(collaborators: PricingCollaborators, reference_date: NaiveDate) -> Self {
        let PricingCollaborators {
            catalog,
            gateway,
            scenarios,
        } = collaborators;

        Self {
            catalog,
            scenarios,
            dispatcher: Dispatcher::new(gateway),
            board: ResultBoard::new(),
            reference_date,
            state: Mutex::new(SessionState::default()),
        }
    }

    // The guard is never held across an await.
    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn reference_date(&self) -> NaiveDate {
        self.reference_date
    }

    pub fn build_payload(&self, form: &PricingForm) -> CanonicalPayload {
        build_payload(form, self.reference_date)
    }

    /// Start a fresh calculation for the current form.
    pub async fn calculate(&self, form: &PricingForm) -> CalculationOutcome {
        let payload = self.build_payload(form);
        self.run_cycle(Some(form.loan_type), payload, None).await
    }

    /// Start a fresh calculation for an already built payload.
    pub async fn calculate_payload(&self, payload: CanonicalPayload) -> CalculationOutcome {
        let loan_type = payload.loan_type().and_then(LoanType::from_label);
        self.run_cycle(loan_type, payload, None).await
    }

    async fn run_cycle(
        &self,
        loan_type: Option<LoanType>,
        payload: CanonicalPayload,
        restore_target: Option<SelectedRow>,
    ) -> CalculationOutcome {
        let token = {
            let mut state = self.state();
            let token = self.board.begin();
            state.cycle = Some(token);
            state.selected = None;
            state.restore_target = restore_target;
            state.staleness.reset(&payload);
            state.inputs = Some(payload.clone());
            token
        };

        let programs = match loan_type {
            Some(loan_type) => discover_programs(self.catalog.as_ref(), loan_type).await,
            None => {
                warn!("payload carries no recognised loan type; skipping discovery");
                Vec::new()
            }
        };

        let report = match self.board.allocate(token, &programs) {
            Ok(()) => {
                self.dispatcher
                    .dispatch(&self.board, token, &programs, &payload)
                    .await
            }
            Err(_) => DispatchReport {
                requested: programs.len(),
                rejected: programs.len(),
                ..DispatchReport::default()
            },
        };

        let superseded = {
            let mut state = self.state();
            if state.cycle == Some(token) {
                state.staleness.settle();
                refresh_staleness(&mut state);
                if let Some(target) = state.restore_target.take() {
                    let snapshot = self.board.snapshot();
                    state.selected = Some(remap(&target, &snapshot.slots));
                }
                false
            } else {
                true
            }
        };

        if superseded {
            info!(generation = token.generation(), "calculation superseded");
        }

        CalculationOutcome {
            generation: token.generation(),
            programs: programs.len(),
            report,
            superseded,
        }
    }

    /// Record an edit and re-check staleness. Returns the stale flag.
    pub fn form_changed(&self, form: &PricingForm) -> bool {
        let payload = self.build_payload(form);
        let mut state = self.state();
        let stale = state.staleness.observe(&payload);
        state.inputs = Some(payload);
        stale
    }

    /// Mark a row as the scenario's main result.
    pub fn select(&self, program_idx: usize, row_idx: usize) -> Result<SelectedRow, SelectionError> {
        let snapshot = self.board.snapshot();
        self.commit_selection(&snapshot, program_idx, row_idx)
    }

    /// A selection read from `snapshot` only lands if no newer cycle has
    /// begun since the snapshot was taken.
    fn commit_selection(
        &self,
        snapshot: &BoardSnapshot,
        program_idx: usize,
        row_idx: usize,
    ) -> Result<SelectedRow, SelectionError> {
        let selected = select_row(&snapshot.slots, program_idx, row_idx)?;
        let mut state = self.state();
        let current = state.cycle.map_or(0, CycleToken::generation);
        if current != snapshot.generation {
            return Err(SelectionError::Superseded(snapshot.generation));
        }
        state.restore_target = None;
        state.selected = Some(selected.clone());
        Ok(selected)
    }

    pub fn selected(&self) -> Option<SelectedRow> {
        self.state().selected.clone()
    }

    pub fn main_summary(&self) -> Option<MainSummary> {
        self.state().selected.as_ref().map(MainSummary::from_selection)
    }

    pub fn results_stale(&self) -> bool {
        refresh_staleness(&mut self.state())
    }

    pub fn is_dispatching(&self) -> bool {
        self.dispatcher.is_dispatching()
    }

    pub fn board(&self) -> BoardSnapshot {
        self.board.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<BoardSnapshot> {
        self.board.subscribe()
    }

    pub fn view(&self) -> SessionView {
        let snapshot = self.board.snapshot();
        let mut state = self.state();
        let results_stale = refresh_staleness(&mut state);
        SessionView {
            generation: snapshot.generation,
            slots: snapshot.slots.to_vec(),
            dispatching: self.dispatcher.is_dispatching(),
            results_stale,
            selected: state.selected.clone(),
            main: state.selected.as_ref().map(MainSummary::from_selection),
        }
    }

    /// Persist the latest inputs together with the current selection.
    pub async fn save_scenario(
        &self,
        name: impl Into<String>,
        owner_id: Option<String>,
    ) -> Result<SavedScenario, ScenarioError> {
        let (payload, selected) = {
            let state = self.state();
            (state.inputs.clone(), state.selected.clone())
        };
        let payload = payload.ok_or(ScenarioError::NothingToSave)?;

        let request = SaveScenarioRequest {
            name: name.into(),
            payload,
            selection: selected.map(StoredSelection::from_selected),
            owner_id,
        };

        let saved = self.scenarios.save(request).await.map_err(|err| {
            warn!(error = %err, "scenario save failed");
            err
        })?;
        info!(scenario = %saved.scenario_id, "scenario saved");
        Ok(saved)
    }

    /// Load a scenario and remap its selection onto whatever results are on
    /// the board right now.
    pub async fn load_scenario(&self, id: &ScenarioId) -> Result<LoadedScenario, ScenarioError> {
        let loaded = self.fetch_scenario(id).await?;
        let snapshot = self.board.snapshot();
        let mut state = self.state();
        state.inputs = Some(loaded.payload.clone());
        refresh_staleness(&mut state);
        if let Some(stored) = &loaded.selection {
            state.restore_target = None;
            state.selected = Some(remap(&stored.row, &snapshot.slots));
        }
        Ok(loaded)
    }

    /// Load a scenario, price its stored inputs again, and remap its selection
    /// onto the new results once that cycle settles.
    pub async fn restore_scenario(
        &self,
        id: &ScenarioId,
    ) -> Result<(LoadedScenario, CalculationOutcome), ScenarioError> {
        let loaded = self.fetch_scenario(id).await?;
        let loan_type = loaded.payload.loan_type().and_then(LoanType::from_label);
        let target = loaded.selection.as_ref().map(|stored| stored.row.clone());
        let outcome = self
            .run_cycle(loan_type, loaded.payload.clone(), target)
            .await;
        info!(scenario = %id, generation = outcome.generation, "scenario restored");
        Ok((loaded, outcome))
    }

    async fn fetch_scenario(&self, id: &ScenarioId) -> Result<LoadedScenario, ScenarioError> {
        self.scenarios.load(id).await.map_err(|err| {
            warn!(scenario = %id, error = %err, "scenario load failed");
            err
        })
    }
}

/// Compare the latest inputs against the fingerprint of the results on the
/// board. Edits observed while a calculation was in flight are caught here.
fn refresh_staleness(state: &mut SessionState) -> bool {
    let SessionState {
        staleness, inputs, ..
    } = state;
    match inputs {
        Some(inputs) => staleness.observe(inputs),
        None => staleness.results_stale(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::pricing::dispatch::GatewayError;
    use crate::workflows::pricing::form::TransactionType;
    use crate::workflows::pricing::programs::ProgramDescriptor;
    use crate::workflows::pricing::results::ProgramResponse;
    use async_trait::async_trait;
    use serde_json::Value;

    struct FixedCatalog;

    #[async_trait]
    impl ProgramCatalog for FixedCatalog {
        async fn programs(
            &self,
            _loan_type: LoanType,
        ) -> Result<Vec<ProgramDescriptor>, GatewayError> {
            Ok(vec![
                ProgramDescriptor::new("a", "Alpha"),
                ProgramDescriptor::new("b", "Beta"),
            ])
        }
    }

    struct FlatGateway;

    #[async_trait]
    impl PricingGateway for FlatGateway {
        async fn price(
            &self,
            _program: &ProgramDescriptor,
            _payload: &Value,
        ) -> Result<ProgramResponse, GatewayError> {
            Ok(ProgramResponse {
                pass: true,
                loan_price: vec![99.5, 100.0, 100.5],
                interest_rate: vec![7.5, 7.25, 7.0],
                pitia: Some(vec![2300.0, 2250.0, 2200.0]),
                dscr: Some(vec![1.1, 1.15, 1.2]),
                ..ProgramResponse::default()
            })
        }
    }

    struct NoStore;

    #[async_trait]
    impl ScenarioStore for NoStore {
        async fn save(&self, _request: SaveScenarioRequest) -> Result<SavedScenario, ScenarioError> {
            Err(ScenarioError::Unavailable("offline".to_string()))
        }

        async fn load(&self, id: &ScenarioId) -> Result<LoadedScenario, ScenarioError> {
            Err(ScenarioError::NotFound(id.clone()))
        }
    }

    fn session() -> PricingSession {
        PricingSession::new(
            PricingCollaborators {
                catalog: Arc::new(FixedCatalog),
                gateway: Arc::new(FlatGateway),
                scenarios: Arc::new(NoStore),
            },
            NaiveDate::from_ymd_opt(2025, 3, 1).expect("valid date"),
        )
    }

    #[tokio::test]
    async fn calculation_fills_every_slot_and_clears_selection() {
        let session = session();
        let form = PricingForm::new(LoanType::Dscr, TransactionType::Purchase);

        let outcome = session.calculate(&form).await;
        assert_eq!(outcome.programs, 2);
        assert_eq!(outcome.report.filled, 2);
        assert!(!outcome.superseded);

        session.select(1, 2).expect("row exists");
        assert!(session.selected().is_some());

        session.calculate(&form).await;
        assert!(session.selected().is_none());
        assert!(session.board().is_complete());
        assert!(!session.is_dispatching());
    }

    #[tokio::test]
    async fn edits_after_settling_mark_results_stale() {
        let session = session();
        let mut form = PricingForm::new(LoanType::Dscr, TransactionType::Purchase);
        session.calculate(&form).await;
        assert!(!session.form_changed(&form));

        form.borrower.fico = "740".to_string();
        assert!(session.form_changed(&form));
        assert!(session.view().results_stale);

        session.calculate(&form).await;
        assert!(!session.results_stale());
    }

    #[tokio::test]
    async fn selection_from_a_replaced_board_is_refused() {
        let session = session();
        let form = PricingForm::new(LoanType::Dscr, TransactionType::Purchase);
        session.calculate(&form).await;
        let earlier = session.board();

        session.calculate(&form).await;
        assert_eq!(
            session.commit_selection(&earlier, 0, 1),
            Err(SelectionError::Superseded(earlier.generation))
        );
        assert!(session.selected().is_none());

        let current = session.board();
        assert!(session.commit_selection(&current, 0, 1).is_ok());
    }

    #[tokio::test]
    async fn unknown_loan_type_prices_nothing() {
        let session = session();
        let payload = CanonicalPayload::from(serde_json::Map::new());
        let outcome = session.calculate_payload(payload).await;
        assert_eq!(outcome.programs, 0);
        assert!(session.board().slots.is_empty());
    }

    #[tokio::test]
    async fn persistence_failures_surface_to_the_caller() {
        let session = session();
        assert!(matches!(
            session.save_scenario("draft", None).await,
            Err(ScenarioError::NothingToSave)
        ));

        let form = PricingForm::new(LoanType::Bridge, TransactionType::Purchase);
        session.form_changed(&form);
        assert!(matches!(
            session.save_scenario("draft", None).await,
            Err(ScenarioError::Unavailable(_))
        ));
        assert!(matches!(
            session.load_scenario(&ScenarioId("missing".to_string())).await,
            Err(ScenarioError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn main_summary_tracks_the_selected_row() {
        let session = session();
        let form = PricingForm::new(LoanType::Dscr, TransactionType::Purchase);
        session.calculate(&form).await;
        assert!(session.main_summary().is_none());

        session.select(0, 1).expect("row exists");
        let summary = session.main_summary().expect("selection made");
        assert_eq!(summary.program_name, "Alpha");
        assert_eq!(summary.loan_price, Some(100.0));
        assert_eq!(summary.interest_rate, Some(7.25));
    }
}
