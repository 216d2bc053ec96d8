//! Pricing page orchestration: payload building, program discovery, concurrent
//! dispatch into ordered result slots, staleness tracking, and reconciliation
//! of the selected row across recomputation and scenario reloads.

pub mod dispatch;
pub mod form;
pub mod http;
pub mod lookup;
pub mod payload;
pub mod programs;
pub mod results;
pub mod scenario;
pub mod selection;
pub mod session;
pub mod slots;
pub mod staleness;

pub use dispatch::{DispatchReport, Dispatcher, GatewayError, PricingGateway};
pub use form::{LoanType, PricingForm, TransactionType, UnitRent};
pub use http::HttpPricingClient;
pub use lookup::{AddressLookup, AddressResolver, AddressSuggestion, LookupError, LookupOutcome};
pub use payload::{build_payload, CanonicalPayload};
pub use programs::{discover_programs, ProgramCatalog, ProgramDescriptor};
pub use results::{ProgramResponse, ProgramResult, ResultKind, RowValues};
pub use scenario::{
    LoadedScenario, SaveScenarioRequest, SavedScenario, ScenarioError, ScenarioId, ScenarioStore,
    StoredSelection,
};
pub use selection::{remap, select_row, MainFigures, MainSummary, SelectedRow, SelectionError};
pub use session::{CalculationOutcome, PricingCollaborators, PricingSession, SessionView};
pub use slots::{BoardSnapshot, CycleToken, FillRejected, ResultBoard, ResultSlot};
pub use staleness::StalenessTracker;
