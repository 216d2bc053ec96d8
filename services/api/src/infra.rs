use async_trait::async_trait;
use chrono::NaiveDate;
use loan_pricing::workflows::pricing::{
    GatewayError, LoadedScenario, LoanType, PricingCollaborators, PricingGateway, PricingSession,
    ProgramCatalog, ProgramDescriptor, ProgramResponse, SaveScenarioRequest, SavedScenario,
    ScenarioError, ScenarioId, ScenarioStore,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

static SESSION_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static SCENARIO_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Live pricing sessions keyed by id. Every session shares one set of collaborators.
#[derive(Clone)]
pub(crate) struct SessionRegistry {
    collaborators: PricingCollaborators,
    sessions: Arc<Mutex<HashMap<String, Arc<PricingSession>>>>,
}

impl SessionRegistry {
    pub(crate) fn new(collaborators: PricingCollaborators) -> Self {
        Self {
            collaborators,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub(crate) fn create(&self, reference_date: NaiveDate) -> (String, Arc<PricingSession>) {
        let id = format!(
            "session-{:06}",
            SESSION_SEQUENCE.fetch_add(1, Ordering::Relaxed)
        );
        let session = Arc::new(PricingSession::new(
            self.collaborators.clone(),
            reference_date,
        ));
        self.sessions
            .lock()
            .expect("session registry mutex poisoned")
            .insert(id.clone(), Arc::clone(&session));
        (id, session)
    }

    pub(crate) fn get(&self, id: &str) -> Option<Arc<PricingSession>> {
        self.sessions
            .lock()
            .expect("session registry mutex poisoned")
            .get(id)
            .cloned()
    }
}

/// Fixed program line-up used by `demo` and `serve --demo-backend`.
#[derive(Default, Clone)]
pub(crate) struct DemoProgramCatalog;

#[async_trait]
impl ProgramCatalog for DemoProgramCatalog {
    async fn programs(&self, loan_type: LoanType) -> Result<Vec<ProgramDescriptor>, GatewayError> {
        let programs = match loan_type {
            LoanType::Dscr => vec![
                ProgramDescriptor::new("dscr-core", "DSCR Core 30yr"),
                ProgramDescriptor::new("dscr-io", "DSCR Interest Only"),
                ProgramDescriptor::new("dscr-str", "DSCR Short-Term Rental"),
            ],
            LoanType::Bridge => vec![
                ProgramDescriptor::new("bridge-rehab", "Bridge Light Rehab"),
                ProgramDescriptor::new("bridge-ground-up", "Bridge Ground Up"),
            ],
        };
        Ok(programs)
    }
}

fn amount(payload: &Value, key: &str) -> Option<f64> {
    match payload.get(key)? {
        Value::Number(number) => number.as_f64(),
        Value::String(raw) => raw.replace([',', '$'], "").trim().parse().ok(),
        _ => None,
    }
}

fn monthly_payment(principal: f64, annual_rate_pct: f64, months: u32) -> f64 {
    let rate = annual_rate_pct / 100.0 / 12.0;
    if rate == 0.0 {
        return principal / f64::from(months);
    }
    principal * rate / (1.0 - (1.0 + rate).powi(-(months as i32)))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Deterministic pricing engine standing in for the remote programs.
#[derive(Default, Clone)]
pub(crate) struct DemoPricingGateway;

impl DemoPricingGateway {
    fn base_rate(program: &ProgramDescriptor) -> f64 {
        match program.identity() {
            "dscr-core" => 7.125,
            "dscr-io" => 7.5,
            "dscr-str" => 7.875,
            "bridge-rehab" => 10.25,
            _ => 11.0,
        }
    }
}

#[async_trait]
impl PricingGateway for DemoPricingGateway {
    async fn price(
        &self,
        program: &ProgramDescriptor,
        payload: &Value,
    ) -> Result<ProgramResponse, GatewayError> {
        let fico = amount(payload, "fico").unwrap_or(0.0);
        let mut validations = Vec::new();
        if fico < 660.0 {
            validations.push("FICO below program minimum of 660".to_string());
        }

        let adjustment = if fico >= 740.0 { -0.125 } else { 0.25 };
        let base = Self::base_rate(program) + adjustment;
        let interest_rate: Vec<f64> = (0..4).map(|step| base + 0.25 * f64::from(step)).collect();
        let loan_price: Vec<f64> = (0..4).map(|step| 99.0 + 0.5 * f64::from(step)).collect();
        let taxes_and_insurance = (amount(payload, "annual_taxes").unwrap_or(0.0)
            + amount(payload, "annual_insurance").unwrap_or(0.0)
            + amount(payload, "annual_hoa").unwrap_or(0.0))
            / 12.0;

        let mut response = ProgramResponse {
            pass: validations.is_empty(),
            validations,
            ..ProgramResponse::default()
        };

        if payload.get("loan_type").and_then(Value::as_str) == Some(LoanType::Bridge.label()) {
            let initial = amount(payload, "initial_loan_amount").unwrap_or(0.0);
            let holdback = amount(payload, "rehab_holdback").unwrap_or(0.0);
            let rows = interest_rate.len();
            response.initial_loan_amount = Some(vec![initial; rows]);
            response.rehab_holdback = Some(vec![holdback; rows]);
            response.total_loan_amount = Some(vec![initial + holdback; rows]);
            response.funded_pitia = Some(
                interest_rate
                    .iter()
                    .map(|rate| round2(initial * rate / 100.0 / 12.0 + taxes_and_insurance))
                    .collect(),
            );
        } else {
            let loan_amount = amount(payload, "loan_amount").unwrap_or(0.0);
            let value = amount(payload, "purchase_price")
                .or_else(|| amount(payload, "as_is_value"))
                .filter(|value| *value > 0.0);
            let rent: f64 = payload
                .get("units")
                .and_then(Value::as_array)
                .map(|units| units.iter().filter_map(|unit| amount(unit, "gross_rent")).sum())
                .unwrap_or(0.0);
            let pitia: Vec<f64> = interest_rate
                .iter()
                .map(|rate| round2(monthly_payment(loan_amount, *rate, 360) + taxes_and_insurance))
                .collect();

            response.loan_amount = Some(loan_amount);
            response.ltv = value.map(|value| round2(loan_amount / value * 100.0));
            response.dscr = Some(
                pitia
                    .iter()
                    .map(|payment| if *payment > 0.0 { round2(rent / payment) } else { 0.0 })
                    .collect(),
            );
            response.pitia = Some(pitia);
        }

        response.interest_rate = interest_rate;
        response.loan_price = loan_price;
        Ok(response)
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryScenarioStore {
    records: Arc<Mutex<HashMap<ScenarioId, SaveScenarioRequest>>>,
}

#[async_trait]
impl ScenarioStore for InMemoryScenarioStore {
    async fn save(&self, request: SaveScenarioRequest) -> Result<SavedScenario, ScenarioError> {
        if request.name.trim().is_empty() {
            return Err(ScenarioError::Rejected("scenario name is required".to_string()));
        }
        let sequence = SCENARIO_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let scenario_id = ScenarioId(format!("scenario-{sequence:06}"));
        let selection_id = request
            .selection
            .as_ref()
            .map(|_| format!("selection-{sequence:06}"));

        let mut guard = self.records.lock().expect("scenario mutex poisoned");
        guard.insert(scenario_id.clone(), request);
        Ok(SavedScenario {
            scenario_id,
            selection_id,
        })
    }

    async fn load(&self, id: &ScenarioId) -> Result<LoadedScenario, ScenarioError> {
        let guard = self.records.lock().expect("scenario mutex poisoned");
        let record = guard
            .get(id)
            .ok_or_else(|| ScenarioError::NotFound(id.clone()))?;
        Ok(LoadedScenario {
            payload: record.payload.clone(),
            selection: record.selection.clone(),
        })
    }
}

pub(crate) fn demo_collaborators() -> PricingCollaborators {
    PricingCollaborators {
        catalog: Arc::new(DemoProgramCatalog),
        gateway: Arc::new(DemoPricingGateway),
        scenarios: Arc::new(InMemoryScenarioStore::default()),
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

pub(crate) fn parse_loan_type(raw: &str) -> Result<LoanType, String> {
    LoanType::from_label(&raw.trim().to_ascii_lowercase())
        .ok_or_else(|| format!("unknown loan type '{raw}' (expected dscr or bridge)"))
}

pub(crate) fn deserialize_optional_date<'de, D>(
    deserializer: D,
) -> Result<Option<NaiveDate>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    opt.map(|value| parse_date(&value).map_err(serde::de::Error::custom))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use loan_pricing::workflows::pricing::ProgramResult;
    use serde_json::json;

    #[tokio::test]
    async fn demo_gateway_prices_dscr_rows_consistently() {
        let payload = json!({
            "loan_type": "dscr",
            "fico": "745",
            "loan_amount": "300,000",
            "purchase_price": "400000",
            "annual_taxes": "3600",
            "annual_insurance": "1200",
            "units": [{ "gross_rent": "2400" }, { "gross_rent": "1100" }],
        });
        let program = ProgramDescriptor::new("dscr-core", "DSCR Core 30yr");
        let response = DemoPricingGateway
            .price(&program, &payload)
            .await
            .expect("demo pricing succeeds");

        assert!(response.pass);
        assert_eq!(response.ltv, Some(75.0));
        let result = ProgramResult::from_response(program, response).expect("rows line up");
        assert_eq!(result.row_count(), 4);
    }

    #[tokio::test]
    async fn demo_gateway_flags_low_fico_and_prices_draws_for_bridge() {
        let payload = json!({
            "loan_type": "bridge",
            "fico": "640",
            "initial_loan_amount": "200000",
            "rehab_holdback": "50000",
        });
        let response = DemoPricingGateway
            .price(&ProgramDescriptor::new("bridge-rehab", "Bridge Light Rehab"), &payload)
            .await
            .expect("demo pricing succeeds");

        assert!(!response.pass);
        assert_eq!(response.validations.len(), 1);
        assert_eq!(
            response.total_loan_amount.as_deref().and_then(|totals| totals.first()),
            Some(&250000.0)
        );
    }

    #[tokio::test]
    async fn scenario_store_round_trips_and_reports_missing_ids() {
        let store = InMemoryScenarioStore::default();
        let saved = store
            .save(SaveScenarioRequest {
                name: "demo".to_string(),
                payload: serde_json::from_value(json!({ "loan_type": "dscr" }))
                    .expect("payload"),
                selection: None,
                owner_id: None,
            })
            .await
            .expect("saved");
        assert!(saved.selection_id.is_none());
        assert!(store.load(&saved.scenario_id).await.is_ok());
        assert!(matches!(
            store.load(&ScenarioId("scenario-999999".to_string())).await,
            Err(ScenarioError::NotFound(_))
        ));
    }

    #[test]
    fn registry_hands_out_distinct_sessions() {
        let registry = SessionRegistry::new(demo_collaborators());
        let today = NaiveDate::from_ymd_opt(2025, 5, 1).expect("valid date");
        let (first, _) = registry.create(today);
        let (second, _) = registry.create(today);
        assert_ne!(first, second);
        assert!(first.starts_with("session-"));
        assert!(registry.get(&first).is_some());
        assert!(registry.get("session-unknown").is_none());
    }

    #[test]
    fn loan_types_parse_case_insensitively() {
        assert_eq!(parse_loan_type("Bridge"), Ok(LoanType::Bridge));
        assert!(parse_loan_type("heloc").is_err());
    }
}
