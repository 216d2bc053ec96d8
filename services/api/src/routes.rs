use crate::infra::{deserialize_optional_date, AppState, SessionRegistry};
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router};
use chrono::{Local, NaiveDate};
use loan_pricing::error::AppError;
use loan_pricing::workflows::pricing::{
    CalculationOutcome, MainSummary, PricingForm, PricingSession, SavedScenario, ScenarioError,
    ScenarioId, SelectedRow, SelectionError, SessionView,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CreateSessionRequest {
    #[serde(default, deserialize_with = "deserialize_optional_date")]
    pub(crate) reference_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateSessionResponse {
    pub(crate) session_id: String,
    pub(crate) reference_date: NaiveDate,
}

#[derive(Debug, Serialize)]
pub(crate) struct CalculationResponse {
    pub(crate) outcome: CalculationOutcome,
    pub(crate) view: SessionView,
}

#[derive(Debug, Serialize)]
pub(crate) struct FormStatusResponse {
    pub(crate) results_stale: bool,
    pub(crate) dispatching: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SelectionRequest {
    pub(crate) program_idx: usize,
    pub(crate) row_idx: usize,
}

#[derive(Debug, Serialize)]
pub(crate) struct SelectionResponse {
    pub(crate) selected: SelectedRow,
    pub(crate) main: MainSummary,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SaveScenarioBody {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) owner_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct RestoreResponse {
    pub(crate) scenario_id: ScenarioId,
    pub(crate) outcome: CalculationOutcome,
    pub(crate) view: SessionView,
}

/// Failures specific to the session endpoints.
#[derive(Debug)]
pub(crate) enum RouteError {
    UnknownSession(String),
    Selection(SelectionError),
    Scenario(ScenarioError),
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        match self {
            RouteError::UnknownSession(id) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": format!("session {id} not found") })),
            )
                .into_response(),
            RouteError::Selection(err) => {
                let status = match err {
                    SelectionError::PendingProgram(_) | SelectionError::Superseded(_) => {
                        StatusCode::CONFLICT
                    }
                    SelectionError::UnknownProgram(_) | SelectionError::UnknownRow { .. } => {
                        StatusCode::UNPROCESSABLE_ENTITY
                    }
                };
                (status, Json(json!({ "error": err.to_string() }))).into_response()
            }
            RouteError::Scenario(err) => AppError::from(err).into_response(),
        }
    }
}

impl From<ScenarioError> for RouteError {
    fn from(value: ScenarioError) -> Self {
        Self::Scenario(value)
    }
}

fn session(registry: &SessionRegistry, id: &str) -> Result<Arc<PricingSession>, RouteError> {
    registry
        .get(id)
        .ok_or_else(|| RouteError::UnknownSession(id.to_string()))
}

pub(crate) fn pricing_router(registry: SessionRegistry) -> Router {
    Router::new()
        .route("/api/v1/pricing/sessions", post(create_session))
        .route(
            "/api/v1/pricing/sessions/:session_id/calculate",
            post(calculate_endpoint),
        )
        .route(
            "/api/v1/pricing/sessions/:session_id/form",
            put(form_changed_endpoint),
        )
        .route(
            "/api/v1/pricing/sessions/:session_id/results",
            get(results_endpoint),
        )
        .route(
            "/api/v1/pricing/sessions/:session_id/selection",
            post(selection_endpoint),
        )
        .route(
            "/api/v1/pricing/sessions/:session_id/scenarios",
            post(save_scenario_endpoint),
        )
        .route(
            "/api/v1/pricing/sessions/:session_id/scenarios/:scenario_id/restore",
            post(restore_scenario_endpoint),
        )
        .with_state(registry)
}

pub(crate) fn with_pricing_routes(registry: SessionRegistry) -> Router {
    pricing_router(registry)
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

pub(crate) async fn create_session(
    State(registry): State<SessionRegistry>,
    body: Option<Json<CreateSessionRequest>>,
) -> impl IntoResponse {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let reference_date = request
        .reference_date
        .unwrap_or_else(|| Local::now().date_naive());
    let (session_id, _) = registry.create(reference_date);
    info!(%session_id, %reference_date, "pricing session opened");

    (
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_id,
            reference_date,
        }),
    )
}

pub(crate) async fn calculate_endpoint(
    State(registry): State<SessionRegistry>,
    Path(session_id): Path<String>,
    Json(form): Json<PricingForm>,
) -> Result<Json<CalculationResponse>, RouteError> {
    let session = session(&registry, &session_id)?;
    let outcome = session.calculate(&form).await;
    Ok(Json(CalculationResponse {
        outcome,
        view: session.view(),
    }))
}

pub(crate) async fn form_changed_endpoint(
    State(registry): State<SessionRegistry>,
    Path(session_id): Path<String>,
    Json(form): Json<PricingForm>,
) -> Result<Json<FormStatusResponse>, RouteError> {
    let session = session(&registry, &session_id)?;
    let results_stale = session.form_changed(&form);
    Ok(Json(FormStatusResponse {
        results_stale,
        dispatching: session.is_dispatching(),
    }))
}

pub(crate) async fn results_endpoint(
    State(registry): State<SessionRegistry>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionView>, RouteError> {
    let session = session(&registry, &session_id)?;
    Ok(Json(session.view()))
}

pub(crate) async fn selection_endpoint(
    State(registry): State<SessionRegistry>,
    Path(session_id): Path<String>,
    Json(request): Json<SelectionRequest>,
) -> Result<Json<SelectionResponse>, RouteError> {
    let session = session(&registry, &session_id)?;
    let selected = session
        .select(request.program_idx, request.row_idx)
        .map_err(RouteError::Selection)?;
    let main = MainSummary::from_selection(&selected);
    Ok(Json(SelectionResponse { selected, main }))
}

pub(crate) async fn save_scenario_endpoint(
    State(registry): State<SessionRegistry>,
    Path(session_id): Path<String>,
    Json(body): Json<SaveScenarioBody>,
) -> Result<(StatusCode, Json<SavedScenario>), RouteError> {
    let session = session(&registry, &session_id)?;
    let saved = session.save_scenario(body.name, body.owner_id).await?;
    Ok((StatusCode::CREATED, Json(saved)))
}

pub(crate) async fn restore_scenario_endpoint(
    State(registry): State<SessionRegistry>,
    Path((session_id, scenario_id)): Path<(String, String)>,
) -> Result<Json<RestoreResponse>, RouteError> {
    let session = session(&registry, &session_id)?;
    let scenario_id = ScenarioId(scenario_id);
    let (_, outcome) = session.restore_scenario(&scenario_id).await?;
    Ok(Json(RestoreResponse {
        scenario_id,
        outcome,
        view: session.view(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::demo_collaborators;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(demo_collaborators())
    }

    fn dscr_form() -> Value {
        json!({
            "loan_type": "dscr",
            "transaction_type": "purchase",
            "borrower": { "fico": "752" },
            "property": {
                "purchase_price": "425000",
                "loan_amount": "318750",
                "annual_taxes": "4200",
                "annual_insurance": "1500"
            },
            "dscr": { "units": [{ "unit_label": "A", "gross_rent": "2900" }] }
        })
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        let request = match body {
            Some(body) => request.body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .expect("request builds");

        let response = app.clone().oneshot(request).await.expect("router responds");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body collects");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, value)
    }

    async fn open_session(app: &Router) -> String {
        let (status, body) = send(
            app,
            "POST",
            "/api/v1/pricing/sessions",
            Some(json!({ "reference_date": "2025-05-01" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["reference_date"], "2025-05-01");
        body["session_id"].as_str().expect("session id").to_string()
    }

    #[tokio::test]
    async fn calculate_select_save_and_restore() {
        let app = pricing_router(registry());
        let id = open_session(&app).await;
        let base = format!("/api/v1/pricing/sessions/{id}");

        let (status, body) = send(&app, "POST", &format!("{base}/calculate"), Some(dscr_form())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"]["programs"], 3);
        assert_eq!(body["outcome"]["report"]["filled"], 3);
        assert_eq!(body["view"]["slots"][0]["state"], "filled");

        let (status, body) = send(
            &app,
            "POST",
            &format!("{base}/selection"),
            Some(json!({ "program_idx": 1, "row_idx": 2 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["selected"]["program_id"], "dscr-io");
        assert_eq!(body["main"]["figures"]["kind"], "amortizing");

        let (status, saved) = send(
            &app,
            "POST",
            &format!("{base}/scenarios"),
            Some(json!({ "name": "Maple Ave duplex" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let scenario_id = saved["scenario_id"].as_str().expect("scenario id").to_string();
        assert!(saved["selection_id"].is_string());

        let (status, body) = send(
            &app,
            "POST",
            &format!("{base}/scenarios/{scenario_id}/restore"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"]["superseded"], false);
        assert_eq!(body["view"]["selected"]["program_idx"], 1);
        assert_eq!(body["view"]["selected"]["row_idx"], 2);
    }

    #[tokio::test]
    async fn form_edits_report_staleness() {
        let app = pricing_router(registry());
        let id = open_session(&app).await;
        let base = format!("/api/v1/pricing/sessions/{id}");
        send(&app, "POST", &format!("{base}/calculate"), Some(dscr_form())).await;

        let (_, body) = send(&app, "PUT", &format!("{base}/form"), Some(dscr_form())).await;
        assert_eq!(body["results_stale"], false);

        let mut edited = dscr_form();
        edited["borrower"]["fico"] = json!("701");
        let (status, body) = send(&app, "PUT", &format!("{base}/form"), Some(edited)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["results_stale"], true);

        let (_, view) = send(&app, "GET", &format!("{base}/results"), None).await;
        assert_eq!(view["results_stale"], true);
    }

    #[tokio::test]
    async fn unknown_sessions_and_bad_selections_are_rejected() {
        let app = pricing_router(registry());
        let (status, _) = send(&app, "GET", "/api/v1/pricing/sessions/session-missing/results", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let id = open_session(&app).await;
        let (status, _) = send(
            &app,
            "POST",
            &format!("/api/v1/pricing/sessions/{id}/selection"),
            Some(json!({ "program_idx": 0, "row_idx": 0 })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = send(
            &app,
            "POST",
            &format!("/api/v1/pricing/sessions/{id}/scenarios/scenario-404404/restore"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn saving_before_any_input_is_a_conflict() {
        let app = pricing_router(registry());
        let id = open_session(&app).await;
        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/v1/pricing/sessions/{id}/scenarios"),
            Some(json!({ "name": "empty" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().expect("message").contains("no pricing inputs"));
    }

    #[tokio::test]
    async fn healthcheck_reports_ok() {
        let Json(body) = healthcheck().await;
        assert_eq!(body["status"], "ok");
    }
}
