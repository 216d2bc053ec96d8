use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;
use tracing::debug;

use crate::config::PricingApiConfig;

use super::dispatch::{GatewayError, PricingGateway};
use super::form::LoanType;
use super::programs::{ProgramCatalog, ProgramDescriptor};
use super::results::ProgramResponse;
use super::scenario::{
    LoadedScenario, SaveScenarioRequest, SavedScenario, ScenarioError, ScenarioId, ScenarioStore,
};

/// JSON client for the remote pricing backend. Serves as program catalog,
/// pricing gateway and scenario store. No request timeout is set, so a hung
/// program keeps its slot pending.
#[derive(Debug, Clone)]
pub struct HttpPricingClient {
    client: Client,
    base_url: Url,
}

impl HttpPricingClient {
    pub fn new(config: &PricingApiConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.base_url.clone(),
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| GatewayError::Transport(format!("{} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status(status.as_u16()));
        }
        response
            .json()
            .await
            .map_err(|err| GatewayError::Decode(err.to_string()))
    }
}

fn transport(err: reqwest::Error) -> GatewayError {
    GatewayError::Transport(err.to_string())
}

#[async_trait]
impl ProgramCatalog for HttpPricingClient {
    async fn programs(&self, loan_type: LoanType) -> Result<Vec<ProgramDescriptor>, GatewayError> {
        let mut url = self.endpoint(&["programs"])?;
        url.query_pairs_mut()
            .append_pair("loan_type", loan_type.label());

        debug!(%url, "fetching program catalog");
        let response = self.client.get(url).send().await.map_err(transport)?;
        Self::decode(response).await
    }
}

#[async_trait]
impl PricingGateway for HttpPricingClient {
    async fn price(
        &self,
        program: &ProgramDescriptor,
        payload: &Value,
    ) -> Result<ProgramResponse, GatewayError> {
        let url = self.endpoint(&["programs", program.identity(), "price"])?;

        debug!(%url, program = program.identity(), "pricing program");
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(transport)?;
        Self::decode(response).await
    }
}

fn scenario_error(err: GatewayError) -> ScenarioError {
    match err {
        GatewayError::Status(code) if (400..500).contains(&code) => {
            ScenarioError::Rejected(format!("storage returned status {code}"))
        }
        other => ScenarioError::Unavailable(other.to_string()),
    }
}

#[async_trait]
impl ScenarioStore for HttpPricingClient {
    async fn save(&self, request: SaveScenarioRequest) -> Result<SavedScenario, ScenarioError> {
        let url = self.endpoint(&["scenarios"]).map_err(scenario_error)?;
        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|err| scenario_error(transport(err)))?;
        Self::decode(response).await.map_err(scenario_error)
    }

    async fn load(&self, id: &ScenarioId) -> Result<LoadedScenario, ScenarioError> {
        let url = self
            .endpoint(&["scenarios", id.0.as_str()])
            .map_err(scenario_error)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| scenario_error(transport(err)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ScenarioError::NotFound(id.clone()));
        }
        Self::decode(response).await.map_err(scenario_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> HttpPricingClient {
        let config = PricingApiConfig::new(base).expect("valid base url");
        HttpPricingClient::new(&config)
    }

    #[test]
    fn endpoints_extend_the_base_path() {
        let client = client("http://pricing.internal:4000/api/");
        let url = client
            .endpoint(&["programs", "DSCR 30yr", "price"])
            .expect("endpoint");
        assert_eq!(
            url.as_str(),
            "http://pricing.internal:4000/api/programs/DSCR%2030yr/price"
        );
    }

    #[test]
    fn ids_cannot_escape_their_segment() {
        let client = client("https://pricing.example.com");
        let url = client.endpoint(&["scenarios", "../admin"]).expect("endpoint");
        assert_eq!(url.path(), "/scenarios/..%2Fadmin");
    }

    #[test]
    fn client_errors_are_rejections_and_the_rest_unavailable() {
        assert!(matches!(
            scenario_error(GatewayError::Status(422)),
            ScenarioError::Rejected(_)
        ));
        assert!(matches!(
            scenario_error(GatewayError::Status(503)),
            ScenarioError::Unavailable(_)
        ));
        assert!(matches!(
            scenario_error(GatewayError::Transport("refused".to_string())),
            ScenarioError::Unavailable(_)
        ));
    }
}
