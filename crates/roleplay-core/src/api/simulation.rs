use super::{ApiClient, ApiError, Retry};
use crate::models::{ExchangeRequest, Feedback};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Deserialize)]
struct RespondResponse {
    ai_response: String,
}

#[derive(Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
}

/// The remote responder and analyzer a session talks to.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SimulationBackend: Send + Sync {
    /// Produces the counterpart's next line for the conversation so far.
    async fn respond(&self, request: &ExchangeRequest) -> Result<String, ApiError>;

    /// Scores the whole conversation against the scenario.
    async fn analyze(&self, request: &ExchangeRequest) -> Result<Feedback, ApiError>;
}

#[async_trait]
impl SimulationBackend for ApiClient {
    async fn respond(&self, request: &ExchangeRequest) -> Result<String, ApiError> {
        debug!(turns = request.conversation.len(), scenario_id = request.scenario_id, "Requesting response");
        let response = self
            .send(
                || self.post("/api/app/simulation/respond").json(request),
                Retry::OnConnectOrTimeout,
                "API call failed",
            )
            .await?;
        let body: RespondResponse = Self::decode_required(response).await?;
        Ok(body.ai_response)
    }

    async fn analyze(&self, request: &ExchangeRequest) -> Result<Feedback, ApiError> {
        debug!(turns = request.conversation.len(), scenario_id = request.scenario_id, "Requesting analysis");
        let response = self
            .send(
                || self.post("/api/app/simulation/analyze").json(request),
                Retry::OnConnect,
                "API call failed",
            )
            .await?;
        Self::decode_required(response).await
    }
}

impl ApiClient {
    /// Fetches synthesized speech for `text` as playable audio bytes.
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ApiError> {
        let body = SynthesizeRequest { text };
        let response = self
            .send(
                || self.post("/api/app/simulation/synthesize").json(&body),
                Retry::OnConnectOrTimeout,
                "Speech synthesis failed",
            )
            .await?;
        let bytes = response.bytes().await.map_err(ApiError::from_reqwest)?;
        Ok(bytes.to_vec())
    }
}
