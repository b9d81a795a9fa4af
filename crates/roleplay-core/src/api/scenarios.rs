use super::{ApiClient, ApiError, Retry};
use crate::models::{Scenario, ScenarioDraft};
use tracing::info;

impl ApiClient {
    /// Scenarios available for training.
    pub async fn list_scenarios(&self) -> Result<Vec<Scenario>, ApiError> {
        self.fetch_scenarios("/api/app/simulation/scenarios").await
    }

    /// Scenarios as seen from the admin console.
    pub async fn admin_scenarios(&self) -> Result<Vec<Scenario>, ApiError> {
        self.fetch_scenarios("/api/admin/scenarios").await
    }

    async fn fetch_scenarios(&self, endpoint: &str) -> Result<Vec<Scenario>, ApiError> {
        let response = self
            .send(|| self.get(endpoint), Retry::OnConnectOrTimeout, "API call failed")
            .await?;
        Ok(Self::decode(response).await?.unwrap_or_default())
    }

    pub async fn create_scenario(&self, draft: &ScenarioDraft) -> Result<Scenario, ApiError> {
        let response = self
            .send(
                || self.post("/api/admin/scenarios").json(draft),
                Retry::OnConnect,
                "API call failed",
            )
            .await?;

        let scenario: Scenario = Self::decode_required(response).await?;
        info!(id = scenario.id, title = %scenario.title, "Scenario created");
        Ok(scenario)
    }
}

#[cfg(test)]
mod tests {
    use crate::api::test_server;
    use crate::models::ScenarioDraft;
    use axum::{
        http::{HeaderMap, StatusCode},
        routing::get,
        Json, Router,
    };
    use serde_json::{json, Value};

    fn bearer(headers: &HeaderMap) -> Option<String> {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(String::from)
    }

    fn scenario_router() -> Router {
        Router::new()
            .route(
                "/api/app/simulation/scenarios",
                get(|headers: HeaderMap| async move {
                    if bearer(&headers).as_deref() != Some("Bearer tok") {
                        return (
                            StatusCode::UNAUTHORIZED,
                            Json(json!({"detail": "Not authenticated"})),
                        );
                    }
                    (
                        StatusCode::OK,
                        Json(json!([
                            {"id": 1, "title": "Cold call", "goal": "Book a demo",
                             "customer_persona": "Busy CTO", "required_keywords": ["demo"]},
                            {"id": 2, "title": "Refund", "goal": "Keep the customer",
                             "customer_persona": "Angry", "required_keywords": []}
                        ])),
                    )
                }),
            )
            .route(
                "/api/admin/scenarios",
                get(|| async { Json(json!([])) }).post(|Json(body): Json<Value>| async move {
                    let mut created = body.clone();
                    created["id"] = json!(7);
                    Json(created)
                }),
            )
    }

    #[tokio::test]
    async fn test_list_scenarios_attaches_bearer_token() {
        let base = test_server::spawn(scenario_router()).await;

        let scenarios = test_server::client(&base, Some("tok"))
            .list_scenarios()
            .await
            .unwrap();
        assert_eq!(scenarios.len(), 2);
        assert_eq!(scenarios[0].title, "Cold call");

        let err = test_server::client(&base, None)
            .list_scenarios()
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Not authenticated");
    }

    #[tokio::test]
    async fn test_admin_create_and_list() {
        let base = test_server::spawn(scenario_router()).await;
        let client = test_server::client(&base, Some("tok"));

        assert!(client.admin_scenarios().await.unwrap().is_empty());

        let draft = ScenarioDraft::from_form("Upsell", "Sell premium", "Loyal user", "premium, value")
            .unwrap();
        let created = client.create_scenario(&draft).await.unwrap();
        assert_eq!(created.id, 7);
        assert_eq!(created.required_keywords, vec!["premium", "value"]);
    }
}
