use super::{ApiClient, ApiError, Retry};
use crate::models::AccessToken;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Serialize)]
struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct RegisterResponse {
    message: String,
}

impl ApiClient {
    /// Exchanges credentials for a bearer token. The body is form encoded.
    pub async fn login(&self, username: &str, password: &str) -> Result<AccessToken, ApiError> {
        let form = [("username", username), ("password", password)];
        let response = self
            .send(
                || self.client.post(self.url("/api/auth/token")).form(&form),
                Retry::OnConnect,
                "Login failed",
            )
            .await?;

        let token: AccessToken = Self::decode_required(response).await?;
        info!(username, "Logged in");
        Ok(token)
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<String, ApiError> {
        let body = Credentials { username, password };
        let response = self
            .send(
                || self.client.post(self.url("/api/auth/register")).json(&body),
                Retry::OnConnect,
                "Registration failed",
            )
            .await?;

        let message = Self::decode::<RegisterResponse>(response)
            .await?
            .map(|r| r.message)
            .unwrap_or_else(|| "User created successfully".to_string());
        info!(username, "Registered");
        Ok(message)
    }
}
