//! OIDC user-info endpoint client.

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use nova_identity::ClaimsDocument;

use crate::AuthError;

/// Fetches the user-info document for an access token.
#[derive(Debug, Clone)]
pub struct UserInfoClient {
    client: Client,
    endpoint: String,
}

impl UserInfoClient {
    /// Creates a client for the given user-info endpoint URL.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if the HTTP client cannot be built.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AuthError::Configuration(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// The endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Fetches the user-info document.
    ///
    /// # Errors
    ///
    /// * [`AuthError::InvalidCredentials`] if the endpoint rejects the token
    /// * [`AuthError::UserInfo`] for transport failures or a non-object body
    pub async fn fetch(&self, access_token: &str) -> Result<ClaimsDocument, AuthError> {
        let resp = self
            .client
            .get(&self.endpoint)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::UserInfo(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(AuthError::InvalidCredentials);
        }
        if !status.is_success() {
            return Err(AuthError::UserInfo(format!("endpoint returned {status}")));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| AuthError::UserInfo(format!("invalid response body: {e}")))?;

        if !body.is_object() {
            return Err(AuthError::UserInfo("response is not an object".into()));
        }

        debug!(endpoint = %self.endpoint, "User info fetched");
        Ok(ClaimsDocument::from(body))
    }
}
