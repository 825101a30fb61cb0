//! Black Duck snippet-matching client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, warn};

use snipsentry_core::{FingerprintSet, SnippetError, SnippetMatcher};

use crate::config::BlackDuckConfig;

const AUTHENTICATE_PATH: &str = "/api/tokens/authenticate";
const SNIPPET_MATCHING_PATH: &str = "/api/snippet-matching";
const SNIPPET_CONTENT_TYPE: &str = "application/vnd.blackducksoftware.bill-of-materials-6+json";
const AUTH_ACCEPT: &str = "application/vnd.blackducksoftware.user-4+json";

#[derive(Error, Debug)]
pub enum MatchingError {
    #[error("Failed to make HTTP request: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Black Duck request timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    #[error("API returned error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Black Duck URL not provided. Pass --url or set BD_URL")]
    MissingUrl,

    #[error("Black Duck token not provided. Pass --token or set BD_TOKEN")]
    MissingToken,

    #[error(transparent)]
    Malformed(#[from] SnippetError),
}

impl From<MatchingError> for SnippetError {
    fn from(error: MatchingError) -> Self {
        match error {
            MatchingError::Timeout { timeout_secs } => SnippetError::Timeout {
                operation: "Black Duck snippet matching".to_string(),
                timeout_secs,
            },
            MatchingError::Malformed(inner) => inner,
            other => SnippetError::collaborator("Black Duck", other.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthenticateResponse {
    bearer_token: String,
}

/// Client for the snippet-matching endpoint, authenticating with an API token.
pub struct BlackDuckClient {
    base_url: String,
    api_token: String,
    timeout_secs: u64,
    http_client: HttpClient,
    bearer_token: Mutex<Option<String>>,
}

impl BlackDuckClient {
    pub fn new(config: &BlackDuckConfig) -> Result<Self, MatchingError> {
        let base_url = config
            .url
            .as_deref()
            .map(|url| url.trim_end_matches('/').to_string())
            .ok_or(MatchingError::MissingUrl)?;
        let api_token = config.token.clone().ok_or(MatchingError::MissingToken)?;

        if config.insecure {
            debug!("TLS certificate verification disabled for {}", base_url);
        }

        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(config.insecure)
            .build()?;

        Ok(Self {
            base_url,
            api_token,
            timeout_secs: config.timeout_secs,
            http_client,
            bearer_token: Mutex::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn bearer_token(&self) -> Result<String, MatchingError> {
        let mut cached = self.bearer_token.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }

        debug!("Authenticating against {}", self.base_url);
        let response = self
            .http_client
            .post(format!("{}{}", self.base_url, AUTHENTICATE_PATH))
            .header("Authorization", format!("token {}", self.api_token))
            .header("Accept", AUTH_ACCEPT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(MatchingError::AuthenticationFailed(format!(
                "{} - {}",
                status.as_u16(),
                error_text
            )));
        }

        let auth: AuthenticateResponse = response.json().await.map_err(|e| {
            MatchingError::AuthenticationFailed(format!("unexpected response: {}", e))
        })?;
        *cached = Some(auth.bearer_token.clone());
        Ok(auth.bearer_token)
    }

    async fn forget_bearer_token(&self) {
        *self.bearer_token.lock().await = None;
    }

    /// Submit a fingerprint payload and return the response body; `None` when
    /// the body is empty.
    pub async fn submit(
        &self,
        fingerprints: &FingerprintSet,
    ) -> Result<Option<String>, MatchingError> {
        timeout(
            Duration::from_secs(self.timeout_secs),
            self.submit_with_reauth(fingerprints),
        )
        .await
        .map_err(|_| MatchingError::Timeout {
            timeout_secs: self.timeout_secs,
        })?
    }

    async fn submit_with_reauth(
        &self,
        fingerprints: &FingerprintSet,
    ) -> Result<Option<String>, MatchingError> {
        match self.call_api(fingerprints).await {
            Err(MatchingError::ApiError { status: 401, .. }) => {
                warn!("Black Duck bearer token rejected, authenticating again");
                self.forget_bearer_token().await;
                self.call_api(fingerprints).await
            }
            other => other,
        }
    }

    async fn call_api(
        &self,
        fingerprints: &FingerprintSet,
    ) -> Result<Option<String>, MatchingError> {
        let bearer = self.bearer_token().await?;
        let body = serde_json::to_vec(fingerprints.payload()).map_err(SnippetError::from)?;

        debug!(
            "Submitting {} fingerprints to {}",
            fingerprints.count(),
            self.base_url
        );
        let response = self
            .http_client
            .post(format!("{}{}", self.base_url, SNIPPET_MATCHING_PATH))
            .header("Authorization", format!("Bearer {}", bearer))
            .header("Content-Type", SNIPPET_CONTENT_TYPE)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(MatchingError::ApiError {
                status: status.as_u16(),
                message: error_text,
            });
        }

        let response_text = response.text().await?;
        Ok(non_empty_body(response_text))
    }
}

/// Empty or whitespace bodies mean "nothing to report" for the file.
fn non_empty_body(body: String) -> Option<String> {
    if body.trim().is_empty() {
        None
    } else {
        Some(body)
    }
}

#[async_trait]
impl SnippetMatcher for BlackDuckClient {
    async fn match_snippets(
        &self,
        fingerprints: &FingerprintSet,
    ) -> Result<Option<String>, SnippetError> {
        Ok(self.submit(fingerprints).await?)
    }
}
