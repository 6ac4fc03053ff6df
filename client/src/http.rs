//! Typed calls against the handoff HTTP API.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use kyc_rpc::{
    CreateSessionRequest, CreateSessionResponse, ErrorBody, SessionStatusResponse,
    TransitionResponse, VerifyResponse,
};
use kyc_session::VerificationSubmission;
use kyc_types::SessionId;

use crate::ClientError;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct HandoffClient {
    http: reqwest::Client,
    base_url: String,
}

impl HandoffClient {
    /// A client for the initiating device.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        Self::build(base_url, timeout, None)
    }

    /// A client presenting `user_agent`, as the completing device's browser
    /// would. Guarded routes classify the device from it.
    pub fn for_device(
        base_url: &str,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self, ClientError> {
        Self::build(base_url, timeout, Some(user_agent))
    }

    fn build(
        base_url: &str,
        timeout: Duration,
        user_agent: Option<&str>,
    ) -> Result<Self, ClientError> {
        let base_url = base_url.trim().trim_end_matches('/');
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ClientError::InvalidUrl(base_url.to_string()));
        }
        let mut builder = reqwest::Client::builder().timeout(timeout);
        if let Some(user_agent) = user_agent {
            builder = builder.user_agent(user_agent.to_string());
        }
        let http = builder
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn session_url(&self, session_id: &SessionId, action: &str) -> String {
        if action.is_empty() {
            format!("{}/kyc/session/{session_id}", self.base_url)
        } else {
            format!("{}/kyc/session/{session_id}/{action}", self.base_url)
        }
    }

    pub async fn create_session(
        &self,
        subject_ref: &str,
        base_url: Option<&str>,
    ) -> Result<CreateSessionResponse, ClientError> {
        let request = CreateSessionRequest {
            subject_ref: subject_ref.to_string(),
            base_url: base_url.map(str::to_string),
        };
        let response = self
            .http
            .post(format!("{}/kyc/session", self.base_url))
            .json(&request)
            .send()
            .await?;
        decode(response).await
    }

    /// The guarded read made when the locator is opened.
    pub async fn session_info(
        &self,
        session_id: &SessionId,
    ) -> Result<SessionStatusResponse, ClientError> {
        let response = self.http.get(self.session_url(session_id, "")).send().await?;
        decode(response).await
    }

    /// The unguarded poll read.
    pub async fn status(&self, session_id: &SessionId) -> Result<SessionStatusResponse, ClientError> {
        let response = self
            .http
            .get(self.session_url(session_id, "status"))
            .send()
            .await?;
        decode(response).await
    }

    pub async fn qr_svg(&self, session_id: &SessionId) -> Result<String, ClientError> {
        let response = self.http.get(self.session_url(session_id, "qr")).send().await?;
        if !response.status().is_success() {
            return Err(error_from(response).await);
        }
        let is_svg = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("image/svg+xml"));
        if !is_svg {
            return Err(ClientError::Decode("QR response is not SVG".into()));
        }
        Ok(response.text().await?)
    }

    pub async fn start(&self, session_id: &SessionId) -> Result<TransitionResponse, ClientError> {
        let response = self
            .http
            .post(self.session_url(session_id, "start"))
            .send()
            .await?;
        decode(response).await
    }

    pub async fn verify(
        &self,
        session_id: &SessionId,
        submission: &VerificationSubmission,
    ) -> Result<VerifyResponse, ClientError> {
        let response = self
            .http
            .post(self.session_url(session_id, "verify"))
            .json(submission)
            .send()
            .await?;
        decode(response).await
    }

    pub async fn abort(
        &self,
        session_id: &SessionId,
        reason: &str,
    ) -> Result<TransitionResponse, ClientError> {
        let response = self
            .http
            .post(self.session_url(session_id, "abort"))
            .json(&json!({ "reason": reason }))
            .send()
            .await?;
        decode(response).await
    }

    pub async fn health(&self) -> Result<(), ClientError> {
        let response = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        if response.status() == StatusCode::OK {
            Ok(())
        } else {
            Err(error_from(response).await)
        }
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    if !response.status().is_success() {
        return Err(error_from(response).await);
    }
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
}

/// Rebuild the typed error from a failed response.
async fn error_from(response: Response) -> ClientError {
    let status = response.status().as_u16();
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => return ClientError::from(e),
    };
    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(ErrorBody { error, message }) => {
            debug!(status, code = %error, "API error");
            ClientError::Api {
                code: error,
                message,
            }
        }
        Err(_) => ClientError::UnexpectedStatus { status, body },
    }
}
