//! RPC request handlers.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use kyc_session::{HandoffPayload, SessionError, VerificationSubmission};
use kyc_types::{
    DeviceClass, ErrorCode, FailureReason, KycSession, SessionId, SessionStatus, SubjectRef,
    Timestamp, VerificationResult,
};

use crate::error::RpcError;
use crate::server::RpcState;

/// Reason recorded when the completing device aborts without giving one.
const DEFAULT_ABORT_REASON: &str = "abandoned on the completing device";

// ── Session ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub subject_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub session_id: SessionId,
    pub locator_url: String,
    pub expires_at: Timestamp,
    pub expires_in_secs: u64,
    pub qr_code_data: HandoffPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusResponse {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub expires_at: Timestamp,
    pub expires_in_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<VerificationResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
}

impl SessionStatusResponse {
    pub fn from_session(session: KycSession, now: Timestamp) -> Self {
        Self {
            expires_in_secs: session.expires_at.remaining_from(now),
            session_id: session.session_id,
            status: session.status,
            expires_at: session.expires_at,
            result: session.result,
            failure_reason: session.failure_reason,
        }
    }
}

// ── Capture ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionResponse {
    pub session_id: SessionId,
    pub status: SessionStatus,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub session_id: SessionId,
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<VerificationResult>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AbortRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

// ── Errors ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorCode,
    pub message: String,
}

// ── Handlers ─────────────────────────────────────────────────────────────

fn parse_session_id(raw: &str) -> Result<SessionId, RpcError> {
    SessionId::parse(raw).map_err(|e| RpcError::InvalidRequest(e.to_string()))
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, RpcError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| RpcError::InvalidRequest(rejection.body_text()))
}

pub(crate) fn device_class(headers: &HeaderMap) -> DeviceClass {
    DeviceClass::from_user_agent(
        headers
            .get(header::USER_AGENT)
            .and_then(|value| value.to_str().ok()),
    )
}

pub async fn create_session(
    State(state): State<Arc<RpcState>>,
    payload: Result<Json<CreateSessionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), RpcError> {
    let request = json_body(payload)?;
    let subject_ref =
        SubjectRef::new(request.subject_ref).map_err(|e| RpcError::InvalidRequest(e.to_string()))?;
    let issuer = state.issuer_for(request.base_url.as_deref())?;

    let session = state.manager.create_session(subject_ref)?;
    state.metrics.sessions_created.inc();
    let locator = issuer.issue(&session)?;
    let now = state.manager.now();
    info!(session = %session.session_id, url = %locator.url, "handoff issued");

    let response = CreateSessionResponse {
        session_id: session.session_id.clone(),
        locator_url: locator.url.clone(),
        expires_at: locator.expires_at,
        expires_in_secs: locator.expires_in_secs(now),
        qr_code_data: locator.payload(now),
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// Read by the completing device when it opens the locator.
pub async fn session_info(
    State(state): State<Arc<RpcState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<SessionStatusResponse>, RpcError> {
    let session_id = parse_session_id(&id)?;
    state.check_device(&headers)?;
    let session = state.manager.get_status(&session_id)?;
    Ok(Json(SessionStatusResponse::from_session(
        session,
        state.manager.now(),
    )))
}

/// Polled by the initiating device.
pub async fn session_status(
    State(state): State<Arc<RpcState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionStatusResponse>, RpcError> {
    let session_id = parse_session_id(&id)?;
    let session = state.manager.get_status(&session_id)?;
    Ok(Json(SessionStatusResponse::from_session(
        session,
        state.manager.now(),
    )))
}

pub async fn session_qr(
    State(state): State<Arc<RpcState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, RpcError> {
    let session_id = parse_session_id(&id)?;
    let session = state.manager.get_status(&session_id)?;
    if session.status.is_terminal() {
        return Err(match session.status {
            SessionStatus::Expired => SessionError::SessionExpired(session_id),
            status => SessionError::SessionNotPending { session_id, status },
        }
        .into());
    }
    let svg = state.issuer.issue(&session)?.qr_svg();
    Ok(([(header::CONTENT_TYPE, "image/svg+xml")], svg))
}

pub async fn start_session(
    State(state): State<Arc<RpcState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<TransitionResponse>, RpcError> {
    let session_id = parse_session_id(&id)?;
    state.authorize(&session_id, &headers)?;
    let session = state.manager.start(&session_id)?;
    Ok(Json(TransitionResponse {
        session_id: session.session_id,
        status: session.status,
    }))
}

pub async fn verify_session(
    State(state): State<Arc<RpcState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<VerificationSubmission>, JsonRejection>,
) -> Result<Json<VerifyResponse>, RpcError> {
    let session_id = parse_session_id(&id)?;
    state.authorize(&session_id, &headers)?;
    let submission = json_body(payload)?;

    let started = Instant::now();
    let verified = state
        .manager
        .verify(&session_id, submission, state.scorer.as_ref())
        .await;
    state
        .metrics
        .verify_latency_ms
        .observe(started.elapsed().as_secs_f64() * 1_000.0);

    let session = verified.inspect_err(|e| {
        if matches!(e, SessionError::ScorerUnavailable(_)) {
            state.metrics.scorer_failures.inc();
        }
    })?;
    Ok(Json(VerifyResponse {
        session_id: session.session_id,
        status: session.status,
        result: session.result,
    }))
}

pub async fn abort_session(
    State(state): State<Arc<RpcState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Option<Json<AbortRequest>>,
) -> Result<Json<TransitionResponse>, RpcError> {
    let session_id = parse_session_id(&id)?;
    state.check_device(&headers)?;
    let reason = payload
        .and_then(|Json(body)| body.reason)
        .filter(|reason| !reason.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_ABORT_REASON.to_string());
    let session = state.manager.abort(&session_id, &reason)?;
    Ok(Json(TransitionResponse {
        session_id: session.session_id,
        status: session.status,
    }))
}

pub async fn metrics(State(state): State<Arc<RpcState>>) -> Result<impl IntoResponse, RpcError> {
    let text = state
        .metrics
        .encode()
        .map_err(|e| RpcError::Server(format!("metrics encoding: {e}")))?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        text,
    ))
}

pub async fn health() -> &'static str {
    "ok"
}
