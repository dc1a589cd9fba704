//! Route handlers
//!
//! Flow errors become JSON replies here rather than rejections, so every
//! handler is infallible from warp's point of view.

use crate::reply;
use crate::AppState;
use nafath_core::{DecisionOutcome, FlowId, HandshakeError};
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::reply::Response;

type HandlerResult = Result<Response, Infallible>;

/// `POST /api/approval` body
///
/// `status` stays raw JSON; anything but a known string is an invalid decision.
#[derive(Debug, Deserialize)]
pub struct DecisionBody {
    #[serde(default)]
    pub status: Option<Value>,
}

impl DecisionBody {
    /// Decision text handed to the approval flow
    #[must_use]
    pub fn status_text(&self) -> String {
        match &self.status {
            Some(Value::String(status)) => status.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        }
    }
}

/// `POST /api/visual/session` body
#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionBody {
    #[serde(default)]
    pub length: Option<usize>,
}

/// `POST /api/visual/verify` body
#[derive(Debug, Deserialize)]
pub struct VerifyBody {
    pub sequence: SequenceInput,
}

/// Candidate sequence, either as text or as a list of colour codes
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SequenceInput {
    Text(String),
    Codes(Vec<String>),
}

impl SequenceInput {
    /// Text form handed to the pairing flow
    #[must_use]
    pub fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Codes(codes) => codes.join("-"),
        }
    }
}

fn ok<T: serde::Serialize>(body: &T) -> HandlerResult {
    Ok(reply::json(body, StatusCode::OK))
}

fn respond<T: serde::Serialize>(result: Result<T, HandshakeError>) -> HandlerResult {
    match result {
        Ok(body) => ok(&body),
        Err(e) => Ok(reply::error(&e)),
    }
}

pub async fn submit_request(flow: FlowId, state: AppState, body: Value) -> HandlerResult {
    match state.handshake().approvals.submit_request(&flow, body).await {
        Ok(_) => ok(&json!({ "status": "success", "message": "Request stored" })),
        Err(e) => Ok(reply::error(&e)),
    }
}

pub async fn get_request(flow: FlowId, state: AppState) -> HandlerResult {
    respond(state.handshake().approvals.get_request(&flow).await)
}

pub async fn previous_request(flow: FlowId, state: AppState) -> HandlerResult {
    respond(state.handshake().approvals.previous_request(&flow).await)
}

pub async fn decide(flow: FlowId, state: AppState, body: DecisionBody) -> HandlerResult {
    match state.handshake().approvals.decide(&flow, &body.status_text()).await {
        Ok(DecisionOutcome::Approved(result)) => ok(&result),
        Ok(DecisionOutcome::Rejected { archived }) => ok(&json!({
            "status": "rejected",
            "message": "Request rejected",
            "archived": archived,
        })),
        Err(HandshakeError::InvalidDecision(status)) => Ok(reply::json(
            &json!({
                "status": "failed",
                "error": format!("Invalid approval status: {status:?}"),
            }),
            StatusCode::BAD_REQUEST,
        )),
        Err(HandshakeError::CollaboratorFailure { result, .. }) => {
            Ok(reply::json(&result, StatusCode::BAD_GATEWAY))
        }
        Err(e) => Ok(reply::error(&e)),
    }
}

pub async fn get_approval(flow: FlowId, state: AppState) -> HandlerResult {
    respond(state.handshake().approvals.get_approval(&flow).await)
}

pub async fn previous_approval(flow: FlowId, state: AppState) -> HandlerResult {
    respond(state.handshake().approvals.previous_approval(&flow).await)
}

pub async fn create_session(flow: FlowId, state: AppState, body: Bytes) -> HandlerResult {
    let body = if body.iter().all(u8::is_ascii_whitespace) {
        CreateSessionBody::default()
    } else {
        match serde_json::from_slice::<CreateSessionBody>(&body) {
            Ok(body) => body,
            Err(e) => {
                return Ok(reply::error_message(
                    format!("Request body deserialize error: {e}"),
                    StatusCode::BAD_REQUEST,
                ))
            }
        }
    };

    respond(
        state
            .handshake()
            .pairing
            .create_session(&flow, body.length)
            .await,
    )
}

pub async fn get_session(flow: FlowId, state: AppState) -> HandlerResult {
    respond(state.handshake().pairing.get_or_create_session(&flow).await)
}

pub async fn verify(flow: FlowId, state: AppState, body: VerifyBody) -> HandlerResult {
    let candidate = body.sequence.into_text();
    respond(state.handshake().pairing.verify(&flow, &candidate).await)
}

pub async fn session_status(flow: FlowId, state: AppState) -> HandlerResult {
    respond(state.handshake().pairing.status(&flow).await)
}

pub async fn healthz() -> HandlerResult {
    ok(&json!({ "status": "ok", "version": nafath_core::VERSION }))
}
