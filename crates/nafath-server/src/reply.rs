//! Mapping of handshake errors and rejections onto HTTP replies

use crate::InvalidFlow;
use nafath_core::HandshakeError;
use serde::Serialize;
use serde_json::json;
use std::convert::Infallible;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Rejection, Reply};

/// Serialize `body` with `status`
pub fn json<T: Serialize>(body: &T, status: StatusCode) -> Response {
    warp::reply::with_status(warp::reply::json(body), status).into_response()
}

/// `{ "error": message }` with `status`
pub fn error_message(message: impl Into<String>, status: StatusCode) -> Response {
    json(&json!({ "error": message.into() }), status)
}

/// HTTP status for a flow error
#[must_use]
pub fn status_for(err: &HandshakeError) -> StatusCode {
    if err.is_not_found() {
        StatusCode::NOT_FOUND
    } else if err.is_client_error() {
        StatusCode::BAD_REQUEST
    } else if err.is_collaborator_failure() {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

/// Reply for a flow error
pub fn error(err: &HandshakeError) -> Response {
    let status = status_for(err);
    if status.is_server_error() {
        tracing::error!(error = %err, "request failed");
    }

    let message = match err {
        HandshakeError::NotFound(what) => format!("No {what} found"),
        HandshakeError::NoActiveSession => "No active session".to_string(),
        other => other.to_string(),
    };
    error_message(message, status)
}

/// Turn filter rejections into JSON error replies
///
/// # Errors
/// Never; the `Result` is required by `Filter::recover`.
pub async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    let (status, message) = if let Some(InvalidFlow(reason)) = err.find::<InvalidFlow>() {
        (StatusCode::BAD_REQUEST, reason.clone())
    } else if let Some(e) = err.find::<warp::reject::InvalidHeader>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Payload too large".to_string())
    } else if err.find::<warp::reject::LengthRequired>().is_some() {
        (StatusCode::LENGTH_REQUIRED, "Content-Length required".to_string())
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "Expected application/json".to_string(),
        )
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string())
    } else {
        tracing::error!(rejection = ?err, "unhandled rejection");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error".to_string(),
        )
    };

    Ok(error_message(message, status))
}
