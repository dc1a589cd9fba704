//! Nafath Server - HTTP boundary for the handshake flows
//!
//! Exposes the approval and visual pairing flows of [`nafath_core`] as a
//! small JSON API. Every route reads the flow it acts on from the optional
//! `x-flow-id` header, falling back to `default`.
//!
//! # Example
//!
//! ```rust,ignore
//! use nafath_core::{Handshake, HandshakeConfig};
//! use nafath_server::{routes, AppState};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = HandshakeConfig::load(None)?;
//! let state = AppState::new(Handshake::from_config(&config)?);
//! warp::serve(routes(state)).run(([0, 0, 0, 0], 8002)).await;
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod handlers;
pub mod reply;

use nafath_core::{FlowId, Handshake};
use std::convert::Infallible;
use std::sync::Arc;
use warp::{Filter, Rejection, Reply};

/// Header naming the flow a call acts on
pub const FLOW_HEADER: &str = "x-flow-id";

/// Upper bound on JSON request bodies
pub const MAX_BODY_BYTES: u64 = 1024 * 1024;

/// Shared handle passed to every handler
#[derive(Debug, Clone)]
pub struct AppState {
    handshake: Arc<Handshake>,
}

impl AppState {
    #[must_use]
    pub fn new(handshake: Handshake) -> Self {
        Self {
            handshake: Arc::new(handshake),
        }
    }

    #[inline]
    #[must_use]
    pub fn handshake(&self) -> &Handshake {
        &self.handshake
    }
}

/// Flow id header did not pass validation
#[derive(Debug)]
pub struct InvalidFlow(pub String);

impl warp::reject::Reject for InvalidFlow {}

/// Full route table with CORS and request tracing
pub fn routes(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST", "OPTIONS"])
        .allow_headers(vec!["content-type", FLOW_HEADER]);

    request_routes(state.clone())
        .or(approval_routes(state.clone()))
        .or(visual_routes(state))
        .or(healthz())
        .recover(reply::handle_rejection)
        .with(cors)
        .with(warp::trace::request())
}

fn request_routes(
    state: AppState,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let submit = warp::path!("api" / "request")
        .and(warp::post())
        .and(flow_id())
        .and(with_state(state.clone()))
        .and(json_body())
        .and_then(handlers::submit_request);

    let current = warp::path!("api" / "request")
        .and(warp::get())
        .and(flow_id())
        .and(with_state(state.clone()))
        .and_then(handlers::get_request);

    let previous = warp::path!("api" / "request" / "previous")
        .and(warp::get())
        .and(flow_id())
        .and(with_state(state))
        .and_then(handlers::previous_request);

    submit.or(current).or(previous)
}

fn approval_routes(
    state: AppState,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let decide = warp::path!("api" / "approval")
        .and(warp::post())
        .and(flow_id())
        .and(with_state(state.clone()))
        .and(json_body())
        .and_then(handlers::decide);

    let consume = warp::path!("api" / "approval")
        .and(warp::get())
        .and(flow_id())
        .and(with_state(state.clone()))
        .and_then(handlers::get_approval);

    let previous = warp::path!("api" / "approval" / "previous")
        .and(warp::get())
        .and(flow_id())
        .and(with_state(state))
        .and_then(handlers::previous_approval);

    decide.or(consume).or(previous)
}

fn visual_routes(
    state: AppState,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    // Body is optional here, so it is read raw and parsed by the handler.
    let create = warp::path!("api" / "visual" / "session")
        .and(warp::post())
        .and(flow_id())
        .and(with_state(state.clone()))
        .and(warp::body::bytes())
        .and_then(handlers::create_session);

    let session = warp::path!("api" / "visual" / "session")
        .and(warp::get())
        .and(flow_id())
        .and(with_state(state.clone()))
        .and_then(handlers::get_session);

    let verify = warp::path!("api" / "visual" / "verify")
        .and(warp::post())
        .and(flow_id())
        .and(with_state(state.clone()))
        .and(json_body())
        .and_then(handlers::verify);

    let status = warp::path!("api" / "visual" / "status")
        .and(warp::get())
        .and(flow_id())
        .and(with_state(state))
        .and_then(handlers::session_status);

    create.or(session).or(verify).or(status)
}

fn healthz() -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("healthz")
        .and(warp::get())
        .and_then(handlers::healthz)
}

fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn flow_id() -> impl Filter<Extract = (FlowId,), Error = Rejection> + Clone {
    warp::header::optional::<String>(FLOW_HEADER).and_then(|raw: Option<String>| async move {
        let raw = raw.unwrap_or_else(|| FlowId::DEFAULT.to_string());
        FlowId::new(raw).map_err(|e| warp::reject::custom(InvalidFlow(e.to_string())))
    })
}

fn json_body<T>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone
where
    T: serde::de::DeserializeOwned + Send,
{
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}
