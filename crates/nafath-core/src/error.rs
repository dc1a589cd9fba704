//! Error types for the handshake core
//!
//! Provides error handling for:
//! - Slot persistence (disk I/O, malformed documents)
//! - Scenario lookups
//! - Risk-analysis collaborator calls
//! - Flow transitions (missing slots, bad decisions, missing sessions)
//! - Configuration loading

use crate::types::{ApprovalResult, FlowId, Slot};
use std::path::PathBuf;

/// Main handshake error type
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    /// Slot is absent or was already consumed
    #[error("no {0} found")]
    NotFound(&'static str),

    /// Decision status other than `approved` / `rejected`
    #[error("invalid decision: {0:?}")]
    InvalidDecision(String),

    /// Visual flow has no live session
    #[error("no active visual session")]
    NoActiveSession,

    /// Risk analysis failed or timed out; the request has already been archived
    #[error("risk analysis failed: {source}")]
    CollaboratorFailure {
        /// What the collaborator reported
        source: RiskError,
        /// `failed` result stored as the current approval
        result: Box<ApprovalResult>,
    },

    /// Submitted request payload is not a JSON object
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// Requested pairing sequence length is out of range
    #[error("invalid sequence length {requested} (max: {max})")]
    InvalidSequenceLength {
        /// Length the caller asked for
        requested: usize,
        /// Configured upper bound
        max: usize,
    },

    /// Flow identifier failed validation
    #[error("invalid flow id: {0:?}")]
    InvalidFlowId(String),

    /// Persistence failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Scenario catalog failure
    #[error("scenario error: {0}")]
    Scenario(#[from] ScenarioError),
}

impl HandshakeError {
    /// Check if the error means "nothing there yet"
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::NoActiveSession)
    }

    /// Check if the caller sent something we refuse to act on
    #[inline]
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidDecision(_)
                | Self::MalformedPayload(_)
                | Self::InvalidSequenceLength { .. }
                | Self::InvalidFlowId(_)
        )
    }

    /// Check if the risk collaborator caused the failure
    #[inline]
    #[must_use]
    pub fn is_collaborator_failure(&self) -> bool {
        matches!(self, Self::CollaboratorFailure { .. })
    }
}

/// Slot persistence errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// IO error on a slot document
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Slot document is not valid JSON
    #[error("malformed document in {flow}/{slot}: {source}")]
    Malformed {
        flow: FlowId,
        slot: Slot,
        #[source]
        source: serde_json::Error,
    },

    /// Value could not be encoded for storage
    #[error("encoding failed for {slot}: {source}")]
    Encode {
        slot: Slot,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Scenario catalog errors
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    /// Scenario name contains characters outside `[A-Za-z0-9_-]`
    #[error("invalid scenario name: {0:?}")]
    InvalidName(String),

    /// IO error reading a scenario file
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Scenario file is not a JSON object
    #[error("malformed scenario {name}: {message}")]
    Malformed { name: String, message: String },
}

/// Risk-analysis collaborator errors
#[derive(Debug, thiserror::Error)]
pub enum RiskError {
    /// API key environment variable unset
    #[error("missing api key (env var {0})")]
    MissingApiKey(String),

    /// System prompt could not be read
    #[error("io error reading prompt {path}: {source}")]
    Prompt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Transport-level failure
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success HTTP status from the reasoning service
    #[error("reasoning service returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Response did not carry a text verdict
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Call exceeded the configured bound
    #[error("timed out after {duration_secs}s")]
    Timeout { duration_secs: u64 },

    /// Analyzer-specific failure
    #[error("{0}")]
    Other(String),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO error reading config file
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML
    #[error("parse error in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Environment override could not be parsed
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
}

/// Result type alias for handshake operations
pub type HandshakeResult<T> = Result<T, HandshakeError>;
