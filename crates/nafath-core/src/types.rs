//! Core types for the handshake
//!
//! Defines the fundamental types shared by both flows:
//! - Flow identifiers and persistence slots
//! - Approval requests, decisions and results
//! - Colour codes and visual pairing sessions

use crate::error::HandshakeError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Opaque JSON object carried through the flows untouched
pub type JsonMap = serde_json::Map<String, Value>;

/// Maximum length of a flow identifier
pub const MAX_FLOW_ID_LEN: usize = 64;

/// Identifier owning one set of slots
///
/// Restricted to `[A-Za-z0-9_-]{1,64}` because it doubles as a directory
/// name in the file store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FlowId(String);

impl FlowId {
    /// Identifier used when the caller does not name a flow
    pub const DEFAULT: &'static str = "default";

    /// Validate and wrap a flow identifier
    ///
    /// # Errors
    /// - `HandshakeError::InvalidFlowId` if empty, too long, or containing
    ///   characters outside `[A-Za-z0-9_-]`
    pub fn new(id: impl Into<String>) -> Result<Self, HandshakeError> {
        let id = id.into();
        if is_safe_name(&id, MAX_FLOW_ID_LEN) {
            Ok(Self(id))
        } else {
            Err(HandshakeError::InvalidFlowId(id))
        }
    }

    /// Borrow the identifier
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for FlowId {
    fn default() -> Self {
        Self(Self::DEFAULT.to_string())
    }
}

impl FromStr for FlowId {
    type Err = HandshakeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for FlowId {
    type Error = HandshakeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<FlowId> for String {
    fn from(id: FlowId) -> Self {
        id.0
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Names usable as path components: non-empty, bounded, `[A-Za-z0-9_-]`.
pub(crate) fn is_safe_name(name: &str, max_len: usize) -> bool {
    !name.is_empty()
        && name.len() <= max_len
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// A named persisted document holding one entity's current value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    /// Request awaiting a decision
    CurrentRequest,
    /// Last request that received a decision
    PreviousRequest,
    /// Unconsumed approval result
    CurrentApproval,
    /// Last approval result handed out
    PreviousApproval,
    /// Visual pairing session
    VisualSession,
}

impl Slot {
    /// All slots, in dependency order
    pub const ALL: [Slot; 5] = [
        Slot::CurrentRequest,
        Slot::PreviousRequest,
        Slot::CurrentApproval,
        Slot::PreviousApproval,
        Slot::VisualSession,
    ];

    /// Stable name used for file stems and log fields
    #[inline]
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Slot::CurrentRequest => "current_request",
            Slot::PreviousRequest => "previous_request",
            Slot::CurrentApproval => "current_approval",
            Slot::PreviousApproval => "previous_approval",
            Slot::VisualSession => "visual_session",
        }
    }

    /// File name inside a flow directory
    #[inline]
    #[must_use]
    pub fn file_name(self) -> String {
        format!("{}.json", self.name())
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Accept any JSON for an optional map field, keeping it only if it is an object.
fn lenient_map<'de, D>(deserializer: D) -> Result<JsonMap, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Object(map) => map,
        _ => JsonMap::new(),
    })
}

/// A submitted approval request, optionally enriched from a scenario
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    /// Describes the request
    #[serde(default, deserialize_with = "lenient_map")]
    pub metadata: JsonMap,
    /// Describes the operation being approved
    #[serde(default, deserialize_with = "lenient_map")]
    pub operation_details: JsonMap,
    /// Who is asking
    #[serde(default, deserialize_with = "lenient_map")]
    pub requester_context: JsonMap,
    /// Who is approving
    #[serde(default, deserialize_with = "lenient_map")]
    pub approver_context: JsonMap,
    /// History of the user the operation targets
    #[serde(default, deserialize_with = "lenient_map")]
    pub target_user_history: JsonMap,
    /// Background-check data
    #[serde(default, deserialize_with = "lenient_map")]
    pub vetting_information: JsonMap,
    /// Any other top-level fields, stored verbatim
    #[serde(flatten)]
    pub extra: JsonMap,
}

/// A decision on the pending request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// Archive, clear, and run risk analysis
    Approved,
    /// Archive and clear without analysis
    Rejected,
}

impl FromStr for Decision {
    type Err = HandshakeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approved" => Ok(Decision::Approved),
            "rejected" => Ok(Decision::Rejected),
            other => Err(HandshakeError::InvalidDecision(other.to_string())),
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Decision::Approved => "approved",
            Decision::Rejected => "rejected",
        })
    }
}

/// Outcome class of an approval cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    /// Risk analysis produced a verdict
    Success,
    /// Risk analysis failed or timed out
    Failed,
}

/// Result of an approved decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalResult {
    /// Whether analysis succeeded
    pub status: ApprovalStatus,
    /// Verdict text from the risk collaborator
    #[serde(default, alias = "approval_risk", skip_serializing_if = "Option::is_none")]
    pub approval_risk: Option<String>,
    /// Failure description when `status` is `failed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the decision was recorded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
}

impl ApprovalResult {
    /// Successful analysis
    #[must_use]
    pub fn success(verdict: impl Into<String>) -> Self {
        Self {
            status: ApprovalStatus::Success,
            approval_risk: Some(verdict.into()),
            error: None,
            decided_at: Some(Utc::now()),
        }
    }

    /// Failed analysis
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: ApprovalStatus::Failed,
            approval_risk: None,
            error: Some(error.into()),
            decided_at: Some(Utc::now()),
        }
    }

    /// Check if the verdict is present
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == ApprovalStatus::Success
    }
}

/// What `decide` produced
#[derive(Debug, Clone, PartialEq)]
pub enum DecisionOutcome {
    /// Analysis ran and its result is stored as the current approval
    Approved(ApprovalResult),
    /// Request was dropped; `archived` tells whether one was pending
    Rejected {
        /// A pending request existed and was archived
        archived: bool,
    },
}

/// Where a flow's request cycle currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalState {
    /// Nothing pending, nothing to consume
    Empty,
    /// A request awaits a decision
    Pending,
    /// An approval result awaits its consumer
    Approved,
}

/// Colour code in a pairing sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Color {
    /// R
    #[serde(rename = "R")]
    Red,
    /// G
    #[serde(rename = "G")]
    Green,
    /// B
    #[serde(rename = "B")]
    Blue,
    /// Y
    #[serde(rename = "Y")]
    Yellow,
    /// C
    #[serde(rename = "C")]
    Cyan,
    /// M
    #[serde(rename = "M")]
    Magenta,
}

impl Color {
    /// The alphabet sequences are drawn from
    pub const ALPHABET: [Color; 6] = [
        Color::Red,
        Color::Green,
        Color::Blue,
        Color::Yellow,
        Color::Cyan,
        Color::Magenta,
    ];

    /// Single-letter code
    #[inline]
    #[must_use]
    pub fn code(self) -> char {
        match self {
            Color::Red => 'R',
            Color::Green => 'G',
            Color::Blue => 'B',
            Color::Yellow => 'Y',
            Color::Cyan => 'C',
            Color::Magenta => 'M',
        }
    }

    /// Parse a single-letter code (case-insensitive)
    #[must_use]
    pub fn from_code(code: char) -> Option<Self> {
        Self::ALPHABET
            .into_iter()
            .find(|c| c.code() == code.to_ascii_uppercase())
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Persisted visual pairing session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualSession {
    /// Expected colour sequence
    pub sequence: Vec<Color>,
    /// Display form, codes joined with `-`
    pub sequence_string: String,
    /// When the session was issued
    pub created_at: DateTime<Utc>,
    /// Whether a matching sequence was submitted
    pub verified: bool,
    /// First successful verification
    #[serde(default)]
    pub verified_at: Option<DateTime<Utc>>,
}

impl VisualSession {
    /// Fresh, unverified session for `sequence`
    #[must_use]
    pub fn new(sequence: Vec<Color>) -> Self {
        Self {
            sequence_string: crate::sequence::display_string(&sequence),
            sequence,
            created_at: Utc::now(),
            verified: false,
            verified_at: None,
        }
    }

    /// Concatenated codes, the form candidates are compared against
    #[must_use]
    pub fn expected(&self) -> String {
        crate::sequence::concat(&self.sequence)
    }

    /// Issued-sequence view handed to display clients
    #[must_use]
    pub fn ticket(&self) -> SessionTicket {
        SessionTicket {
            sequence: self.sequence.clone(),
            sequence_string: self.sequence_string.clone(),
        }
    }

    /// Verification view
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            verified: self.verified,
            verified_at: self.verified_at,
        }
    }
}

/// Sequence returned when a session is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTicket {
    /// Colour codes
    pub sequence: Vec<Color>,
    /// Display form
    pub sequence_string: String,
}

/// Verification state of the current session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    /// Whether a matching sequence was submitted
    pub verified: bool,
    /// First successful verification
    pub verified_at: Option<DateTime<Utc>>,
}

/// Result of a verification attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOutcome {
    /// Candidate matched
    pub success: bool,
    /// Whether this attempt verified the session
    pub verified: bool,
    /// Human-readable summary
    pub message: String,
    /// Expected sequence, disclosed on mismatch when enabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    /// Normalized candidate
    pub received: String,
    /// Verification time on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
}
