//! Nafath Core - approval handshake and visual pairing
//!
//! Two small state machines over a keyed document store:
//! - **Approval flow**: a submitted request waits for a decision; approval
//!   archives it, runs risk analysis and leaves a single-consumption result
//! - **Pairing flow**: a random colour sequence is issued and verified when a
//!   scanner submits it back
//!
//! # Example
//!
//! ```rust,ignore
//! use nafath_core::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemorySlotStore::new());
//! let approvals = ApprovalFlow::new(store, Arc::new(StaticRiskAnalyzer::new("low")));
//! let flow = FlowId::default();
//!
//! approvals.submit_request(&flow, serde_json::json!({"metadata": {"id": 1}})).await?;
//! approvals.decide(&flow, "approved").await?;
//! let result = approvals.get_approval(&flow).await?;
//! println!("{:?}", result.approval_risk);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Core modules
pub mod approval;
pub mod config;
pub mod error;
pub mod locks;
pub mod pairing;
pub mod risk;
pub mod scenario;
pub mod sequence;
pub mod service;
pub mod store;
pub mod types;

// Re-exports for convenience
pub use approval::ApprovalFlow;
pub use config::{HandshakeConfig, PairingConfig, RiskConfig, RiskProvider, StorageBackend};
pub use error::{ConfigError, HandshakeError, HandshakeResult, RiskError, ScenarioError, StoreError};
pub use pairing::PairingFlow;
pub use risk::{OpenAiRiskAnalyzer, RiskAnalyzer, StaticRiskAnalyzer};
pub use scenario::{FileScenarioCatalog, MemoryScenarioCatalog, ScenarioCatalog};
pub use service::Handshake;
pub use store::{JsonFileStore, MemorySlotStore, SlotStore};
pub use types::{
    ApprovalRequest, ApprovalResult, ApprovalState, ApprovalStatus, Color, Decision,
    DecisionOutcome, FlowId, JsonMap, SessionStatus, SessionTicket, Slot, VerifyOutcome,
    VisualSession,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the handshake flows
    pub use crate::{
        ApprovalFlow, ApprovalRequest, ApprovalResult, DecisionOutcome, FlowId, Handshake,
        HandshakeConfig, HandshakeError, MemorySlotStore, PairingFlow, RiskAnalyzer,
        StaticRiskAnalyzer, VerifyOutcome,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
