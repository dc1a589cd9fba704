//! Request approval flow
//!
//! Moves a flow's request through `Empty → Pending → Approved | Rejected`:
//! - `submit_request` stores the pending request (optionally enriched from a scenario)
//! - `decide` archives and clears it, running risk analysis on approval
//! - `get_approval` hands out the approval result exactly once

use crate::error::{HandshakeError, HandshakeResult, RiskError};
use crate::locks::FlowLocks;
use crate::risk::RiskAnalyzer;
use crate::scenario::{self, ScenarioCatalog};
use crate::store::{self, SlotStore};
use crate::types::{
    ApprovalRequest, ApprovalResult, ApprovalState, Decision, DecisionOutcome, FlowId, Slot,
};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default upper bound on one risk-analysis call
pub const DEFAULT_RISK_TIMEOUT: Duration = Duration::from_secs(120);

/// Approval state machine over a slot store
pub struct ApprovalFlow {
    store: Arc<dyn SlotStore>,
    scenarios: Option<Arc<dyn ScenarioCatalog>>,
    analyzer: Arc<dyn RiskAnalyzer>,
    locks: Arc<FlowLocks>,
    risk_timeout: Duration,
}

impl ApprovalFlow {
    /// Create flow without scenario enrichment
    #[must_use]
    pub fn new(store: Arc<dyn SlotStore>, analyzer: Arc<dyn RiskAnalyzer>) -> Self {
        Self {
            store,
            scenarios: None,
            analyzer,
            locks: Arc::new(FlowLocks::new()),
            risk_timeout: DEFAULT_RISK_TIMEOUT,
        }
    }

    /// With scenario catalog
    #[inline]
    #[must_use]
    pub fn with_scenarios(mut self, scenarios: Arc<dyn ScenarioCatalog>) -> Self {
        self.scenarios = Some(scenarios);
        self
    }

    /// With risk-analysis timeout
    #[inline]
    #[must_use]
    pub fn with_risk_timeout(mut self, timeout: Duration) -> Self {
        self.risk_timeout = timeout;
        self
    }

    /// Share a lock table with other flows over the same store
    #[inline]
    #[must_use]
    pub fn with_locks(mut self, locks: Arc<FlowLocks>) -> Self {
        self.locks = locks;
        self
    }

    /// Store a new pending request, replacing any existing one
    ///
    /// A string `scenario` field names a predefined scenario whose context
    /// blocks are merged in; unknown scenarios are logged and skipped.
    ///
    /// # Errors
    /// - `HandshakeError::MalformedPayload` if `payload` is not a JSON object
    /// - `HandshakeError::Scenario` if the scenario file is unreadable
    /// - `HandshakeError::Store` on persistence failure
    pub async fn submit_request(
        &self,
        flow: &FlowId,
        payload: Value,
    ) -> HandshakeResult<ApprovalRequest> {
        let Value::Object(mut fields) = payload else {
            return Err(HandshakeError::MalformedPayload(
                "request body must be a JSON object".to_string(),
            ));
        };

        let scenario_name = match fields.remove("scenario") {
            Some(Value::String(name)) => Some(name),
            Some(Value::Null) | None => None,
            Some(other) => {
                tracing::warn!(flow = %flow, value = %other, "ignoring non-string scenario");
                None
            }
        };

        let mut request: ApprovalRequest = serde_json::from_value(Value::Object(fields))
            .map_err(|e| HandshakeError::MalformedPayload(e.to_string()))?;

        if let Some(name) = scenario_name.as_deref() {
            self.enrich(flow, &mut request, name).await?;
        }

        let _guard = self.locks.lock(flow).await;
        store::save(self.store.as_ref(), flow, Slot::CurrentRequest, &request).await?;
        tracing::info!(flow = %flow, scenario = ?scenario_name, "request stored");
        Ok(request)
    }

    async fn enrich(
        &self,
        flow: &FlowId,
        request: &mut ApprovalRequest,
        name: &str,
    ) -> HandshakeResult<()> {
        let Some(catalog) = &self.scenarios else {
            tracing::warn!(flow = %flow, scenario = name, "no scenario catalog configured");
            return Ok(());
        };

        match catalog.load(name).await {
            Ok(Some(bundle)) => {
                scenario::merge(request, &bundle);
                tracing::debug!(flow = %flow, scenario = name, "scenario merged");
            }
            Ok(None) => {
                tracing::warn!(flow = %flow, scenario = name, "unknown scenario");
            }
            Err(crate::error::ScenarioError::InvalidName(_)) => {
                tracing::warn!(flow = %flow, scenario = name, "invalid scenario name");
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Pending request
    ///
    /// # Errors
    /// - `HandshakeError::NotFound` if no request is pending
    pub async fn get_request(&self, flow: &FlowId) -> HandshakeResult<ApprovalRequest> {
        store::load(self.store.as_ref(), flow, Slot::CurrentRequest)
            .await?
            .ok_or(HandshakeError::NotFound("request"))
    }

    /// Last request that received a decision
    ///
    /// # Errors
    /// - `HandshakeError::NotFound` if nothing was archived
    pub async fn previous_request(&self, flow: &FlowId) -> HandshakeResult<ApprovalRequest> {
        store::load(self.store.as_ref(), flow, Slot::PreviousRequest)
            .await?
            .ok_or(HandshakeError::NotFound("previous request"))
    }

    /// Apply a decision given as its wire string
    ///
    /// # Errors
    /// - `HandshakeError::InvalidDecision` for anything but `approved` / `rejected`;
    ///   no slot is touched
    /// - `HandshakeError::CollaboratorFailure` if risk analysis fails or times out;
    ///   the request is already archived and a `failed` result is stored
    /// - `HandshakeError::Store` on persistence failure
    pub async fn decide(&self, flow: &FlowId, status: &str) -> HandshakeResult<DecisionOutcome> {
        match status.parse::<Decision>()? {
            Decision::Approved => self.approve(flow).await,
            Decision::Rejected => self.reject(flow).await,
        }
    }

    async fn approve(&self, flow: &FlowId) -> HandshakeResult<DecisionOutcome> {
        let archived = {
            let _guard = self.locks.lock(flow).await;
            store::archive(
                self.store.as_ref(),
                flow,
                Slot::CurrentRequest,
                Slot::PreviousRequest,
            )
            .await?
        };

        tracing::info!(
            flow = %flow,
            had_request = archived.is_some(),
            "request approved, running risk analysis"
        );

        let input = archived.map_or_else(|| "{}".to_string(), |doc| doc.to_string());
        let analysis = match tokio::time::timeout(self.risk_timeout, self.analyzer.analyze(&input))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(RiskError::Timeout {
                duration_secs: self.risk_timeout.as_secs(),
            }),
        };

        match analysis {
            Ok(verdict) => {
                let result = ApprovalResult::success(verdict);
                store::save(self.store.as_ref(), flow, Slot::CurrentApproval, &result).await?;
                tracing::info!(flow = %flow, "approval result stored");
                Ok(DecisionOutcome::Approved(result))
            }
            Err(e) => {
                tracing::warn!(flow = %flow, error = %e, "risk analysis failed");
                let result = ApprovalResult::failed(e.to_string());
                store::save(self.store.as_ref(), flow, Slot::CurrentApproval, &result).await?;
                Err(HandshakeError::CollaboratorFailure {
                    source: e,
                    result: Box::new(result),
                })
            }
        }
    }

    async fn reject(&self, flow: &FlowId) -> HandshakeResult<DecisionOutcome> {
        let _guard = self.locks.lock(flow).await;
        let archived = if self.store.read(flow, Slot::CurrentRequest).await?.is_some() {
            store::archive(
                self.store.as_ref(),
                flow,
                Slot::CurrentRequest,
                Slot::PreviousRequest,
            )
            .await?;
            true
        } else {
            false
        };

        tracing::info!(flow = %flow, archived, "request rejected");
        Ok(DecisionOutcome::Rejected { archived })
    }

    /// Hand out the approval result, archiving and clearing it
    ///
    /// # Errors
    /// - `HandshakeError::NotFound` if there is no unconsumed result
    pub async fn get_approval(&self, flow: &FlowId) -> HandshakeResult<ApprovalResult> {
        let _guard = self.locks.lock(flow).await;
        let result: ApprovalResult = store::load(self.store.as_ref(), flow, Slot::CurrentApproval)
            .await?
            .ok_or(HandshakeError::NotFound("approval"))?;

        store::archive(
            self.store.as_ref(),
            flow,
            Slot::CurrentApproval,
            Slot::PreviousApproval,
        )
        .await?;

        tracing::info!(flow = %flow, status = ?result.status, "approval consumed");
        Ok(result)
    }

    /// Last approval result handed out
    ///
    /// # Errors
    /// - `HandshakeError::NotFound` if none was consumed yet
    pub async fn previous_approval(&self, flow: &FlowId) -> HandshakeResult<ApprovalResult> {
        store::load(self.store.as_ref(), flow, Slot::PreviousApproval)
            .await?
            .ok_or(HandshakeError::NotFound("previous approval"))
    }

    /// Where the flow's cycle stands
    ///
    /// # Errors
    /// - `HandshakeError::Store` on persistence failure
    pub async fn state(&self, flow: &FlowId) -> HandshakeResult<ApprovalState> {
        if self.store.read(flow, Slot::CurrentApproval).await?.is_some() {
            Ok(ApprovalState::Approved)
        } else if self.store.read(flow, Slot::CurrentRequest).await?.is_some() {
            Ok(ApprovalState::Pending)
        } else {
            Ok(ApprovalState::Empty)
        }
    }
}

impl fmt::Debug for ApprovalFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApprovalFlow")
            .field("scenarios", &self.scenarios.is_some())
            .field("risk_timeout", &self.risk_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::MockRiskAnalyzer;
    use crate::store::MemorySlotStore;
    use serde_json::json;

    fn flow_with(analyzer: MockRiskAnalyzer) -> (ApprovalFlow, Arc<MemorySlotStore>) {
        let store = Arc::new(MemorySlotStore::new());
        let flow = ApprovalFlow::new(store.clone(), Arc::new(analyzer));
        (flow, store)
    }

    #[tokio::test]
    async fn approve_sends_archived_request_to_analyzer() {
        let mut analyzer = MockRiskAnalyzer::new();
        analyzer
            .expect_analyze()
            .withf(|input: &str| {
                let doc: Value = serde_json::from_str(input).unwrap();
                doc["metadata"]["id"] == json!(1)
            })
            .times(1)
            .returning(|_| Ok("Risk level: LOW".to_string()));
        let (flow, store) = flow_with(analyzer);
        let id = FlowId::default();

        flow.submit_request(&id, json!({"metadata": {"id": 1}}))
            .await
            .unwrap();
        let outcome = flow.decide(&id, "approved").await.unwrap();

        match outcome {
            DecisionOutcome::Approved(result) => {
                assert_eq!(result.approval_risk.as_deref(), Some("Risk level: LOW"));
            }
            other => panic!("expected approval, got {other:?}"),
        }
        assert!(store.read(&id, Slot::CurrentRequest).await.unwrap().is_none());
        assert!(store.read(&id, Slot::PreviousRequest).await.unwrap().is_some());
        assert_eq!(flow.state(&id).await.unwrap(), ApprovalState::Approved);
    }

    #[tokio::test]
    async fn approve_without_request_analyzes_empty_document() {
        let mut analyzer = MockRiskAnalyzer::new();
        analyzer
            .expect_analyze()
            .withf(|input: &str| input == "{}")
            .times(1)
            .returning(|_| Ok("nothing to assess".to_string()));
        let (flow, _store) = flow_with(analyzer);

        let outcome = flow.decide(&FlowId::default(), "approved").await;
        assert!(outcome.is_ok());
    }

    #[tokio::test]
    async fn reject_never_calls_analyzer() {
        let mut analyzer = MockRiskAnalyzer::new();
        analyzer.expect_analyze().times(0);
        let (flow, store) = flow_with(analyzer);
        let id = FlowId::default();

        flow.submit_request(&id, json!({"metadata": {}})).await.unwrap();
        let outcome = flow.decide(&id, "rejected").await.unwrap();

        assert_eq!(outcome, DecisionOutcome::Rejected { archived: true });
        assert!(store.read(&id, Slot::CurrentApproval).await.unwrap().is_none());
        assert_eq!(flow.state(&id).await.unwrap(), ApprovalState::Empty);
    }

    #[tokio::test]
    async fn analyzer_error_stores_failed_result() {
        let mut analyzer = MockRiskAnalyzer::new();
        analyzer
            .expect_analyze()
            .returning(|_| Err(RiskError::Other("service unavailable".to_string())));
        let (flow, _store) = flow_with(analyzer);
        let id = FlowId::default();

        flow.submit_request(&id, json!({"metadata": {}})).await.unwrap();
        let err = flow.decide(&id, "approved").await.unwrap_err();
        assert!(err.is_collaborator_failure());
        let HandshakeError::CollaboratorFailure { result: reported, .. } = err else {
            panic!("expected collaborator failure");
        };

        // The request is gone; the consumer learns the cycle failed.
        assert!(flow.get_request(&id).await.unwrap_err().is_not_found());
        let result = flow.get_approval(&id).await.unwrap();
        assert!(!result.is_success());
        assert_eq!(result, *reported);
        assert_eq!(result.error.as_deref(), Some("service unavailable"));
    }

    #[tokio::test]
    async fn invalid_decision_is_rejected_before_any_io() {
        let mut analyzer = MockRiskAnalyzer::new();
        analyzer.expect_analyze().times(0);
        let (flow, store) = flow_with(analyzer);

        let err = flow
            .decide(&FlowId::default(), "maybe")
            .await
            .unwrap_err();
        assert!(matches!(err, HandshakeError::InvalidDecision(ref s) if s == "maybe"));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn non_object_payload_is_malformed() {
        let (flow, store) = flow_with(MockRiskAnalyzer::new());
        let err = flow
            .submit_request(&FlowId::default(), json!([1, 2, 3]))
            .await
            .unwrap_err();
        assert!(matches!(err, HandshakeError::MalformedPayload(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn scenario_without_catalog_is_ignored() {
        let (flow, _store) = flow_with(MockRiskAnalyzer::new());
        let id = FlowId::default();
        let request = flow
            .submit_request(&id, json!({"metadata": {"id": 2}, "scenario": "safe"}))
            .await
            .unwrap();
        assert!(request.requester_context.is_empty());
        assert!(!request.extra.contains_key("scenario"));
    }
}
