//! Testing utilities for the Nafath workspace
//!
//! Shared fakes, fixtures, and setup helpers.

#![allow(missing_docs)]

use async_trait::async_trait;
use nafath_core::{
    ApprovalFlow, FlowId, JsonMap, MemoryScenarioCatalog, MemorySlotStore, PairingConfig,
    PairingFlow, RiskAnalyzer, RiskError, Slot, SlotStore, StoreError,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Analyzer returning a fixed verdict and remembering every input
#[derive(Debug, Default)]
pub struct RecordingRiskAnalyzer {
    verdict: String,
    calls: Mutex<Vec<String>>,
}

impl RecordingRiskAnalyzer {
    pub fn new(verdict: impl Into<String>) -> Self {
        Self {
            verdict: verdict.into(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Inputs received so far, oldest first
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl RiskAnalyzer for RecordingRiskAnalyzer {
    async fn analyze(&self, request: &str) -> Result<String, RiskError> {
        self.calls.lock().unwrap().push(request.to_string());
        Ok(self.verdict.clone())
    }
}

/// Analyzer that always fails
#[derive(Debug, Clone)]
pub struct FailingRiskAnalyzer(pub String);

#[async_trait]
impl RiskAnalyzer for FailingRiskAnalyzer {
    async fn analyze(&self, _request: &str) -> Result<String, RiskError> {
        Err(RiskError::Other(self.0.clone()))
    }
}

/// Analyzer that answers only after `delay`
#[derive(Debug, Clone)]
pub struct StallingRiskAnalyzer(pub Duration);

#[async_trait]
impl RiskAnalyzer for StallingRiskAnalyzer {
    async fn analyze(&self, _request: &str) -> Result<String, RiskError> {
        tokio::time::sleep(self.0).await;
        Ok("too late".to_string())
    }
}

/// Memory store whose `clear` of one slot takes `delay`
#[derive(Debug)]
pub struct SlowClearStore {
    inner: MemorySlotStore,
    slot: Slot,
    delay: Duration,
}

impl SlowClearStore {
    pub fn new(slot: Slot, delay: Duration) -> Self {
        Self {
            inner: MemorySlotStore::new(),
            slot,
            delay,
        }
    }
}

#[async_trait]
impl SlotStore for SlowClearStore {
    async fn read(&self, flow: &FlowId, slot: Slot) -> Result<Option<Value>, StoreError> {
        self.inner.read(flow, slot).await
    }

    async fn write(&self, flow: &FlowId, slot: Slot, document: &Value) -> Result<(), StoreError> {
        self.inner.write(flow, slot, document).await
    }

    async fn clear(&self, flow: &FlowId, slot: Slot) -> Result<(), StoreError> {
        if slot == self.slot {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.clear(flow, slot).await
    }
}

/// Unwrap a JSON object literal
pub fn as_map(value: Value) -> JsonMap {
    match value {
        Value::Object(map) => map,
        other => panic!("expected JSON object, got {other}"),
    }
}

/// The request used throughout the scenario tests
pub fn sample_request() -> Value {
    json!({"metadata": {"id": 1}, "operationDetails": {"op": "x"}})
}

/// Catalog holding `safe` (`requesterContext.trust == "high"`) and `risky`
pub fn sample_catalog() -> MemoryScenarioCatalog {
    MemoryScenarioCatalog::new()
        .with(
            "safe",
            as_map(json!({"requesterContext": {"trust": "high"}})),
        )
        .with(
            "risky",
            as_map(json!({
                "requesterContext": {"trust": "low"},
                "approverContext": {"role": "guardian"},
                "targetUserHistory": {"recentDevices": 5},
                "vettingInformation": {"watchlist": true}
            })),
        )
}

/// Approval flow over a fresh memory store, with the sample catalog
pub fn setup_approvals(analyzer: Arc<dyn RiskAnalyzer>) -> (ApprovalFlow, Arc<MemorySlotStore>) {
    let store = Arc::new(MemorySlotStore::new());
    let flow = ApprovalFlow::new(store.clone(), analyzer).with_scenarios(Arc::new(sample_catalog()));
    (flow, store)
}

/// Pairing flow over a fresh memory store
pub fn setup_pairing(config: PairingConfig) -> (PairingFlow, Arc<MemorySlotStore>) {
    let store = Arc::new(MemorySlotStore::new());
    (PairingFlow::new(store.clone(), config), store)
}
