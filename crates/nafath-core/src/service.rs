//! Wiring of both flows over one store

use crate::approval::ApprovalFlow;
use crate::config::{HandshakeConfig, StorageBackend};
use crate::error::RiskError;
use crate::locks::FlowLocks;
use crate::pairing::PairingFlow;
use crate::risk::{self, RiskAnalyzer};
use crate::scenario::{FileScenarioCatalog, ScenarioCatalog};
use crate::store::{JsonFileStore, MemorySlotStore, SlotStore};
use std::sync::Arc;

/// Both state machines sharing a store and a lock table
#[derive(Debug)]
pub struct Handshake {
    /// Request approval flow
    pub approvals: ApprovalFlow,
    /// Visual pairing flow
    pub pairing: PairingFlow,
}

impl Handshake {
    /// Assemble from explicit collaborators
    #[must_use]
    pub fn new(
        config: &HandshakeConfig,
        store: Arc<dyn SlotStore>,
        scenarios: Arc<dyn ScenarioCatalog>,
        analyzer: Arc<dyn RiskAnalyzer>,
    ) -> Self {
        let locks = Arc::new(FlowLocks::new());
        Self {
            approvals: ApprovalFlow::new(store.clone(), analyzer)
                .with_scenarios(scenarios)
                .with_risk_timeout(config.risk.timeout())
                .with_locks(locks.clone()),
            pairing: PairingFlow::new(store, config.pairing.clone()).with_locks(locks),
        }
    }

    /// Assemble the collaborators `config` selects
    ///
    /// # Errors
    /// - `RiskError` if the configured analyzer cannot be built
    pub fn from_config(config: &HandshakeConfig) -> Result<Self, RiskError> {
        let store: Arc<dyn SlotStore> = match config.storage.backend {
            StorageBackend::File => Arc::new(JsonFileStore::new(&config.storage.data_dir)),
            StorageBackend::Memory => Arc::new(MemorySlotStore::new()),
        };
        let scenarios = Arc::new(FileScenarioCatalog::new(&config.storage.scenario_dir));
        let analyzer = risk::from_config(&config.risk)?;

        tracing::info!(
            backend = ?config.storage.backend,
            provider = ?config.risk.provider,
            "handshake assembled"
        );
        Ok(Self::new(config, store, scenarios, analyzer))
    }
}
