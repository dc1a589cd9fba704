//! Predefined scenarios
//!
//! A scenario is a named bundle of context blocks merged into a submitted
//! request to simulate richer backend data.

use crate::error::ScenarioError;
use crate::types::{is_safe_name, ApprovalRequest, JsonMap};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Maximum length of a scenario name
pub const MAX_SCENARIO_NAME_LEN: usize = 64;

/// Lookup of scenario bundles by name
#[async_trait]
pub trait ScenarioCatalog: Send + Sync {
    /// Scenario document, or `None` if no such scenario exists
    async fn load(&self, name: &str) -> Result<Option<JsonMap>, ScenarioError>;
}

/// Merge scenario context blocks into a request.
///
/// The request keeps its own `metadata` and `operationDetails`; each of the
/// four context blocks is taken from the scenario when the scenario has it
/// as an object, otherwise the request's own block is kept.
pub fn merge(request: &mut ApprovalRequest, scenario: &JsonMap) {
    let blocks: [(&str, &mut JsonMap); 4] = [
        ("requesterContext", &mut request.requester_context),
        ("approverContext", &mut request.approver_context),
        ("targetUserHistory", &mut request.target_user_history),
        ("vettingInformation", &mut request.vetting_information),
    ];
    for (key, block) in blocks {
        if let Some(Value::Object(map)) = scenario.get(key) {
            block.clone_from(map);
        }
    }
}

/// Scenarios stored as `<dir>/<name>.json`
#[derive(Debug, Clone)]
pub struct FileScenarioCatalog {
    dir: PathBuf,
}

impl FileScenarioCatalog {
    /// Create catalog reading from `dir`
    #[inline]
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory scenarios are read from
    #[inline]
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ScenarioCatalog for FileScenarioCatalog {
    async fn load(&self, name: &str) -> Result<Option<JsonMap>, ScenarioError> {
        if !is_safe_name(name, MAX_SCENARIO_NAME_LEN) {
            return Err(ScenarioError::InvalidName(name.to_string()));
        }

        let path = self.dir.join(format!("{name}.json"));
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(ScenarioError::Io { path, source }),
        };

        match serde_json::from_slice::<Value>(&raw) {
            Ok(Value::Object(map)) => Ok(Some(map)),
            Ok(_) => Err(ScenarioError::Malformed {
                name: name.to_string(),
                message: "expected a JSON object".to_string(),
            }),
            Err(e) => Err(ScenarioError::Malformed {
                name: name.to_string(),
                message: e.to_string(),
            }),
        }
    }
}

/// In-process catalog
#[derive(Debug, Default)]
pub struct MemoryScenarioCatalog {
    scenarios: DashMap<String, JsonMap>,
}

impl MemoryScenarioCatalog {
    /// Create empty catalog
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a scenario, replacing any previous one with the same name
    pub fn insert(&self, name: impl Into<String>, scenario: JsonMap) {
        self.scenarios.insert(name.into(), scenario);
    }

    /// With scenario
    #[must_use]
    pub fn with(self, name: impl Into<String>, scenario: JsonMap) -> Self {
        self.insert(name, scenario);
        self
    }
}

#[async_trait]
impl ScenarioCatalog for MemoryScenarioCatalog {
    async fn load(&self, name: &str) -> Result<Option<JsonMap>, ScenarioError> {
        Ok(self.scenarios.get(name).map(|entry| entry.value().clone()))
    }
}
