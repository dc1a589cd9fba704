//! Handshake configuration
//!
//! Layered: built-in defaults, then an optional TOML file, then `NAFATH_*`
//! environment variables. The binary applies CLI flags last.

use crate::error::ConfigError;
use crate::sequence::DEFAULT_SEQUENCE_LENGTH;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandshakeConfig {
    /// HTTP listener
    pub server: ServerConfig,
    /// Slot and scenario storage
    pub storage: StorageConfig,
    /// Risk-analysis collaborator
    pub risk: RiskConfig,
    /// Visual pairing
    pub pairing: PairingConfig,
}

impl HandshakeConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from an optional TOML file, then apply process environment overrides
    ///
    /// # Errors
    /// - `ConfigError::Io` / `ConfigError::Parse` for an unreadable file
    /// - `ConfigError::InvalidValue` for an unparsable override
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.with_env(|key| std::env::var(key).ok())
    }

    /// Parse a TOML file; missing keys keep their defaults
    ///
    /// # Errors
    /// - `ConfigError::Io` if the file cannot be read
    /// - `ConfigError::Parse` if it is not valid TOML
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `NAFATH_*` overrides read through `lookup`
    ///
    /// # Errors
    /// - `ConfigError::InvalidValue` if a variable is set to something unparsable
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("NAFATH_BIND") {
            self.server.bind = v;
        }
        if let Some(v) = lookup("NAFATH_STORAGE_BACKEND") {
            self.storage.backend = match v.trim().to_ascii_lowercase().as_str() {
                "file" => StorageBackend::File,
                "memory" => StorageBackend::Memory,
                _ => return Err(invalid("NAFATH_STORAGE_BACKEND", v)),
            };
        }
        if let Some(v) = lookup("NAFATH_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("NAFATH_SCENARIO_DIR") {
            self.storage.scenario_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("NAFATH_RISK_PROVIDER") {
            self.risk.provider = match v.trim().to_ascii_lowercase().as_str() {
                "openai" => RiskProvider::OpenAi,
                "static" => RiskProvider::Static,
                _ => return Err(invalid("NAFATH_RISK_PROVIDER", v)),
            };
        }
        if let Some(v) = lookup("NAFATH_RISK_API_BASE") {
            self.risk.api_base = v;
        }
        if let Some(v) = lookup("NAFATH_RISK_MODEL") {
            self.risk.model = v;
        }
        if let Some(v) = lookup("NAFATH_PROMPT_PATH") {
            self.risk.prompt_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("NAFATH_RISK_TIMEOUT_SECS") {
            self.risk.timeout_secs = parse_num("NAFATH_RISK_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("NAFATH_SEQUENCE_LENGTH") {
            self.pairing.sequence_length = parse_num("NAFATH_SEQUENCE_LENGTH", &v)?;
        }
        if let Some(v) = lookup("NAFATH_ACCEPT_ROTATIONS") {
            self.pairing.accept_rotations = parse_flag("NAFATH_ACCEPT_ROTATIONS", &v)?;
        }
        if let Some(v) = lookup("NAFATH_DISCLOSE_EXPECTED") {
            self.pairing.disclose_expected = parse_flag("NAFATH_DISCLOSE_EXPECTED", &v)?;
        }
        if let Some(v) = lookup("NAFATH_SESSION_TTL_SECS") {
            self.pairing.session_ttl_secs = Some(parse_num("NAFATH_SESSION_TTL_SECS", &v)?);
        }
        Ok(self)
    }
}

fn invalid(key: &str, value: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.into(),
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| invalid(key, value))
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

/// HTTP listener configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to bind
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8002".to_string(),
        }
    }
}

/// Which slot store backs the flows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// JSON documents under `data_dir`
    File,
    /// Process memory; lost on exit
    Memory,
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Store implementation
    pub backend: StorageBackend,
    /// Root of per-flow slot directories
    pub data_dir: PathBuf,
    /// Directory holding `<scenario>.json` files
    pub scenario_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            data_dir: PathBuf::from("data"),
            scenario_dir: PathBuf::from("predefined"),
        }
    }
}

/// Which analyzer scores approved requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskProvider {
    /// OpenAI Responses API
    #[serde(rename = "openai")]
    OpenAi,
    /// Fixed verdict, no network
    Static,
}

/// Risk-analysis configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Analyzer implementation
    pub provider: RiskProvider,
    /// Base URL of the reasoning service
    pub api_base: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    /// Model name
    pub model: String,
    /// Reasoning effort hint
    pub reasoning_effort: String,
    /// System prompt file
    pub prompt_path: PathBuf,
    /// Upper bound on one analysis call
    pub timeout_secs: u64,
    /// Verdict returned by the static provider
    pub static_verdict: String,
}

impl RiskConfig {
    /// Timeout as a `Duration`
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            provider: RiskProvider::OpenAi,
            api_base: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            model: "o3".to_string(),
            reasoning_effort: "medium".to_string(),
            prompt_path: PathBuf::from("prompt.txt"),
            timeout_secs: 120,
            static_verdict: "Risk level: LOW".to_string(),
        }
    }
}

/// Visual pairing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PairingConfig {
    /// Colours per sequence when the caller does not ask for a length
    pub sequence_length: usize,
    /// Largest length a caller may request
    pub max_sequence_length: usize,
    /// Accept any cyclic rotation of the sequence
    pub accept_rotations: bool,
    /// Include the expected sequence in mismatch responses
    pub disclose_expected: bool,
    /// Sessions older than this are treated as absent
    pub session_ttl_secs: Option<u64>,
}

impl PairingConfig {
    /// Session TTL as a `Duration`
    #[inline]
    #[must_use]
    pub fn session_ttl(&self) -> Option<Duration> {
        self.session_ttl_secs.map(Duration::from_secs)
    }
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            sequence_length: DEFAULT_SEQUENCE_LENGTH,
            max_sequence_length: 16,
            accept_rotations: false,
            disclose_expected: true,
            session_ttl_secs: None,
        }
    }
}
