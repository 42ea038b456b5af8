//! Coordinator configuration, loaded from TOML.
//!
//! Every section and field is optional; missing values fall back to
//! [`Config::default`].
//!
//! ```toml
//! [server]
//! listen_addr = "0.0.0.0:5000"
//!
//! [workers]
//! host = "127.0.0.1"
//! base_port = 5001
//! connect_attempts = 3
//!
//! [solver]
//! partition = "striped"
//! max_size = 20000
//!
//! [logging]
//! level = "debug"
//! format = "json"
//! ```

use std::path::Path;
use std::time::Duration;

use gauss_link::ManagerConfig;
use gauss_solver::{PartitionPolicy, SolverConfig, PIVOT_TOLERANCE};
use gauss_types::MAX_DIMENSION;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServerError};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub workers: WorkersConfig,
    pub solver: SolverSection,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:5000".to_string(),
        }
    }
}

/// Where worker nodes live and how hard to try reaching them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub host: String,
    /// Node `i` of a pool listens on `base_port + i`.
    pub base_port: u16,
    /// Fixed worker addresses; when non-empty they replace host/port derivation.
    pub endpoints: Vec<String>,
    pub connect_attempts: usize,
    pub connect_delay_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            base_port: 5001,
            endpoints: Vec::new(),
            connect_attempts: 3,
            connect_delay_ms: 100,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSection {
    pub partition: PartitionPolicy,
    pub pivot_tolerance: f64,
    /// Largest system a client may submit.
    pub max_size: usize,
}

impl Default for SolverSection {
    fn default() -> Self {
        Self {
            partition: PartitionPolicy::Contiguous,
            pivot_tolerance: PIVOT_TOLERANCE,
            max_size: 50_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl Config {
    /// Loads and validates a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        tracing::info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Like [`Config::load`], but an absent file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.listen_addr.trim().is_empty() {
            return Err(ServerError::Config("server.listen_addr must not be empty".into()));
        }
        if self.workers.connect_attempts == 0 {
            return Err(ServerError::Config(
                "workers.connect_attempts must be at least 1".into(),
            ));
        }
        if self.workers.request_timeout_secs == 0 {
            return Err(ServerError::Config(
                "workers.request_timeout_secs must be at least 1".into(),
            ));
        }
        if !(self.solver.pivot_tolerance > 0.0) {
            return Err(ServerError::Config(
                "solver.pivot_tolerance must be positive".into(),
            ));
        }
        if self.solver.max_size == 0 || self.solver.max_size > MAX_DIMENSION {
            return Err(ServerError::Config(format!(
                "solver.max_size must be between 1 and {MAX_DIMENSION}"
            )));
        }
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ServerError::Config(
                    "logging.level must be one of: trace, debug, info, warn, error".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            connect_attempts: self.workers.connect_attempts,
            connect_delay: Duration::from_millis(self.workers.connect_delay_ms),
            request_timeout: Duration::from_secs(self.workers.request_timeout_secs),
        }
    }

    pub fn solver_config(&self) -> SolverConfig {
        SolverConfig {
            partition: self.solver.partition,
            pivot_tolerance: self.solver.pivot_tolerance,
        }
    }

    /// Addresses for a pool of `node_count` workers: the configured
    /// endpoints if any, otherwise consecutive ports on `workers.host`.
    pub fn worker_endpoints(&self, node_count: usize) -> Vec<String> {
        if !self.workers.endpoints.is_empty() {
            return self.workers.endpoints.iter().take(node_count).cloned().collect();
        }
        (0..node_count)
            .filter_map(|i| {
                let port = u16::try_from(i).ok()?.checked_add(self.workers.base_port)?;
                Some(format!("{}:{port}", self.workers.host))
            })
            .collect()
    }
}
