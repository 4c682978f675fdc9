//! Runtime configuration.
//!
//! Values come from three layers, later ones winning:
//! 1. Built-in defaults
//! 2. An optional configuration file (TOML, YAML or JSON by extension)
//! 3. Environment variables prefixed with `FLOWSTATE__`, using `__` between
//!    sections, e.g. `FLOWSTATE__ENGINE__ACTION_TIMEOUT_MS=2000`
//!
//! Durations are expressed in milliseconds.

use crate::enforcement::CallPolicy;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FlowstateConfig {
    pub engine: EngineConfig,
    pub payments: PaymentConfig,
    pub collaborators: CollaboratorConfig,
    pub broker: BrokerConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound for each action handler call
    pub action_timeout_ms: u64,
}

impl EngineConfig {
    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            action_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PaymentConfig {
    /// Capture attempts allowed per order before it is cancelled
    pub max_payment_attempts: u32,
    pub currency: String,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            max_payment_attempts: 3,
            currency: "USD".to_string(),
        }
    }
}

/// Timeout and retry budget for calls to external collaborators.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CollaboratorConfig {
    pub timeout_ms: u64,
    pub max_attempts: usize,
    /// First retry delay; doubles on each further retry
    pub backoff_ms: u64,
}

impl CollaboratorConfig {
    pub fn call_policy(&self) -> CallPolicy {
        CallPolicy::builder()
            .timeout(Duration::from_millis(self.timeout_ms))
            .max_attempts(self.max_attempts)
            .backoff(Duration::from_millis(self.backoff_ms))
            .build()
    }
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 1000,
            max_attempts: 3,
            backoff_ms: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Deliveries of one message before it is dead-lettered
    pub max_deliveries: u32,
    pub partitions: usize,
    /// First redelivery delay; doubles on each further redelivery
    pub backoff_ms: u64,
    /// Buffered messages per partition
    pub channel_capacity: usize,
}

impl BrokerConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            max_deliveries: 5,
            partitions: 4,
            backoff_ms: 25,
            channel_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
    /// Emit JSON lines instead of human readable output
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

impl FlowstateConfig {
    /// Load configuration from defaults, an optional file and the
    /// environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("FLOWSTATE")
                .separator("__")
                .try_parsing(true),
        );

        let config: FlowstateConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems: Vec<String> = Vec::new();
        if self.engine.action_timeout_ms == 0 {
            problems.push("engine.action_timeout_ms must be positive".into());
        }
        if self.payments.max_payment_attempts == 0 {
            problems.push("payments.max_payment_attempts must be at least 1".into());
        }
        if self.collaborators.timeout_ms == 0 {
            problems.push("collaborators.timeout_ms must be positive".into());
        }
        if self.collaborators.max_attempts == 0 {
            problems.push("collaborators.max_attempts must be at least 1".into());
        }
        if self.broker.max_deliveries == 0 {
            problems.push("broker.max_deliveries must be at least 1".into());
        }
        if self.broker.partitions == 0 {
            problems.push("broker.partitions must be at least 1".into());
        }
        if self.broker.channel_capacity == 0 {
            problems.push("broker.channel_capacity must be at least 1".into());
        }

        let worst_call = self.collaborators.call_policy().worst_case();
        if self.engine.action_timeout() < worst_call {
            problems.push(format!(
                "engine.action_timeout_ms ({}) is shorter than one collaborator call can take ({} ms)",
                self.engine.action_timeout_ms,
                worst_call.as_millis()
            ));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems.join("; ")))
        }
    }
}
