//! Runtime Configuration Module
//!
//! Loads the options recognized by the actor runtime and the coordinate
//! topology. Sources are layered, later sources winning:
//!
//! 1. built-in defaults ([`crate::defaults`])
//! 2. base TOML file
//! 3. `environments/<env>.toml` next to the base file
//! 4. environment variables, prefix `ACTORS`, separator `__`
//!    (`ACTORS__COORDINATE__LEASE_DURATION_MS=5000`)

use anyhow::{ensure, Context, Result};
use config_crate::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::defaults;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "ACTORS";

/// Complete runtime configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    pub action: ActionOptions,
    pub lifecycle: LifecycleOptions,
    pub protocol: ProtocolOptions,
    pub coordinate: CoordinateOptions,
    pub logging: LoggingOptions,
}

/// Action dispatch settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ActionOptions {
    pub timeout_ms: u64,
    /// Per-action timeout overrides keyed by action name
    pub overrides: HashMap<String, u64>,
}

/// Connection liveness settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct LifecycleOptions {
    pub connection_liveness_interval_ms: u64,
    pub connection_liveness_timeout_ms: u64,
}

/// Client protocol settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ProtocolOptions {
    pub max_incoming_message_size: usize,
    pub max_protocol_violations: u32,
    /// Send internal error messages to clients instead of an opaque code
    pub expose_internal_errors: bool,
}

/// Lease and relay settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct CoordinateOptions {
    pub lease_duration_ms: u64,
    pub renew_lease_grace_ms: u64,
    pub check_lease_interval_ms: u64,
    pub check_lease_jitter_ms: u64,
    pub message_ack_timeout_ms: u64,
    pub relay_retries: u32,
}

/// Tracing subscriber settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingOptions {
    /// Fallback filter when `RUST_LOG` is not set
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for ActionOptions {
    fn default() -> Self {
        Self {
            timeout_ms: defaults::action::TIMEOUT_MS,
            overrides: HashMap::new(),
        }
    }
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            connection_liveness_interval_ms: defaults::lifecycle::CONNECTION_LIVENESS_INTERVAL_MS,
            connection_liveness_timeout_ms: defaults::lifecycle::CONNECTION_LIVENESS_TIMEOUT_MS,
        }
    }
}

impl Default for ProtocolOptions {
    fn default() -> Self {
        Self {
            max_incoming_message_size: defaults::protocol::MAX_INCOMING_MESSAGE_SIZE,
            max_protocol_violations: defaults::protocol::MAX_PROTOCOL_VIOLATIONS,
            expose_internal_errors: false,
        }
    }
}

impl Default for CoordinateOptions {
    fn default() -> Self {
        Self {
            lease_duration_ms: defaults::coordinate::LEASE_DURATION_MS,
            renew_lease_grace_ms: defaults::coordinate::RENEW_LEASE_GRACE_MS,
            check_lease_interval_ms: defaults::coordinate::CHECK_LEASE_INTERVAL_MS,
            check_lease_jitter_ms: defaults::coordinate::CHECK_LEASE_JITTER_MS,
            message_ack_timeout_ms: defaults::coordinate::MESSAGE_ACK_TIMEOUT_MS,
            relay_retries: defaults::coordinate::RELAY_RETRIES,
        }
    }
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            level: defaults::logging::LEVEL.to_string(),
            json: false,
        }
    }
}

impl ActionOptions {
    /// Timeout for `action`, honoring per-action overrides
    pub fn timeout_for(&self, action: &str) -> Duration {
        Duration::from_millis(
            self.overrides
                .get(action)
                .copied()
                .unwrap_or(self.timeout_ms),
        )
    }
}

impl LifecycleOptions {
    pub fn liveness_interval(&self) -> Duration {
        Duration::from_millis(self.connection_liveness_interval_ms)
    }

    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_liveness_timeout_ms)
    }
}

impl CoordinateOptions {
    pub fn lease_duration(&self) -> Duration {
        Duration::from_millis(self.lease_duration_ms)
    }

    /// Delay between a successful acquire/renew and the next renewal
    pub fn renew_after(&self) -> Duration {
        Duration::from_millis(self.lease_duration_ms.saturating_sub(self.renew_lease_grace_ms))
    }

    /// How long before expiry an unrenewed leader stops its actor
    pub fn fence_margin(&self) -> Duration {
        Duration::from_millis(self.renew_lease_grace_ms / 2)
    }

    pub fn check_lease_interval(&self) -> Duration {
        Duration::from_millis(self.check_lease_interval_ms)
    }

    pub fn check_lease_jitter(&self) -> Duration {
        Duration::from_millis(self.check_lease_jitter_ms)
    }

    pub fn message_ack_timeout(&self) -> Duration {
        Duration::from_millis(self.message_ack_timeout_ms)
    }
}

impl RuntimeConfig {
    /// Load configuration from files with environment overrides
    pub fn load(base_path: Option<&Path>, environment: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(base) = base_path {
            debug!(path = %base.display(), "Loading base runtime config");
            builder = builder.add_source(File::from(base).required(true));

            // Add environment-specific overrides if specified
            if let Some(env) = environment {
                let env_file = base
                    .parent()
                    .unwrap_or_else(|| Path::new("."))
                    .join("environments")
                    .join(format!("{env}.toml"));

                if env_file.exists() {
                    info!(path = %env_file.display(), "Loading environment config");
                    builder = builder.add_source(File::from(env_file));
                } else {
                    warn!(path = %env_file.display(), "Environment config not found");
                }
            }
        }

        // Override with environment variables (ACTORS__ prefix)
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config: RuntimeConfig = builder
            .build()
            .context("Failed to build runtime configuration")?
            .try_deserialize()
            .context("Failed to deserialize runtime configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Parse an inline TOML document, missing keys fall back to defaults
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: RuntimeConfig = Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()
            .context("Failed to parse runtime configuration")?
            .try_deserialize()
            .context("Failed to deserialize runtime configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Render as TOML, e.g. to write a starter config file
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize runtime configuration")
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        ensure!(self.action.timeout_ms > 0, "action.timeout_ms must be positive");
        ensure!(
            self.action.overrides.values().all(|ms| *ms > 0),
            "action.overrides values must be positive"
        );
        ensure!(
            self.lifecycle.connection_liveness_interval_ms > 0,
            "lifecycle.connection_liveness_interval_ms must be positive"
        );
        ensure!(
            self.lifecycle.connection_liveness_timeout_ms > 0,
            "lifecycle.connection_liveness_timeout_ms must be positive"
        );
        ensure!(
            self.protocol.max_incoming_message_size > 0,
            "protocol.max_incoming_message_size must be positive"
        );
        ensure!(
            self.coordinate.lease_duration_ms > 0,
            "coordinate.lease_duration_ms must be positive"
        );
        ensure!(
            self.coordinate.renew_lease_grace_ms < self.coordinate.lease_duration_ms,
            "coordinate.renew_lease_grace_ms ({}) must be less than coordinate.lease_duration_ms ({})",
            self.coordinate.renew_lease_grace_ms,
            self.coordinate.lease_duration_ms
        );
        ensure!(
            self.coordinate.check_lease_interval_ms > 0,
            "coordinate.check_lease_interval_ms must be positive"
        );
        ensure!(
            self.coordinate.message_ack_timeout_ms > 0,
            "coordinate.message_ack_timeout_ms must be positive"
        );
        Ok(())
    }
}
