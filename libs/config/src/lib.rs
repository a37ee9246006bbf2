//! # Actor Runtime Configuration
//!
//! Centralized configuration for actor instances, connections and the
//! coordinate topology.
//!
//! ## Features
//!
//! - **Defaults**: every recognized option has a constant in [`defaults`]
//! - **Layered loading**: TOML file, per-environment file, `ACTORS__*`
//!   environment variables
//! - **Validation**: cross-field checks such as renew grace < lease duration
//! - **Logging**: one-call tracing subscriber setup
//!
//! ## Usage
//!
//! ```rust,no_run
//! use config::{init_tracing, RuntimeConfig};
//! use std::path::Path;
//!
//! let config = RuntimeConfig::load(Some(Path::new("config/runtime.toml")), Some("production"))?;
//! init_tracing(&config.logging);
//! let lease = config.coordinate.lease_duration();
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod defaults;
pub mod logging;
pub mod runtime_config;

// Re-export commonly used types
pub use logging::init_tracing;
pub use runtime_config::{
    ActionOptions, CoordinateOptions, LifecycleOptions, LoggingOptions, ProtocolOptions,
    RuntimeConfig,
};
