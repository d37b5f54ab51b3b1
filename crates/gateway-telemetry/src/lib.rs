//! # Gateway Telemetry
//!
//! Structured logging for the gateway: a `tracing-subscriber` registry with
//! an `EnvFilter` and a JSON (containers) or pretty (development) fmt layer.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gateway_telemetry::{init_tracing, TelemetryConfig};
//!
//! let config = TelemetryConfig::from_env();
//! init_tracing(&config)?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `GW_SERVICE_NAME` | `api-gateway` | Service name in logs |
//! | `GW_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `GW_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//! | `GW_JSON_LOGS` | `false` (`true` in containers) | JSON log lines |

mod config;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use tracing_setup::{env_filter, init_tracing};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter: {0}")]
    Filter(String),

    #[error("Failed to install subscriber: {0}")]
    Init(String),
}
