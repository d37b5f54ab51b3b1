//! Subscriber setup.
//!
//! One registry with an `EnvFilter` and either a JSON or a compact human
//! readable fmt layer on stdout.

use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter,
};

use crate::{TelemetryConfig, TelemetryError};

/// Build the filter for `config`. `RUST_LOG` directives take precedence.
pub fn env_filter(config: &TelemetryConfig) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| TelemetryError::Filter(e.to_string()))
}

/// A concurrent caller may win the race to install; that is not an error.
fn already_installed(e: TryInitError) -> Result<(), TelemetryError> {
    if tracing::dispatcher::has_been_set() {
        Ok(())
    } else {
        Err(TelemetryError::Init(e.to_string()))
    }
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init_tracing(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    if tracing::dispatcher::has_been_set() {
        return Ok(());
    }

    let filter = env_filter(config)?;
    let json = config.console_output && config.json_logs;
    let pretty = config.console_output && !config.json_logs;

    // A `None` layer is a no-op, so at most one of these writes.
    let json_layer = json.then(|| {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_file(true)
            .with_line_number(true)
    });
    let pretty_layer = pretty.then(|| fmt::layer().compact().with_target(true));

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(pretty_layer)
        .try_init()
        .or_else(already_installed)?;

    tracing::info!(service = %config.service_name, json, "Logging ready");
    Ok(())
}
