//! Logging settings read from the process environment.

use std::env;

const DEFAULT_SERVICE: &str = "api-gateway";

/// How and whether the gateway writes log lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Recorded on the startup line.
    pub service_name: String,
    /// A level (`info`) or any `EnvFilter` directive (`api_gateway=debug`).
    pub log_level: String,
    /// False installs the filter only, nothing reaches stdout.
    pub console_output: bool,
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE.into(),
            log_level: "info".into(),
            console_output: true,
            json_logs: false,
        }
    }
}

/// `1`/`true`/`yes`/`on` and their negations, case-insensitively.
fn flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl TelemetryConfig {
    /// Read `GW_SERVICE_NAME`, `GW_LOG_LEVEL` (falling back to `RUST_LOG`),
    /// `GW_CONSOLE_OUTPUT` and `GW_JSON_LOGS`. JSON is the default inside
    /// Kubernetes or Docker.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`TelemetryConfig::from_env`] over an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let in_container = ["KUBERNETES_SERVICE_HOST", "DOCKER_CONTAINER"]
            .iter()
            .any(|key| lookup(*key).is_some());
        let switch = |key: &str| lookup(key).as_deref().and_then(flag);

        Self {
            service_name: lookup("GW_SERVICE_NAME").unwrap_or(defaults.service_name),
            log_level: lookup("GW_LOG_LEVEL")
                .or_else(|| lookup("RUST_LOG"))
                .unwrap_or(defaults.log_level),
            console_output: switch("GW_CONSOLE_OUTPUT").unwrap_or(defaults.console_output),
            json_logs: switch("GW_JSON_LOGS").unwrap_or(in_container),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = TelemetryConfig::from_lookup(lookup(&[]));
        assert_eq!(config, TelemetryConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = TelemetryConfig::from_lookup(lookup(&[
            ("GW_SERVICE_NAME", "todo-api"),
            ("RUST_LOG", "debug"),
            ("GW_CONSOLE_OUTPUT", "0"),
            ("GW_JSON_LOGS", "TRUE"),
        ]));
        assert_eq!(config.service_name, "todo-api");
        assert_eq!(config.log_level, "debug");
        assert!(!config.console_output);
        assert!(config.json_logs);
    }

    #[test]
    fn test_gateway_level_wins_over_rust_log() {
        let config =
            TelemetryConfig::from_lookup(lookup(&[("GW_LOG_LEVEL", "warn"), ("RUST_LOG", "trace")]));
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn test_unrecognised_flag_keeps_default() {
        let config = TelemetryConfig::from_lookup(lookup(&[
            ("GW_CONSOLE_OUTPUT", "maybe"),
            ("GW_JSON_LOGS", " Off "),
            ("KUBERNETES_SERVICE_HOST", "10.0.0.1"),
        ]));
        assert!(config.console_output);
        assert!(!config.json_logs);
    }

    #[test]
    fn test_json_by_default_in_containers() {
        let config = TelemetryConfig::from_lookup(lookup(&[("DOCKER_CONTAINER", "1")]));
        assert!(config.json_logs);
    }
}
