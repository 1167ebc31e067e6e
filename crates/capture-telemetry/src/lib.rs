//! Structured logging for the capture agent and its driver.
//!
//! Output goes to stderr, either human readable or as JSON lines. `RUST_LOG`
//! takes precedence over the configured levels when it is set.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter, Layer, Registry};

#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    pub log_level: Level,
    /// Overrides keyed by module path, e.g. `capture_agent` at `DEBUG`.
    pub module_levels: Vec<(String, Level)>,
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            json: false,
        }
    }
}

impl TelemetryConfig {
    /// `EnvFilter` directives, e.g. `info,capture_agent=debug`.
    pub fn filter_string(&self) -> String {
        directives(self.log_level, &self.module_levels)
    }
}

fn directives(base: Level, overrides: &[(String, Level)]) -> String {
    std::iter::once(base.as_str().to_ascii_lowercase())
        .chain(
            overrides
                .iter()
                .map(|(module, level)| format!("{module}={}", level.as_str().to_ascii_lowercase())),
        )
        .collect::<Vec<_>>()
        .join(",")
}

/// Keeps the installed filter adjustable after startup.
pub struct TelemetryGuard {
    base: Level,
    overrides: Arc<RwLock<Vec<(String, Level)>>>,
    handle: Option<reload::Handle<EnvFilter, Registry>>,
}

impl TelemetryGuard {
    /// Set or replace the level for one module and return the resulting
    /// filter directives.
    pub fn set_module_level(&self, module: &str, level: Level) -> String {
        let mut overrides = self.overrides.write();
        match overrides.iter_mut().find(|(m, _)| m == module) {
            Some((_, current)) => *current = level,
            None => overrides.push((module.to_owned(), level)),
        }
        let filter = directives(self.base, &overrides);
        if let Some(handle) = &self.handle {
            if let Err(e) = handle.reload(EnvFilter::new(&filter)) {
                tracing::warn!(error = %e, module, "log filter reload failed");
            }
        }
        filter
    }
}

/// Install the global subscriber. A second call leaves the first subscriber
/// in place and returns a guard that only records overrides.
pub fn init_telemetry(config: TelemetryConfig) -> TelemetryGuard {
    let env_override = std::env::var_os(EnvFilter::DEFAULT_ENV).is_some();
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new(config.filter_string()),
    };
    let (filter, handle) = reload::Layer::new(filter);

    let output = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr);
    let output = if config.json {
        output.json().with_span_list(true).boxed()
    } else {
        output.boxed()
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(output)
        .try_init()
        .is_ok();

    TelemetryGuard {
        base: config.log_level,
        overrides: Arc::new(RwLock::new(config.module_levels)),
        handle: (installed && !env_override).then_some(handle),
    }
}

pub fn parse_level(s: &str) -> Option<Level> {
    s.parse().ok()
}

/// Parse `module=level`.
pub fn parse_module_level(s: &str) -> Option<(String, Level)> {
    match s.split_once('=') {
        Some((module, level)) if !module.is_empty() => Some((module.to_owned(), parse_level(level)?)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_list_overrides_after_base() {
        let config = TelemetryConfig {
            log_level: Level::WARN,
            module_levels: vec![("capture_agent".into(), Level::DEBUG)],
            json: false,
        };
        assert_eq!(config.filter_string(), "warn,capture_agent=debug");
        assert_eq!(TelemetryConfig::default().filter_string(), "info");
    }

    #[test]
    fn level_names() {
        assert_eq!(parse_level("debug"), Some(Level::DEBUG));
        assert_eq!(parse_level("WARN"), Some(Level::WARN));
        assert_eq!(parse_level("loud"), None);
    }

    #[test]
    fn module_overrides() {
        assert_eq!(
            parse_module_level("capture_router=trace"),
            Some(("capture_router".to_string(), Level::TRACE))
        );
        assert_eq!(parse_module_level("=trace"), None);
        assert_eq!(parse_module_level("capture_router"), None);
        assert_eq!(parse_module_level("capture_router=nope"), None);
    }

    #[test]
    fn runtime_overrides_replace_existing_entries() {
        let guard = init_telemetry(TelemetryConfig::default());
        assert_eq!(
            guard.set_module_level("capture_agent", Level::DEBUG),
            "info,capture_agent=debug"
        );
        guard.set_module_level("capture_agent", Level::TRACE);
        assert_eq!(
            guard.set_module_level("capture_router", Level::WARN),
            "info,capture_agent=trace,capture_router=warn"
        );
    }
}
