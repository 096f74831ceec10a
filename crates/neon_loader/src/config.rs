//! Loader configuration options.

use serde::Deserialize;

/// Execution options for the loader scheduler.
///
/// All values are nonnegative integers; a missing option takes its
/// default. Durations are in seconds.
///
/// | Option | Default | Effect |
/// |---|---|---|
/// | `execStartup` | 15 | Delay before the first run; 0 skips the startup run |
/// | `execInterval` | 900 | Period between runs; 0 disables periodic mode |
/// | `execFailsafeInterval` | 300 | Period after a failing run; 0 disables failsafe |
/// | `execWorkers` | 1 | Worker pool size; must be at least 1 |
/// | `execMaxOps` | 100 | Dispatches before an enforced pause; 0 disables |
/// | `execMaxDelay` | 60 | Pause length after `execMaxOps` dispatches |
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoaderConfig {
    /// Delay in seconds before the first execution.
    pub exec_startup: u64,
    /// Period in seconds between periodic runs.
    pub exec_interval: u64,
    /// Fallback period in seconds after a failing run.
    pub exec_failsafe_interval: u64,
    /// Worker pool size.
    pub exec_workers: usize,
    /// Maximum rules dispatched before an enforced pause.
    pub exec_max_ops: usize,
    /// Pause length in seconds after `exec_max_ops` dispatches.
    pub exec_max_delay: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            exec_startup: 15,
            exec_interval: 900,
            exec_failsafe_interval: 300,
            exec_workers: 1,
            exec_max_ops: 100,
            exec_max_delay: 60,
        }
    }
}

impl LoaderConfig {
    /// Returns true when neither a startup run nor periodic mode is
    /// enabled, in which case the scheduler task does not start.
    #[must_use]
    pub fn execution_enabled(&self) -> bool {
        self.exec_startup > 0 || self.exec_interval > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_options_take_defaults() {
        let config: LoaderConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!(config, LoaderConfig::default());
    }

    #[test]
    fn options_decode_from_camel_case() {
        let config: LoaderConfig = serde_json::from_value(json!({
            "execStartup": 1,
            "execInterval": 10,
            "execFailsafeInterval": 2,
            "execWorkers": 4,
            "execMaxOps": 0,
            "execMaxDelay": 5
        }))
        .unwrap();
        assert_eq!(config.exec_startup, 1);
        assert_eq!(config.exec_interval, 10);
        assert_eq!(config.exec_failsafe_interval, 2);
        assert_eq!(config.exec_workers, 4);
        assert_eq!(config.exec_max_ops, 0);
        assert_eq!(config.exec_max_delay, 5);
    }

    #[test]
    fn zero_startup_and_interval_disable_execution() {
        let config: LoaderConfig =
            serde_json::from_value(json!({"execStartup": 0, "execInterval": 0})).unwrap();
        assert!(!config.execution_enabled());
    }
}
