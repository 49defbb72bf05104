//! Engine configuration.
//!
//! `EngineConfig` mirrors `weave.toml`. Every field has a default, so an
//! empty file (or no file at all) is a valid config.

use serde::{Deserialize, Serialize};

/// What happens to parallel steps beyond a round's parallel limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParallelOverflow {
    /// Excess steps are marked dropped and never executed.
    #[default]
    Drop,
    /// Excess steps wait for the next scheduling round.
    Queue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Step timeout when a step does not set `timeout_seconds`.
    #[serde(default = "default_step_timeout_secs")]
    pub default_step_timeout_secs: u64,

    /// Attempts per step when a step does not set `retry_count`.
    #[serde(default = "default_retry_count")]
    pub default_retry_count: u32,

    /// Base delay for exponential backoff: `base * 2^attempt`.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Upper bound on a single backoff delay.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Run timeout when a workflow does not set `timeout_seconds`.
    #[serde(default = "default_workflow_timeout_secs")]
    pub default_workflow_timeout_secs: u64,

    /// Parallel limit when a workflow does not set `max_parallel_steps`.
    #[serde(default = "default_max_parallel_steps")]
    pub default_max_parallel_steps: usize,

    #[serde(default)]
    pub parallel_overflow: ParallelOverflow,

    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

fn default_step_timeout_secs() -> u64 {
    300
}

fn default_retry_count() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

fn default_workflow_timeout_secs() -> u64 {
    1800
}

fn default_max_parallel_steps() -> usize {
    5
}

fn default_event_bus_capacity() -> usize {
    1024
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_step_timeout_secs: default_step_timeout_secs(),
            default_retry_count: default_retry_count(),
            backoff_base_ms: default_backoff_base_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            default_workflow_timeout_secs: default_workflow_timeout_secs(),
            default_max_parallel_steps: default_max_parallel_steps(),
            parallel_overflow: ParallelOverflow::default(),
            event_bus_capacity: default_event_bus_capacity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_default_values() {
        let config = EngineConfig::default();
        assert_eq!(config.default_step_timeout_secs, 300);
        assert_eq!(config.default_retry_count, 3);
        assert_eq!(config.backoff_base_ms, 1000);
        assert_eq!(config.default_max_parallel_steps, 5);
        assert_eq!(config.parallel_overflow, ParallelOverflow::Drop);
    }

    #[test]
    fn test_engine_config_deserialize_empty() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_engine_config_deserialize_with_values() {
        let toml_str = r#"
default_retry_count = 5
backoff_base_ms = 250
parallel_overflow = "queue"
"#;
        let config: EngineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.default_retry_count, 5);
        assert_eq!(config.backoff_base_ms, 250);
        assert_eq!(config.parallel_overflow, ParallelOverflow::Queue);
        assert_eq!(config.default_step_timeout_secs, 300);
    }
}
