//! Engine tuning knobs, env-overridable per spec §6.

use std::time::Duration;

/// Engine-wide defaults. Per-node `retries`/`timeout_ms` on a
/// [`crate::models::NodeDefinition`] override the corresponding field here.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// `MAX_CONCURRENT_NODES` — how many node futures may run at once
    /// within a single execution's `JoinSet`.
    pub max_concurrent_nodes: usize,
    /// `MAX_NODE_RETRIES` — default retry ceiling for a `Retryable` node
    /// failure before it becomes a permanent node failure.
    pub max_node_retries: u32,
    /// Base delay for per-node exponential backoff (factor 2, capped).
    pub retry_base_delay: Duration,
    /// Cap for per-node exponential backoff.
    pub retry_max_delay: Duration,
    /// `NODE_EXECUTION_TIMEOUT_MS` — default per-node execution timeout.
    pub node_timeout: Duration,
    /// `WORKFLOW_EXECUTION_TIMEOUT_MS` — whole-execution deadline.
    pub workflow_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_nodes: 5,
            max_node_retries: 3,
            retry_base_delay: Duration::from_secs(1),
            retry_max_delay: Duration::from_secs(60),
            node_timeout: Duration::from_secs(5 * 60),
            workflow_timeout: Duration::from_secs(60 * 60),
        }
    }
}

impl EngineConfig {
    /// Build from the process environment, falling back to defaults for
    /// anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_nodes: env_usize("MAX_CONCURRENT_NODES", defaults.max_concurrent_nodes),
            max_node_retries: env_u32("MAX_NODE_RETRIES", defaults.max_node_retries),
            retry_base_delay: defaults.retry_base_delay,
            retry_max_delay: defaults.retry_max_delay,
            node_timeout: env_duration_ms("NODE_EXECUTION_TIMEOUT_MS", defaults.node_timeout),
            workflow_timeout: env_duration_ms(
                "WORKFLOW_EXECUTION_TIMEOUT_MS",
                defaults.workflow_timeout,
            ),
        }
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_duration_ms(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}
