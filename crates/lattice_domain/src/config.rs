//! Core-recognized configuration (§6): durations and limits consulted by
//! the orchestrator and session manager. Persisted state (pipelines, runs,
//! grants, ...) lives in the repository layer; this is process-local
//! tuning, read once at startup the way `lattice_logging::lattice_home`
//! reads `LATTICE_HOME`.

use std::time::Duration;

/// Configuration surface the core consults, with defaults matching §6.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreConfig {
    /// Sessions idle longer than this are reaped. Default 30 minutes.
    pub session_ttl: Duration,
    /// Interval between reap sweeps. Default 1 minute.
    pub reap_interval: Duration,
    /// Maximum concurrent levels dispatched across all runs. Default 8.
    pub pipeline_parallelism: u32,
    /// Seeds `Pipeline::concurrency_limit` when a pipeline is created
    /// without one explicitly. Default 1.
    pub default_concurrency_limit: u32,
    /// Applied when validating parameter keys. Default 128.
    pub max_identifier_length: usize,
    /// Rejected at catalog registration.
    pub reserved_catalog_names: Vec<String>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            session_ttl: Duration::from_secs(30 * 60),
            reap_interval: Duration::from_secs(60),
            pipeline_parallelism: 8,
            default_concurrency_limit: 1,
            max_identifier_length: 128,
            reserved_catalog_names: vec![
                "main".to_string(),
                "memory".to_string(),
                "system".to_string(),
                "temp".to_string(),
            ],
        }
    }
}

impl CoreConfig {
    /// Overlay environment overrides onto the defaults. Unset or
    /// unparsable variables fall back to the existing value silently —
    /// consistent with `lattice_logging`'s env handling, which never fails
    /// startup over a malformed override.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(secs) = env_u64("LATTICE_SESSION_TTL_SECS") {
            config.session_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("LATTICE_REAP_INTERVAL_SECS") {
            config.reap_interval = Duration::from_secs(secs);
        }
        if let Some(n) = env_u32("LATTICE_PIPELINE_PARALLELISM") {
            config.pipeline_parallelism = n;
        }
        if let Some(n) = env_u32("LATTICE_DEFAULT_CONCURRENCY_LIMIT") {
            config.default_concurrency_limit = n;
        }
        if let Some(n) = env_u64("LATTICE_MAX_IDENTIFIER_LENGTH") {
            config.max_identifier_length = n as usize;
        }
        config
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = CoreConfig::default();
        assert_eq!(config.session_ttl, Duration::from_secs(1800));
        assert_eq!(config.reap_interval, Duration::from_secs(60));
        assert_eq!(config.pipeline_parallelism, 8);
        assert_eq!(config.default_concurrency_limit, 1);
        assert_eq!(config.max_identifier_length, 128);
        assert!(config.reserved_catalog_names.contains(&"main".to_string()));
    }
}
