//! Dynamic configuration that can be updated at runtime via API.
//! API updates override config file/env defaults until restart.

mod merging;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// All valid setting keys for DynamicConfig
pub const VALID_SETTING_KEYS: &[&str] = &[
    "jobs.default_poll_interval_secs",
    "jobs.default_max_wait_secs",
    "jobs.min_poll_interval_secs",
    "jobs.min_max_wait_secs",
    "fanout.concurrency",
    "materialize.strict",
    "materialize.default_extension",
];

/// Dynamic configuration that can be updated at runtime via API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicConfig {
    #[serde(default = "default_jobs")]
    pub jobs: JobsConfig,

    #[serde(default = "default_fanout")]
    pub fanout: FanOutConfig,

    #[serde(default = "default_materialize")]
    pub materialize: MaterializeConfig,
}

impl Default for DynamicConfig {
    fn default() -> Self {
        Self {
            jobs: default_jobs(),
            fanout: default_fanout(),
            materialize: default_materialize(),
        }
    }
}

/// Polling defaults and floors for remote jobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub default_poll_interval_secs: u64,

    #[serde(default = "default_max_wait_secs")]
    pub default_max_wait_secs: u64,

    /// Caller-supplied intervals below this are raised to it
    #[serde(default = "default_min_poll_interval_secs")]
    pub min_poll_interval_secs: u64,

    /// Caller-supplied waits below this are raised to it
    #[serde(default = "default_min_max_wait_secs")]
    pub min_max_wait_secs: u64,
}

/// Fan-out aggregation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanOutConfig {
    /// Concurrent source downloads per operation
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

/// Output materialization settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterializeConfig {
    /// Abort on the first failed output instead of skipping it
    #[serde(default = "default_strict")]
    pub strict: bool,

    /// Extension used when neither the provider filename nor content type gives one
    #[serde(default = "default_extension")]
    pub default_extension: String,
}

impl DynamicConfig {
    /// Get all valid setting keys
    pub fn valid_keys() -> HashSet<&'static str> {
        VALID_SETTING_KEYS.iter().copied().collect()
    }
}

// ==================== Default Value Functions ====================

fn default_jobs() -> JobsConfig {
    JobsConfig {
        default_poll_interval_secs: default_poll_interval_secs(),
        default_max_wait_secs: default_max_wait_secs(),
        min_poll_interval_secs: default_min_poll_interval_secs(),
        min_max_wait_secs: default_min_max_wait_secs(),
    }
}

fn default_poll_interval_secs() -> u64 {
    2
}

fn default_max_wait_secs() -> u64 {
    900
}

fn default_min_poll_interval_secs() -> u64 {
    1
}

fn default_min_max_wait_secs() -> u64 {
    30
}

fn default_fanout() -> FanOutConfig {
    FanOutConfig {
        concurrency: default_concurrency(),
    }
}

fn default_concurrency() -> usize {
    3
}

fn default_materialize() -> MaterializeConfig {
    MaterializeConfig {
        strict: default_strict(),
        default_extension: default_extension(),
    }
}

fn default_strict() -> bool {
    true
}

fn default_extension() -> String {
    "bin".to_string()
}
