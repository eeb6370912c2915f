//! Key-value conversion and override merging for DynamicConfig.

use std::collections::HashMap;

use super::DynamicConfig;
use crate::error::{ServiceError, ServiceResult};

impl DynamicConfig {
    /// Convert config to key-value map for API response
    pub fn to_key_value_map(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();

        // Job polling settings
        map.insert(
            "jobs.default_poll_interval_secs".to_string(),
            serde_json::json!(self.jobs.default_poll_interval_secs),
        );
        map.insert(
            "jobs.default_max_wait_secs".to_string(),
            serde_json::json!(self.jobs.default_max_wait_secs),
        );
        map.insert(
            "jobs.min_poll_interval_secs".to_string(),
            serde_json::json!(self.jobs.min_poll_interval_secs),
        );
        map.insert(
            "jobs.min_max_wait_secs".to_string(),
            serde_json::json!(self.jobs.min_max_wait_secs),
        );

        // Fan-out settings
        map.insert(
            "fanout.concurrency".to_string(),
            serde_json::json!(self.fanout.concurrency),
        );

        // Materialize settings
        map.insert(
            "materialize.strict".to_string(),
            serde_json::json!(self.materialize.strict),
        );
        map.insert(
            "materialize.default_extension".to_string(),
            serde_json::Value::String(self.materialize.default_extension.clone()),
        );

        map
    }

    /// Apply a batch of overrides. `null` reverts a key to its default.
    pub fn apply_overrides(
        &mut self,
        overrides: &HashMap<String, serde_json::Value>,
    ) -> ServiceResult<()> {
        let valid = DynamicConfig::valid_keys();
        let mut unknown: Vec<&str> = overrides
            .keys()
            .map(String::as_str)
            .filter(|key| !valid.contains(key))
            .collect();
        if !unknown.is_empty() {
            unknown.sort_unstable();
            return Err(ServiceError::validation(format!(
                "Unknown setting keys: {}",
                unknown.join(", ")
            )));
        }

        for (key, value) in overrides {
            self.apply_setting(key, value)?;
        }
        Ok(())
    }

    fn apply_setting(&mut self, key: &str, value: &serde_json::Value) -> ServiceResult<()> {
        let defaults = DynamicConfig::default();
        let reset = value.is_null();

        match key {
            "jobs.default_poll_interval_secs" => {
                self.jobs.default_poll_interval_secs = if reset {
                    defaults.jobs.default_poll_interval_secs
                } else {
                    expect_u64(key, value)?
                };
            }
            "jobs.default_max_wait_secs" => {
                self.jobs.default_max_wait_secs = if reset {
                    defaults.jobs.default_max_wait_secs
                } else {
                    expect_u64(key, value)?
                };
            }
            "jobs.min_poll_interval_secs" => {
                self.jobs.min_poll_interval_secs = if reset {
                    defaults.jobs.min_poll_interval_secs
                } else {
                    expect_u64(key, value)?.max(1)
                };
            }
            "jobs.min_max_wait_secs" => {
                self.jobs.min_max_wait_secs = if reset {
                    defaults.jobs.min_max_wait_secs
                } else {
                    expect_u64(key, value)?.max(1)
                };
            }
            "fanout.concurrency" => {
                self.fanout.concurrency = if reset {
                    defaults.fanout.concurrency
                } else {
                    (expect_u64(key, value)? as usize).max(1)
                };
            }
            "materialize.strict" => {
                self.materialize.strict = if reset {
                    defaults.materialize.strict
                } else {
                    value.as_bool().ok_or_else(|| type_error(key, "a boolean"))?
                };
            }
            "materialize.default_extension" => {
                self.materialize.default_extension = if reset {
                    defaults.materialize.default_extension
                } else {
                    value
                        .as_str()
                        .map(|s| s.trim_start_matches('.').to_string())
                        .filter(|s| !s.is_empty())
                        .ok_or_else(|| type_error(key, "a non-empty string"))?
                };
            }
            _ => {
                return Err(ServiceError::validation(format!(
                    "Unknown setting key: {}",
                    key
                )));
            }
        }

        Ok(())
    }
}

fn expect_u64(key: &str, value: &serde_json::Value) -> ServiceResult<u64> {
    value
        .as_u64()
        .ok_or_else(|| type_error(key, "a non-negative integer"))
}

fn type_error(key: &str, expected: &str) -> ServiceError {
    ServiceError::validation(format!("Setting {} must be {}", key, expected))
}
