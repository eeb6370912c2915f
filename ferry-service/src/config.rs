//! Service configuration.
//!
//! Split into static settings (server, storage, providers; restart to change)
//! and dynamic settings (polling defaults, fan-out width, materialize policy)
//! that are hot-swapped through the settings API.

mod dynamic_config;
mod loader;
mod static_config;

use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ServiceResult;

pub use dynamic_config::{DynamicConfig, JobsConfig, MaterializeConfig};
pub use static_config::{
    ContentConfig, ProviderConfig, RerankConfig, StaticConfig, StatusOverrides, StorageConfig,
};

/// Runtime configuration manager
/// Combines static config (startup-only) with dynamic config (hot-reloadable via ArcSwap)
pub struct RuntimeConfig {
    /// Static configuration (never changes after startup)
    pub static_config: StaticConfig,
    /// Dynamic configuration (can be hot-reloaded)
    dynamic: ArcSwap<DynamicConfig>,
}

impl RuntimeConfig {
    /// Load config from file and environment
    pub fn load() -> ServiceResult<Self> {
        let static_config = loader::load_static_config()?;
        let dynamic = loader::load_dynamic_config()?;
        Ok(Self::new(static_config, dynamic))
    }

    pub fn new(static_config: StaticConfig, dynamic: DynamicConfig) -> Self {
        Self {
            static_config,
            dynamic: ArcSwap::from_pointee(dynamic),
        }
    }

    /// Get current dynamic config snapshot (lock-free read)
    pub fn dynamic(&self) -> arc_swap::Guard<Arc<DynamicConfig>> {
        self.dynamic.load()
    }

    /// Apply setting overrides on top of the current snapshot and swap atomically
    pub fn update_dynamic(
        &self,
        overrides: &HashMap<String, serde_json::Value>,
    ) -> ServiceResult<Arc<DynamicConfig>> {
        let mut next = DynamicConfig::clone(&self.dynamic.load());
        next.apply_overrides(overrides)?;
        let next = Arc::new(next);
        self.dynamic.store(next.clone());
        Ok(next)
    }
}

#[cfg(test)]
pub(crate) fn test_static_config() -> StaticConfig {
    StaticConfig {
        server: static_config::default_server(),
        storage: static_config::default_storage(),
        content: static_config::default_content(),
        providers: HashMap::new(),
        rerank: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_dynamic_is_atomic_on_error() {
        let runtime = RuntimeConfig::new(test_static_config(), DynamicConfig::default());

        let mut overrides = HashMap::new();
        overrides.insert("fanout.concurrency".to_string(), serde_json::json!(8));
        overrides.insert("unknown.key".to_string(), serde_json::json!(1));
        assert!(runtime.update_dynamic(&overrides).is_err());
        assert_eq!(runtime.dynamic().fanout.concurrency, 3);

        overrides.remove("unknown.key");
        runtime.update_dynamic(&overrides).unwrap();
        assert_eq!(runtime.dynamic().fanout.concurrency, 8);
    }

    #[test]
    fn test_provider_config_defaults() {
        let provider: ProviderConfig = serde_json::from_value(serde_json::json!({
            "base_url": "https://api.example.com",
            "submit_path": "/v1/jobs",
            "status_path": "/v1/jobs/{id}",
        }))
        .unwrap();
        assert_eq!(provider.auth_header, "Authorization");
        assert_eq!(provider.auth_scheme, "Bearer");
        assert_eq!(provider.status_pointer, "/status");
        assert_eq!(provider.outputs_pointer, "/outputs");
        assert!(provider.upload_path.is_none());
        assert!(!provider.requires_input);
    }
}
