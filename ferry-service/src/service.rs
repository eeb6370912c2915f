mod cancellation;
mod operations;
mod ranking;
mod types;

pub use types::{
    CompletedJob, JobOperationRequest, JobOperationResponse, PendingJob, RankedSource,
    RerankSourcesRequest, RerankSourcesResponse, SettingsResponse, TaskQuery,
    TaskStatusResponse,
};

use bytes::Bytes;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::config::{DynamicConfig, RuntimeConfig};
use crate::content::{ContentResolver, HttpContentResolver};
use crate::destination::{LocalUploader, Uploader};
use crate::error::{ServiceError, ServiceResult};
use crate::remote::{HttpRemoteStore, RemoteStore};
use crate::rerank::{HttpReranker, Reranker};

/// Main service coordinator.
///
/// Collaborators are injected at construction; operations never look them up
/// from ambient state.
pub struct FerryService {
    pub runtime_config: Arc<RuntimeConfig>,
    providers: HashMap<String, Arc<dyn RemoteStore>>,
    resolver: Arc<dyn ContentResolver>,
    uploader: Arc<dyn Uploader>,
    reranker: Option<Arc<dyn Reranker>>,
    local_files: LocalUploader,
    /// Tokens of running operations, keyed by operation id
    operation_tokens: Arc<DashMap<String, cancellation::RegisteredOperation>>,
}

impl FerryService {
    /// Create a service backed by the configured HTTP collaborators
    pub fn new(runtime_config: Arc<RuntimeConfig>) -> ServiceResult<Self> {
        info!("Initializing Ferry service");
        let static_config = &runtime_config.static_config;

        let mut providers: Vec<Arc<dyn RemoteStore>> = Vec::new();
        for (name, config) in &static_config.providers {
            providers.push(Arc::new(HttpRemoteStore::new(name, config.clone())?));
            info!(provider = %name, base_url = %config.base_url, "Provider client initialized");
        }

        let resolver: Arc<dyn ContentResolver> =
            Arc::new(HttpContentResolver::new(&static_config.content)?);
        let uploader: Arc<dyn Uploader> = Arc::new(LocalUploader::new(&static_config.storage));

        let reranker: Option<Arc<dyn Reranker>> = match &static_config.rerank {
            Some(config) => {
                info!(base_url = %config.base_url, model = %config.model, "Reranker initialized");
                Some(Arc::new(HttpReranker::new(config.clone())?))
            }
            None => None,
        };

        Ok(Self::with_collaborators(
            runtime_config,
            providers,
            resolver,
            uploader,
            reranker,
        ))
    }

    /// Create a service with explicit collaborators
    pub fn with_collaborators(
        runtime_config: Arc<RuntimeConfig>,
        providers: Vec<Arc<dyn RemoteStore>>,
        resolver: Arc<dyn ContentResolver>,
        uploader: Arc<dyn Uploader>,
        reranker: Option<Arc<dyn Reranker>>,
    ) -> Self {
        let local_files = LocalUploader::new(&runtime_config.static_config.storage);
        Self {
            providers: providers
                .into_iter()
                .map(|store| (store.name().to_string(), store))
                .collect(),
            runtime_config,
            resolver,
            uploader,
            reranker,
            local_files,
            operation_tokens: Arc::new(DashMap::new()),
        }
    }

    pub(crate) fn provider(&self, name: &str) -> ServiceResult<Arc<dyn RemoteStore>> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| ServiceError::ProviderNotFound {
                provider: name.to_string(),
            })
    }

    /// Configured provider names, sorted
    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Read back an output stored by the local destination
    pub async fn read_stored_file(&self, dir: &str, name: &str) -> ServiceResult<(Bytes, String)> {
        self.local_files.read(dir, name).await
    }

    /// Current dynamic settings and which of them differ from defaults
    pub fn settings(&self) -> SettingsResponse {
        let settings = self.runtime_config.dynamic().to_key_value_map();
        let defaults = DynamicConfig::default().to_key_value_map();
        let mut overridden: Vec<String> = settings
            .iter()
            .filter(|(key, value)| defaults.get(*key) != Some(*value))
            .map(|(key, _)| key.clone())
            .collect();
        overridden.sort();
        SettingsResponse {
            settings,
            overridden,
        }
    }

    /// Apply setting overrides (hot reload). `null` reverts a key to its default.
    pub fn update_settings(
        &self,
        updates: HashMap<String, serde_json::Value>,
    ) -> ServiceResult<SettingsResponse> {
        self.runtime_config.update_dynamic(&updates)?;
        info!(keys = ?updates.keys().collect::<Vec<_>>(), "Settings updated");
        Ok(self.settings())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::testing::{FakeResolver, FakeUploader};

    pub fn service_with(
        providers: Vec<Arc<dyn RemoteStore>>,
        resolver: FakeResolver,
        uploader: Arc<FakeUploader>,
        reranker: Option<Arc<dyn Reranker>>,
    ) -> FerryService {
        let runtime = Arc::new(RuntimeConfig::new(
            crate::config::test_static_config(),
            DynamicConfig::default(),
        ));
        FerryService::with_collaborators(runtime, providers, Arc::new(resolver), uploader, reranker)
    }
}
