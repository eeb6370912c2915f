//! Cancellation token management for running operations.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};
use crate::service::FerryService;

/// Token of one running operation, tagged so a stale handle never removes a newer one
#[derive(Clone)]
pub(crate) struct RegisteredOperation {
    registration: Uuid,
    token: CancellationToken,
}

/// Registration of one running operation; unregisters itself when dropped
pub struct OperationHandle {
    pub id: String,
    pub token: CancellationToken,
    registration: Uuid,
    registry: Arc<DashMap<String, RegisteredOperation>>,
}

impl Drop for OperationHandle {
    fn drop(&mut self) {
        self.registry
            .remove_if(&self.id, |_, entry| entry.registration == self.registration);
        debug!(operation_id = %self.id, "Operation unregistered");
    }
}

impl FerryService {
    /// Register a cancellation token for an operation.
    ///
    /// Uses the caller's id when given; ids already running are rejected.
    pub(crate) fn register_operation(
        &self,
        operation_id: Option<String>,
    ) -> ServiceResult<OperationHandle> {
        let id = match operation_id {
            Some(id) if id.trim().is_empty() => {
                return Err(ServiceError::validation("operationId must not be empty"));
            }
            Some(id) => id,
            None => Uuid::new_v4().to_string(),
        };

        let token = CancellationToken::new();
        let registration = Uuid::new_v4();
        match self.operation_tokens.entry(id.clone()) {
            Entry::Occupied(_) => {
                return Err(ServiceError::validation(format!(
                    "Operation {} is already running",
                    id
                )));
            }
            Entry::Vacant(entry) => {
                entry.insert(RegisteredOperation {
                    registration,
                    token: token.clone(),
                });
            }
        }

        debug!(operation_id = %id, "Operation registered");
        Ok(OperationHandle {
            id,
            token,
            registration,
            registry: self.operation_tokens.clone(),
        })
    }

    /// Cancel a running operation. Its cleanup still runs.
    pub fn cancel_operation(&self, operation_id: &str) -> ServiceResult<()> {
        match self.operation_tokens.remove(operation_id) {
            Some((_, entry)) => {
                entry.token.cancel();
                info!(operation_id = %operation_id, "Operation cancellation triggered");
                Ok(())
            }
            None => Err(ServiceError::OperationNotFound {
                operation_id: operation_id.to_string(),
            }),
        }
    }

    /// Ids of operations currently running
    pub fn running_operations(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .operation_tokens
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }
}
