//! Best-effort cleanup of remote artifacts created during one operation.
//!
//! Anything created on a provider (uploaded inputs, jobs, outputs) is tracked
//! on a [`LifecycleScope`] right after it exists. When the scope closes, every
//! tracked artifact is deleted exactly once, most recent first. Delete failures
//! are logged and counted, never returned: the operation's own result wins.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{CleanupError, ServiceError, ServiceResult};
use crate::jobs::RemoteArtifactRef;
use crate::remote::RemoteStore;

type Deleter = Box<dyn FnOnce(RemoteArtifactRef) -> BoxFuture<'static, Result<(), CleanupError>> + Send>;

struct Tracked {
    artifact: RemoteArtifactRef,
    deleter: Deleter,
}

#[derive(Default)]
struct ScopeState {
    tracked: Vec<Tracked>,
    closed: bool,
}

/// Ordered set of remote artifacts owned by one top-level operation.
///
/// Cheap to clone; clones share the same set. Not meant to be shared across
/// operations.
#[derive(Clone, Default)]
pub struct LifecycleScope {
    state: Arc<Mutex<ScopeState>>,
}

impl LifecycleScope {
    fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ScopeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register an artifact with the function that deletes it
    pub fn track<F, Fut>(&self, artifact: RemoteArtifactRef, deleter: F)
    where
        F: FnOnce(RemoteArtifactRef) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), CleanupError>> + Send + 'static,
    {
        let deleter: Deleter = Box::new(move |artifact| deleter(artifact).boxed());
        let mut state = self.lock();
        if state.closed {
            // Created after the scope already closed; delete right away rather than leak it
            drop(state);
            warn!(
                provider = %artifact.provider,
                artifact_id = %artifact.id,
                "Artifact tracked after scope closed, deleting immediately"
            );
            spawn_cleanup(vec![Tracked { artifact, deleter }]);
            return;
        }

        debug!(
            provider = %artifact.provider,
            artifact_id = %artifact.id,
            kind = %artifact.kind,
            position = state.tracked.len(),
            "Tracking remote artifact"
        );
        state.tracked.push(Tracked { artifact, deleter });
    }

    /// Track an artifact deleted through its provider's store
    pub fn track_remote(&self, artifact: RemoteArtifactRef, store: Arc<dyn RemoteStore>) {
        self.track(artifact, move |artifact| async move {
            store
                .delete(&artifact)
                .await
                .map_err(|e| CleanupError {
                    provider: artifact.provider.clone(),
                    artifact_id: artifact.id.clone(),
                    kind: artifact.kind.to_string(),
                    message: e.to_string(),
                })
        });
    }

    /// Stop tracking an artifact without deleting it.
    ///
    /// Used when ownership passes to the remote side, e.g. a job left running
    /// for the caller to collect later.
    pub fn release(&self, artifact_id: &str) -> Option<RemoteArtifactRef> {
        let mut state = self.lock();
        let position = state
            .tracked
            .iter()
            .rposition(|t| t.artifact.id == artifact_id)?;
        let released = state.tracked.remove(position).artifact;
        debug!(
            provider = %released.provider,
            artifact_id = %released.id,
            "Released remote artifact from cleanup"
        );
        Some(released)
    }

    fn close(&self) -> Vec<Tracked> {
        let mut state = self.lock();
        state.closed = true;
        std::mem::take(&mut state.tracked)
    }
}

/// Closes the scope when dropped, covering futures dropped mid-flight
struct CleanupGuard {
    scope: LifecycleScope,
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        let pending = self.scope.close();
        if !pending.is_empty() {
            info!(
                count = pending.len(),
                "Operation dropped before cleanup, deleting artifacts in background"
            );
            spawn_cleanup(pending);
        }
    }
}

/// Run `body` inside a lifecycle scope.
///
/// Whether `body` succeeds, fails, or `cancel` fires, every artifact tracked on
/// the scope is deleted afterwards in reverse tracking order. Deletes do not
/// observe `cancel` so a cancelled operation still cleans up after itself.
pub async fn with_lifecycle<T, F, Fut>(cancel: &CancellationToken, body: F) -> ServiceResult<T>
where
    F: FnOnce(LifecycleScope) -> Fut,
    Fut: Future<Output = ServiceResult<T>>,
{
    let guard = CleanupGuard {
        scope: LifecycleScope::new(),
    };

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ServiceError::Cancelled),
        result = body(guard.scope.clone()) => result,
    };

    run_cleanup(guard.scope.close()).await;
    outcome
}

async fn run_cleanup(tracked: Vec<Tracked>) {
    for Tracked { artifact, deleter } in tracked.into_iter().rev() {
        let provider = artifact.provider.clone();
        let artifact_id = artifact.id.clone();
        let kind = artifact.kind;

        match AssertUnwindSafe(deleter(artifact)).catch_unwind().await {
            Ok(Ok(())) => {
                debug!(provider = %provider, artifact_id = %artifact_id, kind = %kind, "Deleted remote artifact");
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Remote artifact cleanup failed");
                metrics::counter!("ferry_cleanup_failures_total", "provider" => provider)
                    .increment(1);
            }
            Err(_) => {
                warn!(
                    provider = %provider,
                    artifact_id = %artifact_id,
                    kind = %kind,
                    "Remote artifact cleanup panicked"
                );
                metrics::counter!("ferry_cleanup_failures_total", "provider" => provider)
                    .increment(1);
            }
        }
    }
}

fn spawn_cleanup(tracked: Vec<Tracked>) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(run_cleanup(tracked));
        }
        Err(_) => {
            for t in &tracked {
                warn!(
                    provider = %t.artifact.provider,
                    artifact_id = %t.artifact.id,
                    "No runtime available, remote artifact left behind"
                );
            }
        }
    }
}
