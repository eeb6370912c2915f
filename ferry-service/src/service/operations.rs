//! Job operations: run a provider job end to end, or check on one later.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::content::validate_source_url;
use crate::error::{ServiceError, ServiceResult};
use crate::jobs::{
    ArtifactKind, JobHandle, JobRequest, JobStatus, PollSettings, RemoteArtifactRef, run_job,
};
use crate::lifecycle::{LifecycleScope, with_lifecycle};
use crate::materialize::{MaterializePolicy, OutputNaming, materialize};
use crate::remote::RemoteStore;
use crate::service::{
    CompletedJob, FerryService, JobOperationRequest, JobOperationResponse, PendingJob, TaskQuery,
    TaskStatusResponse,
};

impl FerryService {
    /// Run one job: upload input, submit, poll, materialize outputs, clean up.
    ///
    /// With `wait = false` returns as soon as the provider accepted the job;
    /// the job and its inputs then belong to the provider.
    pub async fn run_job_operation(
        &self,
        request: JobOperationRequest,
    ) -> ServiceResult<JobOperationResponse> {
        let store = self.provider(&request.provider)?;
        if let Some(url) = &request.source_url {
            validate_source_url(url)?;
        } else if store.requires_input() {
            return Err(ServiceError::validation(format!(
                "Provider {} requires a sourceUrl",
                request.provider
            )));
        }

        let operation = self.register_operation(request.operation_id.clone())?;
        let (settings, naming, policy) = {
            let dynamic = self.runtime_config.dynamic();
            (
                PollSettings::from_request(
                    request.polling_interval_seconds,
                    request.max_wait_seconds,
                    &dynamic.jobs,
                ),
                OutputNaming::new(request.output_filename.clone(), &dynamic.materialize),
                MaterializePolicy::from_config(&dynamic.materialize),
            )
        };

        info!(
            operation_id = %operation.id,
            provider = %request.provider,
            wait = request.wait,
            "Starting job operation"
        );

        let token = operation.token.clone();
        let result = with_lifecycle(&token, |scope| {
            self.job_body(
                scope,
                store.clone(),
                &request,
                &operation.id,
                settings,
                &naming,
                policy,
                &token,
            )
        })
        .await;

        if let Err(e) = &result {
            error!(
                operation_id = %operation.id,
                provider = %request.provider,
                error = %e,
                "Job operation failed"
            );
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn job_body(
        &self,
        scope: LifecycleScope,
        store: Arc<dyn RemoteStore>,
        request: &JobOperationRequest,
        operation_id: &str,
        settings: PollSettings,
        naming: &OutputNaming,
        policy: MaterializePolicy,
        cancel: &CancellationToken,
    ) -> ServiceResult<JobOperationResponse> {
        let provider = store.name().to_string();
        let job_request = self
            .prepare_request(&scope, &store, request, cancel)
            .await?;

        if !request.wait {
            let job = store.submit(&job_request, cancel).await?;
            // The provider owns the inputs now; deleting them would break the job
            for input in &job_request.inputs {
                scope.release(&input.id);
            }
            metrics::counter!("ferry_jobs_submitted_total", "provider" => provider.clone())
                .increment(1);
            info!(operation_id = %operation_id, provider = %provider, job_id = %job, "Job submitted without waiting");
            return Ok(JobOperationResponse::Pending(PendingJob {
                task_id: job.to_string(),
                status: JobStatus::Pending,
                provider,
                operation_id: operation_id.to_string(),
            }));
        }

        let submit = async {
            let job = store.submit(&job_request, cancel).await?;
            scope.track_remote(
                RemoteArtifactRef::new(&provider, job.as_str(), ArtifactKind::Job),
                store.clone(),
            );
            Ok::<_, ServiceError>(job)
        };
        let poll_store = store.clone();
        let poll_cancel = cancel.clone();
        let poll = move |job: JobHandle| {
            let store = poll_store.clone();
            let cancel = poll_cancel.clone();
            async move { store.poll(&job, &cancel).await }
        };

        let result = run_job(&provider, store.vocabulary(), submit, poll, settings, cancel)
            .await?
            .require_success(&provider)?;

        for output in &result.outputs {
            scope.track_remote(output.clone(), store.clone());
        }

        let links = materialize(
            &result.outputs,
            store.as_ref(),
            self.uploader.as_ref(),
            naming,
            policy,
            cancel,
        )
        .await?;

        Ok(JobOperationResponse::Completed(CompletedJob {
            operation_id: operation_id.to_string(),
            provider,
            task_id: result.job.to_string(),
            status: result.status,
            outputs: links,
            metadata: result.raw,
            waited_seconds: result.waited.as_secs_f64(),
        }))
    }

    /// Build the job request, uploading the source first when the provider takes uploads
    async fn prepare_request(
        &self,
        scope: &LifecycleScope,
        store: &Arc<dyn RemoteStore>,
        request: &JobOperationRequest,
        cancel: &CancellationToken,
    ) -> ServiceResult<JobRequest> {
        let mut job_request = JobRequest {
            params: request.params.clone(),
            ..JobRequest::default()
        };

        let Some(url) = &request.source_url else {
            return Ok(job_request);
        };

        if !store.accepts_uploads() {
            job_request.source_url = Some(url.clone());
            return Ok(job_request);
        }

        let payload = self
            .resolver
            .resolve(url, cancel)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::Download {
                url: url.clone(),
                message: "source resolved to no content".to_string(),
            })?;

        let filename = payload.filename.clone().unwrap_or_else(|| "input".to_string());
        let input = store
            .upload_input(&filename, payload.bytes, payload.mime_type.as_deref(), cancel)
            .await?;
        scope.track_remote(input.clone(), store.clone());
        job_request.inputs.push(input);
        Ok(job_request)
    }

    /// Poll an existing task once, optionally materializing its outputs.
    ///
    /// Materializing takes ownership of the task: the job and its outputs are
    /// deleted from the provider afterwards.
    pub async fn check_task(
        &self,
        provider: &str,
        task_id: &str,
        query: TaskQuery,
    ) -> ServiceResult<TaskStatusResponse> {
        let store = self.provider(provider)?;
        if task_id.trim().is_empty() {
            return Err(ServiceError::validation("taskId must not be empty"));
        }

        let operation = self.register_operation(None)?;
        let token = operation.token.clone();
        let job = JobHandle::new(task_id);

        let raw = store.poll(&job, &token).await?;
        let mut status = store.vocabulary().normalize(&raw.status);
        let mut failure_reason = raw.failure_reason.clone();
        if status == JobStatus::Succeeded && raw.outputs.is_empty() {
            status = JobStatus::Failed;
            failure_reason = Some(format!(
                "job reported {} but returned no outputs",
                raw.status
            ));
        }
        if status != JobStatus::Failed && status != JobStatus::Cancelled {
            failure_reason = None;
        }

        let mut response = TaskStatusResponse {
            provider: provider.to_string(),
            task_id: task_id.to_string(),
            status,
            raw_status: raw.status.clone(),
            failure_reason,
            outputs: Vec::new(),
            metadata: raw.body.clone(),
        };

        if !query.materialize || status != JobStatus::Succeeded {
            return Ok(response);
        }

        let (naming, policy) = {
            let dynamic = self.runtime_config.dynamic();
            (
                OutputNaming::new(query.output_filename, &dynamic.materialize),
                MaterializePolicy::from_config(&dynamic.materialize),
            )
        };

        let outputs: Vec<RemoteArtifactRef> = raw
            .outputs
            .into_iter()
            .map(|output| {
                RemoteArtifactRef::new(provider, output.id, ArtifactKind::Output)
                    .with_filename(output.filename)
            })
            .collect();

        response.outputs = with_lifecycle(&token, |scope| {
            let store = store.clone();
            let outputs = &outputs;
            let naming = &naming;
            let token = &token;
            async move {
                scope.track_remote(
                    RemoteArtifactRef::new(provider, task_id, ArtifactKind::Job),
                    store.clone(),
                );
                for output in outputs {
                    scope.track_remote(output.clone(), store.clone());
                }
                materialize(
                    outputs,
                    store.as_ref(),
                    self.uploader.as_ref(),
                    naming,
                    policy,
                    token,
                )
                .await
            }
        })
        .await
        .inspect_err(|e| {
            warn!(provider = %provider, task_id = %task_id, error = %e, "Materializing task outputs failed");
        })?;

        info!(
            provider = %provider,
            task_id = %task_id,
            outputs = response.outputs.len(),
            "Task outputs materialized"
        );
        Ok(response)
    }
}
