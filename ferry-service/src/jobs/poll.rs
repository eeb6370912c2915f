//! The fixed-interval poll loop shared by every provider integration.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::status::{JobStatus, StatusVocabulary};
use super::types::{ArtifactKind, JobHandle, JobResult, RawStatus, RemoteArtifactRef};
use crate::config::JobsConfig;
use crate::error::{ServiceError, ServiceResult};

/// Hard floor for the poll interval, regardless of configuration
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Hard floor for the overall wait, regardless of configuration
pub const MIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Poll interval and overall wait for one job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollSettings {
    /// Build settings, raising values below the hard floors
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval: interval.max(MIN_POLL_INTERVAL),
            timeout: timeout.max(MIN_TIMEOUT),
        }
    }

    /// Resolve caller-supplied seconds against configured defaults and floors
    pub fn from_request(
        poll_interval_secs: Option<u64>,
        max_wait_secs: Option<u64>,
        jobs: &JobsConfig,
    ) -> Self {
        let interval = poll_interval_secs
            .unwrap_or(jobs.default_poll_interval_secs)
            .max(jobs.min_poll_interval_secs);
        let timeout = max_wait_secs
            .unwrap_or(jobs.default_max_wait_secs)
            .max(jobs.min_max_wait_secs);
        Self::new(Duration::from_secs(interval), Duration::from_secs(timeout))
    }
}

/// Submit a job once, then poll until it reaches a terminal state.
///
/// `Succeeded` with no outputs is reported as `Failed`. Outputs are only taken
/// from a `Succeeded` status. Sleeps are cut short at `settings.timeout`, where
/// one last poll decides; a non-terminal answer there yields
/// [`ServiceError::Timeout`] carrying the last raw status. Cancellation yields
/// [`ServiceError::Cancelled`] without issuing further calls.
pub async fn run_job<S, P, Fut>(
    provider: &str,
    vocabulary: &StatusVocabulary,
    submit: S,
    mut poll: P,
    settings: PollSettings,
    cancel: &CancellationToken,
) -> ServiceResult<JobResult>
where
    S: Future<Output = ServiceResult<JobHandle>>,
    P: FnMut(JobHandle) -> Fut,
    Fut: Future<Output = ServiceResult<RawStatus>>,
{
    if cancel.is_cancelled() {
        return Err(ServiceError::Cancelled);
    }

    let job = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(ServiceError::Cancelled),
        submitted = submit => submitted?,
    };

    let started = Instant::now();
    metrics::counter!("ferry_jobs_submitted_total", "provider" => provider.to_string())
        .increment(1);
    info!(
        provider = %provider,
        job_id = %job,
        interval_secs = settings.interval.as_secs(),
        timeout_secs = settings.timeout.as_secs(),
        "Job submitted, polling for completion"
    );

    let mut last_status = String::from("<not polled>");
    let mut polls: u32 = 0;

    loop {
        // Never sleep past the deadline; the last poll happens at it
        let remaining = settings.timeout.saturating_sub(started.elapsed());
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(provider = %provider, job_id = %job, polls, "Job polling cancelled");
                return Err(ServiceError::Cancelled);
            }
            _ = tokio::time::sleep(settings.interval.min(remaining)) => {}
        }

        let raw = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ServiceError::Cancelled),
            polled = poll(job.clone()) => polled?,
        };
        polls += 1;

        let status = vocabulary.normalize(&raw.status);
        debug!(
            provider = %provider,
            job_id = %job,
            raw_status = %raw.status,
            status = %status,
            polls,
            "Polled job status"
        );
        last_status = raw.status.clone();

        let waited = started.elapsed();
        if !status.is_terminal() && waited >= settings.timeout {
            warn!(
                provider = %provider,
                job_id = %job,
                last_status = %last_status,
                polls,
                "Job timed out"
            );
            record_outcome(provider, "timeout", waited);
            return Err(ServiceError::Timeout {
                provider: provider.to_string(),
                job_id: job.to_string(),
                last_status,
                waited_secs: waited.as_secs(),
            });
        }

        match status {
            JobStatus::Pending | JobStatus::Processing => continue,
            JobStatus::Succeeded => {
                let waited = started.elapsed();
                if raw.outputs.is_empty() {
                    warn!(provider = %provider, job_id = %job, "Job succeeded without outputs");
                    record_outcome(provider, "failed", waited);
                    return Ok(JobResult {
                        job,
                        status: JobStatus::Failed,
                        outputs: Vec::new(),
                        failure_reason: Some(format!(
                            "job reported {} but returned no outputs",
                            raw.status
                        )),
                        raw: raw.body,
                        waited,
                    });
                }

                let outputs = raw
                    .outputs
                    .into_iter()
                    .map(|output| {
                        RemoteArtifactRef::new(provider, output.id, ArtifactKind::Output)
                            .with_filename(output.filename)
                    })
                    .collect::<Vec<_>>();
                info!(
                    provider = %provider,
                    job_id = %job,
                    outputs = outputs.len(),
                    polls,
                    "Job succeeded"
                );
                record_outcome(provider, "succeeded", waited);
                return Ok(JobResult {
                    job,
                    status,
                    outputs,
                    failure_reason: None,
                    raw: raw.body,
                    waited,
                });
            }
            JobStatus::Failed | JobStatus::Cancelled => {
                let waited = started.elapsed();
                warn!(
                    provider = %provider,
                    job_id = %job,
                    status = %status,
                    reason = raw.failure_reason.as_deref().unwrap_or("<none>"),
                    "Job ended without success"
                );
                record_outcome(provider, "failed", waited);
                return Ok(JobResult {
                    job,
                    status,
                    outputs: Vec::new(),
                    failure_reason: raw.failure_reason,
                    raw: raw.body,
                    waited,
                });
            }
        }
    }
}

fn record_outcome(provider: &str, outcome: &'static str, waited: Duration) {
    metrics::counter!(
        "ferry_jobs_completed_total",
        "provider" => provider.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    metrics::histogram!("ferry_job_wait_seconds", "provider" => provider.to_string())
        .record(waited.as_secs_f64());
}
