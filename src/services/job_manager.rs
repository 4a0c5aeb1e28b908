use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock, Semaphore};
use tokio::task::JoinHandle;

use crate::api::middleware::AppError;
use crate::models::{Job, JobError, Phase};
use crate::services::query_task::{ExecutionContext, QueryTask, TaskOutcome};
use crate::storage::JobArtifacts;

/// Limits applied by the job manager.
#[derive(Debug, Clone)]
pub struct JobSettings {
    pub max_concurrent: usize,
    /// How long a result request waits for a running job.
    pub result_timeout: Duration,
    /// Terminal jobs older than this are forgotten. `None` keeps them forever.
    pub retention: Option<Duration>,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            max_concurrent: num_cpus::get() * 2,
            result_timeout: Duration::from_secs(600),
            retention: None,
        }
    }
}

/// In-memory registry of submitted jobs.
///
/// Each job's state lives in a watch channel: polling reads the latest value,
/// result requests wait on it until the phase is terminal.
pub struct JobManager {
    jobs: Arc<RwLock<HashMap<String, watch::Sender<Job>>>>,
    context: Arc<ExecutionContext>,
    permits: Arc<Semaphore>,
    settings: JobSettings,
}

impl JobManager {
    pub fn new(context: ExecutionContext, settings: JobSettings) -> Self {
        tracing::info!(
            "Job manager: {} concurrent jobs, results under {}",
            settings.max_concurrent,
            context.base_path.display()
        );
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            permits: Arc::new(Semaphore::new(settings.max_concurrent.max(1))),
            context: Arc::new(context),
            settings,
        }
    }

    /// Register a job for `task` and start it. The job is already EXECUTING
    /// when this returns.
    pub async fn submit(&self, parameters: String, task: QueryTask) -> Job {
        let mut job = Job::new(parameters, task.format);
        job.id = task.job_id.clone();
        job.mark_executing();

        let (state, _) = watch::channel(job.clone());
        self.jobs.write().await.insert(job.id.clone(), state.clone());
        tracing::info!("Query {} submitted: {}", job.id, job.phase);

        let context = self.context.clone();
        let permits = self.permits.clone();
        let job_id = job.id.clone();
        tokio::spawn(async move {
            let outcome = match permits.acquire_owned().await {
                Ok(_permit) => {
                    let run = tokio::spawn({
                        let context = context.clone();
                        async move { task.run(&context).await }
                    });
                    match run.await {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            failed(&context, &job_id, AppError::Internal(format!("Query task aborted: {}", e)))
                                .await
                        }
                    }
                }
                Err(_) => {
                    failed(&context, &job_id, AppError::Internal("Job manager shut down".to_string())).await
                }
            };

            state.send_modify(|job| match outcome {
                TaskOutcome::Completed { result_location } => job.mark_completed(result_location),
                TaskOutcome::Failed { error_location, error } => {
                    job.mark_failed(error_location, error)
                }
            });
            tracing::info!("Query {} finished: {}", job_id, state.borrow().phase);
        });

        job
    }

    /// Current state of a job.
    pub async fn get(&self, job_id: &str) -> Result<Job, AppError> {
        let jobs = self.jobs.read().await;
        jobs.get(job_id)
            .map(|state| state.borrow().clone())
            .ok_or_else(|| not_found(job_id))
    }

    pub async fn phase(&self, job_id: &str) -> Result<Phase, AppError> {
        Ok(self.get(job_id).await?.phase)
    }

    /// Wait until the job is COMPLETED or ERROR, bounded by the result timeout.
    pub async fn wait_for_completion(&self, job_id: &str) -> Result<Job, AppError> {
        let mut receiver = {
            let jobs = self.jobs.read().await;
            jobs.get(job_id)
                .map(|state| state.subscribe())
                .ok_or_else(|| not_found(job_id))?
        };

        let timeout = self.settings.result_timeout;
        let waited = tokio::time::timeout(timeout, receiver.wait_for(|job| job.phase.is_terminal())).await;
        match waited {
            Ok(Ok(job)) => Ok(job.clone()),
            Ok(Err(_)) => Err(AppError::Internal(format!("Job {} state was dropped", job_id))),
            Err(_) => Err(AppError::Timeout(format!(
                "Query {} still running after {} seconds",
                job_id,
                timeout.as_secs()
            ))),
        }
    }

    /// Persisted error of a failed job; `None` if the job did not fail.
    pub async fn error(&self, job_id: &str) -> Result<Option<JobError>, AppError> {
        let job = self.get(job_id).await?;
        if job.phase != Phase::Error {
            return Ok(None);
        }
        if job.error.is_some() {
            return Ok(job.error);
        }
        self.artifacts(job_id).read_error().await
    }

    pub fn artifacts(&self, job_id: &str) -> JobArtifacts {
        JobArtifacts::new(&self.context.base_path, job_id)
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// Drop terminal jobs that finished more than the retention period ago,
    /// together with their artifacts. Returns how many were removed.
    pub async fn evict_expired(&self) -> usize {
        let Some(retention) = self.settings.retention else {
            return 0;
        };
        let Ok(retention) = chrono::Duration::from_std(retention) else {
            return 0;
        };
        let cutoff = chrono::Utc::now() - retention;

        let expired: Vec<String> = {
            let mut jobs = self.jobs.write().await;
            let expired: Vec<String> = jobs
                .iter()
                .filter(|(_, state)| {
                    let job = state.borrow();
                    job.phase.is_terminal() && job.finished_at.is_some_and(|at| at <= cutoff)
                })
                .map(|(id, _)| id.clone())
                .collect();
            for id in &expired {
                jobs.remove(id);
            }
            expired
        };

        for id in &expired {
            if let Err(e) = self.artifacts(id).remove().await {
                tracing::warn!("Could not remove artifacts of query {}: {}", id, e);
            }
        }
        if !expired.is_empty() {
            tracing::info!("Evicted {} expired queries", expired.len());
        }
        expired.len()
    }

    /// Periodically evict expired jobs. Returns `None` when retention is off.
    pub fn start_retention_task(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let retention = self.settings.retention?;
        let period = (retention / 2).max(Duration::from_secs(1));
        let manager = Arc::clone(self);
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                manager.evict_expired().await;
            }
        }))
    }
}

async fn failed(context: &ExecutionContext, job_id: &str, err: AppError) -> TaskOutcome {
    tracing::error!("Query {} failed: {}", job_id, err);
    let error = JobError::from(&err);
    let artifacts = JobArtifacts::new(&context.base_path, job_id);
    let error_location = match artifacts.create_dir().await {
        Ok(()) => artifacts.write_error(&error).await.unwrap_or_else(|_| artifacts.error_path()),
        Err(_) => artifacts.error_path(),
    };
    TaskOutcome::Failed {
        error_location,
        error,
    }
}

fn not_found(job_id: &str) -> AppError {
    AppError::NotFound(format!("Query {} not found", job_id))
}

/// Build a job id for a new submission.
pub fn new_job_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
