use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::api::middleware::AppError;
use crate::models::JobError;

pub const RESULT_FILE_NAME: &str = "result";
pub const ERROR_FILE_NAME: &str = "error";

/// On-disk artifacts of a single job: `{base}/{job_id}/` holding the
/// `result` file, the `error` file and the mirror database.
#[derive(Debug, Clone)]
pub struct JobArtifacts {
    dir: PathBuf,
}

impl JobArtifacts {
    pub fn new(base_path: &Path, job_id: &str) -> Self {
        Self {
            dir: base_path.join(job_id),
        }
    }

    pub async fn create_dir(&self) -> Result<(), AppError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn result_path(&self) -> PathBuf {
        self.dir.join(RESULT_FILE_NAME)
    }

    pub fn error_path(&self) -> PathBuf {
        self.dir.join(ERROR_FILE_NAME)
    }

    pub async fn write_error(&self, error: &JobError) -> Result<PathBuf, AppError> {
        let path = self.error_path();
        let body = serde_json::to_vec(error)?;
        let mut file = tokio::fs::File::create(&path).await?;
        file.write_all(&body).await?;
        file.flush().await?;
        Ok(path)
    }

    pub async fn read_error(&self) -> Result<Option<JobError>, AppError> {
        match tokio::fs::read(self.error_path()).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn read_result(&self) -> Result<Option<Vec<u8>>, AppError> {
        match tokio::fs::read(self.result_path()).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn remove(&self) -> Result<(), AppError> {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
