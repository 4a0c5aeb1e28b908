use std::sync::Arc;

use crate::api::middleware::AppError;
use crate::models::{Job, OutputFormat};
use crate::services::analyzer::analyze;
use crate::services::instance_resolver::resolve_database_uri;
use crate::services::job_manager::{new_job_id, JobManager};
use crate::services::metaserv::MetaservCatalog;
use crate::services::query_task::QueryTask;
use crate::services::rewrite::{rewrite_adql, strip_instance_identifiers, SpatialDialect};
use crate::validation::SqlValidator;

/// Accepts ADQL statements and turns them into running jobs.
///
/// Everything up to job creation happens synchronously so that parse and
/// resolution failures reach the submitter directly and never create a job.
pub struct QueryService {
    catalog: Arc<dyn MetaservCatalog>,
    jobs: Arc<JobManager>,
    engine_scheme: String,
}

impl QueryService {
    pub fn new(catalog: Arc<dyn MetaservCatalog>, jobs: Arc<JobManager>, engine_scheme: impl Into<String>) -> Self {
        Self {
            catalog,
            jobs,
            engine_scheme: engine_scheme.into(),
        }
    }

    pub fn jobs(&self) -> &Arc<JobManager> {
        &self.jobs
    }

    pub async fn submit(&self, sql: &str, format: OutputFormat) -> Result<Job, AppError> {
        tracing::info!("Received query [{}]", sql.trim());

        let statement = SqlValidator::validate_read_only(sql)?;
        let analysis = analyze(&statement);
        let database_uri =
            resolve_database_uri(self.catalog.as_ref(), &analysis.tables, &self.engine_scheme).await?;

        let stripped = strip_instance_identifiers(statement)?;
        let dialect = SpatialDialect::for_uri(&database_uri);
        let statement = rewrite_adql(stripped.statement, dialect)?;
        tracing::debug!("Rewritten for {:?} at {}", dialect, database_uri);

        let task = QueryTask {
            job_id: new_job_id(),
            database_uri,
            statement,
            has_boolean_literals: stripped.has_boolean_literals,
            analysis,
            format,
        };
        Ok(self.jobs.submit(sql.to_string(), task).await)
    }
}
