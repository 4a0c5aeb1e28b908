use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

use crate::api::middleware::AppError;
use crate::models::{JobError, OutputFormat};
use crate::services::analyzer::Analysis;
use crate::services::catalog_lookup::lookup_metadata;
use crate::services::credentials::{mask_credentials, ServiceAccountConnections};
use crate::services::database::BackendRegistry;
use crate::services::metaserv::MetaservCatalog;
use crate::services::result_stream::ResultStream;
use crate::services::result_writer::ResultWriter;
use crate::sql::ast::Statement;
use crate::sql::{format_statement, FormatOptions, QuoteStyle};
use crate::storage::JobArtifacts;

/// Services shared by every job execution.
#[derive(Clone)]
pub struct ExecutionContext {
    pub catalog: Arc<dyn MetaservCatalog>,
    pub credentials: Arc<ServiceAccountConnections>,
    pub backends: BackendRegistry,
    pub base_path: PathBuf,
    pub fetch_size: usize,
}

/// Everything needed to execute one accepted query.
#[derive(Debug, Clone)]
pub struct QueryTask {
    pub job_id: String,
    pub database_uri: String,
    /// Stripped and rewritten, ready to format for the engine.
    pub statement: Statement,
    pub has_boolean_literals: bool,
    /// Analysis of the statement as submitted.
    pub analysis: Analysis,
    pub format: OutputFormat,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Completed { result_location: PathBuf },
    Failed { error_location: PathBuf, error: JobError },
}

impl QueryTask {
    /// Execute and persist the outcome. Never returns an error: failures are
    /// written to the job's `error` artifact.
    pub async fn run(self, context: &ExecutionContext) -> TaskOutcome {
        let artifacts = JobArtifacts::new(&context.base_path, &self.job_id);
        match self.execute(context, &artifacts).await {
            Ok(result_location) => {
                tracing::info!("Query {} completed", self.job_id);
                TaskOutcome::Completed { result_location }
            }
            Err(e) => {
                tracing::error!("Query {} failed: {}", self.job_id, e);
                let error = JobError::from(&e);
                let error_location = match artifacts.write_error(&error).await {
                    Ok(path) => path,
                    Err(write_err) => {
                        tracing::error!(
                            "Could not persist error for query {}: {}",
                            self.job_id,
                            write_err
                        );
                        artifacts.error_path()
                    }
                };
                TaskOutcome::Failed {
                    error_location,
                    error,
                }
            }
        }
    }

    /// SQL text sent to the engine.
    pub fn engine_sql(&self, quote_style: QuoteStyle, integer_booleans: bool) -> String {
        let quote_style = match self.statement {
            Statement::Query(_) => quote_style,
            Statement::ShowColumns(_) => QuoteStyle::None,
        };
        format_statement(
            &self.statement,
            FormatOptions {
                quote_style,
                booleans_as_integers: self.has_boolean_literals && integer_booleans,
            },
        )
    }

    async fn execute(
        &self,
        context: &ExecutionContext,
        artifacts: &JobArtifacts,
    ) -> Result<PathBuf, AppError> {
        artifacts.create_dir().await?;

        let catalog = lookup_metadata(context.catalog.as_ref(), &self.analysis.tables).await;
        tracing::debug!("Query {}: {} tables found in catalog", self.job_id, catalog.len());

        let backend = context.backends.for_uri(&self.database_uri)?;
        let sql = self.engine_sql(backend.quote_style(), backend.requires_integer_booleans());
        let connection_url = context.credentials.connection_url(&self.database_uri)?;
        tracing::info!(
            "Query {} executing on {} ({})",
            self.job_id,
            mask_credentials(&connection_url),
            backend.database_type()
        );

        let cursor = backend.execute(&connection_url, &sql, context.fetch_size).await?;
        let mut stream = ResultStream::open(
            cursor,
            artifacts.dir(),
            context.fetch_size,
            self.analysis.clone(),
            catalog,
        )
        .await?;

        let result_path = artifacts.result_path();
        let written = match tokio::fs::File::create(&result_path).await {
            Ok(file) => {
                let mut out = BufWriter::new(file);
                let mut writer = ResultWriter::new(self.format, self.job_id.as_str());
                write_results(&mut stream, &mut out, &mut writer).await
            }
            Err(e) => Err(e.into()),
        };
        let closed = stream.close().await;

        let rows = match written.and_then(|rows| closed.map(|()| rows)) {
            Ok(rows) => rows,
            Err(e) => {
                // A partial result must not be served.
                if let Err(remove_err) = tokio::fs::remove_file(&result_path).await {
                    if remove_err.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!("Could not remove partial result {}: {}", result_path.display(), remove_err);
                    }
                }
                return Err(e);
            }
        };

        tracing::debug!("Query {}: {} of {} rows written", self.job_id, rows, stream.rows_read());
        Ok(result_path)
    }
}

async fn write_results<W>(
    stream: &mut ResultStream,
    out: &mut W,
    writer: &mut ResultWriter,
) -> Result<u64, AppError>
where
    W: AsyncWrite + Unpin,
{
    let header = writer.header(stream.column_metadata())?;
    out.write_all(header.as_bytes()).await?;
    while let Some(row) = stream.next_row().await? {
        out.write_all(writer.row(&row)?.as_bytes()).await?;
    }
    out.write_all(writer.footer().as_bytes()).await?;
    out.flush().await?;
    Ok(writer.rows_written())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CatalogColumn, CellValue, EngineType};
    use crate::services::analyzer::analyze;
    use crate::services::credentials::Credential;
    use crate::services::database::memory::{column, Failure, MemoryBackend};
    use crate::services::metaserv::InMemoryCatalog;
    use crate::services::rewrite::strip_instance_identifiers;
    use crate::sql::parse_statement;

    fn context(backend: MemoryBackend, base_path: PathBuf) -> ExecutionContext {
        let mut catalog = InMemoryCatalog::new();
        let db = catalog.add_database("lsst", "db", 3306);
        let schema = catalog.add_schema(db, "sdss", true);
        let table = catalog.add_table(schema, "Object");
        catalog.add_column(
            table,
            CatalogColumn::described(0, 0, "ra", "double", Some("pos.eq.ra"), Some("deg")),
        );

        ExecutionContext {
            catalog: Arc::new(catalog),
            credentials: Arc::new(ServiceAccountConnections::new(vec![Credential {
                server: "db".to_string(),
                port: 3306,
                username: Some("reader".to_string()),
                password: Some("pw".to_string()),
            }])),
            backends: BackendRegistry::new().register(Arc::new(backend)),
            base_path,
            fetch_size: 2,
        }
    }

    fn task(sql: &str, format: OutputFormat) -> QueryTask {
        let statement = parse_statement(sql).unwrap();
        let analysis = analyze(&statement);
        let stripped = strip_instance_identifiers(statement).unwrap();
        QueryTask {
            job_id: "job-1".to_string(),
            database_uri: "mysql://db:3306/sdss".to_string(),
            statement: stripped.statement,
            has_boolean_literals: stripped.has_boolean_literals,
            analysis,
            format,
        }
    }

    fn object_backend() -> MemoryBackend {
        MemoryBackend::new(
            vec![column("ra", 1, EngineType::Double), column("id", 2, EngineType::BigInt)],
            vec![
                vec![CellValue::Real(10.5), CellValue::Integer(1)],
                vec![CellValue::Real(11.0), CellValue::Integer(2)],
                vec![CellValue::Real(12.5), CellValue::Null],
            ],
        )
    }

    #[tokio::test]
    async fn test_completed_query_writes_result_and_mirror() {
        let base = tempfile::tempdir().unwrap();
        let backend = object_backend();
        let ctx = context(backend.clone(), base.path().to_path_buf());

        let outcome = task("SELECT o.ra, o.id FROM lsst.sdss.Object o WHERE o.flag = true", OutputFormat::Json)
            .run(&ctx)
            .await;

        let result_location = base.path().join("job-1").join("result");
        assert_eq!(outcome, TaskOutcome::Completed { result_location: result_location.clone() });
        assert!(base.path().join("job-1").join("result.sqlite").exists());

        let (url, sql) = backend.executed().remove(0);
        assert_eq!(url, "mysql://reader:pw@db:3306/sdss");
        assert_eq!(sql, "SELECT o.ra, o.id FROM sdss.Object AS o WHERE o.flag = 1");

        let body: serde_json::Value =
            serde_json::from_slice(&std::fs::read(result_location).unwrap()).unwrap();
        assert_eq!(body["metadata"]["columns"][0]["unit"], "deg");
        assert_eq!(body["metadata"]["columns"][0]["tableName"], "Object");
        assert_eq!(body["metadata"]["columns"][1]["datatype"], "long");
        assert_eq!(body["results"], serde_json::json!([[10.5, 1], [11.0, 2], [12.5, null]]));
        assert_eq!(backend.closes(), 1);
    }

    #[tokio::test]
    async fn test_votable_result() {
        let base = tempfile::tempdir().unwrap();
        let ctx = context(object_backend(), base.path().to_path_buf());

        task("SELECT ra, id FROM lsst.sdss.Object", OutputFormat::VoTable).run(&ctx).await;

        let body = std::fs::read_to_string(base.path().join("job-1").join("result")).unwrap();
        assert!(body.contains("<RESOURCE name=\"Result for query: job-1\" type=\"meta\">"));
        assert!(body.contains("<FIELD name=\"ra\" ucd=\"pos.eq.ra\" datatype=\"double\" unit=\"deg\">"));
        assert!(body.contains("<TR><TD>12.5</TD><TD/></TR>"));
    }

    #[tokio::test]
    async fn test_execution_error_is_persisted() {
        let base = tempfile::tempdir().unwrap();
        let backend = MemoryBackend::failing(Failure::Execute {
            message: "Table 'sdss.Nope' doesn't exist".to_string(),
            state: "42S02".to_string(),
            code: 1146,
        });
        let ctx = context(backend, base.path().to_path_buf());

        let outcome = task("SELECT * FROM lsst.sdss.Nope", OutputFormat::Json).run(&ctx).await;

        let TaskOutcome::Failed { error_location, error } = outcome else {
            panic!("expected failure");
        };
        assert_eq!(error_location, base.path().join("job-1").join("error"));
        assert_eq!(error.kind, "SQLException");
        assert_eq!(error.state.as_deref(), Some("42S02"));
        assert_eq!(error.code.as_deref(), Some("1146"));

        let persisted: JobError =
            serde_json::from_slice(&std::fs::read(error_location).unwrap()).unwrap();
        assert_eq!(persisted, error);
        assert!(!base.path().join("job-1").join("result").exists());
    }

    #[tokio::test]
    async fn test_failure_mid_stream_leaves_no_partial_result() {
        let base = tempfile::tempdir().unwrap();
        let backend = MemoryBackend::with_failure(
            vec![column("ra", 1, EngineType::Double)],
            vec![vec![CellValue::Real(1.0)], vec![CellValue::Real(2.0)]],
            Failure::MidStream {
                after: 1,
                message: "Lost connection".to_string(),
            },
        );
        let ctx = context(backend.clone(), base.path().to_path_buf());

        let outcome = task("SELECT ra FROM lsst.sdss.Object", OutputFormat::Json).run(&ctx).await;

        assert!(matches!(outcome, TaskOutcome::Failed { .. }));
        assert!(!base.path().join("job-1").join("result").exists());
        assert!(base.path().join("job-1").join("error").exists());
        assert_eq!(backend.closes(), 1);
    }

    #[test]
    fn test_show_columns_is_unquoted() {
        let task = task("SHOW COLUMNS FROM lsst.sdss.Object", OutputFormat::Json);
        assert_eq!(task.engine_sql(QuoteStyle::Backtick, true), "SHOW COLUMNS FROM sdss.Object");
    }

    #[test]
    fn test_booleans_kept_for_engines_that_accept_them() {
        let task = task("SELECT ra FROM lsst.sdss.Object WHERE flag = false", OutputFormat::Json);
        assert_eq!(
            task.engine_sql(QuoteStyle::Double, false),
            "SELECT ra FROM sdss.Object WHERE flag = FALSE"
        );
        assert_eq!(
            task.engine_sql(QuoteStyle::Double, true),
            "SELECT ra FROM sdss.Object WHERE flag = 0"
        );
    }
}
