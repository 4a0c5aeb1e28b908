use crate::api::middleware::AppError;
use crate::models::{ColumnMetadata, Row};
use crate::services::analyzer::Analysis;
use crate::services::catalog_lookup::CatalogEntry;
use crate::services::database::RowCursor;
use crate::services::metadata_reconciler::associate_metadata;
use crate::storage::MirrorStore;
use std::path::Path;

/// Rows of one execution, read lazily from the engine cursor and mirrored
/// into the job's embedded store as they pass through.
///
/// The cursor and the mirror are released exactly once: at end of rows, on
/// the first error, or on an explicit `close`.
pub struct ResultStream {
    cursor: Box<dyn RowCursor>,
    mirror: MirrorStore,
    analysis: Analysis,
    catalog: Vec<CatalogEntry>,
    metadata: Option<Vec<ColumnMetadata>>,
    rows_read: u64,
    closed: bool,
}

impl ResultStream {
    pub async fn open(
        mut cursor: Box<dyn RowCursor>,
        job_dir: &Path,
        fetch_size: usize,
        analysis: Analysis,
        catalog: Vec<CatalogEntry>,
    ) -> Result<Self, AppError> {
        let mirror = match MirrorStore::create(job_dir, cursor.columns(), fetch_size).await {
            Ok(mirror) => mirror,
            Err(e) => {
                if let Err(close_err) = cursor.close().await {
                    tracing::warn!("Failed to close cursor: {}", close_err);
                }
                return Err(e);
            }
        };

        Ok(Self {
            cursor,
            mirror,
            analysis,
            catalog,
            metadata: None,
            rows_read: 0,
            closed: false,
        })
    }

    /// Output column metadata, reconciled with the catalog on first access.
    pub fn column_metadata(&mut self) -> &[ColumnMetadata] {
        let cursor = &self.cursor;
        let analysis = &self.analysis;
        let catalog = &self.catalog;
        self.metadata
            .get_or_insert_with(|| associate_metadata(analysis, cursor.columns(), catalog))
    }

    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    pub async fn next_row(&mut self) -> Result<Option<Row>, AppError> {
        if self.closed {
            return Ok(None);
        }

        let row = match self.cursor.next_row().await {
            Ok(Some(row)) => row,
            Ok(None) => {
                self.close().await?;
                return Ok(None);
            }
            Err(e) => {
                self.release().await;
                return Err(e);
            }
        };

        if let Err(e) = self.mirror.append(&row).await {
            self.release().await;
            return Err(e);
        }
        self.rows_read += 1;
        Ok(Some(row))
    }

    /// Release the cursor and commit the mirror, reporting the first failure.
    pub async fn close(&mut self) -> Result<(), AppError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let mirror = self.mirror.close().await;
        let cursor = self.cursor.close().await;
        tracing::debug!("Result stream closed after {} rows", self.rows_read);
        mirror.and(cursor)
    }

    async fn release(&mut self) {
        if let Err(e) = self.close().await {
            tracing::warn!("Cleanup after failed fetch also failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CellValue, EngineType};
    use crate::services::analyzer::analyze;
    use crate::services::database::memory::{column, Failure, MemoryBackend};
    use crate::services::database::ExecutionBackend;
    use crate::sql::parse_statement;

    fn rows(n: i64) -> Vec<Row> {
        (0..n)
            .map(|i| vec![CellValue::Integer(i), CellValue::Real(i as f64)])
            .collect()
    }

    async fn open(backend: &MemoryBackend, dir: &Path) -> ResultStream {
        let cursor = backend.execute("mysql://db/sdss", "SELECT id, ra FROM Object", 10).await.unwrap();
        let analysis = analyze(&parse_statement("SELECT id, ra FROM Object").unwrap());
        ResultStream::open(cursor, dir, 2, analysis, vec![]).await.unwrap()
    }

    #[tokio::test]
    async fn test_rows_are_mirrored_and_resources_released() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MemoryBackend::new(
            vec![column("id", 1, EngineType::BigInt), column("ra", 2, EngineType::Double)],
            rows(3),
        );
        let mut stream = open(&backend, dir.path()).await;

        let metadata = stream.column_metadata().to_vec();
        assert_eq!(metadata[0].name, "id");
        assert_eq!(metadata[1].datatype.as_deref(), Some("double"));

        let mut seen = 0;
        while let Some(row) = stream.next_row().await.unwrap() {
            assert_eq!(row[0], CellValue::Integer(seen));
            seen += 1;
        }
        assert_eq!(seen, 3);
        assert_eq!(stream.rows_read(), 3);
        assert_eq!(backend.closes(), 1);

        // Further reads and closes are no-ops.
        assert!(stream.next_row().await.unwrap().is_none());
        stream.close().await.unwrap();
        assert_eq!(backend.closes(), 1);

        let mirrored = stream.mirror.read_rows().await.unwrap();
        assert_eq!(mirrored.len(), 3);
    }

    #[tokio::test]
    async fn test_failure_mid_stream_releases_resources() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MemoryBackend::with_failure(
            vec![column("id", 1, EngineType::BigInt), column("ra", 2, EngineType::Double)],
            rows(5),
            Failure::MidStream {
                after: 3,
                message: "Lost connection to MySQL server during query".to_string(),
            },
        );
        let mut stream = open(&backend, dir.path()).await;

        for _ in 0..3 {
            assert!(stream.next_row().await.unwrap().is_some());
        }
        let err = stream.next_row().await.unwrap_err();
        assert!(matches!(err, AppError::Execution { .. }));
        assert_eq!(backend.closes(), 1);

        // Rows read before the failure stay in the mirror.
        assert_eq!(stream.mirror.read_rows().await.unwrap().len(), 3);
    }
}
