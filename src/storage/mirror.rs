use rusqlite::types::{ToSql, ToSqlOutput, Value as SqliteValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::api::middleware::AppError;
use crate::models::{CellValue, JdbcColumnMetadata, Row};

pub const MIRROR_FILE_NAME: &str = "result.sqlite";

/// Embedded copy of a job's streamed rows, in a single table named `result`.
/// Inserts run inside a transaction that is committed every `batch_size` rows
/// and once more when the store is closed.
pub struct MirrorStore {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
    insert_sql: String,
    batch_size: usize,
    pending: usize,
    rows_written: u64,
    closed: bool,
}

impl MirrorStore {
    /// Create `result.sqlite` under `job_dir` with one column per live column.
    pub async fn create(
        job_dir: &Path,
        columns: &[JdbcColumnMetadata],
        batch_size: usize,
    ) -> Result<Self, AppError> {
        let path = job_dir.join(MIRROR_FILE_NAME);
        let conn = Connection::open(&path)?;

        conn.execute_batch(&create_table_sql(columns))?;
        conn.execute_batch("BEGIN")?;

        let placeholders = vec!["?"; columns.len()].join(",");
        tracing::debug!("Mirroring {} columns to {}", columns.len(), path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
            insert_sql: format!("INSERT INTO result VALUES ({})", placeholders),
            batch_size: batch_size.max(1),
            pending: 0,
            rows_written: 0,
            closed: false,
        })
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    pub async fn append(&mut self, row: &Row) -> Result<(), AppError> {
        if self.closed {
            return Err(AppError::Storage("Mirror store already closed".to_string()));
        }

        let conn = self.conn.lock().await;
        conn.prepare_cached(&self.insert_sql)?
            .execute(params_from_iter(row.iter()))?;
        self.pending += 1;
        self.rows_written += 1;

        if self.pending >= self.batch_size {
            conn.execute_batch("COMMIT; BEGIN")?;
            self.pending = 0;
        }
        Ok(())
    }

    /// Commit whatever is pending. Safe to call more than once.
    pub async fn close(&mut self) -> Result<(), AppError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let conn = self.conn.lock().await;
        conn.execute_batch("COMMIT")?;
        tracing::debug!("Mirror {} closed after {} rows", self.path.display(), self.rows_written);
        Ok(())
    }

    /// Re-read mirrored rows, in insertion order.
    pub async fn read_rows(&self) -> Result<Vec<Row>, AppError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT * FROM result ORDER BY rowid")?;
        let width = stmt.column_count();
        let rows = stmt
            .query_map([], |row| {
                (0..width)
                    .map(|i| row.get::<_, SqliteValue>(i).map(from_sqlite))
                    .collect::<Result<Row, _>>()
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn create_table_sql(columns: &[JdbcColumnMetadata]) -> String {
    let mut seen = HashSet::new();
    let definitions: Vec<String> = columns
        .iter()
        .map(|column| {
            let mut name = column.display_name().to_string();
            // Joins can return the same name twice; SQLite needs them distinct.
            if !seen.insert(name.to_lowercase()) {
                name = format!("{}_{}", name, column.ordinal);
                seen.insert(name.to_lowercase());
            }
            format!(
                "\"{}\" {}",
                name.replace('"', "\"\""),
                column.engine_type.sqlite_affinity()
            )
        })
        .collect();
    format!("CREATE TABLE IF NOT EXISTS result ({})", definitions.join(", "))
}

fn from_sqlite(value: SqliteValue) -> CellValue {
    match value {
        SqliteValue::Null => CellValue::Null,
        SqliteValue::Integer(i) => CellValue::Integer(i),
        SqliteValue::Real(f) => CellValue::Real(f),
        SqliteValue::Text(s) => CellValue::Text(s),
        SqliteValue::Blob(b) => CellValue::Bytes(b),
    }
}

impl ToSql for CellValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            CellValue::Null => ToSqlOutput::Owned(SqliteValue::Null),
            CellValue::Integer(i) => ToSqlOutput::from(*i),
            CellValue::Real(f) => ToSqlOutput::from(*f),
            CellValue::Boolean(b) => ToSqlOutput::from(*b),
            CellValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            CellValue::Bytes(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}
