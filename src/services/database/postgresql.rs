// PostgreSQL backend. One connection per execution; rows are read through a
// server-side cursor, `fetch_size` rows per round trip.
use futures::TryStreamExt;
use std::pin::Pin;
use tokio::task::JoinHandle;
use tokio_postgres::types::{Kind, Type};
use tokio_postgres::{Client, NoTls, RowStream, Statement};

use crate::api::middleware::AppError;
use crate::models::{CellValue, EngineType, JdbcColumnMetadata, Row};
use crate::services::credentials::mask_credentials;
use crate::services::database::adapter::{ExecutionBackend, RowCursor};
use crate::sql::QuoteStyle;

const CURSOR_NAME: &str = "gateway_result";

fn declare_statement(sql: &str) -> String {
    format!("DECLARE {} NO SCROLL CURSOR FOR {}", CURSOR_NAME, sql)
}

fn fetch_statement(fetch_size: usize) -> String {
    format!("FETCH FORWARD {} FROM {}", fetch_size.max(1), CURSOR_NAME)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PostgreSQLBackend;

impl PostgreSQLBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl ExecutionBackend for PostgreSQLBackend {
    fn database_type(&self) -> &str {
        "postgresql"
    }

    fn supports_scheme(&self, scheme: &str) -> bool {
        matches!(scheme, "postgres" | "postgresql")
    }

    fn quote_style(&self) -> QuoteStyle {
        QuoteStyle::Double
    }

    async fn execute(
        &self,
        connection_url: &str,
        sql: &str,
        fetch_size: usize,
    ) -> Result<Box<dyn RowCursor>, AppError> {
        tracing::debug!("Executing on {}: {}", mask_credentials(connection_url), sql);

        let (client, connection) = tokio_postgres::connect(connection_url, NoTls)
            .await
            .map_err(|e| AppError::Connection(format!("Failed to connect to PostgreSQL: {}", e)))?;
        let connection_task = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::warn!("PostgreSQL connection error: {}", e);
            }
        });

        let statement = client.prepare(sql).await?;
        let columns: Vec<JdbcColumnMetadata> = statement
            .columns()
            .iter()
            .enumerate()
            .map(|(idx, column)| JdbcColumnMetadata {
                name: column.name().to_string(),
                label: None,
                table_name: String::new(),
                ordinal: idx + 1,
                type_name: column.type_().name().to_string(),
                schema_name: None,
                catalog_name: None,
                nullable: true,
                engine_type: engine_type(column.type_()),
            })
            .collect();
        let types = statement.columns().iter().map(|c| c.type_().clone()).collect();

        // Cursors only live inside a transaction.
        client.batch_execute("BEGIN READ ONLY").await?;
        client.batch_execute(&declare_statement(sql)).await?;
        let fetch = client.prepare(&fetch_statement(fetch_size)).await?;

        Ok(Box::new(PostgreSQLCursor {
            columns,
            types,
            fetch,
            fetch_size: fetch_size.max(1),
            batch_rows: 0,
            exhausted: false,
            stream: None,
            client: Some(client),
            connection_task: Some(connection_task),
        }))
    }
}

pub struct PostgreSQLCursor {
    columns: Vec<JdbcColumnMetadata>,
    types: Vec<Type>,
    fetch: Statement,
    fetch_size: usize,
    /// Rows taken from the current batch so far.
    batch_rows: usize,
    exhausted: bool,
    stream: Option<Pin<Box<RowStream>>>,
    client: Option<Client>,
    connection_task: Option<JoinHandle<()>>,
}

impl PostgreSQLCursor {
    /// Next row of the current batch, fetching a new batch when it runs out.
    async fn next_pg_row(&mut self) -> Result<Option<tokio_postgres::Row>, AppError> {
        loop {
            if let Some(stream) = self.stream.as_mut() {
                if let Some(row) = stream.try_next().await? {
                    self.batch_rows += 1;
                    return Ok(Some(row));
                }
                self.stream = None;
                // A short batch means the cursor is drained.
                if self.batch_rows < self.fetch_size {
                    self.exhausted = true;
                }
            }
            if self.exhausted {
                return Ok(None);
            }
            let Some(client) = self.client.as_ref() else {
                return Ok(None);
            };
            let stream = client.query_raw(&self.fetch, Vec::<String>::new()).await?;
            self.batch_rows = 0;
            self.stream = Some(Box::pin(stream));
        }
    }
}

#[async_trait::async_trait]
impl RowCursor for PostgreSQLCursor {
    fn columns(&self) -> &[JdbcColumnMetadata] {
        &self.columns
    }

    async fn next_row(&mut self) -> Result<Option<Row>, AppError> {
        let Some(row) = self.next_pg_row().await? else {
            return Ok(None);
        };

        let values = self
            .types
            .iter()
            .enumerate()
            .map(|(idx, pg_type)| postgres_value_to_cell(&row, idx, pg_type))
            .collect();
        Ok(Some(values))
    }

    async fn close(&mut self) -> Result<(), AppError> {
        self.stream = None;
        if let Some(client) = self.client.take() {
            let end = format!("CLOSE {}; COMMIT", CURSOR_NAME);
            if let Err(e) = client.batch_execute(&end).await {
                tracing::warn!("Could not close PostgreSQL cursor: {}", e);
            }
        }
        if let Some(task) = self.connection_task.take() {
            task.await
                .map_err(|e| AppError::Internal(format!("PostgreSQL connection task failed: {}", e)))?;
        }
        Ok(())
    }
}

fn engine_type(pg_type: &Type) -> EngineType {
    if let Kind::Array(_) = pg_type.kind() {
        return EngineType::Array;
    }
    match *pg_type {
        Type::BOOL => EngineType::Boolean,
        Type::INT2 => EngineType::SmallInt,
        Type::INT4 => EngineType::Integer,
        Type::INT8 | Type::OID => EngineType::BigInt,
        Type::FLOAT4 => EngineType::Real,
        Type::FLOAT8 => EngineType::Double,
        Type::NUMERIC => EngineType::Numeric,
        Type::TEXT | Type::VARCHAR | Type::NAME => EngineType::VarChar,
        Type::BPCHAR => EngineType::Char,
        Type::BYTEA => EngineType::Binary,
        Type::DATE => EngineType::Date,
        Type::TIME => EngineType::Time,
        Type::TIMESTAMP => EngineType::Timestamp,
        Type::TIMESTAMPTZ => EngineType::TimestampWithTimezone,
        Type::JSON | Type::JSONB => EngineType::Json,
        _ => EngineType::Other,
    }
}

fn postgres_value_to_cell(row: &tokio_postgres::Row, idx: usize, pg_type: &Type) -> CellValue {
    let value = match *pg_type {
        Type::BOOL => row
            .try_get::<_, Option<bool>>(idx)
            .map(|v| v.map(CellValue::Boolean)),
        Type::INT2 => row
            .try_get::<_, Option<i16>>(idx)
            .map(|v| v.map(|i| CellValue::Integer(i as i64))),
        Type::INT4 => row
            .try_get::<_, Option<i32>>(idx)
            .map(|v| v.map(|i| CellValue::Integer(i as i64))),
        Type::INT8 => row
            .try_get::<_, Option<i64>>(idx)
            .map(|v| v.map(CellValue::Integer)),
        Type::OID => row
            .try_get::<_, Option<u32>>(idx)
            .map(|v| v.map(|i| CellValue::Integer(i as i64))),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)
            .map(|v| v.map(|f| CellValue::Real(f as f64))),
        Type::FLOAT8 => row
            .try_get::<_, Option<f64>>(idx)
            .map(|v| v.map(CellValue::Real)),
        Type::BYTEA => row
            .try_get::<_, Option<Vec<u8>>>(idx)
            .map(|v| v.map(CellValue::Bytes)),
        Type::DATE => row
            .try_get::<_, Option<chrono::NaiveDate>>(idx)
            .map(|v| v.map(|d| CellValue::Text(d.to_string()))),
        Type::TIME => row
            .try_get::<_, Option<chrono::NaiveTime>>(idx)
            .map(|v| v.map(|t| CellValue::Text(t.to_string()))),
        Type::TIMESTAMP => row
            .try_get::<_, Option<chrono::NaiveDateTime>>(idx)
            .map(|v| v.map(|t| CellValue::Text(t.format("%Y-%m-%d %H:%M:%S%.f").to_string()))),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)
            .map(|v| v.map(|t| CellValue::Text(t.to_rfc3339()))),
        _ => row
            .try_get::<_, Option<String>>(idx)
            .map(|v| v.map(CellValue::Text)),
    };

    match value {
        Ok(Some(cell)) => cell,
        Ok(None) => CellValue::Null,
        Err(e) => {
            tracing::warn!("Cannot read {} value in column {}: {}", pg_type.name(), idx + 1, e);
            CellValue::Null
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_types() {
        assert_eq!(engine_type(&Type::INT8), EngineType::BigInt);
        assert_eq!(engine_type(&Type::FLOAT4), EngineType::Real);
        assert_eq!(engine_type(&Type::TEXT), EngineType::VarChar);
        assert_eq!(engine_type(&Type::TIMESTAMPTZ), EngineType::TimestampWithTimezone);
        assert_eq!(engine_type(&Type::INT4_ARRAY), EngineType::Array);
        assert_eq!(engine_type(&Type::UUID), EngineType::Other);
    }

    #[test]
    fn test_cursor_statements() {
        assert_eq!(
            declare_statement("SELECT ra FROM sdss.Object"),
            "DECLARE gateway_result NO SCROLL CURSOR FOR SELECT ra FROM sdss.Object"
        );
        assert_eq!(fetch_statement(500), "FETCH FORWARD 500 FROM gateway_result");
        assert_eq!(fetch_statement(0), "FETCH FORWARD 1 FROM gateway_result");
    }

    #[test]
    fn test_backend_capabilities() {
        let backend = PostgreSQLBackend::new();
        assert!(backend.supports_scheme("postgres"));
        assert!(backend.supports_scheme("postgresql"));
        assert!(!backend.supports_scheme("mysql"));
        assert_eq!(backend.quote_style(), QuoteStyle::Double);
        assert!(!backend.requires_integer_booleans());
    }
}
