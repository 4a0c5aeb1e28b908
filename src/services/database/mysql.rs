// MySQL/MariaDB backend. Also serves Qserv, which speaks the MySQL protocol.
use mysql_async::consts::{ColumnFlags, ColumnType};
use mysql_async::prelude::*;
use mysql_async::{Column, Conn, Opts, Value as MySqlValue};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::api::middleware::AppError;
use crate::models::{CellValue, EngineType, JdbcColumnMetadata, Row};
use crate::services::credentials::mask_credentials;
use crate::services::database::adapter::{ExecutionBackend, RowCursor};
use crate::sql::QuoteStyle;

/// Collation id MySQL reports for binary strings.
const BINARY_CHARSET: u16 = 63;

enum CursorEvent {
    Columns(Vec<JdbcColumnMetadata>),
    Row(Row),
}

type EventSender = mpsc::Sender<Result<CursorEvent, AppError>>;

#[derive(Debug, Default, Clone, Copy)]
pub struct MySQLBackend;

impl MySQLBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl ExecutionBackend for MySQLBackend {
    fn database_type(&self) -> &str {
        "mysql"
    }

    fn supports_scheme(&self, scheme: &str) -> bool {
        matches!(scheme, "mysql" | "mariadb")
    }

    fn quote_style(&self) -> QuoteStyle {
        QuoteStyle::Backtick
    }

    // Qserv's proxy rejects boolean literals.
    fn requires_integer_booleans(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        connection_url: &str,
        sql: &str,
        fetch_size: usize,
    ) -> Result<Box<dyn RowCursor>, AppError> {
        let opts = Opts::from_url(connection_url)
            .map_err(|e| AppError::Connection(format!("Invalid MySQL URL: {}", e)))?;
        tracing::debug!("Executing on {}: {}", mask_credentials(connection_url), sql);

        // The connection lives in its own task; rows cross a channel bounded by
        // the fetch size.
        let (tx, mut rx) = mpsc::channel(fetch_size.max(1));
        let sql = sql.to_string();
        let task = tokio::spawn(async move {
            if let Err(e) = stream_query(opts, &sql, &tx).await {
                let _ = tx.send(Err(e)).await;
            }
        });

        match rx.recv().await {
            Some(Ok(CursorEvent::Columns(columns))) => Ok(Box::new(MySQLCursor {
                columns,
                rx,
                task: Some(task),
            })),
            Some(Ok(CursorEvent::Row(_))) => Err(AppError::Internal(
                "MySQL row arrived before column metadata".to_string(),
            )),
            Some(Err(e)) => Err(e),
            None => Err(AppError::Connection(
                "MySQL connection closed before returning results".to_string(),
            )),
        }
    }
}

async fn stream_query(opts: Opts, sql: &str, tx: &EventSender) -> Result<(), AppError> {
    let mut conn = Conn::new(opts).await?;
    let outcome = forward_rows(&mut conn, sql, tx).await;
    if let Err(e) = conn.disconnect().await {
        tracing::warn!("Failed to close MySQL connection: {}", e);
    }
    outcome
}

async fn forward_rows(conn: &mut Conn, sql: &str, tx: &EventSender) -> Result<(), AppError> {
    let mut result = conn.query_iter(sql).await?;

    let columns: Vec<JdbcColumnMetadata> = result
        .columns()
        .map(|columns| {
            columns
                .iter()
                .enumerate()
                .map(|(idx, column)| column_metadata(idx + 1, column))
                .collect()
        })
        .unwrap_or_default();
    let engine_types: Vec<EngineType> = columns.iter().map(|c| c.engine_type).collect();

    if tx.send(Ok(CursorEvent::Columns(columns))).await.is_err() {
        return Ok(());
    }

    while let Some(mut row) = result.next().await? {
        let values = engine_types
            .iter()
            .enumerate()
            .map(|(idx, engine_type)| {
                row.take::<MySqlValue, _>(idx)
                    .map(|value| mysql_value_to_cell(value, *engine_type))
                    .unwrap_or(CellValue::Null)
            })
            .collect();
        if tx.send(Ok(CursorEvent::Row(values))).await.is_err() {
            // Reader went away.
            break;
        }
    }
    Ok(())
}

pub struct MySQLCursor {
    columns: Vec<JdbcColumnMetadata>,
    rx: mpsc::Receiver<Result<CursorEvent, AppError>>,
    task: Option<JoinHandle<()>>,
}

#[async_trait::async_trait]
impl RowCursor for MySQLCursor {
    fn columns(&self) -> &[JdbcColumnMetadata] {
        &self.columns
    }

    async fn next_row(&mut self) -> Result<Option<Row>, AppError> {
        match self.rx.recv().await {
            Some(Ok(CursorEvent::Row(row))) => Ok(Some(row)),
            Some(Ok(CursorEvent::Columns(_))) => Err(AppError::Internal(
                "Unexpected second result set".to_string(),
            )),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    async fn close(&mut self) -> Result<(), AppError> {
        self.rx.close();
        if let Some(task) = self.task.take() {
            // Unblock a sender waiting on a full channel.
            while self.rx.recv().await.is_some() {}
            task.await
                .map_err(|e| AppError::Internal(format!("MySQL reader task failed: {}", e)))?;
        }
        Ok(())
    }
}

fn column_metadata(ordinal: usize, column: &Column) -> JdbcColumnMetadata {
    let label = column.name_str().into_owned();
    let org_name = column.org_name_str();
    let name = if org_name.is_empty() {
        label.clone()
    } else {
        org_name.into_owned()
    };
    let org_table = column.org_table_str();
    let table_name = if org_table.is_empty() {
        column.table_str().into_owned()
    } else {
        org_table.into_owned()
    };
    let schema = column.schema_str();

    JdbcColumnMetadata {
        name,
        label: Some(label),
        table_name,
        ordinal,
        type_name: format!("{:?}", column.column_type())
            .trim_start_matches("MYSQL_TYPE_")
            .to_string(),
        schema_name: None,
        catalog_name: (!schema.is_empty()).then(|| schema.into_owned()),
        nullable: !column.flags().contains(ColumnFlags::NOT_NULL_FLAG),
        engine_type: engine_type(column.column_type(), column.character_set() == BINARY_CHARSET),
    }
}

fn engine_type(column_type: ColumnType, binary: bool) -> EngineType {
    match column_type {
        ColumnType::MYSQL_TYPE_BIT => EngineType::Bit,
        ColumnType::MYSQL_TYPE_TINY => EngineType::TinyInt,
        ColumnType::MYSQL_TYPE_SHORT | ColumnType::MYSQL_TYPE_YEAR => EngineType::SmallInt,
        ColumnType::MYSQL_TYPE_LONG | ColumnType::MYSQL_TYPE_INT24 => EngineType::Integer,
        ColumnType::MYSQL_TYPE_LONGLONG => EngineType::BigInt,
        ColumnType::MYSQL_TYPE_FLOAT => EngineType::Real,
        ColumnType::MYSQL_TYPE_DOUBLE => EngineType::Double,
        ColumnType::MYSQL_TYPE_DECIMAL | ColumnType::MYSQL_TYPE_NEWDECIMAL => EngineType::Decimal,
        ColumnType::MYSQL_TYPE_DATE | ColumnType::MYSQL_TYPE_NEWDATE => EngineType::Date,
        ColumnType::MYSQL_TYPE_TIME => EngineType::Time,
        ColumnType::MYSQL_TYPE_DATETIME | ColumnType::MYSQL_TYPE_TIMESTAMP => EngineType::Timestamp,
        ColumnType::MYSQL_TYPE_VARCHAR
        | ColumnType::MYSQL_TYPE_VAR_STRING
        | ColumnType::MYSQL_TYPE_ENUM
        | ColumnType::MYSQL_TYPE_SET => {
            if binary {
                EngineType::VarBinary
            } else {
                EngineType::VarChar
            }
        }
        ColumnType::MYSQL_TYPE_STRING => {
            if binary {
                EngineType::Binary
            } else {
                EngineType::Char
            }
        }
        ColumnType::MYSQL_TYPE_TINY_BLOB
        | ColumnType::MYSQL_TYPE_MEDIUM_BLOB
        | ColumnType::MYSQL_TYPE_LONG_BLOB
        | ColumnType::MYSQL_TYPE_BLOB => {
            if binary {
                EngineType::LongVarBinary
            } else {
                EngineType::LongVarChar
            }
        }
        ColumnType::MYSQL_TYPE_JSON => EngineType::Json,
        ColumnType::MYSQL_TYPE_NULL => EngineType::Null,
        ColumnType::MYSQL_TYPE_GEOMETRY => EngineType::Binary,
        _ => EngineType::Other,
    }
}

/// The text protocol returns most values as bytes; the column type decides
/// how to read them.
fn mysql_value_to_cell(value: MySqlValue, engine_type: EngineType) -> CellValue {
    match value {
        MySqlValue::NULL => CellValue::Null,
        MySqlValue::Bytes(bytes) => bytes_to_cell(bytes, engine_type),
        MySqlValue::Int(i) => CellValue::Integer(i),
        MySqlValue::UInt(u) => match i64::try_from(u) {
            Ok(i) => CellValue::Integer(i),
            Err(_) => CellValue::Text(u.to_string()),
        },
        MySqlValue::Float(f) => CellValue::Real(f as f64),
        MySqlValue::Double(d) => CellValue::Real(d),
        MySqlValue::Date(y, m, d, h, min, s, _) => {
            CellValue::Text(format!("{:04}-{:02}-{:02} {:02}:{:02}:{:02}", y, m, d, h, min, s))
        }
        MySqlValue::Time(is_neg, d, h, m, s, _) => {
            let sign = if is_neg { "-" } else { "" };
            let total_hours = d * 24 + h as u32;
            CellValue::Text(format!("{}{}:{:02}:{:02}", sign, total_hours, m, s))
        }
    }
}

fn bytes_to_cell(bytes: Vec<u8>, engine_type: EngineType) -> CellValue {
    match engine_type {
        EngineType::Bit => {
            CellValue::Integer(bytes.iter().fold(0i64, |acc, b| (acc << 8) | *b as i64))
        }
        EngineType::Binary | EngineType::VarBinary | EngineType::LongVarBinary | EngineType::Blob => {
            CellValue::Bytes(bytes)
        }
        _ => match String::from_utf8(bytes) {
            Ok(text) => parse_text(text, engine_type),
            Err(e) => CellValue::Bytes(e.into_bytes()),
        },
    }
}

fn parse_text(text: String, engine_type: EngineType) -> CellValue {
    let parsed = match engine_type {
        EngineType::TinyInt | EngineType::SmallInt | EngineType::Integer | EngineType::BigInt => {
            text.parse::<i64>().ok().map(CellValue::Integer)
        }
        EngineType::Float
        | EngineType::Real
        | EngineType::Double
        | EngineType::Decimal
        | EngineType::Numeric => text.parse::<f64>().ok().map(CellValue::Real),
        _ => None,
    };
    match parsed {
        Some(value) => value,
        None => {
            if engine_type.is_numeric() {
                tracing::warn!("Keeping unparseable {:?} value as text: {}", engine_type, text);
            }
            CellValue::Text(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_protocol_values() {
        assert_eq!(
            mysql_value_to_cell(MySqlValue::Bytes(b"42".to_vec()), EngineType::BigInt),
            CellValue::Integer(42)
        );
        assert_eq!(
            mysql_value_to_cell(MySqlValue::Bytes(b"-0.625".to_vec()), EngineType::Double),
            CellValue::Real(-0.625)
        );
        assert_eq!(
            mysql_value_to_cell(MySqlValue::Bytes(b"12.50".to_vec()), EngineType::Decimal),
            CellValue::Real(12.5)
        );
        assert_eq!(
            mysql_value_to_cell(MySqlValue::Bytes(b"M31".to_vec()), EngineType::VarChar),
            CellValue::Text("M31".to_string())
        );
        assert_eq!(
            mysql_value_to_cell(MySqlValue::Bytes(vec![0x01, 0x02]), EngineType::Bit),
            CellValue::Integer(258)
        );
        assert_eq!(mysql_value_to_cell(MySqlValue::NULL, EngineType::Integer), CellValue::Null);
    }

    #[test]
    fn test_binary_values() {
        assert_eq!(
            mysql_value_to_cell(MySqlValue::Bytes(vec![0xff, 0x00]), EngineType::VarBinary),
            CellValue::Bytes(vec![0xff, 0x00])
        );
        assert_eq!(
            mysql_value_to_cell(MySqlValue::Bytes(vec![0xff, 0xfe]), EngineType::VarChar),
            CellValue::Bytes(vec![0xff, 0xfe])
        );
    }

    #[test]
    fn test_binary_protocol_values() {
        assert_eq!(
            mysql_value_to_cell(MySqlValue::UInt(u64::MAX), EngineType::BigInt),
            CellValue::Text(u64::MAX.to_string())
        );
        assert_eq!(
            mysql_value_to_cell(MySqlValue::Date(2018, 3, 9, 14, 5, 7, 0), EngineType::Timestamp),
            CellValue::Text("2018-03-09 14:05:07".to_string())
        );
        assert_eq!(
            mysql_value_to_cell(MySqlValue::Time(true, 1, 2, 3, 4, 0), EngineType::Time),
            CellValue::Text("-26:03:04".to_string())
        );
    }

    #[test]
    fn test_engine_types() {
        assert_eq!(engine_type(ColumnType::MYSQL_TYPE_LONGLONG, false), EngineType::BigInt);
        assert_eq!(engine_type(ColumnType::MYSQL_TYPE_FLOAT, false), EngineType::Real);
        assert_eq!(engine_type(ColumnType::MYSQL_TYPE_VAR_STRING, false), EngineType::VarChar);
        assert_eq!(engine_type(ColumnType::MYSQL_TYPE_VAR_STRING, true), EngineType::VarBinary);
        assert_eq!(engine_type(ColumnType::MYSQL_TYPE_BLOB, false), EngineType::LongVarChar);
    }

    #[test]
    fn test_backend_capabilities() {
        let backend = MySQLBackend::new();
        assert!(backend.supports_scheme("mysql"));
        assert!(backend.supports_scheme("mariadb"));
        assert!(!backend.supports_scheme("postgres"));
        assert_eq!(backend.quote_style(), QuoteStyle::Backtick);
        assert!(backend.requires_integer_booleans());
    }

    #[tokio::test]
    async fn test_invalid_url_is_a_connection_error() {
        let result = MySQLBackend::new().execute("postgres://nowhere", "SELECT 1", 10).await;
        assert!(matches!(result, Err(AppError::Connection(_))));
    }
}
