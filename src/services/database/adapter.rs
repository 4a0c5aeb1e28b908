// Execution backend seam: "execute SQL, get a cursor of rows plus column metadata".
use std::sync::Arc;

use crate::api::middleware::AppError;
use crate::models::{JdbcColumnMetadata, Row};
use crate::sql::QuoteStyle;

/// A live result set. Rows are fetched one at a time; the cursor owns its
/// connection and releases it on `close` or drop.
#[async_trait::async_trait]
pub trait RowCursor: Send {
    fn columns(&self) -> &[JdbcColumnMetadata];

    async fn next_row(&mut self) -> Result<Option<Row>, AppError>;

    async fn close(&mut self) -> Result<(), AppError>;
}

#[async_trait::async_trait]
pub trait ExecutionBackend: Send + Sync {
    fn database_type(&self) -> &str;

    /// URI schemes this backend connects to.
    fn supports_scheme(&self, scheme: &str) -> bool;

    fn quote_style(&self) -> QuoteStyle;

    /// Whether `true`/`false` must be sent as `1`/`0`.
    fn requires_integer_booleans(&self) -> bool {
        false
    }

    /// Open a dedicated connection and start executing `sql`. Returns once
    /// column metadata is known.
    async fn execute(
        &self,
        connection_url: &str,
        sql: &str,
        fetch_size: usize,
    ) -> Result<Box<dyn RowCursor>, AppError>;
}

/// Backends indexed by the scheme of the connection URI.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: Vec<Arc<dyn ExecutionBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, backend: Arc<dyn ExecutionBackend>) -> Self {
        self.backends.push(backend);
        self
    }

    pub fn for_uri(&self, database_uri: &str) -> Result<Arc<dyn ExecutionBackend>, AppError> {
        let scheme = database_uri
            .split_once("://")
            .map(|(scheme, _)| scheme.to_lowercase())
            .unwrap_or_default();

        self.backends
            .iter()
            .find(|backend| backend.supports_scheme(&scheme))
            .cloned()
            .ok_or_else(|| {
                AppError::Connection(format!("Unsupported database type: {}", scheme))
            })
    }
}
