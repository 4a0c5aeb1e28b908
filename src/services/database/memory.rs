// Scripted backend for exercising the job pipeline without a database server.
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use crate::api::middleware::AppError;
use crate::models::{EngineType, JdbcColumnMetadata, Row};
use crate::services::database::adapter::{ExecutionBackend, RowCursor};
use crate::sql::QuoteStyle;

#[derive(Debug, Clone)]
pub enum Failure {
    Connect(String),
    Execute { message: String, state: String, code: i64 },
    /// Fail on the fetch after this many rows.
    MidStream { after: usize, message: String },
}

#[derive(Default)]
struct State {
    columns: Vec<JdbcColumnMetadata>,
    rows: Vec<Row>,
    failure: Option<Failure>,
    gate: Option<Arc<Notify>>,
    executed: Mutex<Vec<(String, String)>>,
    closes: Arc<AtomicUsize>,
}

#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<State>,
}

impl MemoryBackend {
    pub fn new(columns: Vec<JdbcColumnMetadata>, rows: Vec<Row>) -> Self {
        Self {
            state: Arc::new(State {
                columns,
                rows,
                ..State::default()
            }),
        }
    }

    pub fn failing(failure: Failure) -> Self {
        Self {
            state: Arc::new(State {
                columns: vec![column("foo", 1, EngineType::Integer)],
                failure: Some(failure),
                ..State::default()
            }),
        }
    }

    pub fn with_failure(columns: Vec<JdbcColumnMetadata>, rows: Vec<Row>, failure: Failure) -> Self {
        Self {
            state: Arc::new(State {
                columns,
                rows,
                failure: Some(failure),
                ..State::default()
            }),
        }
    }

    /// Hold every execution until the returned handle is notified.
    pub fn gated(columns: Vec<JdbcColumnMetadata>, rows: Vec<Row>) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let backend = Self {
            state: Arc::new(State {
                columns,
                rows,
                gate: Some(gate.clone()),
                ..State::default()
            }),
        };
        (backend, gate)
    }

    /// `(connection_url, sql)` of every execution so far.
    pub fn executed(&self) -> Vec<(String, String)> {
        self.state
            .executed
            .lock()
            .map(|executed| executed.clone())
            .unwrap_or_default()
    }

    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }
}

pub fn column(name: &str, ordinal: usize, engine_type: EngineType) -> JdbcColumnMetadata {
    JdbcColumnMetadata {
        name: name.to_string(),
        label: None,
        table_name: "Object".to_string(),
        ordinal,
        type_name: format!("{:?}", engine_type).to_uppercase(),
        schema_name: None,
        catalog_name: Some("sdss".to_string()),
        nullable: true,
        engine_type,
    }
}

#[async_trait::async_trait]
impl ExecutionBackend for MemoryBackend {
    fn database_type(&self) -> &str {
        "memory"
    }

    fn supports_scheme(&self, scheme: &str) -> bool {
        matches!(scheme, "mysql" | "mariadb")
    }

    fn quote_style(&self) -> QuoteStyle {
        QuoteStyle::Backtick
    }

    fn requires_integer_booleans(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        connection_url: &str,
        sql: &str,
        _fetch_size: usize,
    ) -> Result<Box<dyn RowCursor>, AppError> {
        if let Ok(mut executed) = self.state.executed.lock() {
            executed.push((connection_url.to_string(), sql.to_string()));
        }
        if let Some(gate) = &self.state.gate {
            gate.notified().await;
        }

        let fail_after = match &self.state.failure {
            Some(Failure::Connect(message)) => return Err(AppError::Connection(message.clone())),
            Some(Failure::Execute { message, state, code }) => {
                return Err(AppError::Execution {
                    message: message.clone(),
                    state: Some(state.clone()),
                    code: Some(*code),
                })
            }
            Some(Failure::MidStream { after, message }) => Some((*after, message.clone())),
            None => None,
        };

        Ok(Box::new(MemoryCursor {
            columns: self.state.columns.clone(),
            rows: self.state.rows.iter().cloned().collect(),
            served: 0,
            fail_after,
            closes: self.state.closes.clone(),
        }))
    }
}

struct MemoryCursor {
    columns: Vec<JdbcColumnMetadata>,
    rows: VecDeque<Row>,
    served: usize,
    fail_after: Option<(usize, String)>,
    closes: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl RowCursor for MemoryCursor {
    fn columns(&self) -> &[JdbcColumnMetadata] {
        &self.columns
    }

    async fn next_row(&mut self) -> Result<Option<Row>, AppError> {
        if let Some((after, message)) = &self.fail_after {
            if self.served == *after {
                return Err(AppError::Execution {
                    message: message.clone(),
                    state: Some("HY000".to_string()),
                    code: Some(2013),
                });
            }
        }
        self.served += 1;
        Ok(self.rows.pop_front())
    }

    async fn close(&mut self) -> Result<(), AppError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
