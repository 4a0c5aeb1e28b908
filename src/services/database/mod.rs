// Execution backends, selected by the scheme of the resolved connection URI.
pub mod adapter;
#[cfg(test)]
pub mod memory;
pub mod mysql;
pub mod postgresql;

pub use adapter::{BackendRegistry, ExecutionBackend, RowCursor};
pub use mysql::MySQLBackend;
pub use postgresql::PostgreSQLBackend;

use std::sync::Arc;

/// Registry with every built-in backend.
pub fn default_backends() -> BackendRegistry {
    BackendRegistry::new()
        .register(Arc::new(MySQLBackend::new()))
        .register(Arc::new(PostgreSQLBackend::new()))
}
