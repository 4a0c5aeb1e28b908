use sqlparser::ast::Statement as SqlStatement;

use crate::api::middleware::AppError;
use crate::sql::ast::Statement;
use crate::sql::parse_statement;

/// Statement acceptance: only SELECT queries and SHOW COLUMNS reach a job.
pub struct SqlValidator;

impl SqlValidator {
    /// Parse `sql` and accept it only if it is a single read-only statement.
    pub fn validate_read_only(sql: &str) -> Result<Statement, AppError> {
        let statement = parse_statement(sql)?;
        tracing::debug!("Accepted statement: {}", sql.trim());
        Ok(statement)
    }

    /// Reject anything that is not a SELECT or SHOW COLUMNS.
    pub fn check_read_only(statement: &SqlStatement) -> Result<(), AppError> {
        match statement {
            SqlStatement::Query(_) | SqlStatement::ShowColumns { .. } => Ok(()),
            SqlStatement::Insert { .. } => Err(not_select("INSERT")),
            SqlStatement::Update { .. } => Err(not_select("UPDATE")),
            SqlStatement::Delete { .. } => Err(not_select("DELETE")),
            SqlStatement::Drop { .. } => Err(not_select("DROP")),
            SqlStatement::CreateTable { .. } => Err(not_select("CREATE TABLE")),
            SqlStatement::AlterTable { .. } => Err(not_select("ALTER TABLE")),
            SqlStatement::Truncate { .. } => Err(not_select("TRUNCATE")),
            other => Err(AppError::NotSelect(format!(
                "Only SELECT queries are permitted. Found: {}",
                other
            ))),
        }
    }
}

fn not_select(kind: &str) -> AppError {
    AppError::NotSelect(format!(
        "{} statements are not allowed. Only SELECT queries are permitted.",
        kind
    ))
}
