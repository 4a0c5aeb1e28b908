use crate::api::middleware::AppError;
use crate::sql::ast::*;
use crate::sql::visitor::Rebuilder;

/// Result of stripping instance identifiers from a statement.
#[derive(Debug, Clone, PartialEq)]
pub struct StrippedStatement {
    pub statement: Statement,
    /// The statement contains `TRUE`/`FALSE` literals. Engines behind a proxy
    /// that rejects them need `1`/`0` instead.
    pub has_boolean_literals: bool,
}

/// Drop the instance segment of every `instance.schema.table` name so the
/// engine sees `schema.table`.
pub fn strip_instance_identifiers(statement: Statement) -> Result<StrippedStatement, AppError> {
    let mut stripper = InstanceStripper::default();
    let statement = stripper.rebuild_statement(statement)?;
    Ok(StrippedStatement {
        statement,
        has_boolean_literals: stripper.has_boolean_literals,
    })
}

#[derive(Default)]
struct InstanceStripper {
    has_boolean_literals: bool,
}

impl Rebuilder for InstanceStripper {
    fn rebuild_table(&mut self, node: Table) -> Result<Relation, AppError> {
        if node.name.len() == 3 {
            let parts = node.name.parts[1..].to_vec();
            return Ok(Relation::Table(Table {
                name: QualifiedName::new(parts),
            }));
        }
        Ok(Relation::Table(node))
    }

    fn rebuild_show_columns(&mut self, node: ShowColumns) -> Result<Statement, AppError> {
        let parts = if node.table.len() > 1 {
            node.table.parts[1..].to_vec()
        } else {
            node.table.parts
        };
        Ok(Statement::ShowColumns(ShowColumns {
            table: QualifiedName::new(parts),
        }))
    }

    fn rebuild_boolean_literal(&mut self, value: bool) -> Result<Expr, AppError> {
        self.has_boolean_literals = true;
        Ok(Expr::Literal(Literal::Boolean(value)))
    }

    fn rebuild_raw(&mut self, node: RawExpr) -> Result<Expr, AppError> {
        self.has_boolean_literals |= node.has_boolean_literals();
        Ok(Expr::Raw(node))
    }
}
