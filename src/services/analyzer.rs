// Table and column extraction over the outermost query specification.

use crate::models::{ParsedColumn, ParsedTable};
use crate::sql::ast::*;
use crate::sql::visitor::Visitor;

/// What the analyzer found in one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Analysis {
    /// Column references in SELECT-list order. Items that are not plain column
    /// references (calls, arithmetic) leave a gap in the positions.
    pub columns: Vec<ParsedColumn>,
    /// FROM-clause tables in left-to-right source order.
    pub tables: Vec<ParsedTable>,
    /// An unqualified `*` was selected.
    pub all_columns: bool,
    /// Prefixes of every `prefix.*` item.
    pub all_column_tables: Vec<QualifiedName>,
}

impl Analysis {
    /// First table whose name has three parts (`instance.schema.table`).
    pub fn instance_table(&self) -> Option<&ParsedTable> {
        self.tables.iter().find(|t| t.qualified_name.len() == 3)
    }

    pub fn column_at(&self, position: usize) -> Option<&ParsedColumn> {
        self.columns.iter().find(|c| c.position == position)
    }
}

/// Run the extractor over a statement. Each call starts from empty state.
pub fn analyze(statement: &Statement) -> Analysis {
    let mut analysis = Analysis::default();
    TableAndColumnExtractor { seen_query: false }.visit_statement(statement, &mut analysis);
    analysis
}

struct TableAndColumnExtractor {
    seen_query: bool,
}

impl Visitor<Analysis> for TableAndColumnExtractor {
    fn visit_query(&mut self, node: &Query, ctx: &mut Analysis) {
        // Only the outermost query contributes; derived tables do not.
        if self.seen_query {
            return;
        }
        self.seen_query = true;
        self.visit_query_specification(&node.body, ctx);
    }

    fn visit_query_specification(&mut self, node: &QuerySpecification, ctx: &mut Analysis) {
        for (index, item) in node.select.iter().enumerate() {
            let position = index + 1;
            match item {
                SelectItem::SingleColumn(column) => {
                    let qualified_name = match &column.expr {
                        Expr::Identifier(ident) => QualifiedName::new(vec![ident.clone()]),
                        Expr::Dereference(name) => name.clone(),
                        _ => continue,
                    };
                    ctx.columns.push(ParsedColumn {
                        identifier: name_of(&qualified_name),
                        qualified_name,
                        alias: column.alias.as_ref().map(|a| a.value.clone()),
                        position,
                    });
                }
                SelectItem::AllColumns(all) => match &all.prefix {
                    Some(prefix) => {
                        ctx.all_column_tables.push(prefix.clone());
                        let mut parts = prefix.parts.clone();
                        parts.push(Identifier::new("*"));
                        let qualified_name = QualifiedName::new(parts);
                        ctx.columns.push(ParsedColumn {
                            identifier: name_of(&qualified_name),
                            qualified_name,
                            alias: None,
                            position,
                        });
                    }
                    None => {
                        ctx.all_columns = true;
                        ctx.columns.push(ParsedColumn {
                            identifier: "*".to_string(),
                            qualified_name: QualifiedName::of(&["*"]),
                            alias: None,
                            position,
                        });
                    }
                },
            }
        }

        let mut relations = Vec::new();
        if let Some(from) = &node.from {
            flatten_joins(from, &mut relations);
        }

        for (index, relation) in relations.into_iter().enumerate() {
            let (relation, alias) = match relation {
                Relation::Aliased(aliased) => (aliased.relation.as_ref(), Some(aliased.alias.value.clone())),
                other => (other, None),
            };
            if let Relation::Table(table) = relation {
                ctx.tables.push(ParsedTable {
                    identifier: name_of(&table.name),
                    qualified_name: table.name.clone(),
                    alias,
                    position: index + 1,
                });
            }
        }
    }

    fn visit_show_columns(&mut self, node: &ShowColumns, ctx: &mut Analysis) {
        ctx.tables.push(ParsedTable {
            identifier: name_of(&node.table),
            qualified_name: node.table.clone(),
            alias: None,
            position: 1,
        });
    }

    fn visit_subquery_expression(&mut self, _node: &Query, _ctx: &mut Analysis) {}
}

/// Collect join operands in source order. Parenthesized joins on either side
/// are expanded in place.
fn flatten_joins<'a>(relation: &'a Relation, out: &mut Vec<&'a Relation>) {
    match relation {
        Relation::Join(join) => {
            flatten_joins(&join.left, out);
            flatten_joins(&join.right, out);
        }
        other => out.push(other),
    }
}

fn name_of(name: &QualifiedName) -> String {
    name.suffix().unwrap_or_default().to_string()
}
