use crate::sql::ast::QualifiedName;

/// A column reference from the top-level SELECT list.
///
/// `position` is the 1-based index of the select item, so it lines up with the
/// ordinal the engine reports for the matching result column.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedColumn {
    pub identifier: String,
    pub qualified_name: QualifiedName,
    pub alias: Option<String>,
    pub position: usize,
}

/// A table from the FROM clause. `position` follows left-to-right source order.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTable {
    pub identifier: String,
    pub qualified_name: QualifiedName,
    pub alias: Option<String>,
    pub position: usize,
}
