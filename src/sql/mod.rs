// SQL front-end: a closed AST, the sqlparser bridge that produces it, the
// traversal framework the passes are written against, and the formatter that
// turns it back into engine-ready text.
pub mod ast;
pub mod formatter;
pub mod parser;
pub mod visitor;

pub use ast::Statement;
pub use formatter::{format_statement, FormatOptions, QuoteStyle};
pub use parser::parse_statement;
