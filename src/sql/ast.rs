// Closed SQL tree for the gateway's grammar subset.
//
// sqlparser's tree is lowered into these types (see `sql::parser`) so that every
// analysis and rewrite pass matches exhaustively over a small, known set of
// productions. Expressions the passes never need to look inside are carried as
// `Expr::Raw` sqlparser tokens and rendered back almost verbatim.

use std::fmt;

use sqlparser::keywords::Keyword;
use sqlparser::tokenizer::Token;

/// A possibly-quoted identifier. Quoting is remembered so the formatter can
/// re-quote with the target engine's quote character.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier {
    pub value: String,
    pub quoted: bool,
}

impl Identifier {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            quoted: false,
        }
    }

    pub fn quoted(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            quoted: true,
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// Dotted name such as `instance.schema.table` or `a.ra`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedName {
    pub parts: Vec<Identifier>,
}

impl QualifiedName {
    pub fn new(parts: Vec<Identifier>) -> Self {
        Self { parts }
    }

    pub fn of<S: AsRef<str>>(parts: &[S]) -> Self {
        Self {
            parts: parts.iter().map(|p| Identifier::new(p.as_ref())).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Last segment, e.g. `table` for `db.schema.table`.
    pub fn suffix(&self) -> Option<&str> {
        self.parts.last().map(|p| p.value.as_str())
    }

    /// Everything but the last segment, if there is anything.
    pub fn prefix(&self) -> Option<QualifiedName> {
        if self.parts.len() < 2 {
            return None;
        }
        Some(QualifiedName::new(self.parts[..self.parts.len() - 1].to_vec()))
    }

    pub fn segments(&self) -> Vec<&str> {
        self.parts.iter().map(|p| p.value.as_str()).collect()
    }

    /// Lower-cased dotted form, used as a lookup key.
    pub fn key(&self) -> String {
        self.segments().join(".").to_lowercase()
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments().join("."))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Query(Query),
    ShowColumns(ShowColumns),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShowColumns {
    pub table: QualifiedName,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub body: QuerySpecification,
    pub order_by: Vec<SortItem>,
    pub limit: Option<Expr>,
    pub offset: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpecification {
    pub distinct: bool,
    pub select: Vec<SelectItem>,
    pub from: Option<Relation>,
    pub where_clause: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortItem {
    pub expr: Expr,
    pub ascending: Option<bool>,
    pub nulls_first: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    SingleColumn(SingleColumn),
    AllColumns(AllColumns),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SingleColumn {
    pub expr: Expr,
    pub alias: Option<Identifier>,
}

/// `*` when `prefix` is `None`, `prefix.*` otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct AllColumns {
    pub prefix: Option<QualifiedName>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Relation {
    Table(Table),
    Aliased(AliasedRelation),
    Join(Join),
    Subquery(Box<Query>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: QualifiedName,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AliasedRelation {
    pub relation: Box<Relation>,
    pub alias: Identifier,
}

/// Binary join. Explicit join chains are left-deep: `a JOIN b JOIN c` is
/// `Join { left: Join { left: a, right: b }, right: c }`. FROM list items are
/// folded with `JoinType::Implicit` around each item's own chain, so
/// `a, b JOIN c` is `Join { Implicit, left: a, right: Join { left: b, right: c } }`.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub join_type: JoinType,
    pub left: Box<Relation>,
    pub right: Box<Relation>,
    pub criteria: Option<JoinCriteria>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    /// Comma-separated FROM items.
    Implicit,
    Inner,
    Left,
    Right,
    Full,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JoinCriteria {
    On(Expr),
    Using(Vec<Identifier>),
    Natural,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Identifier(Identifier),
    Dereference(QualifiedName),
    FunctionCall(FunctionCall),
    Literal(Literal),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Nested(Box<Expr>),
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    Between {
        expr: Box<Expr>,
        negated: bool,
        low: Box<Expr>,
        high: Box<Expr>,
    },
    InList {
        expr: Box<Expr>,
        negated: bool,
        list: Vec<Expr>,
    },
    /// `CASE [operand] WHEN .. THEN .. [ELSE ..] END`
    Case {
        operand: Option<Box<Expr>>,
        when_clauses: Vec<WhenClause>,
        else_result: Option<Box<Expr>>,
    },
    /// `CAST(expr AS type)`; the type is kept as written.
    Cast {
        expr: Box<Expr>,
        data_type: String,
    },
    Like {
        expr: Box<Expr>,
        negated: bool,
        pattern: Box<Expr>,
    },
    Exists {
        subquery: Box<Query>,
        negated: bool,
    },
    InSubquery {
        expr: Box<Expr>,
        negated: bool,
        subquery: Box<Query>,
    },
    Subquery(Box<Query>),
    /// `*` inside a call such as `COUNT(*)`.
    Wildcard,
    /// Anything outside the modelled grammar.
    Raw(RawExpr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhenClause {
    pub condition: Expr,
    pub result: Expr,
}

/// An expression the passes do not model, held as sqlparser tokens.
///
/// The parser only builds one when it holds no spatial call and no subquery,
/// so the rewrite passes never look inside. The formatter still re-quotes its
/// quoted identifiers and can render its boolean literals as integers.
#[derive(Debug, Clone, PartialEq)]
pub struct RawExpr {
    tokens: Vec<Token>,
}

impl RawExpr {
    pub(crate) fn new(tokens: Vec<Token>) -> Self {
        Self { tokens }
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn has_boolean_literals(&self) -> bool {
        self.tokens.iter().any(|token| boolean_literal(token).is_some())
    }
}

/// The value of an unquoted `TRUE` or `FALSE` token.
pub fn boolean_literal(token: &Token) -> Option<bool> {
    match token {
        Token::Word(word) if word.quote_style.is_none() => match word.keyword {
            Keyword::TRUE => Some(true),
            Keyword::FALSE => Some(false),
            _ => None,
        },
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub name: QualifiedName,
    pub distinct: bool,
    pub arguments: Vec<Expr>,
}

impl FunctionCall {
    pub fn new(name: &str, arguments: Vec<Expr>) -> Self {
        Self {
            name: QualifiedName::of(&[name]),
            distinct: false,
            arguments,
        }
    }

    /// Lower-cased last name segment, e.g. `contains`.
    pub fn simple_name(&self) -> String {
        self.name.suffix().unwrap_or_default().to_lowercase()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Long(i64),
    /// Numeric literal with a fractional part or exponent, kept as written.
    Decimal(String),
    String(String),
    Boolean(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Concat,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Plus => "+",
            BinaryOp::Minus => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Concat => "||",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_name_prefix_and_suffix() {
        let name = QualifiedName::of(&["lsst", "sdss", "Object"]);
        assert_eq!(name.suffix(), Some("Object"));
        assert_eq!(name.prefix().unwrap().to_string(), "lsst.sdss");
        assert_eq!(name.key(), "lsst.sdss.object");

        let single = QualifiedName::of(&["ra"]);
        assert!(single.prefix().is_none());
    }

    #[test]
    fn test_function_simple_name_is_lowercase() {
        let call = FunctionCall {
            name: QualifiedName::of(&["CONTAINS"]),
            distinct: false,
            arguments: vec![],
        };
        assert_eq!(call.simple_name(), "contains");
    }
}
