// Renders the closed AST back to SQL text for a particular engine.

use std::fmt::Write;

use sqlparser::tokenizer::Token;

use crate::sql::ast::*;

/// How originally-quoted identifiers are quoted on output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteStyle {
    /// MySQL, MariaDB, Qserv.
    Backtick,
    /// PostgreSQL and ANSI engines.
    Double,
    /// Emit the bare name.
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatOptions {
    pub quote_style: QuoteStyle,
    /// Render `TRUE`/`FALSE` as `1`/`0` for engines without boolean literals.
    pub booleans_as_integers: bool,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            quote_style: QuoteStyle::Double,
            booleans_as_integers: false,
        }
    }
}

pub fn format_statement(statement: &Statement, options: FormatOptions) -> String {
    let mut formatter = SqlFormatter {
        out: String::new(),
        options,
    };
    match statement {
        Statement::Query(query) => formatter.query(query),
        Statement::ShowColumns(show) => {
            formatter.out.push_str("SHOW COLUMNS FROM ");
            formatter.name(&show.table);
        }
    }
    formatter.out
}

pub fn format_expr(expr: &Expr, options: FormatOptions) -> String {
    let mut formatter = SqlFormatter {
        out: String::new(),
        options,
    };
    formatter.expr(expr);
    formatter.out
}

struct SqlFormatter {
    out: String,
    options: FormatOptions,
}

impl SqlFormatter {
    fn query(&mut self, query: &Query) {
        self.query_specification(&query.body);
        if !query.order_by.is_empty() {
            self.out.push_str(" ORDER BY ");
            for (i, item) in query.order_by.iter().enumerate() {
                if i > 0 {
                    self.out.push_str(", ");
                }
                self.expr(&item.expr);
                match item.ascending {
                    Some(true) => self.out.push_str(" ASC"),
                    Some(false) => self.out.push_str(" DESC"),
                    None => {}
                }
                match item.nulls_first {
                    Some(true) => self.out.push_str(" NULLS FIRST"),
                    Some(false) => self.out.push_str(" NULLS LAST"),
                    None => {}
                }
            }
        }
        if let Some(limit) = &query.limit {
            self.out.push_str(" LIMIT ");
            self.expr(limit);
        }
        if let Some(offset) = &query.offset {
            self.out.push_str(" OFFSET ");
            self.expr(offset);
        }
    }

    fn query_specification(&mut self, spec: &QuerySpecification) {
        self.out.push_str("SELECT ");
        if spec.distinct {
            self.out.push_str("DISTINCT ");
        }
        for (i, item) in spec.select.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            match item {
                SelectItem::SingleColumn(column) => {
                    self.expr(&column.expr);
                    if let Some(alias) = &column.alias {
                        self.out.push_str(" AS ");
                        self.identifier(alias);
                    }
                }
                SelectItem::AllColumns(all) => {
                    if let Some(prefix) = &all.prefix {
                        self.name(prefix);
                        self.out.push('.');
                    }
                    self.out.push('*');
                }
            }
        }
        if let Some(from) = &spec.from {
            self.out.push_str(" FROM ");
            self.relation(from);
        }
        if let Some(predicate) = &spec.where_clause {
            self.out.push_str(" WHERE ");
            self.expr(predicate);
        }
        if !spec.group_by.is_empty() {
            self.out.push_str(" GROUP BY ");
            self.expr_list(&spec.group_by);
        }
        if let Some(having) = &spec.having {
            self.out.push_str(" HAVING ");
            self.expr(having);
        }
    }

    fn relation(&mut self, relation: &Relation) {
        match relation {
            Relation::Table(table) => self.name(&table.name),
            Relation::Aliased(aliased) => {
                if matches!(*aliased.relation, Relation::Join(_)) {
                    self.out.push('(');
                    self.relation(&aliased.relation);
                    self.out.push(')');
                } else {
                    self.relation(&aliased.relation);
                }
                self.out.push_str(" AS ");
                self.identifier(&aliased.alias);
            }
            Relation::Subquery(query) => {
                self.out.push('(');
                self.query(query);
                self.out.push(')');
            }
            Relation::Join(join) => {
                self.relation(&join.left);
                let natural = matches!(join.criteria, Some(JoinCriteria::Natural));
                match join.join_type {
                    JoinType::Implicit => self.out.push_str(", "),
                    join_type => {
                        self.out.push(' ');
                        if natural {
                            self.out.push_str("NATURAL ");
                        }
                        self.out.push_str(match join_type {
                            JoinType::Left => "LEFT JOIN ",
                            JoinType::Right => "RIGHT JOIN ",
                            JoinType::Full => "FULL JOIN ",
                            _ => "JOIN ",
                        });
                    }
                }
                if matches!(*join.right, Relation::Join(_)) {
                    self.out.push('(');
                    self.relation(&join.right);
                    self.out.push(')');
                } else {
                    self.relation(&join.right);
                }
                match &join.criteria {
                    Some(JoinCriteria::On(expr)) => {
                        self.out.push_str(" ON ");
                        self.expr(expr);
                    }
                    Some(JoinCriteria::Using(columns)) => {
                        self.out.push_str(" USING (");
                        for (i, column) in columns.iter().enumerate() {
                            if i > 0 {
                                self.out.push_str(", ");
                            }
                            self.identifier(column);
                        }
                        self.out.push(')');
                    }
                    Some(JoinCriteria::Natural) | None => {}
                }
            }
        }
    }

    fn expr_list(&mut self, exprs: &[Expr]) {
        for (i, expr) in exprs.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.expr(expr);
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Identifier(ident) => self.identifier(ident),
            Expr::Dereference(name) => self.name(name),
            Expr::FunctionCall(call) => {
                self.name(&call.name);
                self.out.push('(');
                if call.distinct {
                    self.out.push_str("DISTINCT ");
                }
                self.expr_list(&call.arguments);
                self.out.push(')');
            }
            Expr::Literal(literal) => self.literal(literal),
            Expr::Unary { op, expr } => {
                match op {
                    UnaryOp::Plus => self.out.push('+'),
                    UnaryOp::Minus => {
                        // `--` would open a comment.
                        let nested_minus = matches!(
                            expr.as_ref(),
                            Expr::Unary { op: UnaryOp::Minus, .. }
                        ) || matches!(
                            expr.as_ref(),
                            Expr::Literal(Literal::Decimal(text)) if text.starts_with('-')
                        );
                        self.out.push('-');
                        if nested_minus {
                            self.out.push(' ');
                        }
                    }
                    UnaryOp::Not => self.out.push_str("NOT "),
                }
                self.expr(expr);
            }
            Expr::Binary { left, op, right } => {
                self.expr(left);
                let _ = write!(self.out, " {} ", op.symbol());
                self.expr(right);
            }
            Expr::Nested(inner) => {
                self.out.push('(');
                self.expr(inner);
                self.out.push(')');
            }
            Expr::IsNull { expr, negated } => {
                self.expr(expr);
                self.out
                    .push_str(if *negated { " IS NOT NULL" } else { " IS NULL" });
            }
            Expr::Between {
                expr,
                negated,
                low,
                high,
            } => {
                self.expr(expr);
                self.out
                    .push_str(if *negated { " NOT BETWEEN " } else { " BETWEEN " });
                self.expr(low);
                self.out.push_str(" AND ");
                self.expr(high);
            }
            Expr::InList {
                expr,
                negated,
                list,
            } => {
                self.expr(expr);
                self.out.push_str(if *negated { " NOT IN (" } else { " IN (" });
                self.expr_list(list);
                self.out.push(')');
            }
            Expr::Case {
                operand,
                when_clauses,
                else_result,
            } => {
                self.out.push_str("CASE");
                if let Some(operand) = operand {
                    self.out.push(' ');
                    self.expr(operand);
                }
                for clause in when_clauses {
                    self.out.push_str(" WHEN ");
                    self.expr(&clause.condition);
                    self.out.push_str(" THEN ");
                    self.expr(&clause.result);
                }
                if let Some(else_result) = else_result {
                    self.out.push_str(" ELSE ");
                    self.expr(else_result);
                }
                self.out.push_str(" END");
            }
            Expr::Cast { expr, data_type } => {
                self.out.push_str("CAST(");
                self.expr(expr);
                let _ = write!(self.out, " AS {})", data_type);
            }
            Expr::Like {
                expr,
                negated,
                pattern,
            } => {
                self.expr(expr);
                self.out
                    .push_str(if *negated { " NOT LIKE " } else { " LIKE " });
                self.expr(pattern);
            }
            Expr::Exists { subquery, negated } => {
                self.out
                    .push_str(if *negated { "NOT EXISTS (" } else { "EXISTS (" });
                self.query(subquery);
                self.out.push(')');
            }
            Expr::InSubquery {
                expr,
                negated,
                subquery,
            } => {
                self.expr(expr);
                self.out.push_str(if *negated { " NOT IN (" } else { " IN (" });
                self.query(subquery);
                self.out.push(')');
            }
            Expr::Subquery(query) => {
                self.out.push('(');
                self.query(query);
                self.out.push(')');
            }
            Expr::Wildcard => self.out.push('*'),
            Expr::Raw(raw) => self.raw(raw),
        }
    }

    fn raw(&mut self, raw: &RawExpr) {
        for token in raw.tokens() {
            match token {
                Token::Word(word) if word.quote_style.is_some() => {
                    self.identifier(&Identifier::quoted(word.value.as_str()))
                }
                Token::SingleQuotedString(value) => self.literal(&Literal::String(value.clone())),
                _ => match boolean_literal(token) {
                    Some(value) => self.literal(&Literal::Boolean(value)),
                    None => {
                        let _ = write!(self.out, "{}", token);
                    }
                },
            }
        }
    }

    fn literal(&mut self, literal: &Literal) {
        match literal {
            Literal::Long(value) => {
                let _ = write!(self.out, "{}", value);
            }
            Literal::Decimal(text) => self.out.push_str(text),
            Literal::String(value) => {
                self.out.push('\'');
                self.out.push_str(&value.replace('\'', "''"));
                self.out.push('\'');
            }
            Literal::Boolean(value) => {
                let text = match (self.options.booleans_as_integers, value) {
                    (true, true) => "1",
                    (true, false) => "0",
                    (false, true) => "TRUE",
                    (false, false) => "FALSE",
                };
                self.out.push_str(text);
            }
            Literal::Null => self.out.push_str("NULL"),
        }
    }

    fn name(&mut self, name: &QualifiedName) {
        for (i, part) in name.parts.iter().enumerate() {
            if i > 0 {
                self.out.push('.');
            }
            self.identifier(part);
        }
    }

    fn identifier(&mut self, ident: &Identifier) {
        if !ident.quoted {
            self.out.push_str(&ident.value);
            return;
        }
        match self.options.quote_style {
            QuoteStyle::Backtick => {
                self.out.push('`');
                self.out.push_str(&ident.value.replace('`', "``"));
                self.out.push('`');
            }
            QuoteStyle::Double => {
                self.out.push('"');
                self.out.push_str(&ident.value.replace('"', "\"\""));
                self.out.push('"');
            }
            QuoteStyle::None => self.out.push_str(&ident.value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::parser::parse_statement;

    fn roundtrip(sql: &str, options: FormatOptions) -> String {
        format_statement(&parse_statement(sql).unwrap(), options)
    }

    #[test]
    fn test_format_simple_query() {
        let sql = "SELECT a.ra, a.decl AS d FROM sdss.Object AS a WHERE a.ra > 10 ORDER BY a.ra DESC LIMIT 5";
        assert_eq!(roundtrip(sql, FormatOptions::default()), sql);
    }

    #[test]
    fn test_quote_style_applies_to_quoted_identifiers_only() {
        let sql = r#"SELECT "Ra", decl FROM "W13"."Object""#;
        let backtick = FormatOptions {
            quote_style: QuoteStyle::Backtick,
            booleans_as_integers: false,
        };
        assert_eq!(roundtrip(sql, backtick), "SELECT `Ra`, decl FROM `W13`.`Object`");

        let bare = FormatOptions {
            quote_style: QuoteStyle::None,
            booleans_as_integers: false,
        };
        assert_eq!(roundtrip(sql, bare), "SELECT Ra, decl FROM W13.Object");
    }

    #[test]
    fn test_booleans_as_integers() {
        let sql = "SELECT * FROM t WHERE flag = true AND other = false";
        let options = FormatOptions {
            quote_style: QuoteStyle::Backtick,
            booleans_as_integers: true,
        };
        assert_eq!(
            roundtrip(sql, options),
            "SELECT * FROM t WHERE flag = 1 AND other = 0"
        );
        assert_eq!(
            roundtrip(sql, FormatOptions::default()),
            "SELECT * FROM t WHERE flag = TRUE AND other = FALSE"
        );
    }

    #[test]
    fn test_joins_and_nested_predicates() {
        let sql = "SELECT o.id, s.flux FROM Object AS o JOIN Source AS s ON o.id = s.objectId, Band AS b WHERE (o.ra BETWEEN 1 AND 2) AND s.flux IS NOT NULL";
        assert_eq!(roundtrip(sql, FormatOptions::default()), sql);
    }

    #[test]
    fn test_string_literal_escaping() {
        let sql = "SELECT * FROM t WHERE name = 'O''Brien'";
        assert_eq!(roundtrip(sql, FormatOptions::default()), sql);
    }

    #[test]
    fn test_aliased_join_keeps_parentheses() {
        let sql = "SELECT * FROM (a JOIN b ON a.id = b.id) AS x WHERE x.id > 1";
        assert_eq!(roundtrip(sql, FormatOptions::default()), sql);

        let joined = "SELECT * FROM c JOIN (a JOIN b ON a.id = b.id) AS x ON c.id = x.id";
        assert_eq!(roundtrip(joined, FormatOptions::default()), joined);
    }

    #[test]
    fn test_modelled_expressions_are_requoted() {
        let sql = r#"SELECT CASE WHEN "Flux" > 1 THEN CAST("Ra" AS INT) ELSE 0 END FROM t WHERE name NOT LIKE 'M%'"#;
        let backtick = FormatOptions {
            quote_style: QuoteStyle::Backtick,
            booleans_as_integers: false,
        };
        assert_eq!(
            roundtrip(sql, backtick),
            "SELECT CASE WHEN `Flux` > 1 THEN CAST(`Ra` AS INT) ELSE 0 END FROM t WHERE name NOT LIKE 'M%'"
        );
    }

    #[test]
    fn test_unmodelled_expressions_are_requoted() {
        let sql = r#"SELECT "Flux" IS DISTINCT FROM true, name IS DISTINCT FROM 'it''s' FROM t"#;
        let options = FormatOptions {
            quote_style: QuoteStyle::Backtick,
            booleans_as_integers: true,
        };
        assert_eq!(
            roundtrip(sql, options),
            "SELECT `Flux` IS DISTINCT FROM 1, name IS DISTINCT FROM 'it''s' FROM t"
        );
        assert_eq!(
            roundtrip(sql, FormatOptions::default()),
            r#"SELECT "Flux" IS DISTINCT FROM TRUE, name IS DISTINCT FROM 'it''s' FROM t"#
        );
    }

    #[test]
    fn test_subquery_predicates() {
        let sql = "SELECT * FROM t WHERE NOT EXISTS (SELECT 1 FROM s WHERE s.id = t.id) AND t.id IN (SELECT id FROM u)";
        assert_eq!(roundtrip(sql, FormatOptions::default()), sql);
    }

    #[test]
    fn test_show_columns() {
        let statement = parse_statement("SHOW COLUMNS FROM sdss.Object").unwrap();
        assert_eq!(
            format_statement(&statement, FormatOptions::default()),
            "SHOW COLUMNS FROM sdss.Object"
        );
    }
}
