// Lowers sqlparser's tree into the gateway's closed AST.
//
// GenericDialect is used so that `"//host:port"."schema".table` style instance
// identifiers parse as quoted identifiers. Expressions outside the modelled
// grammar are kept as tokens, unless they hide a spatial call or a subquery;
// relations and statements outside it are rejected.

use sqlparser::ast as sp;
use sqlparser::dialect::GenericDialect;
use sqlparser::keywords::Keyword;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer};

use crate::api::middleware::AppError;
use crate::sql::ast::*;
use crate::validation::SqlValidator;

/// Parse exactly one statement.
pub fn parse_statement(sql: &str) -> Result<Statement, AppError> {
    let statements = Parser::parse_sql(&GenericDialect {}, sql)
        .map_err(|e| AppError::InvalidSql(format!("SQL parsing error: {}", e)))?;

    let mut statements = statements.into_iter();
    match (statements.next(), statements.next()) {
        (None, _) => Err(AppError::InvalidSql("Empty SQL query".to_string())),
        (Some(statement), None) => lower_statement(statement),
        (Some(_), Some(_)) => Err(AppError::InvalidSql(
            "Only a single statement may be submitted".to_string(),
        )),
    }
}

/// Calls the ADQL rewriter has to see.
const SPATIAL_FUNCTIONS: [&str; 6] = ["contains", "point", "circle", "box", "polygon", "distance"];

fn unsupported(what: impl std::fmt::Display) -> AppError {
    AppError::InvalidSql(format!("Unsupported SQL construct: {}", what))
}

fn lower_statement(statement: sp::Statement) -> Result<Statement, AppError> {
    SqlValidator::check_read_only(&statement)?;
    match statement {
        sp::Statement::Query(query) => Ok(Statement::Query(lower_query(*query)?)),
        sp::Statement::ShowColumns { show_options, .. } => {
            let table = show_options
                .show_in
                .and_then(|show_in| show_in.parent_name)
                .ok_or_else(|| AppError::InvalidSql("SHOW COLUMNS requires a table".to_string()))?;
            Ok(Statement::ShowColumns(ShowColumns {
                table: lower_object_name(table)?,
            }))
        }
        other => Err(unsupported(other)),
    }
}

fn lower_query(query: sp::Query) -> Result<Query, AppError> {
    if query.with.is_some() {
        return Err(unsupported("WITH clause"));
    }
    if query.fetch.is_some() {
        return Err(unsupported("FETCH clause"));
    }

    let body = match *query.body {
        sp::SetExpr::Select(select) => lower_select(*select)?,
        other => return Err(unsupported(format!("query body `{}`", other))),
    };

    let order_by = match query.order_by {
        None => Vec::new(),
        Some(order_by) => match order_by.kind {
            sp::OrderByKind::Expressions(items) => items
                .into_iter()
                .map(|item| {
                    Ok(SortItem {
                        expr: lower_expr(item.expr)?,
                        ascending: item.options.asc,
                        nulls_first: item.options.nulls_first,
                    })
                })
                .collect::<Result<Vec<_>, AppError>>()?,
            _ => return Err(unsupported("ORDER BY ALL")),
        },
    };

    let (limit, offset) = match query.limit_clause {
        None => (None, None),
        Some(sp::LimitClause::LimitOffset {
            limit,
            offset,
            limit_by,
        }) => {
            if !limit_by.is_empty() {
                return Err(unsupported("LIMIT BY"));
            }
            (
                limit.map(lower_expr).transpose()?,
                offset.map(|o| lower_expr(o.value)).transpose()?,
            )
        }
        Some(sp::LimitClause::OffsetCommaLimit { offset, limit }) => {
            (Some(lower_expr(limit)?), Some(lower_expr(offset)?))
        }
    };

    Ok(Query {
        body,
        order_by,
        limit,
        offset,
    })
}

fn lower_select(select: sp::Select) -> Result<QuerySpecification, AppError> {
    if select.top.is_some() {
        return Err(unsupported("TOP"));
    }
    if select.into.is_some() {
        return Err(unsupported("SELECT INTO"));
    }
    if select.qualify.is_some() {
        return Err(unsupported("QUALIFY"));
    }

    let distinct = match select.distinct {
        None => false,
        Some(sp::Distinct::Distinct) => true,
        Some(other) => return Err(unsupported(other)),
    };

    let mut items = Vec::with_capacity(select.projection.len());
    for item in select.projection {
        items.push(lower_select_item(item)?);
    }

    let mut from: Option<Relation> = None;
    for table_with_joins in select.from {
        let relation = lower_table_with_joins(table_with_joins)?;
        from = Some(match from {
            None => relation,
            Some(left) => Relation::Join(Join {
                join_type: JoinType::Implicit,
                left: Box::new(left),
                right: Box::new(relation),
                criteria: None,
            }),
        });
    }

    let group_by = match select.group_by {
        sp::GroupByExpr::Expressions(exprs, modifiers) => {
            if !modifiers.is_empty() {
                return Err(unsupported("GROUP BY modifiers"));
            }
            exprs
                .into_iter()
                .map(lower_expr)
                .collect::<Result<Vec<_>, AppError>>()?
        }
        sp::GroupByExpr::All(_) => return Err(unsupported("GROUP BY ALL")),
    };

    Ok(QuerySpecification {
        distinct,
        select: items,
        from,
        where_clause: select.selection.map(lower_expr).transpose()?,
        group_by,
        having: select.having.map(lower_expr).transpose()?,
    })
}

#[allow(unreachable_patterns)]
fn lower_select_item(item: sp::SelectItem) -> Result<SelectItem, AppError> {
    match item {
        sp::SelectItem::UnnamedExpr(expr) => Ok(SelectItem::SingleColumn(SingleColumn {
            expr: lower_expr(expr)?,
            alias: None,
        })),
        sp::SelectItem::ExprWithAlias { expr, alias } => Ok(SelectItem::SingleColumn(SingleColumn {
            expr: lower_expr(expr)?,
            alias: Some(lower_ident(alias)),
        })),
        sp::SelectItem::Wildcard(_) => Ok(SelectItem::AllColumns(AllColumns { prefix: None })),
        sp::SelectItem::QualifiedWildcard(sp::SelectItemQualifiedWildcardKind::ObjectName(name), _) => {
            Ok(SelectItem::AllColumns(AllColumns {
                prefix: Some(lower_object_name(name)?),
            }))
        }
        other => Err(unsupported(other)),
    }
}

fn lower_table_with_joins(table_with_joins: sp::TableWithJoins) -> Result<Relation, AppError> {
    let mut relation = lower_table_factor(table_with_joins.relation)?;
    for join in table_with_joins.joins {
        let (join_type, constraint) = match join.join_operator {
            sp::JoinOperator::Join(c) | sp::JoinOperator::Inner(c) => (JoinType::Inner, c),
            sp::JoinOperator::Left(c) | sp::JoinOperator::LeftOuter(c) => (JoinType::Left, c),
            sp::JoinOperator::Right(c) | sp::JoinOperator::RightOuter(c) => (JoinType::Right, c),
            sp::JoinOperator::FullOuter(c) => (JoinType::Full, c),
            other => return Err(unsupported(format!("join operator {:?}", other))),
        };
        let criteria = match constraint {
            sp::JoinConstraint::On(expr) => Some(JoinCriteria::On(lower_expr(expr)?)),
            sp::JoinConstraint::Using(columns) => Some(JoinCriteria::Using(
                columns.iter().map(|c| Identifier::new(c.to_string())).collect(),
            )),
            sp::JoinConstraint::Natural => Some(JoinCriteria::Natural),
            sp::JoinConstraint::None => None,
        };
        relation = Relation::Join(Join {
            join_type,
            left: Box::new(relation),
            right: Box::new(lower_table_factor(join.relation)?),
            criteria,
        });
    }
    Ok(relation)
}

fn lower_table_factor(factor: sp::TableFactor) -> Result<Relation, AppError> {
    match factor {
        sp::TableFactor::Table {
            name, alias, args, ..
        } => {
            if args.is_some() {
                return Err(unsupported("table-valued function"));
            }
            let table = Relation::Table(Table {
                name: lower_object_name(name)?,
            });
            with_alias(table, alias)
        }
        sp::TableFactor::Derived {
            subquery, alias, ..
        } => with_alias(Relation::Subquery(Box::new(lower_query(*subquery)?)), alias),
        sp::TableFactor::NestedJoin {
            table_with_joins,
            alias,
            ..
        } => with_alias(lower_table_with_joins(*table_with_joins)?, alias),
        other => Err(unsupported(format!("relation `{}`", other))),
    }
}

fn with_alias(relation: Relation, alias: Option<sp::TableAlias>) -> Result<Relation, AppError> {
    match alias {
        None => Ok(relation),
        Some(alias) => {
            if !alias.columns.is_empty() {
                return Err(unsupported("column aliases on a relation"));
            }
            Ok(Relation::Aliased(AliasedRelation {
                relation: Box::new(relation),
                alias: lower_ident(alias.name),
            }))
        }
    }
}

#[allow(unreachable_patterns)]
fn lower_object_name(name: sp::ObjectName) -> Result<QualifiedName, AppError> {
    let parts = name
        .0
        .into_iter()
        .map(|part| match part {
            sp::ObjectNamePart::Identifier(ident) => Ok(lower_ident(ident)),
            other => Err(unsupported(format!("name part `{}`", other))),
        })
        .collect::<Result<Vec<_>, AppError>>()?;
    Ok(QualifiedName::new(parts))
}

fn lower_ident(ident: sp::Ident) -> Identifier {
    Identifier {
        quoted: ident.quote_style.is_some(),
        value: ident.value,
    }
}

fn lower_expr(expr: sp::Expr) -> Result<Expr, AppError> {
    Ok(match expr {
        sp::Expr::Identifier(ident) => Expr::Identifier(lower_ident(ident)),
        sp::Expr::CompoundIdentifier(idents) => {
            Expr::Dereference(QualifiedName::new(idents.into_iter().map(lower_ident).collect()))
        }
        sp::Expr::Value(value) => lower_value(value.value)?,
        sp::Expr::UnaryOp { op, expr } => {
            let lowered = match op {
                sp::UnaryOperator::Minus => Some(UnaryOp::Minus),
                sp::UnaryOperator::Plus => Some(UnaryOp::Plus),
                sp::UnaryOperator::Not => Some(UnaryOp::Not),
                _ => None,
            };
            match lowered {
                Some(op) => Expr::Unary {
                    op,
                    expr: Box::new(lower_expr(*expr)?),
                },
                None => lower_raw(sp::Expr::UnaryOp { op, expr })?,
            }
        }
        sp::Expr::BinaryOp { left, op, right } => match lower_binary_op(&op) {
            Some(lowered) => Expr::Binary {
                left: Box::new(lower_expr(*left)?),
                op: lowered,
                right: Box::new(lower_expr(*right)?),
            },
            None => lower_raw(sp::Expr::BinaryOp { left, op, right })?,
        },
        sp::Expr::Nested(inner) => Expr::Nested(Box::new(lower_expr(*inner)?)),
        sp::Expr::IsNull(inner) => Expr::IsNull {
            expr: Box::new(lower_expr(*inner)?),
            negated: false,
        },
        sp::Expr::IsNotNull(inner) => Expr::IsNull {
            expr: Box::new(lower_expr(*inner)?),
            negated: true,
        },
        sp::Expr::Between {
            expr,
            negated,
            low,
            high,
        } => Expr::Between {
            expr: Box::new(lower_expr(*expr)?),
            negated,
            low: Box::new(lower_expr(*low)?),
            high: Box::new(lower_expr(*high)?),
        },
        sp::Expr::InList {
            expr,
            list,
            negated,
        } => Expr::InList {
            expr: Box::new(lower_expr(*expr)?),
            negated,
            list: list
                .into_iter()
                .map(lower_expr)
                .collect::<Result<Vec<_>, AppError>>()?,
        },
        sp::Expr::Case {
            operand,
            conditions,
            else_result,
            ..
        } => Expr::Case {
            operand: operand.map(|e| lower_expr(*e).map(Box::new)).transpose()?,
            when_clauses: conditions
                .into_iter()
                .map(|when| {
                    Ok(WhenClause {
                        condition: lower_expr(when.condition)?,
                        result: lower_expr(when.result)?,
                    })
                })
                .collect::<Result<Vec<_>, AppError>>()?,
            else_result: else_result.map(|e| lower_expr(*e).map(Box::new)).transpose()?,
        },
        sp::Expr::Cast {
            kind: sp::CastKind::Cast,
            expr,
            data_type,
            format: None,
        } => Expr::Cast {
            expr: Box::new(lower_expr(*expr)?),
            data_type: data_type.to_string(),
        },
        sp::Expr::Like {
            negated,
            any: false,
            expr,
            pattern,
            escape_char: None,
        } => Expr::Like {
            expr: Box::new(lower_expr(*expr)?),
            negated,
            pattern: Box::new(lower_expr(*pattern)?),
        },
        sp::Expr::Exists { subquery, negated } => Expr::Exists {
            subquery: Box::new(lower_query(*subquery)?),
            negated,
        },
        sp::Expr::InSubquery {
            expr,
            subquery,
            negated,
        } => Expr::InSubquery {
            expr: Box::new(lower_expr(*expr)?),
            negated,
            subquery: Box::new(lower_query(*subquery)?),
        },
        sp::Expr::Subquery(query) => Expr::Subquery(Box::new(lower_query(*query)?)),
        sp::Expr::Function(function) => lower_function(function)?,
        other => lower_raw(other)?,
    })
}

/// Keep an unmodelled expression as tokens. Spatial calls and subqueries
/// inside it are refused, since the rewrite passes could not reach them.
fn lower_raw(node: impl std::fmt::Display) -> Result<Expr, AppError> {
    let text = node.to_string();
    let tokens = Tokenizer::new(&GenericDialect {}, &text)
        .tokenize()
        .map_err(|e| AppError::InvalidSql(format!("SQL parsing error: {}", e)))?;

    let mut significant = tokens
        .iter()
        .filter(|token| !matches!(token, Token::Whitespace(_)))
        .peekable();
    while let Some(token) = significant.next() {
        let Token::Word(word) = token else {
            continue;
        };
        if word.keyword == Keyword::SELECT {
            return Err(unsupported(format!("subquery in `{}`", text)));
        }
        let name = word.value.to_lowercase();
        if SPATIAL_FUNCTIONS.contains(&name.as_str()) && matches!(significant.peek(), Some(Token::LParen)) {
            return Err(unsupported(format!("{} in `{}`", name.to_uppercase(), text)));
        }
    }
    Ok(Expr::Raw(RawExpr::new(tokens)))
}

fn lower_binary_op(op: &sp::BinaryOperator) -> Option<BinaryOp> {
    Some(match op {
        sp::BinaryOperator::Plus => BinaryOp::Plus,
        sp::BinaryOperator::Minus => BinaryOp::Minus,
        sp::BinaryOperator::Multiply => BinaryOp::Multiply,
        sp::BinaryOperator::Divide => BinaryOp::Divide,
        sp::BinaryOperator::Modulo => BinaryOp::Modulo,
        sp::BinaryOperator::Eq => BinaryOp::Eq,
        sp::BinaryOperator::NotEq => BinaryOp::NotEq,
        sp::BinaryOperator::Lt => BinaryOp::Lt,
        sp::BinaryOperator::LtEq => BinaryOp::LtEq,
        sp::BinaryOperator::Gt => BinaryOp::Gt,
        sp::BinaryOperator::GtEq => BinaryOp::GtEq,
        sp::BinaryOperator::And => BinaryOp::And,
        sp::BinaryOperator::Or => BinaryOp::Or,
        sp::BinaryOperator::StringConcat => BinaryOp::Concat,
        _ => return None,
    })
}

fn lower_value(value: sp::Value) -> Result<Expr, AppError> {
    Ok(match value {
        sp::Value::Number(text, _) => match text.parse::<i64>() {
            Ok(n) => Expr::Literal(Literal::Long(n)),
            Err(_) => Expr::Literal(Literal::Decimal(text)),
        },
        sp::Value::SingleQuotedString(s) => Expr::Literal(Literal::String(s)),
        sp::Value::Boolean(b) => Expr::Literal(Literal::Boolean(b)),
        sp::Value::Null => Expr::Literal(Literal::Null),
        other => lower_raw(other)?,
    })
}

fn lower_function(function: sp::Function) -> Result<Expr, AppError> {
    let plain = function.over.is_none()
        && function.filter.is_none()
        && function.null_treatment.is_none()
        && function.within_group.is_empty()
        && matches!(function.parameters, sp::FunctionArguments::None)
        && matches!(&function.args, sp::FunctionArguments::List(list) if list.clauses.is_empty());
    if !plain {
        return lower_raw(sp::Expr::Function(function));
    }

    let name = lower_object_name(function.name)?;
    let mut distinct = false;
    let mut arguments = Vec::new();
    if let sp::FunctionArguments::List(list) = function.args {
        distinct = matches!(list.duplicate_treatment, Some(sp::DuplicateTreatment::Distinct));
        for arg in list.args {
            arguments.push(match arg {
                sp::FunctionArg::Unnamed(sp::FunctionArgExpr::Expr(expr)) => lower_expr(expr)?,
                sp::FunctionArg::Unnamed(sp::FunctionArgExpr::Wildcard) => Expr::Wildcard,
                other => lower_raw(other)?,
            });
        }
    }
    Ok(Expr::FunctionCall(FunctionCall {
        name,
        distinct,
        arguments,
    }))
}
