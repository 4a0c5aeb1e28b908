// Traversal framework over the closed SQL tree.
//
// `Visitor` is read-only and accumulates into a caller-supplied context.
// `Rebuilder` consumes a tree and returns a (possibly different) tree. Both
// default every hook to a `walk_*` / `rebuild_*` function that recurses into the
// children, so a pass only overrides the productions it cares about.

use crate::api::middleware::AppError;
use crate::sql::ast::*;

pub trait Visitor<C> {
    fn visit_statement(&mut self, node: &Statement, ctx: &mut C) {
        walk_statement(self, node, ctx)
    }

    fn visit_query(&mut self, node: &Query, ctx: &mut C) {
        walk_query(self, node, ctx)
    }

    fn visit_query_specification(&mut self, node: &QuerySpecification, ctx: &mut C) {
        walk_query_specification(self, node, ctx)
    }

    fn visit_single_column(&mut self, node: &SingleColumn, ctx: &mut C) {
        self.visit_expr(&node.expr, ctx)
    }

    fn visit_all_columns(&mut self, _node: &AllColumns, _ctx: &mut C) {}

    fn visit_relation(&mut self, node: &Relation, ctx: &mut C) {
        walk_relation(self, node, ctx)
    }

    fn visit_table(&mut self, _node: &Table, _ctx: &mut C) {}

    fn visit_aliased_relation(&mut self, node: &AliasedRelation, ctx: &mut C) {
        self.visit_relation(&node.relation, ctx)
    }

    fn visit_join(&mut self, node: &Join, ctx: &mut C) {
        walk_join(self, node, ctx)
    }

    fn visit_show_columns(&mut self, _node: &ShowColumns, _ctx: &mut C) {}

    fn visit_expr(&mut self, node: &Expr, ctx: &mut C) {
        walk_expr(self, node, ctx)
    }

    fn visit_identifier(&mut self, _node: &Identifier, _ctx: &mut C) {}

    fn visit_dereference(&mut self, _node: &QualifiedName, _ctx: &mut C) {}

    fn visit_function_call(&mut self, node: &FunctionCall, ctx: &mut C) {
        for arg in &node.arguments {
            self.visit_expr(arg, ctx);
        }
    }

    fn visit_literal(&mut self, node: &Literal, ctx: &mut C) {
        if let Literal::Boolean(value) = node {
            self.visit_boolean_literal(*value, ctx);
        }
    }

    fn visit_boolean_literal(&mut self, _value: bool, _ctx: &mut C) {}

    fn visit_subquery_expression(&mut self, node: &Query, ctx: &mut C) {
        self.visit_query(node, ctx)
    }
}

pub fn walk_statement<C, V: Visitor<C> + ?Sized>(visitor: &mut V, node: &Statement, ctx: &mut C) {
    match node {
        Statement::Query(query) => visitor.visit_query(query, ctx),
        Statement::ShowColumns(show) => visitor.visit_show_columns(show, ctx),
    }
}

pub fn walk_query<C, V: Visitor<C> + ?Sized>(visitor: &mut V, node: &Query, ctx: &mut C) {
    visitor.visit_query_specification(&node.body, ctx);
    for item in &node.order_by {
        visitor.visit_expr(&item.expr, ctx);
    }
    if let Some(limit) = &node.limit {
        visitor.visit_expr(limit, ctx);
    }
    if let Some(offset) = &node.offset {
        visitor.visit_expr(offset, ctx);
    }
}

pub fn walk_query_specification<C, V: Visitor<C> + ?Sized>(
    visitor: &mut V,
    node: &QuerySpecification,
    ctx: &mut C,
) {
    for item in &node.select {
        match item {
            SelectItem::SingleColumn(column) => visitor.visit_single_column(column, ctx),
            SelectItem::AllColumns(all) => visitor.visit_all_columns(all, ctx),
        }
    }
    if let Some(from) = &node.from {
        visitor.visit_relation(from, ctx);
    }
    if let Some(selection) = &node.where_clause {
        visitor.visit_expr(selection, ctx);
    }
    for expr in &node.group_by {
        visitor.visit_expr(expr, ctx);
    }
    if let Some(having) = &node.having {
        visitor.visit_expr(having, ctx);
    }
}

pub fn walk_relation<C, V: Visitor<C> + ?Sized>(visitor: &mut V, node: &Relation, ctx: &mut C) {
    match node {
        Relation::Table(table) => visitor.visit_table(table, ctx),
        Relation::Aliased(aliased) => visitor.visit_aliased_relation(aliased, ctx),
        Relation::Join(join) => visitor.visit_join(join, ctx),
        Relation::Subquery(query) => visitor.visit_query(query, ctx),
    }
}

pub fn walk_join<C, V: Visitor<C> + ?Sized>(visitor: &mut V, node: &Join, ctx: &mut C) {
    visitor.visit_relation(&node.left, ctx);
    visitor.visit_relation(&node.right, ctx);
    if let Some(JoinCriteria::On(expr)) = &node.criteria {
        visitor.visit_expr(expr, ctx);
    }
}

pub fn walk_expr<C, V: Visitor<C> + ?Sized>(visitor: &mut V, node: &Expr, ctx: &mut C) {
    match node {
        Expr::Identifier(ident) => visitor.visit_identifier(ident, ctx),
        Expr::Dereference(name) => visitor.visit_dereference(name, ctx),
        Expr::FunctionCall(call) => visitor.visit_function_call(call, ctx),
        Expr::Literal(literal) => visitor.visit_literal(literal, ctx),
        Expr::Unary { expr, .. } => visitor.visit_expr(expr, ctx),
        Expr::Binary { left, right, .. } => {
            visitor.visit_expr(left, ctx);
            visitor.visit_expr(right, ctx);
        }
        Expr::Nested(inner) => visitor.visit_expr(inner, ctx),
        Expr::IsNull { expr, .. } => visitor.visit_expr(expr, ctx),
        Expr::Between {
            expr, low, high, ..
        } => {
            visitor.visit_expr(expr, ctx);
            visitor.visit_expr(low, ctx);
            visitor.visit_expr(high, ctx);
        }
        Expr::InList { expr, list, .. } => {
            visitor.visit_expr(expr, ctx);
            for item in list {
                visitor.visit_expr(item, ctx);
            }
        }
        Expr::Case {
            operand,
            when_clauses,
            else_result,
        } => {
            if let Some(operand) = operand {
                visitor.visit_expr(operand, ctx);
            }
            for clause in when_clauses {
                visitor.visit_expr(&clause.condition, ctx);
                visitor.visit_expr(&clause.result, ctx);
            }
            if let Some(else_result) = else_result {
                visitor.visit_expr(else_result, ctx);
            }
        }
        Expr::Cast { expr, .. } => visitor.visit_expr(expr, ctx),
        Expr::Like { expr, pattern, .. } => {
            visitor.visit_expr(expr, ctx);
            visitor.visit_expr(pattern, ctx);
        }
        Expr::Exists { subquery, .. } => visitor.visit_subquery_expression(subquery, ctx),
        Expr::InSubquery { expr, subquery, .. } => {
            visitor.visit_expr(expr, ctx);
            visitor.visit_subquery_expression(subquery, ctx);
        }
        Expr::Subquery(query) => visitor.visit_subquery_expression(query, ctx),
        Expr::Wildcard | Expr::Raw(_) => {}
    }
}

/// Consuming rewrite pass. Untouched subtrees are moved through unchanged.
pub trait Rebuilder {
    fn rebuild_statement(&mut self, node: Statement) -> Result<Statement, AppError> {
        match node {
            Statement::Query(query) => Ok(Statement::Query(self.rebuild_query(query)?)),
            Statement::ShowColumns(show) => self.rebuild_show_columns(show),
        }
    }

    fn rebuild_query(&mut self, node: Query) -> Result<Query, AppError> {
        Ok(Query {
            body: self.rebuild_query_specification(node.body)?,
            order_by: node
                .order_by
                .into_iter()
                .map(|item| {
                    Ok(SortItem {
                        expr: self.rebuild_expr(item.expr)?,
                        ..item
                    })
                })
                .collect::<Result<Vec<_>, AppError>>()?,
            limit: node.limit.map(|e| self.rebuild_expr(e)).transpose()?,
            offset: node.offset.map(|e| self.rebuild_expr(e)).transpose()?,
        })
    }

    fn rebuild_query_specification(
        &mut self,
        node: QuerySpecification,
    ) -> Result<QuerySpecification, AppError> {
        let select = node
            .select
            .into_iter()
            .map(|item| match item {
                SelectItem::SingleColumn(column) => Ok(SelectItem::SingleColumn(SingleColumn {
                    expr: self.rebuild_expr(column.expr)?,
                    alias: column.alias,
                })),
                SelectItem::AllColumns(all) => Ok(SelectItem::AllColumns(all)),
            })
            .collect::<Result<Vec<_>, AppError>>()?;
        Ok(QuerySpecification {
            distinct: node.distinct,
            select,
            from: node.from.map(|r| self.rebuild_relation(r)).transpose()?,
            where_clause: node.where_clause.map(|e| self.rebuild_expr(e)).transpose()?,
            group_by: node
                .group_by
                .into_iter()
                .map(|e| self.rebuild_expr(e))
                .collect::<Result<Vec<_>, AppError>>()?,
            having: node.having.map(|e| self.rebuild_expr(e)).transpose()?,
        })
    }

    fn rebuild_relation(&mut self, node: Relation) -> Result<Relation, AppError> {
        match node {
            Relation::Table(table) => self.rebuild_table(table),
            Relation::Aliased(aliased) => Ok(Relation::Aliased(AliasedRelation {
                relation: Box::new(self.rebuild_relation(*aliased.relation)?),
                alias: aliased.alias,
            })),
            Relation::Join(join) => Ok(Relation::Join(Join {
                join_type: join.join_type,
                left: Box::new(self.rebuild_relation(*join.left)?),
                right: Box::new(self.rebuild_relation(*join.right)?),
                criteria: match join.criteria {
                    Some(JoinCriteria::On(expr)) => Some(JoinCriteria::On(self.rebuild_expr(expr)?)),
                    other => other,
                },
            })),
            Relation::Subquery(query) => Ok(Relation::Subquery(Box::new(self.rebuild_query(*query)?))),
        }
    }

    fn rebuild_table(&mut self, node: Table) -> Result<Relation, AppError> {
        Ok(Relation::Table(node))
    }

    fn rebuild_show_columns(&mut self, node: ShowColumns) -> Result<Statement, AppError> {
        Ok(Statement::ShowColumns(node))
    }

    fn rebuild_function_call(&mut self, node: FunctionCall) -> Result<Expr, AppError> {
        let arguments = self.rebuild_exprs(node.arguments)?;
        Ok(Expr::FunctionCall(FunctionCall { arguments, ..node }))
    }

    fn rebuild_boolean_literal(&mut self, value: bool) -> Result<Expr, AppError> {
        Ok(Expr::Literal(Literal::Boolean(value)))
    }

    fn rebuild_raw(&mut self, node: RawExpr) -> Result<Expr, AppError> {
        Ok(Expr::Raw(node))
    }

    fn rebuild_optional_expr(&mut self, node: Option<Box<Expr>>) -> Result<Option<Box<Expr>>, AppError> {
        node.map(|e| self.rebuild_expr(*e).map(Box::new)).transpose()
    }

    fn rebuild_exprs(&mut self, nodes: Vec<Expr>) -> Result<Vec<Expr>, AppError> {
        nodes.into_iter().map(|e| self.rebuild_expr(e)).collect()
    }

    fn rebuild_expr(&mut self, node: Expr) -> Result<Expr, AppError> {
        Ok(match node {
            Expr::FunctionCall(call) => self.rebuild_function_call(call)?,
            Expr::Literal(Literal::Boolean(value)) => self.rebuild_boolean_literal(value)?,
            Expr::Unary { op, expr } => Expr::Unary {
                op,
                expr: Box::new(self.rebuild_expr(*expr)?),
            },
            Expr::Binary { left, op, right } => Expr::Binary {
                left: Box::new(self.rebuild_expr(*left)?),
                op,
                right: Box::new(self.rebuild_expr(*right)?),
            },
            Expr::Nested(inner) => Expr::Nested(Box::new(self.rebuild_expr(*inner)?)),
            Expr::IsNull { expr, negated } => Expr::IsNull {
                expr: Box::new(self.rebuild_expr(*expr)?),
                negated,
            },
            Expr::Between {
                expr,
                negated,
                low,
                high,
            } => Expr::Between {
                expr: Box::new(self.rebuild_expr(*expr)?),
                negated,
                low: Box::new(self.rebuild_expr(*low)?),
                high: Box::new(self.rebuild_expr(*high)?),
            },
            Expr::InList {
                expr,
                negated,
                list,
            } => Expr::InList {
                expr: Box::new(self.rebuild_expr(*expr)?),
                negated,
                list: self.rebuild_exprs(list)?,
            },
            Expr::Case {
                operand,
                when_clauses,
                else_result,
            } => Expr::Case {
                operand: self.rebuild_optional_expr(operand)?,
                when_clauses: when_clauses
                    .into_iter()
                    .map(|clause| {
                        Ok(WhenClause {
                            condition: self.rebuild_expr(clause.condition)?,
                            result: self.rebuild_expr(clause.result)?,
                        })
                    })
                    .collect::<Result<Vec<_>, AppError>>()?,
                else_result: self.rebuild_optional_expr(else_result)?,
            },
            Expr::Cast { expr, data_type } => Expr::Cast {
                expr: Box::new(self.rebuild_expr(*expr)?),
                data_type,
            },
            Expr::Like {
                expr,
                negated,
                pattern,
            } => Expr::Like {
                expr: Box::new(self.rebuild_expr(*expr)?),
                negated,
                pattern: Box::new(self.rebuild_expr(*pattern)?),
            },
            Expr::Exists { subquery, negated } => Expr::Exists {
                subquery: Box::new(self.rebuild_query(*subquery)?),
                negated,
            },
            Expr::InSubquery {
                expr,
                negated,
                subquery,
            } => Expr::InSubquery {
                expr: Box::new(self.rebuild_expr(*expr)?),
                negated,
                subquery: Box::new(self.rebuild_query(*subquery)?),
            },
            Expr::Subquery(query) => Expr::Subquery(Box::new(self.rebuild_query(*query)?)),
            Expr::Raw(raw) => self.rebuild_raw(raw)?,
            leaf @ (Expr::Identifier(_) | Expr::Dereference(_) | Expr::Literal(_) | Expr::Wildcard) => leaf,
        })
    }
}
