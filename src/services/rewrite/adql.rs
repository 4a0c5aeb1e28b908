// ADQL spatial functions to engine-native calls.
//
// CONTAINS(POINT(x, y), shape) and DISTANCE(...) are replaced with scisql UDF
// calls, or with Qserv area specifications when the target is a Qserv czar.

use std::str::FromStr;

use rust_decimal::Decimal;

use crate::api::middleware::AppError;
use crate::sql::ast::*;
use crate::sql::visitor::Rebuilder;

/// Target flavour for spatial predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpatialDialect {
    /// Qserv area specifications. The point is implied by the table's
    /// partitioning columns, so it is not passed.
    Qserv,
    /// scisql UDFs, which take the point coordinates as leading arguments.
    SciSql,
}

impl SpatialDialect {
    pub fn for_uri(uri: &str) -> Self {
        if uri.contains("qserv") {
            SpatialDialect::Qserv
        } else {
            SpatialDialect::SciSql
        }
    }

    fn includes_point(&self) -> bool {
        matches!(self, SpatialDialect::SciSql)
    }

    fn circle(&self) -> &'static str {
        match self {
            SpatialDialect::Qserv => "qserv_areaspec_circle",
            SpatialDialect::SciSql => "scisql_s2PtInCircle",
        }
    }

    fn rectangle(&self) -> &'static str {
        match self {
            SpatialDialect::Qserv => "qserv_areaspec_box",
            SpatialDialect::SciSql => "scisql_s2PtInBox",
        }
    }

    fn polygon(&self) -> &'static str {
        match self {
            SpatialDialect::Qserv => "qserv_areaspec_poly",
            SpatialDialect::SciSql => "scisql_s2PtInCPoly",
        }
    }
}

const ANGULAR_SEPARATION: &str = "scisql_angSep";

pub fn rewrite_adql(statement: Statement, dialect: SpatialDialect) -> Result<Statement, AppError> {
    AdqlRewriter { dialect }.rebuild_statement(statement)
}

struct AdqlRewriter {
    dialect: SpatialDialect,
}

impl Rebuilder for AdqlRewriter {
    fn rebuild_function_call(&mut self, node: FunctionCall) -> Result<Expr, AppError> {
        let arguments = self.rebuild_exprs(node.arguments)?;
        let call = FunctionCall { arguments, ..node };
        match call.simple_name().as_str() {
            "contains" => self.rewrite_contains(call.arguments),
            "distance" => rewrite_distance(call.arguments),
            _ => Ok(Expr::FunctionCall(call)),
        }
    }
}

impl AdqlRewriter {
    fn rewrite_contains(&self, arguments: Vec<Expr>) -> Result<Expr, AppError> {
        let [point, shape]: [Expr; 2] = arguments.try_into().map_err(|_| {
            parse_error("Wrong number of arguments to function CONTAINS (2 arguments expected)")
        })?;

        let point = match point {
            Expr::FunctionCall(call) if call.simple_name() == "point" => call,
            _ => return Err(parse_error("Wrong first argument to function CONTAINS: Not a POINT")),
        };
        let shape = match shape {
            Expr::FunctionCall(call)
                if matches!(call.simple_name().as_str(), "circle" | "box" | "polygon") =>
            {
                call
            }
            _ => return Err(parse_error("Wrong second argument to function CONTAINS: Not a shape")),
        };

        let mut args = Vec::new();
        if self.dialect.includes_point() {
            if point.arguments.len() != 2 {
                return Err(parse_error("Wrong number of arguments for function POINT"));
            }
            args.extend(point.arguments);
        }

        let shape_name = shape.simple_name();
        let name = match shape_name.as_str() {
            "polygon" => {
                constant_args(&shape.arguments)?;
                let count = shape.arguments.len();
                if count % 2 == 1 || count < 6 {
                    return Err(parse_error("Wrong number of arguments for function POLYGON"));
                }
                args.extend(shape.arguments);
                self.dialect.polygon()
            }
            "box" => {
                if shape.arguments.len() != 4 {
                    return Err(parse_error("Wrong arguments for function BOX"));
                }
                let values = constant_args(&shape.arguments)?;
                let (ra, dec, width, height) = (values[0], values[1], values[2], values[3]);
                let half_width = width / Decimal::TWO;
                let half_height = height / Decimal::TWO;

                let bounds = [
                    ra.checked_sub(half_width),
                    dec.checked_sub(half_height),
                    ra.checked_add(half_width),
                    dec.checked_add(half_height),
                ];
                for bound in bounds {
                    let bound = bound.ok_or_else(|| parse_error("Wrong arguments for function BOX"))?;
                    args.push(numeric_expression(bound));
                }
                self.dialect.rectangle()
            }
            _ => {
                // Area specifications are evaluated before the query runs.
                if self.dialect == SpatialDialect::Qserv {
                    constant_args(&shape.arguments)?;
                }
                args.extend(shape.arguments);
                self.dialect.circle()
            }
        };

        tracing::debug!("Rewrote CONTAINS over {} to {}", shape_name, name);
        Ok(Expr::FunctionCall(FunctionCall::new(name, args)))
    }
}

fn rewrite_distance(arguments: Vec<Expr>) -> Result<Expr, AppError> {
    match arguments.len() {
        4 => Ok(Expr::FunctionCall(FunctionCall::new(ANGULAR_SEPARATION, arguments))),
        2 => {
            let mut args = Vec::with_capacity(4);
            for argument in arguments {
                match argument {
                    Expr::FunctionCall(call) if call.simple_name() == "point" => {
                        args.extend(call.arguments)
                    }
                    _ => {
                        return Err(parse_error(
                            "Wrong number of arguments to function DISTANCE (2 points expected)",
                        ))
                    }
                }
            }
            Ok(Expr::FunctionCall(FunctionCall::new(ANGULAR_SEPARATION, args)))
        }
        _ => Err(parse_error("Wrong number of arguments to function DISTANCE")),
    }
}

fn parse_error(message: &str) -> AppError {
    AppError::InvalidSql(message.to_string())
}

/// Every argument must be a numeric literal, optionally behind a unary sign.
fn constant_args(arguments: &[Expr]) -> Result<Vec<Decimal>, AppError> {
    arguments.iter().map(constant_value).collect()
}

fn constant_value(expr: &Expr) -> Result<Decimal, AppError> {
    match expr {
        Expr::Literal(literal) => literal_value(literal),
        Expr::Unary {
            op: UnaryOp::Minus,
            expr,
        } => match expr.as_ref() {
            Expr::Literal(literal) => Ok(-literal_value(literal)?),
            _ => Err(parse_error("Argument is not a numeric literal")),
        },
        Expr::Unary {
            op: UnaryOp::Plus,
            expr,
        } => match expr.as_ref() {
            Expr::Literal(literal) => literal_value(literal),
            _ => Err(parse_error("Argument is not a numeric literal")),
        },
        _ => Err(parse_error("Argument is not a numeric literal")),
    }
}

fn literal_value(literal: &Literal) -> Result<Decimal, AppError> {
    match literal {
        Literal::Long(value) => Ok(Decimal::from(*value)),
        Literal::Decimal(text) => Decimal::from_str(text)
            .or_else(|_| Decimal::from_scientific(text))
            .map_err(|_| parse_error("Argument is not a numeric literal")),
        _ => Err(parse_error("Argument is not a numeric literal")),
    }
}

/// Negative values become a unary minus over the absolute value.
fn numeric_expression(value: Decimal) -> Expr {
    let literal = Expr::Literal(Literal::Decimal(value.abs().normalize().to_string()));
    if value.is_sign_negative() && !value.is_zero() {
        Expr::Unary {
            op: UnaryOp::Minus,
            expr: Box::new(literal),
        }
    } else {
        literal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::formatter::{format_statement, FormatOptions, QuoteStyle};
    use crate::sql::parser::parse_statement;

    fn rewrite(sql: &str, dialect: SpatialDialect) -> Result<String, AppError> {
        let statement = rewrite_adql(parse_statement(sql)?, dialect)?;
        Ok(format_statement(
            &statement,
            FormatOptions {
                quote_style: QuoteStyle::Backtick,
                booleans_as_integers: false,
            },
        ))
    }

    #[test]
    fn test_dialect_detection() {
        assert_eq!(SpatialDialect::for_uri("mysql://qserv-czar:4040"), SpatialDialect::Qserv);
        assert_eq!(SpatialDialect::for_uri("mysql://lsst-db:3306/sdss"), SpatialDialect::SciSql);
    }

    #[test]
    fn test_contains_circle_scisql() {
        let sql = rewrite(
            "SELECT * FROM Object WHERE CONTAINS(POINT(ra, decl), CIRCLE(1.2, 3.2, 0.5)) = 1",
            SpatialDialect::SciSql,
        )
        .unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM Object WHERE scisql_s2PtInCircle(ra, decl, 1.2, 3.2, 0.5) = 1"
        );
    }

    #[test]
    fn test_contains_circle_qserv_omits_point() {
        let sql = rewrite(
            "SELECT * FROM Object WHERE CONTAINS(POINT(ra, decl), CIRCLE(1.2, 3.2, 0.5)) = 1",
            SpatialDialect::Qserv,
        )
        .unwrap();
        assert_eq!(sql, "SELECT * FROM Object WHERE qserv_areaspec_circle(1.2, 3.2, 0.5) = 1");
    }

    #[test]
    fn test_box_bounds_are_computed() {
        let sql = rewrite(
            "SELECT * FROM Object WHERE CONTAINS(POINT(ra, decl), BOX(9.5, -1.23, 9.6, -1.22)) = 1",
            SpatialDialect::SciSql,
        )
        .unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM Object WHERE scisql_s2PtInBox(ra, decl, 4.7, -0.62, 14.3, -1.84) = 1"
        );

        let qserv = rewrite(
            "SELECT * FROM Object WHERE CONTAINS(POINT(ra, decl), BOX(10, 20, 2, 4))",
            SpatialDialect::Qserv,
        )
        .unwrap();
        assert_eq!(qserv, "SELECT * FROM Object WHERE qserv_areaspec_box(9, 18, 11, 22)");
    }

    #[test]
    fn test_box_with_column_argument_is_rejected() {
        let err = rewrite(
            "SELECT * FROM Object WHERE CONTAINS(POINT(ra, decl), BOX(ra, 1, 2, 3)) = 1",
            SpatialDialect::SciSql,
        )
        .unwrap_err();
        match err {
            AppError::InvalidSql(msg) => assert_eq!(msg, "Argument is not a numeric literal"),
            other => panic!("unexpected {:?}", other),
        }

        let arity = rewrite(
            "SELECT * FROM Object WHERE CONTAINS(POINT(ra, decl), BOX(1, 2, 3)) = 1",
            SpatialDialect::SciSql,
        );
        assert!(matches!(arity, Err(AppError::InvalidSql(msg)) if msg == "Wrong arguments for function BOX"));
    }

    #[test]
    fn test_box_bounds_out_of_range_are_rejected() {
        for dialect in [SpatialDialect::SciSql, SpatialDialect::Qserv] {
            let result = rewrite(
                "SELECT * FROM t WHERE CONTAINS(POINT(ra, decl), \
                 BOX(79228162514264337593543950335, 0, -79228162514264337593543950335, 1)) = 1",
                dialect,
            );
            assert!(
                matches!(result, Err(AppError::InvalidSql(ref msg)) if msg == "Wrong arguments for function BOX"),
                "{:?}: {:?}",
                dialect,
                result
            );
        }

    }

    #[test]
    fn test_qserv_box_with_negative_extent() {
        let sql = rewrite(
            "SELECT * FROM Object WHERE CONTAINS(POINT(ra, decl), BOX(10, 20, -2, -4))",
            SpatialDialect::Qserv,
        )
        .unwrap();
        assert_eq!(sql, "SELECT * FROM Object WHERE qserv_areaspec_box(11, 22, 9, 18)");
    }

    #[test]
    fn test_qserv_shapes_require_literal_arguments() {
        for shape in ["BOX(ra, 1, 2, 3)", "POLYGON(0, 0, 1, decl, 1, 1)", "CIRCLE(ra, 2, 0.5)"] {
            let result = rewrite(
                &format!("SELECT * FROM Object WHERE CONTAINS(POINT(ra, decl), {}) = 1", shape),
                SpatialDialect::Qserv,
            );
            assert!(
                matches!(result, Err(AppError::InvalidSql(ref msg)) if msg == "Argument is not a numeric literal"),
                "{}: {:?}",
                shape,
                result
            );
        }

        let signed = rewrite(
            "SELECT * FROM Object WHERE CONTAINS(POINT(ra, decl), CIRCLE(-1.5, +2, 0.5)) = 1",
            SpatialDialect::Qserv,
        )
        .unwrap();
        assert_eq!(signed, "SELECT * FROM Object WHERE qserv_areaspec_circle(-1.5, +2, 0.5) = 1");

        let scisql = rewrite(
            "SELECT * FROM Object WHERE CONTAINS(POINT(ra, decl), CIRCLE(o.ra, o.decl, 0.5)) = 1",
            SpatialDialect::SciSql,
        )
        .unwrap();
        assert!(scisql.contains("scisql_s2PtInCircle(ra, decl, o.ra, o.decl, 0.5)"), "{}", scisql);
    }

    #[test]
    fn test_polygon_validation() {
        let ok = rewrite(
            "SELECT * FROM Object WHERE CONTAINS(POINT(ra, decl), POLYGON(0, 0, 1, 0, 1, 1)) = 1",
            SpatialDialect::SciSql,
        )
        .unwrap();
        assert_eq!(
            ok,
            "SELECT * FROM Object WHERE scisql_s2PtInCPoly(ra, decl, 0, 0, 1, 0, 1, 1) = 1"
        );

        for bad in ["POLYGON(0, 0, 1, 0)", "POLYGON(0, 0, 1, 0, 1, 1, 2)"] {
            let result = rewrite(
                &format!("SELECT * FROM Object WHERE CONTAINS(POINT(ra, decl), {}) = 1", bad),
                SpatialDialect::SciSql,
            );
            assert!(
                matches!(result, Err(AppError::InvalidSql(ref msg)) if msg == "Wrong number of arguments for function POLYGON"),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_contains_shape_errors() {
        let not_point = rewrite(
            "SELECT * FROM t WHERE CONTAINS(ra, CIRCLE(1, 2, 3)) = 1",
            SpatialDialect::SciSql,
        );
        assert!(matches!(not_point, Err(AppError::InvalidSql(msg)) if msg.contains("Not a POINT")));

        let not_shape = rewrite(
            "SELECT * FROM t WHERE CONTAINS(POINT(ra, decl), ELLIPSE(1, 2, 3)) = 1",
            SpatialDialect::SciSql,
        );
        assert!(matches!(not_shape, Err(AppError::InvalidSql(msg)) if msg.contains("Not a shape")));

        let arity = rewrite(
            "SELECT * FROM t WHERE CONTAINS(POINT(ra, decl)) = 1",
            SpatialDialect::SciSql,
        );
        assert!(matches!(arity, Err(AppError::InvalidSql(msg)) if msg.contains("2 arguments expected")));
    }

    #[test]
    fn test_distance_forms_are_identical() {
        let flat = rewrite(
            "SELECT DISTANCE(ra, decl, o.ra, o.decl) FROM Object o",
            SpatialDialect::SciSql,
        )
        .unwrap();
        let points = rewrite(
            "SELECT DISTANCE(POINT(ra, decl), POINT(o.ra, o.decl)) FROM Object o",
            SpatialDialect::SciSql,
        )
        .unwrap();
        assert_eq!(flat, points);
        assert_eq!(flat, "SELECT scisql_angSep(ra, decl, o.ra, o.decl) FROM Object AS o");

        let bad = rewrite("SELECT DISTANCE(ra, POINT(1, 2)) FROM t", SpatialDialect::SciSql);
        assert!(matches!(bad, Err(AppError::InvalidSql(msg)) if msg.contains("2 points expected")));
        let arity = rewrite("SELECT DISTANCE(ra, decl, 1) FROM t", SpatialDialect::SciSql);
        assert!(matches!(arity, Err(AppError::InvalidSql(_))));
    }

    #[test]
    fn test_spatial_calls_inside_case_and_subqueries_are_rewritten() {
        let sql = rewrite(
            r#"SELECT CASE WHEN CONTAINS(POINT(ra, decl), CIRCLE(1, 2, 3)) = 1 THEN "Obj" ELSE 0 END FROM t"#,
            SpatialDialect::SciSql,
        )
        .unwrap();
        assert_eq!(
            sql,
            "SELECT CASE WHEN scisql_s2PtInCircle(ra, decl, 1, 2, 3) = 1 THEN `Obj` ELSE 0 END FROM t"
        );

        let nested = rewrite(
            "SELECT * FROM t WHERE EXISTS (SELECT 1 FROM s WHERE DISTANCE(POINT(t.ra, t.decl), POINT(s.ra, s.decl)) < 0.1)",
            SpatialDialect::SciSql,
        )
        .unwrap();
        assert_eq!(
            nested,
            "SELECT * FROM t WHERE EXISTS (SELECT 1 FROM s WHERE scisql_angSep(t.ra, t.decl, s.ra, s.decl) < 0.1)"
        );
    }

    #[test]
    fn test_other_functions_untouched() {
        let sql = rewrite("SELECT count(*), max(ra) FROM Object", SpatialDialect::SciSql).unwrap();
        assert_eq!(sql, "SELECT count(*), max(ra) FROM Object");
    }
}
