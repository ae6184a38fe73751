//! Static result-kind inference over the AST
//!
//! Every node is either numeric or boolean, and either a scalar or a series.
//! Mixing kinds (arithmetic on a comparison, `&` on numbers, ...) is rejected
//! here so that evaluation never has to guess.

use super::parser::{BinaryOp, Expr, Function, UnaryOp};
use crate::types::{ExpressionError, ResultKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Shape {
    Scalar,
    Series,
}

impl Shape {
    fn join(self, other: Shape) -> Shape {
        if self == Shape::Series || other == Shape::Series {
            Shape::Series
        } else {
            Shape::Scalar
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Type {
    pub kind: ResultKind,
    pub shape: Shape,
}

impl Type {
    fn numeric(shape: Shape) -> Self {
        Self {
            kind: ResultKind::Numeric,
            shape,
        }
    }

    fn boolean(shape: Shape) -> Self {
        Self {
            kind: ResultKind::Boolean,
            shape,
        }
    }
}

pub(crate) fn infer(expr: &Expr) -> Result<Type, ExpressionError> {
    match expr {
        Expr::Number(_) => Ok(Type::numeric(Shape::Scalar)),
        Expr::Input(_) => Ok(Type::numeric(Shape::Series)),
        Expr::Unary { op, operand } => {
            let inner = infer(operand)?;
            match op {
                UnaryOp::Neg => require(inner, ResultKind::Numeric),
                UnaryOp::Not => require(inner, ResultKind::Boolean),
            }
        }
        Expr::Binary { op, lhs, rhs } => {
            let (l, r) = (infer(lhs)?, infer(rhs)?);
            let shape = l.shape.join(r.shape);
            if op.is_arithmetic() {
                require(l, ResultKind::Numeric)?;
                require(r, ResultKind::Numeric)?;
                Ok(Type::numeric(shape))
            } else if op.is_comparison() {
                require(l, ResultKind::Numeric)?;
                require(r, ResultKind::Numeric)?;
                Ok(Type::boolean(shape))
            } else {
                debug_assert!(matches!(op, BinaryOp::And | BinaryOp::Or));
                require(l, ResultKind::Boolean)?;
                require(r, ResultKind::Boolean)?;
                Ok(Type::boolean(shape))
            }
        }
        Expr::Call { func, args, pos } => infer_call(*func, args, *pos),
    }
}

fn infer_call(func: Function, args: &[Expr], pos: usize) -> Result<Type, ExpressionError> {
    let types = args.iter().map(infer).collect::<Result<Vec<Type>, _>>()?;
    let joined = types.iter().fold(Shape::Scalar, |acc, t| acc.join(t.shape));

    match func {
        Function::IfElse => {
            require(types[0], ResultKind::Boolean)?;
            let (then_t, else_t) = (types[1], types[2]);
            if then_t.kind != else_t.kind {
                return Err(ExpressionError::WrongResultKind {
                    expected: then_t.kind,
                    found: else_t.kind,
                });
            }
            Ok(Type {
                kind: then_t.kind,
                shape: joined,
            })
        }
        Function::RollingAvg | Function::RollingMin | Function::RollingMax => {
            require(types[0], ResultKind::Numeric)?;
            require(types[1], ResultKind::Numeric)?;
            if types[1].shape != Shape::Scalar {
                return Err(ExpressionError::syntax(
                    pos,
                    format!("{}() window must be a constant number of seconds", func.name()),
                ));
            }
            Ok(Type::numeric(Shape::Series))
        }
        Function::Round => {
            require(types[0], ResultKind::Numeric)?;
            if let Some(digits) = types.get(1) {
                require(*digits, ResultKind::Numeric)?;
                if digits.shape != Shape::Scalar {
                    return Err(ExpressionError::syntax(pos, "round() digits must be a constant"));
                }
            }
            Ok(Type::numeric(types[0].shape))
        }
        Function::Delta | Function::Cumsum => {
            require(types[0], ResultKind::Numeric)?;
            Ok(Type::numeric(Shape::Series))
        }
        Function::NpMin | Function::NpMax | Function::NpMean | Function::NpStd => {
            require(types[0], ResultKind::Numeric)?;
            Ok(Type::numeric(Shape::Scalar))
        }
        _ => {
            for t in &types {
                require(*t, ResultKind::Numeric)?;
            }
            Ok(Type::numeric(joined))
        }
    }
}

fn require(t: Type, expected: ResultKind) -> Result<Type, ExpressionError> {
    if t.kind == expected {
        Ok(t)
    } else {
        Err(ExpressionError::WrongResultKind {
            expected,
            found: t.kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::parser::parse;
    use super::*;

    fn type_of(source: &str) -> Result<Type, ExpressionError> {
        infer(&parse(source).unwrap())
    }

    #[test]
    fn test_kinds() {
        assert_eq!(type_of("A * 2").unwrap(), Type::numeric(Shape::Series));
        assert_eq!(type_of("pi / 2").unwrap(), Type::numeric(Shape::Scalar));
        assert_eq!(type_of("A > 2 & !(B == 1)").unwrap(), Type::boolean(Shape::Series));
        assert_eq!(type_of("np_mean(A)").unwrap(), Type::numeric(Shape::Scalar));
        assert_eq!(type_of("A - np_mean(A)").unwrap(), Type::numeric(Shape::Series));
        assert_eq!(type_of("if_else(A > 1, A, 0)").unwrap(), Type::numeric(Shape::Series));
        assert_eq!(type_of("if_else(A > 1, B > 2, A < 0)").unwrap(), Type::boolean(Shape::Series));
    }

    #[test]
    fn test_kind_mismatches() {
        let wrong = |expected, found| -> Result<Type, ExpressionError> {
            Err(ExpressionError::WrongResultKind { expected, found })
        };
        assert_eq!(type_of("(A > 1) + 1"), wrong(ResultKind::Numeric, ResultKind::Boolean));
        assert_eq!(type_of("A & B"), wrong(ResultKind::Boolean, ResultKind::Numeric));
        assert_eq!(type_of("!A"), wrong(ResultKind::Boolean, ResultKind::Numeric));
        assert_eq!(type_of("if_else(A, 1, 2)"), wrong(ResultKind::Boolean, ResultKind::Numeric));
        assert_eq!(type_of("if_else(A > 1, 1, A > 2)"), wrong(ResultKind::Numeric, ResultKind::Boolean));
        assert_eq!(type_of("1 < 2 < 3"), wrong(ResultKind::Numeric, ResultKind::Boolean));
    }

    #[test]
    fn test_window_must_be_scalar() {
        assert!(type_of("rolling_avg(A, 2 * 5)").is_ok());
        assert!(matches!(type_of("rolling_max(A, B)"), Err(ExpressionError::Syntax { .. })));
        assert!(matches!(type_of("round(A, B)"), Err(ExpressionError::Syntax { .. })));
    }
}
