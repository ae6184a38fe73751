//! Vectorized evaluation visitor
//!
//! Each AST node maps to one whole-array operation. Scalars stay scalar until
//! they meet a series, then broadcast. Numeric faults (x/0, log(-1), ...)
//! produce IEEE NaN/Inf and simply flow through.

use super::kernels;
use super::parser::{BinaryOp, Expr, Function, UnaryOp};
use crate::align::AlignedInputs;

/// Intermediate value during evaluation
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Value {
    Scalar(f64),
    Series(Vec<f64>),
    Flag(bool),
    Flags(Vec<bool>),
}

impl Value {
    /// Numeric view; booleans only reach here through an unchecked tree
    fn into_numeric(self) -> Value {
        match self {
            Value::Flag(b) => Value::Scalar(if b { 1.0 } else { 0.0 }),
            Value::Flags(bs) => Value::Series(bs.into_iter().map(|b| if b { 1.0 } else { 0.0 }).collect()),
            numeric => numeric,
        }
    }

    /// Boolean view; non-zero finite numbers are true
    fn into_boolean(self) -> Value {
        match self {
            Value::Scalar(v) => Value::Flag(truthy(v)),
            Value::Series(vs) => Value::Flags(vs.into_iter().map(truthy).collect()),
            boolean => boolean,
        }
    }

    pub(crate) fn into_series(self, len: usize) -> Vec<f64> {
        match self.into_numeric() {
            Value::Scalar(v) => vec![v; len],
            Value::Series(vs) => vs,
            _ => vec![f64::NAN; len],
        }
    }

    pub(crate) fn into_flags(self, len: usize) -> Vec<bool> {
        match self.into_boolean() {
            Value::Flag(b) => vec![b; len],
            Value::Flags(bs) => bs,
            _ => vec![false; len],
        }
    }
}

fn truthy(v: f64) -> bool {
    v != 0.0 && !v.is_nan()
}

pub(crate) struct EvalContext<'a> {
    pub inputs: &'a AlignedInputs,
}

impl EvalContext<'_> {
    fn len(&self) -> usize {
        self.inputs.len()
    }

    fn times(&self) -> &[f64] {
        self.inputs.times()
    }
}

pub(crate) fn evaluate(expr: &Expr, ctx: &EvalContext<'_>) -> Value {
    match expr {
        Expr::Number(v) => Value::Scalar(*v),
        Expr::Input(label) => match ctx.inputs.column(*label) {
            Some(column) => Value::Series(column.to_vec()),
            None => Value::Series(vec![f64::NAN; ctx.len()]),
        },
        Expr::Unary { op, operand } => {
            let value = evaluate(operand, ctx);
            match op {
                UnaryOp::Neg => map_numeric(value, |v| -v),
                UnaryOp::Not => map_flags(value, |b| !b),
            }
        }
        Expr::Binary { op, lhs, rhs } => {
            let (l, r) = (evaluate(lhs, ctx), evaluate(rhs, ctx));
            evaluate_binary(*op, l, r)
        }
        Expr::Call { func, args, .. } => {
            let values: Vec<Value> = args.iter().map(|arg| evaluate(arg, ctx)).collect();
            evaluate_call(*func, values, ctx)
        }
    }
}

fn evaluate_binary(op: BinaryOp, l: Value, r: Value) -> Value {
    match op {
        BinaryOp::Add => zip_numeric(l, r, |a, b| a + b),
        BinaryOp::Sub => zip_numeric(l, r, |a, b| a - b),
        BinaryOp::Mul => zip_numeric(l, r, |a, b| a * b),
        BinaryOp::Div => zip_numeric(l, r, |a, b| a / b),
        BinaryOp::Rem => zip_numeric(l, r, python_rem),
        BinaryOp::Pow => zip_numeric(l, r, f64::powf),
        BinaryOp::Lt => compare(l, r, |a, b| a < b),
        BinaryOp::Le => compare(l, r, |a, b| a <= b),
        BinaryOp::Gt => compare(l, r, |a, b| a > b),
        BinaryOp::Ge => compare(l, r, |a, b| a >= b),
        BinaryOp::Eq => compare(l, r, |a, b| a == b),
        BinaryOp::Ne => compare(l, r, |a, b| a != b),
        BinaryOp::And => zip_flags(l, r, |a, b| a && b),
        BinaryOp::Or => zip_flags(l, r, |a, b| a || b),
    }
}

fn evaluate_call(func: Function, args: Vec<Value>, ctx: &EvalContext<'_>) -> Value {
    let mut args = args.into_iter();
    let mut next = || args.next().unwrap_or(Value::Scalar(f64::NAN));

    match func {
        Function::Abs => map_numeric(next(), f64::abs),
        Function::Sqrt => map_numeric(next(), f64::sqrt),
        Function::Log => map_numeric(next(), f64::ln),
        Function::Log10 => map_numeric(next(), f64::log10),
        Function::Exp => map_numeric(next(), f64::exp),
        Function::Sin => map_numeric(next(), f64::sin),
        Function::Cos => map_numeric(next(), f64::cos),
        Function::Tan => map_numeric(next(), f64::tan),
        Function::Floor => map_numeric(next(), f64::floor),
        Function::Ceil => map_numeric(next(), f64::ceil),
        Function::Round => {
            let value = next();
            let digits = match next() {
                Value::Scalar(d) if d.is_finite() => d.trunc() as i32,
                _ => 0,
            };
            map_numeric(value, |v| round_to(v, digits))
        }
        Function::Pow => {
            let base = next();
            zip_numeric(base, next(), f64::powf)
        }
        Function::Min | Function::Max => {
            let pick: fn(f64, f64) -> f64 = if func == Function::Min { nan_min2 } else { nan_max2 };
            let first = next();
            args.fold(first, |acc, v| zip_numeric(acc, v, pick))
        }
        Function::IfElse => {
            let cond = next();
            let then_v = next();
            let else_v = next();
            select(cond, then_v, else_v, ctx.len())
        }
        Function::Clip => {
            let value = next();
            let lo = next();
            let hi = next();
            let raised = zip_numeric(value, lo, |v, lo| if v.is_nan() { v } else { v.max(lo) });
            zip_numeric(raised, hi, |v, hi| if v.is_nan() { v } else { v.min(hi) })
        }
        Function::RollingAvg | Function::RollingMin | Function::RollingMax => {
            let series = next().into_series(ctx.len());
            let window = match next() {
                Value::Scalar(w) => w,
                _ => f64::NAN,
            };
            let kernel = match func {
                Function::RollingAvg => kernels::rolling_mean,
                Function::RollingMin => kernels::rolling_min,
                _ => kernels::rolling_max,
            };
            Value::Series(kernel(ctx.times(), &series, window))
        }
        Function::Delta => Value::Series(kernels::delta(&next().into_series(ctx.len()))),
        Function::Cumsum => Value::Series(kernels::cumsum(&next().into_series(ctx.len()))),
        Function::NpMin => reduce(next(), kernels::nan_min),
        Function::NpMax => reduce(next(), kernels::nan_max),
        Function::NpMean => reduce(next(), kernels::nan_mean),
        Function::NpStd => reduce(next(), kernels::nan_std),
    }
}

fn reduce(value: Value, f: fn(&[f64]) -> f64) -> Value {
    match value.into_numeric() {
        Value::Scalar(v) => Value::Scalar(f(&[v])),
        Value::Series(vs) => Value::Scalar(f(&vs)),
        _ => Value::Scalar(f64::NAN),
    }
}

fn map_numeric(value: Value, f: impl Fn(f64) -> f64) -> Value {
    match value.into_numeric() {
        Value::Scalar(v) => Value::Scalar(f(v)),
        Value::Series(vs) => Value::Series(vs.into_iter().map(f).collect()),
        other => other,
    }
}

fn map_flags(value: Value, f: impl Fn(bool) -> bool) -> Value {
    match value.into_boolean() {
        Value::Flag(b) => Value::Flag(f(b)),
        Value::Flags(bs) => Value::Flags(bs.into_iter().map(f).collect()),
        other => other,
    }
}

fn zip_numeric(l: Value, r: Value, f: impl Fn(f64, f64) -> f64) -> Value {
    match (l.into_numeric(), r.into_numeric()) {
        (Value::Scalar(a), Value::Scalar(b)) => Value::Scalar(f(a, b)),
        (Value::Scalar(a), Value::Series(bs)) => Value::Series(bs.into_iter().map(|b| f(a, b)).collect()),
        (Value::Series(as_), Value::Scalar(b)) => Value::Series(as_.into_iter().map(|a| f(a, b)).collect()),
        (Value::Series(as_), Value::Series(bs)) => {
            Value::Series(as_.into_iter().zip(bs).map(|(a, b)| f(a, b)).collect())
        }
        _ => Value::Scalar(f64::NAN),
    }
}

/// Elementwise comparison; any comparison against NaN is false
fn compare(l: Value, r: Value, f: impl Fn(f64, f64) -> bool) -> Value {
    match (l.into_numeric(), r.into_numeric()) {
        (Value::Scalar(a), Value::Scalar(b)) => Value::Flag(f(a, b)),
        (Value::Scalar(a), Value::Series(bs)) => Value::Flags(bs.into_iter().map(|b| f(a, b)).collect()),
        (Value::Series(as_), Value::Scalar(b)) => Value::Flags(as_.into_iter().map(|a| f(a, b)).collect()),
        (Value::Series(as_), Value::Series(bs)) => {
            Value::Flags(as_.into_iter().zip(bs).map(|(a, b)| f(a, b)).collect())
        }
        _ => Value::Flag(false),
    }
}

fn zip_flags(l: Value, r: Value, f: impl Fn(bool, bool) -> bool) -> Value {
    match (l.into_boolean(), r.into_boolean()) {
        (Value::Flag(a), Value::Flag(b)) => Value::Flag(f(a, b)),
        (Value::Flag(a), Value::Flags(bs)) => Value::Flags(bs.into_iter().map(|b| f(a, b)).collect()),
        (Value::Flags(as_), Value::Flag(b)) => Value::Flags(as_.into_iter().map(|a| f(a, b)).collect()),
        (Value::Flags(as_), Value::Flags(bs)) => {
            Value::Flags(as_.into_iter().zip(bs).map(|(a, b)| f(a, b)).collect())
        }
        _ => Value::Flag(false),
    }
}

/// Elementwise `cond ? then : else`, keeping the branch kind
fn select(cond: Value, then_v: Value, else_v: Value, len: usize) -> Value {
    let boolean = matches!(then_v, Value::Flag(_) | Value::Flags(_));
    let all_scalar = [&cond, &then_v, &else_v]
        .iter()
        .all(|v| matches!(v, Value::Scalar(_) | Value::Flag(_)));

    if all_scalar {
        let pick = matches!(cond.into_boolean(), Value::Flag(true));
        return if pick { then_v } else { else_v };
    }

    let cond = cond.into_flags(len);
    if boolean {
        let (t, e) = (then_v.into_flags(len), else_v.into_flags(len));
        Value::Flags(cond.iter().zip(t.iter().zip(&e)).map(|(c, (t, e))| if *c { *t } else { *e }).collect())
    } else {
        let (t, e) = (then_v.into_series(len), else_v.into_series(len));
        Value::Series(cond.iter().zip(t.iter().zip(&e)).map(|(c, (t, e))| if *c { *t } else { *e }).collect())
    }
}

/// Remainder with the sign of the divisor, as `%` behaves in most data tools
fn python_rem(a: f64, b: f64) -> f64 {
    let r = a % b;
    if r != 0.0 && (r < 0.0) != (b < 0.0) {
        r + b
    } else {
        r
    }
}

fn nan_min2(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.min(b)
    }
}

fn nan_max2(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.max(b)
    }
}

/// Round half to even at `digits` decimal places
fn round_to(v: f64, digits: i32) -> f64 {
    if digits == 0 || !v.is_finite() {
        return v.round_ties_even();
    }
    let scale = 10f64.powi(digits);
    let scaled = v * scale;
    if !scale.is_finite() || !scaled.is_finite() {
        // Finer than f64 can represent at this magnitude
        return v;
    }
    if scale == 0.0 {
        return 0.0f64.copysign(v);
    }
    scaled.round_ties_even() / scale
}

#[cfg(test)]
mod tests {
    use super::super::parser::parse;
    use super::*;
    use crate::types::InputLabel;

    fn inputs() -> AlignedInputs {
        AlignedInputs::from_columns(
            vec![0.0, 1.0, 2.0, 3.0],
            vec![
                (InputLabel::A, vec![1.0, 2.0, 3.0, 4.0]),
                (InputLabel::B, vec![0.0, 2.0, f64::NAN, -1.0]),
            ],
        )
    }

    fn eval(source: &str) -> Value {
        let aligned = inputs();
        evaluate(&parse(source).unwrap(), &EvalContext { inputs: &aligned })
    }

    #[test]
    fn test_arithmetic_broadcasts() {
        assert_eq!(eval("A * 2 + 1"), Value::Series(vec![3.0, 5.0, 7.0, 9.0]));
        assert_eq!(eval("2 ** 3"), Value::Scalar(8.0));
        assert_eq!(eval("-7 % 3"), Value::Scalar(2.0));
    }

    #[test]
    fn test_numeric_faults_propagate() {
        let Value::Series(out) = eval("A / B") else {
            panic!("expected series");
        };
        assert!(out[0].is_infinite());
        assert_eq!(out[1], 1.0);
        assert!(out[2].is_nan());
        assert_eq!(out[3], -4.0);

        let Value::Series(out) = eval("log(B)") else {
            panic!("expected series");
        };
        assert_eq!(out[0], f64::NEG_INFINITY);
        assert!(out[3].is_nan());
    }

    #[test]
    fn test_comparisons_and_logic() {
        assert_eq!(eval("A > 2"), Value::Flags(vec![false, false, true, true]));
        // NaN never matches
        assert_eq!(eval("B >= 0 | B < 0"), Value::Flags(vec![true, true, false, true]));
        assert_eq!(eval("!(A == 2) & B != 0"), Value::Flags(vec![false, false, true, true]));
    }

    #[test]
    fn test_if_else_and_clip() {
        assert_eq!(eval("if_else(A > 2, A, 0)"), Value::Series(vec![0.0, 0.0, 3.0, 4.0]));
        assert_eq!(eval("if_else(1 > 2, 5, 6)"), Value::Scalar(6.0));
        let Value::Series(out) = eval("clip(B, -0.5, 1)") else {
            panic!("expected series");
        };
        assert_eq!(out[0], 0.0);
        assert_eq!(out[1], 1.0);
        assert!(out[2].is_nan());
        assert_eq!(out[3], -0.5);
    }

    #[test]
    fn test_functions() {
        assert_eq!(eval("max(A, 2.5, 2)"), Value::Series(vec![2.5, 2.5, 3.0, 4.0]));
        assert_eq!(eval("round(2.5)"), Value::Scalar(2.0));
        assert_eq!(eval("round(1.25, 1)"), Value::Scalar(1.2));
        assert_eq!(eval("round(1.5, 400)"), Value::Scalar(1.5));
        assert_eq!(eval("np_max(A) - np_min(A)"), Value::Scalar(3.0));
        assert_eq!(eval("A - np_mean(A)"), Value::Series(vec![-1.5, -0.5, 0.5, 1.5]));
        assert_eq!(eval("cumsum(A)"), Value::Series(vec![1.0, 3.0, 6.0, 10.0]));
        assert_eq!(eval("rolling_avg(A, 1)"), Value::Series(vec![1.0, 1.5, 2.5, 3.5]));
        assert_eq!(eval("delta(5)"), Value::Series(vec![0.0; 4]));
    }

    #[test]
    fn test_missing_input_is_nan() {
        let Value::Series(out) = eval("C + 1") else {
            panic!("expected series");
        };
        assert_eq!(out.len(), 4);
        assert!(out.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_round_extreme_digits() {
        assert_eq!(round_to(1.5, 400), 1.5);
        assert_eq!(round_to(1e300, 20), 1e300);
        assert_eq!(round_to(123.0, -400), 0.0);
        assert_eq!(round_to(1250.0, -2), 1200.0);
        assert!(round_to(f64::NAN, 3).is_nan());
    }
}
