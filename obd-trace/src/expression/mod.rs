//! Channel expression language
//!
//! Expressions combine up to five aligned inputs (`A`..`E`) with arithmetic,
//! comparisons, boolean logic and a fixed vocabulary of functions. They are
//! compiled once and evaluated many times:
//!
//! 1. **Parse** the source into a typed AST (syntax errors carry a position)
//! 2. **Bind** every identifier against the caller's input labels
//! 3. **Infer** the result kind and reject numeric/boolean mixing
//! 4. **Trial-run** on a short synthetic series to catch shape problems
//!
//! Only the fixed vocabulary is callable. There is no host-language escape
//! hatch, so an expression can never reach anything but its inputs.
//!
//! # Example
//!
//! ```
//! use obd_trace::expression::Expression;
//! use obd_trace::{AlignedInputs, InputLabel};
//!
//! let expr = Expression::compile_numeric("A * 3.6", &[InputLabel::A]).unwrap();
//! let inputs = AlignedInputs::from_columns(vec![0.0, 1.0], vec![(InputLabel::A, vec![10.0, 20.0])]);
//! assert_eq!(expr.evaluate(&inputs).into_numeric(), vec![36.0, 72.0]);
//! ```

mod check;
mod eval;
mod kernels;
mod lexer;
mod parser;

use crate::align::AlignedInputs;
use crate::types::{ExpressionError, InputLabel, ResultKind};
use eval::EvalContext;
use parser::Expr;
use std::collections::BTreeSet;
use std::fmt;

/// Function names available to expressions, for editor help
pub const FUNCTIONS: &[&str] = &[
    "abs",
    "min",
    "max",
    "sqrt",
    "log",
    "log10",
    "exp",
    "sin",
    "cos",
    "tan",
    "floor",
    "ceil",
    "round",
    "pow",
    "if_else",
    "rolling_avg",
    "rolling_min",
    "rolling_max",
    "delta",
    "cumsum",
    "clip",
    "np_min",
    "np_max",
    "np_mean",
    "np_std",
];

/// Length of the synthetic series used for the compile-time trial run
const TRIAL_LEN: usize = 5;

/// A compiled, validated expression
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: Expr,
    inputs: BTreeSet<InputLabel>,
    kind: ResultKind,
}

/// Output of one evaluation, one element per reference timestamp
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluated {
    Numeric(Vec<f64>),
    Boolean(Vec<bool>),
}

impl Evaluated {
    pub fn len(&self) -> usize {
        match self {
            Evaluated::Numeric(v) => v.len(),
            Evaluated::Boolean(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Numeric values; booleans become 1.0 / 0.0
    pub fn into_numeric(self) -> Vec<f64> {
        match self {
            Evaluated::Numeric(v) => v,
            Evaluated::Boolean(v) => v.into_iter().map(|b| if b { 1.0 } else { 0.0 }).collect(),
        }
    }

    /// Hit mask; a numeric value counts as a hit when finite and non-zero
    pub fn into_mask(self) -> Vec<bool> {
        match self {
            Evaluated::Boolean(v) => v,
            Evaluated::Numeric(v) => v.into_iter().map(|x| x.is_finite() && x != 0.0).collect(),
        }
    }
}

impl Expression {
    /// Compile `source`, allowing only the `bound` input labels and
    /// requiring the given result kind
    pub fn compile(source: &str, bound: &[InputLabel], expected: ResultKind) -> Result<Self, ExpressionError> {
        let expr = Self::analyze(source, bound)?;
        if expr.kind != expected {
            return Err(ExpressionError::WrongResultKind {
                expected,
                found: expr.kind,
            });
        }
        expr.trial_run()?;
        log::debug!("Compiled {} expression '{}'", expr.kind, expr.source);
        Ok(expr)
    }

    pub fn compile_numeric(source: &str, bound: &[InputLabel]) -> Result<Self, ExpressionError> {
        Self::compile(source, bound, ResultKind::Numeric)
    }

    pub fn compile_boolean(source: &str, bound: &[InputLabel]) -> Result<Self, ExpressionError> {
        Self::compile(source, bound, ResultKind::Boolean)
    }

    /// Validate without committing to a result kind; returns the kind the
    /// expression would produce
    pub fn check(source: &str, bound: &[InputLabel]) -> Result<ResultKind, ExpressionError> {
        let expr = Self::analyze(source, bound)?;
        expr.trial_run()?;
        Ok(expr.kind)
    }

    fn analyze(source: &str, bound: &[InputLabel]) -> Result<Self, ExpressionError> {
        let source = source.trim();
        let root = parser::parse(source)?;

        let mut used = Vec::new();
        root.collect_inputs(&mut used);
        if let Some(unbound) = used.iter().find(|label| !bound.contains(*label)) {
            return Err(ExpressionError::UnboundIdentifier(unbound.to_string()));
        }

        let kind = check::infer(&root)?.kind;
        Ok(Self {
            source: source.to_string(),
            root,
            inputs: used.into_iter().collect(),
            kind,
        })
    }

    /// Evaluate over a short increasing series and confirm the output shape
    fn trial_run(&self) -> Result<(), ExpressionError> {
        let times: Vec<f64> = (0..TRIAL_LEN).map(|i| i as f64).collect();
        let sample: Vec<f64> = (1..=TRIAL_LEN).map(|i| i as f64).collect();
        let trial = AlignedInputs::from_columns(times, self.inputs.iter().map(|label| (*label, sample.clone())));

        let ctx = EvalContext { inputs: &trial };
        let len = match eval::evaluate(&self.root, &ctx) {
            eval::Value::Series(v) => v.len(),
            eval::Value::Flags(v) => v.len(),
            eval::Value::Scalar(_) | eval::Value::Flag(_) => TRIAL_LEN,
        };
        if len != TRIAL_LEN {
            return Err(ExpressionError::syntax(
                0,
                format!("expression produced {} values for {} samples", len, TRIAL_LEN),
            ));
        }
        Ok(())
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn kind(&self) -> ResultKind {
        self.kind
    }

    /// Input labels the expression actually references
    pub fn inputs(&self) -> impl Iterator<Item = InputLabel> + '_ {
        self.inputs.iter().copied()
    }

    /// Evaluate over aligned inputs; scalar results are broadcast to the
    /// length of the reference axis
    pub fn evaluate(&self, inputs: &AlignedInputs) -> Evaluated {
        let ctx = EvalContext { inputs };
        let value = eval::evaluate(&self.root, &ctx);
        match self.kind {
            ResultKind::Numeric => Evaluated::Numeric(value.into_series(inputs.len())),
            ResultKind::Boolean => Evaluated::Boolean(value.into_flags(inputs.len())),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
