//! Typed expression AST and recursive-descent parser
//!
//! Precedence, lowest first:
//! `|`, `&`, comparisons, `+ -`, `* / %`, unary `- ! ~`, `**`, calls and atoms.
//! `**` is right-associative and binds tighter than unary minus (`-2**2 == -4`).

use super::lexer::{tokenize, Spanned, Token};
use crate::types::{ExpressionError, InputLabel};
use std::f64::consts::{E, PI};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinaryOp {
    pub(crate) fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem | BinaryOp::Pow
        )
    }

    pub(crate) fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Eq | BinaryOp::Ne
        )
    }
}

/// Every callable in the expression vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Function {
    Abs,
    Min,
    Max,
    Sqrt,
    Log,
    Log10,
    Exp,
    Sin,
    Cos,
    Tan,
    Floor,
    Ceil,
    Round,
    Pow,
    IfElse,
    RollingAvg,
    RollingMin,
    RollingMax,
    Delta,
    Cumsum,
    Clip,
    NpMin,
    NpMax,
    NpMean,
    NpStd,
}

impl Function {
    pub(crate) fn from_name(name: &str) -> Option<Self> {
        let func = match name {
            "abs" => Function::Abs,
            "min" => Function::Min,
            "max" => Function::Max,
            "sqrt" => Function::Sqrt,
            "log" => Function::Log,
            "log10" => Function::Log10,
            "exp" => Function::Exp,
            "sin" => Function::Sin,
            "cos" => Function::Cos,
            "tan" => Function::Tan,
            "floor" => Function::Floor,
            "ceil" => Function::Ceil,
            "round" => Function::Round,
            "pow" => Function::Pow,
            "if_else" => Function::IfElse,
            "rolling_avg" => Function::RollingAvg,
            "rolling_min" => Function::RollingMin,
            "rolling_max" => Function::RollingMax,
            "delta" => Function::Delta,
            "cumsum" => Function::Cumsum,
            "clip" => Function::Clip,
            "np_min" => Function::NpMin,
            "np_max" => Function::NpMax,
            "np_mean" => Function::NpMean,
            "np_std" => Function::NpStd,
            _ => return None,
        };
        Some(func)
    }

    pub(crate) fn name(self) -> &'static str {
        match self {
            Function::Abs => "abs",
            Function::Min => "min",
            Function::Max => "max",
            Function::Sqrt => "sqrt",
            Function::Log => "log",
            Function::Log10 => "log10",
            Function::Exp => "exp",
            Function::Sin => "sin",
            Function::Cos => "cos",
            Function::Tan => "tan",
            Function::Floor => "floor",
            Function::Ceil => "ceil",
            Function::Round => "round",
            Function::Pow => "pow",
            Function::IfElse => "if_else",
            Function::RollingAvg => "rolling_avg",
            Function::RollingMin => "rolling_min",
            Function::RollingMax => "rolling_max",
            Function::Delta => "delta",
            Function::Cumsum => "cumsum",
            Function::Clip => "clip",
            Function::NpMin => "np_min",
            Function::NpMax => "np_max",
            Function::NpMean => "np_mean",
            Function::NpStd => "np_std",
        }
    }

    /// Accepted argument count as (min, max)
    pub(crate) fn arity(self) -> (usize, usize) {
        match self {
            Function::Min | Function::Max => (2, usize::MAX),
            Function::Round => (1, 2),
            Function::Pow | Function::RollingAvg | Function::RollingMin | Function::RollingMax => (2, 2),
            Function::IfElse | Function::Clip => (3, 3),
            _ => (1, 1),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Number(f64),
    Input(InputLabel),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        func: Function,
        args: Vec<Expr>,
        pos: usize,
    },
}

impl Expr {
    /// Visit every input identifier in the tree
    pub(crate) fn collect_inputs(&self, out: &mut Vec<InputLabel>) {
        match self {
            Expr::Number(_) => {}
            Expr::Input(label) => out.push(*label),
            Expr::Unary { operand, .. } => operand.collect_inputs(out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_inputs(out);
                rhs.collect_inputs(out);
            }
            Expr::Call { args, .. } => args.iter().for_each(|arg| arg.collect_inputs(out)),
        }
    }
}

/// Deepest syntax tree the parser builds; keeps recursion within the stack
const MAX_DEPTH: usize = 256;

pub(crate) fn parse(source: &str) -> Result<Expr, ExpressionError> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(ExpressionError::syntax(0, "expression is empty"));
    }
    let mut parser = Parser {
        tokens,
        index: 0,
        end: source.len(),
        depth: 0,
    };
    let expr = parser.parse_or()?;
    if let Some(extra) = parser.peek_spanned() {
        return Err(ExpressionError::syntax(
            extra.pos,
            format!("unexpected {}", extra.token.describe()),
        ));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Spanned>,
    index: usize,
    end: usize,
    depth: usize,
}

impl Parser {
    fn peek_spanned(&self) -> Option<&Spanned> {
        self.tokens.get(self.index)
    }

    fn peek(&self) -> Option<&Token> {
        self.peek_spanned().map(|s| &s.token)
    }

    fn position(&self) -> usize {
        self.peek_spanned().map_or(self.end, |s| s.pos)
    }

    fn advance(&mut self) -> Option<Spanned> {
        let spanned = self.tokens.get(self.index).cloned();
        if spanned.is_some() {
            self.index += 1;
        }
        spanned
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.index += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> Result<(), ExpressionError> {
        if self.eat(&token) {
            return Ok(());
        }
        let found = match self.peek() {
            Some(t) => t.describe(),
            None => "end of expression".to_string(),
        };
        Err(ExpressionError::syntax(
            self.position(),
            format!("expected {} but found {}", token.describe(), found),
        ))
    }

    /// Count one level of tree depth, failing past `MAX_DEPTH`
    fn descend(&mut self) -> Result<(), ExpressionError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExpressionError::syntax(
                self.position(),
                format!("expression nests deeper than {} levels", MAX_DEPTH),
            ));
        }
        Ok(())
    }

    /// Left-associative chain of `next` operands joined by operators from `op_of`
    fn parse_chain(
        &mut self,
        next: fn(&mut Self) -> Result<Expr, ExpressionError>,
        op_of: fn(&Token) -> Option<BinaryOp>,
    ) -> Result<Expr, ExpressionError> {
        let mut lhs = next(self)?;
        let mut chained = 0;
        while let Some(op) = self.peek().and_then(op_of) {
            self.index += 1;
            // Each operator adds a level above everything parsed so far
            self.descend()?;
            chained += 1;
            let rhs = next(self)?;
            lhs = binary(op, lhs, rhs);
        }
        self.depth -= chained;
        Ok(lhs)
    }

    fn parse_or(&mut self) -> Result<Expr, ExpressionError> {
        self.parse_chain(Self::parse_and, |token| match token {
            Token::Or => Some(BinaryOp::Or),
            _ => None,
        })
    }

    fn parse_and(&mut self) -> Result<Expr, ExpressionError> {
        self.parse_chain(Self::parse_comparison, |token| match token {
            Token::And => Some(BinaryOp::And),
            _ => None,
        })
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExpressionError> {
        self.parse_chain(Self::parse_additive, |token| match token {
            Token::Lt => Some(BinaryOp::Lt),
            Token::Le => Some(BinaryOp::Le),
            Token::Gt => Some(BinaryOp::Gt),
            Token::Ge => Some(BinaryOp::Ge),
            Token::EqEq => Some(BinaryOp::Eq),
            Token::NotEq => Some(BinaryOp::Ne),
            _ => None,
        })
    }

    fn parse_additive(&mut self) -> Result<Expr, ExpressionError> {
        self.parse_chain(Self::parse_multiplicative, |token| match token {
            Token::Plus => Some(BinaryOp::Add),
            Token::Minus => Some(BinaryOp::Sub),
            _ => None,
        })
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ExpressionError> {
        self.parse_chain(Self::parse_unary, |token| match token {
            Token::Star => Some(BinaryOp::Mul),
            Token::Slash => Some(BinaryOp::Div),
            Token::Percent => Some(BinaryOp::Rem),
            _ => None,
        })
    }

    /// Every nested construct (parentheses, call arguments, prefix operators,
    /// exponents) recurses through here
    fn parse_unary(&mut self) -> Result<Expr, ExpressionError> {
        self.descend()?;
        let expr = self.parse_prefixed();
        self.depth -= 1;
        expr
    }

    fn parse_prefixed(&mut self) -> Result<Expr, ExpressionError> {
        let op = match self.peek() {
            Some(Token::Minus) => Some(UnaryOp::Neg),
            Some(Token::Not) => Some(UnaryOp::Not),
            Some(Token::Plus) => None,
            _ => return self.parse_power(),
        };
        self.index += 1;
        let operand = self.parse_unary()?;
        Ok(match op {
            Some(op) => Expr::Unary {
                op,
                operand: Box::new(operand),
            },
            None => operand,
        })
    }

    fn parse_power(&mut self) -> Result<Expr, ExpressionError> {
        let base = self.parse_atom()?;
        if self.eat(&Token::StarStar) {
            // Right operand may carry its own sign: 2 ** -1
            let exponent = self.parse_unary()?;
            return Ok(binary(BinaryOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn parse_atom(&mut self) -> Result<Expr, ExpressionError> {
        let pos = self.position();
        let Some(spanned) = self.advance() else {
            return Err(ExpressionError::syntax(pos, "unexpected end of expression"));
        };

        match spanned.token {
            Token::Number(value) => Ok(Expr::Number(value)),
            Token::LParen => {
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(name) => self.parse_identifier(name, pos),
            other => Err(ExpressionError::syntax(pos, format!("unexpected {}", other.describe()))),
        }
    }

    fn parse_identifier(&mut self, name: String, pos: usize) -> Result<Expr, ExpressionError> {
        if self.peek() == Some(&Token::LParen) {
            let func = Function::from_name(&name)
                .ok_or_else(|| ExpressionError::syntax(pos, format!("unknown function '{}'", name)))?;
            self.index += 1;
            let args = self.parse_arguments()?;
            let (min, max) = func.arity();
            if args.len() < min || args.len() > max {
                let expected = match (min, max) {
                    (min, usize::MAX) => format!("at least {}", min),
                    (min, max) if min == max => min.to_string(),
                    (min, max) => format!("{} to {}", min, max),
                };
                return Err(ExpressionError::syntax(
                    pos,
                    format!("{}() takes {} argument(s), got {}", func.name(), expected, args.len()),
                ));
            }
            return Ok(Expr::Call { func, args, pos });
        }

        if let Some(label) = InputLabel::from_identifier(&name) {
            return Ok(Expr::Input(label));
        }
        match name.as_str() {
            "pi" => Ok(Expr::Number(PI)),
            "e" => Ok(Expr::Number(E)),
            _ if Function::from_name(&name).is_some() => Err(ExpressionError::syntax(
                pos,
                format!("function '{}' must be called with parentheses", name),
            )),
            _ => Err(ExpressionError::UnboundIdentifier(name)),
        }
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expr>, ExpressionError> {
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_or()?);
            if self.eat(&Token::Comma) {
                continue;
            }
            self.expect(Token::RParen)?;
            return Ok(args);
        }
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}
