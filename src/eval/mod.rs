//! Expression evaluation seam.
//!
//! The scheduler only needs two steps from an evaluator: turn text into a
//! [`ParsedExpr`] and reduce it to a number. [`ArithmeticEvaluator`] is the
//! built-in implementation; anything else implementing [`Evaluator`] can be
//! plugged into the service instead.

pub mod arithmetic;

use thiserror::Error;

pub use arithmetic::ArithmeticEvaluator;

/// Failure of either evaluation step. Never retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprError {
    #[error("syntax error at position {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("evaluation failed: {0}")]
    Evaluation(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BinaryOp::Add => write!(f, "+"),
            BinaryOp::Sub => write!(f, "-"),
            BinaryOp::Mul => write!(f, "*"),
            BinaryOp::Div => write!(f, "/"),
        }
    }
}

/// Parsed arithmetic expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedExpr {
    Number(f64),
    Neg(Box<ParsedExpr>),
    Binary {
        op: BinaryOp,
        lhs: Box<ParsedExpr>,
        rhs: Box<ParsedExpr>,
    },
}

pub trait Evaluator: Send + Sync {
    fn parse(&self, text: &str) -> Result<ParsedExpr, ExprError>;

    fn evaluate(&self, expr: &ParsedExpr) -> Result<f64, ExprError>;

    /// Parse then evaluate.
    fn run(&self, text: &str) -> Result<f64, ExprError> {
        let parsed = self.parse(text)?;
        self.evaluate(&parsed)
    }
}

/// Render a value in its shortest round-trippable form.
///
/// Magnitudes outside `[1e-6, 1e16)` switch to exponent notation so the
/// output stays short.
pub fn format_value(value: f64) -> String {
    if value == 0.0 {
        // avoid "-0"
        return "0".to_string();
    }
    let magnitude = value.abs();
    if !(1e-6..1e16).contains(&magnitude) {
        return format!("{value:e}");
    }
    value.to_string()
}

/// Longest expression accepted from submitters, in bytes.
pub const MAX_EXPRESSION_LEN: usize = 4096;

/// Characters accepted from submitters.
const ALLOWED: &[char] = &[
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', '+', '-', '*', '/', '(', ')', '.', ' ',
];

/// Whitelist check applied before a submission reaches the registry.
pub fn validate_expression(text: &str) -> Result<(), String> {
    if text.trim().is_empty() {
        return Err("expression is empty".to_string());
    }
    if text.len() > MAX_EXPRESSION_LEN {
        return Err(format!(
            "expression is longer than {MAX_EXPRESSION_LEN} bytes"
        ));
    }
    if let Some(c) = text.chars().find(|c| !ALLOWED.contains(c)) {
        return Err(format!("character {c:?} is not allowed"));
    }
    Ok(())
}
