//! Built-in arithmetic evaluator.
//!
//! Supports:
//! - Decimal literals with an optional fraction: `12`, `3.25`
//! - `+`, `-`, `*`, `/` with the usual precedence and left associativity
//! - Unary `+` and `-`
//! - Parentheses for grouping
//!
//! Division by zero and results that are not finite are evaluation errors.

use super::{BinaryOp, Evaluator, ExprError, ParsedExpr};

/// Maximum nesting depth for parentheses and unary operators.
/// Prevents stack overflow on inputs like `((((((...`.
const MAX_DEPTH: usize = 256;

/// Maximum number of binary operators in one expression. Operator chains
/// build a left-deep tree, so this also bounds evaluation recursion.
const MAX_OPERATORS: usize = 1024;

#[derive(Debug, Clone, Copy, Default)]
pub struct ArithmeticEvaluator;

impl ArithmeticEvaluator {
    pub fn new() -> Self {
        Self
    }
}

impl Evaluator for ArithmeticEvaluator {
    fn parse(&self, text: &str) -> Result<ParsedExpr, ExprError> {
        let mut parser = Parser::new(text);
        let expr = parser.parse_expr()?;
        parser.expect_end()?;
        Ok(expr)
    }

    fn evaluate(&self, expr: &ParsedExpr) -> Result<f64, ExprError> {
        let value = eval(expr)?;
        if !value.is_finite() {
            return Err(ExprError::Evaluation(format!(
                "result is not a finite number: {value}"
            )));
        }
        Ok(value)
    }
}

fn eval(expr: &ParsedExpr) -> Result<f64, ExprError> {
    match expr {
        ParsedExpr::Number(n) => Ok(*n),
        ParsedExpr::Neg(inner) => Ok(-eval(inner)?),
        ParsedExpr::Binary { op, lhs, rhs } => {
            let l = eval(lhs)?;
            let r = eval(rhs)?;
            match op {
                BinaryOp::Add => Ok(l + r),
                BinaryOp::Sub => Ok(l - r),
                BinaryOp::Mul => Ok(l * r),
                BinaryOp::Div => {
                    if r == 0.0 {
                        return Err(ExprError::Evaluation("division by zero".to_string()));
                    }
                    Ok(l / r)
                }
            }
        }
    }
}

/// Recursive descent parser producing a [`ParsedExpr`].
struct Parser<'a> {
    input: &'a str,
    pos: usize,
    depth: usize,
    operators: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            depth: 0,
            operators: 0,
        }
    }

    fn error(&self, message: impl Into<String>) -> ExprError {
        ExprError::Syntax {
            position: self.pos,
            message: message.into(),
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.input[self.pos..].chars().next() {
            if ch.is_whitespace() {
                self.pos += ch.len_utf8();
            } else {
                break;
            }
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_whitespace();
        self.input[self.pos..].chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        self.skip_whitespace();
        let ch = self.input[self.pos..].chars().next()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn expect_end(&mut self) -> Result<(), ExprError> {
        match self.peek() {
            None => Ok(()),
            Some(')') => Err(self.error("unmatched ')'")),
            Some(c) => Err(self.error(format!("unexpected character {c:?}"))),
        }
    }

    fn enter(&mut self) -> Result<(), ExprError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error("expression nested too deeply"));
        }
        Ok(())
    }

    fn count_operator(&mut self) -> Result<(), ExprError> {
        self.operators += 1;
        if self.operators > MAX_OPERATORS {
            return Err(self.error(format!("more than {MAX_OPERATORS} operators")));
        }
        Ok(())
    }

    /// expr := term (('+' | '-') term)*
    fn parse_expr(&mut self) -> Result<ParsedExpr, ExprError> {
        let mut lhs = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Some('+') => BinaryOp::Add,
                Some('-') => BinaryOp::Sub,
                _ => break,
            };
            self.count_operator()?;
            self.advance();
            let rhs = self.parse_term()?;
            lhs = ParsedExpr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    /// term := unary (('*' | '/') unary)*
    fn parse_term(&mut self) -> Result<ParsedExpr, ExprError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some('*') => BinaryOp::Mul,
                Some('/') => BinaryOp::Div,
                _ => break,
            };
            self.count_operator()?;
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = ParsedExpr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<ParsedExpr, ExprError> {
        match self.peek() {
            Some('+') => {
                self.advance();
                self.enter()?;
                let inner = self.parse_unary();
                self.depth -= 1;
                inner
            }
            Some('-') => {
                self.advance();
                self.enter()?;
                let inner = self.parse_unary();
                self.depth -= 1;
                Ok(ParsedExpr::Neg(Box::new(inner?)))
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<ParsedExpr, ExprError> {
        match self.peek() {
            Some('(') => {
                self.advance();
                self.enter()?;
                let inner = self.parse_expr()?;
                self.depth -= 1;
                match self.peek() {
                    Some(')') => {
                        self.advance();
                        Ok(inner)
                    }
                    Some(c) => Err(self.error(format!("expected ')', found {c:?}"))),
                    None => Err(self.error("expected ')', found end of input")),
                }
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.parse_number(),
            Some(c) => Err(self.error(format!("unexpected character {c:?}"))),
            None => Err(self.error("unexpected end of expression")),
        }
    }

    fn parse_number(&mut self) -> Result<ParsedExpr, ExprError> {
        self.skip_whitespace();
        let start = self.pos;
        let mut seen_dot = false;
        while let Some(ch) = self.input[self.pos..].chars().next() {
            if ch.is_ascii_digit() {
                self.pos += 1;
            } else if ch == '.' && !seen_dot {
                seen_dot = true;
                self.pos += 1;
            } else {
                break;
            }
        }
        let literal = &self.input[start..self.pos];
        literal.parse::<f64>().map(ParsedExpr::Number).map_err(|_| {
            ExprError::Syntax {
                position: start,
                message: format!("invalid number {literal:?}"),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(text: &str) -> Result<f64, ExprError> {
        ArithmeticEvaluator::new().run(text)
    }

    #[test]
    fn simple_sum() {
        assert_eq!(run("2 + 2"), Ok(4.0));
    }

    #[test]
    fn precedence_and_associativity() {
        assert_eq!(run("2 + 3 * 4"), Ok(14.0));
        assert_eq!(run("(2 + 3) * 4"), Ok(20.0));
        assert_eq!(run("10 - 4 - 3"), Ok(3.0));
        assert_eq!(run("8 / 4 / 2"), Ok(1.0));
    }

    #[test]
    fn unary_operators() {
        assert_eq!(run("-3 + 5"), Ok(2.0));
        assert_eq!(run("--3"), Ok(3.0));
        assert_eq!(run("+4"), Ok(4.0));
        assert_eq!(run("2 * -(1 + 1)"), Ok(-4.0));
    }

    #[test]
    fn decimals() {
        assert_eq!(run("1.5 * 2"), Ok(3.0));
        assert_eq!(run(".5 + .25"), Ok(0.75));
    }

    #[test]
    fn unbalanced_parentheses_are_syntax_errors() {
        assert!(matches!(run("2 + ("), Err(ExprError::Syntax { .. })));
        assert!(matches!(run("(2 + 3"), Err(ExprError::Syntax { .. })));
        assert!(matches!(run("2 + 3)"), Err(ExprError::Syntax { .. })));
    }

    #[test]
    fn garbage_is_a_syntax_error() {
        assert!(matches!(run(""), Err(ExprError::Syntax { .. })));
        assert!(matches!(run("2 +"), Err(ExprError::Syntax { .. })));
        assert!(matches!(run("2 2"), Err(ExprError::Syntax { .. })));
        assert!(matches!(run("1.2.3"), Err(ExprError::Syntax { .. })));
        assert!(matches!(run("."), Err(ExprError::Syntax { .. })));
    }

    #[test]
    fn syntax_error_reports_position() {
        match run("1 + * 2") {
            Err(ExprError::Syntax { position, .. }) => assert_eq!(position, 4),
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn division_by_zero_is_an_evaluation_error() {
        assert_eq!(
            run("1 / (2 - 2)"),
            Err(ExprError::Evaluation("division by zero".to_string()))
        );
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let text = format!("{}1{}", "(".repeat(300), ")".repeat(300));
        assert!(matches!(run(&text), Err(ExprError::Syntax { .. })));

        let ok = format!("{}1{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(run(&ok), Ok(1.0));
    }

    #[test]
    fn long_operator_chain_is_rejected_without_overflow() {
        let chain = "1+".repeat(200_000) + "1";
        // Run on a thread with a tokio worker sized stack
        let outcome = std::thread::Builder::new()
            .stack_size(2 * 1024 * 1024)
            .spawn(move || ArithmeticEvaluator::new().run(&chain))
            .unwrap()
            .join()
            .unwrap();
        match outcome {
            Err(ExprError::Syntax { message, .. }) => assert!(message.contains("operators")),
            other => panic!("expected syntax error, got {other:?}"),
        }

        let ok = "1*".repeat(MAX_OPERATORS) + "1";
        assert_eq!(run(&ok), Ok(1.0));
    }

    #[test]
    fn parse_builds_tree() {
        let parsed = ArithmeticEvaluator::new().parse("1 - 2").unwrap();
        assert_eq!(
            parsed,
            ParsedExpr::Binary {
                op: BinaryOp::Sub,
                lhs: Box::new(ParsedExpr::Number(1.0)),
                rhs: Box::new(ParsedExpr::Number(2.0)),
            }
        );
    }
}
