//! Restricted arithmetic expression evaluator shared by formula
//! substitution (C1) and `output_expression` (C7).
//!
//! Grammar: `+ - * / ** ( )`, unary minus, variable lookups, and a fixed
//! math builtin set, evaluated with a from-scratch recursive-descent
//! evaluator rather than an embedded
//! interpreter, since no Rust expression-eval crate in the corpus covers
//! this exact builtin surface.

use std::collections::HashMap;
use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("unexpected character '{0}' at position {1}")]
    UnexpectedChar(char, usize),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("expected '{0}'")]
    Expected(char),
    #[error("unknown variable '{0}'")]
    UnknownVariable(String),
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("function '{0}' expects {1} argument(s), got {2}")]
    ArityMismatch(String, usize, usize),
    #[error("trailing input after expression: {0:?}")]
    TrailingInput(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Pow,
    LParen,
    RParen,
    Comma,
}

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self { chars: input.chars().peekable(), pos: 0 }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn tokenize(mut self) -> Result<Vec<Token>, EvalError> {
        let mut tokens = Vec::new();
        while let Some(&c) = self.chars.peek() {
            match c {
                ' ' | '\t' | '\n' | '\r' => {
                    self.bump();
                }
                '+' => {
                    self.bump();
                    tokens.push(Token::Plus);
                }
                '-' => {
                    self.bump();
                    tokens.push(Token::Minus);
                }
                '*' => {
                    self.bump();
                    if self.chars.peek() == Some(&'*') {
                        self.bump();
                        tokens.push(Token::Pow);
                    } else {
                        tokens.push(Token::Star);
                    }
                }
                '/' => {
                    self.bump();
                    tokens.push(Token::Slash);
                }
                '^' => {
                    self.bump();
                    tokens.push(Token::Pow);
                }
                '(' => {
                    self.bump();
                    tokens.push(Token::LParen);
                }
                ')' => {
                    self.bump();
                    tokens.push(Token::RParen);
                }
                ',' => {
                    self.bump();
                    tokens.push(Token::Comma);
                }
                c if c.is_ascii_digit() || c == '.' => {
                    let start_pos = self.pos;
                    let mut raw = String::new();
                    while let Some(&d) = self.chars.peek() {
                        if d.is_ascii_digit() || d == '.' {
                            raw.push(d);
                            self.bump();
                        } else if (d == 'e' || d == 'E')
                            && raw.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false)
                        {
                            raw.push(d);
                            self.bump();
                            if let Some(&sign) = self.chars.peek() {
                                if sign == '+' || sign == '-' {
                                    raw.push(sign);
                                    self.bump();
                                }
                            }
                        } else {
                            break;
                        }
                    }
                    let value: f64 = raw
                        .parse()
                        .map_err(|_| EvalError::UnexpectedChar(c, start_pos))?;
                    tokens.push(Token::Num(value));
                }
                c if c.is_ascii_alphabetic() || c == '_' => {
                    let mut raw = String::new();
                    while let Some(&d) = self.chars.peek() {
                        if d.is_ascii_alphanumeric() || d == '_' {
                            raw.push(d);
                            self.bump();
                        } else {
                            break;
                        }
                    }
                    tokens.push(Token::Ident(raw));
                }
                other => return Err(EvalError::UnexpectedChar(other, self.pos)),
            }
        }
        Ok(tokens)
    }
}

#[derive(Debug, Clone)]
pub enum Expr {
    Num(f64),
    Var(String),
    Call(String, Vec<Expr>),
    Neg(Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    Pow(Box<Expr>, Box<Expr>),
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn expect(&mut self, tok: &Token) -> Result<(), EvalError> {
        if self.peek() == Some(tok) {
            self.advance();
            Ok(())
        } else {
            Err(match tok {
                Token::RParen => EvalError::Expected(')'),
                Token::LParen => EvalError::Expected('('),
                _ => EvalError::UnexpectedEnd,
            })
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, EvalError> {
        let mut lhs = self.parse_term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.advance();
                    let rhs = self.parse_term()?;
                    lhs = Expr::Add(Box::new(lhs), Box::new(rhs));
                }
                Some(Token::Minus) => {
                    self.advance();
                    let rhs = self.parse_term()?;
                    lhs = Expr::Sub(Box::new(lhs), Box::new(rhs));
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> Result<Expr, EvalError> {
        let mut lhs = self.parse_unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.advance();
                    let rhs = self.parse_unary()?;
                    lhs = Expr::Mul(Box::new(lhs), Box::new(rhs));
                }
                Some(Token::Slash) => {
                    self.advance();
                    let rhs = self.parse_unary()?;
                    lhs = Expr::Div(Box::new(lhs), Box::new(rhs));
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, EvalError> {
        if let Some(Token::Minus) = self.peek() {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::Neg(Box::new(operand)));
        }
        if let Some(Token::Plus) = self.peek() {
            self.advance();
            return self.parse_unary();
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<Expr, EvalError> {
        let base = self.parse_primary()?;
        if let Some(Token::Pow) = self.peek() {
            self.advance();
            // right-associative: a ** b ** c == a ** (b ** c)
            let exponent = self.parse_unary()?;
            return Ok(Expr::Pow(Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, EvalError> {
        match self.advance() {
            Some(Token::Num(n)) => Ok(Expr::Num(n)),
            Some(Token::LParen) => {
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.advance();
                    let mut args = Vec::new();
                    if self.peek() != Some(&Token::RParen) {
                        args.push(self.parse_expr()?);
                        while self.peek() == Some(&Token::Comma) {
                            self.advance();
                            args.push(self.parse_expr()?);
                        }
                    }
                    self.expect(&Token::RParen)?;
                    Ok(Expr::Call(name, args))
                } else {
                    Ok(Expr::Var(name))
                }
            }
            Some(_) => Err(EvalError::UnexpectedEnd),
            None => Err(EvalError::UnexpectedEnd),
        }
    }
}

/// Parse `input` into an expression tree without evaluating it.
pub fn parse(input: &str) -> Result<Expr, EvalError> {
    let tokens = Lexer::new(input).tokenize()?;
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(EvalError::TrailingInput(format!("{:?}", &parser.tokens[parser.pos..])));
    }
    Ok(expr)
}

/// Evaluate a parsed expression against a variable environment. `pi` and
/// `e` resolve to their mathematical constants when not shadowed by an
/// entry in `vars` (mirrors Python's `math.pi`/`math.e` being ordinary
/// names in the eval namespace).
pub fn eval(expr: &Expr, vars: &HashMap<String, f64>) -> Result<f64, EvalError> {
    match expr {
        Expr::Num(n) => Ok(*n),
        Expr::Var(name) => {
            if let Some(v) = vars.get(name) {
                return Ok(*v);
            }
            match name.as_str() {
                "pi" => Ok(std::f64::consts::PI),
                "e" => Ok(std::f64::consts::E),
                _ => Err(EvalError::UnknownVariable(name.clone())),
            }
        }
        Expr::Neg(inner) => Ok(-eval(inner, vars)?),
        Expr::Add(a, b) => Ok(eval(a, vars)? + eval(b, vars)?),
        Expr::Sub(a, b) => Ok(eval(a, vars)? - eval(b, vars)?),
        Expr::Mul(a, b) => Ok(eval(a, vars)? * eval(b, vars)?),
        Expr::Div(a, b) => Ok(eval(a, vars)? / eval(b, vars)?),
        Expr::Pow(a, b) => Ok(eval(a, vars)?.powf(eval(b, vars)?)),
        Expr::Call(name, args) => eval_call(name, args, vars),
    }
}

fn eval_call(name: &str, args: &[Expr], vars: &HashMap<String, f64>) -> Result<f64, EvalError> {
    let values: Result<Vec<f64>, EvalError> = args.iter().map(|a| eval(a, vars)).collect();
    let values = values?;

    macro_rules! unary {
        ($f:expr) => {{
            expect_arity(name, &values, 1)?;
            Ok($f(values[0]))
        }};
    }

    match name {
        "abs" => unary!(f64::abs),
        "sqrt" => unary!(f64::sqrt),
        "exp" => unary!(f64::exp),
        "log" => unary!(f64::ln),
        "log10" => unary!(f64::log10),
        "sin" => unary!(f64::sin),
        "cos" => unary!(f64::cos),
        "tan" => unary!(f64::tan),
        "asin" => unary!(f64::asin),
        "acos" => unary!(f64::acos),
        "atan" => unary!(f64::atan),
        "min" => {
            expect_arity(name, &values, 2)?;
            Ok(values[0].min(values[1]))
        }
        "max" => {
            expect_arity(name, &values, 2)?;
            Ok(values[0].max(values[1]))
        }
        "pow" => {
            expect_arity(name, &values, 2)?;
            Ok(values[0].powf(values[1]))
        }
        "atan2" => {
            expect_arity(name, &values, 2)?;
            Ok(values[0].atan2(values[1]))
        }
        other => Err(EvalError::UnknownFunction(other.to_string())),
    }
}

fn expect_arity(name: &str, values: &[f64], expected: usize) -> Result<(), EvalError> {
    if values.len() != expected {
        return Err(EvalError::ArityMismatch(name.to_string(), expected, values.len()));
    }
    Ok(())
}

/// Parse and evaluate in one step.
pub fn evaluate(input: &str, vars: &HashMap<String, f64>) -> Result<f64, EvalError> {
    eval(&parse(input)?, vars)
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn evaluates_arithmetic_precedence() {
        assert_eq!(evaluate("2 + 3 * 4", &vars(&[])).unwrap(), 14.0);
    }

    #[test]
    fn power_is_right_associative() {
        // 2 ** (3 ** 2) == 2 ** 9 == 512, not (2**3)**2 == 64
        assert_eq!(evaluate("2 ** 3 ** 2", &vars(&[])).unwrap(), 512.0);
    }

    #[test]
    fn resolves_variables() {
        assert_eq!(evaluate("x * 2 + y", &vars(&[("x", 3.0), ("y", 1.0)])).unwrap(), 7.0);
    }

    #[test]
    fn unknown_variable_errors() {
        assert!(matches!(evaluate("x + 1", &vars(&[])), Err(EvalError::UnknownVariable(_))));
    }

    #[test]
    fn builtin_functions_resolve() {
        assert_eq!(evaluate("sqrt(16)", &vars(&[])).unwrap(), 4.0);
        assert_eq!(evaluate("max(1, 5)", &vars(&[])).unwrap(), 5.0);
        assert!((evaluate("pi * r ** 2", &vars(&[("r", 2.0)])).unwrap() - (std::f64::consts::PI * 4.0)).abs() < 1e-9);
    }

    #[test]
    fn wrong_arity_errors() {
        assert!(matches!(evaluate("min(1)", &vars(&[])), Err(EvalError::ArityMismatch(..))));
    }

    #[test]
    fn unary_minus_and_parens() {
        assert_eq!(evaluate("-(2 + 3)", &vars(&[])).unwrap(), -5.0);
    }

    #[test]
    fn e_constant_not_shadowed_by_unrelated_var() {
        assert!((evaluate("e", &vars(&[])).unwrap() - std::f64::consts::E).abs() < 1e-12);
    }
}
