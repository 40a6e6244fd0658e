//! Arithmetic calculator tool.

use super::{parse_args, Tool, ToolDefinition};
use crate::context::RequestContext;
use crate::error::{Result, StreamLensError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

/// Evaluates arithmetic expressions for the model.
#[derive(Debug, Default, Clone, Copy)]
pub struct Calculator;

#[derive(Debug, Deserialize)]
struct CalculatorArgs {
    expression: String,
}

#[async_trait]
impl Tool for Calculator {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "calculator".to_string(),
            description: "Evaluate an arithmetic expression. Supports + - * / % ^, parentheses, \
                sqrt, abs, ln, log10, sin, cos, tan, exp and the constants pi and e."
                .to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "expression": {
                        "type": "string",
                        "description": "Expression to evaluate, e.g. (1200 - 96) / 1200 * 100"
                    }
                },
                "required": ["expression"]
            }),
        }
    }

    async fn call(&self, _ctx: &RequestContext, input: Value) -> Result<String> {
        let args: CalculatorArgs = parse_args("calculator", input)?;
        let value = evaluate(&args.expression)?;
        Ok(format_number(value))
    }
}

/// Evaluate an arithmetic expression.
pub fn evaluate(expression: &str) -> Result<f64> {
    let tokens = tokenize(expression)?;
    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(calc_error(format!(
            "unexpected token {:?}",
            parser.tokens[parser.pos]
        )));
    }
    if !value.is_finite() {
        return Err(calc_error("result is not a finite number"));
    }
    Ok(value)
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

#[track_caller]
fn calc_error(msg: impl Into<String>) -> StreamLensError {
    StreamLensError::tool(format!("calculator: {}", msg.into()))
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Op(char),
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let number = text
                    .parse()
                    .map_err(|_| calc_error(format!("invalid number {:?}", text)))?;
                tokens.push(Token::Number(number));
            }
            c if c.is_ascii_alphabetic() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            '+' | '-' | '*' | '/' | '%' | '^' => {
                tokens.push(Token::Op(c));
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            other => return Err(calc_error(format!("unexpected character {:?}", other))),
        }
    }

    if tokens.is_empty() {
        return Err(calc_error("empty expression"));
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expr(&mut self) -> Result<f64> {
        let mut value = self.term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.term()?;
            value = if op == '+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64> {
        let mut value = self.unary()?;
        while let Some(Token::Op(op @ ('*' | '/' | '%'))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.unary()?;
            value = match op {
                '*' => value * rhs,
                _ if rhs == 0.0 => return Err(calc_error("division by zero")),
                '/' => value / rhs,
                _ => value % rhs,
            };
        }
        Ok(value)
    }

    fn unary(&mut self) -> Result<f64> {
        match self.peek() {
            Some(Token::Op('-')) => {
                self.pos += 1;
                Ok(-self.unary()?)
            }
            Some(Token::Op('+')) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<f64> {
        let base = self.primary()?;
        if let Some(Token::Op('^')) = self.peek() {
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<f64> {
        match self.next() {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::LParen) => {
                let value = self.expr()?;
                self.expect_rparen()?;
                Ok(value)
            }
            Some(Token::Ident(name)) => self.ident(&name),
            Some(other) => Err(calc_error(format!("unexpected token {:?}", other))),
            None => Err(calc_error("unexpected end of expression")),
        }
    }

    fn ident(&mut self, name: &str) -> Result<f64> {
        match name {
            "pi" => return Ok(std::f64::consts::PI),
            "e" => return Ok(std::f64::consts::E),
            _ => {}
        }

        if self.next() != Some(Token::LParen) {
            return Err(calc_error(format!("unknown identifier {:?}", name)));
        }
        let arg = self.expr()?;
        self.expect_rparen()?;

        match name {
            "sqrt" if arg < 0.0 => Err(calc_error("sqrt of a negative number")),
            "sqrt" => Ok(arg.sqrt()),
            "abs" => Ok(arg.abs()),
            "ln" => Ok(arg.ln()),
            "log10" => Ok(arg.log10()),
            "sin" => Ok(arg.sin()),
            "cos" => Ok(arg.cos()),
            "tan" => Ok(arg.tan()),
            "exp" => Ok(arg.exp()),
            _ => Err(calc_error(format!("unknown function {:?}", name))),
        }
    }

    fn expect_rparen(&mut self) -> Result<()> {
        match self.next() {
            Some(Token::RParen) => Ok(()),
            _ => Err(calc_error("expected ')'")),
        }
    }
}
