//! Parameter transform mini-language (spec §4.3).
//!
//! Endpoints restrict transforms to a small, non-Turing-complete
//! expression language: `slice(i,j)` / `slice(v,i,j)`, `concat(...)`,
//! and the `toString`/`toInt`/`toFloat`/`toLowerCase`/`toUpperCase`/`trim`
//! conversion helpers, which may be nested and composed (spec §8 gives
//! `concat(slice(v,0,4),'-',slice(v,4,6),'-',slice(v,6,8),'T00:00:00Z')`
//! applied to `"20240701"` as the worked example). Any bare identifier in
//! an expression refers to the parameter's own value.

use crate::error::ParamError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transform {
    /// Replaces the upstream parameter name when present.
    #[serde(default)]
    pub target_name: Option<String>,
    pub expression: String,
}

impl Transform {
    pub fn apply(&self, value: &Value) -> Result<Value, ParamError> {
        let expr = parse(&self.expression)
            .map_err(|e| ParamError::Invalid(self.expression.clone(), e))?;
        eval(&expr, value)
    }
}

#[derive(Debug, Clone)]
enum Expr {
    Ident(String),
    Number(i64),
    Str(String),
    Call(String, Vec<Expr>),
}

fn eval(expr: &Expr, ctx: &Value) -> Result<Value, ParamError> {
    match expr {
        Expr::Ident(_) => Ok(ctx.clone()),
        Expr::Number(n) => Ok(Value::from(*n)),
        Expr::Str(s) => Ok(Value::String(s.clone())),
        Expr::Call(name, args) => eval_call(name, args, ctx),
    }
}

fn eval_call(name: &str, args: &[Expr], ctx: &Value) -> Result<Value, ParamError> {
    match name {
        "slice" => {
            let (source, i, j) = match args {
                [i, j] => (ctx.clone(), eval_index(i, ctx)?, eval_index(j, ctx)?),
                [source, i, j] => (eval(source, ctx)?, eval_index(i, ctx)?, eval_index(j, ctx)?),
                _ => return Err(bad_call("slice", "expects slice(i,j) or slice(source,i,j)")),
            };
            let s = as_display_string(&source);
            let chars: Vec<char> = s.chars().collect();
            let i = i.min(chars.len());
            let j = j.clamp(i, chars.len());
            Ok(Value::String(chars[i..j].iter().collect()))
        }
        "concat" => {
            let mut out = String::new();
            for arg in args {
                out.push_str(&as_display_string(&eval(arg, ctx)?));
            }
            Ok(Value::String(out))
        }
        "toString" => Ok(Value::String(as_display_string(&eval_single(args, ctx)?))),
        "toInt" => {
            let s = as_display_string(&eval_single(args, ctx)?);
            s.trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| bad_call("toInt", &format!("cannot parse '{s}' as an integer")))
        }
        "toFloat" => {
            let s = as_display_string(&eval_single(args, ctx)?);
            s.trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| bad_call("toFloat", &format!("cannot parse '{s}' as a float")))
        }
        "toLowerCase" => Ok(Value::String(as_display_string(&eval_single(args, ctx)?).to_lowercase())),
        "toUpperCase" => Ok(Value::String(as_display_string(&eval_single(args, ctx)?).to_uppercase())),
        "trim" => Ok(Value::String(as_display_string(&eval_single(args, ctx)?).trim().to_string())),
        other => Err(bad_call(other, "unknown transform function")),
    }
}

fn eval_single(args: &[Expr], ctx: &Value) -> Result<Value, ParamError> {
    match args {
        [] => Ok(ctx.clone()),
        [only] => eval(only, ctx),
        _ => Err(bad_call("<conversion>", "expects at most one argument")),
    }
}

fn eval_index(expr: &Expr, ctx: &Value) -> Result<usize, ParamError> {
    match eval(expr, ctx)? {
        Value::Number(n) => n
            .as_i64()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| bad_call("slice", "index must be a non-negative integer")),
        other => Err(bad_call("slice", &format!("index must be a number, got {other}"))),
    }
}

fn as_display_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn bad_call(fn_name: &str, message: &str) -> ParamError {
    ParamError::Invalid(fn_name.to_string(), message.to_string())
}

// --- tiny recursive-descent parser -----------------------------------

struct Parser<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

fn parse(input: &str) -> Result<Expr, String> {
    let mut parser = Parser {
        chars: input.chars().peekable(),
    };
    let expr = parser.parse_expr()?;
    parser.skip_ws();
    if parser.chars.peek().is_some() {
        return Err(format!("unexpected trailing input in '{input}'"));
    }
    Ok(expr)
}

impl<'a> Parser<'a> {
    fn skip_ws(&mut self) {
        while matches!(self.chars.peek(), Some(c) if c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, String> {
        self.skip_ws();
        match self.chars.peek() {
            Some('\'') => self.parse_string(),
            Some(c) if c.is_ascii_digit() || *c == '-' => self.parse_number(),
            Some(c) if c.is_alphabetic() || *c == '_' => self.parse_ident_or_call(),
            other => Err(format!("unexpected character {other:?} in transform expression")),
        }
    }

    fn parse_string(&mut self) -> Result<Expr, String> {
        self.chars.next();
        let mut out = String::new();
        loop {
            match self.chars.next() {
                Some('\'') => return Ok(Expr::Str(out)),
                Some(c) => out.push(c),
                None => return Err("unterminated string literal".to_string()),
            }
        }
    }

    fn parse_number(&mut self) -> Result<Expr, String> {
        let mut out = String::new();
        if matches!(self.chars.peek(), Some('-')) {
            out.push('-');
            self.chars.next();
        }
        while matches!(self.chars.peek(), Some(c) if c.is_ascii_digit()) {
            out.push(self.chars.next().unwrap());
        }
        out.parse::<i64>().map(Expr::Number).map_err(|_| format!("invalid number literal '{out}'"))
    }

    fn parse_ident_or_call(&mut self) -> Result<Expr, String> {
        let mut name = String::new();
        while matches!(self.chars.peek(), Some(c) if c.is_alphanumeric() || *c == '_') {
            name.push(self.chars.next().unwrap());
        }
        self.skip_ws();
        if matches!(self.chars.peek(), Some('(')) {
            self.chars.next();
            let mut args = Vec::new();
            self.skip_ws();
            if !matches!(self.chars.peek(), Some(')')) {
                loop {
                    args.push(self.parse_expr()?);
                    self.skip_ws();
                    match self.chars.peek() {
                        Some(',') => {
                            self.chars.next();
                        }
                        Some(')') => break,
                        other => return Err(format!("expected ',' or ')', found {other:?}")),
                    }
                }
            }
            self.skip_ws();
            match self.chars.next() {
                Some(')') => Ok(Expr::Call(name, args)),
                other => Err(format!("expected ')', found {other:?}")),
            }
        } else {
            Ok(Expr::Ident(name))
        }
    }
}
