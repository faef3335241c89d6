//! Scalar expressions: `print`, `info <expr>`, function arguments, data
//! transformations.
//!
//! Grammar (lowest to highest precedence):
//!
//! ```text
//! expr    := and ('or' and)*
//! and     := not ('and' not)*
//! not     := 'not' not | cmp
//! cmp     := sum (('<' | '>' | '<=' | '>=' | '==' | '!=') sum)?
//! sum     := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := '-' unary | power
//! power   := primary ('^' unary)?
//! primary := number | name | name '(' args ')' | '$v' | '%f' '.' param
//!          | '%f' '(' expr ')' | 'F' '(' expr ')' | '(' expr ')'
//! ```
//!
//! `^` is right-associative and binds tighter than unary minus (`-2^2 == -4`).
//! Comparisons and logic yield 1 or 0; any non-zero value is true.

use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal, Uniform};

use crate::error::AppError;
use crate::session::lexer::{Token, TokenStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(f64),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Bin(BinOp, Box<Expr>, Box<Expr>),
    /// Built-in math function or a named constant/statistic (no args).
    Call(String, Vec<Expr>),
    Name(String),
    /// `$name`
    VarRef(String),
    /// `%func.param`
    ParamRef { func: String, param: String },
    /// `%func(x)`
    FuncAt { func: String, arg: Box<Expr> },
    /// `F(x)`: model of the default dataset.
    ModelAt(Box<Expr>),
}

/// What an expression can look up while being evaluated.
pub trait EvalContext {
    fn param_value(&self, func: &str, param: &str) -> Result<f64, AppError>;
    fn function_at(&self, func: &str, x: f64) -> Result<f64, AppError>;
    fn model_at(&self, x: f64) -> Result<f64, AppError>;
    fn variable_value(&self, name: &str) -> Result<f64, AppError>;
    /// Bare names other than `pi`: fit statistics, and point columns inside
    /// a transformation. `None` if the name is unknown.
    fn lookup(&self, name: &str) -> Result<Option<f64>, AppError>;
    fn rng(&mut self) -> &mut StdRng;
}

/// Parse a complete expression from tokens.
pub fn parse_expr(tokens: &[Token]) -> Result<Expr, AppError> {
    let mut ts = TokenStream::new(tokens);
    let e = parse(&mut ts)?;
    ts.expect_end()?;
    Ok(e)
}

/// Parse an expression prefix, leaving the stream at the first token that
/// cannot continue it.
pub fn parse(ts: &mut TokenStream<'_>) -> Result<Expr, AppError> {
    let mut lhs = parse_and(ts)?;
    while eat_keyword(ts, "or") {
        let rhs = parse_and(ts)?;
        lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
    }
    Ok(lhs)
}

fn eat_keyword(ts: &mut TokenStream<'_>, word: &str) -> bool {
    match ts.peek() {
        Some(Token::Name(n)) if n == word => {
            ts.next();
            true
        }
        _ => false,
    }
}

fn parse_and(ts: &mut TokenStream<'_>) -> Result<Expr, AppError> {
    let mut lhs = parse_not(ts)?;
    while eat_keyword(ts, "and") {
        let rhs = parse_not(ts)?;
        lhs = Expr::And(Box::new(lhs), Box::new(rhs));
    }
    Ok(lhs)
}

fn parse_not(ts: &mut TokenStream<'_>) -> Result<Expr, AppError> {
    if eat_keyword(ts, "not") {
        return Ok(Expr::Not(Box::new(parse_not(ts)?)));
    }
    let lhs = parse_sum(ts)?;
    let op = match ts.peek() {
        Some(Token::Less) => BinOp::Lt,
        Some(Token::Greater) => BinOp::Gt,
        Some(Token::LessEq) => BinOp::Le,
        Some(Token::GreaterEq) => BinOp::Ge,
        Some(Token::EqEq) => BinOp::Eq,
        Some(Token::NotEq) => BinOp::Ne,
        _ => return Ok(lhs),
    };
    ts.next();
    let rhs = parse_sum(ts)?;
    Ok(Expr::Bin(op, Box::new(lhs), Box::new(rhs)))
}

fn parse_sum(ts: &mut TokenStream<'_>) -> Result<Expr, AppError> {
    let mut lhs = parse_term(ts)?;
    loop {
        let op = match ts.peek() {
            Some(Token::Plus) => BinOp::Add,
            Some(Token::Minus) => BinOp::Sub,
            _ => return Ok(lhs),
        };
        ts.next();
        let rhs = parse_term(ts)?;
        lhs = Expr::Bin(op, Box::new(lhs), Box::new(rhs));
    }
}

fn parse_term(ts: &mut TokenStream<'_>) -> Result<Expr, AppError> {
    let mut lhs = parse_unary(ts)?;
    loop {
        let op = match ts.peek() {
            Some(Token::Star) => BinOp::Mul,
            Some(Token::Slash) => BinOp::Div,
            _ => return Ok(lhs),
        };
        ts.next();
        let rhs = parse_unary(ts)?;
        lhs = Expr::Bin(op, Box::new(lhs), Box::new(rhs));
    }
}

fn parse_unary(ts: &mut TokenStream<'_>) -> Result<Expr, AppError> {
    if ts.eat(&Token::Minus) {
        return Ok(Expr::Neg(Box::new(parse_unary(ts)?)));
    }
    if ts.eat(&Token::Plus) {
        return parse_unary(ts);
    }
    parse_power(ts)
}

fn parse_power(ts: &mut TokenStream<'_>) -> Result<Expr, AppError> {
    let base = parse_primary(ts)?;
    if ts.eat(&Token::Caret) {
        let exp = parse_unary(ts)?;
        return Ok(Expr::Bin(BinOp::Pow, Box::new(base), Box::new(exp)));
    }
    Ok(base)
}

fn parse_primary(ts: &mut TokenStream<'_>) -> Result<Expr, AppError> {
    match ts.peek() {
        Some(Token::Number(v)) => {
            ts.next();
            Ok(Expr::Num(*v))
        }
        Some(Token::Var(name)) => {
            ts.next();
            Ok(Expr::VarRef(name.clone()))
        }
        Some(Token::LParen) => {
            ts.next();
            let e = parse(ts)?;
            ts.expect(&Token::RParen)?;
            Ok(e)
        }
        Some(Token::Func(name)) => {
            ts.next();
            if ts.eat(&Token::Dot) {
                match ts.next() {
                    Some(Token::Name(param)) => Ok(Expr::ParamRef {
                        func: name.clone(),
                        param: param.clone(),
                    }),
                    _ => Err(AppError::syntax(format!("parameter name expected after `%{name}.`"))),
                }
            } else if ts.eat(&Token::LParen) {
                let arg = parse(ts)?;
                ts.expect(&Token::RParen)?;
                Ok(Expr::FuncAt {
                    func: name.clone(),
                    arg: Box::new(arg),
                })
            } else {
                Err(ts.unexpected(&format!("`.` or `(` after `%{name}`")))
            }
        }
        Some(Token::Name(name)) => {
            ts.next();
            if !ts.eat(&Token::LParen) {
                return Ok(Expr::Name(name.clone()));
            }
            let mut args = Vec::new();
            if !ts.eat(&Token::RParen) {
                loop {
                    args.push(parse(ts)?);
                    if ts.eat(&Token::RParen) {
                        break;
                    }
                    ts.expect(&Token::Comma)?;
                }
            }
            if name == "F" {
                if args.len() != 1 {
                    return Err(AppError::syntax("F() takes one argument"));
                }
                let arg = args.pop().map(Box::new).ok_or_else(|| AppError::syntax("F() takes one argument"))?;
                return Ok(Expr::ModelAt(arg));
            }
            check_arity(name, args.len())?;
            Ok(Expr::Call(name.clone(), args))
        }
        _ => Err(ts.unexpected("expression")),
    }
}

fn check_arity(name: &str, n: usize) -> Result<(), AppError> {
    let want = match name {
        "ln" | "log10" | "exp" | "sqrt" | "sin" | "cos" | "tan" | "atan" | "abs" => 1,
        "min" | "max" | "randnormal" | "randuniform" => 2,
        _ => return Err(AppError::syntax(format!("unknown function `{name}`"))),
    };
    if n != want {
        return Err(AppError::syntax(format!(
            "{name}() takes {want} argument{}, {n} given",
            if want == 1 { "" } else { "s" }
        )));
    }
    Ok(())
}

/// Evaluate an expression.
pub fn eval(expr: &Expr, ctx: &mut dyn EvalContext) -> Result<f64, AppError> {
    match expr {
        Expr::Num(v) => Ok(*v),
        Expr::Neg(e) => Ok(-eval(e, ctx)?),
        Expr::Not(e) => Ok(truth(eval(e, ctx)? == 0.0)),
        Expr::And(a, b) => Ok(truth(eval(a, ctx)? != 0.0 && eval(b, ctx)? != 0.0)),
        Expr::Or(a, b) => Ok(truth(eval(a, ctx)? != 0.0 || eval(b, ctx)? != 0.0)),
        Expr::Bin(op, a, b) => {
            let a = eval(a, ctx)?;
            let b = eval(b, ctx)?;
            Ok(match op {
                BinOp::Add => a + b,
                BinOp::Sub => a - b,
                BinOp::Mul => a * b,
                BinOp::Div => {
                    if b == 0.0 {
                        return Err(AppError::execute("Division by zero."));
                    }
                    a / b
                }
                BinOp::Pow => a.powf(b),
                BinOp::Lt => truth(a < b),
                BinOp::Gt => truth(a > b),
                BinOp::Le => truth(a <= b),
                BinOp::Ge => truth(a >= b),
                BinOp::Eq => truth(a == b),
                BinOp::Ne => truth(a != b),
            })
        }
        Expr::Name(name) => match name.as_str() {
            "pi" => Ok(std::f64::consts::PI),
            _ => ctx
                .lookup(name)?
                .ok_or_else(|| AppError::execute(format!("Unknown name: {name}"))),
        },
        Expr::VarRef(name) => ctx.variable_value(name),
        Expr::ParamRef { func, param } => ctx.param_value(func, param),
        Expr::FuncAt { func, arg } => {
            let x = eval(arg, ctx)?;
            ctx.function_at(func, x)
        }
        Expr::ModelAt(arg) => {
            let x = eval(arg, ctx)?;
            ctx.model_at(x)
        }
        Expr::Call(name, args) => {
            let mut v = Vec::with_capacity(args.len());
            for a in args {
                v.push(eval(a, ctx)?);
            }
            call(name, &v, ctx)
        }
    }
}

fn truth(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

fn call(name: &str, v: &[f64], ctx: &mut dyn EvalContext) -> Result<f64, AppError> {
    let r = match name {
        "ln" => v[0].ln(),
        "log10" => v[0].log10(),
        "exp" => v[0].exp(),
        "sqrt" => v[0].sqrt(),
        "sin" => v[0].sin(),
        "cos" => v[0].cos(),
        "tan" => v[0].tan(),
        "atan" => v[0].atan(),
        "abs" => v[0].abs(),
        "min" => v[0].min(v[1]),
        "max" => v[0].max(v[1]),
        "randnormal" => {
            if !(v[1].is_finite() && v[1] >= 0.0) {
                return Err(AppError::execute("randnormal: sigma must be >= 0"));
            }
            let normal = Normal::new(v[0], v[1])
                .map_err(|e| AppError::execute(format!("randnormal: {e}")))?;
            normal.sample(ctx.rng())
        }
        "randuniform" => {
            if !(v[0] < v[1]) {
                return Err(AppError::execute("randuniform: empty range"));
            }
            Uniform::new(v[0], v[1]).sample(ctx.rng())
        }
        _ => return Err(AppError::syntax(format!("unknown function `{name}`"))),
    };
    Ok(r)
}
