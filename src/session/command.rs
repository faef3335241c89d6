//! Statement parser: one statement of text → `Command`.
//!
//! The parser only checks shape; whether the statement can run (dataset
//! exists, function defined, file readable) is decided by the session.

use crate::domain::FunctionKind;
use crate::error::AppError;
use crate::session::expr::{self, Expr};
use crate::session::lexer::{DatasetToken, Token, TokenStream, tokenize};

/// A function argument: `expr`, `~expr`, `name=expr` or `name=~expr`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamArg {
    pub name: Option<String>,
    pub value: Expr,
    pub fitted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectMode {
    Write,
    Append,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub mode: RedirectMode,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteTarget {
    Function(String),
    Variable(String),
    Dataset(usize),
}

/// Left-hand side of a data transformation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointColumn {
    X,
    Y,
    S,
    A,
}

impl PointColumn {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "X" => Some(PointColumn::X),
            "Y" => Some(PointColumn::Y),
            "S" => Some(PointColumn::S),
            "A" => Some(PointColumn::A),
            _ => None,
        }
    }
}

/// Optional `[from:to]` range; open ends are `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangeArg {
    pub from: Option<Expr>,
    pub to: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Load {
        dataset: DatasetToken,
        path: String,
    },
    NewDataset,
    Use(usize),
    Title(String),
    Filename(String),
    Point {
        x: Expr,
        y: Expr,
        sigma: Expr,
        active: Option<Expr>,
    },
    Define {
        name: String,
        kind: FunctionKind,
        args: Vec<ParamArg>,
    },
    /// `$name = expr` or `$name = ~expr`.
    DefineVariable {
        name: String,
        value: Expr,
        fitted: bool,
    },
    /// `X = expr, Y = expr, ...` over every point of the default dataset.
    Transform(Vec<(PointColumn, Expr)>),
    AddToModel(String),
    Guess {
        name: Option<String>,
        kind: FunctionKind,
        range: RangeArg,
    },
    Fit {
        max_iterations: Option<usize>,
        datasets: Vec<DatasetToken>,
    },
    /// `what` is kept as tokens: a known info word or an expression.
    Info {
        what: Vec<Token>,
        redirect: Option<Redirect>,
    },
    Print(Expr),
    Set {
        key: String,
        value: String,
    },
    Delete(Vec<DeleteTarget>),
    Reset,
    Exec(String),
}

/// Parse a single statement (already split on `;`, comments removed).
pub fn parse_command(text: &str) -> Result<Command, AppError> {
    let tokens = tokenize(text)?;
    let mut ts = TokenStream::new(&tokens);

    let cmd = match ts.peek() {
        None => return Err(AppError::syntax("empty statement")),
        Some(Token::Dataset(ds)) => {
            let ds = *ds;
            ts.next();
            parse_dataset_statement(ds, &mut ts)?
        }
        Some(Token::Func(name)) => {
            ts.next();
            parse_function_statement(name, &mut ts)?
        }
        Some(Token::Var(name)) => {
            ts.next();
            ts.expect(&Token::Assign)?;
            let fitted = ts.eat(&Token::Tilde);
            Command::DefineVariable {
                name: name.clone(),
                value: expr::parse(&mut ts)?,
                fitted,
            }
        }
        Some(Token::Name(word)) if PointColumn::from_name(word).is_some() => parse_transform(&mut ts)?,
        Some(Token::Name(word)) => {
            ts.next();
            match word.as_str() {
                "use" => match ts.next() {
                    Some(Token::Dataset(DatasetToken::Index(n))) => Command::Use(*n),
                    _ => return Err(AppError::syntax("use: dataset `@N` expected")),
                },
                "title" | "filename" => {
                    ts.expect(&Token::Assign)?;
                    match (word.as_str(), ts.next()) {
                        ("title", Some(Token::Str(s))) => Command::Title(s.clone()),
                        (_, Some(Token::Str(s))) => Command::Filename(s.clone()),
                        _ => return Err(AppError::syntax(format!("{word}: quoted string expected"))),
                    }
                }
                "point" => parse_point(&mut ts)?,
                "F" => {
                    ts.expect(&Token::PlusAssign)?;
                    match ts.next() {
                        Some(Token::Func(name)) => Command::AddToModel(name.clone()),
                        _ => return Err(AppError::syntax("F += %name expected")),
                    }
                }
                "guess" => parse_guess(None, &mut ts)?,
                "fit" => parse_fit(&mut ts)?,
                "info" => parse_info(&tokens[1..])?,
                "dump" => {
                    let redirect = parse_redirect(&mut ts)?
                        .ok_or_else(|| AppError::syntax("dump: `> 'file'` expected"))?;
                    Command::Info {
                        what: vec![Token::Name("state".to_string())],
                        redirect: Some(redirect),
                    }
                }
                "print" => Command::Print(expr::parse_expr(&tokens[1..])?),
                "set" => parse_set(&mut ts)?,
                "delete" => parse_delete(&mut ts)?,
                "reset" => Command::Reset,
                "exec" => match ts.next() {
                    Some(Token::Str(path)) => Command::Exec(path.clone()),
                    _ => return Err(AppError::syntax("exec: quoted filename expected")),
                },
                other => return Err(AppError::syntax(format!("unknown command `{other}`"))),
            }
        }
        Some(t) => return Err(AppError::syntax(format!("unexpected {} at start of statement", t.describe()))),
    };

    // `info`, `print` consume the whole tail themselves.
    if !matches!(cmd, Command::Info { .. } | Command::Print(_)) {
        ts.expect_end()?;
    }
    Ok(cmd)
}

fn parse_dataset_statement(ds: DatasetToken, ts: &mut TokenStream<'_>) -> Result<Command, AppError> {
    if ts.eat(&Token::Less) {
        if ds == DatasetToken::All {
            return Err(AppError::syntax("cannot load into `@*`"));
        }
        return match ts.next() {
            Some(Token::Str(path)) => Ok(Command::Load {
                dataset: ds,
                path: path.clone(),
            }),
            _ => Err(AppError::syntax("quoted filename expected after `<`")),
        };
    }
    if ds == DatasetToken::New && ts.eat(&Token::Assign) {
        return match ts.next() {
            Some(Token::Number(v)) if *v == 0.0 => Ok(Command::NewDataset),
            _ => Err(AppError::syntax("only `@+ = 0` is supported")),
        };
    }
    Err(ts.unexpected("`<`"))
}

fn parse_function_statement(name: &str, ts: &mut TokenStream<'_>) -> Result<Command, AppError> {
    ts.expect(&Token::Assign)?;
    match ts.next() {
        Some(Token::Name(word)) if word == "guess" => parse_guess(Some(name.to_string()), ts),
        Some(Token::Name(type_name)) => {
            let kind = parse_kind(type_name)?;
            ts.expect(&Token::LParen)?;
            let args = parse_param_args(ts)?;
            if args.len() > kind.param_len() {
                return Err(AppError::syntax(format!(
                    "{kind} takes {} parameters, {} given",
                    kind.param_len(),
                    args.len()
                )));
            }
            Ok(Command::Define {
                name: name.to_string(),
                kind,
                args,
            })
        }
        _ => Err(AppError::syntax(format!("function type or `guess` expected after `%{name} =`"))),
    }
}

fn parse_transform(ts: &mut TokenStream<'_>) -> Result<Command, AppError> {
    let mut assignments = Vec::new();
    loop {
        let column = match ts.next() {
            Some(Token::Name(n)) => PointColumn::from_name(n),
            _ => None,
        }
        .ok_or_else(|| AppError::syntax("`X`, `Y`, `S` or `A` expected"))?;
        ts.expect(&Token::Assign)?;
        assignments.push((column, expr::parse(ts)?));
        if !ts.eat(&Token::Comma) {
            return Ok(Command::Transform(assignments));
        }
    }
}

fn parse_kind(type_name: &str) -> Result<FunctionKind, AppError> {
    FunctionKind::from_name(type_name)
        .ok_or_else(|| AppError::syntax(format!("unknown function type `{type_name}`")))
}

fn parse_param_args(ts: &mut TokenStream<'_>) -> Result<Vec<ParamArg>, AppError> {
    let mut args = Vec::new();
    if ts.eat(&Token::RParen) {
        return Ok(args);
    }
    loop {
        let name = match (ts.peek(), ts.peek_at(1)) {
            (Some(Token::Name(n)), Some(Token::Assign)) => {
                let n = n.clone();
                ts.next();
                ts.next();
                Some(n)
            }
            _ => None,
        };
        let fitted = ts.eat(&Token::Tilde);
        let value = expr::parse(ts)?;
        args.push(ParamArg { name, value, fitted });
        if ts.eat(&Token::RParen) {
            return Ok(args);
        }
        ts.expect(&Token::Comma)?;
    }
}

fn parse_guess(name: Option<String>, ts: &mut TokenStream<'_>) -> Result<Command, AppError> {
    // Forms: `guess Shape`, `guess %name = Shape`, `%name = guess Shape`.
    let mut name = name;
    if name.is_none() {
        if let Some(Token::Func(n)) = ts.peek() {
            ts.next();
            ts.expect(&Token::Assign)?;
            name = Some(n.clone());
        }
    }
    let kind = match ts.next() {
        Some(Token::Name(type_name)) => parse_kind(type_name)?,
        _ => return Err(AppError::syntax("guess: function type expected")),
    };
    let range = parse_range(ts)?;
    Ok(Command::Guess { name, kind, range })
}

fn parse_range(ts: &mut TokenStream<'_>) -> Result<RangeArg, AppError> {
    let mut range = RangeArg::default();
    if !ts.eat(&Token::LBracket) {
        return Ok(range);
    }
    if !matches!(ts.peek(), Some(Token::Colon)) {
        range.from = Some(expr::parse(ts)?);
    }
    ts.expect(&Token::Colon)?;
    if !matches!(ts.peek(), Some(Token::RBracket)) {
        range.to = Some(expr::parse(ts)?);
    }
    ts.expect(&Token::RBracket)?;
    Ok(range)
}

fn parse_point(ts: &mut TokenStream<'_>) -> Result<Command, AppError> {
    let x = expr::parse(ts)?;
    ts.expect(&Token::Comma)?;
    let y = expr::parse(ts)?;
    ts.expect(&Token::Comma)?;
    let sigma = expr::parse(ts)?;
    let active = if ts.eat(&Token::Comma) {
        Some(expr::parse(ts)?)
    } else {
        None
    };
    Ok(Command::Point { x, y, sigma, active })
}

fn parse_fit(ts: &mut TokenStream<'_>) -> Result<Command, AppError> {
    let mut max_iterations = None;
    if let Some(Token::Number(v)) = ts.peek() {
        if *v < 1.0 || v.fract() != 0.0 {
            return Err(AppError::syntax("fit: number of iterations must be a positive integer"));
        }
        max_iterations = Some(*v as usize);
        ts.next();
    }
    let mut datasets = Vec::new();
    while let Some(Token::Dataset(ds)) = ts.peek() {
        if *ds == DatasetToken::New {
            return Err(AppError::syntax("fit: `@+` is not a dataset"));
        }
        datasets.push(*ds);
        ts.next();
    }
    Ok(Command::Fit {
        max_iterations,
        datasets,
    })
}

/// `info what [> 'file' | >> 'file']`
fn parse_info(tail: &[Token]) -> Result<Command, AppError> {
    let (what, redirect) = match tail {
        [head @ .., Token::Greater, Token::Str(path)] => (
            head,
            Some(Redirect {
                mode: RedirectMode::Write,
                path: path.clone(),
            }),
        ),
        [head @ .., Token::Append, Token::Str(path)] => (
            head,
            Some(Redirect {
                mode: RedirectMode::Append,
                path: path.clone(),
            }),
        ),
        _ => (tail, None),
    };
    if what.is_empty() {
        return Err(AppError::syntax("info: argument expected"));
    }
    Ok(Command::Info {
        what: what.to_vec(),
        redirect,
    })
}

fn parse_redirect(ts: &mut TokenStream<'_>) -> Result<Option<Redirect>, AppError> {
    let mode = if ts.eat(&Token::Greater) {
        RedirectMode::Write
    } else if ts.eat(&Token::Append) {
        RedirectMode::Append
    } else {
        return Ok(None);
    };
    match ts.next() {
        Some(Token::Str(path)) => Ok(Some(Redirect {
            mode,
            path: path.clone(),
        })),
        _ => Err(AppError::syntax("quoted filename expected after redirection")),
    }
}

fn parse_set(ts: &mut TokenStream<'_>) -> Result<Command, AppError> {
    let key = match ts.next() {
        Some(Token::Name(k)) => k.clone(),
        _ => return Err(AppError::syntax("set: option name expected")),
    };
    ts.expect(&Token::Assign)?;
    let negative = ts.eat(&Token::Minus);
    let value = match ts.next() {
        Some(Token::Number(v)) => {
            let v = if negative { -*v } else { *v };
            v.to_string()
        }
        Some(Token::Name(n)) if !negative => n.clone(),
        Some(Token::Str(s)) if !negative => s.clone(),
        _ => return Err(AppError::syntax(format!("set {key}: value expected"))),
    };
    Ok(Command::Set { key, value })
}

fn parse_delete(ts: &mut TokenStream<'_>) -> Result<Command, AppError> {
    let mut targets = Vec::new();
    loop {
        match ts.next() {
            Some(Token::Func(name)) => targets.push(DeleteTarget::Function(name.clone())),
            Some(Token::Var(name)) => targets.push(DeleteTarget::Variable(name.clone())),
            Some(Token::Dataset(DatasetToken::Index(n))) => targets.push(DeleteTarget::Dataset(*n)),
            _ => return Err(AppError::syntax("delete: `%name`, `$name` or `@N` expected")),
        }
        if !ts.eat(&Token::Comma) {
            return Ok(Command::Delete(targets));
        }
    }
}
