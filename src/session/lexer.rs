//! Tokenizer shared by the command parser and the expression parser.

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    /// Identifier: letters, digits and `_`, not starting with a digit.
    Name(String),
    /// `%name`
    Func(String),
    /// `$name`
    Var(String),
    /// `@N`, `@+` or `@*`
    Dataset(DatasetToken),
    /// Single-quoted string.
    Str(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Dot,
    Tilde,
    Assign,
    PlusAssign,
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Less,
    Greater,
    LessEq,
    GreaterEq,
    EqEq,
    NotEq,
    Append,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetToken {
    Index(usize),
    New,
    All,
}

impl Token {
    pub fn describe(&self) -> String {
        match self {
            Token::Number(v) => format!("number {v}"),
            Token::Name(n) => format!("`{n}`"),
            Token::Func(n) => format!("`%{n}`"),
            Token::Var(n) => format!("`${n}`"),
            Token::Dataset(DatasetToken::Index(i)) => format!("`@{i}`"),
            Token::Dataset(DatasetToken::New) => "`@+`".to_string(),
            Token::Dataset(DatasetToken::All) => "`@*`".to_string(),
            Token::Str(s) => format!("'{s}'"),
            other => format!("`{}`", symbol(other)),
        }
    }
}

fn symbol(t: &Token) -> &'static str {
    match t {
        Token::LParen => "(",
        Token::RParen => ")",
        Token::LBracket => "[",
        Token::RBracket => "]",
        Token::Comma => ",",
        Token::Colon => ":",
        Token::Dot => ".",
        Token::Tilde => "~",
        Token::Assign => "=",
        Token::PlusAssign => "+=",
        Token::Plus => "+",
        Token::Minus => "-",
        Token::Star => "*",
        Token::Slash => "/",
        Token::Caret => "^",
        Token::Less => "<",
        Token::Greater => ">",
        Token::LessEq => "<=",
        Token::GreaterEq => ">=",
        Token::EqEq => "==",
        Token::NotEq => "!=",
        Token::Append => ">>",
        _ => "?",
    }
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Tokenize one statement (no `;` or comments expected here).
pub fn tokenize(input: &str) -> Result<Vec<Token>, AppError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                let mut j = i + 1;
                if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].is_ascii_digit() {
                    i = j;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let text: String = chars[start..i].iter().collect();
            let v = text
                .parse::<f64>()
                .map_err(|_| AppError::syntax(format!("invalid number `{text}`")))?;
            tokens.push(Token::Number(v));
            continue;
        }

        if is_name_start(c) {
            let start = i;
            while i < chars.len() && is_name_char(chars[i]) {
                i += 1;
            }
            tokens.push(Token::Name(chars[start..i].iter().collect()));
            continue;
        }

        match c {
            '%' | '$' => {
                let start = i + 1;
                i = start;
                while i < chars.len() && is_name_char(chars[i]) {
                    i += 1;
                }
                let name: String = chars[start..i].iter().collect();
                match (c, name.is_empty()) {
                    ('%', true) => return Err(AppError::syntax("function name expected after `%`")),
                    ('$', true) => return Err(AppError::syntax("variable name expected after `$`")),
                    ('%', false) => tokens.push(Token::Func(name)),
                    _ => tokens.push(Token::Var(name)),
                }
            }
            '@' => {
                i += 1;
                match chars.get(i) {
                    Some('+') => {
                        tokens.push(Token::Dataset(DatasetToken::New));
                        i += 1;
                    }
                    Some('*') => {
                        tokens.push(Token::Dataset(DatasetToken::All));
                        i += 1;
                    }
                    Some(d) if d.is_ascii_digit() => {
                        let start = i;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                        let text: String = chars[start..i].iter().collect();
                        let n = text
                            .parse::<usize>()
                            .map_err(|_| AppError::syntax(format!("invalid dataset `@{text}`")))?;
                        tokens.push(Token::Dataset(DatasetToken::Index(n)));
                    }
                    _ => return Err(AppError::syntax("dataset number expected after `@`")),
                }
            }
            '\'' => {
                let start = i + 1;
                let Some(len) = chars[start..].iter().position(|&ch| ch == '\'') else {
                    return Err(AppError::syntax("unterminated string"));
                };
                tokens.push(Token::Str(chars[start..start + len].iter().collect()));
                i = start + len + 1;
            }
            '+' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::PlusAssign);
                i += 2;
            }
            '>' | '<' | '=' | '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(match c {
                    '>' => Token::GreaterEq,
                    '<' => Token::LessEq,
                    '=' => Token::EqEq,
                    _ => Token::NotEq,
                });
                i += 2;
            }
            '>' if chars.get(i + 1) == Some(&'>') => {
                tokens.push(Token::Append);
                i += 2;
            }
            _ => {
                let t = match c {
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    ',' => Token::Comma,
                    ':' => Token::Colon,
                    '.' => Token::Dot,
                    '~' => Token::Tilde,
                    '=' => Token::Assign,
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '/' => Token::Slash,
                    '^' => Token::Caret,
                    '<' => Token::Less,
                    '>' => Token::Greater,
                    other => return Err(AppError::syntax(format!("unexpected character `{other}`"))),
                };
                tokens.push(t);
                i += 1;
            }
        }
    }

    Ok(tokens)
}

/// Split a line into statements on `;` and drop `#` comments (quotes respected).
pub fn split_statements(line: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut in_str = false;
    for c in line.chars() {
        match c {
            '\'' => {
                in_str = !in_str;
                cur.push(c);
            }
            '#' if !in_str => break,
            ';' if !in_str => {
                out.push(std::mem::take(&mut cur));
            }
            _ => cur.push(c),
        }
    }
    out.push(cur);
    out.into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Cursor over a token slice, used by both parsers.
#[derive(Debug)]
pub struct TokenStream<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> TokenStream<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    pub fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    pub fn peek_at(&self, offset: usize) -> Option<&'a Token> {
        self.tokens.get(self.pos + offset)
    }

    pub fn next(&mut self) -> Option<&'a Token> {
        let t = self.tokens.get(self.pos);
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Consume `expected` if it is next.
    pub fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub fn expect(&mut self, expected: &Token) -> Result<(), AppError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.unexpected(&expected.describe()))
        }
    }

    pub fn expect_end(&self) -> Result<(), AppError> {
        match self.peek() {
            None => Ok(()),
            Some(t) => Err(AppError::syntax(format!("unexpected {} at end of statement", t.describe()))),
        }
    }

    pub fn unexpected(&self, wanted: &str) -> AppError {
        match self.peek() {
            Some(t) => AppError::syntax(format!("expected {wanted}, found {}", t.describe())),
            None => AppError::syntax(format!("expected {wanted}, found end of statement")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_load_command() {
        let t = tokenize("@0 < 'nacl01.dat'").unwrap();
        assert_eq!(
            t,
            vec![
                Token::Dataset(DatasetToken::Index(0)),
                Token::Less,
                Token::Str("nacl01.dat".to_string()),
            ]
        );
    }

    #[test]
    fn tokenizes_param_reference_and_numbers() {
        let t = tokenize("%g.center * 1.5e-3 + .5").unwrap();
        assert_eq!(t[0], Token::Func("g".to_string()));
        assert_eq!(t[1], Token::Dot);
        assert_eq!(t[2], Token::Name("center".to_string()));
        assert_eq!(t[4], Token::Number(1.5e-3));
        assert_eq!(t[6], Token::Number(0.5));
    }

    #[test]
    fn compound_operators() {
        let t = tokenize("F += %a; info >> 'x'").unwrap_err();
        assert!(t.to_string().contains(';'));
        let t = tokenize("F += %a").unwrap();
        assert_eq!(t[1], Token::PlusAssign);
        assert_eq!(tokenize("info x >> 'f'").unwrap()[2], Token::Append);
    }

    #[test]
    fn variables_and_comparisons() {
        let t = tokenize("A = x >= $lo and y != 0").unwrap();
        assert_eq!(t[0], Token::Name("A".to_string()));
        assert_eq!(t[1], Token::Assign);
        assert_eq!(t[3], Token::GreaterEq);
        assert_eq!(t[4], Token::Var("lo".to_string()));
        assert_eq!(t[7], Token::NotEq);
        assert_eq!(tokenize("a <= b == c").unwrap()[1], Token::LessEq);
        assert_eq!(tokenize("a <= b == c").unwrap()[3], Token::EqEq);
        assert!(tokenize("$ = 1").is_err());
        assert!(tokenize("a ! b").is_err());
    }

    #[test]
    fn splits_statements_outside_quotes() {
        let s = split_statements("use @1; title = 'a;b' # note; not a statement");
        assert_eq!(s, vec!["use @1".to_string(), "title = 'a;b'".to_string()]);
        assert!(split_statements("   # only comment").is_empty());
    }

    #[test]
    fn unterminated_string_is_syntax_error() {
        assert!(tokenize("@0 < 'abc").is_err());
    }
}
