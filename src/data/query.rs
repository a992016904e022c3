/// Row-filter predicates over spectrum table columns
///
/// Supports the subset of pandas `DataFrame.query` syntax used in plot
/// configurations, e.g. `Z==0 & X_PPM > 8 & X_PPM < 9`. `&`/`|` bind looser
/// than comparisons, and comparisons may be chained (`8 < X_PPM < 9`).

use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("query syntax error at column {position}: {message}")]
    Syntax { position: usize, message: String },
    #[error("query references column '{column}' which is not in the table (available: {})", .available.join(", "))]
    FilterColumn {
        column: String,
        available: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn apply(self, a: f64, b: f64) -> bool {
        match self {
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
            CmpOp::Lt => a < b,
            CmpOp::Le => a <= b,
            CmpOp::Gt => a > b,
            CmpOp::Ge => a >= b,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

/// Expression tree. `C` is the column reference: a name before binding,
/// a column position after.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr<C> {
    Number(f64),
    Column(C),
    Neg(Box<Expr<C>>),
    Not(Box<Expr<C>>),
    And(Box<Expr<C>>, Box<Expr<C>>),
    Or(Box<Expr<C>>, Box<Expr<C>>),
    Compare {
        first: Box<Expr<C>>,
        rest: Vec<(CmpOp, Expr<C>)>,
    },
}

impl<C> Expr<C> {
    fn try_map<D, E>(self, f: &mut impl FnMut(C) -> Result<D, E>) -> Result<Expr<D>, E> {
        Ok(match self {
            Expr::Number(v) => Expr::Number(v),
            Expr::Column(c) => Expr::Column(f(c)?),
            Expr::Neg(e) => Expr::Neg(Box::new(e.try_map(f)?)),
            Expr::Not(e) => Expr::Not(Box::new(e.try_map(f)?)),
            Expr::And(a, b) => Expr::And(Box::new(a.try_map(f)?), Box::new(b.try_map(f)?)),
            Expr::Or(a, b) => Expr::Or(Box::new(a.try_map(f)?), Box::new(b.try_map(f)?)),
            Expr::Compare { first, rest } => Expr::Compare {
                first: Box::new(first.try_map(f)?),
                rest: rest
                    .into_iter()
                    .map(|(op, e)| Ok((op, e.try_map(f)?)))
                    .collect::<Result<_, E>>()?,
            },
        })
    }

    fn visit_columns<'a>(&'a self, out: &mut Vec<&'a C>) {
        match self {
            Expr::Number(_) => {}
            Expr::Column(c) => out.push(c),
            Expr::Neg(e) | Expr::Not(e) => e.visit_columns(out),
            Expr::And(a, b) | Expr::Or(a, b) => {
                a.visit_columns(out);
                b.visit_columns(out);
            }
            Expr::Compare { first, rest } => {
                first.visit_columns(out);
                for (_, e) in rest {
                    e.visit_columns(out);
                }
            }
        }
    }
}

impl Expr<usize> {
    /// Evaluate numerically; booleans are 1.0 / 0.0 and any non-zero value
    /// is true in a boolean context.
    fn eval(&self, value: &impl Fn(usize) -> f64) -> f64 {
        let truth = |b: bool| if b { 1.0 } else { 0.0 };
        match self {
            Expr::Number(v) => *v,
            Expr::Column(c) => value(*c),
            Expr::Neg(e) => -e.eval(value),
            Expr::Not(e) => truth(e.eval(value) == 0.0),
            Expr::And(a, b) => truth(a.eval(value) != 0.0 && b.eval(value) != 0.0),
            Expr::Or(a, b) => truth(a.eval(value) != 0.0 || b.eval(value) != 0.0),
            Expr::Compare { first, rest } => {
                let mut lhs = first.eval(value);
                for (op, e) in rest {
                    let rhs = e.eval(value);
                    if !op.apply(lhs, rhs) {
                        return 0.0;
                    }
                    lhs = rhs;
                }
                1.0
            }
        }
    }
}

impl fmt::Display for Expr<String> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(v) => write!(f, "{}", v),
            Expr::Column(c) => write!(f, "{}", c),
            Expr::Neg(e) => write!(f, "-({})", e),
            Expr::Not(e) => write!(f, "~({})", e),
            Expr::And(a, b) => write!(f, "({} & {})", a, b),
            Expr::Or(a, b) => write!(f, "({} | {})", a, b),
            Expr::Compare { first, rest } => {
                write!(f, "{}", first)?;
                for (op, e) in rest {
                    write!(f, " {} {}", op.symbol(), e)?;
                }
                Ok(())
            }
        }
    }
}

/// A parsed row filter, not yet tied to a table.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    source: String,
    expr: Expr<String>,
}

/// A predicate whose column names have been resolved to column positions.
#[derive(Debug, Clone)]
pub struct BoundPredicate {
    expr: Expr<usize>,
}

impl Predicate {
    pub fn parse(source: &str) -> Result<Self, QueryError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            end: source.len(),
        };
        let expr = parser.parse_or()?;
        if let Some((tok, at)) = parser.tokens.get(parser.pos) {
            return Err(QueryError::Syntax {
                position: *at,
                message: format!("unexpected {}", tok),
            });
        }
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Distinct column names referenced, in first-use order
    pub fn columns(&self) -> Vec<&str> {
        let mut refs = Vec::new();
        self.expr.visit_columns(&mut refs);
        let mut names: Vec<&str> = Vec::new();
        for r in refs {
            if !names.contains(&r.as_str()) {
                names.push(r.as_str());
            }
        }
        names
    }

    /// Resolve column names against a table's column list.
    pub fn bind(&self, available: &[&str]) -> Result<BoundPredicate, QueryError> {
        let expr = self.expr.clone().try_map(&mut |name: String| {
            available
                .iter()
                .position(|c| *c == name)
                .ok_or_else(|| QueryError::FilterColumn {
                    column: name,
                    available: available.iter().map(|c| c.to_string()).collect(),
                })
        })?;
        Ok(BoundPredicate { expr })
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)
    }
}

impl BoundPredicate {
    /// `value(column)` must return the row's value for a bound column position.
    pub fn matches(&self, value: impl Fn(usize) -> f64) -> bool {
        self.expr.eval(&value) != 0.0
    }
}

// ── Tokenizer ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Cmp(CmpOp),
    And,
    Or,
    Not,
    Minus,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(v) => write!(f, "number {}", v),
            Token::Ident(s) => write!(f, "name '{}'", s),
            Token::Cmp(op) => write!(f, "'{}'", op.symbol()),
            Token::And => write!(f, "'&'"),
            Token::Or => write!(f, "'|'"),
            Token::Not => write!(f, "'~'"),
            Token::Minus => write!(f, "'-'"),
            Token::LParen => write!(f, "'('"),
            Token::RParen => write!(f, "')'"),
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<(Token, usize)>, QueryError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    let syntax = |position: usize, message: String| QueryError::Syntax { position, message };

    while i < bytes.len() {
        let c = bytes[i];
        let start = i;
        match c {
            b' ' | b'\t' | b'\n' | b'\r' => {
                i += 1;
                continue;
            }
            b'(' => {
                tokens.push((Token::LParen, start));
                i += 1;
            }
            b')' => {
                tokens.push((Token::RParen, start));
                i += 1;
            }
            b'&' => {
                i += if bytes.get(i + 1) == Some(&b'&') { 2 } else { 1 };
                tokens.push((Token::And, start));
            }
            b'|' => {
                i += if bytes.get(i + 1) == Some(&b'|') { 2 } else { 1 };
                tokens.push((Token::Or, start));
            }
            b'~' => {
                tokens.push((Token::Not, start));
                i += 1;
            }
            b'-' => {
                tokens.push((Token::Minus, start));
                i += 1;
            }
            b'=' | b'!' | b'<' | b'>' => {
                let next_eq = bytes.get(i + 1) == Some(&b'=');
                let op = match (c, next_eq) {
                    (b'=', true) => CmpOp::Eq,
                    (b'!', true) => CmpOp::Ne,
                    (b'<', true) => CmpOp::Le,
                    (b'>', true) => CmpOp::Ge,
                    (b'<', false) => CmpOp::Lt,
                    (b'>', false) => CmpOp::Gt,
                    (b'=', false) => {
                        return Err(syntax(start, "'=' is not a comparison, use '=='".into()))
                    }
                    _ => {
                        tokens.push((Token::Not, start));
                        i += 1;
                        continue;
                    }
                };
                tokens.push((Token::Cmp(op), start));
                i += if next_eq { 2 } else { 1 };
            }
            b'0'..=b'9' | b'.' => {
                while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                    i += 1;
                }
                // exponent: e, E followed by optional sign and digits
                if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
                    let mut j = i + 1;
                    if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
                        j += 1;
                    }
                    if j < bytes.len() && bytes[j].is_ascii_digit() {
                        while j < bytes.len() && bytes[j].is_ascii_digit() {
                            j += 1;
                        }
                        i = j;
                    }
                }
                let text = &source[start..i];
                let value: f64 = text
                    .parse()
                    .map_err(|_| syntax(start, format!("invalid number '{}'", text)))?;
                tokens.push((Token::Number(value), start));
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                let word = &source[start..i];
                let tok = match word {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "True" => Token::Number(1.0),
                    "False" => Token::Number(0.0),
                    _ => Token::Ident(word.to_string()),
                };
                tokens.push((tok, start));
            }
            _ => {
                let ch = source[start..].chars().next().unwrap_or('?');
                return Err(syntax(start, format!("unexpected character '{}'", ch)));
            }
        }
    }
    Ok(tokens)
}

// ── Parser ─────────────────────────────────────────────────────────

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn position(&self) -> usize {
        self.tokens.get(self.pos).map(|(_, p)| *p).unwrap_or(self.end)
    }

    fn error(&self, message: impl Into<String>) -> QueryError {
        QueryError::Syntax {
            position: self.position(),
            message: message.into(),
        }
    }

    fn parse_or(&mut self) -> Result<Expr<String>, QueryError> {
        let mut lhs = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr<String>, QueryError> {
        let mut lhs = self.parse_not()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let rhs = self.parse_not()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr<String>, QueryError> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            let inner = self.parse_not()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> Result<Expr<String>, QueryError> {
        let first = self.parse_operand()?;
        let mut rest = Vec::new();
        while let Some(Token::Cmp(op)) = self.peek() {
            let op = *op;
            self.pos += 1;
            rest.push((op, self.parse_operand()?));
        }
        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare {
                first: Box::new(first),
                rest,
            })
        }
    }

    fn parse_operand(&mut self) -> Result<Expr<String>, QueryError> {
        let Some(tok) = self.peek().cloned() else {
            return Err(self.error("unexpected end of query"));
        };
        self.pos += 1;
        match tok {
            Token::Number(v) => Ok(Expr::Number(v)),
            Token::Ident(name) => Ok(Expr::Column(name)),
            Token::Minus => Ok(Expr::Neg(Box::new(self.parse_operand()?))),
            Token::LParen => {
                let inner = self.parse_or()?;
                if self.peek() != Some(&Token::RParen) {
                    return Err(self.error("expected ')'"));
                }
                self.pos += 1;
                Ok(inner)
            }
            other => {
                self.pos -= 1;
                Err(self.error(format!("expected a value, found {}", other)))
            }
        }
    }
}
