//! Tokenizer for query text, built on nom.
//!
//! ```text
//! q=(id).filter(created_at>=2024-01-31)
//!
//! Ident(q) Op(=) ( Ident(id) ) . Ident(filter) ( Ident(created_at) Op(>=) Date(2024-01-31) )
//! ```
//!
//! Whitespace between tokens is skipped. Every token carries its byte span so
//! the parser can point at the offending input.

use chrono::NaiveDate;
use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, take_while},
    character::complete::{char, digit1, satisfy},
    combinator::{map, opt, recognize},
    error::{ErrorKind, ParseError},
    sequence::{pair, tuple},
};

use crate::error::{TreeqlError, TreeqlResult};

/// Punctuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Bang,
    Star,
}

impl Symbol {
    pub fn as_char(&self) -> char {
        match self {
            Symbol::LParen => '(',
            Symbol::RParen => ')',
            Symbol::LBracket => '[',
            Symbol::RBracket => ']',
            Symbol::Comma => ',',
            Symbol::Dot => '.',
            Symbol::Bang => '!',
            Symbol::Star => '*',
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Date(NaiveDate),
    Str(String),
    /// Comparison operator: `=`, `!=`, `>`, `>=`, `<`, `<=`
    Op(&'static str),
    Symbol(Symbol),
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Ident(s) => write!(f, "'{}'", s),
            Token::Int(n) => write!(f, "number {}", n),
            Token::Float(n) => write!(f, "number {}", n),
            Token::Date(d) => write!(f, "date {}", d.format("%Y-%m-%d")),
            Token::Str(s) => write!(f, "string {:?}", s),
            Token::Op(op) => write!(f, "'{}'", op),
            Token::Symbol(sym) => write!(f, "'{}'", sym.as_char()),
        }
    }
}

/// A token with its byte span in the query text.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub start: usize,
    pub end: usize,
}

/// Lexer error: where it happened, and why when we know better than nom.
#[derive(Debug, PartialEq)]
struct LexError<'a> {
    input: &'a str,
    reason: Option<&'static str>,
}

impl<'a> LexError<'a> {
    fn fatal(input: &'a str, reason: &'static str) -> nom::Err<Self> {
        nom::Err::Failure(Self {
            input,
            reason: Some(reason),
        })
    }
}

impl<'a> ParseError<&'a str> for LexError<'a> {
    fn from_error_kind(input: &'a str, _kind: ErrorKind) -> Self {
        Self {
            input,
            reason: None,
        }
    }

    fn append(_input: &'a str, _kind: ErrorKind, other: Self) -> Self {
        other
    }
}

type LexResult<'a> = IResult<&'a str, Token, LexError<'a>>;

/// Split query text into tokens.
pub fn tokenize(input: &str) -> TreeqlResult<Vec<Spanned>> {
    let mut tokens = Vec::new();
    let mut rest = input.trim_start();

    while !rest.is_empty() {
        let start = input.len() - rest.len();
        match parse_token(rest) {
            Ok((next, token)) => {
                tokens.push(Spanned {
                    token,
                    start,
                    end: input.len() - next.len(),
                });
                rest = next.trim_start();
            }
            Err(nom::Err::Failure(e)) => {
                return Err(TreeqlError::syntax(
                    input.len() - e.input.len(),
                    e.reason.unwrap_or("malformed token"),
                ));
            }
            Err(_) => {
                let found = rest.chars().next().unwrap_or_default();
                return Err(TreeqlError::syntax(
                    start,
                    format!("unexpected character '{}'", found),
                ));
            }
        }
    }

    Ok(tokens)
}

fn parse_token(input: &str) -> LexResult<'_> {
    alt((
        parse_date,
        parse_number,
        parse_string,
        parse_operator,
        parse_symbol,
        parse_identifier,
    ))(input)
}

/// DATE: digits '-' digits '-' digits, checked against the calendar.
fn parse_date(input: &str) -> LexResult<'_> {
    let (rest, raw) = recognize(tuple((digit1, char('-'), digit1, char('-'), digit1)))(input)?;
    match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(date) => Ok((rest, Token::Date(date))),
        Err(_) => Err(LexError::fatal(input, "invalid date, expected YYYY-MM-DD")),
    }
}

/// NUMBER: optional sign, digits, optional fraction.
fn parse_number(input: &str) -> LexResult<'_> {
    let (rest, raw) = recognize(tuple((
        opt(char('-')),
        digit1,
        opt(pair(char('.'), digit1)),
    )))(input)?;

    if raw.contains('.') {
        match raw.parse::<f64>() {
            Ok(n) => Ok((rest, Token::Float(n))),
            Err(_) => Err(LexError::fatal(input, "malformed number")),
        }
    } else {
        match raw.parse::<i64>() {
            Ok(n) => Ok((rest, Token::Int(n))),
            Err(_) => Err(LexError::fatal(input, "integer out of range")),
        }
    }
}

/// Double-quoted string with `\"` and `\\` escapes.
fn parse_string(input: &str) -> LexResult<'_> {
    let (mut rest, _) = char('"')(input)?;
    let mut out = String::new();

    loop {
        let mut chars = rest.chars();
        match chars.next() {
            None => return Err(LexError::fatal(input, "unterminated string")),
            Some('"') => return Ok((chars.as_str(), Token::Str(out))),
            Some('\\') => match chars.next() {
                Some(escaped) => out.push(escaped),
                None => return Err(LexError::fatal(input, "unterminated string")),
            },
            Some(c) => out.push(c),
        }
        rest = chars.as_str();
    }
}

fn parse_operator(input: &str) -> LexResult<'_> {
    map(
        alt((
            tag(">="),
            tag("<="),
            tag("!="),
            tag(">"),
            tag("<"),
            tag("="),
        )),
        |op: &str| {
            Token::Op(match op {
                ">=" => ">=",
                "<=" => "<=",
                "!=" => "!=",
                ">" => ">",
                "<" => "<",
                _ => "=",
            })
        },
    )(input)
}

fn parse_symbol(input: &str) -> LexResult<'_> {
    map(
        alt((
            char('('),
            char(')'),
            char('['),
            char(']'),
            char(','),
            char('.'),
            char('!'),
            char('*'),
        )),
        |c| {
            Token::Symbol(match c {
                '(' => Symbol::LParen,
                ')' => Symbol::RParen,
                '[' => Symbol::LBracket,
                ']' => Symbol::RBracket,
                ',' => Symbol::Comma,
                '.' => Symbol::Dot,
                '!' => Symbol::Bang,
                _ => Symbol::Star,
            })
        },
    )(input)
}

/// CNAME: letter or underscore, then letters, digits, underscores.
fn parse_identifier(input: &str) -> LexResult<'_> {
    map(
        recognize(pair(
            satisfy(|c: char| c.is_ascii_alphabetic() || c == '_'),
            take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
        )),
        |s: &str| Token::Ident(s.to_string()),
    )(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(input: &str) -> Vec<Token> {
        tokenize(input).unwrap().into_iter().map(|t| t.token).collect()
    }

    fn ident(s: &str) -> Token {
        Token::Ident(s.to_string())
    }

    #[test]
    fn test_simple_query() {
        assert_eq!(
            kinds("q=(id, !comment)"),
            vec![
                ident("q"),
                Token::Op("="),
                Token::Symbol(Symbol::LParen),
                ident("id"),
                Token::Symbol(Symbol::Comma),
                Token::Symbol(Symbol::Bang),
                ident("comment"),
                Token::Symbol(Symbol::RParen),
            ]
        );
    }

    #[test]
    fn test_date_beats_number() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        assert_eq!(kinds("2024-01-31"), vec![Token::Date(date)]);
        assert_eq!(kinds("-12"), vec![Token::Int(-12)]);
        assert_eq!(kinds("3.5"), vec![Token::Float(3.5)]);
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds(">= <= != > < ="),
            vec![
                Token::Op(">="),
                Token::Op("<="),
                Token::Op("!="),
                Token::Op(">"),
                Token::Op("<"),
                Token::Op("="),
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds(r#""say \"hi\" \\ bye""#),
            vec![Token::Str(r#"say "hi" \ bye"#.to_string())]
        );
        assert_eq!(kinds(r#""a b, c""#), vec![Token::Str("a b, c".to_string())]);
    }

    #[test]
    fn test_spans() {
        let tokens = tokenize("q = (id)").unwrap();
        assert_eq!((tokens[1].start, tokens[1].end), (2, 3));
        assert_eq!((tokens[3].start, tokens[3].end), (5, 7));
    }

    #[test]
    fn test_invalid_date() {
        let err = tokenize("q=(id).filter(due=2024-13-45)").unwrap_err();
        match err {
            TreeqlError::Syntax { position, message } => {
                assert_eq!(position, 18);
                assert!(message.contains("invalid date"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize(r#"q=(id).filter(a="open"#).unwrap_err();
        assert!(err.to_string().contains("unterminated string"));
    }

    #[test]
    fn test_unexpected_character() {
        let err = tokenize("q=(id#)").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Syntax error at position 5: unexpected character '#'"
        );
    }
}
