//! Weave tokenizer built on nom
//!
//! ```ebnf
//! token      = number | string | identifier | symbol;
//! number     = digit, {digit}, [".", digit, {digit}], [("e" | "E"), ["+" | "-"], digit, {digit}];
//! string     = '"', {char | escape}, '"';
//! escape     = "\", ('"' | "\" | "n" | "r" | "t");
//! identifier = (letter | "_"), {letter | digit | "_"};
//! trivia     = whitespace | "//" line | "/*" ... "*/";
//! ```

use nom::{
    branch::alt,
    bytes::complete::{tag, take_until},
    character::complete::{alpha1, alphanumeric1, char, digit1, multispace1, not_line_ending, one_of},
    combinator::{opt, recognize},
    error::{Error, ErrorKind},
    multi::{many0, many0_count},
    sequence::{delimited, pair, tuple},
    IResult,
};

use super::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Symbol(&'static str),
    Eof,
}

/// Token with the 1-based position of its first character
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
    pub column: usize,
}

// Longest first so `::` wins over `:`
const SYMBOLS: &[&str] = &[
    "::", "->", "==", "!=", "<=", ">=", "&&", "||", "{", "}", "(", ")", "[", "]", ";", ",", ".",
    ":", "=", "<", ">", "+", "-", "*", "/", "%", "!", "?",
];

fn line_comment(input: &str) -> IResult<&str, &str> {
    recognize(pair(tag("//"), not_line_ending))(input)
}

fn block_comment(input: &str) -> IResult<&str, &str> {
    recognize(delimited(tag("/*"), take_until("*/"), tag("*/")))(input)
}

fn trivia(input: &str) -> IResult<&str, usize> {
    many0_count(alt((multispace1, line_comment, block_comment)))(input)
}

fn number(input: &str) -> IResult<&str, Token> {
    let (rest, text) = recognize(tuple((
        digit1,
        opt(pair(char('.'), digit1)),
        opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
    )))(input)?;

    let token = if text.contains(['.', 'e', 'E']) {
        text.parse::<f64>().map(Token::Float).ok()
    } else {
        text.parse::<i64>().map(Token::Int).ok()
    };
    match token {
        Some(token) => Ok((rest, token)),
        None => Err(nom::Err::Failure(Error::new(input, ErrorKind::Digit))),
    }
}

fn string_literal(input: &str) -> IResult<&str, Token> {
    let (mut rest, _) = char('"')(input)?;
    let mut value = String::new();
    loop {
        let mut chars = rest.chars();
        match chars.next() {
            None => return Err(nom::Err::Failure(Error::new(input, ErrorKind::Char))),
            Some('"') => return Ok((chars.as_str(), Token::Str(value))),
            Some('\\') => {
                let escaped = match chars.next() {
                    Some('"') => '"',
                    Some('\\') => '\\',
                    Some('n') => '\n',
                    Some('r') => '\r',
                    Some('t') => '\t',
                    _ => return Err(nom::Err::Failure(Error::new(rest, ErrorKind::Escaped))),
                };
                value.push(escaped);
            }
            Some(c) => value.push(c),
        }
        rest = chars.as_str();
    }
}

fn identifier(input: &str) -> IResult<&str, Token> {
    let (rest, text) = recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    ))(input)?;
    Ok((rest, Token::Ident(text.to_string())))
}

fn symbol(input: &str) -> IResult<&str, Token> {
    SYMBOLS
        .iter()
        .find_map(|&sym| input.strip_prefix(sym).map(|rest| (rest, Token::Symbol(sym))))
        .ok_or_else(|| nom::Err::Error(Error::new(input, ErrorKind::Tag)))
}

fn token(input: &str) -> IResult<&str, Token> {
    alt((number, string_literal, identifier, symbol))(input)
}

/// Running line/column tracker
struct Cursor {
    line: usize,
    column: usize,
}

impl Cursor {
    fn advance(&mut self, consumed: &str) {
        for c in consumed.chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }
}

/// Split source text into tokens, ending with `Token::Eof`
pub fn tokenize(source: &str) -> Result<Vec<Spanned>, ParseError> {
    let mut tokens = Vec::new();
    let mut cursor = Cursor { line: 1, column: 1 };
    let mut rest = source;

    loop {
        if let Ok((after, _)) = trivia(rest) {
            cursor.advance(&rest[..rest.len() - after.len()]);
            rest = after;
        }
        if rest.is_empty() {
            break;
        }
        if rest.starts_with("/*") {
            return Err(ParseError::new(
                cursor.line,
                cursor.column,
                "unterminated block comment",
            ));
        }

        match token(rest) {
            Ok((after, token)) => {
                tokens.push(Spanned {
                    token,
                    line: cursor.line,
                    column: cursor.column,
                });
                cursor.advance(&rest[..rest.len() - after.len()]);
                rest = after;
            }
            Err(_) => {
                let message = match rest.chars().next() {
                    Some('"') => "unterminated or malformed string literal".to_string(),
                    Some(c) if c.is_ascii_digit() => "numeric literal out of range".to_string(),
                    Some(c) => format!("unexpected character '{c}'"),
                    None => "unexpected end of input".to_string(),
                };
                return Err(ParseError::new(cursor.line, cursor.column, message));
            }
        }
    }

    tokens.push(Spanned {
        token: Token::Eof,
        line: cursor.line,
        column: cursor.column,
    });
    Ok(tokens)
}
