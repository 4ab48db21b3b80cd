//! Recursive-descent reader turning source text into [`Value`] trees.
//!
//! Reader macros are resolved here: `'x`, `` `x ``, `~x`, `~@x` and `@x` become
//! `(quote x)`, `(quasiquote x)`, `(unquote x)`, `(splice-unquote x)` and
//! `(deref x)`, and `^M F` becomes `(with-meta F M)`.

mod tokenizer;

pub use tokenizer::tokenize;

use crate::MAX_PARSE_DEPTH;
use crate::ast::{HashMapType, KEYWORD_MARKER, Value, insert_pairs};
use crate::{ErrorKind, LispError};

/// Cursor over a token list
struct Reader<'a> {
    tokens: Vec<&'a str>,
    position: usize,
}

impl<'a> Reader<'a> {
    fn new(tokens: Vec<&'a str>) -> Self {
        Reader {
            tokens,
            position: 0,
        }
    }

    fn peek(&self) -> Option<&'a str> {
        self.tokens.get(self.position).copied()
    }

    fn next(&mut self) -> Option<&'a str> {
        let token = self.peek();
        self.position += 1;
        token
    }

    fn read_form(&mut self, depth: usize) -> Result<Value, LispError> {
        if depth >= MAX_PARSE_DEPTH {
            return Err(parse_error(format!(
                "Expression too deeply nested (max depth: {MAX_PARSE_DEPTH})"
            )));
        }

        let Some(token) = self.next() else {
            return Err(parse_error("Unexpected end of input"));
        };

        match token {
            "(" => Ok(Value::list(self.read_sequence(")", depth)?)),
            "[" => Ok(Value::vector(self.read_sequence("]", depth)?)),
            "{" => {
                let items = self.read_sequence("}", depth)?;
                let mut map = HashMapType::new();
                insert_pairs(&mut map, &items)?;
                Ok(Value::from(map))
            }
            ")" | "]" | "}" => Err(parse_error(format!("Unexpected '{token}'"))),
            "^" => {
                let meta = self.read_form(depth + 1)?;
                let target = self.read_form(depth + 1)?;
                Ok(Value::list(vec![Value::symbol("with-meta"), target, meta]))
            }
            _ => match reader_macro(token) {
                Some(name) => {
                    let form = self.read_form(depth + 1)?;
                    Ok(Value::list(vec![Value::symbol(name), form]))
                }
                None => read_atom(token),
            },
        }
    }

    /// Read forms up to and including `closer`
    fn read_sequence(&mut self, closer: &str, depth: usize) -> Result<Vec<Value>, LispError> {
        let mut items = Vec::new();
        loop {
            match self.peek() {
                None => {
                    return Err(LispError::new(
                        ErrorKind::PAREN,
                        "Missing closing parenthesis",
                    ));
                }
                Some(token) if token == closer => {
                    self.position += 1;
                    return Ok(items);
                }
                Some(_) => items.push(self.read_form(depth + 1)?),
            }
        }
    }
}

fn parse_error(message: impl Into<String>) -> LispError {
    LispError::new(ErrorKind::PARSE, message.into())
}

fn reader_macro(token: &str) -> Option<&'static str> {
    match token {
        "'" => Some("quote"),
        "`" => Some("quasiquote"),
        "~" => Some("unquote"),
        "~@" => Some("splice-unquote"),
        "@" => Some("deref"),
        _ => None,
    }
}

fn is_integer(token: &str) -> bool {
    let digits = token.strip_prefix('-').unwrap_or(token);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

fn read_atom(token: &str) -> Result<Value, LispError> {
    if is_integer(token) {
        return token
            .parse()
            .map(Value::Integer)
            .map_err(|_| parse_error(format!("Integer literal out of range: '{token}'")));
    }
    if let Some(body) = token.strip_prefix('"') {
        return read_string(body).map(Value::String);
    }
    if token.starts_with(KEYWORD_MARKER) {
        return Ok(Value::Keyword(token.to_owned()));
    }
    Ok(match token {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "nil" => Value::Nil,
        _ => Value::Symbol(token.to_owned()),
    })
}

/// Resolve escapes in a string token whose opening quote has been stripped
fn read_string(body: &str) -> Result<String, LispError> {
    let mut result = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '"' => return Ok(result),
            '\\' => match chars.next() {
                Some('n') => result.push('\n'),
                Some('"') => result.push('"'),
                Some('\\') => result.push('\\'),
                Some(other) => {
                    result.push('\\');
                    result.push(other);
                }
                None => break,
            },
            c => result.push(c),
        }
    }
    Err(parse_error("expected '\"', got EOF"))
}

/// Read the first form of `input`.
///
/// Returns `Ok(None)` when the input holds no form at all (empty or comment-only).
/// Tokens after the first complete form are ignored.
pub fn read_str(input: &str) -> Result<Option<Value>, LispError> {
    let mut reader = Reader::new(tokenize(input));
    if reader.peek().is_none() {
        return Ok(None);
    }
    reader.read_form(0).map(Some)
}
