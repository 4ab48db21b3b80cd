use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{is_not, tag, take_while, take_while1},
    character::complete::{anychar, char, one_of},
    combinator::{opt, recognize, value},
    multi::many0,
    sequence::{pair, preceded},
};

/// Single-character tokens
const SPECIAL_CHARS: &str = "[]{}()'`~^@";

/// Characters that end an atom token
const ATOM_DELIMITERS: &str = "[]{}()'\"`,;";

/// Whitespace and commas both separate tokens
fn is_separator(c: char) -> bool {
    c.is_whitespace() || c == ','
}

fn separators(input: &str) -> IResult<&str, &str> {
    take_while(is_separator).parse(input)
}

/// A double-quoted string, escapes kept verbatim; the closing quote may be missing
fn string_token(input: &str) -> IResult<&str, &str> {
    recognize((
        char('"'),
        many0(alt((
            recognize(pair(char('\\'), anychar)),
            is_not("\\\""),
            tag("\\"),
        ))),
        opt(char('"')),
    ))
    .parse(input)
}

fn comment(input: &str) -> IResult<&str, &str> {
    recognize(pair(char(';'), take_while(|c: char| c != '\n'))).parse(input)
}

fn atom(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| !is_separator(c) && !ATOM_DELIMITERS.contains(c)).parse(input)
}

/// Next token after any separators; comments yield `None`
fn token(input: &str) -> IResult<&str, Option<&str>> {
    preceded(
        separators,
        alt((
            value(None, comment),
            tag("~@").map(Some),
            recognize(one_of(SPECIAL_CHARS)).map(Some),
            string_token.map(Some),
            atom.map(Some),
        )),
    )
    .parse(input)
}

/// Split source text into tokens, dropping separators and comments
pub fn tokenize(input: &str) -> Vec<&str> {
    match many0(token).parse(input) {
        Ok((_, tokens)) => tokens.into_iter().flatten().collect(),
        Err(_) => Vec::new(),
    }
}
