//! Serialization of values back to text.
//!
//! In readable mode strings are escaped and quoted so that the output can be fed
//! back to the reader; in display mode they are emitted literally.
//!
//! Nesting beyond [`MAX_PRINT_DEPTH`] is elided as `...`, which also bounds the
//! output for an atom that contains itself.

use crate::MAX_PARSE_DEPTH;
use crate::ast::Value;

/// Deepest nesting printed in full; deeper output could not be read back anyway
pub const MAX_PRINT_DEPTH: usize = MAX_PARSE_DEPTH;

const ELISION: &str = "...";

/// Print `value`, escaping strings when `readably` is set
pub fn pr_str(value: &Value, readably: bool) -> String {
    let mut out = String::new();
    write_value(&mut out, value, readably, 0);
    out
}

/// Print each value and join the results with `separator`
pub fn pr_seq<'a>(
    values: impl IntoIterator<Item = &'a Value>,
    readably: bool,
    separator: &str,
) -> String {
    let mut out = String::new();
    for (i, value) in values.into_iter().enumerate() {
        if i > 0 {
            out.push_str(separator);
        }
        write_value(&mut out, value, readably, 0);
    }
    out
}

fn write_value(out: &mut String, value: &Value, readably: bool, depth: usize) {
    let nested = matches!(
        value,
        Value::List(..) | Value::Vector(..) | Value::HashMap(..) | Value::Atom(..)
    );
    if nested && depth >= MAX_PRINT_DEPTH {
        out.push_str(ELISION);
        return;
    }
    let depth = depth + 1;
    match value {
        Value::Nil => out.push_str("nil"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Integer(n) => out.push_str(&n.to_string()),
        Value::String(s) if readably => write_escaped(out, s),
        Value::String(s) => out.push_str(s),
        Value::Symbol(name) | Value::Keyword(name) => out.push_str(name),
        Value::List(items, _) => write_sequence(out, items, readably, depth, ('(', ')')),
        Value::Vector(items, _) => write_sequence(out, items, readably, depth, ('[', ']')),
        Value::HashMap(map, _) => {
            out.push('{');
            for (i, (key, val)) in map.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                write_value(out, &key.to_value(), readably, depth);
                out.push(' ');
                write_value(out, val, readably, depth);
            }
            out.push('}');
        }
        Value::Builtin(op, _) => {
            out.push_str("#<builtin:");
            out.push_str(op.name);
            out.push('>');
        }
        Value::Function(closure, _) if closure.is_macro => out.push_str("#<macro>"),
        Value::Function(..) => out.push_str("#<function>"),
        Value::Atom(cell, _) => {
            out.push_str("(atom ");
            write_value(out, &cell.borrow(), readably, depth);
            out.push(')');
        }
        Value::Error(err) => {
            out.push_str(err.kind.as_str());
            out.push_str(": ");
            write_value(out, &err.description, false, depth);
        }
        // A caught error is data: it prints as whatever was thrown
        Value::CaughtError(err) => write_value(out, &err.description, false, depth),
    }
}

fn write_sequence(
    out: &mut String,
    items: &[Value],
    readably: bool,
    depth: usize,
    (open, close): (char, char),
) {
    out.push(open);
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        write_value(out, item, readably, depth);
    }
    out.push(close);
}

fn write_escaped(out: &mut String, s: &str) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out.push('"');
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&pr_str(self, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::LispError;
    use crate::ast::{HashKey, HashMapType, nil, sym, val};
    use std::rc::Rc;

    #[test]
    fn test_printer_data_driven() {
        let mut map = HashMapType::new();
        map.insert(HashKey::Keyword(":a".to_owned()), val(1));
        map.insert(HashKey::String("b".to_owned()), val("x"));

        // (value, readable output, display output)
        let test_cases = vec![
            (nil(), "nil", "nil"),
            (val(true), "true", "true"),
            (val(-42), "-42", "-42"),
            (val("a\nb\"c\\"), r#""a\nb\"c\\""#, "a\nb\"c\\"),
            (sym("abc"), "abc", "abc"),
            (Value::keyword("kw"), ":kw", ":kw"),
            (val(vec![val(1), val("s"), nil()]), r#"(1 "s" nil)"#, "(1 s nil)"),
            (Value::vector(vec![val(1), val([2, 3])]), "[1 (2 3)]", "[1 (2 3)]"),
            (Value::list(vec![]), "()", "()"),
            (Value::from(map), r#"{"b" "x" :a 1}"#, "{b x :a 1}"),
            (Value::atom(val("v")), r#"(atom "v")"#, "(atom v)"),
        ];

        for (i, (value, readable, display)) in test_cases.iter().enumerate() {
            assert_eq!(pr_str(value, true), *readable, "Test case {} (readable)", i + 1);
            assert_eq!(pr_str(value, false), *display, "Test case {} (display)", i + 1);
        }
    }

    #[test]
    fn test_error_printing() {
        let err = LispError::new(ErrorKind::SYMBOL, "Symbol value is void: 'abc'");
        assert_eq!(
            pr_str(&Value::from(err.clone()), true),
            "SymbolError: Symbol value is void: 'abc'"
        );
        assert_eq!(
            pr_str(&Value::CaughtError(Rc::new(err)), true),
            "Symbol value is void: 'abc'"
        );

        let thrown = LispError::user(val([1, 2, 3]));
        assert_eq!(pr_str(&Value::CaughtError(Rc::new(thrown)), true), "(1 2 3)");
    }

    #[test]
    fn test_pr_seq() {
        let values = [val("a"), val(1), Value::keyword("k")];
        assert_eq!(pr_seq(&values, true, " "), r#""a" 1 :k"#);
        assert_eq!(pr_seq(&values, false, ""), "a1:k");
        assert_eq!(pr_seq(&Vec::<Value>::new(), true, " "), "");
    }

    #[test]
    fn test_deep_nesting_is_elided() {
        let mut value = val(1);
        for _ in 0..MAX_PRINT_DEPTH {
            value = Value::list(vec![value]);
        }
        let full = pr_str(&value, true);
        assert!(full.ends_with(&format!("1{}", ")".repeat(MAX_PRINT_DEPTH))));

        let deeper = Value::vector(vec![value]);
        let printed = pr_str(&deeper, true);
        assert!(printed.starts_with("[(("));
        assert!(printed.contains("(...)"), "innermost list should be elided");
        assert!(!printed.contains('1'));

        let mut very_deep = Value::Nil;
        for _ in 0..100_000 {
            very_deep = Value::list(vec![very_deep]);
        }
        assert_eq!(pr_str(&very_deep, false).len(), 2 * MAX_PRINT_DEPTH + ELISION.len());
    }

    #[test]
    fn test_self_referencing_atom_prints() {
        let atom = Value::atom(nil());
        if let Value::Atom(cell, _) = &atom {
            *cell.borrow_mut() = atom.clone();
        }
        let printed = pr_str(&atom, true);
        assert!(printed.starts_with("(atom (atom "));
        assert!(printed.contains(ELISION));

        // Break the cycle so the cell is released
        if let Value::Atom(cell, _) = &atom {
            *cell.borrow_mut() = nil();
        }
    }
}
