use std::rc::Rc;

use tracing::debug;

use super::{Environment, call_closure};
use crate::LispError;
use crate::ast::{Closure, Value};

/// The macro bound to the head symbol of `ast`, if `ast` is a macro call
fn macro_for_call(ast: &Value, env: &Environment) -> Option<Rc<Closure>> {
    let Value::List(items, _) = ast else {
        return None;
    };
    let Some(Value::Symbol(name)) = items.first() else {
        return None;
    };
    match &env.lookup(name)? {
        Value::Function(closure, _) if closure.is_macro => Some(Rc::clone(closure)),
        _ => None,
    }
}

/// True if `ast` is a non-empty list whose head symbol is bound to a macro
pub fn is_macro_call(ast: &Value, env: &Environment) -> bool {
    macro_for_call(ast, env).is_some()
}

/// Expand macro calls at the head of `ast` until it is no longer one.
///
/// The macro receives its arguments unevaluated; its result replaces the call.
pub fn macroexpand(mut ast: Value, env: &Environment) -> Value {
    while let Some(closure) = macro_for_call(&ast, env) {
        debug!(form = %ast, "expanding macro");
        let args = ast
            .as_seq()
            .and_then(|items| items.get(1..))
            .unwrap_or_default();
        ast = call_closure(&closure, args);
    }
    ast
}

fn is_symbol(value: &Value, name: &str) -> bool {
    matches!(value, Value::Symbol(s) if s == name)
}

/// Rewrite a quasiquoted form into `cons`/`concat`/`quote` calls.
///
/// Lists and vectors are both rebuilt as lists.
pub fn quasiquote(ast: &Value) -> Value {
    match ast.as_seq() {
        Some(items) if !items.is_empty() => quasiquote_items(items),
        _ => Value::list(vec![Value::symbol("quote"), ast.clone()]),
    }
}

fn quasiquote_items(items: &[Value]) -> Value {
    let Some((head, rest)) = items.split_first() else {
        return Value::list(vec![Value::symbol("quote"), Value::list(vec![])]);
    };

    if is_symbol(head, "unquote") {
        return match rest {
            [form] => form.clone(),
            _ => LispError::arity("unquote", 1, rest.len()).into(),
        };
    }

    if let Some([marker, spliced @ ..]) = head.as_seq()
        && is_symbol(marker, "splice-unquote")
    {
        return match spliced {
            [form] => Value::list(vec![
                Value::symbol("concat"),
                form.clone(),
                quasiquote_items(rest),
            ]),
            _ => LispError::arity("splice-unquote", 1, spliced.len()).into(),
        };
    }

    Value::list(vec![
        Value::symbol("cons"),
        quasiquote(head),
        quasiquote_items(rest),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{sym, val};
    use crate::reader::read_str;

    fn read(input: &str) -> Value {
        match read_str(input) {
            Ok(Some(value)) => value,
            other => panic!("failed to read '{input}': {other:?}"),
        }
    }

    #[test]
    fn test_quasiquote_rewrites_data_driven() {
        // (quasiquoted form, expected rewrite)
        let test_cases = vec![
            ("a", "(quote a)"),
            ("7", "(quote 7)"),
            ("()", "(quote ())"),
            ("[]", "(quote [])"),
            ("(unquote x)", "x"),
            ("(1 (unquote x))", "(cons (quote 1) (cons x (quote ())))"),
            ("(1 ~x)", "(cons (quote 1) (cons x (quote ())))"),
            ("(~@xs 2)", "(concat xs (cons (quote 2) (quote ())))"),
            ("[a ~b]", "(cons (quote a) (cons b (quote ())))"),
            (
                "(a (b ~c))",
                "(cons (quote a) (cons (cons (quote b) (cons c (quote ()))) (quote ())))",
            ),
            // unquote in the tail position of a list unquotes the tail
            ("(a unquote b)", "(cons (quote a) b)"),
        ];

        for (i, (input, expected)) in test_cases.iter().enumerate() {
            assert_eq!(
                quasiquote(&read(input)),
                read(expected),
                "Quasiquote test #{} failed for '{input}'",
                i + 1
            );
        }
    }

    #[test]
    fn test_malformed_unquote_is_an_error_value() {
        assert!(quasiquote(&read("(unquote)")).is_error());
        assert!(quasiquote(&read("(unquote a b)")).is_error());
        let nested = quasiquote(&read("(1 (splice-unquote))"));
        // The error sits inside the rewritten form and surfaces when evaluated
        let Value::List(items, _) = &nested else {
            panic!("expected a list, got {nested:?}");
        };
        assert_eq!(items[0], sym("cons"));
        assert!(items[2].is_error());
    }

    #[test]
    fn test_macro_detection() {
        let env = Environment::new();
        let body = read("(list 'quote x)");
        let closure = Closure {
            params: vec!["x".to_owned()],
            body,
            env: env.clone(),
            is_macro: true,
        };
        env.set("m", Value::function(closure.clone()));
        env.set(
            "f",
            Value::function(Closure {
                is_macro: false,
                ..closure
            }),
        );

        assert!(is_macro_call(&read("(m 1)"), &env));
        assert!(!is_macro_call(&read("(f 1)"), &env));
        assert!(!is_macro_call(&read("(unbound 1)"), &env));
        assert!(!is_macro_call(&read("()"), &env));
        assert!(!is_macro_call(&read("m"), &env));
        assert!(!is_macro_call(&val([1, 2]), &env));
    }
}
