//! Built-in operations registry.
//!
//! Every native function is described once in [`BUILTIN_OPS`] with its name, its
//! arity and its implementation. [`create_global_env`] binds all of them in a fresh
//! root environment and then loads the prelude.
//!
//! ## Calling Convention
//!
//! Natives receive already evaluated arguments plus the caller's environment and
//! return `Result<Value, LispError>`. Arity is checked by [`BuiltinOp::call`]
//! before the implementation runs; an `Err` is turned into an error value by the
//! evaluator, so natives use `?` freely.
//!
//! ```lisp
//! (+ 1 2 3)                 ; => 6
//! (/ -7 2)                  ; => -4, floor division
//! (assoc {:a 1} :b 2)       ; => {:a 1 :b 2}
//! (swap! counter + 1)       ; calls back into the evaluator
//! ```
//!
//! ## Adding New Operations
//!
//! 1. **Implement the function** following the signature [`NativeFn`]
//! 2. **Add to BUILTIN_OPS** with its name and arity
//! 3. **Add tests** covering edge cases and error conditions

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::io::{self, Write};
use std::sync::LazyLock;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::ast::{HashKey, HashMapType, NumberType, Value, insert_pairs};
use crate::evaluator::{Environment, apply_function, eval};
use crate::printer::{pr_seq, pr_str};
use crate::reader::read_str;
use crate::{ErrorKind, LispError, prelude};

/// Signature shared by all native functions
pub type NativeFn = fn(&[Value], &Environment) -> Result<Value, LispError>;

/// Number of arguments accepted by a native function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly n arguments
    Exact(usize),
    /// At least n arguments
    AtLeast(usize),
    /// Between min and max arguments (inclusive)
    Range(usize, usize),
    /// Any number of arguments
    Any,
}

impl Arity {
    pub fn validate(&self, name: &str, count: usize) -> Result<(), LispError> {
        let ok = match *self {
            Arity::Exact(n) => count == n,
            Arity::AtLeast(n) => count >= n,
            Arity::Range(min, max) => (min..=max).contains(&count),
            Arity::Any => true,
        };
        if ok {
            Ok(())
        } else {
            Err(LispError::arity(name, self, count))
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
            Arity::Range(min, max) => write!(f, "{min}-{max}"),
            Arity::Any => write!(f, "any number of"),
        }
    }
}

/// Definition of a built-in operation
#[derive(Debug, Clone)]
pub struct BuiltinOp {
    /// The name the operation is bound to in the global environment
    pub name: &'static str,
    /// Expected number of arguments
    pub arity: Arity,
    pub func: NativeFn,
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        // Names uniquely identify operations
        self.name == other.name
    }
}

impl BuiltinOp {
    /// Check the argument count, then run the implementation
    pub fn call(&self, args: &[Value], env: &Environment) -> Result<Value, LispError> {
        self.arity.validate(self.name, args.len())?;
        (self.func)(args, env)
    }
}

//
// Argument helpers
//

/// Borrow exactly `N` arguments
fn fixed<'a, const N: usize>(name: &str, args: &'a [Value]) -> Result<&'a [Value; N], LispError> {
    args.try_into()
        .map_err(|_| LispError::arity(name, N, args.len()))
}

fn integer(name: &str, value: &Value) -> Result<NumberType, LispError> {
    match value {
        Value::Integer(n) => Ok(*n),
        other => Err(LispError::wrong_type(name, "integer", other)),
    }
}

fn string<'a>(name: &str, value: &'a Value) -> Result<&'a str, LispError> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(LispError::wrong_type(name, "string", other)),
    }
}

/// Elements of a list or vector; nil counts as empty
fn sequence<'a>(name: &str, value: &'a Value) -> Result<&'a [Value], LispError> {
    match value {
        Value::Nil => Ok(&[]),
        other => other
            .as_seq()
            .ok_or_else(|| LispError::wrong_type(name, "list or vector", other)),
    }
}

fn expected_type(name: &str, expected: &str, got: &Value) -> LispError {
    LispError::type_error(format!(
        "'{name}': Wrong type argument: expected {expected}, got {}",
        got.type_name()
    ))
}

fn hash_map<'a>(name: &str, value: &'a Value) -> Result<&'a HashMapType, LispError> {
    match value {
        Value::HashMap(map, _) => Ok(map),
        other => Err(expected_type(name, "hash-map", other)),
    }
}

fn atom<'a>(name: &str, value: &'a Value) -> Result<&'a RefCell<Value>, LispError> {
    match value {
        Value::Atom(cell, _) => Ok(cell),
        other => Err(expected_type(name, "atom", other)),
    }
}

fn callable<'a>(name: &str, value: &'a Value) -> Result<&'a Value, LispError> {
    match value {
        Value::Builtin(..) | Value::Function(..) => Ok(value),
        other => Err(expected_type(name, "function", other)),
    }
}

fn overflow(name: &str) -> LispError {
    LispError::new(ErrorKind::ARITHMETIC, format!("'{name}': Integer overflow"))
}

//
// Builtin Function Implementations
//

fn builtin_add(args: &[Value], _env: &Environment) -> Result<Value, LispError> {
    args.iter()
        .try_fold(0, |acc: NumberType, arg| {
            acc.checked_add(integer("+", arg)?)
                .ok_or_else(|| overflow("+"))
        })
        .map(Value::Integer)
}

fn builtin_sub(args: &[Value], _env: &Environment) -> Result<Value, LispError> {
    // A single argument is negated
    let (first, rest) = match args {
        [_] | [] => (0, args),
        [first, rest @ ..] => (integer("-", first)?, rest),
    };
    rest.iter()
        .try_fold(first, |acc, arg| {
            acc.checked_sub(integer("-", arg)?)
                .ok_or_else(|| overflow("-"))
        })
        .map(Value::Integer)
}

fn builtin_mul(args: &[Value], _env: &Environment) -> Result<Value, LispError> {
    args.iter()
        .try_fold(1, |acc: NumberType, arg| {
            acc.checked_mul(integer("*", arg)?)
                .ok_or_else(|| overflow("*"))
        })
        .map(Value::Integer)
}

/// Division rounding towards negative infinity
fn floor_div(dividend: NumberType, divisor: NumberType) -> Result<NumberType, LispError> {
    if divisor == 0 {
        return Err(LispError::new(ErrorKind::ARITHMETIC, "Division by zero"));
    }
    let quotient = dividend.checked_div(divisor).ok_or_else(|| overflow("/"))?;
    if dividend % divisor != 0 && (dividend < 0) != (divisor < 0) {
        Ok(quotient - 1)
    } else {
        Ok(quotient)
    }
}

fn builtin_div(args: &[Value], _env: &Environment) -> Result<Value, LispError> {
    // With fewer than two arguments the dividend is 0
    let (first, rest) = match args {
        [_] | [] => (0, args),
        [first, rest @ ..] => (integer("/", first)?, rest),
    };
    rest.iter()
        .try_fold(first, |acc, arg| floor_div(acc, integer("/", arg)?))
        .map(Value::Integer)
}

fn builtin_equal(args: &[Value], _env: &Environment) -> Result<Value, LispError> {
    let Some((first, rest)) = args.split_first() else {
        return Err(LispError::arity("=", Arity::AtLeast(1), 0));
    };
    Ok(Value::Bool(rest.iter().all(|arg| arg == first)))
}

// Macro to generate chained numeric comparison functions
macro_rules! numeric_comparison {
    ($name:ident, $op:tt, $op_str:expr) => {
        fn $name(args: &[Value], _env: &Environment) -> Result<Value, LispError> {
            let numbers = args
                .iter()
                .map(|arg| integer($op_str, arg))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Bool(
                numbers.windows(2).all(|pair| pair[0] $op pair[1]),
            ))
        }
    };
}

numeric_comparison!(builtin_lt, <, "<");
numeric_comparison!(builtin_le, <=, "<=");
numeric_comparison!(builtin_gt, >, ">");
numeric_comparison!(builtin_ge, >=, ">=");

// Sequences

fn builtin_list(args: &[Value], _env: &Environment) -> Result<Value, LispError> {
    Ok(Value::list(args.to_vec()))
}

fn builtin_vector(args: &[Value], _env: &Environment) -> Result<Value, LispError> {
    Ok(Value::vector(args.to_vec()))
}

fn builtin_cons(args: &[Value], _env: &Environment) -> Result<Value, LispError> {
    let [head, tail] = fixed("cons", args)?;
    let tail = sequence("cons", tail)?;
    let mut items = Vec::with_capacity(tail.len() + 1);
    items.push(head.clone());
    items.extend_from_slice(tail);
    Ok(Value::list(items))
}

fn builtin_concat(args: &[Value], _env: &Environment) -> Result<Value, LispError> {
    let mut items = Vec::new();
    for arg in args {
        items.extend_from_slice(sequence("concat", arg)?);
    }
    Ok(Value::list(items))
}

/// Lists grow at the front, vectors at the back
fn builtin_conj(args: &[Value], _env: &Environment) -> Result<Value, LispError> {
    let Some((target, elements)) = args.split_first() else {
        return Err(LispError::arity("conj", Arity::AtLeast(1), 0));
    };
    match target {
        Value::List(items, _) => {
            let mut result: Vec<Value> = elements.iter().rev().cloned().collect();
            result.extend_from_slice(items);
            Ok(Value::list(result))
        }
        Value::Vector(items, _) => {
            let mut result = items.to_vec();
            result.extend_from_slice(elements);
            Ok(Value::vector(result))
        }
        other => Err(LispError::wrong_type("conj", "list or vector", other)),
    }
}

fn builtin_nth(args: &[Value], _env: &Environment) -> Result<Value, LispError> {
    let [seq, index] = fixed("nth", args)?;
    let items = seq
        .as_seq()
        .ok_or_else(|| LispError::wrong_type("nth", "list or vector", seq))?;
    let index = integer("nth", index)?;
    usize::try_from(index)
        .ok()
        .and_then(|i| items.get(i))
        .cloned()
        .ok_or_else(|| LispError::new(ErrorKind::INDEX, "Index out of range"))
}

fn builtin_first(args: &[Value], _env: &Environment) -> Result<Value, LispError> {
    let [seq] = fixed("first", args)?;
    Ok(sequence("first", seq)?.first().cloned().unwrap_or(Value::Nil))
}

fn builtin_rest(args: &[Value], _env: &Environment) -> Result<Value, LispError> {
    let [seq] = fixed("rest", args)?;
    let items = sequence("rest", seq)?;
    Ok(Value::list(items.get(1..).unwrap_or_default().to_vec()))
}

fn builtin_empty_p(args: &[Value], _env: &Environment) -> Result<Value, LispError> {
    let [seq] = fixed("empty?", args)?;
    Ok(Value::Bool(sequence("empty?", seq)?.is_empty()))
}

fn builtin_count(args: &[Value], _env: &Environment) -> Result<Value, LispError> {
    let [seq] = fixed("count", args)?;
    let count = sequence("count", seq)?.len();
    NumberType::try_from(count)
        .map(Value::Integer)
        .map_err(|_| overflow("count"))
}

/// Lists are returned as-is, vectors become lists, strings become lists of
/// one-character strings; anything empty becomes nil
fn builtin_seq(args: &[Value], _env: &Environment) -> Result<Value, LispError> {
    let [value] = fixed("seq", args)?;
    match value {
        Value::List(items, _) | Value::Vector(items, _) if items.is_empty() => Ok(Value::Nil),
        Value::String(s) if s.is_empty() => Ok(Value::Nil),
        Value::Nil => Ok(Value::Nil),
        Value::List(..) => Ok(value.clone()),
        Value::Vector(items, _) => Ok(Value::list(items.to_vec())),
        Value::String(s) => Ok(s.chars().map(|c| Value::String(c.to_string())).collect()),
        other => Err(LispError::wrong_type("seq", "sequence", other)),
    }
}

// Hash-maps

fn builtin_hash_map(args: &[Value], _env: &Environment) -> Result<Value, LispError> {
    let mut map = HashMapType::new();
    insert_pairs(&mut map, args)?;
    Ok(Value::from(map))
}

fn builtin_assoc(args: &[Value], _env: &Environment) -> Result<Value, LispError> {
    let Some((map, pairs)) = args.split_first() else {
        return Err(LispError::arity("assoc", Arity::AtLeast(1), 0));
    };
    let mut result = hash_map("assoc", map)?.clone();
    insert_pairs(&mut result, pairs)?;
    Ok(Value::from(result))
}

fn builtin_dissoc(args: &[Value], _env: &Environment) -> Result<Value, LispError> {
    let Some((map, keys)) = args.split_first() else {
        return Err(LispError::arity("dissoc", Arity::AtLeast(1), 0));
    };
    let mut result = hash_map("dissoc", map)?.clone();
    for key in keys {
        if let Ok(key) = HashKey::try_from(key) {
            result.remove(&key);
        }
    }
    Ok(Value::from(result))
}

fn builtin_get(args: &[Value], _env: &Environment) -> Result<Value, LispError> {
    let [map, key] = fixed("get", args)?;
    if matches!(map, Value::Nil) {
        return Ok(Value::Nil);
    }
    let map = hash_map("get", map)?;
    Ok(HashKey::try_from(key)
        .ok()
        .and_then(|key| map.get(&key).cloned())
        .unwrap_or(Value::Nil))
}

fn builtin_contains_p(args: &[Value], _env: &Environment) -> Result<Value, LispError> {
    let [map, key] = fixed("contains?", args)?;
    let map = hash_map("contains?", map)?;
    Ok(Value::Bool(
        HashKey::try_from(key).is_ok_and(|key| map.contains_key(&key)),
    ))
}

fn builtin_keys(args: &[Value], _env: &Environment) -> Result<Value, LispError> {
    let [map] = fixed("keys", args)?;
    Ok(hash_map("keys", map)?.keys().map(HashKey::to_value).collect())
}

fn builtin_vals(args: &[Value], _env: &Environment) -> Result<Value, LispError> {
    let [map] = fixed("vals", args)?;
    Ok(hash_map("vals", map)?.values().cloned().collect())
}

// Predicates and constructors

macro_rules! type_predicate {
    ($name:ident, $pattern:pat) => {
        fn $name(args: &[Value], _env: &Environment) -> Result<Value, LispError> {
            Ok(Value::Bool(matches!(args, [$pattern])))
        }
    };
}

type_predicate!(builtin_nil_p, Value::Nil);
type_predicate!(builtin_true_p, Value::Bool(true));
type_predicate!(builtin_false_p, Value::Bool(false));
type_predicate!(builtin_symbol_p, Value::Symbol(_));
type_predicate!(builtin_keyword_p, Value::Keyword(_));
type_predicate!(builtin_string_p, Value::String(_));
type_predicate!(builtin_list_p, Value::List(..));
type_predicate!(builtin_vector_p, Value::Vector(..));
type_predicate!(builtin_map_p, Value::HashMap(..));
type_predicate!(builtin_sequential_p, Value::List(..) | Value::Vector(..));
type_predicate!(builtin_atom_p, Value::Atom(..));

fn builtin_symbol(args: &[Value], _env: &Environment) -> Result<Value, LispError> {
    let [name] = fixed("symbol", args)?;
    match name {
        Value::String(s) => Ok(Value::symbol(s.as_str())),
        other => Err(expected_type("symbol", "string", other)),
    }
}

fn builtin_keyword(args: &[Value], _env: &Environment) -> Result<Value, LispError> {
    let [name] = fixed("keyword", args)?;
    match name {
        Value::Keyword(_) => Ok(name.clone()),
        Value::String(s) => Ok(Value::keyword(s)),
        other => Err(expected_type("keyword", "string", other)),
    }
}

// Strings and IO

fn builtin_pr_str(args: &[Value], _env: &Environment) -> Result<Value, LispError> {
    Ok(Value::String(pr_seq(args, true, " ")))
}

fn builtin_str(args: &[Value], _env: &Environment) -> Result<Value, LispError> {
    Ok(Value::String(pr_seq(args, false, "")))
}

fn builtin_prn(args: &[Value], _env: &Environment) -> Result<Value, LispError> {
    println!("{}", pr_seq(args, true, " "));
    Ok(Value::Nil)
}

fn builtin_println(args: &[Value], _env: &Environment) -> Result<Value, LispError> {
    println!("{}", pr_seq(args, false, " "));
    Ok(Value::Nil)
}

fn builtin_read_string(args: &[Value], _env: &Environment) -> Result<Value, LispError> {
    let [source] = fixed("read-string", args)?;
    Ok(read_str(string("read-string", source)?)?.unwrap_or(Value::Nil))
}

fn file_error(err: io::Error) -> LispError {
    LispError::new(ErrorKind::FILE, err.to_string())
}

fn builtin_slurp(args: &[Value], _env: &Environment) -> Result<Value, LispError> {
    let [path] = fixed("slurp", args)?;
    let path = string("slurp", path)?;
    debug!(path, "reading file");
    std::fs::read_to_string(path)
        .map(Value::String)
        .map_err(file_error)
}

/// Print the prompt and read one line from standard input; nil at end of input
fn builtin_readline(args: &[Value], _env: &Environment) -> Result<Value, LispError> {
    let [prompt] = fixed("readline", args)?;
    let mut stdout = io::stdout();
    write!(stdout, "{}", pr_str(prompt, false)).map_err(file_error)?;
    stdout.flush().map_err(file_error)?;

    let mut line = String::new();
    if io::stdin().read_line(&mut line).map_err(file_error)? == 0 {
        return Ok(Value::Nil);
    }
    let trimmed = line.trim_end_matches(['\n', '\r']).len();
    line.truncate(trimmed);
    Ok(Value::String(line))
}

// Atoms

fn builtin_atom(args: &[Value], _env: &Environment) -> Result<Value, LispError> {
    let [value] = fixed("atom", args)?;
    Ok(Value::atom(value.clone()))
}

fn builtin_deref(args: &[Value], _env: &Environment) -> Result<Value, LispError> {
    let [target] = fixed("deref", args)?;
    Ok(atom("deref", target)?.borrow().clone())
}

fn builtin_reset(args: &[Value], _env: &Environment) -> Result<Value, LispError> {
    let [target, value] = fixed("reset!", args)?;
    *atom("reset!", target)?.borrow_mut() = value.clone();
    Ok(value.clone())
}

/// Store `(f current-value extra-args...)` in the atom and return it
fn builtin_swap(args: &[Value], env: &Environment) -> Result<Value, LispError> {
    let [target, func, extra @ ..] = args else {
        return Err(LispError::arity("swap!", Arity::AtLeast(2), args.len()));
    };
    let cell = atom("swap!", target)?;
    let func = callable("swap!", func)?;

    let current = cell.borrow().clone();
    let mut call_args = Vec::with_capacity(extra.len() + 1);
    call_args.push(current);
    call_args.extend_from_slice(extra);

    let result = apply_function(func, &call_args, env).into_result()?;
    *cell.borrow_mut() = result.clone();
    Ok(result)
}

// Control

/// Raise a user error whose description is the payload itself
fn builtin_throw(args: &[Value], _env: &Environment) -> Result<Value, LispError> {
    let [payload] = fixed("throw", args)?;
    Err(LispError::user(payload.clone()))
}

fn builtin_apply(args: &[Value], env: &Environment) -> Result<Value, LispError> {
    let [func, middle @ .., last] = args else {
        return Err(LispError::arity("apply", Arity::AtLeast(2), args.len()));
    };
    let func = callable("apply", func)?;
    let tail = last
        .as_seq()
        .ok_or_else(|| expected_type("apply", "list or vector", last))?;

    let mut call_args = middle.to_vec();
    call_args.extend_from_slice(tail);
    apply_function(func, &call_args, env).into_result()
}

fn builtin_map(args: &[Value], env: &Environment) -> Result<Value, LispError> {
    let [func, seq] = fixed("map", args)?;
    let func = callable("map", func)?;
    let items = seq
        .as_seq()
        .ok_or_else(|| expected_type("map", "list or vector", seq))?;

    let results = items
        .iter()
        .map(|item| apply_function(func, std::slice::from_ref(item), env).into_result())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::list(results))
}

/// Evaluate a form in the root frame of the caller's environment
fn builtin_eval(args: &[Value], env: &Environment) -> Result<Value, LispError> {
    let [ast] = fixed("eval", args)?;
    eval(ast, &env.root()).into_result()
}

// Metadata and time

fn builtin_meta(args: &[Value], _env: &Environment) -> Result<Value, LispError> {
    let [value] = fixed("meta", args)?;
    Ok(value.meta())
}

fn builtin_with_meta(args: &[Value], _env: &Environment) -> Result<Value, LispError> {
    let [value, meta] = fixed("with-meta", args)?;
    Ok(value.with_meta(meta.clone()))
}

fn builtin_time_ms(_args: &[Value], _env: &Environment) -> Result<Value, LispError> {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    NumberType::try_from(millis)
        .map(Value::Integer)
        .map_err(|_| overflow("time-ms"))
}

/// Global registry of all built-in operations
static BUILTIN_OPS: LazyLock<Vec<BuiltinOp>> = LazyLock::new(|| {
    fn op(name: &'static str, arity: Arity, func: NativeFn) -> BuiltinOp {
        BuiltinOp { name, arity, func }
    }

    vec![
        // Arithmetic operations
        op("+", Arity::Any, builtin_add),
        op("-", Arity::Any, builtin_sub),
        op("*", Arity::Any, builtin_mul),
        op("/", Arity::Any, builtin_div),
        // Comparison operations
        op("=", Arity::AtLeast(1), builtin_equal),
        op("<", Arity::AtLeast(1), builtin_lt),
        op("<=", Arity::AtLeast(1), builtin_le),
        op(">", Arity::AtLeast(1), builtin_gt),
        op(">=", Arity::AtLeast(1), builtin_ge),
        // Sequences
        op("list", Arity::Any, builtin_list),
        op("vector", Arity::Any, builtin_vector),
        op("cons", Arity::Exact(2), builtin_cons),
        op("concat", Arity::Any, builtin_concat),
        op("conj", Arity::AtLeast(1), builtin_conj),
        op("nth", Arity::Exact(2), builtin_nth),
        op("first", Arity::Exact(1), builtin_first),
        op("rest", Arity::Exact(1), builtin_rest),
        op("empty?", Arity::Exact(1), builtin_empty_p),
        op("count", Arity::Exact(1), builtin_count),
        op("seq", Arity::Exact(1), builtin_seq),
        // Hash-maps
        op("hash-map", Arity::Any, builtin_hash_map),
        op("assoc", Arity::AtLeast(1), builtin_assoc),
        op("dissoc", Arity::AtLeast(1), builtin_dissoc),
        op("get", Arity::Exact(2), builtin_get),
        op("contains?", Arity::Exact(2), builtin_contains_p),
        op("keys", Arity::Exact(1), builtin_keys),
        op("vals", Arity::Exact(1), builtin_vals),
        // Predicates
        op("nil?", Arity::Exact(1), builtin_nil_p),
        op("true?", Arity::Exact(1), builtin_true_p),
        op("false?", Arity::Exact(1), builtin_false_p),
        op("symbol?", Arity::Exact(1), builtin_symbol_p),
        op("keyword?", Arity::Exact(1), builtin_keyword_p),
        op("string?", Arity::Exact(1), builtin_string_p),
        op("list?", Arity::Exact(1), builtin_list_p),
        op("vector?", Arity::Exact(1), builtin_vector_p),
        op("map?", Arity::Exact(1), builtin_map_p),
        op("sequential?", Arity::Exact(1), builtin_sequential_p),
        op("atom?", Arity::Exact(1), builtin_atom_p),
        // Constructors
        op("symbol", Arity::Exact(1), builtin_symbol),
        op("keyword", Arity::Exact(1), builtin_keyword),
        // Strings and IO
        op("pr-str", Arity::Any, builtin_pr_str),
        op("str", Arity::Any, builtin_str),
        op("prn", Arity::Any, builtin_prn),
        op("println", Arity::Any, builtin_println),
        op("read-string", Arity::Exact(1), builtin_read_string),
        op("slurp", Arity::Exact(1), builtin_slurp),
        op("readline", Arity::Exact(1), builtin_readline),
        // Atoms
        op("atom", Arity::Exact(1), builtin_atom),
        op("deref", Arity::Exact(1), builtin_deref),
        op("reset!", Arity::Exact(2), builtin_reset),
        op("swap!", Arity::AtLeast(2), builtin_swap),
        // Control
        op("throw", Arity::Exact(1), builtin_throw),
        op("apply", Arity::AtLeast(2), builtin_apply),
        op("map", Arity::Exact(2), builtin_map),
        op("eval", Arity::Exact(1), builtin_eval),
        // Metadata and time
        op("meta", Arity::Exact(1), builtin_meta),
        op("with-meta", Arity::Exact(2), builtin_with_meta),
        op("time-ms", Arity::Exact(0), builtin_time_ms),
    ]
});

/// Lazy static map from name to BuiltinOp (private - use find_builtin_op)
static BUILTIN_INDEX: LazyLock<HashMap<&'static str, &'static BuiltinOp>> = LazyLock::new(|| {
    let ops: &'static [BuiltinOp] = BUILTIN_OPS.as_slice();
    ops.iter().map(|op| (op.name, op)).collect()
});

/// Get all builtin operations
pub fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS.as_slice()
}

/// Find a builtin operation by name
pub fn find_builtin_op(name: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_INDEX.get(name).copied()
}

/// Create a root environment holding every builtin, the host globals and the prelude
pub fn create_global_env() -> Environment {
    let env = Environment::new();

    for builtin_op in get_builtin_ops() {
        env.set(builtin_op.name, Value::Builtin(builtin_op, None));
    }
    env.set("*host-language*", Value::from("rust"));
    env.set("*ARGV*", Value::list(vec![]));

    prelude::load(&env);
    env
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{nil, sym, val};

    /// Micro-helper for success cases in comprehensive tests
    fn success<T: Into<Value>>(value: T) -> Result<Value, &'static str> {
        Ok(val(value))
    }

    /// Helper to invoke a builtin through the registry, arity check included
    fn call_builtin(name: &str, args: &[Value]) -> Result<Value, LispError> {
        let op = find_builtin_op(name).unwrap();
        op.call(args, &Environment::new())
    }

    fn run_builtin_tests(test_cases: Vec<(&str, Vec<Value>, Result<Value, &'static str>)>) {
        for (i, (name, args, expected)) in test_cases.into_iter().enumerate() {
            let test_id = format!("Builtin test #{} ({name})", i + 1);
            match (call_builtin(name, &args), expected) {
                (Ok(actual), Ok(expected_val)) => {
                    assert_eq!(actual, expected_val, "{test_id}: value mismatch");
                }
                (Err(err), Err(kind)) => {
                    assert_eq!(err.kind.as_str(), kind, "{test_id}: error kind mismatch");
                }
                (actual, expected) => {
                    panic!("{test_id}: expected {expected:?}, got {actual:?}");
                }
            }
        }
    }

    fn kw(name: &str) -> Value {
        Value::keyword(name)
    }

    fn map_of(pairs: &[(Value, Value)]) -> Value {
        let items: Vec<Value> = pairs
            .iter()
            .flat_map(|(k, v)| [k.clone(), v.clone()])
            .collect();
        builtin_hash_map(&items, &Environment::new()).unwrap()
    }

    #[test]
    fn test_builtin_ops_registry() {
        let add_op = find_builtin_op("+").unwrap();
        assert_eq!(add_op.arity, Arity::Any);
        assert!(std::ptr::eq(add_op, find_builtin_op("+").unwrap()));
        assert!(find_builtin_op("unknown").is_none());

        // Names are unique
        let ops = get_builtin_ops();
        assert_eq!(BUILTIN_INDEX.len(), ops.len());
    }

    #[test]
    fn test_arity_validation() {
        assert!(Arity::Exact(2).validate("f", 2).is_ok());
        assert!(Arity::AtLeast(1).validate("f", 5).is_ok());
        assert!(Arity::Range(1, 2).validate("f", 2).is_ok());
        assert!(Arity::Any.validate("f", 0).is_ok());

        let err = Arity::Exact(2).validate("cons", 3).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ARG);
        assert_eq!(
            err.description,
            val("'cons' requires 2 argument(s), received 3")
        );
        assert!(Arity::Range(1, 2).validate("f", 0).is_err());
        assert!(Arity::AtLeast(2).validate("f", 1).is_err());
    }

    #[test]
    fn test_arithmetic_and_comparison() {
        run_builtin_tests(vec![
            ("+", vec![], success(0)),
            ("+", vec![val(1), val(2), val(3)], success(6)),
            ("+", vec![val(1), val("2")], Err("ArgError")),
            ("+", vec![val(i64::MAX), val(1)], Err("ArithmeticError")),
            ("-", vec![], success(0)),
            ("-", vec![val(5)], success(-5)),
            ("-", vec![val(10), val(3), val(2)], success(5)),
            ("*", vec![], success(1)),
            ("*", vec![val(4)], success(4)),
            ("*", vec![val(2), val(3), val(4)], success(24)),
            ("/", vec![], success(0)),
            ("/", vec![val(5)], success(0)),
            ("/", vec![val(7), val(2)], success(3)),
            ("/", vec![val(-7), val(2)], success(-4)),
            ("/", vec![val(7), val(-2)], success(-4)),
            ("/", vec![val(-7), val(-2)], success(3)),
            ("/", vec![val(100), val(5), val(2)], success(10)),
            ("/", vec![val(1), val(0)], Err("ArithmeticError")),
            ("/", vec![val(i64::MIN), val(-1)], Err("ArithmeticError")),
            ("/", vec![val(1), nil()], Err("ArgError")),
            ("=", vec![val(1)], success(true)),
            ("=", vec![val(1), val(1), val(1)], success(true)),
            ("=", vec![val(1), val(1), val(2)], success(false)),
            ("=", vec![val([1, 2]), Value::vector(vec![val(1), val(2)])], success(false)),
            ("=", vec![Value::list(vec![]), nil()], success(false)),
            ("=", vec![], Err("ArgError")),
            ("<", vec![val(1), val(2), val(3)], success(true)),
            ("<", vec![val(1), val(3), val(2)], success(false)),
            ("<=", vec![val(1), val(1), val(2)], success(true)),
            (">", vec![val(3), val(2), val(1)], success(true)),
            (">=", vec![val(2), val(2), val(3)], success(false)),
            ("<", vec![val(1)], success(true)),
            ("<", vec![val(1), val("a")], Err("ArgError")),
        ]);
    }

    #[test]
    fn test_sequence_builtins() {
        run_builtin_tests(vec![
            ("list", vec![], Ok(Value::list(vec![]))),
            ("list", vec![val(1), val("a")], success(vec![val(1), val("a")])),
            ("vector", vec![val(1)], Ok(Value::vector(vec![val(1)]))),
            ("cons", vec![val(1), val([2, 3])], success([1, 2, 3])),
            ("cons", vec![val(1), Value::vector(vec![val(2)])], success([1, 2])),
            ("cons", vec![val(1), nil()], success([1])),
            ("cons", vec![val(1), val(2)], Err("ArgError")),
            ("cons", vec![val(1)], Err("ArgError")),
            ("concat", vec![], Ok(Value::list(vec![]))),
            (
                "concat",
                vec![val([1, 2]), Value::vector(vec![val(3)]), Value::list(vec![])],
                success([1, 2, 3]),
            ),
            ("concat", vec![val(1)], Err("ArgError")),
            ("conj", vec![val([1, 2]), val(3), val(4)], success([4, 3, 1, 2])),
            (
                "conj",
                vec![Value::vector(vec![val(1)]), val(2), val(3)],
                Ok(Value::vector(vec![val(1), val(2), val(3)])),
            ),
            ("conj", vec![val(1), val(2)], Err("ArgError")),
            ("nth", vec![val([1, 2, 3]), val(1)], success(2)),
            ("nth", vec![Value::vector(vec![val(7)]), val(0)], success(7)),
            ("nth", vec![val([1, 2, 3]), val(3)], Err("IndexError")),
            ("nth", vec![val([1, 2, 3]), val(-1)], Err("IndexError")),
            ("first", vec![val([1, 2])], success(1)),
            ("first", vec![Value::list(vec![])], success(nil())),
            ("first", vec![nil()], success(nil())),
            ("first", vec![val(1)], Err("ArgError")),
            ("rest", vec![val([1, 2, 3])], success([2, 3])),
            ("rest", vec![Value::vector(vec![val(1), val(2)])], success([2])),
            ("rest", vec![Value::list(vec![])], Ok(Value::list(vec![]))),
            ("rest", vec![nil()], Ok(Value::list(vec![]))),
            ("empty?", vec![Value::list(vec![])], success(true)),
            ("empty?", vec![Value::vector(vec![val(1)])], success(false)),
            ("empty?", vec![val(1)], Err("ArgError")),
            ("count", vec![val([1, 2, 3])], success(3)),
            ("count", vec![nil()], success(0)),
            ("count", vec![val("abc")], Err("ArgError")),
            ("seq", vec![nil()], success(nil())),
            ("seq", vec![Value::list(vec![])], success(nil())),
            ("seq", vec![Value::vector(vec![])], success(nil())),
            ("seq", vec![val("")], success(nil())),
            ("seq", vec![val([1, 2])], success([1, 2])),
            ("seq", vec![Value::vector(vec![val(1), val(2)])], success([1, 2])),
            ("seq", vec![val("ab")], success(["a", "b"])),
            ("seq", vec![val(1)], Err("ArgError")),
        ]);
    }

    #[test]
    fn test_hash_map_builtins() {
        let m = map_of(&[(kw("a"), val(1)), (val("b"), val(2))]);
        run_builtin_tests(vec![
            ("hash-map", vec![], Ok(map_of(&[]))),
            ("hash-map", vec![kw("a"), val(1), val("b"), val(2)], Ok(m.clone())),
            ("hash-map", vec![kw("a")], Err("HashError")),
            ("hash-map", vec![val(1), val(2)], Err("HashError")),
            (
                "assoc",
                vec![m.clone(), kw("c"), val(3)],
                Ok(map_of(&[(kw("a"), val(1)), (val("b"), val(2)), (kw("c"), val(3))])),
            ),
            (
                "assoc",
                vec![m.clone(), kw("a"), val(9)],
                Ok(map_of(&[(kw("a"), val(9)), (val("b"), val(2))])),
            ),
            ("assoc", vec![m.clone(), kw("c")], Err("HashError")),
            ("assoc", vec![val(1), kw("c"), val(3)], Err("TypeError")),
            ("dissoc", vec![m.clone(), kw("a")], Ok(map_of(&[(val("b"), val(2))]))),
            ("dissoc", vec![m.clone(), kw("zz"), val(1)], Ok(m.clone())),
            ("get", vec![m.clone(), kw("a")], success(1)),
            ("get", vec![m.clone(), val("a")], success(nil())),
            ("get", vec![nil(), kw("a")], success(nil())),
            ("get", vec![val(1), kw("a")], Err("TypeError")),
            ("contains?", vec![m.clone(), val("b")], success(true)),
            ("contains?", vec![m.clone(), kw("b")], success(false)),
            ("contains?", vec![m.clone(), val(1)], success(false)),
            ("keys", vec![m.clone()], success(vec![val("b"), kw("a")])),
            ("vals", vec![m.clone()], success([2, 1])),
            ("keys", vec![val([1])], Err("TypeError")),
        ]);
    }

    #[test]
    fn test_predicates_and_constructors() {
        run_builtin_tests(vec![
            ("nil?", vec![nil()], success(true)),
            ("nil?", vec![val(false)], success(false)),
            ("true?", vec![val(true)], success(true)),
            ("true?", vec![val(1)], success(false)),
            ("false?", vec![val(false)], success(true)),
            ("false?", vec![nil()], success(false)),
            ("symbol?", vec![sym("a")], success(true)),
            ("symbol?", vec![val("a")], success(false)),
            ("keyword?", vec![kw("a")], success(true)),
            ("keyword?", vec![val(":a")], success(false)),
            ("string?", vec![val("a")], success(true)),
            ("string?", vec![kw("a")], success(false)),
            ("list?", vec![Value::list(vec![])], success(true)),
            ("list?", vec![Value::vector(vec![])], success(false)),
            ("vector?", vec![Value::vector(vec![])], success(true)),
            ("map?", vec![map_of(&[])], success(true)),
            ("map?", vec![Value::list(vec![])], success(false)),
            ("sequential?", vec![Value::vector(vec![])], success(true)),
            ("sequential?", vec![val("abc")], success(false)),
            ("atom?", vec![Value::atom(nil())], success(true)),
            ("atom?", vec![nil()], success(false)),
            ("symbol", vec![val("abc")], success(sym("abc"))),
            ("symbol", vec![val(1)], Err("TypeError")),
            ("keyword", vec![val("abc")], success(kw("abc"))),
            ("keyword", vec![kw("abc")], success(kw("abc"))),
            ("keyword", vec![val(1)], Err("TypeError")),
        ]);
    }

    #[test]
    fn test_string_builtins() {
        run_builtin_tests(vec![
            ("pr-str", vec![], success("")),
            ("pr-str", vec![val("a\"b"), val(1)], success(r#""a\"b" 1"#)),
            ("str", vec![], success("")),
            ("str", vec![val("a"), val(1), kw("k"), val([1, 2])], success("a1:k(1 2)")),
            ("read-string", vec![val("(1 2)")], success([1, 2])),
            ("read-string", vec![val(";; nothing")], success(nil())),
            ("read-string", vec![val("(1")], Err("ParenError")),
            ("read-string", vec![val(1)], Err("ArgError")),
            ("slurp", vec![val("/definitely/not/a/real/file")], Err("FileError")),
            ("prn", vec![], success(nil())),
            ("println", vec![val("printed by a test")], success(nil())),
        ]);
    }

    #[test]
    fn test_atom_builtins() {
        let a = Value::atom(val(1));
        let plus = Value::Builtin(find_builtin_op("+").unwrap(), None);
        run_builtin_tests(vec![
            ("deref", vec![a.clone()], success(1)),
            ("reset!", vec![a.clone(), val(5)], success(5)),
            ("deref", vec![a.clone()], success(5)),
            ("swap!", vec![a.clone(), plus, val(3)], success(8)),
            ("deref", vec![a.clone()], success(8)),
            ("deref", vec![val(1)], Err("TypeError")),
            ("reset!", vec![val(1), val(2)], Err("TypeError")),
            ("swap!", vec![a.clone(), val(1)], Err("TypeError")),
        ]);
    }

    #[test]
    fn test_control_builtins() {
        let plus = Value::Builtin(find_builtin_op("+").unwrap(), None);
        let throw = Value::Builtin(find_builtin_op("throw").unwrap(), None);
        run_builtin_tests(vec![
            ("throw", vec![val("boom")], Err("UserError")),
            ("apply", vec![plus.clone(), val([1, 2])], success(3)),
            ("apply", vec![plus.clone(), val(1), val(2), Value::vector(vec![val(3)])], success(6)),
            ("apply", vec![plus.clone(), val(1)], Err("TypeError")),
            ("apply", vec![val(1), val([1])], Err("TypeError")),
            ("map", vec![plus.clone(), val([1, 2])], success([1, 2])),
            ("map", vec![plus.clone(), Value::vector(vec![])], Ok(Value::list(vec![]))),
            ("map", vec![throw.clone(), val([7, 8])], Err("UserError")),
            ("map", vec![plus.clone(), val(1)], Err("TypeError")),
            ("eval", vec![val(vec![sym("+"), val(1), val(2)])], Err("SymbolError")),
        ]);

        let err = call_builtin("throw", &[val([1, 2, 3])]).unwrap_err();
        assert_eq!(err.description, val([1, 2, 3]));
    }

    #[test]
    fn test_metadata_builtins() {
        let v = Value::vector(vec![val(1)]);
        let with = call_builtin("with-meta", &[v.clone(), val("info")]).unwrap();
        assert_eq!(call_builtin("meta", &[with.clone()]).unwrap(), val("info"));
        assert_eq!(call_builtin("meta", &[v.clone()]).unwrap(), nil());
        assert_eq!(with, v);

        // Unsupported values are returned unchanged
        let n = call_builtin("with-meta", &[val(1), val("info")]).unwrap();
        assert_eq!(n, val(1));
        assert_eq!(call_builtin("meta", &[n]).unwrap(), nil());

        let builtin = Value::Builtin(find_builtin_op("+").unwrap(), None);
        let tagged = call_builtin("with-meta", &[builtin, val(7)]).unwrap();
        assert_eq!(tagged.meta(), val(7));
    }

    #[test]
    fn test_time_ms() {
        let Value::Integer(now) = call_builtin("time-ms", &[]).unwrap() else {
            panic!("time-ms should return an integer");
        };
        assert!(now > 1_600_000_000_000);
        assert!(call_builtin("time-ms", &[val(1)]).is_err());
    }

    #[test]
    fn test_global_env() {
        let env = create_global_env();
        for op in get_builtin_ops() {
            assert_eq!(env.get(op.name).unwrap(), Value::Builtin(op, None));
        }
        assert_eq!(env.get("*host-language*").unwrap(), val("rust"));
        assert_eq!(env.get("*ARGV*").unwrap(), Value::list(vec![]));
        assert!(matches!(env.get("not").unwrap(), Value::Function(..)));
    }
}
