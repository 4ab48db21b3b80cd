//! This module defines the runtime value model shared by the reader, the evaluator,
//! environments and the native library. The main enum, [`Value`], is a closed set of
//! variants: scalars (nil, booleans, integers, strings, symbols, keywords), the three
//! container kinds (lists, vectors, hash-maps), callables (native builtins and
//! user-defined closures), mutable atoms, and the two error states.
//!
//! Containers share their payload behind an `Rc`, so cloning a value is cheap and
//! never copies elements. Metadata is an orthogonal, optional attachment on
//! containers, callables and atoms; it never takes part in equality.
//!
//! Ergonomic helper functions such as [`val`], [`sym`] and [`nil`] are provided for
//! building values in tests.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::builtinops::BuiltinOp;
use crate::evaluator::Environment;
use crate::{ErrorKind, LispError};

/// Type alias for number values in interpreter
pub type NumberType = i64;

/// Optional metadata attached to a value
pub type Meta = Option<Rc<Value>>;

/// Backing store of hash-maps; ordered so that printing is deterministic
pub type HashMapType = BTreeMap<HashKey, Value>;

/// Marker that starts every keyword name
pub const KEYWORD_MARKER: char = ':';

/// Parameter-list symbol that collects the remaining arguments into one list
pub const VARIADIC_MARKER: &str = "&";

/// Hash-map keys: only strings and keywords can be used
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HashKey {
    String(String),
    /// Keyword name including its leading marker
    Keyword(String),
}

impl HashKey {
    pub fn to_value(&self) -> Value {
        match self {
            HashKey::String(s) => Value::String(s.clone()),
            HashKey::Keyword(k) => Value::Keyword(k.clone()),
        }
    }
}

impl TryFrom<&Value> for HashKey {
    type Error = LispError;

    fn try_from(value: &Value) -> Result<Self, LispError> {
        match value {
            Value::String(s) => Ok(HashKey::String(s.clone())),
            Value::Keyword(k) => Ok(HashKey::Keyword(k.clone())),
            other => Err(LispError::new(
                ErrorKind::HASH,
                format!("'{}' cannot be used as a hash-map key", other.type_name()),
            )),
        }
    }
}

/// Insert a flat `key value key value ...` sequence into `map`
pub fn insert_pairs(map: &mut HashMapType, items: &[Value]) -> Result<(), LispError> {
    if items.len() % 2 != 0 {
        return Err(LispError::new(ErrorKind::HASH, "Insufficient number of items"));
    }
    for pair in items.chunks_exact(2) {
        if let [key, value] = pair {
            map.insert(HashKey::try_from(key)?, value.clone());
        }
    }
    Ok(())
}

/// A user-defined function created by `fn*`
///
/// The closure owns its parameter list and body; the captured environment is shared
/// with every other closure created in the same scope.
#[derive(Clone)]
pub struct Closure {
    pub params: Vec<String>,
    pub body: Value,
    pub env: Environment,
    pub is_macro: bool,
}

impl std::fmt::Debug for Closure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The captured environment may refer back to this closure, so it is not printed
        write!(
            f,
            "Closure(params={:?}, body={:?}, is_macro={})",
            self.params, self.body, self.is_macro
        )
    }
}

/// Core runtime type in interpreter
///
/// To build a value in tests, use the ergonomic helper functions:
/// - `val(42)` for values, `sym("name")` for symbols, `nil()` for nil
/// - `val([1, 2, 3])` for homogeneous lists
/// - `val(vec![sym("op"), val(42)])` for mixed lists
#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    /// Numbers (integers only)
    Integer(NumberType),
    String(String),
    /// Symbols (identifiers)
    Symbol(String),
    /// Keywords, name stored with its leading marker
    Keyword(String),
    List(Rc<Vec<Value>>, Meta),
    Vector(Rc<Vec<Value>>, Meta),
    HashMap(Rc<HashMapType>, Meta),
    /// Native functions, compared by registry entry
    Builtin(&'static BuiltinOp, Meta),
    /// User-defined functions and macros, compared by identity
    Function(Rc<Closure>, Meta),
    /// Mutable reference cell, compared by identity
    Atom(Rc<RefCell<Value>>, Meta),
    /// Propagating error: aborts every composing evaluation step
    Error(Rc<LispError>),
    /// Error intercepted by `try*`/`catch*`, now ordinary data
    CaughtError(Rc<LispError>),
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn write_items<'a>(
            f: &mut std::fmt::Formatter<'_>,
            items: impl Iterator<Item = &'a Value>,
        ) -> std::fmt::Result {
            for (i, v) in items.enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{v:?}")?;
            }
            Ok(())
        }

        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Integer(n) => write!(f, "Integer({n})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Symbol(s) => write!(f, "Symbol({s})"),
            Value::Keyword(k) => write!(f, "Keyword({k})"),
            Value::List(items, _) => {
                write!(f, "List(")?;
                write_items(f, items.iter())?;
                write!(f, ")")
            }
            Value::Vector(items, _) => {
                write!(f, "Vector(")?;
                write_items(f, items.iter())?;
                write!(f, ")")
            }
            Value::HashMap(map, _) => {
                write!(f, "HashMap(")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k:?} => {v:?}")?;
                }
                write!(f, ")")
            }
            Value::Builtin(op, _) => write!(f, "Builtin({})", op.name),
            Value::Function(closure, _) => write!(f, "{closure:?}"),
            Value::Atom(cell, _) => write!(f, "Atom({:?})", cell.borrow()),
            Value::Error(err) => write!(f, "Error({}, {:?})", err.kind, err.description),
            Value::CaughtError(err) => {
                write!(f, "CaughtError({}, {:?})", err.kind, err.description)
            }
        }
    }
}

// From trait implementations for Value - enables .into() conversion
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<LispError> for Value {
    fn from(err: LispError) -> Self {
        Value::Error(Rc::new(err))
    }
}

impl From<HashMapType> for Value {
    fn from(map: HashMapType) -> Self {
        Value::HashMap(Rc::new(map), None)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Integer(NumberType::from(n))
            }
        }
    };
}

// Generate From implementations for all lossless integer types
impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(NumberType);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::list(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::list(arr.into_iter().map(Into::into).collect())
    }
}

impl FromIterator<Value> for Value {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Value::list(iter.into_iter().collect())
    }
}

/// Helper function for creating symbols - works great in mixed lists!
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::Symbol(name.as_ref().to_owned())
}

/// Helper function for creating Values - works great in mixed lists!
/// Accepts any type that can be converted to Value
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// Helper function for creating nil
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn nil() -> Value {
    Value::Nil
}

impl Value {
    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(items), None)
    }

    pub fn vector(items: Vec<Value>) -> Value {
        Value::Vector(Rc::new(items), None)
    }

    pub fn symbol(name: impl Into<String>) -> Value {
        Value::Symbol(name.into())
    }

    pub fn atom(value: Value) -> Value {
        Value::Atom(Rc::new(RefCell::new(value)), None)
    }

    pub fn function(closure: Closure) -> Value {
        Value::Function(Rc::new(closure), None)
    }

    /// Build a keyword, adding the marker unless the name already carries it
    pub fn keyword(name: &str) -> Value {
        if name.starts_with(KEYWORD_MARKER) {
            Value::Keyword(name.to_owned())
        } else {
            Value::Keyword(format!("{KEYWORD_MARKER}{name}"))
        }
    }

    /// Nil and false are the only falsy values
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    /// Elements of a list or vector
    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Value::List(items, _) | Value::Vector(items, _) => Some(items),
            _ => None,
        }
    }

    /// Name of the variant, for error messages and the `:env` listing
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::String(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::Keyword(_) => "keyword",
            Value::List(..) => "list",
            Value::Vector(..) => "vector",
            Value::HashMap(..) => "hash-map",
            Value::Builtin(..) => "builtin",
            Value::Function(closure, _) if closure.is_macro => "macro",
            Value::Function(..) => "function",
            Value::Atom(..) => "atom",
            Value::Error(_) => "error",
            Value::CaughtError(_) => "caught-error",
        }
    }

    /// Attached metadata, nil when unset or unsupported
    pub fn meta(&self) -> Value {
        match self {
            Value::List(_, meta)
            | Value::Vector(_, meta)
            | Value::HashMap(_, meta)
            | Value::Builtin(_, meta)
            | Value::Function(_, meta)
            | Value::Atom(_, meta) => meta.as_deref().cloned().unwrap_or(Value::Nil),
            _ => Value::Nil,
        }
    }

    /// Copy of this value carrying `meta`; values without metadata are returned unchanged
    pub fn with_meta(&self, meta: Value) -> Value {
        let meta = Some(Rc::new(meta));
        match self {
            Value::List(items, _) => Value::List(Rc::clone(items), meta),
            Value::Vector(items, _) => Value::Vector(Rc::clone(items), meta),
            Value::HashMap(map, _) => Value::HashMap(Rc::clone(map), meta),
            Value::Builtin(op, _) => Value::Builtin(*op, meta),
            Value::Function(closure, _) => Value::Function(Rc::clone(closure), meta),
            Value::Atom(cell, _) => Value::Atom(Rc::clone(cell), meta),
            other => other.clone(),
        }
    }

    /// Convert a propagating error back into `Err`, for host code calling into the evaluator
    pub fn into_result(self) -> Result<Value, LispError> {
        if let Value::Error(err) = &self {
            return Err(LispError::clone(err));
        }
        Ok(self)
    }
}

impl PartialEq for Value {
    /// Structural equality, walked with an explicit worklist so deeply nested
    /// values compare without native recursion
    fn eq(&self, other: &Self) -> bool {
        let mut pending = vec![(self, other)];
        while let Some(pair) = pending.pop() {
            match pair {
                (Value::List(a, _), Value::List(b, _))
                | (Value::Vector(a, _), Value::Vector(b, _)) => {
                    if Rc::ptr_eq(a, b) {
                        continue;
                    }
                    if a.len() != b.len() {
                        return false;
                    }
                    pending.extend(a.iter().zip(b.iter()));
                }
                (Value::HashMap(a, _), Value::HashMap(b, _)) => {
                    if Rc::ptr_eq(a, b) {
                        continue;
                    }
                    if a.len() != b.len() {
                        return false;
                    }
                    for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
                        if ka != kb {
                            return false;
                        }
                        pending.push((va, vb));
                    }
                }
                (Value::Error(a), Value::Error(b))
                | (Value::CaughtError(a), Value::CaughtError(b)) => {
                    if a.kind != b.kind {
                        return false;
                    }
                    pending.push((&a.description, &b.description));
                }
                (a, b) => {
                    if !a.shallow_eq(b) {
                        return false;
                    }
                }
            }
        }
        true
    }
}

impl Value {
    /// Equality for variants without nested values
    fn shallow_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Keyword(a), Value::Keyword(b)) => a == b,
            // Compare builtins by registry entry, not function pointer
            (Value::Builtin(a, _), Value::Builtin(b, _)) => a.name == b.name,
            (Value::Function(a, _), Value::Function(b, _)) => Rc::ptr_eq(a, b),
            (Value::Atom(a, _), Value::Atom(b, _)) => Rc::ptr_eq(a, b),
            _ => false, // Different variants are never equal
        }
    }

    /// Move the children this value owns exclusively into `pending`
    fn detach_children(&mut self, pending: &mut Vec<Value>) {
        let meta = match self {
            Value::List(items, meta) | Value::Vector(items, meta) => {
                if let Some(items) = Rc::get_mut(items) {
                    pending.append(items);
                }
                meta
            }
            Value::HashMap(map, meta) => {
                if let Some(map) = Rc::get_mut(map) {
                    pending.extend(std::mem::take(map).into_values());
                }
                meta
            }
            Value::Atom(cell, meta) => {
                if let Some(cell) = Rc::get_mut(cell) {
                    pending.push(std::mem::replace(cell.get_mut(), Value::Nil));
                }
                meta
            }
            Value::Function(closure, meta) => {
                if let Some(closure) = Rc::get_mut(closure) {
                    pending.push(std::mem::replace(&mut closure.body, Value::Nil));
                }
                meta
            }
            Value::Builtin(_, meta) => meta,
            Value::Error(err) | Value::CaughtError(err) => {
                if let Some(err) = Rc::get_mut(err) {
                    pending.push(std::mem::replace(&mut err.description, Value::Nil));
                }
                return;
            }
            _ => return,
        };
        if let Some(meta) = meta.take()
            && let Ok(meta) = Rc::try_unwrap(meta)
        {
            pending.push(meta);
        }
    }
}

impl Drop for Value {
    // Nested containers are released one level at a time instead of recursively
    fn drop(&mut self) {
        let mut pending = Vec::new();
        self.detach_children(&mut pending);
        while let Some(mut value) = pending.pop() {
            value.detach_children(&mut pending);
        }
    }
}
