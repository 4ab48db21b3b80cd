//! rustmal - an interpreter for a small Lisp-family language
//!
//! The crate provides a reader that turns text into [`ast::Value`] trees, a
//! lexically scoped [`evaluator::Environment`] chain, and an evaluator with
//! proper tail calls, closures, variadic parameters, unhygienic macros,
//! quasiquoting and value-based error propagation.
//!
//! ```lisp
//! (def! sum2 (fn* (n acc) (if (= n 0) acc (sum2 (- n 1) (+ n acc)))))
//! (sum2 10000 0)                              ; => 50005000, constant stack
//! `(1 ~a ~@xs)                                ; quasiquote
//! (try* (throw {:code 7}) (catch* e e))       ; => {:code 7}
//! ```
//!
//! ## Errors are values
//!
//! Runtime failures are not Rust panics and not `Err` results from
//! [`evaluator::eval`]: they are [`ast::Value::Error`] values that every
//! composing form returns unchanged until a `try*`/`catch*` intercepts them.
//! Host-level code (the reader and the native library) works with
//! `Result<_, LispError>` and the evaluator converts at the boundary.
//!
//! ## Modules
//!
//! - `ast`: the runtime value model
//! - `reader`: tokenizer and recursive-descent reader
//! - `printer`: readable and display serialization
//! - `evaluator`: trampoline, special forms, environments, macro expansion
//! - `builtinops`: native function library and global environment
//! - `prelude`: language-level definitions loaded into the global environment

use std::borrow::Cow;
use std::fmt;

use crate::ast::Value;

/// Maximum nesting depth accepted by the reader.
/// Deeper input is rejected with a `ParseError` instead of exhausting the native stack.
pub const MAX_PARSE_DEPTH: usize = 512;

/// Maximum depth of non-tail evaluator recursion.
/// Tail calls run inside the trampoline and never count towards this limit.
/// Sized to stay within a default 2 MiB thread stack in unoptimized builds.
pub const MAX_EVAL_DEPTH: usize = 200;

/// Tag naming the kind of a [`LispError`].
///
/// Kinds are open-ended: the associated constants cover the kinds the
/// interpreter itself produces, and [`ErrorKind::new`] builds any other tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ErrorKind(Cow<'static, str>);

impl ErrorKind {
    pub const ARG: ErrorKind = ErrorKind(Cow::Borrowed("ArgError"));
    pub const ARITHMETIC: ErrorKind = ErrorKind(Cow::Borrowed("ArithmeticError"));
    pub const INDEX: ErrorKind = ErrorKind(Cow::Borrowed("IndexError"));
    pub const TYPE: ErrorKind = ErrorKind(Cow::Borrowed("TypeError"));
    pub const FILE: ErrorKind = ErrorKind(Cow::Borrowed("FileError"));
    pub const SYMBOL: ErrorKind = ErrorKind(Cow::Borrowed("SymbolError"));
    pub const TRY: ErrorKind = ErrorKind(Cow::Borrowed("TryError"));
    pub const BINDS: ErrorKind = ErrorKind(Cow::Borrowed("BindsError"));
    pub const LET: ErrorKind = ErrorKind(Cow::Borrowed("LetError"));
    pub const APPLY: ErrorKind = ErrorKind(Cow::Borrowed("ApplyError"));
    pub const PAREN: ErrorKind = ErrorKind(Cow::Borrowed("ParenError"));
    pub const HASH: ErrorKind = ErrorKind(Cow::Borrowed("HashError"));
    pub const PARSE: ErrorKind = ErrorKind(Cow::Borrowed("ParseError"));
    pub const USER: ErrorKind = ErrorKind(Cow::Borrowed("UserError"));
    pub const RECURSION: ErrorKind = ErrorKind(Cow::Borrowed("RecursionError"));

    pub fn new(tag: impl Into<Cow<'static, str>>) -> Self {
        ErrorKind(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A failure raised by the reader, a native function or the evaluator.
///
/// The description is an arbitrary [`Value`], not necessarily text: `throw`
/// stores its payload here untouched so that `catch*` hands back the same
/// structure that was thrown.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {}", printer::pr_str(.description, false))]
pub struct LispError {
    pub kind: ErrorKind,
    pub description: Value,
}

impl LispError {
    pub fn new(kind: ErrorKind, description: impl Into<Value>) -> Self {
        LispError {
            kind,
            description: description.into(),
        }
    }

    /// Programmer-raised error carrying `payload` unchanged.
    pub fn user(payload: Value) -> Self {
        Self::new(ErrorKind::USER, payload)
    }

    pub fn arg(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ARG, message.into())
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TYPE, message.into())
    }

    /// Wrong number of arguments passed to the named form or function.
    pub fn arity(name: &str, expected: impl fmt::Display, got: usize) -> Self {
        Self::arg(format!(
            "'{name}' requires {expected} argument(s), received {got}"
        ))
    }

    /// Wrong argument type passed to the named form or function.
    pub fn wrong_type(name: &str, expected: &str, got: &Value) -> Self {
        Self::arg(format!(
            "'{name}': Wrong type argument: expected {expected}, got {}",
            got.type_name()
        ))
    }
}

pub mod ast;
pub mod builtinops;
pub mod evaluator;
pub mod prelude;
pub mod printer;
pub mod reader;

pub use builtinops::create_global_env;
pub use evaluator::{Environment, eval, eval_str};

/// Read, evaluate and print one line of input.
///
/// Returns `None` when the input holds no form (blank or comment-only).
/// Errors, whether from the reader or from evaluation, are printed like any
/// other result.
pub fn rep(input: &str, env: &Environment) -> Option<String> {
    eval_str(input, env).map(|value| printer::pr_str(&value, true))
}
