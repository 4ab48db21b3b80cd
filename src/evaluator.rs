//! The evaluator: a trampoline over `(ast, environment)` pairs.
//!
//! Forms in tail position (`let*` and `do` bodies, `if` branches, quasiquote
//! results, `try*` handlers and calls to user functions) rewrite the pair and
//! loop instead of recursing, so tail-recursive programs run in constant native
//! stack. Non-tail recursion (evaluating arguments, conditions, bindings) goes
//! through [`eval`] again and counts towards [`MAX_EVAL_DEPTH`].
//!
//! Errors are values: any step that produces a [`Value::Error`] returns it
//! unchanged, and nothing to its right is evaluated.

mod environment;
mod expander;

pub use environment::Environment;
pub use expander::{is_macro_call, macroexpand, quasiquote};

use std::cell::Cell;
use std::rc::Rc;

use tracing::{debug, trace, warn};

use crate::ast::{Closure, HashMapType, VARIADIC_MARKER, Value};
use crate::builtinops::Arity;
use crate::printer::pr_str;
use crate::reader::read_str;
use crate::{ErrorKind, LispError, MAX_EVAL_DEPTH};

thread_local! {
    static EVAL_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Counts one level of non-tail evaluation for as long as it lives
struct DepthGuard;

impl DepthGuard {
    fn enter() -> Result<DepthGuard, LispError> {
        EVAL_DEPTH.with(|depth| {
            let current = depth.get();
            if current >= MAX_EVAL_DEPTH {
                warn!(max_depth = MAX_EVAL_DEPTH, "evaluation depth limit exceeded");
                return Err(LispError::new(
                    ErrorKind::RECURSION,
                    format!("Evaluation depth limit exceeded (max: {MAX_EVAL_DEPTH})"),
                ));
            }
            depth.set(current + 1);
            Ok(DepthGuard)
        })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        EVAL_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Outcome of one evaluation step
enum Trampoline {
    /// Final value of the current evaluation
    Return(Value),
    /// Continue the loop with a new expression and environment
    TailCall(Value, Environment),
}

impl From<LispError> for Trampoline {
    fn from(err: LispError) -> Self {
        Trampoline::Return(err.into())
    }
}

/// Evaluate `$expr` in `$env`, returning early from the enclosing special form on error
macro_rules! try_eval {
    ($expr:expr, $env:expr) => {
        match eval($expr, $env) {
            err @ Value::Error(_) => return Trampoline::Return(err),
            value => value,
        }
    };
}

/// Evaluate an expression (public API)
pub fn eval(ast: &Value, env: &Environment) -> Value {
    let _guard = match DepthGuard::enter() {
        Ok(guard) => guard,
        Err(err) => return err.into(),
    };

    let mut ast = ast.clone();
    let mut env = env.clone();
    loop {
        match eval_step(ast, &env) {
            Trampoline::Return(value) => return value,
            Trampoline::TailCall(next_ast, next_env) => {
                ast = next_ast;
                env = next_env;
            }
        }
    }
}

/// Read and evaluate the first form of `input`.
///
/// Returns `None` when the input holds no form; reader failures come back as
/// error values like any other failure.
pub fn eval_str(input: &str, env: &Environment) -> Option<Value> {
    match read_str(input) {
        Ok(Some(ast)) => Some(eval(&ast, env)),
        Ok(None) => None,
        Err(err) => Some(err.into()),
    }
}

fn eval_step(ast: Value, env: &Environment) -> Trampoline {
    match &ast {
        Value::List(items, _) if !items.is_empty() => {}
        Value::List(..) | Value::Error(_) => return Trampoline::Return(ast),
        _ => return Trampoline::Return(eval_ast(&ast, env)),
    }

    let expanded = macroexpand(ast, env);
    let Value::List(items, _) = &expanded else {
        return Trampoline::Return(eval_ast(&expanded, env));
    };

    let (head, args) = match items.split_first() {
        Some(parts) => parts,
        None => return Trampoline::Return(expanded.clone()),
    };

    if let Value::Symbol(name) = head {
        match name.as_str() {
            "def!" => return eval_def(args, env),
            "defmacro!" => return eval_defmacro(args, env),
            "let*" => return eval_let(args, env),
            "do" => return eval_do(args, env),
            "if" => return eval_if(args, env),
            "fn*" => return eval_fn(args, env),
            "quote" => return eval_quote(args),
            "quasiquote" => return eval_quasiquote(args, env),
            "macroexpand" => return eval_macroexpand(args, env),
            "try*" => return eval_try(args, env),
            _ => {}
        }
    }

    eval_application(items, env)
}

/// Evaluate a non-special form: symbols are looked up, containers are evaluated
/// element-wise, everything else evaluates to itself
fn eval_ast(ast: &Value, env: &Environment) -> Value {
    match ast {
        Value::Symbol(name) => env.get(name).unwrap_or_else(Value::from),
        Value::List(items, _) => match eval_sequence(items, env) {
            Ok(values) => Value::list(values),
            Err(err) => Value::Error(err),
        },
        Value::Vector(items, _) => match eval_sequence(items, env) {
            Ok(values) => Value::vector(values),
            Err(err) => Value::Error(err),
        },
        Value::HashMap(map, _) => {
            let mut evaluated = HashMapType::new();
            for (key, expr) in map.iter() {
                match eval(expr, env) {
                    err @ Value::Error(_) => return err,
                    value => {
                        evaluated.insert(key.clone(), value);
                    }
                }
            }
            Value::from(evaluated)
        }
        other => other.clone(),
    }
}

/// Evaluate `exprs` left to right, stopping at the first error
fn eval_sequence(exprs: &[Value], env: &Environment) -> Result<Vec<Value>, Rc<LispError>> {
    let mut values = Vec::with_capacity(exprs.len());
    for expr in exprs {
        let value = eval(expr, env);
        if let Value::Error(err) = &value {
            return Err(Rc::clone(err));
        }
        values.push(value);
    }
    Ok(values)
}

/// Ordinary application: evaluate the whole form, then call its head
fn eval_application(items: &[Value], env: &Environment) -> Trampoline {
    let evaluated = match eval_sequence(items, env) {
        Ok(values) => values,
        Err(err) => return Trampoline::Return(Value::Error(err)),
    };
    let Some((func, args)) = evaluated.split_first() else {
        return Trampoline::Return(Value::list(evaluated));
    };

    match func {
        Value::Builtin(op, _) => Trampoline::Return(op.call(args, env).unwrap_or_else(Value::from)),
        Value::Function(closure, _) => {
            trace!(params = ?closure.params, "tail call");
            Trampoline::TailCall(
                closure.body.clone(),
                Environment::bind(&closure.env, &closure.params, args),
            )
        }
        other => not_callable(other).into(),
    }
}

fn not_callable(value: &Value) -> LispError {
    LispError::new(
        ErrorKind::APPLY,
        format!("'{}' is not callable", pr_str(value, true)),
    )
}

/// Call `func` with already evaluated `args` outside the trampoline.
///
/// This is the entry point for native code (`apply`, `map`, `swap!`) that needs
/// to invoke a builtin or a user function and wait for its result.
pub fn apply_function(func: &Value, args: &[Value], env: &Environment) -> Value {
    match func {
        Value::Builtin(op, _) => op.call(args, env).unwrap_or_else(Value::from),
        Value::Function(closure, _) => call_closure(closure, args),
        other => not_callable(other).into(),
    }
}

/// Evaluate the body of `closure` in a fresh frame binding its parameters
pub(crate) fn call_closure(closure: &Closure, args: &[Value]) -> Value {
    eval(
        &closure.body,
        &Environment::bind(&closure.env, &closure.params, args),
    )
}

//
// Special forms
//

/// Evaluate def! special form
fn eval_def(args: &[Value], env: &Environment) -> Trampoline {
    define("def!", args, env, false)
}

/// Evaluate defmacro! special form
fn eval_defmacro(args: &[Value], env: &Environment) -> Trampoline {
    define("defmacro!", args, env, true)
}

fn define(form: &str, args: &[Value], env: &Environment, as_macro: bool) -> Trampoline {
    let [name_expr, value_expr] = args else {
        return LispError::arity(form, 2, args.len()).into();
    };
    let Value::Symbol(name) = name_expr else {
        return LispError::wrong_type(form, "symbol", name_expr).into();
    };

    let mut value = try_eval!(value_expr, env);
    if as_macro && let Value::Function(closure, meta) = &value {
        let marked = Closure {
            is_macro: true,
            ..Closure::clone(closure)
        };
        value = Value::Function(Rc::new(marked), meta.clone());
    }

    debug!(name = %name, kind = value.type_name(), "{form}");
    env.set(name.as_str(), value.clone());
    Trampoline::Return(value)
}

/// Evaluate let* special form
fn eval_let(args: &[Value], env: &Environment) -> Trampoline {
    let [bindings, body] = args else {
        return LispError::arity("let*", 2, args.len()).into();
    };
    let Some(bindings) = bindings.as_seq() else {
        return LispError::new(ErrorKind::LET, "Invalid bind form").into();
    };
    if bindings.len() % 2 != 0 {
        return LispError::new(ErrorKind::LET, "Insufficient bind forms").into();
    }

    let let_env = Environment::with_outer(env);
    for pair in bindings.chunks_exact(2) {
        let [name, expr] = pair else { continue };
        let Value::Symbol(name) = name else {
            return LispError::new(ErrorKind::LET, "Attempt to bind to non-symbol").into();
        };
        // Later bindings see earlier ones
        let value = try_eval!(expr, &let_env);
        let_env.set(name.as_str(), value);
    }

    Trampoline::TailCall(body.clone(), let_env)
}

/// Evaluate do special form
fn eval_do(args: &[Value], env: &Environment) -> Trampoline {
    let Some((last, init)) = args.split_last() else {
        return Trampoline::Return(Value::Nil);
    };
    for expr in init {
        try_eval!(expr, env);
    }
    Trampoline::TailCall(last.clone(), env.clone())
}

/// Evaluate if special form
fn eval_if(args: &[Value], env: &Environment) -> Trampoline {
    let (condition, then_expr, else_expr) = match args {
        [condition, then_expr] => (condition, then_expr, None),
        [condition, then_expr, else_expr] => (condition, then_expr, Some(else_expr)),
        _ => return LispError::arity("if", Arity::Range(2, 3), args.len()).into(),
    };

    if try_eval!(condition, env).is_truthy() {
        Trampoline::TailCall(then_expr.clone(), env.clone())
    } else if let Some(else_expr) = else_expr {
        Trampoline::TailCall(else_expr.clone(), env.clone())
    } else {
        Trampoline::Return(Value::Nil)
    }
}

/// Evaluate fn* special form
fn eval_fn(args: &[Value], env: &Environment) -> Trampoline {
    let [params, body] = args else {
        return LispError::arity("fn*", 2, args.len()).into();
    };
    match parse_params(params) {
        Ok(params) => Trampoline::Return(Value::function(Closure {
            params,
            body: body.clone(),
            env: env.clone(),
            is_macro: false,
        })),
        Err(err) => err.into(),
    }
}

/// Validate a parameter list: symbols only, with `&` allowed just before the last name
fn parse_params(params: &Value) -> Result<Vec<String>, LispError> {
    let binds_error = || LispError::new(ErrorKind::BINDS, "Illegal binds list");

    let items = params.as_seq().ok_or_else(binds_error)?;
    let names = items
        .iter()
        .map(|param| match param {
            Value::Symbol(name) => Ok(name.clone()),
            _ => Err(binds_error()),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let markers: Vec<usize> = names
        .iter()
        .enumerate()
        .filter(|(_, name)| name.as_str() == VARIADIC_MARKER)
        .map(|(index, _)| index)
        .collect();
    match markers.as_slice() {
        [] => Ok(names),
        [index] if index + 2 == names.len() => Ok(names),
        _ => Err(binds_error()),
    }
}

/// Evaluate quote special form
fn eval_quote(args: &[Value]) -> Trampoline {
    match args {
        [expr] => Trampoline::Return(expr.clone()),
        _ => LispError::arity("quote", 1, args.len()).into(),
    }
}

/// Evaluate quasiquote special form
fn eval_quasiquote(args: &[Value], env: &Environment) -> Trampoline {
    match args {
        [expr] => Trampoline::TailCall(quasiquote(expr), env.clone()),
        _ => LispError::arity("quasiquote", 1, args.len()).into(),
    }
}

/// Evaluate macroexpand special form
fn eval_macroexpand(args: &[Value], env: &Environment) -> Trampoline {
    match args {
        [expr] => Trampoline::Return(macroexpand(expr.clone(), env)),
        _ => LispError::arity("macroexpand", 1, args.len()).into(),
    }
}

/// Evaluate try* special form
fn eval_try(args: &[Value], env: &Environment) -> Trampoline {
    let (body, clause) = match args {
        [body] => return Trampoline::TailCall(body.clone(), env.clone()),
        [body, clause] => (body, clause),
        _ => return LispError::arity("try*", Arity::Range(1, 2), args.len()).into(),
    };

    let (name, handler) = match clause {
        Value::List(items, _) => match items.as_slice() {
            [Value::Symbol(catch), Value::Symbol(name), handler] if catch == "catch*" => {
                (name, handler)
            }
            _ => return LispError::new(ErrorKind::TRY, "Failing 'catch*' clause").into(),
        },
        _ => return LispError::new(ErrorKind::TRY, "Failing 'catch*' clause").into(),
    };

    let result = eval(body, env);
    if let Value::Error(err) = &result {
        debug!(kind = %err.kind, "caught error");
        let catch_env = Environment::with_outer(env);
        catch_env.set(name.as_str(), Value::CaughtError(Rc::clone(err)));
        return Trampoline::TailCall(handler.clone(), catch_env);
    }
    Trampoline::Return(result)
}
