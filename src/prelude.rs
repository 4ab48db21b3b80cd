//! Definitions written in the language itself, evaluated into every global
//! environment after the natives are bound.

use tracing::warn;

use crate::ast::Value;
use crate::evaluator::{Environment, eval_str};

/// Prelude forms, evaluated in order
const PRELUDE: &[&str] = &[
    "(def! not (fn* (a) (if a false true)))",
    r#"(def! load-file (fn* (f) (eval (read-string (str "(do " (slurp f) "\nnil)")))))"#,
    "(def! *gensym-counter* (atom 0))",
    r#"(def! gensym (fn* () (symbol (str "G__" (swap! *gensym-counter* (fn* [x] (+ 1 x)))))))"#,
    r#"(defmacro! cond (fn* (& xs)
        (if (> (count xs) 0)
          (list 'if (first xs)
                (if (> (count xs) 1) (nth xs 1) (throw "odd number of forms to cond"))
                (cons 'cond (rest (rest xs)))))))"#,
    "(defmacro! or (fn* (& xs)
        (if (empty? xs)
          nil
          (if (= 1 (count xs))
            (first xs)
            (let* (condvar (gensym))
              `(let* (~condvar ~(first xs))
                 (if ~condvar ~condvar (or ~@(rest xs)))))))))",
    "(defmacro! and (fn* (& xs)
        (if (empty? xs)
          true
          (if (= 1 (count xs))
            (first xs)
            (let* (condvar (gensym))
              `(let* (~condvar ~(first xs))
                 (if ~condvar (and ~@(rest xs)) ~condvar)))))))",
    "(defmacro! when (fn* (test & body) `(if ~test (do ~@body))))",
    "(defmacro! -> (fn* (x & forms)
        (if (empty? forms)
          x
          (let* (form (first forms)
                 threaded (if (list? form) `(~(first form) ~x ~@(rest form)) (list form x)))
            `(-> ~threaded ~@(rest forms))))))",
    "(defmacro! ->> (fn* (x & forms)
        (if (empty? forms)
          x
          (let* (form (first forms)
                 threaded (if (list? form) `(~@form ~x) (list form x)))
            `(->> ~threaded ~@(rest forms))))))",
];

/// Evaluate every prelude form in `env`
pub fn load(env: &Environment) {
    for source in PRELUDE {
        if let Some(Value::Error(err)) = &eval_str(source, env) {
            warn!(%err, "prelude definition failed");
        }
    }
}
