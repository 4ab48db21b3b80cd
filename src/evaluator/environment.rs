use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{VARIADIC_MARKER, Value};
use crate::{ErrorKind, LispError};

/// One frame of bindings plus a link to the enclosing frame
#[derive(Default)]
struct Frame {
    bindings: RefCell<HashMap<String, Value>>,
    outer: Option<Environment>,
}

/// Environment for variable bindings
///
/// Cloning an `Environment` clones the handle, not the bindings: every clone sees
/// (and mutates) the same frame. Closures capture their defining frame this way.
#[derive(Clone, Default)]
pub struct Environment(Rc<Frame>);

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Bindings may hold closures capturing this very frame, so only names are printed
        let mut names: Vec<String> = self.0.bindings.borrow().keys().cloned().collect();
        names.sort();
        f.debug_struct("Environment")
            .field("names", &names)
            .field("has_outer", &self.0.outer.is_some())
            .finish()
    }
}

impl PartialEq for Environment {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Environment {
    /// Empty root frame
    pub fn new() -> Self {
        Environment::default()
    }

    /// Empty frame enclosed by `outer`
    pub fn with_outer(outer: &Environment) -> Self {
        Environment(Rc::new(Frame {
            bindings: RefCell::new(HashMap::new()),
            outer: Some(outer.clone()),
        }))
    }

    /// Frame enclosed by `outer` with `params` bound to `args`.
    ///
    /// When the variadic marker `&` is met, the parameter after it is bound to a
    /// list of all remaining arguments. Parameters without an argument are bound
    /// to nil.
    pub fn bind(outer: &Environment, params: &[String], args: &[Value]) -> Self {
        let env = Environment::with_outer(outer);
        {
            let mut bindings = env.0.bindings.borrow_mut();
            for (i, param) in params.iter().enumerate() {
                if param == VARIADIC_MARKER {
                    if let Some(rest_name) = params.get(i + 1) {
                        let rest = args.get(i..).unwrap_or_default().to_vec();
                        bindings.insert(rest_name.clone(), Value::list(rest));
                    }
                    break;
                }
                let value = args.get(i).cloned().unwrap_or(Value::Nil);
                bindings.insert(param.clone(), value);
            }
        }
        env
    }

    /// Bind `name` in this frame, shadowing any outer binding
    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.0.bindings.borrow_mut().insert(name.into(), value);
    }

    /// Innermost frame that binds `name`
    pub fn find(&self, name: &str) -> Option<Environment> {
        let mut current = self;
        loop {
            if current.0.bindings.borrow().contains_key(name) {
                return Some(current.clone());
            }
            current = current.0.outer.as_ref()?;
        }
    }

    /// Value bound to `name` in the innermost frame that binds it
    pub fn lookup(&self, name: &str) -> Option<Value> {
        let mut current = self;
        loop {
            if let Some(value) = current.0.bindings.borrow().get(name) {
                return Some(value.clone());
            }
            current = current.0.outer.as_ref()?;
        }
    }

    /// Resolve `name`, reporting unbound symbols as `SymbolError`
    pub fn get(&self, name: &str) -> Result<Value, LispError> {
        self.lookup(name).ok_or_else(|| {
            LispError::new(
                ErrorKind::SYMBOL,
                format!("Symbol value is void: '{name}'"),
            )
        })
    }

    /// Outermost frame of the chain
    pub fn root(&self) -> Environment {
        let mut current = self;
        while let Some(outer) = &current.0.outer {
            current = outer;
        }
        current.clone()
    }

    /// Get all bindings in this environment and its parents
    /// Returns a Vec of (name, value) pairs sorted by name
    pub fn get_all_bindings(&self) -> Vec<(String, Value)> {
        let mut bindings = HashMap::new();

        // Start with outer bindings (so they can be overridden by local bindings)
        if let Some(outer) = &self.0.outer {
            bindings.extend(outer.get_all_bindings());
        }

        for (name, value) in self.0.bindings.borrow().iter() {
            bindings.insert(name.clone(), value.clone());
        }

        let mut result: Vec<_> = bindings.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}
