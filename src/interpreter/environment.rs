//! Lexical scopes as a chain of frames (spec §4.3).
//!
//! Each frame is reference-counted and individually mutable so closures can
//! share and outlive the block that created them. A frame remembers the name
//! it last resolved and how many hops up the chain it took, so a tight loop
//! that repeatedly reads the same outer variable doesn't re-walk the chain
//! on every iteration.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use once_cell::sync::Lazy;

use crate::error::{ThornError, ThornResult};
use crate::interpreter::callable::{merge_callable, Callable};
use crate::interpreter::value::Value;
use crate::token::Token;

/// `thorn.debug.types` in the process environment enables a `trace!` line on
/// every `define` reporting the bound value's runtime type; read once since
/// `define` runs on every variable declaration.
static TRACE_TYPES: Lazy<bool> = Lazy::new(|| std::env::var("thorn.debug.types").is_ok());

#[derive(Debug)]
pub struct Environment {
    values: HashMap<String, Value>,
    immutable: HashSet<String>,
    enclosing: Option<Rc<RefCell<Environment>>>,
    /// Last name resolved from this frame and how many `enclosing` hops it
    /// took to find it; invalidated whenever a shadowing `define` occurs.
    cache: RefCell<Option<(String, usize)>>,
}

impl Environment {
    pub fn new() -> Rc<RefCell<Environment>> {
        Rc::new(RefCell::new(Environment {
            values: HashMap::new(),
            immutable: HashSet::new(),
            enclosing: None,
            cache: RefCell::new(None),
        }))
    }

    pub fn child(enclosing: &Rc<RefCell<Environment>>) -> Rc<RefCell<Environment>> {
        Rc::new(RefCell::new(Environment {
            values: HashMap::new(),
            immutable: HashSet::new(),
            enclosing: Some(enclosing.clone()),
            cache: RefCell::new(None),
        }))
    }

    pub fn define(&mut self, name: &str, value: Value, immutable: bool) {
        if *TRACE_TYPES {
            log::trace!("define '{name}': {}", value.type_name());
        }
        self.values.insert(name.to_string(), value);
        if immutable {
            self.immutable.insert(name.to_string());
        } else {
            self.immutable.remove(name);
        }
        *self.cache.borrow_mut() = None;
    }

    /// Declares or extends a named function binding, merging into a
    /// [`Callable::Group`] when the name already holds a different arity.
    pub fn define_function(&mut self, name: &str, callable: Rc<Callable>) {
        let existing = self.values.get(name).and_then(|v| match v {
            Value::Callable(c) => Some(c.clone()),
            _ => None,
        });
        let merged = merge_callable(existing, callable);
        self.values.insert(name.to_string(), Value::Callable(merged));
        self.immutable.insert(name.to_string());
        *self.cache.borrow_mut() = None;
    }

    pub fn get(&self, name: &Token) -> ThornResult<Value> {
        if let Some(value) = self.values.get(&name.lexeme) {
            *self.cache.borrow_mut() = Some((name.lexeme.clone(), 0));
            return Ok(value.clone());
        }

        if let Some((cached_name, depth)) = self.cache.borrow().clone() {
            if cached_name == name.lexeme && depth > 0 {
                if let Some(value) = self.get_at(depth, &name.lexeme) {
                    return Ok(value);
                }
            }
        }

        let mut depth = 1;
        let mut frame = self.enclosing.clone();
        while let Some(current) = frame {
            let current_ref = current.borrow();
            if let Some(value) = current_ref.values.get(&name.lexeme) {
                let value = value.clone();
                drop(current_ref);
                *self.cache.borrow_mut() = Some((name.lexeme.clone(), depth));
                return Ok(value);
            }
            frame = current_ref.enclosing.clone();
            depth += 1;
        }

        Err(undefined(name))
    }

    fn get_at(&self, depth: usize, name: &str) -> Option<Value> {
        let mut frame = self.enclosing.clone()?;
        for _ in 1..depth {
            let next = frame.borrow().enclosing.clone()?;
            frame = next;
        }
        let value = frame.borrow().values.get(name).cloned();
        value
    }

    pub fn assign(&mut self, name: &Token, value: Value) -> ThornResult<()> {
        if self.values.contains_key(&name.lexeme) {
            if self.immutable.contains(&name.lexeme) {
                return Err(ThornError::Runtime {
                    line: name.line,
                    token: name.lexeme.clone(),
                    message: format!("Cannot assign to immutable variable '{}'", name.lexeme),
                });
            }
            self.values.insert(name.lexeme.clone(), value);
            return Ok(());
        }

        if let Some(enclosing) = &self.enclosing {
            return enclosing.borrow_mut().assign(name, value);
        }

        Err(undefined(name))
    }

    pub fn is_defined_here(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// This frame's own binding for `name`, ignoring `enclosing`; used by
    /// `for` to remember what a loop variable shadowed so it can restore it
    /// afterward instead of leaving the loop's last value behind.
    pub fn local_binding(&self, name: &str) -> Option<(Value, bool)> {
        self.values
            .get(name)
            .map(|v| (v.clone(), self.immutable.contains(name)))
    }

    /// Drops `name` from this frame entirely, as if it had never been
    /// defined here.
    pub fn undefine(&mut self, name: &str) {
        self.values.remove(name);
        self.immutable.remove(name);
        *self.cache.borrow_mut() = None;
    }
}

fn undefined(name: &Token) -> ThornError {
    ThornError::Runtime {
        line: name.line,
        token: name.lexeme.clone(),
        message: format!("Undefined variable '{}'", name.lexeme),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(name: &str) -> Token {
        Token::new(crate::token::TokenKind::Identifier, name, 1)
    }

    #[test]
    fn reads_through_enclosing_frames() {
        let global = Environment::new();
        global.borrow_mut().define("x", Value::Number(1.0), false);
        let child = Environment::child(&global);
        assert!(matches!(child.borrow().get(&token("x")), Ok(Value::Number(n)) if n == 1.0));
    }

    #[test]
    fn rejects_assignment_to_immutable() {
        let env = Environment::new();
        env.borrow_mut().define("x", Value::Number(1.0), true);
        let result = env.borrow_mut().assign(&token("x"), Value::Number(2.0));
        assert!(result.is_err());
    }

    #[test]
    fn assignment_reaches_enclosing_frame() {
        let global = Environment::new();
        global.borrow_mut().define("x", Value::Number(1.0), false);
        let child = Environment::child(&global);
        child.borrow_mut().assign(&token("x"), Value::Number(9.0)).unwrap();
        assert!(matches!(global.borrow().get(&token("x")), Ok(Value::Number(n)) if n == 9.0));
    }

    #[test]
    fn undefined_variable_is_an_error() {
        let env = Environment::new();
        assert!(env.borrow().get(&token("missing")).is_err());
    }
}
