//! Callable values: user functions, lambdas, bound methods, native functions,
//! classes (which are callable as constructors), and overload groups.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::ast::{FunctionDecl, LambdaBody, Param, TypeExpr};
use crate::error::ThornResult;
use crate::interpreter::class::Class;
use crate::interpreter::environment::Environment;
use crate::interpreter::value::Value;
use crate::interpreter::Interpreter;

/// How many arguments a native function accepts.
#[derive(Debug, Clone, Copy)]
pub enum Arity {
    Exact(usize),
    /// `min..=max`, used by natives like `String.slice(start, end?)`.
    Range(usize, usize),
}

impl Arity {
    pub fn accepts(&self, n: usize) -> bool {
        match self {
            Arity::Exact(k) => n == *k,
            Arity::Range(min, max) => n >= *min && n <= *max,
        }
    }
}

pub type NativeFn = Rc<dyn Fn(&mut Interpreter, Vec<Value>) -> ThornResult<Value>>;

pub struct NativeFunction {
    pub name: String,
    pub arity: Arity,
    pub func: NativeFn,
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction").field("name", &self.name).finish()
    }
}

/// A user-defined function or method, closing over the environment it was
/// declared in (spec §4.3).
#[derive(Debug)]
pub struct UserFunction {
    pub decl: Rc<FunctionDecl>,
    pub closure: Rc<RefCell<Environment>>,
}

impl UserFunction {
    pub fn arity(&self) -> usize {
        self.decl.params.len()
    }
}

/// A `$(...)=> ...` lambda. Structurally identical to a user function except
/// it has no name token and its body may be a single expression.
#[derive(Debug)]
pub struct LambdaFunction {
    pub params: Vec<Param>,
    pub return_type: Option<TypeExpr>,
    pub body: Rc<LambdaBody>,
    pub closure: Rc<RefCell<Environment>>,
}

#[derive(Debug)]
pub struct BoundMethod {
    pub receiver: Value,
    pub method: Rc<Callable>,
}

/// Multiple declarations of the same name at different arities collapse into
/// one callable that dispatches on argument count at call time, rather than
/// the later definition silently shadowing the earlier one.
#[derive(Debug)]
pub struct FunctionGroup {
    pub name: String,
    pub overloads: Vec<Rc<Callable>>,
}

#[derive(Debug)]
pub enum Callable {
    User(UserFunction),
    Lambda(LambdaFunction),
    Native(NativeFunction),
    Bound(BoundMethod),
    Class(Rc<Class>),
    Group(FunctionGroup),
}

impl Callable {
    pub fn name(&self) -> String {
        match self {
            Callable::User(f) => f.decl.name.lexeme.clone(),
            Callable::Lambda(_) => "<lambda>".to_string(),
            Callable::Native(f) => f.name.clone(),
            Callable::Bound(b) => b.method.name(),
            Callable::Class(c) => c.name.clone(),
            Callable::Group(g) => g.name.clone(),
        }
    }

    pub fn accepts_arity(&self, n: usize) -> bool {
        match self {
            Callable::User(f) => f.arity() == n,
            Callable::Lambda(f) => f.params.len() == n,
            Callable::Native(f) => f.arity.accepts(n),
            Callable::Bound(b) => b.method.accepts_arity(n),
            Callable::Class(c) => match c.find_method("init") {
                Some(init) => init.accepts_arity(n),
                None => n == 0,
            },
            Callable::Group(g) => g.overloads.iter().any(|o| o.accepts_arity(n)),
        }
    }

    /// Pick the overload in a [`Callable::Group`] matching this argument
    /// count, or `self` unchanged when it isn't a group.
    pub fn resolve(self: &Rc<Self>, argc: usize) -> Option<Rc<Callable>> {
        match self.as_ref() {
            Callable::Group(g) => g.overloads.iter().find(|o| o.accepts_arity(argc)).cloned(),
            _ => Some(self.clone()),
        }
    }
}

impl fmt::Display for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Class(c) => write!(f, "<class {}>", c.name),
            other => write!(f, "<fn {}>", other.name()),
        }
    }
}

impl Callable {
    /// The fixed argument count for callables that can participate in
    /// overload grouping. Natives, classes, bound methods, and existing
    /// groups fall outside this and simply replace on redeclaration.
    fn fixed_arity(&self) -> Option<usize> {
        match self {
            Callable::User(f) => Some(f.arity()),
            Callable::Lambda(f) => Some(f.params.len()),
            _ => None,
        }
    }
}

/// Fold a newly declared function into the existing binding for its name, if
/// any: same arity replaces (redeclaration), different arity joins a group
/// (spec §4.3) so calls dispatch on argument count.
pub fn merge_callable(existing: Option<Rc<Callable>>, incoming: Rc<Callable>) -> Rc<Callable> {
    let (Some(existing), Some(incoming_arity)) = (existing, incoming.fixed_arity()) else {
        return incoming;
    };

    let mut overloads = match existing.as_ref() {
        Callable::Group(g) => g.overloads.clone(),
        _ if existing.fixed_arity().is_none() => {
            // Not an overloadable shape (native/class/bound method): the new
            // declaration simply shadows it.
            return incoming;
        }
        _ => vec![existing.clone()],
    };

    overloads.retain(|o| o.fixed_arity() != Some(incoming_arity));
    overloads.push(incoming.clone());

    if overloads.len() == 1 {
        overloads.pop().unwrap()
    } else {
        Rc::new(Callable::Group(FunctionGroup {
            name: incoming.name(),
            overloads,
        }))
    }
}

