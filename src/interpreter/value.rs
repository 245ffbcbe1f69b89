//! The runtime value representation (spec §3) and its type descriptors.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::TypeExpr;
use crate::interpreter::callable::Callable;
use crate::interpreter::class::Instance;

pub type ListRef = Rc<RefCell<Vec<Value>>>;
pub type DictRef = Rc<RefCell<IndexMap<ValueKey, Value>>>;

/// Every shape a Thorn value can take at runtime.
#[derive(Debug, Clone)]
pub enum Value {
    Number(f64),
    Str(Rc<str>),
    Bool(bool),
    Null,
    List(ListRef),
    Dict(DictRef),
    Callable(Rc<Callable>),
    Instance(Rc<RefCell<Instance>>),
    /// `Ok(payload)` — the success arm of the built-in `Result` type.
    Ok(Box<Value>),
    /// `Err(payload)` — the failure arm of the built-in `Result` type.
    Err(Box<Value>),
}

impl Value {
    pub fn str(s: impl Into<Rc<str>>) -> Value {
        Value::Str(s.into())
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn dict(entries: IndexMap<ValueKey, Value>) -> Value {
        Value::Dict(Rc::new(RefCell::new(entries)))
    }

    /// Truthiness (spec §4.5): everything is truthy except `false` and `null`.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Bool(false) | Value::Null)
    }

    pub fn type_name(&self) -> String {
        match self {
            Value::Number(_) => "number".to_string(),
            Value::Str(_) => "string".to_string(),
            Value::Bool(_) => "boolean".to_string(),
            Value::Null => "null".to_string(),
            Value::List(_) => "Array".to_string(),
            Value::Dict(_) => "Dictionary".to_string(),
            Value::Callable(_) => "Function".to_string(),
            Value::Instance(inst) => inst.borrow().class.name.clone(),
            Value::Ok(_) | Value::Err(_) => "Result".to_string(),
        }
    }

    pub fn is_equal(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Dict(a), Value::Dict(b)) => Rc::ptr_eq(a, b),
            (Value::Callable(a), Value::Callable(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            (Value::Ok(a), Value::Ok(b)) => a.is_equal(b),
            (Value::Err(a), Value::Err(b)) => a.is_equal(b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::Str(s) => write!(f, "{s}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Null => write!(f, "null"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", describe(item))?;
                }
                write!(f, "]")
            }
            Value::Dict(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, describe(v))?;
                }
                write!(f, "}}")
            }
            Value::Callable(c) => write!(f, "{c}"),
            Value::Instance(inst) => write!(f, "{} instance", inst.borrow().class.name),
            Value::Ok(v) => write!(f, "Ok({})", describe(v)),
            Value::Err(v) => write!(f, "Err({})", describe(v)),
        }
    }
}

/// Render a value the way it should appear nested inside another value's
/// `Display`, or inside a diagnostic: strings get their quotes back.
pub fn describe(value: &Value) -> String {
    match value {
        Value::Str(s) => format!("\"{s}\""),
        other => other.to_string(),
    }
}

fn format_number(n: f64) -> String {
    if n.is_infinite() {
        return if n > 0.0 { "Infinity".to_string() } else { "-Infinity".to_string() };
    }
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// A value restricted to the shapes that can key a [`Value::Dict`]. Floats
/// are keyed on their bit pattern so `NaN` keys remain distinguishable and
/// `HashMap`'s `Eq` requirement is satisfied without a partial-order hack.
#[derive(Debug, Clone)]
pub enum ValueKey {
    Number(u64),
    Str(Rc<str>),
    Bool(bool),
    Null,
}

impl ValueKey {
    pub fn from_value(value: &Value) -> Result<ValueKey, String> {
        match value {
            Value::Number(n) => Ok(ValueKey::Number(n.to_bits())),
            Value::Str(s) => Ok(ValueKey::Str(s.clone())),
            Value::Bool(b) => Ok(ValueKey::Bool(*b)),
            Value::Null => Ok(ValueKey::Null),
            other => Err(format!("value of type '{}' cannot be a dictionary key", other.type_name())),
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            ValueKey::Number(bits) => Value::Number(f64::from_bits(bits)),
            ValueKey::Str(s) => Value::Str(s),
            ValueKey::Bool(b) => Value::Bool(b),
            ValueKey::Null => Value::Null,
        }
    }
}

impl PartialEq for ValueKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ValueKey::Number(a), ValueKey::Number(b)) => a == b,
            (ValueKey::Str(a), ValueKey::Str(b)) => a == b,
            (ValueKey::Bool(a), ValueKey::Bool(b)) => a == b,
            (ValueKey::Null, ValueKey::Null) => true,
            _ => false,
        }
    }
}
impl Eq for ValueKey {}

impl std::hash::Hash for ValueKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            ValueKey::Number(bits) => bits.hash(state),
            ValueKey::Str(s) => s.hash(state),
            ValueKey::Bool(b) => b.hash(state),
            ValueKey::Null => {}
        }
    }
}

impl fmt::Display for ValueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", describe(&self.clone().into_value()))
    }
}

/// Runtime counterpart of [`TypeExpr`]: something an actual [`Value`] can be
/// checked against, used by parameter/return-type annotations when
/// optimization level ≥ O1 enables the type-annotation validation pass.
#[derive(Debug, Clone)]
pub enum TypeDescriptor {
    Named(String),
    Array(Box<TypeDescriptor>),
    Function,
    Any,
}

impl TypeDescriptor {
    pub fn from_type_expr(expr: &TypeExpr) -> TypeDescriptor {
        match expr {
            TypeExpr::Named(name) if name == "any" => TypeDescriptor::Any,
            TypeExpr::Named(name) => TypeDescriptor::Named(name.clone()),
            TypeExpr::Array(elem) => TypeDescriptor::Array(Box::new(TypeDescriptor::from_type_expr(elem))),
            TypeExpr::Function(..) => TypeDescriptor::Function,
            TypeExpr::Generic(name, _) => TypeDescriptor::Named(name.clone()),
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        match self {
            TypeDescriptor::Any => true,
            TypeDescriptor::Function => matches!(value, Value::Callable(_)),
            TypeDescriptor::Array(elem) => match value {
                Value::List(items) => items.borrow().iter().all(|v| elem.matches(v)),
                _ => false,
            },
            TypeDescriptor::Named(name) => match name.as_str() {
                "string" => matches!(value, Value::Str(_)),
                "number" => matches!(value, Value::Number(_)),
                "boolean" => matches!(value, Value::Bool(_)),
                "null" => matches!(value, Value::Null),
                "void" => matches!(value, Value::Null),
                "Result" => matches!(value, Value::Ok(_) | Value::Err(_)),
                class_name => value.type_name() == class_name,
            },
        }
    }
}
