//! Classes and instances (spec §3, §4.5).

use std::collections::HashMap;
use std::rc::Rc;

use crate::interpreter::callable::Callable;
use crate::interpreter::value::Value;

/// A class as a first-class value: its name and its method table. Thorn has
/// no inheritance, so method lookup is a single hash lookup, not a chain walk.
#[derive(Debug)]
pub struct Class {
    pub name: String,
    pub methods: HashMap<String, Rc<Callable>>,
}

impl Class {
    pub fn find_method(&self, name: &str) -> Option<Rc<Callable>> {
        self.methods.get(name).cloned()
    }
}

/// Wrapped in `Rc<RefCell<Instance>>` by [`Value::Instance`], so field
/// mutation borrows the whole instance rather than a nested cell.
#[derive(Debug)]
pub struct Instance {
    pub class: Rc<Class>,
    pub fields: HashMap<String, Value>,
}

impl Instance {
    pub fn new(class: Rc<Class>) -> Self {
        Self {
            class,
            fields: HashMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.fields.get(name).cloned()
    }

    pub fn set(&mut self, name: &str, value: Value) {
        self.fields.insert(name.to_string(), value);
    }
}
