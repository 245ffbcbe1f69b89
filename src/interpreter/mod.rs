//! Tree-walking evaluator (spec §4.5).
//!
//! Control flow that isn't a Rust `Result` — `return`, `throw` — is modeled
//! as interpreter state rather than an exception type: `return_value` is
//! polled after every statement, and `throw` always produces
//! `ThornError::Throw`, downgraded from a `Runtime` fault whenever
//! `try_depth > 0` so a `try`/`catch` can actually catch it (spec §7).

pub mod builtins;
pub mod callable;
pub mod class;
pub mod environment;
pub mod module;
pub mod value;

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::{Expr, FunctionDecl, LambdaBody, Literal, MatchBody, Param, Pattern, Stmt};
use crate::error::{ThornError, ThornResult};
use crate::interpreter::callable::{
    Arity, BoundMethod, Callable, FunctionGroup, LambdaFunction, NativeFn, NativeFunction, UserFunction,
};
use crate::interpreter::class::{Class, Instance};
use crate::interpreter::environment::Environment;
use crate::interpreter::module::ModuleLoader;
use crate::interpreter::value::{describe, TypeDescriptor, Value, ValueKey};
use crate::token::{Token, TokenKind};

pub struct Interpreter {
    pub(crate) globals: Rc<RefCell<Environment>>,
    environment: Rc<RefCell<Environment>>,
    module_loader: Rc<RefCell<ModuleLoader>>,
    stdout: Rc<RefCell<dyn std::io::Write>>,
    current_dir: PathBuf,
    try_depth: usize,
    return_value: Option<Value>,
    exports: HashMap<String, Value>,
    /// Set while evaluating the direct argument of an `Ok(...)`/`Err(...)`
    /// call so division by zero there yields IEEE infinity instead of
    /// faulting (spec §4.6 edge case).
    allow_div_infinity: bool,
}

impl Interpreter {
    pub fn new(stdout: Rc<RefCell<dyn std::io::Write>>) -> Self {
        let globals = Environment::new();
        let mut interp = Self {
            globals: globals.clone(),
            environment: globals,
            module_loader: Rc::new(RefCell::new(ModuleLoader::new())),
            stdout,
            current_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            try_depth: 0,
            return_value: None,
            exports: HashMap::new(),
            allow_div_infinity: false,
        };
        builtins::register_prelude(&mut interp);
        interp
    }

    fn for_module(&self, dir: PathBuf) -> Interpreter {
        let globals = Environment::new();
        let mut interp = Interpreter {
            globals: globals.clone(),
            environment: globals,
            module_loader: self.module_loader.clone(),
            stdout: self.stdout.clone(),
            current_dir: dir,
            try_depth: 0,
            return_value: None,
            exports: HashMap::new(),
            allow_div_infinity: false,
        };
        builtins::register_prelude(&mut interp);
        interp
    }

    pub fn set_current_dir(&mut self, dir: PathBuf) {
        self.current_dir = dir;
    }

    pub fn write_stdout(&self, text: &str) {
        use std::io::Write;
        let _ = self.stdout.borrow_mut().write_all(text.as_bytes());
    }

    pub fn register_native(
        &mut self,
        name: &str,
        arity: Arity,
        f: impl Fn(&mut Interpreter, Vec<Value>) -> ThornResult<Value> + 'static,
    ) {
        let native: NativeFn = Rc::new(f);
        let callable = Rc::new(Callable::Native(NativeFunction {
            name: name.to_string(),
            arity,
            func: native,
        }));
        self.globals.borrow_mut().define(name, Value::Callable(callable), true);
    }

    pub fn register_native_class(&mut self, name: &str, ctor: impl Fn(&mut Interpreter, Vec<Value>) -> ThornResult<Value> + 'static) {
        self.register_native(name, Arity::Range(0, 8), ctor);
    }

    pub fn run_program(&mut self, program: &[Stmt]) -> ThornResult<Value> {
        let mut last = Value::Null;
        for stmt in program {
            if let Stmt::Expression(expr) = stmt {
                last = self.evaluate(expr)?;
            } else {
                self.execute(stmt)?;
            }
            if self.return_value.is_some() {
                break;
            }
        }
        Ok(self.return_value.take().unwrap_or(last))
    }

    pub fn take_exports(&mut self) -> HashMap<String, Value> {
        std::mem::take(&mut self.exports)
    }

    // ---- statement execution -------------------------------------------------

    fn execute(&mut self, stmt: &Stmt) -> ThornResult<()> {
        match stmt {
            Stmt::Expression(expr) => {
                self.evaluate(expr)?;
            }
            Stmt::Block(stmts) => {
                let child = Environment::child(&self.environment);
                self.execute_in(stmts, child)?;
            }
            Stmt::Var {
                name,
                init,
                immutable,
                ..
            } => {
                let value = match init {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Null,
                };
                self.environment.borrow_mut().define(&name.lexeme, value, *immutable);
            }
            Stmt::Function(decl) => self.declare_function(decl)?,
            Stmt::Class {
                name,
                methods,
                ..
            } => self.declare_class(name, methods)?,
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.execute(then_branch)?;
                } else if let Some(else_branch) = else_branch {
                    self.execute(else_branch)?;
                }
            }
            Stmt::While { condition, body } => {
                // `while (var < literal)` with a numeric `var` skips the general
                // binary-expression dispatch each iteration and compares the
                // bound value directly; it drops back to re-evaluating
                // `condition` the normal way the moment `var` stops holding a
                // number (spec §4.5).
                let mut fast_path = while_numeric_fast_path(condition);
                loop {
                    let keep_going = match fast_path {
                        Some((var, limit)) => {
                            let current = self.environment.borrow().get(var).ok();
                            match current {
                                Some(Value::Number(n)) => n < limit,
                                _ => {
                                    fast_path = None;
                                    self.evaluate(condition)?.is_truthy()
                                }
                            }
                        }
                        None => self.evaluate(condition)?.is_truthy(),
                    };
                    if !keep_going {
                        break;
                    }
                    self.execute(body)?;
                    if self.return_value.is_some() {
                        break;
                    }
                }
            }
            Stmt::For { var, iterable, body } => {
                let iterable_value = self.evaluate(iterable)?;
                let items = self.iterate(iterable_value, var)?;
                // The loop variable is bound directly in the *current* frame
                // each iteration rather than a fresh per-iteration one, to
                // skip a `define` per iteration; whatever it shadowed there
                // (or its absence) is restored once the loop ends (spec §9
                // open-question resolution).
                let shadowed = self.environment.borrow().local_binding(&var.lexeme);
                for item in items {
                    self.environment.borrow_mut().define(&var.lexeme, item, false);
                    self.execute(body)?;
                    if self.return_value.is_some() {
                        break;
                    }
                }
                match shadowed {
                    Some((value, immutable)) => {
                        self.environment.borrow_mut().define(&var.lexeme, value, immutable);
                    }
                    None => self.environment.borrow_mut().undefine(&var.lexeme),
                }
            }
            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Null,
                };
                self.return_value = Some(value);
            }
            Stmt::Throw { keyword, value } => {
                let value = self.evaluate(value)?;
                return Err(self.fault_value(keyword, value));
            }
            Stmt::TryCatch {
                try_block,
                catch_var,
                catch_block,
            } => {
                self.try_depth += 1;
                let result = self.execute(try_block);
                self.try_depth -= 1;

                match result {
                    Ok(()) => {}
                    Err(ThornError::Throw(value)) => {
                        let child = Environment::child(&self.environment);
                        if let Some(catch_var) = catch_var {
                            child.borrow_mut().define(&catch_var.lexeme, value, false);
                        }
                        let previous = std::mem::replace(&mut self.environment, child);
                        let outcome = self.execute(catch_block);
                        self.environment = previous;
                        outcome?;
                    }
                    Err(other) => return Err(other),
                }
            }
            Stmt::Import { module, names, keyword } => self.exec_import(module, names, keyword)?,
            Stmt::Export(inner) => self.exec_export(inner)?,
            Stmt::ExportIdentifier(name) => {
                let value = self.environment.borrow().get(name)?;
                self.exports.insert(name.lexeme.clone(), value);
            }
            Stmt::TypeAlias { .. } => {}
        }
        Ok(())
    }

    fn execute_in(&mut self, stmts: &[Stmt], env: Rc<RefCell<Environment>>) -> ThornResult<()> {
        let previous = std::mem::replace(&mut self.environment, env);
        let result = (|| {
            for stmt in stmts {
                self.execute(stmt)?;
                if self.return_value.is_some() {
                    break;
                }
            }
            Ok(())
        })();
        self.environment = previous;
        result
    }

    fn exec_export(&mut self, inner: &Stmt) -> ThornResult<()> {
        self.execute(inner)?;
        let name = match inner {
            Stmt::Var { name, .. } => Some(&name.lexeme),
            Stmt::Function(decl) => Some(&decl.name.lexeme),
            Stmt::Class { name, .. } => Some(&name.lexeme),
            _ => None,
        };
        if let Some(name) = name {
            let value = self.environment.borrow().get(&Token::new(TokenKind::Identifier, name.clone(), 0))?;
            self.exports.insert(name.clone(), value);
        }
        Ok(())
    }

    fn declare_function(&mut self, decl: &FunctionDecl) -> ThornResult<()> {
        let callable = Rc::new(Callable::User(UserFunction {
            decl: Rc::new(decl.clone()),
            closure: self.environment.clone(),
        }));
        self.environment.borrow_mut().define_function(&decl.name.lexeme, callable);
        Ok(())
    }

    fn declare_class(&mut self, name: &Token, methods: &[FunctionDecl]) -> ThornResult<()> {
        let mut table = HashMap::new();
        for method in methods {
            let incoming = Rc::new(Callable::User(UserFunction {
                decl: Rc::new(method.clone()),
                closure: self.environment.clone(),
            }));
            let merged = crate::interpreter::callable::merge_callable(table.remove(&method.name.lexeme), incoming);
            table.insert(method.name.lexeme.clone(), merged);
        }
        let class = Rc::new(Class {
            name: name.lexeme.clone(),
            methods: table,
        });
        self.environment
            .borrow_mut()
            .define(&name.lexeme, Value::Callable(Rc::new(Callable::Class(class))), true);
        Ok(())
    }

    fn iterate(&self, value: Value, anchor: &Token) -> ThornResult<Vec<Value>> {
        match value {
            Value::List(items) => Ok(items.borrow().clone()),
            Value::Dict(entries) => Ok(entries.borrow().values().cloned().collect()),
            Value::Str(s) => Ok(s.chars().map(|c| Value::str(c.to_string())).collect()),
            other => Err(ThornError::Runtime {
                line: anchor.line,
                token: anchor.lexeme.clone(),
                message: format!("'{}' is not iterable", other.type_name()),
            }),
        }
    }

    // ---- expression evaluation ------------------------------------------------

    fn evaluate(&mut self, expr: &Expr) -> ThornResult<Value> {
        match expr {
            Expr::Literal(lit) => Ok(literal_value(lit)),
            Expr::Grouping(inner) => self.evaluate(inner),
            Expr::Variable(name) => self.environment.borrow().get(name),
            Expr::This(name) => self.environment.borrow().get(name),
            Expr::Assign { name, value } => {
                let value = self.evaluate(value)?;
                self.environment.borrow_mut().assign(name, value.clone())?;
                Ok(value)
            }
            Expr::Logical { left, operator, right } => self.eval_logical(left, operator, right),
            Expr::Unary { operator, right } => self.eval_unary(operator, right),
            Expr::Binary { left, operator, right } => self.eval_binary(left, operator, right),
            Expr::Call { callee, paren, args } => self.eval_call(callee, paren, args),
            Expr::Lambda { params, return_type, body } => Ok(Value::Callable(Rc::new(Callable::Lambda(LambdaFunction {
                params: params.clone(),
                return_type: return_type.clone(),
                body: body.clone(),
                closure: self.environment.clone(),
            })))),
            Expr::ListExpr(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.evaluate(item)?);
                }
                Ok(Value::list(values))
            }
            Expr::Dict { keys, values } => {
                let mut entries = IndexMap::new();
                for (k, v) in keys.iter().zip(values) {
                    let key_value = self.evaluate(k)?;
                    let value = self.evaluate(v)?;
                    let anchor = k.anchor().cloned().unwrap_or_else(|| Token::new(TokenKind::LeftBrace, "{", 0));
                    let key = ValueKey::from_value(&key_value).map_err(|message| ThornError::Runtime {
                        line: anchor.line,
                        token: anchor.lexeme.clone(),
                        message,
                    })?;
                    entries.insert(key, value);
                }
                Ok(Value::dict(entries))
            }
            Expr::Index { object, bracket, index } => self.eval_index(object, bracket, index),
            Expr::IndexSet { object, bracket, index, value } => self.eval_index_set(object, bracket, index, value),
            Expr::Slice { object, bracket, start, end } => self.eval_slice(object, bracket, start.as_deref(), end.as_deref()),
            Expr::Get { object, name } => self.eval_get(object, name),
            Expr::Set { object, name, value } => self.eval_set(object, name, value),
            Expr::Match { subject, cases, keyword } => self.eval_match(subject, cases, keyword),
            Expr::TypeExpr(type_expr) => Ok(Value::str(describe_type(type_expr))),
        }
    }

    fn eval_logical(&mut self, left: &Expr, operator: &Token, right: &Expr) -> ThornResult<Value> {
        let left_value = self.evaluate(left)?;
        match operator.kind {
            TokenKind::Or | TokenKind::OrOr => {
                if left_value.is_truthy() {
                    Ok(left_value)
                } else {
                    self.evaluate(right)
                }
            }
            TokenKind::And | TokenKind::AndAnd => {
                if !left_value.is_truthy() {
                    Ok(left_value)
                } else {
                    self.evaluate(right)
                }
            }
            TokenKind::QuestionQuestion => {
                if matches!(left_value, Value::Null) {
                    self.evaluate(right)
                } else {
                    Ok(left_value)
                }
            }
            _ => unreachable!("non-logical operator in Expr::Logical"),
        }
    }

    fn eval_unary(&mut self, operator: &Token, right: &Expr) -> ThornResult<Value> {
        let value = self.evaluate(right)?;
        match operator.kind {
            TokenKind::Bang => Ok(Value::Bool(!value.is_truthy())),
            TokenKind::Minus => match value {
                Value::Number(n) => Ok(Value::Number(-n)),
                other => Err(self.fault(operator, format!("cannot negate '{}'", other.type_name()))),
            },
            _ => unreachable!("non-unary operator in Expr::Unary"),
        }
    }

    fn eval_binary(&mut self, left: &Expr, operator: &Token, right: &Expr) -> ThornResult<Value> {
        let left_value = self.evaluate(left)?;
        let right_value = self.evaluate(right)?;

        match operator.kind {
            TokenKind::EqEqual => return Ok(Value::Bool(left_value.is_equal(&right_value))),
            TokenKind::BangEqual => return Ok(Value::Bool(!left_value.is_equal(&right_value))),
            TokenKind::Plus => {
                if let (Value::Str(a), _) = (&left_value, &right_value) {
                    return Ok(Value::str(format!("{a}{right_value}")));
                }
                if let (_, Value::Str(b)) = (&left_value, &right_value) {
                    return Ok(Value::str(format!("{left_value}{b}")));
                }
                if let (Value::List(a), Value::List(b)) = (&left_value, &right_value) {
                    let mut concatenated = a.borrow().clone();
                    concatenated.extend(b.borrow().iter().cloned());
                    return Ok(Value::list(concatenated));
                }
            }
            _ => {}
        }

        let a = self.expect_number(&left_value, operator)?;
        let b = self.expect_number(&right_value, operator)?;

        match operator.kind {
            TokenKind::Plus => Ok(Value::Number(a + b)),
            TokenKind::Minus => Ok(Value::Number(a - b)),
            TokenKind::Star => Ok(Value::Number(a * b)),
            TokenKind::StarStar => Ok(Value::Number(a.powf(b))),
            TokenKind::Percent => Ok(Value::Number(a % b)),
            TokenKind::Slash => {
                if b == 0.0 {
                    if self.allow_div_infinity {
                        Ok(Value::Number(a / b))
                    } else {
                        Err(self.fault(operator, "Division by zero".to_string()))
                    }
                } else {
                    Ok(Value::Number(a / b))
                }
            }
            TokenKind::Greater => Ok(Value::Bool(a > b)),
            TokenKind::GreaterEqual => Ok(Value::Bool(a >= b)),
            TokenKind::Less => Ok(Value::Bool(a < b)),
            TokenKind::LessEqual => Ok(Value::Bool(a <= b)),
            _ => unreachable!("unhandled binary operator {:?}", operator.kind),
        }
    }

    fn expect_number(&self, value: &Value, operator: &Token) -> ThornResult<f64> {
        match value {
            Value::Number(n) => Ok(*n),
            other => Err(ThornError::Runtime {
                line: operator.line,
                token: operator.lexeme.clone(),
                message: format!("expected a number, got '{}'", other.type_name()),
            }),
        }
    }

    fn eval_call(&mut self, callee: &Expr, paren: &Token, args: &[Expr]) -> ThornResult<Value> {
        if let Expr::Variable(name) = callee {
            if name.lexeme == "Ok" || name.lexeme == "Err" {
                if args.len() != 1 {
                    return Err(self.fault(paren, format!("'{}' expects exactly 1 argument", name.lexeme)));
                }
                let previous = self.allow_div_infinity;
                self.allow_div_infinity = true;
                let inner = self.evaluate(&args[0]);
                self.allow_div_infinity = previous;
                let inner = inner?;
                return Ok(if name.lexeme == "Ok" {
                    Value::Ok(Box::new(inner))
                } else {
                    Value::Err(Box::new(inner))
                });
            }
        }

        let callee_value = self.evaluate(callee)?;
        let mut arg_values = Vec::with_capacity(args.len());
        for arg in args {
            arg_values.push(self.evaluate(arg)?);
        }
        self.call_value(&callee_value, arg_values, paren)
    }

    pub fn call_value(&mut self, callee: &Value, args: Vec<Value>, call_site: &Token) -> ThornResult<Value> {
        match callee {
            Value::Callable(c) => self.call_callable(c, args, call_site),
            other => Err(self.fault(call_site, format!("'{}' is not callable", other.type_name()))),
        }
    }

    fn call_callable(&mut self, callable: &Rc<Callable>, args: Vec<Value>, call_site: &Token) -> ThornResult<Value> {
        let resolved = callable.resolve(args.len()).ok_or_else(|| {
            self.fault(call_site, format!("no overload of '{}' accepts {} argument(s)", callable.name(), args.len()))
        })?;
        self.invoke(&resolved, args, call_site)
    }

    fn invoke(&mut self, callable: &Rc<Callable>, args: Vec<Value>, call_site: &Token) -> ThornResult<Value> {
        match callable.as_ref() {
            Callable::Native(f) => {
                if !f.arity.accepts(args.len()) {
                    return Err(self.fault(call_site, format!("'{}' expects a different argument count", f.name)));
                }
                (f.func.clone())(self, args)
            }
            Callable::User(uf) => {
                if uf.arity() != args.len() {
                    return Err(self.fault(call_site, format!("'{}' expects {} argument(s)", uf.decl.name.lexeme, uf.arity())));
                }
                self.call_function_body(&uf.decl.params, &uf.decl.body, uf.closure.clone(), args)
            }
            Callable::Lambda(lf) => self.call_lambda(lf, args),
            Callable::Bound(b) => self.call_bound(b, args, call_site),
            Callable::Class(class) => self.instantiate(class.clone(), args, call_site),
            Callable::Group(FunctionGroup { .. }) => unreachable!("resolve() must pick a concrete overload"),
        }
    }

    fn call_function_body(
        &mut self,
        params: &[Param],
        body: &[Stmt],
        base_env: Rc<RefCell<Environment>>,
        args: Vec<Value>,
    ) -> ThornResult<Value> {
        let call_env = Environment::child(&base_env);
        for (param, arg) in params.iter().zip(args) {
            call_env.borrow_mut().define(&param.name, arg, false);
        }

        let previous_env = std::mem::replace(&mut self.environment, call_env);
        let previous_return = self.return_value.take();
        let result: ThornResult<()> = (|| {
            for stmt in body {
                self.execute(stmt)?;
                if self.return_value.is_some() {
                    break;
                }
            }
            Ok(())
        })();
        let return_value = self.return_value.take();
        self.return_value = previous_return;
        self.environment = previous_env;
        result?;
        Ok(return_value.unwrap_or(Value::Null))
    }

    fn call_lambda(&mut self, lf: &LambdaFunction, args: Vec<Value>) -> ThornResult<Value> {
        if lf.params.len() != args.len() {
            return Err(ThornError::Runtime {
                line: 0,
                token: "<lambda>".to_string(),
                message: format!("lambda expects {} argument(s)", lf.params.len()),
            });
        }

        match lf.body.as_ref() {
            LambdaBody::Expr(expr) => {
                let call_env = Environment::child(&lf.closure);
                for (param, arg) in lf.params.iter().zip(args) {
                    call_env.borrow_mut().define(&param.name, arg, false);
                }
                let previous = std::mem::replace(&mut self.environment, call_env);
                let result = self.evaluate(expr);
                self.environment = previous;
                result
            }
            LambdaBody::Block(stmts) => self.call_function_body(&lf.params, stmts, lf.closure.clone(), args),
        }
    }

    fn call_bound(&mut self, bound: &BoundMethod, args: Vec<Value>, call_site: &Token) -> ThornResult<Value> {
        match bound.method.as_ref() {
            Callable::User(uf) => {
                if uf.arity() != args.len() {
                    return Err(self.fault(call_site, format!("'{}' expects {} argument(s)", uf.decl.name.lexeme, uf.arity())));
                }
                let base = Environment::child(&uf.closure);
                base.borrow_mut().define("this", bound.receiver.clone(), true);
                self.call_function_body(&uf.decl.params, &uf.decl.body, base, args)
            }
            Callable::Native(f) => (f.func.clone())(self, args),
            other => self.invoke(&Rc::new(clone_callable_ref(other)), args, call_site),
        }
    }

    fn instantiate(&mut self, class: Rc<Class>, args: Vec<Value>, call_site: &Token) -> ThornResult<Value> {
        let instance = Rc::new(RefCell::new(Instance::new(class.clone())));
        if let Some(init) = class.find_method("init") {
            let bound = Rc::new(Callable::Bound(BoundMethod {
                receiver: Value::Instance(instance.clone()),
                method: init,
            }));
            self.call_callable(&bound, args, call_site)?;
        } else if !args.is_empty() {
            return Err(self.fault(call_site, format!("class '{}' has no constructor but was called with arguments", class.name)));
        }
        Ok(Value::Instance(instance))
    }

    fn eval_get(&mut self, object: &Expr, name: &Token) -> ThornResult<Value> {
        let object_value = self.evaluate(object)?;
        match &object_value {
            Value::Instance(instance) => {
                if let Some(field) = instance.borrow().get(&name.lexeme) {
                    return Ok(field);
                }
                if let Some(method) = instance.borrow().class.find_method(&name.lexeme) {
                    return Ok(Value::Callable(Rc::new(Callable::Bound(BoundMethod {
                        receiver: object_value.clone(),
                        method,
                    }))));
                }
                Err(self.fault(name, format!("undefined property '{}'", name.lexeme)))
            }
            // Primitive methods are never invoked by `Get` alone — only the
            // surrounding `Call` supplies arguments, so this always returns a
            // bound handle rather than risking a side effect (e.g. `pop`)
            // firing before the real argument list is known.
            _ => self.builtin_method_handle(object_value, name),
        }
    }

    /// Wraps a primitive method lookup as a callable so `obj.method(args)`
    /// works the same way a user method call does.
    fn builtin_method_handle(&mut self, receiver: Value, name: &Token) -> ThornResult<Value> {
        let method_name = name.lexeme.clone();
        let method_token = name.clone();
        let func: NativeFn = Rc::new(move |interp, args| {
            builtins::call_builtin_method(interp, &receiver, &method_token, args)
        });
        Ok(Value::Callable(Rc::new(Callable::Native(NativeFunction {
            name: method_name,
            arity: Arity::Range(0, 8),
            func,
        }))))
    }

    fn eval_set(&mut self, object: &Expr, name: &Token, value: &Expr) -> ThornResult<Value> {
        let object_value = self.evaluate(object)?;
        let new_value = self.evaluate(value)?;
        match &object_value {
            Value::Instance(instance) => {
                instance.borrow_mut().set(&name.lexeme, new_value.clone());
                Ok(new_value)
            }
            other => Err(self.fault(name, format!("cannot set property on '{}'", other.type_name()))),
        }
    }

    fn eval_index(&mut self, object: &Expr, bracket: &Token, index: &Expr) -> ThornResult<Value> {
        let object_value = self.evaluate(object)?;
        let index_value = self.evaluate(index)?;
        match &object_value {
            Value::List(items) => {
                let i = self.expect_number(&index_value, bracket)? as i64;
                let list = items.borrow();
                resolve_signed_index(i, list.len())
                    .and_then(|i| list.get(i).cloned())
                    .ok_or_else(|| self.fault(bracket, format!("index {i} out of bounds")))
            }
            Value::Dict(entries) => {
                let key = ValueKey::from_value(&index_value).map_err(|m| self.fault(bracket, m))?;
                entries
                    .borrow()
                    .get(&key)
                    .cloned()
                    .ok_or_else(|| self.fault(bracket, format!("key '{}' not found", describe(&index_value))))
            }
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let i = self.expect_number(&index_value, bracket)? as i64;
                resolve_signed_index(i, chars.len())
                    .map(|i| Value::str(chars[i].to_string()))
                    .ok_or_else(|| self.fault(bracket, format!("index {i} out of bounds")))
            }
            other => Err(self.fault(bracket, format!("'{}' is not indexable", other.type_name()))),
        }
    }

    fn eval_index_set(&mut self, object: &Expr, bracket: &Token, index: &Expr, value: &Expr) -> ThornResult<Value> {
        let object_value = self.evaluate(object)?;
        let index_value = self.evaluate(index)?;
        let new_value = self.evaluate(value)?;
        match &object_value {
            Value::List(items) => {
                let i = self.expect_number(&index_value, bracket)? as i64;
                let len = items.borrow().len();
                let resolved = resolve_signed_index(i, len).ok_or_else(|| self.fault(bracket, format!("index {i} out of bounds")))?;
                items.borrow_mut()[resolved] = new_value.clone();
                Ok(new_value)
            }
            Value::Dict(entries) => {
                let key = ValueKey::from_value(&index_value).map_err(|m| self.fault(bracket, m))?;
                entries.borrow_mut().insert(key, new_value.clone());
                Ok(new_value)
            }
            other => Err(self.fault(bracket, format!("cannot index-assign into '{}'", other.type_name()))),
        }
    }

    fn eval_slice(&mut self, object: &Expr, bracket: &Token, start: Option<&Expr>, end: Option<&Expr>) -> ThornResult<Value> {
        let object_value = self.evaluate(object)?;
        let start = start.map(|e| self.evaluate(e)).transpose()?;
        let end = end.map(|e| self.evaluate(e)).transpose()?;

        let start = start.map(|v| self.expect_number(&v, bracket)).transpose()?.map(|n| n as i64);
        let end = end.map(|v| self.expect_number(&v, bracket)).transpose()?.map(|n| n as i64);

        match &object_value {
            Value::List(items) => {
                let list = items.borrow();
                let (s, e) = clamp_range(start.unwrap_or(0), end.unwrap_or(list.len() as i64), list.len());
                Ok(Value::list(list[s..e].to_vec()))
            }
            Value::Str(text) => {
                let chars: Vec<char> = text.chars().collect();
                let (s, e) = clamp_range(start.unwrap_or(0), end.unwrap_or(chars.len() as i64), chars.len());
                Ok(Value::str(chars[s..e].iter().collect::<String>()))
            }
            other => Err(self.fault(bracket, format!("'{}' is not sliceable", other.type_name()))),
        }
    }

    fn eval_match(&mut self, subject: &Expr, cases: &[crate::ast::MatchCase], keyword: &Token) -> ThornResult<Value> {
        let subject_value = self.evaluate(subject)?;

        'cases: for case in cases {
            let bind = match (&case.pattern, &subject_value) {
                (Pattern::Wildcard, _) => Some(None),
                (Pattern::Literal(lit), value) => {
                    if literal_value(lit).is_equal(value) {
                        Some(None)
                    } else {
                        None
                    }
                }
                (Pattern::Binding(name), value) => Some(Some((name.clone(), value.clone()))),
                (Pattern::Ok(name), Value::Ok(inner)) => Some(Some((name.clone(), (**inner).clone()))),
                (Pattern::Err(name), Value::Err(inner)) => Some(Some((name.clone(), (**inner).clone()))),
                _ => None,
            };

            let Some(binding) = bind else { continue 'cases };

            let case_env = Environment::child(&self.environment);
            if let Some((name, value)) = binding {
                case_env.borrow_mut().define(&name, value, false);
            }

            let previous = std::mem::replace(&mut self.environment, case_env);
            if let Some(guard) = &case.guard {
                let passed = self.evaluate(guard);
                match passed {
                    Ok(v) if v.is_truthy() => {}
                    Ok(_) => {
                        self.environment = previous;
                        continue 'cases;
                    }
                    Err(e) => {
                        self.environment = previous;
                        return Err(e);
                    }
                }
            }

            let result = match &case.body {
                MatchBody::Expr(expr) => self.evaluate(expr),
                MatchBody::Block(stmts) => {
                    let previous_return = self.return_value.take();
                    let outcome = self.run_block_value(stmts);
                    self.return_value = previous_return;
                    outcome
                }
            };
            self.environment = previous;
            return result;
        }

        Err(self.fault(keyword, format!("no match arm matched {}", describe(&subject_value))))
    }

    /// Execute a block and take the value of its trailing expression
    /// statement, used for match block-arms (spec §9 resolution).
    fn run_block_value(&mut self, stmts: &[Stmt]) -> ThornResult<Value> {
        let mut last = Value::Null;
        for (i, stmt) in stmts.iter().enumerate() {
            if i == stmts.len() - 1 {
                if let Stmt::Expression(expr) = stmt {
                    last = self.evaluate(expr)?;
                    break;
                }
            }
            self.execute(stmt)?;
            if self.return_value.is_some() {
                break;
            }
        }
        Ok(self.return_value.take().unwrap_or(last))
    }

    // ---- imports ---------------------------------------------------------------

    fn exec_import(&mut self, module: &str, names: &Option<Vec<Token>>, keyword: &Token) -> ThornResult<()> {
        let path = self.module_loader.borrow().resolve(&self.current_dir, module, keyword.line)?;
        let canonical = path.canonicalize().unwrap_or_else(|_| path.clone());

        let cached = self.module_loader.borrow().cached(&canonical);
        if let Some(exports) = cached {
            return self.bind_imports(exports, names, keyword);
        }

        self.module_loader.borrow_mut().begin(&canonical, module)?;

        let source = std::fs::read_to_string(&path)?;
        let tokens = crate::lexer::Lexer::new(&source).scan_tokens().map_err(ThornError::Parse)?;
        let program = crate::parser::Parser::new(tokens).parse().map_err(ThornError::Parse)?;

        let module_dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
        let mut module_interp = self.for_module(module_dir);
        let run_result = module_interp.run_program(&program);
        let exports = module_interp.take_exports();

        run_result?;
        self.module_loader.borrow_mut().finish(&canonical, exports.clone());
        self.bind_imports(exports, names, keyword)
    }

    fn bind_imports(&mut self, exports: HashMap<String, Value>, names: &Option<Vec<Token>>, keyword: &Token) -> ThornResult<()> {
        match names {
            Some(names) => {
                for name in names {
                    let value = exports.get(&name.lexeme).cloned().ok_or_else(|| ThornError::Import {
                        path: keyword.lexeme.clone(),
                        reason: format!("module has no export named '{}'", name.lexeme),
                    })?;
                    self.environment.borrow_mut().define(&name.lexeme, value, false);
                }
            }
            None => {
                for (name, value) in exports {
                    self.environment.borrow_mut().define(&name, value, false);
                }
            }
        }
        Ok(())
    }

    // ---- faults: Runtime when uncaught, Throw when inside a `try` -------------

    fn fault(&self, anchor: &Token, message: String) -> ThornError {
        self.fault_value(anchor, Value::str(message))
    }

    fn fault_value(&self, anchor: &Token, value: Value) -> ThornError {
        if self.try_depth > 0 {
            ThornError::Throw(value)
        } else {
            ThornError::Runtime {
                line: anchor.line,
                token: anchor.lexeme.clone(),
                message: describe(&value),
            }
        }
    }
}

/// Recognizes the `while` fast-path shape: `<identifier> < <number literal>`.
fn while_numeric_fast_path(condition: &Expr) -> Option<(&Token, f64)> {
    let Expr::Binary { left, operator, right } = condition else {
        return None;
    };
    if operator.kind != TokenKind::Less {
        return None;
    }
    let Expr::Variable(var) = left.as_ref() else {
        return None;
    };
    let Expr::Literal(Literal::Number(limit)) = right.as_ref() else {
        return None;
    };
    Some((var, *limit))
}

fn literal_value(lit: &Literal) -> Value {
    match lit {
        Literal::Number(n) => Value::Number(*n),
        Literal::Str(s) => Value::str(s.clone()),
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Null => Value::Null,
    }
}

fn describe_type(type_expr: &crate::ast::TypeExpr) -> String {
    let descriptor = TypeDescriptor::from_type_expr(type_expr);
    format!("{descriptor:?}")
}

fn resolve_signed_index(index: i64, len: usize) -> Option<usize> {
    let effective = if index < 0 { index + len as i64 } else { index };
    if effective < 0 || effective as usize >= len {
        None
    } else {
        Some(effective as usize)
    }
}

fn clamp_range(start: i64, end: i64, len: usize) -> (usize, usize) {
    let clamp = |i: i64| -> usize {
        let effective = if i < 0 { i + len as i64 } else { i };
        effective.clamp(0, len as i64) as usize
    };
    let start = clamp(start);
    let end = clamp(end).max(start);
    (start, end)
}

fn clone_callable_ref(callable: &Callable) -> Callable {
    match callable {
        Callable::Native(f) => Callable::Native(NativeFunction {
            name: f.name.clone(),
            arity: f.arity,
            func: f.func.clone(),
        }),
        Callable::Class(c) => Callable::Class(c.clone()),
        _ => unreachable!("bound methods only wrap user functions or natives"),
    }
}
