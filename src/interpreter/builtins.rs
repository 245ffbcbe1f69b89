//! Built-in methods on primitive values (spec §6): `String`, `Array`,
//! `Dictionary`, and `Result`. Unlike instance methods these don't go through
//! a class's method table — [`Interpreter::eval_get`] dispatches here
//! whenever the receiver isn't a user-defined instance.

use std::rc::Rc;

use crate::error::{ThornError, ThornResult};
use crate::interpreter::callable::Arity;
use crate::interpreter::value::{describe, Value, ValueKey};
use crate::interpreter::Interpreter;
use crate::token::Token;

pub fn call_builtin_method(
    interp: &mut Interpreter,
    receiver: &Value,
    method: &Token,
    args: Vec<Value>,
) -> ThornResult<Value> {
    match receiver {
        Value::Str(s) => string_method(s, method, args),
        Value::List(items) => list_method(interp, items, method, args),
        Value::Dict(entries) => dict_method(entries, method, args),
        Value::Ok(inner) => result_method(true, inner, method, args),
        Value::Err(inner) => result_method(false, inner, method, args),
        other => Err(unknown_method(&other.type_name(), method)),
    }
}

fn unknown_method(type_name: &str, method: &Token) -> ThornError {
    ThornError::Runtime {
        line: method.line,
        token: method.lexeme.clone(),
        message: format!("'{type_name}' has no method '{}'", method.lexeme),
    }
}

fn arity_error(method: &Token, expected: &str) -> ThornError {
    ThornError::Runtime {
        line: method.line,
        token: method.lexeme.clone(),
        message: format!("'{}' expects {expected} argument(s)", method.lexeme),
    }
}

fn expect_number(value: &Value, method: &Token) -> ThornResult<f64> {
    match value {
        Value::Number(n) => Ok(*n),
        other => Err(ThornError::Runtime {
            line: method.line,
            token: method.lexeme.clone(),
            message: format!("expected a number, got '{}'", other.type_name()),
        }),
    }
}

fn expect_string(value: &Value, method: &Token) -> ThornResult<Rc<str>> {
    match value {
        Value::Str(s) => Ok(s.clone()),
        other => Err(ThornError::Runtime {
            line: method.line,
            token: method.lexeme.clone(),
            message: format!("expected a string, got '{}'", other.type_name()),
        }),
    }
}

fn string_method(s: &Rc<str>, method: &Token, args: Vec<Value>) -> ThornResult<Value> {
    match method.lexeme.as_str() {
        "length" => Ok(Value::Number(s.chars().count() as f64)),
        "includes" => {
            let needle = args.first().ok_or_else(|| arity_error(method, "1"))?;
            Ok(Value::Bool(s.contains(expect_string(needle, method)?.as_ref())))
        }
        "startsWith" => {
            let needle = args.first().ok_or_else(|| arity_error(method, "1"))?;
            Ok(Value::Bool(s.starts_with(expect_string(needle, method)?.as_ref())))
        }
        "endsWith" => {
            let needle = args.first().ok_or_else(|| arity_error(method, "1"))?;
            Ok(Value::Bool(s.ends_with(expect_string(needle, method)?.as_ref())))
        }
        "slice" => {
            let chars: Vec<char> = s.chars().collect();
            let start = expect_number(args.first().ok_or_else(|| arity_error(method, "1 or 2"))?, method)? as i64;
            let end = args
                .get(1)
                .map(|v| expect_number(v, method))
                .transpose()?
                .unwrap_or(chars.len() as f64) as i64;
            let (start, end) = clamp_range(start, end, chars.len());
            let slice: String = chars[start..end].iter().collect();
            Ok(Value::str(slice))
        }
        _ => Err(unknown_method("string", method)),
    }
}

fn list_method(
    _interp: &mut Interpreter,
    items: &crate::interpreter::value::ListRef,
    method: &Token,
    args: Vec<Value>,
) -> ThornResult<Value> {
    match method.lexeme.as_str() {
        "length" => Ok(Value::Number(items.borrow().len() as f64)),
        "push" => {
            let value = args.into_iter().next().ok_or_else(|| arity_error(method, "1"))?;
            items.borrow_mut().push(value);
            Ok(Value::Null)
        }
        "pop" => Ok(items.borrow_mut().pop().unwrap_or(Value::Null)),
        "shift" => {
            let mut list = items.borrow_mut();
            if list.is_empty() {
                Ok(Value::Null)
            } else {
                Ok(list.remove(0))
            }
        }
        "unshift" => {
            let value = args.into_iter().next().ok_or_else(|| arity_error(method, "1"))?;
            items.borrow_mut().insert(0, value);
            Ok(Value::Null)
        }
        "includes" => {
            let needle = args.first().ok_or_else(|| arity_error(method, "1"))?;
            Ok(Value::Bool(items.borrow().iter().any(|v| v.is_equal(needle))))
        }
        "indexOf" => {
            let needle = args.first().ok_or_else(|| arity_error(method, "1"))?;
            let position = items.borrow().iter().position(|v| v.is_equal(needle));
            Ok(Value::Number(position.map(|i| i as f64).unwrap_or(-1.0)))
        }
        "slice" => {
            let list = items.borrow();
            let start = args
                .first()
                .map(|v| expect_number(v, method))
                .transpose()?
                .unwrap_or(0.0) as i64;
            let end = args
                .get(1)
                .map(|v| expect_number(v, method))
                .transpose()?
                .unwrap_or(list.len() as f64) as i64;
            let (start, end) = clamp_range(start, end, list.len());
            Ok(Value::list(list[start..end].to_vec()))
        }
        _ => Err(unknown_method("Array", method)),
    }
}

fn dict_method(
    entries: &crate::interpreter::value::DictRef,
    method: &Token,
    args: Vec<Value>,
) -> ThornResult<Value> {
    match method.lexeme.as_str() {
        "size" => Ok(Value::Number(entries.borrow().len() as f64)),
        "has" => {
            let key = to_key(args.first().ok_or_else(|| arity_error(method, "1"))?, method)?;
            Ok(Value::Bool(entries.borrow().contains_key(&key)))
        }
        "get" => {
            let key = to_key(args.first().ok_or_else(|| arity_error(method, "1 or 2"))?, method)?;
            let default = args.get(1).cloned().unwrap_or(Value::Null);
            Ok(entries.borrow().get(&key).cloned().unwrap_or(default))
        }
        "set" => {
            let key = to_key(args.first().ok_or_else(|| arity_error(method, "2"))?, method)?;
            let value = args.get(1).cloned().ok_or_else(|| arity_error(method, "2"))?;
            entries.borrow_mut().insert(key, value);
            Ok(Value::Null)
        }
        "remove" => {
            let key = to_key(args.first().ok_or_else(|| arity_error(method, "1"))?, method)?;
            Ok(entries.borrow_mut().shift_remove(&key).unwrap_or(Value::Null))
        }
        "keys" => Ok(Value::list(
            entries.borrow().keys().cloned().map(ValueKey::into_value).collect(),
        )),
        "values" => Ok(Value::list(entries.borrow().values().cloned().collect())),
        _ => Err(unknown_method("Dictionary", method)),
    }
}

fn result_method(is_ok: bool, inner: &Value, method: &Token, args: Vec<Value>) -> ThornResult<Value> {
    match method.lexeme.as_str() {
        "is_ok" => Ok(Value::Bool(is_ok)),
        "is_error" => Ok(Value::Bool(!is_ok)),
        "unwrap" => {
            if is_ok {
                Ok(inner.clone())
            } else {
                Err(ThornError::Runtime {
                    line: method.line,
                    token: method.lexeme.clone(),
                    message: format!("called unwrap() on Err({})", describe(inner)),
                })
            }
        }
        "unwrap_or" => {
            if is_ok {
                Ok(inner.clone())
            } else {
                args.into_iter().next().ok_or_else(|| arity_error(method, "1"))
            }
        }
        "unwrap_error" => {
            if is_ok {
                Err(ThornError::Runtime {
                    line: method.line,
                    token: method.lexeme.clone(),
                    message: format!("called unwrap_error() on Ok({})", describe(inner)),
                })
            } else {
                Ok(inner.clone())
            }
        }
        _ => Err(unknown_method("Result", method)),
    }
}

fn to_key(value: &Value, method: &Token) -> ThornResult<ValueKey> {
    ValueKey::from_value(value).map_err(|message| ThornError::Runtime {
        line: method.line,
        token: method.lexeme.clone(),
        message,
    })
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

/// Registers the handful of free functions every program gets for free:
/// `print` writes through the interpreter's output sink, `clock` reads the
/// host's wall clock.
pub fn register_prelude(interp: &mut Interpreter) {
    interp.register_native("print", Arity::Range(0, 8), |interp, args| {
        let rendered = args.iter().map(ToString::to_string).collect::<Vec<_>>().join(" ");
        interp.write_stdout(&rendered);
        interp.write_stdout("\n");
        Ok(Value::Null)
    });

    interp.register_native("clock", Arity::Exact(0), |_, _| {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        Ok(Value::Number(now.as_secs_f64()))
    });

    interp.register_native("len", Arity::Exact(1), |_, args| {
        match args.first() {
            Some(Value::Str(s)) => Ok(Value::Number(s.chars().count() as f64)),
            Some(Value::List(items)) => Ok(Value::Number(items.borrow().len() as f64)),
            Some(Value::Dict(entries)) => Ok(Value::Number(entries.borrow().len() as f64)),
            Some(other) => Err(ThornError::Runtime {
                line: 0,
                token: "len".to_string(),
                message: format!("'{}' has no length", other.type_name()),
            }),
            None => Err(ThornError::Runtime {
                line: 0,
                token: "len".to_string(),
                message: "len() expects 1 argument".to_string(),
            }),
        }
    });
}
