use std::convert::TryFrom;
use std::fmt;
use std::io::Write;

use lazy_static::lazy_static;

use crate::lang::ast::BinaryOperator;
use crate::lang::error::{Error, Result};
use crate::lang::eval::ops;
use crate::lang::eval::value::{Range, Value};

/// Host provided callables, bound in the global scope under their names
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Function {
    Print,
    Sum,
    Range,
    Str,
    Len,
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Function::Print => "print",
            Function::Sum => "sum",
            Function::Range => "range",
            Function::Str => "str",
            Function::Len => "len",
        };

        write!(f, "{}", name)
    }
}

lazy_static! {
    pub static ref FUNCTIONS: Vec<Function> = vec![
        Function::Print,
        Function::Sum,
        Function::Range,
        Function::Str,
        Function::Len,
    ];
}

impl Function {
    /// Invoke the built-in. `sink` receives anything it prints.
    pub fn call(&self, args: Vec<Value>, sink: &mut dyn Write) -> Result<Value> {
        match self {
            Function::Print => print(&args, sink),
            Function::Sum => {
                self.check_arity(&args, 1, 2)?;
                sum(&args[0], args.get(1))
            }
            Function::Range => {
                self.check_arity(&args, 1, 2)?;
                range(&args)
            }
            Function::Str => {
                self.check_arity(&args, 0, 1)?;
                Ok(Value::String(
                    args.first().map(|v| v.to_string()).unwrap_or_default(),
                ))
            }
            Function::Len => {
                self.check_arity(&args, 1, 1)?;
                len(&args[0])
            }
        }
    }

    fn check_arity(&self, args: &[Value], min: usize, max: usize) -> Result<()> {
        let given = args.len();
        if given >= min && given <= max {
            return Ok(());
        }

        let message = if min == max {
            format!(
                "{}() takes exactly {} argument{} ({} given)",
                self,
                min,
                if min == 1 { "" } else { "s" },
                given
            )
        } else if given < min {
            format!(
                "{}() takes at least {} argument{} ({} given)",
                self,
                min,
                if min == 1 { "" } else { "s" },
                given
            )
        } else {
            format!(
                "{}() takes at most {} arguments ({} given)",
                self, max, given
            )
        };

        Err(Error::type_error(message))
    }
}

fn print(args: &[Value], sink: &mut dyn Write) -> Result<Value> {
    let line = args
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    writeln!(sink, "{}", line)?;

    Ok(Value::None)
}

fn sum(iterable: &Value, start: Option<&Value>) -> Result<Value> {
    let mut acc = match start {
        None => Value::Integer(0),
        Some(v @ Value::Integer(_)) | Some(v @ Value::Float(_)) => v.clone(),
        Some(Value::String(_)) => {
            return Err(Error::type_error(
                "sum() can't sum strings [use ''.join(seq) instead]",
            ))
        }
        Some(v) => {
            return Err(Error::type_error(format!(
                "sum() start value must be a number, not '{}'",
                v.type_name()
            )))
        }
    };

    let add = |acc: &Value, item: &Value| match item {
        Value::Integer(_) | Value::Float(_) => ops::binary(BinaryOperator::Plus, acc, item),
        v => Err(Error::type_error(format!(
            "unsupported operand type(s) for +: '{}' and '{}'",
            acc.type_name(),
            v.type_name()
        ))),
    };

    match iterable {
        Value::List(list) => {
            for item in list.borrow().iter() {
                acc = add(&acc, item)?;
            }
        }
        Value::Range(r) => {
            for i in r.iter() {
                acc = add(&acc, &Value::Integer(i))?;
            }
        }
        v => {
            return Err(Error::type_error(format!(
                "sum() argument must be a list or range, not '{}'",
                v.type_name()
            )))
        }
    }

    Ok(acc)
}

fn range(args: &[Value]) -> Result<Value> {
    let mut bounds = Vec::with_capacity(args.len());
    for arg in args {
        match arg {
            Value::Integer(i) => bounds.push(*i),
            v => {
                return Err(Error::type_error(format!(
                    "'{}' object cannot be interpreted as an integer",
                    v.type_name()
                )))
            }
        }
    }

    let (start, stop) = match bounds.as_slice() {
        [stop] => (0, *stop),
        [start, stop] => (*start, *stop),
        _ => return Err(Error::type_error("range() takes 1 or 2 arguments")),
    };

    Ok(Value::Range(Range { start, stop }))
}

fn len(v: &Value) -> Result<Value> {
    let n = match v {
        Value::String(s) => s.chars().count(),
        Value::List(list) => list.borrow().len(),
        Value::Map(map) => map.borrow().len(),
        Value::Range(r) => r.len(),
        v => {
            return Err(Error::type_error(format!(
                "object of type '{}' has no len()",
                v.type_name()
            )))
        }
    };

    i64::try_from(n)
        .map(Value::Integer)
        .map_err(|_| Error::overflow("length does not fit in 64 bits"))
}

#[cfg(test)]
use crate::lang::error::ErrorKind;

#[cfg(test)]
fn call(func: Function, args: Vec<Value>) -> Result<(Value, String)> {
    let mut sink: Vec<u8> = Vec::new();
    let value = func.call(args, &mut sink)?;
    Ok((value, String::from_utf8_lossy(&sink).into_owned()))
}

#[cfg(test)]
fn ints(items: Vec<i64>) -> Value {
    Value::new_list(items.into_iter().map(Value::Integer).collect())
}

#[test]
fn test_names() {
    let names: Vec<String> = FUNCTIONS.iter().map(|f| f.to_string()).collect();
    assert_eq!(names, vec!["print", "sum", "range", "str", "len"]);
}

#[test]
fn test_print() {
    let data = vec![
        (vec![], "\n"),
        (vec![Value::String("Hello,".to_string()), Value::String("MicroPython".to_string())], "Hello, MicroPython\n"),
        (vec![Value::String("Numbers:".to_string()), ints(vec![1, 2, 3, 4, 5])], "Numbers: [1, 2, 3, 4, 5]\n"),
        (vec![Value::Float(2.0), Value::Boolean(false), Value::None], "2.0 False None\n"),
        (vec![Value::new_list(vec![Value::String("a".to_string())])], "['a']\n"),
    ];

    for (args, expected) in data {
        let (value, output) = call(Function::Print, args).expect("print failed");
        assert!(matches!(value, Value::None));
        assert_eq!(output, expected);
    }
}

#[test]
fn test_sum() {
    let data = vec![
        (vec![ints(vec![])], "0"),
        (vec![ints(vec![1, 2, 3, 4, 5])], "15"),
        (vec![Value::new_list(vec![Value::Integer(1), Value::Float(0.5)])], "1.5"),
        (vec![ints(vec![1, 2]), Value::Integer(10)], "13"),
        (vec![ints(vec![]), Value::Float(1.0)], "1.0"),
        (vec![Value::Range(Range { start: 1, stop: 6 })], "15"),
    ];

    for (args, expected) in data {
        let (value, _) = call(Function::Sum, args).expect("sum failed");
        assert_eq!(value.to_string(), expected);
    }

    let errors = vec![
        vec![],
        vec![Value::new_list(vec![Value::Integer(1), Value::String("x".to_string())])],
        vec![Value::new_list(vec![Value::Boolean(true)])],
        vec![Value::Integer(5)],
        vec![ints(vec![1]), Value::String("".to_string())],
        vec![ints(vec![i64::MAX, 1])],
    ];

    for args in errors {
        assert!(call(Function::Sum, args).is_err());
    }
}

#[test]
fn test_range() {
    let (value, _) = call(Function::Range, vec![Value::Integer(1), Value::Integer(6)])
        .expect("range failed");
    match value {
        Value::Range(r) => {
            assert_eq!(r.iter().collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
            // A second traversal starts over
            assert_eq!(r.iter().collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
        }
        v => panic!("expected range, got {:?}", v),
    }

    let (value, _) = call(Function::Range, vec![Value::Integer(3)]).expect("range failed");
    assert_eq!(value.to_string(), "range(0, 3)");

    let errors = vec![
        (vec![], ErrorKind::TypeError),
        (vec![Value::Float(1.0)], ErrorKind::TypeError),
        (vec![Value::Integer(0), Value::Integer(10), Value::Integer(2)], ErrorKind::TypeError),
    ];

    for (args, kind) in errors {
        assert_eq!(call(Function::Range, args).unwrap_err().kind, kind);
    }
}

#[test]
fn test_str_and_len() {
    let data = vec![
        (Function::Str, vec![], "''"),
        (Function::Str, vec![Value::Float(1.5)], "'1.5'"),
        (Function::Str, vec![ints(vec![1])], "'[1]'"),
        (Function::Len, vec![Value::String("héllo".to_string())], "5"),
        (Function::Len, vec![ints(vec![1, 2, 3])], "3"),
        (Function::Len, vec![Value::Range(Range { start: 5, stop: 2 })], "0"),
    ];

    for (func, args, expected) in data {
        let (value, _) = call(func, args).expect("call failed");
        assert_eq!(value.repr().to_string(), expected);
    }

    let err = call(Function::Len, vec![Value::Integer(1)]).unwrap_err();
    assert_eq!(err.message, "object of type 'int' has no len()");

    let err = call(Function::Len, vec![]).unwrap_err();
    assert_eq!(err.message, "len() takes exactly 1 argument (0 given)");
}
