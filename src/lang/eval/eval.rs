use std::convert::TryFrom;
use std::io::Write;
use std::rc::Rc;

use log::trace;

use super::ops;
use super::value::{normalize_index, Closure, Key, Map, Value};
use crate::lang::ast::*;
use crate::lang::error::{Error, Pos, Result};
use crate::lang::scope::Scope;
use crate::lang::stack::ensure_sufficient_stack;

/// Default limit on nested user function calls
pub const DEFAULT_MAX_CALL_DEPTH: usize = 1000;

/// How a block finished
///
/// Only function calls look at `Return`; everything else passes it straight up.
enum Flow {
    Normal,
    Return(Value),
}

pub struct Eval<'a> {
    sink: &'a mut dyn Write,
    interactive: bool,
    globals: Scope,
    max_call_depth: usize,
    /// Number of user function calls currently executing
    depth: usize,
}

impl<'a> Eval<'a> {
    /// Create a new evaluator with a fresh global scope
    ///
    /// `sink` receives everything `print` writes, plus the echoed results of expression
    /// statements when `interactive` is set.
    pub fn new(sink: &'a mut dyn Write, interactive: bool, max_call_depth: usize) -> Self {
        Self {
            sink,
            interactive,
            globals: Scope::new_global(),
            max_call_depth,
            depth: 0,
        }
    }

    /// Run a program against the global scope
    ///
    /// Bindings persist between calls. Returns the value of the last statement if it was an
    /// expression statement, `None` otherwise.
    pub fn eval(&mut self, program: &[Statement]) -> Result<Value> {
        let globals = self.globals.clone();
        let mut last = Value::None;

        for stmt in program {
            last = match stmt {
                Statement::ExpressionStatement(expr) => {
                    let val = self.eval_expr(expr, &globals)?;
                    if self.interactive && !matches!(val, Value::None) {
                        writeln!(self.sink, "{}", val.repr())?;
                    }

                    val
                }
                stmt => match self.exec_stmt(stmt, &globals)? {
                    Flow::Normal => Value::None,
                    Flow::Return(val) => return Ok(val),
                },
            };
        }

        Ok(last)
    }

    fn exec_block(&mut self, stmts: &[Statement], scope: &Scope) -> Result<Flow> {
        for stmt in stmts {
            if let Flow::Return(val) = self.exec_stmt(stmt, scope)? {
                return Ok(Flow::Return(val));
            }
        }

        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Statement, scope: &Scope) -> Result<Flow> {
        match stmt {
            Statement::Assign(ident, expr) => {
                let val = self.eval_expr(expr, scope)?;
                scope.insert(ident.clone(), val);
            }
            Statement::AssignIndex(target, index, expr, pos) => {
                let val = self.eval_expr(expr, scope)?;
                let container = self.eval_expr(target, scope)?;
                let index = self.eval_expr(index, scope)?;
                set_index(&container, &index, val).map_err(|e| e.at(*pos))?;
            }
            Statement::BlockStatement(BlockStatement::For(ident, iterable, body, pos)) => {
                return self.exec_for(ident, iterable, body, *pos, scope);
            }
            Statement::BlockStatement(BlockStatement::If(cond, true_body, false_body)) => {
                let body = if self.eval_expr(cond, scope)?.is_truthy() {
                    true_body
                } else {
                    false_body
                };

                return self.exec_block(body, scope);
            }
            Statement::BlockStatement(BlockStatement::FunctionDef(def)) => {
                let closure = Closure {
                    def: def.clone(),
                    scope: scope.clone(),
                };
                scope.insert(def.name.clone(), Value::Function(Rc::new(closure)));
            }
            Statement::Return(expr, _) => {
                let val = match expr {
                    Some(e) => self.eval_expr(e, scope)?,
                    None => Value::None,
                };

                return Ok(Flow::Return(val));
            }
            Statement::ExpressionStatement(expr) => {
                self.eval_expr(expr, scope)?;
            }
        }

        Ok(Flow::Normal)
    }

    fn exec_for(
        &mut self,
        ident: &Identifier,
        iterable: &Expression,
        body: &[Statement],
        pos: Pos,
        scope: &Scope,
    ) -> Result<Flow> {
        let run = |eval: &mut Self, item: Value| {
            scope.insert(ident.clone(), item);
            eval.exec_block(body, scope)
        };

        match self.eval_expr(iterable, scope)? {
            // Index based so writes made by the body to later elements are seen
            Value::List(list) => {
                let mut i = 0;
                loop {
                    let item = list.borrow().get(i).cloned();
                    let item = match item {
                        Some(item) => item,
                        None => break,
                    };

                    if let Flow::Return(val) = run(self, item)? {
                        return Ok(Flow::Return(val));
                    }
                    i += 1;
                }
            }
            Value::Range(r) => {
                for i in r.iter() {
                    if let Flow::Return(val) = run(self, Value::Integer(i))? {
                        return Ok(Flow::Return(val));
                    }
                }
            }
            Value::String(s) => {
                for c in s.chars() {
                    if let Flow::Return(val) = run(self, Value::String(c.to_string()))? {
                        return Ok(Flow::Return(val));
                    }
                }
            }
            Value::Map(map) => {
                let keys: Vec<Value> = map.borrow().keys().map(Value::from).collect();
                for key in keys {
                    if let Flow::Return(val) = run(self, key)? {
                        return Ok(Flow::Return(val));
                    }
                }
            }
            v => {
                return Err(Error::type_error(format!(
                    "'{}' object is not iterable",
                    v.type_name()
                ))
                .at(pos))
            }
        }

        Ok(Flow::Normal)
    }

    fn eval_expr(&mut self, expr: &Expression, scope: &Scope) -> Result<Value> {
        ensure_sufficient_stack(|| self.eval_expr_inner(expr, scope))
    }

    fn eval_expr_inner(&mut self, expr: &Expression, scope: &Scope) -> Result<Value> {
        let val = match expr {
            Expression::Constant(c) => match c {
                Constant::Integer(i) => Value::Integer(*i),
                Constant::Float(n) => Value::Float(*n),
                Constant::Boolean(b) => Value::Boolean(*b),
                Constant::None => Value::None,
            },
            Expression::Str(s) => Value::String(s.clone()),
            Expression::Interpolated(fragments) => {
                let mut out = String::new();
                for fragment in fragments {
                    match fragment {
                        Fragment::Text(t) => out.push_str(t),
                        Fragment::Expr(e) => out.push_str(&self.eval_expr(e, scope)?.to_string()),
                    }
                }

                Value::String(out)
            }
            Expression::Identifier(ident, pos) => scope.get(ident).ok_or_else(|| {
                Error::name_error(format!("name '{}' is not defined", ident)).at(*pos)
            })?,
            Expression::List(items, _) => {
                let mut vals = Vec::with_capacity(items.len());
                for item in items {
                    vals.push(self.eval_expr(item, scope)?);
                }

                Value::new_list(vals)
            }
            Expression::Map(entries, pos) => {
                let mut map = Map::new();
                for (k, v) in entries {
                    let key = self.eval_expr(k, scope)?;
                    let key = Key::try_from(&key).map_err(|e| e.at(*pos))?;
                    let val = self.eval_expr(v, scope)?;
                    map.insert(key, val);
                }

                Value::new_map(map)
            }
            Expression::Unary(op, e, pos) => {
                let val = self.eval_expr(e, scope)?;
                ops::unary(*op, &val).map_err(|e| e.at(*pos))?
            }
            Expression::Binary(op, lhs, rhs, pos) => {
                let lhs = self.eval_expr(lhs, scope)?;
                let rhs = self.eval_expr(rhs, scope)?;
                ops::binary(*op, &lhs, &rhs).map_err(|e| e.at(*pos))?
            }
            Expression::Call(func, args, pos) => {
                let func = self.eval_expr(func, scope)?;
                let mut vals = Vec::with_capacity(args.len());
                for arg in args {
                    vals.push(self.eval_expr(arg, scope)?);
                }

                self.call(func, vals).map_err(|e| e.at(*pos))?
            }
            Expression::Index(container, index, pos) => {
                let container = self.eval_expr(container, scope)?;
                let index = self.eval_expr(index, scope)?;
                get_index(&container, &index).map_err(|e| e.at(*pos))?
            }
        };

        Ok(val)
    }

    fn call(&mut self, func: Value, args: Vec<Value>) -> Result<Value> {
        let closure = match func {
            Value::Builtin(b) => {
                trace!("calling builtin {}() with {} args", b, args.len());
                return b.call(args, &mut *self.sink);
            }
            Value::Function(closure) => closure,
            v => {
                return Err(Error::type_error(format!(
                    "'{}' object is not callable",
                    v.type_name()
                )))
            }
        };

        let def = &closure.def;
        if args.len() != def.params.len() {
            let expected = def.params.len();
            return Err(Error::type_error(format!(
                "{}() takes {} positional argument{} but {} {} given",
                def.name,
                expected,
                if expected == 1 { "" } else { "s" },
                args.len(),
                if args.len() == 1 { "was" } else { "were" }
            )));
        }

        if self.depth >= self.max_call_depth {
            return Err(Error::recursion("maximum recursion depth exceeded"));
        }

        let frame = closure.scope.child();
        for (param, arg) in def.params.iter().zip(args) {
            frame.insert(param.clone(), arg);
        }

        self.depth += 1;
        trace!("calling {}() at depth {}", def.name, self.depth);
        let flow = ensure_sufficient_stack(|| self.exec_block(&def.body, &frame));
        self.depth -= 1;

        let val = match flow? {
            Flow::Return(val) => val,
            Flow::Normal => Value::None,
        };
        trace!("{}() returned {}", def.name, val.repr());

        Ok(val)
    }
}

impl<'a> Drop for Eval<'a> {
    fn drop(&mut self) {
        // Functions bound in the global scope keep it alive through their closure
        self.globals.clear();
    }
}

fn int_index(index: &Value, what: &str) -> Result<i64> {
    match index {
        Value::Integer(i) => Ok(*i),
        v => Err(Error::type_error(format!(
            "{} indices must be integers, not '{}'",
            what,
            v.type_name()
        ))),
    }
}

fn get_index(container: &Value, index: &Value) -> Result<Value> {
    match container {
        Value::List(list) => {
            let list = list.borrow();
            let i = int_index(index, "list")?;
            normalize_index(i, list.len())
                .map(|i| list[i].clone())
                .ok_or_else(|| Error::index("list index out of range"))
        }
        Value::String(s) => {
            let i = int_index(index, "string")?;
            let len = s.chars().count();
            normalize_index(i, len)
                .and_then(|i| s.chars().nth(i))
                .map(|c| Value::String(c.to_string()))
                .ok_or_else(|| Error::index("string index out of range"))
        }
        Value::Range(r) => {
            let i = int_index(index, "range")?;
            r.get(i)
                .map(Value::Integer)
                .ok_or_else(|| Error::index("range object index out of range"))
        }
        Value::Map(map) => {
            let key = Key::try_from(index)?;
            map.borrow()
                .get(&key)
                .cloned()
                .ok_or_else(|| Error::index(format!("key {} not found in dict", index.repr())))
        }
        v => Err(Error::type_error(format!(
            "'{}' object is not subscriptable",
            v.type_name()
        ))),
    }
}

fn set_index(container: &Value, index: &Value, val: Value) -> Result<()> {
    match container {
        Value::List(list) => {
            let i = int_index(index, "list")?;
            let mut list = list.borrow_mut();
            let len = list.len();
            match normalize_index(i, len) {
                Some(i) => list[i] = val,
                None => return Err(Error::index("list assignment index out of range")),
            }
        }
        Value::Map(map) => {
            let key = Key::try_from(index)?;
            map.borrow_mut().insert(key, val);
        }
        v => {
            return Err(Error::type_error(format!(
                "'{}' object does not support item assignment",
                v.type_name()
            )))
        }
    }

    Ok(())
}

#[cfg(test)]
use crate::lang::error::ErrorKind;

#[cfg(test)]
fn run_with(input: &str, interactive: bool, max_call_depth: usize) -> Result<(Value, String)> {
    use crate::lang::parse::parse;

    let program = parse(input)?;
    let mut output = Vec::new();
    let value = {
        let mut eval = Eval::new(&mut output, interactive, max_call_depth);
        eval.eval(&program)?
    };

    Ok((
        value,
        String::from_utf8(output).expect("Output not utf-8"),
    ))
}

#[cfg(test)]
fn run(input: &str) -> Result<(Value, String)> {
    run_with(input, false, DEFAULT_MAX_CALL_DEPTH)
}

#[test]
fn test_expression() {
    let tests = vec![
        ("print(5 + 5)", "10\n"),
        ("print(7 / 2)", "3.5\n"),
        ("print(4 / 2)", "2.0\n"),
        ("print(-7 // 2, -7 % 2)", "-4 1\n"),
        ("print(7.5 // 2, 7.5 % 2)", "3.0 1.5\n"),
        ("print(2 ** 10, 2 ** -1)", "1024 0.5\n"),
        ("print(-2 ** 2)", "-4\n"),
        ("print(1 + 2.5)", "3.5\n"),
        ("print('ab' + 'cd')", "abcd\n"),
        ("print(1 == 1.0, 'a' != 'a', [1, 2] == [1, 2])", "True False True\n"),
        ("print(1 < 2, 'b' <= 'a', [1, 2] < [1, 3])", "True False True\n"),
        ("print(0.1 + 0.2)", "0.30000000000000004\n"),
        ("print(None, True, 1e20)", "None True 1e+20\n"),
    ];

    for (input, expected) in tests {
        let (_, output) = run(input).expect("Eval failed");
        assert_eq!(output, expected, "input: {}", input);
    }
}

#[test]
fn test_expression_errors() {
    let tests = vec![
        ("1 + 'a'", ErrorKind::TypeError),
        ("True + 1", ErrorKind::TypeError),
        ("1 / 0", ErrorKind::ZeroDivisionError),
        ("1 % 0", ErrorKind::ZeroDivisionError),
        ("9223372036854775807 + 1", ErrorKind::OverflowError),
        ("1 < 'a'", ErrorKind::TypeError),
        ("undefined", ErrorKind::NameError),
        ("5(1)", ErrorKind::TypeError),
        ("{[1]: 2}", ErrorKind::TypeError),
    ];

    for (input, kind) in tests {
        let err = run(input).expect_err("Eval succeeded when should have failed");
        assert_eq!(err.kind, kind, "input: {}", input);
    }
}

#[test]
fn test_error_position() {
    let err = run("x = 1\ny = [1, 2]\nprint(x + y)\n").expect_err("should fail");
    assert_eq!(err.kind, ErrorKind::TypeError);
    assert_eq!(
        err.message,
        "unsupported operand type(s) for +: 'int' and 'list'"
    );
    assert_eq!((err.line(), err.column()), (Some(3), Some(9)));

    let err = run("def f():\n    return nope\nf()\n").expect_err("should fail");
    assert_eq!(err.kind, ErrorKind::NameError);
    assert_eq!(err.message, "name 'nope' is not defined");
    assert_eq!((err.line(), err.column()), (Some(2), Some(12)));
}

#[test]
fn test_interpolation() {
    let tests = vec![
        ("x = 5\nprint(f\"{x} squared = {x*x}\")", "5 squared = 25\n"),
        ("name = 'Ann'\nprint(f'hi {name}!')", "hi Ann!\n"),
        ("print(f'{[1, \"a\"]} {{literal}}')", "[1, 'a'] {literal}\n"),
        ("print(f'{1.0 / 4}')", "0.25\n"),
    ];

    for (input, expected) in tests {
        let (_, output) = run(input).expect("Eval failed");
        assert_eq!(output, expected, "input: {}", input);
    }
}

#[test]
fn test_if() {
    let tests = vec![
        ("x = 3\nif x == 3:\n    print('yep')\n", "yep\n"),
        (
            "x = 3\nif x != 3:\n    print('nope')\nelse:\n    print('yep')\n    if x == 3: x = 4\nprint(x)\n",
            "yep\n4\n",
        ),
        ("if []: print('a')\nelse: print('b')\n", "b\n"),
        ("if 'x': print('a')\n", "a\n"),
    ];

    for (input, expected) in tests {
        let (_, output) = run(input).expect("Eval failed");
        assert_eq!(output, expected, "input: {}", input);
    }
}

#[test]
fn test_loop() {
    let tests = vec![
        ("for i in range(1, 4):\n    print(i)\n", "1\n2\n3\n"),
        ("for c in 'ab': print(c)\n", "a\nb\n"),
        ("m = {'a': 1, 'b': 2}\nfor k in m: print(k, m[k])\n", "a 1\nb 2\n"),
        ("for i in range(0): print(i)\nprint('done')\n", "done\n"),
        // Loop variable stays bound afterwards
        ("for i in range(3): last = i\nprint(i)\n", "2\n"),
    ];

    for (input, expected) in tests {
        let (_, output) = run(input).expect("Eval failed");
        assert_eq!(output, expected, "input: {}", input);
    }

    let err = run("for x in 5: print(x)\n").expect_err("should fail");
    assert_eq!(err.message, "'int' object is not iterable");
}

#[test]
fn test_live_list_iteration() {
    // Writes made by the body show up in elements not yet visited
    let input = r#"
xs = [1, 2, 3]
for x in xs:
    xs[2] = 30
    print(x)
"#;
    let (_, output) = run(input).expect("Eval failed");
    assert_eq!(output, "1\n2\n30\n");

    // Map iteration works on a snapshot of the keys
    let input = r#"
m = {'a': 1}
for k in m:
    m['b'] = 2
    print(k)
print(len(m))
"#;
    let (_, output) = run(input).expect("Eval failed");
    assert_eq!(output, "a\n2\n");
}

#[test]
fn test_functions() {
    let tests = vec![
        ("def add(a, b):\n    return a + b\nprint(add(2, 3))\n", "5\n"),
        ("def f():\n    print('side')\nprint(f())\n", "side\nNone\n"),
        ("def f(n):\n    if n <= 1: return 1\n    return n * f(n - 1)\nprint(f(10))\n", "3628800\n"),
        // Late binding: the global is read at call time
        ("def show():\n    print(y)\ny = 1\nshow()\ny = 2\nshow()\n", "1\n2\n"),
        // Closures keep their defining scope alive
        (
            "def make(n):\n    def inner(x):\n        return x + n\n    return inner\nadd5 = make(5)\nprint(add5(1))\n",
            "6\n",
        ),
        // Parameters shadow globals without touching them
        ("x = 1\ndef f(x):\n    x = x + 10\n    return x\nprint(f(5), x)\n", "15 1\n"),
        // Return unwinds out of a loop
        ("def first(xs):\n    for x in xs:\n        return x\nprint(first([7, 8]))\n", "7\n"),
        ("print = 5\nstr(print)\n", ""),
    ];

    for (input, expected) in tests {
        let (_, output) = run(input).expect("Eval failed");
        assert_eq!(output, expected, "input: {}", input);
    }
}

#[test]
fn test_arity() {
    let err = run("def f(a, b):\n    return a\nf(1)\n").expect_err("should fail");
    assert_eq!(err.kind, ErrorKind::TypeError);
    assert_eq!(
        err.message,
        "f() takes 2 positional arguments but 1 was given"
    );

    let err = run("def g():\n    return 1\ng(1, 2)\n").expect_err("should fail");
    assert_eq!(
        err.message,
        "g() takes 0 positional arguments but 2 were given"
    );
}

#[test]
fn test_recursion_limit() {
    let err = run_with("def f(n):\n    return f(n + 1)\nf(0)\n", false, 50)
        .expect_err("should fail");
    assert_eq!(err.kind, ErrorKind::RecursionError);

    // Deep but bounded recursion is fine with the default limit
    let (value, _) = run("def f(n):\n    if n == 0: return 0\n    return 1 + f(n - 1)\nf(900)\n")
        .expect("Eval failed");
    assert!(matches!(value, Value::Integer(900)));
}

#[test]
fn test_index() {
    let tests = vec![
        ("xs = [1, 2, 3, 4, 5]\nprint(xs[0], xs[-1])", "1 5\n"),
        ("m = {'a': 1}\nprint(m['a'])", "1\n"),
        ("m = {1: 'one'}\nprint(m[1.0])", "one\n"),
        ("print('hello'[1], range(10)[-2])", "e 8\n"),
        ("xs = [1, 2]\nxs[-1] = 9\nprint(xs)", "[1, 9]\n"),
        ("m = {'a': 1, 'b': 2}\nm['a'] = 3\nm['c'] = 4\nprint(m)", "{'a': 3, 'b': 2, 'c': 4}\n"),
        // Lists are shared, not copied
        ("a = [1]\nb = a\nb[0] = 2\nprint(a)", "[2]\n"),
        ("a = [1]\na[0] = a\nprint(a)", "[[...]]\n"),
    ];

    for (input, expected) in tests {
        let (_, output) = run(input).expect("Eval failed");
        assert_eq!(output, expected, "input: {}", input);
    }

    let errors = vec![
        ("xs = [1, 2, 3, 4, 5]\nxs[10]", ErrorKind::IndexError, "list index out of range"),
        ("{'a': 1}['b']", ErrorKind::IndexError, "key 'b' not found in dict"),
        ("[1]['a']", ErrorKind::TypeError, "list indices must be integers, not 'str'"),
        ("5[0]", ErrorKind::TypeError, "'int' object is not subscriptable"),
        ("xs = []\nxs[0] = 1", ErrorKind::IndexError, "list assignment index out of range"),
        ("s = 'ab'\ns[0] = 'c'", ErrorKind::TypeError, "'str' object does not support item assignment"),
    ];

    for (input, kind, message) in errors {
        let err = run(input).expect_err("Eval succeeded when should have failed");
        assert_eq!(err.kind, kind, "input: {}", input);
        assert_eq!(err.message, message, "input: {}", input);
    }
}

#[test]
fn test_result_value() {
    let (value, _) = run("1 + 1").expect("Eval failed");
    assert!(matches!(value, Value::Integer(2)));

    let (value, _) = run("1 + 1\nx = 3").expect("Eval failed");
    assert!(matches!(value, Value::None));
}

#[test]
fn test_interactive() {
    let (_, output) =
        run_with("1 + 1\nx = 3\nx\nNone\nprint('p')\n'a'\n", true, DEFAULT_MAX_CALL_DEPTH)
            .expect("Eval failed");
    assert_eq!(output, "2\n3\np\n'a'\n");
}

#[test]
fn test_bindings_persist() {
    use crate::lang::parse::parse;

    let mut output = Vec::new();
    {
        let mut eval = Eval::new(&mut output, false, DEFAULT_MAX_CALL_DEPTH);
        eval.eval(&parse("x = 41").expect("Failed to parse"))
            .expect("Eval failed");
        eval.eval(&parse("print(x + 1)").expect("Failed to parse"))
            .expect("Eval failed");
    }

    assert_eq!(String::from_utf8(output).expect("Output not utf-8"), "42\n");
}

#[test]
fn test_deeply_nested_list_teardown() {
    let (_, output) = run("a = []\nfor i in range(100000):\n    a = [a]\nprint(len(a))\n")
        .expect("Eval failed");
    assert_eq!(output, "1\n");
}
